//! Embedding functions: local hashing or a remote OpenAI-compatible `/embeddings` endpoint.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use taskpilot_core::{ConfigError, EmbedError, Embedder, EmbeddingSettings, HashingEmbedder};

/// Entries kept in the in-process memo before it is cleared.
const MEMO_CAPACITY: usize = 4096;

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
    dimensions: usize,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

/// Remote embedding client. Identical texts are embedded once per process.
pub struct RemoteEmbedder {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    dimensions: usize,
    memo: DashMap<String, Vec<f32>>,
}

impl RemoteEmbedder {
    pub fn from_settings(settings: &EmbeddingSettings) -> Result<Self, ConfigError> {
        if settings.api_key.trim().is_empty() {
            return Err(ConfigError::MissingCredential("embedding.api_key"));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs.max(1)))
            .build()
            .map_err(|e| ConfigError::Invalid {
                key: "embedding",
                reason: format!("failed to create HTTP client: {}", e),
            })?;
        Ok(Self {
            client,
            url: format!("{}/embeddings", settings.base_url.trim_end_matches('/')),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            dimensions: settings.dimensions,
            memo: DashMap::new(),
        })
    }

    async fn request(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let response = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&EmbeddingRequest {
                model: &self.model,
                input: text,
                dimensions: self.dimensions,
            })
            .send()
            .await
            .map_err(|e| EmbedError::Request(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbedError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmbedError::Malformed(e.to_string()))?;
        let vector = body
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| EmbedError::Malformed("no embedding in response".to_string()))?;
        if vector.len() != self.dimensions {
            return Err(EmbedError::Malformed(format!(
                "expected {} dimensions, got {}",
                self.dimensions,
                vector.len()
            )));
        }
        Ok(vector)
    }
}

#[async_trait::async_trait]
impl Embedder for RemoteEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        if let Some(hit) = self.memo.get(text) {
            return Ok(hit.value().clone());
        }
        let vector = self.request(text).await?;
        if self.memo.len() >= MEMO_CAPACITY {
            self.memo.clear();
        }
        self.memo.insert(text.to_string(), vector.clone());
        Ok(vector)
    }
}

/// Embedder selected by `embedding.mode`.
pub fn build_embedder(settings: &EmbeddingSettings) -> Result<Arc<dyn Embedder>, ConfigError> {
    match settings.mode.trim().to_lowercase().as_str() {
        "" | "hashing" => Ok(Arc::new(HashingEmbedder::new(settings.dimensions))),
        "remote" => Ok(Arc::new(RemoteEmbedder::from_settings(settings)?)),
        other => Err(ConfigError::Invalid {
            key: "embedding.mode",
            reason: format!("expected `hashing` or `remote`, got `{}`", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hashing_mode_is_local() {
        let settings = EmbeddingSettings {
            dimensions: 64,
            ..EmbeddingSettings::default()
        };
        let embedder = build_embedder(&settings).unwrap();
        assert_eq!(embedder.dimensions(), 64);
        assert_eq!(embedder.embed("pin a chat").await.unwrap().len(), 64);
    }

    #[test]
    fn remote_mode_needs_a_key() {
        let settings = EmbeddingSettings {
            mode: "remote".to_string(),
            ..EmbeddingSettings::default()
        };
        assert!(matches!(
            build_embedder(&settings),
            Err(ConfigError::MissingCredential("embedding.api_key"))
        ));
        let unknown = EmbeddingSettings {
            mode: "bert".to_string(),
            ..EmbeddingSettings::default()
        };
        assert!(matches!(build_embedder(&unknown), Err(ConfigError::Invalid { .. })));
    }

    #[tokio::test]
    async fn unreachable_service_is_an_embed_error() {
        let settings = EmbeddingSettings {
            mode: "remote".to_string(),
            base_url: "http://127.0.0.1:9".to_string(),
            api_key: "test".to_string(),
            timeout_secs: 2,
            ..EmbeddingSettings::default()
        };
        let embedder = RemoteEmbedder::from_settings(&settings).unwrap();
        assert!(matches!(embedder.embed("hello").await, Err(EmbedError::Request(_))));
        assert!(embedder.memo.is_empty());
    }
}
