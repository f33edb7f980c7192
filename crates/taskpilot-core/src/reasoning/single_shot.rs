use super::prompts::{self, MAX_CONTEXT_SNIPPETS};
use super::recovery::{collapse_whitespace, strip_urls, UrlCollector};
use super::{Reasoning, ReasoningOutcome};
use crate::search::SearchHit;
use crate::services::CompletionModel;

/// Context assembled once, one completion call.
pub(crate) async fn run(
    model: &dyn CompletionModel,
    default_target: &str,
    task: &str,
    hits: &[SearchHit],
) -> Reasoning {
    let system = prompts::single_shot_system(default_target);
    let user = prompts::single_shot_user(task, &prompts::render_context(hits));

    let mut urls = UrlCollector::default();
    for hit in hits.iter().take(MAX_CONTEXT_SNIPPETS) {
        urls.push(&hit.url);
    }

    let raw = match model.complete(&system, &user).await {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!(target: "taskpilot::reasoning", error = %e, "single-shot completion failed");
            return Reasoning::failed(task, &e.to_string());
        }
    };
    let text = collapse_whitespace(&strip_urls(&raw));
    if text.is_empty() {
        return Reasoning::failed(task, "completion returned no text");
    }
    Reasoning {
        text,
        source_urls: urls.into_vec(),
        outcome: ReasoningOutcome::Completed,
        rounds: 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedModel;

    fn hit(n: usize) -> SearchHit {
        SearchHit {
            url: format!("https://www.feishu.cn/hc/zh-CN/articles/{}", n),
            title: format!("Article {}", n),
            summary: format!("summary {}", n),
            is_official: true,
            score: 120,
        }
    }

    #[tokio::test]
    async fn output_is_cleaned_and_sources_capped() {
        let model = ScriptedModel::new().otherwise(
            "1. Left-click Docs in the sidebar\n\n2. Open the shared document https://www.feishu.cn/hc/x\n3. Verify the title",
        );
        let hits: Vec<SearchHit> = (1..=7).map(hit).collect();
        let result = run(&model, "文件传输助手", "open shared document", &hits).await;

        assert_eq!(result.outcome, ReasoningOutcome::Completed);
        assert_eq!(
            result.text,
            "1. Left-click Docs in the sidebar 2. Open the shared document 3. Verify the title"
        );
        assert_eq!(result.source_urls.len(), MAX_CONTEXT_SNIPPETS);

        let (system, user) = &model.calls()[0];
        assert!(system.contains("文件传输助手"));
        assert!(user.contains("[Original test point]\nopen shared document"));
        assert!(user.contains("Article 5"));
        assert!(!user.contains("Article 6"));
    }

    #[tokio::test]
    async fn empty_or_failed_completion_is_a_failure() {
        let blank = ScriptedModel::new().otherwise("   https://only.a/link  ");
        let result = run(&blank, "t", "pin a message", &[]).await;
        assert_eq!(result.outcome, ReasoningOutcome::Failed);
        assert!(result.text.contains("pin a message"));

        let broken = ScriptedModel::failing();
        let result = run(&broken, "t", "pin a message", &[]).await;
        assert_eq!(result.outcome, ReasoningOutcome::Failed);
        assert!(result.text.contains("no scripted reply"));
    }
}
