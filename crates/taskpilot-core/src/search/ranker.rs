//! Classification, scoring, and merging of raw search hits.

use crate::services::RawHit;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

const OFFICIAL_BONUS: u32 = 100;
const TITLE_MATCH_BONUS: u32 = 10;
const SUMMARY_MATCH_BONUS: u32 = 5;
const HELP_CENTER_BONUS: u32 = 20;
const SUMMARY_LENGTH_BONUS: u32 = 3;
/// Exclusive bounds, in characters.
const SUMMARY_LENGTH_RANGE: (usize, usize) = (50, 500);

/// Which URLs count as official, same-domain, or help-center pages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankerPolicy {
    /// URL prefixes of official documentation pages.
    pub official_prefixes: Vec<String>,
    /// Bare domains; a URL containing one of these is kept even if not official.
    pub domains: Vec<String>,
    /// Substrings marking a help-center URL path.
    pub help_center_markers: Vec<String>,
}

impl Default for RankerPolicy {
    /// Feishu / Lark help center.
    fn default() -> Self {
        let owned = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        Self {
            official_prefixes: owned(&[
                "https://www.feishu.cn/hc/zh-CN/articles/",
                "https://www.feishu.cn/hc/en-US/articles/",
                "https://www.feishu.cn/hc/zh-CN/",
                "https://www.feishu.cn/hc/en-US/",
                "https://www.larksuite.com/hc/",
                "https://feishu.cn/hc/",
            ]),
            domains: owned(&["feishu.cn", "larksuite.com"]),
            help_center_markers: owned(&["feishu.cn/hc", "/hc/"]),
        }
    }
}

/// Where a hit landed after classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HitClass {
    Official,
    SameDomain,
    Unrelated,
}

impl RankerPolicy {
    pub fn classify(&self, url: &str) -> HitClass {
        if self.official_prefixes.iter().any(|p| url.starts_with(p.as_str())) {
            return HitClass::Official;
        }
        let lowered = url.to_lowercase();
        if self.domains.iter().any(|d| lowered.contains(&d.to_lowercase())) {
            HitClass::SameDomain
        } else {
            HitClass::Unrelated
        }
    }

    pub fn is_official(&self, url: &str) -> bool {
        self.classify(url) == HitClass::Official
    }

    fn is_help_center(&self, url: &str) -> bool {
        self.help_center_markers.iter().any(|m| url.contains(m.as_str()))
    }
}

/// A ranked hit. `is_official` and `score` are derived and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub url: String,
    pub title: String,
    pub summary: String,
    #[serde(skip_deserializing)]
    pub is_official: bool,
    #[serde(skip_deserializing)]
    pub score: u32,
}

/// Score of one kept hit for `query`.
pub fn score_hit(hit: &RawHit, query: &str, official: bool, policy: &RankerPolicy) -> u32 {
    let query = query.to_lowercase();
    let mut score = 0;
    if official {
        score += OFFICIAL_BONUS;
    }
    if !query.is_empty() && hit.title.to_lowercase().contains(&query) {
        score += TITLE_MATCH_BONUS;
    }
    if !query.is_empty() && hit.summary.to_lowercase().contains(&query) {
        score += SUMMARY_MATCH_BONUS;
    }
    if policy.is_help_center(&hit.url) {
        score += HELP_CENTER_BONUS;
    }
    let len = hit.summary.chars().count();
    if len > SUMMARY_LENGTH_RANGE.0 && len < SUMMARY_LENGTH_RANGE.1 {
        score += SUMMARY_LENGTH_BONUS;
    }
    score
}

/// Classifies, scores, and merges `raw`: up to `count` official hits, padded with
/// same-domain hits. Unrelated hits are dropped. Equal scores keep input order.
pub fn rank_hits(raw: &[RawHit], query: &str, count: usize, policy: &RankerPolicy) -> Vec<SearchHit> {
    let mut official = Vec::new();
    let mut same_domain = Vec::new();
    for hit in raw {
        let class = policy.classify(&hit.url);
        let is_official = class == HitClass::Official;
        let scored = SearchHit {
            url: hit.url.clone(),
            title: hit.title.clone(),
            summary: hit.summary.clone(),
            is_official,
            score: score_hit(hit, query, is_official, policy),
        };
        match class {
            HitClass::Official => official.push(scored),
            HitClass::SameDomain => same_domain.push(scored),
            HitClass::Unrelated => {}
        }
    }
    // sort_by is stable: ties keep their original order.
    official.sort_by(|a, b| b.score.cmp(&a.score));
    same_domain.sort_by(|a, b| b.score.cmp(&a.score));

    let mut merged: Vec<SearchHit> = official.into_iter().take(count).collect();
    let remaining = count.saturating_sub(merged.len());
    merged.extend(same_domain.into_iter().take(remaining));
    merged
}

/// Concatenates ranked batches, keeping the first occurrence of each URL.
pub fn merge_unique<I>(batches: I) -> Vec<SearchHit>
where
    I: IntoIterator<Item = Vec<SearchHit>>,
{
    let mut seen = HashSet::new();
    batches
        .into_iter()
        .flatten()
        .filter(|hit| seen.insert(hit.url.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(url: &str, title: &str, summary: &str) -> RawHit {
        RawHit::new(url, title, summary)
    }

    #[test]
    fn classification_follows_allowlist_then_domain() {
        let policy = RankerPolicy::default();
        assert_eq!(
            policy.classify("https://www.feishu.cn/hc/zh-CN/articles/360049067916"),
            HitClass::Official
        );
        assert_eq!(policy.classify("https://www.larksuite.com/hc/en-US/articles/1"), HitClass::Official);
        assert_eq!(policy.classify("https://open.feishu.cn/document/home"), HitClass::SameDomain);
        assert_eq!(policy.classify("https://WWW.LARKSUITE.COM/blog"), HitClass::SameDomain);
        assert_eq!(policy.classify("https://example.com/feishu-tips"), HitClass::Unrelated);
    }

    #[test]
    fn scoring_weights() {
        let policy = RankerPolicy::default();
        let long_summary = "x".repeat(60);
        let hit = raw(
            "https://www.feishu.cn/hc/zh-CN/articles/1",
            "How to Pin Messages",
            &format!("pin messages {}", long_summary),
        );
        // official + title + summary + help center + length
        assert_eq!(score_hit(&hit, "pin messages", true, &policy), 100 + 10 + 5 + 20 + 3);

        let bare = raw("https://open.feishu.cn/doc", "Other", "short");
        assert_eq!(score_hit(&bare, "pin", false, &policy), 0);

        let boundary = raw("https://open.feishu.cn/doc", "", &"y".repeat(50));
        assert_eq!(score_hit(&boundary, "zzz", false, &policy), 0);
        let inside = raw("https://open.feishu.cn/doc", "", &"y".repeat(51));
        assert_eq!(score_hit(&inside, "zzz", false, &policy), 3);
    }

    #[test]
    fn summary_length_counts_characters_not_bytes() {
        let policy = RankerPolicy::default();
        // 40 CJK characters is 120 bytes but only 40 characters.
        let hit = raw("https://open.feishu.cn/doc", "", &"文".repeat(40));
        assert_eq!(score_hit(&hit, "zzz", false, &policy), 0);
    }

    #[test]
    fn official_hits_lead_and_unrelated_are_dropped() {
        let policy = RankerPolicy::default();
        let hits = vec![
            raw("https://example.com/a", "open shared document", "open shared document"),
            raw("https://open.feishu.cn/x", "open shared document", "open shared document"),
            raw("https://www.feishu.cn/hc/zh-CN/articles/2", "Docs", "unrelated text"),
        ];
        let ranked = rank_hits(&hits, "open shared document", 5, &policy);
        assert_eq!(ranked.len(), 2);
        assert!(ranked[0].is_official);
        assert_eq!(ranked[0].url, "https://www.feishu.cn/hc/zh-CN/articles/2");
        assert!(!ranked[1].is_official);

        let single = rank_hits(&hits, "open shared document", 1, &policy);
        assert_eq!(single.len(), 1);
        assert!(single[0].is_official);
    }

    #[test]
    fn ties_keep_input_order_and_ranking_is_idempotent() {
        let policy = RankerPolicy::default();
        let hits = vec![
            raw("https://www.feishu.cn/hc/zh-CN/articles/a", "A", "s"),
            raw("https://www.feishu.cn/hc/zh-CN/articles/b", "B", "s"),
            raw("https://www.feishu.cn/hc/zh-CN/articles/c", "C query", "s"),
        ];
        let first = rank_hits(&hits, "query", 3, &policy);
        let urls: Vec<&str> = first.iter().map(|h| h.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://www.feishu.cn/hc/zh-CN/articles/c",
                "https://www.feishu.cn/hc/zh-CN/articles/a",
                "https://www.feishu.cn/hc/zh-CN/articles/b",
            ]
        );
        assert_eq!(rank_hits(&hits, "query", 3, &policy), first);
    }

    #[test]
    fn padding_uses_same_domain_hits() {
        let policy = RankerPolicy::default();
        let hits = vec![
            raw("https://open.feishu.cn/1", "t", "s"),
            raw("https://www.feishu.cn/hc/en-US/articles/1", "t", "s"),
            raw("https://open.feishu.cn/2", "t", "s"),
        ];
        let ranked = rank_hits(&hits, "q", 2, &policy);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].url, "https://www.feishu.cn/hc/en-US/articles/1");
        assert_eq!(ranked[1].url, "https://open.feishu.cn/1");
        assert!(rank_hits(&hits, "q", 0, &policy).is_empty());
    }

    #[test]
    fn merge_keeps_first_seen_order() {
        let policy = RankerPolicy::default();
        let a = rank_hits(
            &[
                raw("https://www.feishu.cn/hc/zh-CN/articles/1", "one", "s"),
                raw("https://www.feishu.cn/hc/zh-CN/articles/2", "two", "s"),
            ],
            "q",
            3,
            &policy,
        );
        let b = rank_hits(
            &[
                raw("https://www.feishu.cn/hc/zh-CN/articles/2", "two again", "s"),
                raw("https://www.feishu.cn/hc/zh-CN/articles/3", "three", "s"),
            ],
            "q",
            3,
            &policy,
        );
        let merged = merge_unique(vec![a, b]);
        let titles: Vec<&str> = merged.iter().map(|h| h.title.as_str()).collect();
        assert_eq!(titles, vec!["one", "two", "three"]);
    }
}
