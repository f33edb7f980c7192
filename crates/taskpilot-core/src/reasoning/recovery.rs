//! Parsing of free-form model output into agent steps, with a fallback chain.
//!
//! Parsers are tried in order and each either matches or passes. None of them fail:
//! structured final answer, structured tool call, heuristic fragment extraction. When
//! every parser passes the caller synthesizes a diagnostic instead.

use once_cell::sync::Lazy;
use regex::Regex;

/// Accepted length of a heuristically recovered answer, in characters (inclusive).
pub const RECOVERED_LEN_RANGE: (usize, usize) = (30, 2000);
/// Backquoted fragments shorter than this lose to the whole output.
const MIN_FRAGMENT_LEN: usize = 50;
/// Characters of the error kept in a diagnostic.
const DIAGNOSTIC_EXCERPT_LEN: usize = 100;

static FINAL_ANSWER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)final\s*answer\s*[:：]\s*(.*)").unwrap());
static TOOL_CALL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)action\s*\d*\s*[:：]\s*(.*?)\s*action\s*\d*\s*input\s*\d*\s*[:：]\s*(.*)").unwrap()
});
static OBSERVATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\n\s*observation\s*[:：]").unwrap());
static LEADING_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(final\s*answer|thought|observation)\s*[:：]\s*").unwrap()
});
static ROLE_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(thought|action\s*input|action|observation)\s*[:：]").unwrap()
});
static BACKQUOTED: Lazy<Regex> = Lazy::new(|| Regex::new(r"`([^`]+)`").unwrap());
static LITERAL_URL: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://\S+").unwrap());
static SOURCE_URL: Lazy<Regex> = Lazy::new(|| Regex::new(r#"https?://[^\s\[\]`"]+"#).unwrap());
static CITATION_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"★\s*official|\[\s*(?:official|related|官方文档|飞书相关|\d+)\s*\]|★").unwrap()
});
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// One parsed round of iterative reasoning.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentStep {
    /// The answer. `recovered` is true when it came from heuristic extraction.
    Final { text: String, recovered: bool },
    ToolCall { tool: String, input: String },
}

type StepParser = fn(&str) -> Option<AgentStep>;

/// Parser chain for an ordinary round.
const STEP_PARSERS: &[StepParser] = &[parse_final_answer, parse_tool_call, recover_fragment];
/// Parser chain once no more tool calls are allowed.
const FINAL_PARSERS: &[StepParser] = &[parse_final_answer, recover_fragment];

pub fn parse_step(raw: &str) -> Option<AgentStep> {
    STEP_PARSERS.iter().find_map(|parse| parse(raw))
}

pub fn parse_final(raw: &str) -> Option<AgentStep> {
    FINAL_PARSERS.iter().find_map(|parse| parse(raw))
}

fn parse_final_answer(raw: &str) -> Option<AgentStep> {
    let caps = FINAL_ANSWER.captures(raw)?;
    let text = clean_answer(caps.get(1)?.as_str());
    if text.is_empty() {
        return None;
    }
    Some(AgentStep::Final {
        text,
        recovered: false,
    })
}

fn parse_tool_call(raw: &str) -> Option<AgentStep> {
    let caps = TOOL_CALL.captures(raw)?;
    let tool = caps.get(1)?.as_str().trim().trim_matches(|c: char| c == '`' || c == '"').to_string();
    let mut input = caps.get(2)?.as_str();
    if let Some(m) = OBSERVATION.find(input) {
        input = &input[..m.start()];
    }
    let input = input.trim().trim_matches(|c: char| c == '"' || c == '\'' || c == '`').trim();
    if tool.is_empty() || input.is_empty() {
        return None;
    }
    Some(AgentStep::ToolCall {
        tool,
        input: input.to_string(),
    })
}

fn recover_fragment(raw: &str) -> Option<AgentStep> {
    let longest = BACKQUOTED
        .captures_iter(raw)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str())
        .max_by_key(|s| s.chars().count());
    let candidate = match longest {
        Some(fragment) if fragment.chars().count() >= MIN_FRAGMENT_LEN => fragment,
        // A bare thought is the model still deliberating, not an answer.
        _ if starts_with_thought(raw) => return None,
        _ => raw,
    };
    let text = clean_answer(candidate);
    let len = text.chars().count();
    if len < RECOVERED_LEN_RANGE.0 || len > RECOVERED_LEN_RANGE.1 {
        return None;
    }
    Some(AgentStep::Final {
        text,
        recovered: true,
    })
}

fn starts_with_thought(raw: &str) -> bool {
    raw.trim_start().to_lowercase().starts_with("thought")
}

/// Strips role markers, trailing agent chatter, URLs, and citation tags; collapses whitespace.
pub fn clean_answer(text: &str) -> String {
    let stripped = LEADING_MARKER.replace(text, "");
    let stripped: &str = &stripped;
    let body = match ROLE_MARKER.find(stripped) {
        Some(m) => &stripped[..m.start()],
        None => stripped,
    };
    let text = LITERAL_URL.replace_all(body, " ");
    let text = CITATION_TAG.replace_all(&text, " ");
    let text = text.replace(['`', '"'], " ");
    collapse_whitespace(&text)
}

/// Removes literal URLs.
pub fn strip_urls(text: &str) -> String {
    LITERAL_URL.replace_all(text, "").into_owned()
}

pub fn collapse_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

/// Collects URL-shaped substrings, first occurrence wins.
#[derive(Debug, Default, Clone)]
pub struct UrlCollector {
    urls: Vec<String>,
}

impl UrlCollector {
    pub fn scan(&mut self, text: &str) {
        for m in SOURCE_URL.find_iter(text) {
            let url = m
                .as_str()
                .trim_end_matches(|c: char| matches!(c, '.' | ',' | ';' | ':' | ')' | '）' | '。' | '，'));
            self.push(url);
        }
    }

    pub fn push(&mut self, url: &str) {
        if !url.is_empty() && !self.urls.iter().any(|u| u == url) {
            self.urls.push(url.to_string());
        }
    }

    pub fn into_vec(self) -> Vec<String> {
        self.urls
    }
}

/// Failure text returned in place of an answer.
pub fn diagnostic(task: &str, error: &str) -> String {
    let excerpt: String = error.chars().take(DIAGNOSTIC_EXCERPT_LEN).collect();
    format!(
        "Task enhancement failed for \"{}\". Simplify the task description or check the model and \
         search services, then retry. Error: {}",
        task,
        excerpt.trim()
    )
}
