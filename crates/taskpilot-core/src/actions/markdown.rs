//! Section and JSON extraction from free-form markdown answers.

use once_cell::sync::Lazy;
use regex::Regex;

static LEVEL_TWO_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^##\s+(.+?)\s*$").unwrap());
static ANY_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#{1,6}\s*(.+?)\s*$").unwrap());
static FENCED: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)```(?:json)?\s*(.*?)```").unwrap());
static TRAILING_COMMA: Lazy<Regex> = Lazy::new(|| Regex::new(r",\s*([}\]])").unwrap());

fn title_matches(found: &str, titles: &[&str]) -> bool {
    let found = found.trim().trim_end_matches([':', '：']).trim();
    titles.iter().any(|t| t.eq_ignore_ascii_case(found))
}

/// Body of the first `## <title>` section, up to the next `##` heading. Titles compare
/// case-insensitively; any alias in `titles` matches. Blank sections count as absent.
pub fn extract_section(markdown: &str, titles: &[&str]) -> Option<String> {
    let mut collecting = false;
    let mut collected = Vec::new();
    for line in markdown.lines() {
        let trimmed = line.trim();
        if let Some(caps) = LEVEL_TWO_HEADING.captures(trimmed) {
            if collecting {
                break;
            }
            collecting = caps.get(1).is_some_and(|m| title_matches(m.as_str(), titles));
            continue;
        }
        if collecting {
            collected.push(line);
        }
    }
    let body = collected.join("\n").trim().to_string();
    if body.is_empty() {
        None
    } else {
        Some(body)
    }
}

/// The JSON value under the heading named by `titles` (any level), or anywhere in the text
/// when no such heading exists. A fenced block wins over a bare `{...}` span.
pub fn extract_json(markdown: &str, titles: &[&str]) -> Option<serde_json::Value> {
    let section = heading_body(markdown, titles).unwrap_or(markdown);
    let candidate = match FENCED.captures(section).and_then(|c| c.get(1)) {
        Some(m) => m.as_str().trim(),
        None => balanced_object(section)?,
    };
    match serde_json::from_str(candidate) {
        Ok(value) => Some(value),
        Err(e) => {
            let relaxed = TRAILING_COMMA.replace_all(candidate, "$1");
            let parsed = serde_json::from_str(&relaxed).ok();
            if parsed.is_none() {
                tracing::debug!(target: "taskpilot::actions", error = %e, "json block did not parse");
            }
            parsed
        }
    }
}

fn heading_body<'a>(markdown: &'a str, titles: &[&str]) -> Option<&'a str> {
    let mut offset = 0;
    let mut start = None;
    for line in markdown.split_inclusive('\n') {
        let next = offset + line.len();
        if let Some(caps) = ANY_HEADING.captures(line.trim()) {
            match start {
                Some(from) => return Some(&markdown[from..offset]),
                None if caps.get(1).is_some_and(|m| title_matches(m.as_str(), titles)) => {
                    start = Some(next)
                }
                None => {}
            }
        }
        offset = next;
    }
    start.map(|from| &markdown[from..])
}

/// First `{` through its matching `}`, skipping braces inside string literals.
fn balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const ANSWER: &str = "## Analysis\nThe task is concrete.\n\n## Verdict\nYES\n\n## Reason\nIt names the chat.\n### detail\nstill reason\n## Extra\nignored";

    #[test]
    fn sections_stop_at_next_level_two_heading() {
        assert_eq!(extract_section(ANSWER, &["verdict"]).as_deref(), Some("YES"));
        assert_eq!(
            extract_section(ANSWER, &["Reason"]).as_deref(),
            Some("It names the chat.\n### detail\nstill reason")
        );
        assert_eq!(extract_section(ANSWER, &["Missing"]), None);
        assert_eq!(extract_section("## Verdict\n\n## Reason\nx", &["Verdict"]), None);
    }

    #[test]
    fn section_aliases_match() {
        let md = "## 判断结果：\nNO\n## 判断理由\n缺少目标";
        assert_eq!(extract_section(md, &["Verdict", "判断结果"]).as_deref(), Some("NO"));
        assert_eq!(extract_section(md, &["Reason", "判断理由"]).as_deref(), Some("缺少目标"));
    }

    #[test]
    fn fenced_block_under_heading() {
        let md = "## Analysis\n{\"ignored\": true}\n## Steps\n```json\n{\"steps\": [{\"id\": \"1\", \"step\": \"a\"}]}\n```\n";
        let value = extract_json(md, &["Steps"]).unwrap();
        assert_eq!(value["steps"][0]["step"], "a");
    }

    #[test]
    fn bare_object_with_braces_in_strings() {
        let md = "Here you go: {\"steps\": [{\"id\": \"1\", \"step\": \"type {name} in the box\"}]} done }";
        let value = extract_json(md, &["Steps"]).unwrap();
        assert_eq!(value["steps"][0]["step"], "type {name} in the box");
    }

    #[test]
    fn trailing_commas_are_tolerated() {
        let md = "## Steps\n{\"steps\": [{\"id\": \"1\", \"step\": \"a\",},]}";
        assert!(extract_json(md, &["Steps"]).is_some());
        assert!(extract_json("## Steps\n{not json", &["Steps"]).is_none());
    }
}
