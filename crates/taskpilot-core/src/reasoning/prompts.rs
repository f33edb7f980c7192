//! Prompt text for keyword extraction and both reasoning strategies.

use crate::search::{SearchHit, OFFICIAL_TAG, TOOL_NAME};

/// Snippets embedded into a single-shot prompt.
pub const MAX_CONTEXT_SNIPPETS: usize = 5;

pub const KEYWORD_SYSTEM: &str = "You are a Feishu product expert. From the user's test task, \
produce search keywords for the Feishu help center.

Requirements:
1. Extract the core feature points of the task.
2. Use Feishu product terminology.
3. Return 2-3 search keywords, one per line.
4. Return only the keywords, no numbering and no explanations.";

pub fn keyword_user(task: &str) -> String {
    format!("Task: {}\n\nSearch keywords:", task)
}

/// The four authoring constraints every enhanced task must satisfy.
pub fn authoring_constraints(default_target: &str) -> String {
    format!(
        "You are a UI automation test engineer for the Feishu PC desktop client. Using the \
official documentation provided, rewrite the user's test point into concrete desktop UI steps, \
replacing vague concepts with explicit operations.

Follow these four principles:

1. Single-actor viewpoint
   - The current user is the only actor in the scenario.
   - Never describe what a recipient or counterpart does (no \"the recipient clicks\", no \"wait for a reply\").
   - Every check must be visible on the current user's screen.

2. Explicit target resolution
   - If the test point names a recipient, describe selecting it as a UI operation (search box, contact list).
   - If no recipient is named, operate on \"{}\" or on the current user.
   - Treat people as UI elements: choosing a contact is a sequence of clicks.

3. Desktop interaction vocabulary
   - Use PC terms: left-click, right-click, multi-select messages, sidebar, open in new window.
   - Describe the full chain select -> act -> verify and name the entry point of each operation.

4. Self-contained verification
   - Every verification is on the current user's interface.
   - Never rely on external feedback; verifications check the state of UI elements.",
        default_target
    )
}

pub fn single_shot_system(default_target: &str) -> String {
    format!(
        "{}\n\nOutput only the test steps. Do not add explanations and do not output URLs.",
        authoring_constraints(default_target)
    )
}

/// Numbered reference list for the single-shot prompt.
pub fn render_context(hits: &[SearchHit]) -> String {
    hits.iter()
        .take(MAX_CONTEXT_SNIPPETS)
        .enumerate()
        .map(|(i, hit)| {
            let tag = if hit.is_official { format!("{} ", OFFICIAL_TAG) } else { String::new() };
            format!(
                "{}. {}{}\n   Summary: {}\n   Link: {}",
                i + 1,
                tag,
                hit.title,
                hit.summary,
                hit.url
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn single_shot_user(task: &str, context: &str) -> String {
    let context = if context.trim().is_empty() { "No search results." } else { context };
    format!(
        "Rewrite the following test point as detailed desktop UI steps.\n\n\
         [Original test point]\n{}\n\n\
         [Official documentation references]\n{}\n\n\
         [Completed test steps]",
        task, context
    )
}

pub fn agent_system(default_target: &str) -> String {
    format!(
        "{constraints}

You can use the following tool:

{tool}: searches the official Feishu help center and returns ranked documents. \
Action Input is a short search query.

Use exactly this format:

Thought: what you need to find out next
Action: {tool}
Action Input: the search query
Observation: the tool result (provided to you, never write it yourself)
... (Thought / Action / Action Input / Observation can repeat)
Thought: I now know the final answer
Final Answer: the completed test steps, without URLs",
        constraints = authoring_constraints(default_target),
        tool = TOOL_NAME
    )
}

pub fn agent_user(task: &str, seed_observation: &str) -> String {
    format!(
        "Test point: {}\n\nInitial references:\n{}\n\nBegin!\n\n",
        task, seed_observation
    )
}

/// Appended to the scratchpad when the model's output matched no format.
pub const FORMAT_REMINDER: &str = "Invalid format. Either call the tool with `Action:` and \
`Action Input:` lines, or give the result on a line starting with `Final Answer:`.";

/// Appended once the round limit is reached.
pub const FORCE_FINAL: &str = "\nYou have reached the step limit. Using the observations above, \
give your answer now on a line starting with \"Final Answer:\".\n";
