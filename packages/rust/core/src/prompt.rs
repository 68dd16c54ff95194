//! Task prompts with strict output-format directives.

use pagewise_shared::{Link, Task};

/// Context label used for link repair when retrieval produced nothing.
pub const GENERAL_KNOWLEDGE: &str = "Wikipedia or general knowledge";

/// Render the prompt for `task`.
///
/// For [`Task::LinkRepair`], `links` are the broken links and `content` is
/// not used. The output depends only on the arguments.
pub fn build_prompt(task: Task, content: &str, links: &[Link], context: &str) -> String {
    let link_list = render_links(links);
    match task {
        Task::UpdateCheck => update_check(content, &link_list, context),
        Task::AdditionSuggestion => addition_suggestion(content, &link_list, context),
        Task::LinkRepair => link_repair(&link_list, context),
    }
}

/// One `- <anchor text> (<href>)` line per link, or `None`.
pub fn render_links(links: &[Link]) -> String {
    if links.is_empty() {
        return "None".to_string();
    }
    links
        .iter()
        .map(|l| format!("- {} ({})", l.content, l.href))
        .collect::<Vec<_>>()
        .join("\n")
}

fn update_check(content: &str, links: &str, context: &str) -> String {
    format!(
        r#"You are an assistant that reviews web content and flags statements that are outdated or no longer accurate.

Context from related sections of the same page:
"""
{context}
"""

Links referenced in the content:
{links}

Content to analyze:
"""
{content}
"""

Decide whether the content is outdated. Respond ONLY with a JSON object in exactly this format:
{{
  "outdated": true or false,
  "reason": "Why the content is or is not outdated.",
  "suggestion": "An updated version of the content if it is outdated, otherwise an empty string."
}}
"#
    )
}

fn addition_suggestion(content: &str, links: &str, context: &str) -> String {
    format!(
        r#"You are an assistant that improves the reliability and authenticity of web content.

Context from related sections of the same page:
"""
{context}
"""

Current content:
"""
{content}
"""

Links currently in the content:
{links}

Suggest additional information that would improve the trust, clarity, and authenticity of the content: data, citations, expert opinions, historical background, or other useful enhancements.

Respond ONLY with a JSON object in exactly this format:
{{
  "suggestions": [
    {{
      "addition": "A sentence or paragraph to add.",
      "reason": "Why this improves reliability or authenticity."
    }}
  ]
}}
"#
    )
}

fn link_repair(links: &str, context: &str) -> String {
    let context = if context.trim().is_empty() {
        GENERAL_KNOWLEDGE
    } else {
        context
    };
    format!(
        r#"You are an assistant that suggests correct or updated URLs for broken web links.

Contextual knowledge:
"""
{context}
"""

Broken links detected:
{links}

Suggest a replacement for each link based on its link text and known public resources.

Respond ONLY with a JSON array in exactly this format:
[
  {{
    "original": "broken URL",
    "text": "link text",
    "suggested_replacement": "suggested updated URL or explanation"
  }}
]
"#
    )
}
