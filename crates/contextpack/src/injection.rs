//! Delimited text blocks spliced into the request.
//!
//! Every block is fenced with a stable marker so a later request can be
//! checked for an earlier injection and the agent can tell proxy text from
//! user text.

/// One team memory rendered into the static channel.
pub fn format_memory(title: &str, content: &str) -> String {
    format!("### {title}\n{content}\n")
}

/// The static channel: team/project knowledge appended to the system prompt.
pub fn format_static_block(project: &str, body: &str) -> String {
    format!(
        "\
<driftguard-team-memory project=\"{project}\">
Prior work recorded for this project. Use it as background; the user's \
request takes precedence.

{body}</driftguard-team-memory>"
    )
}

/// The dynamic channel: per-turn context appended to the last user message.
pub fn format_dynamic_block(body: &str) -> String {
    format!("<driftguard-context>\n{body}</driftguard-context>")
}

/// The summary that replaces the conversation history after a CLEAR.
pub fn format_clear_summary(summary: &str) -> String {
    format!(
        "\
<driftguard-summary>
The earlier conversation was condensed to save context. Continue from this \
summary:

{}
</driftguard-summary>",
        summary.trim()
    )
}

/// Same reset, after a planning-only task was finalized.
pub fn format_planning_summary(summary: &str) -> String {
    format!(
        "\
<driftguard-plan>
Planning for this task is complete and recorded. Implement the plan below:

{}
</driftguard-plan>",
        summary.trim()
    )
}

/// Whether `text` already carries a driftguard block.
pub fn has_injection(text: &str) -> bool {
    text.contains("<driftguard-")
}
