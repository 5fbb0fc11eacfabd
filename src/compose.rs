//! Prompt composition.
//!
//! Pure string shaping: a persona's role prompt, the retrieved context
//! (profile, knowledge snippets, search content), and the user message
//! are concatenated under fixed section headers. Same inputs always
//! produce byte-identical output.
//!
//! There is no token-budget guard here beyond snippet truncation and the
//! trailing history window — an oversized prompt fails at the completion
//! provider, not before.

use crate::agent::AgentKind;
use crate::models::{ChatMessage, SearchOutcome};

/// Context retrieved ahead of composition.
#[derive(Debug, Clone, Default)]
pub struct ContextBlock {
    /// Free-text description of the user (role, goals, company).
    pub profile: Option<String>,
    /// Knowledge-base snippets, each truncated before composition.
    pub knowledge: Vec<String>,
}

const PROFILE_HEADER: &str = "## User profile";
const KNOWLEDGE_HEADER: &str = "## Retrieved knowledge";
const SEARCH_HEADER: &str = "## Live research";
const TASK_HEADER: &str = "## Task";

/// Build the system prompt for one turn.
///
/// Sections with no content are omitted entirely rather than emitted
/// empty, so the fallback path (no search content) produces a shorter
/// prompt instead of a blank section.
pub fn compose_prompt(
    agent: AgentKind,
    context: &ContextBlock,
    search: Option<&SearchOutcome>,
    user_message: &str,
    snippet_max_chars: usize,
) -> String {
    let mut out = String::new();
    out.push_str(agent.role_prompt());
    out.push_str("\n\n");

    if let Some(profile) = context.profile.as_deref() {
        if !profile.trim().is_empty() {
            out.push_str(PROFILE_HEADER);
            out.push('\n');
            out.push_str(profile.trim());
            out.push_str("\n\n");
        }
    }

    let snippets: Vec<&str> = context
        .knowledge
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();
    if !snippets.is_empty() {
        out.push_str(KNOWLEDGE_HEADER);
        out.push('\n');
        for snippet in snippets {
            out.push_str("- ");
            out.push_str(truncate_chars(snippet, snippet_max_chars));
            out.push('\n');
        }
        out.push('\n');
    }

    if let Some(search) = search {
        if !search.content.trim().is_empty() {
            out.push_str(SEARCH_HEADER);
            out.push('\n');
            out.push_str(search.content.trim());
            out.push('\n');
            if !search.sources.is_empty() {
                out.push_str("Sources: ");
                out.push_str(&search.sources.join(", "));
                out.push('\n');
            }
            out.push('\n');
        }
    }

    out.push_str(TASK_HEADER);
    out.push('\n');
    out.push_str(user_message.trim());

    out
}

/// Keep only the last `window` messages of the conversation history.
pub fn trailing_history(history: &[ChatMessage], window: usize) -> &[ChatMessage] {
    let start = history.len().saturating_sub(window);
    &history[start..]
}

/// Truncate on a char boundary, not a byte offset.
fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MessageRole, SearchEngine};

    fn search_outcome(content: &str) -> SearchOutcome {
        SearchOutcome {
            content: content.to_string(),
            sources: vec!["https://example.com/a".to_string()],
            confidence: 0.9,
            source_count: 1,
            engine: SearchEngine::Primary,
        }
    }

    #[test]
    fn composition_is_deterministic() {
        let context = ContextBlock {
            profile: Some("Staff engineer at a fintech".to_string()),
            knowledge: vec!["Negotiation benchmarks for 2024".to_string()],
        };
        let search = search_outcome("Competitor X raised $50M in March 2024.");
        let a = compose_prompt(AgentKind::Mentor, &context, Some(&search), "What next?", 900);
        let b = compose_prompt(AgentKind::Mentor, &context, Some(&search), "What next?", 900);
        assert_eq!(a, b);
    }

    #[test]
    fn empty_sections_are_omitted() {
        let prompt = compose_prompt(
            AgentKind::Mentor,
            &ContextBlock::default(),
            None,
            "Hello",
            900,
        );
        assert!(!prompt.contains(PROFILE_HEADER));
        assert!(!prompt.contains(KNOWLEDGE_HEADER));
        assert!(!prompt.contains(SEARCH_HEADER));
        assert!(prompt.contains(TASK_HEADER));
        assert!(prompt.ends_with("Hello"));
    }

    #[test]
    fn snippets_are_truncated() {
        let long = "x".repeat(2000);
        let context = ContextBlock {
            profile: None,
            knowledge: vec![long],
        };
        let prompt = compose_prompt(AgentKind::ContentWriter, &context, None, "Write", 900);
        let line = prompt
            .lines()
            .find(|l| l.starts_with("- "))
            .expect("snippet line");
        assert_eq!(line.len(), 2 + 900);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let s = "héllo wörld".repeat(100);
        let t = truncate_chars(&s, 10);
        assert_eq!(t.chars().count(), 10);
    }

    #[test]
    fn history_window_keeps_last_n() {
        let history: Vec<ChatMessage> = (0..12)
            .map(|i| ChatMessage {
                role: if i % 2 == 0 {
                    MessageRole::User
                } else {
                    MessageRole::Assistant
                },
                content: format!("msg {i}"),
            })
            .collect();
        let tail = trailing_history(&history, 8);
        assert_eq!(tail.len(), 8);
        assert_eq!(tail[0].content, "msg 4");
        assert_eq!(tail[7].content, "msg 11");
    }

    #[test]
    fn short_history_is_kept_whole() {
        let history = vec![ChatMessage {
            role: MessageRole::User,
            content: "only".to_string(),
        }];
        assert_eq!(trailing_history(&history, 8).len(), 1);
    }
}
