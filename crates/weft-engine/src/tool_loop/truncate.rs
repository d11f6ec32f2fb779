//! Context capping applied before every model call.
//!
//! Only tool-result messages are ever shortened; user, system and assistant
//! text reaches the model as written.

use tracing::debug;

use weft_core::messages::ChatMessage;
use weft_settings::TruncationSettings;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TruncationLimits {
    pub per_result_chars: usize,
    pub aggregate_chars: usize,
    pub reduced_result_chars: usize,
}

impl Default for TruncationLimits {
    fn default() -> Self {
        Self::from(&TruncationSettings::default())
    }
}

impl From<&TruncationSettings> for TruncationLimits {
    fn from(s: &TruncationSettings) -> Self {
        Self {
            per_result_chars: s.per_result_chars,
            aggregate_chars: s.aggregate_chars,
            reduced_result_chars: s.reduced_result_chars,
        }
    }
}

const MARKER_OPEN: &str = "\n\n[truncated: ";

/// Shorten `text` to at most `max` characters, ending in a marker that names
/// the cut. Text already within the limit is returned unchanged.
pub fn truncate_chars(text: &str, max: usize) -> String {
    let total = text.chars().count();
    if total <= max {
        return text.to_string();
    }
    cut(text, total, max)
}

/// Copy of `messages` with oversized tool results shortened.
///
/// Every tool result is first capped at `per_result_chars`. If the whole
/// conversation is still above `aggregate_chars`, tool results are cut again
/// to `reduced_result_chars`. A capped result, marker included, never
/// exceeds its limit.
pub fn cap_context(messages: &[ChatMessage], limits: &TruncationLimits) -> Vec<ChatMessage> {
    let mut capped: Vec<ChatMessage> = messages
        .iter()
        .map(|m| shorten(m, limits.per_result_chars))
        .collect();

    let total: usize = capped.iter().map(ChatMessage::char_count).sum();
    if total > limits.aggregate_chars {
        debug!(total, limit = limits.aggregate_chars, "context above aggregate limit, reducing tool results");
        capped = capped
            .iter()
            .map(|m| shorten(m, limits.reduced_result_chars))
            .collect();
    }
    capped
}

fn shorten(message: &ChatMessage, max: usize) -> ChatMessage {
    if !message.is_tool_result() || message.char_count() <= max {
        return message.clone();
    }
    // A previously truncated result is cut again from its raw head, keeping
    // the original size in the marker.
    let (head, original) = split_marker(&message.content);
    let total = original.unwrap_or_else(|| head.chars().count());
    let mut out = message.clone();
    out.content = cut(head, total, max);
    out
}

fn cut(head: &str, total: usize, max: usize) -> String {
    let marker = format!("{MARKER_OPEN}{total} chars -> {max} chars]");
    let marker_len = marker.chars().count();
    if marker_len >= max {
        return head.chars().take(max).collect();
    }
    let kept: String = head.chars().take(max - marker_len).collect();
    format!("{kept}{marker}")
}

fn split_marker(content: &str) -> (&str, Option<usize>) {
    let Some(idx) = content.rfind(MARKER_OPEN) else {
        return (content, None);
    };
    let original = content[idx + MARKER_OPEN.len()..]
        .strip_suffix(" chars]")
        .and_then(|rest| rest.split_once(" chars -> "))
        .and_then(|(total, _)| total.parse().ok());
    match original {
        Some(total) => (&content[..idx], Some(total)),
        None => (content, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_core::ids::ToolCallId;

    fn tool(content: String) -> ChatMessage {
        ChatMessage::tool_result(ToolCallId::from_raw("c1"), content)
    }

    #[test]
    fn short_text_untouched() {
        assert_eq!(truncate_chars("abc", 5), "abc");
        assert_eq!(truncate_chars("abcde", 5), "abcde");
    }

    #[test]
    fn long_text_keeps_head_and_marker_within_limit() {
        let out = truncate_chars(&"a".repeat(100), 60);
        assert_eq!(out.chars().count(), 60);
        assert!(out.starts_with("aaaa"));
        assert!(out.ends_with("\n\n[truncated: 100 chars -> 60 chars]"));
    }

    #[test]
    fn tiny_limit_drops_marker() {
        assert_eq!(truncate_chars("abcdefgh", 3), "abc");
    }

    #[test]
    fn counts_characters_not_bytes() {
        let out = truncate_chars(&"é".repeat(100), 50);
        assert_eq!(out.chars().count(), 50);
        assert!(out.starts_with("éé"));
    }

    #[test]
    fn per_result_phase() {
        let limits = TruncationLimits::default();
        let out = cap_context(&[ChatMessage::user("q"), tool("x".repeat(5_000))], &limits);
        assert!(out[1].char_count() <= limits.per_result_chars);
        assert!(out[1].content.ends_with("[truncated: 5000 chars -> 2000 chars]"));
        assert_eq!(out[0].content, "q");
    }

    #[test]
    fn aggregate_phase_reduces_tool_results_only() {
        let limits = TruncationLimits::default();
        let user = ChatMessage::user("u".repeat(9_000));
        let messages = vec![user.clone(), tool("a".repeat(3_000)), tool("b".repeat(3_000))];
        let out = cap_context(&messages, &limits);

        assert_eq!(out[0], user);
        for m in &out[1..] {
            assert!(m.char_count() <= limits.reduced_result_chars);
            assert!(m.content.ends_with("[truncated: 3000 chars -> 500 chars]"));
        }
    }

    #[test]
    fn recapping_keeps_original_size() {
        let limits = TruncationLimits::default();
        let once = cap_context(&[tool("z".repeat(5_000))], &limits);
        let tighter = TruncationLimits {
            per_result_chars: 500,
            ..limits
        };
        let twice = cap_context(&once, &tighter);
        assert!(twice[0].char_count() <= 500);
        assert_eq!(twice[0].content.matches("[truncated:").count(), 1);
        assert!(twice[0].content.ends_with("[truncated: 5000 chars -> 500 chars]"));
    }

    #[test]
    fn non_tool_messages_never_truncated() {
        let limits = TruncationLimits {
            per_result_chars: 10,
            aggregate_chars: 10,
            reduced_result_chars: 5,
        };
        let messages = vec![
            ChatMessage::system("s".repeat(50)),
            ChatMessage::assistant("a".repeat(50)),
        ];
        assert_eq!(cap_context(&messages, &limits), messages);
    }
}
