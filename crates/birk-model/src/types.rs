use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// ─── Message types ────────────────────────────────────────────────────────────

/// A single message in the conversation transcript.
///
/// `meta` carries opaque annotations (e.g. the name of the tool a tool-role
/// message came from); it never reaches the provider wire format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<HashMap<String, String>>,
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self { role: Role::System, content: text.into(), meta: None }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self { role: Role::User, content: text.into(), meta: None }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: text.into(), meta: None }
    }

    pub fn tool(text: impl Into<String>) -> Self {
        Self { role: Role::Tool, content: text.into(), meta: None }
    }

    /// Attach a metadata entry, creating the map on first use.
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// Approximate token count used for context management.
    ///
    /// 4-chars-per-token heuristic; correctness of the context manager does
    /// not depend on exactness.
    pub fn approx_tokens(&self) -> usize {
        (self.content.len() / 4).max(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

// ─── Streaming types ──────────────────────────────────────────────────────────

/// One streamed chunk from the model, in source order.
///
/// The provider signals the output region through the variant: thinking,
/// message text, and tool-call markup arrive on distinct variants so the
/// assembler never has to infer region boundaries from sentinel tokens.
#[derive(Debug, Clone)]
pub enum StreamChunk {
    /// A message-text delta
    TextDelta(String),
    /// A thinking/reasoning delta
    ThinkingDelta(String),
    /// A tool-call markup delta (`<tool>...</tool>` text)
    ToolCallDelta(String),
    /// The stream finished normally, with final usage when known
    Done { usage: Option<TokenUsage> },
    /// The stream failed; the assembler stops and returns the partial text
    Error(String),
}

/// Token usage from one completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_user_sets_role_and_text() {
        let m = Message::user("hello");
        assert_eq!(m.role, Role::User);
        assert_eq!(m.content, "hello");
    }

    #[test]
    fn message_tool_sets_tool_role() {
        let m = Message::tool("output");
        assert_eq!(m.role, Role::Tool);
    }

    #[test]
    fn with_meta_creates_and_inserts() {
        let m = Message::tool("x").with_meta("tool", "task_completion");
        assert_eq!(
            m.meta.unwrap().get("tool").map(String::as_str),
            Some("task_completion")
        );
    }

    #[test]
    fn approx_tokens_divides_by_four() {
        assert_eq!(Message::user("12345678").approx_tokens(), 2);
    }

    #[test]
    fn approx_tokens_minimum_is_one() {
        assert_eq!(Message::user("").approx_tokens(), 1);
    }

    #[test]
    fn usage_total_sums_both_sides() {
        let u = TokenUsage { prompt_tokens: 100, completion_tokens: 20 };
        assert_eq!(u.total(), 120);
    }

    #[test]
    fn message_serialises_and_deserialises() {
        let original = Message::assistant("payload");
        let json = serde_json::to_string(&original).unwrap();
        assert!(!json.contains("meta"), "absent meta must be skipped: {json}");
        let decoded: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.role, Role::Assistant);
        assert_eq!(decoded.content, "payload");
    }
}
