// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use birk_memory::MemoryStore;
use birk_notes::NotesManager;

use crate::{Constraints, ToolArgs};

/// A single tool invocation parsed from model output.
#[derive(Debug, Clone)]
pub struct ToolCall {
    /// Routing target; `"local"` unless the model says otherwise
    pub server: String,
    pub name: String,
    /// Raw argument payload; the tool decodes it on its own terms
    pub args: ToolArgs,
}

/// The result of executing a tool: the text reflected to the model, an
/// optional structured side-channel for observers, and the error flag.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub content: String,
    pub meta: Option<HashMap<String, String>>,
    /// True when the execution failed non-fatally (the message is reflected
    /// to the model so it can correct itself)
    pub is_error: bool,
}

impl ToolOutput {
    pub fn ok(content: impl Into<String>) -> Self {
        Self { content: content.into(), meta: None, is_error: false }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self { content: msg.into(), meta: None, is_error: true }
    }

    /// Attach a metadata entry, creating the map on first use.
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }
}

/// Human-readable description of what a tool is about to do, for embedding
/// UIs that gate execution on approval.  Headless runs never consult it.
#[derive(Debug, Clone)]
pub struct Preview {
    pub title: String,
    pub body: String,
}

/// Read handles the loop injects into every execution.
///
/// Tools borrow the state subsystems through this context; none of them own
/// the stores.  `constraints` is present only in headless runs.
#[derive(Clone)]
pub struct ToolContext {
    pub session_id: String,
    pub notes: Arc<NotesManager>,
    pub memory: Arc<MemoryStore>,
    pub constraints: Option<Arc<Constraints>>,
}

impl ToolContext {
    pub fn new(
        session_id: impl Into<String>,
        notes: Arc<NotesManager>,
        memory: Arc<MemoryStore>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            notes,
            memory,
            constraints: None,
        }
    }

    pub fn with_constraints(mut self, constraints: Arc<Constraints>) -> Self {
        self.constraints = Some(constraints);
        self
    }
}

/// Trait every built-in and externally-registered capability implements.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON Schema describing the argument elements (typed leaves plus a
    /// `required` list); the prompt builder renders it into the XML
    /// invocation template shown to the model.
    fn schema(&self) -> Value;
    /// A successful execution of a loop-breaking tool ends the turn.
    fn is_loop_breaking(&self) -> bool {
        false
    }
    /// Visibility predicate, evaluated per prompt build.
    fn should_show(&self, ctx: &ToolContext) -> bool {
        let _ = ctx;
        true
    }
    /// Optional approval preview for embedding UIs.
    fn generate_preview(&self, args: &ToolArgs) -> Option<Preview> {
        let _ = args;
        None
    }
    /// Execute the call.  Failures are returned via [`ToolOutput::err`],
    /// never panicked.
    async fn execute(&self, ctx: &ToolContext, call: &ToolCall) -> ToolOutput;
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::test_context;
    use serde_json::json;

    struct MinimalTool;

    #[async_trait]
    impl Tool for MinimalTool {
        fn name(&self) -> &str {
            "minimal"
        }
        fn description(&self) -> &str {
            "a minimal tool"
        }
        fn schema(&self) -> Value {
            json!({ "type": "object" })
        }
        async fn execute(&self, _ctx: &ToolContext, _call: &ToolCall) -> ToolOutput {
            ToolOutput::ok("ok")
        }
    }

    #[test]
    fn tool_defaults_are_not_loop_breaking_and_visible() {
        let (_d, ctx) = test_context();
        let t = MinimalTool;
        assert!(!t.is_loop_breaking());
        assert!(t.should_show(&ctx));
        assert!(t.generate_preview(&ToolArgs::default()).is_none());
    }

    #[test]
    fn output_constructors_set_error_flag() {
        assert!(!ToolOutput::ok("fine").is_error);
        assert!(ToolOutput::err("broken").is_error);
    }

    #[test]
    fn with_meta_accumulates_entries() {
        let out = ToolOutput::ok("x").with_meta("a", "1").with_meta("b", "2");
        let meta = out.meta.unwrap();
        assert_eq!(meta.len(), 2);
        assert_eq!(meta.get("a").map(String::as_str), Some("1"));
    }
}
