// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::tool::{Tool, ToolCall, ToolContext, ToolOutput};

/// Reply conversationally and end the turn.
///
/// For turns that need no work: greetings, acknowledgements, or answers the
/// model already knows.  Never registered in headless runs.
pub struct ConverseTool;

#[async_trait]
impl Tool for ConverseTool {
    fn name(&self) -> &str {
        "converse"
    }

    fn description(&self) -> &str {
        "Send a conversational reply to the user and end the turn.\n\
         Use for small talk and direct answers that require no tools.  For \
         completed work use task_completion instead."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "message": {
                    "type": "string",
                    "description": "The reply shown to the user"
                }
            },
            "required": ["message"]
        })
    }

    fn is_loop_breaking(&self) -> bool {
        true
    }

    async fn execute(&self, _ctx: &ToolContext, call: &ToolCall) -> ToolOutput {
        match call.args.require("message") {
            Ok(message) => ToolOutput::ok(message),
            Err(e) => ToolOutput::err(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::test_context;
    use crate::ToolArgs;

    #[tokio::test]
    async fn returns_message_unchanged() {
        let (_d, ctx) = test_context();
        let call = ToolCall {
            server: "local".into(),
            name: "converse".into(),
            args: ToolArgs::new("<message>Hello there!</message>"),
        };
        let out = ConverseTool.execute(&ctx, &call).await;
        assert!(!out.is_error);
        assert_eq!(out.content, "Hello there!");
    }

    #[tokio::test]
    async fn empty_message_is_invalid_input() {
        let (_d, ctx) = test_context();
        let call = ToolCall {
            server: "local".into(),
            name: "converse".into(),
            args: ToolArgs::new("<message></message>"),
        };
        let out = ConverseTool.execute(&ctx, &call).await;
        assert!(out.is_error);
    }
}
