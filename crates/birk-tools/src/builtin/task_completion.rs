// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::tool::{Tool, ToolCall, ToolContext, ToolOutput};

/// Signals that the task is finished.  The `result` text is handed back to
/// the caller unchanged and the turn ends.
pub struct TaskCompletionTool;

#[async_trait]
impl Tool for TaskCompletionTool {
    fn name(&self) -> &str {
        "task_completion"
    }

    fn description(&self) -> &str {
        "End the turn and report the final result of the task.\n\
         Call this exactly once, when the work is done.  `result` must contain \
         the complete answer or summary of what was accomplished; the user \
         sees this text and nothing else from the turn."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "result": {
                    "type": "string",
                    "description": "Final answer or summary of the completed work"
                }
            },
            "required": ["result"]
        })
    }

    fn is_loop_breaking(&self) -> bool {
        true
    }

    async fn execute(&self, _ctx: &ToolContext, call: &ToolCall) -> ToolOutput {
        match call.args.require("result") {
            Ok(result) => {
                debug!(len = result.len(), "task_completion tool");
                ToolOutput::ok(result)
            }
            Err(e) => ToolOutput::err(e.to_string()),
        }
    }
}
