// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::tool::{Tool, ToolCall, ToolContext, ToolOutput};

/// Maximum answer suggestions attached to a question.
const MAX_SUGGESTIONS: usize = 4;

/// Ask the user a question and end the turn.
///
/// The question text is returned unchanged; optional suggestions travel in
/// the output metadata so the embedding UI can render them as choices.
/// Never registered in headless runs.
pub struct AskQuestionTool;

#[async_trait]
impl Tool for AskQuestionTool {
    fn name(&self) -> &str {
        "ask_question"
    }

    fn description(&self) -> &str {
        "Ask the user a clarifying question and end the turn.\n\
         Use when you genuinely cannot proceed without input.  Provide up to \
         4 `suggestion` elements with likely answers so the user can pick one \
         instead of typing."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "question": {
                    "type": "string",
                    "description": "The question to put to the user"
                },
                "suggestions": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "0-4 suggested answers (as repeated <suggestion> elements)",
                    "maxItems": MAX_SUGGESTIONS
                }
            },
            "required": ["question"]
        })
    }

    fn is_loop_breaking(&self) -> bool {
        true
    }

    async fn execute(&self, _ctx: &ToolContext, call: &ToolCall) -> ToolOutput {
        let question = match call.args.require("question") {
            Ok(q) => q,
            Err(e) => return ToolOutput::err(e.to_string()),
        };

        let suggestions: Vec<String> = call
            .args
            .get_all("suggestion")
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if suggestions.len() > MAX_SUGGESTIONS {
            return ToolOutput::err(format!(
                "at most {MAX_SUGGESTIONS} suggestions are allowed (got {})",
                suggestions.len()
            ));
        }

        debug!(suggestions = suggestions.len(), "ask_question tool");

        let mut out = ToolOutput::ok(question);
        if !suggestions.is_empty() {
            out = out.with_meta("suggestions", suggestions.join("\n"));
        }
        out
    }
}
