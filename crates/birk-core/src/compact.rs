// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;

use anyhow::Context;
use tracing::debug;

use birk_model::{Message, ModelProvider, Role};

use crate::conversation::ConversationMemory;

/// Instruction for the summarisation model.  Information density matters
/// more than brevity: the summary replaces real history.
pub const SUMMARIZE_PROMPT: &str =
    "You are a context compaction assistant. Summarise the following conversation history \
     in a concise, information-dense way. Preserve all technical details, decisions, file \
     names, code snippets, and tool outputs that may be relevant to future work. \
     The summary will replace the original history to free up context space.";

/// Keeps the prompt under the model's token ceiling by summarising the
/// oldest complete turns into a single system-role synopsis.
pub struct ContextManager {
    summarizer: Arc<dyn ModelProvider>,
    /// Context window of the main model, in tokens
    window: usize,
    /// Fraction of the window at which summarisation fires
    budget: f32,
    /// Extra window fraction summarised beyond the overshoot
    margin: f32,
    /// Trailing messages never selected for summarisation
    keep_recent: usize,
}

impl ContextManager {
    pub fn new(
        summarizer: Arc<dyn ModelProvider>,
        window: usize,
        budget: f32,
        margin: f32,
        keep_recent: usize,
    ) -> Self {
        Self { summarizer, window, budget, margin, keep_recent }
    }

    /// Swap in a distinct (usually cheaper) summarisation model.
    pub fn set_summarizer(&mut self, summarizer: Arc<dyn ModelProvider>) {
        self.summarizer = summarizer;
    }

    /// Tokens at which summarisation fires.
    pub fn threshold_tokens(&self) -> usize {
        (self.window as f32 * self.budget) as usize
    }

    /// Summarise the oldest turns when `prompt_tokens` exceeds the budget.
    ///
    /// Returns the number of replaced messages, 0 when nothing was done.
    /// The selected prefix always ends at a turn boundary (just before a
    /// user message) so tool results are never orphaned from their calls.
    /// A summariser failure leaves the conversation untouched.
    pub async fn evaluate_and_summarize(
        &self,
        conversation: &mut ConversationMemory,
        prompt_tokens: usize,
    ) -> anyhow::Result<usize> {
        let threshold = self.threshold_tokens();
        if threshold == 0 || prompt_tokens <= threshold {
            return Ok(0);
        }
        let target =
            prompt_tokens - threshold + (self.window as f32 * self.margin) as usize;

        let messages = conversation.messages();
        let max_prefix = messages.len().saturating_sub(self.keep_recent);
        if max_prefix == 0 {
            return Ok(0);
        }

        // Accumulate the oldest messages until their tokens cover the
        // overshoot plus the margin, then extend to the next turn boundary.
        let mut count = 0usize;
        let mut tokens = 0usize;
        for m in &messages[..max_prefix] {
            count += 1;
            tokens += m.approx_tokens();
            if tokens >= target {
                break;
            }
        }
        while count < max_prefix && messages[count].role != Role::User {
            count += 1;
        }
        if count == 0 {
            return Ok(0);
        }

        debug!(count, tokens, target, "summarising conversation prefix");

        let history = serialize_history(&messages[..count]);
        let request = vec![
            Message::system(SUMMARIZE_PROMPT),
            Message::user(history),
        ];
        let reply = self
            .summarizer
            .complete(request)
            .await
            .context("summarisation request failed")?;
        if reply.content.trim().is_empty() {
            anyhow::bail!("summarisation model returned an empty summary");
        }

        let synopsis = Message::system(format!(
            "[Summary of {count} earlier messages]\n{}",
            reply.content
        ));
        conversation.replace_prefix(count, synopsis);
        Ok(count)
    }
}

/// Serialise messages into role-labelled plain text for the summarisation
/// prompt.  System messages carry no conversation state and are skipped.
fn serialize_history(messages: &[Message]) -> String {
    messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| {
            let role = match m.role {
                Role::User => "User",
                Role::Assistant => "Assistant",
                Role::Tool => "Tool",
                Role::System => "System",
            };
            format!("{role}: {}", m.content)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
