// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use birk_model::Message;

/// The ordered conversation transcript.
///
/// Append-only from the loop's perspective; summarisation is the only
/// writer that rewrites, and it only ever replaces a contiguous prefix.
/// Tool-role messages are stored as-is; remapping to user role happens in
/// the prompt builder, never here, because summarisation needs the real
/// roles.
#[derive(Debug, Default)]
pub struct ConversationMemory {
    messages: Vec<Message>,
}

impl ConversationMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, msg: Message) {
        self.messages.push(msg);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Approximate token count of the whole transcript.
    pub fn approx_tokens(&self) -> usize {
        self.messages.iter().map(|m| m.approx_tokens()).sum()
    }

    /// Replace the oldest `count` messages with a single summary message.
    /// `count` is clamped to the transcript length.
    pub fn replace_prefix(&mut self, count: usize, summary: Message) {
        let count = count.min(self.messages.len());
        let tail = self.messages.split_off(count);
        self.messages.clear();
        self.messages.push(summary);
        self.messages.extend(tail);
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
