// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

/// One observation of the agent loop.
///
/// An event is transient; it never lands in the transcript.  `meta` carries
/// optional annotations (e.g. an approval preview attached to a tool call).
#[derive(Debug, Clone)]
pub struct Event {
    pub payload: EventPayload,
    pub at: DateTime<Utc>,
    pub meta: Option<HashMap<String, String>>,
}

impl Event {
    pub fn new(payload: EventPayload) -> Self {
        Self { payload, at: Utc::now(), meta: None }
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }
}

/// Everything the loop reports during a turn.
/// Consumers (UIs, CI drivers, loggers) match on the tag.
#[derive(Debug, Clone)]
pub enum EventPayload {
    /// First thinking delta of a region arrived
    ThinkingStarted,
    ThinkingDelta(String),
    ThinkingEnded,
    /// First message-text delta of a region arrived
    MessageStarted,
    MessageDelta(String),
    MessageEnded,
    /// A tool call was parsed and is about to execute
    ToolCall { server: String, name: String },
    /// A tool finished successfully
    ToolResult { name: String, output: String },
    /// A tool failed, or the call could not be parsed/resolved
    /// (`name` is empty for parse failures)
    ToolError { name: String, error: String },
    /// The response carried no tool call
    NoToolCall,
    ApiCallStarted { prompt_tokens: usize, budget: usize },
    ApiCallEnded,
    TokenUsage { prompt: u32, completion: u32, total: u32 },
    /// The turn is over; nothing further is emitted for it
    TurnEnded,
    /// Infrastructure failure (provider, timeout)
    Error(String),
    /// The loop started or stopped working
    BusyChanged(bool),
}

/// Single-producer, multi-subscriber ordered event stream.
///
/// The agent loop is the sole producer.  Built on a broadcast channel:
/// emission never blocks, and a subscriber that falls behind loses the
/// oldest events (`RecvError::Lagged`) rather than stalling the loop.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    pub fn emit(&self, payload: EventPayload) {
        self.emit_event(Event::new(payload));
    }

    /// Send an event with pre-built metadata.  A send with no subscribers is
    /// not an error: headless embedders may not observe at all.
    pub fn emit_event(&self, event: Event) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
