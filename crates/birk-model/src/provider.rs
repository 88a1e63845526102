// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::{Message, StreamChunk};

pub type ChunkStream = Pin<Box<dyn Stream<Item = anyhow::Result<StreamChunk>> + Send>>;

/// Static facts about a provider/model combination.
#[derive(Debug, Clone)]
pub struct ModelInfo {
    /// Model identifier as reported to users
    pub name: String,
    /// Human-readable provider name
    pub provider: String,
    /// Context window size in tokens
    pub max_tokens: usize,
    pub supports_streaming: bool,
}

/// Contract the agent loop consumes.  Concrete HTTP transports implement
/// this outside the core; the crate ships deterministic mocks for tests.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Send a completion request and return a lazy chunk stream.  The stream
    /// runs until a `Done` or `Error` chunk.
    async fn stream_completion(&self, messages: Vec<Message>) -> anyhow::Result<ChunkStream>;

    /// One-shot completion: drains the stream into a single assistant
    /// message.  Providers with a cheaper non-streaming path override this.
    async fn complete(&self, messages: Vec<Message>) -> anyhow::Result<Message> {
        use futures::StreamExt;
        let mut stream = self.stream_completion(messages).await?;
        let mut text = String::new();
        while let Some(chunk) = stream.next().await {
            match chunk? {
                StreamChunk::TextDelta(delta) => text.push_str(&delta),
                StreamChunk::ToolCallDelta(delta) => text.push_str(&delta),
                StreamChunk::ThinkingDelta(_) => {}
                StreamChunk::Done { .. } => break,
                StreamChunk::Error(e) => anyhow::bail!("model stream error: {e}"),
            }
        }
        Ok(Message::assistant(text))
    }

    fn info(&self) -> ModelInfo;
}
