// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream;

use crate::{provider::ChunkStream, Message, ModelInfo, ModelProvider, StreamChunk, TokenUsage};

/// Deterministic mock provider for tests.  Echoes the last user message
/// back as the assistant response.
#[derive(Default)]
pub struct MockProvider;

#[async_trait]
impl ModelProvider for MockProvider {
    async fn stream_completion(&self, messages: Vec<Message>) -> anyhow::Result<ChunkStream> {
        let reply = messages
            .iter()
            .rev()
            .find(|m| matches!(m.role, crate::Role::User))
            .map(|m| m.content.as_str())
            .unwrap_or("[no input]")
            .to_string();

        let chunks: Vec<anyhow::Result<StreamChunk>> = vec![
            Ok(StreamChunk::TextDelta(format!("MOCK: {reply}"))),
            Ok(StreamChunk::Done {
                usage: Some(TokenUsage { prompt_tokens: 10, completion_tokens: 10 }),
            }),
        ];
        Ok(Box::pin(stream::iter(chunks)))
    }

    fn info(&self) -> ModelInfo {
        ModelInfo {
            name: "mock-model".into(),
            provider: "mock".into(),
            max_tokens: 128_000,
            supports_streaming: true,
        }
    }
}

/// A pre-scripted mock provider.  Each call to `stream_completion` pops the
/// next chunk script from the front of the queue.  This lets tests specify
/// exact chunk sequences – including tool-call markup – without network
/// access.
pub struct ScriptedProvider {
    scripts: Arc<Mutex<Vec<Vec<StreamChunk>>>>,
    max_tokens: usize,
    /// The last message list seen by this provider.  Written on each call so
    /// tests can inspect exactly what was sent.
    pub last_request: Arc<Mutex<Option<Vec<Message>>>>,
}

impl ScriptedProvider {
    /// Build a provider from a list of chunk scripts.  The outer `Vec` is
    /// the ordered list of calls; the inner `Vec` is the chunk sequence
    /// emitted for that call.
    pub fn new(scripts: Vec<Vec<StreamChunk>>) -> Self {
        Self {
            scripts: Arc::new(Mutex::new(scripts)),
            max_tokens: 128_000,
            last_request: Arc::new(Mutex::new(None)),
        }
    }

    /// Shrink the claimed context window (for context-manager tests).
    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Convenience: provider that always returns a single text reply.
    pub fn always_text(reply: impl Into<String>) -> Self {
        let r = reply.into();
        Self::new(vec![vec![
            StreamChunk::TextDelta(r),
            StreamChunk::Done {
                usage: Some(TokenUsage { prompt_tokens: 5, completion_tokens: 5 }),
            },
        ]])
    }

    /// Convenience: one turn that emits thinking, optional message text, and
    /// a tool-call block, followed by a clean end of stream.
    pub fn thinking_then_tool(
        thinking: impl Into<String>,
        text: impl Into<String>,
        tool_xml: impl Into<String>,
    ) -> Self {
        let text = text.into();
        let mut chunks = vec![StreamChunk::ThinkingDelta(thinking.into())];
        if !text.is_empty() {
            chunks.push(StreamChunk::TextDelta(text));
        }
        chunks.push(StreamChunk::ToolCallDelta(tool_xml.into()));
        chunks.push(StreamChunk::Done {
            usage: Some(TokenUsage { prompt_tokens: 5, completion_tokens: 5 }),
        });
        Self::new(vec![chunks])
    }

    /// Convenience: a tool-call turn followed by a second scripted turn.
    pub fn tool_then_script(tool_xml: impl Into<String>, second: Vec<StreamChunk>) -> Self {
        Self::new(vec![
            vec![
                StreamChunk::ToolCallDelta(tool_xml.into()),
                StreamChunk::Done { usage: None },
            ],
            second,
        ])
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    async fn stream_completion(&self, messages: Vec<Message>) -> anyhow::Result<ChunkStream> {
        *self.last_request.lock().unwrap() = Some(messages);
        let chunks = {
            let mut scripts = self.scripts.lock().unwrap();
            if scripts.is_empty() {
                // Default fallback when all scripts are consumed
                vec![
                    StreamChunk::TextDelta("[no more scripts]".into()),
                    StreamChunk::Done { usage: None },
                ]
            } else {
                scripts.remove(0)
            }
        };
        let wrapped: Vec<anyhow::Result<StreamChunk>> = chunks.into_iter().map(Ok).collect();
        Ok(Box::pin(stream::iter(wrapped)))
    }

    fn info(&self) -> ModelInfo {
        ModelInfo {
            name: "scripted-mock-model".into(),
            provider: "scripted-mock".into(),
            max_tokens: self.max_tokens,
            supports_streaming: true,
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
