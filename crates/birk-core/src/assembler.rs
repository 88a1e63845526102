// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use anyhow::Context;
use futures::StreamExt;

use birk_model::{ChunkStream, StreamChunk, TokenUsage};

use crate::events::{EventBus, EventPayload};

/// The three output regions plus everything a turn accumulated.
#[derive(Debug, Clone, Default)]
pub struct AssembledResponse {
    pub thinking: String,
    pub message: String,
    /// Tool-call markup, accumulated silently; the loop parses it after the
    /// stream ends
    pub tool_call: String,
    pub usage: Option<TokenUsage>,
    /// True when the stream ended on an `Error` chunk; the partial text
    /// above is what arrived before it
    pub errored: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Region {
    None,
    Thinking,
    Message,
    ToolCall,
}

/// Drain a provider stream, re-emitting region events in source order and
/// buffering the assembled text.
///
/// Regions are provider-signalled through the chunk variants; a region
/// start is emitted on its first delta and its end when the region switches
/// or the stream closes.  An `Error` chunk stops assembly: the error event
/// is emitted and the partial response is returned so the loop decides
/// whether to retry or abort.  A transport failure (an `Err` stream item)
/// is returned as an error after the same event emission.
pub async fn assemble(
    stream: &mut ChunkStream,
    bus: &EventBus,
) -> anyhow::Result<AssembledResponse> {
    let mut out = AssembledResponse::default();
    let mut region = Region::None;

    while let Some(item) = stream.next().await {
        let chunk = match item {
            Ok(c) => c,
            Err(e) => {
                close_region(bus, region);
                bus.emit(EventPayload::Error(format!("provider stream failed: {e}")));
                return Err(e).context("provider stream failed");
            }
        };
        match chunk {
            StreamChunk::ThinkingDelta(delta) => {
                switch_region(bus, &mut region, Region::Thinking);
                out.thinking.push_str(&delta);
                bus.emit(EventPayload::ThinkingDelta(delta));
            }
            StreamChunk::TextDelta(delta) => {
                switch_region(bus, &mut region, Region::Message);
                out.message.push_str(&delta);
                bus.emit(EventPayload::MessageDelta(delta));
            }
            StreamChunk::ToolCallDelta(delta) => {
                // No per-delta events for tool markup; the loop emits one
                // ToolCall event once the call is parsed.
                switch_region(bus, &mut region, Region::ToolCall);
                out.tool_call.push_str(&delta);
            }
            StreamChunk::Done { usage } => {
                close_region(bus, region);
                out.usage = usage;
                return Ok(out);
            }
            StreamChunk::Error(e) => {
                close_region(bus, region);
                bus.emit(EventPayload::Error(e));
                out.errored = true;
                return Ok(out);
            }
        }
    }

    // Stream ended without a Done chunk; treat like a clean close.
    close_region(bus, region);
    Ok(out)
}

fn switch_region(bus: &EventBus, current: &mut Region, next: Region) {
    if *current == next {
        return;
    }
    close_region(bus, *current);
    match next {
        Region::Thinking => bus.emit(EventPayload::ThinkingStarted),
        Region::Message => bus.emit(EventPayload::MessageStarted),
        Region::ToolCall | Region::None => {}
    }
    *current = next;
}

fn close_region(bus: &EventBus, region: Region) {
    match region {
        Region::Thinking => bus.emit(EventPayload::ThinkingEnded),
        Region::Message => bus.emit(EventPayload::MessageEnded),
        Region::ToolCall | Region::None => {}
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn chunk_stream(chunks: Vec<StreamChunk>) -> ChunkStream {
        let wrapped: Vec<anyhow::Result<StreamChunk>> = chunks.into_iter().map(Ok).collect();
        Box::pin(stream::iter(wrapped))
    }

    fn drain(rx: &mut tokio::sync::broadcast::Receiver<crate::Event>) -> Vec<EventPayload> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push(ev.payload);
        }
        out
    }

    #[tokio::test]
    async fn regions_get_start_content_end_events_in_order() {
        let bus = EventBus::new(64);
        let mut rx = bus.subscribe();
        let mut s = chunk_stream(vec![
            StreamChunk::ThinkingDelta("th".into()),
            StreamChunk::TextDelta("hello".into()),
            StreamChunk::TextDelta(" world".into()),
            StreamChunk::Done { usage: None },
        ]);
        let out = assemble(&mut s, &bus).await.unwrap();
        assert_eq!(out.thinking, "th");
        assert_eq!(out.message, "hello world");

        let events = drain(&mut rx);
        let tags: Vec<&str> = events
            .iter()
            .map(|p| match p {
                EventPayload::ThinkingStarted => "ts",
                EventPayload::ThinkingDelta(_) => "td",
                EventPayload::ThinkingEnded => "te",
                EventPayload::MessageStarted => "ms",
                EventPayload::MessageDelta(_) => "md",
                EventPayload::MessageEnded => "me",
                _ => "?",
            })
            .collect();
        assert_eq!(tags, vec!["ts", "td", "te", "ms", "md", "md", "me"]);
    }

    #[tokio::test]
    async fn tool_call_deltas_accumulate_without_delta_events() {
        let bus = EventBus::new(64);
        let mut rx = bus.subscribe();
        let mut s = chunk_stream(vec![
            StreamChunk::ToolCallDelta("<tool>".into()),
            StreamChunk::ToolCallDelta("</tool>".into()),
            StreamChunk::Done { usage: None },
        ]);
        let out = assemble(&mut s, &bus).await.unwrap();
        assert_eq!(out.tool_call, "<tool></tool>");
        let events = drain(&mut rx);
        assert!(events.is_empty(), "tool markup must not produce region events: {events:?}");
    }

    #[tokio::test]
    async fn usage_from_done_chunk_is_captured() {
        let bus = EventBus::new(16);
        let mut s = chunk_stream(vec![StreamChunk::Done {
            usage: Some(TokenUsage { prompt_tokens: 9, completion_tokens: 4 }),
        }]);
        let out = assemble(&mut s, &bus).await.unwrap();
        assert_eq!(out.usage.unwrap().total(), 13);
    }

    #[tokio::test]
    async fn error_chunk_stops_and_returns_partial() {
        let bus = EventBus::new(64);
        let mut rx = bus.subscribe();
        let mut s = chunk_stream(vec![
            StreamChunk::TextDelta("partial".into()),
            StreamChunk::Error("connection reset".into()),
            StreamChunk::TextDelta("never seen".into()),
        ]);
        let out = assemble(&mut s, &bus).await.unwrap();
        assert!(out.errored);
        assert_eq!(out.message, "partial");

        let events = drain(&mut rx);
        // The open message region is closed before the error event.
        assert!(matches!(events[events.len() - 2], EventPayload::MessageEnded));
        assert!(matches!(&events[events.len() - 1], EventPayload::Error(e) if e.contains("reset")));
    }

    #[tokio::test]
    async fn transport_failure_surfaces_as_error() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let items: Vec<anyhow::Result<StreamChunk>> =
            vec![Ok(StreamChunk::TextDelta("x".into())), Err(anyhow::anyhow!("socket closed"))];
        let mut s: ChunkStream = Box::pin(stream::iter(items));
        let err = assemble(&mut s, &bus).await.unwrap_err();
        assert!(err.to_string().contains("provider stream failed"));
        let events = drain(&mut rx);
        assert!(events.iter().any(|p| matches!(p, EventPayload::Error(_))));
    }

    #[tokio::test]
    async fn stream_without_done_closes_cleanly() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let mut s = chunk_stream(vec![StreamChunk::TextDelta("tail".into())]);
        let out = assemble(&mut s, &bus).await.unwrap();
        assert_eq!(out.message, "tail");
        let events = drain(&mut rx);
        assert!(matches!(events.last(), Some(EventPayload::MessageEnded)));
    }
}
