// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
mod mock;
mod provider;
mod types;

pub use mock::{MockProvider, ScriptedProvider};
pub use provider::{ChunkStream, ModelInfo, ModelProvider};
pub use types::{Message, Role, StreamChunk, TokenUsage};
