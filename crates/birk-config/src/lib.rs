// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
mod loader;
mod logging;
mod schema;

pub use loader::load;
pub use logging::{init_tracing, log_session_id};
pub use schema::{AgentConfig, Config, HeadlessConfig, LoggingConfig, MemoryConfig};
