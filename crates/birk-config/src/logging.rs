// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::OnceLock;

use anyhow::Context;
use tracing_subscriber::{fmt, EnvFilter};

use crate::LoggingConfig;

static LOG_SESSION_ID: OnceLock<String> = OnceLock::new();

/// Process-wide log session identifier.
///
/// Created on first access and stable for the lifetime of the process; every
/// agent session in this process logs to the same session-addressed file.
pub fn log_session_id() -> &'static str {
    LOG_SESSION_ID.get_or_init(|| uuid::Uuid::new_v4().to_string())
}

/// Initialise the global tracing subscriber, writing to
/// `<log_dir>/<session_id>.log`.
///
/// Filter priority: `BIRK_LOG` env var, then `logging.filter` from config,
/// then `"info"`.  Call once at process startup; a second call fails because
/// the global subscriber is already set.
pub fn init_tracing(cfg: &LoggingConfig) -> anyhow::Result<()> {
    let dir = cfg.resolved_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("creating log directory {}", dir.display()))?;
    let path = dir.join(format!("{}.log", log_session_id()));
    let file = std::sync::Arc::new(
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("opening log file {}", path.display()))?,
    );

    let filter = EnvFilter::try_from_env("BIRK_LOG")
        .or_else(|_| {
            cfg.filter
                .as_deref()
                .map(EnvFilter::try_new)
                .unwrap_or_else(|| EnvFilter::try_new("info"))
        })
        .unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .with_writer(file)
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("installing tracing subscriber: {e}"))?;
    Ok(())
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
