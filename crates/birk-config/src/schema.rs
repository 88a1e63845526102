// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Hard cap on loop iterations within a single turn.  The loop stops
    /// cleanly when the cap is reached instead of erroring mid-task.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Consecutive responses without a valid tool call before the turn is
    /// declared stalled.  Each failure injects a corrective note into the
    /// next prompt's error-context section first.
    #[serde(default = "default_max_no_tool_failures")]
    pub max_no_tool_failures: u32,
    /// Fraction of the model context window at which summarisation fires
    /// (0.0–1.0).  Token counts are approximate; the margin below absorbs
    /// the estimation error.
    #[serde(default = "default_context_budget")]
    pub context_budget: f32,
    /// Extra window fraction summarised beyond the overshoot, so one
    /// summarisation pass buys several turns of headroom.
    #[serde(default = "default_summary_margin")]
    pub summary_margin: f32,
    /// Recent non-system messages never selected for summarisation.
    #[serde(default = "default_keep_recent")]
    pub keep_recent: usize,
    /// Per-tool-execution timeout in seconds.
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
    /// Per-provider-call timeout in seconds (streaming and summarisation).
    #[serde(default = "default_provider_timeout_secs")]
    pub provider_timeout_secs: u64,
    /// Maximum characters of a single tool result appended to the
    /// transcript; longer output is cut at a line boundary with an
    /// explicit omission notice.  0 disables truncation.
    #[serde(default = "default_tool_result_char_cap")]
    pub tool_result_char_cap: usize,
    /// Extra instructions appended to the built-in system prompt sections.
    #[serde(default)]
    pub custom_instructions: Option<String>,
    #[serde(default)]
    pub headless: HeadlessConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_no_tool_failures: default_max_no_tool_failures(),
            context_budget: default_context_budget(),
            summary_margin: default_summary_margin(),
            keep_recent: default_keep_recent(),
            tool_timeout_secs: default_tool_timeout_secs(),
            provider_timeout_secs: default_provider_timeout_secs(),
            tool_result_char_cap: default_tool_result_char_cap(),
            custom_instructions: None,
            headless: HeadlessConfig::default(),
        }
    }
}

/// Constraints applied only when the agent runs unattended.
///
/// The patterns are simple globs (`*` and `?`), matched against the paths a
/// tool touches.  An empty allow list permits everything not denied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeadlessConfig {
    #[serde(default)]
    pub allow_patterns: Vec<String>,
    #[serde(default)]
    pub deny_patterns: Vec<String>,
    /// Total completion-token ceiling for the run (0 = unlimited).
    #[serde(default)]
    pub max_total_tokens: u64,
    /// Wall-clock limit for the run in seconds (0 = unlimited).
    #[serde(default)]
    pub wall_clock_secs: u64,
}

impl Default for HeadlessConfig {
    fn default() -> Self {
        Self {
            allow_patterns: Vec::new(),
            deny_patterns: Vec::new(),
            max_total_tokens: 0,
            wall_clock_secs: 0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Repo-scope memory directory.  Defaults to `.birk/memory` under the
    /// current working directory.
    #[serde(default)]
    pub repo_dir: Option<PathBuf>,
    /// User-scope memory directory.  Defaults to
    /// `~/.local/share/birk/memory`.
    #[serde(default)]
    pub user_dir: Option<PathBuf>,
}

impl MemoryConfig {
    pub fn resolved_repo_dir(&self) -> PathBuf {
        self.repo_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(".birk/memory"))
    }

    pub fn resolved_user_dir(&self) -> PathBuf {
        self.user_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("/tmp"))
                .join("birk/memory")
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log directory; the session log file is `<dir>/<session_id>.log`.
    /// Defaults to `~/.local/share/birk/logs`.
    #[serde(default)]
    pub dir: Option<PathBuf>,
    /// Tracing filter directive, e.g. `"birk_core=debug,info"`.
    /// `BIRK_LOG` in the environment takes priority.
    #[serde(default)]
    pub filter: Option<String>,
}

impl LoggingConfig {
    pub fn resolved_dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("/tmp"))
                .join("birk/logs")
        })
    }
}

fn default_max_iterations() -> u32 {
    40
}

fn default_max_no_tool_failures() -> u32 {
    3
}

fn default_context_budget() -> f32 {
    0.7
}

fn default_summary_margin() -> f32 {
    0.1
}

fn default_keep_recent() -> usize {
    4
}

fn default_tool_timeout_secs() -> u64 {
    180
}

fn default_provider_timeout_secs() -> u64 {
    300
}

fn default_tool_result_char_cap() -> usize {
    40_000
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
