// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use regex::Regex;

use birk_config::HeadlessConfig;

/// Limits a headless run carries: file-pattern allow/deny, a completion
/// token ceiling, and a wall-clock deadline.
///
/// One `Arc<Constraints>` is handed to the tools at registration and to the
/// loop; tools check paths, the loop checks budget and deadline between
/// iterations.  None of the checks alter the loop's contract.
#[derive(Debug)]
pub struct Constraints {
    allow: Vec<Regex>,
    deny: Vec<Regex>,
    max_total_tokens: u64,
    deadline: Option<Instant>,
    used_tokens: AtomicU64,
}

impl Constraints {
    pub fn from_config(cfg: &HeadlessConfig) -> Self {
        let compile = |patterns: &[String]| -> Vec<Regex> {
            patterns.iter().filter_map(|p| glob_to_regex(p)).collect()
        };
        Self {
            allow: compile(&cfg.allow_patterns),
            deny: compile(&cfg.deny_patterns),
            max_total_tokens: cfg.max_total_tokens,
            deadline: (cfg.wall_clock_secs > 0)
                .then(|| Instant::now() + Duration::from_secs(cfg.wall_clock_secs)),
            used_tokens: AtomicU64::new(0),
        }
    }

    /// Deny wins over allow; an empty allow list permits everything not
    /// denied.
    pub fn check_path(&self, path: &str) -> Result<(), String> {
        for re in &self.deny {
            if re.is_match(path) {
                return Err(format!("path '{path}' is denied by headless constraints"));
            }
        }
        if self.allow.is_empty() || self.allow.iter().any(|re| re.is_match(path)) {
            Ok(())
        } else {
            Err(format!("path '{path}' is outside the headless allow list"))
        }
    }

    pub fn record_completion_tokens(&self, n: u64) {
        self.used_tokens.fetch_add(n, Ordering::Relaxed);
    }

    pub fn tokens_exhausted(&self) -> bool {
        self.max_total_tokens > 0
            && self.used_tokens.load(Ordering::Relaxed) >= self.max_total_tokens
    }

    pub fn expired(&self) -> bool {
        self.deadline.map(|d| Instant::now() >= d).unwrap_or(false)
    }

    /// First violated limit, if any; checked by the loop between iterations.
    pub fn violation(&self) -> Option<String> {
        if self.expired() {
            return Some("headless wall-clock limit reached".into());
        }
        if self.tokens_exhausted() {
            return Some(format!(
                "headless token ceiling reached ({} tokens)",
                self.used_tokens.load(Ordering::Relaxed)
            ));
        }
        None
    }
}

/// Convert a simple shell glob pattern to a [`Regex`].
/// Only `*` (match anything) and `?` (match one char) are supported.
fn glob_to_regex(pattern: &str) -> Option<Regex> {
    let mut re = String::from("^");
    for ch in pattern.chars() {
        match ch {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            c => {
                for esc in regex::escape(&c.to_string()).chars() {
                    re.push(esc);
                }
            }
        }
    }
    re.push('$');
    Regex::new(&re).ok()
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn constraints(allow: &[&str], deny: &[&str]) -> Constraints {
        Constraints::from_config(&HeadlessConfig {
            allow_patterns: allow.iter().map(|s| s.to_string()).collect(),
            deny_patterns: deny.iter().map(|s| s.to_string()).collect(),
            ..HeadlessConfig::default()
        })
    }

    #[test]
    fn deny_beats_allow_for_same_pattern() {
        let c = constraints(&["src/*"], &["src/*"]);
        assert!(c.check_path("src/main.rs").is_err());
    }

    #[test]
    fn empty_allow_permits_everything_not_denied() {
        let c = constraints(&[], &["*.secret"]);
        assert!(c.check_path("notes.txt").is_ok());
        assert!(c.check_path("key.secret").is_err());
    }

    #[test]
    fn allow_list_restricts_paths() {
        let c = constraints(&["src/*", "tests/*"], &[]);
        assert!(c.check_path("src/lib.rs").is_ok());
        assert!(c.check_path("/etc/passwd").is_err());
    }

    #[test]
    fn question_mark_matches_exactly_one_char() {
        let c = constraints(&["file?.rs"], &[]);
        assert!(c.check_path("file1.rs").is_ok());
        assert!(c.check_path("file12.rs").is_err());
    }

    #[test]
    fn token_ceiling_trips_after_budget() {
        let c = Constraints::from_config(&HeadlessConfig {
            max_total_tokens: 100,
            ..HeadlessConfig::default()
        });
        assert!(!c.tokens_exhausted());
        c.record_completion_tokens(60);
        assert!(!c.tokens_exhausted());
        c.record_completion_tokens(40);
        assert!(c.tokens_exhausted());
        assert!(c.violation().unwrap().contains("token ceiling"));
    }

    #[test]
    fn zero_limits_never_trip() {
        let c = Constraints::from_config(&HeadlessConfig::default());
        c.record_completion_tokens(1_000_000);
        assert!(!c.tokens_exhausted());
        assert!(!c.expired());
        assert!(c.violation().is_none());
    }

    #[test]
    fn wall_clock_deadline_expires() {
        let c = Constraints::from_config(&HeadlessConfig {
            wall_clock_secs: 1,
            ..HeadlessConfig::default()
        });
        assert!(!c.expired());
        // Force past the deadline without sleeping a full second in tests:
        // a 1s limit from config is the smallest expressible, so just wait.
        std::thread::sleep(Duration::from_millis(1100));
        assert!(c.expired());
        assert!(c.violation().unwrap().contains("wall-clock"));
    }
}
