// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum characters in a note's content.
pub const MAX_CONTENT_LEN: usize = 800;
/// Maximum tags on a single note.
pub const MAX_TAGS: usize = 5;

/// One scratchpad note.  Notes live only for the process lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    pub content: String,
    /// 1..=5 tags, trimmed and lower-cased on the way in
    pub tags: Vec<String>,
    /// Addressed/obsolete flag; scratched notes are kept for audit but
    /// excluded from default listings
    pub scratched: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NoteError {
    #[error("note content must not be empty")]
    EmptyContent,
    #[error("note content exceeds {MAX_CONTENT_LEN} characters (got {0})")]
    ContentTooLong(usize),
    #[error("a note needs at least one tag")]
    NoTags,
    #[error("a note takes at most {MAX_TAGS} tags (got {0})")]
    TooManyTags(usize),
    #[error("tags must not be empty")]
    EmptyTag,
    #[error("no note with id '{0}'")]
    NotFound(String),
}

/// Validate content against the scratchpad invariants.
pub(crate) fn validate_content(content: &str) -> Result<(), NoteError> {
    if content.is_empty() {
        return Err(NoteError::EmptyContent);
    }
    let len = content.chars().count();
    if len > MAX_CONTENT_LEN {
        return Err(NoteError::ContentTooLong(len));
    }
    Ok(())
}

/// Trim and lower-case tags, rejecting empty results and bad counts.
pub(crate) fn normalize_tags(tags: &[String]) -> Result<Vec<String>, NoteError> {
    if tags.is_empty() {
        return Err(NoteError::NoTags);
    }
    if tags.len() > MAX_TAGS {
        return Err(NoteError::TooManyTags(tags.len()));
    }
    let mut out = Vec::with_capacity(tags.len());
    for tag in tags {
        let t = tag.trim().to_lowercase();
        if t.is_empty() {
            return Err(NoteError::EmptyTag);
        }
        out.push(t);
    }
    Ok(out)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_content_rejected() {
        assert_eq!(validate_content(""), Err(NoteError::EmptyContent));
    }

    #[test]
    fn content_at_limit_accepted() {
        let content = "x".repeat(MAX_CONTENT_LEN);
        assert!(validate_content(&content).is_ok());
    }

    #[test]
    fn content_over_limit_rejected() {
        let content = "x".repeat(MAX_CONTENT_LEN + 1);
        assert_eq!(
            validate_content(&content),
            Err(NoteError::ContentTooLong(MAX_CONTENT_LEN + 1))
        );
    }

    #[test]
    fn content_limit_counts_chars_not_bytes() {
        // 800 multibyte chars is exactly at the limit even though the byte
        // length is larger.
        let content = "ä".repeat(MAX_CONTENT_LEN);
        assert!(validate_content(&content).is_ok());
    }

    #[test]
    fn tags_are_trimmed_and_lowercased() {
        let tags = normalize_tags(&["  Architecture ".into(), "AUTH".into()]).unwrap();
        assert_eq!(tags, vec!["architecture", "auth"]);
    }

    #[test]
    fn no_tags_rejected() {
        assert_eq!(normalize_tags(&[]), Err(NoteError::NoTags));
    }

    #[test]
    fn six_tags_rejected() {
        let tags: Vec<String> = (0..6).map(|i| format!("t{i}")).collect();
        assert_eq!(normalize_tags(&tags), Err(NoteError::TooManyTags(6)));
    }

    #[test]
    fn whitespace_only_tag_rejected() {
        assert_eq!(normalize_tags(&["   ".into()]), Err(NoteError::EmptyTag));
    }
}
