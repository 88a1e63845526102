// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::Utc;
use tracing::debug;

use crate::note::{normalize_tags, validate_content, Note, NoteError};

/// Process-wide counter appended to note ids so that two notes created in
/// the same nanosecond still get distinct ids.
static NOTE_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_note_id() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let seq = NOTE_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("note_{nanos}_{seq}")
}

#[derive(Debug, Clone)]
pub struct ListOptions {
    /// Only notes carrying this tag (compared lower-cased, trimmed)
    pub tag: Option<String>,
    pub include_scratched: bool,
    pub limit: usize,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self { tag: None, include_scratched: false, limit: 10 }
    }
}

#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Case-insensitive substring over content; empty matches all
    pub query: String,
    /// AND semantics: every tag must be present on the note
    pub tags: Vec<String>,
    pub include_scratched: bool,
    pub limit: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self { query: String::new(), tags: Vec::new(), include_scratched: false, limit: 10 }
    }
}

/// Session-scoped scratchpad of tagged notes.
///
/// Internally serialised with a readers/writer lock so the tool layer can
/// call it from concurrent executions.  All validation errors are returned,
/// never panicked.
#[derive(Debug, Default)]
pub struct NotesManager {
    notes: RwLock<HashMap<String, Note>>,
}

impl NotesManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, content: &str, tags: &[String]) -> Result<Note, NoteError> {
        validate_content(content)?;
        let tags = normalize_tags(tags)?;
        let now = Utc::now();
        let note = Note {
            id: next_note_id(),
            content: content.to_string(),
            tags,
            scratched: false,
            created_at: now,
            updated_at: now,
        };
        debug!(id = %note.id, tags = ?note.tags, "note added");
        self.notes.write().unwrap().insert(note.id.clone(), note.clone());
        Ok(note)
    }

    pub fn get(&self, id: &str) -> Result<Note, NoteError> {
        self.notes
            .read()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| NoteError::NotFound(id.to_string()))
    }

    /// Update content and/or tags; untouched fields keep their value.
    /// Bumps `updated_at` on success.
    pub fn update(
        &self,
        id: &str,
        content: Option<&str>,
        tags: Option<&[String]>,
    ) -> Result<Note, NoteError> {
        // Validate before taking the write lock so a failed update leaves the
        // note untouched.
        if let Some(c) = content {
            validate_content(c)?;
        }
        let normalized = match tags {
            Some(t) => Some(normalize_tags(t)?),
            None => None,
        };
        let mut notes = self.notes.write().unwrap();
        let note = notes
            .get_mut(id)
            .ok_or_else(|| NoteError::NotFound(id.to_string()))?;
        if let Some(c) = content {
            note.content = c.to_string();
        }
        if let Some(t) = normalized {
            note.tags = t;
        }
        note.updated_at = Utc::now();
        Ok(note.clone())
    }

    pub fn delete(&self, id: &str) -> Result<(), NoteError> {
        self.notes
            .write()
            .unwrap()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| NoteError::NotFound(id.to_string()))
    }

    /// Mark a note as addressed.  The note stays listed under
    /// `include_scratched` for audit.
    pub fn scratch(&self, id: &str) -> Result<Note, NoteError> {
        let mut notes = self.notes.write().unwrap();
        let note = notes
            .get_mut(id)
            .ok_or_else(|| NoteError::NotFound(id.to_string()))?;
        note.scratched = true;
        note.updated_at = Utc::now();
        Ok(note.clone())
    }

    pub fn list(&self, opts: &ListOptions) -> Vec<Note> {
        let tag = opts.tag.as_ref().map(|t| t.trim().to_lowercase());
        let notes = self.notes.read().unwrap();
        let mut out: Vec<Note> = notes
            .values()
            .filter(|n| opts.include_scratched || !n.scratched)
            .filter(|n| tag.as_ref().map(|t| n.tags.iter().any(|x| x == t)).unwrap_or(true))
            .cloned()
            .collect();
        sort_and_truncate(&mut out, opts.limit);
        out
    }

    pub fn search(&self, opts: &SearchOptions) -> Vec<Note> {
        let query = opts.query.to_lowercase();
        let tags: Vec<String> = opts
            .tags
            .iter()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        let notes = self.notes.read().unwrap();
        let mut out: Vec<Note> = notes
            .values()
            .filter(|n| opts.include_scratched || !n.scratched)
            .filter(|n| query.is_empty() || n.content.to_lowercase().contains(&query))
            .filter(|n| tags.iter().all(|t| n.tags.iter().any(|x| x == t)))
            .cloned()
            .collect();
        sort_and_truncate(&mut out, opts.limit);
        out
    }

    /// Sorted unique tags across non-scratched notes.
    pub fn list_tags(&self) -> Vec<String> {
        let notes = self.notes.read().unwrap();
        let mut tags: Vec<String> = notes
            .values()
            .filter(|n| !n.scratched)
            .flat_map(|n| n.tags.iter().cloned())
            .collect();
        tags.sort();
        tags.dedup();
        tags
    }

    pub fn count(&self) -> usize {
        self.notes.read().unwrap().len()
    }

    pub fn count_active(&self) -> usize {
        self.notes.read().unwrap().values().filter(|n| !n.scratched).count()
    }

    pub fn clear(&self) {
        self.notes.write().unwrap().clear();
    }
}

fn sort_and_truncate(notes: &mut Vec<Note>, limit: usize) {
    notes.sort_by(|a, b| {
        b.updated_at
            .cmp(&a.updated_at)
            // Stable order for equal timestamps: the counter suffix of the id
            // is process-wide increasing, so newer notes compare greater.
            .then_with(|| b.id.cmp(&a.id))
    });
    notes.truncate(limit);
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
