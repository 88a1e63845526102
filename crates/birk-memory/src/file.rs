// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::MemoryError;

/// Which directory partition a memory file lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryScope {
    /// Per-repository memory
    Repo,
    /// Per-user memory
    User,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MemoryCategory {
    CodingPreferences,
    ProjectConventions,
    ArchitecturalDecisions,
    UserFacts,
    Corrections,
    Patterns,
}

/// What caused the capture pass that produced a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureTrigger {
    /// Periodic capture
    Cadence,
    /// Capture under context pressure
    Compaction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Relationship {
    Supersedes,
    Refines,
    Contradicts,
    RelatesTo,
}

/// A typed edge to another memory file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedMemory {
    pub id: String,
    pub relationship: Relationship,
}

/// The YAML header of a memory file.  Field order here is the on-disk key
/// order; serde_yaml emits struct fields deterministically in declaration
/// order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryMetadata {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// ≥ 1; bumped through `new_version`, never in place
    pub version: u32,
    pub scope: MemoryScope,
    pub category: MemoryCategory,
    /// Direct predecessor in the version chain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supersedes: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related: Vec<RelatedMemory>,
    pub session_id: String,
    pub trigger: CaptureTrigger,
}

/// One long-term memory: metadata header plus a free-text body.
/// Immutable after first write; new knowledge becomes a new version.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryFile {
    pub meta: MemoryMetadata,
    pub body: String,
}

impl MemoryFile {
    /// Fresh version-1 memory with a generated id.
    pub fn new(
        scope: MemoryScope,
        category: MemoryCategory,
        session_id: impl Into<String>,
        trigger: CaptureTrigger,
        body: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            meta: MemoryMetadata {
                id: new_memory_id(),
                created_at: now,
                updated_at: now,
                version: 1,
                scope,
                category,
                supersedes: None,
                related: Vec::new(),
                session_id: session_id.into(),
                trigger,
            },
            body: body.into(),
        }
    }

    /// Serialise to the on-disk format: `---`, YAML header, `---`, blank
    /// line, body verbatim.
    pub fn serialize(&self) -> Result<String, MemoryError> {
        let yaml = serde_yaml::to_string(&self.meta).map_err(|e| MemoryError::Parse {
            id: self.meta.id.clone(),
            reason: e.to_string(),
        })?;
        Ok(format!("---\n{yaml}---\n\n{}", self.body))
    }

    /// Parse the on-disk format.  The body is recovered byte-identical;
    /// exactly one blank line after the closing delimiter is consumed as
    /// formatting, everything beyond it belongs to the body.
    pub fn parse(text: &str) -> Result<Self, MemoryError> {
        let corrupt = |reason: &str| MemoryError::Parse {
            id: String::new(),
            reason: reason.to_string(),
        };

        // The header must start at the very first byte.
        let header = text
            .strip_prefix("---\n")
            .ok_or_else(|| corrupt("missing opening '---' delimiter"))?;

        // Find the closing "---" on its own line.
        let close_unix = header.find("\n---\n");
        let close_crlf = header.find("\n---\r\n");
        let (yaml_end, delim_len) = match (close_unix, close_crlf) {
            (Some(u), Some(c)) if u <= c => (u, "\n---\n".len()),
            (_, Some(c)) => (c, "\n---\r\n".len()),
            (Some(u), _) => (u, "\n---\n".len()),
            (None, None) => return Err(corrupt("missing closing '---' delimiter")),
        };

        let yaml_src = &header[..yaml_end];
        let mut body = &header[yaml_end + delim_len..];
        if let Some(rest) = body.strip_prefix('\n') {
            body = rest;
        }

        let meta: MemoryMetadata = serde_yaml::from_str(yaml_src).map_err(|e| MemoryError::Parse {
            id: String::new(),
            reason: e.to_string(),
        })?;

        Ok(Self { meta, body: body.to_string() })
    }
}

pub(crate) fn new_memory_id() -> String {
    format!("mem_{}", uuid::Uuid::new_v4())
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
