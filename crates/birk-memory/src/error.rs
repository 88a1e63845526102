// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MemoryError {
    /// The id does not resolve to a file in either scope
    #[error("memory '{0}' not found")]
    NotFound(String),
    /// The store is append-only; the id already has a file in this scope
    #[error("memory '{0}' already exists")]
    AlreadyExists(String),
    /// The id carries path separators or traversal sequences
    #[error("invalid memory id '{0}'")]
    InvalidId(String),
    /// The file exists but its header or metadata cannot be decoded
    #[error("memory '{id}' is corrupt: {reason}")]
    Parse { id: String, reason: String },
    #[error("memory store I/O: {0}")]
    Io(#[from] std::io::Error),
}

impl MemoryError {
    /// Expected store outcomes that tools surface to the model rather than
    /// aborting the turn.
    pub fn is_expected(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::AlreadyExists(_))
    }
}
