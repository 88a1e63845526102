// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;

use birk_memory::MemoryStore;
use birk_notes::NotesManager;

use crate::ToolContext;

/// Fresh context over empty stores in a temp directory.  Keep the TempDir
/// alive for the duration of the test.
pub(crate) fn test_context() -> (tempfile::TempDir, ToolContext) {
    let dir = tempfile::tempdir().unwrap();
    let memory = MemoryStore::open(dir.path().join("repo"), dir.path().join("user")).unwrap();
    let ctx = ToolContext::new("sess-test", Arc::new(NotesManager::new()), Arc::new(memory));
    (dir, ctx)
}
