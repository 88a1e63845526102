// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::{HashMap, HashSet};

use chrono::Utc;
use tracing::warn;

use crate::{file::new_memory_id, CaptureTrigger, MemoryError, MemoryFile, MemoryStore};

/// Derive the next version of a memory.
///
/// The result shares scope and category with the predecessor, carries
/// `version + 1` and a `supersedes` edge back to it, and deep-copies the
/// related edges so the new file never aliases the predecessor's list.
/// The body starts empty: content belongs to the capture pass.
pub fn new_version(
    predecessor: &MemoryFile,
    session_id: impl Into<String>,
    trigger: CaptureTrigger,
) -> MemoryFile {
    let now = Utc::now();
    let mut meta = predecessor.meta.clone();
    meta.id = new_memory_id();
    meta.created_at = now;
    meta.updated_at = now;
    meta.version = predecessor.meta.version + 1;
    meta.supersedes = Some(predecessor.meta.id.clone());
    meta.related = predecessor.meta.related.clone();
    meta.session_id = session_id.into();
    meta.trigger = trigger;
    MemoryFile { meta, body: String::new() }
}

/// Walk backwards through `supersedes` edges starting at `id`.
///
/// Returns the chain oldest-first, including the starting file, with length
/// bounded by `max_depth`.  The bound is the cycle defence: a corrupted
/// chain that loops simply fills up to `max_depth` entries and stops.  A
/// dangling predecessor ends the walk at the last readable file.
pub fn version_chain(
    store: &MemoryStore,
    id: &str,
    max_depth: usize,
) -> Result<Vec<MemoryFile>, MemoryError> {
    let mut chain = Vec::new();
    let mut current = store.read(id)?;
    loop {
        let predecessor = current.meta.supersedes.clone();
        chain.push(current);
        if chain.len() >= max_depth {
            break;
        }
        match predecessor {
            None => break,
            Some(pred_id) => match store.read(&pred_id) {
                Ok(pred) => current = pred,
                Err(MemoryError::NotFound(_)) => {
                    warn!(id = %pred_id, "version chain ends at missing predecessor");
                    break;
                }
                Err(e) => return Err(e),
            },
        }
    }
    chain.reverse();
    Ok(chain)
}

/// Resolve the newest version reachable from `id`.
///
/// Builds a one-time `supersedes → successor` index over the whole store and
/// walks forward, stopping the first time a node repeats.  On a cyclic
/// chain this halts and returns a node within the cycle; a cycle is never
/// an error.
pub fn latest_version(store: &MemoryStore, id: &str) -> Result<MemoryFile, MemoryError> {
    // Make sure the starting point exists (and surface Parse/InvalidId).
    let start = store.read(id)?;

    let mut successors: HashMap<String, String> = HashMap::new();
    for mem in store.list(None)? {
        if let Some(pred) = mem.meta.supersedes {
            successors.insert(pred, mem.meta.id);
        }
    }

    let mut seen: HashSet<String> = HashSet::new();
    let mut current = start.meta.id.clone();
    seen.insert(current.clone());
    while let Some(next) = successors.get(&current) {
        if !seen.insert(next.clone()) {
            warn!(id = %next, "cycle in supersedes chain; returning last node before revisit");
            break;
        }
        current = next.clone();
    }

    if current == start.meta.id {
        Ok(start)
    } else {
        store.read(&current)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryCategory, MemoryScope};

    fn test_store() -> (tempfile::TempDir, MemoryStore) {
        let dir = tempfile::tempdir().unwrap();
        let store =
            MemoryStore::open(dir.path().join("repo"), dir.path().join("user")).unwrap();
        (dir, store)
    }

    fn seed(store: &MemoryStore, body: &str) -> MemoryFile {
        let m = MemoryFile::new(
            MemoryScope::Repo,
            MemoryCategory::Patterns,
            "sess-c",
            CaptureTrigger::Cadence,
            body,
        );
        store.write(&m).unwrap();
        m
    }

    // ── new_version ──────────────────────────────────────────────────────────

    #[test]
    fn new_version_links_back_and_bumps_version() {
        let (_d, store) = test_store();
        let v1 = seed(&store, "v1 body");
        let v2 = new_version(&v1, "sess-2", CaptureTrigger::Compaction);
        assert_eq!(v2.meta.version, 2);
        assert_eq!(v2.meta.supersedes.as_deref(), Some(v1.meta.id.as_str()));
        assert_eq!(v2.meta.scope, v1.meta.scope);
        assert_eq!(v2.meta.category, v1.meta.category);
        assert_ne!(v2.meta.id, v1.meta.id);
        assert!(v2.body.is_empty());
    }

    #[test]
    fn new_version_deep_copies_related_edges() {
        let (_d, store) = test_store();
        let mut v1 = MemoryFile::new(
            MemoryScope::Repo,
            MemoryCategory::Corrections,
            "sess-c",
            CaptureTrigger::Cadence,
            "v1",
        );
        v1.meta.related.push(crate::RelatedMemory {
            id: "mem_x".into(),
            relationship: crate::Relationship::Refines,
        });
        store.write(&v1).unwrap();

        let mut v2 = new_version(&v1, "sess-2", CaptureTrigger::Cadence);
        v2.meta.related.push(crate::RelatedMemory {
            id: "mem_y".into(),
            relationship: crate::Relationship::Contradicts,
        });
        // Mutating v2's edges must not touch v1's.
        assert_eq!(v1.meta.related.len(), 1);
        assert_eq!(v2.meta.related.len(), 2);
    }

    // ── version_chain ────────────────────────────────────────────────────────

    #[test]
    fn chain_returns_ancestors_oldest_first() {
        let (_d, store) = test_store();
        let v1 = seed(&store, "v1");
        let mut v2 = new_version(&v1, "sess-2", CaptureTrigger::Cadence);
        v2.body = "v2".into();
        store.write(&v2).unwrap();

        let chain = version_chain(&store, &v2.meta.id, 10).unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].meta.id, v1.meta.id);
        assert_eq!(chain[1].meta.id, v2.meta.id);
    }

    #[test]
    fn chain_is_bounded_by_max_depth() {
        let (_d, store) = test_store();
        let mut prev = seed(&store, "v1");
        for i in 2..=6 {
            let mut next = new_version(&prev, "sess", CaptureTrigger::Cadence);
            next.body = format!("v{i}");
            store.write(&next).unwrap();
            prev = next;
        }
        let chain = version_chain(&store, &prev.meta.id, 3).unwrap();
        assert_eq!(chain.len(), 3);
        // Newest is last.
        assert_eq!(chain[2].meta.id, prev.meta.id);
    }

    #[test]
    fn chain_with_cycle_halts_at_max_depth() {
        let (_d, store) = test_store();
        // Hand-build a two-cycle: a supersedes b, b supersedes a.
        let mut a = MemoryFile::new(
            MemoryScope::Repo,
            MemoryCategory::Patterns,
            "s",
            CaptureTrigger::Cadence,
            "a",
        );
        let mut b = MemoryFile::new(
            MemoryScope::Repo,
            MemoryCategory::Patterns,
            "s",
            CaptureTrigger::Cadence,
            "b",
        );
        a.meta.supersedes = Some(b.meta.id.clone());
        b.meta.supersedes = Some(a.meta.id.clone());
        store.write(&a).unwrap();
        store.write(&b).unwrap();

        let chain = version_chain(&store, &a.meta.id, 5).unwrap();
        assert_eq!(chain.len(), 5, "cycle walk must stop exactly at max_depth");
    }

    #[test]
    fn chain_survives_missing_predecessor() {
        let (_d, store) = test_store();
        let mut orphan = MemoryFile::new(
            MemoryScope::Repo,
            MemoryCategory::Patterns,
            "s",
            CaptureTrigger::Cadence,
            "orphan",
        );
        orphan.meta.supersedes = Some("mem_never-written".into());
        store.write(&orphan).unwrap();

        let chain = version_chain(&store, &orphan.meta.id, 10).unwrap();
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn chain_for_unknown_id_is_not_found() {
        let (_d, store) = test_store();
        assert!(matches!(
            version_chain(&store, "mem_ghost", 5),
            Err(MemoryError::NotFound(_))
        ));
    }

    // ── latest_version ───────────────────────────────────────────────────────

    #[test]
    fn latest_follows_supersedes_forward() {
        let (_d, store) = test_store();
        let v1 = seed(&store, "v1");
        let mut v2 = new_version(&v1, "sess", CaptureTrigger::Cadence);
        v2.body = "v2".into();
        store.write(&v2).unwrap();
        let mut v3 = new_version(&v2, "sess", CaptureTrigger::Cadence);
        v3.body = "v3".into();
        store.write(&v3).unwrap();

        assert_eq!(latest_version(&store, &v1.meta.id).unwrap().meta.id, v3.meta.id);
        assert_eq!(latest_version(&store, &v2.meta.id).unwrap().meta.id, v3.meta.id);
        assert_eq!(latest_version(&store, &v3.meta.id).unwrap().meta.id, v3.meta.id);
    }

    #[test]
    fn latest_on_cycle_halts_and_returns_cycle_member() {
        let (_d, store) = test_store();
        let mut a = MemoryFile::new(
            MemoryScope::Repo,
            MemoryCategory::Patterns,
            "s",
            CaptureTrigger::Cadence,
            "a",
        );
        let mut b = MemoryFile::new(
            MemoryScope::Repo,
            MemoryCategory::Patterns,
            "s",
            CaptureTrigger::Cadence,
            "b",
        );
        a.meta.supersedes = Some(b.meta.id.clone());
        b.meta.supersedes = Some(a.meta.id.clone());
        store.write(&a).unwrap();
        store.write(&b).unwrap();

        let tip = latest_version(&store, &a.meta.id).unwrap();
        assert!(
            tip.meta.id == a.meta.id || tip.meta.id == b.meta.id,
            "tip must be a node within the cycle"
        );
    }

    #[test]
    fn latest_of_tip_is_itself() {
        let (_d, store) = test_store();
        let only = seed(&store, "only");
        assert_eq!(latest_version(&store, &only.meta.id).unwrap(), only);
    }
}
