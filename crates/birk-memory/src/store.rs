// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{MemoryError, MemoryFile, MemoryScope};

/// Filesystem-backed long-term memory store.
///
/// One file per memory, `<id>.md`, split across two scope directories.
/// Writers serialise at the filesystem level: every write goes to a sibling
/// temp file and is renamed into place, so readers observe either the
/// absent or the fully-written state, and a concurrent second writer for
/// the same id loses with [`MemoryError::AlreadyExists`].
#[derive(Debug)]
pub struct MemoryStore {
    repo_dir: PathBuf,
    user_dir: PathBuf,
}

impl MemoryStore {
    /// Open (and create, mode 0750) the two scope directories.
    pub fn open(
        repo_dir: impl Into<PathBuf>,
        user_dir: impl Into<PathBuf>,
    ) -> Result<Self, MemoryError> {
        let store = Self { repo_dir: repo_dir.into(), user_dir: user_dir.into() };
        create_scope_dir(&store.repo_dir)?;
        create_scope_dir(&store.user_dir)?;
        Ok(store)
    }

    fn scope_dir(&self, scope: MemoryScope) -> &Path {
        match scope {
            MemoryScope::Repo => &self.repo_dir,
            MemoryScope::User => &self.user_dir,
        }
    }

    /// Resolve the on-disk path for `id` in `scope`, rejecting ids that
    /// would escape the scope directory.
    fn resolve_path(&self, scope: MemoryScope, id: &str) -> Result<PathBuf, MemoryError> {
        validate_id(id)?;
        let dir = self.scope_dir(scope);
        let path = dir.join(format!("{id}.md"));
        if !path.starts_with(dir) {
            return Err(MemoryError::InvalidId(id.to_string()));
        }
        Ok(path)
    }

    /// Append-only write.  Refuses when the id already has a file in the
    /// target scope; otherwise writes atomically via temp-file-plus-rename.
    pub fn write(&self, mem: &MemoryFile) -> Result<PathBuf, MemoryError> {
        let path = self.resolve_path(mem.meta.scope, &mem.meta.id)?;
        if path.exists() {
            return Err(MemoryError::AlreadyExists(mem.meta.id.clone()));
        }

        let serialized = mem.serialize()?;
        let tmp = path.with_extension("md.tmp");
        std::fs::write(&tmp, serialized)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))?;
        }
        std::fs::rename(&tmp, &path)?;
        debug!(id = %mem.meta.id, path = %path.display(), "memory written");
        Ok(path)
    }

    /// Read by id, repo scope first, then user scope.
    ///
    /// A present-but-corrupt file is a hard [`MemoryError::Parse`]; only a
    /// file absent from both scopes is [`MemoryError::NotFound`].
    pub fn read(&self, id: &str) -> Result<MemoryFile, MemoryError> {
        validate_id(id)?;
        for scope in [MemoryScope::Repo, MemoryScope::User] {
            let path = self.resolve_path(scope, id)?;
            if !path.exists() {
                continue;
            }
            let text = std::fs::read_to_string(&path)?;
            return MemoryFile::parse(&text).map_err(|e| match e {
                MemoryError::Parse { reason, .. } => {
                    MemoryError::Parse { id: id.to_string(), reason }
                }
                other => other,
            });
        }
        Err(MemoryError::NotFound(id.to_string()))
    }

    pub fn exists(&self, id: &str) -> bool {
        [MemoryScope::Repo, MemoryScope::User]
            .into_iter()
            .any(|scope| self.resolve_path(scope, id).map(|p| p.exists()).unwrap_or(false))
    }

    /// List every readable memory in the given scope (or both).
    /// Corrupt files are skipped with a warning rather than failing the
    /// whole listing.
    pub fn list(&self, scope: Option<MemoryScope>) -> Result<Vec<MemoryFile>, MemoryError> {
        let scopes: &[MemoryScope] = match scope {
            Some(MemoryScope::Repo) => &[MemoryScope::Repo],
            Some(MemoryScope::User) => &[MemoryScope::User],
            None => &[MemoryScope::Repo, MemoryScope::User],
        };
        let mut out = Vec::new();
        for &s in scopes {
            let dir = self.scope_dir(s);
            for entry in std::fs::read_dir(dir)? {
                let path = entry?.path();
                if path.extension().and_then(|e| e.to_str()) != Some("md") {
                    continue;
                }
                let text = match std::fs::read_to_string(&path) {
                    Ok(t) => t,
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "skipping unreadable memory file");
                        continue;
                    }
                };
                match MemoryFile::parse(&text) {
                    Ok(m) => out.push(m),
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "skipping corrupt memory file");
                    }
                }
            }
        }
        Ok(out)
    }
}

/// Reject ids that could reach outside a scope directory.  Checked before
/// any filesystem operation.
fn validate_id(id: &str) -> Result<(), MemoryError> {
    if id.is_empty() || id.contains('/') || id.contains('\\') || id.contains("..") {
        return Err(MemoryError::InvalidId(id.to_string()));
    }
    Ok(())
}

fn create_scope_dir(dir: &Path) -> Result<(), MemoryError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        std::fs::DirBuilder::new()
            .recursive(true)
            .mode(0o750)
            .create(dir)
            .or_else(|e| {
                if e.kind() == std::io::ErrorKind::AlreadyExists {
                    Ok(())
                } else {
                    Err(e)
                }
            })?;
    }
    #[cfg(not(unix))]
    std::fs::create_dir_all(dir)?;
    Ok(())
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CaptureTrigger, MemoryCategory};

    fn test_store() -> (tempfile::TempDir, MemoryStore) {
        let dir = tempfile::tempdir().unwrap();
        let store =
            MemoryStore::open(dir.path().join("repo"), dir.path().join("user")).unwrap();
        (dir, store)
    }

    fn sample(scope: MemoryScope, body: &str) -> MemoryFile {
        MemoryFile::new(
            scope,
            MemoryCategory::ProjectConventions,
            "sess-t",
            CaptureTrigger::Cadence,
            body,
        )
    }

    // ── Write / read ─────────────────────────────────────────────────────────

    #[test]
    fn write_then_read_returns_equal_file() {
        let (_d, store) = test_store();
        let m = sample(MemoryScope::Repo, "convention body");
        store.write(&m).unwrap();
        let back = store.read(&m.meta.id).unwrap();
        assert_eq!(back, m);
    }

    #[test]
    fn read_searches_repo_scope_before_user_scope() {
        let (_d, store) = test_store();
        let m = sample(MemoryScope::User, "user-scope fact");
        store.write(&m).unwrap();
        let back = store.read(&m.meta.id).unwrap();
        assert_eq!(back.meta.scope, MemoryScope::User);
    }

    #[test]
    fn read_missing_is_not_found() {
        let (_d, store) = test_store();
        assert!(matches!(
            store.read("mem_missing"),
            Err(MemoryError::NotFound(_))
        ));
    }

    // ── Append-only ──────────────────────────────────────────────────────────

    #[test]
    fn second_write_with_same_id_fails_and_preserves_file() {
        let (_d, store) = test_store();
        let m = sample(MemoryScope::Repo, "original");
        store.write(&m).unwrap();

        let mut clone = m.clone();
        clone.body = "overwritten".into();
        assert!(matches!(
            store.write(&clone),
            Err(MemoryError::AlreadyExists(_))
        ));
        assert_eq!(store.read(&m.meta.id).unwrap().body, "original");
    }

    #[test]
    fn same_id_in_other_scope_is_a_distinct_file() {
        let (_d, store) = test_store();
        let mut repo = sample(MemoryScope::Repo, "repo body");
        store.write(&repo).unwrap();
        repo.meta.scope = MemoryScope::User;
        repo.body = "user body".into();
        store.write(&repo).unwrap();
        // Repo scope wins on read.
        assert_eq!(store.read(&repo.meta.id).unwrap().body, "repo body");
    }

    // ── Atomicity ────────────────────────────────────────────────────────────

    #[test]
    fn write_leaves_no_temp_file_behind() {
        let (_d, store) = test_store();
        let m = sample(MemoryScope::Repo, "body");
        let path = store.write(&m).unwrap();
        let tmp = path.with_extension("md.tmp");
        assert!(!tmp.exists());
        assert!(path.exists());
    }

    #[test]
    fn stale_temp_file_is_never_visible_to_read_or_list() {
        // Simulate a crash between temp-write and rename: a .tmp file exists
        // but the real file does not.  The store must treat the memory as
        // absent.
        let (_d, store) = test_store();
        let m = sample(MemoryScope::Repo, "half written");
        let path = store.resolve_path(MemoryScope::Repo, &m.meta.id).unwrap();
        std::fs::write(path.with_extension("md.tmp"), m.serialize().unwrap()).unwrap();

        assert!(matches!(store.read(&m.meta.id), Err(MemoryError::NotFound(_))));
        assert!(store.list(None).unwrap().is_empty());
        // A real write still goes through.
        store.write(&m).unwrap();
        assert_eq!(store.read(&m.meta.id).unwrap().body, "half written");
    }

    // ── Path safety ──────────────────────────────────────────────────────────

    #[test]
    fn traversal_ids_are_rejected() {
        let (_d, store) = test_store();
        for id in ["../evil", "a/b", "a\\b", "..", ""] {
            assert!(
                matches!(store.read(id), Err(MemoryError::InvalidId(_))),
                "id {id:?} must be rejected"
            );
        }
    }

    #[test]
    fn traversal_id_write_is_rejected_before_touching_disk() {
        let (dir, store) = test_store();
        let mut m = sample(MemoryScope::Repo, "escape attempt");
        m.meta.id = "../escape".into();
        assert!(matches!(store.write(&m), Err(MemoryError::InvalidId(_))));
        assert!(!dir.path().join("escape.md").exists());
    }

    // ── Listing ──────────────────────────────────────────────────────────────

    #[test]
    fn list_returns_files_from_both_scopes() {
        let (_d, store) = test_store();
        store.write(&sample(MemoryScope::Repo, "r")).unwrap();
        store.write(&sample(MemoryScope::User, "u")).unwrap();
        assert_eq!(store.list(None).unwrap().len(), 2);
        assert_eq!(store.list(Some(MemoryScope::Repo)).unwrap().len(), 1);
    }

    #[test]
    fn list_skips_corrupt_files_but_read_reports_them() {
        let (_d, store) = test_store();
        let good = sample(MemoryScope::Repo, "good");
        store.write(&good).unwrap();
        let bad_path = store.resolve_path(MemoryScope::Repo, "mem_corrupt").unwrap();
        std::fs::write(&bad_path, "no delimiter here").unwrap();

        let listed = store.list(None).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].meta.id, good.meta.id);

        assert!(matches!(
            store.read("mem_corrupt"),
            Err(MemoryError::Parse { .. })
        ));
    }

    // ── Permissions ──────────────────────────────────────────────────────────

    #[cfg(unix)]
    #[test]
    fn written_file_has_mode_0600() {
        use std::os::unix::fs::PermissionsExt;
        let (_d, store) = test_store();
        let m = sample(MemoryScope::Repo, "secret");
        let path = store.write(&m).unwrap();
        let mode = std::fs::metadata(path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }

    #[cfg(unix)]
    #[test]
    fn scope_directory_has_mode_0750() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let repo = dir.path().join("repo");
        let _ = MemoryStore::open(&repo, dir.path().join("user")).unwrap();
        let mode = std::fs::metadata(&repo).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o750);
    }
}
