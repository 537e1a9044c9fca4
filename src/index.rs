//! The index builder (spec §4.2): scans a replica's current state,
//! compares it against the persisted index, and produces an updated
//! index with deletions, creations, and modifications appended as new
//! version entries.
//!
//! Grounded on `fspulse`'s `dirscan`/`scan_machine` control flow (scan the
//! tree, compare against what was previously recorded, classify each path
//! as unchanged/modified/deleted/new) generalized from a sqlite-backed
//! scan table to a single JSON document per replica (spec §6.2).

use std::collections::HashMap;

use log::{debug, info, warn};

use crate::error::{BisyncError, BisyncResult};
use crate::model::{Entry, History};
use crate::source::{index_path, is_excluded_path, staged_path, Source, STAGING_SUFFIX};

/// A replica's full index: every tracked path's history.
pub type Index = HashMap<String, History>;

/// Loads the index persisted at `.bisync/index` on `source`. Returns an
/// empty index if no index has ever been persisted there (spec §4.2,
/// first sync). A present-but-unparseable document is `CorruptIndex`.
pub fn load_index(source: &dyn Source) -> BisyncResult<Index> {
    let path = index_path();
    let exists = source
        .exists(&path)
        .map_err(|e| BisyncError::SourceIoError {
            replica: source.name().to_string(),
            path: path.clone(),
            source: e,
        })?;
    if !exists {
        debug!("{}: no persisted index at '{}', starting empty", source.name(), path);
        return Ok(HashMap::new());
    }

    let bytes = source
        .read_memory(&path)
        .map_err(|e| BisyncError::SourceIoError {
            replica: source.name().to_string(),
            path: path.clone(),
            source: e,
        })?;

    let raw: HashMap<String, History> =
        serde_json::from_slice(&bytes).map_err(|e| BisyncError::CorruptIndex {
            replica: source.name().to_string(),
            source: e,
        })?;

    for (path, history) in &raw {
        if let Err(message) = history.check_well_formed() {
            return Err(BisyncError::invariant(source.name(), path.clone(), message));
        }
    }

    Ok(raw)
}

/// Persists `index` to `.bisync/index` via the staged-write pattern (spec
/// §4.2.1, §6.3): write the full document to `index~bisync`, then rename
/// it onto `index`. A reader never observes a partially written document.
pub fn persist_index(source: &dyn Source, index: &Index) -> BisyncResult<()> {
    let path = index_path();
    let staged = staged_path(&path);

    let bytes = serde_json::to_vec(index).map_err(|e| BisyncError::CorruptIndex {
        replica: source.name().to_string(),
        source: e,
    })?;

    source
        .write_memory(&staged, &bytes)
        .map_err(|e| BisyncError::SourceIoError {
            replica: source.name().to_string(),
            path: staged.clone(),
            source: e,
        })?;

    source
        .rename(&staged, &path)
        .map_err(|e| BisyncError::SourceIoError {
            replica: source.name().to_string(),
            path,
            source: e,
        })?;

    Ok(())
}

/// Removes any leftover `*~bisync` staging files on `source` (spec §9.2,
/// Open Question "crash recovery"): a run killed between the write and
/// the rename of a staged file leaves that file behind. Not called by
/// [`build_index`] or [`persist_index`] automatically — the core has no
/// implicit startup hook — but a caller may invoke it before a run to
/// clean up after an earlier crash. Returns the number of files removed.
///
/// Requires a `source.walk()` that does *not* pre-filter excluded paths
/// (spec §6.1 only permits a `Source` to yield them; `is_excluded_path`
/// filtering is the caller's job everywhere else in this crate, including
/// here). A `Source` whose `walk` already drops `*~bisync` entries before
/// returning them — a reasonable, spec-legal choice for a production
/// filesystem driver that wants to skip its own exclusion bookkeeping
/// twice — makes this sweep a no-op, since there is nothing left for it
/// to see. Such a driver must provide its own crash-recovery sweep over
/// its raw directory listing instead of relying on this helper.
pub fn sweep_stale_staging(source: &dyn Source) -> BisyncResult<usize> {
    let entries = source.walk().map_err(|e| BisyncError::SourceIoError {
        replica: source.name().to_string(),
        path: String::new(),
        source: e,
    })?;

    let mut removed = 0;
    for (path, _, _) in entries {
        if !path.ends_with(STAGING_SUFFIX) {
            continue;
        }
        source.delete(&path).map_err(|e| BisyncError::SourceIoError {
            replica: source.name().to_string(),
            path: path.clone(),
            source: e,
        })?;
        info!("{}: swept stale staging file '{}'", source.name(), path);
        removed += 1;
    }
    Ok(removed)
}

/// Rescans `source` and returns an updated index reflecting every
/// deletion, creation, and modification since the last persisted index
/// (spec §4.2, steps 1–5). Does not persist the result — callers that
/// want the new index durable call [`persist_index`] themselves, which
/// lets the reconciler update an index in memory across several pairs
/// before writing it once.
pub fn build_index(source: &dyn Source) -> BisyncResult<Index> {
    let mut index = load_index(source)?;

    let entries = source
        .walk()
        .map_err(|e| BisyncError::SourceIoError {
            replica: source.name().to_string(),
            path: String::new(),
            source: e,
        })?;

    let mut current: HashMap<String, (u64, i64)> = HashMap::new();
    for (path, size, mtime) in entries {
        if is_excluded_path(&path) {
            continue;
        }
        current.insert(path, (size, mtime));
    }

    // Step 1: paths previously tracked but no longer present are deletions.
    for (path, history) in index.iter_mut() {
        if current.contains_key(path) {
            continue;
        }
        if history.is_empty() {
            return Err(BisyncError::invariant(
                source.name(),
                path.clone(),
                "history is empty",
            ));
        }
        if history.tip().is_present() {
            info!("{}: '{}' deleted since last scan", source.name(), path);
            history.push(Entry::Tombstone);
        }
    }

    // Steps 2-4: paths present now are either new, modified, or unchanged.
    for (path, (size, mtime)) in current {
        match index.get_mut(&path) {
            None => {
                info!("{}: '{}' is new", source.name(), path);
                index.insert(path, History::new(Entry::present(size, mtime)));
            }
            Some(history) => {
                if history.is_empty() {
                    return Err(BisyncError::invariant(
                        source.name(),
                        path.clone(),
                        "history is empty",
                    ));
                }
                let tip = history.tip();
                let unchanged = matches!(
                    tip,
                    Entry::Present { size: s, mtime: m } if s == size && m == mtime
                );
                if unchanged {
                    continue;
                }
                debug!("{}: '{}' changed (size={}, mtime={})", source.name(), path, size, mtime);
                history.push(Entry::present(size, mtime));
            }
        }
    }

    for (path, history) in &index {
        if let Err(message) = history.check_well_formed() {
            warn!("{}: '{}' failed well-formedness after scan: {}", source.name(), path, message);
            return Err(BisyncError::invariant(source.name(), path.clone(), message));
        }
    }

    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_source::MemorySource;

    #[test]
    fn build_index_on_empty_source_is_empty() {
        let s = MemorySource::new("a");
        let index = build_index(&s).unwrap();
        assert!(index.is_empty());
    }

    #[test]
    fn build_index_records_new_files() {
        let s = MemorySource::new("a");
        s.seed("foo.txt", b"hello", 1000);
        let index = build_index(&s).unwrap();
        let history = index.get("foo.txt").unwrap();
        assert_eq!(history.as_slice(), &[Entry::present(5, 1000)]);
    }

    #[test]
    fn build_index_ignores_metadata_paths() {
        let s = MemorySource::new("a");
        s.seed(".bisync/index", b"{}", 1);
        let index = build_index(&s).unwrap();
        assert!(index.is_empty());
    }

    #[test]
    fn sweep_stale_staging_removes_only_staged_files() {
        let s = MemorySource::new("a");
        s.seed("foo.txt", b"hello", 1000);
        s.seed("foo.txt~bisync", b"partial", 1000);
        s.seed(".bisync/index~bisync", b"{}", 1000);

        let removed = sweep_stale_staging(&s).unwrap();

        assert_eq!(removed, 2);
        assert!(s.exists("foo.txt").unwrap());
        assert!(!s.exists("foo.txt~bisync").unwrap());
        assert!(!s.exists(".bisync/index~bisync").unwrap());
    }

    #[test]
    fn rescanning_unchanged_file_does_not_grow_history() {
        let s = MemorySource::new("a");
        s.seed("foo.txt", b"hello", 1000);
        let first = build_index(&s).unwrap();
        persist_index(&s, &first).unwrap();

        let second = build_index(&s).unwrap();
        assert_eq!(second.get("foo.txt").unwrap().len(), 1);
    }

    #[test]
    fn rescanning_modified_file_appends_entry() {
        let s = MemorySource::new("a");
        s.seed("foo.txt", b"hello", 1000);
        let first = build_index(&s).unwrap();
        persist_index(&s, &first).unwrap();

        s.seed("foo.txt", b"hello world", 2000);
        let second = build_index(&s).unwrap();
        assert_eq!(
            second.get("foo.txt").unwrap().as_slice(),
            &[Entry::present(5, 1000), Entry::present(11, 2000)]
        );
    }

    #[test]
    fn rescanning_deleted_file_appends_tombstone() {
        let s = MemorySource::new("a");
        s.seed("foo.txt", b"hello", 1000);
        let first = build_index(&s).unwrap();
        persist_index(&s, &first).unwrap();

        s.remove("foo.txt");
        let second = build_index(&s).unwrap();
        assert_eq!(
            second.get("foo.txt").unwrap().as_slice(),
            &[Entry::present(5, 1000), Entry::Tombstone]
        );
    }

    #[test]
    fn rescanning_recreated_file_appends_present_after_tombstone() {
        let s = MemorySource::new("a");
        s.seed("foo.txt", b"hello", 1000);
        let first = build_index(&s).unwrap();
        persist_index(&s, &first).unwrap();

        s.remove("foo.txt");
        let second = build_index(&s).unwrap();
        persist_index(&s, &second).unwrap();

        s.seed("foo.txt", b"hello again", 3000);
        let third = build_index(&s).unwrap();
        assert_eq!(
            third.get("foo.txt").unwrap().as_slice(),
            &[Entry::present(5, 1000), Entry::Tombstone, Entry::present(11, 3000)]
        );
    }

    #[test]
    fn persisted_index_round_trips() {
        let s = MemorySource::new("a");
        s.seed("foo.txt", b"hello", 1000);
        let built = build_index(&s).unwrap();
        persist_index(&s, &built).unwrap();

        let loaded = load_index(&s).unwrap();
        assert_eq!(loaded, built);
    }
}
