//! The `Source` and `ConfirmationPolicy` external interfaces (spec §6.1,
//! §4.2, §4.5), plus the reserved names (§6.3) and excluded-path predicate
//! (§3.5) every `Source` implementation must respect.

/// Reserved metadata folder, top-level in each replica (spec §6.3).
pub const METADATA_FOLDER: &str = ".bisync";

/// Reserved index file name, inside `METADATA_FOLDER` (spec §6.2).
pub const INDEX_FILE_NAME: &str = "index";

/// Suffix appended to a path during a two-phase staged write (spec §6.3).
pub const STAGING_SUFFIX: &str = "~bisync";

/// Optional trash folder used only by an external trash policy (spec §6.3).
/// The core never creates or reads this folder itself — trash is an
/// out-of-scope external collaborator (spec §1) — but the name is reserved
/// so the exclusion predicate below keeps it out of every index.
pub const TRASH_FOLDER: &str = "bisync_trash";

/// Full path to the persisted index document within a replica.
pub fn index_path() -> String {
    format!("{METADATA_FOLDER}/{INDEX_FILE_NAME}")
}

/// Appends the staging suffix to a path, for the two-phase write pattern
/// used by both index persistence (spec §4.2.1) and file transfer (spec
/// §4.4 `transfer`).
pub fn staged_path(path: &str) -> String {
    format!("{path}{STAGING_SUFFIX}")
}

/// True if `path` must never enter any index (spec §3.5): it lives under
/// the reserved metadata folder, ends in the staging suffix, or lives
/// under the reserved trash folder.
///
/// Supplemented from `original_source/bisync_lib.py`'s single combined
/// `bisync_exclude_re` (spec.md's distillation describes the three rules
/// separately; the original tests them as one predicate per path, which
/// this function mirrors without pulling in a `regex` dependency for a
/// three-way prefix/suffix check).
pub fn is_excluded_path(path: &str) -> bool {
    path.starts_with(&format!("{METADATA_FOLDER}/"))
        || path == METADATA_FOLDER
        || path.ends_with(STAGING_SUFFIX)
        || path.starts_with(&format!("{TRASH_FOLDER}/"))
        || path == TRASH_FOLDER
}

/// A storage backend a replica is built on (spec §6.1).
///
/// Implementations of the actual filesystem-backed driver are an external
/// collaborator (spec §1, Non-goals) — out of scope for this crate. This
/// trait is the seam; `MemorySource` (see [`crate::memory_source`]) is the
/// in-memory implementation this crate ships for tests and demonstrations.
pub trait Source {
    /// A human-readable name for this source, used only in diagnostic log
    /// messages (supplemented from the original `Source.get_name()`; spec
    /// §6.1's table omits it since it carries no behavior). Default is a
    /// generic placeholder.
    fn name(&self) -> &str {
        "<source>"
    }

    /// Every present regular file, as `(path, size, mtime)`. Excluded
    /// paths (spec §3.5) may be yielded; callers filter them.
    fn walk(&self) -> std::io::Result<Vec<(String, u64, i64)>>;

    fn exists(&self, path: &str) -> std::io::Result<bool>;

    fn read_memory(&self, path: &str) -> std::io::Result<Vec<u8>>;

    /// Writes `content` to `path`, creating intermediate folders
    /// implicitly.
    fn write_memory(&self, path: &str, content: &[u8]) -> std::io::Result<()>;

    /// Copies an external (filesystem-accessible) file at `local_source_path`
    /// onto this source at `dest_path`, creating folders implicitly. Must
    /// set the destination's mtime equal to the source file's mtime (spec
    /// §6.1) — this is required for version-entry equality across
    /// replicas (spec §5.3).
    fn copy_to(&self, local_source_path: &str, dest_path: &str) -> std::io::Result<()>;

    /// Renames `from` to `to`, overwriting `to` if present, creating
    /// folders for `to` implicitly.
    fn rename(&self, from: &str, to: &str) -> std::io::Result<()>;

    /// Deletes `path`. No-op if absent. Removes now-empty ancestor
    /// folders. Must be idempotent (spec §7: the core never treats
    /// deleting an already-absent ancestor as an error).
    fn delete(&self, path: &str) -> std::io::Result<()>;

    /// Returns a local filesystem path that can be passed to another
    /// source's `copy_to` as `local_source_path`. May be a temporary
    /// materialization.
    fn get_local_name(&self, path: &str) -> std::io::Result<String>;
}

/// External gate on the three transfer decision points (spec §4.5). The
/// core calls each query exactly once per decision point.
pub trait ConfirmationPolicy {
    fn confirm_copy(&self, from: &dyn Source, to: &dyn Source, path: &str) -> bool;
    fn confirm_delete(&self, from: &dyn Source, to: &dyn Source, path: &str) -> bool;
    fn confirm_replace(&self, from: &dyn Source, to: &dyn Source, path: &str) -> bool;
}

/// Default policy: fully automatic (spec §4.5, "Default: always true").
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysConfirm;

impl ConfirmationPolicy for AlwaysConfirm {
    fn confirm_copy(&self, _from: &dyn Source, _to: &dyn Source, _path: &str) -> bool {
        true
    }

    fn confirm_delete(&self, _from: &dyn Source, _to: &dyn Source, _path: &str) -> bool {
        true
    }

    fn confirm_replace(&self, _from: &dyn Source, _to: &dyn Source, _path: &str) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excludes_metadata_folder() {
        assert!(is_excluded_path(".bisync/index"));
        assert!(is_excluded_path(".bisync"));
        assert!(!is_excluded_path(".bisyncx/index"));
    }

    #[test]
    fn excludes_staging_suffix() {
        assert!(is_excluded_path("foo/bar~bisync"));
        assert!(!is_excluded_path("foo/bar"));
    }

    #[test]
    fn excludes_trash_folder() {
        assert!(is_excluded_path("bisync_trash/old.txt"));
        assert!(is_excluded_path("bisync_trash"));
        assert!(!is_excluded_path("bisync_trash_archive/old.txt"));
    }

    #[test]
    fn allows_ordinary_paths() {
        assert!(!is_excluded_path("docs/readme.md"));
    }

    #[test]
    fn staged_path_appends_suffix() {
        assert_eq!(staged_path("docs/readme.md"), "docs/readme.md~bisync");
    }
}
