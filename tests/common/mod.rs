//! A filesystem-backed [`bisync_core::Source`] used only by this crate's
//! own integration tests, to exercise the reconciler against a real
//! filesystem's mtime and rename semantics. This is not the production
//! filesystem driver — that remains an external collaborator out of
//! scope for this crate — just enough of one to drive tests end to end.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use bisync_core::source::is_excluded_path;
use bisync_core::Source;
use filetime::FileTime;

pub struct FsSource {
    name: String,
    root: PathBuf,
}

impl FsSource {
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        FsSource { name: name.into(), root: root.into() }
    }

    fn full_path(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }

    pub fn write_file(&self, path: &str, content: &[u8], mtime_secs: i64) {
        let full = self.full_path(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&full, content).unwrap();
        filetime::set_file_mtime(&full, FileTime::from_unix_time(mtime_secs, 0)).unwrap();
    }

    pub fn remove_file(&self, path: &str) {
        let _ = fs::remove_file(self.full_path(path));
    }

    fn walk_dir(&self, dir: &Path, rel_prefix: &str, out: &mut Vec<(String, u64, i64)>) -> io::Result<()> {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let rel = if rel_prefix.is_empty() {
                name.clone()
            } else {
                format!("{rel_prefix}/{name}")
            };
            // Pre-filters excluded paths, including stale `*~bisync` staging
            // files — so `bisync_core::sweep_stale_staging` is a no-op
            // against this `Source`; it has nothing of its own to sweep
            // after a crash since interrupted test runs don't persist.
            if is_excluded_path(&rel) {
                continue;
            }
            if file_type.is_dir() {
                self.walk_dir(&entry.path(), &rel, out)?;
            } else if file_type.is_file() {
                let meta = entry.metadata()?;
                let mtime = FileTime::from_last_modification_time(&meta).unix_seconds();
                out.push((rel, meta.len(), mtime));
            }
        }
        Ok(())
    }

    fn remove_empty_ancestors(&self, path: &str) {
        let mut dir = self.full_path(path);
        while let Some(parent) = dir.parent() {
            if parent == self.root {
                break;
            }
            if fs::read_dir(parent).map(|mut d| d.next().is_none()).unwrap_or(false) {
                let _ = fs::remove_dir(parent);
                dir = parent.to_path_buf();
            } else {
                break;
            }
        }
    }
}

impl Source for FsSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn walk(&self) -> io::Result<Vec<(String, u64, i64)>> {
        let mut out = Vec::new();
        self.walk_dir(&self.root, "", &mut out)?;
        Ok(out)
    }

    fn exists(&self, path: &str) -> io::Result<bool> {
        Ok(self.full_path(path).exists())
    }

    fn read_memory(&self, path: &str) -> io::Result<Vec<u8>> {
        fs::read(self.full_path(path))
    }

    fn write_memory(&self, path: &str, content: &[u8]) -> io::Result<()> {
        let full = self.full_path(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(full, content)
    }

    fn copy_to(&self, local_source_path: &str, dest_path: &str) -> io::Result<()> {
        let full = self.full_path(dest_path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(local_source_path, &full)?;
        let source_meta = fs::metadata(local_source_path)?;
        let mtime = FileTime::from_last_modification_time(&source_meta);
        filetime::set_file_mtime(&full, mtime)?;
        Ok(())
    }

    fn rename(&self, from: &str, to: &str) -> io::Result<()> {
        let to_full = self.full_path(to);
        if let Some(parent) = to_full.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(self.full_path(from), to_full)
    }

    fn delete(&self, path: &str) -> io::Result<()> {
        match fs::remove_file(self.full_path(path)) {
            Ok(()) => {
                self.remove_empty_ancestors(path);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn get_local_name(&self, path: &str) -> io::Result<String> {
        let full = self.full_path(path);
        if !full.exists() {
            return Err(io::Error::new(io::ErrorKind::NotFound, format!("'{path}' not found")));
        }
        Ok(full.to_string_lossy().into_owned())
    }
}
