//! An in-memory [`Source`] implementation (spec §9.1: "model Source as a
//! capability set ... with concrete implementations for filesystem,
//! in-memory (for tests), and no-op simulation"). Used by this crate's own
//! unit/property tests and available to embedders as a lightweight
//! demonstration backend — not the filesystem-backed driver, which spec.md
//! §1 keeps as an external collaborator.
//!
//! Structurally this mirrors `fspulse::database::Database`: a single
//! mutable store behind simple accessor methods, generalized here from a
//! sqlite connection to a plain in-process map.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};

use crate::source::Source;

#[derive(Clone)]
struct Record {
    content: Vec<u8>,
    mtime: i64,
}

type Registry = Mutex<HashMap<u64, Mutex<HashMap<String, Record>>>>;

fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

fn next_id() -> u64 {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    NEXT.fetch_add(1, Ordering::Relaxed)
}

/// An in-memory replica. Every instance has its own store, registered
/// process-wide under an opaque id so that `get_local_name`/`copy_to` can
/// move content between two independent `MemorySource`s without touching
/// the real filesystem.
pub struct MemorySource {
    id: u64,
    name: String,
}

impl MemorySource {
    pub fn new(name: impl Into<String>) -> Self {
        let id = next_id();
        registry().lock().unwrap().insert(id, Mutex::new(HashMap::new()));
        MemorySource { id, name: name.into() }
    }

    fn with_store<R>(&self, f: impl FnOnce(&mut HashMap<String, Record>) -> R) -> R {
        let reg = registry().lock().unwrap();
        let store = reg.get(&self.id).expect("MemorySource store missing from registry");
        let mut store = store.lock().unwrap();
        f(&mut store)
    }

    /// Directly seeds `path` with `content` and `mtime`, bypassing
    /// `write_memory`'s mtime-from-clock behavior. Used by tests that need
    /// to control mtime precisely.
    pub fn seed(&self, path: &str, content: &[u8], mtime: i64) {
        self.with_store(|store| {
            store.insert(
                path.to_string(),
                Record { content: content.to_vec(), mtime },
            );
        });
    }

    pub fn remove(&self, path: &str) {
        self.with_store(|store| {
            store.remove(path);
        });
    }
}

impl Drop for MemorySource {
    fn drop(&mut self) {
        registry().lock().unwrap().remove(&self.id);
    }
}

fn not_found(path: &str) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("'{path}' not found"))
}

fn malformed_local_name(local: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("'{local}' is not a MemorySource local name"),
    )
}

impl Source for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn walk(&self) -> io::Result<Vec<(String, u64, i64)>> {
        Ok(self.with_store(|store| {
            store
                .iter()
                .map(|(path, rec)| (path.clone(), rec.content.len() as u64, rec.mtime))
                .collect()
        }))
    }

    fn exists(&self, path: &str) -> io::Result<bool> {
        Ok(self.with_store(|store| store.contains_key(path)))
    }

    fn read_memory(&self, path: &str) -> io::Result<Vec<u8>> {
        self.with_store(|store| store.get(path).map(|r| r.content.clone()))
            .ok_or_else(|| not_found(path))
    }

    fn write_memory(&self, path: &str, content: &[u8]) -> io::Result<()> {
        self.with_store(|store| {
            let mtime = store.get(path).map(|r| r.mtime).unwrap_or(0);
            store.insert(path.to_string(), Record { content: content.to_vec(), mtime });
        });
        Ok(())
    }

    fn copy_to(&self, local_source_path: &str, dest_path: &str) -> io::Result<()> {
        let (src_id, src_path) = parse_local_name(local_source_path)?;
        let record = {
            let reg = registry().lock().unwrap();
            let store = reg
                .get(&src_id)
                .ok_or_else(|| malformed_local_name(local_source_path))?;
            let store = store.lock().unwrap();
            store
                .get(&src_path)
                .cloned()
                .ok_or_else(|| not_found(&src_path))?
        };
        self.with_store(|store| {
            store.insert(dest_path.to_string(), record);
        });
        Ok(())
    }

    fn rename(&self, from: &str, to: &str) -> io::Result<()> {
        self.with_store(|store| {
            let record = store.remove(from).ok_or_else(|| not_found(from))?;
            store.insert(to.to_string(), record);
            Ok(())
        })
    }

    fn delete(&self, path: &str) -> io::Result<()> {
        self.with_store(|store| {
            store.remove(path);
        });
        Ok(())
    }

    fn get_local_name(&self, path: &str) -> io::Result<String> {
        if !self.with_store(|store| store.contains_key(path)) {
            return Err(not_found(path));
        }
        Ok(format!("mem:{}:{}", self.id, path))
    }
}

fn parse_local_name(local: &str) -> io::Result<(u64, String)> {
    let rest = local
        .strip_prefix("mem:")
        .ok_or_else(|| malformed_local_name(local))?;
    let (id_str, path) = rest.split_once(':').ok_or_else(|| malformed_local_name(local))?;
    let id: u64 = id_str.parse().map_err(|_| malformed_local_name(local))?;
    Ok((id, path.to_string()))
}
