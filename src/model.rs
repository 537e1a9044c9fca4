//! Version entry and history value types (spec §3, §4.1).
//!
//! Entries are immutable. Every producer in this crate (the index builder,
//! the merger) returns a new `History` rather than mutating one in place —
//! the one exception is `History::push`, used internally by the builder
//! while it accumulates a freshly-scanned replica's state.

use serde::de::{self, SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// One observed state of a file at one point in a replica's history.
///
/// Wire format (spec §6.2, §9.1): a present entry encodes positionally as
/// `[true, size, mtime]`, a tombstone as `[false]`. This is the original
/// bisync format; we preserve it rather than switching to a tagged/struct
/// encoding, since the persisted index is meant to remain readable by any
/// replica regardless of which port wrote it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entry {
    Present { size: u64, mtime: i64 },
    Tombstone,
}

impl Entry {
    pub fn present(size: u64, mtime: i64) -> Self {
        Entry::Present { size, mtime }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, Entry::Present { .. })
    }

    pub fn is_tombstone(&self) -> bool {
        matches!(self, Entry::Tombstone)
    }
}

impl Serialize for Entry {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match *self {
            Entry::Present { size, mtime } => {
                let mut seq = serializer.serialize_seq(Some(3))?;
                seq.serialize_element(&true)?;
                seq.serialize_element(&size)?;
                seq.serialize_element(&mtime)?;
                seq.end()
            }
            Entry::Tombstone => {
                let mut seq = serializer.serialize_seq(Some(1))?;
                seq.serialize_element(&false)?;
                seq.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Entry {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct EntryVisitor;

        impl<'de> Visitor<'de> for EntryVisitor {
            type Value = Entry;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a [true, size, mtime] or [false] array")
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Entry, A::Error>
            where
                A: SeqAccess<'de>,
            {
                let present: bool = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                if !present {
                    return Ok(Entry::Tombstone);
                }
                let size: u64 = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(1, &self))?;
                let mtime: i64 = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(2, &self))?;
                Ok(Entry::Present { size, mtime })
            }
        }

        deserializer.deserialize_seq(EntryVisitor)
    }
}

/// A non-empty ordered sequence of version entries for one path.
///
/// Invariants (spec §3.2), enforced by `push` and checked by
/// `check_well_formed`:
/// - H1: the first entry is always present.
/// - H2: two adjacent tombstones never appear.
/// - H3: two adjacent present entries differ in `size` or `mtime`.
/// - H4: after a tombstone, the next entry (if any) is present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct History(Vec<Entry>);

impl History {
    /// Starts a new history at its first observation. Panics if `first`
    /// is a tombstone — H1 requires histories to begin at creation, and
    /// no caller in this crate should ever try to start one otherwise.
    pub fn new(first: Entry) -> Self {
        assert!(first.is_present(), "a history must begin with a present entry (H1)");
        History(vec![first])
    }

    pub fn from_vec(entries: Vec<Entry>) -> Self {
        History(entries)
    }

    pub fn as_slice(&self) -> &[Entry] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<Entry> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn tip(&self) -> Entry {
        *self
            .0
            .last()
            .expect("History is a non-empty sequence by construction")
    }

    /// Appends `entry`, preserving H2–H4. Intended for use by the index
    /// builder, which only ever calls this after checking that the
    /// append is warranted (new size/mtime, or deletion/re-creation).
    pub fn push(&mut self, entry: Entry) {
        self.0.push(entry);
    }

    /// Checks H1–H4 over the whole sequence. Used by tests (spec P3) and
    /// available to callers who want to validate a history they built or
    /// deserialized by hand.
    pub fn check_well_formed(&self) -> Result<(), String> {
        if self.0.is_empty() {
            return Err("history must be non-empty".to_string());
        }
        if !self.0[0].is_present() {
            return Err("history must begin with a present entry (H1)".to_string());
        }
        for window in self.0.windows(2) {
            let (prev, next) = (window[0], window[1]);
            match (prev, next) {
                (Entry::Tombstone, Entry::Tombstone) => {
                    return Err("adjacent tombstones are not allowed (H2)".to_string());
                }
                (
                    Entry::Present { size: s1, mtime: m1 },
                    Entry::Present { size: s2, mtime: m2 },
                ) if s1 == s2 && m1 == m2 => {
                    return Err("adjacent present entries must differ (H3)".to_string());
                }
                _ => {}
            }
        }
        Ok(())
    }
}
