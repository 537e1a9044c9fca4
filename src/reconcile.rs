//! The pairwise reconciler (spec §4.4, §4.5) and multi-replica
//! orchestration (spec §5).
//!
//! Grounded on `original_source/bisync_lib.py`'s `Synchronizer.sync` /
//! `transfer` / `resolve_conflict` / `synchronize_all`: the last-common-
//! revision backward scan, the transfer state machine, and the default
//! conflict tie-break are carried over with the same control flow,
//! generalized from a hard-coded two-replica list to an arbitrary slice
//! of replicas compared pairwise (spec §5.2, resolving the open question
//! of how many times each unordered pair is compared: exactly once, via
//! `i < j`).

use std::collections::HashSet;

use log::{info, warn};

use crate::config::ReconcileOptions;
use crate::error::{BisyncError, BisyncResult};
use crate::index::{build_index, persist_index, Index};
use crate::merge::merge;
use crate::model::{Entry, History};
use crate::source::{staged_path, ConfirmationPolicy, Source};

/// One replica under reconciliation: a storage backend paired with its
/// in-memory index. The index is mutated in place as pairs are
/// reconciled; nothing is persisted until [`synchronize_all`] finishes
/// with every pair, matching the original's "merge in memory across all
/// pairs, save once" sequencing.
pub struct Replica<'s> {
    pub source: &'s dyn Source,
    pub index: Index,
}

impl<'s> Replica<'s> {
    /// Rescans `source` and loads the resulting index (spec §4.2).
    pub fn scan(source: &'s dyn Source) -> BisyncResult<Self> {
        let index = build_index(source)?;
        Ok(Replica { source, index })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

fn io_err(replica: &dyn Source, path: &str, source: std::io::Error) -> BisyncError {
    BisyncError::SourceIoError {
        replica: replica.name().to_string(),
        path: path.to_string(),
        source,
    }
}

/// Reconciles every unordered pair of `replicas` exactly once, then
/// persists each replica's updated index (spec §5.2, §4.2.1).
pub fn synchronize_all(
    replicas: &mut [Replica],
    policy: &dyn ConfirmationPolicy,
    options: &ReconcileOptions,
) -> BisyncResult<()> {
    for i in 0..replicas.len() {
        for j in (i + 1)..replicas.len() {
            let (left_part, right_part) = replicas.split_at_mut(j);
            let left = &mut left_part[i];
            let right = &mut right_part[0];
            sync_pair(left, right, policy, options)?;
        }
    }

    for replica in replicas.iter() {
        persist_index(replica.source, &replica.index)?;
    }

    Ok(())
}

/// Reconciles one pair of replicas over every path known to either side.
fn sync_pair(
    l: &mut Replica,
    r: &mut Replica,
    policy: &dyn ConfirmationPolicy,
    options: &ReconcileOptions,
) -> BisyncResult<()> {
    let mut paths: Vec<String> = l
        .index
        .keys()
        .chain(r.index.keys())
        .cloned()
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    paths.sort();

    for path in paths {
        let result = match (l.index.contains_key(&path), r.index.contains_key(&path)) {
            (true, true) => sync_existing(l, r, &path, policy, options),
            (true, false) => sync_one_sided(l, r, &path, policy, options),
            (false, true) => sync_one_sided(r, l, &path, policy, options),
            (false, false) => unreachable!("path drawn from the union of both indexes"),
        };

        match result {
            Ok(()) => {}
            Err(BisyncError::SourceIoError { replica, path, source }) => {
                // spec §7: a Source I/O failure aborts only the offending
                // transfer; the pair keeps going with the remaining paths.
                warn!("source I/O error on '{replica}' at '{path}', skipping this path: {source}");
            }
            Err(other) => return Err(other),
        }
    }

    Ok(())
}

/// `path` exists only in `have`'s index; the only possible action is
/// transferring `have`'s current state onto `missing` (spec §4.4, the
/// two one-sided loops over paths present in only one index).
fn sync_one_sided(
    have: &mut Replica,
    missing: &mut Replica,
    path: &str,
    policy: &dyn ConfirmationPolicy,
    options: &ReconcileOptions,
) -> BisyncResult<()> {
    let have_tip = have.index.get(path).expect("path checked present").tip();
    let transferred = transfer(have.source, have_tip, missing.source, path, policy, options)?;
    if transferred {
        merge_assign(have, missing, path)?;
    }
    Ok(())
}

/// `path` exists in both indexes; compares histories and decides whether
/// a transfer is needed, and in which direction (spec §4.4).
fn sync_existing(
    l: &mut Replica,
    r: &mut Replica,
    path: &str,
    policy: &dyn ConfirmationPolicy,
    options: &ReconcileOptions,
) -> BisyncResult<()> {
    let lh = l.index.get(path).expect("path checked present").clone();
    let rh = r.index.get(path).expect("path checked present").clone();

    if lh.tip() == rh.tip() {
        // Already converged; still merge so any interior divergence that
        // happened to reconverge to the same tip is recorded on both
        // sides (spec §8 scenario 9).
        merge_assign(l, r, path)?;
        return Ok(());
    }

    // spec §4.4: if the backward scan finds no common entry at all
    // (`j < 0`), that is not a fatal error — two replicas can each
    // independently create the same path before ever syncing, producing
    // histories with nothing in common. Treat it the same as a genuine
    // conflict between two diverged tips, same as the original
    // (`bisync_lib.py`'s scan leaves `i` at `len(versions1) - 1` and
    // falls into the ordinary transfer decision).
    let common = find_common_point(lh.as_slice(), rh.as_slice());

    let (left_at_tip, right_at_tip) = match common {
        Some((i, j)) => (i == lh.len() - 1, j == rh.len() - 1),
        None => (false, false),
    };

    match (left_at_tip, right_at_tip) {
        (true, false) => {
            // L has not changed since the common point; R is ahead.
            let transferred = transfer(r.source, rh.tip(), l.source, path, policy, options)?;
            if transferred {
                merge_assign(r, l, path)?;
            }
        }
        (false, true) => {
            let transferred = transfer(l.source, lh.tip(), r.source, path, policy, options)?;
            if transferred {
                merge_assign(l, r, path)?;
            }
        }
        (true, true) => {
            // Both at the common point implies equal tips, already
            // handled above; nothing left to do.
        }
        (false, false) => {
            let winner = resolve_conflict(lh.tip(), rh.tip());
            info!("conflict on '{path}', resolved in favor of {winner:?}");
            match winner {
                Side::Left => {
                    let transferred = transfer(l.source, lh.tip(), r.source, path, policy, options)?;
                    if transferred {
                        merge_assign(l, r, path)?;
                    }
                }
                Side::Right => {
                    let transferred = transfer(r.source, rh.tip(), l.source, path, policy, options)?;
                    if transferred {
                        merge_assign(r, l, path)?;
                    }
                }
            }
        }
    }

    Ok(())
}

/// Scans backward from both tips for the most recent revision the two
/// histories share, matching the original's reset-and-retry cursor walk
/// rather than a longest-common-subsequence search. Returns the indices
/// of that revision in `l` and `r`, or `None` if the histories share no
/// revision at all (only possible for indexes that never shared an
/// origin, which is an invariant violation upstream of this function).
fn find_common_point(l: &[Entry], r: &[Entry]) -> Option<(usize, usize)> {
    if l.is_empty() || r.is_empty() {
        return None;
    }
    let mut i: isize = l.len() as isize - 1;
    let mut j: isize = r.len() as isize - 1;
    while j >= 0 {
        if l[i as usize] == r[j as usize] {
            return Some((i as usize, j as usize));
        }
        i -= 1;
        if i < 0 {
            i = l.len() as isize - 1;
            j -= 1;
        }
    }
    None
}

/// Default conflict tie-break (spec §4.5): a tombstone tip always loses
/// to a present tip; between two present tips, the greater mtime wins;
/// ties favor the right-hand replica.
fn resolve_conflict(l_tip: Entry, r_tip: Entry) -> Side {
    match (l_tip, r_tip) {
        (Entry::Tombstone, Entry::Tombstone) => Side::Right,
        (Entry::Tombstone, Entry::Present { .. }) => Side::Right,
        (Entry::Present { .. }, Entry::Tombstone) => Side::Left,
        (Entry::Present { mtime: lm, .. }, Entry::Present { mtime: rm, .. }) => {
            if rm >= lm {
                Side::Right
            } else {
                Side::Left
            }
        }
    }
}

/// Performs the physical transfer of `path`'s current state from
/// `from_tip`'s replica onto `to`, gated by `policy` when
/// `options.confirm_transfers` is set. Returns `false` (not an error,
/// spec §7 `UserDecline`) if the policy declined; the caller must then
/// skip `merge_assign` so the two sides stay exactly as divergent as
/// before this attempt.
fn transfer(
    from: &dyn Source,
    from_tip: Entry,
    to: &dyn Source,
    path: &str,
    policy: &dyn ConfirmationPolicy,
    options: &ReconcileOptions,
) -> BisyncResult<bool> {
    match from_tip {
        Entry::Tombstone => {
            let exists = to.exists(path).map_err(|e| io_err(to, path, e))?;
            if !exists {
                return Ok(true);
            }
            if options.confirm_transfers && !policy.confirm_delete(from, to, path) {
                return Ok(false);
            }
            to.delete(path).map_err(|e| io_err(to, path, e))?;
            Ok(true)
        }
        Entry::Present { .. } => {
            let exists = to.exists(path).map_err(|e| io_err(to, path, e))?;
            let confirmed = if !options.confirm_transfers {
                true
            } else if exists {
                policy.confirm_replace(from, to, path)
            } else {
                policy.confirm_copy(from, to, path)
            };
            if !confirmed {
                return Ok(false);
            }
            let local = from.get_local_name(path).map_err(|e| io_err(from, path, e))?;
            let staged = staged_path(path);
            to.copy_to(&local, &staged).map_err(|e| io_err(to, &staged, e))?;
            to.rename(&staged, path).map_err(|e| io_err(to, path, e))?;
            Ok(true)
        }
    }
}

/// Merges `a`'s and `b`'s histories for `path` and assigns the result to
/// both (spec §4.3). `a` is passed as `merge`'s left/"source_from"
/// argument: `b`'s (the right/destination side's) unique entries are
/// emitted first, so on a genuine conflict it is `a`'s unique tail that
/// ends up last in the merged result, not first (spec M4).
fn merge_assign(a: &mut Replica, b: &mut Replica, path: &str) -> BisyncResult<()> {
    let empty = History::from_vec(Vec::new());
    let a_history = a.index.get(path).cloned().unwrap_or_else(|| empty.clone());
    let b_history = b.index.get(path).cloned().unwrap_or(empty);

    let merged = merge(&a_history, &b_history);
    if let Err(message) = merged.check_well_formed() {
        return Err(BisyncError::invariant(a.source.name(), path.to_string(), message));
    }

    a.index.insert(path.to_string(), merged.clone());
    b.index.insert(path.to_string(), merged);
    Ok(())
}
