//! The history merger (spec §4.3) — a pure function with no I/O.
//!
//! This is close to a direct transcription of
//! `original_source/bisync_lib.py`'s `Synchronizer.merge_versions`: the
//! cursor algorithm, the left/right tie-break (spec M4: the right-hand
//! side's unique tail is flushed before the left-hand side's at each
//! common match), and the final flush of both trailing tails are carried
//! over verbatim. One change from the Python: where the original indexes
//! `H1[i]` directly inside the loop and would raise on out-of-range access
//! if `i` ever reached `H1.len()` exactly on a match step with `j` still
//! short of `H2.len()`, this port guards that case explicitly and treats
//! it the same way the "cursor ran off the end" branch already does
//! (reset `i`, advance `j`) rather than indexing out of bounds. None of
//! the reconciler's actual call sites exercise that guard — `H1` is
//! always the side with at least as much reach as `H2` by construction —
//! but a pure function with undefined inputs shouldn't be able to panic.

use crate::model::{Entry, History};

/// Merges `h1` (the "left"/source-of-transfer history) and `h2` (the
/// "right"/destination history) into one history satisfying M1–M5.
pub fn merge(h1: &History, h2: &History) -> History {
    let h1 = h1.as_slice();
    let h2 = h2.as_slice();

    let mut out: Vec<Entry> = Vec::new();
    let mut last_common_i: Option<usize> = None;
    let mut last_common_j: Option<usize> = None;
    let mut i: usize = 0;
    let mut j: usize = 0;

    while j < h2.len() {
        if i >= h1.len() {
            // H1's cursor ran off the end on a match step; treat as the
            // standard "no more of H1 to try" case rather than panicking.
            i = last_common_i.map_or(0, |x| x + 1);
            j += 1;
            continue;
        }

        if h1[i] == h2[j] {
            let right_start = last_common_j.map_or(0, |x| x + 1);
            out.extend_from_slice(&h2[right_start..j]);

            let left_start = last_common_i.map_or(0, |x| x + 1);
            out.extend_from_slice(&h1[left_start..i]);

            out.push(h1[i]);

            last_common_i = Some(i);
            last_common_j = Some(j);
            i += 1;
            j += 1;
            continue;
        }

        i += 1;
        if i == h1.len() {
            i = last_common_i.map_or(0, |x| x + 1);
            j += 1;
        }
    }

    let right_tail_start = last_common_j.map_or(0, |x| x + 1);
    out.extend_from_slice(&h2[right_tail_start..]);

    let left_tail_start = last_common_i.map_or(0, |x| x + 1);
    out.extend_from_slice(&h1[left_tail_start..]);

    History::from_vec(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn h(entries: &[Entry]) -> History {
        History::from_vec(entries.to_vec())
    }

    fn p(size: u64, mtime: i64) -> Entry {
        Entry::present(size, mtime)
    }

    const T: Entry = Entry::Tombstone;

    #[test]
    fn merge_of_empty_right_is_left() {
        let left = h(&[p(1, 1)]);
        let right = h(&[]);
        assert_eq!(merge(&left, &right), left);
    }

    #[test]
    fn merge_extends_with_new_version() {
        // spec §8 scenario 2
        let left = h(&[p(1, 1), p(1, 2)]);
        let right = h(&[p(1, 1)]);
        assert_eq!(merge(&left, &right), h(&[p(1, 1), p(1, 2)]));
    }

    #[test]
    fn merge_recreated_file_scenario_4() {
        let left = h(&[p(1, 1), T, p(1, 4)]);
        let right = h(&[p(1, 1), T]);
        assert_eq!(merge(&left, &right), h(&[p(1, 1), T, p(1, 4)]));
    }

    #[test]
    fn merge_conflict_one_delete_scenario_7() {
        let left = h(&[p(1, 1), p(1, 2)]);
        let right = h(&[p(1, 1), p(1, 3), T]);
        assert_eq!(merge(&left, &right), h(&[p(1, 1), p(1, 3), T, p(1, 2)]));
    }

    #[test]
    fn merge_both_deleted_after_divergence_scenario_8() {
        let left = h(&[p(1, 1), p(1, 3), T]);
        let right = h(&[p(1, 1), p(1, 2), T]);
        assert_eq!(merge(&left, &right), h(&[p(1, 1), p(1, 3), T, p(1, 2), T]));
    }

    #[test]
    fn merge_external_identical_copy_scenario_9() {
        let left = h(&[p(1, 1), p(1, 2)]);
        let right = h(&[p(1, 2)]);
        assert_eq!(merge(&left, &right), h(&[p(1, 1), p(1, 2)]));
    }

    #[test]
    fn merge_is_idempotent_p4() {
        let history = h(&[p(1, 1), p(1, 2), T, p(1, 4)]);
        assert_eq!(merge(&history, &history), history);
    }

    #[test]
    fn merge_then_remerge_with_same_right_is_stable_p4() {
        let a = h(&[p(1, 1), p(1, 3)]);
        let b = h(&[p(1, 1), p(1, 2)]);
        let once = merge(&a, &b);
        let twice = merge(&once, &b);
        assert_eq!(once, twice);
    }

    #[test]
    fn merge_preserves_order_of_each_input_p5() {
        let a = h(&[p(1, 1), p(1, 3), T]);
        let b = h(&[p(1, 1), p(1, 2)]);
        let merged = merge(&a, &b);

        let a_entries: Vec<Entry> = a.as_slice().to_vec();
        let merged_from_a: Vec<Entry> = merged
            .as_slice()
            .iter()
            .copied()
            .filter(|e| a_entries.contains(e))
            .collect();
        assert_eq!(merged_from_a, a_entries);

        let b_entries: Vec<Entry> = b.as_slice().to_vec();
        let merged_from_b: Vec<Entry> = merged
            .as_slice()
            .iter()
            .copied()
            .filter(|e| b_entries.contains(e))
            .collect();
        assert_eq!(merged_from_b, b_entries);
    }
}
