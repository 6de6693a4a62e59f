//! Candidate selection and checkpoint coverage.
//!
//! Pure functions over the search-ordered id list; no I/O.

use std::collections::HashSet;

/// How the candidate window was derived from the search result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowKind {
    /// Every id after the stored checkpoint.
    AfterCheckpoint,
    /// No checkpoint yet; the newest `limit` ids.
    NoCheckpoint,
    /// The checkpoint id is gone from the mailbox; the newest `limit` ids.
    CheckpointMissing,
    /// The whole search result.
    Whole,
}

/// Returns the ids a checkpointed run should consider.
///
/// With a checkpoint present in `search`, that is every id after it. Otherwise
/// it falls back to the last `limit` ids.
pub fn window_after_checkpoint<'a>(
    search: &'a [String],
    checkpoint: Option<&str>,
    limit: usize,
) -> (&'a [String], WindowKind) {
    let tail = |kind| (&search[search.len().saturating_sub(limit)..], kind);
    match checkpoint {
        None => tail(WindowKind::NoCheckpoint),
        Some(last) => match search.iter().position(|id| id == last) {
            Some(pos) => (&search[pos + 1..], WindowKind::AfterCheckpoint),
            None => tail(WindowKind::CheckpointMissing),
        },
    }
}

/// Ids of `window` not yet stored, oldest first, at most `cap` of them.
pub fn select_pending(
    window: &[String],
    existing: &HashSet<String>,
    cap: Option<usize>,
) -> Vec<String> {
    window
        .iter()
        .filter(|id| !existing.contains(*id))
        .take(cap.unwrap_or(usize::MAX))
        .cloned()
        .collect()
}

/// Last id of the longest prefix of `window` in which every id was either
/// already stored or attempted in this run.
///
/// This is the furthest point a checkpoint may move without skipping an id
/// that was never looked at.
pub fn covered_prefix_end<'a>(
    window: &'a [String],
    existing: &HashSet<String>,
    attempted: &HashSet<String>,
) -> Option<&'a str> {
    window
        .iter()
        .take_while(|id| existing.contains(*id) || attempted.contains(*id))
        .last()
        .map(String::as_str)
}

/// Whether moving the checkpoint from `old` to `new` is a step forward in
/// search order. A checkpoint that is absent or no longer in `search` can
/// always be replaced.
pub fn advances(search: &[String], old: Option<&str>, new: &str) -> bool {
    let position = |target: &str| search.iter().position(|id| id == target);
    match (old.and_then(position), position(new)) {
        (_, None) => false,
        (None, Some(_)) => true,
        (Some(old_pos), Some(new_pos)) => new_pos > old_pos,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(range: std::ops::RangeInclusive<u32>) -> Vec<String> {
        range.map(|i| i.to_string()).collect()
    }

    fn set(items: &[&str]) -> HashSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_window_after_present_checkpoint() {
        let search = ids(1..=10);
        let (window, kind) = window_after_checkpoint(&search, Some("7"), 3);
        assert_eq!(window, &ids(8..=10)[..]);
        assert_eq!(kind, WindowKind::AfterCheckpoint);
    }

    #[test]
    fn test_window_without_checkpoint_is_tail() {
        let search = ids(1..=10);
        let (window, kind) = window_after_checkpoint(&search, None, 4);
        assert_eq!(window, &ids(7..=10)[..]);
        assert_eq!(kind, WindowKind::NoCheckpoint);

        let (window, _) = window_after_checkpoint(&search, None, 50);
        assert_eq!(window.len(), 10);
    }

    #[test]
    fn test_window_with_pruned_checkpoint_falls_back() {
        let search = ids(5..=10);
        let (window, kind) = window_after_checkpoint(&search, Some("2"), 2);
        assert_eq!(window, &ids(9..=10)[..]);
        assert_eq!(kind, WindowKind::CheckpointMissing);
    }

    #[test]
    fn test_checkpoint_at_end_gives_empty_window() {
        let search = ids(1..=3);
        let (window, _) = window_after_checkpoint(&search, Some("3"), 10);
        assert!(window.is_empty());
    }

    #[test]
    fn test_select_pending_skips_stored_and_caps() {
        let window = ids(1..=6);
        let pending = select_pending(&window, &set(&["2", "3"]), Some(3));
        assert_eq!(pending, vec!["1", "4", "5"]);
        assert_eq!(select_pending(&window, &set(&[]), None).len(), 6);
    }

    #[test]
    fn test_covered_prefix_stops_at_first_gap() {
        let window = ids(1..=6);
        let end = covered_prefix_end(&window, &set(&["1", "2"]), &set(&["3", "5"]));
        assert_eq!(end, Some("3"));
        assert_eq!(covered_prefix_end(&window, &set(&[]), &set(&["2"])), None);
    }

    #[test]
    fn test_advances_only_forward() {
        let search = ids(1..=5);
        assert!(advances(&search, None, "1"));
        assert!(advances(&search, Some("2"), "4"));
        assert!(!advances(&search, Some("4"), "2"));
        assert!(!advances(&search, Some("4"), "4"));
        assert!(advances(&search, Some("99"), "3"));
        assert!(!advances(&search, None, "99"));
    }
}
