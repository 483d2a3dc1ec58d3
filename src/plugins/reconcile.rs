//! Generic ordered-set reconciliation.
//!
//! Computes the minimal add/remove delta between a desired id list and the
//! currently active id set. The same algorithm drives both shortcut-list
//! synchronization and plugin descriptor bookkeeping, so it is implemented
//! once over any comparable key.

use std::cmp::Ordering;

/// The minimal edit sets produced by [`reconcile`].
///
/// `to_add` and `to_remove` are disjoint: a key present in both inputs
/// appears in neither output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation<K> {
    /// Keys present in the desired list but not in the current set.
    pub to_add: Vec<K>,
    /// Keys present in the current set but not in the desired list.
    pub to_remove: Vec<K>,
}

impl<K> Reconciliation<K> {
    /// True when both inputs already agree.
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// Diff `desired` against `current` using the natural key order.
///
/// Duplicate keys in `desired` are coalesced before the walk, so a
/// duplicated id yields a single instance rather than add/remove churn.
/// Output order follows the sort order, not the input order.
pub fn reconcile<K: Ord>(desired: Vec<K>, current: Vec<K>) -> Reconciliation<K> {
    reconcile_by(desired, current, K::cmp)
}

/// Diff `desired` against `current` under an explicit total order.
///
/// Both inputs are sorted by `cmp`, then walked in lockstep: a head only in
/// `current` goes to `to_remove`, a head only in `desired` goes to `to_add`,
/// equal heads are dropped from both. Once one side is exhausted the
/// remainder of the other side is moved wholesale. O(n log n) in the sort.
pub fn reconcile_by<K>(
    mut desired: Vec<K>,
    mut current: Vec<K>,
    cmp: impl Fn(&K, &K) -> Ordering,
) -> Reconciliation<K> {
    desired.sort_by(&cmp);
    desired.dedup_by(|a, b| cmp(a, b) == Ordering::Equal);
    current.sort_by(&cmp);

    let mut to_add = Vec::new();
    let mut to_remove = Vec::new();

    let mut desired = desired.into_iter().peekable();
    let mut current = current.into_iter().peekable();

    while let (Some(d), Some(c)) = (desired.peek(), current.peek()) {
        match cmp(c, d) {
            // Only in current: schedule for removal.
            Ordering::Less => to_remove.push(current.next().unwrap()),
            // Only in desired: schedule for addition.
            Ordering::Greater => to_add.push(desired.next().unwrap()),
            // In both: no action needed.
            Ordering::Equal => {
                current.next();
                desired.next();
            }
        }
    }

    to_add.extend(desired);
    to_remove.extend(current);

    Reconciliation { to_add, to_remove }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_disjoint_inputs() {
        let plan = reconcile(ids(&["a", "b"]), ids(&["c", "d"]));
        assert_eq!(plan.to_add, ids(&["a", "b"]));
        assert_eq!(plan.to_remove, ids(&["c", "d"]));
    }

    #[test]
    fn test_equal_inputs_produce_no_work() {
        let plan = reconcile(ids(&["a", "b", "c"]), ids(&["c", "b", "a"]));
        assert!(plan.is_empty());
    }

    #[test]
    fn test_mixed_overlap() {
        // Desired ["b", "a", "c"] against active {"a", "d"}.
        let plan = reconcile(ids(&["b", "a", "c"]), ids(&["a", "d"]));
        assert_eq!(plan.to_add, ids(&["b", "c"]));
        assert_eq!(plan.to_remove, ids(&["d"]));
    }

    #[test]
    fn test_empty_desired_removes_everything() {
        let plan = reconcile(Vec::<String>::new(), ids(&["a", "b"]));
        assert!(plan.to_add.is_empty());
        assert_eq!(plan.to_remove, ids(&["a", "b"]));
    }

    #[test]
    fn test_empty_current_adds_everything() {
        let plan = reconcile(ids(&["a", "b"]), Vec::new());
        assert_eq!(plan.to_add, ids(&["a", "b"]));
        assert!(plan.to_remove.is_empty());
    }

    #[test]
    fn test_duplicates_in_desired_are_coalesced() {
        let plan = reconcile(ids(&["a", "a", "b"]), ids(&["a"]));
        assert_eq!(plan.to_add, ids(&["b"]));
        assert!(plan.to_remove.is_empty());
    }

    #[test]
    fn test_outputs_are_disjoint_and_cover_the_delta() {
        let desired = ids(&["e", "b", "a", "f"]);
        let current = ids(&["a", "c", "d", "e"]);
        let plan = reconcile(desired.clone(), current.clone());

        let add: BTreeSet<_> = plan.to_add.iter().collect();
        let remove: BTreeSet<_> = plan.to_remove.iter().collect();
        assert!(add.is_disjoint(&remove));

        // to_add never overlaps current, to_remove is a subset of current.
        let current_set: BTreeSet<_> = current.iter().collect();
        assert!(add.is_disjoint(&current_set));
        assert!(remove.is_subset(&current_set));

        // Applying the plan to current yields exactly the desired set.
        let mut applied: BTreeSet<String> = current.into_iter().collect();
        for id in &plan.to_remove {
            applied.remove(id);
        }
        applied.extend(plan.to_add.iter().cloned());
        let desired_set: BTreeSet<String> = desired.into_iter().collect();
        assert_eq!(applied, desired_set);
    }

    #[test]
    fn test_reconcile_is_idempotent_after_apply() {
        let desired = ids(&["x", "y", "z"]);
        let current = ids(&["w", "x"]);
        let plan = reconcile(desired.clone(), current.clone());

        let mut applied: BTreeSet<String> = current.into_iter().collect();
        for id in &plan.to_remove {
            applied.remove(id);
        }
        applied.extend(plan.to_add.iter().cloned());

        let again = reconcile(desired, applied.into_iter().collect());
        assert!(again.is_empty());
    }

    #[test]
    fn test_reconcile_by_custom_order() {
        // Case-insensitive comparison treats "A" and "a" as the same key.
        let plan = reconcile_by(
            ids(&["A", "b"]),
            ids(&["a"]),
            |x, y| x.to_lowercase().cmp(&y.to_lowercase()),
        );
        assert_eq!(plan.to_add, ids(&["b"]));
        assert!(plan.to_remove.is_empty());
    }
}
