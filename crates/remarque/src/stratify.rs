//! Multi-label stratified partitioning.
//!
//! Every user carries a set of labels (one per feature value, see
//! [`crate::data::offset_features`]). [`stratify`] assigns users to subsets
//! at the requested ratios while keeping each label's occurrences spread over
//! the subsets in those same ratios.
//!
//! # Algorithm
//!
//! Greedy, single pass:
//!
//! 1. Index users by label and compute target counts: overall
//!    `ratio * n_users` per subset, and per label `ratio * label_count`.
//! 2. Pick the label with the fewest unassigned users (ties: class order).
//!    Rare labels are the hardest to balance, so they are decided first.
//! 3. Assign each of its unassigned users to the subset with the largest
//!    remaining target for that label; on a tie, the largest remaining
//!    overall target; on a further tie, a uniformly random one.
//! 4. Decrement the chosen subset's overall target and, for every label the
//!    user carries, that label's target, and drop the user from every label
//!    pool. Repeat from 2 until all users are assigned.
//!
//! Subsets are returned as sorted row indices. Only the final tie-break is
//! random; pass a seeded RNG for reproducible output.
//!
//! # Example
//!
//! ```
//! use rand::SeedableRng;
//! use rand_xoshiro::Xoshiro256PlusPlus;
//! use remarque::stratify::stratify;
//!
//! let labels = vec![
//!     vec!["apple", "web"],
//!     vec!["apple", "mobile"],
//!     vec!["samsung", "web"],
//!     vec!["samsung", "mobile"],
//! ];
//! let classes = ["apple", "samsung", "web", "mobile"];
//! let mut rng = Xoshiro256PlusPlus::seed_from_u64(7);
//!
//! let split = stratify(&labels, &classes, 0.5, &mut rng).unwrap();
//! assert_eq!(split.test.len(), 2);
//! assert_eq!(split.control.len(), 2);
//! ```

use std::collections::{BTreeSet, HashMap, HashSet};
use std::hash::Hash;

use ndarray::{Array1, Array2, ArrayView1};
use rand::Rng;
use tracing::{debug, error};

use crate::data::FeatureTable;
use crate::error::{Result, SplitError};

/// Test and control row indices produced by [`stratify`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Partition {
    /// Rows assigned to the test (treatment) group, ascending.
    pub test: Vec<usize>,
    /// Rows assigned to the control group, ascending.
    pub control: Vec<usize>,
}

impl Partition {
    /// Total number of assigned rows.
    pub fn len(&self) -> usize {
        self.test.len() + self.control.len()
    }

    /// Returns true if no rows were assigned.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rows of `table` whose `user_column` value is in `test_ids` or
    /// `control_ids`. Ids absent from the table are ignored; an id listed in
    /// both groups counts as test. `user_column` must be a string column.
    pub fn from_ids(
        table: &FeatureTable,
        user_column: &str,
        test_ids: &[String],
        control_ids: &[String],
    ) -> Result<Self> {
        let test = table.rows_matching(user_column, test_ids)?;
        let in_test: HashSet<usize> = test.iter().copied().collect();
        let control = table
            .rows_matching(user_column, control_ids)?
            .into_iter()
            .filter(|row| !in_test.contains(row))
            .collect();
        Ok(Partition { test, control })
    }
}

/// Split users into test (`ratio`) and control (`1 - ratio`).
///
/// `labels[i]` lists the labels of user `i`; `classes` is the label universe
/// and fixes the order in which equally rare labels are processed. Labels
/// that occur in `labels` but not in `classes` are appended to the universe.
///
/// # Errors
///
/// [`SplitError::UnassignedUsers`] if some users cannot be reached through
/// any label (for example, users with an empty label list).
pub fn stratify<L, R>(labels: &[Vec<L>], classes: &[L], ratio: f64, rng: &mut R) -> Result<Partition>
where
    L: Eq + Hash + Clone,
    R: Rng + ?Sized,
{
    let mut subsets = stratify_ratios(labels, classes, &[ratio, 1.0 - ratio], rng)?;
    let control = subsets.pop().unwrap_or_default();
    let test = subsets.pop().unwrap_or_default();
    Ok(Partition { test, control })
}

/// Split users into `ratios.len()` subsets.
///
/// Generalization of [`stratify`]; the returned vector has one sorted index
/// list per ratio.
pub fn stratify_ratios<L, R>(
    labels: &[Vec<L>],
    classes: &[L],
    ratios: &[f64],
    rng: &mut R,
) -> Result<Vec<Vec<usize>>>
where
    L: Eq + Hash + Clone,
    R: Rng + ?Sized,
{
    let n_users = labels.len();
    let n_subsets = ratios.len();
    debug_assert!(n_subsets > 0, "at least one ratio is required");

    let mut state = LabelState::new(labels, classes, ratios);
    debug!(
        n_users,
        n_labels = state.pools.len(),
        ?ratios,
        "stratifying users"
    );

    let mut subset_sizes: Array1<f64> = ratios.iter().map(|r| r * n_users as f64).collect();
    let mut assigned: Vec<Vec<usize>> = vec![Vec::new(); n_subsets];
    let mut remaining = n_users;

    while remaining > 0 {
        let Some(label) = state.rarest_label() else {
            error!(
                remaining,
                total = n_users,
                "no label left with unassigned users"
            );
            return Err(SplitError::UnassignedUsers {
                remaining,
                total: n_users,
            });
        };

        while let Some(&user) = state.pools[label].first() {
            let subset = choose_subset(state.targets.row(label), subset_sizes.view(), rng);

            assigned[subset].push(user);
            remaining -= 1;
            subset_sizes[subset] -= 1.0;
            state.assign(user, subset);
        }
    }

    for subset in &mut assigned {
        subset.sort_unstable();
    }
    Ok(assigned)
}

/// Per-label bookkeeping for the greedy loop.
struct LabelState {
    /// Unassigned users carrying each label.
    pools: Vec<BTreeSet<usize>>,
    /// Remaining target count, `[label, subset]`.
    targets: Array2<f64>,
    /// Label ids of each user, in input order (duplicates kept).
    user_labels: Vec<Vec<usize>>,
    /// `(pool size, label)` of every non-empty pool.
    queue: BTreeSet<(usize, usize)>,
}

impl LabelState {
    fn new<L: Eq + Hash + Clone>(labels: &[Vec<L>], classes: &[L], ratios: &[f64]) -> Self {
        let mut ids: HashMap<L, usize> = HashMap::with_capacity(classes.len());
        for class in classes {
            let next = ids.len();
            ids.entry(class.clone()).or_insert(next);
        }

        let user_labels: Vec<Vec<usize>> = labels
            .iter()
            .map(|user| {
                user.iter()
                    .map(|label| {
                        let next = ids.len();
                        *ids.entry(label.clone()).or_insert(next)
                    })
                    .collect()
            })
            .collect();

        let mut pools = vec![BTreeSet::new(); ids.len()];
        for (user, user_ids) in user_labels.iter().enumerate() {
            for &l in user_ids {
                pools[l].insert(user);
            }
        }

        let targets = Array2::from_shape_fn((pools.len(), ratios.len()), |(l, s)| {
            ratios[s] * pools[l].len() as f64
        });

        let queue = pools
            .iter()
            .enumerate()
            .filter(|(_, pool)| !pool.is_empty())
            .map(|(label, pool)| (pool.len(), label))
            .collect();

        Self {
            pools,
            targets,
            user_labels,
            queue,
        }
    }

    /// Label with the fewest unassigned users, first in class order on ties.
    fn rarest_label(&self) -> Option<usize> {
        self.queue.first().map(|&(_, label)| label)
    }

    /// Remove `user` from every pool and charge its labels to `subset`.
    fn assign(&mut self, user: usize, subset: usize) {
        for &l in &self.user_labels[user] {
            self.targets[[l, subset]] -= 1.0;
            let before = self.pools[l].len();
            if self.pools[l].remove(&user) {
                self.queue.remove(&(before, l));
                if before > 1 {
                    self.queue.insert((before - 1, l));
                }
            }
        }
    }
}

/// Three-level tie-break: label need, then overall need, then a coin flip.
fn choose_subset<R: Rng + ?Sized>(
    label_targets: ArrayView1<'_, f64>,
    subset_sizes: ArrayView1<'_, f64>,
    rng: &mut R,
) -> usize {
    let candidates = argmax_all(label_targets, 0..label_targets.len());
    if let [only] = candidates[..] {
        return only;
    }
    let candidates = argmax_all(subset_sizes, candidates.into_iter());
    match candidates[..] {
        [only] => only,
        _ => candidates[rng.random_range(0..candidates.len())],
    }
}

/// Indices among `within` whose value equals the maximum.
fn argmax_all(values: ArrayView1<'_, f64>, within: impl Iterator<Item = usize> + Clone) -> Vec<usize> {
    let max = within
        .clone()
        .map(|i| values[i])
        .fold(f64::NEG_INFINITY, f64::max);
    within.filter(|&i| values[i] == max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::aview1;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    fn rng(seed: u64) -> Xoshiro256PlusPlus {
        Xoshiro256PlusPlus::seed_from_u64(seed)
    }

    fn assert_exhaustive(split: &Partition, n: usize) {
        let mut all: Vec<usize> = split.test.iter().chain(&split.control).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..n).collect::<Vec<_>>());
    }

    #[test]
    fn empty_input() {
        let labels: Vec<Vec<u32>> = Vec::new();
        let split = stratify(&labels, &[], 0.5, &mut rng(0)).unwrap();
        assert!(split.is_empty());
    }

    #[test]
    fn balanced_four_users() {
        let labels = vec![vec![0, 2], vec![0, 3], vec![1, 2], vec![1, 3]];
        for seed in 0..20 {
            let split = stratify(&labels, &[0, 1, 2, 3], 0.5, &mut rng(seed)).unwrap();
            assert_eq!(split.test.len(), 2);
            assert_eq!(split.control.len(), 2);
            assert_exhaustive(&split, 4);
            // each brand label lands once in each group
            let brand = |rows: &[usize]| rows.iter().map(|&r| labels[r][0]).collect::<BTreeSet<_>>();
            assert_eq!(brand(&split.test).len(), 2);
            assert_eq!(brand(&split.control).len(), 2);
        }
    }

    #[test]
    fn subsets_are_sorted() {
        let labels: Vec<Vec<u32>> = (0..50).map(|i| vec![i % 3, 10 + i % 7]).collect();
        let split = stratify(&labels, &[], 0.3, &mut rng(1)).unwrap();
        assert!(split.test.windows(2).all(|w| w[0] < w[1]));
        assert!(split.control.windows(2).all(|w| w[0] < w[1]));
        assert_exhaustive(&split, 50);
    }

    #[test]
    fn label_need_takes_precedence_over_overall_need() {
        // Both labels have two users. Whichever side the first user of a
        // label lands on, that label's remaining target then favours the
        // other side for its second user.
        let labels = vec![vec![7], vec![7], vec![1], vec![1]];
        for seed in 0..10 {
            let split = stratify(&labels, &[1, 7], 0.5, &mut rng(seed)).unwrap();
            let test_has = |r: usize| split.test.contains(&r);
            assert_ne!(test_has(0), test_has(1));
            assert_ne!(test_has(2), test_has(3));
        }
    }

    #[test]
    fn choose_subset_tie_break_levels() {
        let mut r = rng(0);
        // label need decides
        assert_eq!(choose_subset(aview1(&[0.0, 1.0]), aview1(&[5.0, 0.0]), &mut r), 1);
        // label tie, overall need decides
        assert_eq!(choose_subset(aview1(&[1.0, 1.0]), aview1(&[3.0, 2.0]), &mut r), 0);
        assert_eq!(choose_subset(aview1(&[1.0, 1.0]), aview1(&[2.0, 3.0]), &mut r), 1);
        // full tie is a coin flip, both outcomes occur
        let picks: BTreeSet<usize> = (0..64)
            .map(|_| choose_subset(aview1(&[1.0, 1.0]), aview1(&[2.0, 2.0]), &mut r))
            .collect();
        assert_eq!(picks.len(), 2);
    }

    #[test]
    fn unseen_labels_join_the_universe() {
        let labels = vec![vec!["a"], vec!["b"], vec!["a"], vec!["b"]];
        let split = stratify(&labels, &["a"], 0.5, &mut rng(11)).unwrap();
        assert_exhaustive(&split, 4);
    }

    #[test]
    fn users_without_labels_are_an_error() {
        let labels = vec![vec![1], vec![]];
        let err = stratify(&labels, &[1], 0.5, &mut rng(0)).unwrap_err();
        assert!(matches!(
            err,
            SplitError::UnassignedUsers {
                remaining: 1,
                total: 2
            }
        ));
    }

    #[test]
    fn same_seed_same_partition() {
        let labels: Vec<Vec<u32>> = (0..200).map(|i| vec![i % 5, 100 + i % 11]).collect();
        let a = stratify(&labels, &[], 0.5, &mut rng(42)).unwrap();
        let b = stratify(&labels, &[], 0.5, &mut rng(42)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn ratio_is_approximated() {
        let labels: Vec<Vec<u32>> = (0..1000).map(|i| vec![i % 4, 10 + i % 6, 20 + i % 3]).collect();
        let split = stratify(&labels, &[], 0.3, &mut rng(5)).unwrap();
        let frac = split.test.len() as f64 / 1000.0;
        assert!((frac - 0.3).abs() < 0.05, "test fraction {frac}");
    }

    #[test]
    fn three_way_split() {
        let labels: Vec<Vec<u32>> = (0..90).map(|i| vec![i % 3]).collect();
        let subsets = stratify_ratios(&labels, &[], &[0.2, 0.3, 0.5], &mut rng(9)).unwrap();
        let sizes: Vec<i64> = subsets.iter().map(|s| s.len() as i64).collect();
        assert_eq!(sizes.iter().sum::<i64>(), 90);
        for (got, want) in sizes.iter().zip([18, 27, 45]) {
            assert!((got - want).abs() <= 1, "sizes {sizes:?}");
        }
    }

    #[test]
    fn argmax_all_restricts_to_candidates() {
        assert_eq!(argmax_all(aview1(&[1.0, 3.0, 3.0]), 0..3), vec![1, 2]);
        assert_eq!(argmax_all(aview1(&[5.0, 3.0, 3.0]), [1usize, 2].into_iter()), vec![1, 2]);
    }

    #[test]
    fn rarest_label_follows_assignments() {
        let labels = vec![vec!["a", "b"], vec!["a", "c"], vec!["b", "c"], vec!["c"]];
        let mut state = LabelState::new(&labels, &["a", "b", "c"], &[0.5, 0.5]);
        // a: 2, b: 2, c: 3 -> tie resolved by class order.
        assert_eq!(state.rarest_label(), Some(0));

        state.assign(0, 0);
        // a: 1, b: 1, c: 3
        assert_eq!(state.rarest_label(), Some(0));
        state.assign(1, 1);
        // a done, b: 1, c: 2
        assert_eq!(state.rarest_label(), Some(1));
        state.assign(2, 0);
        state.assign(3, 1);
        assert_eq!(state.rarest_label(), None);
        assert_eq!(state.targets[[2, 0]], 0.5);
    }

    #[test]
    fn unique_labels_per_user_are_exhaustive() {
        let labels: Vec<Vec<usize>> = (0..5_000).map(|i| vec![i, 10_000 + i % 4]).collect();
        let split = stratify(&labels, &[], 0.5, &mut rng(3)).unwrap();
        assert_exhaustive(&split, 5_000);
        assert!((split.test.len() as i64 - 2_500).abs() <= 1);
    }

    #[test]
    fn partition_from_ids() {
        use crate::data::Column;
        let table = FeatureTable::new([
            ("user", Column::from_strs(["a", "b", "c", "d"])),
        ])
        .unwrap();
        let p = Partition::from_ids(
            &table,
            "user",
            &["c".to_string(), "a".to_string()],
            &["b".to_string(), "zz".to_string()],
        )
        .unwrap();
        assert_eq!(p.test, vec![0, 2]);
        assert_eq!(p.control, vec![1]);

        let both = Partition::from_ids(&table, "user", &["a".to_string()], &["a".to_string()]).unwrap();
        assert_eq!(both.test, vec![0]);
        assert!(both.control.is_empty());
    }
}
