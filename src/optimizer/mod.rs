//! # Permutation Optimizers
//!
//! Two strategies search the space of topologically valid filter orderings
//! for one that minimizes `StatsTracker::evaluate`'s expected cost:
//!
//! - [`hill_climb::HillClimb`]: local search over adjacent, partial-order
//!   valid swaps (spec §4.5).
//! - [`best_first::BestFirst`]: priority-queue-driven construction of
//!   permutations prefix by prefix (spec §4.6).
//!
//! Both share the same outcome protocol: a step either reports
//! [`Outcome::Complete`] with a finished, topologically valid permutation,
//! or [`Outcome::NeedsData`] with a candidate the execution driver should
//! run on the next object so the missing measurement gets taken (spec §4.5,
//! §4.6, "RC_NODATA").

pub mod best_first;
pub mod hill_climb;

use crate::filter::FilterTable;
use crate::partial_order::{PartialOrder, Relation};
use crate::permutation::Permutation;
use crate::stats::StatsTracker;

pub use best_first::BestFirst;
pub use hill_climb::HillClimb;

/// Outcome of one round of optimization (spec §4.5, §4.6).
#[derive(Debug, Clone)]
pub enum Outcome {
    /// A complete, topologically valid permutation with no further
    /// improvement found (`RC_COMPLETE`).
    Complete(Permutation),
    /// Optimization is suspended because a filter in the candidate hasn't
    /// been sampled enough; the driver should execute `candidate` on the
    /// next object(s) and retry (`RC_NODATA`).
    NeedsData(Permutation),
}

/// Common interface implemented by both optimizer strategies, so the
/// execution driver can run whichever is configured as "the active
/// optimizer" without caring which one it is (spec §4.7).
pub trait Optimizer {
    /// (Re)seed the optimizer's internal state from the driver's current
    /// permutation. Called once per fresh optimization attempt.
    fn seed(&mut self, current: &Permutation, table: &FilterTable, po: &PartialOrder, stats: &StatsTracker);

    /// Run up to `max_steps` internal steps, returning either a finished
    /// result or a request for more data. Calling `step` again after
    /// `Complete` starts a fresh pass (needed for the "idempotent on no new
    /// samples" property in spec §8).
    fn step(
        &mut self,
        table: &FilterTable,
        po: &PartialOrder,
        stats: &StatsTracker,
        max_steps: usize,
    ) -> Outcome;
}

/// True iff swapping the filters at positions `i` and `j` (`i < j`) within
/// `perm` represents a legal reordering of a contiguous block: `perm[i]`
/// and `perm[j]` must be pairwise incomparable, and every filter strictly
/// between them must be incomparable with both (spec §4.5, step 1).
pub(crate) fn swap_is_valid(perm: &Permutation, i: usize, j: usize, po: &PartialOrder) -> bool {
    debug_assert!(i < j);
    let (fi, fj) = (perm.get(i), perm.get(j));
    if !po.incomparable(fi, fj) {
        return false;
    }
    for k in (i + 1)..j {
        let fk = perm.get(k);
        if !po.incomparable(fk, fi) || !po.incomparable(fk, fj) {
            return false;
        }
    }
    true
}

/// True iff no filter still outside the prefix is required (by `po`) to run
/// before any filter already placed in the prefix (spec §4.6,
/// `is_valid_partial_perm`).
pub(crate) fn is_valid_partial_perm(perm: &Permutation, po: &PartialOrder) -> bool {
    let n = perm.len();
    for i in 0..perm.prefix_size() {
        for j in perm.prefix_size()..n {
            if matches!(po.get(perm.get(i), perm.get(j)), Relation::Gt) {
                return false;
            }
        }
    }
    true
}
