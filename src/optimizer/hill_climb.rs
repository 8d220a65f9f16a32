//! `HillClimb`: local search over adjacent, partial-order-valid swaps
//! (spec §4.5).

use crate::filter::FilterTable;
use crate::partial_order::PartialOrder;
use crate::permutation::{make_valid_perm, Permutation};
use crate::stats::{strictly_better, Evaluation, StatsTracker};

use super::{swap_is_valid, Optimizer, Outcome};

/// Hill-climbing optimizer. Holds the current best permutation found so
/// far; each `step` enumerates adjacent swaps and accepts any that
/// strictly improves the expected cost (spec §4.5).
#[derive(Default)]
pub struct HillClimb {
    best: Option<Permutation>,
}

impl HillClimb {
    pub fn new() -> Self {
        HillClimb { best: None }
    }
}

impl Optimizer for HillClimb {
    fn seed(&mut self, current: &Permutation, _table: &FilterTable, po: &PartialOrder, _stats: &StatsTracker) {
        // `swap_is_valid` only ever swaps pairwise-incomparable filters, so
        // hill-climbing can never turn an already-invalid order into a
        // valid one by itself. Repair the seed up front instead of
        // silently climbing from (and returning) a REQUIRES-violating
        // permutation.
        let mut seeded = current.clone();
        if !seeded.is_topologically_valid(po) {
            seeded.set_size(0);
            make_valid_perm(&mut seeded, po);
        }
        self.best = Some(seeded);
    }

    fn step(
        &mut self,
        table: &FilterTable,
        po: &PartialOrder,
        stats: &StatsTracker,
        max_steps: usize,
    ) -> Outcome {
        let mut best = self.best.clone().expect("seed must be called before step");
        let n = best.len();
        if n <= 1 {
            self.best = Some(best.clone());
            return Outcome::Complete(best);
        }

        let mut current_eval = match stats.evaluate(&best, table) {
            Evaluation::NeedsData(_) => {
                self.best = Some(best.clone());
                return Outcome::NeedsData(best);
            }
            Evaluation::Scored { expected_cost, merit } => (expected_cost, merit),
        };

        let mut evaluated = 0usize;
        loop {
            let mut improved = false;
            for i in 0..n {
                for j in (i + 1)..n {
                    if !swap_is_valid(&best, i, j, po) {
                        continue;
                    }
                    if evaluated >= max_steps {
                        self.best = Some(best.clone());
                        return Outcome::Complete(best);
                    }
                    evaluated += 1;

                    let mut candidate = best.clone();
                    candidate.swap(i, j);
                    match stats.evaluate(&candidate, table) {
                        Evaluation::NeedsData(_) => {
                            self.best = Some(best.clone());
                            return Outcome::NeedsData(candidate);
                        }
                        Evaluation::Scored { expected_cost, merit } => {
                            if strictly_better((expected_cost, merit), current_eval) {
                                best = candidate;
                                current_eval = (expected_cost, merit);
                                improved = true;
                            }
                        }
                    }
                }
            }
            if !improved {
                self.best = Some(best.clone());
                return Outcome::Complete(best);
            }
        }
    }
}
