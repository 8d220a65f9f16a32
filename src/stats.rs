//! `StatsTracker`: online per-filter running averages of execution cost and
//! pass rate, plus the aggregate cost evaluator the optimizers call against
//! candidate permutations (spec §4.4).

use std::sync::atomic::{AtomicU64, Ordering};

use crate::filter::{FilterId, FilterTable};
use crate::permutation::Permutation;

/// Minimum number of samples a filter needs before its selectivity/cost
/// estimate is trusted enough to drive optimization (spec §4.4, §4.7).
pub const DEFAULT_MIN_SAMPLES: u64 = 30;
/// Assumed mean cost (in ticks) for a filter with no samples yet.
pub const DEFAULT_COST: f64 = 1000.0;

/// Per-filter running counters. All fields are independent atomics rather
/// than a single locked struct: `record` only ever adds to them, so there's
/// no cross-field invariant a lock would need to protect (spec §5 - "a
/// single lock held only for record" is one valid shape; per-counter
/// atomics is the lock-free equivalent for this particular shape of state).
#[derive(Debug, Default)]
struct FilterCounters {
    objects_seen: AtomicU64,
    objects_passed: AtomicU64,
    exec_ticks: AtomicU64,
}

/// Snapshot of one filter's running statistics, returned by
/// `StatsTracker::snapshot` for reporting (spec §6, `Search.stats`).
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct FilterStats {
    pub objects_seen: u64,
    pub objects_passed: u64,
    pub exec_ticks: u64,
    pub selectivity: f64,
    pub mean_cost: f64,
}

/// Result of scoring a permutation prefix (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Evaluation {
    /// Expected cost of the prefix (lower is better) plus the summed merit
    /// of filters in the prefix, used as an optimizer tie-break (spec §10).
    Scored { expected_cost: f64, merit: i64 },
    /// The filter at this index in the prefix hasn't been sampled enough
    /// yet; the caller should run the candidate permutation on more
    /// objects before asking again.
    NeedsData(FilterId),
}

/// Tracks per-filter statistics across a search and evaluates candidate
/// permutations against them.
pub struct StatsTracker {
    counters: Vec<FilterCounters>,
    min_samples: u64,
    default_cost: f64,
}

impl StatsTracker {
    pub fn new(n_filters: usize) -> Self {
        StatsTracker::with_config(n_filters, DEFAULT_MIN_SAMPLES, DEFAULT_COST)
    }

    pub fn with_config(n_filters: usize, min_samples: u64, default_cost: f64) -> Self {
        StatsTracker {
            counters: (0..n_filters).map(|_| FilterCounters::default()).collect(),
            min_samples,
            default_cost,
        }
    }

    pub fn min_samples(&self) -> u64 {
        self.min_samples
    }

    /// Record one filter invocation's outcome (spec §4.4). Returns `true`
    /// exactly once per filter: the call whose `objects_seen` reaches
    /// `min_samples` for the first time, so callers can trigger an
    /// immediate reoptimization the moment a filter becomes scoreable
    /// (spec §4.7 step 5).
    pub fn record(&self, filter_id: FilterId, passed: bool, ticks: u64) -> bool {
        let c = &self.counters[filter_id];
        let prev_seen = c.objects_seen.fetch_add(1, Ordering::Relaxed);
        if passed {
            c.objects_passed.fetch_add(1, Ordering::Relaxed);
        }
        c.exec_ticks.fetch_add(ticks, Ordering::Relaxed);
        prev_seen + 1 == self.min_samples
    }

    fn seen(&self, filter_id: FilterId) -> u64 {
        self.counters[filter_id].objects_seen.load(Ordering::Relaxed)
    }

    /// Laplace-smoothed pass rate: `(passed+1)/(seen+2)`. Returns 0.5 when
    /// unseen (spec §4.4).
    pub fn selectivity(&self, filter_id: FilterId) -> f64 {
        let c = &self.counters[filter_id];
        let seen = c.objects_seen.load(Ordering::Relaxed) as f64;
        let passed = c.objects_passed.load(Ordering::Relaxed) as f64;
        (passed + 1.0) / (seen + 2.0)
    }

    /// Mean ticks per call; returns `default_cost` when unseen (spec §4.4).
    pub fn cost(&self, filter_id: FilterId) -> f64 {
        let c = &self.counters[filter_id];
        let seen = c.objects_seen.load(Ordering::Relaxed);
        if seen == 0 {
            return self.default_cost;
        }
        c.exec_ticks.load(Ordering::Relaxed) as f64 / seen as f64
    }

    pub fn snapshot(&self, filter_id: FilterId) -> FilterStats {
        let c = &self.counters[filter_id];
        FilterStats {
            objects_seen: c.objects_seen.load(Ordering::Relaxed),
            objects_passed: c.objects_passed.load(Ordering::Relaxed),
            exec_ticks: c.exec_ticks.load(Ordering::Relaxed),
            selectivity: self.selectivity(filter_id),
            mean_cost: self.cost(filter_id),
        }
    }

    /// Expected cost of a permutation's prefix (spec §4.4):
    ///
    /// `E[cost] = sum_i cost(pi[i]) * prod_{j<i} selectivity(pi[j])`
    ///
    /// If any filter in the prefix has fewer than `min_samples`
    /// observations, scoring stops there and `NeedsData` is returned so the
    /// caller can gather more measurements first.
    pub fn evaluate(&self, perm: &Permutation, table: &FilterTable) -> Evaluation {
        let mut expected_cost = 0.0;
        let mut survival = 1.0;
        let mut merit = 0i64;

        for &filter_id in perm.prefix() {
            if self.seen(filter_id) < self.min_samples {
                return Evaluation::NeedsData(filter_id);
            }
            expected_cost += self.cost(filter_id) * survival;
            survival *= self.selectivity(filter_id);
            merit += i64::from(table.get(filter_id).merit);
        }

        Evaluation::Scored { expected_cost, merit }
    }
}

/// True iff `a` is a strict improvement over `b`: either a lower expected
/// cost, or an equal cost with strictly higher summed merit. Used by the
/// optimizers' acceptance tests, where accepting ties would loop forever
/// (spec §10).
pub fn strictly_better(a: (f64, i64), b: (f64, i64)) -> bool {
    const EPSILON: f64 = 1e-9;
    if (a.0 - b.0).abs() < EPSILON {
        a.1 > b.1
    } else {
        a.0 < b.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selectivity_defaults_to_half_when_unseen() {
        let stats = StatsTracker::new(1);
        assert!((stats.selectivity(0) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn cost_defaults_when_unseen() {
        let stats = StatsTracker::with_config(1, 30, 42.0);
        assert!((stats.cost(0) - 42.0).abs() < 1e-9);
    }

    #[test]
    fn record_updates_selectivity_and_cost() {
        let stats = StatsTracker::new(1);
        for _ in 0..9 {
            stats.record(0, true, 10);
        }
        stats.record(0, false, 10);
        // (9+1)/(10+2) = 10/12
        assert!((stats.selectivity(0) - (10.0 / 12.0)).abs() < 1e-9);
        assert!((stats.cost(0) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn selectivity_always_in_unit_interval() {
        let stats = StatsTracker::new(1);
        for i in 0..50 {
            stats.record(0, i % 3 == 0, 5);
            let s = stats.selectivity(0);
            assert!((0.0..=1.0).contains(&s));
        }
    }
}
