//! Execution Driver (spec §4.7): the per-object evaluation loop that runs
//! filters in the current permutation, short-circuits on drop, feeds
//! measurements back to the [`StatsTracker`], and periodically invokes the
//! active [`Optimizer`] to replace the permutation.
//!
//! Submodules provide the supporting machinery: [`cache`] (memoized filter
//! outputs), [`cancel`] (cooperative cancellation), [`backoff`] (retry
//! policy for flaky collaborators), and [`collaborators`] (the external
//! interfaces of spec §6 plus in-memory fixtures for tests and the CLI).

pub mod backoff;
pub mod cache;
pub mod cancel;
pub mod collaborators;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;
use dashmap::DashMap;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::EngineError;
use crate::filter::{FilterId, FilterTable};
use crate::optimizer::{Optimizer, Outcome};
use crate::partial_order::PartialOrder;
use crate::permutation::{make_valid_perm, Permutation};
use crate::stats::StatsTracker;

use cache::{AttributeCache, CachedAttrs};
use cancel::CancelToken;
use collaborators::{FilterRuntime, ObjectRecord, ResultSink};

/// Per-object result, for caller-side bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectOutcome {
    /// Every filter passed; the object was handed to the `ResultSink`.
    Emitted,
    /// Some filter's score fell below its threshold.
    Dropped,
    /// The search was cancelled before or during evaluation.
    Cancelled,
}

/// Owns everything one search session needs to run objects through the
/// current permutation and reoptimize it over time.
pub struct ExecutionDriver {
    table: FilterTable,
    po: PartialOrder,
    stats: StatsTracker,
    cache: AttributeCache,
    current_perm: ArcSwap<Permutation>,
    cancel: CancelToken,
    config: Config,
    objects_since_reopt: AtomicU64,
    consec_fails: DashMap<FilterId, u32>,
    /// Set when some filter's sample count crosses `min_samples` for the
    /// first time; makes the next `maybe_reoptimize` call fire regardless
    /// of `objects_since_reopt` (spec §4.7 step 5, second trigger).
    force_reopt: AtomicBool,
}

impl ExecutionDriver {
    pub fn new(table: FilterTable, config: Config) -> Result<Self, EngineError> {
        let po = PartialOrder::from_table(&table)?;
        let n = table.len();
        let stats = StatsTracker::with_config(n, config.min_samples, config.default_cost);
        let cache = AttributeCache::new(config.cache_byte_budget);
        // Declaration order is not necessarily a topological order - the
        // parser accepts forward REQUIRES references - so the identity
        // permutation can violate a REQUIRES edge. Start from an unplaced
        // permutation and let `make_valid_perm` produce a real linear
        // extension (spec §2, "initial permutation (any topological
        // order)").
        let mut initial_perm = Permutation::new(n);
        make_valid_perm(&mut initial_perm, &po);
        let current_perm = ArcSwap::from_pointee(initial_perm);
        Ok(ExecutionDriver {
            table,
            po,
            stats,
            cache,
            current_perm,
            cancel: CancelToken::new(),
            config,
            objects_since_reopt: AtomicU64::new(0),
            consec_fails: DashMap::new(),
            force_reopt: AtomicBool::new(false),
        })
    }

    pub fn table(&self) -> &FilterTable {
        &self.table
    }

    pub fn partial_order(&self) -> &PartialOrder {
        &self.po
    }

    pub fn stats(&self) -> &StatsTracker {
        &self.stats
    }

    pub fn cache(&self) -> &AttributeCache {
        &self.cache
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn current_perm(&self) -> Permutation {
        (**self.current_perm.load()).clone()
    }

    fn bump_consec_fails(&self, filter_id: FilterId) -> u32 {
        let mut entry = self.consec_fails.entry(filter_id).or_insert(0);
        *entry += 1;
        *entry
    }

    fn reset_consec_fails(&self, filter_id: FilterId) {
        self.consec_fails.remove(&filter_id);
    }

    /// Run one object through the permutation that was current when
    /// evaluation began (spec §4.7 steps 1-4, §5 "Ordering guarantees": a
    /// mid-object reorder never affects an already-started object).
    pub fn run_object(
        &self,
        mut object: ObjectRecord,
        runtime: &dyn FilterRuntime,
        sink: &dyn ResultSink,
    ) -> Result<ObjectOutcome, EngineError> {
        if self.cancel.is_cancelled() {
            return Ok(ObjectOutcome::Cancelled);
        }

        let perm = self.current_perm.load();
        for &filter_id in perm.as_slice() {
            if self.cancel.is_cancelled() {
                return Ok(ObjectOutcome::Cancelled);
            }

            let filter = self.table.get(filter_id);
            let signature = filter.signature();

            let (score, emitted) = match self.cache.get(signature, object.id) {
                Some(cached) => (cached.score, cached.attrs),
                None => {
                    let start = Instant::now();
                    match runtime.eval(filter, &object) {
                        Ok((score, emitted)) => {
                            self.reset_consec_fails(filter_id);
                            let ticks = start.elapsed().as_micros() as u64;
                            self.cache.insert(
                                signature,
                                object.id,
                                CachedAttrs {
                                    score,
                                    attrs: emitted.clone(),
                                },
                            );
                            if self.stats.record(filter_id, score >= filter.threshold, ticks) {
                                self.force_reopt.store(true, Ordering::Relaxed);
                            }
                            (score, emitted)
                        }
                        Err(err) => {
                            warn!(filter = %filter.name, object_id = object.id, error = %err, "filter eval failed");
                            let fails = self.bump_consec_fails(filter_id);
                            if fails > self.config.max_consec_fails as u32 {
                                error!(filter = %filter.name, fails, "too many consecutive failures, aborting search");
                                return Err(EngineError::TooManyConsecutiveFailures {
                                    filter: filter.name.clone(),
                                    count: fails,
                                });
                            }
                            return Ok(ObjectOutcome::Dropped);
                        }
                    }
                }
            };

            object.attributes.extend(emitted);
            if score < filter.threshold {
                debug!(filter = %filter.name, object_id = object.id, score, threshold = filter.threshold, "object dropped");
                return Ok(ObjectOutcome::Dropped);
            }
        }

        sink.emit(object);
        Ok(ObjectOutcome::Emitted)
    }

    /// Advance the reoptimization counter; invoke `optimizer` once
    /// `REOPT_INTERVAL` objects have passed through since the last attempt,
    /// or immediately if some filter's sample count just crossed
    /// `min_samples` for the first time (spec §4.7 step 5, both triggers).
    pub fn maybe_reoptimize(&self, optimizer: &mut dyn Optimizer) {
        let count = self.objects_since_reopt.fetch_add(1, Ordering::Relaxed) + 1;
        let forced = self.force_reopt.swap(false, Ordering::Relaxed);
        if !forced && count < self.config.reopt_interval {
            return;
        }
        self.objects_since_reopt.store(0, Ordering::Relaxed);
        self.reoptimize_now(optimizer);
    }

    /// Run one reoptimization attempt unconditionally. Called by
    /// `maybe_reoptimize` on either of its triggers, and usable directly by
    /// callers (tests, the CLI) that want to force a reoptimization now.
    pub fn reoptimize_now(&self, optimizer: &mut dyn Optimizer) {
        let current = self.current_perm();
        optimizer.seed(&current, &self.table, &self.po, &self.stats);
        match optimizer.step(&self.table, &self.po, &self.stats, self.config.max_opt_steps) {
            Outcome::Complete(perm) => {
                info!(perm = %perm.print(), "optimizer RC_COMPLETE, adopting new permutation");
                self.current_perm.store(Arc::new(perm));
            }
            Outcome::NeedsData(candidate) => {
                debug!(perm = %candidate.print(), "optimizer RC_NODATA, running candidate to gather samples");
                self.current_perm.store(Arc::new(candidate));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::HillClimb;
    use crate::parser::parse_spec;
    use collaborators::{ClosureFilterRuntime, InMemoryResultSink};
    use std::collections::HashMap;

    fn driver_for(spec: &str) -> ExecutionDriver {
        let table = parse_spec(spec).unwrap();
        ExecutionDriver::new(table, Config::default()).unwrap()
    }

    #[test]
    fn short_circuits_on_first_drop() {
        let driver = driver_for("FILTER A\nTHRESHOLD 10\nFILTER B\nTHRESHOLD 0\n");
        let mut rt = ClosureFilterRuntime::new();
        rt.register("A", |_o| Ok((3, HashMap::new())));
        rt.register("B", |_o| panic!("B must not run once A drops the object"));
        let sink = InMemoryResultSink::new();

        let outcome = driver
            .run_object(ObjectRecord::new(1), &rt, &sink)
            .unwrap();
        assert_eq!(outcome, ObjectOutcome::Dropped);
        assert!(sink.emitted_ids().is_empty());

        let a_id = driver.table().id_of("A").unwrap();
        let snap = driver.stats().snapshot(a_id);
        assert_eq!(snap.objects_seen, 1);
        assert_eq!(snap.objects_passed, 0);
    }

    #[test]
    fn emits_object_that_passes_every_filter() {
        let driver = driver_for("FILTER A\nTHRESHOLD 0\nFILTER B\nTHRESHOLD 0\n");
        let mut rt = ClosureFilterRuntime::new();
        rt.register("A", |_o| Ok((5, HashMap::new())));
        rt.register("B", |_o| Ok((5, HashMap::new())));
        let sink = InMemoryResultSink::new();

        let outcome = driver.run_object(ObjectRecord::new(1), &rt, &sink).unwrap();
        assert_eq!(outcome, ObjectOutcome::Emitted);
        assert_eq!(sink.emitted_ids(), vec![1]);
    }

    #[test]
    fn too_many_consecutive_failures_aborts() {
        let mut config = Config::default();
        config.max_consec_fails = 2;
        let table = parse_spec("FILTER A\nTHRESHOLD 0\n").unwrap();
        let driver = ExecutionDriver::new(table, config).unwrap();
        let mut rt = ClosureFilterRuntime::new();
        rt.register("A", |_o| {
            Err(EngineError::FilterEvalError {
                filter: "A".into(),
                object_id: 0,
                message: "boom".into(),
            })
        });
        let sink = InMemoryResultSink::new();

        for id in 0..2 {
            let outcome = driver.run_object(ObjectRecord::new(id), &rt, &sink).unwrap();
            assert_eq!(outcome, ObjectOutcome::Dropped);
        }
        let err = driver.run_object(ObjectRecord::new(99), &rt, &sink).unwrap_err();
        assert!(matches!(err, EngineError::TooManyConsecutiveFailures { .. }));
    }

    #[test]
    fn initial_permutation_respects_a_forward_requires_reference() {
        // B is declared before A, but REQUIRES A - declaration order is
        // not a topological order here.
        let driver = driver_for("FILTER B\nTHRESHOLD 0\nREQUIRES A\nFILTER A\nTHRESHOLD 0\n");
        let perm = driver.current_perm();
        assert!(perm.is_valid_permutation());
        assert!(perm.is_topologically_valid(driver.partial_order()));
        let a = driver.table().id_of("A").unwrap();
        let b = driver.table().id_of("B").unwrap();
        assert!(perm.position_of(a).unwrap() < perm.position_of(b).unwrap());
    }

    #[test]
    fn maybe_reoptimize_fires_immediately_when_min_samples_is_first_reached() {
        // reopt_interval is effectively unreachable within this test, so the
        // only thing that can trigger reoptimization here is the
        // first-crossing-of-min_samples path wired through `run_object`.
        let config = Config {
            reopt_interval: 1_000_000,
            min_samples: 5,
            ..Config::default()
        };
        let table = parse_spec("FILTER A\nTHRESHOLD 0\nFILTER B\nTHRESHOLD 0\n").unwrap();
        let driver = ExecutionDriver::new(table, config).unwrap();
        let a = driver.table().id_of("A").unwrap();
        let b = driver.table().id_of("B").unwrap();

        // A lets almost everything through (selectivity ~0.9), B drops
        // almost everything it sees (selectivity ~0.1) - cheaper to run B
        // first.
        let mut rt = ClosureFilterRuntime::new();
        rt.register("A", |o: &ObjectRecord| {
            Ok((if o.id % 10 != 0 { 1 } else { -1 }, HashMap::new()))
        });
        rt.register("B", |o: &ObjectRecord| {
            Ok((if o.id % 10 == 0 { 1 } else { -1 }, HashMap::new()))
        });
        let sink = InMemoryResultSink::new();
        let mut hc = HillClimb::new();

        for id in 1..=5u64 {
            driver.run_object(ObjectRecord::new(id), &rt, &sink).unwrap();
            driver.maybe_reoptimize(&mut hc);
        }

        let perm = driver.current_perm();
        assert_eq!(
            perm.as_slice(),
            &[b, a],
            "crossing min_samples should reoptimize immediately, well before reopt_interval"
        );
    }

    #[test]
    fn reoptimize_adopts_a_topologically_valid_permutation() {
        let driver = driver_for("FILTER A\nTHRESHOLD 0\nFILTER B\nTHRESHOLD 0\n");
        let a = driver.table().id_of("A").unwrap();
        let b = driver.table().id_of("B").unwrap();
        for i in 0..50u64 {
            driver.stats().record(a, i % 10 != 0, 10); // selectivity ~0.9
            driver.stats().record(b, i % 10 == 0, 10); // selectivity ~0.1
        }
        let mut hc = HillClimb::new();
        driver.reoptimize_now(&mut hc);
        let perm = driver.current_perm();
        assert!(perm.is_valid_permutation());
        assert!(perm.is_topologically_valid(driver.partial_order()));
        assert_eq!(perm.as_slice(), &[b, a]);
    }
}
