//! `Search`: the facade spec §6 describes as exposed to collaborators -
//! `Search.start`, `Search.stats`, `Search.cancel`. Wires a [`FilterTable`]
//! and a set of collaborator implementations to an [`ExecutionDriver`], runs
//! a bounded worker pool (spec §5 "Worker pool sizing") that pulls objects
//! until `EndOfStream` or cancellation, and periodically reoptimizes the
//! permutation each worker runs against.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use serde::Serialize;
use tracing::info_span;

use crate::config::Config;
use crate::error::EngineError;
use crate::execution::backoff::{retry_with_backoff, BackoffPolicy};
use crate::execution::cache::CacheStats;
use crate::execution::cancel::CancelHandle;
use crate::execution::collaborators::{FilterRuntime, NextObject, ObjectStore, ResultSink};
use crate::execution::{ExecutionDriver, ObjectOutcome};
use crate::filter::FilterTable;
use crate::optimizer::Optimizer;
use crate::stats::FilterStats;

/// Snapshot returned by [`SearchHandle::stats`] (spec §6).
#[derive(Debug, Clone, Serialize)]
pub struct SearchStats {
    pub objects_processed: u64,
    pub objects_passed: u64,
    pub per_filter_stats: Vec<(String, FilterStats)>,
    pub cache: CacheStats,
}

/// A running (or finished) search session. Dropping this handle does not
/// stop the search; call [`SearchHandle::cancel`] and, if you need to wait
/// for workers to exit, [`SearchHandle::join`].
pub struct SearchHandle {
    driver: Arc<ExecutionDriver>,
    objects_processed: Arc<AtomicU64>,
    objects_passed: Arc<AtomicU64>,
    cancel: CancelHandle,
    management: Option<JoinHandle<()>>,
}

impl SearchHandle {
    pub fn stats(&self) -> SearchStats {
        let table = self.driver.table();
        let stats = self.driver.stats();
        let per_filter_stats = table
            .iter()
            .enumerate()
            .map(|(id, filter)| (filter.name.clone(), stats.snapshot(id)))
            .collect();
        SearchStats {
            objects_processed: self.objects_processed.load(Ordering::Relaxed),
            objects_passed: self.objects_passed.load(Ordering::Relaxed),
            per_filter_stats,
            cache: self.driver.cache().stats(),
        }
    }

    /// Request cancellation (spec §6, `Search.cancel`). Idempotent,
    /// non-blocking.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Block until every worker thread has exited.
    pub fn join(&mut self) {
        if let Some(handle) = self.management.take() {
            let _ = handle.join();
        }
    }
}

/// Entry point matching spec §6's `Search.start(filter_table, scope)`.
pub struct Search;

impl Search {
    /// Start a search session. `make_optimizer` is called once per worker
    /// thread so each worker reoptimizes with its own optimizer state
    /// (spec §4.7 runs one active optimizer per execution context).
    pub fn start(
        table: FilterTable,
        config: Config,
        mut make_optimizer: impl FnMut() -> Box<dyn Optimizer + Send> + Send + 'static,
        object_store: Arc<dyn ObjectStore>,
        runtime: Arc<dyn FilterRuntime>,
        sink: Arc<dyn ResultSink>,
    ) -> Result<SearchHandle, EngineError> {
        let driver = Arc::new(ExecutionDriver::new(table, config.clone())?);
        let objects_processed = Arc::new(AtomicU64::new(0));
        let objects_passed = Arc::new(AtomicU64::new(0));
        let cancel = driver.cancel_token().handle();

        let pool_size = config.resolved_worker_pool_size();
        let backoff_policy = BackoffPolicy {
            base_ms: config.backoff_base_ms,
            cap_ms: config.backoff_cap_ms,
            max_attempts: config.backoff_max_attempts,
        };
        let optimizers: Vec<_> = (0..pool_size).map(|_| make_optimizer()).collect();

        let driver_bg = Arc::clone(&driver);
        let objects_processed_bg = Arc::clone(&objects_processed);
        let objects_passed_bg = Arc::clone(&objects_passed);

        let management = std::thread::Builder::new()
            .name("siftcore-search".to_string())
            .spawn(move || {
                // A worker pool sized to the configured CPU budget; threads
                // are long-lived loops over the object store rather than
                // one-shot tasks (spec §5).
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(pool_size)
                    .build()
                    .expect("failed to build search worker pool");
                pool.scope(|scope| {
                    for (worker_id, mut optimizer) in optimizers.into_iter().enumerate() {
                        let driver = Arc::clone(&driver_bg);
                        let object_store = Arc::clone(&object_store);
                        let runtime = Arc::clone(&runtime);
                        let sink = Arc::clone(&sink);
                        let objects_processed = Arc::clone(&objects_processed_bg);
                        let objects_passed = Arc::clone(&objects_passed_bg);
                        scope.spawn(move |_| {
                            let span = info_span!("search_worker", worker_id);
                            let _enter = span.enter();
                            run_worker(
                                driver.as_ref(),
                                object_store.as_ref(),
                                runtime.as_ref(),
                                sink.as_ref(),
                                optimizer.as_mut(),
                                backoff_policy,
                                &objects_processed,
                                &objects_passed,
                            );
                        });
                    }
                });
            })
            .expect("failed to spawn search management thread");

        Ok(SearchHandle {
            driver,
            objects_processed,
            objects_passed,
            cancel,
            management: Some(management),
        })
    }
}

/// One worker's loop: pull an object, run it through the current
/// permutation, feed the optimizer, repeat until `EndOfStream` or
/// cancellation (spec §5, §4.7).
fn run_worker(
    driver: &ExecutionDriver,
    object_store: &dyn ObjectStore,
    runtime: &dyn FilterRuntime,
    sink: &dyn ResultSink,
    optimizer: &mut dyn Optimizer,
    backoff: BackoffPolicy,
    objects_processed: &AtomicU64,
    objects_passed: &AtomicU64,
) {
    loop {
        if driver.cancel_token().is_cancelled() {
            return;
        }

        match retry_with_backoff(backoff, "object_store", || object_store.next()) {
            Ok(NextObject::Object(object)) => {
                match driver.run_object(object, runtime, sink) {
                    Ok(ObjectOutcome::Emitted) => {
                        objects_processed.fetch_add(1, Ordering::Relaxed);
                        objects_passed.fetch_add(1, Ordering::Relaxed);
                    }
                    Ok(ObjectOutcome::Dropped) => {
                        objects_processed.fetch_add(1, Ordering::Relaxed);
                    }
                    Ok(ObjectOutcome::Cancelled) => return,
                    Err(err) => {
                        tracing::error!(error = %err, "search aborting");
                        driver.cancel_token().cancel();
                        return;
                    }
                }
                driver.maybe_reoptimize(optimizer);
            }
            Ok(NextObject::EndOfStream) => return,
            Err(err) => {
                tracing::error!(error = %err, "object store unavailable, aborting search");
                driver.cancel_token().cancel();
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::collaborators::{ClosureFilterRuntime, InMemoryObjectStore, InMemoryResultSink, ObjectRecord};
    use crate::optimizer::HillClimb;
    use crate::parser::parse_spec;
    use std::collections::HashMap;
    use std::time::Duration;

    #[test]
    fn search_processes_every_object_and_reports_stats() {
        let table = parse_spec("FILTER A\nTHRESHOLD 0\nFILTER B\nTHRESHOLD 0\n").unwrap();
        let mut config = Config::default();
        config.worker_pool_size = 2;
        config.reopt_interval = 1000;

        let objects = (0..20u64).map(ObjectRecord::new).collect();
        let object_store: Arc<dyn ObjectStore> = Arc::new(InMemoryObjectStore::new(objects));
        let mut rt = ClosureFilterRuntime::new();
        rt.register("A", |_o| Ok((5, HashMap::new())));
        rt.register("B", |_o| Ok((5, HashMap::new())));
        let runtime: Arc<dyn FilterRuntime> = Arc::new(rt);
        let sink = Arc::new(InMemoryResultSink::new());
        let sink_for_check = Arc::clone(&sink);
        let sink: Arc<dyn ResultSink> = sink;

        let mut handle = Search::start(
            table,
            config,
            || Box::new(HillClimb::new()),
            object_store,
            runtime,
            sink,
        )
        .unwrap();
        handle.join();

        let stats = handle.stats();
        assert_eq!(stats.objects_processed, 20);
        assert_eq!(stats.objects_passed, 20);
        assert_eq!(sink_for_check.emitted_ids().len(), 20);
    }

    #[test]
    fn cancel_stops_workers_before_stream_ends() {
        let table = parse_spec("FILTER A\nTHRESHOLD 0\n").unwrap();
        let mut config = Config::default();
        config.worker_pool_size = 1;

        // A store that never ends, so the only way the worker stops is
        // observing cancellation.
        struct Never;
        impl ObjectStore for Never {
            fn next(&self) -> Result<NextObject, EngineError> {
                std::thread::sleep(Duration::from_millis(1));
                Ok(NextObject::Object(ObjectRecord::new(1)))
            }
        }
        let object_store: Arc<dyn ObjectStore> = Arc::new(Never);
        let mut rt = ClosureFilterRuntime::new();
        rt.register("A", |_o| Ok((5, HashMap::new())));
        let runtime: Arc<dyn FilterRuntime> = Arc::new(rt);
        let sink: Arc<dyn ResultSink> = Arc::new(InMemoryResultSink::new());

        let mut handle = Search::start(
            table,
            config,
            || Box::new(HillClimb::new()),
            object_store,
            runtime,
            sink,
        )
        .unwrap();
        std::thread::sleep(Duration::from_millis(20));
        handle.cancel();
        handle.join();
        assert!(handle.is_cancelled());
    }
}
