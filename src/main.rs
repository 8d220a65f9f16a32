//! CLI harness (spec §10 "CLI surface"): loads a filter spec from disk, runs
//! it against a synthetic in-memory object corpus, and prints the resulting
//! per-filter statistics as JSON. A real deployment supplies its own object
//! store, blob store, and filter runtime (spec §1, §6); this binary exists
//! to exercise the core end to end without them.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use siftcore::config::Config;
use siftcore::error::EngineError;
use siftcore::execution::collaborators::{ClosureFilterRuntime, InMemoryObjectStore, InMemoryResultSink, ObjectRecord};
use siftcore::optimizer::{BestFirst, HillClimb, Optimizer};
use siftcore::parser::parse_spec;
use siftcore::Search;

#[derive(Copy, Clone, Debug, ValueEnum)]
enum OptimizerKind {
    HillClimb,
    BestFirst,
}

/// Run a filter spec against a synthetic object corpus and report
/// per-filter statistics.
#[derive(Parser, Debug)]
#[command(name = "siftcore", version, about)]
struct Cli {
    /// Path to a filter specification file.
    spec_file: PathBuf,

    /// Number of synthetic objects to push through the search.
    #[arg(long, default_value_t = 2000)]
    objects: u64,

    /// Which optimizer strategy drives reordering.
    #[arg(long, value_enum, default_value_t = OptimizerKind::HillClimb)]
    optimizer: OptimizerKind,

    /// Override the worker pool size (0 = number of logical CPUs).
    #[arg(long)]
    workers: Option<usize>,

    /// Override the reoptimization interval, in objects.
    #[arg(long)]
    reopt_interval: Option<u64>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let exit_code = match run(&cli) {
        Ok(()) => 0,
        Err(err) => {
            tracing::error!(error = %err, "search failed");
            err.downcast_ref::<EngineError>().map_or(1, EngineError::exit_code)
        }
    };
    std::process::exit(exit_code);
}

fn run(cli: &Cli) -> Result<()> {
    let source = fs::read_to_string(&cli.spec_file)
        .with_context(|| format!("reading spec file {}", cli.spec_file.display()))?;
    let table = parse_spec(&source)?;

    let mut config = Config::load().context("loading configuration")?;
    if let Some(workers) = cli.workers {
        config.worker_pool_size = workers;
    }
    if let Some(reopt_interval) = cli.reopt_interval {
        config.reopt_interval = reopt_interval;
    }

    let objects = (0..cli.objects).map(ObjectRecord::new).collect();
    let object_store = Arc::new(InMemoryObjectStore::new(objects));

    let mut runtime = ClosureFilterRuntime::new();
    for filter in table.iter() {
        let threshold = filter.threshold;
        // Deterministic synthetic score standing in for a real filter
        // runtime - filter code itself is out of scope here.
        runtime.register(filter.name.clone(), move |object: &ObjectRecord| {
            let hashed = (object.id.wrapping_mul(2_654_435_761) >> 8) % 100;
            Ok((hashed as i32 - threshold.min(50), HashMap::new()))
        });
    }

    let sink = Arc::new(InMemoryResultSink::new());
    let optimizer_kind = cli.optimizer;
    let make_optimizer = move || -> Box<dyn Optimizer + Send> {
        match optimizer_kind {
            OptimizerKind::HillClimb => Box::new(HillClimb::new()),
            OptimizerKind::BestFirst => Box::new(BestFirst::new()),
        }
    };

    let mut handle = Search::start(table, config, make_optimizer, object_store, Arc::new(runtime), sink)?;
    handle.join();

    println!("{}", serde_json::to_string_pretty(&handle.stats())?);
    Ok(())
}
