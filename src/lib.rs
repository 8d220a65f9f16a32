//! # siftcore
//!
//! Adaptive filter-execution core for an interactive brute-force search
//! platform: a specification parser, a partial order over filter
//! dependencies, two permutation optimizers (hill-climbing and best-first),
//! an online statistics tracker, a per-object execution driver, and a
//! bounded attribute cache.
//!
//! ## Pipeline
//!
//! ```text
//! filter-spec text
//!     -> parser::parse_spec            FilterTable
//!     -> partial_order::PartialOrder::from_table
//!     -> permutation::Permutation::identity   (initial order)
//!     -> search::Search::start          per-object execution + reoptimization loop
//! ```
//!
//! Each arriving object is run through `current_perm` by the execution
//! driver, short-circuiting on the first filter that drops it. Every
//! `REOPT_INTERVAL` objects the driver invokes the configured
//! [`optimizer::Optimizer`], which either returns a better, fully valid
//! permutation (`RC_COMPLETE`) or asks the driver to gather more
//! measurements first (`RC_NODATA`).

pub mod config;
pub mod error;
pub mod execution;
pub mod filter;
pub mod optimizer;
pub mod parser;
pub mod partial_order;
pub mod permutation;
pub mod search;
pub mod stats;

pub use config::Config;
pub use error::{EngineError, EngineResult};
pub use filter::{Filter, FilterTable};
pub use parser::parse_spec;
pub use partial_order::PartialOrder;
pub use permutation::Permutation;
pub use search::{Search, SearchHandle, SearchStats};
pub use stats::StatsTracker;
