//! Merge pass runner.
//!
//! Runs the merge engine over clip stores on disk using the FFmpeg backends,
//! one blocking pass per store.

pub mod config;
pub mod metrics;
pub mod runner;

pub use config::WorkerConfig;
pub use self::metrics::{init_metrics, write_snapshot};
pub use runner::{discover_stores, run_directory, run_store_pass, StoreSummary};
