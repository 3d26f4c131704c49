//! Clip deduplication and merge engine.
//!
//! This crate provides:
//! - [`OverlapGrouper`]: clusters clips that may overlap and orders each cluster
//! - [`FrameAligner`]: finds the frame at which one clip continues another
//! - [`MergeExecutor`]: the fixed-point merge loop over a clip set or store
//! - [`ClipAssembly`]: the final non-overlapping clip list
//!
//! The engine is synchronous. Hosts running an async runtime should drive a
//! pass from a blocking worker thread, one pass per store at a time.

pub mod aligner;
pub mod assembly;
pub mod config;
pub mod error;
pub mod executor;
pub mod grouper;
pub mod logging;
pub mod metrics;

pub use aligner::{similarity_score, Alignment, AlignmentOutcome, FrameAligner};
pub use assembly::{ClipAssembly, ReadinessCriteria};
pub use config::MergeConfig;
pub use error::{EngineError, EngineResult};
pub use executor::{merged_record, MergeExecutor, MergeOutcome, MergeReport, PairOutcome};
pub use grouper::{CandidatePair, Cluster, ClusterKey, ClusterOrdering, OverlapGrouper};
pub use logging::MergeLogger;
pub use self::metrics::names as metric_names;
