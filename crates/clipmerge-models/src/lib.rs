//! Shared data models for the clip merge engine.
//!
//! This crate provides Serde-serializable types for:
//! - Clip records and their provenance metadata
//! - Word-level transcript timings carried through merges
//! - Encoding configuration for rendered merge products

pub mod encoding;
pub mod record;

// Re-export common types
pub use encoding::EncodingConfig;
pub use record::{normalize_title, ClipRecord, WordTiming};
