//! Durable store for the current clip set.
//!
//! One record per line with a fixed, comma-delimited field order:
//!
//! ```text
//! location,id,source stream id,game id,source stream name,captured at,duration,view count,title,vod offset,source video id
//! ```
//!
//! Missing or empty files are a valid "no records" state. Rewrites go through
//! a temporary file in the same directory and are renamed into place.

pub mod codec;
pub mod error;
pub mod store;

pub use codec::{decode_record, encode_record};
pub use error::{StoreError, StoreResult};
pub use store::{ClipStore, RewriteSummary};
