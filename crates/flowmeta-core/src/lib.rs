//! flowmeta-core - shared leaf types for the flowmeta pipeline.
//!
//! This crate holds the pieces that both the ingestion side and its
//! components agree on: the injected clock abstraction, canonical exporter
//! keys, interface metadata types and the longest-prefix subnet map used
//! for per-exporter settings.

pub mod clock;
pub mod key;
pub mod subnet;
pub mod types;

pub use clock::{Clock, MockClock, SystemClock};
pub use key::ExporterKey;
pub use subnet::{SubnetMap, SubnetParseError};
pub use types::{Interface, Resolved};
