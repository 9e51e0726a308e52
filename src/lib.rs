//! # pulsekit: concurrent state registries for long-running services
//!
//! Three independent, in-process registries, each owning its own
//! synchronization:
//!
//! - [`liveness::LivenessRegistry`]: last-seen timestamps per integer id,
//!   answering whether an id is still alive against its timeout.
//! - [`sequence::SequenceRegistry`]: a strictly increasing counter per name,
//!   with an atomic "get next".
//! - [`sampler::ActivityRateSampler`]: counts items arriving on a stream
//!   within a window that is reset on a timer.
//!
//! Registry operations are total: an unknown id or name is a normal negative
//! answer. Only configuration loading returns [`Error`].
//!
//! ```
//! use pulsekit::{LivenessRegistry, SequenceRegistry};
//! use std::time::Duration;
//!
//! let sequences = SequenceRegistry::new();
//! sequences.set("orders", 41);
//! assert_eq!(sequences.next("orders"), 42);
//!
//! let liveness = LivenessRegistry::new();
//! liveness.register(1, Duration::from_secs(30));
//! assert!(liveness.is_alive(1));
//! ```
//!
//! [`global`] exposes shared default instances for callers that want one
//! table per process.

pub mod config;
pub mod error;
pub mod global;
pub mod liveness;
pub mod sampler;
pub mod sequence;
pub mod timestamp;

// Re-exports
pub use config::{LivenessConfig, RegistryConfig, SamplerConfig};
pub use error::*;
pub use liveness::{LivenessEntry, LivenessRegistry, LivenessReport};
pub use sampler::{ActivityRateSampler, SamplerSnapshot};
pub use sequence::{Sequence, SequenceRegistry};
pub use timestamp::Timestamp;
