//! Process-wide default registries.
//!
//! Most code should construct its own [`LivenessRegistry`] or
//! [`SequenceRegistry`] and pass it around; these shared instances exist for
//! callers that only need one table per process.

use lazy_static::lazy_static;

use crate::{liveness::LivenessRegistry, sequence::SequenceRegistry};

lazy_static! {
    static ref LIVENESS: LivenessRegistry = LivenessRegistry::new();
    static ref SEQUENCES: SequenceRegistry = SequenceRegistry::new();
}

pub fn liveness() -> &'static LivenessRegistry {
    &LIVENESS
}

pub fn sequences() -> &'static SequenceRegistry {
    &SEQUENCES
}
