//! An agent-based model of gonorrhea transmission on a dynamic sexual
//! partnership network.
//!
//! The simulation advances one day at a time. Each tick applies, in order:
//! * demographic turnover (imports, exits, sexual debut, aging),
//! * partnership dynamics (formation, then batch expiry),
//! * infection dynamics (transmission, state progression, treatment-seeking).
//!
//! All state for a run lives in a [`context::Context`]: the agent registry,
//! the partnership graph, the immutable parameter set and a seeded random
//! number generator. Runs are single-threaded and deterministic given a seed;
//! independent runs own independent `Context` values and can be driven in
//! parallel by an outer harness.
//!
//! Each engine concern contributes an extension trait implemented on
//! `Context`: [`matching::ContextMatchingExt`],
//! [`partnerships::ContextPartnershipExt`],
//! [`infection::ContextInfectionExt`] and [`turnover::ContextTurnoverExt`].

pub mod context;
pub mod error;
pub mod graph;
pub mod infection;
pub mod logging;
pub mod matching;
pub mod params;
pub mod partnerships;
pub mod people;
pub mod population;
pub mod random;
pub mod snapshot;
pub mod turnover;

pub use context::Context;
pub use error::NgError;
pub use params::Parameters;

use serde::{Deserialize, Serialize};

/// Simulation time, measured in days since the start of the run.
pub type Time = f64;

/// Stable identifier of an agent. Ids are never reused, even after the agent
/// leaves the population; the registry maps them to internal slots.
#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize,
)]
pub struct AgentId(pub(crate) u64);

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Number of modeled age bands: 16-19, 20-24, 25-29, 30-36.
pub const N_AGE_GROUPS: usize = 4;

/// Maps an age in years to its band index. Ages outside the modeled 16-36
/// range clamp to the nearest band; agents past 36 are removed by turnover
/// before the clamp matters.
#[must_use]
pub fn age_band(age: f64) -> usize {
    let band = ((age - 15.0) / 5.0).floor();
    if band < 0.0 {
        0
    } else {
        (band as usize).min(N_AGE_GROUPS - 1)
    }
}
