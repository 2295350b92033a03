//! The simulation context: all mutable run state behind one handle.
//!
//! A [`Context`] owns the parameter set, the agent registry, the
//! partnership graph, the clock and the run's single seeded generator.
//! Behavior lives in per-concern extension traits
//! ([`ContextMatchingExt`](crate::matching::ContextMatchingExt),
//! [`ContextPartnershipExt`](crate::partnerships::ContextPartnershipExt),
//! [`ContextInfectionExt`](crate::infection::ContextInfectionExt),
//! [`ContextTurnoverExt`](crate::turnover::ContextTurnoverExt)) so each
//! module stays readable while sharing one state bundle.
//!
//! A tick runs demographics, then partnerships, then infections, then
//! advances the clock by one day. Two contexts built with the same
//! parameters and seed produce identical trajectories.

use log::info;
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::Time;
use crate::error::NgError;
use crate::graph::PartnerGraph;
use crate::infection::ContextInfectionExt;
use crate::params::Parameters;
use crate::partnerships::ContextPartnershipExt;
use crate::people::People;
use crate::population::generate_population;
use crate::snapshot::Snapshot;
use crate::turnover::ContextTurnoverExt;

pub struct Context {
    pub(crate) params: Parameters,
    pub(crate) people: People,
    pub(crate) graph: PartnerGraph,
    pub(crate) rng: StdRng,
    pub(crate) now: Time,
}

impl Context {
    /// A fresh context at day zero with an empty population. Fails if the
    /// parameter set is malformed.
    pub fn new(params: Parameters, seed: u64) -> Result<Self, NgError> {
        params.validate()?;
        Ok(Context {
            params,
            people: People::new(),
            graph: PartnerGraph::new(),
            rng: StdRng::seed_from_u64(seed),
            now: 0.0,
        })
    }

    /// Draws the bootstrap population from the demographic tables.
    pub fn initialize_population(&mut self, size: usize) {
        for agent in generate_population(&self.params, size, &mut self.rng) {
            self.people.insert(agent);
        }
        info!("initialized population of {size} agents");
    }

    #[must_use]
    pub fn now(&self) -> Time {
        self.now
    }

    #[must_use]
    pub fn people(&self) -> &People {
        &self.people
    }

    #[must_use]
    pub fn graph(&self) -> &PartnerGraph {
        &self.graph
    }

    #[must_use]
    pub fn params(&self) -> &Parameters {
        &self.params
    }

    /// One simulated day: demographics, partnerships, infections, clock.
    pub fn advance_one_tick(&mut self) -> Result<(), NgError> {
        self.update_population()?;
        self.update_partnerships();
        self.update_infections();
        self.now += 1.0;
        Ok(())
    }

    pub fn run(&mut self, days: u64) -> Result<(), NgError> {
        info!("running {days} days from day {}", self.now);
        for _ in 0..days {
            self.advance_one_tick()?;
        }
        info!(
            "run complete at day {}: {} agents, {} infectious, {} partnerships",
            self.now,
            self.people.len(),
            self.people.infectious_count(),
            self.graph.edge_count()
        );
        Ok(())
    }

    /// Replaces the generator mid-run (counterfactual branching).
    pub fn reseed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::capture(self)
    }

    /// Rebuilds a context from a snapshot. The restored state is audited
    /// before use; resuming with the generator state saved alongside the
    /// snapshot reproduces the original trajectory exactly.
    pub fn from_snapshot(
        params: Parameters,
        snapshot: &Snapshot,
        rng: StdRng,
    ) -> Result<Self, NgError> {
        params.validate()?;
        let mut people = People::new();
        for &(id, agent) in &snapshot.agents {
            if people.contains(id) {
                return Err(NgError::invariant(format!("snapshot repeats agent id {id}")));
            }
            people.insert_with_id(id, agent);
        }
        people.reserve_ids_below(snapshot.next_id);
        let mut graph = PartnerGraph::new();
        for &(i, j, expiry) in &snapshot.edges {
            if !people.contains(i) || !people.contains(j) {
                return Err(NgError::invariant(format!(
                    "snapshot edge ({i}, {j}) references an unknown agent"
                )));
            }
            graph.insert(i, j, expiry);
        }
        graph.check_invariants(&people)?;
        Ok(Context { params, people, graph, rng, now: snapshot.day })
    }
}
