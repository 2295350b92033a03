//! Run snapshots: a sorted, JSON-serializable image of the mutable state.
//!
//! Agents and edges are stored ascending by id so that a snapshot is a
//! canonical value: two equal simulation states always produce identical
//! snapshots, which makes trajectory comparison a single `assert_eq!`.
//!
//! Generator state is not part of the snapshot; callers that want exact
//! resumption keep the generator alongside it (it is `Clone`).

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::error::NgError;
use crate::people::Agent;
use crate::{AgentId, Time};

/// Serde bridge for timer fields where `Time::INFINITY` means "not
/// scheduled". JSON has no encoding for infinite floats, so infinity maps
/// to `null` on the wire and back.
pub mod time_as_opt {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use crate::Time;

    pub fn serialize<S: Serializer>(time: &Time, serializer: S) -> Result<S::Ok, S::Error> {
        let encoded = if time.is_finite() { Some(*time) } else { None };
        encoded.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Time, D::Error> {
        Ok(Option::<Time>::deserialize(deserializer)?.unwrap_or(Time::INFINITY))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub day: Time,
    /// Id watermark, so a resumed run never reissues an id that a removed
    /// agent once held.
    pub next_id: u64,
    /// Live agents ascending by id.
    pub agents: Vec<(AgentId, Agent)>,
    /// Active edges as (lesser id, greater id, expiry), ascending.
    pub edges: Vec<(AgentId, AgentId, Time)>,
}

impl Snapshot {
    pub(crate) fn capture(ctx: &Context) -> Self {
        let mut agents: Vec<(AgentId, Agent)> =
            ctx.people.iter().map(|(id, agent)| (id, *agent)).collect();
        agents.sort_unstable_by_key(|&(id, _)| id);
        Snapshot {
            day: ctx.now,
            next_id: ctx.people.next_id(),
            agents,
            edges: ctx.graph.edge_list(),
        }
    }

    pub fn write_json(&self, path: &Path) -> Result<(), NgError> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }

    pub fn read_json(path: &Path) -> Result<Self, NgError> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::Parameters;
    use crate::people::SiteState;

    #[test]
    fn infinite_timers_survive_json() {
        let site = SiteState::default();
        let json = serde_json::to_string(&site).unwrap();
        assert!(json.contains("null"));
        let back: SiteState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, site);

        let scheduled = SiteState { exposed_at: 12.5, ..SiteState::default() };
        let back: SiteState =
            serde_json::from_str(&serde_json::to_string(&scheduled).unwrap()).unwrap();
        assert_eq!(back.exposed_at, 12.5);
        assert!(back.recovers_at.is_infinite());
    }

    #[test]
    fn timers_round_trip_bit_exactly() {
        // Repeating binary fractions must come back with the same bits,
        // not merely within a ulp, or resumed trajectories drift.
        let site = SiteState {
            infected: true,
            exposed_at: 25.0 / 234.0,
            recovers_at: 365.0 / 7.0 + 1e-13,
            symptomatic: false,
        };
        let back: SiteState =
            serde_json::from_str(&serde_json::to_string(&site).unwrap()).unwrap();
        assert_eq!(back.exposed_at.to_bits(), site.exposed_at.to_bits());
        assert_eq!(back.recovers_at.to_bits(), site.recovers_at.to_bits());
    }

    #[test]
    fn snapshot_round_trips_through_a_file() {
        let mut ctx = Context::new(Parameters::baseline(), 88).unwrap();
        ctx.initialize_population(100);
        ctx.run(30).unwrap();

        let snapshot = ctx.snapshot();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("day30.json");
        snapshot.write_json(&path).unwrap();
        let restored = Snapshot::read_json(&path).unwrap();
        assert_eq!(restored, snapshot);
    }

    #[test]
    fn resumed_run_reproduces_the_original_trajectory() {
        let mut original = Context::new(Parameters::baseline(), 2024).unwrap();
        original.initialize_population(120);
        original.run(25).unwrap();

        let snapshot = original.snapshot();
        let rng = original.rng.clone();
        let mut resumed =
            Context::from_snapshot(Parameters::baseline(), &snapshot, rng).unwrap();
        assert_eq!(resumed.now(), original.now());

        original.run(25).unwrap();
        resumed.run(25).unwrap();
        assert_eq!(resumed.snapshot(), original.snapshot());
    }

    #[test]
    fn restore_rejects_corrupt_edges() {
        let mut ctx = Context::new(Parameters::baseline(), 5).unwrap();
        ctx.initialize_population(10);
        let mut snapshot = ctx.snapshot();
        let ghost_a = AgentId(9999);
        let ghost_b = AgentId(10_000);
        snapshot.edges.push((ghost_a, ghost_b, 50.0));
        let err = Context::from_snapshot(Parameters::baseline(), &snapshot, ctx.rng.clone());
        assert!(err.is_err());
    }

    #[test]
    fn restored_ids_do_not_collide_with_history() {
        let mut ctx = Context::new(Parameters::baseline(), 6).unwrap();
        ctx.initialize_population(10);
        let doomed = ctx.people.ids_ordered()[9];
        ctx.people.remove(doomed);

        let snapshot = ctx.snapshot();
        let mut resumed =
            Context::from_snapshot(Parameters::baseline(), &snapshot, ctx.rng.clone()).unwrap();
        let fresh = resumed.people.insert(crate::people::Agent::new(
            crate::people::Gender::Female,
            20.0,
            crate::people::Orientation::Hetero,
            crate::people::Risk::Low,
            0.5,
        ));
        assert!(fresh > doomed);
    }
}
