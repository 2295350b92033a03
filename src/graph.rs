//! The partnership graph: an adjacency-list structure with O(1) edge lookup
//! keyed by unordered id pairs.
//!
//! One record per unordered pair makes symmetry structural: there is no
//! (i, j) entry to drift apart from a (j, i) entry. Each edge carries its
//! expiry time; relationship type is not stored here. A long-term edge is
//! one backed by the endpoints' designated `partner` pointers, which live
//! on the agents themselves.

use rustc_hash::FxHashMap;

use crate::error::NgError;
use crate::people::People;
use crate::{AgentId, Time};

type PairKey = (AgentId, AgentId);

#[inline]
fn pair(i: AgentId, j: AgentId) -> PairKey {
    if i <= j { (i, j) } else { (j, i) }
}

#[derive(Default)]
pub struct PartnerGraph {
    /// Unordered pair → expiry time. Always finite: an edge with no expiry
    /// simply does not exist.
    edges: FxHashMap<PairKey, Time>,
    adjacency: FxHashMap<AgentId, Vec<AgentId>>,
}

impl PartnerGraph {
    #[must_use]
    pub fn new() -> Self {
        PartnerGraph::default()
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    #[must_use]
    pub fn contains(&self, i: AgentId, j: AgentId) -> bool {
        self.edges.contains_key(&pair(i, j))
    }

    #[must_use]
    pub fn expiry(&self, i: AgentId, j: AgentId) -> Option<Time> {
        self.edges.get(&pair(i, j)).copied()
    }

    /// Activates edge (i, j). Re-inserting an active edge replaces its
    /// expiry without duplicating adjacency entries.
    pub fn insert(&mut self, i: AgentId, j: AgentId, expiry: Time) {
        assert_ne!(i, j, "self-partnership for agent {i}");
        assert!(!expiry.is_nan(), "NaN expiry for edge ({i}, {j})");
        if self.edges.insert(pair(i, j), expiry).is_none() {
            self.adjacency.entry(i).or_default().push(j);
            self.adjacency.entry(j).or_default().push(i);
        }
    }

    pub fn remove(&mut self, i: AgentId, j: AgentId) -> bool {
        if self.edges.remove(&pair(i, j)).is_none() {
            return false;
        }
        self.unlink(i, j);
        self.unlink(j, i);
        true
    }

    fn unlink(&mut self, from: AgentId, to: AgentId) {
        if let Some(neighbors) = self.adjacency.get_mut(&from) {
            neighbors.retain(|&n| n != to);
            if neighbors.is_empty() {
                self.adjacency.remove(&from);
            }
        }
    }

    #[must_use]
    pub fn degree(&self, i: AgentId) -> usize {
        self.adjacency.get(&i).map_or(0, Vec::len)
    }

    /// Current partners of `i`, ascending by id.
    #[must_use]
    pub fn partners_of(&self, i: AgentId) -> Vec<AgentId> {
        let mut partners = self.adjacency.get(&i).cloned().unwrap_or_default();
        partners.sort_unstable();
        partners
    }

    /// Removes every edge incident to `i`, returning the severed
    /// counterparts in ascending order. Used when a new long-term
    /// relationship displaces all existing partnerships, and on removal
    /// from the population.
    pub fn sever_all(&mut self, i: AgentId) -> Vec<AgentId> {
        let partners = self.partners_of(i);
        for &j in &partners {
            self.remove(i, j);
        }
        partners
    }

    /// All edges with `expiry <= now`, ascending by pair key. Collected as
    /// a batch before any mutation so simultaneous expirations cannot
    /// interfere with each other.
    #[must_use]
    pub fn expired(&self, now: Time) -> Vec<PairKey> {
        let mut hits: Vec<PairKey> = self
            .edges
            .iter()
            .filter(|&(_, &expiry)| expiry <= now)
            .map(|(&key, _)| key)
            .collect();
        hits.sort_unstable();
        hits
    }

    /// Full structural audit against the registry. Run after every removal
    /// batch; a violation here is fatal for the run.
    pub fn check_invariants(&self, people: &People) -> Result<(), NgError> {
        let mut adjacency_total = 0;
        for (&id, neighbors) in &self.adjacency {
            if !people.contains(id) {
                return Err(NgError::invariant(format!(
                    "graph references removed agent {id}"
                )));
            }
            adjacency_total += neighbors.len();
            for &n in neighbors {
                if n == id {
                    return Err(NgError::invariant(format!("self-edge on agent {id}")));
                }
                if !self.edges.contains_key(&pair(id, n)) {
                    return Err(NgError::invariant(format!(
                        "adjacency ({id}, {n}) lacks an edge record"
                    )));
                }
            }
        }
        if adjacency_total != 2 * self.edges.len() {
            return Err(NgError::invariant(format!(
                "adjacency count {adjacency_total} does not match {} edges",
                self.edges.len()
            )));
        }
        for (&(i, j), &expiry) in &self.edges {
            if expiry.is_nan() {
                return Err(NgError::invariant(format!("NaN expiry on edge ({i}, {j})")));
            }
            if !people.contains(i) || !people.contains(j) {
                return Err(NgError::invariant(format!(
                    "edge ({i}, {j}) references a removed agent"
                )));
            }
        }
        for (id, agent) in people.iter() {
            if let Some(p) = agent.partner {
                let Some(counterpart) = people.get(p) else {
                    return Err(NgError::invariant(format!(
                        "agent {id} partner pointer targets removed agent {p}"
                    )));
                };
                if counterpart.partner != Some(id) {
                    return Err(NgError::invariant(format!(
                        "partner pointer {id} -> {p} is not mutual"
                    )));
                }
                if !self.contains(id, p) {
                    return Err(NgError::invariant(format!(
                        "long-term partners ({id}, {p}) share no active edge"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Sorted edge list for snapshots.
    #[must_use]
    pub fn edge_list(&self) -> Vec<(AgentId, AgentId, Time)> {
        let mut edges: Vec<_> = self
            .edges
            .iter()
            .map(|(&(i, j), &expiry)| (i, j, expiry))
            .collect();
        edges.sort_unstable_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
        edges
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::people::{Agent, Gender, Orientation, Risk};

    fn two_agents() -> (People, AgentId, AgentId) {
        let mut people = People::new();
        let a = people.insert(Agent::new(Gender::Female, 20.0, Orientation::Hetero, Risk::Low, 0.5));
        let b = people.insert(Agent::new(Gender::Male, 22.0, Orientation::Hetero, Risk::Low, 0.5));
        (people, a, b)
    }

    #[test]
    fn edges_are_symmetric() {
        let (_, a, b) = two_agents();
        let mut graph = PartnerGraph::new();
        graph.insert(a, b, 30.0);
        assert!(graph.contains(a, b));
        assert!(graph.contains(b, a));
        assert_eq!(graph.expiry(a, b), graph.expiry(b, a));
        assert_eq!(graph.partners_of(a), vec![b]);
        assert_eq!(graph.partners_of(b), vec![a]);
    }

    #[test]
    fn reinsert_updates_expiry_without_duplicates() {
        let (_, a, b) = two_agents();
        let mut graph = PartnerGraph::new();
        graph.insert(a, b, 30.0);
        graph.insert(b, a, 45.0);
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.degree(a), 1);
        assert_eq!(graph.expiry(a, b), Some(45.0));
    }

    #[test]
    fn expired_collects_batch_in_order() {
        let mut people = People::new();
        let ids: Vec<_> = (0..4)
            .map(|_| people.insert(Agent::new(Gender::Female, 20.0, Orientation::Bi, Risk::Low, 0.5)))
            .collect();
        let mut graph = PartnerGraph::new();
        graph.insert(ids[0], ids[1], 10.0);
        graph.insert(ids[2], ids[3], 10.0);
        graph.insert(ids[0], ids[3], 99.0);

        let expired = graph.expired(10.0);
        assert_eq!(expired, vec![(ids[0], ids[1]), (ids[2], ids[3])]);
        for (i, j) in expired {
            graph.remove(i, j);
        }
        assert_eq!(graph.edge_count(), 1);
        assert!(graph.contains(ids[0], ids[3]));
        // Removed edges stay gone: only the surviving edge can ever expire.
        assert!(!graph.contains(ids[0], ids[1]));
        assert!(!graph.contains(ids[2], ids[3]));
        assert_eq!(graph.expired(1e9), vec![(ids[0], ids[3])]);
    }

    #[test]
    fn sever_all_reports_counterparts() {
        let mut people = People::new();
        let ids: Vec<_> = (0..4)
            .map(|_| people.insert(Agent::new(Gender::Male, 24.0, Orientation::Bi, Risk::High, 0.5)))
            .collect();
        let mut graph = PartnerGraph::new();
        graph.insert(ids[0], ids[1], 10.0);
        graph.insert(ids[0], ids[2], 20.0);
        graph.insert(ids[1], ids[2], 30.0);

        let severed = graph.sever_all(ids[0]);
        assert_eq!(severed, vec![ids[1], ids[2]]);
        assert_eq!(graph.degree(ids[0]), 0);
        assert!(graph.contains(ids[1], ids[2]));
    }

    #[test]
    fn invariant_check_catches_dangling_pointer() {
        let (mut people, a, b) = two_agents();
        let mut graph = PartnerGraph::new();
        graph.insert(a, b, 50.0);
        people.person_mut(a).partner = Some(b);
        people.person_mut(b).partner = Some(a);
        assert!(graph.check_invariants(&people).is_ok());

        // Break mutuality.
        people.person_mut(b).partner = None;
        assert!(graph.check_invariants(&people).is_err());

        // Restore mutuality but drop the backing edge.
        people.person_mut(b).partner = Some(a);
        graph.remove(a, b);
        assert!(graph.check_invariants(&people).is_err());
    }

    #[test]
    fn invariant_check_catches_edge_to_removed_agent() {
        let (mut people, a, b) = two_agents();
        let mut graph = PartnerGraph::new();
        graph.insert(a, b, 50.0);
        people.remove(b);
        assert!(graph.check_invariants(&people).is_err());
    }
}
