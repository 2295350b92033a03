//! The agent registry: one [`Agent`] row per simulated person, stored in an
//! arena with stable external ids and unstable internal slots.
//!
//! Removal swap-deletes the slot and patches the id → slot map, so external
//! ids (including `partner` pointers and graph edges) survive any sequence
//! of demographic events without renumbering.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::{AgentId, Time, age_band};

/// Anatomical infection sites, in table order.
pub const N_SITES: usize = 3;
pub const RECTAL: usize = 0;
pub const URETHRAL: usize = 1;
pub const PHARYNGEAL: usize = 2;

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Serialize, Deserialize)]
pub enum Gender {
    Female = 0,
    Male = 1,
}

impl Gender {
    pub const ALL: [Gender; 2] = [Gender::Female, Gender::Male];

    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Serialize, Deserialize)]
pub enum Orientation {
    Hetero,
    Homo,
    Bi,
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Serialize, Deserialize)]
pub enum Risk {
    Low = 0,
    High = 1,
}

impl Risk {
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Aggregate disease state. `Infectious` holds iff at least one site is
/// infected; `Treated` carries immunity until `immune_until` wanes.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Serialize, Deserialize)]
pub enum DiseaseState {
    Susceptible,
    Exposed,
    Infectious,
    Treated,
}

/// Per-site infection record. `exposed_at` is the time latency ends and the
/// site turns infectious; `recovers_at` the time of natural clearance.
/// `Time::INFINITY` marks "not scheduled".
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SiteState {
    pub infected: bool,
    #[serde(with = "crate::snapshot::time_as_opt")]
    pub exposed_at: Time,
    #[serde(with = "crate::snapshot::time_as_opt")]
    pub recovers_at: Time,
    pub symptomatic: bool,
}

impl Default for SiteState {
    fn default() -> Self {
        SiteState {
            infected: false,
            exposed_at: Time::INFINITY,
            recovers_at: Time::INFINITY,
            symptomatic: false,
        }
    }
}

impl SiteState {
    /// A site is occupied while infected or incubating; an occupied site is
    /// never re-seeded.
    #[inline]
    #[must_use]
    pub fn occupied(&self) -> bool {
        self.infected || self.exposed_at.is_finite()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub gender: Gender,
    pub age: f64,
    pub orientation: Orientation,
    pub risk: Risk,
    /// Designated long-term partner. Mutual when set: `partner = Some(j)`
    /// implies agent j's pointer is `Some(i)` and edge (i, j) is active.
    pub partner: Option<AgentId>,
    /// Rolling count of partnerships entered; resettable between
    /// observation windows.
    pub partner_count: u32,
    pub state: DiseaseState,
    pub sites: [SiteState; N_SITES],
    /// Fixed care-seeking tolerance percentile in [0, 1]; drawn once at
    /// creation.
    pub treatment_threshold: f64,
    #[serde(with = "crate::snapshot::time_as_opt")]
    pub immune_until: Time,
}

impl Agent {
    /// A fresh susceptible agent with no partnership history.
    #[must_use]
    pub fn new(
        gender: Gender,
        age: f64,
        orientation: Orientation,
        risk: Risk,
        treatment_threshold: f64,
    ) -> Self {
        Agent {
            gender,
            age,
            orientation,
            risk,
            partner: None,
            partner_count: 0,
            state: DiseaseState::Susceptible,
            sites: [SiteState::default(); N_SITES],
            treatment_threshold,
            immune_until: Time::INFINITY,
        }
    }

    #[inline]
    #[must_use]
    pub fn age_group(&self) -> usize {
        age_band(self.age)
    }

    #[inline]
    #[must_use]
    pub fn is_single(&self) -> bool {
        self.partner.is_none()
    }

    #[must_use]
    pub fn infected_site_count(&self) -> usize {
        self.sites.iter().filter(|s| s.infected).count()
    }

    #[must_use]
    pub fn has_pending_exposure(&self) -> bool {
        self.sites.iter().any(|s| !s.infected && s.exposed_at.is_finite())
    }
}

/// The registry arena. Slots are packed; `remove` swap-deletes and patches
/// the moved agent's map entry.
pub struct People {
    agents: Vec<Agent>,
    ids: Vec<AgentId>,
    slot_of: FxHashMap<AgentId, usize>,
    next_id: u64,
}

impl Default for People {
    fn default() -> Self {
        People::new()
    }
}

impl People {
    #[must_use]
    pub fn new() -> Self {
        People {
            agents: Vec::new(),
            ids: Vec::new(),
            slot_of: FxHashMap::default(),
            next_id: 0,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn insert(&mut self, agent: Agent) -> AgentId {
        let id = AgentId(self.next_id);
        self.next_id += 1;
        self.slot_of.insert(id, self.agents.len());
        self.ids.push(id);
        self.agents.push(agent);
        id
    }

    /// Re-inserts an agent under a known id (snapshot restore).
    pub(crate) fn insert_with_id(&mut self, id: AgentId, agent: Agent) {
        assert!(
            !self.slot_of.contains_key(&id),
            "duplicate agent id {id} on restore"
        );
        self.slot_of.insert(id, self.agents.len());
        self.ids.push(id);
        self.agents.push(agent);
        self.next_id = self.next_id.max(id.0 + 1);
    }

    pub fn remove(&mut self, id: AgentId) -> Option<Agent> {
        let slot = self.slot_of.remove(&id)?;
        let agent = self.agents.swap_remove(slot);
        self.ids.swap_remove(slot);
        if slot < self.agents.len() {
            // Patch the mapping of the agent that filled the hole.
            self.slot_of.insert(self.ids[slot], slot);
        }
        Some(agent)
    }

    #[must_use]
    pub(crate) fn next_id(&self) -> u64 {
        self.next_id
    }

    /// Raises the id watermark (snapshot restore). Never lowers it: ids
    /// must stay unique across the whole history of a run.
    pub(crate) fn reserve_ids_below(&mut self, next: u64) {
        self.next_id = self.next_id.max(next);
    }

    #[must_use]
    pub fn contains(&self, id: AgentId) -> bool {
        self.slot_of.contains_key(&id)
    }

    #[must_use]
    pub fn get(&self, id: AgentId) -> Option<&Agent> {
        self.slot_of.get(&id).map(|&slot| &self.agents[slot])
    }

    pub fn get_mut(&mut self, id: AgentId) -> Option<&mut Agent> {
        let slot = *self.slot_of.get(&id)?;
        Some(&mut self.agents[slot])
    }

    /// Looks up an id known to be live. A miss means a dangling id escaped
    /// the removal path, which corrupts everything downstream; fail fast.
    #[must_use]
    pub fn person(&self, id: AgentId) -> &Agent {
        self.get(id)
            .unwrap_or_else(|| panic!("dangling agent id {id}"))
    }

    pub fn person_mut(&mut self, id: AgentId) -> &mut Agent {
        self.get_mut(id)
            .unwrap_or_else(|| panic!("dangling agent id {id}"))
    }

    /// Slot-order iteration. Callers whose draws depend on visit order must
    /// use [`People::ids_ordered`] instead.
    pub fn iter(&self) -> impl Iterator<Item = (AgentId, &Agent)> {
        self.ids.iter().copied().zip(self.agents.iter())
    }

    /// All live ids in ascending order: the canonical visit order for every
    /// random-consuming pass.
    #[must_use]
    pub fn ids_ordered(&self) -> Vec<AgentId> {
        let mut ids = self.ids.clone();
        ids.sort_unstable();
        ids
    }

    #[must_use]
    pub fn infectious_count(&self) -> usize {
        self.agents
            .iter()
            .filter(|a| a.state == DiseaseState::Infectious)
            .count()
    }

    /// Infected-agent counts per anatomical site.
    #[must_use]
    pub fn site_prevalence(&self) -> [usize; N_SITES] {
        let mut counts = [0; N_SITES];
        for agent in &self.agents {
            for (site, count) in agent.sites.iter().zip(&mut counts) {
                if site.infected {
                    *count += 1;
                }
            }
        }
        counts
    }

    #[must_use]
    pub fn cohort_count(&self, gender: Gender, age_group: usize) -> usize {
        self.agents
            .iter()
            .filter(|a| a.gender == gender && a.age_group() == age_group)
            .count()
    }

    /// Slot-order mutable iteration for passes that consume no randomness.
    pub fn agents_mut(&mut self) -> impl Iterator<Item = &mut Agent> {
        self.agents.iter_mut()
    }

    /// Resets the rolling partnership counters (observation-window
    /// boundaries in calibration harnesses).
    pub fn reset_partner_counts(&mut self) {
        for agent in &mut self.agents {
            agent.partner_count = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(age: f64) -> Agent {
        Agent::new(Gender::Female, age, Orientation::Hetero, Risk::Low, 0.5)
    }

    #[test]
    fn insert_assigns_fresh_ids() {
        let mut people = People::new();
        let a = people.insert(agent(20.0));
        let b = people.insert(agent(25.0));
        assert_ne!(a, b);
        assert_eq!(people.len(), 2);
        assert_eq!(people.person(a).age, 20.0);
        assert_eq!(people.person(b).age, 25.0);
    }

    #[test]
    fn remove_keeps_survivors_addressable() {
        let mut people = People::new();
        let a = people.insert(agent(20.0));
        let b = people.insert(agent(25.0));
        let c = people.insert(agent(30.0));

        let gone = people.remove(a).unwrap();
        assert_eq!(gone.age, 20.0);
        assert!(!people.contains(a));
        assert_eq!(people.len(), 2);
        // c was swapped into a's slot; both survivors still resolve.
        assert_eq!(people.person(b).age, 25.0);
        assert_eq!(people.person(c).age, 30.0);
    }

    #[test]
    fn ids_are_never_reused() {
        let mut people = People::new();
        let a = people.insert(agent(20.0));
        people.remove(a);
        let b = people.insert(agent(21.0));
        assert_ne!(a, b);
    }

    #[test]
    fn ordered_ids_ascend_after_churn() {
        let mut people = People::new();
        let ids: Vec<_> = (0..10).map(|i| people.insert(agent(16.0 + f64::from(i)))).collect();
        people.remove(ids[3]);
        people.remove(ids[7]);
        let ordered = people.ids_ordered();
        assert_eq!(ordered.len(), 8);
        assert!(ordered.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn site_prevalence_counts_infected_sites() {
        let mut people = People::new();
        let a = people.insert(agent(20.0));
        let b = people.insert(agent(24.0));
        people.person_mut(a).sites[URETHRAL].infected = true;
        people.person_mut(b).sites[URETHRAL].infected = true;
        people.person_mut(b).sites[PHARYNGEAL].infected = true;
        assert_eq!(people.site_prevalence(), [0, 2, 1]);
    }

    #[test]
    fn site_occupancy() {
        let mut site = SiteState::default();
        assert!(!site.occupied());
        site.exposed_at = 12.0;
        assert!(site.occupied());
        site.exposed_at = Time::INFINITY;
        site.infected = true;
        assert!(site.occupied());
    }
}
