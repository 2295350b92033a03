//! Per-tick partnership dynamics: the formation pass, edge establishment
//! and batch expiry.
//!
//! The formation pass visits agents in ascending id order. Establishing a
//! long-term relationship displaces everything both members had going:
//! their existing edges are severed and any counterpart whose designated
//! pointer targeted a member has that pointer cleared, so the mutuality
//! invariant holds at every intermediate step.

use log::{debug, trace};

use crate::context::Context;
use crate::matching::{ContextMatchingExt, Relationship};
use crate::random::draw_uniform;
use crate::{AgentId, Time};

pub trait ContextPartnershipExt {
    /// One tick of partnership dynamics: formation then expiry.
    fn update_partnerships(&mut self);

    /// Records a new relationship between `i` and `j` lasting `duration`
    /// days from now.
    fn establish_partnership(
        &mut self,
        i: AgentId,
        j: AgentId,
        relationship: Relationship,
        duration: Time,
    );

    /// Removes every edge whose expiry has arrived, clearing designated
    /// pointers where the expiring edge backed them. The batch is
    /// collected before any removal.
    fn expire_partnerships(&mut self);
}

impl ContextPartnershipExt for Context {
    fn update_partnerships(&mut self) {
        let mut formed = 0_usize;
        for id in self.people.ids_ordered() {
            let agent = *self.people.person(id);
            if draw_uniform(&mut self.rng) >= self.prob_new_partnership(&agent) {
                continue;
            }
            let Some(candidate) = self.find_partner(id) else {
                continue;
            };
            let relationship = self.choose_relationship(id, candidate);
            let duration = self.relationship_duration(relationship, id, candidate);
            self.establish_partnership(id, candidate, relationship, duration);
            formed += 1;
        }
        self.expire_partnerships();
        debug!(
            "day {}: {formed} partnerships formed, {} edges active",
            self.now,
            self.graph.edge_count()
        );
    }

    fn establish_partnership(
        &mut self,
        i: AgentId,
        j: AgentId,
        relationship: Relationship,
        duration: Time,
    ) {
        if relationship == Relationship::Long {
            for member in [i, j] {
                for severed in self.graph.sever_all(member) {
                    let other = self.people.person_mut(severed);
                    if other.partner == Some(member) {
                        other.partner = None;
                    }
                }
                self.people.person_mut(member).partner = None;
            }
            self.people.person_mut(i).partner = Some(j);
            self.people.person_mut(j).partner = Some(i);
        }
        self.graph.insert(i, j, self.now + duration);
        self.people.person_mut(i).partner_count += 1;
        self.people.person_mut(j).partner_count += 1;
        trace!(
            "day {}: {i} and {j} formed a {relationship:?} relationship for {duration:.1} days",
            self.now
        );
    }

    fn expire_partnerships(&mut self) {
        let expired = self.graph.expired(self.now);
        for &(i, j) in &expired {
            if self.people.person(i).partner == Some(j) {
                self.people.person_mut(i).partner = None;
                self.people.person_mut(j).partner = None;
            }
            self.graph.remove(i, j);
            trace!("day {}: partnership ({i}, {j}) ended", self.now);
        }
        if !expired.is_empty() {
            debug!("day {}: {} partnerships expired", self.now, expired.len());
        }
    }
}
