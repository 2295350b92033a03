//! Partner matching: who an agent seeking a partnership ends up with, and
//! what kind of relationship the pair forms.
//!
//! Matching is a fixed five-step pipeline so that a run consumes randomness
//! in a reproducible order:
//!   1. candidate pool by mutual orientation acceptance, ascending by id;
//!   2. partner age group by inverse CDF over the seeker's mixing row,
//!      masked to groups actually present in the pool;
//!   3. partner risk level by a single Bernoulli draw, with no fallback
//!      when the pool has nobody of the drawn level;
//!   4. one fidelity draw deciding whether the match comes from the
//!      partnered or the single side of the pool;
//!   5. uniform choice among the survivors.
//! Any step can come up empty, in which case the seeker goes unmatched
//! this tick.

use rand::Rng;

use crate::context::Context;
use crate::people::{Agent, Gender, Orientation, Risk};
use crate::random::{draw_uniform, sample_categorical, sample_exp, sample_gamma};
use crate::{AgentId, N_AGE_GROUPS, Time};

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Relationship {
    Long,
    Short,
}

/// Whether an agent of the given gender and orientation accepts a partner
/// of the other gender.
fn accepts(gender: Gender, orientation: Orientation, other: Gender) -> bool {
    match orientation {
        Orientation::Hetero => gender != other,
        Orientation::Homo => gender == other,
        Orientation::Bi => true,
    }
}

struct Candidate {
    id: AgentId,
    age_group: usize,
    risk: Risk,
    partnered: bool,
}

pub trait ContextMatchingExt {
    /// Runs the matching pipeline for `seeker`. `None` means no match this
    /// tick.
    fn find_partner(&mut self, seeker: AgentId) -> Option<AgentId>;

    /// Relationship type for a newly matched pair. A pair with any
    /// existing designated partner is forced short term; otherwise the
    /// long-term mass from the seeker's age row is scaled down by the
    /// dyad's risk aversion.
    fn choose_relationship(&mut self, seeker: AgentId, candidate: AgentId) -> Relationship;

    /// Draws the duration of a new relationship, in days.
    fn relationship_duration(
        &mut self,
        relationship: Relationship,
        seeker: AgentId,
        candidate: AgentId,
    ) -> Time;

    /// Per-day probability that this agent seeks a new partnership.
    fn prob_new_partnership(&self, agent: &Agent) -> f64;
}

/// Number of high-risk members in a pair, indexing the aversion and
/// long-term duration tables.
fn dyad_risk(a: &Agent, b: &Agent) -> usize {
    a.risk.index() + b.risk.index()
}

impl ContextMatchingExt for Context {
    fn find_partner(&mut self, seeker: AgentId) -> Option<AgentId> {
        let me = *self.people.person(seeker);

        let mut pool: Vec<Candidate> = Vec::new();
        for id in self.people.ids_ordered() {
            // No self-matching and no duplicate edges with current partners.
            if id == seeker || self.graph.contains(seeker, id) {
                continue;
            }
            let other = self.people.person(id);
            if accepts(me.gender, me.orientation, other.gender)
                && accepts(other.gender, other.orientation, me.gender)
            {
                pool.push(Candidate {
                    id,
                    age_group: other.age_group(),
                    risk: other.risk,
                    partnered: !other.is_single(),
                });
            }
        }
        if pool.is_empty() {
            return None;
        }

        let mixing = &self.params.partnering.age_mixing[me.age_group()];
        let preference = &self.params.partnering.age_preference[me.gender.index()];
        let mut weights = [0.0; N_AGE_GROUPS];
        for k in 0..N_AGE_GROUPS {
            if pool.iter().any(|c| c.age_group == k) {
                weights[k] = mixing[k] * preference[k];
            }
        }
        let group = sample_categorical(&mut self.rng, &weights)?;

        let want_high = draw_uniform(&mut self.rng) < self.params.partnering.p_risky[me.risk.index()];
        let wanted = if want_high { Risk::High } else { Risk::Low };
        pool.retain(|c| c.age_group == group && c.risk == wanted);
        if pool.is_empty() {
            return None;
        }

        // One fidelity draw against the seeker's own risk level: a cheating
        // match comes from the partnered side of the pool, a faithful one
        // from the single side.
        let cheats =
            draw_uniform(&mut self.rng) < self.params.partnering.p_cheat[me.risk.index()];
        let survivors: Vec<AgentId> =
            pool.iter().filter(|c| c.partnered == cheats).map(|c| c.id).collect();
        if survivors.is_empty() {
            return None;
        }
        let pick = self.rng.random_range(0..survivors.len());
        Some(survivors[pick])
    }

    fn choose_relationship(&mut self, seeker: AgentId, candidate: AgentId) -> Relationship {
        let a = *self.people.person(seeker);
        let b = *self.people.person(candidate);
        if !a.is_single() || !b.is_single() {
            return Relationship::Short;
        }
        let p_long = self.params.partnering.relationship_mixing[a.age_group()][0];
        let aversion = self.params.partnering.aversion[dyad_risk(&a, &b)];
        if draw_uniform(&mut self.rng) < aversion * p_long {
            Relationship::Long
        } else {
            Relationship::Short
        }
    }

    fn relationship_duration(
        &mut self,
        relationship: Relationship,
        seeker: AgentId,
        candidate: AgentId,
    ) -> Time {
        match relationship {
            Relationship::Short => {
                sample_exp(&mut self.rng, self.params.partnering.short_duration_mean)
            }
            Relationship::Long => {
                let a = *self.people.person(seeker);
                let b = *self.people.person(candidate);
                let gamma = self.params.partnering.long_duration[dyad_risk(&a, &b)];
                sample_gamma(&mut self.rng, gamma.mean, gamma.var)
            }
        }
    }

    fn prob_new_partnership(&self, agent: &Agent) -> f64 {
        let rate = self.params.partnering.formation_rates[agent.risk.index()][agent.age_group()];
        if agent.is_single() {
            rate
        } else {
            // A partnered agent only looks around if they would cheat.
            self.params.partnering.p_cheat[agent.risk.index()] * rate
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::Parameters;

    fn context_with(params: Parameters, seed: u64) -> Context {
        Context::new(params, seed).unwrap()
    }

    fn insert(
        ctx: &mut Context,
        gender: Gender,
        age: f64,
        orientation: Orientation,
        risk: Risk,
    ) -> AgentId {
        ctx.people.insert(Agent::new(gender, age, orientation, risk, 0.5))
    }

    /// Degenerate probabilities so the low-risk candidate is always wanted
    /// and cheat draws never fire.
    fn deterministic_params() -> Parameters {
        let mut params = Parameters::baseline();
        params.partnering.p_risky = [0.0, 0.0];
        params.partnering.p_cheat = [0.0, 0.0];
        params
    }

    #[test]
    fn lone_compatible_candidate_is_always_matched() {
        for seed in 0..20 {
            let mut ctx = context_with(deterministic_params(), seed);
            let seeker = insert(&mut ctx, Gender::Female, 22.0, Orientation::Hetero, Risk::Low);
            let target = insert(&mut ctx, Gender::Male, 23.0, Orientation::Hetero, Risk::Low);
            // Same gender and a high-risk alternative should never win.
            insert(&mut ctx, Gender::Female, 22.0, Orientation::Hetero, Risk::Low);
            insert(&mut ctx, Gender::Male, 23.0, Orientation::Hetero, Risk::High);
            assert_eq!(ctx.find_partner(seeker), Some(target), "seed {seed}");
        }
    }

    #[test]
    fn empty_pool_is_unmatched() {
        let mut ctx = context_with(deterministic_params(), 7);
        let seeker = insert(&mut ctx, Gender::Male, 25.0, Orientation::Homo, Risk::Low);
        // Only hetero women around: nobody accepts him, he accepts nobody.
        insert(&mut ctx, Gender::Female, 25.0, Orientation::Hetero, Risk::Low);
        assert_eq!(ctx.find_partner(seeker), None);
    }

    #[test]
    fn orientation_acceptance_is_mutual() {
        let mut ctx = context_with(deterministic_params(), 7);
        let seeker = insert(&mut ctx, Gender::Male, 25.0, Orientation::Bi, Risk::Low);
        // A bi man accepts a hetero man, but not vice versa.
        insert(&mut ctx, Gender::Male, 25.0, Orientation::Hetero, Risk::Low);
        assert_eq!(ctx.find_partner(seeker), None);
        let woman = insert(&mut ctx, Gender::Female, 25.0, Orientation::Hetero, Risk::Low);
        assert_eq!(ctx.find_partner(seeker), Some(woman));
    }

    #[test]
    fn zero_mixing_mass_blocks_the_only_candidate() {
        let mut params = deterministic_params();
        // Band-0 seekers partner only within band 0.
        params.partnering.age_mixing[0] = [1.0, 0.0, 0.0, 0.0];
        let mut ctx = context_with(params, 11);
        let seeker = insert(&mut ctx, Gender::Female, 17.0, Orientation::Hetero, Risk::Low);
        insert(&mut ctx, Gender::Male, 33.0, Orientation::Hetero, Risk::Low);
        assert_eq!(ctx.find_partner(seeker), None);
    }

    #[test]
    fn fidelity_draw_selects_the_pool_side() {
        let build = |p_cheat: f64, seed: u64| {
            let mut params = deterministic_params();
            params.partnering.p_cheat = [p_cheat, p_cheat];
            let mut ctx = context_with(params, seed);
            let seeker = insert(&mut ctx, Gender::Female, 22.0, Orientation::Hetero, Risk::Low);
            let taken = insert(&mut ctx, Gender::Male, 23.0, Orientation::Hetero, Risk::Low);
            let spouse = insert(&mut ctx, Gender::Female, 24.0, Orientation::Hetero, Risk::Low);
            ctx.people.person_mut(taken).partner = Some(spouse);
            ctx.people.person_mut(spouse).partner = Some(taken);
            (ctx, seeker, taken)
        };
        for seed in 0..10 {
            // Faithful draw: the only candidate is partnered, so no match.
            let (mut ctx, seeker, _) = build(0.0, seed);
            assert_eq!(ctx.find_partner(seeker), None);
            // Certain cheating: the partnered candidate is the match.
            let (mut ctx, seeker, taken) = build(1.0, seed);
            assert_eq!(ctx.find_partner(seeker), Some(taken));
        }
    }

    #[test]
    fn fidelity_draw_uses_the_seekers_risk_level() {
        // A low-risk seeker who never cheats must not match a partnered
        // candidate, however faithless the candidate's own risk group is.
        for seed in 0..20 {
            let mut params = Parameters::baseline();
            params.partnering.p_risky = [1.0, 1.0];
            params.partnering.p_cheat = [0.0, 1.0];
            let mut ctx = context_with(params, seed);
            let seeker = insert(&mut ctx, Gender::Female, 22.0, Orientation::Hetero, Risk::Low);
            let taken = insert(&mut ctx, Gender::Male, 23.0, Orientation::Hetero, Risk::High);
            let spouse = insert(&mut ctx, Gender::Female, 24.0, Orientation::Hetero, Risk::Low);
            ctx.people.person_mut(taken).partner = Some(spouse);
            ctx.people.person_mut(spouse).partner = Some(taken);
            assert_eq!(ctx.find_partner(seeker), None, "seed {seed}");

            // A high-risk seeker facing the same pool always cheats.
            let rake = insert(&mut ctx, Gender::Female, 22.0, Orientation::Hetero, Risk::High);
            assert_eq!(ctx.find_partner(rake), Some(taken), "seed {seed}");
        }
    }

    #[test]
    fn partnered_member_forces_short_term() {
        let mut params = deterministic_params();
        // Long term would otherwise be certain.
        params.partnering.relationship_mixing = [[1.0, 0.0]; N_AGE_GROUPS];
        params.partnering.aversion = [1.0, 1.0, 1.0];
        let mut ctx = context_with(params, 3);
        let a = insert(&mut ctx, Gender::Female, 22.0, Orientation::Hetero, Risk::Low);
        let b = insert(&mut ctx, Gender::Male, 23.0, Orientation::Hetero, Risk::Low);
        assert_eq!(ctx.choose_relationship(a, b), Relationship::Long);

        let c = insert(&mut ctx, Gender::Male, 23.0, Orientation::Hetero, Risk::Low);
        ctx.people.person_mut(b).partner = Some(c);
        ctx.people.person_mut(c).partner = Some(b);
        assert_eq!(ctx.choose_relationship(a, b), Relationship::Short);
    }

    #[test]
    fn aversion_suppresses_long_term_for_risky_dyads() {
        let mut params = deterministic_params();
        params.partnering.relationship_mixing = [[1.0, 0.0]; N_AGE_GROUPS];
        params.partnering.aversion = [1.0, 1.0, 0.0];
        let mut ctx = context_with(params, 5);
        let a = insert(&mut ctx, Gender::Female, 22.0, Orientation::Hetero, Risk::High);
        let b = insert(&mut ctx, Gender::Male, 23.0, Orientation::Hetero, Risk::High);
        for _ in 0..50 {
            assert_eq!(ctx.choose_relationship(a, b), Relationship::Short);
        }
    }

    #[test]
    fn current_partners_are_excluded_from_the_pool() {
        let mut ctx = context_with(deterministic_params(), 19);
        let seeker = insert(&mut ctx, Gender::Female, 22.0, Orientation::Hetero, Risk::Low);
        let partner = insert(&mut ctx, Gender::Male, 23.0, Orientation::Hetero, Risk::Low);
        assert_eq!(ctx.find_partner(seeker), Some(partner));
        ctx.graph.insert(seeker, partner, 100.0);
        assert_eq!(ctx.find_partner(seeker), None);
    }

    #[test]
    fn partnered_seekers_are_throttled_by_cheating_probability() {
        let mut params = Parameters::baseline();
        params.partnering.p_cheat = [0.5, 0.5];
        let mut ctx = context_with(params, 19);
        let a = insert(&mut ctx, Gender::Female, 22.0, Orientation::Hetero, Risk::Low);
        let b = insert(&mut ctx, Gender::Male, 23.0, Orientation::Hetero, Risk::Low);
        let single_rate = ctx.prob_new_partnership(ctx.people.person(a));
        ctx.people.person_mut(a).partner = Some(b);
        ctx.people.person_mut(b).partner = Some(a);
        let partnered_rate = ctx.prob_new_partnership(ctx.people.person(a));
        assert!((partnered_rate - 0.5 * single_rate).abs() < 1e-12);
    }

    #[test]
    fn durations_are_positive() {
        let mut ctx = context_with(Parameters::baseline(), 13);
        let a = insert(&mut ctx, Gender::Female, 22.0, Orientation::Hetero, Risk::Low);
        let b = insert(&mut ctx, Gender::Male, 23.0, Orientation::Hetero, Risk::High);
        for _ in 0..100 {
            assert!(ctx.relationship_duration(Relationship::Short, a, b) > 0.0);
            assert!(ctx.relationship_duration(Relationship::Long, a, b) > 0.0);
        }
    }
}
