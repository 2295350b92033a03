//! Demographic turnover: imports, sexual debuts, exits and aging.
//!
//! Each gender-by-age-band cohort is steered towards its configured target
//! size with Poisson import and exit counts; the youngest band additionally
//! receives a steady trickle of sexual debuts at the entry age. Agents past
//! the exit age always leave. Removal excises the departing agent from the
//! partnership graph and clears any designated pointer aimed at it, then
//! audits the graph; a failed audit aborts the run.
//!
//! Cohorts are visited in a fixed order (women then men, youngest band
//! first) so the tick's draw sequence is reproducible.

use log::{debug, trace};
use rand::Rng;

use crate::context::Context;
use crate::error::NgError;
use crate::matching::{ContextMatchingExt, Relationship};
use crate::partnerships::ContextPartnershipExt;
use crate::people::{Agent, DiseaseState, Gender, N_SITES, SiteState};
use crate::population::{EXIT_AGE, generate_agent};
use crate::random::{draw_uniform, sample_gamma, sample_poisson};
use crate::{AgentId, N_AGE_GROUPS, Time};

const DAYS_PER_YEAR: f64 = 365.0;

pub trait ContextTurnoverExt {
    /// One tick of demographic dynamics: per-cohort imports and debuts,
    /// per-cohort exits plus everyone over the exit age, then aging.
    fn update_population(&mut self) -> Result<(), NgError>;

    /// Registers a batch of fresh agents, returning their ids in insertion
    /// order.
    fn insert_agents(&mut self, agents: Vec<Agent>) -> Vec<AgentId>;

    /// Removes agents from the registry and the graph, clearing designated
    /// pointers that targeted them. Unknown ids are ignored, so overlapping
    /// removal batches are harmless.
    fn remove_agents(&mut self, ids: &[AgentId]) -> Result<(), NgError>;
}

impl ContextTurnoverExt for Context {
    fn update_population(&mut self) -> Result<(), NgError> {
        let pop = self.params.population.clone();
        let mut removals: Vec<AgentId> = Vec::new();
        let mut imported = 0_u64;

        for gender in Gender::ALL {
            for band in 0..N_AGE_GROUPS {
                let target = pop.cohort_targets[gender.index()][band];
                let mut cohort: Vec<AgentId> = self
                    .people
                    .ids_ordered()
                    .into_iter()
                    .filter(|&id| {
                        let a = self.people.person(id);
                        a.gender == gender && a.age_group() == band
                    })
                    .collect();
                let n = cohort.len() as f64;

                let import_rate = (target - n).max(1.0) * pop.turnover_rate;
                for _ in 0..sample_poisson(&mut self.rng, import_rate) {
                    self.import_agent(gender, band, None);
                    imported += 1;
                }
                if band == 0 {
                    let debut_rate = target / (N_AGE_GROUPS as f64 * DAYS_PER_YEAR);
                    for _ in 0..sample_poisson(&mut self.rng, debut_rate) {
                        self.import_agent(gender, band, Some(AGE_OF_DEBUT));
                        imported += 1;
                    }
                }

                let exit_rate = (n - target).max(1.0) * pop.turnover_rate;
                let exits = sample_poisson(&mut self.rng, exit_rate).min(cohort.len() as u64);
                for _ in 0..exits {
                    let pick = self.rng.random_range(0..cohort.len());
                    removals.push(cohort.swap_remove(pick));
                }
            }
        }

        for id in self.people.ids_ordered() {
            if self.people.person(id).age > EXIT_AGE {
                removals.push(id);
            }
        }
        removals.sort_unstable();
        removals.dedup();
        let removed = removals.len();
        self.remove_agents(&removals)?;

        for agent in self.people.agents_mut() {
            agent.age += 1.0 / DAYS_PER_YEAR;
        }
        if imported > 0 || removed > 0 {
            debug!(
                "day {}: {imported} agents entered, {removed} left, population {}",
                self.now,
                self.people.len()
            );
        }
        Ok(())
    }

    fn insert_agents(&mut self, agents: Vec<Agent>) -> Vec<AgentId> {
        agents.into_iter().map(|agent| self.people.insert(agent)).collect()
    }

    fn remove_agents(&mut self, ids: &[AgentId]) -> Result<(), NgError> {
        for &id in ids {
            let Some(agent) = self.people.remove(id) else {
                continue;
            };
            if let Some(p) = agent.partner
                && let Some(other) = self.people.get_mut(p)
                && other.partner == Some(id)
            {
                other.partner = None;
            }
            for counterpart in self.graph.sever_all(id) {
                if let Some(other) = self.people.get_mut(counterpart)
                    && other.partner == Some(id)
                {
                    other.partner = None;
                }
            }
            trace!("day {}: agent {id} left the population", self.now);
        }
        self.graph.check_invariants(&self.people)
    }
}

const AGE_OF_DEBUT: f64 = 16.0;

impl Context {
    /// Imports one agent, optionally pinned to a fixed entry age. Imports
    /// can arrive already infectious at one site, in which case they
    /// immediately look for a short-term partnership.
    fn import_agent(&mut self, gender: Gender, band: usize, fixed_age: Option<f64>) {
        let mut agent = generate_agent(&self.params, gender, band, &mut self.rng);
        if let Some(age) = fixed_age {
            agent.age = age;
        }
        let mut infectious = false;
        if draw_uniform(&mut self.rng) < self.params.population.prob_import_infectious {
            let infection = &self.params.infection;
            let site = self.rng.random_range(0..N_SITES);
            let symptomatic =
                draw_uniform(&mut self.rng) < infection.symptomatic[site][gender.index()];
            let clearance = infection.clearance[site][gender.index()];
            let recovers_at = if symptomatic
                || infection.asymptomatic_clearance
                    == crate::params::AsymptomaticClearance::GammaClearance
            {
                self.now + sample_gamma(&mut self.rng, clearance.mean, clearance.var)
            } else {
                Time::INFINITY
            };
            agent.sites[site] =
                SiteState { infected: true, exposed_at: self.now, recovers_at, symptomatic };
            agent.state = DiseaseState::Infectious;
            infectious = true;
        }
        let id = self.people.insert(agent);
        if infectious {
            trace!("day {}: infectious import {id}", self.now);
            if let Some(candidate) = self.find_partner(id) {
                let duration = self.relationship_duration(Relationship::Short, id, candidate);
                self.establish_partnership(id, candidate, Relationship::Short, duration);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::Parameters;
    use crate::people::{Orientation, Risk};

    fn context(params: Parameters, seed: u64) -> Context {
        Context::new(params, seed).unwrap()
    }

    fn member(ctx: &mut Context, age: f64) -> AgentId {
        ctx.people
            .insert(Agent::new(Gender::Female, age, Orientation::Bi, Risk::Low, 0.5))
    }

    #[test]
    fn removal_clears_pointers_and_edges() {
        let mut ctx = context(Parameters::baseline(), 41);
        let a = member(&mut ctx, 22.0);
        let b = member(&mut ctx, 24.0);
        let c = member(&mut ctx, 26.0);
        ctx.establish_partnership(a, b, Relationship::Long, 365.0);
        ctx.establish_partnership(a, c, Relationship::Short, 10.0);

        ctx.remove_agents(&[a]).unwrap();
        assert!(!ctx.people.contains(a));
        assert_eq!(ctx.people.person(b).partner, None);
        assert_eq!(ctx.graph.edge_count(), 0);
        // Unknown and repeated ids are tolerated.
        ctx.remove_agents(&[a, b, b]).unwrap();
        assert_eq!(ctx.people.len(), 1);
    }

    #[test]
    fn empty_cohorts_fill_towards_target() {
        let mut params = Parameters::baseline();
        params.population.cohort_targets = [[50.0; N_AGE_GROUPS]; 2];
        params.population.turnover_rate = 1.0;
        params.population.prob_import_infectious = 0.0;
        let mut ctx = context(params, 43);
        ctx.update_population().unwrap();
        for gender in Gender::ALL {
            for band in 0..N_AGE_GROUPS {
                assert!(ctx.people.cohort_count(gender, band) > 10);
            }
        }
    }

    #[test]
    fn overfull_cohorts_shed_towards_target() {
        let mut params = Parameters::baseline();
        params.population.cohort_targets = [[0.0; N_AGE_GROUPS]; 2];
        params.population.turnover_rate = 1.0;
        params.population.prob_import_infectious = 0.0;
        let mut ctx = context(params, 47);
        for _ in 0..100 {
            member(&mut ctx, 22.0);
        }
        let before = ctx.people.len();
        ctx.update_population().unwrap();
        assert!(ctx.people.len() < before);
    }

    #[test]
    fn agents_past_the_exit_age_always_leave() {
        let mut params = Parameters::baseline();
        params.population.turnover_rate = 0.0;
        let mut ctx = context(params, 53);
        let old = member(&mut ctx, 36.5);
        let young = member(&mut ctx, 20.0);
        ctx.update_population().unwrap();
        assert!(!ctx.people.contains(old));
        assert!(ctx.people.contains(young));
    }

    #[test]
    fn everyone_ages_one_day_per_tick() {
        let mut params = Parameters::baseline();
        params.population.turnover_rate = 0.0;
        let mut ctx = context(params, 59);
        let id = member(&mut ctx, 20.0);
        ctx.update_population().unwrap();
        let age = ctx.people.person(id).age;
        assert!((age - (20.0 + 1.0 / 365.0)).abs() < 1e-12);
    }

    #[test]
    fn infectious_imports_arrive_seeded() {
        let mut params = Parameters::baseline();
        params.population.cohort_targets = [[200.0; N_AGE_GROUPS]; 2];
        params.population.turnover_rate = 1.0;
        params.population.prob_import_infectious = 1.0;
        let mut ctx = context(params, 61);
        ctx.update_population().unwrap();
        assert!(!ctx.people.is_empty());
        assert_eq!(ctx.people.infectious_count(), ctx.people.len());
        ctx.graph.check_invariants(&ctx.people).unwrap();
    }
}
