//! Within-partnership transmission, disease progression and care seeking.
//!
//! Transmission is site-to-site: each infectious agent attempts every
//! current partner. The pair's sexual acts for the encounter are drawn,
//! the engaged acts compose an effective site-to-site matrix, and every
//! infected source site is trialed against the unoccupied sites of the
//! target. A successful attempt schedules the exposure; it does not flip
//! the site infectious until the latent period has run.
//!
//! All randomness-consuming passes visit agents in ascending id order.

use log::{debug, trace};
use rand::rngs::StdRng;

use crate::context::Context;
use crate::params::{Act, ActParams, AsymptomaticClearance, InfectionParams};
use crate::people::{Agent, DiseaseState, N_SITES, SiteState};
use crate::random::{draw_uniform, gamma_cdf, sample_gamma};
use crate::{AgentId, Time};

pub trait ContextInfectionExt {
    /// One tick of infection dynamics: transmission, then progression,
    /// then care seeking.
    fn update_infections(&mut self);

    /// Attempts transmission from every infectious agent to each of its
    /// current partners.
    fn new_infections(&mut self);

    /// Advances latency, natural clearance, aggregate state and immunity
    /// waning. Consumes no randomness.
    fn progress_infections(&mut self);

    /// Symptomatic infectious agents seek care once the care-seeking CDF
    /// of their elapsed infectious time reaches their personal threshold.
    /// Treatment extends to the designated long-term partner.
    fn seek_treatment(&mut self);
}

/// The effective site-to-site matrix for one day of one pair: each act is
/// drawn once with its gender-pair probability scaled up by the dyad's
/// risk, and engaged acts combine as independent exposure routes.
fn pair_transmission(
    rng: &mut StdRng,
    acts: &ActParams,
    a: &Agent,
    b: &Agent,
) -> [[f64; N_SITES]; N_SITES] {
    let risk_factor = 1.0 + (a.risk.index() + b.risk.index()) as f64;
    let mut combined = [[0.0; N_SITES]; N_SITES];
    for act in Act::ALL {
        let p = acts.probability(act)[a.gender.index()][b.gender.index()] * risk_factor;
        if draw_uniform(rng) >= p {
            continue;
        }
        let m = acts.transmission(act);
        for s in 0..N_SITES {
            for d in 0..N_SITES {
                combined[s][d] = 1.0 - (1.0 - combined[s][d]) * (1.0 - m[s][d]);
            }
        }
    }
    combined
}

/// Schedules an exposure at `site` of `target`, drawing symptom status and
/// the clearance time up front.
fn expose_site(
    rng: &mut StdRng,
    infection: &InfectionParams,
    target: &mut Agent,
    site: usize,
    now: Time,
) {
    let gender = target.gender.index();
    let exposed_at = now + infection.latent_period[gender];
    let symptomatic = draw_uniform(rng) < infection.symptomatic[site][gender];
    let recovers_at = if symptomatic
        || infection.asymptomatic_clearance == AsymptomaticClearance::GammaClearance
    {
        let clearance = infection.clearance[site][gender];
        exposed_at + sample_gamma(rng, clearance.mean, clearance.var)
    } else {
        Time::INFINITY
    };
    target.sites[site] = SiteState { infected: false, exposed_at, recovers_at, symptomatic };
    if target.state == DiseaseState::Susceptible {
        target.state = DiseaseState::Exposed;
    }
}

impl ContextInfectionExt for Context {
    fn update_infections(&mut self) {
        self.new_infections();
        self.progress_infections();
        self.seek_treatment();
        let [rectal, urethral, pharyngeal] = self.people.site_prevalence();
        debug!(
            "day {}: {} of {} agents infectious (rectal {rectal}, urethral {urethral}, \
             pharyngeal {pharyngeal})",
            self.now,
            self.people.infectious_count(),
            self.people.len()
        );
    }

    fn new_infections(&mut self) {
        let acts = self.params.acts.clone();
        let infection = self.params.infection.clone();
        for i in self.people.ids_ordered() {
            let src = *self.people.person(i);
            if src.state != DiseaseState::Infectious {
                continue;
            }
            for j in self.graph.partners_of(i) {
                let dst = *self.people.person(j);
                if dst.state == DiseaseState::Treated || dst.infected_site_count() == N_SITES {
                    continue;
                }
                let matrix = pair_transmission(&mut self.rng, &acts, &src, &dst);
                for d in 0..N_SITES {
                    if dst.sites[d].occupied() {
                        continue;
                    }
                    for s in 0..N_SITES {
                        if src.sites[s].infected && draw_uniform(&mut self.rng) < matrix[s][d] {
                            let target = self.people.person_mut(j);
                            expose_site(&mut self.rng, &infection, target, d, self.now);
                            trace!("day {}: agent {j} exposed at site {d}", self.now);
                            break;
                        }
                    }
                }
            }
        }
    }

    fn progress_infections(&mut self) {
        let now = self.now;
        for id in self.people.ids_ordered() {
            let agent = self.people.person_mut(id);
            for site in &mut agent.sites {
                if !site.infected && site.exposed_at < now {
                    site.infected = true;
                }
                if site.infected && site.recovers_at <= now {
                    *site = SiteState::default();
                }
            }
            if agent.state == DiseaseState::Treated {
                if agent.immune_until < now {
                    agent.state = DiseaseState::Susceptible;
                    agent.immune_until = Time::INFINITY;
                }
            } else if agent.infected_site_count() > 0 {
                agent.state = DiseaseState::Infectious;
            } else if agent.has_pending_exposure() {
                agent.state = DiseaseState::Exposed;
            } else {
                agent.state = DiseaseState::Susceptible;
            }
        }
    }

    fn seek_treatment(&mut self) {
        for id in self.people.ids_ordered() {
            let agent = *self.people.person(id);
            if agent.state != DiseaseState::Infectious {
                continue;
            }
            let care = self.params.infection.treatment;
            let seeks = agent.sites.iter().any(|site| {
                site.infected
                    && site.symptomatic
                    && gamma_cdf(self.now - site.exposed_at, care.mean, care.var)
                        >= agent.treatment_threshold
            });
            if !seeks {
                continue;
            }
            self.treat(id);
            if let Some(partner) = agent.partner {
                self.treat(partner);
                trace!("day {}: agent {partner} treated as partner of {id}", self.now);
            }
        }
    }
}

impl Context {
    /// Clears every site and confers immunity until the drawn waning time.
    fn treat(&mut self, id: AgentId) {
        let immunity = self.params.infection.immunity;
        let waning = sample_gamma(&mut self.rng, immunity.mean, immunity.var);
        let agent = self.people.person_mut(id);
        agent.sites = [SiteState::default(); N_SITES];
        agent.state = DiseaseState::Treated;
        agent.immune_until = self.now + waning;
        trace!("day {}: agent {id} treated, immune until {:.1}", self.now, agent.immune_until);
    }
}
