//! Population bootstrap: drawing fresh agents from the demographic tables.
//!
//! The same generator serves the initial population and turnover imports;
//! only the bootstrap seeds initial exposures, since imports that arrive
//! already infectious are seeded by the turnover pass at entry time.

use rand::Rng;
use rand::rngs::StdRng;

use crate::params::{AsymptomaticClearance, Parameters};
use crate::people::{Agent, DiseaseState, Gender, N_SITES, Orientation, Risk, SiteState};
use crate::random::{draw_uniform, sample_categorical, sample_gamma};
use crate::{N_AGE_GROUPS, Time};

/// Age band bounds in years, half-open. Nobody is generated at or past the
/// exit age.
pub const AGE_BANDS: [(f64, f64); N_AGE_GROUPS] =
    [(16.0, 20.0), (20.0, 25.0), (25.0, 30.0), (30.0, 36.0)];

/// Age past which agents leave the simulated population.
pub const EXIT_AGE: f64 = 36.0;

const ORIENTATIONS: [Orientation; 3] = [Orientation::Hetero, Orientation::Homo, Orientation::Bi];

/// Draws one agent of the given gender and age band.
pub fn generate_agent(
    params: &Parameters,
    gender: Gender,
    band: usize,
    rng: &mut StdRng,
) -> Agent {
    let (lo, hi) = AGE_BANDS[band];
    let age = lo + draw_uniform(rng) * (hi - lo);
    let orientation = ORIENTATIONS[sample_categorical(rng, &params.population.orientation[band])
        .expect("orientation rows are validated distributions")];
    let risk = if draw_uniform(rng) < params.population.p_high_risk[band] {
        Risk::High
    } else {
        Risk::Low
    };
    let threshold = draw_uniform(rng);
    Agent::new(gender, age, orientation, risk, threshold)
}

/// Draws the full bootstrap population, seeding a fraction of it with a
/// pending exposure at one random site inside the configured activation
/// window.
pub fn generate_population(params: &Parameters, size: usize, rng: &mut StdRng) -> Vec<Agent> {
    let pop = &params.population;
    let mut agents = Vec::with_capacity(size);
    for _ in 0..size {
        let gender = if draw_uniform(rng) < pop.p_male { Gender::Male } else { Gender::Female };
        let band = sample_categorical(rng, &pop.age_weights[gender.index()])
            .expect("age weights are validated to carry mass");
        let mut agent = generate_agent(params, gender, band, rng);
        if draw_uniform(rng) < pop.init_prob_exposed {
            seed_exposure(params, &mut agent, rng);
        }
        agents.push(agent);
    }
    // The oldest band must be inhabited on a full bootstrap; otherwise its
    // exit draws run dry until someone ages into it.
    let oldest = N_AGE_GROUPS - 1;
    if !agents.is_empty() && !agents.iter().any(|a| a.age_group() == oldest) {
        let gender = agents[agents.len() - 1].gender;
        let replacement = generate_agent(params, gender, oldest, rng);
        if let Some(last) = agents.last_mut() {
            *last = replacement;
        }
    }
    agents
}

fn seed_exposure(params: &Parameters, agent: &mut Agent, rng: &mut StdRng) {
    let pop = &params.population;
    let infection = &params.infection;
    let site = rng.random_range(0..N_SITES);
    let gender = agent.gender.index();
    let exposed_at = pop.burn_in_days + draw_uniform(rng) * pop.init_exposure_window;
    let symptomatic = draw_uniform(rng) < infection.symptomatic[site][gender];
    let recovers_at = if symptomatic
        || infection.asymptomatic_clearance == AsymptomaticClearance::GammaClearance
    {
        let clearance = infection.clearance[site][gender];
        exposed_at + sample_gamma(rng, clearance.mean, clearance.var)
    } else {
        Time::INFINITY
    };
    agent.sites[site] = SiteState { infected: false, exposed_at, recovers_at, symptomatic };
    agent.state = DiseaseState::Exposed;
}
