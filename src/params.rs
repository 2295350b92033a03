//! The immutable parameter set for a run.
//!
//! Every probability table and distributional parameter the engine consumes
//! lives in one [`Parameters`] value passed into the `Context` at
//! construction. Nothing here is process-global, so concurrent runs with
//! different parameter sets cannot interfere.
//!
//! [`Parameters::validate`] is called before the first tick; a malformed
//! table is rejected up front rather than discovered mid-run.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::N_AGE_GROUPS;
use crate::error::NgError;
use crate::people::N_SITES;

pub const N_GENDERS: usize = 2;
pub const N_RISK_LEVELS: usize = 2;
/// Dyad risk level: number of high-risk participants in a pair (0, 1 or 2).
pub const N_DYAD_RISK_LEVELS: usize = 3;

const DAYS_PER_YEAR: f64 = 365.0;
const ROW_SUM_TOLERANCE: f64 = 1e-6;

/// Mean/variance parameterization of a Gamma distribution
/// (shape = mean/var, scale = var), matching the source tables.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GammaParams {
    pub mean: f64,
    pub var: f64,
}

impl GammaParams {
    fn validate(&self, what: &str) -> Result<(), NgError> {
        if !(self.mean > 0.0 && self.mean.is_finite() && self.var > 0.0 && self.var.is_finite()) {
            return Err(NgError::parameter(format!(
                "{what}: gamma mean/var must be positive and finite, got mean={}, var={}",
                self.mean, self.var
            )));
        }
        Ok(())
    }
}

/// Sexual acts with distinct transmission routes.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Act {
    Anal,
    Oral,
    Kiss,
    Rim,
    Sex,
}

impl Act {
    pub const ALL: [Act; 5] = [Act::Anal, Act::Oral, Act::Kiss, Act::Rim, Act::Sex];
}

/// Partnership formation and mixing tables.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PartneringParams {
    /// Age-group mixing rows: `age_mixing[from][to]`, each row a
    /// probability distribution over the partner's age band.
    pub age_mixing: [[f64; N_AGE_GROUPS]; N_AGE_GROUPS],
    /// Per-gender age-preference vector combined elementwise with the
    /// mixing row. All ones disables the preference.
    pub age_preference: [[f64; N_AGE_GROUPS]; N_GENDERS],
    /// Probability of taking a high-risk partner, indexed by own risk.
    pub p_risky: [f64; N_RISK_LEVELS],
    /// Probability of cheating on a long-term partner, indexed by own risk.
    pub p_cheat: [f64; N_RISK_LEVELS],
    /// Rows by age group: [P(long term), P(short term)].
    pub relationship_mixing: [[f64; 2]; N_AGE_GROUPS],
    /// Scaling of the long-term mass by dyad risk level; high-risk dyads
    /// are disproportionately unlikely to settle down.
    pub aversion: [f64; N_DYAD_RISK_LEVELS],
    /// Per-day probability of seeking a new partnership, `[risk][age]`.
    pub formation_rates: [[f64; N_AGE_GROUPS]; N_RISK_LEVELS],
    /// Mean of the exponential short-term duration, days.
    pub short_duration_mean: f64,
    /// Long-term duration Gamma parameters by dyad risk level.
    pub long_duration: [GammaParams; N_DYAD_RISK_LEVELS],
}

/// Policy switch for the natural-clearance duration of asymptomatic sites.
/// The source carries both variants; neither is hard-wired here.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub enum AsymptomaticClearance {
    /// Asymptomatic infections never naturally clear; only treatment
    /// removes them.
    PersistUntilTreated,
    /// Asymptomatic infections draw the same Gamma clearance duration as
    /// symptomatic ones.
    GammaClearance,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InfectionParams {
    /// Constant latent period in days, by gender of the infectee.
    pub latent_period: [f64; N_GENDERS],
    /// Natural-clearance Gamma parameters, `[site][gender]`.
    pub clearance: [[GammaParams; N_GENDERS]; N_SITES],
    /// Probability a new infection is symptomatic, `[site][gender]`.
    pub symptomatic: [[f64; N_GENDERS]; N_SITES],
    pub asymptomatic_clearance: AsymptomaticClearance,
    /// Time-until-care-sought distribution; its CDF of the elapsed
    /// infectious duration is compared to the agent's threshold.
    pub treatment: GammaParams,
    /// Treatment-conferred immunity duration.
    pub immunity: GammaParams,
}

/// Per-encounter act probabilities and the site-to-site transmission
/// probabilities they unlock.
///
/// Act probability matrices read as: the probability that someone of gender
/// `i` (row; Female = 0, Male = 1) engages in the act with someone of
/// gender `j` (column). `site_to_site[s][d]` is the probability of
/// transmission from anatomical site `s` to site `d` given the connecting
/// act occurs; sites in order rectal, urethral, pharyngeal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActParams {
    pub p_anal: [[f64; N_GENDERS]; N_GENDERS],
    pub p_oral: [[f64; N_GENDERS]; N_GENDERS],
    pub p_kiss: [[f64; N_GENDERS]; N_GENDERS],
    pub p_rim: [[f64; N_GENDERS]; N_GENDERS],
    pub p_sex: [[f64; N_GENDERS]; N_GENDERS],
    pub site_to_site: [[f64; N_SITES]; N_SITES],
}

impl ActParams {
    #[must_use]
    pub fn probability(&self, act: Act) -> &[[f64; N_GENDERS]; N_GENDERS] {
        match act {
            Act::Anal => &self.p_anal,
            Act::Oral => &self.p_oral,
            Act::Kiss => &self.p_kiss,
            Act::Rim => &self.p_rim,
            Act::Sex => &self.p_sex,
        }
    }

    /// The site-to-site matrix an act exposes. Each act connects only the
    /// anatomically plausible routes; everything else is zero.
    #[must_use]
    pub fn transmission(&self, act: Act) -> [[f64; N_SITES]; N_SITES] {
        let s = &self.site_to_site;
        let mut m = [[0.0; N_SITES]; N_SITES];
        match act {
            Act::Anal => {
                m[0][1] = s[0][1];
                m[1][0] = s[1][0];
            }
            Act::Oral => {
                m[1][2] = s[1][2];
                m[2][1] = s[2][1];
            }
            Act::Kiss => {
                m[2][2] = s[2][2];
            }
            Act::Rim => {
                m[0][2] = s[0][2];
                m[2][0] = s[2][0];
            }
            Act::Sex => {
                m[1][1] = s[1][1];
            }
        }
        m
    }
}

/// Demographic distributions for bootstrap and turnover.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PopulationParams {
    /// Probability a generated agent is male.
    pub p_male: f64,
    /// Age-band weights per gender (normalized on use).
    pub age_weights: [[f64; N_AGE_GROUPS]; N_GENDERS],
    /// Orientation distribution rows by age band: [hetero, homo, bi].
    pub orientation: [[f64; 3]; N_AGE_GROUPS],
    /// Probability of the high-risk group by age band.
    pub p_high_risk: [f64; N_AGE_GROUPS],
    /// Target cohort sizes `[gender][age band]` that turnover steers
    /// towards.
    pub cohort_targets: [[f64; N_AGE_GROUPS]; N_GENDERS],
    /// Per-day scaling of the import/exit Poisson rates.
    pub turnover_rate: f64,
    /// Probability a bootstrap agent starts exposed.
    pub init_prob_exposed: f64,
    /// Bootstrap exposures activate inside `[burn_in, burn_in + window)`.
    pub burn_in_days: f64,
    pub init_exposure_window: f64,
    /// Probability an imported agent arrives infectious at one site.
    pub prob_import_infectious: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Parameters {
    pub partnering: PartneringParams,
    pub infection: InfectionParams,
    pub acts: ActParams,
    pub population: PopulationParams,
}

fn check_probability(p: f64, what: &str) -> Result<(), NgError> {
    if !(0.0..=1.0).contains(&p) || p.is_nan() {
        return Err(NgError::parameter(format!(
            "{what}: probability {p} outside [0, 1]"
        )));
    }
    Ok(())
}

fn check_distribution_row(row: &[f64], what: &str) -> Result<(), NgError> {
    for &p in row {
        check_probability(p, what)?;
    }
    let sum: f64 = row.iter().sum();
    if (sum - 1.0).abs() > ROW_SUM_TOLERANCE {
        return Err(NgError::parameter(format!("{what}: row sums to {sum}, not 1")));
    }
    Ok(())
}

impl Parameters {
    /// Full validation of every table. Called by `Context::new` before any
    /// tick runs.
    pub fn validate(&self) -> Result<(), NgError> {
        let p = &self.partnering;
        for (k, row) in p.age_mixing.iter().enumerate() {
            check_distribution_row(row, &format!("age_mixing[{k}]"))?;
        }
        for (g, pref) in p.age_preference.iter().enumerate() {
            let mut mass = 0.0;
            for &w in pref {
                if !(w >= 0.0) || !w.is_finite() {
                    return Err(NgError::parameter(format!(
                        "age_preference[{g}]: weight {w} must be nonnegative and finite"
                    )));
                }
                mass += w;
            }
            if mass <= 0.0 {
                return Err(NgError::parameter(format!(
                    "age_preference[{g}]: all-zero preference vector"
                )));
            }
        }
        for (k, &v) in p.p_risky.iter().enumerate() {
            check_probability(v, &format!("p_risky[{k}]"))?;
        }
        for (k, &v) in p.p_cheat.iter().enumerate() {
            check_probability(v, &format!("p_cheat[{k}]"))?;
        }
        for (k, row) in p.relationship_mixing.iter().enumerate() {
            check_distribution_row(row, &format!("relationship_mixing[{k}]"))?;
        }
        for (k, &v) in p.aversion.iter().enumerate() {
            check_probability(v, &format!("aversion[{k}]"))?;
        }
        for (r, row) in p.formation_rates.iter().enumerate() {
            for (a, &v) in row.iter().enumerate() {
                check_probability(v, &format!("formation_rates[{r}][{a}]"))?;
            }
        }
        if !(p.short_duration_mean > 0.0 && p.short_duration_mean.is_finite()) {
            return Err(NgError::parameter("short_duration_mean must be positive"));
        }
        for (k, gp) in p.long_duration.iter().enumerate() {
            gp.validate(&format!("long_duration[{k}]"))?;
        }

        let inf = &self.infection;
        for (g, &l) in inf.latent_period.iter().enumerate() {
            if !(l >= 0.0) || !l.is_finite() {
                return Err(NgError::parameter(format!(
                    "latent_period[{g}] must be nonnegative and finite"
                )));
            }
        }
        for (s, by_gender) in inf.clearance.iter().enumerate() {
            for (g, gp) in by_gender.iter().enumerate() {
                gp.validate(&format!("clearance[{s}][{g}]"))?;
            }
        }
        for (s, by_gender) in inf.symptomatic.iter().enumerate() {
            for (g, &v) in by_gender.iter().enumerate() {
                check_probability(v, &format!("symptomatic[{s}][{g}]"))?;
            }
        }
        inf.treatment.validate("treatment")?;
        inf.immunity.validate("immunity")?;

        for act in Act::ALL {
            let table = self.acts.probability(act);
            for (i, row) in table.iter().enumerate() {
                for (j, &v) in row.iter().enumerate() {
                    check_probability(v, &format!("{act:?} act probability [{i}][{j}]"))?;
                }
            }
        }
        for (s, row) in self.acts.site_to_site.iter().enumerate() {
            for (d, &v) in row.iter().enumerate() {
                check_probability(v, &format!("site_to_site[{s}][{d}]"))?;
            }
        }

        let pop = &self.population;
        check_probability(pop.p_male, "p_male")?;
        check_probability(pop.init_prob_exposed, "init_prob_exposed")?;
        check_probability(pop.prob_import_infectious, "prob_import_infectious")?;
        for (g, weights) in pop.age_weights.iter().enumerate() {
            let mass: f64 = weights.iter().sum();
            if weights.iter().any(|&w| !(w >= 0.0) || !w.is_finite()) || mass <= 0.0 {
                return Err(NgError::parameter(format!(
                    "age_weights[{g}]: weights must be nonnegative with positive mass"
                )));
            }
        }
        for (k, row) in pop.orientation.iter().enumerate() {
            check_distribution_row(row, &format!("orientation[{k}]"))?;
        }
        for (k, &v) in pop.p_high_risk.iter().enumerate() {
            check_probability(v, &format!("p_high_risk[{k}]"))?;
        }
        for (g, row) in pop.cohort_targets.iter().enumerate() {
            for (a, &t) in row.iter().enumerate() {
                if !(t >= 0.0) || !t.is_finite() {
                    return Err(NgError::parameter(format!(
                        "cohort_targets[{g}][{a}] must be nonnegative and finite"
                    )));
                }
            }
        }
        if !(pop.turnover_rate >= 0.0) || !pop.turnover_rate.is_finite() {
            return Err(NgError::parameter("turnover_rate must be nonnegative"));
        }
        if !(pop.burn_in_days >= 0.0) || !(pop.init_exposure_window >= 0.0) {
            return Err(NgError::parameter(
                "burn_in_days and init_exposure_window must be nonnegative",
            ));
        }
        Ok(())
    }

    /// The baseline parameter set: survey-derived mixing tables plus
    /// literature-plausible infection dynamics. Calibration harnesses
    /// override pieces of this.
    #[must_use]
    pub fn baseline() -> Self {
        Parameters {
            partnering: PartneringParams {
                age_mixing: normalize_rows([
                    [221.0, 71.0, 7.0, 7.0],
                    [50.0, 208.0, 105.0, 105.0],
                    [9.0, 58.0, 198.0, 198.0],
                    [9.0, 58.0, 198.0, 198.0],
                ]),
                age_preference: [[1.0; N_AGE_GROUPS]; N_GENDERS],
                p_risky: [0.05, 0.9],
                p_cheat: [0.05, 0.5],
                relationship_mixing: normalize_rows2([
                    [129.0, 174.0],
                    [173.0, 187.0],
                    [157.0, 109.0],
                    [157.0, 109.0],
                ]),
                aversion: [1.0, 0.4, 0.05],
                formation_rates: [
                    // (expected partnerships/year) x per-band scaling / 365
                    [1.0 / DAYS_PER_YEAR, 1.0 / DAYS_PER_YEAR, 0.9 / DAYS_PER_YEAR, 0.9 / DAYS_PER_YEAR],
                    [
                        25.0 * 1.1 / DAYS_PER_YEAR,
                        25.0 * 1.1 / DAYS_PER_YEAR,
                        25.0 / DAYS_PER_YEAR,
                        25.0 / DAYS_PER_YEAR,
                    ],
                ],
                short_duration_mean: 14.0,
                long_duration: [
                    GammaParams { mean: 365.0, var: 100.0 },
                    GammaParams { mean: 60.0, var: 10.0 },
                    GammaParams { mean: 60.0, var: 10.0 },
                ],
            },
            infection: InfectionParams {
                latent_period: [2.0, 2.0],
                clearance: [
                    [GammaParams { mean: 360.0, var: 40.0 }; N_GENDERS],
                    [GammaParams { mean: 185.0, var: 35.0 }; N_GENDERS],
                    [GammaParams { mean: 84.0, var: 18.0 }; N_GENDERS],
                ],
                symptomatic: [
                    [0.12, 0.12],
                    [0.35, 0.9],
                    [0.02, 0.02],
                ],
                asymptomatic_clearance: AsymptomaticClearance::PersistUntilTreated,
                treatment: GammaParams { mean: 7.0, var: 4.0 },
                immunity: GammaParams { mean: 30.0, var: 10.0 },
            },
            acts: ActParams {
                p_anal: [[0.0, 0.0], [0.25, 0.6]],
                p_oral: [[0.6, 0.6], [0.6, 0.6]],
                p_kiss: [[0.8, 0.8], [0.8, 0.8]],
                p_rim: [[0.05, 0.05], [0.05, 0.1]],
                p_sex: [[0.0, 0.9], [0.9, 0.0]],
                site_to_site: [
                    [0.0, 0.35, 0.1],
                    [0.6, 0.3, 0.2],
                    [0.1, 0.3, 0.05],
                ],
            },
            population: PopulationParams {
                p_male: 0.5,
                age_weights: [[0.3, 0.28, 0.22, 0.2]; N_GENDERS],
                orientation: [
                    [0.94, 0.03, 0.03],
                    [0.92, 0.04, 0.04],
                    [0.92, 0.04, 0.04],
                    [0.94, 0.03, 0.03],
                ],
                p_high_risk: [0.2, 0.25, 0.2, 0.15],
                cohort_targets: [[75.0; N_AGE_GROUPS]; N_GENDERS],
                turnover_rate: 0.002,
                init_prob_exposed: 0.1,
                burn_in_days: 0.0,
                init_exposure_window: 7.0,
                prob_import_infectious: 0.05,
            },
        }
    }

    /// Loads the partnership and transmission tables from a directory of
    /// CSV files, overriding the baseline. Expected files, one table each,
    /// headers on the first line:
    /// `age_partnership_distribution.csv` (4x4),
    /// `probability_high_risk_partner.csv` (1x2),
    /// `probability_cheat.csv` (1x2),
    /// `probability_relationship.csv` (4x2),
    /// `scaling_long_term_by_risk_group.csv` (1x3),
    /// `partnership_rates.csv` (1x2: low, high),
    /// `partnership_rates_scaling.csv` (2x4),
    /// `partnership_durations.csv` (1x3: long_mean, long_var, short),
    /// `site_infectious_periods.csv` (3x2: mean, var per site),
    /// `act_probability_{anal,oral,kiss,rim,sex}.csv` (2x2 each),
    /// `site_to_site_transmission.csv` (3x3).
    pub fn from_dir(dir: &Path) -> Result<Self, NgError> {
        let mut params = Parameters::baseline();

        let age = read_table(&dir.join("age_partnership_distribution.csv"), 4, 4)?;
        for (k, row) in age.iter().enumerate() {
            let sum: f64 = row.iter().sum();
            if sum <= 0.0 {
                return Err(NgError::parameter(format!(
                    "age_partnership_distribution row {k} has no mass"
                )));
            }
            for (j, &v) in row.iter().enumerate() {
                params.partnering.age_mixing[k][j] = v / sum;
            }
        }

        let risky = read_table(&dir.join("probability_high_risk_partner.csv"), 1, 2)?;
        params.partnering.p_risky = [risky[0][0], risky[0][1]];

        let cheat = read_table(&dir.join("probability_cheat.csv"), 1, 2)?;
        params.partnering.p_cheat = [cheat[0][0], cheat[0][1]];

        let rel = read_table(&dir.join("probability_relationship.csv"), 4, 2)?;
        for (k, row) in rel.iter().enumerate() {
            let sum: f64 = row.iter().sum();
            if sum <= 0.0 {
                return Err(NgError::parameter(format!(
                    "probability_relationship row {k} has no mass"
                )));
            }
            params.partnering.relationship_mixing[k] = [row[0] / sum, row[1] / sum];
        }

        let aversion = read_table(&dir.join("scaling_long_term_by_risk_group.csv"), 1, 3)?;
        params.partnering.aversion = [aversion[0][0], aversion[0][1], aversion[0][2]];

        // Annual acquisition rates per risk level, scaled per band and
        // converted to per-day probabilities.
        let rates = read_table(&dir.join("partnership_rates.csv"), 1, 2)?;
        let scaling = read_table(&dir.join("partnership_rates_scaling.csv"), 2, 4)?;
        for r in 0..N_RISK_LEVELS {
            for a in 0..N_AGE_GROUPS {
                params.partnering.formation_rates[r][a] =
                    rates[0][r] * scaling[r][a] / DAYS_PER_YEAR;
            }
        }

        let durations = read_table(&dir.join("partnership_durations.csv"), 1, 3)?;
        let long = GammaParams { mean: durations[0][0], var: durations[0][1] };
        params.partnering.long_duration = [long; N_DYAD_RISK_LEVELS];
        params.partnering.short_duration_mean = durations[0][2];

        let periods = read_table(&dir.join("site_infectious_periods.csv"), N_SITES, 2)?;
        for (s, row) in periods.iter().enumerate() {
            params.infection.clearance[s] = [GammaParams { mean: row[0], var: row[1] }; N_GENDERS];
        }

        let acts = &mut params.acts;
        for (file, table) in [
            ("act_probability_anal.csv", &mut acts.p_anal),
            ("act_probability_oral.csv", &mut acts.p_oral),
            ("act_probability_kiss.csv", &mut acts.p_kiss),
            ("act_probability_rim.csv", &mut acts.p_rim),
            ("act_probability_sex.csv", &mut acts.p_sex),
        ] {
            let probabilities = read_table(&dir.join(file), N_GENDERS, N_GENDERS)?;
            for (i, row) in probabilities.iter().enumerate() {
                for (j, &v) in row.iter().enumerate() {
                    table[i][j] = v;
                }
            }
        }

        let s2s = read_table(&dir.join("site_to_site_transmission.csv"), 3, 3)?;
        for (s, row) in s2s.iter().enumerate() {
            for (d, &v) in row.iter().enumerate() {
                params.acts.site_to_site[s][d] = v;
            }
        }

        params.validate()?;
        Ok(params)
    }
}

fn normalize_rows(mut rows: [[f64; N_AGE_GROUPS]; N_AGE_GROUPS]) -> [[f64; N_AGE_GROUPS]; N_AGE_GROUPS] {
    for row in &mut rows {
        let sum: f64 = row.iter().sum();
        for v in row {
            *v /= sum;
        }
    }
    rows
}

fn normalize_rows2(mut rows: [[f64; 2]; N_AGE_GROUPS]) -> [[f64; 2]; N_AGE_GROUPS] {
    for row in &mut rows {
        let sum: f64 = row.iter().sum();
        for v in row {
            *v /= sum;
        }
    }
    rows
}

/// Reads a headered CSV file of floats with exactly the given shape.
fn read_table(path: &Path, rows: usize, cols: usize) -> Result<Vec<Vec<f64>>, NgError> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut table = Vec::with_capacity(rows);
    for record in reader.records() {
        let record = record?;
        let mut row = Vec::with_capacity(cols);
        for field in record.iter() {
            let value: f64 = field.trim().parse().map_err(|_| {
                NgError::parameter(format!(
                    "{}: field {field:?} is not a number",
                    path.display()
                ))
            })?;
            row.push(value);
        }
        if row.len() != cols {
            return Err(NgError::parameter(format!(
                "{}: expected {cols} columns, found {}",
                path.display(),
                row.len()
            )));
        }
        table.push(row);
    }
    if table.len() != rows {
        return Err(NgError::parameter(format!(
            "{}: expected {rows} rows, found {}",
            path.display(),
            table.len()
        )));
    }
    Ok(table)
}
