//! Sampling helpers over the run's seeded random number generator.
//!
//! Every stochastic decision in the engine goes through this module so that
//! a run is fully determined by its seed. Draw sites must be visited in a
//! fixed order (ascending agent id) by their callers; nothing here may
//! consume randomness conditionally on hash-map iteration order.

use rand::Rng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Exp, Gamma, Poisson};

/// One uniform draw on `[0, 1)`.
#[inline]
pub fn draw_uniform(rng: &mut StdRng) -> f64 {
    rng.random::<f64>()
}

/// Inverse-CDF draw over unnormalized nonnegative weights.
///
/// Builds the cumulative distribution over the positive mass, renormalizes
/// to sum 1 and selects the first cumulative bin that strictly exceeds a
/// uniform draw, so zero-weight entries can never be selected. Returns
/// `None` when the total mass is zero (treated as "no match" by callers,
/// never a divide-by-zero).
pub fn sample_categorical(rng: &mut StdRng, weights: &[f64]) -> Option<usize> {
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return None;
    }
    let u = rng.random::<f64>();
    let mut cumulative = 0.0;
    for (k, w) in weights.iter().enumerate() {
        cumulative += w / total;
        if cumulative > u {
            return Some(k);
        }
    }
    // Floating-point shortfall in the cumulative sum: fall back to the last
    // bin carrying positive weight.
    weights.iter().rposition(|&w| w > 0.0)
}

/// Gamma draw parameterized by mean and variance (shape = mean/var,
/// scale = var), matching the model's tables. Parameters are validated
/// positive at initialization; a degenerate pair here is a programming
/// error, not a recoverable condition.
pub fn sample_gamma(rng: &mut StdRng, mean: f64, var: f64) -> f64 {
    let gamma = Gamma::new(mean / var, var).expect("gamma parameters must be positive");
    gamma.sample(rng)
}

/// Exponential draw with the given mean.
pub fn sample_exp(rng: &mut StdRng, mean: f64) -> f64 {
    let exp = Exp::new(1.0 / mean).expect("exponential mean must be positive");
    exp.sample(rng)
}

/// Poisson draw. A nonpositive rate yields zero events.
pub fn sample_poisson(rng: &mut StdRng, lambda: f64) -> u64 {
    if lambda <= 0.0 {
        return 0;
    }
    let poisson = Poisson::new(lambda).expect("poisson rate must be positive and finite");
    poisson.sample(rng) as u64
}

/// CDF of the Gamma distribution parameterized by mean and variance,
/// evaluated at `x`. Used by treatment-seeking to compare an elapsed
/// symptomatic-infectious duration against an agent's tolerance percentile.
#[must_use]
pub fn gamma_cdf(x: f64, mean: f64, var: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    lower_regularized_gamma(mean / var, x / var)
}

/// Regularized lower incomplete gamma function P(a, x), via the series
/// expansion for x < a + 1 and the continued fraction otherwise.
fn lower_regularized_gamma(a: f64, x: f64) -> f64 {
    debug_assert!(a > 0.0);
    if x <= 0.0 {
        0.0
    } else if x < a + 1.0 {
        gamma_series(a, x)
    } else {
        1.0 - gamma_continued_fraction(a, x)
    }
}

/// Lanczos approximation to ln Γ(x), accurate to ~1e-10 for x > 0.
fn ln_gamma(x: f64) -> f64 {
    const COF: [f64; 6] = [
        76.180_091_729_471_46,
        -86.505_320_329_416_77,
        24.014_098_240_830_91,
        -1.231_739_572_450_155,
        0.120_865_097_386_617_9e-2,
        -0.539_523_938_495_3e-5,
    ];
    let mut y = x;
    let tmp = x + 5.5;
    let tmp = tmp - (x + 0.5) * tmp.ln();
    let mut ser = 1.000_000_000_190_015;
    for c in COF {
        y += 1.0;
        ser += c / y;
    }
    -tmp + (2.506_628_274_631_000_5 * ser / x).ln()
}

fn gamma_series(a: f64, x: f64) -> f64 {
    let mut ap = a;
    let mut sum = 1.0 / a;
    let mut del = sum;
    for _ in 0..200 {
        ap += 1.0;
        del *= x / ap;
        sum += del;
        if del.abs() < sum.abs() * 1e-12 {
            break;
        }
    }
    sum * (-x + a * x.ln() - ln_gamma(a)).exp()
}

fn gamma_continued_fraction(a: f64, x: f64) -> f64 {
    const TINY: f64 = 1e-30;
    let mut b = x + 1.0 - a;
    let mut c = 1.0 / TINY;
    let mut d = 1.0 / b;
    let mut h = d;
    for i in 1..200 {
        let an = -(i as f64) * (i as f64 - a);
        b += 2.0;
        d = an * d + b;
        if d.abs() < TINY {
            d = TINY;
        }
        c = b + an / c;
        if c.abs() < TINY {
            c = TINY;
        }
        d = 1.0 / d;
        let del = d * c;
        h *= del;
        if (del - 1.0).abs() < 1e-12 {
            break;
        }
    }
    (-x + a * x.ln() - ln_gamma(a)).exp() * h
}
