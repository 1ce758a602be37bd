//! Migrant-count sampling.

use std::f64::consts::TAU;

use rand::Rng;

/// Group sizes up to this bound are sampled with one Bernoulli trial per member.
pub const EXACT_BINOMIAL_LIMIT: u64 = 100;

/// Draws from `Binomial(trials, probability)`.
///
/// Small populations use exact Bernoulli trials; larger ones use the normal
/// approximation with a Box-Muller draw. The result is always in `[0, trials]`.
pub fn sample_binomial<R: Rng + ?Sized>(rng: &mut R, trials: u64, probability: f64) -> u64 {
    let p = crate::math::clamp_unit(probability);
    if trials == 0 || p == 0.0 {
        return 0;
    }
    if p == 1.0 {
        return trials;
    }

    if trials <= EXACT_BINOMIAL_LIMIT {
        return (0..trials).filter(|_| rng.gen::<f64>() < p).count() as u64;
    }

    let n = trials as f64;
    let mean = n * p;
    let std_dev = (n * p * (1.0 - p)).sqrt();
    let draw = mean + std_dev * standard_normal(rng);
    draw.round().clamp(0.0, n) as u64
}

/// Box-Muller transform.
pub fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    // u1 in (0, 1] keeps ln finite.
    let u1 = 1.0 - rng.gen::<f64>();
    let u2 = rng.gen::<f64>();
    (-2.0 * u1.ln()).sqrt() * (TAU * u2).cos()
}
