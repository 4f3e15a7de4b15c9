//! Photon count sampling.
//!
//! Expected counts are turned into integers by stochastic rounding:
//! `n = floor(λ) + [u < frac(λ)]`. This keeps `E[n] = λ` with less variance
//! than a Poisson draw. Consumers that need Poisson statistics must add them
//! downstream.

use rand::Rng;

/// Integer photon counts from expected counts, one uniform draw per cell.
///
/// A draw is consumed for every cell, including cells with `λ = 0`, so the
/// generator stream does not depend on which cells are empty. Negative or
/// non-finite expectations yield zero photons.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn stochastic_round<R: Rng + ?Sized>(lambdas: &[f64], rng: &mut R) -> Vec<u64> {
    lambdas
        .iter()
        .map(|&lambda| {
            let u: f64 = rng.random();
            if !(lambda.is_finite() && lambda > 0.0) {
                return 0;
            }
            let whole = lambda.floor();
            let frac = lambda - whole;
            let extra = u64::from(u < frac);
            whole as u64 + extra
        })
        .collect()
}

/// Indices of cells with at least one photon, in input order.
#[must_use]
pub fn active_indices(counts: &[u64]) -> Vec<usize> {
    counts
        .iter()
        .enumerate()
        .filter_map(|(i, &n)| (n > 0).then_some(i))
        .collect()
}
