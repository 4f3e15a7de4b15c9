//! Spectral energy grid and photon energy sampling.

use crate::error::{Error, Result};
use rand::distr::weighted::WeightedIndex;
use rand::distr::Distribution;
use rand::Rng;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Energy bin edges (keV) and their midpoints.
#[derive(Clone, Debug, PartialEq)]
pub struct SpectralGrid {
    ebins: Vec<f64>,
    emid: Vec<f64>,
}

impl SpectralGrid {
    /// A linear grid of `nchan` channels on `[emin, emax]`.
    ///
    /// # Errors
    /// Returns [`Error::ConfigError`] if `nchan` is 0 or the bounds are not increasing.
    #[allow(clippy::cast_precision_loss)]
    pub fn linear(emin: f64, emax: f64, nchan: usize) -> Result<Self> {
        if nchan == 0 {
            return Err(Error::ConfigError("nchan must be at least 1".to_string()));
        }
        if !(emin.is_finite() && emax.is_finite() && emin < emax) {
            return Err(Error::ConfigError(format!(
                "invalid energy range [{emin}, {emax}]"
            )));
        }
        let de = (emax - emin) / nchan as f64;
        let ebins = (0..=nchan).map(|i| emin + de * i as f64).collect();
        Self::from_edges(ebins)
    }

    /// A grid from explicit bin edges.
    ///
    /// # Errors
    /// Returns [`Error::ConfigError`] if fewer than two edges are given or
    /// the edges are not strictly increasing.
    pub fn from_edges(ebins: Vec<f64>) -> Result<Self> {
        if ebins.len() < 2 {
            return Err(Error::ConfigError(
                "an energy grid needs at least two edges".to_string(),
            ));
        }
        if ebins
            .windows(2)
            .any(|w| w[0].partial_cmp(&w[1]) != Some(Ordering::Less))
        {
            return Err(Error::ConfigError(
                "energy bin edges must be strictly increasing".to_string(),
            ));
        }
        let emid = ebins.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect();
        Ok(Self { ebins, emid })
    }

    /// Bin edges, `nchan + 1` values.
    #[must_use]
    pub fn ebins(&self) -> &[f64] {
        &self.ebins
    }

    /// Bin midpoints, `nchan` values.
    #[must_use]
    pub fn emid(&self) -> &[f64] {
        &self.emid
    }

    /// Number of channels.
    #[must_use]
    pub fn nchan(&self) -> usize {
        self.emid.len()
    }

    #[must_use]
    pub fn emin(&self) -> f64 {
        self.ebins[0]
    }

    #[must_use]
    pub fn emax(&self) -> f64 {
        self.ebins[self.ebins.len() - 1]
    }

    /// Width of channel `i`.
    #[must_use]
    pub fn width(&self, i: usize) -> f64 {
        self.ebins[i + 1] - self.ebins[i]
    }
}

/// How photon energies are drawn from a discretised spectrum.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum EnergyMethod {
    /// Sorted uniforms interpolated through the cumulative spectrum onto the bin edges.
    #[default]
    InvertCdf,
    /// Weighted channel draw mapped to channel midpoints.
    #[cfg_attr(feature = "serde", serde(alias = "accept_reject"))]
    Categorical,
}

impl fmt::Display for EnergyMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnergyMethod::InvertCdf => f.write_str("invert_cdf"),
            EnergyMethod::Categorical => f.write_str("categorical"),
        }
    }
}

impl FromStr for EnergyMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "invert_cdf" => Ok(EnergyMethod::InvertCdf),
            "categorical" | "accept_reject" => Ok(EnergyMethod::Categorical),
            other => Err(Error::ConfigError(format!(
                "unknown energy sampling method '{other}'"
            ))),
        }
    }
}

/// Piecewise-linear interpolation of `x` through `(xp, fp)`.
///
/// `xp` must be non-decreasing. Values outside the table clamp to the end
/// points. Flat runs in `xp` are skipped over.
#[must_use]
pub fn interp(x: f64, xp: &[f64], fp: &[f64]) -> f64 {
    let n = xp.len().min(fp.len());
    if n == 0 {
        return f64::NAN;
    }
    let above = xp[..n].partition_point(|&v| v <= x);
    if above == 0 {
        return fp[0];
    }
    if above == n {
        return fp[n - 1];
    }
    let (lo, hi) = (above - 1, above);
    let t = (x - xp[lo]) / (xp[hi] - xp[lo]);
    fp[lo] + t * (fp[hi] - fp[lo])
}

/// Normalised cumulative spectrum with a leading zero, `nchan + 1` values.
///
/// # Errors
/// Returns [`Error::SpectralError`] if the spectrum is empty, has a negative
/// or non-finite channel, or sums to zero.
pub fn normalized_cdf(spectrum: &[f64]) -> Result<Vec<f64>> {
    if spectrum.iter().any(|v| !v.is_finite() || *v < 0.0) {
        return Err(Error::SpectralError(
            "spectrum has negative or non-finite channels".to_string(),
        ));
    }
    let mut cdf = Vec::with_capacity(spectrum.len() + 1);
    let mut acc = 0.0;
    cdf.push(0.0);
    for value in spectrum {
        acc += value;
        cdf.push(acc);
    }
    if acc <= 0.0 {
        return Err(Error::SpectralError(
            "cannot sample energies from an empty spectrum".to_string(),
        ));
    }
    for value in &mut cdf {
        *value /= acc;
    }
    Ok(cdf)
}

/// Precomputed sampler for one spectral shape.
///
/// Building the sampler normalises the spectrum once; each call to
/// [`EnergySampler::sample`] then costs only the draws.
#[derive(Clone, Debug)]
pub enum EnergySampler<'a> {
    InvertCdf {
        cdf: Vec<f64>,
        ebins: &'a [f64],
    },
    Categorical {
        weights: WeightedIndex<f64>,
        emid: &'a [f64],
    },
}

impl<'a> EnergySampler<'a> {
    /// Prepare to draw from `spectrum` over `grid`.
    ///
    /// # Errors
    /// Returns [`Error::SpectralError`] if the spectrum does not match the
    /// grid, has negative or non-finite channels, or sums to zero.
    pub fn new(method: EnergyMethod, spectrum: &[f64], grid: &'a SpectralGrid) -> Result<Self> {
        check_channels(spectrum, grid)?;
        match method {
            EnergyMethod::InvertCdf => Ok(EnergySampler::InvertCdf {
                cdf: normalized_cdf(spectrum)?,
                ebins: grid.ebins(),
            }),
            EnergyMethod::Categorical => {
                let weights = WeightedIndex::new(spectrum)
                    .map_err(|e| Error::SpectralError(format!("invalid channel weights: {e}")))?;
                Ok(EnergySampler::Categorical {
                    weights,
                    emid: grid.emid(),
                })
            }
        }
    }

    /// Draw `n` energies in keV.
    ///
    /// Inverse-CDF draws come back in ascending order.
    pub fn sample<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Vec<f64> {
        match self {
            EnergySampler::InvertCdf { cdf, ebins } => {
                let mut u: Vec<f64> = (0..n).map(|_| rng.random::<f64>()).collect();
                u.sort_unstable_by(f64::total_cmp);
                u.into_iter().map(|value| interp(value, cdf, ebins)).collect()
            }
            EnergySampler::Categorical { weights, emid } => {
                (0..n).map(|_| emid[weights.sample(rng)]).collect()
            }
        }
    }
}

/// Draw `n` energies from `spectrum` with the chosen method.
///
/// Drawing zero photons never fails, even from an empty spectrum.
///
/// # Errors
/// See [`EnergySampler::new`].
pub fn sample_energies<R: Rng + ?Sized>(
    method: EnergyMethod,
    spectrum: &[f64],
    grid: &SpectralGrid,
    n: usize,
    rng: &mut R,
) -> Result<Vec<f64>> {
    if n == 0 {
        check_channels(spectrum, grid)?;
        return Ok(Vec::new());
    }
    Ok(EnergySampler::new(method, spectrum, grid)?.sample(n, rng))
}

fn check_channels(spectrum: &[f64], grid: &SpectralGrid) -> Result<()> {
    if spectrum.len() == grid.nchan() {
        Ok(())
    } else {
        Err(Error::SpectralError(format!(
            "spectrum has {} channels but the grid has {}",
            spectrum.len(),
            grid.nchan()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn linear_grid_midpoints() {
        let grid = SpectralGrid::linear(0.1, 10.1, 100).unwrap();
        assert_eq!(grid.ebins().len(), 101);
        assert_eq!(grid.nchan(), 100);
        assert_relative_eq!(grid.emid()[0], 0.15, max_relative = 1e-12);
        assert_relative_eq!(grid.emax(), 10.1, max_relative = 1e-12);
        assert!(SpectralGrid::linear(1.0, 1.0, 10).is_err());
        assert!(SpectralGrid::from_edges(vec![1.0, 0.5]).is_err());
    }

    #[test]
    fn interp_clamps_and_skips_flat_runs() {
        let xp = [0.0, 0.0, 0.5, 1.0];
        let fp = [0.0, 1.0, 2.0, 3.0];
        assert_relative_eq!(interp(-1.0, &xp, &fp), 0.0);
        assert_relative_eq!(interp(0.25, &xp, &fp), 1.5);
        assert_relative_eq!(interp(2.0, &xp, &fp), 3.0);
    }

    #[test]
    fn invert_cdf_stays_on_grid() {
        let grid = SpectralGrid::linear(0.5, 2.5, 4).unwrap();
        let spectrum = [0.0, 1.0, 0.0, 1.0];
        let mut rng = StdRng::seed_from_u64(7);
        let energies =
            sample_energies(EnergyMethod::InvertCdf, &spectrum, &grid, 2000, &mut rng).unwrap();
        assert_eq!(energies.len(), 2000);
        assert!(energies.windows(2).all(|w| w[0] <= w[1]));
        // Only channels [1.0, 1.5) and [2.0, 2.5] carry weight.
        assert!(energies
            .iter()
            .all(|&e| (1.0..=1.5).contains(&e) || (2.0..=2.5).contains(&e)));
    }

    #[test]
    fn categorical_returns_midpoints() {
        let grid = SpectralGrid::linear(0.0, 3.0, 3).unwrap();
        let mut rng = StdRng::seed_from_u64(8);
        let spectrum = [0.0, 0.0, 2.0];
        let energies =
            sample_energies(EnergyMethod::Categorical, &spectrum, &grid, 50, &mut rng).unwrap();
        assert!(energies.iter().all(|&e| (e - 2.5).abs() < 1e-12));
    }

    #[test]
    fn empty_spectrum_is_an_error() {
        let grid = SpectralGrid::linear(0.0, 1.0, 2).unwrap();
        let mut rng = StdRng::seed_from_u64(9);
        assert!(EnergySampler::new(EnergyMethod::InvertCdf, &[0.0, 0.0], &grid).is_err());
        assert!(EnergySampler::new(EnergyMethod::Categorical, &[0.0, 0.0], &grid).is_err());
        assert!(EnergySampler::new(EnergyMethod::InvertCdf, &[1.0], &grid).is_err());
        assert!(sample_energies(EnergyMethod::InvertCdf, &[0.0, 0.0], &grid, 0, &mut rng)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn method_names() {
        assert_eq!("invert_cdf".parse::<EnergyMethod>().unwrap(), EnergyMethod::InvertCdf);
        assert_eq!(
            "accept_reject".parse::<EnergyMethod>().unwrap(),
            EnergyMethod::Categorical
        );
        assert!("mcmc".parse::<EnergyMethod>().is_err());
    }
}
