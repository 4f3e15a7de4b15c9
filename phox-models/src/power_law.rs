//! Power-law photon model: `dN/dE ∝ (E/E0)^(-index)` on `[emin, emax]`.

use crate::kinematics::append_active_cells;
use log::debug;
use phox_core::sampling::active_indices;
use phox_core::{
    stochastic_round, CellChunk, Error, ObservationParams, PhotonBatch, Result, Unit,
};
use rand::Rng;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Indices closer than this to 1 use the logarithmic limit.
const UNIT_INDEX_TOLERANCE: f64 = 1.0e-10;

/// Photon index: one value for every cell, or a per-cell field.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum PowerLawIndex {
    Constant(f64),
    Field(String),
}

/// Photons from a per-cell power-law spectrum.
#[derive(Clone, Debug, PartialEq)]
pub struct PowerLawModel {
    norm_field: String,
    e0: f64,
    emin: f64,
    emax: f64,
    index: PowerLawIndex,
}

/// Band integral and energy inversion for one index value.
#[derive(Clone, Copy, Debug)]
struct Band {
    emin: f64,
    emax: f64,
    index: f64,
}

impl Band {
    fn is_logarithmic(self) -> bool {
        (1.0 - self.index).abs() < UNIT_INDEX_TOLERANCE
    }

    /// `∫ (E/e0)^(-index) dE` over the band, divided by `e0^index`.
    fn integral(self) -> f64 {
        if self.is_logarithmic() {
            (self.emax / self.emin).ln()
        } else {
            let p = 1.0 - self.index;
            (self.emax.powf(p) - self.emin.powf(p)) / p
        }
    }

    fn energy(self, u: f64) -> f64 {
        if self.is_logarithmic() {
            self.emin * (self.emax / self.emin).powf(u)
        } else {
            let p = 1.0 - self.index;
            let lo = self.emin.powf(p);
            (lo + u * (self.emax.powf(p) - lo)).powf(1.0 / p)
        }
    }
}

impl PowerLawModel {
    /// Create a power-law model.
    ///
    /// `norm_field` holds each cell's normalisation in photons/s/keV at `e0`;
    /// energies are in keV.
    ///
    /// # Errors
    /// Returns [`Error::ConfigError`] unless `0 < emin < emax` and `e0 > 0`,
    /// or if a constant index is not finite.
    pub fn new(
        norm_field: impl Into<String>,
        e0: f64,
        emin: f64,
        emax: f64,
        index: PowerLawIndex,
    ) -> Result<Self> {
        if !(e0.is_finite() && e0 > 0.0) {
            return Err(Error::ConfigError(format!(
                "reference energy must be positive, got {e0}"
            )));
        }
        if !(emin.is_finite() && emax.is_finite() && emin > 0.0 && emin < emax) {
            return Err(Error::ConfigError(format!(
                "power-law band must satisfy 0 < emin < emax, got [{emin}, {emax}]"
            )));
        }
        if let PowerLawIndex::Constant(value) = index {
            if !value.is_finite() {
                return Err(Error::ConfigError("power-law index must be finite".to_string()));
            }
        }
        Ok(Self {
            norm_field: norm_field.into(),
            e0,
            emin,
            emax,
            index,
        })
    }

    /// Expected photon count of every cell in `chunk`.
    ///
    /// # Errors
    /// Propagates missing fields and unit mismatches.
    pub fn expected_counts(
        &self,
        chunk: &CellChunk,
        params: &ObservationParams,
    ) -> Result<Vec<f64>> {
        let norm = chunk.values_in(&self.norm_field, Unit::PhotonsPerSecondPerKeV)?;
        let indices = self.indices(chunk)?;
        let scale = params.exposure_time_s * params.area_cm2 * params.dist_fac();
        Ok(norm
            .iter()
            .zip(&indices)
            .map(|(&n, &index)| {
                let band = self.band(index);
                scale * n * self.e0.powf(index) * band.integral()
            })
            .collect())
    }

    fn indices(&self, chunk: &CellChunk) -> Result<Vec<f64>> {
        match &self.index {
            PowerLawIndex::Constant(value) => Ok(vec![*value; chunk.len()]),
            PowerLawIndex::Field(name) => chunk.values_in(name, Unit::Dimensionless),
        }
    }

    fn band(&self, index: f64) -> Band {
        Band {
            emin: self.emin,
            emax: self.emax,
            index,
        }
    }

    /// Generate photons for one chunk. Active cells keep their input order.
    ///
    /// # Errors
    /// Propagates missing fields and unit mismatches.
    pub fn generate_chunk<R: Rng + ?Sized>(
        &self,
        chunk: &CellChunk,
        params: &ObservationParams,
        rng: &mut R,
    ) -> Result<PhotonBatch> {
        if chunk.is_empty() {
            return Ok(PhotonBatch::default());
        }
        let lambdas = self.expected_counts(chunk, params)?;
        let indices = self.indices(chunk)?;
        let counts = stochastic_round(&lambdas, rng);
        let active = active_indices(&counts);

        let total: u64 = active.iter().map(|&i| counts[i]).sum();
        let mut batch =
            PhotonBatch::with_capacity(active.len(), usize::try_from(total).unwrap_or(0));
        for &cell in &active {
            let band = self.band(indices[cell]);
            let count = counts[cell];
            batch
                .energy
                .extend((0..count).map(|_| band.energy(rng.random::<f64>())));
            batch.number_of_photons.push(count);
        }
        append_active_cells(&mut batch, chunk, &active, params)?;
        debug!(
            "power-law chunk: {} cells, {} active, {total} photons",
            chunk.len(),
            active.len()
        );
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::kinematic_chunk;
    use approx::assert_relative_eq;
    use phox_core::ObservationConfig;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn params() -> ObservationParams {
        ObservationConfig::default()
            .with_redshift(0.0)
            .with_distance_mpc(1.0e-3)
            .with_exposure_time_s(1.0)
            .with_area_cm2(1.0)
            .resolve()
            .unwrap()
    }

    /// Normalisation giving `lambda` photons per cell for the given band.
    fn norm_for(lambda: f64, model: &PowerLawModel, index: f64, params: &ObservationParams) -> f64 {
        lambda / (params.dist_fac() * model.e0.powf(index) * model.band(index).integral())
    }

    fn run(index: f64, cells: usize, lambda: f64, seed: u64) -> (PhotonBatch, f64) {
        let params = params();
        let model =
            PowerLawModel::new("norm", 1.0, 1.0, 10.0, PowerLawIndex::Constant(index)).unwrap();
        let norm = norm_for(lambda, &model, index, &params);
        let chunk = kinematic_chunk(cells)
            .with_field("norm", vec![norm; cells], Unit::PhotonsPerSecondPerKeV)
            .unwrap();
        let expected: f64 = model.expected_counts(&chunk, &params).unwrap().iter().sum();
        let mut rng = StdRng::seed_from_u64(seed);
        let batch = model.generate_chunk(&chunk, &params, &mut rng).unwrap();
        (batch, expected)
    }

    #[test]
    #[allow(clippy::cast_precision_loss)]
    fn sampled_count_matches_analytic_expectation() {
        let (batch, expected) = run(2.0, 10_000, 3.4, 21);
        assert_relative_eq!(expected, 34_000.0, max_relative = 1e-9);
        let sampled = batch.energy.len() as f64;
        // Stochastic rounding variance is at most 0.25 per cell.
        assert!((sampled - expected).abs() < 5.0 * (0.25 * 10_000.0_f64).sqrt());
        assert!(batch.validate().is_ok());
    }

    #[test]
    #[allow(clippy::cast_precision_loss)]
    fn energies_follow_power_law() {
        let (batch, _) = run(2.0, 2000, 10.0, 22);
        assert!(batch.energy.iter().all(|&e| (1.0..=10.0).contains(&e)));
        let mean = batch.energy.iter().sum::<f64>() / batch.energy.len() as f64;
        // Mean of E^-2 on [1, 10] is ln(10) / 0.9.
        assert_relative_eq!(mean, 10.0_f64.ln() / 0.9, max_relative = 0.03);
    }

    #[test]
    #[allow(clippy::cast_precision_loss)]
    fn unit_index_uses_log_limit() {
        let (batch, expected) = run(1.0, 2000, 10.0, 23);
        assert_relative_eq!(expected, 20_000.0, max_relative = 1e-9);
        let mean = batch.energy.iter().sum::<f64>() / batch.energy.len() as f64;
        assert_relative_eq!(mean, 9.0 / 10.0_f64.ln(), max_relative = 0.03);
    }

    #[test]
    fn per_cell_index_field() {
        let params = params();
        let chunk = kinematic_chunk(2)
            .with_field("norm", vec![1.0e-50, 1.0e-50], Unit::PhotonsPerSecondPerKeV)
            .unwrap()
            .with_field("index", vec![1.0, 2.0], Unit::Dimensionless)
            .unwrap();
        let index = PowerLawIndex::Field("index".into());
        let model = PowerLawModel::new("norm", 1.0, 1.0, 10.0, index).unwrap();
        let lambdas = model.expected_counts(&chunk, &params).unwrap();
        let scale = params.dist_fac() * 1.0e-50;
        assert_relative_eq!(lambdas[0], scale * 10.0_f64.ln(), max_relative = 1e-12);
        assert_relative_eq!(lambdas[1], scale * 0.9, max_relative = 1e-12);
    }

    #[test]
    fn invalid_band_is_rejected() {
        assert!(PowerLawModel::new("n", 1.0, 0.0, 10.0, PowerLawIndex::Constant(2.0)).is_err());
        assert!(PowerLawModel::new("n", 1.0, 5.0, 1.0, PowerLawIndex::Constant(2.0)).is_err());
        assert!(PowerLawModel::new("n", 0.0, 1.0, 10.0, PowerLawIndex::Constant(2.0)).is_err());
        let nan = PowerLawIndex::Constant(f64::NAN);
        assert!(PowerLawModel::new("n", 1.0, 1.0, 10.0, nan).is_err());
    }
}
