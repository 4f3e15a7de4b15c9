//! Line emission photon model.

use crate::kinematics::append_active_cells;
use log::debug;
use phox_core::cells::fields;
use phox_core::sampling::active_indices;
use phox_core::units::{Dimension, CLIGHT_KM_S};
use phox_core::{
    stochastic_round, CellChunk, Error, ObservationParams, PhotonBatch, Result, Unit,
};
use rand::Rng;
use rand_distr::{Distribution, Normal};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Intrinsic line width as configured: a constant with a unit, or a field name.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum LineBroadening {
    /// A width in energy or velocity units.
    Constant { value: f64, unit: Unit },
    /// A per-cell width field in energy or velocity units.
    Field(String),
}

/// Width resolved against the line location.
#[derive(Clone, Debug, PartialEq)]
enum Width {
    None,
    ConstantKev(f64),
    Field(String),
}

/// Factor turning a width in `unit` into keV for a line at `location` keV.
fn width_to_kev(unit: Unit, location: f64) -> Result<f64> {
    match unit.dimension() {
        Dimension::Energy => unit.conversion_factor(Unit::KeV),
        Dimension::Velocity => {
            Ok(unit.conversion_factor(Unit::KilometerPerSecond)? * location / CLIGHT_KM_S)
        }
        _ => Err(Error::UnitMismatch {
            from: unit.symbol().to_string(),
            to: "keV or km/s".to_string(),
        }),
    }
}

/// Photons from a single emission line at a fixed rest-frame energy.
#[derive(Clone, Debug, PartialEq)]
pub struct LineEmissionModel {
    location: f64,
    amplitude_field: String,
    width: Width,
}

impl LineEmissionModel {
    /// Create a line model at `location` keV.
    ///
    /// `amplitude_field` holds the line emissivity in photons/s/cm^3.
    ///
    /// # Errors
    /// Returns [`Error::ConfigError`] for a non-positive location or a
    /// constant width that is negative or not in energy or velocity units.
    pub fn new(
        location: f64,
        amplitude_field: impl Into<String>,
        broadening: Option<LineBroadening>,
    ) -> Result<Self> {
        if !(location.is_finite() && location > 0.0) {
            return Err(Error::ConfigError(format!(
                "line location must be positive, got {location}"
            )));
        }
        let width = match broadening {
            None => Width::None,
            Some(LineBroadening::Field(name)) => Width::Field(name),
            Some(LineBroadening::Constant { value, unit }) => {
                let factor = width_to_kev(unit, location).map_err(|_| {
                    Error::ConfigError(format!(
                        "line width must be in energy or velocity units, got '{unit}'"
                    ))
                })?;
                let sigma = value * factor;
                if !(sigma.is_finite() && sigma >= 0.0) {
                    return Err(Error::ConfigError(format!(
                        "line width must be non-negative, got {value} {unit}"
                    )));
                }
                Width::ConstantKev(sigma)
            }
        };
        Ok(Self {
            location,
            amplitude_field: amplitude_field.into(),
            width,
        })
    }

    /// Constant line width in keV, if one was configured.
    #[must_use]
    pub fn constant_width_kev(&self) -> Option<f64> {
        match self.width {
            Width::ConstantKev(sigma) => Some(sigma),
            _ => None,
        }
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
        let amplitude =
            chunk.values_in(&self.amplitude_field, Unit::PhotonsPerSecondPerCubicCentimeter)?;
        let volume = chunk.values_in(fields::CELL_VOLUME, Unit::CubicCentimeter)?;
        let scale = params.dist_fac() * params.exposure_time_s * params.area_cm2;
        Ok(amplitude
            .iter()
            .zip(&volume)
            .map(|(a, v)| a * v * scale)
            .collect())
    }

    /// Generate photons for one chunk. Energies are observer-frame.
    ///
    /// # Errors
    /// Propagates missing fields and unit mismatches, including a width
    /// field in units that are neither energy nor velocity.
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
        let counts = stochastic_round(&lambdas, rng);
        let active = active_indices(&counts);
        let active_counts: Vec<u64> = active.iter().map(|&i| counts[i]).collect();
        let total = usize::try_from(active_counts.iter().sum::<u64>()).map_err(|_| {
            Error::ConfigError("photon count exceeds addressable memory".to_string())
        })?;

        let mut energies = vec![self.location; total];
        match &self.width {
            Width::None => {}
            Width::ConstantKev(sigma) => {
                let normal = normal(*sigma)?;
                for e in &mut energies {
                    *e += normal.sample(rng);
                }
            }
            Width::Field(name) => {
                let column = chunk.field(name)?;
                let factor = width_to_kev(column.unit, self.location)?;
                let mut start = 0;
                for (&cell, &count) in active.iter().zip(&active_counts) {
                    let end = start + usize::try_from(count).unwrap_or(0);
                    let normal = normal(column.values[cell] * factor)?;
                    for e in &mut energies[start..end] {
                        *e += normal.sample(rng);
                    }
                    start = end;
                }
            }
        }
        let scale = 1.0 + params.redshift;
        for e in &mut energies {
            *e /= scale;
        }

        let mut batch = PhotonBatch {
            number_of_photons: active_counts,
            energy: energies,
            ..PhotonBatch::default()
        };
        append_active_cells(&mut batch, chunk, &active, params)?;
        debug!(
            "line chunk: {} cells, {} active, {total} photons",
            chunk.len(),
            active.len()
        );
        Ok(batch)
    }
}

fn normal(sigma: f64) -> Result<Normal<f64>> {
    Normal::new(0.0, sigma)
        .map_err(|e| Error::ConfigError(format!("invalid line width {sigma} keV: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::kinematic_chunk;
    use approx::assert_relative_eq;
    use phox_core::ObservationConfig;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const REDSHIFT: f64 = 0.1;

    fn params() -> ObservationParams {
        ObservationConfig::default()
            .with_redshift(REDSHIFT)
            .with_distance_mpc(1.0e-3)
            .with_exposure_time_s(1.0)
            .with_area_cm2(1.0)
            .resolve()
            .unwrap()
    }

    /// Cells whose expected count is exactly `lambda` each.
    fn chunk(cells: usize, lambda: f64, params: &ObservationParams) -> CellChunk {
        let amplitude = lambda / params.dist_fac();
        kinematic_chunk(cells)
            .with_field("amp", vec![amplitude; cells], Unit::PhotonsPerSecondPerCubicCentimeter)
            .unwrap()
            .with_field(fields::CELL_VOLUME, vec![1.0; cells], Unit::CubicCentimeter)
            .unwrap()
    }

    #[allow(clippy::cast_precision_loss)]
    fn std_dev(values: &[f64]) -> f64 {
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
    }

    #[test]
    fn unbroadened_line_is_exact() {
        let params = params();
        let model = LineEmissionModel::new(3.5, "amp", None).unwrap();
        let mut rng = StdRng::seed_from_u64(31);
        let batch = model
            .generate_chunk(&chunk(50, 4.0, &params), &params, &mut rng)
            .unwrap();
        assert_eq!(batch.number_of_photons.len(), 50);
        let expected = 3.5 / (1.0 + REDSHIFT);
        assert!(batch.energy.iter().all(|e| e.to_bits() == expected.to_bits()));
        assert!(batch.validate().is_ok());
    }

    #[test]
    fn constant_width_converges() {
        let params = params();
        let sigma = 0.05;
        let broadening = LineBroadening::Constant {
            value: sigma,
            unit: Unit::KeV,
        };
        let model = LineEmissionModel::new(6.7, "amp", Some(broadening)).unwrap();
        let mut rng = StdRng::seed_from_u64(32);
        let batch = model
            .generate_chunk(&chunk(1000, 20.0, &params), &params, &mut rng)
            .unwrap();
        assert_eq!(batch.energy.len(), 20_000);
        assert_relative_eq!(
            std_dev(&batch.energy),
            sigma / (1.0 + REDSHIFT),
            max_relative = 0.03
        );
    }

    #[test]
    fn velocity_width_scales_with_location() {
        let broadening = LineBroadening::Constant {
            value: 1000.0,
            unit: Unit::KilometerPerSecond,
        };
        let model = LineEmissionModel::new(3.5, "amp", Some(broadening)).unwrap();
        assert_relative_eq!(
            model.constant_width_kev().unwrap(),
            3.5 * 1000.0 / CLIGHT_KM_S,
            max_relative = 1e-12
        );
    }

    #[test]
    fn width_in_wrong_units_fails_at_construction() {
        let broadening = LineBroadening::Constant {
            value: 1.0,
            unit: Unit::Kiloparsec,
        };
        let err = LineEmissionModel::new(3.5, "amp", Some(broadening));
        assert!(matches!(err, Err(Error::ConfigError(_))));
        assert!(LineEmissionModel::new(-1.0, "amp", None).is_err());
    }

    #[test]
    fn width_field_is_used_per_cell() {
        let params = params();
        let base = chunk(2, 3000.0, &params);
        let with_width = base
            .with_field("sigma", vec![0.0, 0.2], Unit::KeV)
            .unwrap();
        let broadening = Some(LineBroadening::Field("sigma".into()));
        let model = LineEmissionModel::new(1.0, "amp", broadening).unwrap();
        let mut rng = StdRng::seed_from_u64(33);
        let batch = model.generate_chunk(&with_width, &params, &mut rng).unwrap();
        let ranges: Vec<usize> = batch
            .number_of_photons
            .iter()
            .map(|&n| usize::try_from(n).unwrap())
            .collect();
        let (first, second) = batch.energy.split_at(ranges[0]);
        let expected = 1.0 / (1.0 + REDSHIFT);
        assert!(first.iter().all(|e| e.to_bits() == expected.to_bits()));
        assert_relative_eq!(std_dev(second), 0.2 / (1.0 + REDSHIFT), max_relative = 0.08);
    }

    #[test]
    fn velocity_width_field_is_converted() {
        let params = params();
        let cells = 500;
        let with_width = chunk(cells, 20.0, &params)
            .with_field("v_turb", vec![3000.0; cells], Unit::KilometerPerSecond)
            .unwrap();
        let broadening = Some(LineBroadening::Field("v_turb".into()));
        let model = LineEmissionModel::new(6.0, "amp", broadening).unwrap();
        let mut rng = StdRng::seed_from_u64(35);
        let batch = model.generate_chunk(&with_width, &params, &mut rng).unwrap();
        assert_eq!(batch.energy.len(), 10_000);
        let expected = 6.0 * 3000.0 / CLIGHT_KM_S / (1.0 + REDSHIFT);
        assert_relative_eq!(std_dev(&batch.energy), expected, max_relative = 0.03);
    }

    #[test]
    fn width_field_in_wrong_units_propagates() {
        let params = params();
        let with_width = chunk(2, 5.0, &params)
            .with_field("sigma", vec![1.0, 1.0], Unit::Kiloparsec)
            .unwrap();
        let broadening = Some(LineBroadening::Field("sigma".into()));
        let model = LineEmissionModel::new(1.0, "amp", broadening).unwrap();
        let mut rng = StdRng::seed_from_u64(34);
        let err = model.generate_chunk(&with_width, &params, &mut rng);
        assert!(matches!(err, Err(Error::UnitMismatch { .. })));
    }
}
