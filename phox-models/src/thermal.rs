//! Thermal photon model.
//!
//! Cells are grouped into linear temperature bins; the spectral model is
//! queried once per occupied bin at the bin midpoint. Each cell's expected
//! count is its emission measure times the bin's integrated spectrum times
//! the observation normalisation.

use crate::kinematics::append_active_cells;
use log::debug;
use phox_core::cells::fields;
use phox_core::units::PROTON_MASS_G;
use phox_core::{
    stochastic_round, CellChunk, ChunkedDataSource, EnergyMethod, EnergySampler, Error,
    ObservationParams, PhotonBatch, Result, SpectralModel, Unit,
};
use rand::Rng;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Metallicity in solar units: one value for every cell, or a per-cell field.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum Metallicity {
    Constant(f64),
    Field(String),
}

impl Default for Metallicity {
    fn default() -> Self {
        Metallicity::Constant(0.3)
    }
}

/// Thermal model configuration.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ThermalConfig {
    /// Hydrogen mass fraction.
    pub x_h: f64,
    pub metallicity: Metallicity,
    /// Maximum photons a single chunk may produce.
    pub photons_per_chunk: u64,
    pub method: EnergyMethod,
    /// Number of temperature bins.
    pub n_kt: usize,
    /// Lower edge of the temperature bins, keV.
    pub kt_min: f64,
    /// Minimum upper edge of the temperature bins, keV.
    pub kt_max: f64,
}

impl Default for ThermalConfig {
    fn default() -> Self {
        Self {
            x_h: 0.75,
            metallicity: Metallicity::default(),
            photons_per_chunk: 10_000_000,
            method: EnergyMethod::InvertCdf,
            n_kt: 10_000,
            kt_min: 8.08e-2,
            kt_max: 50.0,
        }
    }
}

impl ThermalConfig {
    #[must_use]
    pub fn with_x_h(mut self, x_h: f64) -> Self {
        self.x_h = x_h;
        self
    }

    #[must_use]
    pub fn with_metallicity(mut self, metallicity: Metallicity) -> Self {
        self.metallicity = metallicity;
        self
    }

    #[must_use]
    pub fn with_photons_per_chunk(mut self, photons: u64) -> Self {
        self.photons_per_chunk = photons;
        self
    }

    #[must_use]
    pub fn with_method(mut self, method: EnergyMethod) -> Self {
        self.method = method;
        self
    }

    /// Set the temperature binning.
    #[must_use]
    pub fn with_kt_bins(mut self, n_kt: usize, kt_min: f64, kt_max: f64) -> Self {
        self.n_kt = n_kt;
        self.kt_min = kt_min;
        self.kt_max = kt_max;
        self
    }

    fn validate(&self) -> Result<()> {
        if !(self.x_h > 0.0 && self.x_h <= 1.0) {
            return Err(Error::ConfigError(format!(
                "x_h must be in (0, 1], got {}",
                self.x_h
            )));
        }
        if let Metallicity::Constant(z) = self.metallicity {
            if !(z.is_finite() && z >= 0.0) {
                return Err(Error::ConfigError(format!(
                    "metallicity must be non-negative, got {z}"
                )));
            }
        }
        if self.photons_per_chunk == 0 {
            return Err(Error::ConfigError(
                "photons_per_chunk must be at least 1".to_string(),
            ));
        }
        if self.n_kt == 0 {
            return Err(Error::ConfigError("n_kt must be at least 1".to_string()));
        }
        if !(self.kt_min.is_finite() && self.kt_min < self.kt_max) {
            return Err(Error::ConfigError(format!(
                "invalid temperature range [{}, {}]",
                self.kt_min, self.kt_max
            )));
        }
        Ok(())
    }
}

/// Linear temperature bins with half-open membership, clamped at both ends.
#[derive(Clone, Debug, PartialEq)]
struct TemperatureBins {
    edges: Vec<f64>,
    width: f64,
}

impl TemperatureBins {
    #[allow(clippy::cast_precision_loss)]
    fn new(kt_min: f64, kt_max: f64, n: usize) -> Self {
        let width = (kt_max - kt_min) / n as f64;
        let edges = (0..=n).map(|i| kt_min + width * i as f64).collect();
        Self { edges, width }
    }

    fn count(&self) -> usize {
        self.edges.len() - 1
    }

    fn index(&self, kt: f64) -> usize {
        let above = self.edges.partition_point(|&e| e <= kt);
        above.clamp(1, self.count()) - 1
    }

    fn midpoint(&self, bin: usize) -> f64 {
        self.edges[bin] + 0.5 * self.width
    }
}

/// Photons from thermal plasma emission.
#[derive(Clone, Debug)]
pub struct ThermalPhotonModel {
    config: ThermalConfig,
    spectral: SpectralModel,
    bins: Option<TemperatureBins>,
}

impl ThermalPhotonModel {
    /// Create a thermal model over `spectral`.
    ///
    /// # Errors
    /// Returns [`Error::ConfigError`] if the configuration is invalid.
    pub fn new(spectral: SpectralModel, config: ThermalConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            spectral,
            bins: None,
        })
    }

    #[must_use]
    pub fn config(&self) -> &ThermalConfig {
        &self.config
    }

    #[must_use]
    pub fn spectral_model(&self) -> &SpectralModel {
        &self.spectral
    }

    /// Fix the temperature bins from the data set and prepare the spectral model.
    ///
    /// The upper bin edge is the larger of the configured `kt_max` and the
    /// hottest cell in `source`.
    ///
    /// # Errors
    /// Propagates data source and spectral model errors.
    pub fn prepare<S: ChunkedDataSource + ?Sized>(
        &mut self,
        source: &S,
        params: &ObservationParams,
    ) -> Result<()> {
        let hottest = source
            .field_extrema(fields::TEMPERATURE, Unit::KeV)?
            .map_or(self.config.kt_max, |(_, hi)| hi);
        let upper = hottest.max(self.config.kt_max);
        self.bins = Some(TemperatureBins::new(
            self.config.kt_min,
            upper,
            self.config.n_kt,
        ));
        debug!(
            "thermal model: {} temperature bins on [{}, {upper}] keV",
            self.config.n_kt, self.config.kt_min
        );
        self.spectral.prepare(params.redshift)
    }

    /// Release prepared state.
    pub fn cleanup(&mut self) {
        self.spectral.cleanup();
        self.bins = None;
    }

    /// Generate photons for one chunk.
    ///
    /// Active cells are emitted in ascending temperature order.
    ///
    /// # Errors
    /// Returns [`Error::CapacityOverflow`] if the chunk produces more than
    /// `photons_per_chunk` photons, and propagates field, unit and spectral
    /// errors.
    #[allow(clippy::too_many_lines)]
    pub fn generate_chunk<R: Rng + ?Sized>(
        &self,
        chunk: &CellChunk,
        params: &ObservationParams,
        rng: &mut R,
    ) -> Result<PhotonBatch> {
        let bins = self.bins.as_ref().ok_or_else(|| {
            Error::ConfigError("thermal model used before prepare()".to_string())
        })?;
        let n = chunk.len();
        if n == 0 {
            return Ok(PhotonBatch::default());
        }

        let kt = chunk.values_in(fields::TEMPERATURE, Unit::KeV)?;
        let density = chunk.values_in(fields::DENSITY, Unit::GramPerCubicCentimeter)?;
        let volume = chunk.values_in(fields::CELL_VOLUME, Unit::CubicCentimeter)?;
        let (shared_z, metallicity) = match &self.config.metallicity {
            Metallicity::Constant(z) => (Some(*z), vec![*z; n]),
            Metallicity::Field(name) => (None, chunk.values_in(name, Unit::Dimensionless)?),
        };

        let composition = 0.5 * (1.0 + self.config.x_h) * self.config.x_h;
        let emission_measure: Vec<f64> = density
            .iter()
            .zip(&volume)
            .map(|(rho, vol)| {
                let nh = rho / PROTON_MASS_G;
                nh * nh * composition * vol
            })
            .collect();

        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| kt[a].total_cmp(&kt[b]));

        let norm = params.spectral_norm();
        let grid = self.spectral.grid();
        let capacity = self.config.photons_per_chunk;
        let mut produced = 0u64;
        let mut active = Vec::new();
        let mut batch = PhotonBatch::default();

        let mut start = 0;
        while start < n {
            let bin = bins.index(kt[order[start]]);
            let mut end = start + 1;
            while end < n && bins.index(kt[order[end]]) == bin {
                end += 1;
            }
            let members = &order[start..end];
            start = end;

            let spectrum = self.spectral.spectrum(bins.midpoint(bin))?;
            let (total_cosmic, total_metal) = spectrum.totals();
            let lambdas: Vec<f64> = members
                .iter()
                .map(|&cell| {
                    (total_cosmic + metallicity[cell] * total_metal) * emission_measure[cell] * norm
                })
                .collect();
            let counts = stochastic_round(&lambdas, rng);
            let bin_photons = counts.iter().fold(0u64, |acc, &c| acc.saturating_add(c));
            produced = produced.saturating_add(bin_photons);
            if produced > capacity {
                return Err(Error::CapacityOverflow {
                    produced,
                    capacity,
                });
            }
            if bin_photons == 0 {
                continue;
            }

            let shared = match shared_z {
                Some(z) => Some(EnergySampler::new(
                    self.config.method,
                    &spectrum.combined(z),
                    grid,
                )?),
                None => None,
            };
            for (&cell, &count) in members.iter().zip(&counts) {
                if count == 0 {
                    continue;
                }
                let k = usize::try_from(count).map_err(|_| Error::CapacityOverflow {
                    produced,
                    capacity,
                })?;
                let energies = if let Some(sampler) = &shared {
                    sampler.sample(k, rng)
                } else {
                    let combined = spectrum.combined(metallicity[cell]);
                    EnergySampler::new(self.config.method, &combined, grid)?.sample(k, rng)
                };
                batch.energy.extend(energies);
                batch.number_of_photons.push(count);
                active.push(cell);
            }
        }

        append_active_cells(&mut batch, chunk, &active, params)?;
        debug!(
            "thermal chunk: {n} cells, {} active, {produced} photons",
            active.len()
        );
        Ok(batch)
    }
}
