//! Spectral models.
//!
//! A spectral model turns a plasma temperature into two emission spectra on a
//! fixed output grid: a fixed-composition "cosmic" component and a "metal"
//! component that the caller scales by metallicity. Channel values are in
//! photons cm^3 s^-1, so that multiplying by an emission measure (cm^-3) and
//! by `area * exposure * dist_fac` gives expected photon counts.
//!
//! The set of models is closed: tabulated spectra, an analytic
//! bremsstrahlung continuum and a single emission line.

use crate::energy::{interp, SpectralGrid};
use crate::error::{Error, Result};
use log::debug;
use scilib::math::basic::erf;
use std::f64::consts::SQRT_2;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Bremsstrahlung emissivity coefficient in photons cm^3 s^-1 keV^-1/2
/// (hydrogenic, Gaunt factor of one).
const BREMS_COEFF: f64 = 3.01e-15;

/// The cosmic and metal components of one spectrum.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SpectrumPair {
    pub cosmic: Vec<f64>,
    pub metal: Vec<f64>,
}

impl SpectrumPair {
    fn zeros(nchan: usize) -> Self {
        Self {
            cosmic: vec![0.0; nchan],
            metal: vec![0.0; nchan],
        }
    }

    /// Channel sums of the cosmic and metal components.
    #[must_use]
    pub fn totals(&self) -> (f64, f64) {
        (self.cosmic.iter().sum(), self.metal.iter().sum())
    }

    /// `cosmic + metallicity * metal`, channel by channel.
    #[must_use]
    pub fn combined(&self, metallicity: f64) -> Vec<f64> {
        self.cosmic
            .iter()
            .zip(&self.metal)
            .map(|(c, m)| c + metallicity * m)
            .collect()
    }
}

/// Tabulated spectra on a rest-frame energy grid at a set of temperatures.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SpectralTable {
    /// Rest-frame channel edges in keV.
    pub energy_edges: Vec<f64>,
    /// Tabulated temperatures in keV, strictly increasing.
    pub kt: Vec<f64>,
    /// One cosmic row per temperature, one value per channel.
    pub cosmic: Vec<Vec<f64>>,
    /// One metal row per temperature, one value per channel.
    pub metal: Vec<Vec<f64>>,
}

impl SpectralTable {
    /// Checks shapes and orderings.
    ///
    /// # Errors
    /// Returns [`Error::SpectralError`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        let nchan = self.energy_edges.len().saturating_sub(1);
        if nchan == 0 {
            return Err(Error::SpectralError(
                "table needs at least two energy edges".to_string(),
            ));
        }
        if self.energy_edges.windows(2).any(|w| w[1] <= w[0]) {
            return Err(Error::SpectralError(
                "table energy edges must be strictly increasing".to_string(),
            ));
        }
        if self.kt.is_empty() || self.kt.windows(2).any(|w| w[1] <= w[0]) {
            return Err(Error::SpectralError(
                "table temperatures must be non-empty and strictly increasing".to_string(),
            ));
        }
        for (label, rows) in [("cosmic", &self.cosmic), ("metal", &self.metal)] {
            if rows.len() != self.kt.len() {
                return Err(Error::SpectralError(format!(
                    "{label} table has {} rows for {} temperatures",
                    rows.len(),
                    self.kt.len()
                )));
            }
            if let Some(row) = rows.iter().find(|r| r.len() != nchan) {
                return Err(Error::SpectralError(format!(
                    "{label} row has {} channels, expected {nchan}",
                    row.len()
                )));
            }
        }
        Ok(())
    }
}

/// Tabulated model: rows rebinned onto the output grid at the source redshift,
/// then interpolated linearly in temperature.
#[derive(Clone, Debug, PartialEq)]
pub struct TableSpectrum {
    grid: SpectralGrid,
    table: SpectralTable,
    prepared: Option<(Vec<Vec<f64>>, Vec<Vec<f64>>)>,
}

impl TableSpectrum {
    fn prepare(&mut self, redshift: f64) {
        let scale = 1.0 + redshift;
        let rest_edges: Vec<f64> = self.grid.ebins().iter().map(|e| e * scale).collect();
        let rebin_rows = |rows: &[Vec<f64>]| -> Vec<Vec<f64>> {
            rows.iter()
                .map(|row| rebin(row, &self.table.energy_edges, &rest_edges))
                .collect()
        };
        self.prepared = Some((rebin_rows(&self.table.cosmic), rebin_rows(&self.table.metal)));
    }

    fn spectrum(&self, kt: f64) -> Result<SpectrumPair> {
        let (cosmic, metal) = self.prepared.as_ref().ok_or_else(not_prepared)?;
        let temps = &self.table.kt;
        let (lo, hi) = (temps[0], temps[temps.len() - 1]);
        if !(lo..=hi).contains(&kt) {
            debug!("kT = {kt} keV outside table range [{lo}, {hi}], returning zeros");
            return Ok(SpectrumPair::zeros(self.grid.nchan()));
        }
        let upper = temps.partition_point(|&t| t <= kt).min(temps.len() - 1);
        let lower = upper.saturating_sub(1);
        let weight = if upper == lower {
            0.0
        } else {
            (kt - temps[lower]) / (temps[upper] - temps[lower])
        };
        let mix = |rows: &[Vec<f64>]| -> Vec<f64> {
            rows[lower]
                .iter()
                .zip(&rows[upper])
                .map(|(a, b)| a + weight * (b - a))
                .collect()
        };
        Ok(SpectrumPair {
            cosmic: mix(cosmic),
            metal: mix(metal),
        })
    }
}

/// Number-conserving rebin of `row` (on `edges`) onto `targets` edges.
fn rebin(row: &[f64], edges: &[f64], targets: &[f64]) -> Vec<f64> {
    let mut cumulative = Vec::with_capacity(row.len() + 1);
    let mut acc = 0.0;
    cumulative.push(0.0);
    for value in row {
        acc += value;
        cumulative.push(acc);
    }
    let at_edges: Vec<f64> = targets
        .iter()
        .map(|&e| interp(e, edges, &cumulative))
        .collect();
    at_edges.windows(2).map(|w| (w[1] - w[0]).max(0.0)).collect()
}

/// Analytic thermal bremsstrahlung continuum with no metal contribution.
#[derive(Clone, Debug, PartialEq)]
pub struct BremsstrahlungSpectrum {
    grid: SpectralGrid,
    redshift: Option<f64>,
}

impl BremsstrahlungSpectrum {
    fn spectrum(&self, kt: f64) -> Result<SpectrumPair> {
        let redshift = self.redshift.ok_or_else(not_prepared)?;
        let nchan = self.grid.nchan();
        if !(kt.is_finite() && kt > 0.0) {
            return Ok(SpectrumPair::zeros(nchan));
        }
        let scale = 1.0 + redshift;
        let norm = BREMS_COEFF / kt.sqrt();
        let cosmic = (0..nchan)
            .map(|i| {
                let e = self.grid.emid()[i] * scale;
                let de = self.grid.width(i) * scale;
                norm * (-e / kt).exp() / e * de
            })
            .collect();
        Ok(SpectrumPair {
            cosmic,
            metal: vec![0.0; nchan],
        })
    }
}

/// A single emission line, optionally Gaussian, carried in the metal component.
#[derive(Clone, Debug, PartialEq)]
pub struct LineSpectrum {
    grid: SpectralGrid,
    energy: f64,
    sigma: Option<f64>,
    emissivity: f64,
    metal: Option<Vec<f64>>,
}

impl LineSpectrum {
    fn prepare(&mut self, redshift: f64) {
        let scale = 1.0 + redshift;
        let center = self.energy / scale;
        let edges = self.grid.ebins();
        let mut metal = vec![0.0; self.grid.nchan()];
        match self.sigma {
            Some(sigma) if sigma > 0.0 => {
                let sigma = sigma / scale;
                let cdf = |e: f64| 0.5 * (1.0 + erf((e - center) / (sigma * SQRT_2)));
                for (i, value) in metal.iter_mut().enumerate() {
                    *value = self.emissivity * (cdf(edges[i + 1]) - cdf(edges[i]));
                }
            }
            _ => {
                let channel = edges.partition_point(|&e| e <= center);
                if channel > 0 && channel < edges.len() {
                    metal[channel - 1] = self.emissivity;
                }
            }
        }
        self.metal = Some(metal);
    }

    fn spectrum(&self) -> Result<SpectrumPair> {
        let metal = self.metal.as_ref().ok_or_else(not_prepared)?;
        Ok(SpectrumPair {
            cosmic: vec![0.0; metal.len()],
            metal: metal.clone(),
        })
    }
}

fn not_prepared() -> Error {
    Error::SpectralError("spectral model used before prepare()".to_string())
}

/// Spectral model over a fixed output energy grid.
///
/// Lifecycle: [`SpectralModel::prepare`] at the source redshift, any number
/// of [`SpectralModel::spectrum`] queries, then [`SpectralModel::cleanup`].
#[derive(Clone, Debug, PartialEq)]
pub enum SpectralModel {
    Table(TableSpectrum),
    Bremsstrahlung(BremsstrahlungSpectrum),
    Line(LineSpectrum),
}

impl SpectralModel {
    /// Tabulated spectra rebinned onto `grid`.
    ///
    /// # Errors
    /// Returns [`Error::SpectralError`] if the table is malformed.
    pub fn table(grid: SpectralGrid, table: SpectralTable) -> Result<Self> {
        table.validate()?;
        Ok(SpectralModel::Table(TableSpectrum {
            grid,
            table,
            prepared: None,
        }))
    }

    /// Analytic bremsstrahlung on `grid`.
    #[must_use]
    pub fn bremsstrahlung(grid: SpectralGrid) -> Self {
        SpectralModel::Bremsstrahlung(BremsstrahlungSpectrum {
            grid,
            redshift: None,
        })
    }

    /// A line at rest energy `energy` keV with optional width `sigma` keV and
    /// emissivity in photons cm^3 s^-1.
    ///
    /// # Errors
    /// Returns [`Error::ConfigError`] for non-positive energy, negative width
    /// or negative emissivity.
    pub fn line(
        grid: SpectralGrid,
        energy: f64,
        sigma: Option<f64>,
        emissivity: f64,
    ) -> Result<Self> {
        if !(energy.is_finite() && energy > 0.0) {
            return Err(Error::ConfigError(format!(
                "line energy must be positive, got {energy}"
            )));
        }
        if sigma.is_some_and(|s| !(s.is_finite() && s >= 0.0)) {
            return Err(Error::ConfigError("line width must be non-negative".to_string()));
        }
        if !(emissivity.is_finite() && emissivity >= 0.0) {
            return Err(Error::ConfigError(
                "line emissivity must be non-negative".to_string(),
            ));
        }
        Ok(SpectralModel::Line(LineSpectrum {
            grid,
            energy,
            sigma,
            emissivity,
            metal: None,
        }))
    }

    /// Output energy grid.
    #[must_use]
    pub fn grid(&self) -> &SpectralGrid {
        match self {
            SpectralModel::Table(m) => &m.grid,
            SpectralModel::Bremsstrahlung(m) => &m.grid,
            SpectralModel::Line(m) => &m.grid,
        }
    }

    /// Precompute observer-frame spectra for a source at `redshift`.
    ///
    /// # Errors
    /// Returns [`Error::ConfigError`] if the redshift is negative or not finite.
    pub fn prepare(&mut self, redshift: f64) -> Result<()> {
        if !(redshift.is_finite() && redshift >= 0.0) {
            return Err(Error::ConfigError(format!(
                "redshift must be non-negative, got {redshift}"
            )));
        }
        match self {
            SpectralModel::Table(m) => m.prepare(redshift),
            SpectralModel::Bremsstrahlung(m) => m.redshift = Some(redshift),
            SpectralModel::Line(m) => m.prepare(redshift),
        }
        Ok(())
    }

    /// Returns true once [`Self::prepare`] has run and before [`Self::cleanup`].
    #[must_use]
    pub fn is_prepared(&self) -> bool {
        match self {
            SpectralModel::Table(m) => m.prepared.is_some(),
            SpectralModel::Bremsstrahlung(m) => m.redshift.is_some(),
            SpectralModel::Line(m) => m.metal.is_some(),
        }
    }

    /// Cosmic and metal spectra at temperature `kt` keV.
    ///
    /// # Errors
    /// Returns [`Error::SpectralError`] if called before [`Self::prepare`].
    pub fn spectrum(&self, kt: f64) -> Result<SpectrumPair> {
        match self {
            SpectralModel::Table(m) => m.spectrum(kt),
            SpectralModel::Bremsstrahlung(m) => m.spectrum(kt),
            SpectralModel::Line(m) => m.spectrum(),
        }
    }

    /// Release prepared state.
    pub fn cleanup(&mut self) {
        match self {
            SpectralModel::Table(m) => m.prepared = None,
            SpectralModel::Bremsstrahlung(m) => m.redshift = None,
            SpectralModel::Line(m) => m.metal = None,
        }
    }
}
