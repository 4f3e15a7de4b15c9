//! JSON run configuration.

use crate::error::{CliError, Result};
use phox_core::{ObservationConfig, SpectralGrid, SpectralModel};
use phox_io::ChunkingConfig;
use phox_models::{
    GenerationConfig, LineBroadening, LineEmissionModel, PhotonModel, PowerLawIndex,
    PowerLawModel, ThermalConfig, ThermalPhotonModel,
};
use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Everything `phox generate` needs besides the cell file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    #[serde(default)]
    pub observation: ObservationConfig,
    pub model: ModelConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
}

impl RunConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }
}

/// Output energy grid in keV.
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct GridConfig {
    pub emin: f64,
    pub emax: f64,
    pub nchan: usize,
}

impl GridConfig {
    fn build(self) -> Result<SpectralGrid> {
        Ok(SpectralGrid::linear(self.emin, self.emax, self.nchan)?)
    }
}

/// Spectral model behind the thermal photon model.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SpectrumConfig {
    /// Tabulated spectra from a `.json` or (with HDF5 support) `.h5` file.
    Table { path: PathBuf, grid: GridConfig },
    Bremsstrahlung { grid: GridConfig },
    Line {
        grid: GridConfig,
        energy: f64,
        #[serde(default)]
        sigma: Option<f64>,
        emissivity: f64,
    },
}

impl SpectrumConfig {
    fn build(&self) -> Result<SpectralModel> {
        match self {
            SpectrumConfig::Table { path, grid } => {
                let table = load_spectral_table(path)?;
                Ok(SpectralModel::table(grid.build()?, table)?)
            }
            SpectrumConfig::Bremsstrahlung { grid } => {
                Ok(SpectralModel::bremsstrahlung(grid.build()?))
            }
            SpectrumConfig::Line {
                grid,
                energy,
                sigma,
                emissivity,
            } => Ok(SpectralModel::line(
                grid.build()?,
                *energy,
                *sigma,
                *emissivity,
            )?),
        }
    }
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default()
}

fn load_spectral_table(path: &Path) -> Result<phox_core::SpectralTable> {
    match extension(path).as_str() {
        "json" => Ok(phox_io::read_spectral_table_json(path)?),
        #[cfg(feature = "hdf5")]
        "h5" | "hdf5" => Ok(phox_io::read_spectral_table_hdf5(path)?),
        other => Err(CliError::Config(format!(
            "unsupported spectral table format '{other}' ({})",
            path.display()
        ))),
    }
}

/// Photon model selection.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModelConfig {
    Thermal {
        spectrum: SpectrumConfig,
        #[serde(default)]
        settings: ThermalConfig,
    },
    PowerLaw {
        norm_field: String,
        e0: f64,
        emin: f64,
        emax: f64,
        index: PowerLawIndex,
    },
    Line {
        location: f64,
        amplitude_field: String,
        #[serde(default)]
        sigma: Option<LineBroadening>,
    },
}

impl ModelConfig {
    pub fn build(&self) -> Result<PhotonModel> {
        let model = match self {
            ModelConfig::Thermal { spectrum, settings } => {
                ThermalPhotonModel::new(spectrum.build()?, settings.clone())?.into()
            }
            ModelConfig::PowerLaw {
                norm_field,
                e0,
                emin,
                emax,
                index,
            } => PowerLawModel::new(norm_field.clone(), *e0, *emin, *emax, index.clone())?.into(),
            ModelConfig::Line {
                location,
                amplitude_field,
                sigma,
            } => LineEmissionModel::new(*location, amplitude_field.clone(), sigma.clone())?.into(),
        };
        Ok(model)
    }
}

/// Output format chosen from the file extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Csv,
    Binary,
    Hdf5,
}

impl OutputFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        match extension(path).as_str() {
            "csv" => Ok(OutputFormat::Csv),
            "bin" | "dat" => Ok(OutputFormat::Binary),
            "h5" | "hdf5" => Ok(OutputFormat::Hdf5),
            other => Err(CliError::Config(format!(
                "unsupported output format '{other}'; use .csv, .bin or .h5"
            ))),
        }
    }
}
