//! The closed set of photon models.

use crate::line::LineEmissionModel;
use crate::power_law::PowerLawModel;
use crate::thermal::ThermalPhotonModel;
use phox_core::{CellChunk, ChunkedDataSource, ObservationParams, PhotonBatch, Result};
use rand::Rng;

/// A photon model: thermal plasma, power law or single emission line.
#[derive(Clone, Debug)]
pub enum PhotonModel {
    Thermal(ThermalPhotonModel),
    PowerLaw(PowerLawModel),
    Line(LineEmissionModel),
}

impl PhotonModel {
    /// Short name for logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            PhotonModel::Thermal(_) => "thermal",
            PhotonModel::PowerLaw(_) => "power_law",
            PhotonModel::Line(_) => "line",
        }
    }

    /// Per-run setup before any chunk is generated.
    ///
    /// # Errors
    /// Propagates data source and spectral model errors.
    pub fn prepare<S: ChunkedDataSource + ?Sized>(
        &mut self,
        source: &S,
        params: &ObservationParams,
    ) -> Result<()> {
        match self {
            PhotonModel::Thermal(model) => model.prepare(source, params),
            PhotonModel::PowerLaw(_) | PhotonModel::Line(_) => Ok(()),
        }
    }

    /// Generate the photons of one chunk.
    ///
    /// # Errors
    /// Propagates the variant's generation errors.
    pub fn generate_chunk<R: Rng + ?Sized>(
        &self,
        chunk: &CellChunk,
        params: &ObservationParams,
        rng: &mut R,
    ) -> Result<PhotonBatch> {
        match self {
            PhotonModel::Thermal(model) => model.generate_chunk(chunk, params, rng),
            PhotonModel::PowerLaw(model) => model.generate_chunk(chunk, params, rng),
            PhotonModel::Line(model) => model.generate_chunk(chunk, params, rng),
        }
    }

    /// Release per-run state.
    pub fn cleanup(&mut self) {
        if let PhotonModel::Thermal(model) = self {
            model.cleanup();
        }
    }
}

impl From<ThermalPhotonModel> for PhotonModel {
    fn from(model: ThermalPhotonModel) -> Self {
        PhotonModel::Thermal(model)
    }
}

impl From<PowerLawModel> for PhotonModel {
    fn from(model: PowerLawModel) -> Self {
        PhotonModel::PowerLaw(model)
    }
}

impl From<LineEmissionModel> for PhotonModel {
    fn from(model: LineEmissionModel) -> Self {
        PhotonModel::Line(model)
    }
}
