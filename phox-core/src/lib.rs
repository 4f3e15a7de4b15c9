//! phox-core: Core types for synthetic X-ray photon generation.
//!
//! This crate provides unit-tagged cell chunks, the chunked data source
//! contract, photon tables, photon count and energy sampling, spectral
//! models and observation parameters.
//!

pub mod cells;
pub mod energy;
pub mod error;
pub mod params;
pub mod photons;
pub mod sampling;
pub mod source;
pub mod spectrum;
pub mod units;

pub use cells::{fields, CellChunk};
pub use energy::{EnergyMethod, EnergySampler, SpectralGrid};
pub use error::{Error, Result};
pub use params::{Cosmology, ObservationConfig, ObservationParams};
pub use photons::{concatenate_photons, ExpandedPhotons, PhotonBatch, PhotonTable};
pub use sampling::stochastic_round;
pub use source::{ChunkedDataSource, InMemorySource};
pub use spectrum::{SpectralModel, SpectralTable, SpectrumPair};
pub use units::{Column, Dimension, Unit};
