//! phox-models: Photon models and the chunk-parallel generation driver.
//!
//! Three models share one per-chunk contract: thermal plasma emission
//! through a spectral model, a per-cell power law, and a single emission
//! line. [`generate_photons`] runs any of them over a
//! [`phox_core::ChunkedDataSource`].
//!

mod kinematics;
pub mod line;
pub mod model;
pub mod power_law;
pub mod processing;
#[cfg(test)]
mod testing;
pub mod thermal;

pub use line::{LineBroadening, LineEmissionModel};
pub use model::PhotonModel;
pub use power_law::{PowerLawIndex, PowerLawModel};
pub use processing::{chunk_rng, generate_photons, generate_photons_with_rng, GenerationConfig};
pub use thermal::{Metallicity, ThermalConfig, ThermalPhotonModel};
