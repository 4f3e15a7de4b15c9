//! phox-io: Memory-mapped cell files and photon output for phox.
//!
//! Cell files are read through memmap2 and exposed as a
//! [`phox_core::ChunkedDataSource`]. Photon tables are written as CSV,
//! packed binary or (with the `hdf5` feature) HDF5.
//!

pub mod chunking;
mod error;
#[cfg(feature = "hdf5")]
pub mod hdf5;
mod reader;
pub mod tables;
mod writer;

pub use chunking::ChunkingConfig;
pub use error::{Error, Result};
#[cfg(feature = "hdf5")]
pub use hdf5::{
    read_photons_hdf5, read_spectral_table_hdf5, write_photons_hdf5, write_spectral_table_hdf5,
    Hdf5PhotonData, PhotonWriteOptions,
};
pub use reader::{read_photons_binary, CellFileReader, MappedFileReader, CELL_FILE_MAGIC};
pub use tables::{read_spectral_table_json, write_spectral_table_json};
pub use writer::{CellFileWriter, PhotonFileWriter, PHOTON_FILE_MAGIC};
