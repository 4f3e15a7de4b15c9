//! Error types for phox-core.

use thiserror::Error;

/// Result type alias for phox operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for photon generation.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid model or run configuration, raised before generation starts.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// A chunk produced more photons than the configured per-chunk capacity.
    #[error(
        "number of photons generated ({produced}) exceeds photons_per_chunk ({capacity}); \
         increase photons_per_chunk or reduce the chunk size"
    )]
    CapacityOverflow { produced: u64, capacity: u64 },

    /// A required field is absent from a cell chunk.
    #[error("missing field '{0}'")]
    MissingField(String),

    /// Two columns that must be aligned have different lengths.
    #[error("length mismatch for '{field}': expected {expected}, found {found}")]
    LengthMismatch {
        field: String,
        expected: usize,
        found: usize,
    },

    /// A value carries a unit that cannot be converted to the requested one.
    #[error("cannot convert '{from}' to '{to}'")]
    UnitMismatch { from: String, to: String },

    /// A unit symbol that is not recognised.
    #[error("unknown unit '{0}'")]
    UnknownUnit(String),

    /// Malformed spectral table or spectral query.
    #[error("spectral model error: {0}")]
    SpectralError(String),
}
