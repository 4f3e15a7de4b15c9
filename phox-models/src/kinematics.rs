//! Per-cell geometry and velocity columns shared by every model.

use phox_core::cells::fields;
use phox_core::photons::{LENGTH_UNIT, VELOCITY_UNIT};
use phox_core::{CellChunk, ObservationParams, PhotonBatch, Result};

/// Append positions (relative to the source centre), velocities and cell
/// sizes of the `active` cells to `batch`.
///
/// # Errors
/// Returns an error if a kinematic field is missing or has incompatible units.
pub(crate) fn append_active_cells(
    batch: &mut PhotonBatch,
    chunk: &CellChunk,
    active: &[usize],
    params: &ObservationParams,
) -> Result<()> {
    let [cx, cy, cz] = params.center_kpc;
    let shifted = |name: &str, center: f64| -> Result<Vec<f64>> {
        let mut values = chunk.gather_in(name, active, LENGTH_UNIT)?;
        for v in &mut values {
            *v -= center;
        }
        Ok(values)
    };
    batch.x.extend(shifted(fields::X, cx)?);
    batch.y.extend(shifted(fields::Y, cy)?);
    batch.z.extend(shifted(fields::Z, cz)?);
    batch
        .vx
        .extend(chunk.gather_in(fields::VELOCITY_X, active, VELOCITY_UNIT)?);
    batch
        .vy
        .extend(chunk.gather_in(fields::VELOCITY_Y, active, VELOCITY_UNIT)?);
    batch
        .vz
        .extend(chunk.gather_in(fields::VELOCITY_Z, active, VELOCITY_UNIT)?);
    batch
        .dx
        .extend(chunk.gather_in(fields::DX, active, LENGTH_UNIT)?);
    Ok(())
}
