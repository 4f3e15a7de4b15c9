//! Fixtures shared by the unit tests.

use phox_core::cells::fields;
use phox_core::{CellChunk, SpectralGrid, SpectralModel, SpectralTable, Unit};

/// Four channels on [0.5, 2.5] keV with constant rows at every temperature,
/// so the totals are `4 * cosmic` and `4 * metal` regardless of kT.
pub(crate) fn flat_table_model(cosmic: f64, metal: f64) -> SpectralModel {
    let grid = SpectralGrid::linear(0.5, 2.5, 4).unwrap();
    let table = SpectralTable {
        energy_edges: grid.ebins().to_vec(),
        kt: vec![0.01, 1000.0],
        cosmic: vec![vec![cosmic; 4]; 2],
        metal: vec![vec![metal; 4]; 2],
    };
    SpectralModel::table(grid, table).unwrap()
}

/// Cells with the given temperature (keV), density (g/cm^3) and volume
/// (cm^3); cell `i` sits at x = i kpc with zero velocity.
pub(crate) fn thermal_chunk(kt: &[f64], density: &[f64], volume: &[f64]) -> CellChunk {
    let n = kt.len();
    let zeros = vec![0.0; n];
    kinematic_chunk(n)
        .with_field(fields::TEMPERATURE, kt.to_vec(), Unit::KeV)
        .unwrap()
        .with_field(fields::DENSITY, density.to_vec(), Unit::GramPerCubicCentimeter)
        .unwrap()
        .with_field(fields::CELL_VOLUME, volume.to_vec(), Unit::CubicCentimeter)
        .unwrap()
        .with_field(fields::METALLICITY, zeros, Unit::Dimensionless)
        .unwrap()
}

/// `n` cells along the x axis with unit size and zero velocity.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn kinematic_chunk(n: usize) -> CellChunk {
    let zeros = vec![0.0; n];
    CellChunk::new(n)
        .with_field(fields::X, (0..n).map(|i| i as f64).collect(), Unit::Kiloparsec)
        .unwrap()
        .with_field(fields::Y, zeros.clone(), Unit::Kiloparsec)
        .unwrap()
        .with_field(fields::Z, zeros.clone(), Unit::Kiloparsec)
        .unwrap()
        .with_field(fields::VELOCITY_X, zeros.clone(), Unit::KilometerPerSecond)
        .unwrap()
        .with_field(fields::VELOCITY_Y, zeros.clone(), Unit::KilometerPerSecond)
        .unwrap()
        .with_field(fields::VELOCITY_Z, zeros.clone(), Unit::KilometerPerSecond)
        .unwrap()
        .with_field(fields::DX, vec![1.0; n], Unit::Kiloparsec)
        .unwrap()
}
