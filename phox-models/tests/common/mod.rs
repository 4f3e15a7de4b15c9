#![allow(dead_code)]

use phox_core::cells::fields;
use phox_core::{CellChunk, ObservationConfig, ObservationParams, SpectralGrid, SpectralModel, Unit};

pub fn params() -> ObservationParams {
    ObservationConfig::default()
        .with_redshift(0.0)
        .with_distance_mpc(100.0)
        .resolve()
        .unwrap()
}

pub fn bremsstrahlung() -> SpectralModel {
    SpectralModel::bremsstrahlung(SpectralGrid::linear(0.3, 10.0, 4000).unwrap())
}

/// An isothermal slab of `n` cells, each expecting a few tens of photons
/// from a bremsstrahlung spectrum at the default observation settings.
#[allow(clippy::cast_precision_loss)]
pub fn isothermal_cells(n: usize, kt: f64) -> CellChunk {
    let zeros = vec![0.0; n];
    CellChunk::new(n)
        .with_field(fields::TEMPERATURE, vec![kt; n], Unit::KeV)
        .unwrap()
        .with_field(fields::DENSITY, vec![1.0e-26; n], Unit::GramPerCubicCentimeter)
        .unwrap()
        .with_field(fields::CELL_VOLUME, vec![1.7e66; n], Unit::CubicCentimeter)
        .unwrap()
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
        .with_field(fields::VELOCITY_Z, zeros, Unit::KilometerPerSecond)
        .unwrap()
        .with_field(fields::DX, vec![1.0; n], Unit::Kiloparsec)
        .unwrap()
}

/// Two-sample Kolmogorov-Smirnov statistic.
pub fn ks_statistic(a: &[f64], b: &[f64]) -> f64 {
    let mut a = a.to_vec();
    let mut b = b.to_vec();
    a.sort_by(f64::total_cmp);
    b.sort_by(f64::total_cmp);
    let (mut i, mut j) = (0usize, 0usize);
    let mut d: f64 = 0.0;
    while i < a.len() && j < b.len() {
        let x = a[i].min(b[j]);
        while i < a.len() && a[i] <= x {
            i += 1;
        }
        while j < b.len() && b[j] <= x {
            j += 1;
        }
        let fa = i as f64 / a.len() as f64;
        let fb = j as f64 / b.len() as f64;
        d = d.max((fa - fb).abs());
    }
    d
}

/// KS critical value at roughly the 0.1% level.
#[allow(clippy::cast_precision_loss)]
pub fn ks_critical(n: usize, m: usize) -> f64 {
    let (n, m) = (n as f64, m as f64);
    1.95 * ((n + m) / (n * m)).sqrt()
}
