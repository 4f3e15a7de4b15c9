//! Photon tables.
//!
//! A photon table is cell-indexed for geometry and velocity and
//! photon-indexed for energy. `number_of_photons[i]` consecutive entries of
//! `energy` belong to active cell `i`, so `energy.len()` always equals the
//! sum of `number_of_photons`.

use crate::error::{Error, Result};
use crate::units::{Column, Unit};
use std::ops::Range;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Field names of a photon table, in output order.
pub mod names {
    pub const NUMBER_OF_PHOTONS: &str = "NumberOfPhotons";
    pub const ENERGY: &str = "Energy";
    pub const X: &str = "x";
    pub const Y: &str = "y";
    pub const Z: &str = "z";
    pub const VX: &str = "vx";
    pub const VY: &str = "vy";
    pub const VZ: &str = "vz";
    pub const DX: &str = "dx";

    pub const ALL: [&str; 9] = [NUMBER_OF_PHOTONS, ENERGY, X, Y, Z, VX, VY, VZ, DX];
}

/// Unit of photon energies.
pub const ENERGY_UNIT: Unit = Unit::KeV;
/// Unit of cell positions and sizes.
pub const LENGTH_UNIT: Unit = Unit::Kiloparsec;
/// Unit of cell velocities.
pub const VELOCITY_UNIT: Unit = Unit::KilometerPerSecond;

/// Unit attached to a photon table field, or `None` for an unknown name.
#[must_use]
pub fn unit_of(name: &str) -> Option<Unit> {
    match name {
        names::NUMBER_OF_PHOTONS => Some(Unit::Dimensionless),
        names::ENERGY => Some(ENERGY_UNIT),
        names::X | names::Y | names::Z | names::DX => Some(LENGTH_UNIT),
        names::VX | names::VY | names::VZ => Some(VELOCITY_UNIT),
        _ => None,
    }
}

/// Photons produced from one chunk, built incrementally by a model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhotonBatch {
    pub number_of_photons: Vec<u64>,
    pub energy: Vec<f64>,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub z: Vec<f64>,
    pub vx: Vec<f64>,
    pub vy: Vec<f64>,
    pub vz: Vec<f64>,
    pub dx: Vec<f64>,
}

impl PhotonBatch {
    /// Creates a batch with room for `cells` active cells and `photons` energies.
    #[must_use]
    pub fn with_capacity(cells: usize, photons: usize) -> Self {
        Self {
            number_of_photons: Vec::with_capacity(cells),
            energy: Vec::with_capacity(photons),
            x: Vec::with_capacity(cells),
            y: Vec::with_capacity(cells),
            z: Vec::with_capacity(cells),
            vx: Vec::with_capacity(cells),
            vy: Vec::with_capacity(cells),
            vz: Vec::with_capacity(cells),
            dx: Vec::with_capacity(cells),
        }
    }

    /// Number of active cells.
    #[must_use]
    pub fn num_cells(&self) -> usize {
        self.number_of_photons.len()
    }

    /// Number of photons.
    #[must_use]
    pub fn num_photons(&self) -> usize {
        self.energy.len()
    }

    /// Returns true if no cell emitted a photon.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.number_of_photons.is_empty()
    }

    /// Appends all cells and photons from another batch.
    pub fn append(&mut self, other: &PhotonBatch) {
        self.number_of_photons
            .extend_from_slice(&other.number_of_photons);
        self.energy.extend_from_slice(&other.energy);
        self.x.extend_from_slice(&other.x);
        self.y.extend_from_slice(&other.y);
        self.z.extend_from_slice(&other.z);
        self.vx.extend_from_slice(&other.vx);
        self.vy.extend_from_slice(&other.vy);
        self.vz.extend_from_slice(&other.vz);
        self.dx.extend_from_slice(&other.dx);
    }

    /// Checks the run-length invariant and per-cell field alignment.
    ///
    /// # Errors
    /// Returns [`Error::LengthMismatch`] describing the first violation.
    pub fn validate(&self) -> Result<()> {
        validate_columns(
            &self.number_of_photons,
            self.energy.len(),
            [
                (names::X, self.x.len()),
                (names::Y, self.y.len()),
                (names::Z, self.z.len()),
                (names::VX, self.vx.len()),
                (names::VY, self.vy.len()),
                (names::VZ, self.vz.len()),
                (names::DX, self.dx.len()),
            ],
        )
    }
}

fn validate_columns(counts: &[u64], energies: usize, per_cell: [(&str, usize); 7]) -> Result<()> {
    let total: u64 = counts.iter().sum();
    let total = usize::try_from(total).unwrap_or(usize::MAX);
    if total != energies {
        return Err(Error::LengthMismatch {
            field: names::ENERGY.to_string(),
            expected: total,
            found: energies,
        });
    }
    for (name, len) in per_cell {
        if len != counts.len() {
            return Err(Error::LengthMismatch {
                field: name.to_string(),
                expected: counts.len(),
                found: len,
            });
        }
    }
    Ok(())
}

/// Final photon collection, owned and immutable once built.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PhotonTable {
    number_of_photons: Vec<u64>,
    energy: Vec<f64>,
    x: Vec<f64>,
    y: Vec<f64>,
    z: Vec<f64>,
    vx: Vec<f64>,
    vy: Vec<f64>,
    vz: Vec<f64>,
    dx: Vec<f64>,
}

/// Fully photon-indexed view: every column has one entry per photon.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpandedPhotons {
    pub energy: Vec<f64>,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub z: Vec<f64>,
    pub vx: Vec<f64>,
    pub vy: Vec<f64>,
    pub vz: Vec<f64>,
    pub dx: Vec<f64>,
}

impl ExpandedPhotons {
    #[must_use]
    pub fn len(&self) -> usize {
        self.energy.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.energy.is_empty()
    }
}

impl PhotonTable {
    /// Builds a table from a batch after checking its invariants.
    ///
    /// # Errors
    /// Returns [`Error::LengthMismatch`] if the batch is inconsistent.
    pub fn from_batch(batch: PhotonBatch) -> Result<Self> {
        batch.validate()?;
        Ok(Self {
            number_of_photons: batch.number_of_photons,
            energy: batch.energy,
            x: batch.x,
            y: batch.y,
            z: batch.z,
            vx: batch.vx,
            vy: batch.vy,
            vz: batch.vz,
            dx: batch.dx,
        })
    }

    /// Number of active cells.
    #[must_use]
    pub fn num_cells(&self) -> usize {
        self.number_of_photons.len()
    }

    /// Number of photons.
    #[must_use]
    pub fn num_photons(&self) -> usize {
        self.energy.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.energy.is_empty()
    }

    #[must_use]
    pub fn number_of_photons(&self) -> &[u64] {
        &self.number_of_photons
    }

    /// Photon energies in keV.
    #[must_use]
    pub fn energy(&self) -> &[f64] {
        &self.energy
    }

    /// Field names in output order.
    #[must_use]
    pub fn keys(&self) -> [&'static str; 9] {
        names::ALL
    }

    /// Borrow a per-cell or per-photon float field by name.
    ///
    /// `NumberOfPhotons` is integer-valued; use [`Self::number_of_photons`].
    #[must_use]
    pub fn values(&self, name: &str) -> Option<&[f64]> {
        match name {
            names::ENERGY => Some(&self.energy),
            names::X => Some(&self.x),
            names::Y => Some(&self.y),
            names::Z => Some(&self.z),
            names::VX => Some(&self.vx),
            names::VY => Some(&self.vy),
            names::VZ => Some(&self.vz),
            names::DX => Some(&self.dx),
            _ => None,
        }
    }

    /// A unit-tagged copy of a field. Empty fields still carry their unit.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn column(&self, name: &str) -> Option<Column> {
        let unit = unit_of(name)?;
        if name == names::NUMBER_OF_PHOTONS {
            let values = self.number_of_photons.iter().map(|&n| n as f64).collect();
            return Some(Column::new(values, unit));
        }
        self.values(name).map(|v| Column::new(v.to_vec(), unit))
    }

    /// Photon index range owned by each active cell.
    #[must_use]
    pub fn cell_ranges(&self) -> Vec<Range<usize>> {
        let mut start = 0usize;
        self.number_of_photons
            .iter()
            .map(|&n| {
                let end = start + usize::try_from(n).unwrap_or(usize::MAX);
                let range = start..end;
                start = end;
                range
            })
            .collect()
    }

    /// Repeat each cell's geometry and velocity once per photon.
    #[must_use]
    pub fn expand(&self) -> ExpandedPhotons {
        let n = self.energy.len();
        let mut out = ExpandedPhotons {
            energy: self.energy.clone(),
            x: Vec::with_capacity(n),
            y: Vec::with_capacity(n),
            z: Vec::with_capacity(n),
            vx: Vec::with_capacity(n),
            vy: Vec::with_capacity(n),
            vz: Vec::with_capacity(n),
            dx: Vec::with_capacity(n),
        };
        for (cell, range) in self.cell_ranges().into_iter().enumerate() {
            let count = range.len();
            out.x.extend(std::iter::repeat_n(self.x[cell], count));
            out.y.extend(std::iter::repeat_n(self.y[cell], count));
            out.z.extend(std::iter::repeat_n(self.z[cell], count));
            out.vx.extend(std::iter::repeat_n(self.vx[cell], count));
            out.vy.extend(std::iter::repeat_n(self.vy[cell], count));
            out.vz.extend(std::iter::repeat_n(self.vz[cell], count));
            out.dx.extend(std::iter::repeat_n(self.dx[cell], count));
        }
        out
    }

    /// Checks the run-length invariant and per-cell field alignment.
    ///
    /// # Errors
    /// Returns [`Error::LengthMismatch`] describing the first violation.
    pub fn validate(&self) -> Result<()> {
        validate_columns(
            &self.number_of_photons,
            self.energy.len(),
            [
                (names::X, self.x.len()),
                (names::Y, self.y.len()),
                (names::Z, self.z.len()),
                (names::VX, self.vx.len()),
                (names::VY, self.vy.len()),
                (names::VZ, self.vz.len()),
                (names::DX, self.dx.len()),
            ],
        )
    }
}

/// Concatenate per-chunk batches, in order, into one table.
///
/// No batches, or only empty ones, give an empty table whose columns keep
/// their units.
///
/// # Errors
/// Returns [`Error::LengthMismatch`] if any batch violates the run-length invariant.
pub fn concatenate_photons(batches: Vec<PhotonBatch>) -> Result<PhotonTable> {
    let cells = batches.iter().map(PhotonBatch::num_cells).sum();
    let photons = batches.iter().map(PhotonBatch::num_photons).sum();
    let mut merged = PhotonBatch::with_capacity(cells, photons);
    for batch in &batches {
        batch.validate()?;
        merged.append(batch);
    }
    PhotonTable::from_batch(merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(counts: &[u64], base: f64) -> PhotonBatch {
        let mut b = PhotonBatch::default();
        for (i, &n) in counts.iter().enumerate() {
            #[allow(clippy::cast_precision_loss)]
            let v = base + i as f64;
            b.number_of_photons.push(n);
            for _ in 0..n {
                b.energy.push(v);
            }
            b.x.push(v);
            b.y.push(v);
            b.z.push(v);
            b.vx.push(v);
            b.vy.push(v);
            b.vz.push(v);
            b.dx.push(v);
        }
        b
    }

    #[test]
    fn concatenation_keeps_chunk_order() {
        let table = concatenate_photons(vec![batch(&[2, 1], 0.0), batch(&[3], 10.0)]).unwrap();
        assert_eq!(table.number_of_photons(), &[2, 1, 3]);
        assert_eq!(table.num_photons(), 6);
        assert_eq!(table.values(names::X).unwrap(), &[0.0, 1.0, 10.0]);
        assert!(table.validate().is_ok());
    }

    #[test]
    fn empty_concatenation_keeps_units() {
        let table = concatenate_photons(Vec::new()).unwrap();
        assert!(table.is_empty());
        for name in table.keys() {
            let column = table.column(name).unwrap();
            assert!(column.is_empty());
            assert_eq!(Some(column.unit), unit_of(name));
        }
        assert_eq!(table.column(names::ENERGY).unwrap().unit, Unit::KeV);
        assert_eq!(table.column(names::VX).unwrap().unit, Unit::KilometerPerSecond);
    }

    #[test]
    fn expand_repeats_cells() {
        let table = concatenate_photons(vec![batch(&[2, 0, 1], 5.0)]).unwrap();
        let ranges = table.cell_ranges();
        assert_eq!(ranges, vec![0..2, 2..2, 2..3]);
        let expanded = table.expand();
        assert_eq!(expanded.len(), 3);
        assert_eq!(expanded.x, vec![5.0, 5.0, 7.0]);
        assert_eq!(expanded.energy, vec![5.0, 5.0, 7.0]);
    }

    #[test]
    fn invariant_violation_is_rejected() {
        let mut b = batch(&[2], 0.0);
        b.energy.pop();
        assert!(matches!(
            concatenate_photons(vec![b]),
            Err(Error::LengthMismatch { .. })
        ));
    }
}
