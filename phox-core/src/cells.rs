//! Cell chunks: batches of simulation cells stored column-wise.

use crate::error::{Error, Result};
use crate::units::{Column, Unit};
use std::collections::BTreeMap;

/// Conventional field names used by the photon models.
pub mod fields {
    pub const TEMPERATURE: &str = "kT";
    pub const DENSITY: &str = "density";
    pub const CELL_VOLUME: &str = "cell_volume";
    pub const METALLICITY: &str = "metallicity";
    pub const X: &str = "x";
    pub const Y: &str = "y";
    pub const Z: &str = "z";
    pub const VELOCITY_X: &str = "velocity_x";
    pub const VELOCITY_Y: &str = "velocity_y";
    pub const VELOCITY_Z: &str = "velocity_z";
    pub const DX: &str = "dx";

    /// Fields every model needs to place photons in space and velocity.
    pub const KINEMATIC: [&str; 7] = [X, Y, Z, VELOCITY_X, VELOCITY_Y, VELOCITY_Z, DX];
}

/// A batch of cells with named, equal-length, unit-tagged fields.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CellChunk {
    len: usize,
    columns: BTreeMap<String, Column>,
}

impl CellChunk {
    /// Creates an empty chunk of `len` cells with no fields.
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self {
            len,
            columns: BTreeMap::new(),
        }
    }

    /// Number of cells in the chunk.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the chunk holds no cells.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Adds or replaces a field.
    ///
    /// # Errors
    /// Returns [`Error::LengthMismatch`] if `values` does not have one entry per cell.
    pub fn insert(&mut self, name: impl Into<String>, values: Vec<f64>, unit: Unit) -> Result<()> {
        let name = name.into();
        if values.len() != self.len {
            return Err(Error::LengthMismatch {
                field: name,
                expected: self.len,
                found: values.len(),
            });
        }
        self.columns.insert(name, Column::new(values, unit));
        Ok(())
    }

    /// Builder form of [`Self::insert`].
    ///
    /// # Errors
    /// Returns [`Error::LengthMismatch`] on a length mismatch.
    pub fn with_field(
        mut self,
        name: impl Into<String>,
        values: Vec<f64>,
        unit: Unit,
    ) -> Result<Self> {
        self.insert(name, values, unit)?;
        Ok(self)
    }

    /// Returns true if the field is present.
    #[must_use]
    pub fn has_field(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    /// Field names in sorted order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Borrow a field as stored.
    ///
    /// # Errors
    /// Returns [`Error::MissingField`] if the field is absent.
    pub fn field(&self, name: &str) -> Result<&Column> {
        self.columns
            .get(name)
            .ok_or_else(|| Error::MissingField(name.to_string()))
    }

    /// Field values converted to `unit`.
    ///
    /// # Errors
    /// Returns [`Error::MissingField`] or [`Error::UnitMismatch`].
    pub fn values_in(&self, name: &str, unit: Unit) -> Result<Vec<f64>> {
        self.field(name)?.to_unit(unit)
    }

    /// Field values at the given cell indices, converted to `unit`.
    ///
    /// # Errors
    /// Returns [`Error::MissingField`] or [`Error::UnitMismatch`].
    pub fn gather_in(&self, name: &str, indices: &[usize], unit: Unit) -> Result<Vec<f64>> {
        let column = self.field(name)?;
        let factor = column.unit.conversion_factor(unit)?;
        Ok(indices.iter().map(|&i| column.values[i] * factor).collect())
    }

    /// Copy of the cells in `range`, keeping every field.
    ///
    /// # Panics
    /// Panics if `range` is out of bounds.
    #[must_use]
    pub fn slice(&self, range: std::ops::Range<usize>) -> Self {
        let columns = self
            .columns
            .iter()
            .map(|(name, col)| {
                (
                    name.clone(),
                    Column::new(col.values[range.clone()].to_vec(), col.unit),
                )
            })
            .collect();
        Self {
            len: range.len(),
            columns,
        }
    }
}
