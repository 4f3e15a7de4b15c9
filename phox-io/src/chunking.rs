//! Chunk sizing for file-backed cell sources.

use crate::{Error, Result};
use log::debug;
use sysinfo::System;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Headroom for the photon batch and temporaries built from each chunk.
const MEMORY_OVERHEAD_FACTOR: f64 = 1.2;

/// Chunk size used when nothing else constrains it.
pub const DEFAULT_CELLS_PER_CHUNK: usize = 262_144;

/// How many cells each chunk of a file-backed source holds.
///
/// An explicit `cells_per_chunk` wins. Otherwise the chunk size is derived
/// from a memory budget shared by every worker.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ChunkingConfig {
    /// Explicit chunk size. If set, the memory settings are ignored.
    pub cells_per_chunk: Option<usize>,
    /// Fraction of available system memory to target (0.0 < fraction <= 1.0).
    pub memory_fraction: f64,
    /// Explicit memory budget override (bytes). If set, `memory_fraction` is ignored.
    pub memory_budget_bytes: Option<usize>,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            cells_per_chunk: None,
            memory_fraction: 0.25,
            memory_budget_bytes: None,
        }
    }
}

impl ChunkingConfig {
    /// Set the chunk size directly.
    ///
    /// Values less than 1 are clamped to 1. Use [`Self::try_with_cells_per_chunk`]
    /// to surface invalid values as an error instead.
    #[must_use]
    pub fn with_cells_per_chunk(mut self, cells: usize) -> Self {
        self.cells_per_chunk = Some(cells.max(1));
        self
    }

    /// Fallible variant of [`Self::with_cells_per_chunk`].
    ///
    /// # Errors
    /// Returns an error if `cells` is 0.
    pub fn try_with_cells_per_chunk(mut self, cells: usize) -> Result<Self> {
        if cells == 0 {
            return Err(Error::InvalidFormat(
                "cells_per_chunk must be at least 1".to_string(),
            ));
        }
        self.cells_per_chunk = Some(cells);
        Ok(self)
    }

    /// Set the fraction of available system memory to target.
    #[must_use]
    pub fn with_memory_fraction(mut self, fraction: f64) -> Self {
        self.memory_fraction = fraction;
        self
    }

    /// Set an explicit memory budget in bytes.
    #[must_use]
    pub fn with_memory_budget_bytes(mut self, bytes: usize) -> Self {
        self.memory_budget_bytes = Some(bytes);
        self
    }

    /// Resolve the target memory budget in bytes.
    ///
    /// # Errors
    /// Returns an error if the memory fraction is invalid or system memory cannot be queried.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss
    )]
    pub fn resolve_budget_bytes(&self) -> Result<usize> {
        if let Some(bytes) = self.memory_budget_bytes {
            return Ok(bytes);
        }
        if !(0.0 < self.memory_fraction && self.memory_fraction <= 1.0) {
            return Err(Error::InvalidFormat(
                "memory_fraction must be in (0.0, 1.0]".to_string(),
            ));
        }
        let mut system = System::new();
        system.refresh_memory();
        let available = system.available_memory();
        if available == 0 {
            return Err(Error::InvalidFormat(
                "available system memory reported as 0".to_string(),
            ));
        }
        let budget = (available as f64 * self.memory_fraction).floor() as u64;
        Ok(usize::try_from(budget).unwrap_or(usize::MAX))
    }

    /// Cells per chunk for cells of `bytes_per_cell`, with `workers` chunks
    /// resident at once.
    ///
    /// # Errors
    /// Returns an error if the memory budget cannot be resolved.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss
    )]
    pub fn resolve_cells_per_chunk(&self, bytes_per_cell: usize, workers: usize) -> Result<usize> {
        if let Some(cells) = self.cells_per_chunk {
            return Ok(cells.max(1));
        }
        if bytes_per_cell == 0 {
            return Ok(DEFAULT_CELLS_PER_CHUNK);
        }
        let budget = self.resolve_budget_bytes()?;
        let per_worker = budget / workers.max(1);
        let cells = (per_worker as f64 / (bytes_per_cell as f64 * MEMORY_OVERHEAD_FACTOR)).floor()
            as usize;
        let cells = cells.max(1);
        debug!(
            "chunk sizing: budget {budget} bytes, {workers} workers, \
             {bytes_per_cell} bytes/cell -> {cells} cells"
        );
        Ok(cells)
    }
}
