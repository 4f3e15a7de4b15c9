//! The chunked data source contract.

use crate::cells::CellChunk;
use crate::error::Result;
use crate::units::Unit;

/// A finite sequence of cell chunks that may be read from several threads.
///
/// Chunks are addressed by index so that each worker can pull its own chunk
/// without coordinating with the others.
pub trait ChunkedDataSource: Sync {
    /// Number of chunks.
    fn num_chunks(&self) -> usize;

    /// Materialise chunk `index`.
    ///
    /// # Errors
    /// Returns an error if the chunk cannot be read or is malformed.
    fn chunk(&self, index: usize) -> Result<CellChunk>;

    /// Total number of cells across all chunks.
    fn total_cells(&self) -> usize;

    /// Minimum and maximum of a field across every chunk, in `unit`.
    ///
    /// Returns `None` when no chunk has a finite value for the field.
    ///
    /// # Errors
    /// Propagates chunk read errors, missing fields and unit mismatches.
    fn field_extrema(&self, name: &str, unit: Unit) -> Result<Option<(f64, f64)>> {
        let mut acc: Option<(f64, f64)> = None;
        for index in 0..self.num_chunks() {
            let chunk = self.chunk(index)?;
            if chunk.is_empty() {
                continue;
            }
            let column = chunk.field(name)?;
            let factor = column.unit.conversion_factor(unit)?;
            if let Some((lo, hi)) = column.extrema() {
                let (lo, hi) = (lo * factor, hi * factor);
                acc = Some(match acc {
                    None => (lo, hi),
                    Some((a, b)) => (a.min(lo), b.max(hi)),
                });
            }
        }
        Ok(acc)
    }
}

/// A data source backed by chunks held in memory.
#[derive(Clone, Debug, Default)]
pub struct InMemorySource {
    chunks: Vec<CellChunk>,
}

impl InMemorySource {
    #[must_use]
    pub fn new(chunks: Vec<CellChunk>) -> Self {
        Self { chunks }
    }

    /// A single-chunk source.
    #[must_use]
    pub fn single(chunk: CellChunk) -> Self {
        Self {
            chunks: vec![chunk],
        }
    }

    /// Split `chunk` into consecutive chunks of at most `cells_per_chunk` cells.
    #[must_use]
    pub fn split(chunk: &CellChunk, cells_per_chunk: usize) -> Self {
        let step = cells_per_chunk.max(1);
        let chunks = (0..chunk.len())
            .step_by(step)
            .map(|start| chunk.slice(start..(start + step).min(chunk.len())))
            .collect();
        Self { chunks }
    }
}

impl ChunkedDataSource for InMemorySource {
    fn num_chunks(&self) -> usize {
        self.chunks.len()
    }

    fn chunk(&self, index: usize) -> Result<CellChunk> {
        self.chunks.get(index).cloned().ok_or_else(|| {
            crate::Error::ConfigError(format!(
                "chunk index {index} out of range ({} chunks)",
                self.chunks.len()
            ))
        })
    }

    fn total_cells(&self) -> usize {
        self.chunks.iter().map(CellChunk::len).sum()
    }
}
