//! Memory-mapped cell file reader.
//!
//! A cell file stores one little-endian `f64` column per field:
//!
//! ```text
//! magic      8 bytes   "PHXCELL1"
//! num_cells  u64
//! num_fields u32
//! per field: u16 name length, name (UTF-8), u16 unit length, unit symbol (UTF-8)
//! padding    zero bytes up to the next multiple of 8
//! columns    num_fields * num_cells f64, field by field in header order
//! ```

use crate::chunking::ChunkingConfig;
use crate::writer::{PER_CELL_COLUMNS, PHOTON_FILE_MAGIC};
use crate::{Error, Result};
use log::{debug, warn};
use memmap2::Mmap;
use phox_core::{CellChunk, ChunkedDataSource, Column, PhotonBatch, PhotonTable, Unit};
use rayon::prelude::*;
use std::fs::File;
use std::ops::Range;
use std::path::{Path, PathBuf};

/// Leading bytes of every cell file.
pub const CELL_FILE_MAGIC: &[u8; 8] = b"PHXCELL1";

const F64_SIZE: usize = std::mem::size_of::<f64>();

/// A memory-mapped file reader.
///
/// Uses memmap2 to access file contents without loading the entire file
/// into memory.
pub struct MappedFileReader {
    mmap: Mmap,
    path: PathBuf,
}

impl MappedFileReader {
    /// Opens a file for memory-mapped reading.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or memory-mapped.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(&path)?;
        // SAFETY: The file is opened read-only and we assume it is not modified concurrently.
        // This is the standard safety contract for memory mapping.
        #[allow(unsafe_code)]
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self {
            mmap,
            path: path.as_ref().to_path_buf(),
        })
    }

    /// Returns the file contents as a byte slice.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.mmap[..]
    }

    /// Returns the file size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    /// Returns true if the file is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Sequential little-endian reader over a byte slice.
struct HeaderCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> HeaderCursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| Error::InvalidFormat("file is truncated".to_string()))?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn read_u16(&mut self) -> Result<u16> {
        let mut buf = [0u8; 2];
        buf.copy_from_slice(self.take(2)?);
        Ok(u16::from_le_bytes(buf))
    }

    fn read_u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(buf))
    }

    fn read_u64(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(buf))
    }

    fn take_words(&mut self, n: usize) -> Result<std::slice::ChunksExact<'a, u8>> {
        let bytes = n
            .checked_mul(8)
            .ok_or_else(|| Error::InvalidFormat("column size overflows".to_string()))?;
        Ok(self.take(bytes)?.chunks_exact(8))
    }

    fn read_u64s(&mut self, n: usize) -> Result<Vec<u64>> {
        Ok(self
            .take_words(n)?
            .map(|b| {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(b);
                u64::from_le_bytes(buf)
            })
            .collect())
    }

    fn read_f64s(&mut self, n: usize) -> Result<Vec<f64>> {
        Ok(self.take_words(n)?.map(decode_f64).collect())
    }

    fn read_string(&mut self) -> Result<String> {
        let len = usize::from(self.read_u16()?);
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| Error::InvalidFormat(format!("field name is not UTF-8: {e}")))
    }
}

#[derive(Clone, Debug)]
struct FieldEntry {
    name: String,
    unit: Unit,
    /// Byte offset of the column's first value.
    offset: usize,
}

fn decode_f64(bytes: &[u8]) -> f64 {
    let mut buf = [0u8; F64_SIZE];
    buf.copy_from_slice(bytes);
    f64::from_le_bytes(buf)
}

fn merge_extrema(a: Option<(f64, f64)>, b: Option<(f64, f64)>) -> Option<(f64, f64)> {
    match (a, b) {
        (None, x) | (x, None) => x,
        (Some((a0, a1)), Some((b0, b1))) => Some((a0.min(b0), a1.max(b1))),
    }
}

/// A cell file exposed as a [`ChunkedDataSource`].
///
/// Chunks are decoded from the mapping on demand, so several workers can
/// read different chunks at the same time.
pub struct CellFileReader {
    reader: MappedFileReader,
    num_cells: usize,
    fields: Vec<FieldEntry>,
    cells_per_chunk: usize,
}

impl CellFileReader {
    /// Opens a cell file with the default chunk sizing.
    ///
    /// # Errors
    /// Returns an error if the file cannot be mapped or its header is invalid.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, &ChunkingConfig::default())
    }

    /// Opens a cell file, sizing chunks with `chunking`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be mapped, its header is invalid,
    /// or the memory budget cannot be resolved.
    pub fn open_with<P: AsRef<Path>>(path: P, chunking: &ChunkingConfig) -> Result<Self> {
        let reader = MappedFileReader::open(path)?;
        let (num_cells, fields) = parse_header(reader.as_bytes())?;
        let bytes_per_cell = fields.len() * F64_SIZE;
        let cells_per_chunk =
            chunking.resolve_cells_per_chunk(bytes_per_cell, rayon::current_num_threads())?;
        if num_cells == 0 {
            warn!("cell file {} holds no cells", reader.path().display());
        }
        debug!(
            "opened {}: {num_cells} cells, {} fields, {cells_per_chunk} cells per chunk",
            reader.path().display(),
            fields.len()
        );
        Ok(Self {
            reader,
            num_cells,
            fields,
            cells_per_chunk,
        })
    }

    /// Override the chunk size. Values less than 1 are clamped to 1.
    #[must_use]
    pub fn with_cells_per_chunk(mut self, cells: usize) -> Self {
        self.cells_per_chunk = cells.max(1);
        self
    }

    #[must_use]
    pub fn num_cells(&self) -> usize {
        self.num_cells
    }

    #[must_use]
    pub fn cells_per_chunk(&self) -> usize {
        self.cells_per_chunk
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.reader.path()
    }

    /// Field names and units in file order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, Unit)> {
        self.fields.iter().map(|f| (f.name.as_str(), f.unit))
    }

    fn find(&self, name: &str) -> phox_core::Result<&FieldEntry> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| phox_core::Error::MissingField(name.to_string()))
    }

    fn column_bytes(&self, field: &FieldEntry, cells: Range<usize>) -> &[u8] {
        let start = field.offset + cells.start * F64_SIZE;
        let end = field.offset + cells.end * F64_SIZE;
        &self.reader.as_bytes()[start..end]
    }

    fn decode(&self, field: &FieldEntry, cells: Range<usize>) -> Vec<f64> {
        self.column_bytes(field, cells)
            .chunks_exact(F64_SIZE)
            .map(decode_f64)
            .collect()
    }

    /// Reads one whole field.
    ///
    /// # Errors
    /// Returns an error if the field does not exist.
    pub fn column(&self, name: &str) -> Result<Column> {
        let field = self.find(name)?;
        Ok(Column::new(self.decode(field, 0..self.num_cells), field.unit))
    }

    /// Reads cells `cells` of every field.
    ///
    /// # Errors
    /// Returns an error if the range lies outside the file.
    pub fn read_range(&self, cells: Range<usize>) -> phox_core::Result<CellChunk> {
        if cells.start > cells.end || cells.end > self.num_cells {
            return Err(phox_core::Error::ConfigError(format!(
                "cell range {cells:?} outside file with {} cells",
                self.num_cells
            )));
        }
        let mut chunk = CellChunk::new(cells.len());
        for field in &self.fields {
            chunk.insert(
                field.name.clone(),
                self.decode(field, cells.clone()),
                field.unit,
            )?;
        }
        Ok(chunk)
    }
}

impl ChunkedDataSource for CellFileReader {
    fn num_chunks(&self) -> usize {
        self.num_cells.div_ceil(self.cells_per_chunk)
    }

    fn chunk(&self, index: usize) -> phox_core::Result<CellChunk> {
        if index >= self.num_chunks() {
            return Err(phox_core::Error::ConfigError(format!(
                "chunk index {index} out of range ({} chunks)",
                self.num_chunks()
            )));
        }
        let start = index * self.cells_per_chunk;
        let end = (start + self.cells_per_chunk).min(self.num_cells);
        self.read_range(start..end)
    }

    fn total_cells(&self) -> usize {
        self.num_cells
    }

    fn field_extrema(&self, name: &str, unit: Unit) -> phox_core::Result<Option<(f64, f64)>> {
        let field = self.find(name)?;
        let factor = field.unit.conversion_factor(unit)?;
        let extrema = self
            .column_bytes(field, 0..self.num_cells)
            .par_chunks_exact(F64_SIZE)
            .map(decode_f64)
            .filter(|v| v.is_finite())
            .fold(
                || None,
                |acc, v| merge_extrema(acc, Some((v, v))),
            )
            .reduce(|| None, merge_extrema);
        Ok(extrema.map(|(lo, hi)| (lo * factor, hi * factor)))
    }
}

fn parse_header(data: &[u8]) -> Result<(usize, Vec<FieldEntry>)> {
    let mut cursor = HeaderCursor { data, pos: 0 };
    if cursor.take(CELL_FILE_MAGIC.len())? != CELL_FILE_MAGIC {
        return Err(Error::InvalidFormat("not a phox cell file".to_string()));
    }
    let num_cells = usize::try_from(cursor.read_u64()?)
        .map_err(|_| Error::InvalidFormat("cell count exceeds address space".to_string()))?;
    let num_fields = cursor.read_u32()? as usize;

    let mut named = Vec::with_capacity(num_fields);
    for _ in 0..num_fields {
        let name = cursor.read_string()?;
        let unit: Unit = cursor.read_string()?.parse()?;
        if named.iter().any(|(n, _): &(String, Unit)| *n == name) {
            return Err(Error::InvalidFormat(format!("duplicate field '{name}'")));
        }
        named.push((name, unit));
    }

    let data_offset = cursor.pos.next_multiple_of(F64_SIZE);
    let column_bytes = num_cells
        .checked_mul(F64_SIZE)
        .ok_or_else(|| Error::InvalidFormat("cell count overflows".to_string()))?;
    let required = column_bytes
        .checked_mul(num_fields)
        .and_then(|b| b.checked_add(data_offset))
        .ok_or_else(|| Error::InvalidFormat("column data size overflows".to_string()))?;
    if data.len() < required {
        return Err(Error::InvalidFormat(format!(
            "file holds {} bytes, header requires {required}",
            data.len()
        )));
    }

    let fields = named
        .into_iter()
        .enumerate()
        .map(|(i, (name, unit))| FieldEntry {
            name,
            unit,
            offset: data_offset + i * column_bytes,
        })
        .collect();
    Ok((num_cells, fields))
}

/// Reads a photon table written by [`crate::PhotonFileWriter::write_binary`].
///
/// # Errors
/// Returns an error if the file cannot be mapped, is truncated, or the
/// decoded table breaks the run-length invariant.
pub fn read_photons_binary<P: AsRef<Path>>(path: P) -> Result<PhotonTable> {
    let reader = MappedFileReader::open(path)?;
    let mut cursor = HeaderCursor {
        data: reader.as_bytes(),
        pos: 0,
    };
    if cursor.take(PHOTON_FILE_MAGIC.len())? != PHOTON_FILE_MAGIC {
        return Err(Error::InvalidFormat("not a phox photon file".to_string()));
    }
    let to_len = |n: u64| {
        usize::try_from(n).map_err(|_| {
            Error::InvalidFormat("photon file count exceeds address space".to_string())
        })
    };
    let num_cells = to_len(cursor.read_u64()?)?;
    let num_photons = to_len(cursor.read_u64()?)?;

    let counts = cursor.read_u64s(num_cells)?;
    let mut per_cell = Vec::with_capacity(PER_CELL_COLUMNS.len());
    for _ in PER_CELL_COLUMNS {
        per_cell.push(cursor.read_f64s(num_cells)?);
    }
    let energy = cursor.read_f64s(num_photons)?;

    let mut columns = per_cell.into_iter();
    let mut next = || columns.next().unwrap_or_default();
    let batch = PhotonBatch {
        number_of_photons: counts,
        energy,
        x: next(),
        y: next(),
        z: next(),
        vx: next(),
        vy: next(),
        vz: next(),
        dx: next(),
    };
    Ok(PhotonTable::from_batch(batch)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_mapped_file_reader() {
        let mut file = NamedTempFile::new().unwrap();
        let data: Vec<u8> = (0..64).collect();
        file.write_all(&data).unwrap();
        file.flush().unwrap();

        let reader = MappedFileReader::open(file.path()).unwrap();
        assert_eq!(reader.len(), 64);
        assert!(!reader.is_empty());
        assert_eq!(reader.as_bytes(), &data[..]);
    }

    fn header(num_cells: u64, fields: &[(&str, &str)]) -> Vec<u8> {
        let mut bytes = CELL_FILE_MAGIC.to_vec();
        bytes.extend_from_slice(&num_cells.to_le_bytes());
        bytes.extend_from_slice(&u32::try_from(fields.len()).unwrap().to_le_bytes());
        for (name, unit) in fields {
            for s in [name, unit] {
                bytes.extend_from_slice(&u16::try_from(s.len()).unwrap().to_le_bytes());
                bytes.extend_from_slice(s.as_bytes());
            }
        }
        bytes.resize(bytes.len().next_multiple_of(8), 0);
        bytes
    }

    fn write_temp(bytes: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(bytes).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn reads_hand_built_file() {
        let mut bytes = header(3, &[("kT", "keV"), ("dx", "kpc")]);
        for v in [1.0f64, 2.0, 3.0, 0.5, 0.5, 0.25] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        let file = write_temp(&bytes);
        let reader = CellFileReader::open(file.path())
            .unwrap()
            .with_cells_per_chunk(2);

        assert_eq!(reader.num_cells(), 3);
        assert_eq!(reader.num_chunks(), 2);
        let fields: Vec<_> = reader.fields().collect();
        assert_eq!(fields, vec![("kT", Unit::KeV), ("dx", Unit::Kiloparsec)]);

        let last = reader.chunk(1).unwrap();
        assert_eq!(last.len(), 1);
        assert_eq!(last.field("dx").unwrap().values, vec![0.25]);
        assert!(reader.chunk(2).is_err());

        let (lo, hi) = reader
            .field_extrema("dx", Unit::Kiloparsec)
            .unwrap()
            .unwrap();
        assert_eq!((lo, hi), (0.25, 0.5));
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = header(0, &[]);
        bytes[0] = b'X';
        let file = write_temp(&bytes);
        assert!(matches!(
            CellFileReader::open(file.path()),
            Err(Error::InvalidFormat(_))
        ));
    }

    #[test]
    fn rejects_truncated_columns() {
        let mut bytes = header(4, &[("kT", "keV")]);
        bytes.extend_from_slice(&1.0f64.to_le_bytes());
        let file = write_temp(&bytes);
        assert!(matches!(
            CellFileReader::open(file.path()),
            Err(Error::InvalidFormat(_))
        ));
    }

    #[test]
    fn rejects_unknown_unit() {
        let file = write_temp(&header(0, &[("kT", "furlong")]));
        assert!(matches!(
            CellFileReader::open(file.path()),
            Err(Error::CoreError(phox_core::Error::UnknownUnit(_)))
        ));
    }
}
