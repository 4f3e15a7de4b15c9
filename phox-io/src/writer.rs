//! File writers for cell files and photon tables.

use crate::reader::CELL_FILE_MAGIC;
use crate::{Error, Result};
use phox_core::photons::{names, ENERGY_UNIT, LENGTH_UNIT, VELOCITY_UNIT};
use phox_core::{CellChunk, PhotonTable};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Leading bytes of a packed binary photon file.
pub const PHOTON_FILE_MAGIC: &[u8; 8] = b"PHXPHOT1";

/// Per-cell columns of a binary photon file, in storage order.
pub(crate) const PER_CELL_COLUMNS: [&str; 7] = [
    names::X,
    names::Y,
    names::Z,
    names::VX,
    names::VY,
    names::VZ,
    names::DX,
];

fn write_f64s<W: Write>(writer: &mut W, values: &[f64]) -> Result<()> {
    for v in values {
        writer.write_all(&v.to_le_bytes())?;
    }
    Ok(())
}

fn len_prefix(s: &str) -> Result<[u8; 2]> {
    u16::try_from(s.len())
        .map(u16::to_le_bytes)
        .map_err(|_| Error::InvalidFormat(format!("name '{s}' is longer than 65535 bytes")))
}

/// Writer for cell files readable by [`crate::CellFileReader`].
pub struct CellFileWriter {
    writer: BufWriter<File>,
}

impl CellFileWriter {
    /// Creates a new file writer.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        Ok(Self { writer })
    }

    /// Writes every field of `cells` with its unit.
    ///
    /// # Errors
    /// Returns an error on I/O failure or if a name or unit symbol does not
    /// fit its length prefix.
    pub fn write_cells(&mut self, cells: &CellChunk) -> Result<()> {
        let names: Vec<&str> = cells.field_names().collect();
        let num_fields = u32::try_from(names.len())
            .map_err(|_| Error::InvalidFormat("too many fields".to_string()))?;

        let mut header = CELL_FILE_MAGIC.to_vec();
        header.extend_from_slice(&(cells.len() as u64).to_le_bytes());
        header.extend_from_slice(&num_fields.to_le_bytes());
        for name in &names {
            let unit = cells.field(name)?.unit.symbol();
            for s in [*name, unit] {
                header.extend_from_slice(&len_prefix(s)?);
                header.extend_from_slice(s.as_bytes());
            }
        }
        header.resize(header.len().next_multiple_of(8), 0);
        self.writer.write_all(&header)?;

        for name in &names {
            write_f64s(&mut self.writer, &cells.field(name)?.values)?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

/// Writer for photon table output.
pub struct PhotonFileWriter {
    writer: BufWriter<File>,
}

impl PhotonFileWriter {
    /// Creates a new file writer.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        Ok(Self { writer })
    }

    /// Writes one row per photon, repeating the owning cell's position and
    /// velocity. The header carries units.
    ///
    /// # Errors
    /// Returns an error on I/O failure.
    pub fn write_csv(&mut self, table: &PhotonTable) -> Result<()> {
        let length = LENGTH_UNIT.symbol();
        let velocity = VELOCITY_UNIT.symbol();
        writeln!(
            self.writer,
            "cell,{} [{}],x [{length}],y [{length}],z [{length}],\
             vx [{velocity}],vy [{velocity}],vz [{velocity}],dx [{length}]",
            names::ENERGY,
            ENERGY_UNIT.symbol()
        )?;

        let columns: Vec<&[f64]> = PER_CELL_COLUMNS
            .iter()
            .filter_map(|name| table.values(name))
            .collect();
        let energy = table.energy();
        for (cell, range) in table.cell_ranges().into_iter().enumerate() {
            let mut cell_part = String::new();
            for column in &columns {
                cell_part.push(',');
                cell_part.push_str(&column[cell].to_string());
            }
            for e in &energy[range] {
                writeln!(self.writer, "{cell},{e}{cell_part}")?;
            }
        }

        self.writer.flush()?;
        Ok(())
    }

    /// Writes the table in packed little-endian form.
    ///
    /// Format: magic, u64 cell count, u64 photon count, `NumberOfPhotons` as
    /// u64 per cell, then x, y, z, vx, vy, vz, dx as f64 per cell, then the
    /// energies as f64 per photon.
    ///
    /// # Errors
    /// Returns an error on I/O failure.
    pub fn write_binary(&mut self, table: &PhotonTable) -> Result<()> {
        self.writer.write_all(PHOTON_FILE_MAGIC)?;
        self.writer
            .write_all(&(table.num_cells() as u64).to_le_bytes())?;
        self.writer
            .write_all(&(table.num_photons() as u64).to_le_bytes())?;
        for n in table.number_of_photons() {
            self.writer.write_all(&n.to_le_bytes())?;
        }
        for name in PER_CELL_COLUMNS {
            let values = table.values(name).unwrap_or_default();
            write_f64s(&mut self.writer, values)?;
        }
        write_f64s(&mut self.writer, table.energy())?;

        self.writer.flush()?;
        Ok(())
    }

    /// Flushes the writer.
    ///
    /// # Errors
    /// Returns an error on I/O failure.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
