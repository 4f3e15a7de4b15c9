//! Spectral table files in JSON form.

use crate::Result;
use log::debug;
use phox_core::SpectralTable;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Reads and validates a spectral table stored as JSON with keys
/// `energy_edges`, `kt`, `cosmic` and `metal`.
///
/// # Errors
/// Returns an error if the file cannot be read, is not valid JSON, or the
/// table shapes are inconsistent.
pub fn read_spectral_table_json<P: AsRef<Path>>(path: P) -> Result<SpectralTable> {
    let file = File::open(path.as_ref())?;
    let table: SpectralTable = serde_json::from_reader(BufReader::new(file))?;
    table.validate()?;
    debug!(
        "loaded spectral table {}: {} temperatures, {} channels",
        path.as_ref().display(),
        table.kt.len(),
        table.energy_edges.len().saturating_sub(1)
    );
    Ok(table)
}

/// Writes a spectral table as JSON.
///
/// # Errors
/// Returns an error if the table is inconsistent or the file cannot be written.
pub fn write_spectral_table_json<P: AsRef<Path>>(path: P, table: &SpectralTable) -> Result<()> {
    table.validate()?;
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(&mut writer, table)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use tempfile::NamedTempFile;

    #[test]
    fn reads_table_json() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"energy_edges": [0.5, 1.0, 2.0], "kt": [1.0, 2.0],
                "cosmic": [[1.0, 2.0], [3.0, 4.0]],
                "metal": [[0.1, 0.2], [0.3, 0.4]]}}"#
        )
        .unwrap();
        file.flush().unwrap();

        let table = read_spectral_table_json(file.path()).unwrap();
        assert_eq!(table.kt, vec![1.0, 2.0]);
        assert_eq!(table.cosmic[1], vec![3.0, 4.0]);

        let copy = NamedTempFile::new().unwrap();
        write_spectral_table_json(copy.path(), &table).unwrap();
        assert_eq!(read_spectral_table_json(copy.path()).unwrap(), table);
    }

    #[test]
    fn inconsistent_table_is_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"energy_edges": [0.5, 1.0, 2.0], "kt": [1.0],
                "cosmic": [[1.0]], "metal": [[0.1, 0.2]]}}"#
        )
        .unwrap();
        file.flush().unwrap();
        assert!(matches!(
            read_spectral_table_json(file.path()),
            Err(Error::CoreError(phox_core::Error::SpectralError(_)))
        ));
    }

    #[test]
    fn malformed_json_is_reported() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{{\"kt\": ").unwrap();
        file.flush().unwrap();
        assert!(matches!(
            read_spectral_table_json(file.path()),
            Err(Error::JsonError(_))
        ));
    }
}
