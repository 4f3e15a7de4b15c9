//! HDF5 photon lists and spectral tables.
//!
//! A photon file has two groups. `/parameters` holds scalar datasets for the
//! observation (exposure, area, redshift, angular diameter distance) and the
//! 3-vector source centre. `/data` holds one dataset per photon table field.
//! Every dataset carries a `units` attribute.

use crate::{Error, Result};
use hdf5::types::{H5Type, VarLenUnicode};
use hdf5::{Dataset, File, Group};
use log::info;
use ndarray::{s, ArrayView1, ArrayView2};
use phox_core::photons::{names, unit_of};
use phox_core::{ObservationParams, PhotonBatch, PhotonTable, SpectralTable, Unit};
use std::path::Path;
use std::str::FromStr;

const FORMAT_VERSION: &str = "0.3";

const EXPOSURE_TIME: &str = "exposure_time";
const AREA: &str = "area";
const REDSHIFT: &str = "redshift";
const ANGULAR_DIAMETER_DISTANCE: &str = "angular_diameter_distance";
const CENTER: &str = "center";

/// Storage options for photon lists.
#[derive(Clone, Debug)]
pub struct PhotonWriteOptions {
    /// Chunk length of the extendable datasets.
    pub chunk_size: usize,
    /// Deflate level, if any.
    pub compression: Option<u8>,
    pub shuffle: bool,
}

impl Default for PhotonWriteOptions {
    fn default() -> Self {
        Self {
            chunk_size: 65_536,
            compression: Some(4),
            shuffle: true,
        }
    }
}

/// A photon list read back from HDF5 together with its observation.
#[derive(Clone, Debug, PartialEq)]
pub struct Hdf5PhotonData {
    pub table: PhotonTable,
    pub params: ObservationParams,
}

/// Writes a photon table and the observation that produced it.
///
/// # Errors
/// Returns an error if HDF5 I/O fails.
pub fn write_photons_hdf5<P: AsRef<Path>>(
    path: P,
    table: &PhotonTable,
    params: &ObservationParams,
    options: &PhotonWriteOptions,
) -> Result<()> {
    let file = File::create(path.as_ref())?;
    set_attr_str_file(&file, "phox_format_version", FORMAT_VERSION)?;

    let parameters = file.create_group("parameters")?;
    write_scalar(&parameters, EXPOSURE_TIME, params.exposure_time_s, Unit::Second)?;
    write_scalar(&parameters, AREA, params.area_cm2, Unit::SquareCentimeter)?;
    write_scalar(&parameters, REDSHIFT, params.redshift, Unit::Dimensionless)?;
    write_scalar(
        &parameters,
        ANGULAR_DIAMETER_DISTANCE,
        params.angular_diameter_distance_cm,
        Unit::Centimeter,
    )?;
    let center = create_fixed_dataset::<f64, _>(&parameters, CENTER, (3,))?;
    set_dataset_units(&center, Unit::Kiloparsec.symbol())?;
    center.write(ArrayView1::from(&params.center_kpc[..]))?;

    let data = file.create_group("data")?;

    let counts = create_extendable_dataset::<u64>(&data, names::NUMBER_OF_PHOTONS, options)?;
    set_dataset_units(&counts, Unit::Dimensionless.symbol())?;
    append_slice(&counts, 0, table.number_of_photons())?;

    for name in names::ALL.iter().skip(1) {
        let values = table.values(name).unwrap_or_default();
        let dataset = create_extendable_dataset::<f64>(&data, name, options)?;
        if let Some(unit) = unit_of(name) {
            set_dataset_units(&dataset, unit.symbol())?;
        }
        append_slice(&dataset, 0, values)?;
    }

    info!(
        "wrote {} photons from {} cells to {}",
        table.num_photons(),
        table.num_cells(),
        path.as_ref().display()
    );
    Ok(())
}

/// Reads a photon list written by [`write_photons_hdf5`].
///
/// # Errors
/// Returns an error if HDF5 I/O fails, a dataset is missing, a unit is not
/// the expected one, or the columns break the run-length invariant.
pub fn read_photons_hdf5<P: AsRef<Path>>(path: P) -> Result<Hdf5PhotonData> {
    let file = File::open(path)?;
    let parameters = file.group("parameters")?;
    let center = read_dataset_vec::<f64>(&parameters, CENTER)?;
    let center_kpc: [f64; 3] = center
        .try_into()
        .map_err(|_| Error::InvalidFormat("center must have 3 components".to_string()))?;
    let params = ObservationParams {
        exposure_time_s: read_scalar(&parameters, EXPOSURE_TIME, Unit::Second)?,
        area_cm2: read_scalar(&parameters, AREA, Unit::SquareCentimeter)?,
        redshift: read_scalar(&parameters, REDSHIFT, Unit::Dimensionless)?,
        angular_diameter_distance_cm: read_scalar(
            &parameters,
            ANGULAR_DIAMETER_DISTANCE,
            Unit::Centimeter,
        )?,
        center_kpc,
    };

    let data = file.group("data")?;
    let column = |name: &str| -> Result<Vec<f64>> {
        let dataset = data.dataset(name)?;
        if let Some(unit) = unit_of(name) {
            check_units(&dataset, name, unit)?;
        }
        Ok(dataset.read_raw::<f64>()?)
    };
    let batch = PhotonBatch {
        number_of_photons: read_dataset_vec::<u64>(&data, names::NUMBER_OF_PHOTONS)?,
        energy: column(names::ENERGY)?,
        x: column(names::X)?,
        y: column(names::Y)?,
        z: column(names::Z)?,
        vx: column(names::VX)?,
        vy: column(names::VY)?,
        vz: column(names::VZ)?,
        dx: column(names::DX)?,
    };
    let table = PhotonTable::from_batch(batch)?;
    Ok(Hdf5PhotonData { table, params })
}

/// Reads a spectral table from datasets `energy` (channel edges, keV),
/// `kT` (keV), and 2-D `cosmic` and `metal` (one row per temperature).
///
/// # Errors
/// Returns an error if HDF5 I/O fails, a dataset is missing or has the wrong
/// rank, or the table shapes are inconsistent.
pub fn read_spectral_table_hdf5<P: AsRef<Path>>(path: P) -> Result<SpectralTable> {
    let file = File::open(path)?;
    let table = SpectralTable {
        energy_edges: read_dataset_vec::<f64>(&file, "energy")?,
        kt: read_dataset_vec::<f64>(&file, "kT")?,
        cosmic: read_rows(&file, "cosmic")?,
        metal: read_rows(&file, "metal")?,
    };
    table.validate()?;
    Ok(table)
}

/// Writes a spectral table in the layout read by [`read_spectral_table_hdf5`].
///
/// # Errors
/// Returns an error if the table is inconsistent or HDF5 I/O fails.
pub fn write_spectral_table_hdf5<P: AsRef<Path>>(path: P, table: &SpectralTable) -> Result<()> {
    table.validate()?;
    let file = File::create(path)?;

    let energy = create_fixed_dataset::<f64, _>(&file, "energy", (table.energy_edges.len(),))?;
    set_dataset_units(&energy, Unit::KeV.symbol())?;
    energy.write(ArrayView1::from(table.energy_edges.as_slice()))?;

    let kt = create_fixed_dataset::<f64, _>(&file, "kT", (table.kt.len(),))?;
    set_dataset_units(&kt, Unit::KeV.symbol())?;
    kt.write(ArrayView1::from(table.kt.as_slice()))?;

    let nchan = table.energy_edges.len() - 1;
    for (name, rows) in [("cosmic", &table.cosmic), ("metal", &table.metal)] {
        let flat: Vec<f64> = rows.iter().flatten().copied().collect();
        let view = ArrayView2::from_shape((rows.len(), nchan), flat.as_slice())
            .map_err(|e| Error::InvalidFormat(format!("{name} shape mismatch: {e}")))?;
        let dataset = create_fixed_dataset::<f64, _>(&file, name, (rows.len(), nchan))?;
        dataset.write(view)?;
    }
    Ok(())
}

fn read_rows(group: &Group, name: &str) -> Result<Vec<Vec<f64>>> {
    let dataset = group.dataset(name)?;
    let shape = dataset.shape();
    if shape.len() != 2 {
        return Err(Error::InvalidFormat(format!(
            "{name} dataset must be 2-D (kT, channel)"
        )));
    }
    let flat = dataset.read_raw::<f64>()?;
    if shape[1] == 0 {
        return Ok(vec![Vec::new(); shape[0]]);
    }
    Ok(flat.chunks(shape[1]).map(<[f64]>::to_vec).collect())
}

fn write_scalar(group: &Group, name: &str, value: f64, unit: Unit) -> Result<()> {
    let dataset = create_fixed_dataset::<f64, _>(group, name, ())?;
    set_dataset_units(&dataset, unit.symbol())?;
    dataset.write_scalar(&value)?;
    Ok(())
}

fn read_scalar(group: &Group, name: &str, unit: Unit) -> Result<f64> {
    let dataset = group.dataset(name)?;
    check_units(&dataset, name, unit)?;
    Ok(dataset.read_scalar::<f64>()?)
}

/// Fails unless the dataset's `units` attribute names `expected`. Datasets
/// without the attribute are accepted.
fn check_units(dataset: &Dataset, name: &str, expected: Unit) -> Result<()> {
    let Some(symbol) = read_attr_opt_string(dataset, "units")? else {
        return Ok(());
    };
    let unit: Unit = symbol.parse()?;
    if unit != expected {
        return Err(Error::InvalidFormat(format!(
            "{name} is stored in '{unit}', expected '{expected}'"
        )));
    }
    Ok(())
}

fn create_fixed_dataset<T: H5Type, S>(group: &Group, name: &str, shape: S) -> Result<Dataset>
where
    S: Into<hdf5::Extents>,
{
    Ok(group.new_dataset::<T>().shape(shape).create(name)?)
}

fn create_extendable_dataset<T: H5Type>(
    group: &Group,
    name: &str,
    options: &PhotonWriteOptions,
) -> Result<Dataset> {
    let mut builder = group
        .new_dataset::<T>()
        .shape((0..,))
        .chunk((options.chunk_size.max(1),));

    if let Some(level) = options.compression {
        builder = builder.deflate(level);
    }

    if options.shuffle {
        builder = builder.shuffle();
    }

    Ok(builder.create(name)?)
}

fn append_slice<T: H5Type>(dataset: &Dataset, offset: usize, data: &[T]) -> Result<()> {
    if data.is_empty() {
        return Ok(());
    }
    let new_len = offset + data.len();
    dataset.resize((new_len,))?;
    let view = ArrayView1::from(data);
    dataset.write_slice(view, s![offset..new_len])?;
    Ok(())
}

fn set_dataset_units(dataset: &Dataset, units: &str) -> Result<()> {
    let value = to_var_len_unicode(units)?;
    dataset
        .new_attr::<VarLenUnicode>()
        .create("units")?
        .write_scalar(&value)?;
    Ok(())
}

fn set_attr_str_file(file: &File, name: &str, value: &str) -> Result<()> {
    let value = to_var_len_unicode(value)?;
    file.new_attr::<VarLenUnicode>()
        .create(name)?
        .write_scalar(&value)?;
    Ok(())
}

fn read_dataset_vec<T: H5Type>(group: &Group, name: &str) -> Result<Vec<T>> {
    let dataset = group.dataset(name)?;
    Ok(dataset.read_raw::<T>()?)
}

fn read_attr_opt_string(dataset: &Dataset, name: &str) -> Result<Option<String>> {
    match dataset.attr(name) {
        Ok(attr) => {
            let value: VarLenUnicode = attr.read_scalar()?;
            Ok(Some(value.to_string()))
        }
        Err(_) => Ok(None),
    }
}

fn to_var_len_unicode(value: &str) -> Result<VarLenUnicode> {
    VarLenUnicode::from_str(value)
        .map_err(|e| Error::InvalidFormat(format!("invalid utf-8 attribute: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use phox_core::{concatenate_photons, ObservationConfig};
    use tempfile::NamedTempFile;

    fn table() -> PhotonTable {
        let batch = PhotonBatch {
            number_of_photons: vec![3, 1],
            energy: vec![0.3, 1.0 / 3.0, 7.25, 2.0_f64.sqrt()],
            x: vec![1.0, -2.5],
            y: vec![0.1, 0.2],
            z: vec![0.0, 3.0],
            vx: vec![120.0, -40.0],
            vy: vec![0.0, 5.0],
            vz: vec![1.0e3, 0.0],
            dx: vec![0.25, 0.5],
        };
        concatenate_photons(vec![batch]).unwrap()
    }

    fn params() -> ObservationParams {
        ObservationConfig::default()
            .with_redshift(0.05)
            .with_center_kpc([1.0, 2.0, 3.0])
            .resolve()
            .unwrap()
    }

    #[test]
    fn test_hdf5_photon_roundtrip() {
        let file = NamedTempFile::new().unwrap();
        let table = table();
        let params = params();
        let options = PhotonWriteOptions {
            chunk_size: 2,
            ..PhotonWriteOptions::default()
        };
        write_photons_hdf5(file.path(), &table, &params, &options).unwrap();

        let loaded = read_photons_hdf5(file.path()).unwrap();
        assert_eq!(loaded.table, table);
        assert_eq!(
            loaded.params.angular_diameter_distance_cm.to_bits(),
            params.angular_diameter_distance_cm.to_bits()
        );
        assert_eq!(loaded.params, params);
    }

    #[test]
    fn test_hdf5_empty_table_keeps_units() {
        let file = NamedTempFile::new().unwrap();
        write_photons_hdf5(
            file.path(),
            &PhotonTable::default(),
            &params(),
            &PhotonWriteOptions::default(),
        )
        .unwrap();

        let h5 = File::open(file.path()).unwrap();
        let data = h5.group("data").unwrap();
        let energy = data.dataset(names::ENERGY).unwrap();
        assert_eq!(
            read_attr_opt_string(&energy, "units").unwrap().as_deref(),
            Some("keV")
        );
        let loaded = read_photons_hdf5(file.path()).unwrap();
        assert!(loaded.table.is_empty());
    }

    #[test]
    fn test_hdf5_spectral_table_roundtrip() {
        let table = SpectralTable {
            energy_edges: vec![0.5, 1.0, 1.5, 2.0],
            kt: vec![1.0, 4.0],
            cosmic: vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]],
            metal: vec![vec![0.0, 0.5, 0.0], vec![0.1, 0.2, 0.3]],
        };
        let file = NamedTempFile::new().unwrap();
        write_spectral_table_hdf5(file.path(), &table).unwrap();
        assert_eq!(read_spectral_table_hdf5(file.path()).unwrap(), table);
    }

    #[test]
    fn test_hdf5_unit_mismatch_is_rejected() {
        let file = NamedTempFile::new().unwrap();
        {
            let h5 = File::create(file.path()).unwrap();
            let group = h5.create_group("parameters").unwrap();
            write_scalar(&group, EXPOSURE_TIME, 1.0, Unit::Kiloparsec).unwrap();
        }
        let h5 = File::open(file.path()).unwrap();
        let group = h5.group("parameters").unwrap();
        assert!(matches!(
            read_scalar(&group, EXPOSURE_TIME, Unit::Second),
            Err(Error::InvalidFormat(_))
        ));
    }
}
