//! phox CLI: Generate synthetic X-ray photons from simulation cells.
#![allow(clippy::cast_precision_loss)]

mod config;
mod error;
mod synthetic;

use clap::{Parser, Subcommand};
use config::{OutputFormat, RunConfig};
use error::Result;
use log::info;
use phox_core::{ChunkedDataSource, ObservationParams, PhotonTable};
use phox_io::{
    CellFileReader, CellFileWriter, MappedFileReader, PhotonFileWriter, PHOTON_FILE_MAGIC,
};
use std::path::{Path, PathBuf};
use std::time::Instant;
use synthetic::SyntheticSphere;

/// Monte Carlo X-ray photon generator.
#[derive(Parser)]
#[command(name = "phox")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbose output (debug logging)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate photons from a cell file
    Generate {
        /// Input cell file
        #[arg(long)]
        cells: PathBuf,

        /// JSON run configuration
        #[arg(long)]
        config: PathBuf,

        /// Output file (.csv, .bin or .h5)
        #[arg(short, long)]
        output: PathBuf,

        /// Base random seed (overrides the configuration)
        #[arg(long)]
        seed: Option<u64>,

        /// Worker threads (overrides the configuration)
        #[arg(long)]
        threads: Option<usize>,

        /// Show a progress bar
        #[arg(long)]
        progress: bool,
    },

    /// Show information about a cell or binary photon file
    Info {
        /// Input file
        input: PathBuf,
    },

    /// Write a synthetic isothermal cluster as a cell file
    MakeCells {
        /// Output cell file
        #[arg(short, long)]
        output: PathBuf,

        /// Cells along each axis
        #[arg(long, default_value = "32")]
        cells_per_side: usize,

        /// Gas temperature (keV)
        #[arg(long, default_value = "5.0")]
        kt: f64,

        /// Box side (kpc)
        #[arg(long, default_value = "2000.0")]
        box_kpc: f64,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default)).init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Generate {
            cells,
            config,
            output,
            seed,
            threads,
            progress,
        } => generate(&cells, &config, &output, seed, threads, progress),
        Commands::Info { input } => info_command(&input),
        Commands::MakeCells {
            output,
            cells_per_side,
            kt,
            box_kpc,
        } => {
            let sphere = SyntheticSphere {
                cells_per_side,
                kt_kev: kt,
                box_kpc,
                ..SyntheticSphere::default()
            };
            let chunk = sphere.build()?;
            CellFileWriter::create(&output)?.write_cells(&chunk)?;
            println!("Wrote {} cells to {}", chunk.len(), output.display());
            Ok(())
        }
    }
}

fn generate(
    cells: &Path,
    config_path: &Path,
    output: &Path,
    seed: Option<u64>,
    threads: Option<usize>,
    progress: bool,
) -> Result<()> {
    let run = RunConfig::load(config_path)?;
    let format = OutputFormat::from_path(output)?;

    let mut generation = run.generation;
    if let Some(seed) = seed {
        generation = generation.with_seed(seed);
    }
    if let Some(threads) = threads {
        generation = generation.try_with_parallelism(threads)?;
    }
    if progress {
        generation = generation.with_progress(true);
    }

    let params = run.observation.resolve()?;
    info!(
        "Observation: z = {}, D_A = {:.3} Mpc, exposure {} s, area {} cm^2",
        params.redshift,
        params.angular_diameter_distance_mpc(),
        params.exposure_time_s,
        params.area_cm2
    );

    let reader = CellFileReader::open_with(cells, &run.chunking)?;
    let mut model = run.model.build()?;

    let start = Instant::now();
    let table = phox_models::generate_photons(&mut model, &reader, &params, &generation)?;
    let elapsed = start.elapsed();

    write_output(output, format, &table, &params)?;

    println!(
        "Generated {} photons from {} cells in {:.2}s",
        table.num_photons(),
        reader.total_cells(),
        elapsed.as_secs_f64()
    );
    println!("Active cells: {}", table.num_cells());
    println!("Output: {}", output.display());
    Ok(())
}

fn write_output(
    output: &Path,
    format: OutputFormat,
    table: &PhotonTable,
    params: &ObservationParams,
) -> Result<()> {
    match format {
        OutputFormat::Csv => PhotonFileWriter::create(output)?.write_csv(table)?,
        OutputFormat::Binary => PhotonFileWriter::create(output)?.write_binary(table)?,
        #[cfg(feature = "hdf5")]
        OutputFormat::Hdf5 => phox_io::write_photons_hdf5(
            output,
            table,
            params,
            &phox_io::PhotonWriteOptions::default(),
        )?,
        #[cfg(not(feature = "hdf5"))]
        OutputFormat::Hdf5 => {
            let _ = params;
            return Err(error::CliError::Config(
                "HDF5 output requires building with the `hdf5` feature".to_string(),
            ));
        }
    }
    Ok(())
}

fn info_command(input: &Path) -> Result<()> {
    let is_photon_file = MappedFileReader::open(input)?
        .as_bytes()
        .starts_with(PHOTON_FILE_MAGIC);
    println!("File: {}", input.display());

    if is_photon_file {
        let table = phox_io::read_photons_binary(input)?;
        println!("Photon table");
        println!("Active cells: {}", table.num_cells());
        println!("Photons: {}", table.num_photons());
        if let Some(energy) = table.column(phox_core::photons::names::ENERGY) {
            if let Some((lo, hi)) = energy.extrema() {
                let mean = energy.values.iter().sum::<f64>() / energy.len() as f64;
                println!(
                    "Energy range: {lo:.4} - {hi:.4} {} (mean {mean:.4})",
                    energy.unit
                );
            }
        }
        return Ok(());
    }

    let reader = CellFileReader::open(input)?;
    println!("Cells: {}", reader.num_cells());
    println!(
        "Chunks: {} of up to {} cells",
        reader.num_chunks(),
        reader.cells_per_chunk()
    );
    println!("{:<20} | {:<16} | {:>14} | {:>14}", "Field", "Unit", "Min", "Max");
    println!("{:-<73}", "");
    for (name, unit) in reader.fields() {
        match reader.field_extrema(name, unit)? {
            Some((lo, hi)) => {
                println!("{name:<20} | {:<16} | {lo:>14.6e} | {hi:>14.6e}", unit.symbol());
            }
            None => println!("{name:<20} | {:<16} | {:>14} | {:>14}", unit.symbol(), "-", "-"),
        }
    }
    Ok(())
}
