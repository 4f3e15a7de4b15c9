//! Running a photon model over a chunked data source.

use crate::model::PhotonModel;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};
use phox_core::{
    concatenate_photons, ChunkedDataSource, Error, ObservationParams, PhotonBatch, PhotonTable,
    Result,
};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Settings for one generation run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct GenerationConfig {
    /// Base seed; chunk `i` is seeded with `seed + i`. Drawn at random when absent.
    pub seed: Option<u64>,
    /// Worker threads; rayon's default when absent.
    pub parallelism: Option<usize>,
    /// Draw a progress bar on stderr.
    pub show_progress: bool,
}

impl GenerationConfig {
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set the number of worker threads.
    ///
    /// Values less than 1 are clamped to 1. Use [`Self::try_with_parallelism`]
    /// to surface invalid values as an error instead.
    #[must_use]
    pub fn with_parallelism(mut self, threads: usize) -> Self {
        self.parallelism = Some(threads.max(1));
        self
    }

    /// Fallible variant of [`Self::with_parallelism`].
    ///
    /// # Errors
    /// Returns an error if `threads` is 0.
    pub fn try_with_parallelism(mut self, threads: usize) -> Result<Self> {
        if threads == 0 {
            return Err(Error::ConfigError(
                "parallelism must be at least 1".to_string(),
            ));
        }
        self.parallelism = Some(threads);
        Ok(self)
    }

    #[must_use]
    pub fn with_progress(mut self, enabled: bool) -> Self {
        self.show_progress = enabled;
        self
    }

    /// The configured seed, or a fresh one from the thread RNG.
    #[must_use]
    pub fn resolve_seed(&self) -> u64 {
        self.seed.unwrap_or_else(|| rand::rng().next_u64())
    }
}

/// Deterministic generator for chunk `index` of a run seeded with `seed`.
#[must_use]
pub fn chunk_rng(seed: u64, index: usize) -> StdRng {
    StdRng::seed_from_u64(seed.wrapping_add(index as u64))
}

fn progress_bar(total_cells: usize, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(total_cells as u64);
    let style = ProgressStyle::default_bar()
        .template("{msg} [{bar:40.cyan/blue}] {pos}/{len} cells ({per_sec}) ETA: {eta}")
        .map(|s| s.progress_chars("=> "))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb.set_message("Generating photons");
    pb
}

fn thread_pool(parallelism: Option<usize>) -> Result<ThreadPool> {
    let mut builder = ThreadPoolBuilder::new();
    if let Some(threads) = parallelism {
        builder = builder.num_threads(threads);
    }
    builder
        .build()
        .map_err(|e| Error::ConfigError(format!("failed to build thread pool: {e}")))
}

/// Generate photons from every chunk of `source` in parallel.
///
/// Each chunk gets its own generator seeded from the run seed and the chunk
/// index, so the result does not depend on the number of workers. Empty
/// chunks are skipped. Any chunk error aborts the whole run.
///
/// # Errors
/// Returns the first chunk error, a thread pool error, or a preparation error.
pub fn generate_photons<S: ChunkedDataSource + ?Sized>(
    model: &mut PhotonModel,
    source: &S,
    params: &ObservationParams,
    config: &GenerationConfig,
) -> Result<PhotonTable> {
    let seed = config.resolve_seed();
    let num_chunks = source.num_chunks();
    info!(
        "Generating photons with the {} model: {num_chunks} chunks, {} cells, seed {seed}",
        model.name(),
        source.total_cells()
    );

    let pool = thread_pool(config.parallelism)?;
    model.prepare(source, params)?;
    let pb = progress_bar(source.total_cells(), config.show_progress);

    let prepared: &PhotonModel = model;
    let batches: Result<Vec<PhotonBatch>> = pool.install(|| {
        (0..num_chunks)
            .into_par_iter()
            .map(|index| {
                let chunk = source.chunk(index)?;
                if chunk.is_empty() {
                    return Ok(PhotonBatch::default());
                }
                let mut rng = chunk_rng(seed, index);
                let batch = prepared.generate_chunk(&chunk, params, &mut rng)?;
                debug!(
                    "chunk {index}: {} photons from {} cells",
                    batch.num_photons(),
                    chunk.len()
                );
                pb.inc(chunk.len() as u64);
                Ok(batch)
            })
            .collect()
    });
    model.cleanup();

    let table = concatenate_photons(batches?)?;
    pb.finish_with_message(format!("{} photons", table.num_photons()));
    info!(
        "Generated {} photons from {} active cells",
        table.num_photons(),
        table.num_cells()
    );
    Ok(table)
}

/// Generate photons chunk by chunk, in index order, from one caller-owned generator.
///
/// # Errors
/// Returns the first chunk error or a preparation error.
pub fn generate_photons_with_rng<S, R>(
    model: &mut PhotonModel,
    source: &S,
    params: &ObservationParams,
    rng: &mut R,
) -> Result<PhotonTable>
where
    S: ChunkedDataSource + ?Sized,
    R: Rng + ?Sized,
{
    model.prepare(source, params)?;
    let mut batches = Vec::with_capacity(source.num_chunks());
    let mut outcome = Ok(());
    for index in 0..source.num_chunks() {
        let step = source.chunk(index).and_then(|chunk| {
            if chunk.is_empty() {
                Ok(PhotonBatch::default())
            } else {
                model.generate_chunk(&chunk, params, rng)
            }
        });
        match step {
            Ok(batch) => batches.push(batch),
            Err(e) => {
                outcome = Err(e);
                break;
            }
        }
    }
    model.cleanup();
    outcome?;
    concatenate_photons(batches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{flat_table_model, thermal_chunk};
    use crate::thermal::{ThermalConfig, ThermalPhotonModel};
    use phox_core::{InMemorySource, ObservationConfig};

    fn setup() -> (PhotonModel, phox_core::CellChunk, ObservationParams) {
        let params = ObservationConfig::default()
            .with_redshift(0.0)
            .with_distance_mpc(100.0)
            .resolve()
            .unwrap();
        let model: PhotonModel =
            ThermalPhotonModel::new(flat_table_model(1.0, 0.5), ThermalConfig::default())
                .unwrap()
                .into();
        let n = 40;
        #[allow(clippy::cast_precision_loss)]
        let kt: Vec<f64> = (0..n).map(|i| 0.5 + 0.1 * i as f64).collect();
        let chunk = thermal_chunk(&kt, &vec![1.0e-26; n], &vec![1.0e50; n]);
        (model, chunk, params)
    }

    #[test]
    fn result_is_independent_of_worker_count() {
        let (mut model, chunk, params) = setup();
        let source = InMemorySource::split(&chunk, 7);
        let one = generate_photons(
            &mut model,
            &source,
            &params,
            &GenerationConfig::default().with_seed(3).with_parallelism(1),
        )
        .unwrap();
        let four = generate_photons(
            &mut model,
            &source,
            &params,
            &GenerationConfig::default().with_seed(3).with_parallelism(4),
        )
        .unwrap();
        assert_eq!(one, four);
        assert!(one.num_photons() > 0);
        assert!(one.validate().is_ok());
    }

    #[test]
    fn empty_chunks_are_skipped() {
        let (mut model, chunk, params) = setup();
        let source = InMemorySource::new(vec![
            phox_core::CellChunk::new(0),
            chunk,
            phox_core::CellChunk::new(0),
        ]);
        let table = generate_photons(
            &mut model,
            &source,
            &params,
            &GenerationConfig::default().with_seed(1),
        )
        .unwrap();
        assert_eq!(table.num_cells(), 40);
    }

    #[test]
    fn sequential_run_is_reproducible() {
        let (mut model, chunk, params) = setup();
        let source = InMemorySource::split(&chunk, 10);
        let a =
            generate_photons_with_rng(&mut model, &source, &params, &mut chunk_rng(5, 0)).unwrap();
        let b =
            generate_photons_with_rng(&mut model, &source, &params, &mut chunk_rng(5, 0)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn chunk_error_aborts_run() {
        let (mut model, chunk, params) = setup();
        let mut broken = chunk.slice(0..3);
        broken
            .insert("kT", vec![1.0, 2.0, 3.0], phox_core::Unit::Kiloparsec)
            .unwrap();
        let source = InMemorySource::new(vec![chunk, broken]);
        let err = generate_photons(
            &mut model,
            &source,
            &params,
            &GenerationConfig::default().with_seed(1),
        );
        assert!(matches!(err, Err(Error::UnitMismatch { .. })));
        assert!(GenerationConfig::default().try_with_parallelism(0).is_err());
    }

    #[test]
    fn model_is_released_after_a_failed_run() {
        let (mut model, chunk, params) = setup();
        let mut broken = chunk.slice(0..3);
        broken
            .insert("kT", vec![1.0, 2.0, 3.0], phox_core::Unit::Kiloparsec)
            .unwrap();
        let source = InMemorySource::new(vec![chunk.clone(), broken]);
        let config = GenerationConfig::default().with_seed(2).with_parallelism(2);
        assert!(generate_photons(&mut model, &source, &params, &config).is_err());

        let mut rng = chunk_rng(2, 0);
        assert!(model.generate_chunk(&chunk, &params, &mut rng).is_err());
    }

    #[test]
    fn thread_pool_follows_parallelism() {
        assert_eq!(thread_pool(Some(3)).unwrap().current_num_threads(), 3);
        assert!(thread_pool(None).unwrap().current_num_threads() >= 1);
    }
}
