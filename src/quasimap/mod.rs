pub mod coverage;
pub mod read_stats;
pub mod search;

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use bio::io::fastq;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;

use crate::prg::codec::{self, Marker};
use crate::prg::PrgInfo;
use crate::quasimap::coverage::selector::SeededRandom;
use crate::quasimap::coverage::Coverage;
use crate::quasimap::read_stats::ReadStats;
use crate::quasimap::search::search_read_backwards;
use crate::utils::errors::{WeaverError, WeaverResult};

/// Number of records the producer loads before handing a batch to the
/// worker pool; bounds resident memory.
pub const READS_BUFFER_SIZE: usize = 5_000;

#[derive(Default)]
pub struct QuasimapReadsStats {
    all_reads_count: AtomicU64,
    skipped_reads_count: AtomicU64,
    mapped_reads_count: AtomicU64,
}

impl QuasimapReadsStats {
    pub fn all_reads(&self) -> u64 {
        self.all_reads_count.load(Ordering::Relaxed)
    }

    pub fn skipped_reads(&self) -> u64 {
        self.skipped_reads_count.load(Ordering::Relaxed)
    }

    pub fn mapped_reads(&self) -> u64 {
        self.mapped_reads_count.load(Ordering::Relaxed)
    }
}

/**
 * Quasimaps every read of every input file against the PRG, filling the
 * coverage structures.
 *
 * A single-threaded producer reads records from disk into a bounded buffer
 * and the rayon pool maps the buffered reads in parallel; the shared
 * coverage structures take atomic or per-site-locked updates, so thread
 * interleaving cannot change the result. The producer checks the stop
 * flag between buffers and drains cleanly.
 */
pub fn quasimap_reads<P: AsRef<Path>>(
    reads_paths: &[P],
    prg_info: &PrgInfo,
    coverage: &Coverage,
    read_stats: &mut ReadStats,
    seed: u64,
    stop: &AtomicBool,
) -> WeaverResult<QuasimapReadsStats> {
    let stats = QuasimapReadsStats::default();
    let progress = ProgressBar::new_spinner();
    progress.set_style(
        ProgressStyle::with_template("{spinner} {pos} reads processed ({per_sec})")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );

    for path in reads_paths {
        info!("Mapping reads from {}", path.as_ref().display());
        handle_read_file(
            path.as_ref(),
            prg_info,
            coverage,
            read_stats,
            seed,
            stop,
            &stats,
            &progress,
        )?;
        if stop.load(Ordering::Relaxed) {
            warn!("Stop requested; mapping interrupted after current buffer");
            break;
        }
    }
    progress.finish_and_clear();
    info!(
        "Processed {} reads: {} mapped, {} skipped",
        stats.all_reads(),
        stats.mapped_reads(),
        stats.skipped_reads()
    );
    Ok(stats)
}

#[allow(clippy::too_many_arguments)]
fn handle_read_file(
    path: &Path,
    prg_info: &PrgInfo,
    coverage: &Coverage,
    read_stats: &mut ReadStats,
    seed: u64,
    stop: &AtomicBool,
    stats: &QuasimapReadsStats,
    progress: &ProgressBar,
) -> WeaverResult<()> {
    let reader = fastq::Reader::from_file(path)
        .map_err(|e| WeaverError::Parse(format!("cannot open {}: {}", path.display(), e)))?;
    let mut records = reader.records();

    loop {
        let mut buffer: Vec<Vec<u8>> = Vec::with_capacity(READS_BUFFER_SIZE);
        for record in records.by_ref().take(READS_BUFFER_SIZE) {
            let record = record
                .map_err(|e| WeaverError::Parse(format!("bad record in {}: {}", path.display(), e)))?;
            read_stats.add_read(record.seq().len(), record.qual());
            buffer.push(record.seq().to_vec());
            progress.inc(1);
        }
        if buffer.is_empty() {
            return Ok(());
        }

        buffer.par_iter().try_for_each(|sequence| {
            stats.all_reads_count.fetch_add(2, Ordering::Relaxed);
            let read = match codec::encode_dna_bases(sequence) {
                Some(read) => read,
                None => {
                    // BadRead: outside {A,C,G,T}, or empty; drop and count
                    stats.skipped_reads_count.fetch_add(2, Ordering::Relaxed);
                    return Ok(());
                }
            };
            quasimap_forward_reverse(&read, prg_info, coverage, seed, stats)
        })?;

        if stop.load(Ordering::Relaxed) {
            return Ok(());
        }
    }
}

/// Maps the read and its reverse complement.
fn quasimap_forward_reverse(
    read: &[Marker],
    prg_info: &PrgInfo,
    coverage: &Coverage,
    seed: u64,
    stats: &QuasimapReadsStats,
) -> WeaverResult<()> {
    for oriented in [read.to_vec(), codec::reverse_complement(read)] {
        if quasimap_read(&oriented, prg_info, coverage, seed)? {
            stats.mapped_reads_count.fetch_add(1, Ordering::Relaxed);
        }
    }
    Ok(())
}

/// Maps one oriented read; returns whether it mapped exactly anywhere.
pub fn quasimap_read(
    read: &[Marker],
    prg_info: &PrgInfo,
    coverage: &Coverage,
    seed: u64,
) -> WeaverResult<bool> {
    let search_states = search_read_backwards(read, prg_info)?;
    if search_states.is_empty() {
        return Ok(false);
    }
    // A fresh generator per read keeps selection independent of thread
    // scheduling and identical across reruns with the same seed
    let mut rng = SeededRandom::new(seed);
    coverage::record_search_states(coverage, &search_states, read.len(), prg_info, &mut rng)?;
    Ok(true)
}
