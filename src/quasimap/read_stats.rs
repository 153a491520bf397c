use std::collections::HashMap;

use crate::prg::codec::{site_index, Marker, MIN_SITE_MARKER};
use crate::prg::coverage_graph::VariantLocus;
use crate::quasimap::coverage::GroupedAlleleCounts;

/// Fallback per-base error probability when no read carries qualities.
const DEFAULT_MEAN_PB_ERROR: f64 = 0.01;

/**
 * Read statistics feeding the genotyping model: the mean per-base error
 * probability from Phred qualities, and, after mapping, the mean and
 * variance of coverage depth over level-0 sites.
 *
 * Coverage is propagated upwards through the parental map during
 * recording, so depth statistics only consider sites that are not nested
 * in any other.
 */
#[derive(Debug, Default, Clone)]
pub struct ReadStats {
    error_sum: f64,
    num_bases_processed: u64,
    max_read_len: usize,
    num_no_qual_reads: u64,

    mean_cov_depth: f64,
    var_cov_depth: f64,
    num_sites_no_cov: usize,
    num_sites_total: usize,
}

impl ReadStats {
    pub fn new() -> Self {
        ReadStats::default()
    }

    /// Accumulates base error probabilities from one record's Phred+33
    /// quality string.
    pub fn add_read(&mut self, sequence_len: usize, qualities: &[u8]) {
        self.max_read_len = self.max_read_len.max(sequence_len);
        if qualities.is_empty() {
            self.num_no_qual_reads += 1;
            return;
        }
        for &q in qualities {
            let phred = q.saturating_sub(33) as f64;
            self.error_sum += 10f64.powf(-phred / 10.0);
        }
        self.num_bases_processed += qualities.len() as u64;
    }

    pub fn mean_pb_error(&self) -> f64 {
        if self.num_bases_processed == 0 {
            return DEFAULT_MEAN_PB_ERROR;
        }
        self.error_sum / self.num_bases_processed as f64
    }

    /// Mean and variance of per-site coverage over level-0 sites, from the
    /// grouped allele counts. Must run after mapping completes.
    pub fn compute_coverage_depth(
        &mut self,
        grouped_counts: &[GroupedAlleleCounts],
        par_map: &HashMap<Marker, VariantLocus>,
    ) {
        let mut depths = Vec::new();
        let mut num_no_cov = 0;
        for (slot, site_counts) in grouped_counts.iter().enumerate() {
            let site_id = MIN_SITE_MARKER + 2 * slot as Marker;
            debug_assert_eq!(site_index(site_id), slot);
            if par_map.contains_key(&site_id) {
                continue;
            }
            let total: u64 = site_counts.values().sum();
            if total == 0 {
                num_no_cov += 1;
            }
            depths.push(total as f64);
        }

        self.num_sites_total = depths.len();
        self.num_sites_no_cov = num_no_cov;
        if depths.is_empty() {
            return;
        }
        let mean = depths.iter().sum::<f64>() / depths.len() as f64;
        let variance =
            depths.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / depths.len() as f64;
        self.mean_cov_depth = mean;
        self.var_cov_depth = variance;
    }

    pub fn mean_cov_depth(&self) -> f64 {
        self.mean_cov_depth
    }

    pub fn var_cov_depth(&self) -> f64 {
        self.var_cov_depth
    }

    pub fn num_bases_processed(&self) -> u64 {
        self.num_bases_processed
    }

    pub fn max_read_len(&self) -> usize {
        self.max_read_len
    }

    pub fn num_no_qual_reads(&self) -> u64 {
        self.num_no_qual_reads
    }

    pub fn num_sites_no_cov(&self) -> usize {
        self.num_sites_no_cov
    }

    pub fn num_sites_total(&self) -> usize {
        self.num_sites_total
    }
}
