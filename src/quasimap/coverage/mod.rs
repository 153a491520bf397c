pub mod allele_base;
pub mod allele_sum;
pub mod grouped_allele_counts;
pub mod selector;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use crate::prg::codec::{AlleleId, Marker, MIN_SITE_MARKER};
use crate::prg::PrgInfo;
use crate::quasimap::search::SearchStates;
use crate::utils::errors::WeaverResult;

use selector::{MappingInstanceSelector, RandomInclusiveInt};

/// Sorted set of allele IDs a read was compatible with at one site.
pub type AlleleGroup = Vec<AlleleId>;

/// Per-site multiset of allele groups.
pub type GroupedAlleleCounts = HashMap<AlleleGroup, u64>;

/**
 * The two coverage structures updated from worker threads. Per-base
 * coverage lives on the coverage graph nodes themselves.
 *
 * Allele-sum counters are atomic; the grouped-count hash maps take a
 * per-site lock. Both updates commute, so thread interleaving cannot
 * change the final counts.
 */
pub struct Coverage {
    pub allele_sum_coverage: Vec<Vec<AtomicU32>>,
    pub grouped_allele_counts: Vec<Mutex<GroupedAlleleCounts>>,
}

impl Coverage {
    /// One slot per site, one allele-sum counter per haplogroup.
    pub fn empty_structure(prg_info: &PrgInfo) -> Coverage {
        let num_slots = prg_info.prg.num_site_slots();
        let graph = &prg_info.coverage_graph;
        let mut allele_sum_coverage = Vec::with_capacity(num_slots);
        let mut grouped_allele_counts = Vec::with_capacity(num_slots);
        for slot in 0..num_slots {
            let site_id = MIN_SITE_MARKER + 2 * slot as Marker;
            let num_alleles = match graph.bubble_nodes(site_id) {
                Some((start, _)) => graph.node(start).edges().len(),
                None => 0,
            };
            allele_sum_coverage.push((0..num_alleles).map(|_| AtomicU32::new(0)).collect());
            grouped_allele_counts.push(Mutex::new(GroupedAlleleCounts::new()));
        }
        Coverage {
            allele_sum_coverage,
            grouped_allele_counts,
        }
    }

    pub fn allele_sum_counts(&self) -> Vec<Vec<u32>> {
        self.allele_sum_coverage
            .iter()
            .map(|site| site.iter().map(|c| c.load(Ordering::Relaxed)).collect())
            .collect()
    }

    /// Immutable snapshot for the genotyper.
    pub fn grouped_counts_snapshot(&self) -> Vec<GroupedAlleleCounts> {
        self.grouped_allele_counts
            .iter()
            .map(|site| site.lock().unwrap().clone())
            .collect()
    }
}

/**
 * Selects one mapping of the read among its equivalence classes and
 * records all three coverage types for the selection.
 */
pub fn record_search_states<R: RandomInclusiveInt>(
    coverage: &Coverage,
    search_states: &SearchStates,
    read_length: usize,
    prg_info: &PrgInfo,
    rng: &mut R,
) -> WeaverResult<()> {
    let selected =
        MappingInstanceSelector::select(search_states, read_length, prg_info, rng)?;
    allele_sum::record(coverage, &selected);
    grouped_allele_counts::record(coverage, &selected);
    allele_base::record(prg_info, &selected.states, read_length);
    Ok(())
}
