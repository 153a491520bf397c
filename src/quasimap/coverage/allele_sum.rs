use std::sync::atomic::Ordering;

use crate::prg::codec::site_index;
use crate::quasimap::coverage::selector::SelectedMapping;
use crate::quasimap::coverage::Coverage;

/// One unit of coverage per locus the selected mapping is compatible with.
pub fn record(coverage: &Coverage, selected: &SelectedMapping) {
    for locus in &selected.loci {
        let site = site_index(locus.site);
        coverage.allele_sum_coverage[site][locus.allele as usize].fetch_add(1, Ordering::Relaxed);
    }
}
