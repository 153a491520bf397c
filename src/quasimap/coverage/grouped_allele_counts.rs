use itertools::Itertools;

use crate::prg::codec::{site_index, AlleleId, Marker};
use crate::quasimap::coverage::selector::SelectedMapping;
use crate::quasimap::coverage::Coverage;

/**
 * Records allele group counts per site: the read contributes once to the
 * entry keyed by exactly the set of alleles it was compatible with.
 * Single alleles also get registered as groups.
 */
pub fn record(coverage: &Coverage, selected: &SelectedMapping) {
    let by_site = selected
        .loci
        .iter()
        .group_by(|locus| locus.site);
    for (site, loci) in &by_site {
        let group: Vec<AlleleId> = loci.map(|l| l.allele).collect();
        record_group(coverage, site, group);
    }
}

fn record_group(coverage: &Coverage, site: Marker, mut group: Vec<AlleleId>) {
    group.sort_unstable();
    group.dedup();
    let mut site_counts = coverage.grouped_allele_counts[site_index(site)]
        .lock()
        .unwrap();
    *site_counts.entry(group).or_insert(0) += 1;
}
