use std::collections::HashMap;

use crate::genotype::allele_extracter::AlleleExtracter;
use crate::genotype::gcp::{self, Percentiler};
use crate::genotype::genotyped_site::{GenotypedSite, SiteFilter};
use crate::genotype::model::{LevelGenotyperModel, ModelData};
use crate::genotype::probabilities::LikelihoodStats;
use crate::genotype::Ploidy;
use crate::prg::codec::{site_index, AlleleId, Marker};
use crate::prg::PrgInfo;
use crate::quasimap::coverage::GroupedAlleleCounts;
use crate::quasimap::read_stats::ReadStats;
use crate::utils::errors::{WeaverError, WeaverResult};

/**
 * Genotypes every bubble of the PRG, most nested first, so that allele
 * extraction of a parent can paste the calls of its children. After a
 * parent's call, nested sites on excluded haplogroups are invalidated, and
 * ambiguity filters travel down and up the nesting tree.
 */
pub struct LevelGenotyper {
    ploidy: Ploidy,
    l_stats: LikelihoodStats,
    child_map: HashMap<Marker, HashMap<AlleleId, Vec<Marker>>>,
    genotyped_records: Vec<Option<GenotypedSite>>,
}

impl LevelGenotyper {
    pub fn genotype(
        prg_info: &PrgInfo,
        grouped_counts: &[GroupedAlleleCounts],
        read_stats: &ReadStats,
        ploidy: Ploidy,
        run_gcp: bool,
    ) -> WeaverResult<Vec<Option<GenotypedSite>>> {
        let l_stats = LikelihoodStats::make(
            read_stats.mean_cov_depth(),
            read_stats.var_cov_depth(),
            read_stats.mean_pb_error(),
        );
        let mut genotyper = LevelGenotyper {
            ploidy,
            l_stats,
            child_map: prg_info.coverage_graph.child_map.clone(),
            genotyped_records: vec![None; prg_info.prg.num_site_slots()],
        };
        genotyper.genotype_all_bubbles(prg_info, grouped_counts)?;
        if run_gcp {
            genotyper.add_percentiles();
        }
        Ok(genotyper.genotyped_records)
    }

    fn genotype_all_bubbles(
        &mut self,
        prg_info: &PrgInfo,
        grouped_counts: &[GroupedAlleleCounts],
    ) -> WeaverResult<()> {
        let graph = &prg_info.coverage_graph;
        for &site_id in &graph.bubble_order {
            let (site_start, site_end) = graph.bubble_nodes(site_id).ok_or_else(|| {
                WeaverError::InternalInvariant(format!("site {} missing from bubble map", site_id))
            })?;
            let slot = site_index(site_id);

            let extracter =
                AlleleExtracter::extract(site_start, site_end, graph, &self.genotyped_records)?;
            let ignore_ref_allele = !extracter.ref_made_naturally();
            let data = ModelData {
                input_alleles: extracter.into_alleles(),
                gp_counts: &grouped_counts[slot],
                ploidy: self.ploidy,
                l_stats: &self.l_stats,
                ignore_ref_allele,
            };
            let mut site = LevelGenotyperModel::genotype(data)?;
            site.site_id = site_id;
            site.pos = graph.node(site_start).pos();
            site.site_end_node = site_end;
            // Invalidation needs the full haplogroup fan-out even for null
            // sites
            site.num_haplogroups = graph.node(site_start).edges().len();
            self.genotyped_records[slot] = Some(site);

            self.run_invalidation_process(site_id)?;
            self.propagate_ambiguity(site_id);
        }
        Ok(())
    }

    /// Marks every site nested under a non-genotyped haplogroup of the
    /// called site as null; already-null children short-circuit.
    fn run_invalidation_process(&mut self, site_id: Marker) -> WeaverResult<()> {
        if !self.child_map.contains_key(&site_id) {
            return Ok(());
        }
        let site = self.record(site_id)?;
        if site.is_null() {
            return Ok(());
        }
        let candidates = site.non_genotyped_haplogroups();
        let to_invalidate = self.haplogroups_with_sites(site_id, &candidates);
        self.invalidate_if_needed(site_id, to_invalidate)
    }

    fn haplogroups_with_sites(&self, site_id: Marker, candidates: &[AlleleId]) -> Vec<AlleleId> {
        match self.child_map.get(&site_id) {
            Some(haplo_map) => candidates
                .iter()
                .copied()
                .filter(|h| haplo_map.contains_key(h))
                .collect(),
            None => Vec::new(),
        }
    }

    fn invalidate_if_needed(
        &mut self,
        parent_site_id: Marker,
        haplogroups: Vec<AlleleId>,
    ) -> WeaverResult<()> {
        let mut to_process: Vec<(Marker, AlleleId)> =
            haplogroups.into_iter().map(|h| (parent_site_id, h)).collect();

        while let Some((site, haplogroup)) = to_process.pop() {
            let children = self.child_map[&site][&haplogroup].clone();
            for child in children {
                let record = self
                    .genotyped_records
                    .get_mut(site_index(child))
                    .and_then(|r| r.as_mut())
                    .ok_or_else(|| {
                        WeaverError::InternalInvariant(format!(
                            "invalidating site {} before it was genotyped",
                            child
                        ))
                    })?;
                if record.is_null() {
                    continue;
                }
                record.make_null();
                let all_haplogroups = record.all_haplogroups();
                for h in self.haplogroups_with_sites(child, &all_haplogroups) {
                    to_process.push((child, h));
                }
            }
        }
        Ok(())
    }

    /// AMBIG travels down to every nested child, and up from a flagged
    /// child to its ancestors. Parents are genotyped after children, so one
    /// pass per site suffices.
    fn propagate_ambiguity(&mut self, site_id: Marker) {
        let flagged = self
            .record(site_id)
            .map(|s| s.has_filter(SiteFilter::Ambig))
            .unwrap_or(false);
        if flagged {
            self.downpropagate_filter(SiteFilter::Ambig, site_id);
        } else if self.any_descendant_has_filter(SiteFilter::Ambig, site_id) {
            if let Some(record) = self.genotyped_records[site_index(site_id)].as_mut() {
                record.set_filter(SiteFilter::Ambig);
            }
        }
    }

    fn downpropagate_filter(&mut self, filter: SiteFilter, parent_site_id: Marker) {
        let mut to_process = vec![parent_site_id];
        while let Some(site) = to_process.pop() {
            let Some(haplo_map) = self.child_map.get(&site) else {
                continue;
            };
            let children: Vec<Marker> = haplo_map.values().flatten().copied().collect();
            for child in children {
                if let Some(record) = self.genotyped_records[site_index(child)].as_mut() {
                    if !record.has_filter(filter) {
                        record.set_filter(filter);
                        to_process.push(child);
                    }
                }
            }
        }
    }

    fn any_descendant_has_filter(&self, filter: SiteFilter, site_id: Marker) -> bool {
        let mut to_process = vec![site_id];
        while let Some(site) = to_process.pop() {
            let Some(haplo_map) = self.child_map.get(&site) else {
                continue;
            };
            for child in haplo_map.values().flatten() {
                if let Some(record) = self.genotyped_records[site_index(*child)].as_ref() {
                    if record.has_filter(filter) {
                        return true;
                    }
                }
                to_process.push(*child);
            }
        }
        false
    }

    /// After all sites are genotyped, turns raw confidences into
    /// percentiles, topping up with simulated confidences when the PRG has
    /// few sites. Skipped with a warning when even simulation cannot
    /// provide two confidences.
    fn add_percentiles(&mut self) {
        let confidences =
            gcp::gtconf_distribution(&self.genotyped_records, &self.l_stats, self.ploidy);
        match Percentiler::new(&confidences) {
            Ok(percentiler) => {
                for record in self.genotyped_records.iter_mut().flatten() {
                    record.gt_conf_percentile =
                        Some(percentiler.confidence_percentile(record.gt_conf));
                }
            }
            Err(e) => warn!("Skipping confidence percentiles: {}", e),
        }
    }

    fn record(&self, site_id: Marker) -> WeaverResult<&GenotypedSite> {
        self.genotyped_records
            .get(site_index(site_id))
            .and_then(|r| r.as_ref())
            .ok_or_else(|| {
                WeaverError::InternalInvariant(format!("site {} has no genotyping record", site_id))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prg::codec::parse_bracketed_prg;
    use crate::prg::coverage_graph::{build_child_map, VariantLocus};
    use crate::prg::prg_string::PrgString;

    fn empty_genotyper(par_entries: &[(Marker, VariantLocus)], num_slots: usize) -> LevelGenotyper {
        let par_map: HashMap<Marker, VariantLocus> = par_entries.iter().cloned().collect();
        LevelGenotyper {
            ploidy: Ploidy::Haploid,
            l_stats: LikelihoodStats::make(20.0, 10.0, 0.1),
            child_map: build_child_map(&par_map),
            genotyped_records: (0..num_slots)
                .map(|_| {
                    let mut site = GenotypedSite::new();
                    site.genotype = Some(vec![0]);
                    site.num_haplogroups = 5;
                    Some(site)
                })
                .collect(),
        }
    }

    #[test]
    fn haplogroups_with_sites_filters_candidates() {
        // Sites 7, 9, 11 nested in site 5: haplogroups 0 and 1
        let genotyper = empty_genotyper(
            &[
                (7, VariantLocus::new(5, 0)),
                (9, VariantLocus::new(5, 1)),
                (11, VariantLocus::new(5, 1)),
            ],
            4,
        );
        assert_eq!(genotyper.haplogroups_with_sites(5, &[0, 1, 2, 3]), vec![0, 1]);
        assert_eq!(genotyper.haplogroups_with_sites(7, &[0, 1, 2, 3]), Vec::<AlleleId>::new());
    }

    #[test]
    fn invalidation_recurses_and_short_circuits() {
        // Site 9 nested in site 7 (haplogroup 1), site 7 in site 5
        // (haplogroup 0)
        let mut genotyper = empty_genotyper(
            &[(7, VariantLocus::new(5, 0)), (9, VariantLocus::new(7, 1))],
            3,
        );

        genotyper.invalidate_if_needed(7, vec![1]).unwrap();
        assert!(genotyper.genotyped_records[2].as_ref().unwrap().is_null());
        assert!(!genotyper.genotyped_records[1].as_ref().unwrap().is_null());

        // Nulling site 7 must not trip over already-null site 9
        genotyper.invalidate_if_needed(5, vec![0]).unwrap();
        assert!(genotyper.genotyped_records[1].as_ref().unwrap().is_null());
    }

    #[test]
    fn filter_propagates_down() {
        let mut genotyper = empty_genotyper(
            &[(7, VariantLocus::new(5, 0)), (9, VariantLocus::new(7, 1))],
            3,
        );
        genotyper.downpropagate_filter(SiteFilter::Ambig, 5);
        assert!(genotyper.genotyped_records[1].as_ref().unwrap().has_filter(SiteFilter::Ambig));
        assert!(genotyper.genotyped_records[2].as_ref().unwrap().has_filter(SiteFilter::Ambig));
    }

    #[test]
    fn filter_propagates_up() {
        let mut genotyper = empty_genotyper(
            &[(7, VariantLocus::new(5, 0)), (9, VariantLocus::new(7, 1))],
            3,
        );
        genotyper.genotyped_records[1]
            .as_mut()
            .unwrap()
            .set_filter(SiteFilter::Ambig);
        genotyper.propagate_ambiguity(5);
        assert!(genotyper.genotyped_records[0].as_ref().unwrap().has_filter(SiteFilter::Ambig));
    }

    #[test]
    fn records_are_indexed_by_site() {
        let prg = PrgString::new(parse_bracketed_prg("A[C,G]T[A,T]").unwrap()).unwrap();
        let info = PrgInfo::from_prg_string(prg).unwrap();
        let grouped = vec![GroupedAlleleCounts::new(), GroupedAlleleCounts::new()];
        let stats = ReadStats::new();
        let records =
            LevelGenotyper::genotype(&info, &grouped, &stats, Ploidy::Haploid, false).unwrap();
        assert_eq!(records.len(), 2);
        for record in records.iter().flatten() {
            // No coverage anywhere: everything is null
            assert!(record.is_null());
            assert_eq!(record.gt_conf, 0.0);
        }
        assert_eq!(records[0].as_ref().unwrap().site_id, 5);
        assert_eq!(records[1].as_ref().unwrap().site_id, 7);
    }
}
