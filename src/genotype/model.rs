use std::collections::HashMap;

use ordered_float::OrderedFloat;

use crate::genotype::alleles::Allele;
use crate::genotype::genotyped_site::{GenotypedSite, GtypedIndices, SiteFilter};
use crate::genotype::probabilities::LikelihoodStats;
use crate::genotype::Ploidy;
use crate::prg::codec::AlleleId;
use crate::quasimap::coverage::GroupedAlleleCounts;
use crate::utils::errors::{WeaverError, WeaverResult};

/// Confidence below which a call is flagged ambiguous and its runner-up
/// alleles get exported for parent extraction.
pub const GT_CONF_AMBIGUOUS: f64 = 5.0;

/// Haplogroups with more than one candidate allele (a consequence of
/// nesting); their shared coverage gets halved.
pub type Multiplicities = Vec<bool>;

pub struct ModelData<'a> {
    pub input_alleles: Vec<Allele>,
    pub gp_counts: &'a GroupedAlleleCounts,
    pub ploidy: Ploidy,
    pub l_stats: &'a LikelihoodStats,
    /// True when the REF allele was not produced naturally; it is then
    /// excluded from genotyping but still reported.
    pub ignore_ref_allele: bool,
}

/**
 * Genotyping model over one bubble, using coverage equivalence classes,
 * alternative alleles all at the same nesting level, and genotype
 * confidence as a likelihood ratio.
 */
pub struct LevelGenotyperModel {
    haploid_allele_coverages: Vec<u64>,
    singleton_allele_coverages: Vec<u64>,
    computed_coverages: HashMap<Vec<AlleleId>, Vec<f64>>,
    total_coverage: u64,
    likelihoods: Vec<(f64, GtypedIndices)>,
}

impl LevelGenotyperModel {
    pub(crate) fn new() -> Self {
        LevelGenotyperModel {
            haploid_allele_coverages: Vec::new(),
            singleton_allele_coverages: Vec::new(),
            computed_coverages: HashMap::new(),
            total_coverage: 0,
            likelihoods: Vec::new(),
        }
    }

    /// Runs the model, producing a genotyped site with the runner-supplied
    /// fields (site ID, position, end node) left at their defaults.
    pub fn genotype(data: ModelData) -> WeaverResult<GenotypedSite> {
        if data.input_alleles.len() < 2 {
            return Err(WeaverError::InternalInvariant(
                "genotyping a bubble with fewer than two candidate alleles".to_string(),
            ));
        }
        let mut model = LevelGenotyperModel::new();
        let mut site = GenotypedSite::new();
        model.total_coverage = count_total_coverage(data.gp_counts);

        if model.total_coverage == 0 || data.l_stats.mean_cov_depth == 0.0 {
            site.alleles = vec![data.input_alleles[0].clone()];
            site.genotype = None;
            site.gt_conf = 0.0;
            site.set_filter(SiteFilter::MissingDepth);
            return Ok(site);
        }

        // Dropping REF must leave at least two candidates to rank
        let ignore_ref = data.ignore_ref_allele && data.input_alleles.len() > 2;
        let mut used_alleles: Vec<Allele> = if ignore_ref {
            data.input_alleles[1..].to_vec()
        } else {
            data.input_alleles.clone()
        };

        let multiplicities = get_haplogroup_multiplicities(&used_alleles);
        site.num_haplogroups = multiplicities.len();
        model.set_haploid_coverages(data.gp_counts, multiplicities.len());
        model.assign_coverage_to_empty_alleles(&mut used_alleles);

        match data.ploidy {
            Ploidy::Haploid => model.compute_haploid_log_likelihoods(&used_alleles, data.l_stats),
            Ploidy::Diploid => {
                model.compute_homozygous_log_likelihoods(
                    &used_alleles,
                    data.gp_counts,
                    &multiplicities,
                    data.l_stats,
                );
                model.compute_heterozygous_log_likelihoods(
                    &used_alleles,
                    data.gp_counts,
                    &multiplicities,
                    data.l_stats,
                );
            }
        }

        model.call_genotype(&data, ignore_ref, &multiplicities, &mut site)?;
        Ok(site)
    }

    pub(crate) fn set_haploid_coverages(
        &mut self,
        gp_counts: &GroupedAlleleCounts,
        num_haplogroups: usize,
    ) {
        let width = num_haplogroups.max(
            gp_counts
                .keys()
                .flat_map(|group| group.iter())
                .map(|&id| id as usize + 1)
                .max()
                .unwrap_or(0),
        );
        self.haploid_allele_coverages = vec![0; width];
        self.singleton_allele_coverages = vec![0; width];
        for (group, &count) in gp_counts {
            for &allele_id in group {
                self.haploid_allele_coverages[allele_id as usize] += count;
            }
            if group.len() == 1 {
                self.singleton_allele_coverages[group[0] as usize] = count;
            }
        }
    }

    /// Direct deletions have no bases to carry coverage; they get the
    /// haplogroup's grouped coverage as a single pseudo-base.
    pub(crate) fn assign_coverage_to_empty_alleles(&self, alleles: &mut [Allele]) {
        for allele in alleles.iter_mut() {
            if allele.sequence.is_empty() {
                allele.pb_cov = vec![self.haploid_allele_coverages[allele.haplogroup as usize]];
            }
        }
    }

    /**
     * Coverage of a diploid genotype. Shared coverage between two distinct
     * haplogroups is split proportionally to their specific coverages
     * (equally when both are zero); alleles on the same haplogroup halve
     * its coverage when the haplogroup carries several candidates.
     */
    pub(crate) fn compute_diploid_coverage(
        &mut self,
        gp_counts: &GroupedAlleleCounts,
        ids: &[AlleleId],
        multiplicities: &Multiplicities,
    ) -> (f64, f64) {
        debug_assert_eq!(ids.len(), 2);
        let mut ids = ids.to_vec();
        ids.sort_unstable();

        if let Some(known) = self.computed_coverages.get(&ids) {
            return match known.len() {
                1 => (known[0], known[0]),
                _ => (known[0], known[1]),
            };
        }
        if ids[0] == ids[1] {
            self.diploid_cov_same_haplogroup(&ids, multiplicities)
        } else {
            self.diploid_cov_different_haplogroup(gp_counts, &ids, multiplicities)
        }
    }

    fn diploid_cov_same_haplogroup(
        &mut self,
        ids: &[AlleleId],
        multiplicities: &Multiplicities,
    ) -> (f64, f64) {
        let haplogroup = ids[0] as usize;
        let mut cov = self.haploid_allele_coverages[haplogroup] as f64;
        if multiplicities.get(haplogroup).copied().unwrap_or(false) {
            cov /= 2.0;
            self.computed_coverages.insert(ids.to_vec(), vec![cov, cov]);
        } else {
            // Homozygous coverage is reported once only
            self.computed_coverages.insert(ids.to_vec(), vec![cov]);
        }
        (cov, cov)
    }

    fn diploid_cov_different_haplogroup(
        &mut self,
        gp_counts: &GroupedAlleleCounts,
        ids: &[AlleleId],
        multiplicities: &Multiplicities,
    ) -> (f64, f64) {
        let (first, second) = (ids[0], ids[1]);
        let mut first_cov = self.haploid_allele_coverages[first as usize] as f64;
        let mut second_cov = self.haploid_allele_coverages[second as usize] as f64;

        let mut shared: u64 = 0;
        for (group, &count) in gp_counts {
            if group.contains(&first) && group.contains(&second) {
                shared += count;
            }
        }
        let shared = shared as f64;
        let first_specific = first_cov - shared;
        let second_specific = second_cov - shared;

        let first_belonging = if first_specific == 0.0 && second_specific == 0.0 {
            0.5
        } else {
            first_specific / (first_specific + second_specific)
        };
        first_cov -= (1.0 - first_belonging) * shared;
        second_cov -= first_belonging * shared;

        if multiplicities.get(first as usize).copied().unwrap_or(false) {
            first_cov /= 2.0;
        }
        if multiplicities.get(second as usize).copied().unwrap_or(false) {
            second_cov /= 2.0;
        }
        self.computed_coverages
            .insert(ids.to_vec(), vec![first_cov, second_cov]);
        (first_cov, second_cov)
    }

    pub(crate) fn count_credible_positions(credible_cov_t: u64, allele: &Allele) -> usize {
        allele.pb_cov.iter().filter(|&&c| c >= credible_cov_t).count()
    }

    fn frac_non_error_positions(credible_cov_t: u64, allele: &Allele) -> f64 {
        if allele.pb_cov.is_empty() {
            return 0.0;
        }
        Self::count_credible_positions(credible_cov_t, allele) as f64 / allele.pb_cov.len() as f64
    }

    pub(crate) fn compute_haploid_log_likelihoods(
        &mut self,
        alleles: &[Allele],
        l_stats: &LikelihoodStats,
    ) {
        for (index, allele) in alleles.iter().enumerate() {
            let cov_on_allele = self.haploid_allele_coverages[allele.haplogroup as usize] as f64;
            let cov_not_on_allele = self.total_coverage as f64 - cov_on_allele;
            let frac = Self::frac_non_error_positions(l_stats.credible_cov_t, allele);

            let log_likelihood = l_stats.pmf_full_depth.log_pmf(cov_on_allele)
                + l_stats.log_mean_pb_error * cov_not_on_allele
                + frac * l_stats.log_no_zero
                + (1.0 - frac) * l_stats.log_zero;
            self.likelihoods.push((log_likelihood, vec![index]));
        }
    }

    pub(crate) fn compute_homozygous_log_likelihoods(
        &mut self,
        alleles: &[Allele],
        gp_counts: &GroupedAlleleCounts,
        multiplicities: &Multiplicities,
        l_stats: &LikelihoodStats,
    ) {
        for (index, allele) in alleles.iter().enumerate() {
            let ids = vec![allele.haplogroup, allele.haplogroup];
            let (cov_on_allele, _) = self.compute_diploid_coverage(gp_counts, &ids, multiplicities);
            let cov_not_on_allele = self.total_coverage as f64 - cov_on_allele;
            let frac = Self::frac_non_error_positions(l_stats.credible_cov_t, allele);

            // Half-depth PMF evaluated twice on half the coverage
            let log_likelihood = 2.0 * l_stats.pmf_half_depth.log_pmf(cov_on_allele / 2.0)
                + l_stats.log_mean_pb_error * cov_not_on_allele
                + frac * l_stats.log_no_zero
                + (1.0 - frac) * l_stats.log_zero;
            self.likelihoods.push((log_likelihood, vec![index, index]));
        }
    }

    /**
     * Heterozygous genotypes are only considered for allele pairs that
     * each carry at least one unit of singleton coverage; this bounds the
     * quadratic number of pairs on high-arity sites.
     */
    pub(crate) fn compute_heterozygous_log_likelihoods(
        &mut self,
        alleles: &[Allele],
        gp_counts: &GroupedAlleleCounts,
        multiplicities: &Multiplicities,
        l_stats: &LikelihoodStats,
    ) {
        let selected: Vec<usize> = alleles
            .iter()
            .enumerate()
            .filter(|(_, a)| self.singleton_allele_coverages[a.haplogroup as usize] != 0)
            .map(|(i, _)| i)
            .collect();
        if selected.len() < 2 {
            return;
        }

        for (slot, &first_index) in selected.iter().enumerate() {
            for &second_index in &selected[slot + 1..] {
                let first_allele = &alleles[first_index];
                let second_allele = &alleles[second_index];
                let ids = vec![first_allele.haplogroup, second_allele.haplogroup];
                let (first_cov, second_cov) =
                    self.compute_diploid_coverage(gp_counts, &ids, multiplicities);

                let first_frac = Self::frac_non_error_positions(l_stats.credible_cov_t, first_allele);
                let second_frac =
                    Self::frac_non_error_positions(l_stats.credible_cov_t, second_allele);

                let log_likelihood = l_stats.pmf_half_depth.log_pmf(first_cov)
                    + l_stats.pmf_half_depth.log_pmf(second_cov)
                    + (self.total_coverage as f64 - first_cov - second_cov)
                        * l_stats.log_mean_pb_error
                    + (first_frac + second_frac) * l_stats.log_no_zero_half_depth
                    + (2.0 - first_frac - second_frac) * l_stats.log_zero_half_depth;
                self.likelihoods
                    .push((log_likelihood, vec![first_index, second_index]));
            }
        }
    }

    fn call_genotype(
        &mut self,
        data: &ModelData,
        ignore_ref: bool,
        multiplicities: &Multiplicities,
        site: &mut GenotypedSite,
    ) -> WeaverResult<()> {
        self.likelihoods.sort_by(|a, b| {
            OrderedFloat(b.0)
                .cmp(&OrderedFloat(a.0))
                .then_with(|| a.1.cmp(&b.1))
        });
        if self.likelihoods.len() < 2 {
            return Err(WeaverError::InternalInvariant(
                "fewer than two candidate genotypes; no likelihood ratio".to_string(),
            ));
        }
        let best = self.likelihoods[0].clone();
        let second = self.likelihoods[1].clone();
        let gt_confidence = best.0 - second.0;

        let offset = usize::from(ignore_ref);
        let chosen_gt: GtypedIndices = best.1.iter().map(|g| g + offset).collect();
        let chosen_haplotypes = get_haplogroups(&data.input_alleles, &chosen_gt);

        let mut chosen_alleles = unique_alleles(&data.input_alleles, &chosen_gt);
        let mut allele_covs = match data.ploidy {
            Ploidy::Haploid => {
                vec![self.haploid_allele_coverages[chosen_haplotypes[0] as usize] as f64]
            }
            Ploidy::Diploid => self
                .computed_coverages
                .get(&chosen_haplotypes)
                .cloned()
                .unwrap_or_default(),
        };

        let rescaled_gt = rescale_genotypes(&chosen_gt);

        // The REF allele always makes it into the output set
        if rescaled_gt[0] != 0 {
            chosen_alleles.insert(0, data.input_alleles[0].clone());
            let mut ref_cov = self.singleton_allele_coverages[0] as f64;
            if multiplicities.first().copied().unwrap_or(false) {
                ref_cov /= 2.0;
            }
            allele_covs.insert(0, ref_cov);
        }

        site.alleles = chosen_alleles;
        site.genotype = Some(rescaled_gt);
        site.allele_covs = allele_covs;
        site.total_coverage = self.total_coverage;
        site.genotyped_haplogroups = chosen_haplotypes;
        site.gt_conf = gt_confidence;

        let extremely_low_coverage =
            (self.total_coverage as f64) * 10.0 < data.l_stats.mean_cov_depth;
        if gt_confidence < GT_CONF_AMBIGUOUS || extremely_low_coverage {
            site.set_filter(SiteFilter::Ambig);
            let runner_up: GtypedIndices = second.1.iter().map(|g| g + offset).collect();
            let mut extras = Vec::new();
            for allele in unique_alleles(&data.input_alleles, &runner_up) {
                let already_reported = site.alleles.iter().any(|a| a.sequence == allele.sequence);
                if !already_reported {
                    let mut extra = allele;
                    extra.callable = false;
                    extras.push(extra);
                }
            }
            if !extras.is_empty() {
                site.extra_alleles = Some(extras);
            }
        }
        Ok(())
    }

    pub(crate) fn haploid_covs(&self) -> &[u64] {
        &self.haploid_allele_coverages
    }

    pub(crate) fn singleton_covs(&self) -> &[u64] {
        &self.singleton_allele_coverages
    }

    pub(crate) fn likelihoods(&self) -> &[(f64, GtypedIndices)] {
        &self.likelihoods
    }
}

pub(crate) fn count_total_coverage(gp_counts: &GroupedAlleleCounts) -> u64 {
    gp_counts.values().sum()
}

/// True at the haplogroups carrying more than one candidate allele.
pub(crate) fn get_haplogroup_multiplicities(alleles: &[Allele]) -> Multiplicities {
    let width = alleles
        .iter()
        .map(|a| a.haplogroup as usize + 1)
        .max()
        .unwrap_or(0);
    let mut counts = vec![0usize; width];
    for allele in alleles {
        counts[allele.haplogroup as usize] += 1;
    }
    counts.into_iter().map(|c| c > 1).collect()
}

fn get_haplogroups(alleles: &[Allele], genotype: &[usize]) -> Vec<AlleleId> {
    let mut haplogroups: Vec<AlleleId> =
        genotype.iter().map(|&g| alleles[g].haplogroup).collect();
    haplogroups.sort_unstable();
    haplogroups
}

fn unique_alleles(alleles: &[Allele], genotype: &[usize]) -> Vec<Allele> {
    let mut distinct: Vec<usize> = genotype.to_vec();
    distinct.sort_unstable();
    distinct.dedup();
    distinct.into_iter().map(|g| alleles[g].clone()).collect()
}

/**
 * Expresses genotype indices relative to the reported alleles: REF stays
 * 0, other called alleles are renumbered in first-seen order.
 */
pub(crate) fn rescale_genotypes(genotypes: &[usize]) -> GtypedIndices {
    let mut rescaler: HashMap<usize, usize> = HashMap::from([(0, 0)]);
    let mut next_index = 1;
    let mut rescaled = Vec::with_capacity(genotypes.len());
    for &gt in genotypes {
        let entry = *rescaler.entry(gt).or_insert_with(|| {
            let assigned = next_index;
            next_index += 1;
            assigned
        });
        rescaled.push(entry);
    }
    rescaled
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn gp(entries: &[(&[AlleleId], u64)]) -> GroupedAlleleCounts {
        entries
            .iter()
            .map(|(group, count)| (group.to_vec(), *count))
            .collect()
    }

    #[test]
    fn haploid_coverages_from_singleton_classes() {
        let gp_covs = gp(&[(&[0], 5), (&[1], 10), (&[3], 1)]);
        let mut model = LevelGenotyperModel::new();
        model.set_haploid_coverages(&gp_covs, 4);
        assert_eq!(model.haploid_covs(), &[5, 10, 0, 1]);
        assert_eq!(model.singleton_covs(), &[5, 10, 0, 1]);
    }

    #[test]
    fn haploid_coverages_from_multi_allelic_classes() {
        let gp_covs = gp(&[(&[0], 5), (&[0, 1], 4), (&[1], 10), (&[2, 3], 1)]);
        let mut model = LevelGenotyperModel::new();
        model.set_haploid_coverages(&gp_covs, 4);
        assert_eq!(model.haploid_covs(), &[9, 14, 1, 1]);
        assert_eq!(model.singleton_covs(), &[5, 10, 0, 0]);
    }

    #[test]
    fn diploid_coverages_dispatch_shared_in_specific_ratio() {
        // 10 units specific to 0, 20 specific to 1, 4 shared: dispatched 1:2
        let gp_covs = gp(&[(&[0], 7), (&[0, 1], 4), (&[1], 20), (&[0, 3], 3), (&[2, 3], 1)]);
        let mut model = LevelGenotyperModel::new();
        model.set_haploid_coverages(&gp_covs, 4);
        let multiplicities = vec![false; 4];
        let (first, second) = model.compute_diploid_coverage(&gp_covs, &[0, 1], &multiplicities);
        assert_relative_eq!(first, 10.0 + 4.0 / 3.0, max_relative = 1e-9);
        assert_relative_eq!(second, 20.0 + 8.0 / 3.0, max_relative = 1e-9);
    }

    #[test]
    fn diploid_coverages_split_equally_without_specific_coverage() {
        let gp_covs = gp(&[(&[0, 1], 3), (&[2, 3], 1)]);
        let mut model = LevelGenotyperModel::new();
        model.set_haploid_coverages(&gp_covs, 4);
        let multiplicities = vec![false; 4];
        let (first, second) = model.compute_diploid_coverage(&gp_covs, &[0, 1], &multiplicities);
        assert_relative_eq!(first, 1.5);
        assert_relative_eq!(second, 1.5);
    }

    #[test]
    fn diploid_coverages_with_one_dominating_haplogroup() {
        let gp_covs = gp(&[(&[0], 8), (&[0, 1], 4)]);
        let mut model = LevelGenotyperModel::new();
        model.set_haploid_coverages(&gp_covs, 2);
        let multiplicities = vec![false; 2];
        let (first, second) = model.compute_diploid_coverage(&gp_covs, &[0, 1], &multiplicities);
        assert_relative_eq!(first, 12.0);
        assert_relative_eq!(second, 0.0);
    }

    #[test]
    fn diploid_coverage_same_haplogroup_twice_halves() {
        // Nested sites can put two candidate alleles on one haplogroup
        let gp_covs = gp(&[(&[0], 8), (&[0, 1], 4)]);
        let mut model = LevelGenotyperModel::new();
        model.set_haploid_coverages(&gp_covs, 2);
        let multiplicities = vec![true];
        let (first, second) = model.compute_diploid_coverage(&gp_covs, &[0, 0], &multiplicities);
        assert_relative_eq!(first, 6.0);
        assert_relative_eq!(second, 6.0);
    }

    #[test]
    fn credible_positions_counted_against_threshold() {
        let allele = Allele::new("ATCGCCG", vec![0, 0, 2, 3, 3, 5, 4], 0);
        assert_eq!(LevelGenotyperModel::count_credible_positions(3, &allele), 4);
    }

    #[test]
    fn total_coverage_sums_all_classes() {
        assert_eq!(count_total_coverage(&gp(&[])), 0);
        assert_eq!(
            count_total_coverage(&gp(&[(&[0], 5), (&[0, 1], 4), (&[1], 10), (&[2, 3], 1)])),
            20
        );
    }

    #[test]
    fn haplogroup_multiplicities_flag_repeats() {
        let one_group = vec![Allele::new("", vec![], 0), Allele::new("", vec![], 0)];
        assert_eq!(get_haplogroup_multiplicities(&one_group), vec![true]);

        let two_groups = vec![
            Allele::new("", vec![], 0),
            Allele::new("", vec![], 1),
            Allele::new("", vec![], 1),
        ];
        assert_eq!(get_haplogroup_multiplicities(&two_groups), vec![false, true]);
    }

    #[test]
    fn genotype_rescaling() {
        assert_eq!(rescale_genotypes(&[1, 3]), vec![1, 2]);
        assert_eq!(rescale_genotypes(&[0, 4, 4]), vec![0, 1, 1]);
        assert_eq!(rescale_genotypes(&[4, 2]), vec![1, 2]);
    }

    fn two_test_alleles() -> Vec<Allele> {
        vec![Allele::new("A", vec![0], 0), Allele::new("G", vec![0], 1)]
    }

    #[test]
    fn zero_mean_coverage_returns_null_site() {
        let l_stats = LikelihoodStats::make(0.0, 0.0, 0.01);
        let counts = gp(&[(&[0], 5)]);
        let data = ModelData {
            input_alleles: two_test_alleles(),
            gp_counts: &counts,
            ploidy: Ploidy::Haploid,
            l_stats: &l_stats,
            ignore_ref_allele: false,
        };
        let site = LevelGenotyperModel::genotype(data).unwrap();
        assert!(site.is_null());
        assert!(site.has_filter(SiteFilter::MissingDepth));
    }

    #[test]
    fn zero_total_coverage_returns_null_site() {
        let l_stats = LikelihoodStats::make(15.0, 0.0, 0.01);
        let counts = gp(&[]);
        let data = ModelData {
            input_alleles: two_test_alleles(),
            gp_counts: &counts,
            ploidy: Ploidy::Haploid,
            l_stats: &l_stats,
            ignore_ref_allele: false,
        };
        let site = LevelGenotyperModel::genotype(data).unwrap();
        assert!(site.is_null());
        assert_eq!(site.gt_conf, 0.0);
        assert_eq!(site.alleles.len(), 1);
    }

    fn three_alleles_two_haplogroups() -> Vec<Allele> {
        vec![
            Allele::new("ATCACC", vec![0, 0, 1, 1, 2, 2], 0),
            Allele::new("ATGACC", vec![0, 0, 0, 0, 1, 1], 0),
            Allele::new("GGGCC", vec![10, 12, 12, 14, 14], 1),
        ]
    }

    #[test]
    fn haploid_call_picks_covered_haplogroup_and_keeps_ref() {
        let l_stats = LikelihoodStats::make(15.0, 0.0, 0.01);
        let counts = gp(&[(&[0], 1), (&[0, 1], 1), (&[1], 13)]);
        let data = ModelData {
            input_alleles: three_alleles_two_haplogroups(),
            gp_counts: &counts,
            ploidy: Ploidy::Haploid,
            l_stats: &l_stats,
            ignore_ref_allele: false,
        };
        let site = LevelGenotyperModel::genotype(data).unwrap();
        assert_eq!(site.genotype, Some(vec![1]));
        assert_eq!(site.alleles.len(), 2);
        assert_eq!(site.alleles[0].sequence, "ATCACC");
        assert_eq!(site.alleles[1].sequence, "GGGCC");
        // The uncalled REF reports its specific coverage, halved for the
        // doubly-occupied haplogroup 0
        assert_relative_eq!(site.allele_covs[0], 0.5);
        assert_relative_eq!(site.allele_covs[1], 14.0);
    }

    #[test]
    fn diploid_call_is_homozygous_on_dominant_allele() {
        let l_stats = LikelihoodStats::make(15.0, 0.0, 0.01);
        let counts = gp(&[(&[0], 1), (&[0, 1], 1), (&[1], 13)]);
        let data = ModelData {
            input_alleles: three_alleles_two_haplogroups(),
            gp_counts: &counts,
            ploidy: Ploidy::Diploid,
            l_stats: &l_stats,
            ignore_ref_allele: false,
        };
        let site = LevelGenotyperModel::genotype(data).unwrap();
        assert_eq!(site.genotype, Some(vec![1, 1]));
    }

    #[test]
    fn neg_binomial_model_gives_same_haploid_call() {
        let l_stats = LikelihoodStats::make(15.0, 16.0, 0.01);
        let counts = gp(&[(&[0], 1), (&[0, 1], 1), (&[1], 13)]);
        let data = ModelData {
            input_alleles: three_alleles_two_haplogroups(),
            gp_counts: &counts,
            ploidy: Ploidy::Haploid,
            l_stats: &l_stats,
            ignore_ref_allele: false,
        };
        let site = LevelGenotyperModel::genotype(data).unwrap();
        assert_eq!(site.genotype, Some(vec![1]));
    }

    #[test]
    fn confident_call_exports_no_next_best_alleles() {
        let l_stats = LikelihoodStats::make(15.0, 0.0, 0.01);
        let counts = gp(&[(&[0], 1), (&[0, 1], 1), (&[1], 13)]);
        let data = ModelData {
            input_alleles: three_alleles_two_haplogroups(),
            gp_counts: &counts,
            ploidy: Ploidy::Haploid,
            l_stats: &l_stats,
            ignore_ref_allele: false,
        };
        let site = LevelGenotyperModel::genotype(data).unwrap();
        assert!(site.extra_alleles.is_none());
        assert!(!site.has_filter(SiteFilter::Ambig));
    }

    #[test]
    fn low_total_coverage_exports_next_best_alleles() {
        let l_stats = LikelihoodStats::make(15.0, 0.0, 0.01);
        let counts = gp(&[(&[0], 1), (&[0, 1], 1), (&[1], 1)]);
        let data = ModelData {
            input_alleles: three_alleles_two_haplogroups(),
            gp_counts: &counts,
            ploidy: Ploidy::Haploid,
            l_stats: &l_stats,
            ignore_ref_allele: false,
        };
        let site = LevelGenotyperModel::genotype(data).unwrap();
        assert!(site.has_filter(SiteFilter::Ambig));
        assert!(site.extra_alleles.is_some());
    }

    #[test]
    fn near_tied_likelihoods_export_next_best_alleles() {
        let l_stats = LikelihoodStats::make(15.0, 0.0, 0.01);
        let counts = gp(&[(&[0], 14), (&[0, 1], 1), (&[1], 15)]);
        let data = ModelData {
            input_alleles: three_alleles_two_haplogroups(),
            gp_counts: &counts,
            ploidy: Ploidy::Haploid,
            l_stats: &l_stats,
            ignore_ref_allele: false,
        };
        let site = LevelGenotyperModel::genotype(data).unwrap();
        assert!(site.has_filter(SiteFilter::Ambig));
        assert!(site.extra_alleles.is_some());
    }

    #[test]
    fn minos_equivalent_diploid_call() {
        let l_stats = LikelihoodStats::make(20.0, 0.0, 0.01);
        let alleles = vec![
            Allele::new("AA", vec![0, 1], 0),
            Allele::new("TT", vec![20, 19], 1),
        ];
        let counts = gp(&[(&[0], 2), (&[0, 1], 1), (&[1], 20)]);
        let data = ModelData {
            input_alleles: alleles,
            gp_counts: &counts,
            ploidy: Ploidy::Diploid,
            l_stats: &l_stats,
            ignore_ref_allele: false,
        };
        let site = LevelGenotyperModel::genotype(data).unwrap();
        assert_eq!(site.genotype, Some(vec![1, 1]));
    }

    fn four_alleles() -> Vec<Allele> {
        vec![
            Allele::new("AATAA", vec![8, 8, 8, 8, 8], 0),
            Allele::new("AAGAA", vec![7, 7, 7, 7, 7], 0),
            Allele::new("GGTGG", vec![15, 15, 15, 16, 16], 1),
            Allele::new("GGCGG", vec![14, 14, 14, 15, 15], 1),
        ]
    }

    #[test]
    fn number_of_candidate_genotypes_by_ploidy() {
        let l_stats = LikelihoodStats::make(30.0, 0.0, 0.01);
        let counts = gp(&[(&[0], 15), (&[1], 30)]);

        let mut model = LevelGenotyperModel::new();
        model.total_coverage = count_total_coverage(&counts);
        let alleles = four_alleles();
        let multiplicities = get_haplogroup_multiplicities(&alleles);
        model.set_haploid_coverages(&counts, multiplicities.len());
        model.compute_haploid_log_likelihoods(&alleles, &l_stats);
        assert_eq!(model.likelihoods().len(), 4);

        let mut model = LevelGenotyperModel::new();
        model.total_coverage = count_total_coverage(&counts);
        model.set_haploid_coverages(&counts, multiplicities.len());
        model.compute_homozygous_log_likelihoods(&alleles, &counts, &multiplicities, &l_stats);
        model.compute_heterozygous_log_likelihoods(&alleles, &counts, &multiplicities, &l_stats);
        // 4 homozygous plus (4 choose 2) heterozygous
        assert_eq!(model.likelihoods().len(), 10);
    }

    #[test]
    fn ignored_ref_shifts_genotype_indices() {
        let l_stats = LikelihoodStats::make(15.0, 0.0, 0.01);
        let alleles = vec![
            Allele::new("A", vec![0], 0),
            Allele::new("C", vec![8], 0),
            Allele::new("G", vec![8], 1),
        ];
        let counts = gp(&[(&[0], 8), (&[1], 8)]);
        let data = ModelData {
            input_alleles: alleles,
            gp_counts: &counts,
            ploidy: Ploidy::Haploid,
            l_stats: &l_stats,
            ignore_ref_allele: true,
        };
        let site = LevelGenotyperModel::genotype(data).unwrap();
        // The synthetic REF at index 0 never gets called, but stays in the
        // reported alleles
        let genotype = site.genotype.clone().unwrap();
        assert_ne!(genotype, vec![0]);
        assert_eq!(site.alleles[0].sequence, "A");
    }

    #[test]
    fn exact_tie_breaks_to_smallest_index_and_flags_ambig() {
        let l_stats = LikelihoodStats::make(15.0, 0.0, 0.01);
        let alleles = vec![
            Allele::new("A", vec![5], 0),
            Allele::new("G", vec![5], 1),
        ];
        let counts = gp(&[(&[0], 5), (&[1], 5)]);
        let data = ModelData {
            input_alleles: alleles,
            gp_counts: &counts,
            ploidy: Ploidy::Haploid,
            l_stats: &l_stats,
            ignore_ref_allele: false,
        };
        let site = LevelGenotyperModel::genotype(data).unwrap();
        assert_eq!(site.genotype, Some(vec![0]));
        assert_eq!(site.gt_conf, 0.0);
        assert!(site.has_filter(SiteFilter::Ambig));
    }
}
