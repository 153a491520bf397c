use std::collections::BTreeSet;

use crate::genotype::alleles::Allele;
use crate::prg::codec::{AlleleId, Marker};
use crate::prg::coverage_graph::NodeId;

/// Genotype as indices into the site's allele vector; None is the null
/// genotype.
pub type GtypedIndices = Vec<usize>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SiteFilter {
    /// Call is ambiguous: very low coverage or near-tied likelihoods.
    Ambig,
    /// No usable coverage; the site was forced null.
    MissingDepth,
}

impl SiteFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            SiteFilter::Ambig => "AMBIG",
            SiteFilter::MissingDepth => "MISSING_DEPTH",
        }
    }
}

/**
 * The genotyping outcome of one bubble. Built by the likelihood model,
 * placed by the runner (which knows site IDs and graph nodes), then
 * read-only for the VCF/JSON emitters.
 */
#[derive(Debug, Clone)]
pub struct GenotypedSite {
    pub site_id: Marker,
    /// 0-based coordinate on the REF path; 1-based only in the VCF.
    pub pos: usize,
    pub alleles: Vec<Allele>,
    pub genotype: Option<GtypedIndices>,
    pub allele_covs: Vec<f64>,
    pub total_coverage: u64,
    pub genotyped_haplogroups: Vec<AlleleId>,
    /// Number of outgoing edges of the bubble start; drives invalidation.
    pub num_haplogroups: usize,
    pub gt_conf: f64,
    pub gt_conf_percentile: Option<f64>,
    pub filters: BTreeSet<SiteFilter>,
    /// Runner-up alleles exported for parent-bubble extraction when the
    /// call was not confident.
    pub extra_alleles: Option<Vec<Allele>>,
    /// Where allele extraction resumes when a parent site walks over this
    /// bubble.
    pub site_end_node: NodeId,
}

impl GenotypedSite {
    pub fn new() -> Self {
        GenotypedSite {
            site_id: 0,
            pos: 0,
            alleles: Vec::new(),
            genotype: None,
            allele_covs: Vec::new(),
            total_coverage: 0,
            genotyped_haplogroups: Vec::new(),
            num_haplogroups: 0,
            gt_conf: 0.0,
            gt_conf_percentile: None,
            filters: BTreeSet::new(),
            extra_alleles: None,
            site_end_node: 0,
        }
    }

    pub fn is_null(&self) -> bool {
        self.genotype.is_none()
    }

    /// Nulls the site; idempotent, and keeps the REF allele so parent
    /// extraction stays possible.
    pub fn make_null(&mut self) {
        self.genotype = None;
        self.gt_conf = 0.0;
        self.gt_conf_percentile = None;
        self.genotyped_haplogroups.clear();
        if self.alleles.len() > 1 {
            self.alleles.truncate(1);
        }
    }

    pub fn has_filter(&self, filter: SiteFilter) -> bool {
        self.filters.contains(&filter)
    }

    pub fn set_filter(&mut self, filter: SiteFilter) {
        self.filters.insert(filter);
    }

    /// The alleles referred to by the genotype, deduplicated in ascending
    /// index order; the null genotype yields the REF allele alone.
    pub fn unique_genotyped_alleles(&self) -> Vec<Allele> {
        let distinct: BTreeSet<usize> = match &self.genotype {
            Some(indices) => indices.iter().copied().collect(),
            None => BTreeSet::from([0]),
        };
        distinct
            .into_iter()
            .filter_map(|i| self.alleles.get(i).cloned())
            .collect()
    }

    /// Haplogroups excluded by the call; nested sites on these haplogroups
    /// get invalidated.
    pub fn non_genotyped_haplogroups(&self) -> Vec<AlleleId> {
        (0..self.num_haplogroups as AlleleId)
            .filter(|h| !self.genotyped_haplogroups.contains(h))
            .collect()
    }

    pub fn all_haplogroups(&self) -> Vec<AlleleId> {
        (0..self.num_haplogroups as AlleleId).collect()
    }
}

impl Default for GenotypedSite {
    fn default() -> Self {
        GenotypedSite::new()
    }
}
