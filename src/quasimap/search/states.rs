use crate::fm_index::SaInterval;
use crate::prg::codec::{AlleleId, Marker};
use crate::prg::coverage_graph::VariantLocus;

/// Where a search state stands relative to variant sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteState {
    Outside,
    Within,
    Unknown,
}

/// A site being crossed: entered from its 3' end but not yet exited. The
/// allele is None until the search disambiguates it, which happens either
/// on site exit or at end of read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TraversingLocus {
    pub site: Marker,
    pub allele: Option<AlleleId>,
}

impl TraversingLocus {
    pub fn unknown(site: Marker) -> Self {
        TraversingLocus { site, allele: None }
    }
}

/// A single branch of the backward search: an SA interval plus the variant
/// loci fully crossed (3' to 5') and the ones currently being crossed.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchState {
    pub sa_interval: SaInterval,
    pub traversed_path: Vec<VariantLocus>,
    pub traversing_path: Vec<TraversingLocus>,
    pub site_state: SiteState,
}

pub type SearchStates = Vec<SearchState>;

impl SearchState {
    pub fn initial(sa_interval: SaInterval) -> Self {
        SearchState {
            sa_interval,
            traversed_path: Vec::new(),
            traversing_path: Vec::new(),
            site_state: SiteState::Unknown,
        }
    }

    pub fn has_path(&self) -> bool {
        !self.traversed_path.is_empty() || !self.traversing_path.is_empty()
    }

    /// Number of equivalent mapping instances this state encodes.
    pub fn num_instances(&self) -> u64 {
        self.sa_interval.1 - self.sa_interval.0
    }

    pub fn has_unknown_allele(&self) -> bool {
        self.traversing_path.iter().any(|t| t.allele.is_none())
    }
}
