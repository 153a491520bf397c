use std::collections::{BTreeSet, HashSet};

use multimap::MultiMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::prg::codec::Marker;
use crate::prg::coverage_graph::VariantLocus;
use crate::prg::PrgInfo;
use crate::quasimap::search::{SearchState, SearchStates, SiteState};
use crate::utils::errors::{WeaverError, WeaverResult};

/// Randomness contract: seed 0 means a fresh seed from the OS; any other
/// seed gives identical selections for identical read order.
pub trait RandomInclusiveInt {
    fn random_int_inclusive(&mut self, min: u64, max: u64) -> u64;
}

pub struct SeededRandom(StdRng);

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        if seed == 0 {
            SeededRandom(StdRng::from_entropy())
        } else {
            SeededRandom(StdRng::seed_from_u64(seed))
        }
    }
}

impl RandomInclusiveInt for SeededRandom {
    fn random_int_inclusive(&mut self, min: u64, max: u64) -> u64 {
        self.0.gen_range(min..=max)
    }
}

/**
 * Finds the set of (nested) loci supported by a SearchState.
 *
 * base_sites collects the level-0 sites: each distinct set defines one
 * equivalence class of mapping instances. unique_loci collects every
 * (site, allele) the state is compatible with, ancestors included, and
 * feeds grouped allele count and allele sum recording.
 */
pub struct LocusFinder {
    pub base_sites: BTreeSet<Marker>,
    pub unique_loci: BTreeSet<VariantLocus>,
    used_sites: HashSet<Marker>,
}

impl LocusFinder {
    pub fn new(search_state: &SearchState, prg_info: &PrgInfo) -> WeaverResult<LocusFinder> {
        let mut finder = LocusFinder {
            base_sites: BTreeSet::new(),
            unique_loci: BTreeSet::new(),
            used_sites: HashSet::new(),
        };
        for locus in &search_state.traversed_path {
            finder.assign_nested_locus(*locus, prg_info)?;
        }
        for traversing in &search_state.traversing_path {
            let allele = traversing.allele.ok_or_else(|| {
                WeaverError::InternalInvariant(format!(
                    "unresolved allele for site {} at coverage recording",
                    traversing.site
                ))
            })?;
            finder.assign_nested_locus(VariantLocus::new(traversing.site, allele), prg_info)?;
        }
        Ok(finder)
    }

    /// Registers a locus together with every site it is nested within, up
    /// to a level-0 site.
    fn assign_nested_locus(&mut self, locus: VariantLocus, prg_info: &PrgInfo) -> WeaverResult<()> {
        let mut current = locus;
        loop {
            if !self.used_sites.insert(current.site) {
                // Ancestors already walked from an earlier locus
                if !self.unique_loci.contains(&current) {
                    return Err(WeaverError::InternalInvariant(format!(
                        "read touches site {} through two different alleles",
                        current.site
                    )));
                }
                return Ok(());
            }
            self.unique_loci.insert(current);
            match prg_info.coverage_graph.par_map.get(&current.site) {
                Some(parent) => current = *parent,
                None => {
                    self.base_sites.insert(current.site);
                    return Ok(());
                }
            }
        }
    }
}

/// The chosen mapping of one read: the states to walk for per-base
/// recording, and the deduplicated loci for the count-based structures.
#[derive(Debug, Default)]
pub struct SelectedMapping {
    pub states: SearchStates,
    pub loci: BTreeSet<VariantLocus>,
}

/**
 * Dispatches SearchStates into equivalence classes keyed by their level-0
 * site set, then selects uniformly among all distinct mapping options:
 * every non-variant instance counts as one option, every class as one.
 */
pub struct MappingInstanceSelector;

impl MappingInstanceSelector {
    pub fn select<R: RandomInclusiveInt>(
        search_states: &SearchStates,
        read_length: usize,
        prg_info: &PrgInfo,
        rng: &mut R,
    ) -> WeaverResult<SelectedMapping> {
        let mut classes: MultiMap<Vec<Marker>, SearchState> = MultiMap::new();
        let mut class_loci: std::collections::HashMap<Vec<Marker>, BTreeSet<VariantLocus>> =
            std::collections::HashMap::new();
        let mut nonvariant_count: u64 = 0;

        for state in search_states {
            if !state.has_path() {
                nonvariant_count += state.num_instances();
                continue;
            }
            let finder = LocusFinder::new(state, prg_info)?;
            let key: Vec<Marker> = finder.base_sites.iter().copied().collect();
            class_loci
                .entry(key.clone())
                .or_default()
                .extend(finder.unique_loci);
            classes.insert(key, state.clone());
        }

        // Deterministic class ordering for a given seed
        let mut keys: Vec<Vec<Marker>> = class_loci.keys().cloned().collect();
        keys.sort();

        let total_options = nonvariant_count + keys.len() as u64;
        if total_options == 0 {
            return Ok(SelectedMapping::default());
        }
        let selected_option = rng.random_int_inclusive(1, total_options);
        if selected_option <= nonvariant_count {
            // A non-variant placement: no coverage information to record
            return Ok(SelectedMapping::default());
        }

        let key = &keys[(selected_option - nonvariant_count - 1) as usize];
        let mut states: SearchStates = classes.get_vec(key).unwrap().clone();
        let loci = class_loci.remove(key).unwrap();

        if states.len() == 1 && multiple_allele_encapsulated(&states[0], read_length, prg_info) {
            states[0] = random_select_single_mapping(&states[0], rng);
        }
        Ok(SelectedMapping { states, loci })
    }
}

/// Whether every mapping instance of the state starts and ends within one
/// and the same (site, allele).
pub fn check_allele_encapsulated(
    search_state: &SearchState,
    read_length: usize,
    prg_info: &PrgInfo,
) -> bool {
    let single_allele_path =
        search_state.traversed_path.len() == 1 && search_state.traversing_path.is_empty();
    let start_within_allele = search_state.site_state == SiteState::Within;
    if !single_allele_path || !start_within_allele {
        return false;
    }

    let graph = &prg_info.coverage_graph;
    for sa_index in search_state.sa_interval.0..search_state.sa_interval.1 {
        let start = prg_info.fm_index.sa_at(sa_index) as usize;
        let end = start + read_length - 1;
        if end >= graph.random_access.len() {
            return false;
        }
        let start_node = graph.node(graph.random_access[start].node);
        let end_node = graph.node(graph.random_access[end].node);
        let same_allele = start_node.site_id() == end_node.site_id()
            && start_node.allele_id() == end_node.allele_id();
        if !same_allele {
            return false;
        }
    }
    true
}

pub fn multiple_allele_encapsulated(
    search_state: &SearchState,
    read_length: usize,
    prg_info: &PrgInfo,
) -> bool {
    search_state.num_instances() > 1
        && check_allele_encapsulated(search_state, read_length, prg_info)
}

/// The read maps several times inside one allele: keep one instance,
/// drawn uniformly.
fn random_select_single_mapping<R: RandomInclusiveInt>(
    search_state: &SearchState,
    rng: &mut R,
) -> SearchState {
    let selected =
        rng.random_int_inclusive(search_state.sa_interval.0, search_state.sa_interval.1 - 1);
    let mut single = search_state.clone();
    single.sa_interval = (selected, selected + 1);
    single
}
