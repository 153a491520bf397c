use crate::prg::coverage_graph::VariantLocus;
use crate::prg::PrgInfo;
use crate::quasimap::search::states::{SearchState, SearchStates, SiteState, TraversingLocus};
use crate::utils::errors::{WeaverError, WeaverResult};

/**
 * Resolves the alleles of sites still being traversed when the read ran
 * out: each SA position pins down the allele the read start lies in, and
 * positions landing in different alleles split into separate states.
 *
 * Resolved loci move to the front of the traversed path: the per-base
 * recorder consumes that path back to front while walking the graph 5' to
 * 3', and the read starts inside these sites, so their bubble entry is
 * never reached.
 */
pub fn set_allele_ids(
    search_states: &SearchStates,
    prg_info: &PrgInfo,
) -> WeaverResult<SearchStates> {
    let mut resolved_states = Vec::with_capacity(search_states.len());
    for state in search_states {
        if !state.has_unknown_allele() {
            resolved_states.push(state.clone());
            continue;
        }

        let mut pending: Option<(SearchState, Vec<TraversingLocus>)> = None;
        for sa_index in state.sa_interval.0..state.sa_interval.1 {
            let resolution = resolve_traversing_path(state, sa_index, prg_info)?;
            let extends_cached = matches!(
                &pending,
                Some((cached, cached_resolution))
                    if *cached_resolution == resolution && cached.sa_interval.1 == sa_index
            );
            if extends_cached {
                pending.as_mut().unwrap().0.sa_interval.1 = sa_index + 1;
            } else {
                if let Some((cached, resolution)) = pending.take() {
                    resolved_states.push(apply_resolution(cached, resolution));
                }
                let mut split = state.clone();
                split.sa_interval = (sa_index, sa_index + 1);
                pending = Some((split, resolution));
            }
        }
        if let Some((cached, resolution)) = pending.take() {
            resolved_states.push(apply_resolution(cached, resolution));
        }
    }
    Ok(resolved_states)
}

fn apply_resolution(mut state: SearchState, resolution: Vec<TraversingLocus>) -> SearchState {
    let mut traversed: Vec<VariantLocus> = resolution
        .iter()
        .map(|t| VariantLocus::new(t.site, t.allele.unwrap()))
        .collect();
    traversed.append(&mut state.traversed_path);
    state.traversed_path = traversed;
    state.traversing_path.clear();
    state.site_state = SiteState::Within;
    state
}

/// Works innermost-out: the SA position names the innermost (site, allele),
/// and the parental map supplies each enclosing haplogroup in turn.
fn resolve_traversing_path(
    state: &SearchState,
    sa_index: u64,
    prg_info: &PrgInfo,
) -> WeaverResult<Vec<TraversingLocus>> {
    let graph = &prg_info.coverage_graph;
    let text_pos = prg_info.fm_index.sa_at(sa_index) as usize;
    let node = graph.node(graph.random_access[text_pos].node);

    let mut site = node.site_id();
    let mut allele = node.allele_id();
    let mut resolution = vec![TraversingLocus { site: 0, allele: None }; state.traversing_path.len()];
    for (slot, traversing) in resolution.iter_mut().zip(&state.traversing_path).rev() {
        if site == 0 || traversing.site != site {
            return Err(WeaverError::InternalInvariant(format!(
                "mapping at PRG position {} cannot resolve traversal of site {}",
                text_pos, traversing.site
            )));
        }
        *slot = TraversingLocus {
            site,
            allele: Some(allele.ok_or_else(|| {
                WeaverError::InternalInvariant(format!(
                    "mapping resolved onto a bubble boundary at PRG position {}",
                    text_pos
                ))
            })?),
        };
        match graph.par_map.get(&site) {
            Some(parent) => {
                site = parent.site;
                allele = Some(parent.allele);
            }
            None => {
                site = 0;
                allele = None;
            }
        }
    }
    Ok(resolution)
}

/**
 * Takes states with no variant path whose SA interval spans positions
 * inside bubbles, and splits them into one state per distinct
 * (site, allele); mapping instances encapsulated in the same allele stay a
 * single state for memory economy. Ensures every recorded mapping has a
 * well-defined site path.
 */
pub fn handle_allele_encapsulated_states(
    search_states: &SearchStates,
    prg_info: &PrgInfo,
) -> SearchStates {
    let mut out = Vec::with_capacity(search_states.len());
    for state in search_states {
        if state.has_path() {
            out.push(state.clone());
            continue;
        }
        handle_allele_encapsulated_state(state, prg_info, &mut out);
    }
    out
}

fn handle_allele_encapsulated_state(
    state: &SearchState,
    prg_info: &PrgInfo,
    out: &mut SearchStates,
) {
    let graph = &prg_info.coverage_graph;
    // Same-allele mappings need not be lexicographically adjacent in the
    // SA; only adjacent ones merge into one interval.
    let mut cache: Option<SearchState> = None;
    for sa_index in state.sa_interval.0..state.sa_interval.1 {
        let text_pos = prg_info.fm_index.sa_at(sa_index) as usize;
        let node = graph.node(graph.random_access[text_pos].node);
        let site = node.site_id();

        let path = match node.allele_id() {
            Some(allele) if site != 0 => vec![VariantLocus::new(site, allele)],
            _ => Vec::new(),
        };
        let extends_cached = !path.is_empty()
            && matches!(
                &cache,
                Some(cached)
                    if cached.traversed_path == path && cached.sa_interval.1 == sa_index
            );
        if extends_cached {
            cache.as_mut().unwrap().sa_interval.1 = sa_index + 1;
        } else {
            if let Some(cached) = cache.take() {
                out.push(cached);
            }
            let site_state = if path.is_empty() {
                SiteState::Outside
            } else {
                SiteState::Within
            };
            cache = Some(SearchState {
                sa_interval: (sa_index, sa_index + 1),
                traversed_path: path,
                traversing_path: Vec::new(),
                site_state,
            });
        }
    }
    if let Some(cached) = cache.take() {
        out.push(cached);
    }
}
