use crate::prg::codec::Marker;
use crate::prg::coverage_graph::{MarkerKind, VariantLocus};
use crate::prg::PrgInfo;
use crate::quasimap::search::encapsulated::{handle_allele_encapsulated_states, set_allele_ids};
use crate::quasimap::search::states::{SearchState, SearchStates, SiteState, TraversingLocus};
use crate::utils::errors::{WeaverError, WeaverResult};

/**
 * Maps a read (5' to 3', integer encoded) against the PRG by backward
 * search, forking the search at variant markers. The returned states carry
 * one SA interval each plus the site/allele path the branch took; states
 * ending inside bubbles are split so every mapping has a well-defined path.
 *
 * Seeding starts from the single-symbol interval of the read's last base;
 * a kmer pre-index would start further in, but is a pure optimisation.
 */
pub fn search_read_backwards(read: &[Marker], prg_info: &PrgInfo) -> WeaverResult<SearchStates> {
    let (&last_base, rest) = match read.split_last() {
        Some(split) => split,
        None => return Ok(Vec::new()),
    };
    let seed_interval = prg_info.fm_index.symbol_interval(last_base);
    if seed_interval.0 == seed_interval.1 {
        return Ok(Vec::new());
    }
    let mut search_states = vec![SearchState::initial(seed_interval)];

    for &base in rest.iter().rev() {
        search_states = process_read_char_search_states(base, &search_states, prg_info)?;
        if search_states.is_empty() {
            return Ok(search_states);
        }
    }

    let search_states = set_allele_ids(&search_states, prg_info)?;
    Ok(handle_allele_encapsulated_states(&search_states, prg_info))
}

/**
 * The key read mapping procedure: one character of backward extension.
 * First updates SA intervals based on variant marker presence (the v part
 * of vBWT), then executes regular backward search on the old and the
 * jumped states alike.
 */
pub fn process_read_char_search_states(
    base: Marker,
    old_search_states: &SearchStates,
    prg_info: &PrgInfo,
) -> WeaverResult<SearchStates> {
    let mut candidates: SearchStates = Vec::with_capacity(old_search_states.len());
    for state in old_search_states {
        candidates.push(state.clone());
        candidates.extend(process_markers_search_state(state, prg_info)?);
    }

    let mut extended = Vec::with_capacity(candidates.len());
    for mut state in candidates {
        let interval = prg_info.fm_index.extend_with_base(base, state.sa_interval);
        if interval.0 >= interval.1 {
            continue;
        }
        state.sa_interval = interval;
        extended.push(state);
    }
    Ok(extended)
}

/**
 * Marker jump phase for one state. Adjacent markers (direct deletions,
 * sites opening at a bubble boundary) chain without intervening base
 * extension, so newly jumped states are re-examined until no BWT position
 * in play holds a marker.
 */
pub fn process_markers_search_state(
    state: &SearchState,
    prg_info: &PrgInfo,
) -> WeaverResult<SearchStates> {
    let mut results = Vec::new();
    let mut to_process = marker_jumps(state, prg_info)?;
    while let Some(jumped) = to_process.pop() {
        to_process.extend(marker_jumps(&jumped, prg_info)?);
        results.push(jumped);
    }
    Ok(results)
}

fn marker_jumps(state: &SearchState, prg_info: &PrgInfo) -> WeaverResult<SearchStates> {
    let fm = &prg_info.fm_index;
    let graph = &prg_info.coverage_graph;
    let mut jumped = Vec::new();
    for &(sa_index, marker) in fm.markers_in_bwt_range(state.sa_interval) {
        let text_pos = fm.sa_at(sa_index) as usize;
        let kind = if text_pos < graph.random_access.len() {
            graph.random_access[text_pos].target
        } else {
            graph.final_target
        };
        let kind = kind.ok_or_else(|| {
            WeaverError::InternalInvariant(format!(
                "BWT marker {} at SA index {} has no jump classification",
                marker, sa_index
            ))
        })?;
        match kind {
            MarkerKind::SiteEnd { site } => jumped.push(entering_site_search_state(state, site, prg_info)),
            MarkerKind::SiteEntry { site } => {
                jumped.push(exiting_site_search_state(state, site, 0, prg_info)?)
            }
            MarkerKind::AlleleEnd { site, allele } => {
                jumped.push(exiting_site_search_state(state, site, allele + 1, prg_info)?)
            }
        }
    }
    Ok(jumped)
}

/// A read entering a site backward forks into every allele at once: the new
/// SA interval covers all the site's allele marker occurrences, each the
/// entry point of one allele. The allele stays unknown until exit.
fn entering_site_search_state(
    state: &SearchState,
    site: Marker,
    prg_info: &PrgInfo,
) -> SearchState {
    let mut entered = state.clone();
    entered.sa_interval = prg_info.fm_index.symbol_interval(site + 1);
    entered.traversing_path.push(TraversingLocus::unknown(site));
    entered.site_state = SiteState::Within;
    entered
}

/// A read exiting a site backward jumps to the site's opening marker, from
/// where extension continues 5' of the bubble. The exit pin-points the
/// allele, resolving a pending unknown entry when one exists.
fn exiting_site_search_state(
    state: &SearchState,
    site: Marker,
    allele: u32,
    prg_info: &PrgInfo,
) -> WeaverResult<SearchState> {
    let mut exited = state.clone();
    exited.sa_interval = prg_info.fm_index.symbol_interval(site);
    match exited.traversing_path.last() {
        Some(traversing) if traversing.site == site => {
            exited.traversing_path.pop();
        }
        Some(traversing) => {
            return Err(WeaverError::InternalInvariant(format!(
                "exiting site {} while traversing site {}",
                site, traversing.site
            )));
        }
        None => {}
    }
    exited.traversed_path.push(VariantLocus::new(site, allele));
    exited.site_state = if exited.traversing_path.is_empty() {
        SiteState::Outside
    } else {
        SiteState::Within
    };
    Ok(exited)
}
