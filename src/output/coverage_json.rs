use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use serde_derive::Serialize;

use crate::prg::codec::AlleleId;
use crate::prg::PrgInfo;
use crate::quasimap::coverage::{Coverage, GroupedAlleleCounts};
use crate::utils::errors::{WeaverError, WeaverResult};

/**
 * The three coverage JSON documents written on completion: per-base counts
 * (meaningful for non-nested PRGs only, empty otherwise), the allele-sum
 * matrix, and grouped allele counts with their group table.
 */

#[derive(Serialize)]
struct AlleleBaseCoverageJson {
    allele_base_counts: Vec<Vec<Vec<u16>>>,
}

#[derive(Serialize)]
struct AlleleSumCoverageJson {
    allele_sum_coverage: Vec<Vec<u32>>,
}

#[derive(Serialize)]
struct GroupedAlleleCountsJson {
    grouped_allele_counts: GroupedBody,
}

#[derive(Serialize)]
struct GroupedBody {
    site_counts: Vec<BTreeMap<String, u64>>,
    allele_groups: BTreeMap<String, Vec<AlleleId>>,
}

/// Per-site, per-allele zero-padded base counts, read off the coverage
/// graph. Nested PRGs get an empty structure by convention: the flat shape
/// cannot represent them.
pub fn allele_base_coverage(prg_info: &PrgInfo) -> Vec<Vec<Vec<u16>>> {
    let graph = &prg_info.coverage_graph;
    if graph.is_nested {
        return Vec::new();
    }
    let mut sites = Vec::with_capacity(graph.bubble_map.len());
    let mut site_ids: Vec<_> = graph.bubble_map.keys().copied().collect();
    site_ids.sort_unstable();
    for site_id in site_ids {
        let (start, _) = graph.bubble_map[&site_id];
        let alleles: Vec<Vec<u16>> = graph
            .node(start)
            .edges()
            .iter()
            .map(|&n| graph.node(n).coverage_counts())
            .collect();
        sites.push(alleles);
    }
    sites
}

/// Assigns a stable ID to each distinct allele group across all sites.
pub fn hash_allele_groups(sites: &[GroupedAlleleCounts]) -> HashMap<Vec<AlleleId>, usize> {
    let mut distinct: Vec<Vec<AlleleId>> = sites
        .iter()
        .flat_map(|site| site.keys().cloned())
        .collect();
    distinct.sort();
    distinct.dedup();
    distinct.into_iter().enumerate().map(|(i, g)| (g, i)).collect()
}

pub fn write_all<P: AsRef<Path>>(
    out_dir: P,
    prg_info: &PrgInfo,
    coverage: &Coverage,
) -> WeaverResult<()> {
    let out_dir = out_dir.as_ref();

    let allele_base = AlleleBaseCoverageJson {
        allele_base_counts: allele_base_coverage(prg_info),
    };
    write_json(&out_dir.join("allele_base_coverage.json"), &allele_base)?;

    let allele_sum = AlleleSumCoverageJson {
        allele_sum_coverage: coverage.allele_sum_counts(),
    };
    write_json(&out_dir.join("allele_sum_coverage.json"), &allele_sum)?;

    let grouped = coverage.grouped_counts_snapshot();
    let group_ids = hash_allele_groups(&grouped);
    let site_counts = grouped
        .iter()
        .map(|site| {
            site.iter()
                .map(|(group, &count)| (group_ids[group].to_string(), count))
                .collect()
        })
        .collect();
    let allele_groups = group_ids
        .iter()
        .map(|(group, &id)| (id.to_string(), group.clone()))
        .collect();
    let grouped_json = GroupedAlleleCountsJson {
        grouped_allele_counts: GroupedBody {
            site_counts,
            allele_groups,
        },
    };
    write_json(&out_dir.join("grouped_allele_counts_coverage.json"), &grouped_json)
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> WeaverResult<()> {
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(writer, value)
        .map_err(|e| WeaverError::Parse(format!("cannot serialise {}: {}", path.display(), e)))
}
