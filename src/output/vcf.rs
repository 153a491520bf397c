use std::collections::HashMap;
use std::path::Path;

use rust_htslib::bcf::record::{GenotypeAllele, Numeric};
use rust_htslib::bcf::{Format, Header, Writer};

use crate::genotype::genotyped_site::GenotypedSite;
use crate::prg::coverage_graph::{CoverageGraph, NodeId};
use crate::prg::PrgInfo;
use crate::utils::errors::{WeaverError, WeaverResult};

const VCF_FORMAT_LINES: &[&[u8]] = &[
    br#"##FORMAT=<ID=GT,Number=1,Type=String,Description="Genotype">"#,
    br#"##FORMAT=<ID=DP,Number=1,Type=Integer,Description="Total read depth on the site">"#,
    br#"##FORMAT=<ID=COV,Number=.,Type=Float,Description="Read coverage of each reported allele">"#,
    br#"##FORMAT=<ID=GT_CONF,Number=1,Type=Float,Description="Genotype confidence as likelihood ratio of called and next most likely genotype">"#,
    br#"##FORMAT=<ID=GT_CONF_PERCENTILE,Number=1,Type=Float,Description="Percent of calls expected to have lower GT_CONF">"#,
    br#"##FORMAT=<ID=FT,Number=1,Type=String,Description="Site filters: PASS, or semicolon-separated reasons">"#,
];

/**
 * Writes one VCF 4.2 record per genotyped bubble, nested sites included,
 * with POS on the REF path. Alleles with an empty sequence (direct
 * deletions) get anchored on the preceding REF base, VCF-style.
 */
pub fn write_vcf<P: AsRef<Path>>(
    path: P,
    prg_info: &PrgInfo,
    genotyped_records: &[Option<GenotypedSite>],
    sample_name: &str,
) -> WeaverResult<()> {
    let graph = &prg_info.coverage_graph;
    let contig = b"prg";
    let mut header = Header::new();
    header.push_record(b"##source=weaver LevelGenotyping");
    header.push_record(
        format!("##contig=<ID=prg,length={}>", ref_path_length(graph)).as_bytes(),
    );
    for line in VCF_FORMAT_LINES {
        header.push_record(line);
    }
    header.push_sample(sample_name.as_bytes());

    let mut writer = Writer::from_path(path.as_ref(), &header, true, Format::Vcf)
        .map_err(|e| WeaverError::Parse(format!("cannot create VCF: {}", e)))?;
    let rid = writer
        .header()
        .name2rid(contig)
        .map_err(|e| WeaverError::Parse(format!("contig missing from header: {}", e)))?;

    let predecessors = sequence_predecessors(graph);

    let mut ordered: Vec<&GenotypedSite> = genotyped_records.iter().flatten().collect();
    ordered.sort_by_key(|site| (site.pos, site.site_id));

    for site in ordered {
        let mut record = writer.empty_record();
        record.set_rid(Some(rid));

        let (pos, alleles, genotype) = site_alleles(site, graph, &predecessors);
        if alleles.is_empty() {
            continue;
        }
        // htslib positions are 0-based; the textual VCF shows pos + 1
        record.set_pos(pos as i64);
        let allele_bytes: Vec<&[u8]> = alleles.iter().map(|a| a.as_bytes()).collect();
        record
            .set_alleles(&allele_bytes)
            .map_err(|e| WeaverError::Parse(format!("bad alleles at site {}: {}", site.site_id, e)))?;

        let gt: Vec<GenotypeAllele> = match &genotype {
            Some(indices) => indices
                .iter()
                .map(|&g| GenotypeAllele::Unphased(g as i32))
                .collect(),
            None => vec![GenotypeAllele::UnphasedMissing],
        };
        record
            .push_genotypes(&gt)
            .map_err(|e| WeaverError::Parse(format!("cannot set GT: {}", e)))?;

        record
            .push_format_integer(b"DP", &[site.total_coverage as i32])
            .map_err(|e| WeaverError::Parse(format!("cannot set DP: {}", e)))?;

        let covs: Vec<f32> = if site.allele_covs.is_empty() {
            vec![f32::missing()]
        } else {
            site.allele_covs.iter().map(|&c| c as f32).collect()
        };
        record
            .push_format_float(b"COV", &covs)
            .map_err(|e| WeaverError::Parse(format!("cannot set COV: {}", e)))?;
        record
            .push_format_float(b"GT_CONF", &[site.gt_conf as f32])
            .map_err(|e| WeaverError::Parse(format!("cannot set GT_CONF: {}", e)))?;
        record
            .push_format_float(
                b"GT_CONF_PERCENTILE",
                &[site.gt_conf_percentile.map(|p| p as f32).unwrap_or_else(f32::missing)],
            )
            .map_err(|e| WeaverError::Parse(format!("cannot set GT_CONF_PERCENTILE: {}", e)))?;

        let filter_tag = if site.filters.is_empty() {
            "PASS".to_string()
        } else {
            site.filters
                .iter()
                .map(|f| f.as_str())
                .collect::<Vec<_>>()
                .join(";")
        };
        record
            .push_format_string(b"FT", &[filter_tag.as_bytes()])
            .map_err(|e| WeaverError::Parse(format!("cannot set FT: {}", e)))?;

        writer
            .write(&record)
            .map_err(|e| WeaverError::Parse(format!("cannot write VCF record: {}", e)))?;
    }
    Ok(())
}

/// Length of the path through allele 0 of every site.
pub fn ref_path_length(graph: &CoverageGraph) -> usize {
    let mut length = 0;
    let mut cur = graph.root;
    loop {
        let node = graph.node(cur);
        length += node.sequence_len();
        match node.edges().first() {
            Some(&next) => cur = next,
            None => return length,
        }
    }
}

/// For every node, one of its predecessors; enough to find the nearest
/// sequence base left of a bubble.
fn sequence_predecessors(graph: &CoverageGraph) -> HashMap<NodeId, NodeId> {
    let mut predecessors = HashMap::new();
    for id in 0..graph.num_nodes() {
        for &next in graph.node(id).edges() {
            predecessors.entry(next).or_insert(id);
        }
    }
    predecessors
}

fn anchor_base(
    graph: &CoverageGraph,
    predecessors: &HashMap<NodeId, NodeId>,
    bubble_start: NodeId,
) -> Option<u8> {
    let mut cur = bubble_start;
    while let Some(&pred) = predecessors.get(&cur) {
        let node = graph.node(pred);
        if node.has_sequence() {
            return node.sequence().last().copied();
        }
        cur = pred;
    }
    None
}

/// The record's POS (0-based), allele strings (REF first, deduplicated),
/// and genotype remapped onto the deduplicated alleles.
fn site_alleles(
    site: &GenotypedSite,
    graph: &CoverageGraph,
    predecessors: &HashMap<NodeId, NodeId>,
) -> (usize, Vec<String>, Option<Vec<usize>>) {
    let mut sequences: Vec<String> = Vec::new();
    let mut index_map: Vec<usize> = Vec::with_capacity(site.alleles.len());
    for allele in &site.alleles {
        match sequences.iter().position(|s| s == &allele.sequence) {
            Some(existing) => index_map.push(existing),
            None => {
                sequences.push(allele.sequence.clone());
                index_map.push(sequences.len() - 1);
            }
        }
    }
    let genotype = site
        .genotype
        .as_ref()
        .map(|gt| gt.iter().map(|&g| index_map.get(g).copied().unwrap_or(0)).collect());

    let mut pos = site.pos;
    if sequences.iter().any(|s| s.is_empty()) {
        let anchor = graph
            .bubble_nodes(site.site_id)
            .and_then(|(start, _)| anchor_base(graph, predecessors, start))
            .unwrap_or(b'N') as char;
        for sequence in sequences.iter_mut() {
            sequence.insert(0, anchor);
        }
        pos = pos.saturating_sub(1);
    }
    (pos, sequences, genotype)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genotype::alleles::Allele;
    use crate::prg::codec::parse_bracketed_prg;
    use crate::prg::prg_string::PrgString;
    use rust_htslib::bcf::{Read, Reader};

    fn prg_info(bracketed: &str) -> PrgInfo {
        let prg = PrgString::new(parse_bracketed_prg(bracketed).unwrap()).unwrap();
        PrgInfo::from_prg_string(prg).unwrap()
    }

    fn called_site(site_id: u64, pos: usize, alleles: &[(&str, u64)], gt: &[usize]) -> GenotypedSite {
        let mut site = GenotypedSite::new();
        site.site_id = site_id;
        site.pos = pos;
        site.alleles = alleles
            .iter()
            .enumerate()
            .map(|(h, (seq, cov))| Allele::new(seq, vec![*cov], h as u32))
            .collect();
        site.genotype = Some(gt.to_vec());
        site.allele_covs = alleles.iter().map(|(_, c)| *c as f64).collect();
        site.total_coverage = alleles.iter().map(|(_, c)| *c).sum();
        site.gt_conf = 30.0;
        site
    }

    #[test]
    fn ref_path_length_follows_first_alleles() {
        let info = prg_info("AATAA[C,G]AA[C,G]AA");
        assert_eq!(ref_path_length(&info.coverage_graph), 11);
    }

    #[test]
    fn records_round_trip_through_htslib() {
        let info = prg_info("AATAA[C,G]AA[C,G]AA");
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calls.vcf");

        let records = vec![
            Some(called_site(5, 5, &[("C", 5), ("G", 1)], &[0])),
            Some(called_site(7, 8, &[("C", 5), ("G", 1)], &[0])),
        ];
        write_vcf(&path, &info, &records, "sample1").unwrap();

        let mut reader = Reader::from_path(&path).unwrap();
        let read_back: Vec<_> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(read_back.len(), 2);
        assert_eq!(read_back[0].pos(), 5);
        assert_eq!(read_back[0].alleles(), vec![&b"C"[..], &b"G"[..]]);
        let gt = read_back[0].genotypes().unwrap().get(0);
        assert_eq!(gt[0], GenotypeAllele::Unphased(0));

        let conf = read_back[1].format(b"GT_CONF").float().unwrap();
        assert!((conf[0][0] - 30.0).abs() < 1e-3);
    }

    #[test]
    fn empty_allele_gets_anchored() {
        let info = prg_info("GGGGG[CCC,]GG");
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calls.vcf");
        let records = vec![Some(called_site(5, 5, &[("CCC", 0), ("", 5)], &[1]))];
        write_vcf(&path, &info, &records, "s").unwrap();

        let mut reader = Reader::from_path(&path).unwrap();
        let record = reader.records().next().unwrap().unwrap();
        assert_eq!(record.pos(), 4);
        assert_eq!(record.alleles(), vec![&b"GCCC"[..], &b"G"[..]]);
    }

    #[test]
    fn null_site_writes_missing_genotype() {
        let info = prg_info("AATAA[C,G]AA");
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calls.vcf");
        let mut site = called_site(5, 5, &[("C", 0)], &[0]);
        site.genotype = None;
        site.allele_covs.clear();
        site.gt_conf = 0.0;
        write_vcf(&path, &info, &[Some(site)], "s").unwrap();

        let mut reader = Reader::from_path(&path).unwrap();
        let record = reader.records().next().unwrap().unwrap();
        let gt = record.genotypes().unwrap().get(0);
        assert_eq!(gt[0], GenotypeAllele::UnphasedMissing);
    }
}
