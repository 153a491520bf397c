use crate::genotype::alleles::Allele;
use crate::genotype::genotyped_site::GenotypedSite;
use crate::prg::codec::{site_index, AlleleId};
use crate::prg::coverage_graph::{CoverageGraph, NodeId};
use crate::utils::errors::{WeaverError, WeaverResult};

/**
 * Produces the candidate allele set of one bubble. Walks each haplogroup
 * from the bubble start, pasting sequence and per-base coverage, and on
 * entering a previously genotyped child bubble takes the Cartesian product
 * with the child's called (and extra) alleles, resuming past the child's
 * end node.
 */
pub struct AlleleExtracter {
    alleles: Vec<Allele>,
    ref_made_naturally: bool,
}

impl AlleleExtracter {
    pub fn extract(
        site_start: NodeId,
        site_end: NodeId,
        graph: &CoverageGraph,
        genotyped_records: &[Option<GenotypedSite>],
    ) -> WeaverResult<AlleleExtracter> {
        let start_node = graph.node(site_start);
        let mut alleles: Vec<Allele> = Vec::new();
        let mut ref_made_naturally = true;

        for (haplogroup, &first) in start_node.edges().iter().enumerate() {
            let haplogroup = haplogroup as AlleleId;
            let extracted =
                extract_alleles(haplogroup, first, site_end, graph, genotyped_records)?;
            if haplogroup == 0 {
                let ref_allele = extract_ref_allele(site_start, site_end, graph);
                if !extracted.iter().any(|a| a.sequence == ref_allele.sequence) {
                    // The first haplogroup lost its REF path, eg through a
                    // child whose genotype omits REF; synthesise it.
                    ref_made_naturally = false;
                    let mut synthetic = ref_allele;
                    synthetic.callable = false;
                    alleles.push(synthetic);
                }
            }
            alleles.extend(extracted);
        }
        Ok(AlleleExtracter {
            alleles,
            ref_made_naturally,
        })
    }

    pub fn alleles(&self) -> &[Allele] {
        &self.alleles
    }

    pub fn into_alleles(self) -> Vec<Allele> {
        self.alleles
    }

    pub fn ref_made_naturally(&self) -> bool {
        self.ref_made_naturally
    }
}

/// Linear traversal of one haplogroup. Without incident nested sites this
/// produces a single allele.
fn extract_alleles(
    haplogroup: AlleleId,
    first: NodeId,
    site_end: NodeId,
    graph: &CoverageGraph,
    genotyped_records: &[Option<GenotypedSite>],
) -> WeaverResult<Vec<Allele>> {
    let mut alleles = vec![Allele::empty(haplogroup)];
    let mut cur = first;
    while cur != site_end {
        let node = graph.node(cur);

        if let Some((child_start, child_end)) = graph.bubble_nodes(node.site_id()) {
            if child_start == cur {
                alleles = allele_combine(alleles, site_index(node.site_id()), genotyped_records)?;
                cur = child_end;
                continue;
            }
        }

        if node.has_sequence() {
            allele_paste(&mut alleles, graph, cur);
        }
        cur = *node.edges().first().ok_or_else(|| {
            WeaverError::InternalInvariant(
                "haplogroup walk fell off the graph before the bubble end".to_string(),
            )
        })?;
    }
    Ok(alleles)
}

/// Cartesian product of the accumulated alleles with a genotyped child
/// site's called alleles plus its exported next-best ones. The outer
/// haplogroup is preserved.
fn allele_combine(
    existing: Vec<Allele>,
    child_site_index: usize,
    genotyped_records: &[Option<GenotypedSite>],
) -> WeaverResult<Vec<Allele>> {
    let child = genotyped_records
        .get(child_site_index)
        .and_then(|r| r.as_ref())
        .ok_or_else(|| {
            WeaverError::InternalInvariant(format!(
                "child site with index {} reached before being genotyped",
                child_site_index
            ))
        })?;

    let mut pasted = child.unique_genotyped_alleles();
    if let Some(extra) = &child.extra_alleles {
        pasted.extend(extra.iter().cloned());
    }

    let mut combined = Vec::with_capacity(existing.len() * pasted.len());
    for left in &existing {
        for right in &pasted {
            combined.push(left.concat(right));
        }
    }
    Ok(combined)
}

fn allele_paste(alleles: &mut [Allele], graph: &CoverageGraph, node: NodeId) {
    let node = graph.node(node);
    let sequence = std::str::from_utf8(node.sequence()).unwrap_or_default();
    let coverage: Vec<u64> = node.coverage_counts().iter().map(|&c| c as u64).collect();
    for allele in alleles.iter_mut() {
        allele.append(sequence, &coverage);
    }
}

/// The REF allele of a bubble: an unconditional first-edge walk from start
/// to end, nested bubbles included.
pub fn extract_ref_allele(site_start: NodeId, site_end: NodeId, graph: &CoverageGraph) -> Allele {
    let mut ref_allele = Allele::empty(0);
    let mut cur = graph.node(site_start).edges()[0];
    while cur != site_end {
        let node = graph.node(cur);
        if node.has_sequence() {
            let coverage: Vec<u64> = node.coverage_counts().iter().map(|&c| c as u64).collect();
            ref_allele.append(std::str::from_utf8(node.sequence()).unwrap_or_default(), &coverage);
        }
        match node.edges().first() {
            Some(&next) => cur = next,
            None => break,
        }
    }
    ref_allele
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prg::codec::parse_bracketed_prg;
    use crate::prg::prg_string::PrgString;

    fn graph_for(prg: &str) -> CoverageGraph {
        let prg = PrgString::new(parse_bracketed_prg(prg).unwrap()).unwrap();
        CoverageGraph::build(&prg).unwrap()
    }

    fn genotyped(
        alleles: Vec<Allele>,
        genotype: Option<Vec<usize>>,
        extra: Option<Vec<Allele>>,
    ) -> GenotypedSite {
        let mut site = GenotypedSite::new();
        site.alleles = alleles;
        site.genotype = genotype;
        site.extra_alleles = extra;
        site
    }

    #[test]
    fn ref_allele_follows_first_edges_through_nesting() {
        let graph = graph_for("AT[[C,A,G]T[G[,C]C,T],TTA]T");
        let (start, end) = graph.bubble_nodes(5).unwrap();
        let ref_allele = extract_ref_allele(start, end, &graph);
        assert_eq!(ref_allele.haplogroup, 0);
        assert_eq!(ref_allele.sequence, "CTGC");
    }

    #[test]
    fn bubble_without_children_yields_one_allele_per_haplogroup() {
        let graph = graph_for("AT[GCC[C,A,G]T,TTA]T");
        let (start, end) = graph.bubble_nodes(7).unwrap();
        let extracter = AlleleExtracter::extract(start, end, &graph, &[None, None]).unwrap();
        assert!(extracter.ref_made_naturally());
        assert_eq!(
            extracter.alleles(),
            &[
                Allele::new("C", vec![0], 0),
                Allele::new("A", vec![0], 1),
                Allele::new("G", vec![0], 2),
            ]
        );
    }

    #[test]
    fn direct_deletion_allele_is_present() {
        let graph = graph_for("AT[GCC,TTA,]T");
        let (start, end) = graph.bubble_nodes(5).unwrap();
        let extracter = AlleleExtracter::extract(start, end, &graph, &[None]).unwrap();
        assert_eq!(
            extracter.alleles(),
            &[
                Allele::new("GCC", vec![0, 0, 0], 0),
                Allele::new("TTA", vec![0, 0, 0], 1),
                Allele::new("", vec![], 2),
            ]
        );
    }

    #[test]
    fn haploid_genotyped_child_is_pasted() {
        let graph = graph_for("AT[GCC[C,A,G]T,TTA]T");
        let (start, end) = graph.bubble_nodes(5).unwrap();
        let child = genotyped(vec![Allele::new("C", vec![0], 0)], Some(vec![0]), None);
        let records = vec![None, Some(child)];
        let extracter = AlleleExtracter::extract(start, end, &graph, &records).unwrap();
        assert!(extracter.ref_made_naturally());
        assert_eq!(
            extracter.alleles(),
            &[
                Allele::new("GCCCT", vec![0; 5], 0),
                Allele::new("TTA", vec![0; 3], 1),
            ]
        );
    }

    #[test]
    fn triploid_genotyped_child_multiplies_alleles() {
        let graph = graph_for("AT[GCC[C,A,G]T,TTA]T");
        let (start, end) = graph.bubble_nodes(5).unwrap();
        let child = genotyped(
            vec![
                Allele::new("C", vec![0], 0),
                Allele::new("A", vec![0], 1),
                Allele::new("G", vec![0], 2),
            ],
            Some(vec![0, 1, 2]),
            None,
        );
        let records = vec![None, Some(child)];
        let extracter = AlleleExtracter::extract(start, end, &graph, &records).unwrap();
        assert_eq!(
            extracter.alleles(),
            &[
                Allele::new("GCCCT", vec![0; 5], 0),
                Allele::new("GCCAT", vec![0; 5], 0),
                Allele::new("GCCGT", vec![0; 5], 0),
                Allele::new("TTA", vec![0; 3], 1),
            ]
        );
    }

    #[test]
    fn missing_ref_gets_synthesised_non_callable() {
        let graph = graph_for("AT[GCC[C,A,G]T,TTA]T");
        let (start, end) = graph.bubble_nodes(5).unwrap();
        // Child called on its third haplogroup: REF 'C' disappears
        let child = genotyped(
            vec![Allele::new("C", vec![0], 0), Allele::new("G", vec![0], 2)],
            Some(vec![1]),
            None,
        );
        let records = vec![None, Some(child)];
        let extracter = AlleleExtracter::extract(start, end, &graph, &records).unwrap();
        assert!(!extracter.ref_made_naturally());

        let alleles = extracter.alleles();
        assert_eq!(alleles[0].sequence, "GCCCT");
        assert!(!alleles[0].callable);
        assert_eq!(alleles[1].sequence, "GCCGT");
        assert!(alleles[1].callable);
        assert_eq!(alleles[2].sequence, "TTA");
    }

    #[test]
    fn extra_alleles_are_included_in_products() {
        let graph = graph_for("AT[GCC[C,A,G]T,TTA]T");
        let (start, end) = graph.bubble_nodes(5).unwrap();
        let mut extra = Allele::new("A", vec![0], 1);
        extra.callable = false;
        let child = genotyped(
            vec![Allele::new("C", vec![0], 0), Allele::new("G", vec![0], 2)],
            Some(vec![1]),
            Some(vec![extra]),
        );
        let records = vec![None, Some(child)];
        let extracter = AlleleExtracter::extract(start, end, &graph, &records).unwrap();

        let sequences: Vec<&str> = extracter
            .alleles()
            .iter()
            .map(|a| a.sequence.as_str())
            .collect();
        assert_eq!(sequences, vec!["GCCCT", "GCCGT", "GCCAT", "TTA"]);
        assert!(!extracter.alleles()[2].callable);
    }

    #[test]
    fn null_child_contributes_ref_only() {
        let graph = graph_for("AT[GCC[C,A,G]T,TTA]T");
        let (start, end) = graph.bubble_nodes(5).unwrap();
        let child = genotyped(
            vec![Allele::new("C", vec![0], 0), Allele::new("A", vec![0], 1)],
            None,
            None,
        );
        let records = vec![None, Some(child)];
        let extracter = AlleleExtracter::extract(start, end, &graph, &records).unwrap();
        assert_eq!(
            extracter.alleles(),
            &[
                Allele::new("GCCCT", vec![0; 5], 0),
                Allele::new("TTA", vec![0; 3], 1),
            ]
        );
    }
}
