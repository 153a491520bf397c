use std::collections::HashMap;
use std::sync::atomic::{AtomicU16, Ordering};

use crate::prg::codec::{self, AlleleId, Marker};
use crate::prg::prg_string::PrgString;
use crate::utils::errors::{WeaverError, WeaverResult};

/// Arena handle of a coverage graph node.
pub type NodeId = usize;

/// A concrete (site, allele) pair on the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VariantLocus {
    pub site: Marker,
    pub allele: AlleleId,
}

impl VariantLocus {
    pub fn new(site: Marker, allele: AlleleId) -> Self {
        VariantLocus { site, allele }
    }
}

/// Role of a variant marker occurrence in the linear PRG. During backward
/// search, crossing a `SiteEnd` enters the site, crossing a `SiteEntry`
/// exits through allele 0, and crossing an `AlleleEnd` that terminates
/// allele k exits through allele k + 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerKind {
    SiteEntry { site: Marker },
    AlleleEnd { site: Marker, allele: AlleleId },
    SiteEnd { site: Marker },
}

/// Random access entry: which node and in-node offset a PRG position maps
/// to, and, for positions immediately following a marker, the jump that a
/// backward extension from here logically performs.
#[derive(Debug, Clone, Copy)]
pub struct NodeAccess {
    pub node: NodeId,
    pub offset: usize,
    pub target: Option<MarkerKind>,
}

pub struct CoverageNode {
    sequence: Vec<u8>,
    site_id: Marker,
    allele_id: Option<AlleleId>,
    pos: usize,
    coverage: Vec<AtomicU16>,
    edges: Vec<NodeId>,
}

impl CoverageNode {
    fn new(site_id: Marker, allele_id: Option<AlleleId>, pos: usize) -> Self {
        CoverageNode {
            sequence: Vec::new(),
            site_id,
            allele_id,
            pos,
            coverage: Vec::new(),
            edges: Vec::new(),
        }
    }

    pub fn sequence(&self) -> &[u8] {
        &self.sequence
    }

    pub fn sequence_len(&self) -> usize {
        self.sequence.len()
    }

    pub fn has_sequence(&self) -> bool {
        !self.sequence.is_empty()
    }

    pub fn site_id(&self) -> Marker {
        self.site_id
    }

    pub fn allele_id(&self) -> Option<AlleleId> {
        self.allele_id
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn edges(&self) -> &[NodeId] {
        &self.edges
    }

    /// Sequence nodes lying on an allele carry per-base counters; bubble
    /// boundary sentinels and invariant regions do not.
    pub fn is_in_bubble(&self) -> bool {
        self.site_id != 0 && self.allele_id.is_some()
    }

    pub fn coverage(&self) -> &[AtomicU16] {
        &self.coverage
    }

    /// Snapshot of the per-base counters.
    pub fn coverage_counts(&self) -> Vec<u16> {
        self.coverage.iter().map(|c| c.load(Ordering::Relaxed)).collect()
    }

    /// Saturating, thread-safe increment of one per-base counter.
    pub fn increment_coverage(&self, offset: usize) {
        let cell = &self.coverage[offset];
        let mut current = cell.load(Ordering::Relaxed);
        while current < u16::MAX {
            match cell.compare_exchange_weak(
                current,
                current + 1,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(observed) => current = observed,
            }
        }
    }
}

pub struct CoverageGraph {
    nodes: Vec<CoverageNode>,
    pub root: NodeId,
    /// site ID -> (bubble start node, bubble end node)
    pub bubble_map: HashMap<Marker, (NodeId, NodeId)>,
    /// Site IDs ordered so that children precede parents (innermost first):
    /// descending REF position, ties broken by descending nesting depth.
    pub bubble_order: Vec<Marker>,
    /// child site ID -> (parent site ID, parent haplogroup)
    pub par_map: HashMap<Marker, VariantLocus>,
    /// parent site ID -> haplogroup -> nested site IDs
    pub child_map: HashMap<Marker, HashMap<AlleleId, Vec<Marker>>>,
    pub random_access: Vec<NodeAccess>,
    /// Jump performed by a backward extension from one past the end of the
    /// PRG, ie when the final symbol is a marker.
    pub final_target: Option<MarkerKind>,
    pub is_nested: bool,
}

struct Frame {
    site: Marker,
    entry: NodeId,
    pos_at_open: usize,
    ref_len: Option<usize>,
    cur_allele: AlleleId,
    allele_ends: Vec<NodeId>,
    empty_alleles: Vec<AlleleId>,
}

impl CoverageGraph {
    pub fn node(&self, id: NodeId) -> &CoverageNode {
        &self.nodes[id]
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_variant_sites(&self) -> usize {
        self.bubble_map.len()
    }

    pub fn bubble_nodes(&self, site: Marker) -> Option<(NodeId, NodeId)> {
        self.bubble_map.get(&site).copied()
    }

    /// Depth of nesting of a site: 0 for level-0 bubbles.
    pub fn nesting_depth(&self, site: Marker) -> usize {
        let mut depth = 0;
        let mut cur = site;
        while let Some(parent) = self.par_map.get(&cur) {
            depth += 1;
            cur = parent.site;
        }
        depth
    }

    /**
     * Single left-to-right pass over the PRG integer vector, maintaining a
     * stack of open bubbles. Emits a run-of-bases node per maximal base
     * stretch, a zero-length entry sentinel per site opening and a shared
     * zero-length end sentinel per site closure.
     *
     * REF positions: the running coordinate advances on every base but is
     * reset to the bubble opening coordinate at each allele separator, so a
     * node's `pos` is its coordinate along allele 0 of every enclosing site.
     */
    pub fn build(prg: &PrgString) -> WeaverResult<Self> {
        let markers = prg.markers();
        let mut nodes = vec![CoverageNode::new(0, None, 0)];
        let root: NodeId = 0;
        let mut bubble_map = HashMap::new();
        let mut par_map: HashMap<Marker, VariantLocus> = HashMap::new();
        let mut random_access: Vec<NodeAccess> = Vec::with_capacity(markers.len());

        let mut frames: Vec<Frame> = Vec::new();
        let mut cur: NodeId = root;
        let mut growing = false;
        let mut cur_pos: usize = 0;
        let mut prev_kind: Option<MarkerKind> = None;

        for (i, &m) in markers.iter().enumerate() {
            let target = prev_kind.take();
            if m <= 4 {
                if growing {
                    nodes[cur].sequence.push(codec::decode_dna_base(m));
                    if nodes[cur].site_id != 0 {
                        nodes[cur].coverage.push(AtomicU16::new(0));
                    }
                    let offset = nodes[cur].sequence.len() - 1;
                    random_access.push(NodeAccess { node: cur, offset, target });
                } else {
                    let (site, allele) = match frames.last() {
                        Some(f) => (f.site, Some(f.cur_allele)),
                        None => (0, None),
                    };
                    let mut node = CoverageNode::new(site, allele, cur_pos);
                    node.sequence.push(codec::decode_dna_base(m));
                    if site != 0 {
                        node.coverage.push(AtomicU16::new(0));
                    }
                    let id = nodes.len();
                    nodes.push(node);
                    nodes[cur].edges.push(id);
                    cur = id;
                    growing = true;
                    random_access.push(NodeAccess { node: id, offset: 0, target });
                }
                cur_pos += 1;
                continue;
            }

            if codec::is_site_marker(m) {
                // Site opening
                let entry = nodes.len();
                nodes.push(CoverageNode::new(m, None, cur_pos));
                nodes[cur].edges.push(entry);
                if let Some(f) = frames.last() {
                    par_map.insert(m, VariantLocus::new(f.site, f.cur_allele));
                }
                frames.push(Frame {
                    site: m,
                    entry,
                    pos_at_open: cur_pos,
                    ref_len: None,
                    cur_allele: 0,
                    allele_ends: Vec::new(),
                    empty_alleles: Vec::new(),
                });
                cur = entry;
                growing = false;
                prev_kind = Some(MarkerKind::SiteEntry { site: m });
                random_access.push(NodeAccess { node: entry, offset: 0, target });
                continue;
            }

            // Allele marker: terminate the current allele of the innermost site
            let frame = frames.last_mut().ok_or_else(|| {
                WeaverError::InvalidPrg(format!(
                    "allele marker {} at position {} outside any open site",
                    m, i
                ))
            })?;
            if m != frame.site + 1 {
                return Err(WeaverError::InvalidPrg(format!(
                    "allele marker {} at position {} does not belong to open site {}",
                    m, i, frame.site
                )));
            }
            if cur == frame.entry {
                frame.empty_alleles.push(frame.cur_allele);
            } else {
                frame.allele_ends.push(cur);
            }
            if frame.cur_allele == 0 && frame.ref_len.is_none() {
                frame.ref_len = Some(cur_pos - frame.pos_at_open);
            }

            if prg.is_site_end(i) {
                if frame.cur_allele == 0 {
                    return Err(WeaverError::InvalidPrg(format!(
                        "site {} closes with fewer than two alleles",
                        frame.site
                    )));
                }
                let frame = frames.pop().unwrap();
                let end_pos = frame.pos_at_open + frame.ref_len.unwrap();
                let end = nodes.len();
                nodes.push(CoverageNode::new(frame.site, None, end_pos));
                for &allele_end in &frame.allele_ends {
                    nodes[allele_end].edges.push(end);
                }
                for &empty in &frame.empty_alleles {
                    nodes[frame.entry].edges.insert(empty as usize, end);
                }
                bubble_map.insert(frame.site, (frame.entry, end));
                cur = end;
                growing = false;
                cur_pos = end_pos;
                prev_kind = Some(MarkerKind::SiteEnd { site: frame.site });
                random_access.push(NodeAccess { node: end, offset: 0, target });
            } else {
                prev_kind = Some(MarkerKind::AlleleEnd {
                    site: frame.site,
                    allele: frame.cur_allele,
                });
                frame.cur_allele += 1;
                cur_pos = frame.pos_at_open;
                cur = frame.entry;
                growing = false;
                random_access.push(NodeAccess { node: frame.entry, offset: 0, target });
            }
        }

        if let Some(frame) = frames.last() {
            return Err(WeaverError::InvalidPrg(format!(
                "site {} left open at end of PRG",
                frame.site
            )));
        }

        let mut graph = CoverageGraph {
            nodes,
            root,
            bubble_map,
            bubble_order: Vec::new(),
            par_map,
            child_map: HashMap::new(),
            random_access,
            final_target: prev_kind,
            is_nested: false,
        };
        graph.is_nested = !graph.par_map.is_empty();
        graph.child_map = build_child_map(&graph.par_map);
        graph.bubble_order = graph.order_bubbles();
        Ok(graph)
    }

    /// Innermost-first ordering required by the nested genotyper: children
    /// must precede their parents.
    fn order_bubbles(&self) -> Vec<Marker> {
        let mut sites: Vec<Marker> = self.bubble_map.keys().copied().collect();
        sites.sort_by(|a, b| {
            let pos_a = self.nodes[self.bubble_map[a].0].pos;
            let pos_b = self.nodes[self.bubble_map[b].0].pos;
            pos_b
                .cmp(&pos_a)
                .then_with(|| self.nesting_depth(*b).cmp(&self.nesting_depth(*a)))
                .then_with(|| a.cmp(b))
        });
        sites
    }
}

/// Inverts the parental map: parent site -> haplogroup -> child sites.
pub fn build_child_map(par_map: &HashMap<Marker, VariantLocus>) -> HashMap<Marker, HashMap<AlleleId, Vec<Marker>>> {
    let mut child_map: HashMap<Marker, HashMap<AlleleId, Vec<Marker>>> = HashMap::new();
    let mut children: Vec<(&Marker, &VariantLocus)> = par_map.iter().collect();
    children.sort_by_key(|(child, _)| **child);
    for (&child, parent) in children {
        child_map
            .entry(parent.site)
            .or_default()
            .entry(parent.allele)
            .or_default()
            .push(child);
    }
    child_map
}
