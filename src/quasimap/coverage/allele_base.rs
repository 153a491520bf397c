use std::collections::HashMap;

use crate::prg::coverage_graph::{CoverageGraph, NodeAccess, NodeId, VariantLocus};
use crate::prg::PrgInfo;
use crate::quasimap::search::{SearchState, SearchStates};

/**
 * Records per-base coverage for the selected states by walking the
 * coverage graph from each mapping instance's start node.
 *
 * Writes are batched: each read first accumulates the covered coordinate
 * range per node, then the counters are incremented once per node and
 * position, saturating at u16::MAX. The increments are atomic so multiple
 * reads may record concurrently.
 */
pub fn record(prg_info: &PrgInfo, states: &SearchStates, read_length: usize) {
    let mut recorder = PbCovRecorder::new(prg_info, read_length);
    for state in states {
        recorder.process_search_state(state);
    }
    recorder.write_coverage();
}

/// Covered coordinate range within one node, extended as further mapping
/// instances of the same read touch the node.
struct DummyCovNode {
    start_pos: usize,
    end_pos: usize,
    node_size: usize,
    full: bool,
}

impl DummyCovNode {
    fn new(start_pos: usize, end_pos: usize, node_size: usize) -> Self {
        debug_assert!(start_pos <= end_pos && end_pos < node_size);
        let full = end_pos - start_pos == node_size - 1;
        DummyCovNode {
            start_pos,
            end_pos,
            node_size,
            full,
        }
    }

    fn extend_coordinates(&mut self, start_pos: usize, end_pos: usize) {
        debug_assert!(end_pos < self.node_size);
        if self.full {
            return;
        }
        if start_pos < self.start_pos {
            self.start_pos = start_pos;
        }
        if end_pos > self.end_pos {
            self.end_pos = end_pos;
        }
        if self.end_pos - self.start_pos == self.node_size - 1 {
            self.full = true;
        }
    }
}

struct PbCovRecorder<'a> {
    prg_info: &'a PrgInfo,
    read_size: usize,
    cov_mapping: HashMap<NodeId, DummyCovNode>,
}

impl<'a> PbCovRecorder<'a> {
    fn new(prg_info: &'a PrgInfo, read_size: usize) -> Self {
        PbCovRecorder {
            prg_info,
            read_size,
            cov_mapping: HashMap::new(),
        }
    }

    fn process_search_state(&mut self, state: &SearchState) {
        let graph = &self.prg_info.coverage_graph;
        let mut first = true;
        for sa_index in state.sa_interval.0..state.sa_interval.1 {
            let coordinate = self.prg_info.fm_index.sa_at(sa_index) as usize;
            let access = graph.random_access[coordinate];
            let mut traverser =
                Traverser::new(graph, access, &state.traversed_path, self.read_size);

            if first {
                first = false;
                // Full traversal from the first mapping instance
                while let Some(node) = traverser.next_node() {
                    self.process_node(node, traverser.start_pos, traverser.end_pos);
                }
            } else {
                // Alternative starts only differ in their first node
                if let Some(node) = traverser.next_node() {
                    self.process_node(node, traverser.start_pos, traverser.end_pos);
                }
            }
        }
    }

    fn process_node(&mut self, node: NodeId, start_pos: usize, end_pos: usize) {
        let graph_node = self.prg_info.coverage_graph.node(node);
        // Bubble boundary sentinels carry no sequence; invariant regions
        // carry no counters
        if !graph_node.has_sequence() || !graph_node.is_in_bubble() {
            return;
        }
        match self.cov_mapping.get_mut(&node) {
            Some(dummy) => dummy.extend_coordinates(start_pos, end_pos),
            None => {
                let dummy = DummyCovNode::new(start_pos, end_pos, graph_node.sequence_len());
                self.cov_mapping.insert(node, dummy);
            }
        }
    }

    fn write_coverage(&self) {
        for (&node, dummy) in &self.cov_mapping {
            let graph_node = self.prg_info.coverage_graph.node(node);
            for offset in dummy.start_pos..=dummy.end_pos {
                graph_node.increment_coverage(offset);
            }
        }
    }
}

/// Walks the graph for one mapping instance, choosing alleles at bubble
/// starts from the state's traversed path, consumed back to front.
struct Traverser<'a> {
    graph: &'a CoverageGraph,
    cur: Option<NodeId>,
    traversed: &'a [VariantLocus],
    traversed_index: usize,
    bases_remaining: usize,
    first_node: bool,
    start_pos: usize,
    end_pos: usize,
}

impl<'a> Traverser<'a> {
    fn new(
        graph: &'a CoverageGraph,
        start_point: NodeAccess,
        traversed: &'a [VariantLocus],
        read_size: usize,
    ) -> Self {
        Traverser {
            graph,
            cur: Some(start_point.node),
            traversed,
            traversed_index: traversed.len(),
            bases_remaining: read_size,
            first_node: true,
            start_pos: start_point.offset,
            end_pos: 0,
        }
    }

    fn next_node(&mut self) -> Option<NodeId> {
        if self.first_node {
            self.first_node = false;
            self.process_first_node();
            return self.cur;
        }
        if self.bases_remaining == 0 {
            return None;
        }
        self.go_to_next_site();
        self.cur
    }

    fn process_first_node(&mut self) {
        self.update_coordinates();
        let node = self.graph.node(self.cur.unwrap());
        if !node.is_in_bubble() {
            self.go_to_next_site();
        }
    }

    fn go_to_next_site(&mut self) {
        self.start_pos = 0;
        // Skip invariants and bubble boundaries
        while self.edges().len() == 1 {
            if self.bases_remaining == 0 {
                self.cur = None;
                return;
            }
            self.cur = Some(self.edges()[0]);
            self.update_coordinates();
            // Exiting a nested site lands back on allelic sequence
            if self.graph.node(self.cur.unwrap()).is_in_bubble() {
                return;
            }
        }
        if self.edges().is_empty() || self.bases_remaining == 0 || self.traversed_index == 0 {
            self.cur = None;
            return;
        }
        self.traversed_index -= 1;
        self.choose_allele();
        self.update_coordinates();
    }

    fn edges(&self) -> &[NodeId] {
        self.graph.node(self.cur.unwrap()).edges()
    }

    fn choose_allele(&mut self) {
        let locus = self.traversed[self.traversed_index];
        let next = self.edges()[locus.allele as usize];
        let next_node = self.graph.node(next);
        if next_node.has_sequence() {
            debug_assert_eq!(next_node.site_id(), locus.site);
            debug_assert_eq!(next_node.allele_id(), Some(locus.allele));
        }
        self.cur = Some(next);
    }

    fn update_coordinates(&mut self) {
        self.assign_end_position();
        let node = self.graph.node(self.cur.unwrap());
        if node.has_sequence() {
            self.bases_remaining -= self.end_pos - self.start_pos + 1;
        }
    }

    fn assign_end_position(&mut self) {
        self.end_pos = 0;
        let seq_size = self.graph.node(self.cur.unwrap()).sequence_len();
        if seq_size > 0 {
            self.end_pos = std::cmp::min(seq_size - 1, self.start_pos + self.bases_remaining - 1);
        }
    }
}
