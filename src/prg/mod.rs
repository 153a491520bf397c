pub mod codec;
pub mod coverage_graph;
pub mod prg_string;

use crate::fm_index::FmIndex;
use crate::prg::coverage_graph::CoverageGraph;
use crate::prg::prg_string::PrgString;
use crate::utils::errors::WeaverResult;

/// Read-only bundle of the data structures supporting vBWT search and
/// coverage recording. Owned for the process lifetime; workers share it by
/// reference.
pub struct PrgInfo {
    pub prg: PrgString,
    pub fm_index: FmIndex,
    pub coverage_graph: CoverageGraph,
}

impl PrgInfo {
    pub fn new(prg: PrgString, fm_index: FmIndex) -> WeaverResult<Self> {
        let coverage_graph = CoverageGraph::build(&prg)?;
        Ok(PrgInfo {
            prg,
            fm_index,
            coverage_graph,
        })
    }

    /// Builds every derived structure directly from a linearised PRG.
    pub fn from_prg_string(prg: PrgString) -> WeaverResult<Self> {
        let fm_index = FmIndex::build(prg.markers());
        PrgInfo::new(prg, fm_index)
    }
}
