#[macro_use]
extern crate log;

pub mod cli;
pub mod fm_index;
pub mod genotype;
pub mod output;
pub mod prg;
pub mod quasimap;
pub mod utils;
