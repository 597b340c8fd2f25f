#![deny(missing_docs)]

//! Search graph over hyperparameter assignments: per-role knob ranges and
//! edges, neighbor enumeration, and seeded random starts.

mod graph;
mod subgraph;

pub use graph::{CoupledPair, SearchGraph, MAX_START_ATTEMPTS};
pub use subgraph::SubGraph;
