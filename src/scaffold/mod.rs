//! Mate-pair scaffolding: read mapping, pairing, distance estimation and
//! path assembly over the contig graph

pub mod distance_calculator;
pub mod mate_pair_mapper;
pub mod orientation_filter;
pub mod path_purger;
pub mod read_contig_mapper;
pub mod scaffold_builder;
pub mod scaffold_graph;

pub use distance_calculator::DistanceCalculator;
pub use mate_pair_mapper::{MatePair, MatePairMapper};
pub use orientation_filter::{FilterOutcome, OrientationFilter, PairGeometry};
pub use path_purger::PathPurger;
pub use read_contig_mapper::{OverlapKind, ReadContigMap, ReadContigMapper, ReadMap};
pub use scaffold_builder::{
    BioOverlapAligner, OverlapAligner, OverlapHit, ScaffoldBuilder, ScaffoldRunStats, ScaffoldSet,
};
pub use scaffold_graph::{PathEnumerator, ScaffoldGraph};
