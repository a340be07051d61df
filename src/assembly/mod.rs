//! Contig assembly
//!
//! - `graph_construction` - parallel de Bruijn graph builder over canonical k-mers
//! - `graph_simplification` - dangling-link and redundant-path purgers
//! - `contig_builder` - simple-path walks into linear and circular contigs
//! - `assembler` - the end-to-end pipeline, including scaffolding

pub mod assembler;
pub mod contig_builder;
pub mod graph_construction;
pub mod graph_simplification;

pub use assembler::{estimate_kmer_length, AssemblyOutput, AssemblyReport, DeNovoAssembler};
pub use contig_builder::ContigBuilder;
pub use graph_construction::{build_graph, DeBruijnGraph, GraphBuilder, NodeId, Side};
pub use graph_simplification::{DanglingLinkPurger, PathCluster, RedundantPathPurger};
