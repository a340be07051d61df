//! # scaffold-forge - De Novo Genome Assembly
//!
//! Builds a de Bruijn graph from short DNA reads, cleans tips and bubbles,
//! walks the graph into contigs and joins contigs into scaffolds using
//! mate-pair read evidence.

pub mod assembly;
pub mod core;
pub mod scaffold;
pub mod utils;

// Re-export commonly used types at crate level
pub use crate::assembly::{AssemblyOutput, AssemblyReport, DeNovoAssembler};
pub use crate::core::data_structures::*;
pub use crate::scaffold::{ScaffoldBuilder, ScaffoldSet};
pub use crate::utils::configuration::{AssemblerConfiguration, AssemblyError};

/// Result type used throughout the crate
pub type Result<T> = anyhow::Result<T>;

/// Error type used throughout the crate
pub type Error = anyhow::Error;
