//! End-to-end de novo assembly
//!
//! Reads go through graph construction, tip and bubble removal, the optional
//! low-coverage purge and contig building. When scaffolding is enabled the
//! contigs and the same reads are handed to the [`ScaffoldBuilder`].

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::contig_builder::ContigBuilder;
use super::graph_construction::GraphBuilder;
use super::graph_simplification::{DanglingLinkPurger, RedundantPathPurger};
use crate::core::data_structures::{AssemblyStats, Contig, Sequence, MAX_KMER_LENGTH};
use crate::scaffold::{ScaffoldBuilder, ScaffoldRunStats, ScaffoldSet};
use crate::utils::configuration::{validate, AssemblerConfiguration, AssemblyError};

/// Statistics written next to the assembly output
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssemblyReport {
    pub name: String,
    pub kmer_length: usize,
    pub reads: usize,
    pub graph_nodes: usize,
    pub tip_nodes_removed: usize,
    pub bubble_nodes_removed: usize,
    pub low_coverage_nodes_removed: usize,
    pub contig_stats: AssemblyStats,
    pub scaffold_stats: Option<ScaffoldRunStats>,
}

/// Everything one assembly run produces
#[derive(Debug, Clone)]
pub struct AssemblyOutput {
    pub kmer_length: usize,
    pub contigs: Vec<Contig>,
    /// `None` when scaffolding is disabled
    pub scaffolds: Option<ScaffoldSet>,
    pub report: AssemblyReport,
}

/// Runs the whole pipeline from one validated configuration
pub struct DeNovoAssembler {
    config: AssemblerConfiguration,
}

impl DeNovoAssembler {
    pub fn new(config: AssemblerConfiguration) -> Result<Self> {
        validate(&config)?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &AssemblerConfiguration {
        &self.config
    }

    /// Assemble reads into contigs and, if enabled, scaffolds
    pub fn assemble(&self, reads: &[Sequence]) -> Result<AssemblyOutput> {
        if reads.is_empty() {
            return Err(AssemblyError::invalid_argument("read set is empty").into());
        }
        let k = match self.config.assembly.kmer_length {
            Some(k) => k,
            None => estimate_kmer_length(reads)?,
        };
        let threads = self.config.performance.effective_threads();
        info!("🚀 Starting de novo assembly");
        info!("   📊 Input: {} reads", reads.len());
        info!("   🧬 k-mer size: {}", k);
        info!("   ⚙️  Threads: {}", threads);

        let mut report = AssemblyReport {
            name: self.config.general.name.clone(),
            kmer_length: k,
            reads: reads.len(),
            ..AssemblyReport::default()
        };

        let mut graph = GraphBuilder::new(k, threads)?
            .with_chunk_size(self.config.performance.chunk_size)
            .build(reads)?;

        let assembly = &self.config.assembly;
        if assembly.tip_removal.enabled {
            let threshold = assembly
                .tip_removal
                .max_tip_length
                .unwrap_or_else(|| DanglingLinkPurger::default_threshold(k));
            report.tip_nodes_removed = DanglingLinkPurger::new(threshold).purge_progressive(&mut graph);
        }
        if assembly.bubble_popping.enabled {
            let threshold = assembly
                .bubble_popping
                .max_bubble_length
                .unwrap_or_else(|| RedundantPathPurger::default_threshold(k));
            report.bubble_nodes_removed = RedundantPathPurger::new(threshold).purge(&mut graph);
        }

        let builder = ContigBuilder::new();
        if assembly.low_coverage.enabled {
            let threshold = assembly
                .low_coverage
                .coverage_threshold
                .unwrap_or_else(|| ContigBuilder::default_coverage_threshold(&graph));
            report.low_coverage_nodes_removed = builder.remove_low_coverage_contigs(&mut graph, threshold)?;
        }
        report.graph_nodes = graph.len();
        debug!(
            "Graph simplified: {} tip nodes, {} bubble nodes, {} low-coverage nodes removed",
            report.tip_nodes_removed, report.bubble_nodes_removed, report.low_coverage_nodes_removed
        );

        let contigs = builder.build(&graph)?;
        report.contig_stats = AssemblyStats::from_contigs(&contigs);

        let scaffolds = if self.config.scaffold.enabled && !contigs.is_empty() {
            let sequences: Vec<Sequence> = contigs.iter().map(|c| c.sequence.clone()).collect();
            let set = self.scaffold_with(&sequences, reads, k)?;
            report.scaffold_stats = Some(set.stats().clone());
            Some(set)
        } else {
            None
        };

        info!(
            "✅ Assembly complete: {} contigs, N50 {}",
            contigs.len(),
            report.contig_stats.n50
        );
        Ok(AssemblyOutput {
            kmer_length: k,
            contigs,
            scaffolds,
            report,
        })
    }

    /// Scaffold existing contigs without assembling
    ///
    /// The mapping k-mer length falls back from the scaffold setting to the
    /// assembly setting, and is estimated from the reads when neither is set.
    pub fn scaffold(&self, contigs: &[Sequence], reads: &[Sequence]) -> Result<ScaffoldSet> {
        let k = match self.config.assembly.kmer_length {
            Some(k) => k,
            None => estimate_kmer_length(reads)?,
        };
        self.scaffold_with(contigs, reads, k)
    }

    fn scaffold_with(&self, contigs: &[Sequence], reads: &[Sequence], assembly_k: usize) -> Result<ScaffoldSet> {
        let k = self.config.scaffold.kmer_length.unwrap_or(assembly_k);
        ScaffoldBuilder::new(&self.config.scaffold, k, self.config.performance.effective_threads())?
            .build(contigs, reads)
    }
}

/// Pick a k-mer length from the read lengths when none is configured
///
/// Midpoint between half the longest read and the shortest read, made odd
/// and capped at the packed k-mer limit.
pub fn estimate_kmer_length(reads: &[Sequence]) -> Result<usize> {
    let (Some(shortest), Some(longest)) = (
        reads.iter().map(Sequence::len).min(),
        reads.iter().map(Sequence::len).max(),
    ) else {
        return Err(AssemblyError::invalid_argument("cannot estimate k from an empty read set").into());
    };

    let lower = (longest / 2).max(1);
    let upper = shortest;
    let mut k = if lower < upper {
        (lower + upper).div_ceil(2)
    } else {
        upper
    };
    if k % 2 == 0 {
        k += 1;
        if k > upper {
            k = k.saturating_sub(2);
        }
    }
    k = k.clamp(1, MAX_KMER_LENGTH);

    if upper == 0 || k > upper {
        return Err(AssemblyError::invalid_argument(format!(
            "no usable k-mer length for reads of length {shortest}..={longest}"
        ))
        .into());
    }
    debug!("Estimated k = {} from read lengths {}..={}", k, shortest, longest);
    Ok(k)
}
