//! Mate-pair scaffolding
//!
//! [`ScaffoldBuilder`] runs the scaffolding stages in order: read mapping,
//! mate pairing, orientation filtering, distance estimation, path
//! enumeration and purging. It then spells every surviving path into one
//! scaffold sequence. Contigs that no path claims are passed through as
//! singleton scaffolds.

use ahash::AHashSet;
use anyhow::Result;
use bio::alignment::pairwise::{Aligner, Scoring};
use bio::alignment::AlignmentOperation;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use super::distance_calculator::DistanceCalculator;
use super::mate_pair_mapper::MatePairMapper;
use super::orientation_filter::OrientationFilter;
use super::path_purger::PathPurger;
use super::read_contig_mapper::ReadContigMapper;
use super::scaffold_graph::{PathEnumerator, ScaffoldGraph};
use crate::core::data_structures::{AssemblyStats, ContigId, ScaffoldPath, Sequence, Strand};
use crate::core::paired_reads::{CloneLibraryRegistry, InsertSizeStats};
use crate::utils::configuration::{AssemblyError, OverlapConfig, ScaffoldConfig};

/// Overlap found between the tail of one contig and the head of the next
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlapHit {
    /// One past the last base of the head that belongs to the overlap
    pub head_end: usize,
    /// Aligned columns that are matches or substitutions
    pub aligned: usize,
    /// Fraction of alignment columns that are matches
    pub identity: f64,
}

/// Local overlap primitive used to close non-positive gaps
pub trait OverlapAligner: Send + Sync {
    /// Align a suffix of `tail` against a prefix of `head`
    fn align_overlap(&self, tail: &[u8], head: &[u8]) -> Option<OverlapHit>;
}

/// Semi-global overlap alignment from `bio::alignment::pairwise`
///
/// Skipping a prefix of the tail and a suffix of the head is free; every
/// other end must be aligned.
#[derive(Debug, Clone)]
pub struct BioOverlapAligner {
    match_score: i32,
    mismatch_score: i32,
    gap_open: i32,
    gap_extend: i32,
}

impl BioOverlapAligner {
    pub fn new(config: &OverlapConfig) -> Self {
        Self {
            match_score: config.match_score,
            mismatch_score: config.mismatch_score,
            gap_open: config.gap_open,
            gap_extend: config.gap_extend,
        }
    }
}

impl OverlapAligner for BioOverlapAligner {
    fn align_overlap(&self, tail: &[u8], head: &[u8]) -> Option<OverlapHit> {
        if tail.is_empty() || head.is_empty() {
            return None;
        }
        let scoring = Scoring::from_scores(self.gap_open, self.gap_extend, self.match_score, self.mismatch_score)
            .xclip_prefix(0)
            .yclip_suffix(0);
        let mut aligner = Aligner::with_capacity_and_scoring(tail.len(), head.len(), scoring);
        let alignment = aligner.custom(tail, head);
        if alignment.score <= 0 {
            return None;
        }

        let (mut matches, mut aligned, mut columns) = (0usize, 0usize, 0usize);
        for op in &alignment.operations {
            match op {
                AlignmentOperation::Match => {
                    matches += 1;
                    aligned += 1;
                    columns += 1;
                }
                AlignmentOperation::Subst => {
                    aligned += 1;
                    columns += 1;
                }
                AlignmentOperation::Ins | AlignmentOperation::Del => columns += 1,
                AlignmentOperation::Xclip(_) | AlignmentOperation::Yclip(_) => {}
            }
        }
        if columns == 0 {
            return None;
        }
        Some(OverlapHit {
            head_end: alignment.yend,
            aligned,
            identity: matches as f64 / columns as f64,
        })
    }
}

/// Counters and statistics from one scaffolding run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScaffoldRunStats {
    pub reads_used: usize,
    pub reads_mapped: usize,
    pub mate_pairs: usize,
    pub observations: usize,
    pub discarded_observations: usize,
    pub links: usize,
    pub paths_enumerated: usize,
    pub paths_kept: usize,
    pub multi_contig_scaffolds: usize,
    pub singleton_scaffolds: usize,
    pub overlaps_merged: usize,
    pub gaps_filled: usize,
    /// Insert sizes measured from pairs landing on one contig
    pub insert_sizes: BTreeMap<String, InsertSizeStats>,
    pub sequence_stats: AssemblyStats,
}

/// Scaffolds emitted by one run, multi-contig scaffolds first
///
/// A multi-contig scaffold spells its path in order, each contig on the strand
/// the path gives it: a contig linked in opposite orientation to its
/// neighbour appears reverse complemented, and a path may spell the reverse
/// complement of the genome. Singleton scaffolds are the input contigs as given.
#[derive(Debug, Clone, Default)]
pub struct ScaffoldSet {
    scaffolds: Vec<Sequence>,
    paths: Vec<ScaffoldPath>,
    stats: ScaffoldRunStats,
}

impl ScaffoldSet {
    pub fn iter(&self) -> std::slice::Iter<'_, Sequence> {
        self.scaffolds.iter()
    }

    pub fn len(&self) -> usize {
        self.scaffolds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scaffolds.is_empty()
    }

    /// Paths behind the multi-contig scaffolds, in output order
    pub fn paths(&self) -> &[ScaffoldPath] {
        &self.paths
    }

    pub fn stats(&self) -> &ScaffoldRunStats {
        &self.stats
    }

    pub fn into_sequences(self) -> Vec<Sequence> {
        self.scaffolds
    }
}

impl IntoIterator for ScaffoldSet {
    type Item = Sequence;
    type IntoIter = std::vec::IntoIter<Sequence>;

    fn into_iter(self) -> Self::IntoIter {
        self.scaffolds.into_iter()
    }
}

impl<'a> IntoIterator for &'a ScaffoldSet {
    type Item = &'a Sequence;
    type IntoIter = std::slice::Iter<'a, Sequence>;

    fn into_iter(self) -> Self::IntoIter {
        self.scaffolds.iter()
    }
}

/// Builds scaffolds from contigs and mate-paired reads
pub struct ScaffoldBuilder {
    config: ScaffoldConfig,
    k: usize,
    aligner: Box<dyn OverlapAligner>,
    thread_pool: rayon::ThreadPool,
}

impl ScaffoldBuilder {
    pub fn new(config: &ScaffoldConfig, k: usize, num_threads: usize) -> Result<Self> {
        if k == 0 {
            return Err(AssemblyError::invalid_argument("scaffold k-mer length must be positive").into());
        }
        if config.depth == 0 {
            return Err(AssemblyError::invalid_argument("scaffold path depth must be positive").into());
        }
        config.libraries.validate()?;
        config.naming.validate()?;

        let thread_pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads.max(1))
            .thread_name(|i| format!("scaffold-worker-{i}"))
            .build()?;

        Ok(Self {
            config: config.clone(),
            k,
            aligner: Box::new(BioOverlapAligner::new(&config.overlap)),
            thread_pool,
        })
    }

    /// Replace the overlap aligner used for gap closure
    pub fn with_aligner(mut self, aligner: Box<dyn OverlapAligner>) -> Self {
        self.aligner = aligner;
        self
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn build(&self, contigs: &[Sequence], reads: &[Sequence]) -> Result<ScaffoldSet> {
        if contigs.is_empty() {
            return Err(AssemblyError::invalid_argument("no contigs to scaffold").into());
        }
        if reads.is_empty() {
            return Err(AssemblyError::invalid_argument("no reads to scaffold with").into());
        }
        info!(
            "Scaffolding {} contigs with {} reads (k = {}, depth = {})",
            contigs.len(),
            reads.len(),
            self.k,
            self.config.depth
        );
        self.thread_pool
            .install(|| ScaffoldRun::new(self, contigs).execute(reads))
    }
}

/// State owned by one scaffolding run; dropped when the run ends
struct ScaffoldRun<'b, 'c> {
    builder: &'b ScaffoldBuilder,
    contigs: &'c [Sequence],
    libraries: CloneLibraryRegistry,
    stats: ScaffoldRunStats,
}

impl<'b, 'c> ScaffoldRun<'b, 'c> {
    fn new(builder: &'b ScaffoldBuilder, contigs: &'c [Sequence]) -> Self {
        Self {
            builder,
            contigs,
            libraries: builder.config.libraries.clone(),
            stats: ScaffoldRunStats::default(),
        }
    }

    fn execute(mut self, reads: &[Sequence]) -> Result<ScaffoldSet> {
        let reads = self.paired_reads(reads);
        self.stats.reads_used = reads.len();

        let mut paths = if reads.is_empty() {
            warn!("No read identifiers follow the mate naming convention; emitting contigs as-is");
            Vec::new()
        } else {
            self.find_paths(&reads)?
        };

        PathPurger::new().purge(&mut paths);
        self.stats.paths_kept = paths.len();

        let mut claimed = vec![false; self.contigs.len()];
        let mut scaffolds = Vec::with_capacity(self.contigs.len());
        for (n, path) in paths.iter().enumerate() {
            for contig in path.contigs() {
                claimed[contig.contig] = true;
            }
            let symbols = self.render(path);
            scaffolds.push(Sequence::new(format!("scaffold_{n}"), symbols)?);
        }
        self.stats.multi_contig_scaffolds = scaffolds.len();

        for (contig, used) in self.contigs.iter().zip(&claimed) {
            if !used {
                scaffolds.push(contig.clone());
            }
        }
        self.stats.singleton_scaffolds = scaffolds.len() - self.stats.multi_contig_scaffolds;
        self.stats.sequence_stats = AssemblyStats::from_sequences(scaffolds.iter());

        info!(
            "Built {} scaffolds ({} multi-contig, {} singleton), N50 {}",
            scaffolds.len(),
            self.stats.multi_contig_scaffolds,
            self.stats.singleton_scaffolds,
            self.stats.sequence_stats.n50
        );
        debug!(
            "{} overlaps merged, {} gaps filled with N",
            self.stats.overlaps_merged, self.stats.gaps_filled
        );
        Ok(ScaffoldSet {
            scaffolds,
            paths,
            stats: self.stats,
        })
    }

    /// Reads whose identifiers name a mate, with any trailing info dropped
    ///
    /// When dropping the info makes two identifiers equal the first read keeps
    /// the name and the later ones are skipped.
    fn paired_reads(&self, reads: &[Sequence]) -> Vec<Sequence> {
        let naming = &self.builder.config.naming;
        let mut seen: AHashSet<&str> = AHashSet::new();
        let mut repeated = 0usize;
        let mut kept = Vec::new();
        for read in reads {
            if naming.parse(read.id()).is_none() {
                continue;
            }
            let id = naming.strip_other_info(read.id());
            if !seen.insert(id) {
                repeated += 1;
                continue;
            }
            kept.push(read.clone().with_id(id.to_string()));
        }
        if repeated > 0 {
            warn!(
                "Skipped {} mate reads whose identifiers repeat an earlier read once extra info is dropped",
                repeated
            );
        }
        kept
    }

    fn find_paths(&mut self, reads: &[Sequence]) -> Result<Vec<ScaffoldPath>> {
        let config = &self.builder.config;

        let mapper = ReadContigMapper::new(self.contigs, self.builder.k)?;
        let read_map = mapper.map_reads(reads)?;
        self.stats.reads_mapped = read_map.len();

        let mate_mapper = MatePairMapper::new(config.naming.clone());
        let pairs = mate_mapper.pair_reads(reads.iter().map(Sequence::id));
        self.stats.mate_pairs = pairs.len();
        let table = mate_mapper.map_pairs(&pairs, &read_map, self.contigs)?;
        self.stats.observations = table.pair_count();

        let outcome = OrientationFilter::new(&self.libraries, config.redundancy).filter(table, self.contigs)?;
        self.stats.discarded_observations = outcome.discarded;
        self.stats.insert_sizes = outcome.insert_sizes.into_iter().collect();
        let mut links = outcome.pairs;

        DistanceCalculator::new(&self.libraries)?.calculate(&mut links, self.contigs)?;
        self.stats.links = links.len();

        let mut graph = ScaffoldGraph::from_links(self.contigs, &links, config.redundancy)?;
        graph.reduce_transitive();
        let paths = PathEnumerator::new(config.depth)?.enumerate(&graph);
        self.stats.paths_enumerated = paths.len();
        Ok(paths)
    }

    fn render(&mut self, path: &ScaffoldPath) -> Vec<u8> {
        let overlap = &self.builder.config.overlap;
        let mut symbols: Vec<u8> = Vec::new();

        for (i, (contig, edge)) in path.steps.iter().enumerate() {
            let next = self.oriented(contig.contig, contig.strand);
            if i == 0 {
                symbols = next;
                continue;
            }
            match edge.map(|e| e.distance) {
                Some(gap) if gap > 0.0 => {
                    let fill = (gap.round() as usize).max(overlap.min_gap_fill);
                    symbols.extend(std::iter::repeat(b'N').take(fill));
                    symbols.extend_from_slice(&next);
                    self.stats.gaps_filled += 1;
                }
                other => {
                    let predicted = other.map(|g| (-g).round() as usize).unwrap_or(0);
                    let window = (predicted + overlap.slack).min(symbols.len()).min(next.len());
                    let tail = &symbols[symbols.len() - window..];
                    let head = &next[..window];
                    let hit = self
                        .builder
                        .aligner
                        .align_overlap(tail, head)
                        .filter(|h| h.aligned >= overlap.min_overlap && h.identity >= overlap.min_identity);
                    match hit {
                        Some(hit) => {
                            symbols.extend_from_slice(&next[hit.head_end..]);
                            self.stats.overlaps_merged += 1;
                        }
                        None => {
                            symbols.extend(std::iter::repeat(b'N').take(overlap.min_gap_fill));
                            symbols.extend_from_slice(&next);
                            self.stats.gaps_filled += 1;
                        }
                    }
                }
            }
        }
        symbols
    }

    fn oriented(&self, contig: ContigId, strand: Strand) -> Vec<u8> {
        self.contigs[contig].oriented(strand)
    }
}
