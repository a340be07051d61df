//! Contig construction from a simplified de Bruijn graph
//!
//! Ambiguous adjacency is cut first so that every node has at most one
//! neighbour per side; the remaining simple paths are spelled into contigs.
//! The graph itself is only borrowed.

use ahash::AHashSet;
use anyhow::Result;
use tracing::{debug, info};

use super::graph_construction::{mirror_side, DeBruijnGraph, Extension, NodeId, Side};
use crate::core::data_structures::{reverse_complement, Contig, ContigType, Sequence, Strand};
use crate::utils::configuration::AssemblyError;

/// Adjacency with branching sides, palindromes and self-loops cut away
struct SimpleAdjacency {
    sides: Vec<[Vec<Extension>; 2]>,
}

fn side_index(side: Side) -> usize {
    match side {
        Side::Left => 0,
        Side::Right => 1,
    }
}

impl SimpleAdjacency {
    fn new(graph: &DeBruijnGraph) -> Self {
        let mut sides: Vec<[Vec<Extension>; 2]> = vec![Default::default(); graph.capacity()];
        for (id, node) in graph.nodes() {
            sides[id] = [
                node.extensions(Side::Left).to_vec(),
                node.extensions(Side::Right).to_vec(),
            ];
        }
        let mut adjacency = Self { sides };

        for (id, node) in graph.nodes() {
            let palindrome = node.kmer().is_palindrome();
            for side in [Side::Left, Side::Right] {
                let exts = node.extensions(side);
                if palindrome || exts.len() > 1 {
                    for &ext in exts {
                        adjacency.cut(id, side, ext);
                    }
                } else if exts.len() == 1 && exts[0].node == id {
                    adjacency.cut(id, side, exts[0]);
                }
            }
        }
        adjacency
    }

    fn cut(&mut self, id: NodeId, side: Side, ext: Extension) {
        self.sides[id][side_index(side)].retain(|e| *e != ext);
        let back = Extension::new(id, ext.same_orientation);
        self.sides[ext.node][side_index(mirror_side(side, ext.same_orientation))].retain(|e| *e != back);
    }

    fn count(&self, id: NodeId, side: Side) -> usize {
        self.sides[id][side_index(side)].len()
    }

    fn ahead(&self, id: NodeId, strand: Strand) -> Option<Extension> {
        self.sides[id][side_index(Side::ahead(strand))].first().copied()
    }
}

/// A simple path before it becomes a [`Contig`]
#[derive(Debug, Clone)]
struct SimplePath {
    nodes: Vec<NodeId>,
    symbols: Vec<u8>,
    contig_type: ContigType,
}

/// Walks simple paths of a de Bruijn graph into contigs
#[derive(Debug, Clone, Copy, Default)]
pub struct ContigBuilder;

impl ContigBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Spell every simple path of the graph
    ///
    /// Contigs are numbered in the order of the node their walk starts from;
    /// circular contigs follow the linear ones.
    pub fn build(&self, graph: &DeBruijnGraph) -> Result<Vec<Contig>> {
        let paths = self.simple_paths(graph);
        let mut contigs = Vec::with_capacity(paths.len());
        for (n, path) in paths.into_iter().enumerate() {
            let coverage = mean_count(graph, &path.nodes);
            let sequence = Sequence::new(format!("contig_{n}"), &path.symbols)?;
            contigs.push(Contig {
                id: n,
                length: sequence.len(),
                sequence,
                coverage,
                node_path: path.nodes,
                contig_type: path.contig_type,
            });
        }

        let circular = contigs
            .iter()
            .filter(|c| c.contig_type == ContigType::Circular)
            .count();
        info!(
            "🧩 Built {} contigs ({} circular) from {} nodes",
            contigs.len(),
            circular,
            graph.len()
        );
        Ok(contigs)
    }

    /// Delete the nodes of every simple path whose mean k-mer count is below
    /// `threshold`; returns the number of nodes removed
    pub fn remove_low_coverage_contigs(&self, graph: &mut DeBruijnGraph, threshold: f64) -> Result<usize> {
        if !(threshold.is_finite() && threshold > 0.0) {
            return Err(AssemblyError::invalid_argument(format!(
                "coverage threshold must be a positive number, got {threshold}"
            ))
            .into());
        }

        let doomed: Vec<NodeId> = self
            .simple_paths(graph)
            .into_iter()
            .filter(|path| mean_count(graph, &path.nodes) < threshold)
            .flat_map(|path| path.nodes)
            .collect();
        let removed = graph.remove_nodes(doomed);
        info!(
            "🧹 Removed {} nodes on contigs below coverage {:.2}",
            removed, threshold
        );
        Ok(removed)
    }

    /// Square root of the median of k-mer counts above 2, or 2 when no count exceeds 2
    pub fn default_coverage_threshold(graph: &DeBruijnGraph) -> f64 {
        let mut counts: Vec<u32> = graph
            .nodes()
            .map(|(_, n)| n.count())
            .filter(|&c| c > 2)
            .collect();
        if counts.is_empty() {
            return 2.0;
        }
        counts.sort_unstable();
        let mid = counts.len() / 2;
        let median = if counts.len() % 2 == 1 {
            counts[mid] as f64
        } else {
            (counts[mid] as f64 + counts[mid - 1] as f64) / 2.0
        };
        median.sqrt()
    }

    fn simple_paths(&self, graph: &DeBruijnGraph) -> Vec<SimplePath> {
        let adjacency = SimpleAdjacency::new(graph);
        let mut visited = vec![false; graph.capacity()];
        let mut paths = Vec::new();

        for id in graph.node_ids() {
            let left = adjacency.count(id, Side::Left);
            let right = adjacency.count(id, Side::Right);
            let start = match (left, right) {
                (0, 0) => {
                    visited[id] = true;
                    if let Some(kmer) = graph.kmer_on(id, Strand::Forward) {
                        paths.push(SimplePath {
                            nodes: vec![id],
                            symbols: kmer.to_bytes(),
                            contig_type: ContigType::Linear,
                        });
                    }
                    continue;
                }
                (0, 1) => Strand::Forward,
                (1, 0) => Strand::Reverse,
                _ => continue,
            };
            if let Some(path) = trace(graph, &adjacency, &mut visited, id, start, false) {
                paths.push(path);
            }
        }

        // Whatever is left lies on cycles
        for id in graph.node_ids() {
            if visited[id] {
                continue;
            }
            if let Some(path) = trace(graph, &adjacency, &mut visited, id, Strand::Forward, true) {
                debug!("Closed a cycle of {} nodes", path.nodes.len());
                paths.push(path);
            }
        }
        paths
    }
}

/// Walk from `start` read on `strand` until the path ends or closes on itself
///
/// A linear path is walked from both of its ends; only the walk whose start
/// k-mer is not smaller than its end k-mer is kept.
fn trace(
    graph: &DeBruijnGraph,
    adjacency: &SimpleAdjacency,
    visited: &mut [bool],
    start: NodeId,
    strand: Strand,
    circular: bool,
) -> Option<SimplePath> {
    let mut nodes = vec![start];
    let mut on_path: AHashSet<NodeId> = AHashSet::new();
    on_path.insert(start);
    visited[start] = true;
    let mut symbols = graph.kmer_on(start, strand)?.to_bytes();

    let mut current = start;
    let mut current_strand = strand;
    while let Some(ext) = adjacency.ahead(current, current_strand) {
        if !on_path.insert(ext.node) {
            break;
        }
        current = ext.node;
        current_strand = current_strand.follow(ext.same_orientation);
        visited[current] = true;
        nodes.push(current);
        symbols.push(graph.kmer_on(current, current_strand)?.last_base());
    }

    if !circular {
        let first = graph.node(start)?.kmer();
        let last = graph.node(current)?.kmer();
        if first < last {
            return None;
        }
    }

    if strand == Strand::Reverse {
        symbols = reverse_complement(&symbols);
        nodes.reverse();
    }
    Some(SimplePath {
        nodes,
        symbols,
        contig_type: if circular {
            ContigType::Circular
        } else {
            ContigType::Linear
        },
    })
}

fn mean_count(graph: &DeBruijnGraph, nodes: &[NodeId]) -> f64 {
    if nodes.is_empty() {
        return 0.0;
    }
    let total: u64 = nodes
        .iter()
        .filter_map(|&id| graph.node(id))
        .map(|n| n.count() as u64)
        .sum();
    total as f64 / nodes.len() as f64
}
