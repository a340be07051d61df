//! Graph simplification: dangling links and redundant paths
//!
//! Sequencing errors show up in a de Bruijn graph as short side branches
//! that end nowhere (dangling links, or tips) and as short parallel paths
//! that leave and rejoin the main path (redundant paths, or bubbles). Both
//! purgers detect against the current graph, delete in one batch, and repeat
//! until a round deletes nothing.

use ahash::AHashSet;
use std::collections::BTreeSet;
use tracing::{debug, info};

use super::graph_construction::{DeBruijnGraph, NodeId};
use crate::core::data_structures::Strand;

/// Removes dangling links of at most `threshold` nodes
#[derive(Debug, Clone, Copy)]
pub struct DanglingLinkPurger {
    threshold: usize,
}

impl DanglingLinkPurger {
    pub fn new(threshold: usize) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Default threshold for a given k
    pub fn default_threshold(k: usize) -> usize {
        k + 1
    }

    /// Detect every dangling link in the current graph
    pub fn detect(&self, graph: &DeBruijnGraph) -> Vec<Vec<NodeId>> {
        let mut links = Vec::new();
        for (id, node) in graph.nodes() {
            if node.extension_count() == 0 {
                links.push(vec![id]);
            } else if node.right_count() == 0 {
                links.extend(self.trace_link(graph, id, Strand::Reverse));
            } else if node.left_count() == 0 {
                links.extend(self.trace_link(graph, id, Strand::Forward));
            }
        }
        links
    }

    /// Walk inward from a dead end, reading it on `strand`
    ///
    /// Returns `None` when the walk exceeds the threshold.
    fn trace_link(&self, graph: &DeBruijnGraph, start: NodeId, strand: Strand) -> Option<Vec<NodeId>> {
        let mut link: Vec<NodeId> = Vec::new();
        let mut current = start;
        let mut current_strand = strand;

        loop {
            let ahead = graph.forward_extensions(current, current_strand);
            let behind = graph.backward_extensions(current, current_strand);

            if ahead.is_empty() {
                // Other end of an isolated chain
                return self.add_to_link(link, current).map(|(link, _)| link);
            }
            if behind.len() > 1 {
                // Junction; the link stops before it
                return Some(link);
            }
            let (next_link, stop) = self.add_to_link(link, current)?;
            link = next_link;
            if ahead.len() > 1 || stop {
                return Some(link);
            }

            let ext = ahead[0];
            current = ext.node;
            current_strand = current_strand.follow(ext.same_orientation);
        }
    }

    /// Append a node, reporting whether the walk must stop at a loop
    fn add_to_link(&self, mut link: Vec<NodeId>, node: NodeId) -> Option<(Vec<NodeId>, bool)> {
        if link.contains(&node) {
            return Some((link, true));
        }
        if link.len() >= self.threshold {
            return None;
        }
        link.push(node);
        Some((link, false))
    }

    /// Delete dangling links until none remain; returns the number of nodes removed
    pub fn purge(&self, graph: &mut DeBruijnGraph) -> usize {
        let mut removed = 0;
        loop {
            let doomed: BTreeSet<NodeId> = self.detect(graph).into_iter().flatten().collect();
            if doomed.is_empty() {
                break;
            }
            removed += graph.remove_nodes(doomed);
        }
        if removed > 0 {
            debug!(
                "Dangling link purge (threshold {}) removed {} nodes",
                self.threshold, removed
            );
        }
        removed
    }

    /// Purge at every threshold from 1 up to this one, shortest links first
    pub fn purge_progressive(&self, graph: &mut DeBruijnGraph) -> usize {
        let removed = (1..=self.threshold)
            .map(|t| DanglingLinkPurger::new(t).purge(graph))
            .sum();
        info!(
            "✂️  Removed {} nodes in dangling links (threshold {})",
            removed, self.threshold
        );
        removed
    }
}

/// Collapses parallel paths of at most `threshold` nodes onto the best one
#[derive(Debug, Clone, Copy)]
pub struct RedundantPathPurger {
    threshold: usize,
}

/// Diverging paths that start and end at the same pair of nodes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathCluster {
    /// Each path starts at the branching node and ends at the merge node
    pub paths: Vec<Vec<NodeId>>,
}

impl PathCluster {
    pub fn start(&self) -> NodeId {
        self.paths[0][0]
    }

    pub fn end(&self) -> NodeId {
        self.paths[0][self.paths[0].len() - 1]
    }
}

impl RedundantPathPurger {
    pub fn new(threshold: usize) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Default threshold for a given k
    pub fn default_threshold(k: usize) -> usize {
        3 * (k + 1)
    }

    /// Find every bubble in the current graph, each reported once
    pub fn detect(&self, graph: &DeBruijnGraph) -> Vec<PathCluster> {
        let mut clusters = Vec::new();
        for (id, node) in graph.nodes() {
            if node.right_count() > 1 {
                clusters.extend(self.trace_diverging(graph, id, Strand::Forward));
            }
            if node.left_count() > 1 {
                clusters.extend(self.trace_diverging(graph, id, Strand::Reverse));
            }
        }
        Self::remove_duplicates(graph, clusters)
    }

    /// Follow every branch out of `start` in lockstep until they meet
    fn trace_diverging(&self, graph: &DeBruijnGraph, start: NodeId, strand: Strand) -> Option<PathCluster> {
        let mut paths: Vec<(Vec<NodeId>, Strand)> = graph
            .forward_extensions(start, strand)
            .iter()
            .map(|ext| (vec![start, ext.node], strand.follow(ext.same_orientation)))
            .collect();
        let mut length = 2;

        while length <= self.threshold {
            if paths.iter().any(|(nodes, s)| {
                let end = nodes[nodes.len() - 1];
                graph.forward_extensions(end, *s).len() != 1
            }) {
                return None;
            }

            for (nodes, s) in paths.iter_mut() {
                let end = nodes[nodes.len() - 1];
                let ext = graph.forward_extensions(end, *s)[0];
                if nodes.contains(&ext.node) {
                    return None;
                }
                nodes.push(ext.node);
                *s = s.follow(ext.same_orientation);
            }
            length += 1;

            let first_end = paths[0].0[paths[0].0.len() - 1];
            if paths.iter().all(|(nodes, _)| nodes[nodes.len() - 1] == first_end) {
                return Some(PathCluster {
                    paths: paths.into_iter().map(|(nodes, _)| nodes).collect(),
                });
            }
        }
        None
    }

    /// A bubble is found from both of its ends; keep the copy whose start
    /// k-mer is not smaller than its end k-mer
    fn remove_duplicates(graph: &DeBruijnGraph, clusters: Vec<PathCluster>) -> Vec<PathCluster> {
        let ends: AHashSet<(NodeId, NodeId)> =
            clusters.iter().map(|c| (c.start(), c.end())).collect();
        clusters
            .into_iter()
            .filter(|c| {
                if !ends.contains(&(c.end(), c.start())) {
                    return true;
                }
                match (graph.node(c.start()), graph.node(c.end())) {
                    (Some(s), Some(e)) => s.kmer() >= e.kmer(),
                    _ => false,
                }
            })
            .collect()
    }

    /// Index of the path with the highest summed k-mer count; first wins ties
    fn best_path(graph: &DeBruijnGraph, cluster: &PathCluster) -> usize {
        let mut best = 0;
        let mut best_sum: Option<u64> = None;
        for (i, path) in cluster.paths.iter().enumerate() {
            let sum: u64 = path
                .iter()
                .filter_map(|&id| graph.node(id))
                .map(|n| n.count() as u64)
                .sum();
            if best_sum.map_or(true, |b| sum > b) {
                best_sum = Some(sum);
                best = i;
            }
        }
        best
    }

    /// Nodes to delete for one round of bubble popping
    pub fn nodes_to_remove(&self, graph: &DeBruijnGraph) -> BTreeSet<NodeId> {
        let mut doomed = BTreeSet::new();
        for cluster in self.detect(graph) {
            let best = Self::best_path(graph, &cluster);
            let keep: AHashSet<NodeId> = cluster.paths[best].iter().copied().collect();
            let losers: Vec<NodeId> = cluster
                .paths
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != best)
                .flat_map(|(_, path)| path.iter().copied())
                .filter(|id| !keep.contains(id))
                .collect();

            let touched = cluster
                .paths
                .iter()
                .flatten()
                .any(|id| doomed.contains(id));
            if touched {
                continue;
            }
            doomed.extend(losers);
        }
        doomed
    }

    /// Pop bubbles until none remain; returns the number of nodes removed
    pub fn purge(&self, graph: &mut DeBruijnGraph) -> usize {
        let mut removed = 0;
        loop {
            let doomed = self.nodes_to_remove(graph);
            if doomed.is_empty() {
                break;
            }
            removed += graph.remove_nodes(doomed);
        }
        info!(
            "🫧 Removed {} nodes in redundant paths (threshold {})",
            removed, self.threshold
        );
        removed
    }
}
