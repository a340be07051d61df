//! Scaffold Graph and Path Enumeration
//! ===================================
//!
//! **Layman's Explanation:**
//! Every contig appears twice, once as read and once reverse complemented.
//! Mate-pair links become arrows between these copies that carry the
//! estimated gap. Scaffolds are the longest walks along the arrows that
//! never reuse a contig and never contradict a measured gap.
//!
//! **Expert Level:**
//! - `petgraph::StableDiGraph` over [`OrientedContig`] vertices, two per contig
//! - Each link adds an edge and its reverse-complement mirror
//! - Transitive links explained by a two-step walk are dropped before enumeration
//! - Depth-first enumeration bounded by a path depth, with a 3 sigma distance
//!   check against every earlier contig that links directly to the newcomer

use ahash::{AHashMap, AHashSet};
use anyhow::Result;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use tracing::{debug, info};

use crate::core::data_structures::{ContigId, OrientedContig, ScaffoldEdge, ScaffoldPath, Sequence, Strand};
use crate::core::paired_reads::{ContigMatePairs, LinkOrientation, ValidMatePair};
use crate::utils::configuration::AssemblyError;

/// Oriented contig graph with gap-annotated edges
pub struct ScaffoldGraph {
    graph: StableDiGraph<OrientedContig, ScaffoldEdge>,
    vertices: AHashMap<OrientedContig, NodeIndex>,
    contig_lengths: Vec<usize>,
}

impl ScaffoldGraph {
    /// Graph with both orientations of every contig and no edges
    pub fn new(contigs: &[Sequence]) -> Self {
        let mut graph = StableDiGraph::with_capacity(contigs.len() * 2, 0);
        let mut vertices = AHashMap::with_capacity(contigs.len() * 2);
        for id in 0..contigs.len() {
            for strand in [Strand::Forward, Strand::Reverse] {
                let vertex = OrientedContig::new(id, strand);
                vertices.insert(vertex, graph.add_node(vertex));
            }
        }
        Self {
            graph,
            vertices,
            contig_lengths: contigs.iter().map(Sequence::len).collect(),
        }
    }

    /// Graph over every usable link of a distance-annotated evidence table
    pub fn from_links(contigs: &[Sequence], table: &ContigMatePairs, redundancy: usize) -> Result<Self> {
        let mut scaffold_graph = Self::new(contigs);
        let mut skipped = 0usize;
        for (first, second, pairs) in table.iter() {
            if first >= contigs.len() || second >= contigs.len() {
                return Err(AssemblyError::invalid_argument(format!(
                    "link {first} -> {second} refers to a contig outside the set"
                ))
                .into());
            }
            for pair in pairs {
                if is_usable(pair, redundancy) {
                    scaffold_graph.add_link(first, second, pair.orientation, link_edge(pair));
                } else {
                    skipped += 1;
                }
            }
        }
        debug!(
            "Scaffold graph: {} vertices, {} edges, {} unusable links",
            scaffold_graph.graph.node_count(),
            scaffold_graph.graph.edge_count(),
            skipped
        );
        Ok(scaffold_graph)
    }

    /// Add `first -> second` and its reverse-complement mirror
    ///
    /// An existing edge between the same vertices is only replaced by a
    /// better supported one.
    pub fn add_link(&mut self, first: ContigId, second: ContigId, orientation: LinkOrientation, edge: ScaffoldEdge) {
        let (first_strand, second_strand) = orientation.strands();
        let from = OrientedContig::new(first, first_strand);
        let to = OrientedContig::new(second, second_strand);
        self.put_edge(from, to, edge);
        self.put_edge(to.flipped(), from.flipped(), edge);
    }

    fn put_edge(&mut self, from: OrientedContig, to: OrientedContig, edge: ScaffoldEdge) {
        let (Some(&a), Some(&b)) = (self.vertices.get(&from), self.vertices.get(&to)) else {
            return;
        };
        match self.graph.find_edge(a, b) {
            Some(existing) => {
                if let Some(weight) = self.graph.edge_weight_mut(existing) {
                    if edge.weight > weight.weight {
                        *weight = edge;
                    }
                }
            }
            None => {
                self.graph.add_edge(a, b, edge);
            }
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn contig_count(&self) -> usize {
        self.contig_lengths.len()
    }

    pub fn contig_len(&self, contig: ContigId) -> usize {
        self.contig_lengths.get(contig).copied().unwrap_or(0)
    }

    pub fn edge(&self, from: OrientedContig, to: OrientedContig) -> Option<ScaffoldEdge> {
        let a = *self.vertices.get(&from)?;
        let b = *self.vertices.get(&to)?;
        self.graph.find_edge(a, b).and_then(|e| self.graph.edge_weight(e)).copied()
    }

    /// Outgoing edges sorted by target
    pub fn successors(&self, from: OrientedContig) -> Vec<(OrientedContig, ScaffoldEdge)> {
        let Some(&a) = self.vertices.get(&from) else {
            return Vec::new();
        };
        let mut next: Vec<(OrientedContig, ScaffoldEdge)> = self
            .graph
            .edges_directed(a, Direction::Outgoing)
            .map(|e| (self.graph[e.target()], *e.weight()))
            .collect();
        next.sort_by_key(|(target, _)| *target);
        next
    }

    pub fn has_predecessors(&self, to: OrientedContig) -> bool {
        self.vertices
            .get(&to)
            .is_some_and(|&b| self.graph.edges_directed(b, Direction::Incoming).next().is_some())
    }

    /// Vertices in (contig, strand) order
    pub fn vertices(&self) -> Vec<OrientedContig> {
        let mut all: Vec<OrientedContig> = self.vertices.keys().copied().collect();
        all.sort_unstable();
        all
    }

    /// Drop links that a two-step walk already explains
    ///
    /// `u -> w` goes when some `u -> x -> w` spans a distance within 3 sigma
    /// of the direct estimate. Returns the number of links removed, counting
    /// an edge and its mirror once.
    pub fn reduce_transitive(&mut self) -> usize {
        let mut redundant: Vec<(OrientedContig, OrientedContig)> = Vec::new();
        for u in self.vertices() {
            let direct = self.successors(u);
            for &(w, uw) in &direct {
                let explained = direct.iter().any(|&(x, ux)| {
                    x != w
                        && x.contig != u.contig
                        && x.contig != w.contig
                        && self.edge(x, w).is_some_and(|xw| {
                            let implied = ux.distance + self.contig_len(x.contig) as f64 + xw.distance;
                            (implied - uw.distance).abs() <= 3.0 * uw.std_dev
                        })
                });
                if explained {
                    redundant.push((u, w));
                }
            }
        }

        let mut removed = 0;
        for (u, w) in redundant {
            let (Some(&a), Some(&b)) = (self.vertices.get(&u), self.vertices.get(&w)) else {
                continue;
            };
            if let Some(edge) = self.graph.find_edge(a, b) {
                self.graph.remove_edge(edge);
                removed += 1;
            }
        }
        if removed > 0 {
            debug!("Transitive reduction removed {} scaffold edges", removed);
        }
        removed / 2
    }
}

/// Enough finite, non-negative evidence to be trusted
pub fn is_usable(pair: &ValidMatePair, redundancy: usize) -> bool {
    let slot = pair.orientation.slot();
    pair.distance[slot].is_finite()
        && pair.std_dev[slot].is_finite()
        && pair.std_dev[slot] >= 0.0
        && pair.weight >= redundancy
}

fn link_edge(pair: &ValidMatePair) -> ScaffoldEdge {
    let slot = pair.orientation.slot();
    ScaffoldEdge {
        distance: pair.distance[slot],
        std_dev: pair.std_dev[slot],
        weight: pair.weight,
    }
}

/// Depth-bounded enumeration of maximal consistent walks
#[derive(Debug, Clone, Copy)]
pub struct PathEnumerator {
    depth: usize,
}

impl PathEnumerator {
    pub fn new(depth: usize) -> Result<Self> {
        if depth == 0 {
            return Err(AssemblyError::invalid_argument("scaffold path depth must be positive").into());
        }
        Ok(Self { depth })
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Maximal walks of at least two contigs, one per scaffold
    ///
    /// A walk and its reverse complement count once; the smaller form is
    /// kept at the position where either was first found.
    pub fn enumerate(&self, graph: &ScaffoldGraph) -> Vec<ScaffoldPath> {
        let mut seen: AHashSet<Vec<OrientedContig>> = AHashSet::new();
        let mut covered: AHashSet<ContigId> = AHashSet::new();
        let mut paths = Vec::new();
        let vertices = graph.vertices();

        // walks start where nothing leads in; cycles are picked up afterwards
        let sources = vertices
            .iter()
            .filter(|&&v| !graph.has_predecessors(v))
            .copied()
            .collect::<Vec<_>>();
        for start in sources {
            self.collect_from(graph, start, &mut seen, &mut covered, &mut paths);
        }
        for start in vertices {
            if !covered.contains(&start.contig) {
                self.collect_from(graph, start, &mut seen, &mut covered, &mut paths);
            }
        }

        info!("Enumerated {} scaffold paths", paths.len());
        paths
    }

    fn collect_from(
        &self,
        graph: &ScaffoldGraph,
        start: OrientedContig,
        seen: &mut AHashSet<Vec<OrientedContig>>,
        covered: &mut AHashSet<ContigId>,
        paths: &mut Vec<ScaffoldPath>,
    ) {
        if graph.successors(start).is_empty() {
            return;
        }
        let mut walk = ScaffoldPath::new();
        walk.push(start, None);
        let mut found = Vec::new();
        self.walk(graph, &mut walk, &mut found);

        for path in found {
            let canonical = path.canonical();
            if seen.insert(canonical.oriented_contigs()) {
                covered.extend(canonical.contigs().map(|c| c.contig));
                paths.push(canonical);
            }
        }
    }

    fn walk(&self, graph: &ScaffoldGraph, path: &mut ScaffoldPath, found: &mut Vec<ScaffoldPath>) {
        let mut extended = false;
        if path.len() <= self.depth {
            if let Some((last, _)) = path.steps.last().copied() {
                for (next, edge) in graph.successors(last) {
                    if path.contains_contig(next.contig) || !self.consistent(graph, path, next, &edge) {
                        continue;
                    }
                    path.push(next, Some(edge));
                    extended = true;
                    self.walk(graph, path, found);
                    path.steps.pop();
                }
            }
        }
        if !extended && path.len() >= 2 {
            found.push(path.clone());
        }
    }

    /// Every earlier contig that links straight to `next` must agree with
    /// the distance the walk implies
    fn consistent(&self, graph: &ScaffoldGraph, path: &ScaffoldPath, next: OrientedContig, edge: &ScaffoldEdge) -> bool {
        let mut ends = Vec::with_capacity(path.len());
        let mut cursor = 0.0f64;
        for (i, (contig, into)) in path.steps.iter().enumerate() {
            if i > 0 {
                cursor += into.map(|e| e.distance).unwrap_or(0.0);
            }
            cursor += graph.contig_len(contig.contig) as f64;
            ends.push(cursor);
        }
        let next_start = cursor + edge.distance;

        let predecessor = path.len() - 1;
        path.steps[..predecessor]
            .iter()
            .zip(&ends)
            .all(|((earlier, _), &end)| match graph.edge(*earlier, next) {
                Some(link) => ((next_start - end) - link.distance).abs() <= 3.0 * link.std_dev,
                None => true,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contigs(n: usize, len: usize) -> Vec<Sequence> {
        (0..n)
            .map(|i| Sequence::new(format!("contig_{i}"), "A".repeat(len)).unwrap())
            .collect()
    }

    fn edge(distance: f64) -> ScaffoldEdge {
        ScaffoldEdge {
            distance,
            std_dev: 5.0,
            weight: 2,
        }
    }

    fn fwd(c: ContigId) -> OrientedContig {
        OrientedContig::new(c, Strand::Forward)
    }

    fn rev(c: ContigId) -> OrientedContig {
        OrientedContig::new(c, Strand::Reverse)
    }

    #[test]
    fn test_links_add_mirror_edges() {
        let mut graph = ScaffoldGraph::new(&contigs(2, 100));
        assert_eq!(graph.vertex_count(), 4);
        graph.add_link(0, 1, LinkOrientation::Flipped, edge(10.0));
        assert_eq!(graph.edge_count(), 2);
        assert!(graph.edge(fwd(0), rev(1)).is_some());
        assert!(graph.edge(fwd(1), rev(0)).is_some());
        assert!(graph.edge(fwd(0), fwd(1)).is_none());

        graph.add_link(0, 1, LinkOrientation::FirstFlipped, edge(12.0));
        assert_eq!(graph.edge_count(), 4);
        assert!(graph.edge(rev(0), fwd(1)).is_some());
        assert!(graph.edge(rev(1), fwd(0)).is_some());
    }

    #[test]
    fn test_chain_enumerates_once() {
        let mut graph = ScaffoldGraph::new(&contigs(3, 100));
        graph.add_link(0, 1, LinkOrientation::Same, edge(10.0));
        graph.add_link(1, 2, LinkOrientation::Same, edge(20.0));

        let paths = PathEnumerator::new(10).unwrap().enumerate(&graph);
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].oriented_contigs(), vec![fwd(0), fwd(1), fwd(2)]);
        assert_eq!(paths[0].steps[1].1.map(|e| e.distance), Some(10.0));
    }

    #[test]
    fn test_inconsistent_extension_is_pruned() {
        let mut graph = ScaffoldGraph::new(&contigs(3, 100));
        graph.add_link(0, 1, LinkOrientation::Same, edge(10.0));
        graph.add_link(1, 2, LinkOrientation::Same, edge(20.0));
        // direct 0 -> 2 estimate far from 10 + 100 + 20
        graph.add_link(0, 2, LinkOrientation::Same, edge(400.0));

        let paths = PathEnumerator::new(10).unwrap().enumerate(&graph);
        assert!(paths.iter().all(|p| p.len() == 2));
        assert_eq!(paths.len(), 3);
    }

    #[test]
    fn test_transitive_link_reduced() {
        let mut graph = ScaffoldGraph::new(&contigs(3, 100));
        graph.add_link(0, 1, LinkOrientation::Same, edge(10.0));
        graph.add_link(1, 2, LinkOrientation::Same, edge(20.0));
        graph.add_link(0, 2, LinkOrientation::Same, edge(132.0));

        assert_eq!(graph.reduce_transitive(), 1);
        assert!(graph.edge(fwd(0), fwd(2)).is_none());
        assert!(graph.edge(rev(2), rev(0)).is_none());

        let paths = PathEnumerator::new(10).unwrap().enumerate(&graph);
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].len(), 3);
    }

    #[test]
    fn test_depth_limits_walk() {
        let mut graph = ScaffoldGraph::new(&contigs(4, 50));
        for c in 0..3 {
            graph.add_link(c, c + 1, LinkOrientation::Same, edge(5.0));
        }
        let paths = PathEnumerator::new(1).unwrap().enumerate(&graph);
        let found: Vec<Vec<OrientedContig>> = paths.iter().map(|p| p.oriented_contigs()).collect();
        assert_eq!(found, vec![vec![fwd(0), fwd(1)], vec![fwd(2), fwd(3)]]);
        assert!(PathEnumerator::new(0).is_err());
    }

    #[test]
    fn test_usable_links() {
        let mut table = ContigMatePairs::new();
        let pair = ValidMatePair {
            forward_read_id: "a".into(),
            reverse_read_id: "b".into(),
            library: "0.5K".into(),
            forward_read_start: 0,
            reverse_read_start: 9,
            reverse_read_rc_start: 11,
            forward_strand: Strand::Forward,
            reverse_strand: Strand::Forward,
            distance: [478.0, 477.0],
            std_dev: [14.1, f64::NAN],
            weight: 2,
            orientation: LinkOrientation::Flipped,
            ordinal: 0,
        };
        assert!(!is_usable(&pair, 2));
        let good = ValidMatePair {
            std_dev: [14.1, 14.1],
            ..pair
        };
        assert!(is_usable(&good, 2));
        assert!(!is_usable(&good, 3));

        table.insert(0, 1, good);
        let graph = ScaffoldGraph::from_links(&contigs(2, 12), &table, 2).unwrap();
        assert_eq!(graph.edge(fwd(0), rev(1)).map(|e| e.distance), Some(477.0));
    }
}
