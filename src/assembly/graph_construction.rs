//! De Bruijn Graph Construction
//! ============================
//!
//! Turns reads into a de Bruijn graph whose vertices are canonical k-mers
//! and whose edges are (k-1)-base overlaps between consecutive k-mers of a
//! read.
//!
//! **Layman's Explanation:**
//! Every read is cut into overlapping words of length k. A word and its
//! mirror image on the opposite DNA strand are treated as the same word.
//! Two words are connected when one follows the other inside some read.
//!
//! **Expert Level:**
//! - Nodes live in an arena (`Vec<Option<Node>>`) addressed by [`NodeId`];
//!   deletion tombstones the slot and strips every extension pointing at it
//! - Each node keeps left and right extension lists of `(node, same_orientation)`
//! - Workers process disjoint read chunks on a dedicated rayon pool and
//!   combine per k-mer through the `DashMap` entry API
//! - Freezing sorts canonical k-mers before numbering, so node ids do not
//!   depend on thread scheduling

use ahash::AHashMap;
use anyhow::Result;
use dashmap::DashMap;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::core::data_structures::{CompactKmer, KmerWindows, Sequence, Strand, MAX_KMER_LENGTH};
use crate::utils::configuration::AssemblyError;

/// Index of a node slot in the graph arena
pub type NodeId = usize;

/// Side of a canonical k-mer an extension attaches to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }

    /// Side reached when walking forward on the given strand
    pub fn ahead(strand: Strand) -> Self {
        match strand {
            Strand::Forward => Side::Right,
            Strand::Reverse => Side::Left,
        }
    }
}

/// Adjacency entry inside a node's extension list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Extension {
    pub node: NodeId,
    /// Both k-mers are read on the same strand when crossing this edge
    pub same_orientation: bool,
}

impl Extension {
    pub fn new(node: NodeId, same_orientation: bool) -> Self {
        Self {
            node,
            same_orientation,
        }
    }
}

/// Graph vertex for one canonical k-mer
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    kmer: CompactKmer,
    count: u32,
    left: Vec<Extension>,
    right: Vec<Extension>,
}

impl Node {
    pub fn kmer(&self) -> CompactKmer {
        self.kmer
    }

    /// Number of read positions this k-mer was observed at
    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn extensions(&self, side: Side) -> &[Extension] {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    pub fn left_count(&self) -> usize {
        self.left.len()
    }

    pub fn right_count(&self) -> usize {
        self.right.len()
    }

    pub fn extension_count(&self) -> usize {
        self.left.len() + self.right.len()
    }
}

/// De Bruijn graph over canonical k-mers
#[derive(Debug, Clone)]
pub struct DeBruijnGraph {
    k: usize,
    nodes: Vec<Option<Node>>,
    index: AHashMap<u64, NodeId>,
    live: usize,
}

impl DeBruijnGraph {
    pub fn k(&self) -> usize {
        self.k
    }

    /// Number of live nodes
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Number of arena slots, tombstones included
    pub fn capacity(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id).and_then(|slot| slot.as_ref())
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    /// Live node ids in ascending order
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(id, slot)| slot.as_ref().map(|_| id))
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(id, slot)| slot.as_ref().map(|node| (id, node)))
    }

    /// Node holding the canonical form of `kmer`
    pub fn find(&self, kmer: CompactKmer) -> Option<NodeId> {
        self.index.get(&kmer.canonical().0.data()).copied()
    }

    pub fn extensions(&self, id: NodeId, side: Side) -> &[Extension] {
        self.node(id).map(|n| n.extensions(side)).unwrap_or(&[])
    }

    /// Extensions followed when walking forward while reading `id` on `strand`
    pub fn forward_extensions(&self, id: NodeId, strand: Strand) -> &[Extension] {
        self.extensions(id, Side::ahead(strand))
    }

    /// Extensions leading back toward where a forward walk came from
    pub fn backward_extensions(&self, id: NodeId, strand: Strand) -> &[Extension] {
        self.extensions(id, Side::ahead(strand).opposite())
    }

    /// K-mer symbols of `id` as read on `strand`
    pub fn kmer_on(&self, id: NodeId, strand: Strand) -> Option<CompactKmer> {
        self.node(id).map(|n| n.kmer.oriented(strand))
    }

    pub fn total_kmer_count(&self) -> u64 {
        self.nodes().map(|(_, n)| n.count as u64).sum()
    }

    pub fn edge_count(&self) -> usize {
        self.nodes().map(|(_, n)| n.extension_count()).sum::<usize>() / 2
    }

    /// Tombstone a node and strip every extension that referenced it
    pub fn remove_node(&mut self, id: NodeId) -> Option<Node> {
        let node = self.nodes.get_mut(id)?.take()?;
        for ext in node.left.iter().chain(node.right.iter()) {
            if ext.node == id {
                continue;
            }
            if let Some(Some(neighbour)) = self.nodes.get_mut(ext.node) {
                neighbour.left.retain(|e| e.node != id);
                neighbour.right.retain(|e| e.node != id);
            }
        }
        self.index.remove(&node.kmer.data());
        self.live -= 1;
        Some(node)
    }

    /// Remove a batch of nodes, returning how many were live
    pub fn remove_nodes<I: IntoIterator<Item = NodeId>>(&mut self, ids: I) -> usize {
        ids.into_iter()
            .filter_map(|id| self.remove_node(id))
            .count()
    }

    /// Check that every live extension is mirrored by its neighbour
    pub fn validate(&self) -> Result<(), AssemblyError> {
        for (id, node) in self.nodes() {
            for side in [Side::Left, Side::Right] {
                for ext in node.extensions(side) {
                    let other = self.node(ext.node).ok_or_else(|| {
                        AssemblyError::InvariantViolation {
                            message: format!("node {id} extends to deleted node {}", ext.node),
                        }
                    })?;
                    let back = Extension::new(id, ext.same_orientation);
                    if !other
                        .extensions(mirror_side(side, ext.same_orientation))
                        .contains(&back)
                    {
                        return Err(AssemblyError::InvariantViolation {
                            message: format!("extension {id} -> {} is not mirrored", ext.node),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

/// Side of the neighbour that holds the mirror of an extension on `side`
pub fn mirror_side(side: Side, same_orientation: bool) -> Side {
    if same_orientation {
        side.opposite()
    } else {
        side
    }
}

/// Per k-mer accumulator filled concurrently by the build workers
#[derive(Debug, Default)]
struct KmerRecord {
    count: u32,
    left: Vec<(u64, bool)>,
    right: Vec<(u64, bool)>,
}

impl KmerRecord {
    fn add(&mut self, side: Side, target: u64, same_orientation: bool) {
        let list = match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        };
        let entry = (target, same_orientation);
        if !list.contains(&entry) {
            list.push(entry);
        }
    }
}

/// Parallel de Bruijn graph builder
#[derive(Debug)]
pub struct GraphBuilder {
    k: usize,
    chunk_size: usize,
    thread_pool: rayon::ThreadPool,
}

impl GraphBuilder {
    /// Create a builder for k-mers of length `k` running on `num_threads` workers
    pub fn new(k: usize, num_threads: usize) -> Result<Self> {
        if k == 0 || k > MAX_KMER_LENGTH {
            return Err(AssemblyError::invalid_argument(format!(
                "k-mer length must be between 1 and {MAX_KMER_LENGTH}, got {k}"
            ))
            .into());
        }
        let thread_pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|i| format!("asm-worker-{i}"))
            .build()?;

        Ok(Self {
            k,
            chunk_size: 1_000,
            thread_pool,
        })
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn k(&self) -> usize {
        self.k
    }

    /// Build the graph from a read set
    pub fn build(&self, reads: &[Sequence]) -> Result<DeBruijnGraph> {
        if reads.is_empty() {
            return Err(AssemblyError::invalid_argument("read set is empty").into());
        }
        info!(
            "🧬 Building de Bruijn graph from {} reads (k={})",
            reads.len(),
            self.k
        );

        let table: DashMap<u64, KmerRecord> = DashMap::new();
        self.thread_pool.install(|| {
            reads.par_chunks(self.chunk_size).for_each(|batch| {
                for read in batch {
                    self.accumulate(read.symbols(), &table);
                }
            })
        });
        debug!("Collected {} distinct canonical k-mers", table.len());

        let graph = self.thread_pool.install(|| self.freeze(table));
        info!(
            "✅ Graph built: {} nodes, {} edges",
            graph.len(),
            graph.edge_count()
        );
        Ok(graph)
    }

    /// Add the k-mers and overlaps of one read to the shared table
    fn accumulate(&self, symbols: &[u8], table: &DashMap<u64, KmerRecord>) {
        let mut previous: Option<(usize, u64, bool)> = None;
        for (offset, kmer) in KmerWindows::new(symbols, self.k) {
            let (canonical, is_forward) = kmer.canonical();
            let key = canonical.data();
            let link = previous.filter(|(prev_offset, _, _)| prev_offset + 1 == offset);

            {
                let mut record = table.entry(key).or_default();
                record.count += 1;
                if let Some((_, prev_key, prev_forward)) = link {
                    let side = if is_forward { Side::Left } else { Side::Right };
                    record.add(side, prev_key, prev_forward == is_forward);
                }
            }

            if let Some((_, prev_key, prev_forward)) = link {
                let side = if prev_forward { Side::Right } else { Side::Left };
                table
                    .entry(prev_key)
                    .or_default()
                    .add(side, key, prev_forward == is_forward);
            }

            previous = Some((offset, key, is_forward));
        }
    }

    /// Number nodes in sorted k-mer order and resolve extension keys to ids
    fn freeze(&self, table: DashMap<u64, KmerRecord>) -> DeBruijnGraph {
        let mut records: Vec<(u64, KmerRecord)> = table.into_iter().collect();
        records.par_sort_unstable_by_key(|(key, _)| *key);

        let index: AHashMap<u64, NodeId> = records
            .iter()
            .enumerate()
            .map(|(id, (key, _))| (*key, id))
            .collect();

        let k = self.k;
        let resolve = |list: &[(u64, bool)]| -> Vec<Extension> {
            let mut exts: Vec<Extension> = list
                .iter()
                .filter_map(|(key, same)| index.get(key).map(|&id| Extension::new(id, *same)))
                .collect();
            exts.sort_unstable();
            exts.dedup();
            exts
        };

        let nodes: Vec<Option<Node>> = records
            .par_iter()
            .map(|(key, record)| {
                Some(Node {
                    kmer: CompactKmer::from_raw(*key, k),
                    count: record.count,
                    left: resolve(&record.left),
                    right: resolve(&record.right),
                })
            })
            .collect();

        let live = nodes.len();
        DeBruijnGraph {
            k,
            nodes,
            index,
            live,
        }
    }
}

/// Build a graph on a single worker
pub fn build_graph(reads: &[Sequence], k: usize) -> Result<DeBruijnGraph> {
    GraphBuilder::new(k, 1)?.build(reads)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reads(seqs: &[&str]) -> Vec<Sequence> {
        seqs.iter()
            .enumerate()
            .map(|(i, s)| Sequence::new(format!("r{i}"), s).unwrap())
            .collect()
    }

    #[test]
    fn test_rejects_bad_arguments() {
        assert!(GraphBuilder::new(0, 1).is_err());
        assert!(GraphBuilder::new(32, 1).is_err());
        assert!(build_graph(&[], 5).is_err());
    }

    #[test]
    fn test_linear_read_forms_chain() {
        let graph = build_graph(&reads(&["ATGGCGTGCA"]), 4).unwrap();
        assert_eq!(graph.len(), 7);
        assert_eq!(graph.edge_count(), 6);
        assert!(graph.validate().is_ok());

        let ends = graph
            .nodes()
            .filter(|(_, n)| n.extension_count() == 1)
            .count();
        assert_eq!(ends, 2);
    }

    #[test]
    fn test_reverse_complement_reads_share_nodes() {
        let fwd = build_graph(&reads(&["ATGGCGTGCA"]), 5).unwrap();
        let both = build_graph(&reads(&["ATGGCGTGCA", "TGCACGCCAT"]), 5).unwrap();
        assert_eq!(fwd.len(), both.len());
        assert_eq!(fwd.edge_count(), both.edge_count());
        assert_eq!(both.total_kmer_count(), 2 * fwd.total_kmer_count());
    }

    #[test]
    fn test_short_reads_and_ambiguous_windows() {
        let graph = build_graph(&reads(&["ACG", "ACGTNACGTT"]), 4).unwrap();
        // ACGT, ACGT(again), CGTT; the N breaks the chain between them
        assert_eq!(graph.len(), 2);
        let acgt = graph.find(CompactKmer::new("ACGT").unwrap()).unwrap();
        assert_eq!(graph.node(acgt).unwrap().count(), 2);
        assert!(graph.validate().is_ok());
    }

    #[test]
    fn test_node_ids_follow_kmer_order() {
        let graph = build_graph(&reads(&["GATTCAAGGGCTGGGGG"]), 7).unwrap();
        let kmers: Vec<u64> = graph.nodes().map(|(_, n)| n.kmer().data()).collect();
        let mut sorted = kmers.clone();
        sorted.sort_unstable();
        assert_eq!(kmers, sorted);
    }

    #[test]
    fn test_parallel_build_is_deterministic() {
        let input = reads(&["ATGGCGTGCAATGCCGTA", "GCGTGCAATG", "TACGGCATTGCACGCC"]);
        let single = build_graph(&input, 5).unwrap();
        let multi = GraphBuilder::new(5, 4)
            .unwrap()
            .with_chunk_size(1)
            .build(&input)
            .unwrap();
        let a: Vec<_> = single.nodes().map(|(id, n)| (id, n.clone())).collect();
        let b: Vec<_> = multi.nodes().map(|(id, n)| (id, n.clone())).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_remove_node_strips_mirrors() {
        let mut graph = build_graph(&reads(&["ATGGCGTGCA"]), 4).unwrap();
        let middle = graph.find(CompactKmer::new("GCGT").unwrap()).unwrap();
        assert!(graph.remove_node(middle).is_some());
        assert!(!graph.contains(middle));
        assert_eq!(graph.len(), 6);
        assert_eq!(graph.edge_count(), 4);
        assert!(graph.validate().is_ok());
        assert!(graph.remove_node(middle).is_none());
    }
}
