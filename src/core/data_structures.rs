use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Core data structures shared by the assembly and scaffolding stages
/// Sequences, packed k-mers, contigs and scaffold paths

/// Largest k that fits a 2-bit packed `u64` with room for the canonical compare
pub const MAX_KMER_LENGTH: usize = 31;

/// Index of a contig in the contig slice handed to the scaffolder
pub type ContigId = usize;

/// Complement of a single upper-case DNA symbol; `N` maps to itself
#[inline]
pub fn complement(base: u8) -> u8 {
    match base {
        b'A' => b'T',
        b'T' => b'A',
        b'C' => b'G',
        b'G' => b'C',
        other => other,
    }
}

pub fn reverse_complement(symbols: &[u8]) -> Vec<u8> {
    symbols.iter().rev().map(|&b| complement(b)).collect()
}

#[inline]
fn encode_base(base: u8) -> Option<u64> {
    match base {
        b'A' | b'a' => Some(0b00),
        b'C' | b'c' => Some(0b01),
        b'G' | b'g' => Some(0b10),
        b'T' | b't' => Some(0b11),
        _ => None,
    }
}

#[inline]
fn decode_base(bits: u64) -> u8 {
    match bits & 0b11 {
        0b00 => b'A',
        0b01 => b'C',
        0b10 => b'G',
        _ => b'T',
    }
}

/// Immutable DNA sequence with an identifier
///
/// Symbols are stored upper-case over `A C G T N`. Construction rejects
/// anything else so downstream stages can index bytes without re-checking.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sequence {
    id: String,
    symbols: Vec<u8>,
}

impl Sequence {
    pub fn new(id: impl Into<String>, symbols: impl AsRef<[u8]>) -> Result<Self> {
        let id = id.into();
        let mut data = symbols.as_ref().to_vec();
        for (pos, base) in data.iter_mut().enumerate() {
            *base = base.to_ascii_uppercase();
            if !matches!(*base, b'A' | b'C' | b'G' | b'T' | b'N') {
                return Err(anyhow!(
                    "Invalid DNA symbol '{}' at position {} in sequence '{}'",
                    *base as char,
                    pos,
                    id
                ));
            }
        }
        Ok(Self { id, symbols: data })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn symbols(&self) -> &[u8] {
        &self.symbols
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Reverse complement, keeping the same identifier
    pub fn reverse_complement(&self) -> Self {
        Self {
            id: self.id.clone(),
            symbols: reverse_complement(&self.symbols),
        }
    }

    /// Symbols as read on the given strand
    pub fn oriented(&self, strand: Strand) -> Vec<u8> {
        match strand {
            Strand::Forward => self.symbols.clone(),
            Strand::Reverse => reverse_complement(&self.symbols),
        }
    }

    pub fn gc_count(&self) -> usize {
        self.symbols
            .iter()
            .filter(|&&b| b == b'G' || b == b'C')
            .count()
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Symbols are validated ASCII
        f.write_str(&String::from_utf8_lossy(&self.symbols))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Strand {
    Forward,
    Reverse,
}

impl Strand {
    pub fn flip(self) -> Self {
        match self {
            Strand::Forward => Strand::Reverse,
            Strand::Reverse => Strand::Forward,
        }
    }

    /// Strand reached after following an extension with the given orientation flag
    pub fn follow(self, same_orientation: bool) -> Self {
        if same_orientation {
            self
        } else {
            self.flip()
        }
    }
}

/// Compact k-mer representation using 2-bit encoding
///
/// Bases are packed right-aligned, first base in the most significant
/// position, so numeric order equals lexicographic order for equal `k`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CompactKmer {
    data: u64,
    k: u8,
}

impl CompactKmer {
    /// Create compact k-mer from DNA text
    pub fn new(seq: &str) -> Result<Self> {
        if seq.is_empty() || seq.len() > MAX_KMER_LENGTH {
            return Err(anyhow!("Invalid k-mer length: {}", seq.len()));
        }
        Self::from_bytes(seq.as_bytes())
            .ok_or_else(|| anyhow!("Invalid nucleotide in k-mer: {}", seq))
    }

    /// Pack a window of symbols; `None` if it holds anything but `ACGT`
    pub fn from_bytes(seq: &[u8]) -> Option<Self> {
        if seq.is_empty() || seq.len() > MAX_KMER_LENGTH {
            return None;
        }
        let mut data = 0u64;
        for &base in seq {
            data = (data << 2) | encode_base(base)?;
        }
        Some(Self {
            data,
            k: seq.len() as u8,
        })
    }

    pub fn from_raw(data: u64, k: usize) -> Self {
        Self { data, k: k as u8 }
    }

    pub fn data(&self) -> u64 {
        self.data
    }

    pub fn k(&self) -> usize {
        self.k as usize
    }

    fn mask(k: usize) -> u64 {
        if k >= 32 {
            u64::MAX
        } else {
            (1u64 << (2 * k)) - 1
        }
    }

    pub fn reverse_complement(&self) -> Self {
        let mut fwd = self.data;
        let mut rc = 0u64;
        for _ in 0..self.k {
            rc = (rc << 2) | (0b11 ^ (fwd & 0b11));
            fwd >>= 2;
        }
        Self {
            data: rc,
            k: self.k,
        }
    }

    /// Canonical form and whether `self` already was canonical
    pub fn canonical(&self) -> (Self, bool) {
        let rc = self.reverse_complement();
        if self.data <= rc.data {
            (*self, true)
        } else {
            (rc, false)
        }
    }

    pub fn is_palindrome(&self) -> bool {
        self.data == self.reverse_complement().data
    }

    pub fn first_base(&self) -> u8 {
        decode_base(self.data >> (2 * (self.k as u64 - 1)))
    }

    pub fn last_base(&self) -> u8 {
        decode_base(self.data)
    }

    /// Symbols read on the given strand
    pub fn oriented(&self, strand: Strand) -> Self {
        match strand {
            Strand::Forward => *self,
            Strand::Reverse => self.reverse_complement(),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        (0..self.k as u64)
            .rev()
            .map(|i| decode_base(self.data >> (2 * i)))
            .collect()
    }
}

impl fmt::Display for CompactKmer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.to_bytes()))
    }
}

/// Rolling extraction of packed k-mers from a read
///
/// Yields `(offset, kmer)` for every window free of ambiguous symbols.
/// A window containing `N` resets the roll, so the next yielded k-mer does
/// not overlap the previous one.
pub struct KmerWindows<'a> {
    seq: &'a [u8],
    k: usize,
    pos: usize,
    filled: usize,
    data: u64,
    mask: u64,
}

impl<'a> KmerWindows<'a> {
    pub fn new(seq: &'a [u8], k: usize) -> Self {
        Self {
            seq,
            k,
            pos: 0,
            filled: 0,
            data: 0,
            mask: CompactKmer::mask(k),
        }
    }
}

impl<'a> Iterator for KmerWindows<'a> {
    type Item = (usize, CompactKmer);

    fn next(&mut self) -> Option<Self::Item> {
        if self.k == 0 || self.k > MAX_KMER_LENGTH {
            return None;
        }
        while self.pos < self.seq.len() {
            let base = self.seq[self.pos];
            self.pos += 1;
            match encode_base(base) {
                Some(bits) => {
                    self.data = ((self.data << 2) | bits) & self.mask;
                    self.filled += 1;
                    if self.filled >= self.k {
                        return Some((self.pos - self.k, CompactKmer::from_raw(self.data, self.k)));
                    }
                }
                None => {
                    self.filled = 0;
                    self.data = 0;
                }
            }
        }
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContigType {
    Linear,
    Circular,
}

/// Contig produced by the graph walk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contig {
    pub id: usize,
    pub sequence: Sequence,
    /// Mean k-mer count along the node path
    pub coverage: f64,
    pub length: usize,
    /// Graph node indices in walk order
    pub node_path: Vec<usize>,
    pub contig_type: ContigType,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssemblyStats {
    pub total_length: usize,
    pub num_contigs: usize,
    pub n50: usize,
    pub n90: usize,
    pub largest_contig: usize,
    pub gc_content: f64,
    pub coverage_mean: f64,
}

impl AssemblyStats {
    pub fn from_sequences<'a, I>(sequences: I) -> Self
    where
        I: IntoIterator<Item = &'a Sequence>,
    {
        let mut lengths = Vec::new();
        let mut gc = 0usize;
        for seq in sequences {
            lengths.push(seq.len());
            gc += seq.gc_count();
        }
        let mut stats = Self::from_lengths(lengths);
        if stats.total_length > 0 {
            stats.gc_content = gc as f64 / stats.total_length as f64;
        }
        stats
    }

    pub fn from_contigs(contigs: &[Contig]) -> Self {
        let mut stats = Self::from_sequences(contigs.iter().map(|c| &c.sequence));
        if !contigs.is_empty() {
            stats.coverage_mean =
                contigs.iter().map(|c| c.coverage).sum::<f64>() / contigs.len() as f64;
        }
        stats
    }

    fn from_lengths(mut lengths: Vec<usize>) -> Self {
        lengths.sort_unstable_by(|a, b| b.cmp(a));
        let total_length: usize = lengths.iter().sum();
        let nx = |fraction: f64| -> usize {
            let target = (total_length as f64 * fraction).ceil() as usize;
            let mut running = 0;
            for &len in &lengths {
                running += len;
                if running >= target {
                    return len;
                }
            }
            0
        };
        Self {
            total_length,
            num_contigs: lengths.len(),
            n50: nx(0.5),
            n90: nx(0.9),
            largest_contig: lengths.first().copied().unwrap_or(0),
            gc_content: 0.0,
            coverage_mean: 0.0,
        }
    }
}

/// A contig read on a given strand, the unit of a scaffold path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrientedContig {
    pub contig: ContigId,
    pub strand: Strand,
}

impl OrientedContig {
    pub fn new(contig: ContigId, strand: Strand) -> Self {
        Self { contig, strand }
    }

    pub fn flipped(self) -> Self {
        Self {
            contig: self.contig,
            strand: self.strand.flip(),
        }
    }
}

/// Gap estimate attached to a scaffold link
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaffoldEdge {
    pub distance: f64,
    pub std_dev: f64,
    pub weight: usize,
}

/// Ordered walk through the scaffold graph
///
/// Each element pairs a contig with the edge that led to it from the
/// previous element; the first element carries no edge. A path and its
/// reverse complement describe the same scaffold.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScaffoldPath {
    pub steps: Vec<(OrientedContig, Option<ScaffoldEdge>)>,
}

impl ScaffoldPath {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_contigs<I: IntoIterator<Item = OrientedContig>>(contigs: I) -> Self {
        Self {
            steps: contigs.into_iter().map(|c| (c, None)).collect(),
        }
    }

    pub fn push(&mut self, contig: OrientedContig, edge: Option<ScaffoldEdge>) {
        self.steps.push((contig, edge));
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn contigs(&self) -> impl Iterator<Item = OrientedContig> + '_ {
        self.steps.iter().map(|(c, _)| *c)
    }

    pub fn oriented_contigs(&self) -> Vec<OrientedContig> {
        self.contigs().collect()
    }

    pub fn contains_contig(&self, contig: ContigId) -> bool {
        self.steps.iter().any(|(c, _)| c.contig == contig)
    }

    /// Same scaffold read from the other end
    ///
    /// Edges are symmetric, so the edge into element `i` of the result is
    /// the edge that used to lead out of it.
    pub fn reversed(&self) -> Self {
        let n = self.steps.len();
        let mut steps = Vec::with_capacity(n);
        for i in (0..n).rev() {
            let edge = if i + 1 < n { self.steps[i + 1].1 } else { None };
            steps.push((self.steps[i].0.flipped(), edge));
        }
        Self { steps }
    }

    /// Smaller of the path and its reverse, compared by oriented contigs
    pub fn canonical(&self) -> Self {
        let rev = self.reversed();
        if rev.oriented_contigs() < self.oriented_contigs() {
            rev
        } else {
            self.clone()
        }
    }

    /// True when no contig occurs twice
    pub fn is_simple(&self) -> bool {
        let mut seen: Vec<ContigId> = self.steps.iter().map(|(c, _)| c.contig).collect();
        seen.sort_unstable();
        seen.windows(2).all(|w| w[0] != w[1])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_validation() {
        let seq = Sequence::new("r1", "acgtN").unwrap();
        assert_eq!(seq.symbols(), b"ACGTN");
        assert!(Sequence::new("bad", "ACGX").is_err());
    }

    #[test]
    fn test_reverse_complement_keeps_id() {
        let seq = Sequence::new("r1", "GATTC").unwrap();
        let rc = seq.reverse_complement();
        assert_eq!(rc.symbols(), b"GAATC");
        assert_eq!(rc.id(), "r1");
    }

    #[test]
    fn test_compact_kmer_canonical() {
        let kmer = CompactKmer::new("TTT").unwrap();
        let (canonical, was_canonical) = kmer.canonical();
        assert_eq!(canonical.to_string(), "AAA");
        assert!(!was_canonical);

        let kmer = CompactKmer::new("ACG").unwrap();
        assert_eq!(kmer.reverse_complement().to_string(), "CGT");
        assert!(kmer.canonical().1);
        assert_eq!(kmer.first_base(), b'A');
        assert_eq!(kmer.last_base(), b'G');
    }

    #[test]
    fn test_palindrome_detection() {
        assert!(CompactKmer::new("ACGT").unwrap().is_palindrome());
        assert!(!CompactKmer::new("ACGA").unwrap().is_palindrome());
    }

    #[test]
    fn test_kmer_windows_skip_ambiguous() {
        let windows: Vec<(usize, String)> = KmerWindows::new(b"ACGTNACGT", 3)
            .map(|(pos, k)| (pos, k.to_string()))
            .collect();
        assert_eq!(
            windows,
            vec![
                (0, "ACG".to_string()),
                (1, "CGT".to_string()),
                (5, "ACG".to_string()),
                (6, "CGT".to_string()),
            ]
        );
    }

    #[test]
    fn test_assembly_stats_n50() {
        let seqs: Vec<Sequence> = ["AAAAAAAAAA", "CCCCC", "GG"]
            .iter()
            .enumerate()
            .map(|(i, s)| Sequence::new(format!("c{i}"), s).unwrap())
            .collect();
        let stats = AssemblyStats::from_sequences(&seqs);
        assert_eq!(stats.total_length, 17);
        assert_eq!(stats.num_contigs, 3);
        assert_eq!(stats.n50, 10);
        assert_eq!(stats.largest_contig, 10);
        assert!((stats.gc_content - 7.0 / 17.0).abs() < 1e-9);
    }

    #[test]
    fn test_scaffold_path_reversal() {
        let mut path = ScaffoldPath::new();
        path.push(OrientedContig::new(0, Strand::Forward), None);
        let edge = ScaffoldEdge {
            distance: 12.0,
            std_dev: 3.0,
            weight: 2,
        };
        path.push(OrientedContig::new(1, Strand::Reverse), Some(edge));

        let rev = path.reversed();
        assert_eq!(rev.steps[0].0, OrientedContig::new(1, Strand::Forward));
        assert_eq!(rev.steps[0].1, None);
        assert_eq!(rev.steps[1].0, OrientedContig::new(0, Strand::Reverse));
        assert_eq!(rev.steps[1].1, Some(edge));
        assert_eq!(rev.reversed(), path);
        assert!(path.is_simple());
    }
}
