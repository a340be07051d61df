//! Read-to-contig realignment
//!
//! Reads are placed back onto the assembled contigs by exact k-mer seeds
//! that are then extended base by base. Every distinct placement is kept;
//! choosing between them is left to the mate-pair stage.

use ahash::{AHashMap, AHashSet};
use anyhow::Result;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::core::data_structures::{ContigId, Sequence, Strand};
use crate::utils::configuration::AssemblyError;

/// How much of the read an alignment covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OverlapKind {
    /// Every base of the read is aligned
    Full,
    /// The alignment runs off a contig end or stops at a mismatch
    Partial,
}

/// One alignment of a read onto a contig
///
/// `read_start` is counted on the strand given by `strand`; for
/// [`Strand::Reverse`] that is the reverse complement of the read.
/// `contig_start` is always the leftmost contig base of the match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReadMap {
    pub length: usize,
    pub contig_start: usize,
    pub read_start: usize,
    pub overlap: OverlapKind,
    pub strand: Strand,
}

impl ReadMap {
    /// One past the last contig base covered
    pub fn contig_end(&self) -> usize {
        self.contig_start + self.length
    }
}

/// read id -> contig -> alignments sorted by (strand, contig start, read start)
pub type ReadContigMap = BTreeMap<String, BTreeMap<ContigId, Vec<ReadMap>>>;

/// Seed-and-extend aligner over a fixed contig set
///
/// The contigs are borrowed for the lifetime of the mapper and indexed once.
pub struct ReadContigMapper<'a> {
    contigs: &'a [Sequence],
    k: usize,
    index: AHashMap<&'a [u8], Vec<(ContigId, usize)>>,
}

impl<'a> ReadContigMapper<'a> {
    pub fn new(contigs: &'a [Sequence], k: usize) -> Result<Self> {
        if contigs.is_empty() {
            return Err(AssemblyError::invalid_argument("no contigs to map reads onto").into());
        }
        if k == 0 {
            return Err(AssemblyError::invalid_argument("k-mer length must be positive").into());
        }

        let mut index: AHashMap<&'a [u8], Vec<(ContigId, usize)>> = AHashMap::new();
        for (contig_id, contig) in contigs.iter().enumerate() {
            let symbols = contig.symbols();
            if symbols.len() < k {
                continue;
            }
            for (pos, window) in symbols.windows(k).enumerate() {
                if window.contains(&b'N') {
                    continue;
                }
                index.entry(window).or_default().push((contig_id, pos));
            }
        }
        debug!("Indexed {} distinct {}-mers over {} contigs", index.len(), k, contigs.len());

        Ok(Self { contigs, k, index })
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn contigs(&self) -> &'a [Sequence] {
        self.contigs
    }

    /// All alignments of a single read, grouped by contig
    pub fn map_read(&self, read: &Sequence) -> BTreeMap<ContigId, Vec<ReadMap>> {
        let mut result: BTreeMap<ContigId, Vec<ReadMap>> = BTreeMap::new();
        if read.len() < self.k {
            return result;
        }

        for strand in [Strand::Forward, Strand::Reverse] {
            let symbols = read.oriented(strand);
            for (contig_id, contig_pos, read_pos) in self.seeds(&symbols) {
                let map = self.extend(&symbols, contig_id, contig_pos, read_pos, strand);
                result.entry(contig_id).or_default().push(map);
            }
        }

        for maps in result.values_mut() {
            maps.sort_by_key(|m| (m.strand, m.contig_start, m.read_start, m.length));
            maps.dedup();
        }
        result
    }

    /// Map every read in parallel
    ///
    /// Duplicate read identifiers are rejected before any work is done;
    /// reads that map nowhere are absent from the result.
    pub fn map_reads(&self, reads: &[Sequence]) -> Result<ReadContigMap> {
        if reads.is_empty() {
            return Err(AssemblyError::invalid_argument("no reads to map").into());
        }
        let mut seen = AHashSet::with_capacity(reads.len());
        for read in reads {
            if !seen.insert(read.id()) {
                return Err(AssemblyError::invalid_argument(format!(
                    "duplicate read identifier '{}'",
                    read.id()
                ))
                .into());
            }
        }

        let mapped: Vec<(String, BTreeMap<ContigId, Vec<ReadMap>>)> = reads
            .par_iter()
            .map(|read| (read.id().to_string(), self.map_read(read)))
            .collect();

        let mut map = ReadContigMap::new();
        for (id, contigs) in mapped {
            if !contigs.is_empty() {
                map.insert(id, contigs);
            }
        }
        info!("Mapped {} of {} reads onto {} contigs", map.len(), reads.len(), self.contigs.len());
        Ok(map)
    }

    /// Exact k-mer seeds as `(contig, contig position, read position)`
    ///
    /// Hits on the same diagonal with consecutive read offsets collapse into
    /// a single seed at the first offset of the run.
    fn seeds(&self, symbols: &[u8]) -> Vec<(ContigId, usize, usize)> {
        let mut hits: Vec<(ContigId, isize, usize)> = Vec::new();
        for (read_pos, window) in symbols.windows(self.k).enumerate() {
            if let Some(positions) = self.index.get(window) {
                for &(contig_id, contig_pos) in positions {
                    hits.push((contig_id, contig_pos as isize - read_pos as isize, read_pos));
                }
            }
        }
        hits.sort_unstable();

        let mut seeds = Vec::new();
        let mut previous: Option<(ContigId, isize, usize)> = None;
        for hit in hits {
            let (contig_id, diagonal, read_pos) = hit;
            let continues_run = matches!(
                previous,
                Some((c, d, r)) if c == contig_id && d == diagonal && r + 1 == read_pos
            );
            if !continues_run {
                seeds.push((contig_id, (diagonal + read_pos as isize) as usize, read_pos));
            }
            previous = Some(hit);
        }
        seeds
    }

    fn extend(
        &self,
        symbols: &[u8],
        contig_id: ContigId,
        contig_pos: usize,
        read_pos: usize,
        strand: Strand,
    ) -> ReadMap {
        let contig = self.contigs[contig_id].symbols();
        let agrees = |r: usize, c: usize| symbols[r] == contig[c] && symbols[r] != b'N';

        let (mut read_start, mut contig_start) = (read_pos, contig_pos);
        while read_start > 0 && contig_start > 0 && agrees(read_start - 1, contig_start - 1) {
            read_start -= 1;
            contig_start -= 1;
        }

        let (mut read_end, mut contig_end) = (read_pos + self.k, contig_pos + self.k);
        while read_end < symbols.len() && contig_end < contig.len() && agrees(read_end, contig_end) {
            read_end += 1;
            contig_end += 1;
        }

        let length = read_end - read_start;
        ReadMap {
            length,
            contig_start,
            read_start,
            overlap: if length == symbols.len() {
                OverlapKind::Full
            } else {
                OverlapKind::Partial
            },
            strand,
        }
    }
}
