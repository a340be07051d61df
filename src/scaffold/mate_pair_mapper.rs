//! Mate pairing and contig-pair evidence collection
//!
//! Reads are paired through the configured [`MateNamingConvention`]; each
//! pair whose mates both landed on contigs becomes one raw
//! [`ValidMatePair`] per contig combination, with the mates put in the
//! order the fragment crosses the link.

use ahash::AHashMap;
use anyhow::Result;
use crossbeam_channel::unbounded;
use rayon::prelude::*;
use std::collections::BTreeMap;
use tracing::{debug, info};

use super::read_contig_mapper::{OverlapKind, ReadContigMap, ReadMap};
use crate::core::data_structures::{ContigId, Sequence, Strand};
use crate::core::paired_reads::{
    ContigMatePairs, LinkOrientation, MateNamingConvention, ReadOrientation, ValidMatePair,
};
use crate::utils::configuration::AssemblyError;

/// Two reads recognised as mates of one fragment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatePair {
    pub forward_read_id: String,
    pub reverse_read_id: String,
    pub library: String,
}

#[derive(Default)]
struct PendingMates {
    library: String,
    forward: Option<String>,
    reverse: Option<String>,
}

/// Message sent from mapping workers to the merging consumer
struct PairMessage {
    pair_index: usize,
    combination: usize,
    key: (ContigId, ContigId),
    pair: ValidMatePair,
}

pub struct MatePairMapper {
    naming: MateNamingConvention,
}

impl MatePairMapper {
    pub fn new(naming: MateNamingConvention) -> Self {
        Self { naming }
    }

    pub fn naming(&self) -> &MateNamingConvention {
        &self.naming
    }

    /// Group read identifiers into mate pairs
    ///
    /// Pairs are returned in the order their first mate appears. When the
    /// same mate slot is claimed twice the first read wins.
    pub fn pair_reads<'r, I>(&self, read_ids: I) -> Vec<MatePair>
    where
        I: IntoIterator<Item = &'r str>,
    {
        let mut slots: AHashMap<(String, String), usize> = AHashMap::new();
        let mut pending: Vec<PendingMates> = Vec::new();
        let mut unparsed = 0usize;

        for id in read_ids {
            let Some(tag) = self.naming.parse(id) else {
                unparsed += 1;
                continue;
            };
            let slot = *slots
                .entry((tag.stem, tag.library.clone()))
                .or_insert_with(|| {
                    pending.push(PendingMates {
                        library: tag.library,
                        ..Default::default()
                    });
                    pending.len() - 1
                });
            let mates = &mut pending[slot];
            let target = match tag.orientation {
                ReadOrientation::Forward => &mut mates.forward,
                ReadOrientation::Reverse => &mut mates.reverse,
            };
            if target.is_none() {
                *target = Some(id.to_string());
            }
        }

        let pairs: Vec<MatePair> = pending
            .into_iter()
            .filter_map(|mates| match (mates.forward, mates.reverse) {
                (Some(forward_read_id), Some(reverse_read_id)) => Some(MatePair {
                    forward_read_id,
                    reverse_read_id,
                    library: mates.library,
                }),
                _ => None,
            })
            .collect();
        debug!("Paired {} mates ({} identifiers without a mate tag)", pairs.len(), unparsed);
        pairs
    }

    /// Turn mate pairs into raw contig-pair evidence
    ///
    /// Workers send their findings over a channel to a single consumer; the
    /// consumer orders messages by pair and combination before numbering, so
    /// ordinals do not depend on scheduling.
    pub fn map_pairs(
        &self,
        pairs: &[MatePair],
        read_map: &ReadContigMap,
        contigs: &[Sequence],
    ) -> Result<ContigMatePairs> {
        let (tx, rx) = unbounded::<PairMessage>();

        let mut messages = std::thread::scope(|scope| {
            let consumer = scope.spawn(move || rx.iter().collect::<Vec<_>>());

            pairs
                .par_iter()
                .enumerate()
                .for_each_with(tx, |tx, (pair_index, mates)| {
                    for (combination, (key, pair)) in
                        evidence_for(mates, read_map, contigs).into_iter().enumerate()
                    {
                        // the consumer outlives every sender
                        let _ = tx.send(PairMessage {
                            pair_index,
                            combination,
                            key,
                            pair,
                        });
                    }
                });

            consumer.join()
        })
        .map_err(|_| AssemblyError::InvariantViolation {
            message: "mate pair consumer thread panicked".to_string(),
        })?;

        messages.sort_unstable_by_key(|m| (m.pair_index, m.combination));

        let mut table = ContigMatePairs::new();
        for (ordinal, message) in messages.into_iter().enumerate() {
            let mut pair = message.pair;
            pair.ordinal = ordinal;
            table.insert(message.key.0, message.key.1, pair);
        }
        info!(
            "Collected {} mate pair observations over {} contig pairs",
            table.pair_count(),
            table.len()
        );
        Ok(table)
    }
}

/// One mate's preferred alignment on one contig
#[derive(Clone, Copy)]
struct MateHit<'m> {
    read_id: &'m str,
    contig: ContigId,
    contig_len: usize,
    map: &'m ReadMap,
}

/// Every contig combination supported by one pair, keyed in link order
fn evidence_for(
    mates: &MatePair,
    read_map: &ReadContigMap,
    contigs: &[Sequence],
) -> Vec<((ContigId, ContigId), ValidMatePair)> {
    let (Some(forward_maps), Some(reverse_maps)) = (
        read_map.get(&mates.forward_read_id),
        read_map.get(&mates.reverse_read_id),
    ) else {
        return Vec::new();
    };
    let forward_hits = mate_hits(&mates.forward_read_id, forward_maps, contigs);
    let reverse_hits = mate_hits(&mates.reverse_read_id, reverse_maps, contigs);

    let mut evidence = Vec::new();
    for &forward in &forward_hits {
        for &reverse in &reverse_hits {
            let (lead, trail) = link_order(forward, reverse);
            evidence.push(((lead.contig, trail.contig), raw_pair(&mates.library, lead, trail)));
        }
    }
    evidence
}

fn mate_hits<'m>(
    read_id: &'m str,
    maps: &'m BTreeMap<ContigId, Vec<ReadMap>>,
    contigs: &[Sequence],
) -> Vec<MateHit<'m>> {
    maps.iter()
        .filter_map(|(&contig, found)| {
            Some(MateHit {
                read_id,
                contig,
                contig_len: contigs.get(contig).map(Sequence::len)?,
                map: preferred_map(found)?,
            })
        })
        .collect()
}

/// Full alignments first, then the longest, then the earliest
pub fn preferred_map(maps: &[ReadMap]) -> Option<&ReadMap> {
    maps.iter().enumerate().min_by_key(|(i, m)| {
        let rank = match m.overlap {
            OverlapKind::Full => 0,
            OverlapKind::Partial => 1,
        };
        (rank, std::cmp::Reverse(m.length), *i)
    })
    .map(|(_, m)| m)
}

/// Order two mates so the first leads into the link
///
/// A forward mate on the reverse strand with its reverse mate on the forward
/// strand is a fragment from the other genome strand; read from its far end
/// by swapping the mates it becomes a forward-strand fragment. Mates on one
/// strand keep their order and link contigs of opposite orientation.
fn link_order<'m>(forward: MateHit<'m>, reverse: MateHit<'m>) -> (MateHit<'m>, MateHit<'m>) {
    match (forward.map.strand, reverse.map.strand) {
        (Strand::Reverse, Strand::Forward) => (reverse, forward),
        _ => (forward, reverse),
    }
}

fn raw_pair(library: &str, lead: MateHit<'_>, trail: MateHit<'_>) -> ValidMatePair {
    let forward_read_start = match lead.map.strand {
        Strand::Forward => lead.map.contig_start,
        Strand::Reverse => lead.contig_len.saturating_sub(lead.map.contig_end()),
    };
    ValidMatePair {
        forward_read_id: lead.read_id.to_string(),
        reverse_read_id: trail.read_id.to_string(),
        library: library.to_string(),
        forward_read_start,
        reverse_read_start: trail.map.contig_end().saturating_sub(1),
        reverse_read_rc_start: trail.contig_len.saturating_sub(trail.map.contig_start + 1),
        forward_strand: lead.map.strand,
        reverse_strand: trail.map.strand,
        distance: [0.0; 2],
        std_dev: [0.0; 2],
        weight: 1,
        orientation: LinkOrientation::from_strands(lead.map.strand, trail.map.strand),
        ordinal: 0,
    }
}
