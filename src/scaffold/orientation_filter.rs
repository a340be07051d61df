//! Geometric filtering of mate-pair evidence
//!
//! Keeps only pairs whose layout could come from one inward-facing
//! fragment of the declared library, picks a single direction per contig
//! pair and stamps the surviving evidence with one link orientation.

use ahash::AHashMap;
use anyhow::Result;
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::core::data_structures::{ContigId, Sequence, Strand};
use crate::core::paired_reads::{
    CloneLibraryRegistry, ContigMatePairs, InsertSizeStats, LibraryInsertSizes, LinkOrientation,
    ValidMatePair,
};

/// Layout of one mate pair relative to the contigs it landed on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairGeometry {
    /// Both mates on one contig, opposite strands, facing each other
    Innie { insert_size: usize },
    /// Both mates on one contig and one strand
    SameStrand,
    /// Both mates on one contig, opposite strands, facing away
    Outie,
    /// Mates on two contigs within library range
    Spanning(LinkOrientation),
    /// Mates on two contigs but too far from the junction
    OutOfRange,
}

/// Classify a raw pair observed on `first -> second`
///
/// Pairs are expected in the mapper's link order, so a pair on one contig
/// with mates on opposite strands always has its leading mate forward.
pub fn classify(
    pair: &ValidMatePair,
    first_len: usize,
    same_contig: bool,
    max_span: f64,
) -> PairGeometry {
    if same_contig {
        return classify_local(pair);
    }

    let orientation = pair.observed_orientation();
    let first_extent = pair.first_extent(first_len);
    let second_extent = pair.second_extent(orientation);
    if first_extent as f64 > max_span || second_extent as f64 > max_span {
        PairGeometry::OutOfRange
    } else {
        PairGeometry::Spanning(orientation)
    }
}

fn classify_local(pair: &ValidMatePair) -> PairGeometry {
    let forward_start = pair.forward_read_start;
    let reverse_last = pair.reverse_read_start;

    match (pair.forward_strand, pair.reverse_strand) {
        (Strand::Forward, Strand::Forward) | (Strand::Reverse, Strand::Reverse) => {
            PairGeometry::SameStrand
        }
        (Strand::Forward, Strand::Reverse) if forward_start <= reverse_last => PairGeometry::Innie {
            insert_size: reverse_last - forward_start + 1,
        },
        _ => PairGeometry::Outie,
    }
}

/// Result of filtering one evidence table
#[derive(Debug, Default)]
pub struct FilterOutcome {
    pub pairs: ContigMatePairs,
    /// Insert size statistics from innie pairs, per library
    pub insert_sizes: LibraryInsertSizes,
    pub discarded: usize,
}

pub struct OrientationFilter<'a> {
    libraries: &'a CloneLibraryRegistry,
    redundancy: usize,
}

impl<'a> OrientationFilter<'a> {
    /// `redundancy` is the fewest pairs a link needs; 0 keeps every link
    pub fn new(libraries: &'a CloneLibraryRegistry, redundancy: usize) -> Self {
        Self {
            libraries,
            redundancy,
        }
    }

    pub fn filter(&self, mut table: ContigMatePairs, contigs: &[Sequence]) -> Result<FilterOutcome> {
        let observed = table.pair_count();
        let mut local_inserts: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        let mut spanning: BTreeMap<(ContigId, ContigId), Vec<ValidMatePair>> = BTreeMap::new();

        for ((first, second), pairs) in table.drain() {
            let first_len = contigs.get(first).map(Sequence::len).unwrap_or(0);
            for pair in pairs {
                let library = self.libraries.get(&pair.library)?;
                match classify(&pair, first_len, first == second, library.max_span()) {
                    PairGeometry::Innie { insert_size } => {
                        local_inserts
                            .entry(pair.library.clone())
                            .or_default()
                            .push(insert_size);
                    }
                    PairGeometry::Spanning(_) => {
                        spanning.entry((first, second)).or_default().push(pair);
                    }
                    PairGeometry::SameStrand | PairGeometry::Outie | PairGeometry::OutOfRange => {}
                }
            }
        }

        resolve_directions(&mut spanning);

        if self.redundancy > 0 {
            spanning.retain(|_, pairs| pairs.len() >= self.redundancy);
        }

        let mut kept = ContigMatePairs::new();
        for ((first, second), mut pairs) in spanning {
            let orientation = majority_orientation(&pairs);
            for pair in &mut pairs {
                pair.orientation = orientation;
            }
            kept.set(first, second, pairs);
        }

        let mut insert_sizes: LibraryInsertSizes = AHashMap::new();
        for (library, samples) in local_inserts {
            if let Some(stats) = InsertSizeStats::from_samples(&samples) {
                info!(
                    "Library {}: {} innie pairs, insert mean {:.1}, sd {:.1}",
                    library, stats.samples, stats.mean, stats.std_dev
                );
                insert_sizes.insert(library, stats);
            }
        }

        let discarded = observed - kept.pair_count();
        debug!(
            "Orientation filter kept {} of {} observations on {} links",
            kept.pair_count(),
            observed,
            kept.len()
        );
        Ok(FilterOutcome {
            pairs: kept,
            insert_sizes,
            discarded,
        })
    }
}

/// Keep only the better supported direction of every contig pair
fn resolve_directions(spanning: &mut BTreeMap<(ContigId, ContigId), Vec<ValidMatePair>>) {
    let first_ordinal = |pairs: &Vec<ValidMatePair>| pairs.iter().map(|p| p.ordinal).min();
    let mut losers = Vec::new();

    for (&(a, b), forward) in spanning.iter() {
        if a > b {
            continue;
        }
        let Some(backward) = spanning.get(&(b, a)) else {
            continue;
        };
        let backward_wins = backward.len() > forward.len()
            || (backward.len() == forward.len() && first_ordinal(backward) < first_ordinal(forward));
        losers.push(if backward_wins { (a, b) } else { (b, a) });
    }

    for key in losers {
        spanning.remove(&key);
    }
}

/// Most frequent observed orientation; a tie goes to the first pair found
fn majority_orientation(pairs: &[ValidMatePair]) -> LinkOrientation {
    let support = |orientation: LinkOrientation| {
        pairs
            .iter()
            .filter(|p| p.observed_orientation() == orientation)
            .count()
    };
    let best = [
        LinkOrientation::Same,
        LinkOrientation::Flipped,
        LinkOrientation::FirstFlipped,
    ]
    .into_iter()
    .map(support)
    .max()
    .unwrap_or(0);
    pairs
        .iter()
        .filter(|p| support(p.observed_orientation()) == best)
        .min_by_key(|p| p.ordinal)
        .map(ValidMatePair::observed_orientation)
        .unwrap_or(LinkOrientation::Same)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::paired_reads::CloneLibrary;

    fn observation(
        ordinal: usize,
        forward_start: usize,
        reverse_last: usize,
        reverse_rc: usize,
        strands: (Strand, Strand),
    ) -> ValidMatePair {
        ValidMatePair {
            forward_read_id: format!("p{ordinal}.F:lib"),
            reverse_read_id: format!("p{ordinal}.R:lib"),
            library: "lib".into(),
            forward_read_start: forward_start,
            reverse_read_start: reverse_last,
            reverse_read_rc_start: reverse_rc,
            forward_strand: strands.0,
            reverse_strand: strands.1,
            distance: [0.0; 2],
            std_dev: [0.0; 2],
            weight: 1,
            orientation: LinkOrientation::from_strands(strands.0, strands.1),
            ordinal,
        }
    }

    fn contigs(n: usize, len: usize) -> Vec<Sequence> {
        (0..n)
            .map(|i| Sequence::new(format!("contig_{i}"), "A".repeat(len)).unwrap())
            .collect()
    }

    fn registry() -> CloneLibraryRegistry {
        CloneLibraryRegistry::from(vec![CloneLibrary::new("lib", 100.0, 10.0)])
    }

    const FR: (Strand, Strand) = (Strand::Forward, Strand::Reverse);
    const FF: (Strand, Strand) = (Strand::Forward, Strand::Forward);
    const RR: (Strand, Strand) = (Strand::Reverse, Strand::Reverse);

    #[test]
    fn test_classify_local_layouts() {
        // contig of 200 bases, forward mate at 10, reverse mate covering 100..=109
        let innie = observation(0, 10, 109, 99, FR);
        assert_eq!(classify(&innie, 200, true, 130.0), PairGeometry::Innie { insert_size: 100 });

        let outie = observation(0, 120, 109, 99, FR);
        assert_eq!(classify(&outie, 200, true, 130.0), PairGeometry::Outie);

        let same = observation(0, 10, 109, 99, FF);
        assert_eq!(classify(&same, 200, true, 130.0), PairGeometry::SameStrand);
    }

    #[test]
    fn test_classify_head_to_head_link() {
        // leading mate 50 bases from the start of the first contig, second mate ending at base 9
        let near = observation(0, 150, 9, 140, RR);
        assert_eq!(
            classify(&near, 200, false, 130.0),
            PairGeometry::Spanning(LinkOrientation::FirstFlipped)
        );
        let far = observation(0, 150, 140, 9, RR);
        assert_eq!(classify(&far, 200, false, 130.0), PairGeometry::OutOfRange);
    }

    #[test]
    fn test_classify_spanning_and_out_of_range() {
        let near = observation(0, 150, 9, 40, FR);
        assert_eq!(
            classify(&near, 200, false, 130.0),
            PairGeometry::Spanning(LinkOrientation::Same)
        );
        let far = observation(0, 10, 9, 40, FR);
        assert_eq!(classify(&far, 200, false, 130.0), PairGeometry::OutOfRange);
        let flipped_far = observation(0, 150, 9, 140, FF);
        assert_eq!(classify(&flipped_far, 200, false, 130.0), PairGeometry::OutOfRange);
    }

    #[test]
    fn test_minority_direction_removed() {
        let mut table = ContigMatePairs::new();
        table.insert(0, 1, observation(0, 150, 9, 40, FR));
        table.insert(0, 1, observation(1, 151, 10, 39, FR));
        table.insert(1, 0, observation(2, 150, 9, 40, FR));

        let libs = registry();
        let outcome = OrientationFilter::new(&libs, 0)
            .filter(table, &contigs(2, 200))
            .unwrap();
        assert_eq!(outcome.pairs.len(), 1);
        assert_eq!(outcome.pairs.get(0, 1).unwrap().len(), 2);
        assert_eq!(outcome.discarded, 1);
    }

    #[test]
    fn test_direction_tie_goes_to_first_discovered() {
        let mut table = ContigMatePairs::new();
        table.insert(0, 1, observation(1, 150, 9, 40, FR));
        table.insert(1, 0, observation(0, 150, 9, 40, FR));

        let libs = registry();
        let outcome = OrientationFilter::new(&libs, 0)
            .filter(table, &contigs(2, 200))
            .unwrap();
        assert!(outcome.pairs.contains(1, 0));
        assert!(!outcome.pairs.contains(0, 1));
    }

    #[test]
    fn test_redundancy_and_orientation_stamp() {
        let mut table = ContigMatePairs::new();
        table.insert(0, 1, observation(0, 150, 9, 40, FF));
        table.insert(0, 1, observation(1, 150, 9, 40, FR));
        table.insert(0, 2, observation(2, 150, 9, 40, FR));

        let libs = registry();
        let outcome = OrientationFilter::new(&libs, 2)
            .filter(table, &contigs(3, 200))
            .unwrap();
        assert!(!outcome.pairs.contains(0, 2));
        let kept = outcome.pairs.get(0, 1).unwrap();
        assert!(kept.iter().all(|p| p.orientation == LinkOrientation::Flipped));
    }

    #[test]
    fn test_innie_pairs_feed_insert_sizes() {
        let mut table = ContigMatePairs::new();
        table.insert(0, 0, observation(0, 10, 109, 90, FR));
        table.insert(0, 0, observation(1, 20, 129, 70, FR));

        let libs = registry();
        let outcome = OrientationFilter::new(&libs, 0)
            .filter(table, &contigs(1, 200))
            .unwrap();
        assert!(outcome.pairs.is_empty());
        let stats = &outcome.insert_sizes["lib"];
        assert_eq!(stats.samples, 2);
        assert!((stats.mean - 105.0).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_library_is_an_error() {
        let mut table = ContigMatePairs::new();
        let mut pair = observation(0, 150, 9, 40, FR);
        pair.library = "missing".into();
        table.insert(0, 1, pair);

        let libs = registry();
        assert!(OrientationFilter::new(&libs, 0)
            .filter(table, &contigs(2, 200))
            .is_err());
    }
}
