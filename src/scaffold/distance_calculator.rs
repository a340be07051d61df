//! Gap estimation between linked contigs
//!
//! Every mate pair gives one gap estimate per orientation slot from the
//! library's mean insert size; the estimates of one contig pair are then
//! combined by inverse-variance weighting.

use anyhow::Result;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::core::data_structures::{ContigId, Sequence};
use crate::core::paired_reads::{CloneLibraryRegistry, ContigMatePairs, LinkOrientation, ValidMatePair};
use crate::utils::configuration::AssemblyError;

/// Variances this far below zero are rounding noise and clamp to zero
pub const VARIANCE_TOLERANCE: f64 = 1e-9;

pub struct DistanceCalculator<'a> {
    libraries: &'a CloneLibraryRegistry,
}

impl<'a> DistanceCalculator<'a> {
    pub fn new(libraries: &'a CloneLibraryRegistry) -> Result<Self> {
        libraries.validate()?;
        Ok(Self { libraries })
    }

    /// Replace every pair list with one combined estimate
    pub fn calculate(&self, table: &mut ContigMatePairs, contigs: &[Sequence]) -> Result<()> {
        let entries = table.drain();
        let links = entries.len();

        let combined: Vec<((ContigId, ContigId), ValidMatePair)> = entries
            .into_par_iter()
            .map(|((first, second), pairs)| {
                let first_len = contig_len(contigs, first)?;
                let pair = self.combine(first_len, pairs)?;
                Ok(((first, second), pair))
            })
            .collect::<Result<_>>()?;

        for ((first, second), pair) in combined {
            debug!(
                "Link {} -> {}: weight {}, distance [{:.1}, {:.1}], sd [{:.2}, {:.2}]",
                first, second, pair.weight, pair.distance[0], pair.distance[1], pair.std_dev[0], pair.std_dev[1]
            );
            table.insert(first, second, pair);
        }
        info!("Estimated distances for {} contig links", links);
        Ok(())
    }

    /// Per-pair gap estimates for both orientation slots
    pub fn observe(&self, pair: &mut ValidMatePair, first_len: usize) -> Result<()> {
        let library = self.libraries.get(&pair.library)?;
        let first_extent = pair.first_extent(first_len) as f64;
        pair.distance = [LinkOrientation::Same, LinkOrientation::Flipped]
            .map(|orientation| library.mean_insert - first_extent - pair.second_extent(orientation) as f64);
        pair.std_dev = [library.std_dev; 2];
        Ok(())
    }

    fn combine(&self, first_len: usize, mut pairs: Vec<ValidMatePair>) -> Result<ValidMatePair> {
        if pairs.is_empty() {
            return Err(AssemblyError::invalid_argument("contig link without mate pairs").into());
        }
        pairs.sort_by_key(|p| p.ordinal);

        let mut weighted = [0.0f64; 2];
        let mut precision = [0.0f64; 2];
        for pair in pairs.iter_mut() {
            self.observe(pair, first_len)?;
            for slot in 0..2 {
                let variance = pair.std_dev[slot] * pair.std_dev[slot];
                weighted[slot] += pair.distance[slot] / variance;
                precision[slot] += 1.0 / variance;
            }
        }

        let weight = pairs.len();
        let mut merged = pairs.swap_remove(0);
        for slot in 0..2 {
            let variance = checked_variance(1.0 / precision[slot])?;
            let mean = weighted[slot] / precision[slot];
            if !mean.is_finite() {
                return Err(AssemblyError::InvariantViolation {
                    message: format!("non-finite combined distance for slot {slot}"),
                }
                .into());
            }
            merged.distance[slot] = mean;
            merged.std_dev[slot] = variance.sqrt();
        }
        merged.weight = weight;
        Ok(merged)
    }
}

/// Clamp rounding noise below zero; anything worse is an invariant violation
pub fn checked_variance(variance: f64) -> Result<f64, AssemblyError> {
    if !variance.is_finite() {
        return Err(AssemblyError::InvariantViolation {
            message: format!("non-finite variance {variance}"),
        });
    }
    if variance < 0.0 {
        if variance >= -VARIANCE_TOLERANCE {
            return Ok(0.0);
        }
        return Err(AssemblyError::InvariantViolation {
            message: format!("negative variance {variance}"),
        });
    }
    Ok(variance)
}

fn contig_len(contigs: &[Sequence], id: ContigId) -> Result<usize> {
    contigs.get(id).map(Sequence::len).ok_or_else(|| {
        AssemblyError::invalid_argument(format!("contig {id} is not in the contig set")).into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::data_structures::Strand;
    use crate::core::paired_reads::{CloneLibrary, LinkOrientation};

    fn observation(ordinal: usize, library: &str, f: usize, r: usize, rrc: usize) -> ValidMatePair {
        ValidMatePair {
            forward_read_id: format!("p{ordinal}.F:{library}"),
            reverse_read_id: format!("p{ordinal}.R:{library}"),
            library: library.into(),
            forward_read_start: f,
            reverse_read_start: r,
            reverse_read_rc_start: rrc,
            forward_strand: Strand::Forward,
            reverse_strand: Strand::Reverse,
            distance: [0.0; 2],
            std_dev: [0.0; 2],
            weight: 1,
            orientation: LinkOrientation::Same,
            ordinal,
        }
    }

    fn contigs() -> Vec<Sequence> {
        vec![
            Sequence::new("contig_0", "GATCTGATAAGG").unwrap(),
            Sequence::new("contig_1", "TTTTTGATGGCA").unwrap(),
        ]
    }

    #[test]
    fn test_two_pairs_combine() {
        let libs = CloneLibraryRegistry::default();
        let calc = DistanceCalculator::new(&libs).unwrap();
        let mut table = ContigMatePairs::new();
        table.insert(0, 1, observation(0, "0.5K", 0, 9, 11));
        table.insert(0, 1, observation(1, "0.5K", 1, 10, 10));

        calc.calculate(&mut table, &contigs()).unwrap();
        let merged = table.get(0, 1).unwrap();
        assert_eq!(merged.len(), 1);
        let link = &merged[0];
        assert_eq!(link.weight, 2);
        assert!((link.distance[0] - 478.0).abs() < 1e-9);
        assert!((link.distance[1] - 477.0).abs() < 1e-9);
        assert!((link.std_dev[0] - 14.142_135_6).abs() < 1e-6);
        assert!((link.std_dev[1] - 14.142_135_6).abs() < 1e-6);
        assert_eq!(link.ordinal, 0);
        assert_eq!(link.forward_read_start, 0);
    }

    #[test]
    fn test_head_to_head_pair_measures_second_contig_forward() {
        let libs = CloneLibraryRegistry::default();
        let calc = DistanceCalculator::new(&libs).unwrap();
        let mut pair = observation(0, "0.5K", 1, 3, 8);
        pair.forward_strand = Strand::Reverse;
        pair.reverse_strand = Strand::Reverse;
        calc.observe(&mut pair, 12).unwrap();

        // 11 bases on the first contig; the second contig is not flipped, so 4 bases
        assert!((pair.distance[LinkOrientation::FirstFlipped.slot()] - 485.0).abs() < 1e-9);
        assert!((pair.distance[LinkOrientation::Same.slot()] - 480.0).abs() < 1e-9);
    }

    #[test]
    fn test_inverse_variance_favours_tight_library() {
        let libs = CloneLibraryRegistry::from(vec![
            CloneLibrary::new("tight", 500.0, 10.0),
            CloneLibrary::new("loose", 500.0, 30.0),
        ]);
        let calc = DistanceCalculator::new(&libs).unwrap();
        let mut table = ContigMatePairs::new();
        // gaps of 478 and 458 in slot 0
        table.insert(0, 1, observation(0, "tight", 0, 9, 9));
        table.insert(0, 1, observation(1, "loose", 0, 29, 29));

        calc.calculate(&mut table, &contigs()).unwrap();
        let link = &table.get(0, 1).unwrap()[0];
        // weights 1/100 and 1/900
        let expected = (478.0 / 100.0 + 458.0 / 900.0) / (1.0 / 100.0 + 1.0 / 900.0);
        assert!((link.distance[0] - expected).abs() < 1e-9);
        let sd = (1.0f64 / (1.0 / 100.0 + 1.0 / 900.0)).sqrt();
        assert!((link.std_dev[0] - sd).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_library_rejected() {
        let libs = CloneLibraryRegistry::default();
        let calc = DistanceCalculator::new(&libs).unwrap();
        let mut table = ContigMatePairs::new();
        table.insert(0, 1, observation(0, "3K", 0, 9, 11));
        assert!(calc.calculate(&mut table, &contigs()).is_err());
    }

    #[test]
    fn test_invalid_registry_rejected() {
        let libs = CloneLibraryRegistry::from(vec![CloneLibrary::new("bad", -5.0, 1.0)]);
        assert!(DistanceCalculator::new(&libs).is_err());
    }

    #[test]
    fn test_checked_variance() {
        assert_eq!(checked_variance(4.0).unwrap(), 4.0);
        assert_eq!(checked_variance(-1e-12).unwrap(), 0.0);
        assert!(matches!(
            checked_variance(-1.0),
            Err(AssemblyError::InvariantViolation { .. })
        ));
        assert!(checked_variance(f64::NAN).is_err());
        assert!(checked_variance(f64::INFINITY).is_err());
    }
}
