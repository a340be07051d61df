//! Read simulation shared by the integration tests
#![allow(dead_code)]

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use scaffold_forge::core::data_structures::{reverse_complement, Sequence, Strand};

/// Uniform random genome from a fixed seed
pub fn random_genome(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len).map(|_| b"ACGT"[rng.gen_range(0..4)]).collect()
}

/// Error-free reads of `read_len` starting every `step` bases of `region`
pub fn tile(genome: &[u8], region: std::ops::Range<usize>, read_len: usize, step: usize, prefix: &str) -> Vec<Sequence> {
    (region.start..=region.end - read_len)
        .step_by(step)
        .map(|start| {
            Sequence::new(format!("{prefix}_{start}"), &genome[start..start + read_len])
                .expect("genome bases are valid")
        })
        .collect()
}

/// Innie mate pairs of one library drawn from the forward genome strand
pub fn mate_pairs(
    genome: &[u8],
    starts: impl IntoIterator<Item = usize>,
    insert: usize,
    read_len: usize,
    library: &str,
) -> Vec<Sequence> {
    stranded_mate_pairs(genome, starts, insert, read_len, library, |_| Strand::Forward)
}

/// Innie mate pairs with fragment `i` read from the genome strand `strand_of(i)`
///
/// The forward mate reads the fragment start and the reverse mate the reverse
/// complement of its end. On the reverse strand the fragment starts at the
/// genome's `start + insert` and runs back to `start`.
pub fn stranded_mate_pairs(
    genome: &[u8],
    starts: impl IntoIterator<Item = usize>,
    insert: usize,
    read_len: usize,
    library: &str,
    strand_of: impl Fn(usize) -> Strand,
) -> Vec<Sequence> {
    let mut reads = Vec::new();
    for (i, start) in starts.into_iter().enumerate() {
        let end = start + insert;
        let left = &genome[start..start + read_len];
        let right = &genome[end - read_len..end];
        let (forward, reverse) = match strand_of(i) {
            Strand::Forward => (left.to_vec(), reverse_complement(right)),
            Strand::Reverse => (reverse_complement(right), left.to_vec()),
        };
        reads.push(Sequence::new(format!("frag{i}.F:{library}"), forward).expect("valid mate"));
        reads.push(Sequence::new(format!("frag{i}.R:{library}"), reverse).expect("valid mate"));
    }
    reads
}

pub fn is_same_or_reverse(found: &[u8], expected: &[u8]) -> bool {
    found == expected || found == reverse_complement(expected).as_slice()
}
