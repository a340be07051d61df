//! Mate-pair evidence through mapping, filtering, distance estimation and
//! scaffold rendering

mod common;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use scaffold_forge::core::data_structures::{
    reverse_complement, OrientedContig, ScaffoldPath, Sequence, Strand,
};
use scaffold_forge::core::paired_reads::{
    CloneLibraryRegistry, ContigMatePairs, LinkOrientation, MateNamingConvention,
};
use scaffold_forge::scaffold::{
    DistanceCalculator, MatePairMapper, OrientationFilter, OverlapKind, PathPurger, ReadContigMapper,
    ScaffoldBuilder,
};
use scaffold_forge::utils::configuration::ScaffoldConfig;

const IRS1: &str = ">gi|263191773|ref|NG_015830.1| Homo sapiens insulin receptor substrate 1 (IRS1) on chromosome 2";
const RECEPTOR: &str = ">gi|263191773|ref|NG_015830.1| Homo sapiens insulin receptor on chromosome 2";
const DOTTED: &str = ">gi|263191773|ref | Homo sapiens ........insulin receptor on chromosome 2";

fn seq(id: &str, symbols: &str) -> Sequence {
    Sequence::new(id, symbols).unwrap()
}

fn regression_reads(first_reverse_mate: &str) -> Vec<Sequence> {
    vec![
        seq(&format!("{IRS1}.X1:0.5K"), "GATCTGATAA"),
        seq(&format!("{RECEPTOR}.F:0.5K"), "ATCTGATAAG"),
        seq(&format!("{DOTTED}.2:0.5K"), "TCTGATAAGG"),
        seq(&format!("{IRS1}.Y1:0.5K"), first_reverse_mate),
        seq(&format!("{RECEPTOR}.R:0.5K"), "TTTTGATGGC"),
        seq(&format!("{DOTTED}.1:0.5K"), "TTTGATGGCA"),
    ]
}

/// Run mapping, pairing, filtering and distance estimation
fn distances(contigs: &[Sequence], reads: &[Sequence], libraries: &CloneLibraryRegistry) -> ContigMatePairs {
    let read_map = ReadContigMapper::new(contigs, 6).unwrap().map_reads(reads).unwrap();
    let mapper = MatePairMapper::new(MateNamingConvention::default());
    let pairs = mapper.pair_reads(reads.iter().map(Sequence::id));
    assert_eq!(pairs.len(), 3);
    let table = mapper.map_pairs(&pairs, &read_map, contigs).unwrap();

    let mut links = OrientationFilter::new(libraries, 0).filter(table, contigs).unwrap().pairs;
    DistanceCalculator::new(libraries)
        .unwrap()
        .calculate(&mut links, contigs)
        .unwrap();
    links
}

#[test]
fn test_exact_substring_read_maps_full() {
    let contigs = vec![seq("contig_0", "GATCTGATAAGG")];
    let mapper = ReadContigMapper::new(&contigs, 6).unwrap();
    let maps = mapper.map_read(&seq("r", "ATCTGATAAG"));
    let hits = &maps[&0];
    assert!(hits.iter().any(|m| m.overlap == OverlapKind::Full
        && m.read_start == 0
        && m.contig_start == 1
        && m.length == 10
        && m.strand == Strand::Forward));
}

#[test]
fn test_distance_regression() {
    let contigs = vec![seq("A", "GATCTGATAAGG"), seq("B", "TTTTTGATGGCA")];
    let libraries = CloneLibraryRegistry::default();
    let links = distances(&contigs, &regression_reads("TTTTTGATGG"), &libraries);

    // the lone B -> A pair loses to the two A -> B pairs
    assert_eq!(links.len(), 1);
    assert!(links.get(1, 0).is_none());
    let entry = links.get(0, 1).unwrap();
    assert_eq!(entry.len(), 1);
    let link = &entry[0];
    assert_eq!(link.weight, 2);
    assert!((link.distance[0] - 478.0).abs() < 1e-9);
    assert!((link.distance[1] - 477.0).abs() < 1e-9);
    assert!((link.std_dev[0] - 14.142_135_6).abs() < 1e-6);
    assert!((link.std_dev[1] - 14.142_135_6).abs() < 1e-6);
}

#[test]
fn test_distance_regression_on_reverse_complemented_contig() {
    let contigs = vec![seq("A", "GATCTGATAAGG"), seq("B", "TGCCATCAAAAA")];
    let libraries = CloneLibraryRegistry::default();
    let links = distances(&contigs, &regression_reads("CCATCAAAAA"), &libraries);

    // the third pair's forward mate lies on the reverse strand of B; read from
    // its far end it supports A -> B as well
    assert_eq!(links.len(), 1);
    assert!(links.get(1, 0).is_none());
    let link = &links.get(0, 1).unwrap()[0];
    assert_eq!(link.weight, 3);
    assert_eq!(link.orientation, LinkOrientation::Same);
    assert!((link.distance[0] - 478.0).abs() < 1e-9);
    assert!((link.distance[1] - 478.0).abs() < 1e-9);
    assert!((link.std_dev[0] - 20.0 / 3f64.sqrt()).abs() < 1e-9);
}

#[test]
fn test_regression_contigs_scaffold_with_unlinked_singleton() {
    let contigs = vec![
        seq("A", "GATCTGATAAGG"),
        seq("B", "TTTTTGATGGCA"),
        seq("contig_2", "CCCCCCCCCCCCCCCC"),
    ];
    let builder = ScaffoldBuilder::new(&ScaffoldConfig::default(), 6, 2).unwrap();
    let set = builder.build(&contigs, &regression_reads("TTTTTGATGG")).unwrap();

    assert_eq!(set.len(), 2);
    assert_eq!(set.stats().multi_contig_scaffolds, 1);
    assert_eq!(set.stats().singleton_scaffolds, 1);

    let scaffolds: Vec<&Sequence> = set.iter().collect();
    assert_eq!(scaffolds[0].id(), "scaffold_0");
    let mut expected = b"GATCTGATAAGG".to_vec();
    expected.extend(std::iter::repeat(b'N').take(477));
    expected.extend(reverse_complement(b"TTTTTGATGGCA"));
    assert!(common::is_same_or_reverse(scaffolds[0].symbols(), &expected));

    // untouched contig keeps its identifier and sequence
    assert_eq!(scaffolds[1], &contigs[2]);
}

#[test]
fn test_simulated_gap_is_filled_with_estimated_length() {
    let genome = common::random_genome(1200, 42);
    let mut contigs_reads = common::tile(&genome, 0..500, 40, 4, "left");
    contigs_reads.extend(common::tile(&genome, 700..1200, 40, 4, "right"));
    let contigs = vec![
        seq("left", std::str::from_utf8(&genome[..500]).unwrap()),
        seq("right", std::str::from_utf8(&genome[700..]).unwrap()),
    ];
    let mut reads = contigs_reads;
    reads.extend(common::mate_pairs(&genome, (250..=450).step_by(20), 500, 40, "0.5K"));

    let builder = ScaffoldBuilder::new(&ScaffoldConfig::default(), 21, 2).unwrap();
    let set = builder.build(&contigs, &reads).unwrap();

    assert_eq!(set.len(), 1);
    assert_eq!(set.stats().mate_pairs, 11);
    let mut expected = genome[..500].to_vec();
    expected.extend(std::iter::repeat(b'N').take(200));
    expected.extend_from_slice(&genome[700..]);
    let scaffold = set.iter().next().unwrap();
    assert!(common::is_same_or_reverse(scaffold.symbols(), &expected));
}

#[test]
fn test_reverse_strand_library_fills_gap() {
    let genome = common::random_genome(1200, 42);
    let contigs = vec![
        seq("left", std::str::from_utf8(&genome[..500]).unwrap()),
        seq("right", std::str::from_utf8(&genome[700..]).unwrap()),
    ];
    let reads = common::stranded_mate_pairs(&genome, (250..=450).step_by(20), 500, 40, "0.5K", |_| {
        Strand::Reverse
    });

    let builder = ScaffoldBuilder::new(&ScaffoldConfig::default(), 21, 2).unwrap();
    let set = builder.build(&contigs, &reads).unwrap();

    assert_eq!(set.len(), 1);
    assert_eq!(set.stats().discarded_observations, 0);
    let path: Vec<OrientedContig> = set.paths()[0].oriented_contigs();
    assert!(
        path == vec![OrientedContig::new(0, Strand::Forward), OrientedContig::new(1, Strand::Forward)]
            || path == vec![OrientedContig::new(1, Strand::Reverse), OrientedContig::new(0, Strand::Reverse)]
    );
    let scaffold = set.iter().next().unwrap();
    assert_eq!(scaffold.len(), 1200);
    let mut expected = genome[..500].to_vec();
    expected.extend(std::iter::repeat(b'N').take(200));
    expected.extend_from_slice(&genome[700..]);
    assert!(common::is_same_or_reverse(scaffold.symbols(), &expected));
}

#[test]
fn test_mixed_strand_library_keeps_every_observation() {
    let genome = common::random_genome(1200, 42);
    let contigs = vec![
        seq("left", std::str::from_utf8(&genome[..500]).unwrap()),
        seq("right", std::str::from_utf8(&genome[700..]).unwrap()),
    ];
    let reads = common::stranded_mate_pairs(&genome, (250..=450).step_by(10), 500, 40, "0.5K", |i| {
        if i % 2 == 0 {
            Strand::Forward
        } else {
            Strand::Reverse
        }
    });
    let libraries = CloneLibraryRegistry::default();
    let read_map = ReadContigMapper::new(&contigs, 21).unwrap().map_reads(&reads).unwrap();
    let mapper = MatePairMapper::new(MateNamingConvention::default());
    let pairs = mapper.pair_reads(reads.iter().map(Sequence::id));
    assert_eq!(pairs.len(), 21);
    let table = mapper.map_pairs(&pairs, &read_map, &contigs).unwrap();

    let outcome = OrientationFilter::new(&libraries, 0).filter(table, &contigs).unwrap();
    assert_eq!(outcome.discarded, 0);
    let mut links = outcome.pairs;
    DistanceCalculator::new(&libraries)
        .unwrap()
        .calculate(&mut links, &contigs)
        .unwrap();
    let link = &links.get(0, 1).unwrap()[0];
    assert_eq!(link.weight, 21);
    assert_eq!(link.orientation, LinkOrientation::Same);
    assert!((link.distance[0] - 200.0).abs() < 1e-9);
}

#[test]
fn test_path_purge_independent_of_order() {
    let fwd = |start: usize, len: usize| {
        ScaffoldPath::from_contigs((start..start + len).map(|c| OrientedContig::new(c, Strand::Forward)))
    };
    let full: Vec<OrientedContig> = fwd(0, 11).oriented_contigs();
    let pieces = vec![
        fwd(0, 2),
        fwd(3, 5),
        fwd(6, 2),
        fwd(3, 3),
        fwd(7, 2),
        fwd(8, 2),
        fwd(2, 2),
        fwd(1, 2),
        fwd(8, 3),
    ];

    let mut rng = StdRng::seed_from_u64(7);
    for round in 0..25 {
        let mut paths = pieces.clone();
        paths.shuffle(&mut rng);
        if round % 2 == 1 {
            paths = paths.iter().map(ScaffoldPath::reversed).collect();
        }
        PathPurger::new().purge(&mut paths);
        assert_eq!(paths.len(), 1);
        let found = paths[0].oriented_contigs();
        assert!(found == full || paths[0].reversed().oriented_contigs() == full);
    }
}
