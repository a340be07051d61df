use ahash::AHashMap;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::core::data_structures::{ContigId, Strand};
use crate::utils::configuration::AssemblyError;

/// Mate-pair support for scaffolding
///
/// This module provides:
/// - The read naming convention that ties two mates together
/// - Clone library registrations (expected insert size and spread)
/// - The contig-pair evidence table shared by the scaffolding stages
/// - Insert size estimation from mates landing on a single contig

/// Which end of the fragment a mate was sequenced from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReadOrientation {
    Forward,
    Reverse,
}

/// Pairing information recovered from a read identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MateTag {
    /// Read name shared by both mates
    pub stem: String,
    /// Which mate this read is
    pub orientation: ReadOrientation,
    /// Clone library name carried in the identifier
    pub library: String,
}

/// Convention used to recognise mates from read identifiers
///
/// With the defaults an identifier looks like `<stem>.<suffix>:<library>`,
/// optionally followed by `!<other info>` which is ignored. `suffix` must
/// appear in one of the `(forward, reverse)` suffix pairs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MateNamingConvention {
    pub suffix_separator: char,
    pub library_separator: char,
    /// Everything after this character is dropped before parsing
    pub info_separator: Option<char>,
    pub suffix_pairs: Vec<(String, String)>,
}

impl Default for MateNamingConvention {
    fn default() -> Self {
        let pairs = [
            ("X1", "Y1"),
            ("F", "R"),
            ("1", "2"),
            ("x1", "y1"),
            ("f", "r"),
            ("a", "b"),
            ("A", "B"),
        ];
        Self {
            suffix_separator: '.',
            library_separator: ':',
            info_separator: Some('!'),
            suffix_pairs: pairs
                .iter()
                .map(|(f, r)| (f.to_string(), r.to_string()))
                .collect(),
        }
    }
}

impl MateNamingConvention {
    /// Drop any trailing "other info" section from a read identifier
    pub fn strip_other_info<'a>(&self, id: &'a str) -> &'a str {
        match self.info_separator {
            Some(sep) => id.split(sep).next().unwrap_or(id),
            None => id,
        }
    }

    /// Parse a read identifier; `None` if it does not follow the convention
    pub fn parse(&self, id: &str) -> Option<MateTag> {
        let id = self.strip_other_info(id);
        let (head, library) = id.rsplit_once(self.library_separator)?;
        let (stem, suffix) = head.rsplit_once(self.suffix_separator)?;
        if stem.is_empty() || library.is_empty() {
            return None;
        }
        let orientation = self.suffix_pairs.iter().find_map(|(fwd, rev)| {
            if suffix == fwd {
                Some(ReadOrientation::Forward)
            } else if suffix == rev {
                Some(ReadOrientation::Reverse)
            } else {
                None
            }
        })?;
        Some(MateTag {
            stem: stem.to_string(),
            orientation,
            library: library.to_string(),
        })
    }

    pub fn validate(&self) -> Result<(), AssemblyError> {
        if self.suffix_pairs.is_empty() {
            return Err(AssemblyError::ValidationError {
                field: "scaffold.naming.suffix_pairs".to_string(),
                reason: "at least one suffix pair is required".to_string(),
            });
        }
        for (fwd, rev) in &self.suffix_pairs {
            if fwd.is_empty() || rev.is_empty() || fwd == rev {
                return Err(AssemblyError::ValidationError {
                    field: "scaffold.naming.suffix_pairs".to_string(),
                    reason: format!("invalid suffix pair ({fwd}, {rev})"),
                });
            }
        }
        Ok(())
    }
}

/// Insert size registration for one sequencing library
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloneLibrary {
    pub name: String,
    /// Mean fragment length in bases
    pub mean_insert: f64,
    /// Standard deviation of fragment length
    pub std_dev: f64,
}

impl CloneLibrary {
    pub fn new(name: impl Into<String>, mean_insert: f64, std_dev: f64) -> Self {
        Self {
            name: name.into(),
            mean_insert,
            std_dev,
        }
    }

    pub fn variance(&self) -> f64 {
        self.std_dev * self.std_dev
    }

    /// Longest span a mate may sit from the junction and still be plausible
    pub fn max_span(&self) -> f64 {
        self.mean_insert + 3.0 * self.std_dev
    }
}

/// Clone libraries known to one assembly run, looked up by name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<CloneLibrary>", into = "Vec<CloneLibrary>")]
pub struct CloneLibraryRegistry {
    libraries: BTreeMap<String, CloneLibrary>,
}

impl Default for CloneLibraryRegistry {
    fn default() -> Self {
        Self::from(vec![
            CloneLibrary::new("0.5K", 500.0, 20.0),
            CloneLibrary::new("2K", 2000.0, 100.0),
            CloneLibrary::new("5K", 5000.0, 500.0),
            CloneLibrary::new("10K", 10000.0, 1000.0),
        ])
    }
}

impl From<Vec<CloneLibrary>> for CloneLibraryRegistry {
    fn from(libraries: Vec<CloneLibrary>) -> Self {
        Self {
            libraries: libraries
                .into_iter()
                .map(|lib| (lib.name.clone(), lib))
                .collect(),
        }
    }
}

impl From<CloneLibraryRegistry> for Vec<CloneLibrary> {
    fn from(registry: CloneLibraryRegistry) -> Self {
        registry.libraries.into_values().collect()
    }
}

impl CloneLibraryRegistry {
    pub fn empty() -> Self {
        Self {
            libraries: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, library: CloneLibrary) {
        self.libraries.insert(library.name.clone(), library);
    }

    pub fn get(&self, name: &str) -> Result<&CloneLibrary, AssemblyError> {
        self.libraries
            .get(name)
            .ok_or_else(|| AssemblyError::UnknownLibrary {
                name: name.to_string(),
            })
    }

    pub fn len(&self) -> usize {
        self.libraries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.libraries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CloneLibrary> {
        self.libraries.values()
    }

    pub fn validate(&self) -> Result<(), AssemblyError> {
        for lib in self.libraries.values() {
            if !(lib.mean_insert.is_finite() && lib.mean_insert > 0.0) {
                return Err(AssemblyError::ValidationError {
                    field: format!("scaffold.libraries.{}.mean_insert", lib.name),
                    reason: "must be a positive number".to_string(),
                });
            }
            if !(lib.std_dev.is_finite() && lib.std_dev > 0.0) {
                return Err(AssemblyError::ValidationError {
                    field: format!("scaffold.libraries.{}.std_dev", lib.name),
                    reason: "must be a positive number".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// How the two contigs of a link are placed relative to each other
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkOrientation {
    /// Both contigs read as given
    Same,
    /// Second contig is reverse complemented, the contigs meet at their ends
    Flipped,
    /// First contig is reverse complemented, the contigs meet at their starts
    FirstFlipped,
}

impl LinkOrientation {
    /// Index into the two-slot distance arrays of [`ValidMatePair`]
    pub fn slot(self) -> usize {
        match self {
            LinkOrientation::Same => 0,
            LinkOrientation::Flipped | LinkOrientation::FirstFlipped => 1,
        }
    }

    /// Scaffold strands of the first and second contig
    pub fn strands(self) -> (Strand, Strand) {
        match self {
            LinkOrientation::Same => (Strand::Forward, Strand::Forward),
            LinkOrientation::Flipped => (Strand::Forward, Strand::Reverse),
            LinkOrientation::FirstFlipped => (Strand::Reverse, Strand::Forward),
        }
    }

    /// Orientation implied by the strands the two mates mapped on
    ///
    /// Mates of an inward-facing library lie on opposite strands of the
    /// fragment, so opposite mapping strands mean both contigs share the
    /// fragment's orientation. Mates on one strand put the contigs in
    /// opposite orientations: tail to tail when the leading mate mapped
    /// forward, head to head when it mapped reverse.
    pub fn from_strands(forward: Strand, reverse: Strand) -> Self {
        match (forward, reverse) {
            (Strand::Forward, Strand::Reverse) | (Strand::Reverse, Strand::Forward) => {
                LinkOrientation::Same
            }
            (Strand::Forward, Strand::Forward) => LinkOrientation::Flipped,
            (Strand::Reverse, Strand::Reverse) => LinkOrientation::FirstFlipped,
        }
    }
}

/// Mate pair evidence linking a first contig to a second contig
///
/// The `forward_*` fields describe the mate leading into the link and the
/// `reverse_*` fields the mate on the second contig. The mapper puts pairs
/// in this order, so the leading mate is not always the read named as the
/// forward mate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidMatePair {
    pub forward_read_id: String,
    pub reverse_read_id: String,
    pub library: String,
    /// Start of the leading mate on the first contig as placed in the link,
    /// counted from the contig's end when the mate mapped on the reverse strand
    pub forward_read_start: usize,
    /// Last base of the reverse mate on its contig
    pub reverse_read_start: usize,
    /// Same position counted from the far end of the reverse mate's contig
    pub reverse_read_rc_start: usize,
    pub forward_strand: Strand,
    pub reverse_strand: Strand,
    /// Gap estimate, slot 0 with both contigs in one orientation, slot 1 opposed
    pub distance: [f64; 2],
    pub std_dev: [f64; 2],
    /// Number of raw observations merged into this entry
    pub weight: usize,
    pub orientation: LinkOrientation,
    /// Discovery order, used for deterministic tie-breaks
    pub ordinal: usize,
}

impl ValidMatePair {
    pub fn observed_orientation(&self) -> LinkOrientation {
        LinkOrientation::from_strands(self.forward_strand, self.reverse_strand)
    }

    /// Fragment bases on the first contig, from the leading mate to the contig end
    pub fn first_extent(&self, first_len: usize) -> usize {
        first_len.saturating_sub(self.forward_read_start)
    }

    /// Fragment bases on the second contig for a link in `orientation`
    ///
    /// Only the slot of `orientation` matters: the second contig takes the
    /// leading mate's strand in slot 0 and the other strand in slot 1.
    pub fn second_extent(&self, orientation: LinkOrientation) -> usize {
        let placed = match orientation.slot() {
            0 => self.forward_strand,
            _ => self.forward_strand.flip(),
        };
        match placed {
            Strand::Forward => self.reverse_read_start + 1,
            Strand::Reverse => self.reverse_read_rc_start + 1,
        }
    }
}

/// Contig pair evidence table: first contig -> second contig -> pairs
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContigMatePairs {
    links: BTreeMap<ContigId, BTreeMap<ContigId, Vec<ValidMatePair>>>,
}

impl ContigMatePairs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, first: ContigId, second: ContigId, pair: ValidMatePair) {
        self.links
            .entry(first)
            .or_default()
            .entry(second)
            .or_default()
            .push(pair);
    }

    pub fn set(&mut self, first: ContigId, second: ContigId, pairs: Vec<ValidMatePair>) {
        if pairs.is_empty() {
            self.remove(first, second);
        } else {
            self.links.entry(first).or_default().insert(second, pairs);
        }
    }

    pub fn get(&self, first: ContigId, second: ContigId) -> Option<&Vec<ValidMatePair>> {
        self.links.get(&first).and_then(|inner| inner.get(&second))
    }

    pub fn get_mut(&mut self, first: ContigId, second: ContigId) -> Option<&mut Vec<ValidMatePair>> {
        self.links
            .get_mut(&first)
            .and_then(|inner| inner.get_mut(&second))
    }

    pub fn contains(&self, first: ContigId, second: ContigId) -> bool {
        self.get(first, second).is_some()
    }

    pub fn remove(&mut self, first: ContigId, second: ContigId) -> Option<Vec<ValidMatePair>> {
        let inner = self.links.get_mut(&first)?;
        let removed = inner.remove(&second);
        if inner.is_empty() {
            self.links.remove(&first);
        }
        removed
    }

    /// Contigs that have at least one outgoing link
    pub fn first_contigs(&self) -> impl Iterator<Item = ContigId> + '_ {
        self.links.keys().copied()
    }

    pub fn links_from(&self, first: ContigId) -> Option<&BTreeMap<ContigId, Vec<ValidMatePair>>> {
        self.links.get(&first)
    }

    /// Number of ordered contig pairs with evidence
    pub fn len(&self) -> usize {
        self.links.values().map(|inner| inner.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn pair_count(&self) -> usize {
        self.iter().map(|(_, _, pairs)| pairs.len()).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ContigId, ContigId, &Vec<ValidMatePair>)> {
        self.links.iter().flat_map(|(&first, inner)| {
            inner
                .iter()
                .map(move |(&second, pairs)| (first, second, pairs))
        })
    }

    pub fn keys(&self) -> Vec<(ContigId, ContigId)> {
        self.iter().map(|(a, b, _)| (a, b)).collect()
    }

    /// Move every entry out, leaving the table empty
    pub fn drain(&mut self) -> Vec<((ContigId, ContigId), Vec<ValidMatePair>)> {
        std::mem::take(&mut self.links)
            .into_iter()
            .flat_map(|(first, inner)| {
                inner
                    .into_iter()
                    .map(move |(second, pairs)| ((first, second), pairs))
            })
            .collect()
    }
}

impl FromIterator<((ContigId, ContigId), Vec<ValidMatePair>)> for ContigMatePairs {
    fn from_iter<T: IntoIterator<Item = ((ContigId, ContigId), Vec<ValidMatePair>)>>(iter: T) -> Self {
        let mut table = Self::new();
        for ((first, second), pairs) in iter {
            table.set(first, second, pairs);
        }
        table
    }
}

/// Insert size distribution statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InsertSizeStats {
    pub samples: usize,
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub min: usize,
    pub max: usize,
    pub distribution: HashMap<usize, usize>,
}

impl InsertSizeStats {
    pub fn from_samples(insert_sizes: &[usize]) -> Option<Self> {
        if insert_sizes.is_empty() {
            return None;
        }

        let mean = insert_sizes.iter().sum::<usize>() as f64 / insert_sizes.len() as f64;

        let mut sorted_sizes = insert_sizes.to_vec();
        sorted_sizes.sort_unstable();
        let median = sorted_sizes[sorted_sizes.len() / 2] as f64;

        let variance = insert_sizes
            .iter()
            .map(|&size| {
                let diff = size as f64 - mean;
                diff * diff
            })
            .sum::<f64>()
            / insert_sizes.len() as f64;

        let mut distribution = HashMap::new();
        for &size in insert_sizes {
            *distribution.entry(size).or_insert(0) += 1;
        }

        Some(Self {
            samples: insert_sizes.len(),
            mean,
            median,
            std_dev: variance.sqrt(),
            min: sorted_sizes[0],
            max: sorted_sizes[sorted_sizes.len() - 1],
            distribution,
        })
    }
}

/// Insert sizes observed per library
pub type LibraryInsertSizes = AHashMap<String, InsertSizeStats>;
