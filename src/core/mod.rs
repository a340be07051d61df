pub mod data_structures;
pub mod paired_reads;

// Re-export key types for assembly and scaffolding
pub use data_structures::{
    // Sequence and k-mer types
    complement,
    reverse_complement,
    CompactKmer,
    KmerWindows,
    Sequence,
    Strand,
    // Assembly output
    AssemblyStats,
    Contig,
    ContigId,
    ContigType,
    // Scaffold paths
    OrientedContig,
    ScaffoldEdge,
    ScaffoldPath,
};
pub use paired_reads::{
    CloneLibrary, CloneLibraryRegistry, ContigMatePairs, InsertSizeStats, LinkOrientation,
    MateNamingConvention, MateTag, ReadOrientation, ValidMatePair,
};
