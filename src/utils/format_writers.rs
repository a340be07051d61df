/// FASTA and report I/O for the command-line front end
/// Reads and writes go through `bio::io::fasta`; statistics are JSON
use anyhow::{Context, Result};
use bio::io::fasta;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{info, warn};

use crate::core::data_structures::{Contig, Sequence};

/// Load every record of a FASTA file as a validated [`Sequence`]
///
/// The record identifier and description are joined with a space, so read
/// names carrying whitespace keep their mate suffix.
pub fn read_fasta<P: AsRef<Path>>(input_path: P) -> Result<Vec<Sequence>> {
    let path = input_path.as_ref();
    let reader = fasta::Reader::from_file(path)
        .with_context(|| format!("Failed to open FASTA file: {}", path.display()))?;

    let mut sequences = Vec::new();
    for record in reader.records() {
        let record =
            record.with_context(|| format!("Malformed FASTA record in {}", path.display()))?;
        let id = match record.desc() {
            Some(desc) => format!("{} {}", record.id(), desc),
            None => record.id().to_string(),
        };
        let sequence = Sequence::new(id, record.seq())
            .with_context(|| format!("Invalid sequence in {}", path.display()))?;
        sequences.push(sequence);
    }

    if sequences.is_empty() {
        warn!("No records found in {}", path.display());
    }
    info!(
        "📖 Loaded {} sequences from {}",
        sequences.len(),
        path.display()
    );
    Ok(sequences)
}

/// Write sequences to FASTA, one record per sequence
pub fn write_fasta<'a, P, I>(sequences: I, output_path: P) -> Result<usize>
where
    P: AsRef<Path>,
    I: IntoIterator<Item = &'a Sequence>,
{
    let path = output_path.as_ref();
    let file = File::create(path)
        .with_context(|| format!("Failed to create FASTA file: {}", path.display()))?;
    let mut writer = fasta::Writer::new(BufWriter::new(file));

    let mut written = 0;
    for seq in sequences {
        writer
            .write(seq.id(), None, seq.symbols())
            .with_context(|| format!("Failed to write record {}", seq.id()))?;
        written += 1;
    }

    writer.flush()?;
    info!("📝 Wrote {} records to FASTA: {}", written, path.display());
    Ok(written)
}

/// Write contigs with length and coverage in the description line
pub fn write_contigs_fasta<P: AsRef<Path>>(contigs: &[Contig], output_path: P) -> Result<()> {
    let path = output_path.as_ref();
    let file = File::create(path)
        .with_context(|| format!("Failed to create FASTA file: {}", path.display()))?;
    let mut writer = fasta::Writer::new(BufWriter::new(file));

    for contig in contigs {
        let desc = format!(
            "length={} coverage={:.2}x type={:?}",
            contig.length, contig.coverage, contig.contig_type
        );
        writer.write(contig.sequence.id(), Some(&desc), contig.sequence.symbols())?;
    }

    writer.flush()?;
    info!(
        "📝 Wrote {} contigs to FASTA: {}",
        contigs.len(),
        path.display()
    );
    Ok(())
}

/// Serialize any report to pretty-printed JSON
pub fn write_json_report<T: Serialize, P: AsRef<Path>>(report: &T, output_path: P) -> Result<()> {
    let path = output_path.as_ref();
    let file = File::create(path)
        .with_context(|| format!("Failed to create report file: {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, report)
        .with_context(|| format!("Failed to serialize report: {}", path.display()))?;
    writeln!(writer)?;
    writer.flush()?;
    info!("📈 Wrote report: {}", path.display());
    Ok(())
}
