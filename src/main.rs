use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Instant;

use scaffold_forge::assembly::DeNovoAssembler;
use scaffold_forge::utils::configuration::{
    save_configuration, ConfigTemplate, ConfigurationManager,
};
use scaffold_forge::utils::format_writers::{
    read_fasta, write_contigs_fasta, write_fasta, write_json_report,
};

#[derive(Parser)]
#[command(name = "scaffold-forge")]
#[command(about = "De novo genome assembly with mate-pair scaffolding")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Number of threads (overrides config)
    #[arg(short = 'j', long)]
    threads: Option<usize>,

    /// Output directory (overrides config)
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Assemble reads into contigs and scaffolds
    Assemble {
        /// Input FASTA reads
        reads: PathBuf,

        /// K-mer length (overrides config)
        #[arg(short, long)]
        k: Option<usize>,

        /// Stop after contig building
        #[arg(long)]
        no_scaffold: bool,
    },

    /// Scaffold existing contigs with mate-paired reads
    Scaffold {
        /// Input FASTA contigs
        contigs: PathBuf,

        /// Input FASTA reads
        reads: PathBuf,

        /// K-mer length used to map reads (overrides config)
        #[arg(short, long)]
        k: Option<usize>,
    },

    /// Generate configuration template
    Config {
        /// Template type
        #[arg(value_enum, default_value_t = ConfigTemplate::Standard)]
        template: ConfigTemplate,

        /// Output file
        #[arg(short, long, default_value = "scaffold-forge.toml")]
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Config { template, file } = &cli.command {
        let config = ConfigurationManager::create_template(*template);
        save_configuration(&config, file)?;
        println!("✅ Wrote {:?} configuration template to {}", template, file.display());
        return Ok(());
    }

    let mut manager = match &cli.config {
        Some(path) => ConfigurationManager::from_file(path)?,
        None => ConfigurationManager::new()?,
    };
    {
        let config = manager.config_mut();
        if cli.verbose {
            config.logging.level = "debug".to_string();
        }
        if let Some(threads) = cli.threads {
            config.performance.num_threads = threads;
        }
        if let Some(output) = &cli.output {
            config.general.output_dir = output.clone();
        }
    }
    let _log_guard = manager.setup_logging()?;

    match cli.command {
        Commands::Assemble {
            reads,
            k,
            no_scaffold,
        } => {
            {
                let config = manager.config_mut();
                if k.is_some() {
                    config.assembly.kmer_length = k;
                }
                if no_scaffold {
                    config.scaffold.enabled = false;
                }
            }
            manager.validate_configuration()?;
            run_assemble(&manager, &reads)?;
        }
        Commands::Scaffold { contigs, reads, k } => {
            if k.is_some() {
                manager.config_mut().scaffold.kmer_length = k;
            }
            manager.validate_configuration()?;
            run_scaffold(&manager, &contigs, &reads)?;
        }
        Commands::Config { .. } => {}
    }

    Ok(())
}

fn output_dir(manager: &ConfigurationManager) -> Result<PathBuf> {
    let dir = manager.config().general.output_dir.clone();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
    Ok(dir)
}

fn run_assemble(manager: &ConfigurationManager, reads_path: &Path) -> Result<()> {
    let start = Instant::now();
    let reads = read_fasta(reads_path)?;
    let assembler = DeNovoAssembler::new(manager.config().clone())?;
    let output = assembler.assemble(&reads)?;

    let dir = output_dir(manager)?;
    if manager.config().general.write_contigs || output.scaffolds.is_none() {
        write_contigs_fasta(&output.contigs, dir.join("contigs.fa"))?;
    }
    if let Some(scaffolds) = &output.scaffolds {
        write_fasta(scaffolds.iter(), dir.join("scaffolds.fa"))?;
    }
    write_json_report(&output.report, dir.join("assembly_stats.json"))?;

    let stats = &output.report.contig_stats;
    println!("✅ Assembly completed successfully!");
    println!("📊 Results:");
    println!("   k-mer size: {}", output.kmer_length);
    println!("   Contigs: {}", output.contigs.len());
    println!("   Total length: {} bp", stats.total_length);
    println!("   N50: {} bp", stats.n50);
    if let Some(scaffolds) = &output.scaffolds {
        let scaffold_stats = scaffolds.stats();
        println!(
            "   Scaffolds: {} ({} multi-contig)",
            scaffolds.len(),
            scaffold_stats.multi_contig_scaffolds
        );
        println!("   Scaffold N50: {} bp", scaffold_stats.sequence_stats.n50);
    }
    println!("   Processing time: {:.2} seconds", start.elapsed().as_secs_f64());
    println!("   Output: {}", dir.display());
    Ok(())
}

fn run_scaffold(manager: &ConfigurationManager, contigs_path: &Path, reads_path: &Path) -> Result<()> {
    let start = Instant::now();
    let contigs = read_fasta(contigs_path)?;
    let reads = read_fasta(reads_path)?;
    let assembler = DeNovoAssembler::new(manager.config().clone())?;
    let scaffolds = assembler.scaffold(&contigs, &reads)?;

    let dir = output_dir(manager)?;
    write_fasta(scaffolds.iter(), dir.join("scaffolds.fa"))?;
    write_json_report(scaffolds.stats(), dir.join("scaffold_stats.json"))?;

    let stats = scaffolds.stats();
    println!("✅ Scaffolding completed successfully!");
    println!("📊 Results:");
    println!("   Mate pairs: {}", stats.mate_pairs);
    println!("   Contig links: {}", stats.links);
    println!(
        "   Scaffolds: {} ({} multi-contig, {} singleton)",
        scaffolds.len(),
        stats.multi_contig_scaffolds,
        stats.singleton_scaffolds
    );
    println!("   N50: {} bp", stats.sequence_stats.n50);
    println!("   Processing time: {:.2} seconds", start.elapsed().as_secs_f64());
    Ok(())
}
