use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;

use crate::core::data_structures::MAX_KMER_LENGTH;
use crate::core::paired_reads::{CloneLibraryRegistry, MateNamingConvention};

/// Configuration for a complete assembly run
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct AssemblerConfiguration {
    /// General run settings
    pub general: GeneralConfig,
    /// De Bruijn graph construction and simplification
    pub assembly: AssemblyConfig,
    /// Mate-pair scaffolding
    pub scaffold: ScaffoldConfig,
    /// Worker threads and batching
    pub performance: PerformanceConfig,
    /// Logging and monitoring configuration
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GeneralConfig {
    pub name: String,
    /// Output directory
    pub output_dir: PathBuf,
    /// Also write contigs next to the scaffolds
    pub write_contigs: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AssemblyConfig {
    /// K-mer length; estimated from read lengths when unset
    pub kmer_length: Option<usize>,
    /// Tip removal settings
    pub tip_removal: TipRemovalConfig,
    /// Bubble popping settings
    pub bubble_popping: BubblePoppingConfig,
    /// Low-coverage contig removal
    pub low_coverage: LowCoverageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TipRemovalConfig {
    pub enabled: bool,
    /// Longest dangling link removed, in nodes; k + 1 when unset
    pub max_tip_length: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BubblePoppingConfig {
    pub enabled: bool,
    /// Longest redundant path traced, in nodes; 3 * (k + 1) when unset
    pub max_bubble_length: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LowCoverageConfig {
    pub enabled: bool,
    /// Mean k-mer count below which a contig is dropped; derived from the graph when unset
    pub coverage_threshold: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScaffoldConfig {
    pub enabled: bool,
    /// K-mer length for read mapping; the assembly k when unset
    pub kmer_length: Option<usize>,
    /// Maximum number of links in an enumerated scaffold path
    pub depth: usize,
    /// Minimum number of mate pairs supporting a link
    pub redundancy: usize,
    pub libraries: CloneLibraryRegistry,
    pub naming: MateNamingConvention,
    pub overlap: OverlapConfig,
}

/// Scoring and acceptance settings for merging overlapping contig ends
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OverlapConfig {
    /// Fewest aligned bases accepted as an overlap
    pub min_overlap: usize,
    /// Fraction of aligned columns that must be matches
    pub min_identity: f64,
    /// Bases added to the predicted overlap when cutting alignment windows
    pub slack: usize,
    /// N filler used for tiny positive gaps and unresolved overlaps
    pub min_gap_fill: usize,
    pub match_score: i32,
    pub mismatch_score: i32,
    pub gap_open: i32,
    pub gap_extend: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Worker threads; 0 uses every available core
    pub num_threads: usize,
    /// Reads per parallel work unit
    pub chunk_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// One of `pretty`, `compact` or `json`
    pub format: String,
    /// Daily-rolling log file; console when unset
    pub file_path: Option<PathBuf>,
}

/// Error types raised by the assembly and scaffolding stages
#[derive(Error, Debug)]
pub enum AssemblyError {
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("Validation error: {field} is invalid: {reason}")]
    ValidationError { field: String, reason: String },

    #[error("Invariant violation: {message}")]
    InvariantViolation { message: String },

    #[error("Unknown clone library: {name}")]
    UnknownLibrary { name: String },

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Input/Output error: {message}")]
    IOError { message: String },
}

impl AssemblyError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        AssemblyError::InvalidArgument {
            message: message.into(),
        }
    }
}

impl From<ConfigError> for AssemblyError {
    fn from(err: ConfigError) -> Self {
        AssemblyError::ConfigurationError {
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for AssemblyError {
    fn from(err: std::io::Error) -> Self {
        AssemblyError::IOError {
            message: err.to_string(),
        }
    }
}

/// Predefined configuration templates
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ConfigTemplate {
    /// Defaults with every stage enabled
    Standard,
    /// Contigs only, no scaffolding
    ContigsOnly,
    /// Aggressive graph cleaning for noisy reads
    Noisy,
}

/// Loads, validates and persists [`AssemblerConfiguration`]
pub struct ConfigurationManager {
    config: AssemblerConfiguration,
    config_path: Option<PathBuf>,
    environment_prefix: String,
}

impl ConfigurationManager {
    /// Create configuration manager from the default locations
    pub fn new() -> Result<Self, AssemblyError> {
        Self::load_from_default_locations()
    }

    /// Load configuration from specific file
    pub fn from_file<P: AsRef<Path>>(config_path: P) -> Result<Self, AssemblyError> {
        let config_path = config_path.as_ref().to_path_buf();
        let config = Self::load_config_from_file(&config_path)?;

        let manager = Self {
            config,
            config_path: Some(config_path),
            environment_prefix: "SCAFFOLD".to_string(),
        };

        manager.validate_configuration()?;
        Ok(manager)
    }

    /// Wrap an in-memory configuration after validating it
    pub fn from_config(config: AssemblerConfiguration) -> Result<Self, AssemblyError> {
        let manager = Self {
            config,
            config_path: None,
            environment_prefix: "SCAFFOLD".to_string(),
        };
        manager.validate_configuration()?;
        Ok(manager)
    }

    fn load_from_default_locations() -> Result<Self, AssemblyError> {
        let mut config_builder = Config::builder();

        if let Ok(system_config) = env::var("SCAFFOLD_SYSTEM_CONFIG") {
            config_builder =
                config_builder.add_source(File::with_name(&system_config).required(false));
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("scaffold-forge").join("config.toml");
            config_builder = config_builder.add_source(File::from(user_config).required(false));
        }

        config_builder = config_builder.add_source(File::with_name("config").required(false));
        config_builder =
            config_builder.add_source(Environment::with_prefix("SCAFFOLD").separator("__"));

        let config: AssemblerConfiguration = match config_builder.build() {
            Ok(built_config) => match built_config.try_deserialize() {
                Ok(config) => config,
                Err(e) => {
                    warn!(
                        "Failed to deserialize configuration: {}, using built-in defaults",
                        e
                    );
                    AssemblerConfiguration::default()
                }
            },
            Err(e) => {
                warn!("Failed to build configuration: {}, using built-in defaults", e);
                AssemblerConfiguration::default()
            }
        };

        let manager = Self {
            config,
            config_path: None,
            environment_prefix: "SCAFFOLD".to_string(),
        };
        manager.validate_configuration()?;
        Ok(manager)
    }

    fn load_config_from_file(path: &Path) -> Result<AssemblerConfiguration, AssemblyError> {
        let text = std::fs::read_to_string(path).map_err(|e| AssemblyError::IOError {
            message: format!("Failed to read configuration {}: {e}", path.display()),
        })?;
        let config = Config::builder()
            .add_source(File::from_str(&text, FileFormat::Toml))
            .build()?;
        Ok(config.try_deserialize()?)
    }

    /// Validate configuration parameters
    pub fn validate_configuration(&self) -> Result<(), AssemblyError> {
        validate(&self.config)
    }

    /// Install the global tracing subscriber
    ///
    /// The returned guard flushes the file writer and must be held for the
    /// lifetime of the program when a log file is configured.
    pub fn setup_logging(&self) -> Result<Option<WorkerGuard>, AssemblyError> {
        use tracing_appender::rolling;
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        if tracing::dispatcher::has_been_set() {
            info!("Logging already initialized, skipping setup");
            return Ok(None);
        }

        let level = &self.config.logging.level;
        let format = self.config.logging.format.as_str();

        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
        let subscriber = tracing_subscriber::registry().with(env_filter);

        let (writer, guard) = match self.config.logging.file_path {
            Some(ref file_path) => {
                let file_appender = rolling::daily(
                    file_path.parent().unwrap_or(Path::new(".")),
                    file_path
                        .file_name()
                        .unwrap_or(std::ffi::OsStr::new("scaffold-forge.log")),
                );
                let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
                (Some(non_blocking), Some(guard))
            }
            None => (None, None),
        };

        let installed = match (format, writer) {
            ("json", Some(w)) => tracing::subscriber::set_global_default(
                subscriber.with(fmt::layer().json().with_thread_ids(true).with_writer(w)),
            ),
            ("json", None) => tracing::subscriber::set_global_default(
                subscriber.with(fmt::layer().json().with_thread_ids(true)),
            ),
            ("compact", Some(w)) => tracing::subscriber::set_global_default(
                subscriber.with(fmt::layer().compact().with_writer(w)),
            ),
            ("compact", None) => {
                tracing::subscriber::set_global_default(subscriber.with(fmt::layer().compact()))
            }
            (_, Some(w)) => tracing::subscriber::set_global_default(
                subscriber.with(fmt::layer().with_target(false).with_writer(w)),
            ),
            (_, None) => tracing::subscriber::set_global_default(
                subscriber.with(fmt::layer().without_time().with_target(false)),
            ),
        };
        if let Err(e) = installed {
            warn!("Could not install tracing subscriber: {}", e);
        }

        info!("Logging initialized with level: {}, format: {}", level, format);
        Ok(guard)
    }

    pub fn config(&self) -> &AssemblerConfiguration {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut AssemblerConfiguration {
        &mut self.config
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    pub fn environment_prefix(&self) -> &str {
        &self.environment_prefix
    }

    /// Save current configuration to file
    pub fn save_config<P: AsRef<Path>>(&self, path: P) -> Result<(), AssemblyError> {
        save_configuration(&self.config, path)
    }

    /// Build one of the predefined templates
    pub fn create_template(template: ConfigTemplate) -> AssemblerConfiguration {
        let mut config = AssemblerConfiguration::default();
        match template {
            ConfigTemplate::Standard => {}
            ConfigTemplate::ContigsOnly => {
                config.scaffold.enabled = false;
            }
            ConfigTemplate::Noisy => {
                config.assembly.low_coverage.enabled = true;
                config.scaffold.redundancy = 3;
            }
        }
        config
    }
}

pub fn save_configuration<P: AsRef<Path>>(
    config: &AssemblerConfiguration,
    path: P,
) -> Result<(), AssemblyError> {
    let toml_string =
        toml::to_string_pretty(config).map_err(|e| AssemblyError::ConfigurationError {
            message: format!("Failed to serialize configuration: {e}"),
        })?;

    std::fs::write(path.as_ref(), toml_string).map_err(|e| AssemblyError::IOError {
        message: format!("Failed to write configuration file: {e}"),
    })?;

    info!("Configuration saved to {}", path.as_ref().display());
    Ok(())
}

fn positive_threshold(field: &str, value: Option<usize>) -> Result<(), AssemblyError> {
    if value == Some(0) {
        return Err(AssemblyError::ValidationError {
            field: field.to_string(),
            reason: "must be a positive integer".to_string(),
        });
    }
    Ok(())
}

/// Check every threshold and registry in a configuration
pub fn validate(config: &AssemblerConfiguration) -> Result<(), AssemblyError> {
    for (field, k) in [
        ("assembly.kmer_length", config.assembly.kmer_length),
        ("scaffold.kmer_length", config.scaffold.kmer_length),
    ] {
        if let Some(k) = k {
            if k == 0 || k > MAX_KMER_LENGTH {
                return Err(AssemblyError::ValidationError {
                    field: field.to_string(),
                    reason: format!("must be between 1 and {MAX_KMER_LENGTH}"),
                });
            }
        }
    }

    positive_threshold(
        "assembly.tip_removal.max_tip_length",
        config.assembly.tip_removal.max_tip_length,
    )?;
    positive_threshold(
        "assembly.bubble_popping.max_bubble_length",
        config.assembly.bubble_popping.max_bubble_length,
    )?;

    if let Some(threshold) = config.assembly.low_coverage.coverage_threshold {
        if !(threshold.is_finite() && threshold > 0.0) {
            return Err(AssemblyError::ValidationError {
                field: "assembly.low_coverage.coverage_threshold".to_string(),
                reason: "must be a positive number".to_string(),
            });
        }
    }

    if config.scaffold.depth == 0 {
        return Err(AssemblyError::ValidationError {
            field: "scaffold.depth".to_string(),
            reason: "must be a positive integer".to_string(),
        });
    }

    let overlap = &config.scaffold.overlap;
    if !(overlap.min_identity > 0.0 && overlap.min_identity <= 1.0) {
        return Err(AssemblyError::ValidationError {
            field: "scaffold.overlap.min_identity".to_string(),
            reason: "must be in (0, 1]".to_string(),
        });
    }
    if overlap.min_overlap == 0 {
        return Err(AssemblyError::ValidationError {
            field: "scaffold.overlap.min_overlap".to_string(),
            reason: "must be a positive integer".to_string(),
        });
    }
    if overlap.match_score <= 0 || overlap.gap_open > 0 || overlap.gap_extend > 0 {
        return Err(AssemblyError::ValidationError {
            field: "scaffold.overlap".to_string(),
            reason: "match score must be positive and gap penalties non-positive".to_string(),
        });
    }

    config.scaffold.libraries.validate()?;
    config.scaffold.naming.validate()?;

    if !matches!(config.logging.format.as_str(), "pretty" | "compact" | "json") {
        return Err(AssemblyError::ValidationError {
            field: "logging.format".to_string(),
            reason: format!("unknown format '{}'", config.logging.format),
        });
    }

    Ok(())
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            name: "scaffold-forge".to_string(),
            output_dir: PathBuf::from("./output"),
            write_contigs: true,
        }
    }
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            kmer_length: None,
            tip_removal: TipRemovalConfig::default(),
            bubble_popping: BubblePoppingConfig::default(),
            low_coverage: LowCoverageConfig::default(),
        }
    }
}

impl Default for TipRemovalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_tip_length: None,
        }
    }
}

impl Default for BubblePoppingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_bubble_length: None,
        }
    }
}

impl Default for LowCoverageConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            coverage_threshold: None,
        }
    }
}

impl Default for ScaffoldConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            kmer_length: None,
            depth: 10,
            redundancy: 2,
            libraries: CloneLibraryRegistry::default(),
            naming: MateNamingConvention::default(),
            overlap: OverlapConfig::default(),
        }
    }
}

impl Default for OverlapConfig {
    fn default() -> Self {
        Self {
            min_overlap: 8,
            min_identity: 0.9,
            slack: 20,
            min_gap_fill: 1,
            match_score: 1,
            mismatch_score: -3,
            gap_open: -5,
            gap_extend: -1,
        }
    }
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            num_threads: 0,
            chunk_size: 1000,
        }
    }
}

impl PerformanceConfig {
    pub fn effective_threads(&self) -> usize {
        if self.num_threads == 0 {
            num_cpus::get()
        } else {
            self.num_threads
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::paired_reads::CloneLibrary;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_is_valid() {
        let config = AssemblerConfiguration::default();
        assert!(validate(&config).is_ok());
        assert_eq!(config.scaffold.depth, 10);
        assert_eq!(config.scaffold.redundancy, 2);
        assert!(config.scaffold.libraries.get("0.5K").is_ok());
    }

    #[test]
    fn test_config_validation_rejects_zero_thresholds() {
        let mut config = AssemblerConfiguration::default();
        config.assembly.tip_removal.max_tip_length = Some(0);
        assert!(matches!(
            validate(&config),
            Err(AssemblyError::ValidationError { .. })
        ));

        let mut config = AssemblerConfiguration::default();
        config.scaffold.depth = 0;
        assert!(validate(&config).is_err());

        let mut config = AssemblerConfiguration::default();
        config.assembly.kmer_length = Some(40);
        assert!(validate(&config).is_err());

        let mut config = AssemblerConfiguration::default();
        config
            .scaffold
            .libraries
            .register(CloneLibrary::new("broken", 300.0, -1.0));
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_config_serialization() {
        let mut config = ConfigurationManager::create_template(ConfigTemplate::Noisy);
        config.assembly.kmer_length = Some(21);
        config
            .scaffold
            .libraries
            .register(CloneLibrary::new("3K", 3000.0, 150.0));

        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("test_config.toml");
        save_configuration(&config, &config_path).unwrap();

        let loaded = ConfigurationManager::from_file(&config_path).unwrap();
        assert_eq!(loaded.config(), &config);
        assert_eq!(loaded.config_path(), Some(config_path.as_path()));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("partial.toml");
        std::fs::write(&config_path, "[assembly]\nkmer_length = 25\n").unwrap();

        let loaded = ConfigurationManager::from_file(&config_path).unwrap();
        assert_eq!(loaded.config().assembly.kmer_length, Some(25));
        assert_eq!(loaded.config().scaffold.depth, 10);
        assert!(loaded.config().assembly.tip_removal.enabled);
    }

    #[test]
    fn test_contigs_only_template() {
        let config = ConfigurationManager::create_template(ConfigTemplate::ContigsOnly);
        assert!(!config.scaffold.enabled);
        assert!(ConfigurationManager::from_config(config).is_ok());
    }
}
