pub mod configuration;
pub mod format_writers;
