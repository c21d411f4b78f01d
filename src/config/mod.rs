// Configuration management module
// Handles TOML configuration loading, validation, and path resolution

pub mod settings;

pub use settings::{Config, ConfigError, CorpusConfig, LlmConfig, OllamaConfig, SearchConfig};

/// Get the configuration directory path
#[inline]
pub fn get_config_dir() -> Result<std::path::PathBuf, ConfigError> {
    Config::default_base_dir()
}
