//! Project configuration loaded from `.respec/config.toml`.
//!
//! Every field has a default, so a missing file or a partial one is valid:
//!
//! ```toml
//! [analysis]
//! enabled = true
//! command = ["bundle", "exec", "rspec"]
//! timeout_secs = 600
//! keep_sandbox = false
//!
//! [parser]
//! command = ["ruby"]
//!
//! [convert]
//! rules = ["should", "stub", "be_close"]
//! spec_suffix = "_spec.rb"
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::rules::RuleKind;

/// Directory under the project root holding respec state.
pub const CONFIG_DIR: &str = ".respec";

/// Configuration file name inside [`CONFIG_DIR`].
pub const CONFIG_FILE: &str = "config.toml";

/// Errors from loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("invalid configuration: {message}")]
    Invalid { message: String },
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub parser: ParserConfig,
    #[serde(default)]
    pub convert: ConvertConfig,
}

/// `[analysis]`: the dynamic pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_analysis_enabled")]
    pub enabled: bool,

    /// Test runner argv, run once from the sandbox root.
    #[serde(default = "default_analysis_command")]
    pub command: Vec<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Keep the sandbox directory when the run fails.
    #[serde(default)]
    pub keep_sandbox: bool,
}

/// `[parser]`: how AST dumps are produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParserConfig {
    /// Interpreter argv; the dump script and the file path are appended.
    #[serde(default = "default_parser_command")]
    pub command: Vec<String>,
}

/// `[convert]`: which conversions run and on which files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvertConfig {
    #[serde(default = "default_rules")]
    pub rules: Vec<RuleKind>,

    /// Suffix of files picked up when a directory is given.
    #[serde(default = "default_spec_suffix")]
    pub spec_suffix: String,
}

fn default_analysis_enabled() -> bool {
    true
}

fn default_analysis_command() -> Vec<String> {
    vec!["bundle".to_string(), "exec".to_string(), "rspec".to_string()]
}

fn default_timeout_secs() -> u64 {
    600
}

fn default_parser_command() -> Vec<String> {
    vec!["ruby".to_string()]
}

fn default_rules() -> Vec<RuleKind> {
    RuleKind::ALL.to_vec()
}

fn default_spec_suffix() -> String {
    "_spec.rb".to_string()
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            enabled: default_analysis_enabled(),
            command: default_analysis_command(),
            timeout_secs: default_timeout_secs(),
            keep_sandbox: false,
        }
    }
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            command: default_parser_command(),
        }
    }
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            rules: default_rules(),
            spec_suffix: default_spec_suffix(),
        }
    }
}

impl AnalysisConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Values given on the command line; `None` keeps the file value.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub no_dynamic: bool,
    pub analysis_command: Option<Vec<String>>,
    pub timeout_secs: Option<u64>,
    pub keep_sandbox: bool,
    pub rules: Option<Vec<RuleKind>>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load `.respec/config.toml` from the project root, or the defaults if
    /// there is none.
    pub fn load_from_project(project_root: &Path) -> Result<Self, ConfigError> {
        let config_path = project_root.join(CONFIG_DIR).join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Config::default())
        }
    }

    /// Apply command-line overrides on top of file values.
    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) -> Result<(), ConfigError> {
        if overrides.no_dynamic {
            self.analysis.enabled = false;
        }
        if let Some(command) = overrides.analysis_command {
            self.analysis.command = command;
        }
        if let Some(secs) = overrides.timeout_secs {
            self.analysis.timeout_secs = secs;
        }
        if overrides.keep_sandbox {
            self.analysis.keep_sandbox = true;
        }
        if let Some(rules) = overrides.rules {
            self.convert.rules = rules;
        }
        self.validate()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.analysis.enabled && self.analysis.command.is_empty() {
            return Err(ConfigError::Invalid {
                message: "analysis.command must not be empty".to_string(),
            });
        }
        if self.analysis.timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                message: "analysis.timeout_secs must be positive".to_string(),
            });
        }
        if self.parser.command.is_empty() {
            return Err(ConfigError::Invalid {
                message: "parser.command must not be empty".to_string(),
            });
        }
        if self.convert.spec_suffix.is_empty() {
            return Err(ConfigError::Invalid {
                message: "convert.spec_suffix must not be empty".to_string(),
            });
        }
        Ok(())
    }
}
