use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::Severity;

/// Engine options for one invocation.
///
/// The library takes this per call; nothing inside the engine reads the
/// environment or the filesystem. The CLI loads it from
/// `.cloudwarden.toml` when present.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Run rule groups concurrently instead of strictly sequentially.
    pub parallel: bool,
    /// Upper bound on simultaneously in-flight rule checks.
    pub max_concurrency: usize,
    /// Per-rule execution deadline. Zero disables the deadline.
    pub timeout_secs: u64,
    /// Check retries on provider errors before the failure is recorded.
    pub retry_count: u32,
    /// Materialize evidence items on each result.
    pub include_evidence: bool,
    /// Materialize remediation guidance text on each result.
    pub include_recommendations: bool,
    /// Mark synthesized findings as advisory-only.
    pub dry_run: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            parallel: true,
            max_concurrency: 5,
            timeout_secs: 300,
            retry_count: 0,
            include_evidence: true,
            include_recommendations: true,
            dry_run: false,
        }
    }
}

/// Top-level configuration from `.cloudwarden.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    /// Minimum finding severity for a non-zero scan exit code.
    #[serde(default = "default_fail_on")]
    pub fail_on: Severity,
}

fn default_fail_on() -> Severity {
    Severity::High
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            fail_on: default_fail_on(),
        }
    }
}

impl Config {
    /// Load config from a TOML file. Returns defaults if the file doesn't exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Generate a starter config file.
    pub fn starter_toml() -> &'static str {
        r#"# Cloud Warden configuration

# Minimum finding severity for a non-zero scan exit code
# (info, low, medium, high, critical).
fail_on = "high"

[engine]
# Run rule groups concurrently.
parallel = true

# Upper bound on simultaneously in-flight rule checks.
max_concurrency = 5

# Per-rule deadline in seconds. 0 disables the deadline.
timeout_secs = 300

# Check retries on provider errors.
retry_count = 0

include_evidence = true
include_recommendations = true
dry_run = false
"#
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_reference_engine() {
        let config = EngineConfig::default();
        assert!(config.parallel);
        assert_eq!(config.max_concurrency, 5);
        assert!(config.include_evidence);
        assert!(config.include_recommendations);
        assert!(!config.dry_run);
        assert_eq!(config.retry_count, 0);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = Config::load(Path::new("/nonexistent/.cloudwarden.toml")).unwrap();
        assert_eq!(config.fail_on, Severity::High);
        assert!(config.engine.parallel);
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "fail_on = \"critical\"\n[engine]\nparallel = false\nmax_concurrency = 2\n"
        )
        .unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.fail_on, Severity::Critical);
        assert!(!config.engine.parallel);
        assert_eq!(config.engine.max_concurrency, 2);
        assert_eq!(config.engine.timeout_secs, 300);
    }

    #[test]
    fn starter_toml_parses() {
        let config: Config = toml::from_str(Config::starter_toml()).unwrap();
        assert_eq!(config.fail_on, Severity::High);
        assert_eq!(config.engine.max_concurrency, 5);
    }
}
