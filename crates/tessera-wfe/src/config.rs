//! Engine configuration.
//!
//! Loaded from a `tessera.toml` file:
//!
//! ```toml
//! plugin_dir = "goplugins"
//! workflow_dir = "workflows"
//! identity_db = "/var/lib/tessera/identity.db"
//! max_parallel = 8
//! activity_timeout_secs = 300
//! strict_identity = true
//! ```
//!
//! Relative paths are resolved against the directory holding the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Conventional name of the configuration file.
pub const CONFIG_FILE_NAME: &str = "tessera.toml";

/// Default number of activities run concurrently.
pub const DEFAULT_MAX_PARALLEL: usize = 4;

/// Default timeout for unary plugin calls.
pub const DEFAULT_RPC_TIMEOUT_SECS: u64 = 30;

/// Result type alias for config operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read a config file.
    #[error("failed to read config file '{path}': {source}")]
    ReadFile {
        path: String,
        source: std::io::Error,
    },

    /// Failed to parse TOML.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range.
    #[error("invalid config value for '{field}': {reason}")]
    Invalid { field: String, reason: String },
}

/// Configuration for a workflow engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory of pre-packaged plugin executables.
    pub plugin_dir: PathBuf,

    /// Directory of link files and manifests.
    pub workflow_dir: PathBuf,

    /// SQLite database holding external identities. `None` keeps identities
    /// in memory.
    pub identity_db: Option<PathBuf>,

    /// Upper bound on activities running at once within one workflow.
    pub max_parallel: usize,

    /// Optional per-activity timeout.
    pub activity_timeout_secs: Option<u64>,

    /// Timeout for unary plugin calls.
    pub rpc_timeout_secs: u64,

    /// Require an identity record before reading or deleting a resource.
    pub strict_identity: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::for_root(Path::new("."))
    }
}

impl EngineConfig {
    /// Configuration with the conventional layout under `root`.
    pub fn for_root(root: &Path) -> Self {
        Self {
            plugin_dir: root.join("goplugins"),
            workflow_dir: root.join("workflows"),
            identity_db: default_identity_db(),
            max_parallel: DEFAULT_MAX_PARALLEL,
            activity_timeout_secs: None,
            rpc_timeout_secs: DEFAULT_RPC_TIMEOUT_SECS,
            strict_identity: false,
        }
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file, resolving relative paths against its
    /// directory.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.display().to_string(),
            source,
        })?;
        let mut config = Self::from_toml(&text)?;

        if let Some(base) = path.parent() {
            config.plugin_dir = base.join(&config.plugin_dir);
            config.workflow_dir = base.join(&config.workflow_dir);
            config.identity_db = config.identity_db.map(|db| base.join(db));
        }

        tracing::debug!(path = %path.display(), "loaded engine config");
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.max_parallel == 0 {
            return Err(ConfigError::Invalid {
                field: "max_parallel".into(),
                reason: "must be at least 1".into(),
            });
        }
        if self.rpc_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "rpc_timeout_secs".into(),
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }

    pub fn with_plugin_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.plugin_dir = dir.into();
        self
    }

    pub fn with_workflow_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workflow_dir = dir.into();
        self
    }

    pub fn with_identity_db(mut self, path: impl Into<PathBuf>) -> Self {
        self.identity_db = Some(path.into());
        self
    }

    /// Keep identities in memory only.
    pub fn without_identity_db(mut self) -> Self {
        self.identity_db = None;
        self
    }

    pub fn with_max_parallel(mut self, max: usize) -> Self {
        self.max_parallel = max.max(1);
        self
    }

    pub fn with_activity_timeout(mut self, timeout: Duration) -> Self {
        self.activity_timeout_secs = Some(timeout.as_secs().max(1));
        self
    }

    pub fn with_rpc_timeout(mut self, timeout: Duration) -> Self {
        self.rpc_timeout_secs = timeout.as_secs().max(1);
        self
    }

    pub fn with_strict_identity(mut self, strict: bool) -> Self {
        self.strict_identity = strict;
        self
    }

    pub fn activity_timeout(&self) -> Option<Duration> {
        self.activity_timeout_secs.map(Duration::from_secs)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }
}

fn default_identity_db() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join("tessera").join("identity.db"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::for_root(Path::new("/srv/lyra"));
        assert_eq!(config.plugin_dir, PathBuf::from("/srv/lyra/goplugins"));
        assert_eq!(config.workflow_dir, PathBuf::from("/srv/lyra/workflows"));
        assert_eq!(config.max_parallel, DEFAULT_MAX_PARALLEL);
        assert_eq!(config.rpc_timeout(), Duration::from_secs(30));
        assert!(config.activity_timeout().is_none());
        assert!(!config.strict_identity);
    }

    #[test]
    fn test_from_toml_partial() {
        let config = EngineConfig::from_toml("max_parallel = 2\nstrict_identity = true\n").unwrap();
        assert_eq!(config.max_parallel, 2);
        assert!(config.strict_identity);
        assert_eq!(config.rpc_timeout_secs, DEFAULT_RPC_TIMEOUT_SECS);
    }

    #[test]
    fn test_from_toml_rejects_zero_parallel() {
        let err = EngineConfig::from_toml("max_parallel = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref field, .. } if field == "max_parallel"));
    }

    #[test]
    fn test_from_toml_parse_error() {
        let err = EngineConfig::from_toml("max_parallel = \"many\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_resolves_relative_paths() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(
            &path,
            "plugin_dir = \"plugins\"\nworkflow_dir = \"/abs/workflows\"\nidentity_db = \"state/id.db\"\nactivity_timeout_secs = 5\n",
        )
        .unwrap();

        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.plugin_dir, dir.path().join("plugins"));
        assert_eq!(config.workflow_dir, PathBuf::from("/abs/workflows"));
        assert_eq!(config.identity_db, Some(dir.path().join("state/id.db")));
        assert_eq!(config.activity_timeout(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_load_missing_file() {
        let err = EngineConfig::load(Path::new("/nonexistent/tessera.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    fn test_builders() {
        let config = EngineConfig::default()
            .with_max_parallel(0)
            .with_activity_timeout(Duration::from_millis(10))
            .without_identity_db();
        assert_eq!(config.max_parallel, 1);
        assert_eq!(config.activity_timeout_secs, Some(1));
        assert!(config.identity_db.is_none());
    }
}
