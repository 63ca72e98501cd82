//! Spool configuration.
//!
//! Every knob of the retry queue lives in one explicit [`SpoolConfig`]
//! value; there is no global state. Configuration is resolved in a fixed
//! order:
//! 1. Explicit CLI flag (`--config`)
//! 2. Environment variable (`SPOOL_CONFIG`)
//! 3. XDG default (`~/.config/spool/spool.toml`) if it exists
//! 4. Built-in defaults
//!
//! `SPOOL_DIR` overrides the spool directory after the file is loaded.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default XDG config directory name.
const CONFIG_DIR_NAME: &str = "spool";

/// Default config file name inside the config directory.
const CONFIG_FILE_NAME: &str = "spool.toml";

/// Where a spilled batch goes back into the index after a retryable resend
/// failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequeuePolicy {
    /// Behind every other waiting batch (fair across batches).
    #[default]
    Tail,
    /// In front of every other waiting batch (closer to original order).
    Head,
}

impl std::str::FromStr for RequeuePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tail" | "back" => Ok(RequeuePolicy::Tail),
            "head" | "front" => Ok(RequeuePolicy::Head),
            _ => Err(format!("unknown requeue policy: {}", s)),
        }
    }
}

impl std::fmt::Display for RequeuePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequeuePolicy::Tail => write!(f, "tail"),
            RequeuePolicy::Head => write!(f, "head"),
        }
    }
}

/// Configuration for one spool directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SpoolConfig {
    /// Directory holding batch files.
    pub dir: PathBuf,

    /// Maximum total bytes of durable (`.trn`) files. Checked before each write.
    pub max_size_bytes: u64,

    /// Seconds between purge sweeps.
    pub purge_interval_secs: u64,

    /// Age in seconds after which a durable batch is deleted unsent.
    pub expiry_secs: u64,

    /// Seconds between resend polls (fixed delay).
    pub send_interval_secs: u64,

    /// Seconds to wait for a resend to complete.
    pub send_timeout_secs: u64,

    /// Attempts made to delete a file before giving up until the next sweep.
    pub delete_retry_attempts: u32,

    /// Milliseconds to sleep between delete attempts.
    pub delete_retry_backoff_ms: u64,

    /// Where retryable failures are re-queued.
    pub requeue_policy: RequeuePolicy,

    /// Adopt claimed (`.tmp`) files left by a crash as durable on open.
    pub recover_orphans: bool,

    /// Log failures at debug level only.
    pub suppress_warnings: bool,

    /// Seconds between repeated warnings for the same failing operation.
    pub warning_interval_secs: u64,
}

impl Default for SpoolConfig {
    fn default() -> Self {
        SpoolConfig {
            dir: default_spool_dir(),
            max_size_bytes: 50 * 1024 * 1024, // 50 MB
            purge_interval_secs: 24 * 3600,
            expiry_secs: 48 * 3600,
            send_interval_secs: 30,
            send_timeout_secs: 30,
            delete_retry_attempts: 3,
            delete_retry_backoff_ms: 500,
            requeue_policy: RequeuePolicy::Tail,
            recover_orphans: true,
            suppress_warnings: false,
            warning_interval_secs: 300,
        }
    }
}

impl SpoolConfig {
    /// Defaults rooted at `dir`.
    pub fn for_dir(dir: impl Into<PathBuf>) -> Self {
        SpoolConfig {
            dir: dir.into(),
            ..Default::default()
        }
    }

    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(content: &str, origin: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::ConfigParse {
            path: origin.to_path_buf(),
            source: e,
        })
    }

    /// Load and validate a TOML config file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }
        let content = fs::read_to_string(path).map_err(|e| Error::io_at(path, e))?;
        let config = Self::from_toml_str(&content, path)?;
        config.validate()?;
        Ok(config)
    }

    /// Semantic validation.
    pub fn validate(&self) -> Result<()> {
        if self.dir.as_os_str().is_empty() {
            return Err(Error::Config("dir must not be empty".to_string()));
        }
        let positive = [
            ("max_size_bytes", self.max_size_bytes),
            ("purge_interval_secs", self.purge_interval_secs),
            ("expiry_secs", self.expiry_secs),
            ("send_interval_secs", self.send_interval_secs),
            ("send_timeout_secs", self.send_timeout_secs),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(Error::Config(format!("{} must be greater than 0", name)));
            }
        }
        if self.delete_retry_attempts == 0 {
            return Err(Error::Config(
                "delete_retry_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.purge_interval_secs)
    }

    pub fn expiry(&self) -> Duration {
        Duration::from_secs(self.expiry_secs)
    }

    pub fn send_interval(&self) -> Duration {
        Duration::from_secs(self.send_interval_secs)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }

    pub fn delete_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.delete_retry_backoff_ms)
    }

    pub fn warning_interval(&self) -> Duration {
        Duration::from_secs(self.warning_interval_secs)
    }
}

/// Default spool directory under the XDG data dir.
pub fn default_spool_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("spool")
        .join("telemetry")
}

/// How the config was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigSource {
    /// From explicit CLI flag
    CliFlag,
    /// From environment variable
    EnvVar,
    /// From XDG config directory
    XdgConfig,
    /// Using built-in defaults
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::CliFlag => write!(f, "cli"),
            ConfigSource::EnvVar => write!(f, "env"),
            ConfigSource::XdgConfig => write!(f, "xdg"),
            ConfigSource::Default => write!(f, "default"),
        }
    }
}

/// Configuration resolver with deterministic resolution order.
#[derive(Debug, Default)]
pub struct ConfigResolver {
    cli_config: Option<PathBuf>,
    cli_dir: Option<PathBuf>,
}

impl ConfigResolver {
    pub fn new(cli_config: Option<PathBuf>, cli_dir: Option<PathBuf>) -> Self {
        ConfigResolver {
            cli_config,
            cli_dir,
        }
    }

    /// Resolve and load using the process environment.
    pub fn load(&self) -> Result<(SpoolConfig, ConfigSource)> {
        self.load_with(|name| std::env::var(name).ok())
    }

    /// Resolve and load using `env` for variable lookups.
    pub fn load_with<F>(&self, env: F) -> Result<(SpoolConfig, ConfigSource)>
    where
        F: Fn(&str) -> Option<String>,
    {
        let (path, source) = self.resolve_path(&env);
        let mut config = match path {
            Some(p) => SpoolConfig::load(&p)?,
            None => SpoolConfig::default(),
        };

        // Directory overrides: CLI flag beats SPOOL_DIR.
        if let Some(dir) = &self.cli_dir {
            config.dir = dir.clone();
        } else if let Some(dir) = env("SPOOL_DIR").filter(|d| !d.is_empty()) {
            config.dir = PathBuf::from(dir);
        }

        config.validate()?;
        Ok((config, source))
    }

    fn resolve_path<F>(&self, env: &F) -> (Option<PathBuf>, ConfigSource)
    where
        F: Fn(&str) -> Option<String>,
    {
        // 1. CLI flag
        if let Some(path) = &self.cli_config {
            return (Some(path.clone()), ConfigSource::CliFlag);
        }

        // 2. SPOOL_CONFIG env var
        if let Some(path) = env("SPOOL_CONFIG").filter(|p| !p.is_empty()) {
            return (Some(PathBuf::from(path)), ConfigSource::EnvVar);
        }

        // 3. XDG config dir, only if the file exists
        let xdg = env("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(dirs::config_dir)
            .map(|d| d.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME));
        if let Some(path) = xdg.filter(|p| p.exists()) {
            return (Some(path), ConfigSource::XdgConfig);
        }

        // 4. Defaults
        (None, ConfigSource::Default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_config_defaults() {
        let config = SpoolConfig::default();
        assert_eq!(config.max_size_bytes, 50 * 1024 * 1024);
        assert_eq!(config.purge_interval(), Duration::from_secs(86_400));
        assert_eq!(config.expiry(), Duration::from_secs(172_800));
        assert_eq!(config.send_interval(), Duration::from_secs(30));
        assert_eq!(config.send_timeout(), Duration::from_secs(30));
        assert_eq!(config.delete_retry_attempts, 3);
        assert_eq!(config.requeue_policy, RequeuePolicy::Tail);
        assert!(config.recover_orphans);
        assert!(config.dir.ends_with("spool/telemetry"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let toml = r#"
            dir = "/var/spool/telemetry"
            max_size_bytes = 1024
            requeue_policy = "head"
        "#;
        let config = SpoolConfig::from_toml_str(toml, Path::new("inline.toml")).unwrap();
        assert_eq!(config.dir, PathBuf::from("/var/spool/telemetry"));
        assert_eq!(config.max_size_bytes, 1024);
        assert_eq!(config.requeue_policy, RequeuePolicy::Head);
        assert_eq!(config.expiry_secs, 48 * 3600);
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let err = SpoolConfig::from_toml_str("max_size = 5", Path::new("x.toml")).unwrap_err();
        assert!(matches!(err, Error::ConfigParse { .. }));
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let mut config = SpoolConfig::for_dir("/tmp/spool");
        config.max_size_bytes = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_size_bytes"));

        let mut config = SpoolConfig::for_dir("/tmp/spool");
        config.delete_retry_attempts = 0;
        assert!(config.validate().is_err());

        let config = SpoolConfig::for_dir("");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let err = SpoolConfig::load(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, Error::ConfigNotFound { .. }));
    }

    #[test]
    fn test_requeue_policy_parse() {
        assert_eq!("tail".parse::<RequeuePolicy>().unwrap(), RequeuePolicy::Tail);
        assert_eq!("HEAD".parse::<RequeuePolicy>().unwrap(), RequeuePolicy::Head);
        assert!("middle".parse::<RequeuePolicy>().is_err());
        assert_eq!(RequeuePolicy::Head.to_string(), "head");
    }

    #[test]
    fn test_resolver_cli_flag_wins() {
        let dir = tempdir().unwrap();
        let cli = dir.path().join("cli.toml");
        let env_file = dir.path().join("env.toml");
        fs::write(&cli, "max_size_bytes = 111\n").unwrap();
        fs::write(&env_file, "max_size_bytes = 222\n").unwrap();

        let env_value = env_file.to_string_lossy().to_string();
        let resolver = ConfigResolver::new(Some(cli), None);
        let (config, source) = resolver
            .load_with(env_from(&[("SPOOL_CONFIG", &env_value)]))
            .unwrap();
        assert_eq!(source, ConfigSource::CliFlag);
        assert_eq!(config.max_size_bytes, 111);
    }

    #[test]
    fn test_resolver_env_then_dir_override() {
        let dir = tempdir().unwrap();
        let env_file = dir.path().join("env.toml");
        fs::write(&env_file, "dir = \"/from/file\"\n").unwrap();

        let env_value = env_file.to_string_lossy().to_string();
        let resolver = ConfigResolver::new(None, None);
        let (config, source) = resolver
            .load_with(env_from(&[
                ("SPOOL_CONFIG", &env_value),
                ("SPOOL_DIR", "/from/env"),
            ]))
            .unwrap();
        assert_eq!(source, ConfigSource::EnvVar);
        assert_eq!(config.dir, PathBuf::from("/from/env"));

        let resolver = ConfigResolver::new(None, Some(PathBuf::from("/from/cli")));
        let (config, _) = resolver
            .load_with(env_from(&[
                ("SPOOL_CONFIG", &env_value),
                ("SPOOL_DIR", "/from/env"),
            ]))
            .unwrap();
        assert_eq!(config.dir, PathBuf::from("/from/cli"));
    }

    #[test]
    fn test_resolver_defaults_when_nothing_found() {
        let dir = tempdir().unwrap();
        let xdg = dir.path().to_string_lossy().to_string();
        let resolver = ConfigResolver::new(None, None);
        let (config, source) = resolver
            .load_with(env_from(&[("XDG_CONFIG_HOME", &xdg)]))
            .unwrap();
        assert_eq!(source, ConfigSource::Default);
        assert_eq!(config.max_size_bytes, SpoolConfig::default().max_size_bytes);
    }

    #[test]
    fn test_resolver_xdg_file() {
        let dir = tempdir().unwrap();
        let cfg_dir = dir.path().join("spool");
        fs::create_dir_all(&cfg_dir).unwrap();
        fs::write(cfg_dir.join("spool.toml"), "expiry_secs = 60\n").unwrap();

        let xdg = dir.path().to_string_lossy().to_string();
        let (config, source) = ConfigResolver::default()
            .load_with(env_from(&[("XDG_CONFIG_HOME", &xdg)]))
            .unwrap();
        assert_eq!(source, ConfigSource::XdgConfig);
        assert_eq!(config.expiry_secs, 60);
    }
}
