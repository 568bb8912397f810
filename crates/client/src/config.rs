//! Client configuration.
//!
//! Sources, lowest precedence first: built-in defaults, a TOML file, then
//! `FIELDOPS_*` environment variables. Command-line flags are applied on
//! top by the binary.
//!
//! # Example
//!
//! ```toml
//! base_url = "https://ops.example.net"
//! session_cookie = "connect.sid=s%3Aabc..."
//! timeout_secs = 30
//! poll_interval_secs = 5
//!
//! [upload]
//! read_ceiling = 40
//! chunk_size = 65536
//! max_bytes = 10485760
//! images_only = false
//!
//! [cache]
//! unviewed_capacity = 32
//! view_history = 4
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use fieldops_interchange::ResourceKind;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::cache::DEFAULT_UNVIEWED_CAPACITY;
use crate::upload::UploadPolicy;

/// Default file name looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "fieldops.toml";

/// Poll interval for ticket history and comments, which change faster.
pub const FAST_POLL_INTERVAL: Duration = Duration::from_secs(3);

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read '{path}': {message}")]
    Read { path: PathBuf, message: String },

    #[error("could not parse '{path}': {message}")]
    Parse { path: PathBuf, message: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// `[upload]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Progress value reached when the local read completes (1..=99).
    pub read_ceiling: u8,
    /// Bytes per read and per send chunk.
    pub chunk_size: usize,
    /// Refuse files larger than this many bytes.
    pub max_bytes: Option<u64>,
    /// Refuse files whose type is not `image/*`.
    pub images_only: bool,
}

impl Default for UploadConfig {
    fn default() -> Self {
        UploadConfig {
            read_ceiling: 40,
            chunk_size: 64 * 1024,
            max_bytes: None,
            images_only: false,
        }
    }
}

/// `[cache]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Collections kept once no view references them.
    pub unviewed_capacity: usize,
    /// Keys a view keeps alive, its current key included.
    pub view_history: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            unviewed_capacity: DEFAULT_UNVIEWED_CAPACITY,
            view_history: 4,
        }
    }
}

/// Top-level client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub base_url: String,
    /// Sent as the `Cookie` header on every request.
    pub session_cookie: Option<String>,
    pub timeout_secs: u64,
    /// Interval for polled lists (tickets); history and comments poll faster.
    pub poll_interval_secs: u64,
    pub upload: UploadConfig,
    pub cache: CacheConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            base_url: "http://localhost:5000".to_string(),
            session_cookie: None,
            timeout_secs: 30,
            poll_interval_secs: 5,
            upload: UploadConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from `path`, or from `./fieldops.toml` when it
    /// exists, then apply environment overrides and validate.
    ///
    /// An explicit `path` that does not exist is an error; a missing
    /// default file is not.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default = Path::new(CONFIG_FILE_NAME);
                if default.exists() {
                    Self::from_file(default)?
                } else {
                    ClientConfig::default()
                }
            }
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Apply `FIELDOPS_*` overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("FIELDOPS_BASE_URL") {
            self.base_url = url;
        }
        if let Some(cookie) = lookup("FIELDOPS_SESSION_COOKIE") {
            self.session_cookie = Some(cookie);
        }
        if let Some(secs) = lookup("FIELDOPS_TIMEOUT_SECS") {
            self.timeout_secs = parse_secs("FIELDOPS_TIMEOUT_SECS", &secs)?;
        }
        if let Some(secs) = lookup("FIELDOPS_POLL_INTERVAL_SECS") {
            self.poll_interval_secs = parse_secs("FIELDOPS_POLL_INTERVAL_SECS", &secs)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.base_url.trim();
        if url.is_empty() {
            return Err(ConfigError::Invalid("base_url must not be empty".into()));
        }
        let parsed = Url::parse(url)
            .map_err(|e| ConfigError::Invalid(format!("base_url '{}': {}", url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid(format!(
                "base_url '{}' must use http or https",
                url
            )));
        }
        if !parsed.has_host() {
            return Err(ConfigError::Invalid(format!("base_url '{}' has no host", url)));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeout_secs must be positive".into()));
        }
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "poll_interval_secs must be positive".into(),
            ));
        }
        if !(1..=99).contains(&self.upload.read_ceiling) {
            return Err(ConfigError::Invalid(format!(
                "upload.read_ceiling must be between 1 and 99, got {}",
                self.upload.read_ceiling
            )));
        }
        if self.upload.chunk_size == 0 {
            return Err(ConfigError::Invalid(
                "upload.chunk_size must be positive".into(),
            ));
        }
        if self.cache.view_history == 0 {
            return Err(ConfigError::Invalid(
                "cache.view_history must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Poll interval for a resource's lists.
    pub fn poll_interval(&self, kind: ResourceKind) -> Duration {
        let base = Duration::from_secs(self.poll_interval_secs);
        match kind {
            ResourceKind::TaskHistory | ResourceKind::TaskComments => base.min(FAST_POLL_INTERVAL),
            _ => base,
        }
    }

    /// The upload policy implied by `[upload]`, if any limit is set.
    pub fn upload_policy(&self) -> Option<UploadPolicy> {
        if self.upload.max_bytes.is_none() && !self.upload.images_only {
            return None;
        }
        Some(UploadPolicy {
            max_bytes: self.upload.max_bytes,
            images_only: self.upload.images_only,
        })
    }
}

fn parse_secs(var: &str, value: &str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("{} must be a whole number of seconds", var)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_are_valid() {
        let config = ClientConfig::default();
        config.validate().unwrap();
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(config.upload.read_ceiling, 40);
        assert!(config.upload_policy().is_none());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: ClientConfig = toml::from_str(
            r#"
            base_url = "https://ops.example.net"
            [upload]
            max_bytes = 1024
            "#,
        )
        .unwrap();
        assert_eq!(config.base_url, "https://ops.example.net");
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.upload.read_ceiling, 40);
        assert_eq!(config.upload_policy().unwrap().max_bytes, Some(1024));
    }

    #[test]
    fn env_overrides_file() {
        let env: HashMap<&str, &str> = [
            ("FIELDOPS_BASE_URL", "https://env.example.net"),
            ("FIELDOPS_TIMEOUT_SECS", "12"),
        ]
        .into_iter()
        .collect();
        let mut config = ClientConfig::default();
        config
            .apply_env(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.base_url, "https://env.example.net");
        assert_eq!(config.timeout_secs, 12);
    }

    #[test]
    fn bad_env_number_is_invalid() {
        let mut config = ClientConfig::default();
        let err = config
            .apply_env(|k| (k == "FIELDOPS_TIMEOUT_SECS").then(|| "soon".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut config = ClientConfig::default();
        config.upload.read_ceiling = 100;
        assert!(config.validate().is_err());

        let mut config = ClientConfig::default();
        config.base_url = "ftp://x".into();
        assert!(config.validate().is_err());

        let mut config = ClientConfig::default();
        config.poll_interval_secs = 0;
        assert!(config.validate().is_err());

        let mut config = ClientConfig::default();
        config.cache.view_history = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn base_url_must_parse_with_http_scheme_and_host() {
        for bad in ["http://", "https//ops.example.net", "http://exa mple.net", "mailto:ops@example.net"] {
            let mut config = ClientConfig::default();
            config.base_url = bad.into();
            assert!(
                matches!(config.validate(), Err(ConfigError::Invalid(_))),
                "{bad} accepted"
            );
        }
        let mut config = ClientConfig::default();
        config.base_url = "https://ops.example.net:8443/api".into();
        config.validate().unwrap();
    }

    #[test]
    fn cache_section_is_read() {
        let config: ClientConfig =
            toml::from_str("[cache]\nunviewed_capacity = 4\n").unwrap();
        assert_eq!(config.cache.unviewed_capacity, 4);
        assert_eq!(config.cache.view_history, 4);
    }

    #[test]
    fn history_polls_faster() {
        let config = ClientConfig::default();
        assert_eq!(config.poll_interval(ResourceKind::Tasks), Duration::from_secs(5));
        assert_eq!(
            config.poll_interval(ResourceKind::TaskComments),
            Duration::from_secs(3)
        );
    }

    #[test]
    fn load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ops.toml");
        std::fs::write(&path, "base_url = \"http://10.0.0.2:5000\"\ntimeout_secs = 5\n").unwrap();
        let config = ClientConfig::from_file(&path).unwrap();
        assert_eq!(config.base_url, "http://10.0.0.2:5000");
        assert_eq!(config.timeout_secs, 5);

        let missing = dir.path().join("missing.toml");
        assert!(matches!(
            ClientConfig::from_file(&missing),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn unparseable_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "timeout_secs = \"thirty\"\n").unwrap();
        assert!(matches!(
            ClientConfig::from_file(&path),
            Err(ConfigError::Parse { .. })
        ));
    }
}
