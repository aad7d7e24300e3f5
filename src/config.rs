//! `config.toml` and command-line overrides
//!
//! ```toml
//! [api]
//! url = "https://backup.example.com:9419"
//! product = "vbr"
//! token_env = "KEEL_API_TOKEN"
//!
//! [severity]
//! overrides = "~/.config/keel/severity.json"
//!
//! [state]
//! max_history = 3
//! ```

use anyhow::{Context, Result, bail};
use declarative::SeverityRules;
use ledger::DEFAULT_MAX_HISTORY_EVENTS;
use remote::{DEFAULT_PRODUCT, ProductProfile};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::paths;

/// Default environment variable holding the API bearer token
pub const DEFAULT_TOKEN_ENV: &str = "KEEL_API_TOKEN";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeelConfig {
    pub api: ApiConfig,
    pub severity: SeverityConfig,
    pub state: StateConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub url: Option<String>,
    pub product: String,
    pub api_version: Option<String>,
    /// Name of the environment variable holding the token, never the token itself
    pub token_env: String,
    pub insecure: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            url: None,
            product: DEFAULT_PRODUCT.to_string(),
            api_version: None,
            token_env: DEFAULT_TOKEN_ENV.to_string(),
            insecure: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeverityConfig {
    pub overrides: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    pub file: Option<String>,
    pub max_history: usize,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            file: None,
            max_history: DEFAULT_MAX_HISTORY_EVENTS,
        }
    }
}

/// Values given on the command line; each one wins over the file
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub api_url: Option<String>,
    pub product: Option<String>,
    pub severity_config: Option<String>,
    pub state_file: Option<String>,
}

impl KeelConfig {
    /// Load from a file; a missing file yields defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Invalid config {}", path.display()))
    }

    /// Load `<config_dir>/config.toml`
    pub fn load_default() -> Result<Self> {
        Self::load(&paths::config_file()?)
    }

    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        if overrides.api_url.is_some() {
            self.api.url = overrides.api_url;
        }
        if let Some(product) = overrides.product {
            self.api.product = product;
        }
        if overrides.severity_config.is_some() {
            self.severity.overrides = overrides.severity_config;
        }
        if overrides.state_file.is_some() {
            self.state.file = overrides.state_file;
        }
        self
    }

    /// Ledger location: configured file or `<state_dir>/state.json`
    pub fn state_file(&self) -> Result<PathBuf> {
        match &self.state.file {
            Some(file) => Ok(paths::expand(file)),
            None => paths::state_file(),
        }
    }

    pub fn max_history(&self) -> usize {
        self.state.max_history.max(1)
    }

    /// Product profile for the configured server
    pub fn product_profile(&self) -> Result<ProductProfile> {
        let Some(url) = &self.api.url else {
            bail!("No API URL configured; set [api] url in config.toml or pass --api-url");
        };
        let profile = ProductProfile::new(&self.api.product, url)?;
        Ok(match &self.api.api_version {
            Some(version) => profile.with_api_version(version),
            None => profile,
        })
    }

    /// Bearer token from the configured environment variable
    pub fn token(&self) -> Option<String> {
        std::env::var(&self.api.token_env)
            .ok()
            .filter(|t| !t.is_empty())
    }

    /// Built-in severity tables plus overrides
    ///
    /// An explicitly configured override file must exist; the default
    /// `<config_dir>/severity.json` is only read when present.
    pub fn severity_rules(&self) -> Result<SeverityRules> {
        let mut rules = SeverityRules::builtin();
        let path = match &self.severity.overrides {
            Some(file) => paths::expand(file),
            None => {
                let default = paths::severity_file()?;
                if !default.exists() {
                    return Ok(rules);
                }
                default
            }
        };

        let applied = rules
            .load_overrides(&path)
            .with_context(|| format!("Failed to load severity overrides from {}", path.display()))?;
        log::info!("Loaded {applied} severity overrides from {}", path.display());
        Ok(rules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::{Kind, Severity};
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_default() {
        let tmp = TempDir::new().unwrap();
        let config = KeelConfig::load(&tmp.path().join("config.toml")).unwrap();
        assert_eq!(config, KeelConfig::default());
        assert_eq!(config.api.product, "vbr");
        assert_eq!(config.max_history(), DEFAULT_MAX_HISTORY_EVENTS);
    }

    #[test]
    fn test_parse_full_config() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(
            &path,
            r#"
[api]
url = "https://backup.example.com:9419"
product = "vbr"
api_version = "1.2-rev0"
token_env = "BACKUP_TOKEN"
insecure = true

[severity]
overrides = "/etc/keel/severity.json"

[state]
max_history = 10
"#,
        )
        .unwrap();

        let config = KeelConfig::load(&path).unwrap();
        assert_eq!(config.api.url.as_deref(), Some("https://backup.example.com:9419"));
        assert_eq!(config.api.token_env, "BACKUP_TOKEN");
        assert!(config.api.insecure);
        assert_eq!(config.max_history(), 10);

        let profile = config.product_profile().unwrap();
        assert_eq!(profile.api_version.as_deref(), Some("1.2-rev0"));
    }

    #[test]
    fn test_partial_sections_keep_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(&path, "[api]\nurl = \"http://localhost:9419\"\n").unwrap();

        let config = KeelConfig::load(&path).unwrap();
        assert_eq!(config.api.token_env, DEFAULT_TOKEN_ENV);
        assert_eq!(config.state.max_history, DEFAULT_MAX_HISTORY_EVENTS);
    }

    #[test]
    fn test_invalid_config_is_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(&path, "[api\nurl = ").unwrap();
        assert!(KeelConfig::load(&path).is_err());
    }

    #[test]
    fn test_overrides_win() {
        let config = KeelConfig::default().with_overrides(Overrides {
            api_url: Some("http://cli:9419".into()),
            product: Some("custom".into()),
            severity_config: None,
            state_file: Some("/tmp/keel-ledger.json".into()),
        });
        assert_eq!(config.api.url.as_deref(), Some("http://cli:9419"));
        assert_eq!(config.api.product, "custom");
        assert_eq!(config.state_file().unwrap(), PathBuf::from("/tmp/keel-ledger.json"));
    }

    #[test]
    fn test_missing_url_is_error() {
        assert!(KeelConfig::default().product_profile().is_err());
    }

    #[test]
    fn test_severity_rules_from_explicit_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("severity.json");
        fs::write(&path, r#"{"BackupJob": {"description": "critical"}}"#).unwrap();

        let config = KeelConfig::default().with_overrides(Overrides {
            severity_config: Some(path.display().to_string()),
            ..Overrides::default()
        });
        let rules = config.severity_rules().unwrap();
        assert_eq!(rules.lookup(Kind::BackupJob, "description"), Severity::Critical);
    }

    #[test]
    fn test_explicit_missing_severity_file_is_error() {
        let config = KeelConfig::default().with_overrides(Overrides {
            severity_config: Some("/nonexistent/keel/severity.json".into()),
            ..Overrides::default()
        });
        assert!(config.severity_rules().is_err());
    }
}
