//! Configuration file handling for fintrack.
//!
//! The configuration file is stored at `$FINTRACK_HOME/config.json` and contains settings such as
//! where the ledger and recommendation files live, monthly budgets and how to reach the remote
//! recommendation service.

use crate::model::Amount;
use crate::{utils, Result};
use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

const APP_NAME: &str = "fintrack";
const CONFIG_VERSION: u8 = 1;
const CONFIG_JSON: &str = "config.json";
const LEDGER_CSV: &str = "transactions.csv";
const RECOMMENDATIONS_JSON: &str = "recommendations.json";
const HOLIDAYS_JSON: &str = "holidays.json";
const DEFAULT_REGION: &str = "US";
const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_API_KEY_ENV: &str = "FINTRACK_API_KEY";

/// The `Config` object represents the configuration of the app. You instantiate it by providing
/// the path to `$FINTRACK_HOME` and from there it loads `$FINTRACK_HOME/config.json`. It provides
/// paths to the data files, which are either configured or expected in a certain location within
/// the home directory.
#[derive(Debug, Clone)]
pub struct Config {
    root: PathBuf,
    config_path: PathBuf,
    config_file: ConfigFile,
}

impl Config {
    /// Creates the home directory and an initial `config.json` with default settings.
    ///
    /// # Arguments
    /// - `dir` - The directory that will be the root of the home directory, e.g. `$HOME/fintrack`
    ///
    /// # Errors
    /// - Returns an error if any file operations fail.
    pub async fn create(dir: impl Into<PathBuf>) -> Result<Self> {
        let maybe_relative = dir.into();
        utils::make_dir(&maybe_relative)
            .await
            .context("Unable to create the fintrack home directory")?;
        let root = utils::canonicalize(&maybe_relative).await?;
        let config_path = root.join(CONFIG_JSON);
        let config_file = ConfigFile::default();
        config_file.save(&config_path).await?;
        Ok(Self {
            root,
            config_path,
            config_file,
        })
    }

    /// This will
    /// - validate that the home directory and the config file exist
    /// - load and validate the config file
    /// - return the loaded configuration object
    pub async fn load(home: impl Into<PathBuf>) -> Result<Self> {
        let maybe_relative = home.into();
        let root = utils::canonicalize(&maybe_relative)
            .await
            .context("The fintrack home directory is missing, run 'fintrack init' first")?;
        let config_path = root.join(CONFIG_JSON);
        if !config_path.is_file() {
            bail!("The config file is missing '{}'", config_path.display())
        }
        let config_file = ConfigFile::load(&config_path).await?;
        Ok(Self {
            root,
            config_path,
            config_file,
        })
    }

    /// Writes the current settings back to `config.json`.
    pub async fn save(&self) -> Result<()> {
        self.config_file.save(&self.config_path).await
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn region(&self) -> &str {
        &self.config_file.region
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.resolve(&self.config_file.ledger_file)
    }

    pub fn recommendations_path(&self) -> PathBuf {
        self.resolve(&self.config_file.recommendations_file)
    }

    pub fn holidays_path(&self) -> PathBuf {
        self.resolve(&self.config_file.holidays_file)
    }

    pub fn atomic_writes(&self) -> bool {
        self.config_file.atomic_writes
    }

    /// Monthly budgets keyed by category name.
    pub fn budgets(&self) -> &BTreeMap<String, Amount> {
        &self.config_file.budgets
    }

    pub fn remote(&self) -> &RemoteSettings {
        &self.config_file.remote
    }

    /// Returns `p` unchanged if it is absolute, otherwise resolves it against the home directory.
    fn resolve(&self, p: &Path) -> PathBuf {
        if p.is_absolute() {
            return p.to_path_buf();
        }
        self.root.join(p)
    }

    #[cfg(test)]
    pub(crate) fn set_remote(&mut self, remote: RemoteSettings) {
        self.config_file.remote = remote;
    }

    #[cfg(test)]
    pub(crate) fn set_budget(&mut self, category: &str, amount: Amount) {
        self.config_file.budgets.insert(category.to_string(), amount);
    }
}

/// Settings for the remote recommendation service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RemoteSettings {
    /// The remote service is only called when this is set and a credential is available.
    pub enabled: bool,

    /// The chat-completion endpoint that receives the POST.
    pub endpoint: String,

    pub model: String,

    /// The bearer token. When absent, the environment variable named by `api_key_env` is used.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    pub api_key_env: String,

    pub temperature: f32,

    pub max_tokens: u32,

    pub timeout_secs: u64,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            temperature: 0.7,
            max_tokens: 800,
            timeout_secs: 30,
        }
    }
}

impl RemoteSettings {
    /// The configured bearer token, if any. An empty value counts as absent.
    pub fn credential(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(&self.api_key_env).ok())
            .filter(|k| !k.trim().is_empty())
    }

    /// The credential, when the remote service is enabled and one is available.
    pub fn active_credential(&self) -> Option<String> {
        if self.enabled {
            self.credential()
        } else {
            None
        }
    }

    pub fn endpoint_url(&self) -> Result<Url> {
        Url::parse(&self.endpoint)
            .with_context(|| format!("Invalid remote endpoint '{}'", self.endpoint))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Represents the serialization and deserialization format of the configuration file.
///
/// Example configuration:
/// ```json
/// {
///   "app_name": "fintrack",
///   "config_version": 1,
///   "region": "US",
///   "ledger_file": "transactions.csv",
///   "recommendations_file": "recommendations.json",
///   "holidays_file": "holidays.json",
///   "atomic_writes": true,
///   "budgets": { "Food": "400.00" },
///   "remote": {
///     "enabled": true,
///     "endpoint": "https://api.openai.com/v1/chat/completions",
///     "model": "gpt-4o-mini",
///     "api_key_env": "FINTRACK_API_KEY",
///     "temperature": 0.7,
///     "max_tokens": 800,
///     "timeout_secs": 30
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct ConfigFile {
    /// Application name, should always be "fintrack"
    app_name: String,

    /// Configuration file version
    config_version: u8,

    #[serde(default = "default_region")]
    region: String,

    /// Path to the ledger CSV, relative to the home directory or absolute
    #[serde(default = "default_ledger_file")]
    ledger_file: PathBuf,

    /// Path to the recommendation JSON, relative to the home directory or absolute
    #[serde(default = "default_recommendations_file")]
    recommendations_file: PathBuf,

    /// Path to the holiday list, relative to the home directory or absolute
    #[serde(default = "default_holidays_file")]
    holidays_file: PathBuf,

    /// Write data files through a temp file and rename
    #[serde(default = "default_true")]
    atomic_writes: bool,

    #[serde(default)]
    budgets: BTreeMap<String, Amount>,

    #[serde(default)]
    remote: RemoteSettings,
}

fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

fn default_ledger_file() -> PathBuf {
    PathBuf::from(LEDGER_CSV)
}

fn default_recommendations_file() -> PathBuf {
    PathBuf::from(RECOMMENDATIONS_JSON)
}

fn default_holidays_file() -> PathBuf {
    PathBuf::from(HOLIDAYS_JSON)
}

fn default_true() -> bool {
    true
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            app_name: APP_NAME.to_string(),
            config_version: CONFIG_VERSION,
            region: default_region(),
            ledger_file: default_ledger_file(),
            recommendations_file: default_recommendations_file(),
            holidays_file: default_holidays_file(),
            atomic_writes: true,
            budgets: BTreeMap::new(),
            remote: RemoteSettings::default(),
        }
    }
}

impl ConfigFile {
    /// Loads a ConfigFile asynchronously from the specified path.
    ///
    /// # Arguments
    /// * `path` - Path to the config.json file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed, if `app_name` is wrong, or if the remote
    /// service is enabled with an endpoint that is not a valid URL.
    async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config: ConfigFile = utils::deserialize(path).await?;

        anyhow::ensure!(
            config.app_name == APP_NAME,
            "Invalid app_name in config file: expected '{}', got '{}'",
            APP_NAME,
            config.app_name
        );
        if config.remote.enabled {
            config.remote.endpoint_url()?;
        }
        Ok(config)
    }

    /// Saves the ConfigFile to the specified path.
    async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let p = path.as_ref();
        let data = serde_json::to_string_pretty(self).context("Unable to serialize config")?;
        utils::write(p, data)
            .await
            .context("Unable to write config file")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_config_create_and_load() {
        let dir = TempDir::new().unwrap();
        let home_dir = dir.path().join("fintrack_home");

        let created = Config::create(&home_dir).await.unwrap();
        assert!(created.config_path().is_file());
        assert_eq!(created.ledger_path(), created.root().join(LEDGER_CSV));

        let loaded = Config::load(&home_dir).await.unwrap();
        assert_eq!(loaded.region(), DEFAULT_REGION);
        assert!(loaded.atomic_writes());
        assert!(!loaded.remote().enabled);
        assert_eq!(loaded.recommendations_path(), loaded.root().join(RECOMMENDATIONS_JSON));
    }

    #[tokio::test]
    async fn test_config_load_missing_home() {
        let dir = TempDir::new().unwrap();
        assert!(Config::load(dir.path().join("nope")).await.is_err());
    }

    #[tokio::test]
    async fn test_config_save_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::create(dir.path()).await.unwrap();
        config.set_budget("Food", Amount::from_str("400.00").unwrap());
        config.set_remote(RemoteSettings {
            enabled: true,
            api_key: Some("secret".to_string()),
            ..RemoteSettings::default()
        });
        config.save().await.unwrap();

        let loaded = Config::load(dir.path()).await.unwrap();
        assert_eq!(
            loaded.budgets().get("Food"),
            Some(&Amount::from_str("400.00").unwrap())
        );
        assert_eq!(loaded.remote().active_credential().as_deref(), Some("secret"));
    }

    #[tokio::test]
    async fn test_config_file_load_with_minimal_config() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join(CONFIG_JSON);
        utils::write(&config_path, r#"{"app_name": "fintrack", "config_version": 1}"#)
            .await
            .unwrap();
        let config = ConfigFile::load(&config_path).await.unwrap();
        assert_eq!(config, ConfigFile::default());
    }

    #[tokio::test]
    async fn test_config_file_load_invalid_app_name() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join(CONFIG_JSON);
        utils::write(&config_path, r#"{"app_name": "wrong_app", "config_version": 1}"#)
            .await
            .unwrap();
        let result = ConfigFile::load(&config_path).await;
        assert!(result.unwrap_err().to_string().contains("Invalid app_name"));
    }

    #[tokio::test]
    async fn test_config_file_load_invalid_endpoint() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join(CONFIG_JSON);
        let json = r#"{
            "app_name": "fintrack",
            "config_version": 1,
            "remote": { "enabled": true, "endpoint": "not a url" }
        }"#;
        utils::write(&config_path, json).await.unwrap();
        let result = ConfigFile::load(&config_path).await;
        assert!(result.unwrap_err().to_string().contains("Invalid remote endpoint"));
    }

    #[test]
    fn test_remote_credential() {
        let mut remote = RemoteSettings {
            api_key_env: "FINTRACK_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            ..RemoteSettings::default()
        };
        assert!(remote.credential().is_none());
        remote.api_key = Some("  ".to_string());
        assert!(remote.credential().is_none());
        remote.api_key = Some("k".to_string());
        assert_eq!(remote.credential().as_deref(), Some("k"));
        assert!(remote.active_credential().is_none());
        remote.enabled = true;
        assert_eq!(remote.active_credential().as_deref(), Some("k"));
    }
}
