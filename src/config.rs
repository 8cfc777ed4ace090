//! Layered configuration.
//!
//! Sources, lowest priority first:
//!
//! 1. [`Config::default()`]
//! 2. TOML file: `--config PATH`, else `config.toml` in the platform config dir
//! 3. Environment: `VOLTRACK_*`, with `__` for nesting (`VOLTRACK_WATCH__WORKERS=4`)
//! 4. CLI overrides, applied by the caller with [`Config::apply_overrides`]
//!
//! The result is validated once at startup and passed by reference from
//! then on.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::InventoryError;
use crate::filter::PathFilter;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "VOLTRACK_";

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("org", "voltrack", "voltrack")
}

fn data_dir() -> PathBuf {
    project_dirs().map_or_else(|| PathBuf::from(".voltrack"), |d| d.data_dir().to_path_buf())
}

/// Default config file location, if the platform has one.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    project_dirs().map(|d| d.config_dir().join("config.toml"))
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Volume roots to inventory
    #[serde(deserialize_with = "comma_list")]
    pub volumes: Vec<PathBuf>,
    /// Top-level name prefixes excluded under every volume
    #[serde(deserialize_with = "comma_list")]
    pub deny_list: Vec<String>,
    /// Entry names skipped anywhere in the tree
    #[serde(deserialize_with = "comma_list")]
    pub skip_components: Vec<String>,
    /// Inventory database
    pub database: DatabaseConfig,
    /// Scanner and hash pass
    pub scan: ScanConfig,
    /// Watcher
    pub watch: WatchConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            volumes: Vec::new(),
            deny_list: Vec::new(),
            skip_components: vec!["@eaDir".to_string()],
            database: DatabaseConfig::default(),
            scan: ScanConfig::default(),
            watch: WatchConfig::default(),
        }
    }
}

/// Database settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file
    pub path: PathBuf,
    /// How long SQLite waits on a lock before reporting busy
    pub busy_timeout_ms: u64,
    /// Attempts per store call on busy/locked
    pub retry_attempts: u32,
    /// Base delay between attempts
    pub retry_delay_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: data_dir().join("inventory.db"),
            busy_timeout_ms: 5000,
            retry_attempts: 3,
            retry_delay_ms: 200,
        }
    }
}

/// Scanner settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Records fetched per hash-pass batch
    pub hash_batch_size: usize,
    /// Directory holding run lock files
    pub lock_dir: PathBuf,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            hash_batch_size: 100,
            lock_dir: data_dir().join("locks"),
        }
    }
}

/// Watcher settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Event-applying worker threads
    pub workers: usize,
    /// How long a deleted record stays eligible for move correlation
    pub move_window_secs: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            move_window_secs: 5,
        }
    }
}

/// Values given on the command line; `None`/empty leaves the layer below.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// `--volume`
    pub volumes: Vec<PathBuf>,
    /// `--deny`
    pub deny_list: Vec<String>,
    /// `--database`
    pub database: Option<PathBuf>,
}

impl Config {
    /// Figment with defaults, the TOML file and the environment merged.
    ///
    /// A missing file is not an error: the layer is simply empty.
    #[must_use]
    pub fn figment(config_file: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = config_file.map(Path::to_path_buf).or_else(default_config_path) {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Load configuration from all layers below the CLI.
    ///
    /// # Errors
    ///
    /// [`InventoryError::Config`] if a layer can't be parsed, or if an
    /// explicitly named file doesn't exist.
    pub fn load(config_file: Option<&Path>) -> Result<Self, InventoryError> {
        if let Some(path) = config_file {
            if !path.is_file() {
                return Err(InventoryError::Config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
        }
        let config: Self = Self::figment(config_file).extract()?;
        log::debug!("Loaded configuration: {:?}", config);
        Ok(config)
    }

    /// Apply CLI values on top.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if !overrides.volumes.is_empty() {
            self.volumes = overrides.volumes.clone();
        }
        if !overrides.deny_list.is_empty() {
            self.deny_list = overrides.deny_list.clone();
        }
        if let Some(path) = &overrides.database {
            self.database.path = path.clone();
        }
    }

    /// Check the settings every command depends on.
    ///
    /// # Errors
    ///
    /// [`InventoryError::Config`] naming the first problem found.
    pub fn validate(&self) -> Result<(), InventoryError> {
        if self.volumes.is_empty() {
            return Err(InventoryError::Config(
                "no volumes configured (set `volumes`, VOLTRACK_VOLUMES or --volume)".into(),
            ));
        }
        if let Some(relative) = self.volumes.iter().find(|v| !v.is_absolute()) {
            return Err(InventoryError::Config(format!(
                "volume path must be absolute: {}",
                relative.display()
            )));
        }
        if let Some(bad) = self.volumes.iter().find(|v| v.to_str().is_none()) {
            return Err(InventoryError::Config(format!(
                "volume path is not valid UTF-8: {}",
                bad.display()
            )));
        }
        for (i, outer) in self.volumes.iter().enumerate() {
            if let Some(inner) = self
                .volumes
                .iter()
                .enumerate()
                .find(|&(j, inner)| j != i && inner.starts_with(outer))
                .map(|(_, inner)| inner)
            {
                return Err(InventoryError::Config(format!(
                    "volume {} overlaps volume {}",
                    inner.display(),
                    outer.display()
                )));
            }
        }
        if self.database.path.as_os_str().is_empty() {
            return Err(InventoryError::Config("database.path is empty".into()));
        }
        if self.scan.hash_batch_size == 0 {
            return Err(InventoryError::Config(
                "scan.hash_batch_size must be at least 1".into(),
            ));
        }
        if self.watch.workers == 0 {
            return Err(InventoryError::Config("watch.workers must be at least 1".into()));
        }
        Ok(())
    }

    /// The path filter for these volumes and lists.
    #[must_use]
    pub fn path_filter(&self) -> PathFilter {
        PathFilter::new(
            self.volumes.clone(),
            self.deny_list.clone(),
            self.skip_components.clone(),
        )
    }
}

/// Accept either a sequence or a single comma-separated string.
///
/// Environment variables can only carry strings, so `VOLTRACK_VOLUMES=/a,/b`
/// must work the same as `volumes = ["/a", "/b"]` in TOML. The `Env`
/// provider types values it can parse, so `VOLTRACK_DENY_LIST=2021` arrives
/// as an integer and is turned back into its text.
fn comma_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: From<String>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scalar {
        Text(String),
        Bool(bool),
        Signed(i64),
        Unsigned(u64),
        Float(f64),
    }

    impl Scalar {
        fn into_text(self) -> String {
            match self {
                Self::Text(s) => s,
                Self::Bool(b) => b.to_string(),
                Self::Signed(n) => n.to_string(),
                Self::Unsigned(n) => n.to_string(),
                Self::Float(n) => n.to_string(),
            }
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        Many(Vec<Scalar>),
        One(Scalar),
    }

    let items: Vec<String> = match OneOrMany::deserialize(deserializer)? {
        OneOrMany::Many(items) => items.into_iter().map(Scalar::into_text).collect(),
        OneOrMany::One(Scalar::Text(joined)) => joined.split(',').map(str::to_owned).collect(),
        OneOrMany::One(other) => vec![other.into_text()],
    };
    Ok(items
        .into_iter()
        .map(|item| item.trim().to_owned())
        .filter(|item| !item.is_empty())
        .map(T::from)
        .collect())
}
