//! Shared fixtures: a volume directory, a state directory holding the
//! database and locks, and a matching configuration.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use voltrack::config::Config;
use voltrack::store::{FileRecord, InventoryStore};

pub struct Env {
    pub volume: TempDir,
    pub state: TempDir,
    pub config: Config,
}

impl Env {
    pub fn new() -> Self {
        let volume = TempDir::new().unwrap();
        let state = TempDir::new().unwrap();
        let mut config = Config::default();
        config.volumes = vec![volume.path().to_path_buf()];
        config.database.path = state.path().join("inventory.db");
        config.scan.lock_dir = state.path().join("locks");
        Self {
            volume,
            state,
            config,
        }
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.volume.path().join(rel)
    }

    pub fn write(&self, rel: &str, content: &[u8]) -> PathBuf {
        let path = self.path(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        File::create(&path).unwrap().write_all(content).unwrap();
        path
    }

    pub fn mkdir(&self, rel: &str) -> PathBuf {
        let path = self.path(rel);
        fs::create_dir_all(&path).unwrap();
        path
    }

    pub fn store(&self) -> InventoryStore {
        InventoryStore::from_config(&self.config.database).unwrap()
    }

    pub fn record(&self, rel: &str) -> Option<FileRecord> {
        self.store().find_by_path(&self.path(rel)).unwrap()
    }

    /// A TOML config file pointing at this environment.
    pub fn config_file(&self) -> PathBuf {
        let path = self.state.path().join("config.toml");
        let content = format!(
            "volumes = [{volume}]\n\n[database]\npath = {db}\n\n[scan]\nlock_dir = {locks}\n",
            volume = toml_string(self.volume.path()),
            db = toml_string(&self.config.database.path),
            locks = toml_string(&self.config.scan.lock_dir),
        );
        fs::write(&path, content).unwrap();
        path
    }
}

pub fn toml_string(path: &Path) -> String {
    format!("{:?}", path.to_str().unwrap())
}

pub fn blake3_hex(content: &[u8]) -> String {
    blake3::hash(content).to_hex().to_string()
}
