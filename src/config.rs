use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::db::STORE_FILE_NAME;
use crate::location::Position;

/// Environment variable that points at an alternative config file.
pub const CONFIG_ENV: &str = "WALKPIN_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default)]
    pub map: MapConfig,

    #[serde(default)]
    pub export: ExportConfig,

    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapConfig {
    /// Used for new pins when no position can be determined.
    #[serde(default = "default_center_lat")]
    pub default_lat: f64,

    #[serde(default = "default_center_lng")]
    pub default_lng: f64,
}

// Tokyo Station
fn default_center_lat() -> f64 {
    35.681236
}

fn default_center_lng() -> f64 {
    139.767125
}

impl MapConfig {
    pub fn default_center(&self) -> Position {
        Position::new(self.default_lat, self.default_lng)
    }
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            default_lat: default_center_lat(),
            default_lng: default_center_lng(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Directory export documents are written to.
    #[serde(default = "default_export_dir")]
    pub dir: PathBuf,
}

fn default_export_dir() -> PathBuf {
    dirs::download_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            dir: default_export_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,

    /// Origin the app shell is served from; manifest paths resolve against it.
    #[serde(default = "default_origin")]
    pub origin: String,

    #[serde(default = "default_shell_prefix")]
    pub shell_prefix: String,

    /// Release token. Must change on every deployable update.
    #[serde(default = "default_version")]
    pub version: String,

    /// Static assets pre-cached at install.
    #[serde(default = "default_manifest")]
    pub manifest: Vec<String>,

    #[serde(default = "default_tile_cache")]
    pub tile_cache: String,

    /// Hosts whose responses go to the tile cache. Subdomains match too.
    #[serde(default = "default_tile_hosts")]
    pub tile_hosts: Vec<String>,

    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
}

fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("walkpin/caches")
}

fn default_origin() -> String {
    "http://localhost:8080".to_string()
}

fn default_shell_prefix() -> String {
    "walk_app_cache_".to_string()
}

fn default_version() -> String {
    "v3".to_string()
}

fn default_manifest() -> Vec<String> {
    vec![
        "./".to_string(),
        "./index.html".to_string(),
        "./style.css".to_string(),
        "./script.js".to_string(),
        "./manifest.json".to_string(),
        "./icons/icon-512x512.png".to_string(),
    ]
}

fn default_tile_cache() -> String {
    "tiles-cache".to_string()
}

fn default_tile_hosts() -> Vec<String> {
    vec!["tile.openstreetmap.org".to_string()]
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

impl CacheConfig {
    /// Name of the app-shell cache for the current version, e.g. `walk_app_cache_v3`.
    pub fn shell_cache_name(&self) -> String {
        format!("{}{}", self.shell_prefix, self.version)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
            origin: default_origin(),
            shell_prefix: default_shell_prefix(),
            version: default_version(),
            manifest: default_manifest(),
            tile_cache: default_tile_cache(),
            tile_hosts: default_tile_hosts(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
        }
    }
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("walkpin")
        .join(STORE_FILE_NAME)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            map: MapConfig::default(),
            export: ExportConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl Config {
    /// Load from `$WALKPIN_CONFIG` or the default location, writing defaults on first run.
    pub fn load() -> Result<Self> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::load_from(Path::new(&path)),
            None => Self::load_from(&Self::config_path()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("walkpin")
    }

    fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            db_path = "/tmp/pins.db"

            [cache]
            version = "v4"
            "#,
        )
        .unwrap();

        assert_eq!(config.db_path, PathBuf::from("/tmp/pins.db"));
        assert_eq!(config.cache.shell_cache_name(), "walk_app_cache_v4");
        assert_eq!(config.cache.tile_cache, "tiles-cache");
        assert_eq!(config.cache.manifest.len(), 6);
        assert_eq!(config.map.default_center(), Position::new(35.681236, 139.767125));
    }

    #[test]
    fn test_load_from_missing_file_writes_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("walkpin").join("config.toml");

        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.cache.version, "v3");

        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded.cache.shell_cache_name(), config.cache.shell_cache_name());
        assert_eq!(reloaded.db_path, config.db_path);
    }

    #[test]
    fn test_invalid_config_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "db_path = [").unwrap();
        assert!(Config::load_from(&path).is_err());
    }
}
