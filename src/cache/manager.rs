use tracing::{debug, info, warn};

use super::fetch::{Fetcher, Request, Response};
use super::storage::CacheStorage;
use super::CacheError;
use crate::config::CacheConfig;

/// Suffix of the scratch cache an install writes into before it is promoted.
const STAGING_SUFFIX: &str = ".installing";

/// Outcome of a successful install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub cache: String,
    pub assets: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheRole {
    /// App-shell cache of the running version.
    Shell,
    /// Grow-only tile cache.
    Tiles,
    /// Anything else; removed by the next activation.
    Stale,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSummary {
    pub name: String,
    pub role: CacheRole,
    pub entries: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStatus {
    pub shell_cache: String,
    pub installed: bool,
    pub caches: Vec<CacheSummary>,
}

/// Intercepts asset and tile requests, answering from disk when it can.
pub struct OfflineCache<F: Fetcher> {
    storage: CacheStorage,
    config: CacheConfig,
    fetcher: F,
}

impl<F: Fetcher> OfflineCache<F> {
    pub fn new(config: &CacheConfig, fetcher: F) -> Result<Self, CacheError> {
        Ok(Self {
            storage: CacheStorage::new(&config.dir)?,
            config: config.clone(),
            fetcher,
        })
    }

    pub fn storage(&self) -> &CacheStorage {
        &self.storage
    }

    pub fn shell_cache_name(&self) -> String {
        self.config.shell_cache_name()
    }

    /// Pre-populate the app-shell cache for the configured version.
    ///
    /// Every manifest asset must fetch with a 2xx status. A single failure
    /// aborts the install and leaves any previously installed cache of the
    /// same name untouched.
    pub fn install(&self) -> Result<InstallReport, CacheError> {
        let name = self.shell_cache_name();
        info!(cache = %name, assets = self.config.manifest.len(), "Installing app shell");

        let mut fetched = Vec::with_capacity(self.config.manifest.len());
        for path in &self.config.manifest {
            let request = Request::get(resolve_url(&self.config.origin, path));
            let response = self.fetcher.fetch(&request).map_err(|e| CacheError::InstallFailed {
                cache: name.clone(),
                reason: e.to_string(),
            })?;
            if !response.is_ok() {
                return Err(CacheError::InstallFailed {
                    cache: name,
                    reason: format!("{} returned status {}", request.url, response.status),
                });
            }
            fetched.push((request, response));
        }

        let staging = format!("{}{}", name, STAGING_SUFFIX);
        self.storage.delete(&staging)?;
        let cache = self.storage.open(&staging)?;
        for (request, response) in &fetched {
            if let Err(e) = cache.put(request, response) {
                let _ = self.storage.delete(&staging);
                return Err(e);
            }
        }
        self.storage.promote(&staging, &name)?;

        info!(cache = %name, assets = fetched.len(), "App shell installed");
        Ok(InstallReport {
            cache: name,
            assets: fetched.len(),
        })
    }

    /// Delete every cache other than the current shell cache and the tile cache.
    /// Returns the names removed.
    pub fn activate(&self) -> Result<Vec<String>, CacheError> {
        let current = self.shell_cache_name();
        if !self.storage.has(&current) {
            return Err(CacheError::NotInstalled(current));
        }

        let mut removed = Vec::new();
        for name in self.storage.cache_names()? {
            if self.role_of(&name, &current) != CacheRole::Stale {
                continue;
            }
            if self.storage.delete(&name)? {
                info!(cache = %name, "Removed outdated cache");
                removed.push(name);
            }
        }
        Ok(removed)
    }

    /// Answer a request from cache or network.
    pub fn handle(&self, request: &Request) -> Result<Response, CacheError> {
        if !request.is_get() {
            return Ok(self.fetcher.fetch(request)?);
        }

        if self.is_tile_request(request) {
            self.handle_tile(request)
        } else {
            self.handle_shell(request)
        }
    }

    pub fn status(&self) -> Result<CacheStatus, CacheError> {
        let current = self.shell_cache_name();
        let mut caches = Vec::new();
        for name in self.storage.cache_names()? {
            let entries = match self.storage.existing(&name)? {
                Some(cache) => cache.entry_count()?,
                None => 0,
            };
            caches.push(CacheSummary {
                role: self.role_of(&name, &current),
                name,
                entries,
            });
        }
        Ok(CacheStatus {
            installed: self.storage.has(&current),
            shell_cache: current,
            caches,
        })
    }

    pub fn is_tile_request(&self, request: &Request) -> bool {
        let Some(host) = request.host() else {
            return false;
        };
        self.config.tile_hosts.iter().any(|tile_host| {
            host.eq_ignore_ascii_case(tile_host)
                || host
                    .to_ascii_lowercase()
                    .ends_with(&format!(".{}", tile_host.to_ascii_lowercase()))
        })
    }

    fn handle_tile(&self, request: &Request) -> Result<Response, CacheError> {
        let cache = self.storage.open(&self.config.tile_cache)?;
        if let Some(hit) = cache.matches(request)? {
            debug!(url = %request.url, "Tile served from cache");
            return Ok(hit);
        }

        let response = self.fetcher.fetch(request)?;
        if response.is_ok() {
            if let Err(e) = cache.put(request, &response) {
                warn!(url = %request.url, error = %e, "Failed to cache tile");
            }
        } else {
            debug!(url = %request.url, status = response.status, "Not caching unsuccessful tile response");
        }
        Ok(response)
    }

    fn handle_shell(&self, request: &Request) -> Result<Response, CacheError> {
        if let Some(cache) = self.storage.existing(&self.shell_cache_name())? {
            if let Some(hit) = cache.matches(request)? {
                debug!(url = %request.url, "Asset served from app shell cache");
                return Ok(hit);
            }
        }
        Ok(self.fetcher.fetch(request)?)
    }

    fn role_of(&self, name: &str, current: &str) -> CacheRole {
        if name == current {
            CacheRole::Shell
        } else if name == self.config.tile_cache {
            CacheRole::Tiles
        } else {
            CacheRole::Stale
        }
    }
}

/// Resolve a manifest path such as `./index.html` against the app origin.
pub fn resolve_url(origin: &str, path: &str) -> String {
    if path.contains("://") {
        return path.to_string();
    }
    let relative = path.strip_prefix("./").unwrap_or(path).trim_start_matches('/');
    format!("{}/{}", origin.trim_end_matches('/'), relative)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{FetchError, ResponseSource};
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;
    use tempfile::{tempdir, TempDir};

    #[derive(Default)]
    struct FakeFetcher {
        bodies: HashMap<String, (u16, Vec<u8>)>,
        offline: HashSet<String>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeFetcher {
        fn serve(mut self, url: &str, status: u16, body: &[u8]) -> Self {
            self.bodies.insert(url.to_string(), (status, body.to_vec()));
            self
        }

        fn offline(mut self, url: &str) -> Self {
            self.offline.insert(url.to_string());
            self
        }

        fn calls_to(&self, url: &str) -> usize {
            self.calls.lock().unwrap().iter().filter(|u| *u == url).count()
        }

        fn total_calls(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    impl Fetcher for FakeFetcher {
        fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
            self.calls.lock().unwrap().push(request.url.clone());
            if self.offline.contains(&request.url) {
                return Err(FetchError::Transport {
                    url: request.url.clone(),
                    message: "network unreachable".to_string(),
                });
            }
            let (status, body) = self
                .bodies
                .get(&request.url)
                .cloned()
                .unwrap_or((404, Vec::new()));
            Ok(Response::network(status, Some("application/octet-stream".to_string()), body))
        }
    }

    const ORIGIN: &str = "http://localhost:8080";
    const TILE: &str = "https://a.tile.openstreetmap.org/15/29105/12903.png";

    fn test_config(dir: &TempDir, version: &str) -> CacheConfig {
        CacheConfig {
            dir: dir.path().join("caches"),
            origin: ORIGIN.to_string(),
            version: version.to_string(),
            manifest: vec!["./".to_string(), "./index.html".to_string(), "./style.css".to_string()],
            ..CacheConfig::default()
        }
    }

    fn shell_fetcher() -> FakeFetcher {
        FakeFetcher::default()
            .serve("http://localhost:8080/", 200, b"<html>")
            .serve("http://localhost:8080/index.html", 200, b"<html>")
            .serve("http://localhost:8080/style.css", 200, b"body{}")
    }

    #[test]
    fn test_resolve_url() {
        assert_eq!(resolve_url("http://h:1/", "./"), "http://h:1/");
        assert_eq!(resolve_url("http://h:1", "./index.html"), "http://h:1/index.html");
        assert_eq!(resolve_url("http://h:1", "/icons/i.png"), "http://h:1/icons/i.png");
        assert_eq!(resolve_url("http://h:1", "https://cdn/x.js"), "https://cdn/x.js");
    }

    #[test]
    fn test_tile_fetched_once_then_served_from_cache() {
        let dir = tempdir().unwrap();
        let fetcher = FakeFetcher::default().serve(TILE, 200, b"tile-bytes");
        let cache = OfflineCache::new(&test_config(&dir, "v3"), fetcher).unwrap();
        let request = Request::get(TILE);

        let first = cache.handle(&request).unwrap();
        assert_eq!(first.source, ResponseSource::Network);
        assert_eq!(cache.storage().existing("tiles-cache").unwrap().unwrap().entry_count().unwrap(), 1);

        let second = cache.handle(&request).unwrap();
        assert_eq!(second.source, ResponseSource::Cache);
        assert_eq!(second.body, b"tile-bytes");
        assert_eq!(cache.fetcher.calls_to(TILE), 1);
    }

    #[test]
    fn test_tile_network_failure_propagates() {
        let dir = tempdir().unwrap();
        let fetcher = FakeFetcher::default().offline(TILE);
        let cache = OfflineCache::new(&test_config(&dir, "v3"), fetcher).unwrap();

        let err = cache.handle(&Request::get(TILE)).unwrap_err();
        assert!(matches!(err, CacheError::Network(_)));
    }

    #[test]
    fn test_unsuccessful_tile_is_not_cached() {
        let dir = tempdir().unwrap();
        let cache = OfflineCache::new(&test_config(&dir, "v3"), FakeFetcher::default()).unwrap();
        let request = Request::get(TILE);

        assert_eq!(cache.handle(&request).unwrap().status, 404);
        assert_eq!(cache.handle(&request).unwrap().status, 404);
        assert_eq!(cache.fetcher.calls_to(TILE), 2);
    }

    #[test]
    fn test_tile_host_matching() {
        let dir = tempdir().unwrap();
        let cache = OfflineCache::new(&test_config(&dir, "v3"), FakeFetcher::default()).unwrap();

        assert!(cache.is_tile_request(&Request::get("https://tile.openstreetmap.org/1/1/1.png")));
        assert!(cache.is_tile_request(&Request::get("https://B.Tile.OpenStreetMap.org/1/1/1.png")));
        assert!(!cache.is_tile_request(&Request::get("https://eviltile.openstreetmap.org.example/1.png")));
        assert!(!cache.is_tile_request(&Request::get("http://localhost:8080/tile.openstreetmap.org")));
    }

    #[test]
    fn test_install_then_serve_shell_offline() {
        let dir = tempdir().unwrap();
        let cache = OfflineCache::new(&test_config(&dir, "v3"), shell_fetcher()).unwrap();

        let report = cache.install().unwrap();
        assert_eq!(report.cache, "walk_app_cache_v3");
        assert_eq!(report.assets, 3);
        let calls_after_install = cache.fetcher.total_calls();

        let response = cache.handle(&Request::get("http://localhost:8080/style.css")).unwrap();
        assert_eq!(response.source, ResponseSource::Cache);
        assert_eq!(response.body, b"body{}");
        assert_eq!(cache.fetcher.total_calls(), calls_after_install);
    }

    #[test]
    fn test_shell_miss_goes_to_network_without_caching() {
        let dir = tempdir().unwrap();
        let fetcher = shell_fetcher().serve("http://localhost:8080/api/extra.json", 200, b"{}");
        let cache = OfflineCache::new(&test_config(&dir, "v3"), fetcher).unwrap();
        cache.install().unwrap();

        let request = Request::get("http://localhost:8080/api/extra.json");
        assert_eq!(cache.handle(&request).unwrap().source, ResponseSource::Network);
        assert_eq!(cache.handle(&request).unwrap().source, ResponseSource::Network);
        assert_eq!(cache.fetcher.calls_to(&request.url), 2);
    }

    #[test]
    fn test_non_get_bypasses_cache() {
        let dir = tempdir().unwrap();
        let fetcher = FakeFetcher::default().serve(TILE, 200, b"tile");
        let cache = OfflineCache::new(&test_config(&dir, "v3"), fetcher).unwrap();
        let request = Request {
            method: "POST".to_string(),
            url: TILE.to_string(),
        };

        cache.handle(&request).unwrap();
        assert!(cache.storage().existing("tiles-cache").unwrap().is_none());
    }

    #[test]
    fn test_failed_install_aborts_and_keeps_previous_cache() {
        let dir = tempdir().unwrap();
        let config = test_config(&dir, "v3");
        OfflineCache::new(&config, shell_fetcher()).unwrap().install().unwrap();

        let broken = FakeFetcher::default()
            .serve("http://localhost:8080/", 200, b"<html v2>")
            .offline("http://localhost:8080/index.html");
        let cache = OfflineCache::new(&config, broken).unwrap();

        let err = cache.install().unwrap_err();
        assert!(matches!(err, CacheError::InstallFailed { .. }));

        let kept = cache.storage().existing("walk_app_cache_v3").unwrap().unwrap();
        assert_eq!(kept.entry_count().unwrap(), 3);
        let root = kept.matches(&Request::get("http://localhost:8080/")).unwrap().unwrap();
        assert_eq!(root.body, b"<html>");
        assert_eq!(cache.storage().cache_names().unwrap(), vec!["walk_app_cache_v3"]);
    }

    #[test]
    fn test_install_rejects_error_status() {
        let dir = tempdir().unwrap();
        let fetcher = FakeFetcher::default()
            .serve("http://localhost:8080/", 200, b"<html>")
            .serve("http://localhost:8080/index.html", 200, b"<html>");
        let cache = OfflineCache::new(&test_config(&dir, "v4"), fetcher).unwrap();

        assert!(matches!(cache.install(), Err(CacheError::InstallFailed { .. })));
        assert!(!cache.storage().has("walk_app_cache_v4"));
    }

    #[test]
    fn test_version_rollover_keeps_tile_cache() {
        let dir = tempdir().unwrap();

        let v3 = OfflineCache::new(&test_config(&dir, "v3"), shell_fetcher().serve(TILE, 200, b"t")).unwrap();
        v3.install().unwrap();
        v3.handle(&Request::get(TILE)).unwrap();

        let v4 = OfflineCache::new(&test_config(&dir, "v4"), shell_fetcher()).unwrap();
        v4.install().unwrap();
        let removed = v4.activate().unwrap();

        assert_eq!(removed, vec!["walk_app_cache_v3"]);
        assert_eq!(
            v4.storage().cache_names().unwrap(),
            vec!["tiles-cache", "walk_app_cache_v4"]
        );

        let tile = v4.handle(&Request::get(TILE)).unwrap();
        assert_eq!(tile.source, ResponseSource::Cache);
    }

    #[test]
    fn test_activate_requires_install() {
        let dir = tempdir().unwrap();
        let v3 = OfflineCache::new(&test_config(&dir, "v3"), shell_fetcher()).unwrap();
        v3.install().unwrap();

        let v4 = OfflineCache::new(&test_config(&dir, "v4"), shell_fetcher()).unwrap();
        assert!(matches!(v4.activate(), Err(CacheError::NotInstalled(_))));
        assert!(v4.storage().has("walk_app_cache_v3"));
    }

    #[test]
    fn test_status_reports_roles() {
        let dir = tempdir().unwrap();
        let v3 = OfflineCache::new(&test_config(&dir, "v3"), shell_fetcher().serve(TILE, 200, b"t")).unwrap();
        v3.install().unwrap();
        v3.handle(&Request::get(TILE)).unwrap();

        let v4 = OfflineCache::new(&test_config(&dir, "v4"), FakeFetcher::default()).unwrap();
        let status = v4.status().unwrap();

        assert_eq!(status.shell_cache, "walk_app_cache_v4");
        assert!(!status.installed);
        assert_eq!(
            status.caches,
            vec![
                CacheSummary { name: "tiles-cache".to_string(), role: CacheRole::Tiles, entries: 1 },
                CacheSummary { name: "walk_app_cache_v3".to_string(), role: CacheRole::Stale, entries: 3 },
            ]
        );
    }
}
