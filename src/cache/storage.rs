//! On-disk named caches.
//!
//! Layout: `<root>/<cache name>/<sha256(url)>.body` holds the response body
//! and `<sha256(url)>.json` its metadata. The metadata file is written last
//! and its presence is what makes an entry visible, so a crash mid-write
//! leaves the entry absent rather than half present.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use super::fetch::{Request, Response, ResponseSource};
use super::CacheError;

const BODY_EXT: &str = "body";
const META_EXT: &str = "json";
/// Suffix a replaced cache carries between the two renames of a promote.
const RETIRED_SUFFIX: &str = ".retired";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EntryMeta {
    url: String,
    status: u16,
    content_type: Option<String>,
    stored_at: DateTime<Utc>,
}

pub struct CacheStorage {
    root: PathBuf,
}

impl CacheStorage {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| CacheError::storage(&root, e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Open a cache, creating it if needed.
    pub fn open(&self, name: &str) -> Result<NamedCache, CacheError> {
        let dir = self.cache_dir(name)?;
        fs::create_dir_all(&dir).map_err(|e| CacheError::storage(&dir, e))?;
        Ok(NamedCache {
            name: name.to_string(),
            dir,
        })
    }

    /// Open a cache only if it already exists.
    pub fn existing(&self, name: &str) -> Result<Option<NamedCache>, CacheError> {
        let dir = self.cache_dir(name)?;
        if dir.is_dir() {
            Ok(Some(NamedCache {
                name: name.to_string(),
                dir,
            }))
        } else {
            Ok(None)
        }
    }

    pub fn has(&self, name: &str) -> bool {
        self.cache_dir(name).map(|d| d.is_dir()).unwrap_or(false)
    }

    /// Delete a cache and every entry in it. Returns whether it existed.
    pub fn delete(&self, name: &str) -> Result<bool, CacheError> {
        let dir = self.cache_dir(name)?;
        if !dir.is_dir() {
            return Ok(false);
        }
        fs::remove_dir_all(&dir).map_err(|e| CacheError::storage(&dir, e))?;
        Ok(true)
    }

    /// Replace cache `to` with cache `from`.
    ///
    /// The old `to` is renamed aside before `from` takes its place and is only
    /// deleted afterwards, so `to` is never missing while its replacement is
    /// still being removed.
    pub fn promote(&self, from: &str, to: &str) -> Result<(), CacheError> {
        let src = self.cache_dir(from)?;
        let dst = self.cache_dir(to)?;
        let retired = self.cache_dir(&format!("{}{}", to, RETIRED_SUFFIX))?;

        if retired.is_dir() {
            fs::remove_dir_all(&retired).map_err(|e| CacheError::storage(&retired, e))?;
        }
        let had_previous = dst.is_dir();
        if had_previous {
            fs::rename(&dst, &retired).map_err(|e| CacheError::storage(&dst, e))?;
        }
        if let Err(e) = fs::rename(&src, &dst) {
            if had_previous {
                let _ = fs::rename(&retired, &dst);
            }
            return Err(CacheError::storage(&src, e));
        }
        if had_previous {
            if let Err(e) = fs::remove_dir_all(&retired) {
                warn!(path = ?retired, error = %e, "Failed to remove replaced cache");
            }
        }
        Ok(())
    }

    /// Names of all caches, sorted.
    pub fn cache_names(&self) -> Result<Vec<String>, CacheError> {
        let entries = fs::read_dir(&self.root).map_err(|e| CacheError::storage(&self.root, e))?;
        let mut names: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .filter_map(|e| e.file_name().into_string().ok())
            .collect();
        names.sort();
        Ok(names)
    }

    fn cache_dir(&self, name: &str) -> Result<PathBuf, CacheError> {
        let valid = !name.is_empty()
            && name != "."
            && name != ".."
            && !name.contains(['/', '\\'])
            && !name.chars().any(|c| c.is_control());
        if !valid {
            return Err(CacheError::InvalidName(name.to_string()));
        }
        Ok(self.root.join(name))
    }
}

pub struct NamedCache {
    name: String,
    dir: PathBuf,
}

impl NamedCache {
    /// Look up a stored response by exact request URL.
    pub fn matches(&self, request: &Request) -> Result<Option<Response>, CacheError> {
        let key = entry_key(&request.url);
        let meta_path = self.dir.join(format!("{}.{}", key, META_EXT));
        if !meta_path.exists() {
            return Ok(None);
        }

        let raw = fs::read_to_string(&meta_path).map_err(|e| CacheError::storage(&meta_path, e))?;
        let meta: EntryMeta = serde_json::from_str(&raw).map_err(|e| CacheError::Corrupt {
            path: meta_path.clone(),
            message: e.to_string(),
        })?;
        if meta.url != request.url {
            return Ok(None);
        }

        let body_path = self.dir.join(format!("{}.{}", key, BODY_EXT));
        let body = match fs::read(&body_path) {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(cache = %self.name, url = %request.url, "Cache entry has no body; treating as miss");
                return Ok(None);
            }
            Err(e) => return Err(CacheError::storage(&body_path, e)),
        };

        Ok(Some(Response {
            status: meta.status,
            content_type: meta.content_type,
            body,
            source: ResponseSource::Cache,
        }))
    }

    /// Store a response under the request URL, replacing any previous entry.
    pub fn put(&self, request: &Request, response: &Response) -> Result<(), CacheError> {
        let key = entry_key(&request.url);
        let meta = EntryMeta {
            url: request.url.clone(),
            status: response.status,
            content_type: response.content_type.clone(),
            stored_at: Utc::now(),
        };
        let meta_json = serde_json::to_vec_pretty(&meta).map_err(|e| CacheError::Corrupt {
            path: self.dir.clone(),
            message: e.to_string(),
        })?;

        write_atomic(&self.dir.join(format!("{}.{}", key, BODY_EXT)), &response.body)?;
        write_atomic(&self.dir.join(format!("{}.{}", key, META_EXT)), &meta_json)?;
        Ok(())
    }

    /// URLs of every stored entry, sorted.
    pub fn keys(&self) -> Result<Vec<String>, CacheError> {
        let entries = fs::read_dir(&self.dir).map_err(|e| CacheError::storage(&self.dir, e))?;
        let mut urls = Vec::new();
        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(META_EXT) {
                continue;
            }
            let parsed = fs::read_to_string(&path)
                .ok()
                .and_then(|raw| serde_json::from_str::<EntryMeta>(&raw).ok());
            match parsed {
                Some(meta) => urls.push(meta.url),
                None => warn!(path = ?path, "Skipping unreadable cache entry"),
            }
        }
        urls.sort();
        Ok(urls)
    }

    pub fn entry_count(&self) -> Result<usize, CacheError> {
        Ok(self.keys()?.len())
    }
}

fn entry_key(url: &str) -> String {
    format!("{:x}", Sha256::digest(url.as_bytes()))
}

fn write_atomic(path: &Path, data: &[u8]) -> Result<(), CacheError> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, data).map_err(|e| CacheError::storage(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| CacheError::storage(path, e))?;
    Ok(())
}
