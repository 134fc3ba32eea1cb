//! Content-addressed response cache.
//!
//! Layout: `{root}/ed_{sha256}.{csv|json|parquet}`
//!
//! - Keys are SHA-256 digests of the normalized request parameters.
//! - Entries hold the raw response body, so a cached CSV can be opened directly.
//! - Writes go to a uniquely named `.tmp` file that is renamed into place,
//!   so readers never see a partial entry. Concurrent writers of one key
//!   race and the last rename wins.
//! - No expiry: an entry is served until [`CacheStore::clear`] removes it.
//! - I/O failures are logged and behave like a miss or a skipped write.

use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::format::WireFormat;
use crate::request::Endpoint;

const PREFIX: &str = "ed_";
const TMP_SUFFIX: &str = ".tmp";

/// Digest identifying one cached response, plus the wire format it was fetched in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    digest: String,
    format: WireFormat,
}

impl CacheKey {
    /// Hashes `params` together with the endpoint and wire format.
    ///
    /// `params` must already be normalized: sets sorted, casing folded.
    pub fn derive(endpoint: Endpoint, format: WireFormat, params: &Value) -> Self {
        let canonical = json!({
            "endpoint": endpoint.name(),
            "format": format.as_str(),
            "params": params,
        })
        .to_string();
        Self {
            digest: hex::encode(Sha256::digest(canonical.as_bytes())),
            format,
        }
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub const fn format(&self) -> WireFormat {
        self.format
    }

    pub fn file_name(&self) -> String {
        format!("{PREFIX}{}.{}", self.digest, self.format.extension())
    }
}

/// A cached response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub format: WireFormat,
    pub payload: Vec<u8>,
}

/// File-backed cache; a disabled store never hits and never writes.
#[derive(Debug, Clone, Default)]
pub struct CacheStore {
    root: Option<PathBuf>,
}

impl CacheStore {
    pub fn disabled() -> Self {
        Self { root: None }
    }

    /// Enabled store rooted at `root`, which is created if missing.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        if let Err(e) = fs::create_dir_all(&root) {
            warn!(root = %root.display(), error = %e, "failed to create cache directory");
        }
        Self { root: Some(root) }
    }

    pub fn is_enabled(&self) -> bool {
        self.root.is_some()
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    pub fn path_for(&self, key: &CacheKey) -> Option<PathBuf> {
        self.root.as_ref().map(|r| r.join(key.file_name()))
    }

    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        let path = self.path_for(key)?;
        match fs::read(&path) {
            Ok(payload) => {
                debug!(path = %path.display(), bytes = payload.len(), "cache hit");
                Some(CacheEntry {
                    format: key.format(),
                    payload,
                })
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(key = key.digest(), "cache miss");
                None
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read cache entry");
                None
            }
        }
    }

    pub fn put(&self, key: &CacheKey, entry: &CacheEntry) {
        let Some(path) = self.path_for(key) else {
            return;
        };
        if entry.format != key.format() {
            warn!(
                key = key.digest(),
                key_format = %key.format(),
                entry_format = %entry.format,
                "refusing to cache entry under a key of another format"
            );
            return;
        }

        match write_atomic(&path, &entry.payload) {
            Ok(()) => debug!(path = %path.display(), bytes = entry.payload.len(), "cached response"),
            Err(e) => warn!(path = %path.display(), error = %e, "failed to write cache entry"),
        }
    }

    /// Removes every cache artifact under the root and returns how many.
    ///
    /// Files not named like cache entries are left alone.
    pub fn clear(&self) -> usize {
        let Some(root) = self.root.as_deref() else {
            return 0;
        };
        let entries = match fs::read_dir(root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return 0,
            Err(e) => {
                warn!(root = %root.display(), error = %e, "failed to list cache directory");
                return 0;
            }
        };

        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            let is_artifact = path.is_file()
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(is_artifact_name);
            if !is_artifact {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => warn!(path = %path.display(), error = %e, "failed to delete cache file"),
            }
        }
        debug!(root = %root.display(), removed, "cleared cache");
        removed
    }
}

/// Writes `payload` to a fresh temp file next to `path` and renames it over
/// `path`. The temp file is removed if any step fails.
fn write_atomic(path: &Path, payload: &[u8]) -> io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;
    let prefix = match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => format!("{name}."),
        None => PREFIX.to_string(),
    };
    let mut tmp = tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(TMP_SUFFIX)
        .tempfile_in(dir)?;
    tmp.write_all(payload)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// `ed_<64 lowercase hex>.<ext>`, or a leftover temp file
/// `ed_<64 lowercase hex>.<ext>.<random>.tmp`.
fn is_artifact_name(name: &str) -> bool {
    let name = match name.strip_suffix(TMP_SUFFIX) {
        Some(tmp) => match tmp.rsplit_once('.') {
            Some((head, _)) => head,
            None => return false,
        },
        None => name,
    };
    let Some(rest) = name.strip_prefix(PREFIX) else {
        return false;
    };
    let Some((digest, ext)) = rest.split_once('.') else {
        return false;
    };
    digest.len() == 64
        && digest.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
        && WireFormat::from_extension(ext).is_some()
}
