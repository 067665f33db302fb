//! Bounded on-disk HTTP response cache.
//!
//! # Overview
//! Stores successful GET responses as one JSON file per request under the
//! cache directory. Freshness and validators follow the response's
//! `Cache-Control`, `ETag`, `Last-Modified` and `Vary` headers. A stale entry
//! with validators is not discarded; the client revalidates it with a
//! conditional request and refreshes it on `304 Not Modified`.
//!
//! # Size accounting
//! The size of an entry is the size of its file. The total never exceeds the
//! byte budget: least-recently-used entries are evicted before a new entry is
//! written, and an entry bigger than the whole budget is not stored at all.
//! The index lives in memory behind a mutex and is rebuilt from the directory
//! on open, least recently used first. A hit bumps the entry file's
//! modification time so the order survives a restart.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::CacheError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

const ENTRY_EXT: &str = "json";
const TEMP_EXT: &str = "tmp";

/// The subset of `Cache-Control` directives a private client cache acts on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheControl {
    pub no_store: bool,
    pub no_cache: bool,
    pub max_age: Option<u64>,
}

impl CacheControl {
    pub fn parse(header: Option<&str>) -> Self {
        let mut cc = CacheControl::default();
        let Some(header) = header else {
            return cc;
        };
        for directive in header.split(',') {
            let directive = directive.trim().to_ascii_lowercase();
            let (name, value) = match directive.split_once('=') {
                Some((n, v)) => (n.trim().to_string(), Some(v.trim().trim_matches('"').to_string())),
                None => (directive.clone(), None),
            };
            match name.as_str() {
                "no-store" => cc.no_store = true,
                "no-cache" => cc.no_cache = true,
                "max-age" => cc.max_age = value.and_then(|v| v.parse().ok()),
                _ => {}
            }
        }
        cc
    }
}

/// Result of looking a request up in the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup {
    /// Usable without contacting the server.
    Fresh(HttpResponse),
    /// Must be revalidated; carries the validators to send.
    Stale {
        response: HttpResponse,
        etag: Option<String>,
        last_modified: Option<String>,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    key: String,
    stored_at: i64,
    max_age: u64,
    no_cache: bool,
    vary: Vec<(String, Option<String>)>,
    status: u16,
    headers: Vec<(String, String)>,
    body: String,
}

impl CacheEntry {
    fn response(&self) -> HttpResponse {
        HttpResponse {
            status: self.status,
            headers: self.headers.clone(),
            body: self.body.clone(),
        }
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn is_fresh(&self, now: i64) -> bool {
        let age = now.saturating_sub(self.stored_at).max(0) as u64;
        !self.no_cache && age < self.max_age
    }

    fn vary_matches(&self, request: &HttpRequest) -> bool {
        self.vary
            .iter()
            .all(|(name, value)| request.header(name) == value.as_deref())
    }
}

#[derive(Debug, Clone, Copy)]
struct IndexEntry {
    size: u64,
    last_used: u64,
}

#[derive(Debug, Default)]
struct CacheIndex {
    entries: HashMap<String, IndexEntry>,
    total_bytes: u64,
    clock: u64,
}

impl CacheIndex {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn touch(&mut self, stem: &str) {
        let now = self.tick();
        if let Some(entry) = self.entries.get_mut(stem) {
            entry.last_used = now;
        }
    }

    fn insert(&mut self, stem: String, size: u64) {
        let last_used = self.tick();
        if let Some(old) = self.entries.insert(stem, IndexEntry { size, last_used }) {
            self.total_bytes -= old.size;
        }
        self.total_bytes += size;
    }

    fn remove(&mut self, stem: &str) -> Option<IndexEntry> {
        let removed = self.entries.remove(stem)?;
        self.total_bytes -= removed.size;
        Some(removed)
    }

    fn least_recently_used(&self) -> Option<String> {
        self.entries
            .iter()
            .min_by_key(|(_, e)| e.last_used)
            .map(|(stem, _)| stem.clone())
    }
}

/// Disk-backed response cache with a fixed byte budget.
#[derive(Debug)]
pub struct HttpCache {
    dir: PathBuf,
    max_bytes: u64,
    index: Mutex<CacheIndex>,
}

impl HttpCache {
    /// Open (creating if needed) the cache in `dir` with a `max_bytes` budget.
    ///
    /// Entries already on disk are indexed by modification time and trimmed to the
    /// budget. Leftover temp files from interrupted writes are removed.
    pub fn open(dir: impl Into<PathBuf>, max_bytes: u64) -> Result<Self, CacheError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        let mut found: Vec<(SystemTime, String, u64)> = Vec::new();
        for dir_entry in fs::read_dir(&dir)? {
            let dir_entry = dir_entry?;
            let path = dir_entry.path();
            let ext = path.extension().and_then(|e| e.to_str());
            if ext == Some(TEMP_EXT) {
                let _ = fs::remove_file(&path);
                continue;
            }
            if ext != Some(ENTRY_EXT) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let meta = dir_entry.metadata()?;
            let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            found.push((modified, stem.to_string(), meta.len()));
        }
        found.sort();

        let cache = Self {
            dir,
            max_bytes,
            index: Mutex::new(CacheIndex::default()),
        };
        {
            let mut index = cache.index.lock();
            for (_, stem, size) in found {
                index.insert(stem, size);
            }
            cache.evict_until(&mut index, max_bytes);
        }
        debug!(
            dir = %cache.dir.display(),
            entries = cache.entry_count(),
            bytes = cache.size_bytes(),
            max_bytes,
            "Opened HTTP cache"
        );
        Ok(cache)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Bytes currently held on disk.
    pub fn size_bytes(&self) -> u64 {
        self.index.lock().total_bytes
    }

    pub fn entry_count(&self) -> usize {
        self.index.lock().entries.len()
    }

    /// Find a stored response for `request`. Only GETs are cached.
    pub fn lookup(&self, request: &HttpRequest) -> Option<CacheLookup> {
        if request.method != HttpMethod::Get {
            return None;
        }
        let stem = stem_for(request);
        let mut index = self.index.lock();
        if !index.entries.contains_key(&stem) {
            return None;
        }

        let entry = match self.read_entry(&stem) {
            Ok(entry) if entry.key == cache_key(request) => entry,
            Ok(_) => return None,
            Err(e) => {
                warn!(error = %e, "Dropping unreadable cache entry");
                self.delete(&mut index, &stem);
                return None;
            }
        };
        if !entry.vary_matches(request) {
            return None;
        }
        index.touch(&stem);
        self.mark_used(&stem);

        if entry.is_fresh(Utc::now().timestamp()) {
            return Some(CacheLookup::Fresh(entry.response()));
        }
        let etag = entry.header("etag").map(str::to_string);
        let last_modified = entry.header("last-modified").map(str::to_string);
        if etag.is_none() && last_modified.is_none() {
            return None;
        }
        Some(CacheLookup::Stale {
            response: entry.response(),
            etag,
            last_modified,
        })
    }

    /// Store `response` for `request` if HTTP caching rules allow it.
    ///
    /// Returns whether the response was written.
    pub fn store(&self, request: &HttpRequest, response: &HttpResponse) -> Result<bool, CacheError> {
        if request.method != HttpMethod::Get || response.status != 200 {
            return Ok(false);
        }
        let request_cc = CacheControl::parse(request.header("cache-control"));
        let response_cc = CacheControl::parse(response.header("cache-control"));
        let stem = stem_for(request);

        let vary = match vary_values(request, response) {
            Some(vary) => vary,
            None => return self.discard(&stem),
        };
        if request_cc.no_store || response_cc.no_store {
            return self.discard(&stem);
        }
        let max_age = response_cc.max_age.unwrap_or(0);
        let has_validators = response.header("etag").is_some() || response.header("last-modified").is_some();
        if max_age == 0 && !has_validators {
            return self.discard(&stem);
        }

        let entry = CacheEntry {
            key: cache_key(request),
            stored_at: Utc::now().timestamp(),
            max_age,
            no_cache: response_cc.no_cache,
            vary,
            status: response.status,
            headers: response.headers.clone(),
            body: response.body.clone(),
        };
        self.write_entry(&stem, &entry)
    }

    /// Apply a `304 Not Modified` to the stored entry and return the cached
    /// response it confirms.
    pub fn refresh(&self, request: &HttpRequest, not_modified: &HttpResponse) -> Option<HttpResponse> {
        let stem = stem_for(request);
        let mut entry = {
            let index = self.index.lock();
            if !index.entries.contains_key(&stem) {
                return None;
            }
            self.read_entry(&stem).ok()?
        };

        let cc = CacheControl::parse(not_modified.header("cache-control"));
        entry.stored_at = Utc::now().timestamp();
        if let Some(max_age) = cc.max_age {
            entry.max_age = max_age;
        }
        for (name, value) in &not_modified.headers {
            if ["cache-control", "etag", "expires", "last-modified", "date"]
                .iter()
                .any(|h| name.eq_ignore_ascii_case(h))
            {
                entry.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
                entry.headers.push((name.clone(), value.clone()));
            }
        }

        let response = entry.response();
        if let Err(e) = self.write_entry(&stem, &entry) {
            warn!(error = %e, "Failed to persist revalidated cache entry");
        }
        Some(response)
    }

    /// Forget the stored GET response for `request`'s URL, whatever the
    /// method of `request`.
    pub fn remove(&self, request: &HttpRequest) {
        let stem = stem_for_key(&format!("{} {}", HttpMethod::Get, request.path));
        let mut index = self.index.lock();
        self.delete(&mut index, &stem);
    }

    fn discard(&self, stem: &str) -> Result<bool, CacheError> {
        let mut index = self.index.lock();
        self.delete(&mut index, stem);
        Ok(false)
    }

    fn write_entry(&self, stem: &str, entry: &CacheEntry) -> Result<bool, CacheError> {
        let bytes = serde_json::to_vec(entry).map_err(io::Error::from)?;
        let size = bytes.len() as u64;

        let mut index = self.index.lock();
        index.remove(stem);
        if size > self.max_bytes {
            let _ = fs::remove_file(self.entry_path(stem));
            debug!(size, max_bytes = self.max_bytes, "Response larger than cache budget, not stored");
            return Ok(false);
        }
        self.evict_until(&mut index, self.max_bytes - size);

        let tmp = self.dir.join(format!("{stem}.{TEMP_EXT}"));
        let written = fs::write(&tmp, &bytes).and_then(|()| fs::rename(&tmp, self.entry_path(stem)));
        if let Err(e) = written {
            // The old file is no longer counted, so it must not stay on disk.
            let _ = fs::remove_file(&tmp);
            self.delete(&mut index, stem);
            return Err(e.into());
        }
        index.insert(stem.to_string(), size);
        Ok(true)
    }

    fn mark_used(&self, stem: &str) {
        let result = fs::File::options()
            .write(true)
            .open(self.entry_path(stem))
            .and_then(|file| file.set_modified(SystemTime::now()));
        if let Err(e) = result {
            debug!(entry = %stem, error = %e, "Failed to record cache hit on disk");
        }
    }

    fn read_entry(&self, stem: &str) -> io::Result<CacheEntry> {
        let bytes = fs::read(self.entry_path(stem))?;
        serde_json::from_slice(&bytes).map_err(io::Error::from)
    }

    fn evict_until(&self, index: &mut CacheIndex, budget: u64) {
        while index.total_bytes > budget {
            let Some(victim) = index.least_recently_used() else {
                break;
            };
            debug!(entry = %victim, "Evicting cache entry");
            self.delete(index, &victim);
        }
    }

    fn delete(&self, index: &mut CacheIndex, stem: &str) {
        index.remove(stem);
        if let Err(e) = fs::remove_file(self.entry_path(stem)) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(entry = %stem, error = %e, "Failed to delete cache entry");
            }
        }
    }

    fn entry_path(&self, stem: &str) -> PathBuf {
        self.dir.join(format!("{stem}.{ENTRY_EXT}"))
    }
}

fn cache_key(request: &HttpRequest) -> String {
    format!("{} {}", request.method, request.path)
}

fn stem_for(request: &HttpRequest) -> String {
    stem_for_key(&cache_key(request))
}

fn stem_for_key(key: &str) -> String {
    format!("{:x}", Sha256::digest(key.as_bytes()))
}

/// Request header values named by the response's `Vary`, or `None` for
/// `Vary: *`, which can never be matched.
fn vary_values(request: &HttpRequest, response: &HttpResponse) -> Option<Vec<(String, Option<String>)>> {
    let Some(vary) = response.header("vary") else {
        return Some(Vec::new());
    };
    let mut values = Vec::new();
    for name in vary.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        if name == "*" {
            return None;
        }
        values.push((name.to_ascii_lowercase(), request.header(name).map(str::to_string)));
    }
    Some(values)
}
