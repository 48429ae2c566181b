//! Content-addressed cache of generated docs.
//!
//! Entries are kept in memory for the current run and persisted as one JSON
//! file per key under ~/.cache/codedocgen/docs/ (or a configured directory).
//! Stale entries are never looked up again because the signature hash is
//! part of the key; they are only removed by an explicit prune.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

use crate::analysis::DocumentableUnit;
use crate::config::CacheConfig;
use crate::synth::GeneratedDoc;

/// SHA-256 over a unit's parameters, return type and body text.
///
/// Depends on content only; moving a unit within its file keeps the hash.
pub fn signature_hash(unit: &DocumentableUnit) -> String {
    let mut hasher = Sha256::new();
    for param in &unit.parameters {
        hasher.update(param.name.as_bytes());
        hasher.update([0]);
        hasher.update(param.declared_type.as_deref().unwrap_or("").as_bytes());
        hasher.update([0]);
        hasher.update([param.default_present as u8]);
        hasher.update(b"\n");
    }
    hasher.update(b"->");
    hasher.update(unit.return_type.as_deref().unwrap_or("").as_bytes());
    hasher.update(b"\n");
    hasher.update(unit.body_text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Identifies one cached doc.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Path relative to the repository root.
    pub file_identity: String,
    pub name_path: String,
    pub signature_hash: String,
    pub fingerprint: String,
}

impl CacheKey {
    pub fn new(
        file_identity: &str,
        unit: &DocumentableUnit,
        signature_hash: String,
        fingerprint: &str,
    ) -> Self {
        Self {
            file_identity: file_identity.to_string(),
            name_path: unit.name_path.clone(),
            signature_hash,
            fingerprint: fingerprint.to_string(),
        }
    }

    /// Stable file name component for this key.
    fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for part in [
            &self.file_identity,
            &self.name_path,
            &self.signature_hash,
            &self.fingerprint,
        ] {
            hasher.update(part.as_bytes());
            hasher.update([0]);
        }
        hex::encode(hasher.finalize())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    file_identity: String,
    name_path: String,
    signature_hash: String,
    fingerprint: String,
    provider_id: String,
    text: String,
    /// Unix timestamp in seconds.
    timestamp: u64,
}

/// Lookup and store counters for the run report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub stores: usize,
}

/// Shared doc cache. All methods take `&self` and are safe across workers.
pub struct DocCache {
    enabled: bool,
    /// In-memory entries for the current run, by key digest.
    memory: RwLock<HashMap<String, CacheEntry>>,
    /// Directory of persisted entries.
    cache_dir: Option<PathBuf>,
    /// Digests looked up or stored during this run.
    touched: Mutex<HashSet<String>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
    stores: AtomicUsize,
}

impl DocCache {
    /// Create a cache from the run configuration.
    pub fn new(config: &CacheConfig) -> Self {
        if !config.enabled {
            return Self::disabled();
        }

        let cache_dir = config.dir.clone().or_else(|| {
            ProjectDirs::from("", "", "codedocgen").map(|dirs| dirs.cache_dir().join("docs"))
        });

        let cache_dir = cache_dir.and_then(|dir| match fs::create_dir_all(&dir) {
            Ok(()) => Some(dir),
            Err(e) => {
                warn!("cache directory {} unavailable: {}", dir.display(), e);
                None
            }
        });
        if let Some(dir) = &cache_dir {
            debug!("doc cache at {}", dir.display());
        }

        Self {
            enabled: true,
            cache_dir,
            ..Self::disabled()
        }
    }

    /// A cache where every lookup misses and every store is dropped.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            memory: RwLock::new(HashMap::new()),
            cache_dir: None,
            touched: Mutex::new(HashSet::new()),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
            stores: AtomicUsize::new(0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn dir(&self) -> Option<&Path> {
        self.cache_dir.as_deref()
    }

    /// Get the cached doc for a key.
    pub fn lookup(&self, key: &CacheKey) -> Option<GeneratedDoc> {
        if !self.enabled {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        let digest = key.digest();
        self.touch(&digest);

        let cached = {
            let memory = self.memory.read().ok()?;
            memory.get(&digest).cloned()
        };
        let entry = cached.or_else(|| {
            let entry = self.read_file_cache(&digest, key)?;
            if let Ok(mut memory) = self.memory.write() {
                memory.insert(digest.clone(), entry.clone());
            }
            Some(entry)
        });

        match entry {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(GeneratedDoc {
                    text: entry.text,
                    provider_id: entry.provider_id,
                    signature_hash: entry.signature_hash,
                })
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store a generated doc. Last writer wins.
    pub fn store(&self, key: &CacheKey, doc: &GeneratedDoc) {
        if !self.enabled {
            return;
        }

        let digest = key.digest();
        self.touch(&digest);
        let entry = CacheEntry {
            file_identity: key.file_identity.clone(),
            name_path: key.name_path.clone(),
            signature_hash: key.signature_hash.clone(),
            fingerprint: key.fingerprint.clone(),
            provider_id: doc.provider_id.clone(),
            text: doc.text.clone(),
            timestamp: current_timestamp(),
        };

        self.write_file_cache(&digest, &entry);
        if let Ok(mut memory) = self.memory.write() {
            memory.insert(digest, entry);
        }
        self.stores.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            stores: self.stores.load(Ordering::Relaxed),
        }
    }

    /// Delete persisted entries of the given files that this run did not use.
    ///
    /// Returns the number of entries removed.
    pub fn prune(&self, processed: &HashSet<String>) -> usize {
        let Some(dir) = &self.cache_dir else {
            return 0;
        };
        let touched = match self.touched.lock() {
            Ok(t) => t.clone(),
            Err(_) => return 0,
        };
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("cannot list cache directory {}: {}", dir.display(), e);
                return 0;
            }
        };

        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(digest) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if touched.contains(digest) {
                continue;
            }
            let Some(cached) = fs::read_to_string(&path)
                .ok()
                .and_then(|c| serde_json::from_str::<CacheEntry>(&c).ok())
            else {
                continue;
            };
            if processed.contains(&cached.file_identity) && fs::remove_file(&path).is_ok() {
                debug!("pruned cache entry {} {}", cached.file_identity, cached.name_path);
                removed += 1;
            }
        }
        removed
    }

    fn touch(&self, digest: &str) {
        if let Ok(mut touched) = self.touched.lock() {
            touched.insert(digest.to_string());
        }
    }

    /// Read from file cache. Corrupt or mismatched entries count as misses.
    fn read_file_cache(&self, digest: &str, key: &CacheKey) -> Option<CacheEntry> {
        let path = self.cache_file_path(digest)?;
        let content = fs::read_to_string(&path).ok()?;
        let entry: CacheEntry = match serde_json::from_str(&content) {
            Ok(entry) => entry,
            Err(e) => {
                debug!("ignoring corrupt cache entry {}: {}", path.display(), e);
                return None;
            }
        };
        let matches = entry.file_identity == key.file_identity
            && entry.name_path == key.name_path
            && entry.signature_hash == key.signature_hash
            && entry.fingerprint == key.fingerprint;
        matches.then_some(entry)
    }

    /// Write to file cache through a temp file and rename.
    fn write_file_cache(&self, digest: &str, entry: &CacheEntry) {
        let (Some(dir), Some(path)) = (&self.cache_dir, self.cache_file_path(digest)) else {
            return;
        };
        let result = serde_json::to_vec(entry)
            .map_err(std::io::Error::from)
            .and_then(|bytes| {
                let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
                tmp.write_all(&bytes)?;
                tmp.persist(&path).map_err(|e| e.error)?;
                Ok(())
            });
        if let Err(e) = result {
            debug!("cache write failed for {}: {}", path.display(), e);
        }
    }

    fn cache_file_path(&self, digest: &str) -> Option<PathBuf> {
        self.cache_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.json", digest)))
    }
}

/// Get current Unix timestamp in seconds.
fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{extract, Language};

    fn unit(src: &str) -> DocumentableUnit {
        extract(
            Path::new("sum.js"),
            src.as_bytes(),
            Language::JavaScriptTypeScript,
        )
        .unwrap()
        .remove(0)
    }

    fn enabled_cache(dir: &Path) -> DocCache {
        DocCache::new(&CacheConfig {
            enabled: true,
            dir: Some(dir.to_path_buf()),
            prune: false,
        })
    }

    fn doc(text: &str) -> GeneratedDoc {
        GeneratedDoc {
            text: text.to_string(),
            provider_id: "local".to_string(),
            signature_hash: String::new(),
        }
    }

    #[test]
    fn test_signature_hash_tracks_body_content() {
        let base = unit("function sum(a, b) { return a + b; }");
        let same = unit("function sum(a, b) { return a + b; }");
        let changed = unit("function sum(a, b) { return a - b; }");
        let reformatted = unit("function sum(a, b) {\n  return a + b;\n}");
        let renamed = unit("function total(a, b) { return a + b; }");

        assert_eq!(signature_hash(&base), signature_hash(&same));
        assert_ne!(signature_hash(&base), signature_hash(&changed));
        assert_ne!(signature_hash(&base), signature_hash(&reformatted));
        assert_eq!(signature_hash(&base), signature_hash(&renamed));
        assert_eq!(signature_hash(&base).len(), 64);
    }

    #[test]
    fn test_signature_hash_ignores_existing_doc() {
        let plain = unit("function sum(a, b) { return a + b; }");
        let documented = unit("/** Adds. */\nfunction sum(a, b) { return a + b; }");
        assert_eq!(signature_hash(&plain), signature_hash(&documented));
    }

    #[test]
    fn test_disabled_cache_always_misses() {
        let cache = DocCache::disabled();
        let u = unit("function sum(a, b) { return a + b; }");
        let key = CacheKey::new("sum.js", &u, signature_hash(&u), "local:concise");
        cache.store(&key, &doc("/** x */"));
        assert!(cache.lookup(&key).is_none());
        assert_eq!(cache.stats().stores, 0);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let u = unit("function sum(a, b) { return a + b; }");
        let key = CacheKey::new("sum.js", &u, signature_hash(&u), "local:concise");

        let first = enabled_cache(dir.path());
        assert!(first.lookup(&key).is_none());
        first.store(&key, &doc("/** Sum. */"));

        let second = enabled_cache(dir.path());
        let hit = second.lookup(&key).unwrap();
        assert_eq!(hit.text, "/** Sum. */");
        assert_eq!(second.stats().hits, 1);

        let other_provider = CacheKey {
            fingerprint: "groq:llama-3.1-8b-instant:-:concise:512".to_string(),
            ..key
        };
        assert!(second.lookup(&other_provider).is_none());
    }

    #[test]
    fn test_corrupt_entry_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let u = unit("function sum(a, b) { return a + b; }");
        let key = CacheKey::new("sum.js", &u, signature_hash(&u), "local:concise");
        fs::write(dir.path().join(format!("{}.json", key.digest())), "{not json").unwrap();

        let cache = enabled_cache(dir.path());
        assert!(cache.lookup(&key).is_none());
    }

    #[test]
    fn test_prune_removes_unused_entries_of_processed_files() {
        let dir = tempfile::tempdir().unwrap();
        let old = unit("function sum(a, b) { return a + b; }");
        let new = unit("function sum(a, b) { return b + a; }");
        let old_key = CacheKey::new("sum.js", &old, signature_hash(&old), "local:concise");
        let other_key = CacheKey::new("other.js", &old, signature_hash(&old), "local:concise");

        let seed = enabled_cache(dir.path());
        seed.store(&old_key, &doc("/** old */"));
        seed.store(&other_key, &doc("/** other */"));

        let run = enabled_cache(dir.path());
        let new_key = CacheKey::new("sum.js", &new, signature_hash(&new), "local:concise");
        run.store(&new_key, &doc("/** new */"));

        let processed: HashSet<String> = ["sum.js".to_string()].into_iter().collect();
        assert_eq!(run.prune(&processed), 1);

        let after = enabled_cache(dir.path());
        assert!(after.lookup(&old_key).is_none());
        assert!(after.lookup(&new_key).is_some());
        assert!(after.lookup(&other_key).is_some());
    }
}
