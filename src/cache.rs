// src/cache.rs

//! Durable, content-addressed cache for external query results.
//!
//! Layout of the cache directory:
//!
//! - `<key>.json` holds `{returncode, stdout, stderr}` for one query
//! - `_cache_keys.json` maps every key to the `(command, args)` it came from
//!
//! The key is the SHA-256 of the canonical JSON encoding of `(command, args)`,
//! so an interrupted audit re-run resolves to exactly the same entries.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::{debug, info, warn, Span};

use crate::error::{AuditError, Result};
use crate::model::CacheEntry;

pub const INDEX_FILE: &str = "_cache_keys.json";

/// Prefix of in-flight writes; anything else in the directory is left alone
const TMP_PREFIX: &str = ".svn-git-audit-";

/// Subcommands that mutate a working copy and must never be served from cache
pub const DEFAULT_UNCACHEABLE: &[&str] = &["checkout", "clone", "switch", "update", "reset"];

/// A query against one of the history providers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub command: Vec<String>,
    pub args: BTreeMap<String, String>,
    /// Fail with [`AuditError::ExternalTool`] on a non-zero exit status
    pub strict: bool,
    /// A failed result is stored only when its stderr contains one of these.
    /// Other failures are treated as transient and re-executed next time.
    pub durable_failures: Vec<String>,
}

impl Query {
    pub fn new<I, S>(command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command: command.into_iter().map(Into::into).collect(),
            args: BTreeMap::new(),
            strict: false,
            durable_failures: Vec::new(),
        }
    }

    pub fn arg(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }

    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    pub fn store_failures_matching(mut self, needles: &[&str]) -> Self {
        self.durable_failures = needles.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn key(&self) -> String {
        cache_key(&self.command, &self.args)
    }

    fn keeps(&self, returncode: i32, stderr: &str) -> bool {
        returncode == 0 || self.durable_failures.iter().any(|n| stderr.contains(n.as_str()))
    }
}

/// Deterministic cache key for a `(command, args)` pair.
pub fn cache_key(command: &[String], args: &BTreeMap<String, String>) -> String {
    // BTreeMap serializes in key order, which keeps the encoding canonical.
    let canonical = serde_json::to_vec(&(command, args)).unwrap_or_default();
    format!("{:x}", Sha256::digest(&canonical))
}

/// Raw outcome of running a query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub returncode: i32,
    pub stdout: Vec<u8>,
    pub stderr: String,
}

/// Runs queries against the outside world.
pub trait Executor: Send + Sync {
    fn run(&self, command: &[String], args: &BTreeMap<String, String>) -> io::Result<CommandOutput>;
}

/// Spawns the query as a child process. The `cwd` arg sets its working directory.
#[derive(Debug, Default, Clone)]
pub struct ProcessExecutor;

impl Executor for ProcessExecutor {
    fn run(&self, command: &[String], args: &BTreeMap<String, String>) -> io::Result<CommandOutput> {
        let (program, rest) = command
            .split_first()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty command"))?;
        let mut cmd = Command::new(program);
        cmd.args(rest);
        if let Some(cwd) = args.get("cwd") {
            cmd.current_dir(cwd);
        }
        let output = cmd.output()?;
        Ok(CommandOutput {
            // Killed by a signal: no exit code
            returncode: output.status.code().unwrap_or(-1),
            stdout: output.stdout,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    command: Vec<String>,
    args: BTreeMap<String, String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredResult {
    returncode: i32,
    #[serde(with = "base64_bytes")]
    stdout: Vec<u8>,
    stderr: String,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub uncached: u64,
}

pub struct CommandCache {
    dir: PathBuf,
    enabled: bool,
    uncacheable: Vec<String>,
    executor: Box<dyn Executor>,
    index: Mutex<BTreeMap<String, IndexEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
    uncached: AtomicU64,
    span: Span,
}

impl CommandCache {
    /// Opens the cache in `dir`, creating it if needed, and brings the index
    /// and the stored result files back in sync.
    pub fn open(dir: impl Into<PathBuf>, executor: Box<dyn Executor>, parent: &Span) -> Result<Self> {
        let dir = dir.into();
        let span = tracing::debug_span!(parent: parent, "cache", dir = %dir.display());
        fs::create_dir_all(&dir)?;
        let index = span.in_scope(|| prune(&dir))?;
        Ok(Self {
            dir,
            enabled: true,
            uncacheable: DEFAULT_UNCACHEABLE.iter().map(|s| s.to_string()).collect(),
            executor,
            index: Mutex::new(index),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            uncached: AtomicU64::new(0),
            span,
        })
    }

    pub fn with_uncacheable(mut self, tokens: Vec<String>) -> Self {
        self.uncacheable = tokens;
        self
    }

    /// Executes every query without reading or writing stored results.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn is_cacheable(&self, query: &Query) -> bool {
        self.enabled && !query.command.iter().any(|token| self.uncacheable.iter().any(|u| u == token))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock_index().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.lock_index().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            uncached: self.uncached.load(Ordering::Relaxed),
        }
    }

    /// Returns the stored result for `query`, executing and storing it on a miss.
    pub fn fetch(&self, query: &Query) -> Result<CacheEntry> {
        let _enter = self.span.enter();
        let key = query.key();

        if !self.is_cacheable(query) {
            self.uncached.fetch_add(1, Ordering::Relaxed);
            debug!(command = %query.command.join(" "), "executing uncached query");
            let entry = self.execute(query, key)?;
            return check(query, entry);
        }

        if self.contains(&key) {
            match self.load(&key) {
                Ok(stored) if query.keeps(stored.returncode, &stored.stderr) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    debug!(%key, "cache hit");
                    let entry = self.entry(query, key, stored);
                    return check(query, entry);
                }
                Ok(_) => debug!(%key, "stored failure is not durable, re-executing"),
                Err(e) => warn!(%key, error = %e, "corrupt cache entry, re-executing"),
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!(%key, command = %query.command.join(" "), "cache miss");
        let entry = self.execute(query, key)?;
        if query.keeps(entry.returncode, &entry.stderr) {
            self.store(&entry)?;
        } else {
            debug!(key = %entry.key, status = entry.returncode, "not storing failed result");
        }
        check(query, entry)
    }

    /// Deletes every stored result and the index. Files the cache did not
    /// write are kept.
    pub fn cleanup(&self) -> Result<()> {
        let _enter = self.span.enter();
        let mut index = self.lock_index();
        let mut removed = 0usize;
        for file in fs::read_dir(&self.dir)? {
            let path = file?.path();
            let owned = path.file_name().is_some_and(|name| name == INDEX_FILE)
                || result_stem(&path).is_some()
                || is_partial_write(&path);
            if owned {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
        index.clear();
        info!(removed, "cache cleaned");
        Ok(())
    }

    fn execute(&self, query: &Query, key: String) -> Result<CacheEntry> {
        let output = self.executor.run(&query.command, &query.args).map_err(|e| {
            AuditError::Io(io::Error::new(
                e.kind(),
                format!("failed to run `{}`: {e}", query.command.join(" ")),
            ))
        })?;
        Ok(CacheEntry {
            key,
            command: query.command.clone(),
            args: query.args.clone(),
            returncode: output.returncode,
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }

    fn entry(&self, query: &Query, key: String, stored: StoredResult) -> CacheEntry {
        CacheEntry {
            key,
            command: query.command.clone(),
            args: query.args.clone(),
            returncode: stored.returncode,
            stdout: stored.stdout,
            stderr: stored.stderr,
        }
    }

    fn load(&self, key: &str) -> Result<StoredResult> {
        let bytes = fs::read(self.result_path(key))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn store(&self, entry: &CacheEntry) -> Result<()> {
        let stored = StoredResult {
            returncode: entry.returncode,
            stdout: entry.stdout.clone(),
            stderr: entry.stderr.clone(),
        };
        write_atomic(&self.dir, &self.result_path(&entry.key), &serde_json::to_vec_pretty(&stored)?)?;

        let mut index = self.lock_index();
        index.insert(
            entry.key.clone(),
            IndexEntry { command: entry.command.clone(), args: entry.args.clone() },
        );
        write_atomic(&self.dir, &self.dir.join(INDEX_FILE), &serde_json::to_vec_pretty(&*index)?)?;
        Ok(())
    }

    fn result_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    fn lock_index(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, IndexEntry>> {
        // A panicking writer cannot leave the map half-updated, so a poisoned lock is still usable.
        self.index.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn check(query: &Query, entry: CacheEntry) -> Result<CacheEntry> {
    if query.strict && !entry.success() {
        return Err(AuditError::ExternalTool {
            command: entry.command,
            args: entry.args,
            status: entry.returncode,
            stderr: entry.stderr,
        });
    }
    Ok(entry)
}

/// Drops index entries without a result file and deletes result files
/// without an index entry.
fn prune(dir: &Path) -> Result<BTreeMap<String, IndexEntry>> {
    let index_path = dir.join(INDEX_FILE);
    let mut index: BTreeMap<String, IndexEntry> = match fs::read(&index_path) {
        Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
            warn!(error = %e, "cache index unreadable, starting empty");
            BTreeMap::new()
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
        Err(e) => return Err(e.into()),
    };

    let mut on_disk = Vec::new();
    for file in fs::read_dir(dir)? {
        let path = file?.path();
        if let Some(stem) = result_stem(&path) {
            on_disk.push((stem.to_string(), path.clone()));
        } else if is_partial_write(&path) {
            // left behind by an interrupted write
            fs::remove_file(&path)?;
        }
    }

    let stems: HashSet<&str> = on_disk.iter().map(|(stem, _)| stem.as_str()).collect();
    let before = index.len();
    index.retain(|key, _| stems.contains(key.as_str()));
    let dangling = before - index.len();

    let mut orphans = 0usize;
    for (stem, path) in &on_disk {
        if !index.contains_key(stem) {
            fs::remove_file(path)?;
            orphans += 1;
        }
    }

    if dangling > 0 || orphans > 0 {
        info!(dangling, orphans, "pruned cache");
        write_atomic(dir, &index_path, &serde_json::to_vec_pretty(&index)?)?;
    }
    debug!(entries = index.len(), "cache index loaded");
    Ok(index)
}

/// The key of a `<64 hex digits>.json` result file.
fn result_stem(path: &Path) -> Option<&str> {
    let stem = path
        .file_name()?
        .to_str()?
        .strip_suffix(".json")?;
    let is_key = stem.len() == 64 && stem.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
    is_key.then_some(stem)
}

fn is_partial_write(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with(TMP_PREFIX) && name.ends_with(".tmp"))
}

/// Writes through a uniquely named temp file so concurrent writers of the
/// same key never share one.
fn write_atomic(dir: &Path, path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut tmp = tempfile::Builder::new()
        .prefix(TMP_PREFIX)
        .suffix(".tmp")
        .tempfile_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Serde helpers storing byte buffers as base64 strings.
pub mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }

    pub mod optional {
        use super::*;

        pub fn serialize<S: Serializer>(bytes: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
            match bytes {
                Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
            Option::<String>::deserialize(deserializer)?
                .map(|encoded| STANDARD.decode(encoded).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Answers every query with a fixed output and counts invocations.
    #[derive(Clone, Default)]
    struct CountingExecutor {
        calls: Arc<AtomicU64>,
        returncode: i32,
    }

    impl Executor for CountingExecutor {
        fn run(&self, command: &[String], _args: &BTreeMap<String, String>) -> io::Result<CommandOutput> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(CommandOutput {
                returncode: self.returncode,
                stdout: format!("{} #{n}", command.join(" ")).into_bytes(),
                stderr: if self.returncode == 0 { String::new() } else { "boom".into() },
            })
        }
    }

    fn open(dir: &Path, exec: CountingExecutor) -> CommandCache {
        CommandCache::open(dir, Box::new(exec), &Span::none()).unwrap()
    }

    #[test]
    fn key_is_deterministic() {
        let a = Query::new(["svn", "log", "--xml"]).arg("cwd", "/tmp");
        let b = Query::new(["svn", "log", "--xml"]).arg("cwd", "/tmp");
        assert_eq!(a.key(), b.key());
        assert_eq!(a.key().len(), 64);
    }

    #[test]
    fn key_differs_for_different_queries() {
        let base = Query::new(["svn", "log"]);
        assert_ne!(base.key(), Query::new(["svn", "info"]).key());
        assert_ne!(base.key(), base.clone().arg("cwd", "/a").key());
        assert_ne!(base.clone().arg("cwd", "/a").key(), base.clone().arg("cwd", "/b").key());
        // token boundaries matter
        assert_ne!(Query::new(["ab", "c"]).key(), Query::new(["a", "bc"]).key());
    }

    #[test]
    fn strict_flag_does_not_affect_key() {
        let q = Query::new(["git", "log"]);
        assert_eq!(q.key(), q.clone().strict().key());
    }

    #[test]
    fn fetch_round_trips_without_re_executing() {
        let tmp = TempDir::new().unwrap();
        let exec = CountingExecutor::default();
        let cache = open(tmp.path(), exec.clone());
        let q = Query::new(["svn", "log"]);

        let first = cache.fetch(&q).unwrap();
        let second = cache.fetch(&q).unwrap();
        assert_eq!(first, second);
        assert_eq!(exec.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 1, uncached: 0 });
    }

    #[test]
    fn results_survive_reopen() {
        let tmp = TempDir::new().unwrap();
        let exec = CountingExecutor::default();
        let q = Query::new(["svn", "cat", "http://x/a.txt@3"]);
        let first = open(tmp.path(), exec.clone()).fetch(&q).unwrap();

        let reopened = open(tmp.path(), exec.clone());
        assert!(reopened.contains(&q.key()));
        assert_eq!(reopened.fetch(&q).unwrap(), first);
        assert_eq!(exec.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn mutating_queries_are_never_stored() {
        let tmp = TempDir::new().unwrap();
        let exec = CountingExecutor::default();
        let cache = open(tmp.path(), exec.clone());
        let q = Query::new(["svn", "checkout", "http://x", "wc"]);

        cache.fetch(&q).unwrap();
        cache.fetch(&q).unwrap();
        assert_eq!(exec.calls.load(Ordering::SeqCst), 2);
        assert!(!cache.contains(&q.key()));
        assert!(!tmp.path().join(format!("{}.json", q.key())).exists());
    }

    #[test]
    fn strict_failure_reports_stderr() {
        let tmp = TempDir::new().unwrap();
        let exec = CountingExecutor { returncode: 1, ..Default::default() };
        let cache = open(tmp.path(), exec);

        let lenient = cache.fetch(&Query::new(["svn", "cat", "missing"])).unwrap();
        assert_eq!(lenient.returncode, 1);

        let err = cache.fetch(&Query::new(["svn", "update", "-r", "5"]).strict()).unwrap_err();
        match err {
            AuditError::ExternalTool { status, stderr, .. } => {
                assert_eq!(status, 1);
                assert_eq!(stderr, "boom");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn stale_file_without_index_entry_is_deleted() {
        let tmp = TempDir::new().unwrap();
        let key = "deadbeef".repeat(8);
        let stale = tmp.path().join(format!("{key}.json"));
        fs::write(&stale, r#"{"returncode":0,"stdout":"","stderr":""}"#).unwrap();
        let partial = tmp.path().join(format!("{TMP_PREFIX}abc123.tmp"));
        fs::write(&partial, "half").unwrap();

        let cache = open(tmp.path(), CountingExecutor::default());
        assert!(!stale.exists());
        assert!(!partial.exists());
        assert!(!cache.contains(&key));
    }

    #[test]
    fn foreign_files_in_cache_dir_are_kept() {
        let tmp = TempDir::new().unwrap();
        let settings = tmp.path().join("settings.json");
        let notes = tmp.path().join("notes.tmp");
        fs::write(&settings, "{}").unwrap();
        fs::write(&notes, "keep").unwrap();

        let cache = open(tmp.path(), CountingExecutor::default());
        cache.fetch(&Query::new(["svn", "log"])).unwrap();
        assert!(settings.exists());

        cache.cleanup().unwrap();
        assert!(settings.exists());
        assert!(notes.exists());
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 2);
    }

    #[test]
    fn concurrent_misses_on_one_key_all_succeed() {
        for _ in 0..20 {
            let tmp = TempDir::new().unwrap();
            let exec = CountingExecutor::default();
            let cache = open(tmp.path(), exec.clone());
            let q = Query::new(["svn", "cat", "u/a@2"]);

            let (shared, query) = (&cache, &q);
            let failures: usize = std::thread::scope(|scope| {
                let workers: Vec<_> = (0..8).map(|_| scope.spawn(move || shared.fetch(query).is_err())).collect();
                workers.into_iter().map(|w| usize::from(w.join().unwrap())).sum()
            });
            assert_eq!(failures, 0);
            assert!(cache.contains(&q.key()));
            assert!(!fs::read_dir(tmp.path()).unwrap().any(|f| is_partial_write(&f.unwrap().path())));
        }
    }

    #[test]
    fn failures_are_not_stored_unless_durable() {
        let tmp = TempDir::new().unwrap();
        let exec = CountingExecutor { returncode: 1, ..Default::default() };
        let cache = open(tmp.path(), exec.clone());

        let transient = Query::new(["svn", "cat", "u/a@2"]);
        cache.fetch(&transient).unwrap();
        cache.fetch(&transient).unwrap();
        assert_eq!(exec.calls.load(Ordering::SeqCst), 2);
        assert!(!cache.contains(&transient.key()));

        let durable = Query::new(["svn", "cat", "u/b@2"]).store_failures_matching(&["boom"]);
        cache.fetch(&durable).unwrap();
        cache.fetch(&durable).unwrap();
        assert_eq!(exec.calls.load(Ordering::SeqCst), 3);
        assert!(cache.contains(&durable.key()));
    }

    #[test]
    fn stored_failure_that_is_no_longer_durable_is_retried() {
        let tmp = TempDir::new().unwrap();
        let failing = CountingExecutor { returncode: 1, ..Default::default() };
        let q = Query::new(["svn", "cat", "u/a@2"]);
        open(tmp.path(), failing).fetch(&q.clone().store_failures_matching(&["boom"])).unwrap();

        let exec = CountingExecutor::default();
        let entry = open(tmp.path(), exec.clone()).fetch(&q).unwrap();
        assert!(entry.success());
        assert_eq!(exec.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn index_entry_without_file_is_dropped() {
        let tmp = TempDir::new().unwrap();
        let exec = CountingExecutor::default();
        let q = Query::new(["git", "log"]);
        open(tmp.path(), exec.clone()).fetch(&q).unwrap();
        fs::remove_file(tmp.path().join(format!("{}.json", q.key()))).unwrap();

        let cache = open(tmp.path(), exec.clone());
        assert!(!cache.contains(&q.key()));
        let index: BTreeMap<String, serde_json::Value> =
            serde_json::from_slice(&fs::read(tmp.path().join(INDEX_FILE)).unwrap()).unwrap();
        assert!(index.is_empty());
    }

    #[test]
    fn corrupt_entry_is_treated_as_miss() {
        let tmp = TempDir::new().unwrap();
        let exec = CountingExecutor::default();
        let cache = open(tmp.path(), exec.clone());
        let q = Query::new(["svn", "log"]);
        cache.fetch(&q).unwrap();
        fs::write(tmp.path().join(format!("{}.json", q.key())), "not json").unwrap();

        let entry = cache.fetch(&q).unwrap();
        assert_eq!(exec.calls.load(Ordering::SeqCst), 2);
        assert_eq!(entry.stdout_text(), "svn log #1");
        // overwritten with a readable result
        assert_eq!(cache.fetch(&q).unwrap(), entry);
        assert_eq!(exec.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn binary_stdout_survives_storage() {
        struct Binary;
        impl Executor for Binary {
            fn run(&self, _: &[String], _: &BTreeMap<String, String>) -> io::Result<CommandOutput> {
                Ok(CommandOutput { returncode: 0, stdout: vec![0xff, 0x00, 0xfe], stderr: String::new() })
            }
        }
        let tmp = TempDir::new().unwrap();
        let q = Query::new(["svn", "cat", "blob.bin"]);
        CommandCache::open(tmp.path(), Box::new(Binary), &Span::none()).unwrap().fetch(&q).unwrap();

        let cache = open(tmp.path(), CountingExecutor::default());
        assert_eq!(cache.fetch(&q).unwrap().stdout, vec![0xff, 0x00, 0xfe]);
    }

    #[test]
    fn cleanup_removes_everything() {
        let tmp = TempDir::new().unwrap();
        let cache = open(tmp.path(), CountingExecutor::default());
        cache.fetch(&Query::new(["svn", "log"])).unwrap();
        cache.fetch(&Query::new(["git", "log"])).unwrap();
        assert_eq!(cache.len(), 2);

        cache.cleanup().unwrap();
        assert!(cache.is_empty());
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[test]
    fn disabled_cache_always_executes() {
        let tmp = TempDir::new().unwrap();
        let exec = CountingExecutor::default();
        let cache = open(tmp.path(), exec.clone()).disabled();
        let q = Query::new(["svn", "log"]);
        cache.fetch(&q).unwrap();
        cache.fetch(&q).unwrap();
        assert_eq!(exec.calls.load(Ordering::SeqCst), 2);
        assert!(cache.is_empty());
    }
}
