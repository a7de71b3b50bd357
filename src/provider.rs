// src/provider.rs

//! The two version-control systems, seen through the narrow interface the
//! audit needs. Every read goes through [`CommandCache`]; working-copy
//! mutations are either uncacheable commands or direct `git2` calls.

use git2::{build::CheckoutBuilder, Oid, Repository};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::cache::{CommandCache, Query};
use crate::error::{AuditError, Result};
use crate::extract::GIT_LOG_FORMAT;
use crate::model::CacheEntry;

/// `svn cat` diagnostics meaning the path does not exist at that revision
const SVN_NOT_FOUND: &[&str] = &["E160013", "E200009", "E195012"];
/// `git cat-file` diagnostics meaning the path does not exist in that commit
const GIT_NOT_FOUND: &[&str] = &["does not exist in", "exists on disk, but not in"];

pub trait HistoryProvider: Send + Sync {
    /// Short label used in logs and progress bars
    fn name(&self) -> &str;

    /// Highest unit id, when the history can be listed in numeric windows.
    fn head(&self) -> Result<Option<u64>>;

    /// Raw log text for the inclusive id window, or the whole history.
    fn list_history(&self, range: Option<(u64, u64)>) -> Result<String>;

    /// Whether consecutive `list_history` windows may repeat units.
    fn overlapping_windows(&self) -> bool {
        false
    }

    /// Creates the working copy when it does not exist yet.
    fn ensure_working_copy(&self) -> Result<()>;

    /// Makes the working copy reflect `unit`.
    fn materialize(&self, unit: &str) -> Result<()>;

    /// Content of `path` at `unit`, `None` if the path does not exist there.
    fn read_file(&self, unit: &str, path: &str) -> Result<Option<Vec<u8>>>;

    fn working_copy(&self) -> &Path;
}

/// Turns a file read into its content, `None` for a not-found diagnostic,
/// or an error for any other failure.
fn file_content(entry: CacheEntry, not_found: &[&str]) -> Result<Option<Vec<u8>>> {
    if entry.success() {
        return Ok(Some(entry.stdout));
    }
    if not_found.iter().any(|n| entry.stderr.contains(n)) {
        return Ok(None);
    }
    Err(AuditError::ExternalTool {
        command: entry.command,
        args: entry.args,
        status: entry.returncode,
        stderr: entry.stderr,
    })
}

/// Reads `path` from the working copy as it currently stands.
pub fn read_working_copy(provider: &dyn HistoryProvider, path: &str) -> Result<Option<Vec<u8>>> {
    let full = provider.working_copy().join(path.trim_start_matches('/'));
    match fs::read(&full) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub struct SvnProvider {
    url: String,
    working_copy: PathBuf,
    cache: Arc<CommandCache>,
}

impl SvnProvider {
    pub fn new(url: &str, working_copy: impl Into<PathBuf>, cache: Arc<CommandCache>) -> Self {
        Self {
            url: url.trim_end_matches(['/', ' ']).to_string(),
            working_copy: working_copy.into(),
            cache,
        }
    }

    fn wc(&self) -> String {
        self.working_copy.display().to_string()
    }
}

impl HistoryProvider for SvnProvider {
    fn name(&self) -> &str {
        "svn"
    }

    fn head(&self) -> Result<Option<u64>> {
        let entry = self
            .cache
            .fetch(&Query::new(["svn", "info", "--show-item", "revision", self.url.as_str()]).strict())?;
        let text = entry.stdout_text();
        let head = text.trim().parse::<u64>().map_err(|_| AuditError::ExternalTool {
            command: entry.command.clone(),
            args: entry.args.clone(),
            status: entry.returncode,
            stderr: format!("unexpected head revision output {:?}", text.trim()),
        })?;
        debug!(head, "svn head revision");
        Ok(Some(head))
    }

    fn list_history(&self, range: Option<(u64, u64)>) -> Result<String> {
        let mut command = vec!["svn".to_string(), "log".into(), "--xml".into(), "--verbose".into()];
        if let Some((start, end)) = range {
            command.push("-r".into());
            command.push(format!("{start}:{end}"));
        }
        command.push(self.url.clone());
        let entry = self.cache.fetch(&Query::new(command).strict())?;
        Ok(entry.stdout_text().into_owned())
    }

    fn ensure_working_copy(&self) -> Result<()> {
        if self.working_copy.join(".svn").exists() {
            return Ok(());
        }
        info!(path = %self.working_copy.display(), "checking out svn working copy");
        fs::create_dir_all(&self.working_copy)?;
        self.cache
            .fetch(&Query::new(["svn", "checkout", self.url.as_str(), self.wc().as_str()]).strict())?;
        Ok(())
    }

    fn materialize(&self, unit: &str) -> Result<()> {
        self.cache.fetch(
            &Query::new(["svn", "update", "--quiet", "-r", unit, self.wc().as_str()]).strict(),
        )?;
        Ok(())
    }

    fn read_file(&self, unit: &str, path: &str) -> Result<Option<Vec<u8>>> {
        let target = format!("{}{}@{}", self.url, path, unit);
        let entry = self
            .cache
            .fetch(&Query::new(["svn", "cat", target.as_str()]).store_failures_matching(SVN_NOT_FOUND))?;
        file_content(entry, SVN_NOT_FOUND)
    }

    fn working_copy(&self) -> &Path {
        &self.working_copy
    }
}

/// A git-svn clone of the source repository.
pub struct GitProvider {
    source_url: String,
    repo_path: PathBuf,
    cache: Arc<CommandCache>,
}

impl GitProvider {
    pub fn new(source_url: &str, repo_path: impl Into<PathBuf>, cache: Arc<CommandCache>) -> Self {
        Self {
            source_url: source_url.trim_end_matches(['/', ' ']).to_string(),
            repo_path: repo_path.into(),
            cache,
        }
    }

    fn query<I, S>(&self, command: I) -> Query
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Query::new(command).arg("cwd", self.repo_path.display().to_string())
    }
}

impl HistoryProvider for GitProvider {
    fn name(&self) -> &str {
        "git"
    }

    fn head(&self) -> Result<Option<u64>> {
        Ok(None)
    }

    fn list_history(&self, _range: Option<(u64, u64)>) -> Result<String> {
        let pretty = format!("--pretty={GIT_LOG_FORMAT}");
        let entry = self.cache.fetch(
            &self
                .query([
                    "git",
                    "-c",
                    "core.quotePath=false",
                    "log",
                    "--all",
                    "--reverse",
                    "--no-renames",
                    "--name-status",
                    pretty.as_str(),
                ])
                .strict(),
        )?;
        Ok(entry.stdout_text().into_owned())
    }

    fn ensure_working_copy(&self) -> Result<()> {
        if Repository::open(&self.repo_path).is_ok() {
            return Ok(());
        }
        info!(path = %self.repo_path.display(), "cloning git-svn repository");
        fs::create_dir_all(&self.repo_path)?;
        self.cache.fetch(
            &self
                .query(["git", "svn", "clone", self.source_url.as_str(), "--stdlayout", "."])
                .strict(),
        )?;
        Ok(())
    }

    fn materialize(&self, unit: &str) -> Result<()> {
        let repo = Repository::open(&self.repo_path)?;
        let commit = repo.find_commit(Oid::from_str(unit)?)?;
        let mut checkout = CheckoutBuilder::new();
        checkout.force().remove_untracked(true);
        repo.checkout_tree(commit.as_object(), Some(&mut checkout))?;
        repo.set_head_detached(commit.id())?;
        debug!(commit = unit, "git working copy detached");
        Ok(())
    }

    fn read_file(&self, unit: &str, path: &str) -> Result<Option<Vec<u8>>> {
        let object = format!("{}:{}", unit, path.trim_start_matches('/'));
        let entry = self.cache.fetch(
            &self
                .query(["git", "cat-file", "blob", object.as_str()])
                .store_failures_matching(GIT_NOT_FOUND),
        )?;
        file_content(entry, GIT_NOT_FOUND)
    }

    fn working_copy(&self) -> &Path {
        &self.repo_path
    }
}
