// src/model.rs

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;

/// What happened to a path in a change unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Added,
    Modified,
    Deleted,
}

/// Whether a changed path names a file or a directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Kind {
    File,
    Directory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedPath {
    pub action: Action,
    pub kind: Kind,
    pub path: String,
}

impl ChangedPath {
    pub fn file(action: Action, path: impl Into<String>) -> Self {
        Self { action, kind: Kind::File, path: path.into() }
    }

    /// Added and modified files are the only paths with content to compare
    pub fn needs_verification(&self) -> bool {
        self.kind == Kind::File && matches!(self.action, Action::Added | Action::Modified)
    }
}

/// One atomic change unit: a source revision or a target commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub id: String,
    pub author: String,
    pub timestamp: String,
    /// Canonical message, with any origin trailer already split off
    pub message: String,
    pub changed_paths: Vec<ChangedPath>,
    /// Source-history id recorded in a target unit's trailer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub foreign_link: Option<String>,
    /// Branch URL recorded next to the link, e.g. `https://svn/repo/trunk`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_location: Option<String>,
}

impl ChangeRecord {
    pub fn verifiable_paths(&self) -> impl Iterator<Item = &ChangedPath> {
        self.changed_paths.iter().filter(|p| p.needs_verification())
    }

    /// Directories added in this unit, such as the destination of a copy.
    pub fn added_directories(&self) -> impl Iterator<Item = &ChangedPath> {
        self.changed_paths
            .iter()
            .filter(|p| p.kind == Kind::Directory && p.action == Action::Added)
    }
}

/// Result of one external query, keyed by its `(command, args)` pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub command: Vec<String>,
    pub args: BTreeMap<String, String>,
    pub returncode: i32,
    #[serde(with = "crate::cache::base64_bytes")]
    pub stdout: Vec<u8>,
    pub stderr: String,
}

impl CacheEntry {
    pub fn success(&self) -> bool {
        self.returncode == 0
    }

    pub fn stdout_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stdout)
    }
}

/// Which history drives a reconciliation pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    SourceToTarget,
    TargetToSource,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::SourceToTarget => write!(f, "source -> target"),
            Direction::TargetToSource => write!(f, "target -> source"),
        }
    }
}

/// File content as seen on one side of a comparison
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSnapshot {
    pub unit: String,
    pub path: String,
    /// `None` when the path does not exist at `unit`
    #[serde(default, with = "crate::cache::base64_bytes::optional")]
    pub content: Option<Vec<u8>>,
    pub digest: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDiff {
    pub source: FileSnapshot,
    pub target: FileSnapshot,
}

/// Why a matched pair failed file verification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileDiscrepancy {
    Content(FileDiff),
    /// Changed on the primary side with no corresponding changed path on the other
    Unpaired { path: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMismatch {
    pub primary: ChangeRecord,
    pub counterpart: ChangeRecord,
    pub discrepancy: FileDiscrepancy,
}

/// Several counterparts claimed the same linking id; the first was used
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateLink {
    pub link: String,
    pub chosen: String,
    pub ignored: Vec<String>,
}

/// Discrepancies found in one direction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingResult {
    pub direction: Direction,
    pub missing: Vec<ChangeRecord>,
    pub message_mismatch: Vec<(ChangeRecord, ChangeRecord)>,
    pub file_mismatch: Vec<FileMismatch>,
    pub duplicate_links: Vec<DuplicateLink>,
}

impl MappingResult {
    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            missing: Vec::new(),
            message_mismatch: Vec::new(),
            file_mismatch: Vec::new(),
            duplicate_links: Vec::new(),
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.missing.is_empty() || !self.message_mismatch.is_empty() || !self.file_mismatch.is_empty()
    }
}
