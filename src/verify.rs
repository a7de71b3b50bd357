// src/verify.rs

use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::Result;
use crate::model::{FileDiff, FileSnapshot};
use crate::provider::{read_working_copy, HistoryProvider};

/// Where file contents are read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum VerifyMode {
    /// Ask each provider for the file at the unit (`svn cat`, `git show`)
    #[default]
    Read,
    /// Materialize each unit in its working copy and read from disk
    WorkingCopy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileComparison {
    Identical,
    Differs(FileDiff),
}

impl FileComparison {
    pub fn is_match(&self) -> bool {
        matches!(self, FileComparison::Identical)
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

pub struct FileVerifier {
    source: Arc<dyn HistoryProvider>,
    target: Arc<dyn HistoryProvider>,
    mode: VerifyMode,
}

impl FileVerifier {
    pub fn new(source: Arc<dyn HistoryProvider>, target: Arc<dyn HistoryProvider>, mode: VerifyMode) -> Self {
        Self { source, target, mode }
    }

    pub fn mode(&self) -> VerifyMode {
        self.mode
    }

    /// Compares `source_path` at `source_unit` with `target_path` at `target_unit`.
    pub fn verify(
        &self,
        source_unit: &str,
        target_unit: &str,
        source_path: &str,
        target_path: &str,
    ) -> Result<FileComparison> {
        let source = self.snapshot(self.source.as_ref(), source_unit, source_path)?;
        let target = self.snapshot(self.target.as_ref(), target_unit, target_path)?;

        if source.digest.is_some() && source.digest == target.digest {
            debug!(source_path, target_path, source_unit, target_unit, "file content verified");
            return Ok(FileComparison::Identical);
        }

        warn!(
            source = %format!("{source_path}@{source_unit}"),
            target = %format!("{target_path}@{target_unit}"),
            source_digest = source.digest.as_deref().unwrap_or("<missing>"),
            target_digest = target.digest.as_deref().unwrap_or("<missing>"),
            "file content mismatch"
        );
        Ok(FileComparison::Differs(FileDiff { source, target }))
    }

    fn snapshot(&self, provider: &dyn HistoryProvider, unit: &str, path: &str) -> Result<FileSnapshot> {
        let content = match self.mode {
            VerifyMode::Read => provider.read_file(unit, path)?,
            VerifyMode::WorkingCopy => {
                // the working copy may have moved since the last comparison
                provider.materialize(unit)?;
                read_working_copy(provider, path)?
            }
        };
        Ok(FileSnapshot {
            unit: unit.to_string(),
            path: path.to_string(),
            digest: content.as_deref().map(sha256_hex),
            content,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;

    /// In-memory provider: files keyed by `(unit, path)`.
    #[derive(Default)]
    pub(crate) struct MemoryProvider {
        pub files: HashMap<(String, String), Vec<u8>>,
        pub materialized: Mutex<Vec<String>>,
        pub root: PathBuf,
    }

    impl MemoryProvider {
        pub fn with(files: &[(&str, &str, &[u8])]) -> Self {
            Self {
                files: files
                    .iter()
                    .map(|(unit, path, bytes)| ((unit.to_string(), path.to_string()), bytes.to_vec()))
                    .collect(),
                ..Default::default()
            }
        }
    }

    impl HistoryProvider for MemoryProvider {
        fn name(&self) -> &str {
            "memory"
        }
        fn head(&self) -> Result<Option<u64>> {
            Ok(None)
        }
        fn list_history(&self, _: Option<(u64, u64)>) -> Result<String> {
            Ok(String::new())
        }
        fn ensure_working_copy(&self) -> Result<()> {
            Ok(())
        }
        fn materialize(&self, unit: &str) -> Result<()> {
            self.materialized.lock().unwrap().push(unit.to_string());
            Ok(())
        }
        fn read_file(&self, unit: &str, path: &str) -> Result<Option<Vec<u8>>> {
            Ok(self.files.get(&(unit.to_string(), path.to_string())).cloned())
        }
        fn working_copy(&self) -> &Path {
            &self.root
        }
    }

    fn verifier(source: MemoryProvider, target: MemoryProvider) -> FileVerifier {
        FileVerifier::new(Arc::new(source), Arc::new(target), VerifyMode::Read)
    }

    #[test]
    fn identical_content_matches() {
        let v = verifier(
            MemoryProvider::with(&[("5", "/trunk/src/a.txt", b"same\n")]),
            MemoryProvider::with(&[("c0ffee", "/src/a.txt", b"same\n")]),
        );
        let result = v.verify("5", "c0ffee", "/trunk/src/a.txt", "/src/a.txt").unwrap();
        assert!(result.is_match());
    }

    #[test]
    fn one_byte_difference_keeps_both_sides() {
        let v = verifier(
            MemoryProvider::with(&[("5", "/trunk/src/a.txt", b"same\n")]),
            MemoryProvider::with(&[("c0ffee", "/src/a.txt", b"sane\n")]),
        );
        let FileComparison::Differs(diff) = v.verify("5", "c0ffee", "/trunk/src/a.txt", "/src/a.txt").unwrap() else {
            panic!("expected a mismatch");
        };
        assert_eq!(diff.source.content.as_deref(), Some(&b"same\n"[..]));
        assert_eq!(diff.target.content.as_deref(), Some(&b"sane\n"[..]));
        assert_eq!(diff.source.digest.as_deref(), Some(sha256_hex(b"same\n").as_str()));
        assert_ne!(diff.source.digest, diff.target.digest);
    }

    #[test]
    fn missing_on_both_sides_is_not_a_match() {
        let v = verifier(MemoryProvider::default(), MemoryProvider::default());
        let result = v.verify("1", "abc", "/trunk/x", "/x").unwrap();
        assert!(!result.is_match());
    }

    #[test]
    fn working_copy_mode_materializes_each_side() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.txt"), b"x").unwrap();
        let source = Arc::new(MemoryProvider { root: tmp.path().to_path_buf(), ..Default::default() });
        let target = Arc::new(MemoryProvider { root: tmp.path().to_path_buf(), ..Default::default() });
        let v = FileVerifier::new(source.clone(), target.clone(), VerifyMode::WorkingCopy);

        assert!(v.verify("3", "beef", "/a.txt", "/a.txt").unwrap().is_match());
        assert!(v.verify("4", "f00d", "/a.txt", "/a.txt").unwrap().is_match());
        assert_eq!(*source.materialized.lock().unwrap(), ["3", "4"]);
        assert_eq!(*target.materialized.lock().unwrap(), ["beef", "f00d"]);
    }

    #[test]
    fn digest_is_sha256() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
