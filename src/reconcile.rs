// src/reconcile.rs

use indicatif::{ParallelProgressIterator, ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::collections::HashMap;
use tracing::{debug, warn, Span};

use crate::error::{AuditError, Result};
use crate::layout::PathTranslator;
use crate::model::{
    ChangeRecord, Direction, DuplicateLink, FileDiscrepancy, FileMismatch, MappingResult,
};
use crate::verify::{FileComparison, FileVerifier, VerifyMode};

/// Collapses runs of whitespace to a single space and trims both ends.
pub fn normalize_message(message: &str) -> String {
    message.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Counterpart records grouped by linking id, in history order.
type LinkIndex<'a> = HashMap<&'a str, Vec<&'a ChangeRecord>>;

enum Outcome<'a> {
    Missing,
    Matched {
        counterpart: &'a ChangeRecord,
        message_matches: bool,
        file: Option<FileDiscrepancy>,
        duplicate: Option<DuplicateLink>,
    },
}

pub struct Reconciler {
    translator: PathTranslator,
    verifier: FileVerifier,
    jobs: usize,
    progress: bool,
    span: Span,
}

impl Reconciler {
    pub fn new(translator: PathTranslator, verifier: FileVerifier, parent: &Span) -> Self {
        Self {
            translator,
            verifier,
            jobs: 1,
            progress: false,
            span: tracing::info_span!(parent: parent, "reconcile"),
        }
    }

    /// Worker count for per-unit verification. Working-copy verification
    /// shares one checkout per side and always runs on a single worker.
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    fn effective_jobs(&self) -> usize {
        match self.verifier.mode() {
            VerifyMode::WorkingCopy => 1,
            VerifyMode::Read => self.jobs,
        }
    }

    /// Maps every `primary` record onto `counterpart` and classifies the result.
    ///
    /// For [`Direction::SourceToTarget`], `primary` is the source history and
    /// counterparts are found by their foreign link; for
    /// [`Direction::TargetToSource`] the roles are swapped.
    pub fn reconcile(
        &self,
        primary: &[ChangeRecord],
        counterpart: &[ChangeRecord],
        direction: Direction,
    ) -> Result<MappingResult> {
        let index = build_index(counterpart, direction);
        debug!(parent: &self.span, %direction, primary = primary.len(), linked = index.len(), "reconciling");

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.effective_jobs())
            .build()
            .map_err(|e| AuditError::Io(std::io::Error::other(e)))?;

        let bar = if self.progress {
            ProgressBar::new(primary.len() as u64)
        } else {
            ProgressBar::hidden()
        };
        if let Ok(style) = ProgressStyle::with_template("{msg} [{bar:40}] {pos}/{len} ({eta})") {
            bar.set_style(style);
        }
        bar.set_message(format!("Verifying {direction}"));

        let outcomes: Vec<Outcome<'_>> = pool.install(|| {
            primary
                .par_iter()
                .progress_with(bar.clone())
                .map(|record| self.span.in_scope(|| self.check(record, &index, direction)))
                .collect::<Result<Vec<_>>>()
        })?;
        bar.finish_and_clear();

        let mut result = MappingResult::new(direction);
        for (record, outcome) in primary.iter().zip(outcomes) {
            match outcome {
                Outcome::Missing => result.missing.push(record.clone()),
                Outcome::Matched { counterpart, message_matches, file, duplicate } => {
                    if let Some(duplicate) = duplicate {
                        result.duplicate_links.push(duplicate);
                    }
                    if !message_matches {
                        result.message_mismatch.push((record.clone(), counterpart.clone()));
                    }
                    if let Some(discrepancy) = file {
                        result.file_mismatch.push(FileMismatch {
                            primary: record.clone(),
                            counterpart: counterpart.clone(),
                            discrepancy,
                        });
                    }
                }
            }
        }
        Ok(result)
    }

    fn check<'a>(
        &self,
        record: &ChangeRecord,
        index: &LinkIndex<'a>,
        direction: Direction,
    ) -> Result<Outcome<'a>> {
        let link = match direction {
            Direction::SourceToTarget => Some(record.id.as_str()),
            Direction::TargetToSource => record.foreign_link.as_deref(),
        };
        let Some(candidates) = link.and_then(|l| index.get(l)) else {
            warn!(%direction, id = %record.id, summary = %normalize_message(&record.message), "no counterpart found");
            return Ok(Outcome::Missing);
        };
        let counterpart = candidates[0];

        let duplicate = (candidates.len() > 1).then(|| {
            let ignored: Vec<String> = candidates[1..].iter().map(|c| c.id.clone()).collect();
            warn!(
                %direction,
                id = %record.id,
                chosen = %counterpart.id,
                ignored = ?ignored,
                "several counterparts share one link, using the first in history order"
            );
            DuplicateLink {
                link: link.unwrap_or_default().to_string(),
                chosen: counterpart.id.clone(),
                ignored,
            }
        });

        let expected = normalize_message(&record.message);
        let actual = normalize_message(&counterpart.message);
        let message_matches = expected == actual;
        if !message_matches {
            warn!(%direction, id = %record.id, counterpart = %counterpart.id, %expected, %actual, "commit message mismatch");
        }

        let file = self.verify_files(record, counterpart, direction)?;
        if file.is_none() {
            debug!(id = %record.id, counterpart = %counterpart.id, "changed files verified");
        }

        Ok(Outcome::Matched { counterpart, message_matches, file, duplicate })
    }

    /// Stops at the first changed path that fails to verify.
    fn verify_files(
        &self,
        record: &ChangeRecord,
        counterpart: &ChangeRecord,
        direction: Direction,
    ) -> Result<Option<FileDiscrepancy>> {
        for changed in record.verifiable_paths() {
            let comparison = match direction {
                Direction::SourceToTarget => {
                    let target_path = self.translator.translate(&changed.path);
                    self.verifier.verify(&record.id, &counterpart.id, &changed.path, &target_path)?
                }
                Direction::TargetToSource => {
                    let Some((source_path, inferred)) = self.source_path_for(record, counterpart, &changed.path)
                    else {
                        warn!(id = %record.id, path = %changed.path, "changed path has no counterpart change");
                        return Ok(Some(FileDiscrepancy::Unpaired { path: changed.path.clone() }));
                    };
                    match self.verifier.verify(&counterpart.id, &record.id, &source_path, &changed.path)? {
                        FileComparison::Differs(diff) if inferred && diff.source.content.is_none() => {
                            warn!(id = %record.id, path = %changed.path, %source_path, "changed path does not exist on the source side");
                            return Ok(Some(FileDiscrepancy::Unpaired { path: changed.path.clone() }));
                        }
                        comparison => comparison,
                    }
                }
            };
            if let FileComparison::Differs(diff) = comparison {
                return Ok(Some(FileDiscrepancy::Content(diff)));
            }
        }
        Ok(None)
    }
}

impl Reconciler {
    /// Source path whose content `target_path` should have, and whether it
    /// was inferred rather than listed as a changed file of `source`.
    ///
    /// A copied or moved directory appears in the source history as the
    /// directory alone, while the target lists every file under it.
    fn source_path_for(
        &self,
        target: &ChangeRecord,
        source: &ChangeRecord,
        target_path: &str,
    ) -> Option<(String, bool)> {
        if let Some(listed) = source
            .verifiable_paths()
            .find(|p| self.translator.translate(&p.path) == target_path)
        {
            return Some((listed.path.clone(), false));
        }

        let under_copied_dir = source
            .added_directories()
            .filter_map(|dir| {
                let translated = self.translator.translate(&dir.path);
                let rest = if translated == "/" {
                    Some(target_path)
                } else {
                    target_path
                        .strip_prefix(translated.as_str())
                        .filter(|rest| rest.starts_with('/'))
                }?;
                Some((dir.path.len(), format!("{}{rest}", dir.path.trim_end_matches('/'))))
            })
            .max_by_key(|(depth, _)| *depth);
        if let Some((_, path)) = under_copied_dir {
            return Some((path, true));
        }

        let root = self.translator.branch_root(target.foreign_location.as_deref()?)?;
        Some((format!("{root}{target_path}"), true))
    }
}

fn build_index(records: &[ChangeRecord], direction: Direction) -> LinkIndex<'_> {
    let mut index: LinkIndex<'_> = HashMap::new();
    for record in records {
        let link = match direction {
            // counterparts are target records, linked through their trailer
            Direction::SourceToTarget => record.foreign_link.as_deref(),
            Direction::TargetToSource => Some(record.id.as_str()),
        };
        if let Some(link) = link {
            index.entry(link).or_default().push(record);
        }
    }
    index
}
