// src/report.rs

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::Path;

use crate::cache::CacheStats;
use crate::error::Result;
use crate::model::{Direction, FileDiscrepancy, MappingResult};
use crate::reconcile::normalize_message;

/// One recorded, non-fatal finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Discrepancy {
    MissingMapping { direction: Direction, id: String },
    MessageMismatch { direction: Direction, id: String, counterpart: String },
    FileMismatch { direction: Direction, id: String, counterpart: String, path: String },
}

impl fmt::Display for Discrepancy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Discrepancy::MissingMapping { direction, id } => {
                write!(f, "[{direction}] {id}: no counterpart")
            }
            Discrepancy::MessageMismatch { direction, id, counterpart } => {
                write!(f, "[{direction}] {id} <-> {counterpart}: message differs")
            }
            Discrepancy::FileMismatch { direction, id, counterpart, path } => {
                write!(f, "[{direction}] {id} <-> {counterpart}: {path} differs")
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditReport {
    pub generated_at: DateTime<Utc>,
    pub source_units: usize,
    pub target_units: usize,
    pub forward: MappingResult,
    pub reverse: MappingResult,
    pub cache: CacheStats,
}

impl AuditReport {
    pub fn unit_counts_match(&self) -> bool {
        self.source_units == self.target_units
    }

    /// Clean when neither direction recorded a discrepancy.
    pub fn is_clean(&self) -> bool {
        !self.forward.has_errors() && !self.reverse.has_errors()
    }

    pub fn discrepancies(&self) -> Vec<Discrepancy> {
        let mut out = Vec::new();
        for result in [&self.forward, &self.reverse] {
            let direction = result.direction;
            out.extend(result.missing.iter().map(|r| Discrepancy::MissingMapping { direction, id: r.id.clone() }));
            out.extend(result.message_mismatch.iter().map(|(r, c)| Discrepancy::MessageMismatch {
                direction,
                id: r.id.clone(),
                counterpart: c.id.clone(),
            }));
            out.extend(result.file_mismatch.iter().map(|m| Discrepancy::FileMismatch {
                direction,
                id: m.primary.id.clone(),
                counterpart: m.counterpart.id.clone(),
                path: match &m.discrepancy {
                    FileDiscrepancy::Content(diff) => match direction {
                        Direction::SourceToTarget => diff.source.path.clone(),
                        Direction::TargetToSource => diff.target.path.clone(),
                    },
                    FileDiscrepancy::Unpaired { path } => path.clone(),
                },
            }));
        }
        out
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }
}

impl fmt::Display for AuditReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Audit report ({})", self.generated_at.to_rfc2822())?;
        writeln!(f, "  source units: {}", self.source_units)?;
        writeln!(f, "  target units: {}", self.target_units)?;
        if !self.unit_counts_match() {
            writeln!(f, "  unit counts differ")?;
        }
        writeln!(
            f,
            "  cache: {} hits, {} misses, {} uncached",
            self.cache.hits, self.cache.misses, self.cache.uncached
        )?;

        for result in [&self.forward, &self.reverse] {
            writeln!(f, "{}:", result.direction)?;
            writeln!(f, "  missing: {}", result.missing.len())?;
            for record in &result.missing {
                writeln!(f, "    {} {:?}", record.id, normalize_message(&record.message))?;
            }
            writeln!(f, "  message mismatches: {}", result.message_mismatch.len())?;
            for (record, counterpart) in &result.message_mismatch {
                writeln!(f, "    {} <-> {}", record.id, counterpart.id)?;
                writeln!(f, "      expected: {:?}", normalize_message(&record.message))?;
                writeln!(f, "      actual:   {:?}", normalize_message(&counterpart.message))?;
            }
            writeln!(f, "  file mismatches: {}", result.file_mismatch.len())?;
            for mismatch in &result.file_mismatch {
                match &mismatch.discrepancy {
                    FileDiscrepancy::Content(diff) => writeln!(
                        f,
                        "    {} <-> {}: {}@{} ({}) vs {}@{} ({})",
                        mismatch.primary.id,
                        mismatch.counterpart.id,
                        diff.source.path,
                        diff.source.unit,
                        diff.source.digest.as_deref().unwrap_or("missing"),
                        diff.target.path,
                        diff.target.unit,
                        diff.target.digest.as_deref().unwrap_or("missing"),
                    )?,
                    FileDiscrepancy::Unpaired { path } => writeln!(
                        f,
                        "    {} <-> {}: {} changed on one side only",
                        mismatch.primary.id, mismatch.counterpart.id, path
                    )?,
                }
            }
            if !result.duplicate_links.is_empty() {
                writeln!(f, "  duplicate links (first used, verify manually): {}", result.duplicate_links.len())?;
                for dup in &result.duplicate_links {
                    writeln!(f, "    {} -> {} (ignored: {})", dup.link, dup.chosen, dup.ignored.join(", "))?;
                }
            }
        }
        write!(f, "Verdict: {}", if self.is_clean() { "PASS" } else { "FAIL" })
    }
}
