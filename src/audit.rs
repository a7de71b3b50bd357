// src/audit.rs

//! Drives one audit run: extract both histories, make sure the working
//! copies exist, reconcile in both directions and build the report.

use chrono::Utc;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn, Span};

use crate::cache::{CommandCache, ProcessExecutor};
use crate::config::AuditConfig;
use crate::error::Result;
use crate::extract::{extract_batched, GitLogExtractor, HistoryExtractor, SvnLogExtractor};
use crate::layout::PathTranslator;
use crate::model::Direction;
use crate::provider::{GitProvider, HistoryProvider, SvnProvider};
use crate::reconcile::Reconciler;
use crate::report::AuditReport;
use crate::verify::FileVerifier;

pub struct Auditor {
    config: AuditConfig,
    cache: Arc<CommandCache>,
    source: Arc<dyn HistoryProvider>,
    target: Arc<dyn HistoryProvider>,
    source_extractor: Box<dyn HistoryExtractor>,
    target_extractor: Box<dyn HistoryExtractor>,
    span: Span,
}

impl Auditor {
    /// Wires the Subversion and git-svn providers to a process-backed cache.
    pub fn new(config: AuditConfig) -> Result<Self> {
        let span = tracing::info_span!("audit", source = %config.source_url);
        let mut cache = CommandCache::open(&config.cache_dir, Box::new(ProcessExecutor), &span)?
            .with_uncacheable(config.uncacheable.clone());
        if !config.cache_enabled {
            cache = cache.disabled();
        }
        let cache = Arc::new(cache);

        let source = Arc::new(SvnProvider::new(&config.source_url, &config.svn_working_copy, cache.clone()));
        let target = Arc::new(GitProvider::new(&config.source_url, &config.git_working_copy, cache.clone()));
        let target_extractor = Box::new(GitLogExtractor::new(config.link_marker.clone()));

        Ok(Self::with_components(config, cache, source, target, Box::new(SvnLogExtractor), target_extractor, span))
    }

    pub fn with_components(
        config: AuditConfig,
        cache: Arc<CommandCache>,
        source: Arc<dyn HistoryProvider>,
        target: Arc<dyn HistoryProvider>,
        source_extractor: Box<dyn HistoryExtractor>,
        target_extractor: Box<dyn HistoryExtractor>,
        span: Span,
    ) -> Self {
        Self { config, cache, source, target, source_extractor, target_extractor, span }
    }

    pub fn cache(&self) -> &CommandCache {
        &self.cache
    }

    /// Removes both working copies and every cached result.
    pub fn cleanup(&self) -> Result<()> {
        let _enter = self.span.enter();
        info!("cleaning up working copies and cache");
        for dir in [&self.config.svn_working_copy, &self.config.git_working_copy] {
            remove_dir(dir)?;
        }
        self.cache.cleanup()
    }

    /// Runs the audit to completion. Only unrecoverable provider and
    /// extraction failures return `Err`; discrepancies land in the report.
    pub fn run(&self) -> Result<AuditReport> {
        let _enter = self.span.enter();
        info!("starting audit");

        let source_records = extract_batched(
            self.source.as_ref(),
            self.source_extractor.as_ref(),
            self.config.batch_size,
            self.config.progress,
        )?;
        info!(count = source_records.len(), "retrieved source units");

        self.source.ensure_working_copy()?;
        self.target.ensure_working_copy()?;

        let target_records = extract_batched(
            self.target.as_ref(),
            self.target_extractor.as_ref(),
            self.config.batch_size,
            self.config.progress,
        )?;
        info!(count = target_records.len(), "retrieved target units");

        if source_records.len() != target_records.len() {
            warn!(
                source = source_records.len(),
                target = target_records.len(),
                "unit count differs between histories"
            );
        }

        let verifier = FileVerifier::new(self.source.clone(), self.target.clone(), self.config.verify_mode);
        let reconciler = Reconciler::new(PathTranslator::new(self.config.layout.clone()), verifier, &self.span)
            .with_jobs(self.config.jobs)
            .with_progress(self.config.progress);

        let forward = reconciler.reconcile(&source_records, &target_records, Direction::SourceToTarget)?;
        let reverse = reconciler.reconcile(&target_records, &source_records, Direction::TargetToSource)?;

        let report = AuditReport {
            generated_at: Utc::now(),
            source_units: source_records.len(),
            target_units: target_records.len(),
            forward,
            reverse,
            cache: self.cache.stats(),
        };

        if report.is_clean() {
            info!("audit passed");
        } else {
            let found = report.discrepancies();
            error!(discrepancies = found.len(), "audit failed");
            for discrepancy in &found {
                error!("{discrepancy}");
            }
        }
        Ok(report)
    }
}

fn remove_dir(dir: &Path) -> Result<()> {
    match fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
