// src/config.rs

//! Validated run configuration, built from [`Args`].

use std::path::PathBuf;
use thiserror::Error;

use crate::cli::Args;
use crate::layout::LayoutConvention;
use crate::verify::VerifyMode;

/// Working copy directory names under the clone path
pub const SVN_WORKING_COPY: &str = "svn_repo";
pub const GIT_WORKING_COPY: &str = "git_repo";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

fn invalid(key: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue { key: key.to_string(), message: message.to_string() }
}

#[derive(Debug, Clone)]
pub struct AuditConfig {
    pub source_url: String,
    pub svn_working_copy: PathBuf,
    pub git_working_copy: PathBuf,
    pub cache_dir: PathBuf,
    pub cache_enabled: bool,
    pub uncacheable: Vec<String>,
    pub clean: bool,
    pub jobs: usize,
    pub batch_size: u64,
    pub verify_mode: VerifyMode,
    pub layout: LayoutConvention,
    pub link_marker: String,
    pub report_path: Option<PathBuf>,
    pub progress: bool,
}

impl AuditConfig {
    pub fn from_args(args: &Args) -> Result<Self, ConfigError> {
        let source_url = args.source_url.trim().trim_end_matches('/').to_string();
        if source_url.is_empty() {
            return Err(invalid("source_url", "must not be empty"));
        }
        if args.jobs == 0 {
            return Err(invalid("jobs", "expected at least one worker"));
        }
        if args.batch_size == 0 {
            return Err(invalid("batch_size", "expected a positive window size"));
        }
        if args.link_marker.trim().is_empty() {
            return Err(invalid("link_marker", "must not be empty"));
        }

        let keywords = |key: &str, raw: &[String]| -> Result<Vec<String>, ConfigError> {
            let words: Vec<String> = raw.iter().map(|w| w.trim().to_string()).filter(|w| !w.is_empty()).collect();
            if words.iter().any(|w| w.contains('/')) {
                return Err(invalid(key, "layout keywords are single path segments"));
            }
            Ok(words)
        };

        Ok(Self {
            source_url,
            svn_working_copy: args.clone_path.join(SVN_WORKING_COPY),
            git_working_copy: args.clone_path.join(GIT_WORKING_COPY),
            cache_dir: args.cache_dir.clone(),
            cache_enabled: !args.no_cache,
            uncacheable: args.uncacheable.clone(),
            clean: args.clean,
            jobs: args.jobs,
            batch_size: args.batch_size,
            verify_mode: args.verify_mode,
            layout: LayoutConvention {
                root_keywords: keywords("trunk", &args.root_keywords)?,
                named_keywords: keywords("branches", &args.named_keywords)?,
            },
            link_marker: args.link_marker.clone(),
            report_path: args.report.clone(),
            progress: !args.no_progress,
        })
    }
}
