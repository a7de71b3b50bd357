// src/cli.rs

use clap::Parser;
use std::path::PathBuf;

use crate::verify::VerifyMode;

#[derive(Parser, Debug)]
#[command(author, version, about = "Audit a Subversion to git-svn conversion", long_about = None)]
pub struct Args {
    /// URL of the Subversion repository that was converted
    pub source_url: String,

    /// Directory holding the working copies (`svn_repo` and `git_repo`)
    pub clone_path: PathBuf,

    /// Directory for cached query results
    #[arg(long, env = "SVN_GIT_AUDIT_CACHE_DIR", default_value = ".svn_git_cache")]
    pub cache_dir: PathBuf,

    /// Run every query, reading and storing nothing
    #[arg(long)]
    pub no_cache: bool,

    /// Delete the working copies and cached results before auditing
    #[arg(long)]
    pub clean: bool,

    /// Worker threads used to verify units
    #[arg(short, long, env = "SVN_GIT_AUDIT_JOBS", default_value_t = 4)]
    pub jobs: usize,

    /// Source revisions fetched per `svn log` call
    #[arg(long, default_value_t = 1000)]
    pub batch_size: u64,

    /// Where file contents are read from
    #[arg(long, value_enum, default_value_t = VerifyMode::Read)]
    pub verify_mode: VerifyMode,

    /// Single-segment layout prefixes, e.g. `trunk`
    #[arg(long = "trunk", value_delimiter = ',', default_value = "trunk")]
    pub root_keywords: Vec<String>,

    /// Layout prefixes followed by a name segment
    #[arg(long = "branches", value_delimiter = ',', default_value = "branches,tags")]
    pub named_keywords: Vec<String>,

    /// Trailer that records the source revision in a target commit message
    #[arg(long, default_value = crate::extract::DEFAULT_LINK_MARKER)]
    pub link_marker: String,

    /// Command tokens whose queries are never cached
    #[arg(long, value_delimiter = ',', default_value = "checkout,clone,switch,update,reset")]
    pub uncacheable: Vec<String>,

    /// Write the full report as JSON
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Also write debug-level logs to this file
    #[arg(long, env = "SVN_GIT_AUDIT_LOG_FILE")]
    pub log_file: Option<PathBuf>,

    /// Hide progress bars
    #[arg(long)]
    pub no_progress: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let args = Args::try_parse_from(["svn-git-audit", "https://svn.example.com/repo", "/tmp/work"]).unwrap();
        assert_eq!(args.jobs, 4);
        assert_eq!(args.root_keywords, ["trunk"]);
        assert_eq!(args.named_keywords, ["branches", "tags"]);
        assert_eq!(args.link_marker, "git-svn-id:");
        assert_eq!(args.verify_mode, VerifyMode::Read);
        assert!(args.uncacheable.contains(&"checkout".to_string()));
    }

    #[test]
    fn layout_lists_are_comma_separated() {
        let args = Args::try_parse_from([
            "svn-git-audit",
            "u",
            "p",
            "--trunk",
            "main",
            "--branches",
            "releases,features",
            "--verify-mode",
            "working-copy",
        ])
        .unwrap();
        assert_eq!(args.root_keywords, ["main"]);
        assert_eq!(args.named_keywords, ["releases", "features"]);
        assert_eq!(args.verify_mode, VerifyMode::WorkingCopy);
    }

    #[test]
    fn requires_both_positionals() {
        assert!(Args::try_parse_from(["svn-git-audit", "u"]).is_err());
    }
}
