// src/main.rs

use anyhow::Context;
use clap::Parser;
use std::fs::File;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Mutex;
use std::time::Instant;
use tracing::error;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use svn_git_audit::cli::Args;
use svn_git_audit::{AuditConfig, Auditor};

fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = init_tracing(args.log_file.as_deref()) {
        eprintln!("Failed to initialise logging: {e:#}");
        return ExitCode::from(2);
    }

    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            error!("Audit aborted: {e:#}");
            ExitCode::from(2)
        }
    }
}

/// Returns whether the audit came back clean.
fn run(args: &Args) -> anyhow::Result<bool> {
    let start_time = Instant::now();
    let config = AuditConfig::from_args(args).context("invalid configuration")?;
    let report_path = config.report_path.clone();
    let clean = config.clean;

    let auditor = Auditor::new(config).context("failed to open the command cache")?;
    if clean {
        auditor.cleanup().context("failed to clean up")?;
    }

    let report = auditor.run()?;
    println!("{report}");

    if let Some(path) = report_path {
        report
            .write_json(&path)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        println!("Report written to {}", path.display());
    }

    println!("Total time: {:.2?}", start_time.elapsed());
    Ok(report.is_clean())
}

fn init_tracing(log_file: Option<&Path>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(filter);

    let file_layer = match log_file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("cannot create log file {}", path.display()))?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .with_filter(LevelFilter::DEBUG),
            )
        }
        None => None,
    };

    tracing_subscriber::registry().with(console).with(file_layer).init();
    Ok(())
}
