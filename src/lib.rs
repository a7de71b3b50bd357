// src/lib.rs

//! Audits a Subversion to git-svn conversion.
//!
//! Both histories are extracted, every unit is mapped onto its counterpart in
//! both directions, and each mapped pair is checked for matching messages
//! and file contents. Provider queries go through a durable
//! [`cache::CommandCache`] so an interrupted audit can resume cheaply.

pub mod audit;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod extract;
pub mod layout;
pub mod model;
pub mod provider;
pub mod reconcile;
pub mod report;
pub mod verify;

pub use audit::Auditor;
pub use cache::{CommandCache, Executor, ProcessExecutor, Query};
pub use config::AuditConfig;
pub use error::{AuditError, ExtractionError, Result};
pub use model::{ChangeRecord, Direction, MappingResult};
pub use report::AuditReport;
