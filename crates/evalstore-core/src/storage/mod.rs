//! Collaborators the evaluation store is written against, and their implementations.
//!
//! Table persistence and existence checks go through [`ArtifactRepository`];
//! per-run metric time series through [`MetricSink`]; run ids through
//! [`RunResolver`] and evaluation ids through [`IdGenerator`].

pub mod fs;
pub mod memory;
pub mod schema;
pub mod store;

pub use fs::FsArtifactRepository;
pub use memory::MemoryArtifactRepository;
pub use store::TrackingStore;

use crate::errors::StoreResult;
use crate::model::Metric;
use crate::table::{Table, TableName};

/// Run ids usable as a single path segment: non-empty, no separators, not `.`/`..`.
pub fn is_valid_run_id(run_id: &str) -> bool {
    !run_id.is_empty() && run_id != "." && run_id != ".." && !run_id.contains(['/', '\\'])
}

pub trait ArtifactRepository: Send + Sync {
    /// Replaces the stored table `name` of `run_id`.
    fn write_table(&self, run_id: &str, name: TableName, table: &Table) -> anyhow::Result<()>;

    fn read_table(&self, run_id: &str, name: TableName) -> anyhow::Result<Table>;

    /// Artifact paths present for `run_id`; empty for an unknown run.
    fn list_artifacts(&self, run_id: &str) -> anyhow::Result<Vec<String>>;

    fn has_all_tables(&self, run_id: &str) -> anyhow::Result<bool> {
        let listed = self.list_artifacts(run_id)?;
        Ok(TableName::ALL
            .iter()
            .all(|t| listed.iter().any(|p| p == t.artifact_file())))
    }
}

pub trait MetricSink: Send + Sync {
    fn log_metrics(&self, run_id: &str, metrics: &[Metric]) -> anyhow::Result<()>;
}

pub trait RunResolver: Send + Sync {
    /// Returns `run_id` if given and known, otherwise the active run.
    fn resolve_run(&self, run_id: Option<&str>) -> StoreResult<String>;
}

pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> String;
}

/// 32-char lowercase hex v4 uuids.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn next_id(&self) -> String {
        uuid::Uuid::new_v4().simple().to_string()
    }
}
