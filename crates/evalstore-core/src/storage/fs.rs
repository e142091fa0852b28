use super::{is_valid_run_id, ArtifactRepository};
use crate::table::{Table, TableName};
use anyhow::Context;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Stores each run's tables as JSON files under `<root>/<run_id>/artifacts/`.
///
/// Every table write lands in a temp file in the same directory and is then
/// renamed over the target, so readers never observe a partial file.
#[derive(Debug, Clone)]
pub struct FsArtifactRepository {
    root: PathBuf,
}

impl FsArtifactRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn artifact_dir(&self, run_id: &str) -> anyhow::Result<PathBuf> {
        if !is_valid_run_id(run_id) {
            anyhow::bail!("invalid run id for artifact path: {:?}", run_id);
        }
        Ok(self.root.join(run_id).join("artifacts"))
    }
}

impl ArtifactRepository for FsArtifactRepository {
    fn write_table(&self, run_id: &str, name: TableName, table: &Table) -> anyhow::Result<()> {
        let dir = self.artifact_dir(run_id)?;
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create artifact dir {}", dir.display()))?;
        let target = dir.join(name.artifact_file());

        let tmp = tempfile::NamedTempFile::new_in(&dir)
            .with_context(|| format!("failed to create temp file in {}", dir.display()))?;
        {
            let mut w = BufWriter::new(tmp.as_file());
            serde_json::to_writer(&mut w, table)
                .with_context(|| format!("failed to serialize {} table", name.as_str()))?;
            w.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(&target)
            .with_context(|| format!("failed to persist {}", target.display()))?;

        tracing::debug!(
            event = "evalstore.artifact.written",
            run_id = %run_id,
            path = %target.display(),
            rows = table.len()
        );
        Ok(())
    }

    fn read_table(&self, run_id: &str, name: TableName) -> anyhow::Result<Table> {
        let path = self.artifact_dir(run_id)?.join(name.artifact_file());
        let file = std::fs::File::open(&path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        let table: Table = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(table)
    }

    fn list_artifacts(&self, run_id: &str) -> anyhow::Result<Vec<String>> {
        let dir = self.artifact_dir(run_id)?;
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for entry in std::fs::read_dir(&dir)
            .with_context(|| format!("failed to list {}", dir.display()))?
        {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                out.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        out.sort();
        Ok(out)
    }
}
