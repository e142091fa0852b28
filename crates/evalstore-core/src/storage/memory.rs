use super::ArtifactRepository;
use crate::table::{Table, TableName};
use std::collections::HashMap;
use std::sync::Mutex;

/// Process-local artifact repository.
///
/// Tables are kept in their serialized JSON form so that reads go through
/// the same wire format as the filesystem repository.
#[derive(Debug, Default)]
pub struct MemoryArtifactRepository {
    files: Mutex<HashMap<String, HashMap<String, String>>>,
}

impl MemoryArtifactRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw JSON stored for a table, if any.
    pub fn raw(&self, run_id: &str, name: TableName) -> anyhow::Result<Option<String>> {
        let files = self.lock()?;
        Ok(files
            .get(run_id)
            .and_then(|run| run.get(name.artifact_file()))
            .cloned())
    }

    fn lock(
        &self,
    ) -> anyhow::Result<std::sync::MutexGuard<'_, HashMap<String, HashMap<String, String>>>> {
        self.files
            .lock()
            .map_err(|_| anyhow::anyhow!("memory artifact repository lock poisoned"))
    }
}

impl ArtifactRepository for MemoryArtifactRepository {
    fn write_table(&self, run_id: &str, name: TableName, table: &Table) -> anyhow::Result<()> {
        let json = serde_json::to_string(table)?;
        self.lock()?
            .entry(run_id.to_string())
            .or_default()
            .insert(name.artifact_file().to_string(), json);
        Ok(())
    }

    fn read_table(&self, run_id: &str, name: TableName) -> anyhow::Result<Table> {
        let raw = self.raw(run_id, name)?.ok_or_else(|| {
            anyhow::anyhow!("artifact {} not found in run {}", name.artifact_file(), run_id)
        })?;
        Ok(serde_json::from_str(&raw)?)
    }

    fn list_artifacts(&self, run_id: &str) -> anyhow::Result<Vec<String>> {
        let files = self.lock()?;
        let mut out: Vec<String> = files
            .get(run_id)
            .map(|run| run.keys().cloned().collect())
            .unwrap_or_default();
        out.sort();
        Ok(out)
    }
}
