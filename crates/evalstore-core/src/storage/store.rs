use super::{MetricSink, RunResolver};
use crate::errors::{StoreError, StoreResult};
use crate::model::Metric;
use anyhow::Context;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// SQLite-backed run registry and per-run metric time series.
#[derive(Clone)]
pub struct TrackingStore {
    pub conn: Arc<Mutex<Connection>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunRow {
    pub id: String,
    pub name: Option<String>,
    pub started_at: String,
    pub status: String,
}

pub const STATUS_RUNNING: &str = "running";

impl TrackingStore {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(path).context("failed to open sqlite db")?;
        Self::from_connection(conn)
    }

    pub fn memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory sqlite db")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> anyhow::Result<Self> {
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn init_schema(&self) -> anyhow::Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(super::schema::DDL)?;
        Ok(())
    }

    fn lock(&self) -> anyhow::Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("tracking store connection lock poisoned"))
    }

    pub fn create_run(&self, name: Option<&str>) -> anyhow::Result<String> {
        let id = uuid::Uuid::new_v4().simple().to_string();
        let started_at = chrono::Utc::now().to_rfc3339();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO runs(id, name, started_at, status) VALUES (?1, ?2, ?3, ?4)",
            params![id, name, started_at, STATUS_RUNNING],
        )
        .context("insert run")?;
        tracing::info!(event = "evalstore.run.created", run_id = %id);
        Ok(id)
    }

    pub fn finish_run(&self, run_id: &str, status: &str) -> anyhow::Result<()> {
        let conn = self.lock()?;
        let n = conn.execute(
            "UPDATE runs SET status=?1 WHERE id=?2",
            params![status, run_id],
        )?;
        if n == 0 {
            anyhow::bail!("run {} does not exist", run_id);
        }
        Ok(())
    }

    pub fn run_exists(&self, run_id: &str) -> anyhow::Result<bool> {
        let conn = self.lock()?;
        let found: Option<i64> = conn
            .query_row("SELECT 1 FROM runs WHERE id = ?1", params![run_id], |r| {
                r.get(0)
            })
            .optional()?;
        Ok(found.is_some())
    }

    /// Most recently started run still in `running` state.
    pub fn active_run(&self) -> anyhow::Result<Option<String>> {
        let conn = self.lock()?;
        let id = conn
            .query_row(
                "SELECT id FROM runs WHERE status = ?1 ORDER BY rowid DESC LIMIT 1",
                params![STATUS_RUNNING],
                |r| r.get(0),
            )
            .optional()?;
        Ok(id)
    }

    pub fn list_runs(&self) -> anyhow::Result<Vec<RunRow>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT id, name, started_at, status FROM runs ORDER BY rowid ASC")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(RunRow {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    started_at: row.get(2)?,
                    status: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Latest value per `(key, step)` for a run, ordered by key then step.
    pub fn get_metrics(&self, run_id: &str) -> anyhow::Result<Vec<Metric>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT key, value, timestamp, step FROM run_metrics
             WHERE run_id = ?1
             ORDER BY key ASC, step ASC",
        )?;
        let rows = stmt
            .query_map(params![run_id], |row| {
                Ok(Metric {
                    key: row.get(0)?,
                    value: row.get(1)?,
                    timestamp: row.get(2)?,
                    step: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

impl MetricSink for TrackingStore {
    fn log_metrics(&self, run_id: &str, metrics: &[Metric]) -> anyhow::Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO run_metrics(run_id, key, value, timestamp, step)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(run_id, key, step) DO UPDATE SET
                    value=excluded.value,
                    timestamp=excluded.timestamp",
            )?;
            for m in metrics {
                stmt.execute(params![run_id, m.key, m.value, m.timestamp, m.step])
                    .with_context(|| format!("insert metric {}", m.key))?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

impl RunResolver for TrackingStore {
    fn resolve_run(&self, run_id: Option<&str>) -> StoreResult<String> {
        match run_id {
            Some(id) if self.run_exists(id)? => Ok(id.to_string()),
            Some(id) => Err(StoreError::not_found(format!("run '{}' does not exist", id))),
            None => match self.active_run()? {
                Some(id) => Ok(id),
                None => Ok(self.create_run(None)?),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_explicit_active_or_new_run() {
        let store = TrackingStore::memory().unwrap();

        let created = store.resolve_run(None).unwrap();
        assert_eq!(store.resolve_run(None).unwrap(), created);
        assert_eq!(store.resolve_run(Some(&created)).unwrap(), created);

        let err = store.resolve_run(Some("nope")).unwrap_err();
        assert_eq!(err.code(), "E_NOT_FOUND");

        store.finish_run(&created, "finished").unwrap();
        let next = store.resolve_run(None).unwrap();
        assert_ne!(next, created);
        assert_eq!(store.list_runs().unwrap().len(), 2);
    }

    #[test]
    fn metrics_upsert_by_key_and_step() {
        let store = TrackingStore::memory().unwrap();
        let run = store.create_run(Some("demo")).unwrap();

        let m = |key: &str, value: f64, step: i64| Metric {
            key: key.into(),
            value,
            timestamp: 1,
            step,
        };
        store
            .log_metrics(&run, &[m("acc", 0.5, 0), m("acc", 0.6, 1)])
            .unwrap();
        store.log_metrics(&run, &[m("acc", 0.9, 0)]).unwrap();

        let got = store.get_metrics(&run).unwrap();
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].value, 0.9);
        assert_eq!(got[1].value, 0.6);
    }

    #[test]
    fn metrics_for_unknown_run_are_rejected() {
        let store = TrackingStore::memory().unwrap();
        let res = store.log_metrics(
            "ghost",
            &[Metric {
                key: "k".into(),
                value: 1.0,
                timestamp: 0,
                step: 0,
            }],
        );
        assert!(res.is_err());
    }
}
