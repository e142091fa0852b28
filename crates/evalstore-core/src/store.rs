//! The evaluation store facade.
//!
//! Every operation reads and rewrites whole tables through the injected
//! [`ArtifactRepository`]. Writers sharing one [`EvaluationStore`] are
//! serialized per run by an in-process lock; separate processes writing the
//! same run are not coordinated and the last full-table write wins.

use crate::errors::{StoreError, StoreResult};
use crate::merge::{upsert_assessment, MergeOutcome};
use crate::model::{
    now_ms, verify_assessments_have_same_value_type, Assessment, Evaluation, EvaluationRecord,
    FieldMap, Metric,
};
use crate::stats::restated_stats_metrics;
use crate::storage::{
    is_valid_run_id, ArtifactRepository, IdGenerator, MemoryArtifactRepository, MetricSink, RunResolver,
    TrackingStore, UuidGenerator,
};
use crate::table::codec::{evaluations_to_tables, tables_to_evaluations, EvaluationTables};
use crate::table::{Table, TableName};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub struct EvaluationStore {
    artifacts: Arc<dyn ArtifactRepository>,
    metrics: Arc<dyn MetricSink>,
    runs: Arc<dyn RunResolver>,
    ids: Arc<dyn IdGenerator>,
    run_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl EvaluationStore {
    pub fn new(
        artifacts: Arc<dyn ArtifactRepository>,
        metrics: Arc<dyn MetricSink>,
        runs: Arc<dyn RunResolver>,
    ) -> Self {
        Self {
            artifacts,
            metrics,
            runs,
            ids: Arc::new(UuidGenerator),
            run_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Uses `tracking` both to resolve runs and to receive stats metrics.
    pub fn with_tracking(artifacts: Arc<dyn ArtifactRepository>, tracking: TrackingStore) -> Self {
        let tracking = Arc::new(tracking);
        Self::new(artifacts, tracking.clone(), tracking)
    }

    /// Process-local store backed by memory artifacts and an in-memory tracking db.
    pub fn in_memory() -> anyhow::Result<Self> {
        Ok(Self::with_tracking(
            Arc::new(MemoryArtifactRepository::new()),
            TrackingStore::memory()?,
        ))
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    /// Logs a batch of evaluations to `run_id` (or the active run).
    ///
    /// All validation, encoding and merging with any tables already in the
    /// run happen before the first write. Tables are then written in the order
    /// evaluations, metrics, assessments; a failure part way through leaves
    /// the earlier tables written.
    pub fn log_evaluations(
        &self,
        evaluations: Vec<Evaluation>,
        run_id: Option<&str>,
    ) -> StoreResult<Vec<EvaluationRecord>> {
        for evaluation in &evaluations {
            evaluation.validate()?;
        }
        let run_id = self.runs.resolve_run(run_id)?;

        let records: Vec<EvaluationRecord> = evaluations
            .into_iter()
            .map(|e| {
                let id = self.ids.next_id();
                e.into_record(&run_id, &id)
            })
            .collect();
        let batch = evaluations_to_tables(&records);

        let stats = self.with_run_lock(&run_id, || {
            let mut tables = self.read_existing_tables(&run_id)?;
            let before = tables.assessments.clone();
            tables.append(&batch);

            let names = records
                .iter()
                .flat_map(|r| r.assessments.iter().map(|a| a.name.as_str()));
            let stats = restated_stats_metrics(&before, &tables.assessments, names, now_ms())?;

            for name in TableName::ALL {
                self.artifacts.write_table(&run_id, name, tables.get(name))?;
            }
            self.publish_stats(&run_id, &stats)?;
            Ok(stats)
        })?;

        tracing::info!(
            event = "evalstore.evaluations.logged",
            run_id = %run_id,
            evaluations = records.len(),
            metrics = batch.metrics.len(),
            assessments = batch.assessments.len(),
            stats_metrics = stats.len()
        );
        Ok(records)
    }

    /// Logs one evaluation; see [`Evaluation::with_metric_map`] for map-form metrics.
    pub fn log_evaluation(
        &self,
        evaluation: Evaluation,
        run_id: Option<&str>,
    ) -> StoreResult<EvaluationRecord> {
        self.log_evaluations(vec![evaluation], run_id)?
            .pop()
            .ok_or_else(|| StoreError::integrity("logging one evaluation returned no record"))
    }

    /// Builds one evaluation per row by projecting it onto the given columns,
    /// logs them, and returns the rows with their new `evaluation_id`.
    pub fn log_evaluations_from_rows<C: AsRef<str>>(
        &self,
        run_id: Option<&str>,
        rows: &[FieldMap],
        input_cols: &[C],
        output_cols: &[C],
        inputs_id_col: Option<&str>,
        target_cols: Option<&[C]>,
    ) -> StoreResult<Vec<FieldMap>> {
        let evaluations = rows
            .iter()
            .enumerate()
            .map(|(pos, row)| {
                let mut evaluation = Evaluation::new(
                    project(row, pos, input_cols)?,
                    project(row, pos, output_cols)?,
                );
                if let Some(cols) = target_cols {
                    evaluation.targets = Some(project(row, pos, cols)?);
                }
                if let Some(col) = inputs_id_col {
                    evaluation.inputs_id = Some(match column(row, pos, col)? {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    });
                }
                Ok(evaluation)
            })
            .collect::<StoreResult<Vec<_>>>()?;

        let records = self.log_evaluations(evaluations, run_id)?;
        Ok(rows
            .iter()
            .zip(&records)
            .map(|(row, record)| {
                let mut out = row.clone();
                out.insert(
                    "evaluation_id".into(),
                    Value::String(record.evaluation_id.clone()),
                );
                out
            })
            .collect())
    }

    /// Upserts assessments for an existing evaluation.
    ///
    /// Each assessment replaces the row with the same name and source, or is
    /// appended. Nothing is written unless every assessment merges cleanly.
    pub fn log_assessments(
        &self,
        evaluation_id: &str,
        assessments: Vec<Assessment>,
        run_id: Option<&str>,
    ) -> StoreResult<()> {
        for assessment in &assessments {
            assessment.validate()?;
            match assessment.evaluation_id.as_deref() {
                Some(other) if other != evaluation_id => {
                    return Err(StoreError::invalid(format!(
                        "assessment '{}' belongs to evaluation '{}', not '{}'",
                        assessment.name, other, evaluation_id
                    )));
                }
                _ => {}
            }
        }
        verify_assessments_have_same_value_type(&assessments)?;
        let run_id = self.runs.resolve_run(run_id)?;

        let (updated, appended, stats) = self.with_run_lock(&run_id, || {
            self.get_evaluation(&run_id, evaluation_id)?;

            let before = self.read_validated(&run_id, TableName::Assessments)?;
            let mut table = before.clone();
            let (mut updated, mut appended) = (0usize, 0usize);
            for assessment in &assessments {
                let (next, outcome) = upsert_assessment(table, evaluation_id, assessment)?;
                table = next;
                match outcome {
                    MergeOutcome::Updated { .. } => updated += 1,
                    MergeOutcome::Appended { .. } => appended += 1,
                }
            }

            let names = assessments.iter().map(|a| a.name.as_str());
            let stats = restated_stats_metrics(&before, &table, names, now_ms())?;

            self.artifacts
                .write_table(&run_id, TableName::Assessments, &table)?;
            self.publish_stats(&run_id, &stats)?;
            Ok((updated, appended, stats))
        })?;

        tracing::info!(
            event = "evalstore.assessments.logged",
            run_id = %run_id,
            evaluation_id = %evaluation_id,
            updated,
            appended,
            stats_metrics = stats.len()
        );
        Ok(())
    }

    /// Reads back one logged evaluation with its metrics and assessments.
    pub fn get_evaluation(&self, run_id: &str, evaluation_id: &str) -> StoreResult<EvaluationRecord> {
        if !is_valid_run_id(run_id) || !self.artifacts.has_all_tables(run_id)? {
            return Err(StoreError::not_found(format!(
                "The specified run '{}' does not contain any evaluations. \
                 Please log evaluations to the run before retrieving them.",
                run_id
            )));
        }
        let evaluations = self.read_validated(run_id, TableName::Evaluations)?;
        let wanted = Value::String(evaluation_id.to_string());
        let matching = evaluations.filter(|row| row.get("evaluation_id") == Some(&wanted));
        if matching.is_empty() {
            return Err(StoreError::not_found(format!(
                "The specified evaluation ID '{}' does not exist in the run '{}'.",
                evaluation_id, run_id
            )));
        }

        let metrics = self.read_validated(run_id, TableName::Metrics)?;
        let assessments = self.read_validated(run_id, TableName::Assessments)?;
        let mut records = tables_to_evaluations(&matching, &metrics, &assessments)?;
        if records.len() != 1 {
            return Err(StoreError::integrity(format!(
                "expected exactly one evaluation with id '{}' in run '{}', found {}",
                evaluation_id,
                run_id,
                records.len()
            )));
        }

        tracing::debug!(
            event = "evalstore.evaluation.fetched",
            run_id = %run_id,
            evaluation_id = %evaluation_id
        );
        records
            .pop()
            .ok_or_else(|| StoreError::integrity("decoded evaluation vanished"))
    }

    fn publish_stats(&self, run_id: &str, stats: &[Metric]) -> StoreResult<()> {
        if stats.is_empty() {
            return Ok(());
        }
        self.metrics.log_metrics(run_id, stats)?;
        tracing::info!(
            event = "evalstore.stats.updated",
            run_id = %run_id,
            metrics = stats.len()
        );
        Ok(())
    }

    fn read_validated(&self, run_id: &str, name: TableName) -> StoreResult<Table> {
        let table = self.artifacts.read_table(run_id, name)?;
        table.validate(name)?;
        Ok(table)
    }

    /// Tables already in the run; any that are missing start empty.
    fn read_existing_tables(&self, run_id: &str) -> StoreResult<EvaluationTables> {
        let listed = self.artifacts.list_artifacts(run_id)?;
        let mut tables = EvaluationTables::empty();
        for name in TableName::ALL {
            if !listed.iter().any(|p| p == name.artifact_file()) {
                continue;
            }
            let table = self.read_validated(run_id, name)?;
            match name {
                TableName::Evaluations => tables.evaluations = table,
                TableName::Metrics => tables.metrics = table,
                TableName::Assessments => tables.assessments = table,
            }
        }
        Ok(tables)
    }

    /// Runs `f` holding the in-process lock for `run_id`, then forgets the
    /// lock if no other caller holds or waits on it.
    fn with_run_lock<T>(&self, run_id: &str, f: impl FnOnce() -> StoreResult<T>) -> StoreResult<T> {
        let lock = self.run_lock(run_id)?;
        let result = {
            let _guard = lock
                .lock()
                .map_err(|_| anyhow::anyhow!("run lock for {} poisoned", run_id))?;
            f()
        };
        drop(lock);
        self.prune_run_locks()?;
        result
    }

    fn run_lock(&self, run_id: &str) -> StoreResult<Arc<Mutex<()>>> {
        let mut locks = self
            .run_locks
            .lock()
            .map_err(|_| anyhow::anyhow!("run lock registry poisoned"))?;
        let lock = locks.entry(run_id.to_string()).or_default().clone();
        tracing::debug!(
            event = "evalstore.run_lock.acquire",
            run_id = %run_id,
            contended = Arc::strong_count(&lock) > 2
        );
        Ok(lock)
    }

    fn prune_run_locks(&self) -> StoreResult<()> {
        let mut locks = self
            .run_locks
            .lock()
            .map_err(|_| anyhow::anyhow!("run lock registry poisoned"))?;
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Ok(())
    }

    #[cfg(test)]
    fn tracked_run_locks(&self) -> usize {
        self.run_locks.lock().map(|l| l.len()).unwrap_or(0)
    }
}

fn column<'r>(row: &'r FieldMap, pos: usize, col: &str) -> StoreResult<&'r Value> {
    row.get(col)
        .ok_or_else(|| StoreError::invalid(format!("row {} has no column '{}'", pos, col)))
}

fn project<C: AsRef<str>>(row: &FieldMap, pos: usize, cols: &[C]) -> StoreResult<FieldMap> {
    cols.iter()
        .map(|c| {
            let col = c.as_ref();
            Ok((col.to_string(), column(row, pos, col)?.clone()))
        })
        .collect()
}
