use super::{Table, TableName};
use crate::errors::{StoreError, StoreResult};
use crate::model::{fields, Assessment, EvaluationRecord, FieldMap, Metric};
use serde_json::Value;
use std::collections::HashMap;

/// The three normalized tables an evaluation batch is stored as.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationTables {
    pub evaluations: Table,
    pub metrics: Table,
    pub assessments: Table,
}

impl EvaluationTables {
    pub fn empty() -> Self {
        Self {
            evaluations: Table::empty(TableName::Evaluations),
            metrics: Table::empty(TableName::Metrics),
            assessments: Table::empty(TableName::Assessments),
        }
    }

    pub fn get(&self, name: TableName) -> &Table {
        match name {
            TableName::Evaluations => &self.evaluations,
            TableName::Metrics => &self.metrics,
            TableName::Assessments => &self.assessments,
        }
    }

    /// Appends every row of `other` to the matching table.
    pub fn append(&mut self, other: &EvaluationTables) {
        self.evaluations.append(&other.evaluations);
        self.metrics.append(&other.metrics);
        self.assessments.append(&other.assessments);
    }
}

pub fn metric_to_row(evaluation_id: &str, metric: &Metric) -> FieldMap {
    let mut row = FieldMap::new();
    row.insert("evaluation_id".into(), Value::String(evaluation_id.to_string()));
    row.insert("key".into(), Value::String(metric.key.clone()));
    row.insert(
        "value".into(),
        serde_json::Number::from_f64(metric.value)
            .map(Value::Number)
            .unwrap_or(Value::Null),
    );
    row.insert("timestamp".into(), Value::from(metric.timestamp));
    row.insert("step".into(), Value::from(metric.step));
    row
}

pub fn metric_from_row(row: &FieldMap) -> StoreResult<(String, Metric)> {
    let evaluation_id = fields::req_string(row, "evaluation_id")?;
    let metric = Metric {
        key: fields::req_string(row, "key")?,
        value: fields::req_f64(row, "value")?,
        timestamp: fields::opt_i64(row, "timestamp")?.unwrap_or(0),
        step: fields::opt_i64(row, "step")?.unwrap_or(0),
    };
    Ok((evaluation_id, metric))
}

pub fn append_assessments(table: &mut Table, assessments: &[Assessment]) {
    for assessment in assessments {
        table.push_row(&assessment.to_dictionary());
    }
}

/// Splits evaluation records into the evaluations, metrics and assessments tables.
///
/// Metric and assessment rows carry their parent's `evaluation_id`.
pub fn evaluations_to_tables(records: &[EvaluationRecord]) -> EvaluationTables {
    let mut tables = EvaluationTables::empty();
    for record in records {
        tables.evaluations.push_row(&record.to_dictionary());
        for metric in &record.metrics {
            tables
                .metrics
                .push_row(&metric_to_row(&record.evaluation_id, metric));
        }
        for assessment in &record.assessments {
            let mut row = assessment.to_dictionary();
            row.insert(
                "evaluation_id".into(),
                Value::String(record.evaluation_id.clone()),
            );
            tables.assessments.push_row(&row);
        }
    }
    tables
}

/// Rebuilds one record per row of `evaluations`, attaching the metrics and
/// assessments whose `evaluation_id` matches. Child order follows table order.
pub fn tables_to_evaluations(
    evaluations: &Table,
    metrics: &Table,
    assessments: &Table,
) -> StoreResult<Vec<EvaluationRecord>> {
    let mut metrics_by_eval: HashMap<String, Vec<Metric>> = HashMap::new();
    for (pos, row) in metrics.rows().enumerate() {
        let (evaluation_id, metric) = metric_from_row(&row).map_err(|e| corrupt("metrics", pos, e))?;
        metrics_by_eval.entry(evaluation_id).or_default().push(metric);
    }

    let mut assessments_by_eval: HashMap<String, Vec<Assessment>> = HashMap::new();
    for (pos, row) in assessments.rows().enumerate() {
        let assessment =
            Assessment::from_dictionary(&row).map_err(|e| corrupt("assessments", pos, e))?;
        let evaluation_id = assessment
            .evaluation_id
            .clone()
            .ok_or_else(|| corrupt_msg("assessments", pos, "missing evaluation_id"))?;
        assessments_by_eval
            .entry(evaluation_id)
            .or_default()
            .push(assessment);
    }

    evaluations
        .rows()
        .enumerate()
        .map(|(pos, row)| {
            let evaluation_id = fields::req_string(&row, "evaluation_id")
                .map_err(|e| corrupt("evaluations", pos, e))?;
            let metrics = metrics_by_eval.remove(&evaluation_id).unwrap_or_default();
            let assessments = assessments_by_eval
                .remove(&evaluation_id)
                .unwrap_or_default();
            EvaluationRecord::from_dictionary(&row, metrics, assessments)
                .map_err(|e| corrupt("evaluations", pos, e))
        })
        .collect()
}

fn corrupt(table: &str, pos: usize, err: StoreError) -> StoreError {
    corrupt_msg(table, pos, &err.to_string())
}

fn corrupt_msg(table: &str, pos: usize, msg: &str) -> StoreError {
    StoreError::integrity(format!("malformed {} row {}: {}", table, pos, msg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AssessmentSource, Evaluation};
    use serde_json::json;

    fn map(v: Value) -> FieldMap {
        v.as_object().cloned().unwrap()
    }

    fn sample(id: &str) -> EvaluationRecord {
        let mut e = Evaluation::new(
            map(json!({"question": format!("q-{id}"), "ctx": {"docs": [1, 2]}})),
            map(json!({"answer": "a"})),
        );
        e.targets = Some(map(json!({"answer": "b"})));
        e.request_id = Some(format!("tr-{id}"));
        e.metrics.push(Metric::new("tokens", 10.0));
        e.metrics.push(Metric::new("latency_ms", 31.5));
        e.assessments
            .push(Assessment::new("correct", AssessmentSource::human("ann"), false));
        e.into_record("run-1", id)
    }

    #[test]
    fn children_carry_parent_id() {
        let tables = evaluations_to_tables(&[sample("e1"), sample("e2")]);
        assert_eq!(tables.evaluations.len(), 2);
        assert_eq!(tables.metrics.len(), 4);
        assert_eq!(tables.assessments.len(), 2);
        assert_eq!(tables.metrics.cell(2, "evaluation_id"), Some(&json!("e2")));
        assert_eq!(
            tables.assessments.cell(0, "evaluation_id"),
            Some(&json!("e1"))
        );
        // structured column, not flattened
        assert_eq!(
            tables.evaluations.cell(0, "inputs"),
            Some(&json!({"question": "q-e1", "ctx": {"docs": [1, 2]}}))
        );
    }

    #[test]
    fn decode_filtered_subset() {
        let records = vec![sample("e1"), sample("e2"), sample("e3")];
        let tables = evaluations_to_tables(&records);
        let one = tables
            .evaluations
            .filter(|r| r["evaluation_id"] == json!("e2"));
        let back = tables_to_evaluations(&one, &tables.metrics, &tables.assessments).unwrap();
        assert_eq!(back, vec![records[1].clone()]);
    }

    #[test]
    fn corrupt_metric_row_is_an_integrity_error() {
        let mut tables = evaluations_to_tables(&[sample("e1")]);
        tables.metrics.data[0][2] = json!("not a number");
        let err = tables_to_evaluations(&tables.evaluations, &tables.metrics, &tables.assessments)
            .unwrap_err();
        assert_eq!(err.code(), "E_INTEGRITY");
        assert!(err.to_string().contains("metrics row 0"));
    }

    #[test]
    fn orphan_children_are_ignored() {
        let mut tables = evaluations_to_tables(&[sample("e1")]);
        let mut orphan = metric_to_row("missing", &Metric::new("x", 1.0));
        orphan.insert("step".into(), json!(3));
        tables.metrics.push_row(&orphan);
        let back =
            tables_to_evaluations(&tables.evaluations, &tables.metrics, &tables.assessments)
                .unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back[0].metrics.len(), 2);
    }
}
