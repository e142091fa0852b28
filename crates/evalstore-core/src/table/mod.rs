//! Row-oriented tables as persisted per run.
//!
//! A table is stored in split orientation: an ordered column list, an
//! explicit row index, and one value vector per row. Structured columns
//! (inputs, outputs, targets, source, metadata) hold JSON objects directly
//! rather than being flattened into extra columns.

pub mod codec;

use crate::errors::{StoreError, StoreResult};
use crate::model::FieldMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Logical tables kept for every run that has evaluations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableName {
    Evaluations,
    Metrics,
    Assessments,
}

impl TableName {
    pub const ALL: [TableName; 3] = [
        TableName::Evaluations,
        TableName::Metrics,
        TableName::Assessments,
    ];

    /// Artifact path of this table inside a run.
    pub fn artifact_file(self) -> &'static str {
        match self {
            TableName::Evaluations => "_evaluations.json",
            TableName::Metrics => "_metrics.json",
            TableName::Assessments => "_assessments.json",
        }
    }

    pub fn columns(self) -> &'static [&'static str] {
        match self {
            TableName::Evaluations => crate::model::EVALUATION_COLUMNS,
            TableName::Metrics => crate::model::METRIC_COLUMNS,
            TableName::Assessments => crate::model::ASSESSMENT_COLUMNS,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TableName::Evaluations => "evaluations",
            TableName::Metrics => "metrics",
            TableName::Assessments => "assessments",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub index: Vec<u64>,
    pub data: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(columns: &[&str]) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            index: Vec::new(),
            data: Vec::new(),
        }
    }

    pub fn empty(name: TableName) -> Self {
        Self::new(name.columns())
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn column_position(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// Structural checks after a table has been read back from storage.
    pub fn validate(&self, name: TableName) -> StoreResult<()> {
        for expected in name.columns() {
            if self.column_position(expected).is_none() {
                return Err(StoreError::integrity(format!(
                    "{} table is missing column '{}'",
                    name.as_str(),
                    expected
                )));
            }
        }
        if self.index.len() != self.data.len() {
            return Err(StoreError::integrity(format!(
                "{} table has {} index entries for {} rows",
                name.as_str(),
                self.index.len(),
                self.data.len()
            )));
        }
        if let Some(pos) = self.data.iter().position(|r| r.len() != self.columns.len()) {
            return Err(StoreError::integrity(format!(
                "{} table row {} has {} values for {} columns",
                name.as_str(),
                pos,
                self.data[pos].len(),
                self.columns.len()
            )));
        }
        Ok(())
    }

    fn next_index(&self) -> u64 {
        self.index.iter().max().map(|m| m + 1).unwrap_or(0)
    }

    /// Appends a row, placing values by column name. Absent columns become null;
    /// keys that are not columns are dropped.
    pub fn push_row(&mut self, row: &FieldMap) {
        let values = self.values_for(row);
        let idx = self.next_index();
        self.index.push(idx);
        self.data.push(values);
    }

    /// Replaces row `pos` in place; its index entry is kept.
    pub fn set_row(&mut self, pos: usize, row: &FieldMap) -> StoreResult<()> {
        if pos >= self.data.len() {
            return Err(StoreError::integrity(format!(
                "row position {} out of range ({} rows)",
                pos,
                self.data.len()
            )));
        }
        self.data[pos] = self.values_for(row);
        Ok(())
    }

    fn values_for(&self, row: &FieldMap) -> Vec<Value> {
        self.columns
            .iter()
            .map(|c| row.get(c).cloned().unwrap_or(Value::Null))
            .collect()
    }

    pub fn row(&self, pos: usize) -> Option<FieldMap> {
        self.data.get(pos).map(|values| {
            self.columns
                .iter()
                .cloned()
                .zip(values.iter().cloned())
                .collect()
        })
    }

    pub fn rows(&self) -> impl Iterator<Item = FieldMap> + '_ {
        (0..self.data.len()).filter_map(move |pos| self.row(pos))
    }

    /// Value of `column` in row `pos`, or `None` if either is absent.
    pub fn cell(&self, pos: usize, column: &str) -> Option<&Value> {
        let c = self.column_position(column)?;
        self.data.get(pos).and_then(|r| r.get(c))
    }

    /// Positions of the rows whose `column` equals `value`.
    pub fn positions_where(&self, column: &str, value: &Value) -> Vec<usize> {
        (0..self.data.len())
            .filter(|pos| self.cell(*pos, column) == Some(value))
            .collect()
    }

    /// Rows satisfying `pred`, keeping their original index entries.
    pub fn filter<F>(&self, mut pred: F) -> Table
    where
        F: FnMut(&FieldMap) -> bool,
    {
        let mut out = Table {
            columns: self.columns.clone(),
            index: Vec::new(),
            data: Vec::new(),
        };
        for (pos, values) in self.data.iter().enumerate() {
            if let Some(row) = self.row(pos) {
                if pred(&row) {
                    out.index.push(self.index[pos]);
                    out.data.push(values.clone());
                }
            }
        }
        out
    }

    /// Appends all rows of `other`, re-numbering their index after ours.
    pub fn append(&mut self, other: &Table) {
        for row in other.rows() {
            self.push_row(&row);
        }
    }
}
