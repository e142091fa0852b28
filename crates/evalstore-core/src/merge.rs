//! Upsert of a single assessment into an existing assessments table.
//!
//! Key is `(evaluation_id, name, source)`. Rows sharing `(evaluation_id, name)`
//! must all have the same value type; that check runs against the persisted
//! rows before anything is changed.

use crate::errors::{StoreError, StoreResult};
use crate::model::{Assessment, AssessmentSource, ValueType};
use crate::table::Table;
use serde_json::Value;

/// What [`upsert_assessment`] did to the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Updated { position: usize },
    Appended { position: usize },
}

/// Inserts or updates `assessment` for `evaluation_id`, returning the new table.
///
/// The table is consumed; on error it is dropped, so a caller that must keep
/// the prior state holds its own copy and persists only on success.
pub fn upsert_assessment(
    mut table: Table,
    evaluation_id: &str,
    assessment: &Assessment,
) -> StoreResult<(Table, MergeOutcome)> {
    let same_name = same_name_positions(&table, evaluation_id, &assessment.name);

    let found = assessment.value_type();
    for &pos in &same_name {
        let existing = value_type_at(&table, pos)?;
        if existing != found {
            return Err(StoreError::TypeConflict {
                name: assessment.name.clone(),
                expected: existing,
                found,
            });
        }
    }

    let mut row = assessment.to_dictionary();
    row.insert("evaluation_id".into(), Value::String(evaluation_id.to_string()));

    let mut matching_source = None;
    for &pos in &same_name {
        if source_at(&table, pos)? == assessment.source {
            matching_source = Some(pos);
            break;
        }
    }

    let outcome = match matching_source {
        Some(position) => {
            table.set_row(position, &row)?;
            MergeOutcome::Updated { position }
        }
        None => {
            table.push_row(&row);
            MergeOutcome::Appended {
                position: table.len() - 1,
            }
        }
    };
    Ok((table, outcome))
}

fn same_name_positions(table: &Table, evaluation_id: &str, name: &str) -> Vec<usize> {
    let eval = Value::String(evaluation_id.to_string());
    let name = Value::String(name.to_string());
    (0..table.len())
        .filter(|&pos| {
            table.cell(pos, "evaluation_id") == Some(&eval) && table.cell(pos, "name") == Some(&name)
        })
        .collect()
}

fn value_type_at(table: &Table, pos: usize) -> StoreResult<ValueType> {
    table
        .cell(pos, "value_type")
        .and_then(Value::as_str)
        .and_then(ValueType::parse)
        .ok_or_else(|| {
            StoreError::integrity(format!("assessments row {} has no valid value_type", pos))
        })
}

fn source_at(table: &Table, pos: usize) -> StoreResult<AssessmentSource> {
    let raw = table.cell(pos, "source").unwrap_or(&Value::Null);
    AssessmentSource::from_json(raw).map_err(|e| {
        StoreError::integrity(format!("assessments row {} has a malformed source: {}", pos, e))
    })
}
