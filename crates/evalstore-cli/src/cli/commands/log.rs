use super::{exit_codes, print_json, report_store_error};
use crate::cli::args::{LogArgs, LogTableArgs};
use crate::cli::input::{decode_items, read_document};
use evalstore_core::{Evaluation, FieldMap, StoreConfig};

pub fn run(args: LogArgs, cfg: &StoreConfig) -> anyhow::Result<i32> {
    let evaluations = match decode_items::<Evaluation>(read_document(&args.file)?) {
        Ok(evaluations) => evaluations,
        Err(e) => return Ok(report_store_error(&e)),
    };
    let store = cfg.open_store()?;

    match store.log_evaluations(evaluations, args.run_id.as_deref()) {
        Ok(records) => {
            print_json(&records)?;
            Ok(exit_codes::OK)
        }
        Err(e) => Ok(report_store_error(&e)),
    }
}

pub fn run_table(args: LogTableArgs, cfg: &StoreConfig) -> anyhow::Result<i32> {
    let rows = match decode_items::<FieldMap>(read_document(&args.file)?) {
        Ok(rows) => rows,
        Err(e) => return Ok(report_store_error(&e)),
    };
    let store = cfg.open_store()?;

    let result = store.log_evaluations_from_rows(
        args.run_id.as_deref(),
        &rows,
        &args.input_cols,
        &args.output_cols,
        args.inputs_id_col.as_deref(),
        args.target_cols.as_deref(),
    );
    match result {
        Ok(rows) => {
            print_json(&rows)?;
            Ok(exit_codes::OK)
        }
        Err(e) => Ok(report_store_error(&e)),
    }
}
