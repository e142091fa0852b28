use super::{exit_codes, print_json, report_store_error};
use crate::cli::args::AssessArgs;
use crate::cli::input::{decode_items, read_document};
use evalstore_core::{Assessment, StoreConfig};
use serde_json::json;

pub fn run(args: AssessArgs, cfg: &StoreConfig) -> anyhow::Result<i32> {
    let assessments = match decode_items::<Assessment>(read_document(&args.file)?) {
        Ok(assessments) => assessments,
        Err(e) => return Ok(report_store_error(&e)),
    };
    let count = assessments.len();
    let store = cfg.open_store()?;

    match store.log_assessments(&args.evaluation_id, assessments, args.run_id.as_deref()) {
        Ok(()) => {
            print_json(&json!({
                "evaluation_id": args.evaluation_id,
                "assessments": count,
            }))?;
            Ok(exit_codes::OK)
        }
        Err(e) => Ok(report_store_error(&e)),
    }
}
