use super::{exit_codes, print_json, report_store_error};
use crate::cli::args::{GetArgs, OutputFormat, RunsArgs};
use evalstore_core::{EvaluationRecord, StoreConfig};

pub fn run(args: GetArgs, cfg: &StoreConfig) -> anyhow::Result<i32> {
    let store = cfg.open_store()?;
    let record = match store.get_evaluation(&args.run_id, &args.evaluation_id) {
        Ok(r) => r,
        Err(e) => return Ok(report_store_error(&e)),
    };

    match args.format {
        OutputFormat::Json => print_json(&record)?,
        OutputFormat::Text => print_text(&record),
    }
    Ok(exit_codes::OK)
}

pub fn runs(args: RunsArgs, cfg: &StoreConfig) -> anyhow::Result<i32> {
    let runs = cfg.open_tracking()?.list_runs()?;
    match args.format {
        OutputFormat::Json => print_json(&runs)?,
        OutputFormat::Text => {
            for run in &runs {
                println!(
                    "{}  {:<8}  {}  {}",
                    run.id,
                    run.status,
                    run.started_at,
                    run.name.as_deref().unwrap_or("-")
                );
            }
        }
    }
    Ok(exit_codes::OK)
}

fn print_text(record: &EvaluationRecord) {
    println!("Evaluation {} (run {})", record.evaluation_id, record.run_id);
    println!("  inputs_id: {}", record.inputs_id);
    if let Some(req) = &record.request_id {
        println!("  request_id: {}", req);
    }
    println!("  inputs:  {}", serde_json::Value::Object(record.inputs.clone()));
    println!("  outputs: {}", serde_json::Value::Object(record.outputs.clone()));
    if let Some(targets) = &record.targets {
        println!("  targets: {}", serde_json::Value::Object(targets.clone()));
    }
    if let (Some(code), msg) = (&record.error_code, &record.error_message) {
        println!("  error: {} {}", code, msg.as_deref().unwrap_or(""));
    }

    if !record.metrics.is_empty() {
        println!("Metrics:");
        for m in &record.metrics {
            println!("  {:<24} {} (step {})", m.key, m.value, m.step);
        }
    }
    if !record.assessments.is_empty() {
        println!("Assessments:");
        for a in &record.assessments {
            println!(
                "  {:<24} {:<8} {}/{}  {}",
                a.name,
                a.value.to_json(),
                a.source.source_type.as_str(),
                a.source.source_id,
                a.rationale.as_deref().unwrap_or("")
            );
        }
    }
}
