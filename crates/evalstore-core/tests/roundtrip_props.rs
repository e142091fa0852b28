//! Property tests: whatever batch is logged reads back unchanged.

use evalstore_core::model::collapse_assessment_keys;
use evalstore_core::{
    Assessment, AssessmentSource, AssessmentValue, Evaluation, EvaluationStore, FieldMap, Metric,
};
use proptest::prelude::*;
use serde_json::{json, Value};

const NAMES: [&str; 3] = ["correct", "score", "tone"];

fn arb_f64() -> impl Strategy<Value = f64> {
    prop::num::f64::NORMAL | prop::num::f64::SUBNORMAL | prop::num::f64::ZERO
}

fn arb_source() -> impl Strategy<Value = AssessmentSource> {
    (0usize..3, "[a-z0-9_.-]{1,6}").prop_map(|(kind, id)| match kind {
        0 => AssessmentSource::human(id),
        1 => AssessmentSource::ai_judge(id),
        _ => AssessmentSource::code(id),
    })
}

/// Names share a pool so one evaluation can carry a name from several
/// sources; each name keeps one value type.
fn arb_assessment() -> impl Strategy<Value = Assessment> {
    (
        0usize..NAMES.len(),
        arb_source(),
        any::<bool>(),
        arb_f64(),
        "[a-z]{1,8}",
        prop::option::of("[a-z ]{1,16}"),
        prop::option::of(("[a-z]{1,6}", any::<i32>())),
    )
        .prop_map(|(n, source, flag, number, text, rationale, metadata)| {
            let value = match n {
                0 => AssessmentValue::Boolean(flag),
                1 => AssessmentValue::Numeric(number),
                _ => AssessmentValue::String(text),
            };
            let mut a = Assessment::new(NAMES[n], source, value);
            a.rationale = rationale;
            a.metadata = metadata.map(|(key, v)| {
                let mut m = FieldMap::new();
                m.insert(key, json!(v));
                m
            });
            a
        })
}

/// One evaluation with up to `m` metrics and `k` assessments.
fn arb_evaluation() -> impl Strategy<Value = Evaluation> {
    (
        "[a-z ]{0,20}",
        prop::option::of("[a-z0-9]{0,8}"),
        prop::collection::vec((arb_f64(), 0i64..5), 0..4),
        prop::collection::vec(arb_assessment(), 0..6),
        prop::option::of("[a-z0-9-]{1,12}"),
    )
        .prop_map(|(question, target, metric_values, assessments, request_id)| {
            let mut e = Evaluation::new(
                as_map(json!({"question": question, "n": metric_values.len()})),
                as_map(json!({"answer": question.to_uppercase()})),
            );
            e.targets = target.map(|t| as_map(json!({ "answer": t })));
            e.request_id = request_id;
            e.metrics = metric_values
                .into_iter()
                .enumerate()
                .map(|(i, (v, step))| Metric {
                    step,
                    ..Metric::new(format!("m{i}"), v)
                })
                .collect();
            e.assessments = assessments;
            e
        })
}

fn as_map(v: Value) -> FieldMap {
    v.as_object().cloned().unwrap_or_default()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn logged_batches_read_back_unchanged(batch in prop::collection::vec(arb_evaluation(), 0..6)) {
        let store = EvaluationStore::in_memory().unwrap();
        let records = store.log_evaluations(batch.clone(), None).unwrap();
        prop_assert_eq!(records.len(), batch.len());

        for (input, record) in batch.iter().zip(&records) {
            let back = store.get_evaluation(&record.run_id, &record.evaluation_id).unwrap();
            prop_assert_eq!(&back, record);
            prop_assert_eq!(&back.inputs, &input.inputs);
            prop_assert_eq!(&back.outputs, &input.outputs);
            prop_assert_eq!(&back.targets, &input.targets);
            prop_assert_eq!(&back.request_id, &input.request_id);
            prop_assert_eq!(&back.metrics, &input.metrics);

            let expected = collapse_assessment_keys(input.assessments.clone());
            prop_assert_eq!(back.assessments.len(), expected.len());
            for (a, b) in back.assessments.iter().zip(&expected) {
                prop_assert_eq!(&a.name, &b.name);
                prop_assert_eq!(&a.source, &b.source);
                prop_assert_eq!(&a.value, &b.value);
                prop_assert_eq!(&a.rationale, &b.rationale);
                prop_assert_eq!(&a.metadata, &b.metadata);
                prop_assert_eq!(a.timestamp, b.timestamp);
            }
        }
    }
}
