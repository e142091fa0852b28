use crate::errors::{StoreError, StoreResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;

/// Ordered string-keyed JSON map used for inputs, outputs, targets and table rows.
pub type FieldMap = Map<String, Value>;

pub const EVALUATION_COLUMNS: &[&str] = &[
    "evaluation_id",
    "run_id",
    "inputs_id",
    "inputs",
    "outputs",
    "request_id",
    "targets",
    "error_code",
    "error_message",
];

pub const METRIC_COLUMNS: &[&str] = &["evaluation_id", "key", "value", "timestamp", "step"];

pub const ASSESSMENT_COLUMNS: &[&str] = &[
    "evaluation_id",
    "name",
    "source",
    "timestamp",
    "value_type",
    "value",
    "rationale",
    "metadata",
    "error_code",
    "error_message",
];

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

// --- Values ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Boolean,
    Numeric,
    String,
}

impl ValueType {
    pub fn as_str(self) -> &'static str {
        match self {
            ValueType::Boolean => "boolean",
            ValueType::Numeric => "numeric",
            ValueType::String => "string",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "boolean" => Some(ValueType::Boolean),
            "numeric" => Some(ValueType::Numeric),
            "string" => Some(ValueType::String),
            _ => None,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The judgment carried by an assessment. Exactly one kind per assessment.
#[derive(Debug, Clone, PartialEq)]
pub enum AssessmentValue {
    Boolean(bool),
    Numeric(f64),
    String(String),
}

impl AssessmentValue {
    pub fn value_type(&self) -> ValueType {
        match self {
            AssessmentValue::Boolean(_) => ValueType::Boolean,
            AssessmentValue::Numeric(_) => ValueType::Numeric,
            AssessmentValue::String(_) => ValueType::String,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            AssessmentValue::Boolean(b) => Value::Bool(*b),
            AssessmentValue::Numeric(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            AssessmentValue::String(s) => Value::String(s.clone()),
        }
    }

    /// Decodes a JSON scalar that must be of the given kind.
    pub fn from_typed(value_type: ValueType, value: &Value) -> StoreResult<Self> {
        let decoded = match (value_type, value) {
            (ValueType::Boolean, Value::Bool(b)) => Some(AssessmentValue::Boolean(*b)),
            (ValueType::Numeric, Value::Number(n)) => n.as_f64().map(AssessmentValue::Numeric),
            (ValueType::String, Value::String(s)) => Some(AssessmentValue::String(s.clone())),
            _ => None,
        };
        decoded.ok_or_else(|| {
            StoreError::invalid(format!(
                "assessment value {} is not of declared type '{}'",
                value, value_type
            ))
        })
    }

    /// Infers the kind from a JSON scalar.
    pub fn infer(value: &Value) -> StoreResult<Self> {
        match value {
            Value::Bool(b) => Ok(AssessmentValue::Boolean(*b)),
            Value::Number(n) => n
                .as_f64()
                .map(AssessmentValue::Numeric)
                .ok_or_else(|| StoreError::invalid(format!("unsupported number {}", n))),
            Value::String(s) => Ok(AssessmentValue::String(s.clone())),
            other => Err(StoreError::invalid(format!(
                "assessment value must be a boolean, number or string, got {}",
                other
            ))),
        }
    }
}

impl From<bool> for AssessmentValue {
    fn from(v: bool) -> Self {
        AssessmentValue::Boolean(v)
    }
}

impl From<f64> for AssessmentValue {
    fn from(v: f64) -> Self {
        AssessmentValue::Numeric(v)
    }
}

impl From<&str> for AssessmentValue {
    fn from(v: &str) -> Self {
        AssessmentValue::String(v.to_string())
    }
}

impl From<String> for AssessmentValue {
    fn from(v: String) -> Self {
        AssessmentValue::String(v)
    }
}

// --- Sources ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceType {
    Human,
    AiJudge,
    Code,
}

impl SourceType {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceType::Human => "HUMAN",
            SourceType::AiJudge => "AI_JUDGE",
            SourceType::Code => "CODE",
        }
    }
}

/// Who produced an assessment. Equal iff both kind and id match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssessmentSource {
    pub source_type: SourceType,
    pub source_id: String,
}

impl AssessmentSource {
    pub fn new(source_type: SourceType, source_id: impl Into<String>) -> Self {
        Self {
            source_type,
            source_id: source_id.into(),
        }
    }

    pub fn human(source_id: impl Into<String>) -> Self {
        Self::new(SourceType::Human, source_id)
    }

    pub fn ai_judge(source_id: impl Into<String>) -> Self {
        Self::new(SourceType::AiJudge, source_id)
    }

    pub fn code(source_id: impl Into<String>) -> Self {
        Self::new(SourceType::Code, source_id)
    }

    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "source_type": self.source_type.as_str(),
            "source_id": self.source_id,
        })
    }

    pub fn from_json(value: &Value) -> StoreResult<Self> {
        serde_json::from_value(value.clone())
            .map_err(|e| StoreError::invalid(format!("malformed assessment source {}: {}", value, e)))
    }
}

// --- Metrics ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub key: String,
    pub value: f64,
    #[serde(default = "now_ms")]
    pub timestamp: i64,
    #[serde(default)]
    pub step: i64,
}

impl Metric {
    pub fn new(key: impl Into<String>, value: f64) -> Self {
        Self {
            key: key.into(),
            value,
            timestamp: now_ms(),
            step: 0,
        }
    }

    pub fn validate(&self) -> StoreResult<()> {
        if self.key.trim().is_empty() {
            return Err(StoreError::invalid("metric key must not be empty"));
        }
        if !self.value.is_finite() {
            return Err(StoreError::invalid(format!(
                "metric '{}' has non-finite value {}",
                self.key, self.value
            )));
        }
        Ok(())
    }
}

/// Builds metrics from a `key -> number` mapping, all stamped with `timestamp` at step 0.
pub fn metrics_from_map(map: &FieldMap, timestamp: i64) -> StoreResult<Vec<Metric>> {
    map.iter()
        .map(|(key, value)| {
            let v = value.as_f64().ok_or_else(|| {
                StoreError::invalid(format!(
                    "metric '{}' must have a numeric value, got {}",
                    key, value
                ))
            })?;
            let metric = Metric {
                key: key.clone(),
                value: v,
                timestamp,
                step: 0,
            };
            metric.validate()?;
            Ok(metric)
        })
        .collect()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MetricsForm {
    Records(Vec<Metric>),
    Map(FieldMap),
}

/// Accepts metrics either as a list of records or as a `key -> number` map.
fn metrics_list_or_map<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Metric>, D::Error> {
    match MetricsForm::deserialize(deserializer)? {
        MetricsForm::Records(metrics) => Ok(metrics),
        MetricsForm::Map(map) => metrics_from_map(&map, now_ms()).map_err(serde::de::Error::custom),
    }
}

// --- Assessments ---

#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    /// Assigned when the assessment is attached to a logged evaluation.
    pub evaluation_id: Option<String>,
    pub name: String,
    pub source: AssessmentSource,
    pub value: AssessmentValue,
    pub rationale: Option<String>,
    pub metadata: Option<FieldMap>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub timestamp: i64,
}

impl Assessment {
    pub fn new(
        name: impl Into<String>,
        source: AssessmentSource,
        value: impl Into<AssessmentValue>,
    ) -> Self {
        Self {
            evaluation_id: None,
            name: name.into(),
            source,
            value: value.into(),
            rationale: None,
            metadata: None,
            error_code: None,
            error_message: None,
            timestamp: now_ms(),
        }
    }

    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = Some(rationale.into());
        self
    }

    pub fn with_metadata(mut self, metadata: FieldMap) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_error(mut self, code: impl Into<String>, message: impl Into<String>) -> Self {
        self.error_code = Some(code.into());
        self.error_message = Some(message.into());
        self
    }

    pub fn with_evaluation_id(mut self, evaluation_id: impl Into<String>) -> Self {
        self.evaluation_id = Some(evaluation_id.into());
        self
    }

    pub fn value_type(&self) -> ValueType {
        self.value.value_type()
    }

    pub fn validate(&self) -> StoreResult<()> {
        if self.name.trim().is_empty() {
            return Err(StoreError::invalid("assessment name must not be empty"));
        }
        if self.source.source_id.trim().is_empty() {
            return Err(StoreError::invalid(format!(
                "assessment '{}' has an empty source_id",
                self.name
            )));
        }
        if let AssessmentValue::Numeric(n) = self.value {
            if !n.is_finite() {
                return Err(StoreError::invalid(format!(
                    "assessment '{}' has non-finite numeric value {}",
                    self.name, n
                )));
            }
        }
        Ok(())
    }

    /// Persisted row form, keyed and ordered by [`ASSESSMENT_COLUMNS`].
    pub fn to_dictionary(&self) -> FieldMap {
        let mut row = FieldMap::new();
        row.insert("evaluation_id".into(), opt_json(&self.evaluation_id));
        row.insert("name".into(), Value::String(self.name.clone()));
        row.insert("source".into(), self.source.to_json());
        row.insert("timestamp".into(), Value::from(self.timestamp));
        row.insert(
            "value_type".into(),
            Value::String(self.value_type().as_str().to_string()),
        );
        row.insert("value".into(), self.value.to_json());
        row.insert("rationale".into(), opt_json(&self.rationale));
        row.insert(
            "metadata".into(),
            self.metadata
                .as_ref()
                .map(|m| Value::Object(m.clone()))
                .unwrap_or(Value::Null),
        );
        row.insert("error_code".into(), opt_json(&self.error_code));
        row.insert("error_message".into(), opt_json(&self.error_message));
        row
    }

    /// Accepts the persisted form (`value_type` + `value`) or the caller form
    /// (`value`, or exactly one of `boolean_value` / `numeric_value` / `string_value`).
    pub fn from_dictionary(dict: &FieldMap) -> StoreResult<Self> {
        let name = fields::req_string(dict, "name")?;
        let source = match dict.get("source") {
            Some(v) if !v.is_null() => AssessmentSource::from_json(v)?,
            _ => {
                return Err(StoreError::invalid(format!(
                    "assessment '{}' is missing a source",
                    name
                )))
            }
        };
        let value = Self::value_from_dictionary(&name, dict)?;
        let assessment = Assessment {
            evaluation_id: fields::opt_string(dict, "evaluation_id")?,
            name,
            source,
            value,
            rationale: fields::opt_string(dict, "rationale")?,
            metadata: fields::opt_map(dict, "metadata")?,
            error_code: fields::opt_string(dict, "error_code")?,
            error_message: fields::opt_string(dict, "error_message")?,
            timestamp: fields::opt_i64(dict, "timestamp")?.unwrap_or_else(now_ms),
        };
        assessment.validate()?;
        Ok(assessment)
    }

    fn value_from_dictionary(name: &str, dict: &FieldMap) -> StoreResult<AssessmentValue> {
        if let Some(declared) = fields::opt_string(dict, "value_type")? {
            let value_type = ValueType::parse(&declared).ok_or_else(|| {
                StoreError::invalid(format!(
                    "assessment '{}' has unknown value_type '{}'",
                    name, declared
                ))
            })?;
            let raw = dict.get("value").unwrap_or(&Value::Null);
            return AssessmentValue::from_typed(value_type, raw);
        }

        let typed = [
            ("boolean_value", ValueType::Boolean),
            ("numeric_value", ValueType::Numeric),
            ("string_value", ValueType::String),
        ];
        let mut present: Vec<(ValueType, &Value)> = typed
            .iter()
            .filter_map(|(key, ty)| dict.get(*key).filter(|v| !v.is_null()).map(|v| (*ty, v)))
            .collect();
        if let Some(v) = dict.get("value").filter(|v| !v.is_null()) {
            let inferred = AssessmentValue::infer(v)?;
            present.push((inferred.value_type(), v));
        }

        match present.as_slice() {
            [(ty, v)] => AssessmentValue::from_typed(*ty, v),
            [] => Err(StoreError::invalid(format!(
                "assessment '{}' has no value; exactly one of boolean, numeric or string is required",
                name
            ))),
            _ => Err(StoreError::invalid(format!(
                "assessment '{}' has {} values; exactly one of boolean, numeric or string is allowed",
                name,
                present.len()
            ))),
        }
    }
}

impl Serialize for Assessment {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_dictionary().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Assessment {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let dict = FieldMap::deserialize(deserializer)?;
        Assessment::from_dictionary(&dict).map_err(serde::de::Error::custom)
    }
}

/// Client-side pre-check: assessments sharing a name must share a value type.
pub fn verify_assessments_have_same_value_type(assessments: &[Assessment]) -> StoreResult<()> {
    let mut seen: HashMap<&str, ValueType> = HashMap::new();
    for assessment in assessments {
        let found = assessment.value_type();
        match seen.get(assessment.name.as_str()) {
            Some(expected) if *expected != found => {
                return Err(StoreError::invalid(format!(
                    "assessments with name '{}' have different value types: '{}' and '{}'",
                    assessment.name, expected, found
                )));
            }
            Some(_) => {}
            None => {
                seen.insert(assessment.name.as_str(), found);
            }
        }
    }
    Ok(())
}

/// One assessment per `(name, source)`: a later entry replaces an earlier one
/// in the earlier one's position.
pub fn collapse_assessment_keys(assessments: Vec<Assessment>) -> Vec<Assessment> {
    let mut out: Vec<Assessment> = Vec::with_capacity(assessments.len());
    for assessment in assessments {
        match out
            .iter_mut()
            .find(|a| a.name == assessment.name && a.source == assessment.source)
        {
            Some(slot) => *slot = assessment,
            None => out.push(assessment),
        }
    }
    out
}

// --- Evaluations ---

/// A case to be logged. Ids are assigned by the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub inputs: FieldMap,
    pub outputs: FieldMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub targets: Option<FieldMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inputs_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, deserialize_with = "metrics_list_or_map")]
    pub metrics: Vec<Metric>,
    #[serde(default)]
    pub assessments: Vec<Assessment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl Evaluation {
    pub fn new(inputs: FieldMap, outputs: FieldMap) -> Self {
        Self {
            inputs,
            outputs,
            ..Default::default()
        }
    }

    /// Adds metrics given as `key -> number`, stamped now at step 0.
    pub fn with_metric_map(mut self, metrics: &FieldMap) -> StoreResult<Self> {
        self.metrics.extend(metrics_from_map(metrics, now_ms())?);
        Ok(self)
    }

    pub fn with_assessments(mut self, assessments: Vec<Assessment>) -> Self {
        self.assessments.extend(assessments);
        self
    }

    pub fn validate(&self) -> StoreResult<()> {
        for metric in &self.metrics {
            metric.validate()?;
        }
        for assessment in &self.assessments {
            assessment.validate()?;
        }
        verify_assessments_have_same_value_type(&self.assessments)
    }

    /// Binds the evaluation to a run under a freshly assigned id.
    pub fn into_record(self, run_id: &str, evaluation_id: &str) -> EvaluationRecord {
        let inputs_id = self
            .inputs_id
            .unwrap_or_else(|| crate::fingerprint::inputs_id(&self.inputs));
        let assessments = collapse_assessment_keys(self.assessments)
            .into_iter()
            .map(|a| a.with_evaluation_id(evaluation_id))
            .collect();
        EvaluationRecord {
            evaluation_id: evaluation_id.to_string(),
            run_id: run_id.to_string(),
            inputs_id,
            inputs: self.inputs,
            outputs: self.outputs,
            targets: self.targets,
            request_id: self.request_id,
            metrics: self.metrics,
            assessments,
            error_code: self.error_code,
            error_message: self.error_message,
        }
    }
}

/// A logged evaluation, as persisted in a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub evaluation_id: String,
    pub run_id: String,
    pub inputs_id: String,
    pub inputs: FieldMap,
    pub outputs: FieldMap,
    #[serde(default)]
    pub targets: Option<FieldMap>,
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub metrics: Vec<Metric>,
    #[serde(default)]
    pub assessments: Vec<Assessment>,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl EvaluationRecord {
    /// Row form for the evaluations table; metrics and assessments live in their own tables.
    pub fn to_dictionary(&self) -> FieldMap {
        let mut row = FieldMap::new();
        row.insert("evaluation_id".into(), Value::String(self.evaluation_id.clone()));
        row.insert("run_id".into(), Value::String(self.run_id.clone()));
        row.insert("inputs_id".into(), Value::String(self.inputs_id.clone()));
        row.insert("inputs".into(), Value::Object(self.inputs.clone()));
        row.insert("outputs".into(), Value::Object(self.outputs.clone()));
        row.insert("request_id".into(), opt_json(&self.request_id));
        row.insert(
            "targets".into(),
            self.targets
                .as_ref()
                .map(|t| Value::Object(t.clone()))
                .unwrap_or(Value::Null),
        );
        row.insert("error_code".into(), opt_json(&self.error_code));
        row.insert("error_message".into(), opt_json(&self.error_message));
        row
    }

    pub fn from_dictionary(
        dict: &FieldMap,
        metrics: Vec<Metric>,
        assessments: Vec<Assessment>,
    ) -> StoreResult<Self> {
        Ok(EvaluationRecord {
            evaluation_id: fields::req_string(dict, "evaluation_id")?,
            run_id: fields::req_string(dict, "run_id")?,
            inputs_id: fields::req_string(dict, "inputs_id")?,
            inputs: fields::opt_map(dict, "inputs")?.unwrap_or_default(),
            outputs: fields::opt_map(dict, "outputs")?.unwrap_or_default(),
            targets: fields::opt_map(dict, "targets")?,
            request_id: fields::opt_string(dict, "request_id")?,
            metrics,
            assessments,
            error_code: fields::opt_string(dict, "error_code")?,
            error_message: fields::opt_string(dict, "error_message")?,
        })
    }
}

fn opt_json(v: &Option<String>) -> Value {
    v.as_ref()
        .map(|s| Value::String(s.clone()))
        .unwrap_or(Value::Null)
}

/// Typed field access on row dictionaries.
pub(crate) mod fields {
    use super::FieldMap;
    use crate::errors::{StoreError, StoreResult};
    use serde_json::Value;

    pub fn opt_string(row: &FieldMap, key: &str) -> StoreResult<Option<String>> {
        match row.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(other) => Err(StoreError::invalid(format!(
                "field '{}' must be a string, got {}",
                key, other
            ))),
        }
    }

    pub fn req_string(row: &FieldMap, key: &str) -> StoreResult<String> {
        opt_string(row, key)?
            .ok_or_else(|| StoreError::invalid(format!("missing required field '{}'", key)))
    }

    pub fn opt_map(row: &FieldMap, key: &str) -> StoreResult<Option<FieldMap>> {
        match row.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Object(m)) => Ok(Some(m.clone())),
            Some(other) => Err(StoreError::invalid(format!(
                "field '{}' must be an object, got {}",
                key, other
            ))),
        }
    }

    pub fn opt_i64(row: &FieldMap, key: &str) -> StoreResult<Option<i64>> {
        match row.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(v) => v.as_i64().map(Some).ok_or_else(|| {
                StoreError::invalid(format!("field '{}' must be an integer, got {}", key, v))
            }),
        }
    }

    pub fn req_f64(row: &FieldMap, key: &str) -> StoreResult<f64> {
        row.get(key)
            .and_then(Value::as_f64)
            .ok_or_else(|| StoreError::invalid(format!("field '{}' must be a number", key)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dict(v: Value) -> FieldMap {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn assessment_dictionary_roundtrip_keeps_every_field() {
        let mut meta = FieldMap::new();
        meta.insert("judge_model".into(), json!("gpt-4o"));
        let original = Assessment::new("relevance", AssessmentSource::ai_judge("judge-1"), 0.75)
            .with_rationale("mostly on topic")
            .with_metadata(meta)
            .with_error("E_TIMEOUT", "judge timed out once")
            .with_evaluation_id("ev-1");

        let row = original.to_dictionary();
        let keys: Vec<&str> = row.keys().map(String::as_str).collect();
        assert_eq!(keys, ASSESSMENT_COLUMNS);

        let back = Assessment::from_dictionary(&row).unwrap();
        assert_eq!(back, original);
    }

    #[test]
    fn caller_form_accepts_single_typed_value() {
        let a = Assessment::from_dictionary(&dict(json!({
            "name": "is_correct",
            "source": {"source_type": "HUMAN", "source_id": "alice"},
            "boolean_value": true
        })))
        .unwrap();
        assert_eq!(a.value, AssessmentValue::Boolean(true));
        assert_eq!(a.value_type(), ValueType::Boolean);

        let b = Assessment::from_dictionary(&dict(json!({
            "name": "tone",
            "source": {"source_type": "CODE", "source_id": "tone.py"},
            "value": "friendly"
        })))
        .unwrap();
        assert_eq!(b.value_type(), ValueType::String);
    }

    #[test]
    fn caller_form_rejects_zero_or_many_values() {
        let none = Assessment::from_dictionary(&dict(json!({
            "name": "x",
            "source": {"source_type": "HUMAN", "source_id": "a"}
        })));
        assert!(matches!(none, Err(StoreError::InvalidArgument(_))));

        let many = Assessment::from_dictionary(&dict(json!({
            "name": "x",
            "source": {"source_type": "HUMAN", "source_id": "a"},
            "boolean_value": true,
            "numeric_value": 1.0
        })));
        assert!(matches!(many, Err(StoreError::InvalidArgument(_))));
    }

    #[test]
    fn declared_type_must_match_value() {
        let err = Assessment::from_dictionary(&dict(json!({
            "name": "x",
            "source": {"source_type": "HUMAN", "source_id": "a"},
            "value_type": "boolean",
            "value": 3
        })))
        .unwrap_err();
        assert!(err.to_string().contains("not of declared type 'boolean'"));
    }

    #[test]
    fn unknown_source_type_is_rejected() {
        let err = Assessment::from_dictionary(&dict(json!({
            "name": "x",
            "source": {"source_type": "ROBOT", "source_id": "a"},
            "value": true
        })))
        .unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));
    }

    #[test]
    fn batch_precheck_flags_mixed_types_per_name() {
        let src = AssessmentSource::human("bob");
        let ok = vec![
            Assessment::new("a", src.clone(), true),
            Assessment::new("a", AssessmentSource::code("c"), false),
            Assessment::new("b", src.clone(), 1.0),
        ];
        assert!(verify_assessments_have_same_value_type(&ok).is_ok());

        let mixed = vec![
            Assessment::new("a", src.clone(), true),
            Assessment::new("a", src, 2.0),
        ];
        let err = verify_assessments_have_same_value_type(&mixed).unwrap_err();
        assert_eq!(err.code(), "E_INVALID_ARGUMENT");
        assert!(err.to_string().contains("'boolean' and 'numeric'"));
    }

    #[test]
    fn metrics_from_map_rejects_non_numeric() {
        let ok = metrics_from_map(&dict(json!({"tokens": 12, "latency": 0.5})), 42).unwrap();
        assert_eq!(ok.len(), 2);
        assert_eq!(ok[0].key, "tokens");
        assert_eq!(ok[0].timestamp, 42);
        assert_eq!(ok[1].step, 0);

        let err = metrics_from_map(&dict(json!({"tokens": "many"})), 42).unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));
    }

    #[test]
    fn into_record_derives_inputs_id_and_stamps_assessments() {
        let mut eval = Evaluation::new(dict(json!({"q": "hi"})), dict(json!({"a": "hello"})));
        eval.assessments
            .push(Assessment::new("ok", AssessmentSource::human("h"), true));
        let record = eval.into_record("run-1", "ev-9");
        assert_eq!(record.inputs_id.len(), 64);
        assert_eq!(
            record.assessments[0].evaluation_id.as_deref(),
            Some("ev-9")
        );
    }

    #[test]
    fn repeated_name_and_source_keeps_the_last_value() {
        let mut eval = Evaluation::new(dict(json!({})), dict(json!({})));
        let ann = AssessmentSource::human("ann");
        eval.assessments.push(Assessment::new("ok", ann.clone(), true));
        eval.assessments
            .push(Assessment::new("ok", AssessmentSource::code("c"), true));
        eval.assessments
            .push(Assessment::new("ok", ann.clone(), false).with_rationale("second look"));
        let record = eval.into_record("run-1", "ev-1");
        assert_eq!(record.assessments.len(), 2);
        assert_eq!(record.assessments[0].source, ann);
        assert_eq!(record.assessments[0].value, AssessmentValue::Boolean(false));
        assert_eq!(record.assessments[0].rationale.as_deref(), Some("second look"));
        assert_eq!(record.assessments[1].source, AssessmentSource::code("c"));
    }

    #[test]
    fn evaluation_metrics_deserialize_from_list_or_map() {
        let from_map: Evaluation = serde_json::from_value(json!({
            "inputs": {"q": 1},
            "outputs": {},
            "metrics": {"tokens": 7}
        }))
        .unwrap();
        assert_eq!(from_map.metrics.len(), 1);
        assert_eq!(from_map.metrics[0].key, "tokens");
        assert_eq!(from_map.metrics[0].value, 7.0);

        let from_list: Evaluation = serde_json::from_value(json!({
            "inputs": {},
            "outputs": {},
            "metrics": [{"key": "tokens", "value": 7, "timestamp": 3, "step": 2}]
        }))
        .unwrap();
        assert_eq!(from_list.metrics[0].step, 2);
        assert_eq!(from_list.metrics[0].timestamp, 3);

        let bad = serde_json::from_value::<Evaluation>(json!({
            "inputs": {},
            "outputs": {},
            "metrics": {"tokens": "lots"}
        }));
        assert!(bad.is_err());
    }

    #[test]
    fn non_finite_numeric_assessment_is_invalid() {
        let a = Assessment::new("score", AssessmentSource::code("c"), f64::NAN);
        assert!(a.validate().is_err());
    }
}
