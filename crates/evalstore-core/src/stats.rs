use crate::errors::StoreResult;
use crate::model::{Assessment, AssessmentSource, AssessmentValue, Metric};
use crate::table::Table;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Summary of every assessment sharing one `(name, source)` pair.
#[derive(Debug, Clone, PartialEq)]
pub struct AssessmentStats {
    pub name: String,
    pub source: AssessmentSource,
    pub count: u64,
    pub true_count: u64,
    pub false_count: u64,
    numeric: Vec<f64>,
    strings: BTreeMap<String, u64>,
}

impl AssessmentStats {
    fn new(name: &str, source: &AssessmentSource) -> Self {
        Self {
            name: name.to_string(),
            source: source.clone(),
            count: 0,
            true_count: 0,
            false_count: 0,
            numeric: Vec::new(),
            strings: BTreeMap::new(),
        }
    }

    pub fn push(&mut self, value: &AssessmentValue) {
        self.count += 1;
        match value {
            AssessmentValue::Boolean(true) => self.true_count += 1,
            AssessmentValue::Boolean(false) => self.false_count += 1,
            AssessmentValue::Numeric(n) => self.numeric.push(*n),
            AssessmentValue::String(s) => *self.strings.entry(s.clone()).or_default() += 1,
        }
    }

    pub fn boolean_count(&self) -> u64 {
        self.true_count + self.false_count
    }

    pub fn true_ratio(&self) -> Option<f64> {
        let n = self.boolean_count();
        (n > 0).then(|| self.true_count as f64 / n as f64)
    }

    pub fn numeric_count(&self) -> usize {
        self.numeric.len()
    }

    pub fn mean(&self) -> Option<f64> {
        if self.numeric.is_empty() {
            return None;
        }
        Some(self.numeric.iter().sum::<f64>() / self.numeric.len() as f64)
    }

    pub fn min(&self) -> Option<f64> {
        self.numeric.iter().copied().reduce(f64::min)
    }

    pub fn max(&self) -> Option<f64> {
        self.numeric.iter().copied().reduce(f64::max)
    }

    /// Population standard deviation.
    pub fn stddev(&self) -> Option<f64> {
        let mean = self.mean()?;
        let n = self.numeric.len() as f64;
        let variance = self.numeric.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
        Some(variance.sqrt())
    }

    pub fn string_counts(&self) -> &BTreeMap<String, u64> {
        &self.strings
    }

    /// Key prefix `<name>/<SOURCE_TYPE>/<source_id>`.
    pub fn key_prefix(&self) -> String {
        format!(
            "{}/{}/{}",
            self.name,
            self.source.source_type.as_str(),
            self.source.source_id
        )
    }

    /// Materializes the stats as metrics at step 0, all stamped with `timestamp`.
    pub fn to_metrics(&self, timestamp: i64) -> Vec<Metric> {
        let prefix = self.key_prefix();
        let metric = |stat: &str, value: f64| Metric {
            key: format!("{}/{}", prefix, stat),
            value,
            timestamp,
            step: 0,
        };

        let mut out = vec![metric("count", self.count as f64)];
        if let Some(ratio) = self.true_ratio() {
            out.push(metric("true_count", self.true_count as f64));
            out.push(metric("false_count", self.false_count as f64));
            out.push(metric("true_ratio", ratio));
        }
        if let (Some(mean), Some(min), Some(max), Some(std)) =
            (self.mean(), self.min(), self.max(), self.stddev())
        {
            out.push(metric("mean", mean));
            out.push(metric("min", min));
            out.push(metric("max", max));
            out.push(metric("stddev", std));
        }
        if !self.strings.is_empty() {
            out.push(metric("distinct_count", self.strings.len() as f64));
            for (value, n) in &self.strings {
                out.push(metric(&format!("value/{}/count", value), *n as f64));
            }
        }
        out
    }
}

/// Groups the rows named `assessment_name` by source and summarizes each group.
pub fn compute_assessment_stats_by_source(
    assessments: &Table,
    assessment_name: &str,
) -> StoreResult<BTreeMap<AssessmentSource, AssessmentStats>> {
    let name = Value::String(assessment_name.to_string());
    let mut groups: BTreeMap<AssessmentSource, AssessmentStats> = BTreeMap::new();
    for pos in assessments.positions_where("name", &name) {
        let Some(row) = assessments.row(pos) else {
            continue;
        };
        let assessment = Assessment::from_dictionary(&row).map_err(|e| {
            crate::errors::StoreError::integrity(format!("malformed assessments row {}: {}", pos, e))
        })?;
        groups
            .entry(assessment.source.clone())
            .or_insert_with(|| AssessmentStats::new(assessment_name, &assessment.source))
            .push(&assessment.value);
    }
    Ok(groups)
}

/// Stats metrics for each of `names`, in name then source order.
pub fn stats_metrics_for_names<'a, I>(
    assessments: &Table,
    names: I,
    timestamp: i64,
) -> StoreResult<Vec<Metric>>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut names: Vec<&str> = names.into_iter().collect();
    names.sort_unstable();
    names.dedup();

    let mut metrics = Vec::new();
    for name in names {
        for stats in compute_assessment_stats_by_source(assessments, name)?.values() {
            metrics.extend(stats.to_metrics(timestamp));
        }
    }
    Ok(metrics)
}

/// Stats metrics for `names` over `after`, plus a zero for every key the same
/// names produced over `before` that `after` no longer yields.
pub fn restated_stats_metrics<'a, I>(
    before: &Table,
    after: &Table,
    names: I,
    timestamp: i64,
) -> StoreResult<Vec<Metric>>
where
    I: IntoIterator<Item = &'a str>,
{
    let names: Vec<&str> = names.into_iter().collect();
    let mut metrics = stats_metrics_for_names(after, names.iter().copied(), timestamp)?;
    let current: BTreeSet<String> = metrics.iter().map(|m| m.key.clone()).collect();
    let stale: Vec<Metric> = stats_metrics_for_names(before, names.iter().copied(), timestamp)?
        .into_iter()
        .filter(|m| !current.contains(&m.key))
        .map(|m| Metric { value: 0.0, ..m })
        .collect();
    metrics.extend(stale);
    Ok(metrics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::codec::append_assessments;
    use crate::table::TableName;

    fn table(rows: Vec<Assessment>) -> Table {
        let mut t = Table::empty(TableName::Assessments);
        let rows: Vec<Assessment> = rows
            .into_iter()
            .enumerate()
            .map(|(i, a)| a.with_evaluation_id(format!("e{}", i)))
            .collect();
        append_assessments(&mut t, &rows);
        t
    }

    fn find<'m>(metrics: &'m [Metric], key: &str) -> &'m Metric {
        metrics
            .iter()
            .find(|m| m.key == key)
            .unwrap_or_else(|| panic!("missing metric {key}"))
    }

    #[test]
    fn boolean_ratio_two_of_three() {
        let judge = AssessmentSource::ai_judge("judge-v1");
        let t = table(vec![
            Assessment::new("safe", judge.clone(), true),
            Assessment::new("safe", judge.clone(), false),
            Assessment::new("safe", judge.clone(), true),
        ]);
        let groups = compute_assessment_stats_by_source(&t, "safe").unwrap();
        assert_eq!(groups.len(), 1);
        let metrics = groups[&judge].to_metrics(7);
        assert_eq!(find(&metrics, "safe/AI_JUDGE/judge-v1/count").value, 3.0);
        assert_eq!(
            find(&metrics, "safe/AI_JUDGE/judge-v1/true_ratio").value,
            2.0 / 3.0
        );
        assert_eq!(find(&metrics, "safe/AI_JUDGE/judge-v1/false_count").value, 1.0);
        assert!(metrics.iter().all(|m| m.step == 0 && m.timestamp == 7));
    }

    #[test]
    fn numeric_summary_per_source() {
        let a = AssessmentSource::human("a");
        let b = AssessmentSource::human("b");
        let t = table(vec![
            Assessment::new("score", a.clone(), 1.0),
            Assessment::new("score", a.clone(), 3.0),
            Assessment::new("score", b.clone(), 10.0),
            Assessment::new("other", a.clone(), 99.0),
        ]);
        let groups = compute_assessment_stats_by_source(&t, "score").unwrap();
        assert_eq!(groups.len(), 2);
        let sa = &groups[&a];
        assert_eq!(sa.count, 2);
        assert_eq!(sa.mean(), Some(2.0));
        assert_eq!(sa.min(), Some(1.0));
        assert_eq!(sa.max(), Some(3.0));
        assert_eq!(sa.stddev(), Some(1.0));
        assert_eq!(groups[&b].stddev(), Some(0.0));
    }

    #[test]
    fn string_values_are_counted() {
        let c = AssessmentSource::code("classifier");
        let t = table(vec![
            Assessment::new("tone", c.clone(), "polite"),
            Assessment::new("tone", c.clone(), "rude"),
            Assessment::new("tone", c.clone(), "polite"),
        ]);
        let metrics = stats_metrics_for_names(&t, ["tone"], 0).unwrap();
        assert_eq!(find(&metrics, "tone/CODE/classifier/distinct_count").value, 2.0);
        assert_eq!(
            find(&metrics, "tone/CODE/classifier/value/polite/count").value,
            2.0
        );
        assert!(metrics.iter().all(|m| !m.key.ends_with("/mean")));
    }

    #[test]
    fn keys_are_deterministic_and_names_deduplicated() {
        let s = AssessmentSource::human("h");
        let t = table(vec![Assessment::new("x", s, true)]);
        let first = stats_metrics_for_names(&t, ["x", "x"], 5).unwrap();
        let second = stats_metrics_for_names(&t, ["x"], 5).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn string_value_that_leaves_a_group_is_zeroed() {
        let c = AssessmentSource::code("classifier");
        let before = table(vec![Assessment::new("tone", c.clone(), "polite")]);
        let after = table(vec![Assessment::new("tone", c, "rude")]);
        let metrics = restated_stats_metrics(&before, &after, ["tone"], 3).unwrap();
        assert_eq!(find(&metrics, "tone/CODE/classifier/count").value, 1.0);
        assert_eq!(find(&metrics, "tone/CODE/classifier/value/rude/count").value, 1.0);
        assert_eq!(find(&metrics, "tone/CODE/classifier/value/polite/count").value, 0.0);
        let polite = metrics
            .iter()
            .filter(|m| m.key.ends_with("/value/polite/count"))
            .count();
        assert_eq!(polite, 1);
    }

    #[test]
    fn unchanged_groups_restate_without_zeroes() {
        let s = AssessmentSource::human("h");
        let t = table(vec![Assessment::new("x", s, 2.0)]);
        let restated = restated_stats_metrics(&t, &t, ["x"], 1).unwrap();
        assert_eq!(restated, stats_metrics_for_names(&t, ["x"], 1).unwrap());
    }

    #[test]
    fn unknown_name_yields_nothing() {
        let t = table(vec![]);
        assert!(compute_assessment_stats_by_source(&t, "nope")
            .unwrap()
            .is_empty());
    }
}
