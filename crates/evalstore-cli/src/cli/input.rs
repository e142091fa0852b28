use anyhow::Context;
use evalstore_core::{StoreError, StoreResult};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::Path;

/// Parses `path` as YAML when its extension is `yaml`/`yml`, JSON otherwise.
pub fn read_document<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let is_yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    );
    if is_yaml {
        serde_yaml::from_str(&raw).with_context(|| format!("failed to parse YAML {}", path.display()))
    } else {
        serde_json::from_str(&raw).with_context(|| format!("failed to parse JSON {}", path.display()))
    }
}

/// Decodes a document holding either one item or a list of them.
///
/// Item errors are reported against their position in the list.
pub fn decode_items<T: DeserializeOwned>(doc: Value) -> StoreResult<Vec<T>> {
    match doc {
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(pos, item)| {
                serde_json::from_value(item)
                    .map_err(|e| StoreError::invalid(format!("item {}: {}", pos, e)))
            })
            .collect(),
        item => serde_json::from_value(item)
            .map(|one| vec![one])
            .map_err(|e| StoreError::invalid(e.to_string())),
    }
}
