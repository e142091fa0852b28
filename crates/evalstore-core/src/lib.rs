pub mod config;
pub mod errors;
pub mod fingerprint;
pub mod merge;
pub mod model;
pub mod stats;
pub mod storage;
pub mod store;
pub mod table;

pub use config::StoreConfig;
pub use errors::{StoreError, StoreResult};
pub use model::{
    Assessment, AssessmentSource, AssessmentValue, Evaluation, EvaluationRecord, FieldMap, Metric,
    SourceType, ValueType,
};
pub use store::EvaluationStore;
