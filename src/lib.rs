pub mod analysis;
pub mod config;
pub mod error;
pub mod frame;
pub mod metrics;
pub mod pipeline;
pub mod repository;
pub mod schema;
pub mod source;
pub mod tables;
pub mod transform;

#[cfg(feature = "python")]
mod python;

pub use analysis::{H2hSummary, HeadToHead, PairingRule};
pub use config::{SourceConfig, TransformConfig};
pub use error::{Result, TrialError};
pub use pipeline::{DuplicateKeys, SkipReason, SkippedMetric, SkippedStep, TransformReport};
pub use repository::TrialRepository;
pub use source::{CsvDirectorySource, MemorySource, TableSource};
pub use tables::{TableName, TrialTables};
pub use transform::{TransformOutput, TrialDataTransformer};
