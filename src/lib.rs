pub mod catalog;
pub mod error;
pub mod extract;
pub mod heads;
pub mod long_table;
pub mod merge;
pub mod operators;
pub mod pipeline;
pub mod polarity;
pub mod report;
pub mod reshape;
pub mod schema;
pub mod sentiment;
pub mod time;
pub mod wind;
pub mod workbook;

pub use catalog::ConfigCatalog;
pub use error::{PipelineError, QueryError, Result};
pub use long_table::LongTable;
pub use operators::{OperatorEngine, OperatorKind, OperatorRequest, Outcome, OutputVariant};
pub use polarity::{Polarity, PolarityConfig, RankingSentimentPolicy};
pub use sentiment::Sentiment;
