//! Free-text questions over a tabular dataset: profile it, classify the question,
//! run one statistical routine and describe the result in plain language.

#[macro_use]
pub mod macros;

pub mod error;
pub mod config;
pub mod stats;
pub mod dataset;
pub mod profile;
pub mod resolver;
pub mod intent;
pub mod charts;
pub mod analysis;
pub mod narrative;
pub mod insights;
pub mod dashboard;
pub mod assistant;
pub mod engine;
pub mod explain;
pub mod server;

pub use analysis::{AnalysisResult, Statistics};
pub use assistant::AssistantAnswer;
pub use charts::{ChartRenderer, ChartSpec, PlotlyHtmlRenderer};
pub use config::{EngineConfig, ServiceConfig};
pub use dashboard::{AnalyticsDashboard, ComprehensiveStatistics};
pub use dataset::{ColumnKind, Dataset, LoadRequest};
pub use engine::{Engine, HistoryEntry, LoadOutcome};
pub use error::EngineError;
pub use insights::InsightsDocument;
pub use intent::{classify, Classification, Intent};
pub use profile::DatasetProfile;
