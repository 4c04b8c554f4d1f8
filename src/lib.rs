pub mod classify;
pub mod config;
pub mod document;
pub mod logging;
pub mod orchestrator;
pub mod pipeline;
pub mod progress;
pub mod reasoning;
pub mod registry;
pub mod storage;
pub mod verdict;

pub use classify::PipelineKind;
pub use config::OrchestratorConfig;
pub use document::Document;
pub use orchestrator::Orchestrator;
pub use progress::{EventStatus, ProgressEvent, Step};
pub use registry::{FailureKind, TaskStatus};
pub use storage::{InMemoryReportStore, ReportStore};
pub use verdict::{Report, VerdictLabel};
