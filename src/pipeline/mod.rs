pub mod error;
pub mod ports;
pub mod runner;
pub mod stages;
pub mod types;

pub use error::{PipelineError, PipelineErrorKind, StageFault, StageFaultKind};
pub use ports::AnalysisStage;
pub use runner::PipelineRunner;
pub use types::{Finding, PipelineOutcome, Severity, StageOutput, StageReport};
