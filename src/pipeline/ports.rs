use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    document::Document,
    pipeline::{error::StageFault, types::StageOutput},
    progress::ProgressStream,
};

/// One concrete analysis technique within a pipeline.
///
/// Stages are self-contained, run under bounded supervision (the runner
/// owns the deadline and the fault boundary), and may push progress events
/// and yield embedded sub-documents for recursive analysis. Each
/// implementation also declares the topic key and penalty weight its flags
/// carry in the merged verdict.
#[async_trait]
pub trait AnalysisStage: Send + Sync {
    /// Stable technique key used for topic normalization and logging.
    fn technique(&self) -> &'static str;

    /// Trust-score penalty per triggered flag when the external reasoning
    /// verdict is unavailable.
    fn penalty_weight(&self) -> u8;

    async fn run(
        &self,
        document: Arc<Document>,
        progress: Arc<ProgressStream>,
    ) -> Result<StageOutput, StageFault>;
}
