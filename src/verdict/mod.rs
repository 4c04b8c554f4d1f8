pub mod aggregator;
pub mod types;

pub use aggregator::{VerdictAggregator, topic_for};
pub use types::{Flag, ReasoningNarrative, Report, VerdictLabel};
