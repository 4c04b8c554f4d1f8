//! Service configuration.
//!
//! Every knob carries a serde default so a host can deserialize a partial
//! document (or none at all) and still get a working orchestrator.

use serde::{Deserialize, Serialize};

use crate::classify::PipelineKind;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrchestratorConfig {
    #[serde(default)]
    pub progress: ProgressConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub reasoning: ReasoningConfig,
    #[serde(default)]
    pub verdict: VerdictConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Hard ceiling on one task's wall-clock lifetime, classification
    /// through verdict. The watchdog forces the task to ERROR past this.
    #[serde(default = "default_watchdog_ceiling_ms")]
    pub watchdog_ceiling_ms: u64,
    /// How long a terminal task survives without a delivery confirmation.
    #[serde(default = "default_task_ttl_ms")]
    pub task_ttl_ms: u64,
    #[serde(default = "default_janitor_interval_ms")]
    pub janitor_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProgressConfig {
    /// Live broadcast buffer per task; slow subscribers fall back to the
    /// authoritative log when they overrun it.
    #[serde(default = "default_live_buffer")]
    pub live_buffer: usize,
    /// Non-terminal events retained for replay before the oldest are evicted.
    #[serde(default = "default_replay_retention")]
    pub replay_retention: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    #[serde(default = "default_stage_timeout_ms")]
    pub stage_timeout_ms: u64,
    #[serde(default = "default_max_embedded_depth")]
    pub max_embedded_depth: u8,
    #[serde(default = "default_max_embedded_per_document")]
    pub max_embedded_per_document: usize,
    /// Local scores inside [low, high) are ambiguous and consult reasoning.
    #[serde(default = "default_ambiguous_band_low")]
    pub ambiguous_band_low: u8,
    #[serde(default = "default_ambiguous_band_high")]
    pub ambiguous_band_high: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReasoningConfig {
    #[serde(default = "default_reasoning_timeout_ms")]
    pub timeout_ms: u64,
    /// Pipelines that consult reasoning even when the local result is
    /// conclusive.
    #[serde(default = "default_always_consult")]
    pub always_consult: Vec<PipelineKind>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VerdictConfig {
    /// Trust scores below this are labelled tampered.
    #[serde(default = "default_suspicion_threshold")]
    pub suspicion_threshold: u8,
    /// Ceiling applied to the trust score once an integrity breach is proven.
    #[serde(default = "default_integrity_score_cap")]
    pub integrity_score_cap: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    #[serde(default = "default_log_dir")]
    pub dir: String,
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log files older than this many days are purged at startup.
    #[serde(default = "default_log_retention")]
    pub retention_days: usize,
}

impl OrchestratorConfig {
    /// Cross-field sanity checks that serde defaults alone cannot express.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.pipeline.ambiguous_band_low > self.pipeline.ambiguous_band_high {
            anyhow::bail!(
                "ambiguous band is inverted: low {} > high {}",
                self.pipeline.ambiguous_band_low,
                self.pipeline.ambiguous_band_high
            );
        }
        if self.verdict.integrity_score_cap >= self.verdict.suspicion_threshold {
            anyhow::bail!(
                "integrity score cap {} must stay below the suspicion threshold {}",
                self.verdict.integrity_score_cap,
                self.verdict.suspicion_threshold
            );
        }
        if self.watchdog_ceiling_ms == 0 {
            anyhow::bail!("watchdog ceiling must be positive");
        }
        Ok(())
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            progress: ProgressConfig::default(),
            pipeline: PipelineConfig::default(),
            reasoning: ReasoningConfig::default(),
            verdict: VerdictConfig::default(),
            logging: LoggingConfig::default(),
            watchdog_ceiling_ms: default_watchdog_ceiling_ms(),
            task_ttl_ms: default_task_ttl_ms(),
            janitor_interval_ms: default_janitor_interval_ms(),
        }
    }
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            live_buffer: default_live_buffer(),
            replay_retention: default_replay_retention(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stage_timeout_ms: default_stage_timeout_ms(),
            max_embedded_depth: default_max_embedded_depth(),
            max_embedded_per_document: default_max_embedded_per_document(),
            ambiguous_band_low: default_ambiguous_band_low(),
            ambiguous_band_high: default_ambiguous_band_high(),
        }
    }
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_reasoning_timeout_ms(),
            always_consult: default_always_consult(),
        }
    }
}

impl Default for VerdictConfig {
    fn default() -> Self {
        Self {
            suspicion_threshold: default_suspicion_threshold(),
            integrity_score_cap: default_integrity_score_cap(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: default_log_dir(),
            level: default_log_level(),
            retention_days: default_log_retention(),
        }
    }
}

fn default_watchdog_ceiling_ms() -> u64 {
    120_000
}

fn default_task_ttl_ms() -> u64 {
    900_000
}

fn default_janitor_interval_ms() -> u64 {
    60_000
}

fn default_live_buffer() -> usize {
    64
}

fn default_replay_retention() -> usize {
    1024
}

fn default_stage_timeout_ms() -> u64 {
    30_000
}

fn default_max_embedded_depth() -> u8 {
    2
}

fn default_max_embedded_per_document() -> usize {
    3
}

fn default_ambiguous_band_low() -> u8 {
    50
}

fn default_ambiguous_band_high() -> u8 {
    70
}

fn default_reasoning_timeout_ms() -> u64 {
    30_000
}

fn default_always_consult() -> Vec<PipelineKind> {
    vec![PipelineKind::HybridWithEmbeddedImages]
}

fn default_suspicion_threshold() -> u8 {
    70
}

fn default_integrity_score_cap() -> u8 {
    25
}

fn default_log_dir() -> String {
    "logs".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_retention() -> usize {
    7
}
