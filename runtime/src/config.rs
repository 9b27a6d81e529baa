//! Pipeline configuration.
//!
//! Typed configuration with a bon builder and environment variable fallbacks.

use std::time::Duration;

use bon::bon;
use snafu::ensure;

use crate::error::{InvalidConfigSnafu, Result};

/// Largest supported number of slots per role.
pub const MAX_SLOTS: usize = 16;

/// Configuration of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Buffer slots per role (k). 2 gives classic double buffering.
    pub slots: usize,
    /// Rows of A carried by each chunk.
    pub rows_per_chunk: usize,
    /// Per-handle wait deadline. `None` waits forever.
    pub wait_timeout: Option<Duration>,
    /// Log every completed operation.
    pub trace_events: bool,
    /// Queue name used in completion log lines.
    pub queue_name: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[bon]
impl PipelineConfig {
    #[builder]
    pub fn new(
        #[builder(default = 2)] slots: usize,
        #[builder(default = 1)] rows_per_chunk: usize,
        wait_timeout: Option<Duration>,
        #[builder(default = false)] trace_events: bool,
        #[builder(default = String::from("ooo_queue"))] queue_name: String,
    ) -> Self {
        Self { slots, rows_per_chunk, wait_timeout, trace_events, queue_name }
    }

    /// Create configuration from environment variables.
    ///
    /// Unset or unparsable variables keep their defaults.
    ///
    /// # Environment Variables
    ///
    /// * `TANDEM_SLOTS` - Slots per role (default: 2)
    /// * `TANDEM_ROWS_PER_CHUNK` - Rows per chunk (default: 1)
    /// * `TANDEM_WAIT_TIMEOUT_MS` - Per-handle deadline, 0 disables (default: 0)
    /// * `TANDEM_TRACE_EVENTS` - Log completed operations if set
    pub fn from_env() -> Self {
        let slots = std::env::var("TANDEM_SLOTS").ok().and_then(|s| s.parse().ok()).unwrap_or(2);
        let rows_per_chunk = std::env::var("TANDEM_ROWS_PER_CHUNK").ok().and_then(|s| s.parse().ok()).unwrap_or(1);
        let wait_timeout = std::env::var("TANDEM_WAIT_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|&ms| ms > 0)
            .map(Duration::from_millis);
        let trace_events = std::env::var("TANDEM_TRACE_EVENTS").is_ok();

        Self { slots, rows_per_chunk, wait_timeout, trace_events, queue_name: String::from("ooo_queue") }
    }

    /// Validate: slots 1..=16, rows_per_chunk ≥ 1, non-zero deadline.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            (1..=MAX_SLOTS).contains(&self.slots),
            InvalidConfigSnafu { reason: format!("slots must be 1..={MAX_SLOTS}, got {}", self.slots) }
        );
        ensure!(self.rows_per_chunk >= 1, InvalidConfigSnafu { reason: "rows_per_chunk must be at least 1" });
        ensure!(
            self.wait_timeout.is_none_or(|timeout| !timeout.is_zero()),
            InvalidConfigSnafu { reason: "wait_timeout must be positive when set" }
        );
        Ok(())
    }
}
