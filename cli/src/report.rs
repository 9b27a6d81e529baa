//! Timing comparison table.

use std::fmt;
use std::time::Duration;

const RULE: &str = "|-------------------------+-------------------------|";

/// Wall-clock times of the accelerator and the host reference.
#[derive(Debug, Clone)]
pub struct TimingReport {
    rows: Vec<(String, Duration)>,
    accelerator: Duration,
    cpu: Duration,
}

impl TimingReport {
    pub fn new(accelerator: Duration, cpu: Duration) -> Self {
        Self { rows: vec![("Accelerator".to_string(), accelerator), ("CPU".to_string(), cpu)], accelerator, cpu }
    }

    /// Extra row shown above the CPU time.
    pub fn with_row(mut self, label: impl Into<String>, time: Duration) -> Self {
        let at = self.rows.len() - 1;
        self.rows.insert(at, (label.into(), time));
        self
    }

    /// CPU time over accelerator time.
    pub fn speedup(&self) -> f64 {
        self.cpu.as_secs_f64() / self.accelerator.as_secs_f64()
    }
}

fn millis(time: Duration) -> f64 {
    time.as_secs_f64() * 1e3
}

impl fmt::Display for TimingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{RULE}")?;
        writeln!(f, "| {:<23} | {:>23} |", "Kernel", "Wall-Clock Time (ms)")?;
        writeln!(f, "{RULE}")?;
        for (label, time) in &self.rows {
            writeln!(f, "| {label:<23} | {:>20.6} ms |", millis(*time))?;
        }
        writeln!(f, "{RULE}")?;
        writeln!(f, "| {:<23} | {:>22.3}x |", "Speedup", self.speedup())?;
        writeln!(f, "{RULE}")?;
        writeln!(f, "Note: the accelerator is simulated on host threads; times show overlap, not device speed.")
    }
}
