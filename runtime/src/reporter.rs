//! Completion reporting.
//!
//! The [`CompletionReporter`] observes operations as they settle and
//! collects timing records. It never blocks the driver: records are pushed
//! from completion callbacks into an unbounded channel and read afterwards.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, unbounded};
use tandem_device::{CommandKind, CommandStatus, Event};
use tracing::info;

use crate::tracker::{Handle, OpKind};

/// Outcome and timing of one settled operation.
#[derive(Debug, Clone)]
pub struct CompletionRecord {
    pub handle: u64,
    pub op: OpKind,
    pub chunk: Option<usize>,
    pub kind: CommandKind,
    pub status: CommandStatus,
    pub started: Option<Instant>,
    pub ended: Option<Instant>,
    /// Time between submission and start of execution.
    pub queued_to_start: Option<Duration>,
    /// Execution time on the accelerator.
    pub duration: Option<Duration>,
}

impl CompletionRecord {
    pub fn is_failed(&self) -> bool {
        matches!(self.status, CommandStatus::Failed(_))
    }
}

#[derive(Debug)]
pub struct CompletionReporter {
    queue_name: String,
    trace_events: bool,
    sender: Sender<CompletionRecord>,
    receiver: Receiver<CompletionRecord>,
}

impl CompletionReporter {
    pub fn new(queue_name: impl Into<String>, trace_events: bool) -> Self {
        let (sender, receiver) = unbounded();
        Self { queue_name: queue_name.into(), trace_events, sender, receiver }
    }

    /// Record `event` once it settles, on behalf of `handle`.
    pub fn observe(&self, handle: &Handle, event: &Event) {
        let sender = self.sender.clone();
        let queue_name = self.queue_name.clone();
        let trace_events = self.trace_events;
        let (id, op, chunk) = (handle.id(), handle.op(), handle.chunk());

        event.on_complete(move |event| {
            let status = event.status();
            let profile = event.profile();
            if trace_events {
                info!("[{queue_name}]: {} {}", status.label(), event.kind());
            }

            let record = CompletionRecord {
                handle: id,
                op,
                chunk,
                kind: event.kind(),
                status,
                started: profile.started,
                ended: profile.ended,
                queued_to_start: profile.queued_to_start(),
                duration: profile.duration(),
            };
            // The reporter may already be gone when late commands settle.
            let _ = sender.send(record);
        });
    }

    /// Take every record collected so far.
    pub fn take(&self) -> Vec<CompletionRecord> {
        self.receiver.try_iter().collect()
    }
}

/// Totals for one kind of operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpStats {
    pub count: usize,
    pub failed: usize,
    pub busy: Duration,
}

/// Aggregate view over a set of completion records.
#[derive(Debug, Clone, Default)]
pub struct Summary {
    pub ops: HashMap<OpKind, OpStats>,
    /// From the first start to the last end across all records.
    pub span: Option<Duration>,
}

impl Summary {
    pub fn from_records(records: &[CompletionRecord]) -> Self {
        let mut ops: HashMap<OpKind, OpStats> = HashMap::new();
        for record in records {
            let stats = ops.entry(record.op).or_default();
            stats.count += 1;
            stats.failed += usize::from(record.is_failed());
            stats.busy += record.duration.unwrap_or_default();
        }

        let first = records.iter().filter_map(|r| r.started).min();
        let last = records.iter().filter_map(|r| r.ended).max();
        let span = first.zip(last).map(|(first, last)| last.saturating_duration_since(first));

        Self { ops, span }
    }

    pub fn stats(&self, op: OpKind) -> OpStats {
        self.ops.get(&op).copied().unwrap_or_default()
    }

    pub fn total(&self) -> usize {
        self.ops.values().map(|s| s.count).sum()
    }

    /// Sum of per-operation busy time divided by the wall-clock span.
    ///
    /// Above 1.0 means operations overlapped.
    pub fn overlap(&self) -> Option<f64> {
        let span = self.span?.as_secs_f64();
        let busy: f64 = self.ops.values().map(|s| s.busy.as_secs_f64()).sum();
        (span > 0.0).then(|| busy / span)
    }
}
