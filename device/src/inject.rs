//! Fault and latency injection for command queues.

use std::time::Duration;

use parking_lot::Mutex;

use crate::error::{Result, RuntimeSnafu};
use crate::queue::{CommandHook, CommandInfo};
use crate::sync::CommandKind;

/// What to do when a rule matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Injection {
    /// Sleep on the worker before executing.
    Delay(Duration),
    /// Fail the command on the worker instead of executing it.
    Fail(String),
    /// Refuse the submission synchronously.
    Reject(String),
}

#[derive(Debug, Clone)]
struct Rule {
    kind: CommandKind,
    ordinal: u64,
    injection: Injection,
}

/// [`CommandHook`] applying injections to specific commands.
///
/// Commands are addressed by kind and per-kind ordinal, e.g. the first
/// buffer read on the queue is `(ReadBuffer, 0)`.
#[derive(Debug, Default)]
pub struct InjectionHook {
    rules: Mutex<Vec<Rule>>,
}

impl InjectionHook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inject(self, kind: CommandKind, ordinal: u64, injection: Injection) -> Self {
        self.rules.lock().push(Rule { kind, ordinal, injection });
        self
    }

    fn matching(&self, info: &CommandInfo) -> Vec<Injection> {
        self.rules
            .lock()
            .iter()
            .filter(|rule| rule.kind == info.kind && rule.ordinal == info.ordinal)
            .map(|rule| rule.injection.clone())
            .collect()
    }
}

impl CommandHook for InjectionHook {
    fn on_submit(&self, info: &CommandInfo) -> Result<()> {
        for injection in self.matching(info) {
            if let Injection::Reject(message) = injection {
                return RuntimeSnafu { message }.fail();
            }
        }
        Ok(())
    }

    fn before_execute(&self, info: &CommandInfo) -> Result<()> {
        for injection in self.matching(info) {
            match injection {
                Injection::Delay(duration) => std::thread::sleep(duration),
                Injection::Fail(message) => return RuntimeSnafu { message }.fail(),
                Injection::Reject(_) => {}
            }
        }
        Ok(())
    }
}
