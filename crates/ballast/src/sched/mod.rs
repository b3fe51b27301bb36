//! Cooperative low-priority scheduling for maintenance passes.
//!
//! Maintenance work (flattening oversized content) must never block the
//! interactive execution context for long. Callers hand a task to a
//! [`ScheduleStrategy`] and structure the work against a [`PassBudget`];
//! they never assume which strategy runs it. The preferred strategy defers
//! the task until the runtime is otherwise idle and gives it a time budget;
//! the fallback runs it inline under a fixed unit cap so it cannot stall
//! the interactive thread for more than a bounded number of operations.

use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::trace;

/// Work-unit cap for the synchronous fallback strategy.
pub const SYNC_FALLBACK_UNITS: usize = 50;

/// Time slice granted to an idle-scheduled task.
pub const IDLE_SLICE: Duration = Duration::from_millis(8);

/// A deferred maintenance task. Receives the budget it must respect.
pub type IdleTask = Box<dyn FnOnce(&mut PassBudget) + Send + 'static>;

// ── Budget ─────────────────────────────────────────────────────────

/// Per-invocation work budget: a deadline, a unit cap, or unlimited.
///
/// Tasks call [`consume`](Self::consume) before each unit of work and stop
/// as soon as it returns `false`. Work left over is not an error — the next
/// scheduled pass picks it up.
#[derive(Debug)]
pub struct PassBudget {
    deadline: Option<Instant>,
    max_units: Option<usize>,
    used: usize,
}

impl PassBudget {
    /// Budget that expires at `deadline` (idle strategy).
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            max_units: None,
            used: 0,
        }
    }

    /// Budget capped at `max` work units (fallback strategy).
    pub fn with_units(max: usize) -> Self {
        Self {
            deadline: None,
            max_units: Some(max),
            used: 0,
        }
    }

    /// Budget with no limit. Tests and one-shot CLI passes only.
    pub fn unlimited() -> Self {
        Self {
            deadline: None,
            max_units: None,
            used: 0,
        }
    }

    /// Try to take one unit of work. Returns `false` once the budget is
    /// exhausted; the task must stop then.
    pub fn consume(&mut self) -> bool {
        if let Some(deadline) = self.deadline
            && Instant::now() >= deadline
        {
            return false;
        }
        if let Some(max) = self.max_units
            && self.used >= max
        {
            return false;
        }
        self.used += 1;
        true
    }

    /// Units consumed so far.
    pub fn used(&self) -> usize {
        self.used
    }
}

// ── Strategies ─────────────────────────────────────────────────────

/// How a maintenance task gets run.
///
/// At most one task may be pending per strategy instance: scheduling while
/// one is pending supersedes it.
pub trait ScheduleStrategy: Send {
    fn schedule(&mut self, task: IdleTask);
}

/// Defer the task until the runtime is otherwise idle, then run it under a
/// time budget. A pending task is superseded by the next `schedule` call.
#[derive(Debug, Default)]
pub struct IdleStrategy {
    pending: Option<JoinHandle<()>>,
}

impl IdleStrategy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ScheduleStrategy for IdleStrategy {
    fn schedule(&mut self, task: IdleTask) {
        if let Some(previous) = self.pending.take() {
            trace!("superseding pending idle task");
            previous.abort();
        }
        let handle = tokio::spawn(async move {
            // Let everything already queued run first.
            tokio::task::yield_now().await;
            let mut budget = PassBudget::with_deadline(Instant::now() + IDLE_SLICE);
            task(&mut budget);
        });
        self.pending = Some(handle);
    }
}

/// Run the task immediately, capped at [`SYNC_FALLBACK_UNITS`] work units.
#[derive(Debug, Clone, Copy)]
pub struct ImmediateStrategy {
    max_units: usize,
}

impl Default for ImmediateStrategy {
    fn default() -> Self {
        Self {
            max_units: SYNC_FALLBACK_UNITS,
        }
    }
}

impl ImmediateStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the unit cap (tests).
    pub fn with_max_units(max_units: usize) -> Self {
        Self { max_units }
    }
}

impl ScheduleStrategy for ImmediateStrategy {
    fn schedule(&mut self, task: IdleTask) {
        let mut budget = PassBudget::with_units(self.max_units);
        task(&mut budget);
    }
}
