//! Triggers for recurring schedules and the record of the last occurrence.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use super::config::{Context, ContextConfiguration};
use super::current::ContextGuard;

/// Policy deciding when (and whether) the next occurrence of a recurring task
/// runs.
///
/// `next_run_time` receives the record of the most recent occurrence (`None`
/// before the first run) and the instant the schedule was created; returning
/// `None` terminates the schedule. `skip_run` is asked immediately before each
/// occurrence; a skipped occurrence still produces a [`LastExecution`] and
/// still advances the schedule.
pub trait Trigger: Send + Sync {
    fn next_run_time(&self, last: Option<&LastExecution>, scheduled: Instant) -> Option<Instant>;

    fn skip_run(&self, _last: Option<&LastExecution>, _scheduled_run: Instant) -> bool {
        false
    }
}

/// Read-only record of the most recent occurrence of a recurring task.
///
/// Only the latest record is retained per schedule; it exists solely as input
/// to the next trigger decision.
pub struct LastExecution {
    name: String,
    result: Option<Arc<dyn Any + Send + Sync>>,
    scheduled_run: Instant,
    started_at: Option<Instant>,
    ended_at: Option<Instant>,
    skipped: bool,
}

impl LastExecution {
    pub(crate) fn completed(
        name: String,
        result: Option<Arc<dyn Any + Send + Sync>>,
        scheduled_run: Instant,
        started_at: Instant,
        ended_at: Instant,
    ) -> Self {
        Self {
            name,
            result,
            scheduled_run,
            started_at: Some(started_at),
            ended_at: Some(ended_at),
            skipped: false,
        }
    }

    pub(crate) fn skipped_run(name: String, scheduled_run: Instant) -> Self {
        Self {
            name,
            result: None,
            scheduled_run,
            started_at: None,
            ended_at: None,
            skipped: true,
        }
    }

    /// Identity name of the task this occurrence belongs to.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The occurrence's produced value, if it ran and succeeded.
    pub fn result_as<T: Any>(&self) -> Option<&T> {
        self.result.as_ref()?.downcast_ref()
    }

    /// When the trigger scheduled this occurrence to run.
    pub fn scheduled_run(&self) -> Instant {
        self.scheduled_run
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<Instant> {
        self.ended_at
    }

    pub fn skipped(&self) -> bool {
        self.skipped
    }
}

impl fmt::Debug for LastExecution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LastExecution")
            .field("name", &self.name)
            .field("scheduled_run", &self.scheduled_run)
            .field("started_at", &self.started_at)
            .field("ended_at", &self.ended_at)
            .field("skipped", &self.skipped)
            .field("has_result", &self.result.is_some())
            .finish()
    }
}

/// Wraps a trigger so both decision points run under a captured context.
pub struct ContextualTrigger {
    inner: Arc<dyn Trigger>,
    context: Option<Context>,
}

impl ContextualTrigger {
    pub fn wrap(
        inner: Arc<dyn Trigger>,
        config: Option<&dyn ContextConfiguration>,
        task_name: Option<&str>,
    ) -> Self {
        Self {
            inner,
            context: config.map(|c| c.new_task_context(task_name)),
        }
    }
}

impl Trigger for ContextualTrigger {
    fn next_run_time(&self, last: Option<&LastExecution>, scheduled: Instant) -> Option<Instant> {
        let _guard = ContextGuard::install(self.context.as_ref());
        self.inner.next_run_time(last, scheduled)
    }

    fn skip_run(&self, last: Option<&LastExecution>, scheduled_run: Instant) -> bool {
        let _guard = ContextGuard::install(self.context.as_ref());
        self.inner.skip_run(last, scheduled_run)
    }
}
