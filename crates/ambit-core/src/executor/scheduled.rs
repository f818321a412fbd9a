//! Scheduling on top of the contextual executor: one-shot delays, fixed
//! rate/delay loops, and trigger-driven schedules.
//!
//! Trigger schedules never use a fixed-rate loop: every occurrence is an
//! individually computed one-shot sleep, which is what lets a trigger adapt
//! its cadence and skip runs without drifting.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::{Notify, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::context::listener::{TaskListener, wrap_listener};
use crate::context::task::{ContextualTask, TaskConfig, UNNAMED_TASK, notify_abandoned};
use crate::context::trigger::{ContextualTrigger, LastExecution, Trigger};
use crate::context::{Context, ContextConfiguration};
use crate::error::{Cancelled, Incomplete, Rejected, Skipped, TaskResult, failure};

use super::managed::{ContextualExecutor, TaskHandle};
use super::raw::RawExecutor;

/// Handle to a fixed-rate or fixed-delay schedule.
pub struct ScheduledHandle {
    cancel_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl ScheduledHandle {
    /// Stops the schedule before its next occurrence. The task's listener is
    /// told that occurrence was cancelled.
    pub fn cancel(&self) {
        let _ = self.cancel_tx.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel_tx.borrow()
    }

    /// Waits for the schedule loop to exit.
    pub async fn stopped(self) {
        let _ = self.join.await;
    }
}

/// Snapshot of a trigger schedule's progress.
#[derive(Clone)]
pub struct TriggerStatus<T> {
    pub runs: u64,
    pub skips: u64,
    pub last_result: Option<TaskResult<T>>,
    pub terminated: bool,
}

impl<T> Default for TriggerStatus<T> {
    fn default() -> Self {
        Self {
            runs: 0,
            skips: 0,
            last_result: None,
            terminated: false,
        }
    }
}

/// Handle to a trigger-driven schedule.
pub struct TriggerHandle<T> {
    cancel_tx: watch::Sender<bool>,
    status_rx: watch::Receiver<TriggerStatus<T>>,
    join: JoinHandle<()>,
}

impl<T: Clone> TriggerHandle<T> {
    /// Stops the schedule before its next occurrence. A body that is already
    /// running finishes first; the listener is told the pending occurrence was
    /// cancelled.
    pub fn cancel(&self) {
        let _ = self.cancel_tx.send(true);
    }

    pub fn status(&self) -> TriggerStatus<T> {
        self.status_rx.borrow().clone()
    }

    /// Whether the schedule reached its terminal state (trigger returned no
    /// further run time, or it was cancelled).
    pub fn is_terminated(&self) -> bool {
        self.status_rx.borrow().terminated
    }

    /// Outcome of the most recent occurrence; `Err(Skipped)` for a skipped
    /// one.
    pub fn last_result(&self) -> Option<TaskResult<T>> {
        self.status_rx.borrow().last_result.clone()
    }

    pub async fn terminated(&mut self) {
        let _ = self.status_rx.wait_for(|status| status.terminated).await;
    }

    /// Waits for the schedule loop itself to exit.
    pub async fn stopped(self) {
        let _ = self.join.await;
    }
}

/// Contextual executor with scheduling support.
///
/// Composes a [`ContextualExecutor`]; all one-shot submission operations and
/// lifecycle pass-through live there, reachable via
/// [`ContextualScheduledExecutor::executor`].
pub struct ContextualScheduledExecutor {
    executor: ContextualExecutor,
}

impl ContextualScheduledExecutor {
    pub fn new(
        delegate: Arc<dyn RawExecutor>,
        config: Option<Arc<dyn ContextConfiguration>>,
    ) -> Self {
        Self {
            executor: ContextualExecutor::new(delegate, config),
        }
    }

    pub fn executor(&self) -> &ContextualExecutor {
        &self.executor
    }

    /// Runs `task` once after `delay`. Context is captured now, on the
    /// scheduling thread.
    pub fn schedule_after<T, F>(&self, delay: Duration, task: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: FnOnce() -> TaskResult<T> + Send + 'static,
    {
        self.schedule_after_with(delay, TaskConfig::new(), task)
    }

    pub fn schedule_after_with<T, F>(
        &self,
        delay: Duration,
        task_config: TaskConfig,
        task: F,
    ) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: FnOnce() -> TaskResult<T> + Send + 'static,
    {
        let wrapped = ContextualTask::wrap(task, self.executor.config_ref(), &task_config);
        wrapped.notify_submitted();

        let (tx, rx) = oneshot::channel();
        let cancelled = Arc::new(AtomicBool::new(false));
        let cancel_notify = Arc::new(Notify::new());
        let flag = Arc::clone(&cancelled);
        let notify = Arc::clone(&cancel_notify);
        let delegate = Arc::clone(self.executor.delegate());

        tokio::spawn(async move {
            let fired = tokio::select! {
                _ = tokio::time::sleep(delay) => true,
                _ = notify.notified() => false,
            };
            if !fired || flag.load(Ordering::SeqCst) {
                wrapped.notify_cancelled();
                let _ = tx.send(Err(failure(Cancelled)));
                return;
            }
            let listener = wrapped.listener().cloned();
            let name = wrapped.name().to_owned();
            let pool = Arc::clone(&delegate);
            let (done_tx, done_rx) = oneshot::channel();
            let spawned = delegate.spawn(Box::new(move || {
                let result = if flag.load(Ordering::SeqCst) || pool.is_shutdown_now() {
                    wrapped.notify_cancelled();
                    Err(failure(Cancelled))
                } else {
                    wrapped.run()
                };
                let _ = done_tx.send(result);
            }));
            let result = match spawned {
                Ok(()) => done_rx.await.unwrap_or_else(|_| Err(failure(Incomplete))),
                Err(_) => {
                    // The delegate shut down during the delay window.
                    notify_abandoned(listener.as_ref(), &name, failure(Rejected));
                    Err(failure(Rejected))
                }
            };
            let _ = tx.send(result);
        });

        TaskHandle::new(rx, cancelled, cancel_notify)
    }

    /// Runs `task` every `period`, measured start to start, after `initial`.
    pub fn schedule_at_fixed_rate<F>(
        &self,
        initial: Duration,
        period: Duration,
        task_config: TaskConfig,
        task: F,
    ) -> ScheduledHandle
    where
        F: Fn() -> TaskResult<()> + Send + Sync + 'static,
    {
        self.recurring(initial, period, false, task_config, task)
    }

    /// Runs `task` with `delay` between the end of one run and the start of
    /// the next, after `initial`.
    pub fn schedule_with_fixed_delay<F>(
        &self,
        initial: Duration,
        delay: Duration,
        task_config: TaskConfig,
        task: F,
    ) -> ScheduledHandle
    where
        F: Fn() -> TaskResult<()> + Send + Sync + 'static,
    {
        self.recurring(initial, delay, true, task_config, task)
    }

    fn recurring<F>(
        &self,
        initial: Duration,
        interval: Duration,
        wait_for_completion: bool,
        task_config: TaskConfig,
        task: F,
    ) -> ScheduledHandle
    where
        F: Fn() -> TaskResult<()> + Send + Sync + 'static,
    {
        // Context and listener captured once, at scheduling time.
        let context = self
            .executor
            .config_ref()
            .map(|c| c.new_task_context(task_config.name()));
        let listener = wrap_listener(self.executor.config_ref(), &task_config);
        let name = task_config.name().map(str::to_owned);
        let task: Arc<dyn Fn() -> TaskResult<()> + Send + Sync> = Arc::new(task);
        let delegate = Arc::clone(self.executor.delegate());

        let (cancel_tx, mut cancel_rx) = watch::channel(false);
        let join = tokio::spawn(async move {
            let mut next = tokio::time::Instant::now() + initial;
            loop {
                if *cancel_rx.borrow() {
                    notify_abandoned(
                        listener.as_ref(),
                        name.as_deref().unwrap_or(UNNAMED_TASK),
                        failure(Cancelled),
                    );
                    break;
                }
                tokio::select! {
                    _ = cancel_rx.changed() => continue,
                    _ = tokio::time::sleep_until(next) => {}
                }

                let Some(receiver) =
                    spawn_occurrence(&delegate, &task, &context, &name, &listener)
                else {
                    break;
                };
                if wait_for_completion {
                    let _ = receiver.await;
                    next = tokio::time::Instant::now() + interval;
                } else {
                    next += interval;
                }
            }
        });

        ScheduledHandle { cancel_tx, join }
    }

    /// Schedules `task` under the control of `trigger` (see module docs).
    pub fn schedule_with_trigger<T, F>(
        &self,
        trigger: Arc<dyn Trigger>,
        task_config: TaskConfig,
        task: F,
    ) -> TriggerHandle<T>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn() -> TaskResult<T> + Send + Sync + 'static,
    {
        let config = self.executor.config_ref();
        let context = config.map(|c| c.new_task_context(task_config.name()));
        let listener = wrap_listener(config, &task_config);
        let trigger = ContextualTrigger::wrap(trigger, config, task_config.name());
        let name = task_config
            .name()
            .unwrap_or(UNNAMED_TASK)
            .to_owned();
        let task: Arc<dyn Fn() -> TaskResult<T> + Send + Sync> = Arc::new(task);
        let delegate = Arc::clone(self.executor.delegate());

        let (cancel_tx, mut cancel_rx) = watch::channel(false);
        let (status_tx, status_rx) = watch::channel(TriggerStatus::<T>::default());

        let join = tokio::spawn(async move {
            let scheduled_start = Instant::now();
            let mut last: Option<LastExecution> = None;

            loop {
                if *cancel_rx.borrow() {
                    notify_abandoned(listener.as_ref(), &name, failure(Cancelled));
                    break;
                }
                let Some(next) = trigger.next_run_time(last.as_ref(), scheduled_start) else {
                    debug!(task = %name, "trigger returned no next run time, schedule ends");
                    break;
                };

                let delay = next.saturating_duration_since(Instant::now());
                tokio::select! {
                    _ = cancel_rx.changed() => continue,
                    _ = tokio::time::sleep(delay) => {}
                }

                if trigger.skip_run(last.as_ref(), next) {
                    trace!(task = %name, "occurrence skipped by trigger");
                    last = Some(LastExecution::skipped_run(name.clone(), next));
                    if let Some(listener) = &listener {
                        let skipped = failure(Skipped);
                        listener.task_aborted(&name, &skipped);
                        listener.task_done(&name, Some(&skipped));
                    }
                    status_tx.send_modify(|status| {
                        status.skips += 1;
                        status.last_result = Some(Err(failure(Skipped)));
                    });
                    continue;
                }

                let started_at = Instant::now();
                let (tx, rx) = oneshot::channel();
                let body = Arc::clone(&task);
                let occurrence = ContextualTask::from_parts(
                    Box::new(move || (body)()),
                    context.clone(),
                    Some(name.clone()),
                    listener.clone(),
                );
                occurrence.notify_submitted();
                if delegate
                    .spawn(Box::new(move || {
                        let _ = tx.send(occurrence.run());
                    }))
                    .is_err()
                {
                    debug!(task = %name, "delegate rejected occurrence, schedule ends");
                    notify_abandoned(listener.as_ref(), &name, failure(Rejected));
                    break;
                }

                let result = rx.await.unwrap_or_else(|_| Err(failure(Incomplete)));
                let ended_at = Instant::now();
                let recorded = result
                    .as_ref()
                    .ok()
                    .map(|value| Arc::new(value.clone()) as Arc<dyn std::any::Any + Send + Sync>);
                last = Some(LastExecution::completed(
                    name.clone(),
                    recorded,
                    next,
                    started_at,
                    ended_at,
                ));
                status_tx.send_modify(|status| {
                    status.runs += 1;
                    status.last_result = Some(result);
                });
            }

            status_tx.send_modify(|status| status.terminated = true);
        });

        TriggerHandle {
            cancel_tx,
            status_rx,
            join,
        }
    }
}

/// Spawns one recurring occurrence on the delegate; `None` when the delegate
/// rejects it.
fn spawn_occurrence(
    delegate: &Arc<dyn RawExecutor>,
    task: &Arc<dyn Fn() -> TaskResult<()> + Send + Sync>,
    context: &Option<Context>,
    name: &Option<String>,
    listener: &Option<Arc<dyn TaskListener>>,
) -> Option<oneshot::Receiver<TaskResult<()>>> {
    let (tx, rx) = oneshot::channel();
    let body = Arc::clone(task);
    let occurrence = ContextualTask::from_parts(
        Box::new(move || (body)()),
        context.clone(),
        name.clone(),
        listener.clone(),
    );
    occurrence.notify_submitted();
    match delegate.spawn(Box::new(move || {
        let _ = tx.send(occurrence.run());
    })) {
        Ok(()) => Some(rx),
        Err(_) => {
            notify_abandoned(
                listener.as_ref(),
                name.as_deref().unwrap_or(UNNAMED_TASK),
                failure(Rejected),
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    use crate::context::current::current_context;
    use crate::context::probe::{CountingConfiguration, EventKind, RecordingListener};
    use crate::executor::raw::BlockingPool;

    fn scheduler(config: Option<Arc<dyn ContextConfiguration>>) -> ContextualScheduledExecutor {
        ContextualScheduledExecutor::new(Arc::new(BlockingPool::new()), config)
    }

    #[derive(Debug, thiserror::Error)]
    #[error("flaky")]
    struct Flaky;

    /// Trigger scripted with relative run offsets from the schedule start.
    struct ScriptedTrigger {
        offsets: Vec<Duration>,
        skip_pattern: Vec<bool>,
        calls: AtomicUsize,
        skip_calls: AtomicUsize,
    }

    impl ScriptedTrigger {
        fn new(offsets: Vec<Duration>, skip_pattern: Vec<bool>) -> Self {
            Self {
                offsets,
                skip_pattern,
                calls: AtomicUsize::new(0),
                skip_calls: AtomicUsize::new(0),
            }
        }
    }

    impl Trigger for ScriptedTrigger {
        fn next_run_time(
            &self,
            _last: Option<&LastExecution>,
            scheduled: Instant,
        ) -> Option<Instant> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            self.offsets.get(call).map(|offset| scheduled + *offset)
        }

        fn skip_run(&self, _last: Option<&LastExecution>, _scheduled_run: Instant) -> bool {
            let call = self.skip_calls.fetch_add(1, Ordering::SeqCst);
            self.skip_pattern.get(call).copied().unwrap_or(false)
        }
    }

    #[tokio::test]
    async fn schedule_after_runs_under_the_captured_context() {
        let config = Arc::new(CountingConfiguration::new("sched"));
        let scheduler = scheduler(Some(config.clone()));

        let handle = scheduler.schedule_after_with(
            Duration::from_millis(10),
            TaskConfig::new().named("delayed"),
            || {
                let active = current_context().expect("context during delayed run");
                assert_eq!(active.label(), "sched/task:delayed");
                Ok("done")
            },
        );
        let value = tokio::time::timeout(Duration::from_secs(2), handle.result())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(value, "done");
        // Captured at scheduling time, exactly once.
        assert_eq!(config.task_contexts(), 1);
    }

    #[tokio::test]
    async fn schedule_after_cancellation_resolves_immediately() {
        let scheduler = scheduler(None);
        let handle = scheduler.schedule_after(Duration::from_secs(30), || Ok(()));
        handle.cancel();
        let err = tokio::time::timeout(Duration::from_secs(1), handle.result())
            .await
            .expect("cancellation must not wait for the delay")
            .unwrap_err();
        assert!(err.downcast_ref::<Cancelled>().is_some());
    }

    #[tokio::test]
    async fn fixed_rate_runs_repeatedly_until_cancelled() {
        let scheduler = scheduler(None);
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);

        let handle = scheduler.schedule_at_fixed_rate(
            Duration::from_millis(5),
            Duration::from_millis(10),
            TaskConfig::new().named("tick"),
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
        );

        tokio::time::timeout(Duration::from_secs(2), async {
            while runs.load(Ordering::SeqCst) < 3 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("at least three occurrences");

        handle.cancel();
        handle.stopped().await;
        let after_cancel = runs.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(runs.load(Ordering::SeqCst), after_cancel);
    }

    #[tokio::test]
    async fn trigger_schedule_runs_once_then_terminates() {
        // End-to-end: first run at +10ms, then the trigger stops the schedule.
        let scheduler = scheduler(None);
        let trigger = Arc::new(ScriptedTrigger::new(
            vec![Duration::from_millis(10)],
            vec![],
        ));
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);

        let mut handle = scheduler.schedule_with_trigger(
            trigger,
            TaskConfig::new().named("once"),
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(7u32)
            },
        );

        tokio::time::timeout(Duration::from_secs(2), handle.terminated())
            .await
            .expect("schedule terminates");
        assert!(handle.is_terminated());
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        let status = handle.status();
        assert_eq!(status.runs, 1);
        assert_eq!(status.skips, 0);
        assert_eq!(status.last_result.unwrap().unwrap(), 7);
    }

    #[tokio::test]
    async fn skipped_occurrences_advance_the_schedule_without_running() {
        let scheduler = scheduler(None);
        // Four occurrences, skipping the first and third.
        let trigger = Arc::new(ScriptedTrigger::new(
            vec![
                Duration::from_millis(5),
                Duration::from_millis(10),
                Duration::from_millis(15),
                Duration::from_millis(20),
            ],
            vec![true, false, true, false],
        ));
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);

        let mut handle = scheduler.schedule_with_trigger(
            trigger,
            TaskConfig::new().named("alternating"),
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
        );

        tokio::time::timeout(Duration::from_secs(2), handle.terminated())
            .await
            .expect("schedule terminates");

        let status = handle.status();
        assert_eq!(status.runs, 2);
        assert_eq!(status.skips, 2);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn a_failing_occurrence_does_not_terminate_the_schedule() {
        let scheduler = scheduler(None);
        let trigger = Arc::new(ScriptedTrigger::new(
            vec![Duration::from_millis(5), Duration::from_millis(10)],
            vec![],
        ));
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);

        let mut handle = scheduler.schedule_with_trigger(
            trigger,
            TaskConfig::new().named("flaky"),
            move || {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(failure(Flaky))
                } else {
                    Ok(())
                }
            },
        );

        tokio::time::timeout(Duration::from_secs(2), handle.terminated())
            .await
            .expect("schedule terminates");

        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        let status = handle.status();
        assert_eq!(status.runs, 2);
        assert!(status.last_result.unwrap().is_ok());
    }

    #[tokio::test]
    async fn cancelling_a_recurring_schedule_notifies_the_listener() {
        let recorder = Arc::new(RecordingListener::default());
        let scheduler = scheduler(None);
        let handle = scheduler.schedule_at_fixed_rate(
            Duration::from_secs(60),
            Duration::from_secs(60),
            TaskConfig::new()
                .named("dormant")
                .with_listener(recorder.clone() as Arc<dyn TaskListener>),
            || Ok(()),
        );

        handle.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle.stopped())
            .await
            .expect("cancellation must not wait for the first occurrence");

        let events = recorder.events();
        let kinds: Vec<EventKind> = events.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![EventKind::Aborted, EventKind::Done]);
        assert!(events.iter().all(|e| e.task == "dormant"));
        let cause = events[0].failure.clone().unwrap();
        assert!(cause.downcast_ref::<Cancelled>().is_some());
    }

    #[tokio::test]
    async fn cancelling_a_trigger_schedule_notifies_the_listener() {
        let recorder = Arc::new(RecordingListener::default());
        let scheduler = scheduler(None);
        let trigger = Arc::new(ScriptedTrigger::new(vec![Duration::from_secs(60)], vec![]));

        let mut handle = scheduler.schedule_with_trigger(
            trigger,
            TaskConfig::new()
                .named("idle")
                .with_listener(recorder.clone() as Arc<dyn TaskListener>),
            || Ok(()),
        );

        handle.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle.terminated())
            .await
            .expect("cancellation terminates promptly");

        let events = recorder.events();
        let kinds: Vec<EventKind> = events.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![EventKind::Aborted, EventKind::Done]);
        assert!(events.iter().all(|e| e.task == "idle"));
        let cause = events[0].failure.clone().unwrap();
        assert!(cause.downcast_ref::<Cancelled>().is_some());
    }

    #[tokio::test]
    async fn shutdown_during_the_delay_surfaces_rejection() {
        let pool = Arc::new(BlockingPool::new());
        let scheduler = ContextualScheduledExecutor::new(pool.clone(), None);

        let handle = scheduler.schedule_after(Duration::from_millis(20), || Ok(()));
        pool.shutdown();

        let err = tokio::time::timeout(Duration::from_secs(1), handle.result())
            .await
            .unwrap()
            .unwrap_err();
        assert!(err.downcast_ref::<Rejected>().is_some());
    }

    #[tokio::test]
    async fn trigger_receives_the_previous_execution_record() {
        let scheduler = scheduler(None);

        struct RecordingTrigger {
            seen: Mutex<Vec<Option<(bool, Option<u32>)>>>,
        }

        impl Trigger for RecordingTrigger {
            fn next_run_time(
                &self,
                last: Option<&LastExecution>,
                scheduled: Instant,
            ) -> Option<Instant> {
                let mut seen = self.seen.lock().unwrap();
                seen.push(last.map(|l| (l.skipped(), l.result_as::<u32>().copied())));
                if seen.len() <= 2 {
                    Some(scheduled + Duration::from_millis(5 * seen.len() as u64))
                } else {
                    None
                }
            }
        }

        let trigger = Arc::new(RecordingTrigger {
            seen: Mutex::new(Vec::new()),
        });
        let mut handle = scheduler.schedule_with_trigger(
            Arc::clone(&trigger) as Arc<dyn Trigger>,
            TaskConfig::new().named("recorded"),
            || Ok(11u32),
        );

        tokio::time::timeout(Duration::from_secs(2), handle.terminated())
            .await
            .expect("schedule terminates");

        let seen = trigger.seen.lock().unwrap().clone();
        // First decision has no history; later ones see the completed run.
        assert_eq!(seen[0], None);
        assert_eq!(seen[1], Some((false, Some(11))));
        assert_eq!(seen[2], Some((false, Some(11))));
    }
}
