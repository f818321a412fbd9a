//! Test probes: a counting configuration and a recording listener.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::config::{Context, ContextConfiguration};
use super::current::current_context;
use super::listener::TaskListener;
use crate::error::TaskFailure;

/// A configuration producing labeled sentinel contexts and counting how many
/// of each kind were captured.
pub(crate) struct CountingConfiguration {
    name: &'static str,
    task: AtomicUsize,
    listener: AtomicUsize,
    proxy: AtomicUsize,
    thread: AtomicUsize,
}

impl CountingConfiguration {
    pub(crate) fn new(name: &'static str) -> Self {
        Self {
            name,
            task: AtomicUsize::new(0),
            listener: AtomicUsize::new(0),
            proxy: AtomicUsize::new(0),
            thread: AtomicUsize::new(0),
        }
    }

    pub(crate) fn task_contexts(&self) -> usize {
        self.task.load(Ordering::SeqCst)
    }

    pub(crate) fn listener_contexts(&self) -> usize {
        self.listener.load(Ordering::SeqCst)
    }

    pub(crate) fn proxy_contexts(&self) -> usize {
        self.proxy.load(Ordering::SeqCst)
    }

    pub(crate) fn thread_contexts(&self) -> usize {
        self.thread.load(Ordering::SeqCst)
    }
}

impl ContextConfiguration for CountingConfiguration {
    fn new_task_context(&self, task_name: Option<&str>) -> Context {
        self.task.fetch_add(1, Ordering::SeqCst);
        let label = match task_name {
            Some(task_name) => format!("{}/task:{task_name}", self.name),
            None => format!("{}/task", self.name),
        };
        Context::new(label, ())
    }

    fn new_listener_context(&self) -> Context {
        self.listener.fetch_add(1, Ordering::SeqCst);
        Context::new(format!("{}/listener", self.name), ())
    }

    fn new_proxy_context(&self) -> Context {
        self.proxy.fetch_add(1, Ordering::SeqCst);
        Context::new(format!("{}/proxy", self.name), ())
    }

    fn new_thread_context(&self) -> Context {
        self.thread.fetch_add(1, Ordering::SeqCst);
        Context::new(format!("{}/thread", self.name), ())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EventKind {
    Submitted,
    Starting,
    Aborted,
    Done,
}

/// One recorded listener callback, with the context active while it ran.
#[derive(Clone)]
pub(crate) struct Event {
    pub(crate) kind: EventKind,
    pub(crate) task: String,
    pub(crate) failure: Option<TaskFailure>,
    pub(crate) observed_context: Option<Context>,
}

/// Listener recording every callback in order.
#[derive(Default)]
pub(crate) struct RecordingListener {
    events: Mutex<Vec<Event>>,
}

impl RecordingListener {
    pub(crate) fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    fn record(&self, kind: EventKind, task: &str, failure: Option<&TaskFailure>) {
        self.events.lock().unwrap().push(Event {
            kind,
            task: task.to_owned(),
            failure: failure.cloned(),
            observed_context: current_context(),
        });
    }
}

impl TaskListener for RecordingListener {
    fn task_submitted(&self, task: &str) {
        self.record(EventKind::Submitted, task, None);
    }

    fn task_starting(&self, task: &str) {
        self.record(EventKind::Starting, task, None);
    }

    fn task_aborted(&self, task: &str, cause: &TaskFailure) {
        self.record(EventKind::Aborted, task, Some(cause));
    }

    fn task_done(&self, task: &str, failure: Option<&TaskFailure>) {
        self.record(EventKind::Done, task, failure);
    }
}
