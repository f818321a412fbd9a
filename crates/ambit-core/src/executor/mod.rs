//! Managed executors: the public entry points of the crate.

pub mod managed;
pub mod raw;
pub mod scheduled;
pub mod thread;

pub use managed::{ContextualExecutor, TaskHandle};
pub use raw::{BlockingPool, PoolStatus, RawExecutor};
pub use scheduled::{ContextualScheduledExecutor, ScheduledHandle, TriggerHandle, TriggerStatus};
pub use thread::ManagedThreadFactory;
