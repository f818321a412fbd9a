use std::sync::Arc;
use std::time::{Duration, Instant};

use ambit_core::{
    BlockingPool, Context, ContextConfiguration, ContextualExecutor,
    ContextualScheduledExecutor, LastExecution, TaskConfig, TaskFailure, TaskListener, Trigger,
    current_context,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Demo policy: every capture snapshots the "current tenant" of the
/// submitting thread.
struct TenantConfiguration {
    tenant: &'static str,
}

impl ContextConfiguration for TenantConfiguration {
    fn new_task_context(&self, task_name: Option<&str>) -> Context {
        let label = match task_name {
            Some(name) => format!("{}:{name}", self.tenant),
            None => self.tenant.to_owned(),
        };
        Context::new(label, self.tenant)
    }

    fn new_listener_context(&self) -> Context {
        Context::new(format!("{}:listener", self.tenant), self.tenant)
    }

    fn new_proxy_context(&self) -> Context {
        Context::new(format!("{}:proxy", self.tenant), self.tenant)
    }

    fn new_thread_context(&self) -> Context {
        Context::new(format!("{}:thread", self.tenant), self.tenant)
    }
}

struct LoggingListener;

impl TaskListener for LoggingListener {
    fn task_starting(&self, task: &str) {
        info!(task, "starting");
    }

    fn task_done(&self, task: &str, failure: Option<&TaskFailure>) {
        match failure {
            Some(failure) => info!(task, %failure, "done with failure"),
            None => info!(task, "done"),
        }
    }
}

/// Fires twice, 50ms apart, then stops the schedule.
struct TwoShotTrigger;

impl Trigger for TwoShotTrigger {
    fn next_run_time(&self, last: Option<&LastExecution>, scheduled: Instant) -> Option<Instant> {
        match last {
            None => Some(scheduled + Duration::from_millis(50)),
            Some(last) if last.result_as::<u32>() == Some(&0) => {
                Some(last.scheduled_run() + Duration::from_millis(50))
            }
            Some(_) => None,
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let pool = Arc::new(BlockingPool::new());
    let config: Arc<dyn ContextConfiguration> = Arc::new(TenantConfiguration { tenant: "acme" });
    let executor = ContextualExecutor::new(pool.clone(), Some(Arc::clone(&config)));

    // (A) One-shot submission: the task sees the tenant context.
    let handle = executor
        .submit_with(
            TaskConfig::new()
                .named("hello")
                .with_listener(Arc::new(LoggingListener)),
            || {
                let context = current_context().expect("tenant context installed");
                println!("running under context `{}`", context.label());
                Ok(context.payload::<&'static str>().copied().unwrap())
            },
        )
        .expect("executor accepts the task");
    let tenant = handle.result().await.expect("task succeeds");
    println!("task ran for tenant: {tenant}");

    // (B) Trigger-driven schedule: two occurrences, then terminal.
    let scheduler = ContextualScheduledExecutor::new(pool.clone(), Some(config));
    let mut recurring = scheduler.schedule_with_trigger(
        Arc::new(TwoShotTrigger),
        TaskConfig::new().named("heartbeat"),
        {
            let beats = std::sync::atomic::AtomicU32::new(0);
            move || {
                let beat = beats.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                println!("heartbeat #{beat}");
                Ok(beat)
            }
        },
    );
    recurring.terminated().await;
    println!(
        "schedule terminated after {} runs",
        recurring.status().runs
    );

    // (C) Drain the pool and print its counters.
    executor.shutdown();
    executor.await_termination(Duration::from_secs(5)).await;
    println!(
        "pool status: {}",
        serde_json::to_string_pretty(&pool.status()).expect("status serializes")
    );
}
