use crate::composite::{self, Absorb, Batch};
use crate::config::SchedulerConfig;
use crate::debounce::Debouncer;
use crate::error::{Result, SynergyError};
use crate::sink::CommandSink;
use crate::types::{Command, Method, TargetId};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// Batches commands into composite-target requests
///
/// Commands are held for a debounce window (500 ms by default; every new
/// command restarts it). When the window closes, pending commands are grouped
/// by method, each group is reduced against the composite mapping and one
/// request per surviving target is sent through the wrapped [`CommandSink`].
///
/// Only one command per target is held per window. A newer command for the
/// same target replaces the older one, whose caller receives
/// [`SynergyError::Superseded`].
///
/// # Example
///
/// ```no_run
/// use mylink_synergy::{CommandScheduler, CompositeMapping, SchedulerConfig, SynergyClient};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = SynergyClient::new("192.168.1.50", "MySystem")?;
///     let composites = CompositeMapping::new()
///         .with("CC0F1A42.1", Vec::<String>::new())
///         .with("CC0F1A42.2", Vec::<String>::new())
///         .with("CC0F1A42.3", ["CC0F1A42.1", "CC0F1A42.2"]);
///     let scheduler = CommandScheduler::new(client, SchedulerConfig::new(composites));
///
///     // Sent as a single request for CC0F1A42.3
///     let left = scheduler.target("CC0F1A42.1").up();
///     let right = scheduler.target("CC0F1A42.2").up();
///     left.await?;
///     right.await?;
///     Ok(())
/// }
/// ```
pub struct CommandScheduler<S> {
    shared: Arc<Shared<S>>,
    debounce: Debouncer<()>,
}

struct Shared<S> {
    sink: Arc<S>,
    config: SchedulerConfig,
    pending: Mutex<Vec<PendingRequest>>,
}

struct PendingRequest {
    target_id: TargetId,
    method: Method,
    settlement: Settlement,
}

/// Callers waiting on one outgoing request
#[derive(Default)]
struct Settlement {
    waiters: Vec<oneshot::Sender<Result<Value>>>,
}

/// Outcome of a scheduled command
///
/// Resolves once the batch containing the command has been answered.
#[must_use = "the command is sent regardless, but its outcome is lost if this is dropped"]
pub struct PendingCommand {
    rx: oneshot::Receiver<Result<Value>>,
}

/// Commands bound to one target of a [`CommandScheduler`]
pub struct ScheduledTarget<'a, S> {
    scheduler: &'a CommandScheduler<S>,
    target_id: TargetId,
}

impl<S> CommandScheduler<S>
where
    S: CommandSink + 'static,
{
    /// Must be created inside a tokio runtime
    pub fn new(sink: S, config: SchedulerConfig) -> Self {
        Self::with_shared_sink(Arc::new(sink), config)
    }

    pub fn with_shared_sink(sink: Arc<S>, config: SchedulerConfig) -> Self {
        let delay = config.delay;
        let shared = Arc::new(Shared {
            sink,
            config,
            pending: Mutex::new(Vec::new()),
        });

        let flush_target = shared.clone();
        let debounce = Debouncer::new(delay, move |()| flush_target.flush());

        Self { shared, debounce }
    }

    /// Queue `method` for `target_id`; returns immediately
    pub fn send(&self, target_id: impl Into<TargetId>, method: impl Into<Method>) -> PendingCommand {
        let target_id = target_id.into();
        let (settlement, command) = Settlement::new();

        let superseded = {
            let mut pending = self.shared.pending();
            match pending.iter().position(|p| p.target_id == target_id) {
                Some(index) => {
                    let existing = &mut pending[index];
                    existing.method = method.into();
                    Some(std::mem::replace(&mut existing.settlement, settlement))
                }
                None => {
                    pending.push(PendingRequest {
                        target_id: target_id.clone(),
                        method: method.into(),
                        settlement,
                    });
                    None
                }
            }
        };

        if let Some(old) = superseded {
            tracing::debug!("Superseding pending command for {}", target_id);
            old.settle(Err(SynergyError::Superseded { target: target_id }));
        }

        self.debounce.call(());
        command
    }

    pub fn target(&self, target_id: impl Into<TargetId>) -> ScheduledTarget<'_, S> {
        ScheduledTarget {
            scheduler: self,
            target_id: target_id.into(),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.shared.config
    }

    pub fn sink(&self) -> &Arc<S> {
        &self.shared.sink
    }

    /// Number of commands waiting for the window to close
    pub fn pending_count(&self) -> usize {
        self.shared.pending().len()
    }

    /// True while the debounce timer is armed
    pub fn is_scheduled(&self) -> bool {
        self.debounce.is_armed()
    }

    pub(crate) fn flush(&self) {
        self.shared.flush();
    }
}

impl<S> Shared<S>
where
    S: CommandSink + 'static,
{
    fn pending(&self) -> MutexGuard<'_, Vec<PendingRequest>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Send everything queued so far
    ///
    /// The queue is swapped out under the lock, so commands arriving while the
    /// sends are in flight start a fresh window.
    fn flush(&self) {
        let pending = std::mem::take(&mut *self.pending());
        if pending.is_empty() {
            return;
        }
        tracing::info!("Flushing {} pending commands", pending.len());

        for (method, batch) in group_by_method(pending) {
            let reduced = composite::reduce(&self.config.composites, batch, self.config.reduction);
            for (target_id, settlement) in reduced {
                let sink = self.sink.clone();
                let method = method.clone();
                tracing::debug!("Sending {} to {} for {} callers", method, target_id, settlement.len());
                tokio::spawn(async move {
                    let outcome = sink.send(&target_id, &method).await;
                    settlement.settle(outcome);
                });
            }
        }
    }
}

/// Split pending requests by method, keeping first-seen order for both
fn group_by_method(pending: Vec<PendingRequest>) -> Vec<(Method, Batch<Settlement>)> {
    let mut groups: Vec<(Method, Batch<Settlement>)> = Vec::new();
    for request in pending {
        let entry = (request.target_id, request.settlement);
        match groups.iter().position(|(m, _)| *m == request.method) {
            Some(index) => groups[index].1.push(entry),
            None => groups.push((request.method, vec![entry])),
        }
    }
    groups
}

impl Settlement {
    fn new() -> (Self, PendingCommand) {
        let (tx, rx) = oneshot::channel();
        (Self { waiters: vec![tx] }, PendingCommand { rx })
    }

    fn len(&self) -> usize {
        self.waiters.len()
    }

    /// Deliver `outcome` to every waiter
    fn settle(self, outcome: Result<Value>) {
        for waiter in self.waiters {
            // Receiver may have been dropped
            let _ = waiter.send(outcome.clone());
        }
    }
}

impl Absorb for Settlement {
    fn absorb(&mut self, member: Self) {
        self.waiters.extend(member.waiters);
    }
}

impl Future for PendingCommand {
    type Output = Result<Value>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(SynergyError::Dropped)))
    }
}

impl<S> ScheduledTarget<'_, S>
where
    S: CommandSink + 'static,
{
    pub fn id(&self) -> &str {
        &self.target_id
    }

    pub fn command(&self, command: Command) -> PendingCommand {
        self.scheduler.send(self.target_id.clone(), command.method())
    }

    pub fn up(&self) -> PendingCommand {
        self.command(Command::Up)
    }

    pub fn down(&self) -> PendingCommand {
        self.command(Command::Down)
    }

    pub fn stop(&self) -> PendingCommand {
        self.command(Command::Stop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReductionMode;
    use crate::types::CompositeMapping;
    use async_trait::async_trait;
    use serde_json::json;
    use std::time::Duration;

    const DELAY: Duration = Duration::from_millis(500);

    /// Records every send and answers with `"<method>@<target>"`
    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<(String, String)>>,
        failing: Vec<String>,
    }

    impl RecordingSink {
        fn failing(targets: &[&str]) -> Self {
            Self {
                failing: targets.iter().map(|t| t.to_string()).collect(),
                ..Self::default()
            }
        }

        fn sent(&self) -> Vec<(String, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CommandSink for RecordingSink {
        async fn send(&self, target_id: &str, method: &str) -> Result<Value> {
            self.sent
                .lock()
                .unwrap()
                .push((target_id.to_string(), method.to_string()));
            if self.failing.iter().any(|t| t == target_id) {
                return Err(SynergyError::ConnectionClosed);
            }
            Ok(json!(format!("{method}@{target_id}")))
        }
    }

    fn shades() -> CompositeMapping {
        CompositeMapping::new()
            .with("CC.1", Vec::<String>::new())
            .with("CC.2", Vec::<String>::new())
            .with("CC.3", ["CC.1", "CC.2"])
    }

    fn scheduler(sink: RecordingSink) -> CommandScheduler<RecordingSink> {
        CommandScheduler::new(sink, SchedulerConfig::new(shades()).with_delay(DELAY))
    }

    fn pair(target: &str, method: &str) -> (String, String) {
        (target.to_string(), method.to_string())
    }

    #[tokio::test(start_paused = true)]
    async fn full_group_sends_composite_once() {
        let scheduler = scheduler(RecordingSink::default());

        let a = scheduler.send("CC.1", "mylink.move.up");
        let b = scheduler.send("CC.2", "mylink.move.up");

        assert_eq!(a.await.unwrap(), json!("mylink.move.up@CC.3"));
        assert_eq!(b.await.unwrap(), json!("mylink.move.up@CC.3"));
        assert_eq!(scheduler.sink().sent(), vec![pair("CC.3", "mylink.move.up")]);
    }

    #[tokio::test(start_paused = true)]
    async fn different_methods_never_collapse() {
        let scheduler = scheduler(RecordingSink::default());

        let a = scheduler.target("CC.1").up();
        let b = scheduler.target("CC.2").down();

        assert_eq!(a.await.unwrap(), json!("mylink.move.up@CC.1"));
        assert_eq!(b.await.unwrap(), json!("mylink.move.down@CC.2"));
        assert_eq!(
            scheduler.sink().sent(),
            vec![pair("CC.1", "mylink.move.up"), pair("CC.2", "mylink.move.down")]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn lone_member_is_sent_standalone() {
        let scheduler = scheduler(RecordingSink::default());

        assert_eq!(
            scheduler.target("CC.1").stop().await.unwrap(),
            json!("mylink.move.stop@CC.1")
        );
        assert_eq!(scheduler.sink().sent(), vec![pair("CC.1", "mylink.move.stop")]);
    }

    #[tokio::test(start_paused = true)]
    async fn newer_command_supersedes_older() {
        let scheduler = scheduler(RecordingSink::default());

        let first = scheduler.send("CC.1", "mylink.move.up");
        let second = scheduler.send("CC.1", "mylink.move.down");
        assert_eq!(scheduler.pending_count(), 1);

        let err = first.await.unwrap_err();
        assert!(matches!(err, SynergyError::Superseded { ref target } if target == "CC.1"));

        assert_eq!(second.await.unwrap(), json!("mylink.move.down@CC.1"));
        assert_eq!(scheduler.sink().sent(), vec![pair("CC.1", "mylink.move.down")]);
    }

    #[tokio::test(start_paused = true)]
    async fn superseding_keeps_queue_position() {
        let scheduler = scheduler(RecordingSink::default());

        let _a = scheduler.send("DD.1", "mylink.move.up");
        let _b = scheduler.send("DD.2", "mylink.move.up");
        let c = scheduler.send("DD.1", "mylink.move.up");
        c.await.unwrap();
        tokio::task::yield_now().await;

        assert_eq!(
            scheduler.sink().sent(),
            vec![pair("DD.1", "mylink.move.up"), pair("DD.2", "mylink.move.up")]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failure_fans_out_to_every_absorbed_caller() {
        let scheduler = scheduler(RecordingSink::failing(&["CC.3"]));

        let a = scheduler.send("CC.1", "mylink.move.up");
        let b = scheduler.send("CC.2", "mylink.move.up");

        assert!(matches!(a.await, Err(SynergyError::ConnectionClosed)));
        assert!(matches!(b.await, Err(SynergyError::ConnectionClosed)));
    }

    #[tokio::test(start_paused = true)]
    async fn window_restarts_on_every_call() {
        let scheduler = scheduler(RecordingSink::default());

        let _a = scheduler.send("DD.1", "mylink.move.up");
        tokio::time::sleep(Duration::from_millis(400)).await;
        let _b = scheduler.send("DD.2", "mylink.move.up");
        tokio::time::sleep(Duration::from_millis(400)).await;

        assert!(scheduler.sink().sent().is_empty());
        assert_eq!(scheduler.pending_count(), 2);

        tokio::time::sleep(Duration::from_millis(101)).await;
        tokio::task::yield_now().await;
        assert_eq!(scheduler.sink().sent().len(), 2);
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn commands_after_flush_start_a_new_window() {
        let scheduler = scheduler(RecordingSink::default());

        scheduler.send("CC.1", "mylink.move.up").await.unwrap();
        let b = scheduler.send("CC.2", "mylink.move.up");
        assert!(scheduler.is_scheduled());

        assert_eq!(b.await.unwrap(), json!("mylink.move.up@CC.2"));
        assert_eq!(
            scheduler.sink().sent(),
            vec![pair("CC.1", "mylink.move.up"), pair("CC.2", "mylink.move.up")]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn empty_flush_is_a_no_op() {
        let scheduler = scheduler(RecordingSink::default());

        scheduler.flush();
        tokio::task::yield_now().await;

        assert!(scheduler.sink().sent().is_empty());
        assert!(!scheduler.is_scheduled());
    }

    #[tokio::test(start_paused = true)]
    async fn fixed_point_collapses_nested_composites() {
        let mapping = CompositeMapping::new()
            .with("CC.5", ["CC.3", "CC.4"])
            .with("CC.3", ["CC.1", "CC.2"]);
        let scheduler = CommandScheduler::new(
            RecordingSink::default(),
            SchedulerConfig::new(mapping)
                .with_delay(DELAY)
                .with_reduction(ReductionMode::FixedPoint),
        );

        let commands: Vec<_> = ["CC.1", "CC.2", "CC.4"]
            .into_iter()
            .map(|t| scheduler.target(t).down())
            .collect();
        for command in commands {
            assert_eq!(command.await.unwrap(), json!("mylink.move.down@CC.5"));
        }
        assert_eq!(scheduler.sink().sent(), vec![pair("CC.5", "mylink.move.down")]);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_scheduler_drops_unflushed_commands() {
        let scheduler = scheduler(RecordingSink::default());
        let command = scheduler.send("CC.1", "mylink.move.up");
        drop(scheduler);

        assert!(matches!(command.await, Err(SynergyError::Dropped)));
    }
}
