//! Dispatcher: feeds reconcile triggers to the reconciler.
//!
//! The [`WorkQueue`] is keyed by node name. A node is never reconciled by
//! two workers at once; a trigger that arrives while its node is in flight
//! marks it dirty and the node runs again as soon as the current pass
//! finishes. Re-checks requested by the reconciler are parked as deadlines,
//! and any fresh trigger for the node supersedes them.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::{self, JoinSet};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, error, info, warn};

use fleetmend_controller::{ReconcileResult, Reconciled, Reconciler, Trigger};
use fleetmend_state::NodeName;

use crate::config::DispatcherConfig;

/// What the queue should do with a node after a reconcile pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Settled; nothing scheduled.
    Forget,
    /// Look again after the given delay.
    RequeueAfter(Duration),
    /// Lost an optimistic-concurrency race; retry with no delay.
    RequeueNow,
    /// Failed; retry with per-node exponential backoff.
    Backoff,
}

impl Completion {
    pub fn from_result(result: &ReconcileResult<Reconciled>) -> Self {
        match result {
            Ok(reconciled) => match reconciled.requeue_after {
                Some(delay) => Completion::RequeueAfter(delay),
                None => Completion::Forget,
            },
            Err(e) if e.requeue_immediately() => Completion::RequeueNow,
            Err(_) => Completion::Backoff,
        }
    }
}

#[derive(Debug)]
pub struct WorkQueue {
    ready: VecDeque<NodeName>,
    queued: HashSet<NodeName>,
    in_flight: HashSet<NodeName>,
    dirty: HashSet<NodeName>,
    delayed: HashMap<NodeName, Instant>,
    failures: HashMap<NodeName, u32>,
    backoff_base: Duration,
    backoff_max: Duration,
}

impl WorkQueue {
    pub fn new(backoff_base: Duration, backoff_max: Duration) -> Self {
        Self {
            ready: VecDeque::new(),
            queued: HashSet::new(),
            in_flight: HashSet::new(),
            dirty: HashSet::new(),
            delayed: HashMap::new(),
            failures: HashMap::new(),
            backoff_base,
            backoff_max,
        }
    }

    /// Queue a node for immediate reconcile, dropping any pending re-check.
    pub fn add(&mut self, name: &str) {
        self.delayed.remove(name);
        self.enqueue(name);
    }

    /// Schedule a re-check. When one is already pending the earlier
    /// deadline wins.
    pub fn add_after(&mut self, name: &str, deadline: Instant) {
        if self.queued.contains(name) || self.dirty.contains(name) {
            return;
        }
        self.delayed
            .entry(name.to_string())
            .and_modify(|d| *d = (*d).min(deadline))
            .or_insert(deadline);
    }

    /// Move every re-check due at `now` to the ready queue.
    pub fn promote_due(&mut self, now: Instant) -> usize {
        let due: Vec<NodeName> = self
            .delayed
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(name, _)| name.clone())
            .collect();
        for name in &due {
            self.delayed.remove(name);
            self.enqueue(name);
        }
        due.len()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.delayed.values().min().copied()
    }

    /// Take the next ready node and mark it in flight.
    pub fn pop(&mut self) -> Option<NodeName> {
        let name = self.ready.pop_front()?;
        self.queued.remove(&name);
        self.in_flight.insert(name.clone());
        Some(name)
    }

    /// Record the end of a reconcile pass started by [`pop`](Self::pop).
    pub fn done(&mut self, name: &str, completion: Completion, now: Instant) {
        self.in_flight.remove(name);

        let backoff = if completion == Completion::Backoff {
            let failures = self.failures.entry(name.to_string()).or_insert(0);
            *failures = failures.saturating_add(1);
            let failures = *failures;
            Some(self.backoff(failures))
        } else {
            self.failures.remove(name);
            None
        };

        if self.dirty.remove(name) {
            self.add(name);
            return;
        }

        match completion {
            Completion::Forget => {}
            Completion::RequeueNow => self.enqueue(name),
            Completion::RequeueAfter(delay) => self.add_after(name, now + delay),
            Completion::Backoff => {
                let delay = backoff.unwrap_or(self.backoff_base);
                self.add_after(name, now + delay);
            }
        }
    }

    /// Delay before the `failures`-th retry: base doubling up to max.
    pub fn backoff(&self, failures: u32) -> Duration {
        let factor = 1u32
            .checked_shl(failures.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.backoff_base
            .saturating_mul(factor)
            .min(self.backoff_max)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Nodes waiting to run, now or later.
    pub fn pending(&self) -> usize {
        self.ready.len() + self.delayed.len()
    }

    fn enqueue(&mut self, name: &str) {
        if self.in_flight.contains(name) {
            self.dirty.insert(name.to_string());
            return;
        }
        if self.queued.insert(name.to_string()) {
            self.ready.push_back(name.to_string());
        }
    }
}

/// Runs reconciles on the blocking pool, at most `workers` at a time.
pub struct Dispatcher {
    reconciler: Arc<Reconciler>,
    config: DispatcherConfig,
}

/// Reconciles running on the blocking pool, mapped back to their node by
/// task id so a task that fails to join still releases its node.
struct InFlight {
    tasks: JoinSet<ReconcileResult<Reconciled>>,
    nodes: HashMap<task::Id, NodeName>,
}

impl InFlight {
    fn new() -> Self {
        Self {
            tasks: JoinSet::new(),
            nodes: HashMap::new(),
        }
    }

    fn len(&self) -> usize {
        self.tasks.len()
    }

    fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    fn spawn(&mut self, reconciler: Arc<Reconciler>, name: NodeName) {
        let node = name.clone();
        let handle = self
            .tasks
            .spawn_blocking(move || reconciler.reconcile(&node));
        self.nodes.insert(handle.id(), name);
    }

    /// Next finished reconcile. A panicked task completes with backoff.
    async fn join_next(&mut self) -> Option<(NodeName, Completion)> {
        loop {
            let (id, completion) = match self.tasks.join_next_with_id().await? {
                Ok((id, result)) => (id, Completion::from_result(&result)),
                Err(e) => {
                    error!(error = %e, "reconcile task failed to join");
                    (e.id(), Completion::Backoff)
                }
            };
            match self.nodes.remove(&id) {
                Some(name) => return Some((name, completion)),
                None => warn!(task = %id, "finished reconcile task has no node"),
            }
        }
    }
}

impl Dispatcher {
    pub fn new(reconciler: Arc<Reconciler>, config: DispatcherConfig) -> Self {
        Self { reconciler, config }
    }

    /// Dispatch until `shutdown` flips, then wait for in-flight reconciles.
    ///
    /// The first resync tick fires immediately, so every known node gets a
    /// pass on startup.
    pub async fn run(
        self,
        mut triggers: mpsc::UnboundedReceiver<Trigger>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let workers = self.config.workers.max(1);
        let mut queue =
            WorkQueue::new(self.config.error_backoff_base, self.config.error_backoff_max);
        let mut in_flight = InFlight::new();
        let mut resync = tokio::time::interval(self.config.resync_interval);
        let mut triggers_open = true;

        info!(workers, resync = ?self.config.resync_interval, "dispatcher started");

        loop {
            while in_flight.len() < workers {
                let Some(name) = queue.pop() else { break };
                in_flight.spawn(self.reconciler.clone(), name);
            }

            let wake = queue.next_deadline();
            tokio::select! {
                _ = shutdown.changed() => break,
                received = triggers.recv(), if triggers_open => match received {
                    Some(trigger) => self.handle_trigger(trigger, &mut queue).await,
                    None => {
                        debug!("trigger channel closed");
                        triggers_open = false;
                    }
                },
                Some((name, completion)) = in_flight.join_next(), if !in_flight.is_empty() => {
                    debug!(node = %name, ?completion, "reconcile finished");
                    queue.done(&name, completion, Instant::now());
                }
                _ = sleep_until(wake.unwrap_or_else(Instant::now)), if wake.is_some() => {
                    let due = queue.promote_due(Instant::now());
                    debug!(due, "re-checks due");
                }
                _ = resync.tick() => self.resync(&mut queue).await,
            }
        }

        info!(
            in_flight = queue.in_flight(),
            dropped = queue.pending(),
            "dispatcher stopping, waiting for in-flight reconciles"
        );
        while let Some((name, completion)) = in_flight.join_next().await {
            debug!(node = %name, ?completion, "in-flight reconcile finished");
        }
        info!("dispatcher stopped");
    }

    async fn handle_trigger(&self, trigger: Trigger, queue: &mut WorkQueue) {
        debug!(%trigger, "trigger received");
        match trigger {
            Trigger::Node(name) => queue.add(&name),
            Trigger::HealthCheck { namespace, name } => {
                let reconciler = self.reconciler.clone();
                let mapped = tokio::task::spawn_blocking(move || {
                    reconciler.map_policy_change(&namespace, &name)
                })
                .await;
                match mapped {
                    Ok(nodes) => {
                        debug!(count = nodes.len(), "health check change fanned out");
                        for node in &nodes {
                            queue.add(node);
                        }
                    }
                    Err(e) => error!(error = %e, "health check fan-out failed"),
                }
            }
        }
    }

    async fn resync(&self, queue: &mut WorkQueue) {
        let client = self.reconciler.client().clone();
        match tokio::task::spawn_blocking(move || client.list_nodes()).await {
            Ok(Ok(nodes)) => {
                for node in &nodes {
                    queue.add(&node.name);
                }
                debug!(count = nodes.len(), "resync queued nodes");
            }
            Ok(Err(e)) => warn!(error = %e, "resync failed to list nodes"),
            Err(e) => error!(error = %e, "resync task failed to join"),
        }
    }
}
