//! Worker pools draining the mailboxes.
//!
//! Each pool starts with one permanent worker. A monitor task checks the
//! backlog every tick and, while it exceeds the threshold, adds one
//! ephemeral worker per tick up to the pool maximum. Ephemeral workers
//! retire after an idle timeout. Handler errors are logged and the worker
//! moves on to the next payload.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rc_proto::{PayloadKind, StreamPayload};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{
    config::PoolConfig,
    error::{EngineError, HandlerOutcome},
    mailbox::{Mailbox, SharedReceiver},
};

/// Processes one payload taken from a mailbox.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    async fn handle(&self, payload: StreamPayload) -> Result<HandlerOutcome, EngineError>;
}

/// Worker count of one pool, bounded by `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolCounter {
    current: usize,
    min: usize,
    max: usize,
}

impl PoolCounter {
    /// Starts at `min`, the permanent workers.
    pub fn new(min: usize, max: usize) -> Self {
        Self {
            current: min,
            min,
            max: max.max(min),
        }
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn max(&self) -> usize {
        self.max
    }

    /// Claim a slot for one more worker. False at the maximum.
    pub fn try_grow(&mut self) -> bool {
        if self.current >= self.max {
            return false;
        }
        self.current += 1;
        true
    }

    /// Release a slot. Never drops below the permanent minimum.
    pub fn retire(&mut self) -> bool {
        if self.current <= self.min {
            return false;
        }
        self.current -= 1;
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerRole {
    Permanent,
    Ephemeral,
}

pub struct WorkerPool {
    kind: PayloadKind,
    mailbox: Arc<Mailbox>,
    handler: Arc<dyn MessageHandler>,
    counter: Arc<Mutex<PoolCounter>>,
    backlog_threshold: usize,
    idle_timeout: Duration,
    shutdown: watch::Receiver<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(
        mailbox: Arc<Mailbox>,
        handler: Arc<dyn MessageHandler>,
        config: &PoolConfig,
        idle_timeout: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            kind: mailbox.kind(),
            mailbox,
            handler,
            counter: Arc::new(Mutex::new(PoolCounter::new(1, config.max_workers))),
            backlog_threshold: config.backlog_threshold,
            idle_timeout,
            shutdown,
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn kind(&self) -> PayloadKind {
        self.kind
    }

    pub fn worker_count(&self) -> usize {
        self.counter.lock().current()
    }

    pub fn mailbox(&self) -> &Arc<Mailbox> {
        &self.mailbox
    }

    /// Spawn the permanent worker.
    pub fn start(&self) {
        self.spawn_worker(WorkerRole::Permanent);
        info!(kind = %self.kind, max = self.counter.lock().max(), "worker pool started");
    }

    /// One monitor pass: add an ephemeral worker if the backlog is above the
    /// threshold and the pool has room. Returns whether a worker was added.
    pub fn monitor_tick(&self) -> bool {
        let pending = self.mailbox.pending();
        if pending <= self.backlog_threshold {
            return false;
        }
        let grown = {
            let mut counter = self.counter.lock();
            counter.try_grow().then(|| counter.current())
        };
        match grown {
            Some(workers) => {
                self.spawn_worker(WorkerRole::Ephemeral);
                info!(kind = %self.kind, pending, workers, "backlog high, added ephemeral worker");
                true
            }
            None => {
                debug!(kind = %self.kind, pending, "backlog high, pool at maximum");
                false
            }
        }
    }

    /// Run `monitor_tick` every `tick` until shutdown.
    pub fn spawn_monitor(self: &Arc<Self>, tick: Duration) {
        let pool = Arc::clone(self);
        let mut shutdown = self.shutdown.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(tick) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            debug!(kind = %pool.kind, "pool monitor shutting down");
                            return;
                        }
                    }
                }
                if *shutdown.borrow() {
                    return;
                }
                pool.monitor_tick();
            }
        });
        self.tasks.lock().push(handle);
    }

    /// Wait for every worker and monitor of this pool to exit. Call after
    /// signalling shutdown.
    pub async fn join(&self) {
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock());
        for handle in handles {
            if let Err(err) = handle.await {
                warn!(kind = %self.kind, error = %err, "pool task ended abnormally");
            }
        }
    }

    fn spawn_worker(&self, role: WorkerRole) {
        let worker = Worker {
            kind: self.kind,
            role,
            rx: self.mailbox.receiver(),
            handler: Arc::clone(&self.handler),
            counter: Arc::clone(&self.counter),
            idle_timeout: self.idle_timeout,
            shutdown: self.shutdown.clone(),
        };
        let handle = tokio::spawn(worker.run());
        let mut tasks = self.tasks.lock();
        tasks.retain(|h| !h.is_finished());
        tasks.push(handle);
    }
}

struct Worker {
    kind: PayloadKind,
    role: WorkerRole,
    rx: SharedReceiver,
    handler: Arc<dyn MessageHandler>,
    counter: Arc<Mutex<PoolCounter>>,
    idle_timeout: Duration,
    shutdown: watch::Receiver<bool>,
}

enum Next {
    Payload(StreamPayload),
    Idle,
    Closed,
    Shutdown,
}

impl Worker {
    async fn run(mut self) {
        debug!(kind = %self.kind, role = ?self.role, "worker started");
        loop {
            match self.next().await {
                Next::Payload(payload) => self.process(payload).await,
                Next::Idle => {
                    let workers = {
                        let mut counter = self.counter.lock();
                        counter.retire();
                        counter.current()
                    };
                    debug!(kind = %self.kind, workers, "ephemeral worker idle, retiring");
                    return;
                }
                Next::Closed => {
                    debug!(kind = %self.kind, "mailbox closed, worker exiting");
                    self.release_slot();
                    return;
                }
                Next::Shutdown => {
                    debug!(kind = %self.kind, role = ?self.role, "worker shutting down");
                    self.release_slot();
                    return;
                }
            }
        }
    }

    async fn next(&mut self) -> Next {
        let idle = match self.role {
            WorkerRole::Permanent => None,
            WorkerRole::Ephemeral => Some(self.idle_timeout),
        };

        loop {
            if *self.shutdown.borrow() {
                return Next::Shutdown;
            }
            let rx = Arc::clone(&self.rx);
            let recv = async move { rx.lock().await.recv().await };

            tokio::select! {
                received = receive(recv, idle) => {
                    return match received {
                        Some(Some(payload)) => Next::Payload(payload),
                        Some(None) => Next::Closed,
                        None => Next::Idle,
                    };
                }
                changed = self.shutdown.changed() => {
                    if changed.is_err() {
                        return Next::Shutdown;
                    }
                }
            }
        }
    }

    async fn process(&self, payload: StreamPayload) {
        match self.handler.handle(payload).await {
            Ok(HandlerOutcome::Handled) => {}
            Ok(HandlerOutcome::Ignored(reason)) => {
                debug!(kind = %self.kind, reason, "payload ignored");
            }
            Err(err) => {
                warn!(
                    kind = %self.kind,
                    error = %err,
                    exchange_failure = err.is_exchange_failure(),
                    "handler failed, continuing"
                );
            }
        }
    }

    fn release_slot(&self) {
        if self.role == WorkerRole::Ephemeral {
            self.counter.lock().retire();
        }
    }
}

/// Wait for the next payload. `None` means the idle timeout elapsed first.
async fn receive<F>(recv: F, idle: Option<Duration>) -> Option<Option<StreamPayload>>
where
    F: std::future::Future<Output = Option<StreamPayload>>,
{
    match idle {
        None => Some(recv.await),
        Some(limit) => tokio::time::timeout(limit, recv).await.ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Semaphore;
    use uuid::Uuid;

    /// Blocks every payload until the test releases permits.
    struct GatedHandler {
        gate: Semaphore,
        handled: AtomicUsize,
    }

    #[async_trait]
    impl MessageHandler for GatedHandler {
        async fn handle(&self, _payload: StreamPayload) -> Result<HandlerOutcome, EngineError> {
            if let Ok(permit) = self.gate.acquire().await {
                permit.forget();
            }
            self.handled.fetch_add(1, Ordering::SeqCst);
            Ok(HandlerOutcome::Handled)
        }
    }

    struct FailingHandler {
        seen: AtomicUsize,
    }

    #[async_trait]
    impl MessageHandler for FailingHandler {
        async fn handle(&self, _payload: StreamPayload) -> Result<HandlerOutcome, EngineError> {
            self.seen.fetch_add(1, Ordering::SeqCst);
            Err(EngineError::InvalidPayload("poisoned".into()))
        }
    }

    fn payload(n: u128) -> StreamPayload {
        StreamPayload::KeyExchangeConfirmation(rc_proto::KeyExchangeConfirmation {
            chat_id: Uuid::from_u128(n),
            success: true,
            confirmer_id: Uuid::nil(),
            target_id: Uuid::nil(),
        })
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn counter_stays_within_bounds() {
        let mut counter = PoolCounter::new(1, 3);
        assert_eq!(counter.current(), 1);
        assert!(counter.try_grow());
        assert!(counter.try_grow());
        assert!(!counter.try_grow());
        assert_eq!(counter.current(), 3);
        assert!(counter.retire());
        assert!(counter.retire());
        assert!(!counter.retire());
        assert_eq!(counter.current(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn pool_grows_one_per_tick_then_shrinks_when_idle() {
        let mailbox = Arc::new(Mailbox::new(PayloadKind::KeyExchangeConfirmation, 20));
        let handler = Arc::new(GatedHandler {
            gate: Semaphore::new(0),
            handled: AtomicUsize::new(0),
        });
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let config = PoolConfig {
            capacity: 20,
            max_workers: 3,
            backlog_threshold: 2,
        };
        let pool = WorkerPool::new(
            mailbox.clone(),
            handler.clone(),
            &config,
            Duration::from_secs(5),
            shutdown_rx,
        );
        pool.start();

        for n in 0..10 {
            mailbox.try_push(payload(n)).unwrap();
        }
        settle().await;
        assert!(mailbox.pending() > config.backlog_threshold);

        assert!(pool.monitor_tick());
        assert_eq!(pool.worker_count(), 2);
        settle().await;
        assert!(pool.monitor_tick());
        assert_eq!(pool.worker_count(), 3);
        settle().await;
        assert!(!pool.monitor_tick());
        assert_eq!(pool.worker_count(), 3);

        handler.gate.add_permits(100);
        while handler.handled.load(Ordering::SeqCst) < 10 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(mailbox.pending(), 0);
        assert!(!pool.monitor_tick());

        tokio::time::sleep(Duration::from_secs(6)).await;
        settle().await;
        assert_eq!(pool.worker_count(), 1);

        shutdown_tx.send(true).unwrap();
        pool.join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn monitor_task_adds_worker_on_tick() {
        let mailbox = Arc::new(Mailbox::new(PayloadKind::Envelope, 20));
        let handler = Arc::new(GatedHandler {
            gate: Semaphore::new(0),
            handled: AtomicUsize::new(0),
        });
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let config = PoolConfig {
            capacity: 20,
            max_workers: 2,
            backlog_threshold: 1,
        };
        let pool = Arc::new(WorkerPool::new(
            mailbox.clone(),
            handler.clone(),
            &config,
            Duration::from_secs(5),
            shutdown_rx,
        ));
        pool.start();
        pool.spawn_monitor(Duration::from_secs(5));

        for n in 0..6 {
            mailbox.try_push(payload(n)).unwrap();
        }
        settle().await;
        assert_eq!(pool.worker_count(), 1);

        tokio::time::sleep(Duration::from_millis(5_100)).await;
        assert_eq!(pool.worker_count(), 2);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(pool.worker_count(), 2);

        handler.gate.add_permits(100);
        shutdown_tx.send(true).unwrap();
        pool.join().await;
        assert_eq!(pool.worker_count(), 1);
    }

    #[tokio::test]
    async fn handler_errors_do_not_stop_the_drain() {
        let mailbox = Arc::new(Mailbox::new(PayloadKind::Envelope, 8));
        let handler = Arc::new(FailingHandler {
            seen: AtomicUsize::new(0),
        });
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let config = PoolConfig {
            capacity: 8,
            max_workers: 1,
            backlog_threshold: 4,
        };
        let pool = WorkerPool::new(
            mailbox.clone(),
            handler.clone(),
            &config,
            Duration::from_secs(5),
            shutdown_rx,
        );
        pool.start();

        for n in 0..5 {
            mailbox.try_push(payload(n)).unwrap();
        }
        while handler.seen.load(Ordering::SeqCst) < 5 {
            tokio::task::yield_now().await;
        }
        assert_eq!(pool.worker_count(), 1);

        shutdown_tx.send(true).unwrap();
        pool.join().await;
    }
}
