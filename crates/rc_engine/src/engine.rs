//! Runtime wiring: cache, protocol, demultiplexer and one pool per mailbox.

use std::sync::Arc;

use rc_proto::{PayloadKind, StreamPayload};
use rc_store::ChatStore;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::{
    cache::ChatCache,
    config::EngineConfig,
    demux::{Demultiplexer, DispatchOutcome},
    error::EngineError,
    identity::LocalIdentity,
    pool::{MessageHandler, WorkerPool},
    protocol::Protocol,
    transport::Transport,
};

pub struct Engine {
    config: EngineConfig,
    protocol: Protocol,
    demux: Arc<Demultiplexer>,
    pools: Vec<Arc<WorkerPool>>,
    shutdown_tx: watch::Sender<bool>,
}

impl Engine {
    /// Restore stored chats, then start every pool and its monitor.
    pub async fn start(
        config: EngineConfig,
        identity: LocalIdentity,
        store: Arc<dyn ChatStore>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, EngineError> {
        config.validate()?;

        let protocol = Protocol::new(
            Arc::new(identity),
            Arc::new(ChatCache::new()),
            store,
            transport,
        );
        protocol.restore().await?;

        let demux = Arc::new(Demultiplexer::new(&config));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handler: Arc<dyn MessageHandler> = Arc::new(protocol.clone());

        let mut pools = Vec::with_capacity(PayloadKind::ALL.len());
        for kind in PayloadKind::ALL {
            let mailbox = demux
                .mailbox(kind)
                .cloned()
                .ok_or_else(|| EngineError::Config(format!("no mailbox for {kind}")))?;
            let pool = Arc::new(WorkerPool::new(
                mailbox,
                Arc::clone(&handler),
                config.pool_for(kind),
                config.idle_timeout(),
                shutdown_rx.clone(),
            ));
            pool.start();
            pool.spawn_monitor(config.monitor_tick());
            pools.push(pool);
        }

        info!(
            user_id = %protocol.identity().user_id,
            pools = pools.len(),
            tick_ms = config.monitor_tick_ms,
            "engine started"
        );
        Ok(Self {
            config,
            protocol,
            demux,
            pools,
            shutdown_tx,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Interactive entry points: friend requests, chats, messages.
    pub fn protocol(&self) -> &Protocol {
        &self.protocol
    }

    pub fn demux(&self) -> &Demultiplexer {
        &self.demux
    }

    pub fn pool(&self, kind: PayloadKind) -> Option<&Arc<WorkerPool>> {
        self.pools.iter().find(|p| p.kind() == kind)
    }

    pub fn dispatch(&self, payload: StreamPayload) -> DispatchOutcome {
        self.demux.dispatch(payload)
    }

    pub fn dispatch_frame(&self, frame: &[u8]) -> DispatchOutcome {
        self.demux.dispatch_frame(frame)
    }

    /// Feed payloads from the relay into the demultiplexer until the
    /// channel closes or shutdown is signalled.
    pub async fn run_inbound(&self, mut inbound: mpsc::Receiver<StreamPayload>) {
        let mut shutdown = self.shutdown_tx.subscribe();
        loop {
            tokio::select! {
                next = inbound.recv() => match next {
                    Some(payload) => {
                        self.demux.dispatch(payload);
                    }
                    None => {
                        debug!("inbound stream closed");
                        return;
                    }
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("inbound loop shutting down");
                        return;
                    }
                }
            }
        }
    }

    /// Signal every task to stop and wait for them.
    pub async fn shutdown(&self) {
        info!("engine shutting down");
        // Only fails when no receiver is left, in which case nothing runs.
        let _ = self.shutdown_tx.send(true);
        for pool in &self.pools {
            pool.join().await;
        }
        info!("engine stopped");
    }
}
