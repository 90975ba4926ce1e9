//! Routes inbound payloads to per-kind mailboxes.
//!
//! Delivery here is at-most-once: a full mailbox drops the payload with a
//! warning and never blocks the transport.

use std::collections::HashMap;
use std::sync::Arc;

use rc_proto::{decode_frame, PayloadKind, StreamPayload};
use tracing::{debug, warn};

use crate::{config::EngineConfig, mailbox::Mailbox};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Enqueued(PayloadKind),
    /// Mailbox full; payload discarded.
    Dropped(PayloadKind),
    /// Unrecognised `type` tag; payload discarded.
    Unknown,
    /// Frame was not valid JSON for any payload.
    Undecodable,
}

pub struct Demultiplexer {
    mailboxes: HashMap<PayloadKind, Arc<Mailbox>>,
}

impl Demultiplexer {
    /// One mailbox per payload kind, sized from `config`.
    pub fn new(config: &EngineConfig) -> Self {
        let mailboxes = PayloadKind::ALL
            .iter()
            .map(|&kind| (kind, Arc::new(Mailbox::new(kind, config.pool_for(kind).capacity))))
            .collect();
        Self { mailboxes }
    }

    pub fn mailbox(&self, kind: PayloadKind) -> Option<&Arc<Mailbox>> {
        self.mailboxes.get(&kind)
    }

    pub fn dispatch(&self, payload: StreamPayload) -> DispatchOutcome {
        let Some(kind) = payload.kind() else {
            warn!("discarding payload with unknown type tag");
            return DispatchOutcome::Unknown;
        };
        let Some(mailbox) = self.mailboxes.get(&kind) else {
            warn!(kind = %kind, "no mailbox for payload kind");
            return DispatchOutcome::Dropped(kind);
        };

        match mailbox.try_push(payload) {
            Ok(()) => {
                debug!(kind = %kind, pending = mailbox.pending(), "payload enqueued");
                DispatchOutcome::Enqueued(kind)
            }
            Err(payload) => {
                warn!(
                    sender = ?payload.sender_id(),
                    kind = %kind,
                    dropped = mailbox.dropped(),
                    "mailbox full, dropping payload"
                );
                DispatchOutcome::Dropped(kind)
            }
        }
    }

    /// Decode one JSON frame from the relay and dispatch it.
    pub fn dispatch_frame(&self, frame: &[u8]) -> DispatchOutcome {
        match decode_frame(frame) {
            Ok(payload) => self.dispatch(payload),
            Err(err) => {
                warn!(error = %err, len = frame.len(), "discarding undecodable frame");
                DispatchOutcome::Undecodable
            }
        }
    }

    /// Sum of drop counters across all mailboxes.
    pub fn dropped_total(&self) -> u64 {
        self.mailboxes.values().map(|m| m.dropped()).sum()
    }
}
