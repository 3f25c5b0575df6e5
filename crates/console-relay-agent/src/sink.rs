//! Relaying records and status over the control channel.

use std::sync::{Arc, PoisonError, RwLock};

use console_relay_core::{
    LogRecord,
    traits::{LogSink, SinkError},
};
use console_relay_transport::{AgentMessage, Outbox};
use uuid::Uuid;

/// The agent's current connection to a panel, if any.
///
/// Messages sent while no panel is attached, or after the panel went away,
/// are dropped. Nothing is queued for later delivery.
#[derive(Clone, Default)]
pub struct BridgeLink {
    inner: Arc<RwLock<Option<(Uuid, Outbox<AgentMessage>)>>>,
}

impl BridgeLink {
    pub(crate) fn set(&self, id: Uuid, outbox: Outbox<AgentMessage>) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = Some((id, outbox));
    }

    /// Forget the outbox if it belongs to connection `id`.
    pub(crate) fn clear_if(&self, id: Uuid) -> bool {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if inner.as_ref().is_some_and(|(current, _)| *current == id) {
            *inner = None;
            true
        } else {
            false
        }
    }

    pub(crate) fn clear(&self) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Whether a live panel is attached.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|(_, outbox)| outbox.is_connected())
    }

    /// Send to the attached panel. Returns whether the message was handed
    /// to a live link.
    pub fn send(&self, msg: AgentMessage) -> bool {
        let outbox = self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|(_, outbox)| outbox.clone());

        let Some(outbox) = outbox else {
            tracing::trace!(?msg, "no panel attached, dropping message");
            return false;
        };
        match outbox.send(msg) {
            Ok(()) => true,
            Err(e) => {
                tracing::trace!("panel link closed, dropping message: {e}");
                false
            }
        }
    }
}

/// Sink relaying every record to the panel as a `LogEntry`.
pub struct RelaySink {
    link: BridgeLink,
}

impl RelaySink {
    #[must_use]
    pub const fn new(link: BridgeLink) -> Self {
        Self { link }
    }
}

impl LogSink for RelaySink {
    fn submit(&self, record: LogRecord) -> Result<(), SinkError> {
        // A missing panel is not an error: the record is simply not relayed.
        self.link.send(AgentMessage::LogEntry(record));
        Ok(())
    }
}
