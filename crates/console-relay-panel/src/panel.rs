//! Panel controller.
//!
//! The panel mirrors agent-confirmed state only: a toggle request does not
//! change what is displayed until the agent answers with a `StatusUpdate`.
//! When built with storage it also persists relayed `LogEntry` records.

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use console_relay_core::{LogRecord, traits::Storage};
use console_relay_storage::{DrainReport, WriteSerializer};
use console_relay_transport::{
    AgentMessage, Channel, PanelEndpoint, PanelMessage, SendError, Subscription,
};
use thiserror::Error;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

/// Panel error.
#[derive(Debug, Error)]
pub enum PanelError {
    #[error("Not connected to an agent")]
    NotConnected,
    #[error("Send error: {0}")]
    Send(#[from] SendError),
}

/// What the panel displays.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PanelState {
    /// A bridge to the agent is present.
    pub connected: bool,
    /// Last agent-confirmed enabled flag; `None` until the first status.
    pub enabled: Option<bool>,
    /// Destination reported by the agent.
    pub destination: Option<String>,
    /// Records persisted since the current connection was made.
    pub persisted: u64,
    /// Most recent persistence failure.
    pub last_error: Option<String>,
}

impl PanelState {
    /// Whether the toggle control is actionable.
    #[must_use]
    pub const fn can_toggle(&self) -> bool {
        self.connected
    }
}

struct Shared {
    state: watch::Sender<PanelState>,
    writer: Option<Arc<WriteSerializer>>,
    default_destination: String,
}

impl Shared {
    fn handle(self: &Arc<Self>, msg: AgentMessage) {
        match msg {
            AgentMessage::StatusUpdate {
                enabled,
                destination,
            } => {
                self.state.send_modify(|state| {
                    state.enabled = Some(enabled);
                    if !destination.is_empty() {
                        state.destination = Some(destination);
                    }
                });
            }
            AgentMessage::SetConfig { destination } => {
                self.state
                    .send_modify(|state| state.destination = Some(destination));
            }
            AgentMessage::LogEntry(record) => self.persist(record),
        }
    }

    fn persist(self: &Arc<Self>, record: LogRecord) {
        let Some(writer) = &self.writer else {
            tracing::trace!("display-only panel, ignoring log entry");
            return;
        };

        let destination = self
            .state
            .borrow()
            .destination
            .clone()
            .unwrap_or_else(|| self.default_destination.clone());

        match writer.enqueue(&destination, record) {
            Ok(ticket) => {
                self.state.send_modify(|state| state.persisted += 1);
                let shared = Arc::clone(self);
                tokio::spawn(async move {
                    if let Err(e) = ticket.outcome().await {
                        shared
                            .state
                            .send_modify(|state| state.last_error = Some(e.to_string()));
                    }
                });
            }
            Err(e) => {
                tracing::error!(%destination, "Failed to queue log entry: {e}");
                self.state
                    .send_modify(|state| state.last_error = Some(e.to_string()));
            }
        }
    }
}

struct Connection {
    endpoint: PanelEndpoint,
    _subscriptions: Vec<Subscription>,
}

/// Remote side of the control protocol.
pub struct PanelController {
    shared: Arc<Shared>,
    connection: Mutex<Option<Connection>>,
}

impl PanelController {
    /// Display-only panel.
    #[must_use]
    pub fn new(default_destination: impl Into<String>) -> Self {
        Self::build(default_destination.into(), None)
    }

    /// Panel that persists relayed records through `storage`.
    ///
    /// # Panics
    /// Panics if called outside a Tokio runtime.
    #[must_use]
    pub fn with_storage(default_destination: impl Into<String>, storage: Arc<dyn Storage>) -> Self {
        let writer = Arc::new(WriteSerializer::new(storage, None));
        Self::build(default_destination.into(), Some(writer))
    }

    fn build(default_destination: String, writer: Option<Arc<WriteSerializer>>) -> Self {
        let (state, _) = watch::channel(PanelState::default());
        Self {
            shared: Arc::new(Shared {
                state,
                writer,
                default_destination,
            }),
            connection: Mutex::new(None),
        }
    }

    /// Connect to an agent and ask for its status.
    ///
    /// Replaces any existing connection and resets the persisted counter.
    ///
    /// # Errors
    /// Returns error if the status request cannot be sent.
    pub fn connect(&self, endpoint: PanelEndpoint) -> Result<(), PanelError> {
        let subscriptions = Channel::AGENT_TO_PANEL
            .into_iter()
            .map(|channel| {
                let shared = Arc::clone(&self.shared);
                endpoint.subscribe(channel, move |msg| shared.handle(msg))
            })
            .collect();

        self.shared.state.send_modify(|state| {
            state.connected = true;
            state.persisted = 0;
            state.last_error = None;
        });

        let mut connection = self.connection.lock().unwrap_or_else(PoisonError::into_inner);
        *connection = Some(Connection {
            endpoint,
            _subscriptions: subscriptions,
        });

        if let Some(conn) = connection.as_ref() {
            conn.endpoint.send(PanelMessage::RequestStatus)?;
        }
        tracing::debug!("panel connected");
        Ok(())
    }

    /// Drop the connection and every subscription. Returns whether a
    /// connection existed.
    pub fn disconnect(&self) -> bool {
        let previous = self
            .connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.shared.state.send_modify(|state| state.connected = false);
        if previous.is_some() {
            tracing::debug!("panel disconnected");
        }
        previous.is_some()
    }

    /// Whether a live bridge to the agent exists.
    ///
    /// Also marks the panel disconnected if the agent went away.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        let live = self
            .connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|conn| conn.endpoint.is_connected());
        self.shared.state.send_if_modified(|state| {
            let changed = state.connected != live;
            state.connected = live;
            changed
        });
        live
    }

    /// Ask the agent to flip its enabled flag.
    ///
    /// Displayed state changes only when the agent's `StatusUpdate` arrives.
    ///
    /// # Errors
    /// Returns `NotConnected` if no live bridge exists.
    pub fn request_toggle(&self) -> Result<(), PanelError> {
        self.send(PanelMessage::ToggleEnabled)
    }

    /// Ask the agent to push its status.
    ///
    /// # Errors
    /// Returns `NotConnected` if no live bridge exists.
    pub fn request_status(&self) -> Result<(), PanelError> {
        self.send(PanelMessage::RequestStatus)
    }

    fn send(&self, msg: PanelMessage) -> Result<(), PanelError> {
        if !self.is_connected() {
            return Err(PanelError::NotConnected);
        }
        let connection = self.connection.lock().unwrap_or_else(PoisonError::into_inner);
        let conn = connection.as_ref().ok_or(PanelError::NotConnected)?;
        conn.endpoint.send(msg)?;
        Ok(())
    }

    /// Current display state.
    #[must_use]
    pub fn state(&self) -> PanelState {
        self.shared.state.borrow().clone()
    }

    /// Receiver notified on every state change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<PanelState> {
        self.shared.state.subscribe()
    }

    /// Stream of display states, starting with the current one.
    #[must_use]
    pub fn state_stream(&self) -> WatchStream<PanelState> {
        WatchStream::new(self.subscribe())
    }

    /// Disconnect and wait up to `timeout` for queued writes.
    pub async fn shutdown(&self, timeout: Duration) -> DrainReport {
        self.disconnect();
        match &self.shared.writer {
            Some(writer) => writer.drain(timeout).await,
            None => DrainReport::default(),
        }
    }
}
