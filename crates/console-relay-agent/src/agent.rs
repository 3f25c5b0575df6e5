//! The in-app agent.
//!
//! An [`Agent`] is the single context object of a running relay: it owns the
//! session, the console shim, the persistence sink and the link to the
//! panel. Nothing is kept in process-wide statics.

use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicBool, Ordering},
};

use console_relay_core::{
    AgentConfig, Console, ConfigError, LogLevel, Topology,
    traits::{LogSink, Storage},
};
use console_relay_storage::{LocalSink, WriteSerializer, storage::FileStorage};
use console_relay_transport::{
    AgentEndpoint, AgentMessage, BridgeHost, Channel, PanelMessage, Subscription,
};
use thiserror::Error;
use uuid::Uuid;

use crate::{
    session::{Session, SessionStatus},
    shim::ConsoleShim,
    sink::{BridgeLink, RelaySink},
};

/// Agent error.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// What teardown left behind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TeardownReport {
    /// Whether the agent was active when deactivated.
    pub was_active: bool,
    /// Writes still pending when the drain timeout expired.
    pub unflushed: usize,
}

struct Attachment {
    id: Uuid,
    // Held for its pump; dropping it disconnects the panel.
    _endpoint: AgentEndpoint,
    _subscriptions: Vec<Subscription>,
}

/// In-app agent relaying console output to a panel or a file.
pub struct Agent {
    id: Uuid,
    config: AgentConfig,
    session: Arc<Session>,
    shim: ConsoleShim,
    writer: Option<Arc<WriteSerializer>>,
    link: BridgeLink,
    attachment: Mutex<Option<Attachment>>,
    active: AtomicBool,
}

impl Agent {
    /// Create an agent; the local-file topology writes through `tokio::fs`.
    ///
    /// # Errors
    /// Returns error if the configuration is invalid.
    ///
    /// # Panics
    /// Panics if the local-file topology is configured outside a Tokio
    /// runtime.
    pub fn new(config: AgentConfig, console: Arc<Console>) -> Result<Self, AgentError> {
        Self::with_storage(config, console, Arc::new(FileStorage::new()))
    }

    /// Create an agent persisting through `storage` in the local-file
    /// topology. The storage is unused when relaying.
    ///
    /// # Errors
    /// Returns error if the configuration is invalid.
    ///
    /// # Panics
    /// Panics if the local-file topology is configured outside a Tokio
    /// runtime.
    pub fn with_storage(
        config: AgentConfig,
        console: Arc<Console>,
        storage: Arc<dyn Storage>,
    ) -> Result<Self, AgentError> {
        let destination = config.resolve_destination()?;
        let session = Arc::new(Session::new(config.auto_enable, destination.clone()));
        let link = BridgeLink::default();

        let (sink, writer): (Arc<dyn LogSink>, Option<Arc<WriteSerializer>>) = match config.topology {
            Topology::LocalFile => {
                // Write failures go to the console's error output as it was
                // before interception.
                let reporter = console.slot(LogLevel::Error);
                let writer = Arc::new(WriteSerializer::new(storage, Some(reporter)));
                let sink = LocalSink::new(Arc::clone(&writer), destination);
                (Arc::new(sink), Some(writer))
            }
            Topology::RemoteRelay => (Arc::new(RelaySink::new(link.clone())), None),
        };

        let shim = ConsoleShim::new(console, Arc::clone(&session), sink);
        let id = Uuid::new_v4();
        tracing::debug!(agent = %id, topology = ?config.topology, "agent created");

        Ok(Self {
            id,
            config,
            session,
            shim,
            writer,
            link,
            attachment: Mutex::new(None),
            active: AtomicBool::new(false),
        })
    }

    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub const fn config(&self) -> &AgentConfig {
        &self.config
    }

    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.session.status()
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Whether a live panel is attached.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.link.is_connected()
    }

    /// Writes queued in the local-file topology.
    #[must_use]
    pub fn pending_writes(&self) -> usize {
        self.writer.as_ref().map_or(0, |w| w.pending())
    }

    /// Mount the agent: intercept the console and announce status.
    ///
    /// Always pushes one `StatusUpdate` (plus `SetConfig` when relaying),
    /// whether or not a panel asked. Calling it while active does nothing.
    pub fn activate(&self) {
        if self.active.swap(true, Ordering::SeqCst) {
            return;
        }

        self.shim.activate();
        announce(&self.session, &self.link, self.config.topology);
        tracing::info!(
            agent = %self.id,
            enabled = self.session.is_enabled(),
            destination = self.session.destination(),
            "agent activated"
        );
    }

    /// Unmount the agent: restore the console, drop the panel link and
    /// wait (bounded) for queued writes.
    pub async fn deactivate(&self) -> TeardownReport {
        if !self.active.swap(false, Ordering::SeqCst) {
            return TeardownReport::default();
        }

        self.shim.deactivate();
        self.detach_all();

        let unflushed = match &self.writer {
            Some(writer) => writer.drain(self.config.drain_timeout()).await.unflushed,
            None => 0,
        };
        self.session.reset();

        if unflushed > 0 {
            tracing::warn!(agent = %self.id, unflushed, "agent deactivated with unflushed writes");
        } else {
            tracing::info!(agent = %self.id, "agent deactivated");
        }
        TeardownReport {
            was_active: true,
            unflushed,
        }
    }

    /// Change the enabled flag locally and tell the panel.
    pub fn set_enabled(&self, enabled: bool) {
        if self.session.set_enabled(enabled) {
            push_status(&self.session, &self.link);
        }
    }

    fn detach_all(&self) {
        let previous = self
            .attachment
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.link.clear();
        drop(previous);
    }
}

fn push_status(session: &Session, link: &BridgeLink) {
    let SessionStatus {
        enabled,
        destination,
    } = session.status();
    link.send(AgentMessage::status(enabled, destination));
}

fn announce(session: &Session, link: &BridgeLink, topology: Topology) {
    push_status(session, link);
    if topology == Topology::RemoteRelay {
        link.send(AgentMessage::set_config(session.destination()));
    }
}

impl BridgeHost for Agent {
    fn attach(&self, endpoint: AgentEndpoint) -> Uuid {
        let id = Uuid::new_v4();

        let subscriptions = Channel::PANEL_TO_AGENT
            .into_iter()
            .map(|channel| {
                let session = Arc::clone(&self.session);
                let link = self.link.clone();
                endpoint.subscribe(channel, move |msg: PanelMessage| match msg {
                    PanelMessage::RequestStatus => push_status(&session, &link),
                    PanelMessage::ToggleEnabled => {
                        let enabled = session.toggle();
                        tracing::info!(enabled, "relaying toggled by panel");
                        push_status(&session, &link);
                    }
                })
            })
            .collect();

        self.link.set(id, endpoint.outbox());
        let previous = self
            .attachment
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(Attachment {
                id,
                _endpoint: endpoint,
                _subscriptions: subscriptions,
            });

        if let Some(previous) = previous {
            tracing::info!(agent = %self.id, replaced = %previous.id, "panel connection replaced");
        }
        tracing::debug!(agent = %self.id, connection = %id, "panel attached");
        id
    }

    fn detach(&self, id: Uuid) {
        let mut attachment = self.attachment.lock().unwrap_or_else(PoisonError::into_inner);
        if attachment.as_ref().is_some_and(|a| a.id == id) {
            let previous = attachment.take();
            drop(attachment);
            self.link.clear_if(id);
            drop(previous);
            tracing::debug!(agent = %self.id, connection = %id, "panel detached");
        }
    }
}

#[cfg(test)]
mod tests {
    use console_relay_core::Arg;
    use console_relay_storage::storage::MemoryStorage;
    use console_relay_transport::{Bridge, PanelEndpoint};
    use tokio::sync::mpsc;

    use super::*;

    fn listen(panel: &PanelEndpoint) -> (Vec<Subscription>, mpsc::UnboundedReceiver<AgentMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let subs = Channel::AGENT_TO_PANEL
            .into_iter()
            .map(|channel| {
                let tx = tx.clone();
                panel.subscribe(channel, move |msg| {
                    let _ = tx.send(msg);
                })
            })
            .collect();
        (subs, rx)
    }

    #[tokio::test]
    async fn test_activation_announces_status_and_config() {
        let agent = Agent::new(
            AgentConfig::relay().with_destination("./logs/app.log"),
            Arc::new(Console::silent()),
        )
        .unwrap();
        let (agent_end, panel_end) = Bridge::pair();
        let (_subs, mut rx) = listen(&panel_end);
        agent.attach(agent_end);

        agent.activate();
        agent.activate();

        assert_eq!(rx.recv().await, Some(AgentMessage::status(false, "./logs/app.log")));
        assert_eq!(rx.recv().await, Some(AgentMessage::set_config("./logs/app.log")));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_local_topology_announces_status_only() {
        let agent = Agent::with_storage(
            AgentConfig::local("app.log"),
            Arc::new(Console::silent()),
            Arc::new(MemoryStorage::new()),
        )
        .unwrap();
        let (agent_end, panel_end) = Bridge::pair();
        let (_subs, mut rx) = listen(&panel_end);
        agent.attach(agent_end);
        agent.activate();

        panel_end.send(PanelMessage::RequestStatus).unwrap();

        assert_eq!(rx.recv().await, Some(AgentMessage::status(false, "app.log")));
        assert_eq!(rx.recv().await, Some(AgentMessage::status(false, "app.log")));
    }

    #[tokio::test]
    async fn test_each_toggle_pushes_one_status() {
        let agent = Agent::new(AgentConfig::relay(), Arc::new(Console::silent())).unwrap();
        let (agent_end, panel_end) = Bridge::pair();
        let (_subs, mut rx) = listen(&panel_end);
        agent.attach(agent_end);

        panel_end.send(PanelMessage::ToggleEnabled).unwrap();
        panel_end.send(PanelMessage::ToggleEnabled).unwrap();

        let destination = console_relay_core::config::DEFAULT_DESTINATION;
        assert_eq!(rx.recv().await, Some(AgentMessage::status(true, destination)));
        assert_eq!(rx.recv().await, Some(AgentMessage::status(false, destination)));
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());
        assert!(!agent.session().is_enabled());
    }

    #[tokio::test]
    async fn test_relay_topology_sends_log_entries() {
        let console = Arc::new(Console::silent());
        let agent = Agent::new(AgentConfig::relay().with_auto_enable(true), console.clone()).unwrap();
        let (agent_end, panel_end) = Bridge::pair();
        agent.attach(agent_end);
        agent.activate();
        let (_subs, mut rx) = listen(&panel_end);

        console.error(&[Arg::from("kaboom")]);

        let entry = loop {
            match rx.recv().await {
                Some(AgentMessage::LogEntry(record)) => break record,
                Some(_) => {}
                None => panic!("bridge closed"),
            }
        };
        assert_eq!(entry.level(), LogLevel::Error);
        assert_eq!(entry.message(), "kaboom");
    }

    #[tokio::test]
    async fn test_local_topology_persists_and_drains() {
        let storage = Arc::new(MemoryStorage::new());
        let console = Arc::new(Console::silent());
        let agent = Agent::with_storage(
            AgentConfig::local("app.log").with_auto_enable(true),
            console.clone(),
            storage.clone(),
        )
        .unwrap();
        agent.activate();

        console.log(&[Arg::from("first")]);
        console.warn(&[Arg::from("second")]);
        assert_eq!(agent.pending_writes(), 2);
        let report = agent.deactivate().await;

        assert_eq!(report, TeardownReport { was_active: true, unflushed: 0 });
        let content = storage.contents("app.log").unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("[LOG] first"));
        assert!(lines[1].ends_with("[WARN] second"));

        // Console no longer intercepted.
        console.log(&[Arg::from("after")]);
        assert_eq!(storage.contents("app.log").unwrap(), content);
    }

    #[tokio::test]
    async fn test_deactivate_resets_session_and_detaches() {
        let agent = Agent::new(AgentConfig::relay(), Arc::new(Console::silent())).unwrap();
        let (agent_end, panel_end) = Bridge::pair();
        agent.attach(agent_end);
        agent.activate();
        agent.set_enabled(true);
        assert!(agent.is_connected());

        let report = agent.deactivate().await;

        assert!(report.was_active);
        assert!(!agent.session().is_enabled());
        assert!(!agent.is_connected());
        assert_eq!(agent.deactivate().await, TeardownReport::default());
        drop(panel_end);
    }

    #[tokio::test]
    async fn test_stale_detach_keeps_newer_connection() {
        let agent = Agent::new(AgentConfig::relay(), Arc::new(Console::silent())).unwrap();
        let (first_end, _first_panel) = Bridge::pair();
        let (second_end, second_panel) = Bridge::pair();

        let first = agent.attach(first_end);
        let _second = agent.attach(second_end);
        agent.detach(first);

        let (_subs, mut rx) = listen(&second_panel);
        second_panel.send(PanelMessage::RequestStatus).unwrap();
        assert!(matches!(rx.recv().await, Some(AgentMessage::StatusUpdate { .. })));
    }

    #[test]
    fn test_local_topology_requires_destination() {
        let config = AgentConfig {
            topology: Topology::LocalFile,
            ..AgentConfig::default()
        };
        assert!(matches!(
            Agent::new(config, Arc::new(Console::silent())),
            Err(AgentError::Config(ConfigError::MissingDestination))
        ));
    }

    #[tokio::test]
    async fn test_records_not_produced_while_disabled() {
        let storage = Arc::new(MemoryStorage::new());
        let console = Arc::new(Console::silent());
        let agent = Agent::with_storage(AgentConfig::local("app.log"), console.clone(), storage.clone())
            .unwrap();
        agent.activate();

        console.log(&[Arg::from("quiet")]);
        agent.deactivate().await;

        assert_eq!(storage.contents("app.log"), None);
    }
}
