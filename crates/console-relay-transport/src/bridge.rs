//! In-process named-channel bridge between agent and panel.
//!
//! Each endpoint owns a pump task that dispatches incoming messages, in
//! order, to the handlers subscribed on the message's channel. Messages
//! nobody listens to are dropped. Dropping an endpoint stops its pump, which
//! closes the peer's outbox.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, PoisonError, Weak,
        atomic::{AtomicU64, Ordering},
    },
};

use tokio::{sync::mpsc, task::JoinHandle};
use uuid::Uuid;

use crate::protocol::{AgentMessage, Channel, PanelMessage, Routed};

/// Send error.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("Channel closed")]
    ChannelClosed,
}

type Handler<In> = Arc<dyn Fn(In) + Send + Sync>;

struct Registry<In> {
    handlers: Mutex<HashMap<Channel, Vec<(u64, Handler<In>)>>>,
    next_id: AtomicU64,
}

impl<In: Routed + Clone> Registry<In> {
    fn new() -> Self {
        Self {
            handlers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn add(&self, channel: Channel, handler: Handler<In>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(channel)
            .or_default()
            .push((id, handler));
        id
    }

    fn remove(&self, channel: Channel, id: u64) {
        let mut handlers = self.handlers.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(list) = handlers.get_mut(&channel) {
            list.retain(|(handler_id, _)| *handler_id != id);
            if list.is_empty() {
                handlers.remove(&channel);
            }
        }
    }

    fn count(&self, channel: Channel) -> usize {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&channel)
            .map_or(0, Vec::len)
    }

    fn dispatch(&self, msg: In) {
        let channel = msg.channel();
        // Handlers run outside the lock so they may subscribe or unsubscribe.
        let handlers: Vec<Handler<In>> = self
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&channel)
            .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default();

        if handlers.is_empty() {
            tracing::trace!(%channel, "no subscriber, dropping message");
            return;
        }
        for handler in handlers {
            handler(msg.clone());
        }
    }
}

/// Registration of a handler on a channel.
///
/// The handler is removed when this value is dropped.
#[must_use = "dropping a Subscription unsubscribes its handler"]
pub struct Subscription {
    channel: Channel,
    release: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    #[must_use]
    pub const fn channel(&self) -> Channel {
        self.channel
    }

    /// Remove the handler now.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}

/// Cloneable sending half of an endpoint.
pub struct Outbox<Out> {
    tx: mpsc::UnboundedSender<Out>,
}

impl<Out> Clone for Outbox<Out> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<Out> Outbox<Out> {
    /// Send a message to the peer.
    ///
    /// # Errors
    /// Returns error if the peer endpoint is gone.
    pub fn send(&self, msg: Out) -> Result<(), SendError> {
        self.tx.send(msg).map_err(|_| SendError::ChannelClosed)
    }

    /// Whether the peer endpoint is still alive.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Resolve once the peer endpoint is gone.
    pub async fn closed(&self) {
        self.tx.closed().await;
    }
}

/// One side of a bridge: sends `Out`, dispatches incoming `In`.
pub struct Endpoint<Out, In> {
    outbox: Outbox<Out>,
    registry: Arc<Registry<In>>,
    pump: JoinHandle<()>,
}

/// Agent side: sends [`AgentMessage`], receives [`PanelMessage`].
pub type AgentEndpoint = Endpoint<AgentMessage, PanelMessage>;

/// Panel side: sends [`PanelMessage`], receives [`AgentMessage`].
pub type PanelEndpoint = Endpoint<PanelMessage, AgentMessage>;

impl<Out, In> Endpoint<Out, In>
where
    Out: Send + 'static,
    In: Routed + Clone + Send + 'static,
{
    fn new(tx: mpsc::UnboundedSender<Out>, mut rx: mpsc::UnboundedReceiver<In>) -> Self {
        let registry = Arc::new(Registry::new());
        let pump_registry = Arc::clone(&registry);
        let pump = tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                pump_registry.dispatch(msg);
            }
        });

        Self {
            outbox: Outbox { tx },
            registry,
            pump,
        }
    }

    /// Register a handler for one channel.
    pub fn subscribe<F>(&self, channel: Channel, handler: F) -> Subscription
    where
        F: Fn(In) + Send + Sync + 'static,
    {
        let id = self.registry.add(channel, Arc::new(handler));
        let registry: Weak<Registry<In>> = Arc::downgrade(&self.registry);
        Subscription {
            channel,
            release: Some(Box::new(move || {
                if let Some(registry) = registry.upgrade() {
                    registry.remove(channel, id);
                }
            })),
        }
    }

    /// Number of handlers on a channel.
    #[must_use]
    pub fn subscriber_count(&self, channel: Channel) -> usize {
        self.registry.count(channel)
    }

    /// Send a message to the peer.
    ///
    /// # Errors
    /// Returns error if the peer endpoint is gone.
    pub fn send(&self, msg: Out) -> Result<(), SendError> {
        self.outbox.send(msg)
    }

    /// A cloneable sender to the peer.
    #[must_use]
    pub fn outbox(&self) -> Outbox<Out> {
        self.outbox.clone()
    }

    /// Whether the peer endpoint is still alive.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.outbox.is_connected()
    }
}

impl<Out, In> Drop for Endpoint<Out, In> {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

/// Factory for connected endpoint pairs.
pub struct Bridge;

impl Bridge {
    /// Create a connected agent/panel endpoint pair.
    ///
    /// # Panics
    /// Panics if called outside a Tokio runtime.
    #[must_use]
    pub fn pair() -> (AgentEndpoint, PanelEndpoint) {
        let (to_panel_tx, to_panel_rx) = mpsc::unbounded_channel();
        let (to_agent_tx, to_agent_rx) = mpsc::unbounded_channel();

        let agent = Endpoint::new(to_panel_tx, to_agent_rx);
        let panel = Endpoint::new(to_agent_tx, to_panel_rx);
        (agent, panel)
    }
}

/// Something that can serve a panel over an agent endpoint.
///
/// At most one endpoint is attached at a time; attaching replaces the
/// previous one. `detach` only removes the endpoint it names.
pub trait BridgeHost: Send + Sync + 'static {
    fn attach(&self, endpoint: AgentEndpoint) -> Uuid;
    fn detach(&self, id: Uuid);
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use tokio_test::assert_err;

    use super::*;

    fn forward<T: Send + 'static>() -> (impl Fn(T) + Send + Sync, mpsc::UnboundedReceiver<T>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (move |msg| drop(tx.send(msg)), rx)
    }

    #[tokio::test]
    async fn test_messages_dispatch_in_order() {
        let (agent, panel) = Bridge::pair();
        let (handler, mut rx) = forward();
        let _sub = panel.subscribe(Channel::StatusUpdate, handler);

        agent.send(AgentMessage::status(true, "a")).unwrap();
        agent.send(AgentMessage::status(false, "a")).unwrap();

        assert_eq!(rx.recv().await, Some(AgentMessage::status(true, "a")));
        assert_eq!(rx.recv().await, Some(AgentMessage::status(false, "a")));
    }

    #[tokio::test]
    async fn test_dropped_subscription_stops_delivery() {
        let (agent, panel) = Bridge::pair();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let sub = panel.subscribe(Channel::StatusUpdate, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let (marker, mut rx) = forward();
        let _marker = panel.subscribe(Channel::SetConfig, marker);

        assert_eq!(panel.subscriber_count(Channel::StatusUpdate), 1);
        sub.unsubscribe();
        assert_eq!(panel.subscriber_count(Channel::StatusUpdate), 0);

        agent.send(AgentMessage::status(true, "a")).unwrap();
        agent.send(AgentMessage::set_config("a")).unwrap();
        rx.recv().await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_handlers_only_see_their_channel() {
        let (agent, panel) = Bridge::pair();
        let (handler, mut rx) = forward();
        let _sub = panel.subscribe(Channel::SetConfig, handler);

        agent.send(AgentMessage::status(true, "ignored")).unwrap();
        agent.send(AgentMessage::set_config("kept")).unwrap();

        assert_eq!(rx.recv().await, Some(AgentMessage::set_config("kept")));
    }

    #[tokio::test]
    async fn test_handler_can_reply_through_outbox() {
        let (agent, panel) = Bridge::pair();
        let outbox = agent.outbox();
        let _reply = agent.subscribe(Channel::RequestStatus, move |_| {
            let _ = outbox.send(AgentMessage::status(false, "here"));
        });
        let (handler, mut rx) = forward();
        let _sub = panel.subscribe(Channel::StatusUpdate, handler);

        panel.send(PanelMessage::RequestStatus).unwrap();

        assert_eq!(rx.recv().await, Some(AgentMessage::status(false, "here")));
    }

    #[tokio::test]
    async fn test_send_fails_after_peer_dropped() {
        let (agent, panel) = Bridge::pair();
        assert!(agent.is_connected());

        drop(panel);
        // The peer's pump is cancelled asynchronously.
        while agent.is_connected() {
            tokio::task::yield_now().await;
        }

        assert_err!(agent.send(AgentMessage::set_config("x")));
    }

    #[tokio::test]
    async fn test_outbox_closed_resolves_when_peer_dropped() {
        let (agent, panel) = Bridge::pair();
        let outbox = panel.outbox();

        drop(agent);

        tokio::time::timeout(std::time::Duration::from_secs(5), outbox.closed())
            .await
            .unwrap();
        assert!(!outbox.is_connected());
    }
}
