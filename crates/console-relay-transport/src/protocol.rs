//! Wire protocol for agent/panel communication.

use std::fmt;

use console_relay_core::LogRecord;
use serde::{Deserialize, Serialize};

/// Named channel carrying one message kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    RequestStatus,
    ToggleEnabled,
    StatusUpdate,
    SetConfig,
    LogEntry,
}

impl Channel {
    /// Channels the panel listens on.
    pub const AGENT_TO_PANEL: [Self; 3] = [Self::StatusUpdate, Self::SetConfig, Self::LogEntry];

    /// Channels the agent listens on.
    pub const PANEL_TO_AGENT: [Self; 2] = [Self::RequestStatus, Self::ToggleEnabled];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::RequestStatus => "request-status",
            Self::ToggleEnabled => "toggle-enabled",
            Self::StatusUpdate => "status-update",
            Self::SetConfig => "set-config",
            Self::LogEntry => "log-entry",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A message that knows which channel it travels on.
pub trait Routed {
    fn channel(&self) -> Channel;
}

/// Message from panel to agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PanelMessage {
    /// Ask the agent to push its current status.
    RequestStatus,
    /// Flip the agent's enabled flag.
    ToggleEnabled,
}

impl Routed for PanelMessage {
    fn channel(&self) -> Channel {
        match self {
            Self::RequestStatus => Channel::RequestStatus,
            Self::ToggleEnabled => Channel::ToggleEnabled,
        }
    }
}

/// Message from agent to panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentMessage {
    /// Current session status.
    StatusUpdate { enabled: bool, destination: String },
    /// Active destination, for panels that persist records.
    SetConfig { destination: String },
    /// One intercepted record, for panels that persist records.
    LogEntry(LogRecord),
}

impl AgentMessage {
    #[must_use]
    pub fn status(enabled: bool, destination: impl Into<String>) -> Self {
        Self::StatusUpdate {
            enabled,
            destination: destination.into(),
        }
    }

    #[must_use]
    pub fn set_config(destination: impl Into<String>) -> Self {
        Self::SetConfig {
            destination: destination.into(),
        }
    }
}

impl Routed for AgentMessage {
    fn channel(&self) -> Channel {
        match self {
            Self::StatusUpdate { .. } => Channel::StatusUpdate,
            Self::SetConfig { .. } => Channel::SetConfig,
            Self::LogEntry(_) => Channel::LogEntry,
        }
    }
}
