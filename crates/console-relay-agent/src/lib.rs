//! In-app agent for console relaying.
//!
//! Provides:
//! - `Agent` - Context object owning session, shim, sink and bridge link
//! - `ConsoleShim` - Reversible, transparent console interception
//! - `Session` - Enabled flag, destination and record sequence
//! - `RelaySink` / `BridgeLink` - Record relay over the control channel

pub mod agent;
pub mod session;
pub mod shim;
pub mod sink;

pub use agent::{Agent, AgentError, TeardownReport};
pub use session::{Session, SessionStatus};
pub use shim::ConsoleShim;
pub use sink::{BridgeLink, RelaySink};
