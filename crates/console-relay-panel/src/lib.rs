//! Panel side of the console relay.
//!
//! Provides:
//! - `PanelController` - Control-protocol client mirroring agent status
//! - `PanelState` - Observable display state

pub mod panel;

pub use panel::{PanelController, PanelError, PanelState};
