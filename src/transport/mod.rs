//! Transport boundary.
//!
//! The protocol engine is transport-agnostic: it consumes [`LinkEvent`]s from
//! one channel and produces [`LinkCommand`]s into another. Anything that can
//! move bytes both ways fits behind this pair; the adapters below bind it to
//! the sensor's BLE GATT link and to a plain serial console.

use tokio::sync::mpsc;

#[cfg(feature = "ble")]
pub mod ble;
#[cfg(feature = "serial")]
pub mod serial;

/// Instructions to the transport write side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkCommand {
    /// Transmit raw bytes (best effort; failures are logged, not fatal).
    Send(Vec<u8>),
    /// Tear the link down.
    Disconnect,
}

/// Events from the transport read side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// A chunk of received bytes, arbitrarily fragmented.
    Data(Vec<u8>),
    /// The link is gone, whoever initiated it.
    Disconnected,
}

pub type LinkCommandTx = mpsc::UnboundedSender<LinkCommand>;
pub type LinkCommandRx = mpsc::UnboundedReceiver<LinkCommand>;
pub type LinkEventTx = mpsc::UnboundedSender<LinkEvent>;
pub type LinkEventRx = mpsc::UnboundedReceiver<LinkEvent>;

/// Channel pair an adapter hands to the session side.
pub struct Link {
    pub commands: LinkCommandTx,
    pub events: LinkEventRx,
}

/// A link with no far side: commands are accepted and dropped, no data ever
/// arrives. The dispatcher does not transmit in demo mode anyway; this keeps
/// the session wiring identical.
pub fn demo_link() -> Link {
    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel();
    let (_event_tx, event_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move { while cmd_rx.recv().await.is_some() {} });
    Link { commands: cmd_tx, events: event_rx }
}
