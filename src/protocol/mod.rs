//! AT-command session engine.
//!
//! This module turns the sensor's raw, fragmented byte stream into typed
//! application state and drives outgoing commands under the firmware's
//! inter-command spacing constraint:
//!
//! - [`framer`] - reassembles byte chunks into discrete text lines
//! - [`decoder`] - maps one line to a typed [`decoder::Response`]
//! - [`state`] - latest-known-value store updated by decoded responses
//! - [`operation`] - calibrate/reboot state machine with deadlines
//! - [`dispatcher`] - paced outgoing command queue
//! - [`session`] - the event loop wiring all of the above to a transport
//! - [`commands`] - the AT verb vocabulary

pub mod commands;
pub mod decoder;
pub mod dispatcher;
pub mod framer;
pub mod operation;
pub mod session;
pub mod state;

pub use dispatcher::{start_dispatcher, DispatcherConfig, DispatcherHandle};
pub use framer::LineFramer;
pub use session::{Session, SessionHandle, SessionTimings};
pub use state::{DeviceState, SharedLog, SharedState};
