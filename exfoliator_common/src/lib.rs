//! Wire types for the exfoliator relay channel.
//!
//! Every frame on the channel is one JSON object of the form
//! `{"event": <name>, "data": <object>}`. This crate owns both directions:
//!
//! - [`OutboundMessage`] - intents the client sends to the relay
//! - [`InboundMessage`] - the closed set of events the relay sends back
//!
//! Decoding goes through [`Envelope`] first, then the event name selects the
//! payload decoder. Event names outside the closed set decode to
//! [`InboundMessage::Unrecognized`] rather than an error.
//!
//! # Usage
//!
//! ```rust
//! use exfoliator_common::{Axis, InboundMessage, OutboundMessage};
//!
//! let frame = OutboundMessage::EnableAxis { axis: Axis::X }.encode().unwrap();
//! assert_eq!(frame, r#"{"event":"enable_axis","data":{"axis":"X"}}"#);
//!
//! let msg = InboundMessage::decode(r#"{"event":"estop_update","data":{"triggered":true}}"#).unwrap();
//! assert_eq!(msg, InboundMessage::EmergencyStop { triggered: true });
//! ```

mod envelope;
mod error;
mod models;
mod requests;
mod responses;

pub use envelope::*;
pub use error::*;
pub use models::*;
pub use requests::*;
pub use responses::*;
