//! Client-side orchestration core for the exfoliator instrument.
//!
//! The instrument is only reachable through a relay over one WebSocket
//! channel. This crate keeps a local mirror of device state, bridges toggles
//! with optimistic confirmations, and runs stored programs one target at a
//! time.
//!
//! # Architecture
//!
//! - [`session`] - channel lifecycle with fixed-delay reconnection
//! - [`mirror`] - device state, replaced wholesale by snapshot events
//! - [`confirm`] - optimistic toggles confirmed or rolled back at a deadline
//! - [`queue`] - single-flight program queue with pause/resume/cancel
//! - [`client`] - the runtime task that owns all of the above
//!
//! Everything that changes state runs on the one runtime task. The state
//! machines talk to the outside world only through [`Effects`], so tests can
//! drive them without a channel or real timers.
//!
//! # Usage
//!
//! ```rust,no_run
//! use exfoliator::{Client, ClientConfig, SubjectKey};
//!
//! # async fn run() -> Result<(), exfoliator::ClientError> {
//! let client = Client::spawn(ClientConfig::default())?;
//! let mut events = client.subscribe();
//! client.toggle(SubjectKey::pneumatic("nozzle"), true).await?;
//! client.enqueue("peel", &["A1", "A2"]).await?;
//! client.start().await?;
//! while let Ok(event) = events.recv().await {
//!     println!("{:?}", event);
//! }
//! # Ok(())
//! # }
//! ```

pub mod calibration;
pub mod catalog;
pub mod client;
pub mod config;
pub mod confirm;
pub mod effects;
pub mod error;
pub mod events;
pub mod history;
pub mod mirror;
pub mod queue;
pub mod session;

pub use calibration::{CalibrationTable, Offset, Point};
pub use catalog::{LoadedProgram, ProgramCatalog};
pub use client::{Client, ClientHandle, ClientSnapshot, QueueSnapshot};
pub use config::ClientConfig;
pub use confirm::{ConfirmationTracker, PendingConfirmation, SubjectKey};
pub use effects::{Effects, TimerId, TimerKind};
pub use error::{CalibrationError, ClientError, ConfigError, QueueError};
pub use events::ClientEvent;
pub use history::CommandHistory;
pub use mirror::{DeviceStateMirror, MirrorUpdate};
pub use queue::{MacroQueue, MacroQueueEntry, QueueState};
pub use session::{ConnectionState, SessionEvent};

pub use exfoliator_common as protocol;
