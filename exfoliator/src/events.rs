use exfoliator_common::InboundMessage;

use crate::{ConnectionState, MacroQueueEntry, MirrorUpdate, QueueState, SubjectKey};

/// Notifications published to every subscriber of a client.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Connection(ConnectionState),

    /// Every decoded inbound message, after the runtime has applied it.
    Inbound(InboundMessage),

    /// A category of the device mirror was replaced.
    Mirror(MirrorUpdate),

    /// Saved-program names, sorted.
    Catalog(Vec<String>),

    // Confirmations
    ChangeRequested { key: SubjectKey, desired: bool },
    ChangeConfirmed { key: SubjectKey, value: bool },
    /// The device did not reach `desired` in time. The UI should show
    /// `restored`, the last value the device reported (`None` if it never
    /// reported one).
    ChangeRolledBack {
        key: SubjectKey,
        desired: bool,
        restored: Option<bool>,
    },

    // Queue
    QueueState(QueueState),
    EntryDispatched {
        entry: MacroQueueEntry,
        remaining: usize,
    },
    EntryFinished {
        entry: MacroQueueEntry,
        error: Option<String>,
    },
    QueueCompleted { count: usize },
}
