//! The seam between the state machines and the runtime.

use std::time::Duration;

use exfoliator_common::OutboundMessage;
use tokio::time::Instant;

use crate::{ClientError, ClientEvent, SubjectKey};

/// Identifies one scheduled timer. Never reused within a runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

/// What a timer is for, returned to the runtime when it fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerKind {
    /// Deadline of the pending confirmation for this subject.
    Confirmation(SubjectKey),
    /// Gap between two queue dispatches.
    Settle,
    /// Longest wait for a stopped program to report its outcome.
    StopAck,
}

/// Outbound side effects available to the tracker and the queue.
///
/// The runtime implements this over the live channel, a timer task set and
/// the event broadcast. Tests implement it with a recorder.
pub trait Effects {
    fn now(&self) -> Instant;

    /// Encodes and sends an intent. Fails with
    /// [`ClientError::ChannelUnavailable`] while disconnected.
    fn send(&mut self, intent: OutboundMessage) -> Result<(), ClientError>;

    fn schedule(&mut self, kind: TimerKind, after: Duration) -> TimerId;

    /// Cancels a timer. Cancelling a fired or unknown timer is a no-op.
    fn cancel(&mut self, id: TimerId);

    fn emit(&mut self, event: ClientEvent);
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Records every effect; timers fire only when a test says so.
    pub struct Recorder {
        pub now: Instant,
        pub connected: bool,
        pub sent: Vec<OutboundMessage>,
        pub scheduled: Vec<(TimerId, TimerKind, Duration)>,
        pub cancelled: Vec<TimerId>,
        pub events: Vec<ClientEvent>,
        next_id: u64,
    }

    impl Recorder {
        pub fn new() -> Self {
            Self {
                now: Instant::now(),
                connected: true,
                sent: Vec::new(),
                scheduled: Vec::new(),
                cancelled: Vec::new(),
                events: Vec::new(),
                next_id: 0,
            }
        }

        /// Timers scheduled and not yet cancelled, oldest first.
        pub fn live_timers(&self) -> Vec<(TimerId, TimerKind)> {
            self.scheduled
                .iter()
                .filter(|(id, _, _)| !self.cancelled.contains(id))
                .map(|(id, kind, _)| (*id, kind.clone()))
                .collect()
        }

        pub fn last_timer(&self) -> TimerId {
            self.scheduled.last().map(|(id, _, _)| *id).unwrap()
        }

        pub fn take_sent(&mut self) -> Vec<OutboundMessage> {
            std::mem::take(&mut self.sent)
        }

        pub fn take_events(&mut self) -> Vec<ClientEvent> {
            std::mem::take(&mut self.events)
        }
    }

    impl Effects for Recorder {
        fn now(&self) -> Instant {
            self.now
        }

        fn send(&mut self, intent: OutboundMessage) -> Result<(), ClientError> {
            if !self.connected {
                return Err(ClientError::ChannelUnavailable);
            }
            self.sent.push(intent);
            Ok(())
        }

        fn schedule(&mut self, kind: TimerKind, after: Duration) -> TimerId {
            self.next_id += 1;
            let id = TimerId(self.next_id);
            self.scheduled.push((id, kind, after));
            id
        }

        fn cancel(&mut self, id: TimerId) {
            self.cancelled.push(id);
        }

        fn emit(&mut self, event: ClientEvent) {
            self.events.push(event);
        }
    }
}
