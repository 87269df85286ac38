//! Single-flight program queue.
//!
//! Runs one stored program per target, one at a time. The channel offers no
//! correlation id between `run_macro` and the `macro_completed` /
//! `macro_error` that follows, so the queue never has more than one entry in
//! flight and attributes any outcome event to that entry.
//!
//! ```text
//! Idle --start--> Running --drained--> Idle
//!                  |   ^
//!            pause |   | resume
//!                  v   |
//!                 Paused --cancel--> Stopping --> Idle
//! ```
//!
//! Outcome events that arrive while Paused or Idle are ignored, so a late
//! completion from an abandoned dispatch cannot advance the queue.
//!
//! Stopping a running program is not immediate: the relay reports a
//! `macro_error` once the program reaches its next line. After a stop is sent
//! for an in-flight entry, the queue treats the next outcome as belonging to
//! that stopped run and holds any dispatch until it arrives, or until
//! [`DEFAULT_STOP_TIMEOUT`] passes.

use std::collections::VecDeque;
use std::time::Duration;

use exfoliator_common::{InboundMessage, MacroVariables, OutboundMessage};
use serde::Serialize;
use tracing::{debug, info, warn};

/// How long a stopped program may take to report before the queue stops
/// waiting for it.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);

use crate::{CalibrationError, CalibrationTable, ClientEvent, Effects, QueueError, TimerId, TimerKind};

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    Idle,
    Running,
    Paused,
    /// Transient: only observable as a published event during `cancel`.
    Stopping,
}

/// One program run against one target, with coordinates already resolved.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct MacroQueueEntry {
    pub target: String,
    pub program: String,
    pub parameter_x: f64,
    pub parameter_y: f64,
}

impl MacroQueueEntry {
    /// Resolves `target` through the calibration table.
    pub fn resolve(
        table: &CalibrationTable,
        program: &str,
        target: &str,
    ) -> Result<Self, CalibrationError> {
        let point = table.resolve(target)?;
        Ok(Self {
            target: target.trim().to_string(),
            program: program.to_string(),
            parameter_x: point.x,
            parameter_y: point.y,
        })
    }
}

#[derive(Debug)]
pub struct MacroQueue {
    state: QueueState,
    pending: VecDeque<MacroQueueEntry>,
    /// Remaining work detached by `pause`, head first.
    cached: VecDeque<MacroQueueEntry>,
    in_flight: Option<MacroQueueEntry>,
    settle: Option<TimerId>,
    settle_delay: Duration,
    /// Set while a stopped run has not reported yet.
    stop_ack: Option<TimerId>,
    stop_timeout: Duration,
    stage_x: Option<f64>,
    /// Entries resolved since the last `start`.
    completed: usize,
}

impl MacroQueue {
    pub fn new(settle_delay: Duration, stage_x: Option<f64>) -> Self {
        Self {
            state: QueueState::Idle,
            pending: VecDeque::new(),
            cached: VecDeque::new(),
            in_flight: None,
            settle: None,
            settle_delay,
            stop_ack: None,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            stage_x,
            completed: 0,
        }
    }

    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    pub fn state(&self) -> QueueState {
        self.state
    }

    pub fn in_flight(&self) -> Option<&MacroQueueEntry> {
        self.in_flight.as_ref()
    }

    pub fn pending(&self) -> impl Iterator<Item = &MacroQueueEntry> {
        self.pending.iter()
    }

    pub fn cached(&self) -> impl Iterator<Item = &MacroQueueEntry> {
        self.cached.iter()
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    /// Whether dispatch is held until a stopped program reports.
    pub fn awaiting_stop(&self) -> bool {
        self.stop_ack.is_some()
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, QueueState::Running | QueueState::Paused)
    }

    /// Replaces the not-yet-started batch.
    pub fn enqueue_all(&mut self, entries: Vec<MacroQueueEntry>) -> Result<(), QueueError> {
        if entries.is_empty() {
            warn!("refusing to enqueue an empty batch");
            return Err(QueueError::EmptyBatch);
        }
        self.require(QueueState::Idle, "enqueue")?;
        info!(count = entries.len(), "batch enqueued");
        self.pending = entries.into();
        Ok(())
    }

    pub fn start(&mut self, fx: &mut impl Effects) -> Result<(), QueueError> {
        self.require(QueueState::Idle, "start")?;
        self.completed = 0;
        if self.pending.is_empty() {
            info!("start with nothing queued");
            fx.emit(ClientEvent::QueueCompleted { count: 0 });
            return Ok(());
        }
        self.set_state(QueueState::Running, fx);
        self.dispatch_when_ready(fx);
        Ok(())
    }

    /// Abandons the in-flight entry and parks it, with everything after it,
    /// until `resume`. Pausing while paused is a no-op.
    pub fn pause(&mut self, fx: &mut impl Effects) -> Result<(), QueueError> {
        if self.state == QueueState::Paused {
            return Ok(());
        }
        self.require(QueueState::Running, "pause")?;

        self.cancel_settle(fx);
        // In the settle gap nothing runs on the relay, so there is nothing to
        // stop.
        if self.in_flight.is_some() && self.send_stop(fx) {
            self.await_stop(fx);
        }
        let mut cached: VecDeque<_> = self.in_flight.take().into_iter().collect();
        cached.append(&mut self.pending);
        self.cached = cached;
        info!(remaining = self.cached.len(), "queue paused");
        self.set_state(QueueState::Paused, fx);
        Ok(())
    }

    /// Restores the parked work and dispatches its head, once any stopped
    /// program has reported. Resuming while running is a no-op.
    pub fn resume(&mut self, fx: &mut impl Effects) -> Result<(), QueueError> {
        if self.state == QueueState::Running {
            return Ok(());
        }
        self.require(QueueState::Paused, "resume")?;

        self.pending = std::mem::take(&mut self.cached);
        info!(remaining = self.pending.len(), "queue resumed");
        if self.pending.is_empty() {
            self.finish(fx);
        } else {
            self.set_state(QueueState::Running, fx);
            self.dispatch_when_ready(fx);
        }
        Ok(())
    }

    /// Drops all queued work and stops the current program.
    pub fn cancel(&mut self, fx: &mut impl Effects) -> Result<(), QueueError> {
        if !self.is_active() {
            return Err(QueueError::InvalidTransition {
                op: "cancel",
                state: self.state,
            });
        }
        self.set_state(QueueState::Stopping, fx);
        if self.send_stop(fx) && self.in_flight.is_some() {
            self.await_stop(fx);
        }
        self.cancel_settle(fx);
        self.pending.clear();
        self.cached.clear();
        self.in_flight = None;
        info!("queue cancelled");
        self.set_state(QueueState::Idle, fx);
        Ok(())
    }

    /// Feeds a `macro_completed` or `macro_error` event. Anything else, or an
    /// outcome with no entry in flight, is ignored. The first outcome after a
    /// stop belongs to the stopped run and only releases held dispatch.
    pub fn on_program_finished(&mut self, msg: &InboundMessage, fx: &mut impl Effects) {
        let error = match msg {
            InboundMessage::MacroCompleted { .. } => None,
            InboundMessage::MacroError { error } => Some(error.clone()),
            _ => return,
        };
        if let Some(timer) = self.stop_ack.take() {
            fx.cancel(timer);
            debug!(error = ?error, "stopped program reported");
            self.dispatch_when_ready(fx);
            return;
        }
        if self.state != QueueState::Running {
            debug!(state = ?self.state, "ignoring program outcome outside a run");
            return;
        }
        let Some(entry) = self.in_flight.take() else {
            debug!("ignoring program outcome with nothing in flight");
            return;
        };

        self.completed += 1;
        match &error {
            Some(e) => warn!(chip = %entry.target, program = %entry.program, "entry failed: {}", e),
            None => info!(chip = %entry.target, program = %entry.program, "entry completed"),
        }
        fx.emit(ClientEvent::EntryFinished { entry, error });

        if self.pending.is_empty() {
            self.finish(fx);
        } else {
            self.settle = Some(fx.schedule(TimerKind::Settle, self.settle_delay));
        }
    }

    /// Dispatches the next entry once the settle delay has passed.
    pub fn on_settle(&mut self, timer: TimerId, fx: &mut impl Effects) {
        if self.settle != Some(timer) {
            return;
        }
        self.settle = None;
        self.dispatch_when_ready(fx);
    }

    /// Gives up on a stopped program that never reported.
    pub fn on_stop_timeout(&mut self, timer: TimerId, fx: &mut impl Effects) {
        if self.stop_ack != Some(timer) {
            return;
        }
        self.stop_ack = None;
        warn!("stopped program did not report within {:?}", self.stop_timeout);
        self.dispatch_when_ready(fx);
    }

    fn dispatch_when_ready(&mut self, fx: &mut impl Effects) {
        if self.state != QueueState::Running || self.in_flight.is_some() || self.settle.is_some() {
            return;
        }
        if self.stop_ack.is_some() {
            info!("holding dispatch until the stopped program reports");
            return;
        }
        self.dispatch_next(fx);
    }

    fn dispatch_next(&mut self, fx: &mut impl Effects) {
        let Some(entry) = self.pending.pop_front() else {
            return;
        };
        let intent = OutboundMessage::RunMacro {
            name: entry.program.clone(),
            variables: MacroVariables {
                chip_x: Some(entry.parameter_x),
                chip_y: Some(entry.parameter_y),
                stage_x: self.stage_x,
            },
        };
        // The entry stays in flight even if the send fails; pause and resume
        // re-dispatch it.
        if let Err(e) = fx.send(intent) {
            warn!(chip = %entry.target, "run intent not sent: {}", e);
        }
        info!(chip = %entry.target, program = %entry.program, x = entry.parameter_x, y = entry.parameter_y, "entry dispatched");
        fx.emit(ClientEvent::EntryDispatched {
            entry: entry.clone(),
            remaining: self.pending.len(),
        });
        self.in_flight = Some(entry);
    }

    fn finish(&mut self, fx: &mut impl Effects) {
        info!(count = self.completed, "all entries completed");
        self.set_state(QueueState::Idle, fx);
        fx.emit(ClientEvent::QueueCompleted {
            count: self.completed,
        });
    }

    fn send_stop(&self, fx: &mut impl Effects) -> bool {
        match fx.send(OutboundMessage::StopMacro {}) {
            Ok(()) => true,
            Err(e) => {
                warn!("stop intent not sent: {}", e);
                false
            }
        }
    }

    fn await_stop(&mut self, fx: &mut impl Effects) {
        if let Some(timer) = self.stop_ack.take() {
            fx.cancel(timer);
        }
        self.stop_ack = Some(fx.schedule(TimerKind::StopAck, self.stop_timeout));
    }

    fn cancel_settle(&mut self, fx: &mut impl Effects) {
        if let Some(timer) = self.settle.take() {
            fx.cancel(timer);
        }
    }

    fn set_state(&mut self, state: QueueState, fx: &mut impl Effects) {
        if self.state != state {
            self.state = state;
            fx.emit(ClientEvent::QueueState(state));
        }
    }

    fn require(&self, expected: QueueState, op: &'static str) -> Result<(), QueueError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(QueueError::InvalidTransition {
                op,
                state: self.state,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::testing::Recorder;

    const SETTLE: Duration = Duration::from_millis(500);

    fn entries(targets: &[&str]) -> Vec<MacroQueueEntry> {
        let table = CalibrationTable::default();
        targets
            .iter()
            .map(|t| MacroQueueEntry::resolve(&table, "P", t).unwrap())
            .collect()
    }

    fn completed() -> InboundMessage {
        InboundMessage::MacroCompleted { name: "P".into() }
    }

    fn run_targets(sent: &[OutboundMessage]) -> Vec<(f64, f64)> {
        sent.iter()
            .filter_map(|m| match m {
                OutboundMessage::RunMacro { variables, .. } => {
                    Some((variables.chip_x.unwrap(), variables.chip_y.unwrap()))
                }
                _ => None,
            })
            .collect()
    }

    fn stops(sent: &[OutboundMessage]) -> usize {
        sent.iter()
            .filter(|m| matches!(m, OutboundMessage::StopMacro {}))
            .count()
    }

    fn queue() -> MacroQueue {
        MacroQueue::new(SETTLE, Some(8.0))
    }

    #[test]
    fn test_two_entry_batch_runs_to_completion() {
        let mut fx = Recorder::new();
        let mut q = queue();
        q.enqueue_all(entries(&["A1", "A2"])).unwrap();

        q.start(&mut fx).unwrap();
        assert_eq!(q.state(), QueueState::Running);
        assert_eq!(q.in_flight().unwrap().target, "A1");
        assert_eq!(q.pending().count(), 1);
        assert_eq!(
            fx.sent,
            vec![OutboundMessage::RunMacro {
                name: "P".into(),
                variables: MacroVariables {
                    chip_x: Some(105.5),
                    chip_y: Some(4.5),
                    stage_x: Some(8.0),
                },
            }]
        );

        q.on_program_finished(&completed(), &mut fx);
        assert!(q.in_flight().is_none());
        assert_eq!(fx.sent.len(), 1, "next entry waits for the settle delay");
        let (timer, kind) = fx.live_timers().pop().unwrap();
        assert_eq!(kind, TimerKind::Settle);
        assert_eq!(fx.scheduled.last().unwrap().2, SETTLE);

        q.on_settle(timer, &mut fx);
        assert_eq!(q.in_flight().unwrap().target, "A2");
        assert_eq!(run_targets(&fx.sent), vec![(105.5, 4.5), (105.5, 17.0)]);

        fx.take_events();
        q.on_program_finished(&completed(), &mut fx);
        assert_eq!(q.state(), QueueState::Idle);
        assert_eq!(fx.events.last(), Some(&ClientEvent::QueueCompleted { count: 2 }));
    }

    #[test]
    fn test_start_with_nothing_queued_completes_empty() {
        let mut fx = Recorder::new();
        let mut q = queue();
        q.start(&mut fx).unwrap();
        assert_eq!(q.state(), QueueState::Idle);
        assert_eq!(fx.events, vec![ClientEvent::QueueCompleted { count: 0 }]);
        assert!(fx.sent.is_empty());
    }

    #[test]
    fn test_enqueue_rejects_empty_and_active() {
        let mut fx = Recorder::new();
        let mut q = queue();
        assert_eq!(q.enqueue_all(Vec::new()), Err(QueueError::EmptyBatch));

        q.enqueue_all(entries(&["A1"])).unwrap();
        q.enqueue_all(entries(&["B1", "B2"])).unwrap();
        assert_eq!(q.pending().count(), 2, "enqueue replaces a not-yet-started batch");

        q.start(&mut fx).unwrap();
        assert!(matches!(
            q.enqueue_all(entries(&["C1"])),
            Err(QueueError::InvalidTransition { op: "enqueue", .. })
        ));
    }

    #[test]
    fn test_single_flight_ignores_extra_outcomes() {
        let mut fx = Recorder::new();
        let mut q = queue();
        q.enqueue_all(entries(&["A1", "A2", "A3"])).unwrap();
        q.start(&mut fx).unwrap();

        q.on_program_finished(&completed(), &mut fx);
        // Second outcome during the settle gap has nothing in flight.
        q.on_program_finished(&completed(), &mut fx);
        assert_eq!(q.completed(), 1);
        assert_eq!(fx.live_timers().len(), 1);
        assert_eq!(run_targets(&fx.sent).len(), 1);
    }

    #[test]
    fn test_start_twice_is_rejected() {
        let mut fx = Recorder::new();
        let mut q = queue();
        q.enqueue_all(entries(&["A1", "A2"])).unwrap();
        q.start(&mut fx).unwrap();
        assert!(q.start(&mut fx).is_err());
        assert_eq!(run_targets(&fx.sent).len(), 1);
    }

    #[test]
    fn test_error_advances_like_completion() {
        let mut fx = Recorder::new();
        let mut q = queue();
        q.enqueue_all(entries(&["A1", "A2"])).unwrap();
        q.start(&mut fx).unwrap();

        q.on_program_finished(
            &InboundMessage::MacroError {
                error: "Line 3: bad axis".into(),
            },
            &mut fx,
        );
        assert!(fx.events.iter().any(|e| matches!(
            e,
            ClientEvent::EntryFinished { error: Some(_), .. }
        )));
        let timer = fx.last_timer();
        q.on_settle(timer, &mut fx);
        assert_eq!(q.in_flight().unwrap().target, "A2");
    }

    #[test]
    fn test_pause_then_resume_keeps_remaining_sequence() {
        let mut fx = Recorder::new();
        let mut q = queue();
        q.enqueue_all(entries(&["A1", "A2", "A3"])).unwrap();
        q.start(&mut fx).unwrap();
        q.on_program_finished(&completed(), &mut fx);
        q.on_settle(fx.last_timer(), &mut fx);
        assert_eq!(q.in_flight().unwrap().target, "A2");

        q.pause(&mut fx).unwrap();
        assert_eq!(q.state(), QueueState::Paused);
        assert!(q.in_flight().is_none());
        assert_eq!(q.pending().count(), 0);
        let parked: Vec<_> = q.cached().map(|e| e.target.as_str()).collect();
        assert_eq!(parked, ["A2", "A3"]);
        assert_eq!(stops(&fx.sent), 1);

        // A late completion for the abandoned A2 run does nothing.
        q.on_program_finished(&completed(), &mut fx);
        assert_eq!(q.completed(), 1);

        fx.take_sent();
        q.resume(&mut fx).unwrap();
        assert_eq!(q.state(), QueueState::Running);
        assert_eq!(q.in_flight().unwrap().target, "A2");
        assert_eq!(q.pending().map(|e| e.target.as_str()).collect::<Vec<_>>(), ["A3"]);
        assert_eq!(q.cached().count(), 0);
        assert_eq!(run_targets(&fx.sent), vec![(105.5, 17.0)]);
    }

    #[test]
    fn test_pause_during_settle_cancels_timer() {
        let mut fx = Recorder::new();
        let mut q = queue();
        q.enqueue_all(entries(&["A1", "A2"])).unwrap();
        q.start(&mut fx).unwrap();
        q.on_program_finished(&completed(), &mut fx);
        let settle = fx.last_timer();

        q.pause(&mut fx).unwrap();
        assert!(fx.cancelled.contains(&settle));
        assert_eq!(q.cached().count(), 1);

        // The aborted timer fires anyway: ignored.
        q.on_settle(settle, &mut fx);
        assert!(q.in_flight().is_none());
    }

    #[test]
    fn test_idempotent_pause_and_resume() {
        let mut fx = Recorder::new();
        let mut q = queue();
        q.enqueue_all(entries(&["A1", "A2"])).unwrap();
        q.start(&mut fx).unwrap();

        q.resume(&mut fx).unwrap();
        assert_eq!(q.state(), QueueState::Running);
        assert_eq!(run_targets(&fx.sent).len(), 1);

        q.pause(&mut fx).unwrap();
        let sent = fx.sent.len();
        let events = fx.events.len();
        q.pause(&mut fx).unwrap();
        assert_eq!(q.state(), QueueState::Paused);
        assert_eq!(fx.sent.len(), sent);
        assert_eq!(fx.events.len(), events);
        assert_eq!(q.cached().count(), 2);
    }

    #[test]
    fn test_pause_and_resume_rejected_when_idle() {
        let mut fx = Recorder::new();
        let mut q = queue();
        assert!(q.pause(&mut fx).is_err());
        assert!(q.resume(&mut fx).is_err());
        assert!(q.cancel(&mut fx).is_err());
        assert!(fx.sent.is_empty());
    }

    #[test]
    fn test_cancel_from_running_and_paused() {
        for pause_first in [false, true] {
            let mut fx = Recorder::new();
            let mut q = queue();
            q.enqueue_all(entries(&["A1", "A2"])).unwrap();
            q.start(&mut fx).unwrap();
            if pause_first {
                q.pause(&mut fx).unwrap();
            }
            fx.take_sent();
            fx.take_events();

            q.cancel(&mut fx).unwrap();

            assert_eq!(q.state(), QueueState::Idle);
            assert!(q.in_flight().is_none());
            assert_eq!(q.pending().count(), 0);
            assert_eq!(q.cached().count(), 0);
            assert_eq!(fx.sent, vec![OutboundMessage::StopMacro {}]);
            assert_eq!(
                fx.events,
                vec![
                    ClientEvent::QueueState(QueueState::Stopping),
                    ClientEvent::QueueState(QueueState::Idle),
                ]
            );
        }
    }

    #[test]
    fn test_disconnect_keeps_in_flight_entry() {
        let mut fx = Recorder::new();
        let mut q = queue();
        q.enqueue_all(entries(&["A1"])).unwrap();
        q.start(&mut fx).unwrap();

        // Channel drops: nothing in the queue reacts.
        fx.connected = false;
        assert_eq!(q.in_flight().unwrap().target, "A1");

        // Completion after reconnect resolves it.
        fx.connected = true;
        q.on_program_finished(&completed(), &mut fx);
        assert_eq!(q.state(), QueueState::Idle);
        assert_eq!(fx.events.last(), Some(&ClientEvent::QueueCompleted { count: 1 }));
    }

    #[test]
    fn test_dispatch_while_disconnected_stays_in_flight() {
        let mut fx = Recorder::new();
        fx.connected = false;
        let mut q = queue();
        q.enqueue_all(entries(&["A1"])).unwrap();
        q.start(&mut fx).unwrap();

        assert!(fx.sent.is_empty());
        assert_eq!(q.in_flight().unwrap().target, "A1");
        assert!(q.cancel(&mut fx).is_ok());
    }

    fn stopped() -> InboundMessage {
        InboundMessage::MacroError {
            error: "Macro P stopped".into(),
        }
    }

    #[test]
    fn test_pause_in_settle_gap_sends_no_stop() {
        let mut fx = Recorder::new();
        let mut q = queue();
        q.enqueue_all(entries(&["A1", "A2", "A3"])).unwrap();
        q.start(&mut fx).unwrap();
        q.on_program_finished(&completed(), &mut fx);

        q.pause(&mut fx).unwrap();
        assert_eq!(stops(&fx.sent), 0);
        assert!(!q.awaiting_stop());

        q.resume(&mut fx).unwrap();
        assert_eq!(q.in_flight().unwrap().target, "A2");

        // The relay answers A2 only; nothing else is credited.
        q.on_program_finished(&completed(), &mut fx);
        assert_eq!(q.completed(), 2);
        let finished: Vec<_> = fx
            .events
            .iter()
            .filter_map(|e| match e {
                ClientEvent::EntryFinished { entry, error } => Some((entry.target.as_str(), error.clone())),
                _ => None,
            })
            .collect();
        assert_eq!(finished, [("A1", None), ("A2", None)]);
    }

    #[test]
    fn test_resume_waits_for_stopped_run_to_report() {
        let mut fx = Recorder::new();
        let mut q = queue();
        q.enqueue_all(entries(&["A1", "A2"])).unwrap();
        q.start(&mut fx).unwrap();

        q.pause(&mut fx).unwrap();
        assert_eq!(stops(&fx.sent), 1);
        assert!(q.awaiting_stop());
        let (ack, kind) = fx.live_timers().pop().unwrap();
        assert_eq!(kind, TimerKind::StopAck);

        fx.take_sent();
        q.resume(&mut fx).unwrap();
        assert_eq!(q.state(), QueueState::Running);
        assert!(q.in_flight().is_none());
        assert!(run_targets(&fx.sent).is_empty(), "held until the stopped run reports");

        q.on_program_finished(&stopped(), &mut fx);
        assert!(fx.cancelled.contains(&ack));
        assert_eq!(q.completed(), 0, "the stop outcome is not an entry result");
        assert_eq!(q.in_flight().unwrap().target, "A1");
        assert_eq!(run_targets(&fx.sent), vec![(105.5, 4.5)]);

        q.on_program_finished(&completed(), &mut fx);
        assert_eq!(q.completed(), 1);
        assert!(fx.events.iter().any(|e| matches!(
            e,
            ClientEvent::EntryFinished { entry, error: None } if entry.target == "A1"
        )));
    }

    #[test]
    fn test_unreported_stop_times_out() {
        let mut fx = Recorder::new();
        let mut q = queue().with_stop_timeout(Duration::from_secs(2));
        q.enqueue_all(entries(&["A1"])).unwrap();
        q.start(&mut fx).unwrap();
        q.pause(&mut fx).unwrap();
        let ack = fx.last_timer();
        assert_eq!(fx.scheduled.last().unwrap().2, Duration::from_secs(2));

        q.resume(&mut fx).unwrap();
        assert!(q.in_flight().is_none());

        q.on_stop_timeout(TimerId(ack.0 + 100), &mut fx);
        assert!(q.in_flight().is_none(), "unknown timer ignored");

        q.on_stop_timeout(ack, &mut fx);
        assert!(!q.awaiting_stop());
        assert_eq!(q.in_flight().unwrap().target, "A1");
    }

    #[test]
    fn test_start_after_cancel_waits_for_stopped_run() {
        let mut fx = Recorder::new();
        let mut q = queue();
        q.enqueue_all(entries(&["A1", "A2"])).unwrap();
        q.start(&mut fx).unwrap();
        q.cancel(&mut fx).unwrap();
        assert!(q.awaiting_stop());

        fx.take_sent();
        q.enqueue_all(entries(&["B1"])).unwrap();
        q.start(&mut fx).unwrap();
        assert!(fx.sent.is_empty());

        q.on_program_finished(&stopped(), &mut fx);
        assert_eq!(q.completed(), 0);
        assert_eq!(q.in_flight().unwrap().target, "B1");
    }
}
