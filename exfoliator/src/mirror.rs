//! Local copy of device state.
//!
//! Only decoded snapshot events write here. Each snapshot replaces its whole
//! category; nothing is merged across categories and nothing is inferred.
//! Categories the device has not reported yet stay `None` or empty.

use std::collections::BTreeMap;

use exfoliator_common::{Axis, InboundMessage, MotorState, StagePosition, TapeState, Temperature};
use serde::Serialize;

use crate::SubjectKey;

/// One replaced category, as published to observers.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub enum MirrorUpdate {
    ControllerLink(bool),
    Temperature(Temperature),
    Position(StagePosition),
    MotorStates(BTreeMap<Axis, MotorState>),
    Pneumatics(BTreeMap<String, bool>),
    Vacuums(BTreeMap<String, bool>),
    Tape(TapeState),
    EmergencyStop(bool),
}

#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct DeviceStateMirror {
    /// Relay to controller link, distinct from the client's own channel.
    controller_connected: Option<bool>,
    temperature: Option<Temperature>,
    position: Option<StagePosition>,
    motor_states: BTreeMap<Axis, MotorState>,
    pneumatics: BTreeMap<String, bool>,
    vacuums: BTreeMap<String, bool>,
    tape: Option<TapeState>,
    emergency_stopped: Option<bool>,
    stale: bool,
}

impl DeviceStateMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a snapshot event. Returns the replaced category, or `None` for
    /// events that carry no device state.
    pub fn apply(&mut self, msg: &InboundMessage) -> Option<MirrorUpdate> {
        if !msg.is_snapshot() {
            return None;
        }
        let update = match msg {
            InboundMessage::ConnectionStatus { connected }
            | InboundMessage::ArduinoConnectionStatus { connected } => {
                self.controller_connected = Some(*connected);
                MirrorUpdate::ControllerLink(*connected)
            }
            InboundMessage::Temperature(t) => {
                self.temperature = Some(*t);
                MirrorUpdate::Temperature(*t)
            }
            InboundMessage::Position(p) => {
                self.position = Some(*p);
                MirrorUpdate::Position(*p)
            }
            InboundMessage::MotorStates(states) => {
                self.motor_states = states.clone();
                MirrorUpdate::MotorStates(states.clone())
            }
            InboundMessage::Pneumatics(map) => {
                self.pneumatics = map.clone();
                MirrorUpdate::Pneumatics(map.clone())
            }
            InboundMessage::Vacuums(map) => {
                self.vacuums = map.clone();
                MirrorUpdate::Vacuums(map.clone())
            }
            InboundMessage::Tape(tape) => {
                self.tape = Some(*tape);
                MirrorUpdate::Tape(*tape)
            }
            InboundMessage::EmergencyStop { triggered } => {
                self.emergency_stopped = Some(*triggered);
                MirrorUpdate::EmergencyStop(*triggered)
            }
            _ => return None,
        };
        self.stale = false;
        Some(update)
    }

    /// Marks every value as possibly out of date. Values are kept; the next
    /// snapshot clears the mark.
    pub fn mark_stale(&mut self) {
        self.stale = true;
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// The device-reported boolean for a toggleable subject. An axis counts as
    /// on when its drive is ready or moving.
    pub fn subject_value(&self, key: &SubjectKey) -> Option<bool> {
        match key {
            SubjectKey::Axis(axis) => self.motor_states.get(axis).map(MotorState::is_enabled),
            SubjectKey::Pneumatic(name) => self.pneumatics.get(name).copied(),
            SubjectKey::Vacuum(name) => self.vacuums.get(name).copied(),
        }
    }

    pub fn controller_connected(&self) -> Option<bool> {
        self.controller_connected
    }

    pub fn temperature(&self) -> Option<Temperature> {
        self.temperature
    }

    pub fn position(&self) -> Option<StagePosition> {
        self.position
    }

    pub fn motor_state(&self, axis: Axis) -> Option<MotorState> {
        self.motor_states.get(&axis).copied()
    }

    pub fn motor_states(&self) -> &BTreeMap<Axis, MotorState> {
        &self.motor_states
    }

    pub fn pneumatics(&self) -> &BTreeMap<String, bool> {
        &self.pneumatics
    }

    pub fn vacuums(&self) -> &BTreeMap<String, bool> {
        &self.vacuums
    }

    pub fn tape(&self) -> Option<TapeState> {
        self.tape
    }

    pub fn emergency_stopped(&self) -> Option<bool> {
        self.emergency_stopped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pneumatics(pairs: &[(&str, bool)]) -> InboundMessage {
        InboundMessage::Pneumatics(pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect())
    }

    #[test]
    fn test_snapshot_replaces_whole_category() {
        let mut mirror = DeviceStateMirror::new();
        mirror.apply(&pneumatics(&[("nozzle", true), ("stage", true)]));
        mirror.apply(&pneumatics(&[("stamp", false)]));

        assert_eq!(mirror.pneumatics().len(), 1);
        assert_eq!(mirror.subject_value(&SubjectKey::pneumatic("nozzle")), None);
        assert_eq!(mirror.subject_value(&SubjectKey::pneumatic("stamp")), Some(false));
    }

    #[test]
    fn test_categories_are_independent() {
        let mut mirror = DeviceStateMirror::new();
        mirror.apply(&pneumatics(&[("nozzle", true)]));
        let update = mirror.apply(&InboundMessage::Vacuums(
            [("chuck".to_string(), true)].into_iter().collect(),
        ));

        assert!(matches!(update, Some(MirrorUpdate::Vacuums(_))));
        assert_eq!(mirror.subject_value(&SubjectKey::pneumatic("nozzle")), Some(true));
        assert_eq!(mirror.subject_value(&SubjectKey::vacuum("chuck")), Some(true));
    }

    #[test]
    fn test_nothing_is_inferred() {
        let mirror = DeviceStateMirror::new();
        assert_eq!(mirror.temperature(), None);
        assert_eq!(mirror.emergency_stopped(), None);
        assert_eq!(mirror.subject_value(&SubjectKey::Axis(Axis::X)), None);
        assert_eq!(mirror.subject_value(&SubjectKey::pneumatic("nozzle")), None);
    }

    #[test]
    fn test_axis_enabled_only_when_ready_or_moving() {
        let mut mirror = DeviceStateMirror::new();
        let key = SubjectKey::Axis(Axis::Y);
        for (state, expected) in [
            (MotorState::Disabled, false),
            (MotorState::Enabling, false),
            (MotorState::Faulted, false),
            (MotorState::Ready, true),
            (MotorState::Moving, true),
        ] {
            mirror.apply(&InboundMessage::MotorStates([(Axis::Y, state)].into_iter().collect()));
            assert_eq!(mirror.subject_value(&key), Some(expected), "{:?}", state);
        }
    }

    #[test]
    fn test_non_snapshot_events_leave_mirror_alone() {
        let mut mirror = DeviceStateMirror::new();
        let before = mirror.clone();
        assert_eq!(
            mirror.apply(&InboundMessage::MacroCompleted { name: "P".into() }),
            None
        );
        assert_eq!(mirror, before);
    }

    #[test]
    fn test_stale_until_next_snapshot() {
        let mut mirror = DeviceStateMirror::new();
        mirror.apply(&InboundMessage::EmergencyStop { triggered: false });
        mirror.mark_stale();
        assert!(mirror.is_stale());
        assert_eq!(mirror.emergency_stopped(), Some(false));

        mirror.apply(&InboundMessage::MacroList { macros: Vec::new() });
        assert!(mirror.is_stale(), "only snapshots clear the mark");

        mirror.apply(&InboundMessage::ConnectionStatus { connected: true });
        assert!(!mirror.is_stale());
        assert_eq!(mirror.controller_connected(), Some(true));
    }
}
