//! Inbound events (relay to client).

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::{
    Axis, CodecError, CommandStatus, Envelope, MotorState, StagePosition, TapeState, Temperature,
};

/// Every event name the relay is known to send.
pub const INBOUND_EVENTS: &[&str] = &[
    "arduino_connection_status",
    "connection_status",
    "temperature_update",
    "position_update",
    "motor_states_update",
    "pneumatics_update",
    "vacuums_update",
    "tape_update",
    "estop_update",
    "command_sent",
    "machine_response",
    "macro_list",
    "macro_created",
    "macro_deleted",
    "macro_executed",
    "macro_error",
    "macro_content",
    "macro_completed",
    "macro_stopped",
];

/// Events the relay sends to the client.
///
/// Snapshot variants (`*_update`) carry the whole category; consumers replace
/// their copy rather than merging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum InboundMessage {
    // Relay to controller link
    #[serde(rename = "connection_status")]
    ConnectionStatus { connected: bool },

    #[serde(rename = "arduino_connection_status")]
    ArduinoConnectionStatus { connected: bool },

    // Snapshots
    #[serde(rename = "temperature_update")]
    Temperature(Temperature),

    #[serde(rename = "position_update")]
    Position(StagePosition),

    /// Per-axis drive state. Keys that are not a known axis are dropped.
    #[serde(rename = "motor_states_update", deserialize_with = "known_axes")]
    MotorStates(BTreeMap<Axis, MotorState>),

    #[serde(rename = "pneumatics_update")]
    Pneumatics(BTreeMap<String, bool>),

    #[serde(rename = "vacuums_update")]
    Vacuums(BTreeMap<String, bool>),

    #[serde(rename = "tape_update")]
    Tape(TapeState),

    #[serde(rename = "estop_update")]
    EmergencyStop { triggered: bool },

    // Command echo
    #[serde(rename = "command_sent")]
    CommandSent {
        command: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<CommandStatus>,
    },

    #[serde(rename = "machine_response")]
    MachineResponse { response: String },

    // Programs
    #[serde(rename = "macro_list")]
    MacroList { macros: Vec<String> },

    #[serde(rename = "macro_created")]
    MacroCreated { name: String },

    #[serde(rename = "macro_deleted")]
    MacroDeleted { name: String },

    #[serde(rename = "macro_executed")]
    MacroExecuted { name: String },

    #[serde(rename = "macro_error")]
    MacroError { error: String },

    #[serde(rename = "macro_content")]
    MacroContent { name: String, content: String },

    #[serde(rename = "macro_completed")]
    MacroCompleted { name: String },

    #[serde(rename = "macro_stopped")]
    MacroStopped { success: bool },

    /// An event name outside [`INBOUND_EVENTS`]. Never produced by the relay
    /// side, so it has no wire form.
    #[serde(skip)]
    Unrecognized { event: String },
}

fn known_axes<'de, D>(deserializer: D) -> Result<BTreeMap<Axis, MotorState>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, MotorState>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .filter_map(|(key, state)| key.parse::<Axis>().ok().map(|axis| (axis, state)))
        .collect())
}

impl InboundMessage {
    pub fn decode(frame: &str) -> Result<Self, CodecError> {
        let envelope = Envelope::parse(frame)?;
        if !INBOUND_EVENTS.contains(&envelope.event.as_str()) {
            return Ok(InboundMessage::Unrecognized {
                event: envelope.event,
            });
        }
        envelope.into_tagged()
    }

    pub fn encode(&self) -> Result<String, CodecError> {
        serde_json::to_string(self).map_err(|source| CodecError::Encode {
            event: self.event_name(),
            source,
        })
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            InboundMessage::ConnectionStatus { .. } => "connection_status",
            InboundMessage::ArduinoConnectionStatus { .. } => "arduino_connection_status",
            InboundMessage::Temperature(_) => "temperature_update",
            InboundMessage::Position(_) => "position_update",
            InboundMessage::MotorStates(_) => "motor_states_update",
            InboundMessage::Pneumatics(_) => "pneumatics_update",
            InboundMessage::Vacuums(_) => "vacuums_update",
            InboundMessage::Tape(_) => "tape_update",
            InboundMessage::EmergencyStop { .. } => "estop_update",
            InboundMessage::CommandSent { .. } => "command_sent",
            InboundMessage::MachineResponse { .. } => "machine_response",
            InboundMessage::MacroList { .. } => "macro_list",
            InboundMessage::MacroCreated { .. } => "macro_created",
            InboundMessage::MacroDeleted { .. } => "macro_deleted",
            InboundMessage::MacroExecuted { .. } => "macro_executed",
            InboundMessage::MacroError { .. } => "macro_error",
            InboundMessage::MacroContent { .. } => "macro_content",
            InboundMessage::MacroCompleted { .. } => "macro_completed",
            InboundMessage::MacroStopped { .. } => "macro_stopped",
            InboundMessage::Unrecognized { .. } => "unrecognized",
        }
    }

    /// Whether this event replaces a category of device state.
    pub fn is_snapshot(&self) -> bool {
        matches!(
            self,
            InboundMessage::ConnectionStatus { .. }
                | InboundMessage::ArduinoConnectionStatus { .. }
                | InboundMessage::Temperature(_)
                | InboundMessage::Position(_)
                | InboundMessage::MotorStates(_)
                | InboundMessage::Pneumatics(_)
                | InboundMessage::Vacuums(_)
                | InboundMessage::Tape(_)
                | InboundMessage::EmergencyStop { .. }
        )
    }

    /// Whether this event ends the program that is currently executing,
    /// successfully or not.
    pub fn ends_program(&self) -> bool {
        matches!(
            self,
            InboundMessage::MacroCompleted { .. } | InboundMessage::MacroError { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_known_event_is_listed() {
        let samples = [
            InboundMessage::ConnectionStatus { connected: true },
            InboundMessage::MacroStopped { success: true },
            InboundMessage::Tape(TapeState { speed: 1, torque: 2 }),
        ];
        for msg in samples {
            assert!(INBOUND_EVENTS.contains(&msg.event_name()));
        }
    }

    #[test]
    fn test_motor_states_drop_unknown_axes() {
        let msg = InboundMessage::decode(
            r#"{"event":"motor_states_update","data":{"x":"MOTOR_READY","z":"MOTOR_FAULTED"}}"#,
        )
        .unwrap();
        let mut expected = BTreeMap::new();
        expected.insert(Axis::X, MotorState::Ready);
        assert_eq!(msg, InboundMessage::MotorStates(expected));
    }

    #[test]
    fn test_unrecognized_cannot_be_encoded() {
        let msg = InboundMessage::Unrecognized {
            event: "status_ping".into(),
        };
        assert!(matches!(msg.encode(), Err(CodecError::Encode { .. })));
    }
}
