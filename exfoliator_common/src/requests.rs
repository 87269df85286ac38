//! Outbound intents (client to relay).

use serde::{Deserialize, Serialize};

use crate::{Axis, CodecError, Envelope, MacroVariables, PneumaticAction, VacuumAction};

/// Intents the client sends to the relay.
///
/// Variants without fields are written as empty structs so the frame always
/// carries a `data` object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum OutboundMessage {
    // Bootstrap
    #[serde(rename = "get_arduino_status")]
    GetArduinoStatus {},

    #[serde(rename = "get_macros")]
    GetMacros {},

    // Motion
    /// Home one axis, or every axis when `axis` is absent.
    #[serde(rename = "home_axis")]
    HomeAxis {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        axis: Option<Axis>,
    },

    #[serde(rename = "enable_axis")]
    EnableAxis { axis: Axis },

    #[serde(rename = "disable_motor")]
    DisableMotor { axis: Axis },

    #[serde(rename = "move_position")]
    MovePosition { axis: Axis, position: f64 },

    // Actuators
    #[serde(rename = "pneumatic_control")]
    PneumaticControl {
        component: String,
        action: PneumaticAction,
    },

    #[serde(rename = "vacuum_control")]
    VacuumControl {
        component: String,
        action: VacuumAction,
    },

    #[serde(rename = "set_temperature")]
    SetTemperature { temperature: f64 },

    #[serde(rename = "emergency_stop")]
    EmergencyStop {},

    #[serde(rename = "tape_motor")]
    TapeMotor { speed: i64, torque: i64, time: f64 },

    /// Free-form controller command text, forwarded verbatim.
    #[serde(rename = "send_command")]
    SendCommand { command: String },

    // Programs
    #[serde(rename = "save_macro")]
    SaveMacro {
        name: String,
        content: String,
        #[serde(default)]
        variables: MacroVariables,
    },

    #[serde(rename = "load_macro")]
    LoadMacro { name: String },

    #[serde(rename = "run_macro")]
    RunMacro {
        name: String,
        #[serde(default)]
        variables: MacroVariables,
    },

    #[serde(rename = "delete_macro")]
    DeleteMacro { name: String },

    #[serde(rename = "stop_macro")]
    StopMacro {},
}

impl OutboundMessage {
    /// The wire event name.
    pub fn event_name(&self) -> &'static str {
        match self {
            OutboundMessage::GetArduinoStatus {} => "get_arduino_status",
            OutboundMessage::GetMacros {} => "get_macros",
            OutboundMessage::HomeAxis { .. } => "home_axis",
            OutboundMessage::EnableAxis { .. } => "enable_axis",
            OutboundMessage::DisableMotor { .. } => "disable_motor",
            OutboundMessage::MovePosition { .. } => "move_position",
            OutboundMessage::PneumaticControl { .. } => "pneumatic_control",
            OutboundMessage::VacuumControl { .. } => "vacuum_control",
            OutboundMessage::SetTemperature { .. } => "set_temperature",
            OutboundMessage::EmergencyStop {} => "emergency_stop",
            OutboundMessage::TapeMotor { .. } => "tape_motor",
            OutboundMessage::SendCommand { .. } => "send_command",
            OutboundMessage::SaveMacro { .. } => "save_macro",
            OutboundMessage::LoadMacro { .. } => "load_macro",
            OutboundMessage::RunMacro { .. } => "run_macro",
            OutboundMessage::DeleteMacro { .. } => "delete_macro",
            OutboundMessage::StopMacro {} => "stop_macro",
        }
    }

    pub fn encode(&self) -> Result<String, CodecError> {
        serde_json::to_string(self).map_err(|source| CodecError::Encode {
            event: self.event_name(),
            source,
        })
    }

    /// Decodes a client frame. Used by the relay side.
    pub fn decode(frame: &str) -> Result<Self, CodecError> {
        Envelope::parse(frame)?.into_tagged()
    }
}
