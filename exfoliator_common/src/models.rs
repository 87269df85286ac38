//! Value types shared by outbound intents and inbound snapshots.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A motorized stage axis.
///
/// Intents spell axes in upper case (`"X"`), the relay's motor-state
/// snapshots key them in lower case (`"x"`); both decode.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Axis {
    #[serde(rename = "X", alias = "x")]
    X,
    #[serde(rename = "Y", alias = "y")]
    Y,
}

impl Axis {
    pub const ALL: [Axis; 2] = [Axis::X, Axis::Y];

    pub fn as_str(&self) -> &'static str {
        match self {
            Axis::X => "X",
            Axis::Y => "Y",
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Axis {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "X" | "x" => Ok(Axis::X),
            "Y" | "y" => Ok(Axis::Y),
            other => Err(format!("unknown axis '{}'", other)),
        }
    }
}

/// Drive state reported per axis by the controller.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorState {
    #[serde(rename = "MOTOR_DISABLED")]
    Disabled,
    #[serde(rename = "MOTOR_ENABLING")]
    Enabling,
    #[serde(rename = "MOTOR_FAULTED")]
    Faulted,
    #[serde(rename = "MOTOR_READY")]
    Ready,
    #[serde(rename = "MOTOR_MOVING")]
    Moving,
}

impl MotorState {
    /// Whether the drive is energised and accepting motion.
    ///
    /// `Enabling` is not yet enabled: an enable request is confirmed only once
    /// the drive reports `Ready` or `Moving`.
    pub fn is_enabled(&self) -> bool {
        matches!(self, MotorState::Ready | MotorState::Moving)
    }
}

/// Pneumatic cylinder action.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PneumaticAction {
    Extend,
    Retract,
}

impl From<bool> for PneumaticAction {
    fn from(extended: bool) -> Self {
        if extended {
            PneumaticAction::Extend
        } else {
            PneumaticAction::Retract
        }
    }
}

/// Vacuum line action.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VacuumAction {
    On,
    Off,
}

impl From<bool> for VacuumAction {
    fn from(on: bool) -> Self {
        if on {
            VacuumAction::On
        } else {
            VacuumAction::Off
        }
    }
}

/// Variable bindings passed through to a stored program.
///
/// The program text refers to calibrated positions by name; the relay
/// substitutes these values before execution. Unset bindings keep the
/// relay's current value.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq)]
pub struct MacroVariables {
    #[serde(rename = "CHIP_X", default, skip_serializing_if = "Option::is_none")]
    pub chip_x: Option<f64>,
    #[serde(rename = "CHIP_Y", default, skip_serializing_if = "Option::is_none")]
    pub chip_y: Option<f64>,
    #[serde(rename = "STAGE_X", default, skip_serializing_if = "Option::is_none")]
    pub stage_x: Option<f64>,
}

impl MacroVariables {
    pub fn is_empty(&self) -> bool {
        self.chip_x.is_none() && self.chip_y.is_none() && self.stage_x.is_none()
    }
}

/// Heater reading and setpoint.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Temperature {
    #[serde(rename = "temperature")]
    pub current: f64,
    #[serde(rename = "set_temperature")]
    pub target: f64,
}

/// Stage position in millimetres.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct StagePosition {
    pub x: f64,
    pub y: f64,
}

/// Tape feed motor parameters.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct TapeState {
    pub speed: i64,
    pub torque: i64,
}

/// Relay-side fate of a free-form or control command.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Queued,
    NotConnected,
}
