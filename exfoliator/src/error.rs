use exfoliator_common::CodecError;
use thiserror::Error;

use crate::QueueState;

/// Errors surfaced by the client handle.
///
/// None of these stop the runtime; the worst case is a disconnected client
/// waiting for the next reconnect.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The channel is not connected. The intent was dropped, not queued.
    #[error("channel unavailable")]
    ChannelUnavailable,

    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Rejected at the call site before anything was sent.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Calibration(#[from] CalibrationError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("client runtime has shut down")]
    Shutdown,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("target '{0}' is not a row label followed by a column index")]
    MalformedTarget(String),

    #[error("target '{target}': no calibration for row '{row}'")]
    UnknownRow { target: String, row: String },

    #[error("target '{target}': no calibration for column '{column}'")]
    UnknownColumn { target: String, column: String },

    #[error("calibration table has no {0}")]
    Empty(&'static str),

    #[error("calibration value for {0} is not finite")]
    NonFinite(String),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum QueueError {
    #[error("cannot enqueue an empty batch")]
    EmptyBatch,

    #[error("cannot {op} while queue is {state:?}")]
    InvalidTransition { op: &'static str, state: QueueState },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("environment variable {var}={value} is not valid")]
    Env { var: &'static str, value: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
