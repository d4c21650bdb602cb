//! Error types for robot connection and sequence execution

use std::time::Duration;
use thiserror::Error;

use crate::connection::ConnectionState;

/// Faults reported by the underlying robot driver.
///
/// These are the raw causes that bubble up through the higher-level
/// operation errors, carrying enough detail for an operator to tell a
/// dropped link apart from a stalled motion.
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Robot controller at {host}:{port} is unreachable")]
    Unreachable { host: String, port: u16 },

    #[error("Not connected to the robot controller")]
    NotConnected,

    #[error("Controller rejected command: {0}")]
    Rejected(String),

    #[error("Move did not finish within {millis}ms")]
    MoveTimeout { millis: u64 },

    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Errors from `ConnectionManager::connect`.
#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("Robot is already connected (state: {0})")]
    AlreadyConnected(ConnectionState),

    #[error("Another operation is in flight")]
    Busy,

    #[error("Unable to reach the robot controller")]
    LinkUnreachable(#[source] LinkError),

    #[error("Failed to enable the robot")]
    EnableFailed(#[source] LinkError),

    #[error("Robot kinematics not ready within {timeout:?}")]
    ReadyTimeout {
        timeout: Duration,
        #[source]
        source: Option<LinkError>,
    },
}

/// Errors from `ConnectionManager::disconnect`.
#[derive(Error, Debug)]
pub enum DisconnectError {
    #[error("Robot is not connected")]
    NotConnected,

    #[error("Another operation is in flight")]
    Busy,
}

/// Errors from `SequenceExecutor::run`.
///
/// `StepFailed` carries the zero-based index of the step that stopped the
/// sequence so an operator knows exactly where the arm came to rest.
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Robot is not ready for motion (state: {0})")]
    RobotNotReady(ConnectionState),

    #[error("Another operation is in flight")]
    Busy,

    #[error("Sequence cancelled before step {step}")]
    Cancelled { step: usize },

    #[error("Step {step} failed")]
    StepFailed {
        step: usize,
        #[source]
        source: LinkError,
    },
}

/// Errors loading the daemon configuration or sequence definitions.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Sequence(#[from] SequenceError),
}

/// Validation failures in a motion sequence definition.
#[derive(Error, Debug, PartialEq)]
pub enum SequenceError {
    #[error("Sequence '{name}' has no steps")]
    EmptySteps { name: String },

    #[error("Sequence '{name}' declares a delay for step {index} but has only {len} steps")]
    DelayOutOfRange {
        name: String,
        index: usize,
        len: usize,
    },

    #[error("Sequence '{name}' step {index}: wait_until_finished requires timeout_ms > 0")]
    ZeroTimeout { name: String, index: usize },

    #[error("Sequence '{name}' step {index}: speed_percent {speed} is outside (0, 100]")]
    SpeedOutOfRange {
        name: String,
        index: usize,
        speed: f64,
    },

    #[error("Duplicate sequence name '{name}'")]
    DuplicateName { name: String },
}
