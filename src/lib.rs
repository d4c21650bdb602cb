//! crid - CRI robot control daemon library
//!
//! Transport-agnostic control core for a CRI-protocol robot arm: the
//! connection lifecycle state machine, a declarative motion-sequence
//! engine, and a thin command boundary. Any transport (the bundled stdin
//! stream, HTTP, pub/sub) can sit on top of `CommandService`.
//!
//! # Architecture
//!
//! - **ConnectionManager**: owns the connection state machine; the only
//!   component that may flip connection state
//! - **SequenceExecutor**: runs named motion sequences step by step with
//!   abort-on-first-error semantics
//! - **SequenceLibrary**: immutable registry of routines loaded from YAML
//! - **RobotLink**: capability trait of the low-level driver; `CriClient`
//!   is the bundled TCP implementation
//! - **CommandService**: maps external requests to manager/executor calls
//! - **CommandStream**: newline-delimited command transport over
//!   stdin/stdout

pub mod config;
pub mod connection;
pub mod cri;
pub mod error;
pub mod executor;
pub mod link;
pub mod sequence;
pub mod service;
pub mod stream;

// High-level exports for easy usage
pub use config::{Config, RobotConfig, SequencesConfig, DEFAULT_CRI_PORT};
pub use connection::{ConnectionManager, ConnectionState, RobotSession};
pub use cri::CriClient;
pub use error::{
    ConfigError, ConnectError, DisconnectError, ExecutionError, LinkError, SequenceError,
};
pub use executor::SequenceExecutor;
pub use link::{RobotLink, EXTERNAL_AXES};
pub use sequence::{
    CartesianMove, JointMove, MotionSequence, MotionStep, SequenceLibrary,
    DEFAULT_MOVE_TIMEOUT_MS,
};
pub use service::{CommandResponse, CommandService, ResponseStatus};
pub use stream::{parse_command, CommandStream, StreamCommand};
