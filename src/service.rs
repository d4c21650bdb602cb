//! Command service boundary
//!
//! Thin mapping from external requests (connect, disconnect, run a named
//! sequence, status) onto the connection manager and sequence executor.
//! Responses are serde payloads so any transport can serialize them; this
//! crate's stdin/stdout stream does, and an HTTP or pub/sub front end would
//! reuse the same structs.

use serde::{Deserialize, Serialize};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{error, info};

use crate::config::RobotConfig;
use crate::connection::{ConnectionManager, ConnectionState};
use crate::executor::SequenceExecutor;
use crate::sequence::SequenceLibrary;

/// Outcome tag of a command response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Connected,
    Disconnected,
    Success,
    Error,
}

/// Wire shape of every command outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResponse {
    pub status: ResponseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CommandResponse {
    pub fn connected() -> Self {
        Self {
            status: ResponseStatus::Connected,
            message: None,
        }
    }

    pub fn disconnected() -> Self {
        Self {
            status: ResponseStatus::Disconnected,
            message: None,
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Success,
            message: Some(message.into()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            message: Some(message.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.status == ResponseStatus::Error
    }
}

/// Maps external requests to manager/executor calls.
pub struct CommandService {
    manager: Arc<ConnectionManager>,
    executor: SequenceExecutor,
    library: Arc<SequenceLibrary>,
    robot: RobotConfig,
}

impl CommandService {
    pub fn new(
        manager: Arc<ConnectionManager>,
        library: Arc<SequenceLibrary>,
        robot: RobotConfig,
    ) -> Self {
        Self {
            manager,
            executor: SequenceExecutor::new(),
            library,
            robot,
        }
    }

    /// Connect to the configured robot controller.
    pub fn connect_robot(&self) -> CommandResponse {
        match self.manager.connect(&self.robot.host, self.robot.port) {
            Ok(_session) => CommandResponse::connected(),
            Err(e) => {
                let message = describe(&e);
                error!("Connect failed: {}", message);
                CommandResponse::error(message)
            }
        }
    }

    pub fn disconnect_robot(&self) -> CommandResponse {
        match self.manager.disconnect() {
            Ok(()) => CommandResponse::disconnected(),
            Err(e) => {
                let message = describe(&e);
                error!("Disconnect failed: {}", message);
                CommandResponse::error(message)
            }
        }
    }

    /// Run the named sequence. Unknown names are rejected without touching
    /// the robot.
    pub async fn execute_command(&self, name: &str) -> CommandResponse {
        let sequence = match self.library.get(name) {
            Some(sequence) => sequence,
            None => {
                return CommandResponse::error(format!("Unknown command: {}", name));
            }
        };

        info!("Executing command '{}'", name);
        match self.executor.run(&self.manager, sequence).await {
            Ok(()) => CommandResponse::success(format!("Sequence '{}' completed", name)),
            Err(e) => {
                let message = describe(&e);
                error!("Command '{}' failed: {}", name, message);
                CommandResponse::error(message)
            }
        }
    }

    /// Connection and registry snapshot; pure read.
    pub fn status(&self) -> serde_json::Value {
        let session = self.manager.session();
        serde_json::json!({
            "state": self.manager.current_state().as_str(),
            "link_connected": self.manager.link_connected(),
            "session": session.map(|s| serde_json::json!({
                "host": s.host(),
                "port": s.port(),
                "uptime_secs": s.uptime().as_secs(),
            })),
            "sequences": self.library.names(),
        })
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.manager.current_state()
    }

    /// Cancellation flag of the underlying executor (see
    /// `SequenceExecutor::cancel_flag`).
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.executor.cancel_flag()
    }
}

/// Render an error with its full cause chain, so a step failure reads as
/// "Step 1 failed: Move did not finish within 1000ms".
fn describe(err: &(dyn std::error::Error)) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::fake::{CallLog, FakeLink};
    use crate::sequence::{JointMove, MotionSequence, MotionStep};
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn demo_library() -> Arc<SequenceLibrary> {
        let step = MotionStep::Joint(JointMove {
            angles: [7.5, 56.1, 75.69, 8.38, -31.49, -18.15],
            speed_percent: 40.0,
            wait_until_finished: true,
            timeout_ms: 1000,
        });
        let mut library = SequenceLibrary::default();
        library
            .insert(MotionSequence::new("pick_demo", vec![step], BTreeMap::new()).unwrap())
            .unwrap();
        Arc::new(library)
    }

    fn service_with(link: FakeLink) -> (CommandService, CallLog) {
        let log = link.log();
        let manager = Arc::new(ConnectionManager::new(
            Box::new(link),
            Duration::from_secs(10),
        ));
        let robot = RobotConfig {
            host: "127.0.0.1".to_string(),
            port: 3921,
            ready_timeout_secs: None,
        };
        (CommandService::new(manager, demo_library(), robot), log)
    }

    #[tokio::test]
    async fn unknown_command_touches_neither_state_nor_robot() {
        let (service, log) = service_with(FakeLink::new());

        let response = service.execute_command("unknown_name").await;

        assert!(response.is_error());
        assert!(response.message.unwrap().contains("Unknown command"));
        assert_eq!(service.connection_state(), ConnectionState::Disconnected);
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn connect_then_run_round_trip() {
        let (service, _log) = service_with(FakeLink::new());

        let response = service.connect_robot();
        assert_eq!(response.status, ResponseStatus::Connected);
        assert_eq!(service.connection_state(), ConnectionState::Ready);

        let response = service.execute_command("pick_demo").await;
        assert_eq!(response.status, ResponseStatus::Success);
    }

    #[tokio::test]
    async fn run_while_disconnected_reports_not_ready() {
        let (service, log) = service_with(FakeLink::new());

        let response = service.execute_command("pick_demo").await;

        assert!(response.is_error());
        assert!(response.message.unwrap().contains("not ready"));
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn disconnect_without_connection_is_an_error() {
        let (service, _log) = service_with(FakeLink::new());

        let response = service.disconnect_robot();

        assert!(response.is_error());
        assert!(response.message.unwrap().contains("not connected"));
    }

    #[test]
    fn responses_serialize_to_the_documented_shape() {
        let connected = serde_json::to_value(CommandResponse::connected()).unwrap();
        assert_eq!(connected, serde_json::json!({"status": "connected"}));

        let failed = serde_json::to_value(CommandResponse::error("boom")).unwrap();
        assert_eq!(
            failed,
            serde_json::json!({"status": "error", "message": "boom"})
        );
    }

    #[tokio::test]
    async fn step_failures_surface_the_step_index_and_cause() {
        let mut link = FakeLink::new();
        link.fail_move_at = Some(0);
        let (service, _log) = service_with(link);

        service.connect_robot();
        let response = service.execute_command("pick_demo").await;

        assert!(response.is_error());
        let message = response.message.unwrap();
        assert!(message.contains("Step 0 failed"));
        assert!(message.contains("axis fault"));
    }

    #[test]
    fn status_reports_state_and_registered_sequences() {
        let (service, _log) = service_with(FakeLink::new());
        service.connect_robot();

        let status = service.status();

        assert_eq!(status["state"], "ready");
        assert_eq!(status["session"]["host"], "127.0.0.1");
        assert_eq!(status["sequences"], serde_json::json!(["pick_demo"]));
    }
}
