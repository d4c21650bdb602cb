//! Command streaming for the robot daemon
//!
//! Reads newline-delimited operator commands from stdin, dispatches them to
//! the `CommandService`, and prints one JSON response per command on
//! stdout. Logs go to stderr so stdout stays machine-readable.

use anyhow::Result;
use std::sync::atomic::Ordering;
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{error, info, warn};

use crate::connection::ConnectionState;
use crate::service::{CommandResponse, CommandService};

/// One parsed line of operator input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamCommand {
    Connect,
    Disconnect,
    Run(String),
    Status,
    Help,
    Quit,
}

/// Parse a trimmed input line. `None` means the line is not a recognized
/// command (including `run` without a sequence name).
pub fn parse_command(line: &str) -> Option<StreamCommand> {
    let mut parts = line.split_whitespace();
    let command = match parts.next()? {
        "connect" => StreamCommand::Connect,
        "disconnect" => StreamCommand::Disconnect,
        "run" => StreamCommand::Run(parts.next()?.to_string()),
        "status" => StreamCommand::Status,
        "help" => StreamCommand::Help,
        "quit" | "exit" => StreamCommand::Quit,
        _ => return None,
    };
    Some(command)
}

/// Line-oriented command processor over stdin/stdout.
pub struct CommandStream {
    service: CommandService,
}

impl CommandStream {
    pub fn new(service: CommandService) -> Self {
        Self { service }
    }

    /// Main command loop. Returns when stdin closes, the operator quits, or
    /// a shutdown signal arrives.
    pub async fn run(&mut self) -> Result<()> {
        info!("Command streaming active - connect | disconnect | run <sequence> | status | quit");

        let stdin = io::stdin();
        let mut reader = BufReader::new(stdin);
        let mut buffer = String::new();

        let shutdown = Self::shutdown_signal();
        tokio::pin!(shutdown);

        loop {
            buffer.clear();

            tokio::select! {
                line_result = reader.read_line(&mut buffer) => {
                    match line_result {
                        Ok(0) => {
                            info!("End of input reached, stopping command stream");
                            break;
                        }
                        Ok(_) => {
                            let line = buffer.trim();
                            if line.is_empty() || line.starts_with('#') {
                                continue;
                            }
                            if !self.dispatch(line).await {
                                break;
                            }
                        }
                        Err(e) => {
                            error!("Failed to read from stdin: {}", e);
                            break;
                        }
                    }
                }
                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    // abort a sequence at its next step boundary
                    self.service.cancel_flag().store(true, Ordering::Relaxed);
                    break;
                }
            }
        }

        Ok(())
    }

    /// Handle one command line. Returns `false` when the stream should stop.
    async fn dispatch(&self, line: &str) -> bool {
        let response = match parse_command(line) {
            Some(StreamCommand::Connect) => self.service.connect_robot(),
            Some(StreamCommand::Disconnect) => self.service.disconnect_robot(),
            Some(StreamCommand::Run(name)) => self.service.execute_command(&name).await,
            Some(StreamCommand::Status) => {
                Self::emit_value(&self.service.status());
                return true;
            }
            Some(StreamCommand::Help) => {
                Self::emit_value(&serde_json::json!({
                    "commands": ["connect", "disconnect", "run <sequence>", "status", "help", "quit"],
                }));
                return true;
            }
            Some(StreamCommand::Quit) => return false,
            None => CommandResponse::error(format!("Unknown command: {}", line)),
        };
        Self::emit(&response);
        true
    }

    fn emit(response: &CommandResponse) {
        match serde_json::to_string(response) {
            Ok(json) => println!("{}", json),
            Err(e) => warn!("Failed to serialize response: {}", e),
        }
    }

    fn emit_value(value: &serde_json::Value) {
        println!("{}", value);
    }

    /// Best-effort cleanup so the arm is not left connected and enabled.
    pub async fn shutdown(&self) -> Result<()> {
        if self.service.connection_state() != ConnectionState::Disconnected {
            let response = self.service.disconnect_robot();
            if response.is_error() {
                warn!(
                    "Disconnect during shutdown failed: {}",
                    response.message.unwrap_or_default()
                );
            }
        }
        Ok(())
    }

    async fn shutdown_signal() {
        let ctrl_c = async {
            signal::ctrl_c()
                .await
                .expect("Failed to install Ctrl+C handler");
        };

        #[cfg(unix)]
        let terminate = async {
            signal::unix::signal(signal::unix::SignalKind::terminate())
                .expect("Failed to install signal handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_commands() {
        assert_eq!(parse_command("connect"), Some(StreamCommand::Connect));
        assert_eq!(parse_command("disconnect"), Some(StreamCommand::Disconnect));
        assert_eq!(parse_command("status"), Some(StreamCommand::Status));
        assert_eq!(parse_command("quit"), Some(StreamCommand::Quit));
        assert_eq!(parse_command("exit"), Some(StreamCommand::Quit));
    }

    #[test]
    fn parses_run_with_sequence_name() {
        assert_eq!(
            parse_command("run pick_apple"),
            Some(StreamCommand::Run("pick_apple".to_string()))
        );
    }

    #[test]
    fn run_without_a_name_is_not_a_command() {
        assert_eq!(parse_command("run"), None);
    }

    #[test]
    fn unknown_words_are_not_commands() {
        assert_eq!(parse_command("launch"), None);
        assert_eq!(parse_command(""), None);
    }
}
