//! CRI protocol client
//!
//! TCP implementation of [`RobotLink`] speaking the controller's ASCII
//! protocol: every message is framed as `CRISTART <counter> <payload>
//! CRIEND`, one message per line. Replies echo a counter, a reply kind, and
//! a body with state tokens.

use regex::Regex;
use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::error::LinkError;
use crate::link::RobotLink;

/// Socket read timeout; a controller that stays silent this long is
/// considered unresponsive.
const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Poll interval while waiting for the kinematics model to initialize.
const READY_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Poll interval while waiting for a move to finish.
const MOTION_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Client for the CRI control channel of the robot controller.
pub struct CriClient {
    socket: Option<TcpStream>,
    message_counter: u32,
    reply_pattern: Regex,
}

/// One parsed controller reply.
#[derive(Debug)]
struct CriReply {
    counter: u32,
    kind: String,
    body: String,
}

/// Frame a payload as a CRI wire message.
fn frame_message(counter: u32, payload: &str) -> String {
    format!("CRISTART {} {} CRIEND\n", counter, payload)
}

fn parse_reply(pattern: &Regex, raw: &str) -> Result<CriReply, LinkError> {
    let captures = pattern
        .captures(raw)
        .ok_or_else(|| LinkError::Protocol(format!("malformed controller reply: {}", raw)))?;

    let counter = captures
        .get(1)
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .unwrap_or(0);
    let kind = captures.get(2).map(|m| m.as_str().to_string()).unwrap_or_default();
    let body = captures
        .get(3)
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default();

    Ok(CriReply { counter, kind, body })
}

fn join_values(values: &[f64]) -> String {
    values
        .iter()
        .map(|v| format!("{:.2}", v))
        .collect::<Vec<_>>()
        .join(" ")
}

impl CriClient {
    pub fn new() -> Result<Self, LinkError> {
        let reply_pattern = Regex::new(r"^CRISTART (\d+) (\w+)\s*(.*?)\s*CRIEND$")
            .map_err(|e| LinkError::Protocol(format!("invalid reply pattern: {}", e)))?;

        Ok(Self {
            socket: None,
            message_counter: 0,
            reply_pattern,
        })
    }

    /// Message counters cycle through 1..=9999 on the wire.
    fn next_counter(&mut self) -> u32 {
        self.message_counter = self.message_counter % 9999 + 1;
        self.message_counter
    }

    fn send(&mut self, payload: &str) -> Result<u32, LinkError> {
        let counter = self.next_counter();
        let message = frame_message(counter, payload);
        let socket = self.socket.as_mut().ok_or(LinkError::NotConnected)?;
        socket.write_all(message.as_bytes())?;
        Ok(counter)
    }

    /// Read one newline-terminated reply from the controller.
    fn read_reply(&mut self) -> Result<CriReply, LinkError> {
        let socket = self.socket.as_mut().ok_or(LinkError::NotConnected)?;

        let mut collected = Vec::new();
        let mut buffer = [0u8; 1];
        loop {
            match socket.read_exact(&mut buffer) {
                Ok(_) => {
                    if buffer[0] == b'\n' {
                        break;
                    }
                    collected.push(buffer[0]);
                }
                Err(e)
                    if e.kind() == std::io::ErrorKind::TimedOut
                        || e.kind() == std::io::ErrorKind::WouldBlock =>
                {
                    return Err(LinkError::Protocol(
                        "controller reply timeout".to_string(),
                    ));
                }
                Err(e) => return Err(e.into()),
            }
        }

        let raw = String::from_utf8(collected)
            .map_err(|_| LinkError::Protocol("invalid UTF-8 in controller reply".to_string()))?;
        parse_reply(&self.reply_pattern, raw.trim())
    }

    /// Send a command and wait for its reply. `ERROR` replies become
    /// `LinkError::Rejected` with the controller's message.
    fn command(&mut self, payload: &str) -> Result<CriReply, LinkError> {
        debug!("CRI command: {}", payload);
        let counter = self.send(payload)?;
        let reply = self.read_reply()?;
        if reply.kind == "ERROR" {
            return Err(LinkError::Rejected(reply.body));
        }
        if reply.counter != counter {
            warn!(
                "Controller replied with counter {} to message {}",
                reply.counter, counter
            );
        }
        Ok(reply)
    }

    /// Query the controller state tokens (e.g. `KinematicsReady`).
    fn query_state(&mut self) -> Result<String, LinkError> {
        let reply = self.command("CMD GetState")?;
        Ok(reply.body)
    }

    /// Poll until the controller reports the current motion finished, or
    /// the timeout elapses.
    fn wait_for_motion_finished(&mut self, timeout: Duration) -> Result<(), LinkError> {
        let started = Instant::now();
        loop {
            let reply = self.command("CMD CheckMotion")?;
            if reply.body.contains("Finished") {
                return Ok(());
            }
            if started.elapsed() >= timeout {
                return Err(LinkError::MoveTimeout {
                    millis: timeout.as_millis() as u64,
                });
            }
            std::thread::sleep(MOTION_POLL_INTERVAL);
        }
    }
}

impl RobotLink for CriClient {
    fn connect(&mut self, host: &str, port: u16) -> Result<bool, LinkError> {
        info!("Connecting to CRI controller at {}:{}", host, port);
        match TcpStream::connect((host, port)) {
            Ok(socket) => {
                socket.set_read_timeout(Some(READ_TIMEOUT))?;
                socket.set_nodelay(true)?;
                self.socket = Some(socket);
                info!("CRI control channel established");
                Ok(true)
            }
            Err(e) => {
                warn!("CRI connect to {}:{} failed: {}", host, port, e);
                Ok(false)
            }
        }
    }

    fn set_active_control(&mut self, active: bool) -> Result<(), LinkError> {
        self.command(&format!("CMD SetActive {}", active))?;
        Ok(())
    }

    fn enable(&mut self) -> Result<(), LinkError> {
        self.command("CMD Enable")?;
        Ok(())
    }

    fn wait_for_kinematics_ready(&mut self, timeout: Duration) -> Result<bool, LinkError> {
        let started = Instant::now();
        loop {
            let state = self.query_state()?;
            if state.contains("KinematicsReady") {
                return Ok(true);
            }
            if started.elapsed() >= timeout {
                return Ok(false);
            }
            std::thread::sleep(READY_POLL_INTERVAL);
        }
    }

    fn is_connected(&self) -> bool {
        self.socket.is_some()
    }

    fn close(&mut self) -> Result<(), LinkError> {
        // Tell the controller we are leaving, then drop the socket either way.
        let quit_result = self.send("QUIT");
        if let Some(socket) = self.socket.take() {
            let _ = socket.shutdown(Shutdown::Both);
        }
        quit_result.map(|_| ())
    }

    fn move_joints(
        &mut self,
        angles: &[f64; 6],
        external: &[f64; 3],
        speed_percent: f64,
        wait_until_finished: bool,
        timeout: Duration,
    ) -> Result<(), LinkError> {
        let payload = format!(
            "CMD Move Joint {} {} {:.1}",
            join_values(angles),
            join_values(external),
            speed_percent
        );
        self.command(&payload)?;
        if wait_until_finished {
            self.wait_for_motion_finished(timeout)?;
        }
        Ok(())
    }

    fn move_cartesian(
        &mut self,
        pose: &[f64; 6],
        external: &[f64; 3],
        speed_percent: f64,
        wait_until_finished: bool,
        timeout: Duration,
    ) -> Result<(), LinkError> {
        let payload = format!(
            "CMD Move Cart {} {} {:.1}",
            join_values(pose),
            join_values(external),
            speed_percent
        );
        self.command(&payload)?;
        if wait_until_finished {
            self.wait_for_motion_finished(timeout)?;
        }
        Ok(())
    }
}

impl Drop for CriClient {
    /// Best effort to leave the control channel cleanly.
    fn drop(&mut self) {
        if self.socket.is_some() {
            let _ = self.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_messages_with_counter_and_terminator() {
        assert_eq!(
            frame_message(17, "CMD Enable"),
            "CRISTART 17 CMD Enable CRIEND\n"
        );
    }

    #[test]
    fn parses_reply_with_body() {
        let client = CriClient::new().unwrap();
        let reply = parse_reply(
            &client.reply_pattern,
            "CRISTART 42 STATE KinematicsReady Motion CRIEND",
        )
        .unwrap();

        assert_eq!(reply.counter, 42);
        assert_eq!(reply.kind, "STATE");
        assert_eq!(reply.body, "KinematicsReady Motion");
    }

    #[test]
    fn parses_reply_without_body() {
        let client = CriClient::new().unwrap();
        let reply = parse_reply(&client.reply_pattern, "CRISTART 7 CMD CRIEND").unwrap();

        assert_eq!(reply.kind, "CMD");
        assert_eq!(reply.body, "");
    }

    #[test]
    fn rejects_malformed_reply() {
        let client = CriClient::new().unwrap();
        assert!(parse_reply(&client.reply_pattern, "garbage").is_err());
    }

    #[test]
    fn counter_wraps_at_9999() {
        let mut client = CriClient::new().unwrap();
        client.message_counter = 9998;
        assert_eq!(client.next_counter(), 9999);
        assert_eq!(client.next_counter(), 1);
    }

    #[test]
    fn joins_values_with_fixed_precision() {
        assert_eq!(join_values(&[7.5, -18.15, 0.0]), "7.50 -18.15 0.00");
    }
}
