//! Connection lifecycle management
//!
//! `ConnectionManager` is the sole owner and mutator of the connection
//! state machine. Connect walks the robot through
//! `Disconnected -> Connecting -> Connected -> Enabling -> Ready` with no
//! skipped states; any failure or explicit disconnect resets to
//! `Disconnected`. The published state lives in an atomic cell so
//! `current_state` never blocks, even while a motion wait holds the link.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{info, warn};

use crate::error::{ConnectError, DisconnectError, ExecutionError, LinkError};
use crate::link::RobotLink;

/// Robot connection states, strictly forward except the reset edge back to
/// `Disconnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
    Enabling = 3,
    Ready = 4,
}

impl ConnectionState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            3 => ConnectionState::Enabling,
            4 => ConnectionState::Ready,
            _ => ConnectionState::Disconnected,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Enabling => "enabling",
            ConnectionState::Ready => "ready",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handle describing one live connection. The manager owns the real
/// session; callers only ever get clones of this snapshot.
#[derive(Debug, Clone)]
pub struct RobotSession {
    host: String,
    port: u16,
    established_at: Instant,
}

impl RobotSession {
    fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            established_at: Instant::now(),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn uptime(&self) -> Duration {
        self.established_at.elapsed()
    }
}

struct Inner {
    link: Box<dyn RobotLink + Send>,
    session: Option<RobotSession>,
}

/// Guards the single robot link and its state machine.
///
/// Connect, disconnect, and sequence runs all acquire the same internal
/// lock via try-lock: a second operation while one is in flight is rejected
/// with `Busy` rather than queued, because interleaving commands to a
/// physical arm is unsafe.
pub struct ConnectionManager {
    inner: Mutex<Inner>,
    state: AtomicU8,
    ready_timeout: Duration,
}

impl ConnectionManager {
    pub fn new(link: Box<dyn RobotLink + Send>, ready_timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                link,
                session: None,
            }),
            state: AtomicU8::new(ConnectionState::Disconnected as u8),
            ready_timeout,
        }
    }

    /// Current connection state. Pure atomic read, never blocks.
    pub fn current_state(&self) -> ConnectionState {
        ConnectionState::from_raw(self.state.load(Ordering::Relaxed))
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::Relaxed);
    }

    /// Establish a session: connect the link, claim control and enable the
    /// drives, then wait for the kinematics model with a bounded deadline.
    /// On success the state is `Ready` and the session handle is returned.
    pub fn connect(&self, host: &str, port: u16) -> Result<RobotSession, ConnectError> {
        let mut inner = self.inner.try_lock().map_err(|_| ConnectError::Busy)?;

        let state = self.current_state();
        if state != ConnectionState::Disconnected {
            return Err(ConnectError::AlreadyConnected(state));
        }

        info!("Connecting to robot at {}:{}", host, port);
        self.set_state(ConnectionState::Connecting);
        match inner.link.connect(host, port) {
            Ok(true) => {}
            Ok(false) => {
                self.set_state(ConnectionState::Disconnected);
                return Err(ConnectError::LinkUnreachable(LinkError::Unreachable {
                    host: host.to_string(),
                    port,
                }));
            }
            Err(e) => {
                self.set_state(ConnectionState::Disconnected);
                return Err(ConnectError::LinkUnreachable(e));
            }
        }

        self.set_state(ConnectionState::Connected);
        info!("Link established, claiming control and enabling drives");
        if let Err(e) = inner
            .link
            .set_active_control(true)
            .and_then(|_| inner.link.enable())
        {
            self.abort_connect(&mut inner);
            return Err(ConnectError::EnableFailed(e));
        }

        self.set_state(ConnectionState::Enabling);
        info!(
            "Waiting for kinematics ready (deadline {:?})",
            self.ready_timeout
        );
        match inner.link.wait_for_kinematics_ready(self.ready_timeout) {
            Ok(true) => {}
            Ok(false) => {
                self.abort_connect(&mut inner);
                return Err(ConnectError::ReadyTimeout {
                    timeout: self.ready_timeout,
                    source: None,
                });
            }
            Err(e) => {
                self.abort_connect(&mut inner);
                return Err(ConnectError::ReadyTimeout {
                    timeout: self.ready_timeout,
                    source: Some(e),
                });
            }
        }

        let session = RobotSession::new(host, port);
        inner.session = Some(session.clone());
        self.set_state(ConnectionState::Ready);
        info!("Robot connected and ready");
        Ok(session)
    }

    /// Close the session. The state reset to `Disconnected` happens even
    /// when the underlying close reports a failure: state consistency takes
    /// priority over close confirmation.
    pub fn disconnect(&self) -> Result<(), DisconnectError> {
        let mut inner = self.inner.try_lock().map_err(|_| DisconnectError::Busy)?;

        if self.current_state() == ConnectionState::Disconnected {
            return Err(DisconnectError::NotConnected);
        }

        if let Err(e) = inner.link.close() {
            warn!("Link close failed: {}", e);
        }
        inner.session = None;
        self.set_state(ConnectionState::Disconnected);
        info!("Robot disconnected");
        Ok(())
    }

    /// Snapshot of the live session. `None` when disconnected, or while
    /// another operation currently holds the connection.
    pub fn session(&self) -> Option<RobotSession> {
        self.inner
            .try_lock()
            .ok()
            .and_then(|inner| inner.session.clone())
    }

    /// Whether the driver itself reports an open channel. `false` while
    /// another operation holds the connection.
    pub fn link_connected(&self) -> bool {
        self.inner
            .try_lock()
            .map(|inner| inner.link.is_connected())
            .unwrap_or(false)
    }

    /// Borrow the live link for one sequence run. Contention is rejected
    /// with `Busy`; the Ready check is repeated under the lock so a
    /// concurrent disconnect cannot slip between check and acquisition.
    pub(crate) fn try_session(&self) -> Result<SessionGuard<'_>, ExecutionError> {
        let inner = self.inner.try_lock().map_err(|_| ExecutionError::Busy)?;
        let state = self.current_state();
        if state != ConnectionState::Ready {
            return Err(ExecutionError::RobotNotReady(state));
        }
        Ok(SessionGuard { inner })
    }

    /// Teardown after a partial connect: close best effort, reset state.
    fn abort_connect(&self, inner: &mut Inner) {
        if let Err(e) = inner.link.close() {
            warn!("Link close during connect teardown failed: {}", e);
        }
        inner.session = None;
        self.set_state(ConnectionState::Disconnected);
    }
}

/// Exclusive borrow of the link for the duration of one sequence run.
pub(crate) struct SessionGuard<'a> {
    inner: MutexGuard<'a, Inner>,
}

impl SessionGuard<'_> {
    pub(crate) fn link(&mut self) -> &mut (dyn RobotLink + Send) {
        self.inner.link.as_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::fake::{Call, CallLog, FakeLink};

    fn manager_with(link: FakeLink) -> (ConnectionManager, CallLog) {
        let log = link.log();
        let manager = ConnectionManager::new(Box::new(link), Duration::from_secs(10));
        (manager, log)
    }

    fn calls(log: &CallLog) -> Vec<Call> {
        log.lock().unwrap().iter().map(|(c, _)| c.clone()).collect()
    }

    #[test]
    fn connect_walks_full_ladder_to_ready() {
        let (manager, log) = manager_with(FakeLink::new());

        let session = manager.connect("192.168.3.11", 3921).unwrap();

        assert_eq!(manager.current_state(), ConnectionState::Ready);
        assert_eq!(session.host(), "192.168.3.11");
        assert_eq!(session.port(), 3921);
        assert!(manager.session().is_some());
        assert_eq!(
            calls(&log),
            vec![
                Call::Connect,
                Call::SetActive(true),
                Call::Enable,
                Call::WaitReady,
            ]
        );
    }

    #[test]
    fn second_connect_is_rejected_without_touching_the_session() {
        let (manager, log) = manager_with(FakeLink::new());

        manager.connect("192.168.3.11", 3921).unwrap();
        let calls_after_first = calls(&log).len();

        let err = manager.connect("192.168.3.11", 3921).unwrap_err();
        assert!(matches!(
            err,
            ConnectError::AlreadyConnected(ConnectionState::Ready)
        ));
        assert_eq!(manager.current_state(), ConnectionState::Ready);
        assert_eq!(calls(&log).len(), calls_after_first);
        assert_eq!(manager.session().unwrap().host(), "192.168.3.11");
    }

    #[test]
    fn unreachable_controller_leaves_state_disconnected() {
        let mut link = FakeLink::new();
        link.connect_ok = false;
        let (manager, _log) = manager_with(link);

        let err = manager.connect("127.0.0.1", 3921).unwrap_err();

        assert!(matches!(err, ConnectError::LinkUnreachable(_)));
        assert_eq!(manager.current_state(), ConnectionState::Disconnected);
        assert!(manager.session().is_none());
    }

    #[test]
    fn enable_failure_tears_the_link_back_down() {
        let mut link = FakeLink::new();
        link.enable_fails = true;
        let (manager, log) = manager_with(link);

        let err = manager.connect("127.0.0.1", 3921).unwrap_err();

        assert!(matches!(err, ConnectError::EnableFailed(_)));
        assert_eq!(manager.current_state(), ConnectionState::Disconnected);
        assert!(calls(&log).contains(&Call::Close));
    }

    #[test]
    fn ready_deadline_miss_is_a_ready_timeout() {
        let mut link = FakeLink::new();
        link.ready_ok = false;
        let (manager, log) = manager_with(link);

        let err = manager.connect("127.0.0.1", 3921).unwrap_err();

        assert!(matches!(err, ConnectError::ReadyTimeout { .. }));
        assert_eq!(manager.current_state(), ConnectionState::Disconnected);
        assert!(calls(&log).contains(&Call::Close));
    }

    #[test]
    fn disconnect_without_session_is_rejected() {
        let (manager, _log) = manager_with(FakeLink::new());

        assert!(matches!(
            manager.disconnect(),
            Err(DisconnectError::NotConnected)
        ));
    }

    #[test]
    fn disconnect_resets_state_even_when_close_fails() {
        let mut link = FakeLink::new();
        link.close_fails = true;
        let (manager, _log) = manager_with(link);

        manager.connect("127.0.0.1", 3921).unwrap();
        manager.disconnect().unwrap();

        assert_eq!(manager.current_state(), ConnectionState::Disconnected);
        assert!(manager.session().is_none());
    }

    #[test]
    fn disconnect_closes_the_link() {
        let (manager, log) = manager_with(FakeLink::new());

        manager.connect("127.0.0.1", 3921).unwrap();
        manager.disconnect().unwrap();

        assert_eq!(calls(&log).last(), Some(&Call::Close));
        assert_eq!(manager.current_state(), ConnectionState::Disconnected);
    }
}
