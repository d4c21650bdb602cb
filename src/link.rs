//! Robot driver capability interface
//!
//! `RobotLink` is the seam between the connection/execution core and the
//! low-level controller driver. The core only ever talks to this trait; the
//! shipped TCP implementation lives in [`crate::cri`], and tests substitute
//! a recording fake.

use std::time::Duration;

use crate::error::LinkError;

/// Reserved external-axis values sent with every move. The arm has no
/// external axes configured, so these are always zero.
pub const EXTERNAL_AXES: [f64; 3] = [0.0, 0.0, 0.0];

/// Synchronous, blocking capability set of the underlying robot driver.
///
/// All motion and lifecycle calls block the calling thread until the
/// controller replies (or the given timeout elapses). Fallible calls return
/// `LinkError` so callers can tell a dropped link apart from a rejected or
/// stalled command.
pub trait RobotLink: Send {
    /// Open the control channel. Returns `Ok(false)` when the controller is
    /// unreachable, reserving `Err` for transport faults after contact.
    fn connect(&mut self, host: &str, port: u16) -> Result<bool, LinkError>;

    /// Claim (or release) active control of the arm.
    fn set_active_control(&mut self, active: bool) -> Result<(), LinkError>;

    /// Enable the drives.
    fn enable(&mut self) -> Result<(), LinkError>;

    /// Block until the controller reports its kinematic model initialized,
    /// or the timeout elapses. Returns `Ok(false)` on timeout.
    fn wait_for_kinematics_ready(&mut self, timeout: Duration) -> Result<bool, LinkError>;

    fn is_connected(&self) -> bool;

    /// Close the control channel. The link is unusable afterwards until the
    /// next `connect`.
    fn close(&mut self) -> Result<(), LinkError>;

    /// Execute a joint-space move to the given six joint angles (degrees).
    fn move_joints(
        &mut self,
        angles: &[f64; 6],
        external: &[f64; 3],
        speed_percent: f64,
        wait_until_finished: bool,
        timeout: Duration,
    ) -> Result<(), LinkError>;

    /// Execute a Cartesian move to the given pose (x, y, z, a, b, c).
    fn move_cartesian(
        &mut self,
        pose: &[f64; 6],
        external: &[f64; 3],
        speed_percent: f64,
        wait_until_finished: bool,
        timeout: Duration,
    ) -> Result<(), LinkError>;
}
