//! Sequence execution engine
//!
//! Runs a `MotionSequence` against a Ready session: every step in index
//! order, declared settle delays before their step, abort on the first
//! failure with the step index preserved. There is no branching and no
//! retry; a partially executed physical motion is resumed only by an
//! operator re-invoking from a known-safe state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

use crate::connection::{ConnectionManager, ConnectionState};
use crate::error::{ExecutionError, LinkError};
use crate::link::{RobotLink, EXTERNAL_AXES};
use crate::sequence::{MotionSequence, MotionStep};

/// Walks motion sequences step by step over the manager's live session.
pub struct SequenceExecutor {
    cancel: Arc<AtomicBool>,
}

impl SequenceExecutor {
    pub fn new() -> Self {
        Self {
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shared flag polled between steps; setting it aborts the current
    /// sequence at the next step boundary.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Run one sequence to completion or first failure.
    ///
    /// Rejects immediately with `RobotNotReady` when the session is not
    /// Ready and with `Busy` when another operation holds the connection;
    /// concurrent runs are never queued.
    pub async fn run(
        &self,
        manager: &ConnectionManager,
        sequence: &MotionSequence,
    ) -> Result<(), ExecutionError> {
        let state = manager.current_state();
        if state != ConnectionState::Ready {
            return Err(ExecutionError::RobotNotReady(state));
        }
        let mut session = manager.try_session()?;

        info!(
            "Running sequence '{}' ({} steps)",
            sequence.name(),
            sequence.len()
        );
        let started = Instant::now();

        for (index, step) in sequence.steps().iter().enumerate() {
            if self.cancel.load(Ordering::Relaxed) {
                info!(
                    "Sequence '{}' cancelled before step {}",
                    sequence.name(),
                    index
                );
                return Err(ExecutionError::Cancelled { step: index });
            }

            if let Some(delay) = sequence.delay_before(index) {
                debug!("Settle delay of {:?} before step {}", delay, index);
                tokio::time::sleep(delay).await;
            }

            debug!(
                "Step {}/{}: {} move at {:.0}%",
                index + 1,
                sequence.len(),
                step.kind(),
                step.speed_percent()
            );
            if let Err(source) = dispatch(session.link(), step) {
                error!(
                    "Sequence '{}' aborted at step {}: {}",
                    sequence.name(),
                    index,
                    source
                );
                return Err(ExecutionError::StepFailed {
                    step: index,
                    source,
                });
            }
        }

        info!(
            "Sequence '{}' completed in {:.2}s",
            sequence.name(),
            started.elapsed().as_secs_f64()
        );
        Ok(())
    }
}

impl Default for SequenceExecutor {
    fn default() -> Self {
        Self::new()
    }
}

/// Issue one step to the driver, passing the blocking policy verbatim.
fn dispatch(link: &mut (dyn RobotLink + Send), step: &MotionStep) -> Result<(), LinkError> {
    let timeout = Duration::from_millis(step.timeout_ms());
    match step {
        MotionStep::Joint(m) => link.move_joints(
            &m.angles,
            &EXTERNAL_AXES,
            m.speed_percent,
            m.wait_until_finished,
            timeout,
        ),
        MotionStep::Cartesian(m) => link.move_cartesian(
            &m.pose,
            &EXTERNAL_AXES,
            m.speed_percent,
            m.wait_until_finished,
            timeout,
        ),
    }
}
