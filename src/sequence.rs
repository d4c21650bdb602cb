//! Declarative motion sequences
//!
//! A routine like "pick_apple" is data, not code: an ordered list of joint
//! and Cartesian moves loaded from YAML at startup and run by the
//! `SequenceExecutor`. Settle pauses are declared per step index instead of
//! being buried in routine code.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::time::Duration;

use crate::error::{ConfigError, SequenceError};

/// Default per-move completion timeout in milliseconds.
pub const DEFAULT_MOVE_TIMEOUT_MS: u64 = 1000;

/// One motion primitive: a joint-space or Cartesian-space target.
///
/// Both variants carry the blocking policy verbatim: whether to wait for the
/// move to finish, and how long before the wait gives up.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MotionStep {
    Joint(JointMove),
    Cartesian(CartesianMove),
}

/// Target angles for the six robot joints, in degrees.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JointMove {
    pub angles: [f64; 6],
    pub speed_percent: f64,
    #[serde(default = "default_wait")]
    pub wait_until_finished: bool,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

/// Target end-effector pose: position (x, y, z) plus orientation (a, b, c).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CartesianMove {
    pub pose: [f64; 6],
    pub speed_percent: f64,
    #[serde(default = "default_wait")]
    pub wait_until_finished: bool,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_wait() -> bool {
    true
}

fn default_timeout_ms() -> u64 {
    DEFAULT_MOVE_TIMEOUT_MS
}

impl MotionStep {
    pub fn kind(&self) -> &'static str {
        match self {
            MotionStep::Joint(_) => "joint",
            MotionStep::Cartesian(_) => "cartesian",
        }
    }

    pub fn speed_percent(&self) -> f64 {
        match self {
            MotionStep::Joint(m) => m.speed_percent,
            MotionStep::Cartesian(m) => m.speed_percent,
        }
    }

    pub fn wait_until_finished(&self) -> bool {
        match self {
            MotionStep::Joint(m) => m.wait_until_finished,
            MotionStep::Cartesian(m) => m.wait_until_finished,
        }
    }

    pub fn timeout_ms(&self) -> u64 {
        match self {
            MotionStep::Joint(m) => m.timeout_ms,
            MotionStep::Cartesian(m) => m.timeout_ms,
        }
    }
}

/// An ordered, named list of motion steps executed as one atomic
/// (abort-on-failure) routine.
///
/// `delays` maps a step index to a pause in seconds that fires once,
/// immediately before that step is issued.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MotionSequence {
    name: String,
    steps: Vec<MotionStep>,
    #[serde(default)]
    delays: BTreeMap<usize, f64>,
}

impl MotionSequence {
    /// Build a validated sequence. Used by tests and embedders; sequences
    /// loaded from YAML are validated by `SequenceLibrary`.
    pub fn new(
        name: impl Into<String>,
        steps: Vec<MotionStep>,
        delays: BTreeMap<usize, f64>,
    ) -> Result<Self, SequenceError> {
        let sequence = Self {
            name: name.into(),
            steps,
            delays,
        };
        sequence.validate()?;
        Ok(sequence)
    }

    /// Check the sequence invariants: non-empty steps, in-range delay
    /// indices, positive timeouts on waiting moves, sane speeds.
    pub fn validate(&self) -> Result<(), SequenceError> {
        if self.steps.is_empty() {
            return Err(SequenceError::EmptySteps {
                name: self.name.clone(),
            });
        }

        for (&index, _) in &self.delays {
            if index >= self.steps.len() {
                return Err(SequenceError::DelayOutOfRange {
                    name: self.name.clone(),
                    index,
                    len: self.steps.len(),
                });
            }
        }

        for (index, step) in self.steps.iter().enumerate() {
            if step.wait_until_finished() && step.timeout_ms() == 0 {
                return Err(SequenceError::ZeroTimeout {
                    name: self.name.clone(),
                    index,
                });
            }
            let speed = step.speed_percent();
            if !(speed > 0.0 && speed <= 100.0) {
                return Err(SequenceError::SpeedOutOfRange {
                    name: self.name.clone(),
                    index,
                    speed,
                });
            }
        }

        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &[MotionStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Declared settle pause before the given step, if any.
    pub fn delay_before(&self, index: usize) -> Option<Duration> {
        self.delays
            .get(&index)
            .map(|&secs| Duration::from_secs_f64(secs))
    }
}

/// Immutable name -> sequence registry, loaded once at startup.
#[derive(Debug, Default)]
pub struct SequenceLibrary {
    sequences: HashMap<String, MotionSequence>,
}

#[derive(Debug, Deserialize)]
struct SequenceFile {
    sequences: Vec<MotionSequence>,
}

impl SequenceLibrary {
    pub fn load_from_path(path: &str) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_string(),
            source: e,
        })?;
        Self::load_from_str(&contents)
    }

    pub fn load_from_str(contents: &str) -> Result<Self, ConfigError> {
        let file: SequenceFile = serde_yaml::from_str(contents)?;

        let mut library = Self::default();
        for sequence in file.sequences {
            library.insert(sequence)?;
        }
        Ok(library)
    }

    pub fn insert(&mut self, sequence: MotionSequence) -> Result<(), SequenceError> {
        sequence.validate()?;
        let name = sequence.name().to_string();
        if self.sequences.contains_key(&name) {
            return Err(SequenceError::DuplicateName { name });
        }
        self.sequences.insert(name, sequence);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&MotionSequence> {
        self.sequences.get(name)
    }

    /// Registered sequence names, sorted for stable output.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.sequences.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }
}
