//! Configuration loading for the robot daemon

use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

use crate::error::ConfigError;

/// Default TCP port of the CRI robot controller.
pub const DEFAULT_CRI_PORT: u16 = 3921;

/// Top-level daemon configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub robot: RobotConfig,
    #[serde(default)]
    pub sequences: SequencesConfig,
}

/// Robot controller address and connection policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RobotConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub ready_timeout_secs: Option<u64>,
}

/// Location of the motion sequence definitions.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SequencesConfig {
    pub path: String,
}

fn default_port() -> u16 {
    DEFAULT_CRI_PORT
}

impl Default for SequencesConfig {
    fn default() -> Self {
        Self {
            path: "config/sequences.yaml".to_string(),
        }
    }
}

impl RobotConfig {
    /// Deadline for the kinematics-ready wait during connect, default 10s
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_secs.unwrap_or(10))
    }
}

impl Config {
    pub fn load_from_path(path: &str) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_string(),
            source: e,
        })?;
        Self::load_from_str(&contents)
    }

    pub fn load_from_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(contents)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config_with_defaults() {
        let config = Config::load_from_str("robot:\n  host: 192.168.3.11\n").unwrap();

        assert_eq!(config.robot.host, "192.168.3.11");
        assert_eq!(config.robot.port, DEFAULT_CRI_PORT);
        assert_eq!(config.robot.ready_timeout(), Duration::from_secs(10));
        assert_eq!(config.sequences.path, "config/sequences.yaml");
    }

    #[test]
    fn explicit_values_override_defaults() {
        let yaml = "\
robot:
  host: 10.0.0.5
  port: 4000
  ready_timeout_secs: 3
sequences:
  path: routines.yaml
";
        let config = Config::load_from_str(yaml).unwrap();

        assert_eq!(config.robot.port, 4000);
        assert_eq!(config.robot.ready_timeout(), Duration::from_secs(3));
        assert_eq!(config.sequences.path, "routines.yaml");
    }

    #[test]
    fn missing_robot_section_is_an_error() {
        assert!(Config::load_from_str("sequences:\n  path: x.yaml\n").is_err());
    }
}
