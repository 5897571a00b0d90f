//! Configuration loading and typed config structures.
//!
//! The canonical configuration lives in `cadence-config.yaml`. This module
//! mirrors its structure in strongly-typed structs and provides a loader.
//! Every field has a default so a partial (or missing) file still yields a
//! usable configuration.
//!
//! Periodic tasks and timed events are configured by name and timing only;
//! the embedding application binds an action to each name when it builds
//! the loop.

use std::path::Path;

use serde::Deserialize;

use crate::clock::Clock;
use crate::error::SchedulerError;
use crate::operator::Termination;
use crate::periodic;
use crate::phase::{PhaseController, PhaseDuration, PhaseSpec};

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// The schedule section is malformed.
    #[error("invalid schedule: {source}")]
    Schedule {
        /// The underlying validation error.
        #[from]
        source: SchedulerError,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CadenceConfig {
    /// Step size, phases, periodic tasks, events and run bounds.
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Wall-clock pacing.
    #[serde(default)]
    pub pacing: PacingConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Pub/sub tick publishing.
    #[serde(default)]
    pub publish: PublishConfig,
}

impl CadenceConfig {
    /// Load and validate configuration from a YAML file.
    ///
    /// `NATS_URL` in the environment overrides `publish.nats_url`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Schedule`] if the schedule is malformed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse and validate configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Schedule`] if the schedule is malformed.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yml::from_str(yaml)?;
        config.schedule.validate()?;
        config.publish.apply_env_overrides();
        Ok(config)
    }
}

/// Schedule configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScheduleConfig {
    /// Fixed physics step in seconds.
    #[serde(default = "default_step_size")]
    pub step_size: f64,

    /// Simulation time at which the run ends (absent = open-ended).
    #[serde(default)]
    pub end_time: Option<f64>,

    /// Maximum number of steps (0 = unlimited).
    #[serde(default)]
    pub max_steps: u64,

    /// Ordered phases. The last may omit `duration` to run indefinitely.
    #[serde(default)]
    pub phases: Vec<PhaseConfig>,

    /// Periodic tasks by name.
    #[serde(default)]
    pub periodic: Vec<PeriodicConfig>,

    /// One-shot events by name.
    #[serde(default)]
    pub events: Vec<EventConfig>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            step_size: default_step_size(),
            end_time: None,
            max_steps: 0,
            phases: Vec::new(),
            periodic: Vec::new(),
            events: Vec::new(),
        }
    }
}

impl ScheduleConfig {
    /// Check every value without building anything.
    ///
    /// # Errors
    ///
    /// Returns the first [`SchedulerError`] found.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        let _ = self.clock()?;
        let _ = self.termination()?;
        let _ = self.phase_controller()?;
        for task in &self.periodic {
            let _ = periodic::step_interval(task.frequency_hz, self.step_size)?;
        }
        for event in &self.events {
            if !event.trigger_time.is_finite() || event.trigger_time < 0.0 {
                return Err(SchedulerError::InvalidTime {
                    trigger_time: event.trigger_time,
                });
            }
        }
        Ok(())
    }

    /// Build the clock.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Clock`] for an invalid step size.
    pub fn clock(&self) -> Result<Clock, SchedulerError> {
        Ok(Clock::new(self.step_size)?)
    }

    /// Build the termination conditions (end time and step bound).
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidEndTime`] for an invalid end time.
    pub fn termination(&self) -> Result<Termination, SchedulerError> {
        let termination = match self.end_time {
            Some(end) => Termination::at(end)?,
            None => Termination::new(),
        };
        Ok(termination.with_max_steps(self.max_steps))
    }

    /// Phase specs in configured order.
    pub fn phase_specs(&self) -> Vec<PhaseSpec> {
        self.phases
            .iter()
            .map(|phase| PhaseSpec {
                name: phase.name.clone(),
                duration: PhaseDuration::from_option(phase.duration),
            })
            .collect()
    }

    /// Build a phase controller with no hooks attached.
    ///
    /// # Errors
    ///
    /// Returns a [`SchedulerError`] for malformed phases.
    pub fn phase_controller(&self) -> Result<PhaseController, SchedulerError> {
        PhaseController::new(self.phase_specs())
    }

    /// Look up a periodic task by name.
    pub fn periodic(&self, name: &str) -> Option<&PeriodicConfig> {
        self.periodic.iter().find(|task| task.name == name)
    }

    /// Look up an event by name.
    pub fn event(&self, name: &str) -> Option<&EventConfig> {
        self.events.iter().find(|event| event.name == name)
    }
}

/// One configured phase.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PhaseConfig {
    /// Phase name.
    pub name: String,
    /// Duration in seconds; absent for an unbounded terminal phase.
    #[serde(default)]
    pub duration: Option<f64>,
}

/// One configured periodic task.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PeriodicConfig {
    /// Task name the application binds an action to.
    pub name: String,
    /// Target frequency in Hz.
    pub frequency_hz: f64,
    /// Whether the task is registered at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// One configured timed event.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EventConfig {
    /// Event name the application binds an action to.
    pub name: String,
    /// Absolute simulation time at which it fires.
    pub trigger_time: f64,
}

/// Wall-clock pacing configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct PacingConfig {
    /// Sleep so simulated time tracks wall-clock time.
    #[serde(default)]
    pub realtime: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error), used when `RUST_LOG`
    /// is not set.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log a step summary every N steps (0 = never).
    #[serde(default = "default_step_log_interval")]
    pub step_log_interval: u64,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            step_log_interval: default_step_log_interval(),
        }
    }
}

/// Pub/sub tick publishing configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PublishConfig {
    /// NATS server URL; publishing is disabled when absent.
    #[serde(default)]
    pub nats_url: Option<String>,

    /// Subject tick messages are published on.
    #[serde(default = "default_subject")]
    pub subject: String,

    /// Publishing frequency in Hz.
    #[serde(default = "default_publish_hz")]
    pub frequency_hz: f64,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            nats_url: None,
            subject: default_subject(),
            frequency_hz: default_publish_hz(),
        }
    }
}

impl PublishConfig {
    /// Apply environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("NATS_URL") {
            self.nats_url = Some(url);
        }
    }
}

const fn default_step_size() -> f64 {
    1e-3
}

const fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    String::from("info")
}

const fn default_step_log_interval() -> u64 {
    1_000
}

fn default_subject() -> String {
    String::from("cadence.ticks")
}

const fn default_publish_hz() -> f64 {
    1.0
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = CadenceConfig::default();
        assert!(config.schedule.validate().is_ok());
        assert!((config.schedule.step_size - 1e-3).abs() < f64::EPSILON);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.publish.subject, "cadence.ticks");
        assert!(!config.pacing.realtime);
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r"
schedule:
  step_size: 0.001
  end_time: 11.5
  max_steps: 0
  phases:
    - name: pose
      duration: 1.0
    - name: settle
      duration: 0.5
    - name: locomote
  periodic:
    - name: data_output
      frequency_hz: 100
    - name: frame_capture
      frequency_hz: 60
      enabled: false
  events:
    - name: create_terrain
      trigger_time: 1.0

pacing:
  realtime: true

logging:
  level: debug
  step_log_interval: 500

publish:
  subject: robot.ticks
  frequency_hz: 2.0
";
        let config = CadenceConfig::parse(yaml).unwrap();
        let schedule = &config.schedule;
        assert_eq!(schedule.end_time, Some(11.5));
        assert_eq!(schedule.phases.len(), 3);
        assert_eq!(schedule.phases.get(2).unwrap().duration, None);
        assert_eq!(schedule.periodic("data_output").unwrap().frequency_hz, 100.0);
        assert!(!schedule.periodic("frame_capture").unwrap().enabled);
        assert_eq!(schedule.event("create_terrain").unwrap().trigger_time, 1.0);
        assert!(config.pacing.realtime);
        assert_eq!(config.logging.step_log_interval, 500);
        assert_eq!(config.publish.subject, "robot.ticks");

        let phases = schedule.phase_controller().unwrap();
        assert_eq!(phases.start_time("locomote"), Some(1.5));
    }

    #[test]
    fn empty_yaml_uses_defaults() {
        let config = CadenceConfig::parse("{}").unwrap();
        assert_eq!(config.schedule, ScheduleConfig::default());
    }

    #[test]
    fn rejects_invalid_schedule() {
        let bad_step = "schedule:\n  step_size: 0\n";
        assert!(matches!(
            CadenceConfig::parse(bad_step),
            Err(ConfigError::Schedule { .. })
        ));

        let bad_phase = "schedule:\n  phases:\n    - name: a\n    - name: b\n      duration: 1\n";
        assert!(matches!(
            CadenceConfig::parse(bad_phase),
            Err(ConfigError::Schedule {
                source: SchedulerError::UnboundedPhaseNotLast { .. }
            })
        ));

        let bad_event = "schedule:\n  events:\n    - name: late\n      trigger_time: -1\n";
        assert!(CadenceConfig::parse(bad_event).is_err());

        let bad_task = "schedule:\n  periodic:\n    - name: log\n      frequency_hz: 0\n";
        assert!(CadenceConfig::parse(bad_task).is_err());
    }

    #[test]
    fn malformed_yaml_is_a_yaml_error() {
        assert!(matches!(
            CadenceConfig::parse("schedule: [unclosed"),
            Err(ConfigError::Yaml { .. })
        ));
    }
}
