//! Demo binary for the Cadence scheduler.
//!
//! Runs the pose/settle/locomote robot scenario against a stub engine:
//! terrain is dropped under the robot once it has posed, data rows and
//! snapshot frames and screenshots are taken at their own rates, and an optional ticker
//! publishes an incrementing counter over NATS.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `cadence-config.yaml`
//! 2. Initialize structured logging (tracing)
//! 3. Load the scenario section and derive the schedule
//! 4. Connect the tick forwarder (NATS or log-only)
//! 5. Install the Ctrl-C stop handler
//! 6. Run the simulation loop on a blocking thread
//! 7. Log the result

mod error;
mod output;
mod publisher;
mod robot;
mod scenario;
mod step_logger;

use std::path::Path;

use cadence_core::config::CadenceConfig;
use cadence_core::operator::StopHandle;
use cadence_core::runner;
use cadence_types::RunId;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::DemoError;
use crate::publisher::{TickForwarder, TickPublisher};
use crate::scenario::{RunOptions, ScenarioConfig};

/// Configuration file looked up in the working directory.
const CONFIG_PATH: &str = "cadence-config.yaml";

/// Application entry point for the demo.
///
/// # Errors
///
/// Returns an error if any initialization step or the simulation itself fails.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration.
    let config = load_config()?;

    // 2. Initialize structured logging, preferring RUST_LOG.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_target(true)
        .init();

    info!(
        step_size = config.schedule.step_size,
        max_steps = config.schedule.max_steps,
        realtime = config.pacing.realtime,
        "cadence-demo starting"
    );

    // 3. Scenario and schedule.
    let scenario = load_scenario_config()?;
    let schedule = scenario.schedule(&config.schedule, config.publish.frequency_hz);
    schedule.validate()?;
    info!(
        mode = %scenario.mode,
        drop = scenario.drop,
        end_time = scenario.time_end(),
        out_dir = %scenario.out_dir.display(),
        "Scenario loaded"
    );

    // 4. Tick forwarding.
    let (ticks, forwarder) = if scenario.ticker {
        let forwarder = TickForwarder::connect(&config.publish).await?;
        let (publisher, rx) = TickPublisher::channel(RunId::new());
        (Some(publisher), Some(tokio::spawn(forwarder.run(rx))))
    } else {
        (None, None)
    };

    // 5. Ctrl-C requests a clean stop at the next step boundary.
    let stop = StopHandle::new();
    {
        let stop = stop.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Ctrl-C received, stopping at next step");
                stop.request_stop();
            }
        });
    }

    // 6. Run. The loop and its actions are single-threaded and blocking.
    let options = RunOptions {
        realtime: config.pacing.realtime,
        step_log_interval: config.logging.step_log_interval,
        stop,
        ticks,
    };
    let outcome = tokio::task::spawn_blocking(move || crate::scenario::run(&scenario, &schedule, options))
        .await
        .map_err(|e| DemoError::Join {
            message: format!("{e}"),
        })??;

    if let Some(handle) = forwarder {
        match handle.await {
            Ok(forwarded) => info!(forwarded, "Tick forwarder drained"),
            Err(e) => warn!(error = %e, "Tick forwarder task failed"),
        }
    }

    // 7. Log results.
    runner::log_run_end(&outcome.result);
    info!(
        end_reason = ?outcome.result.end_reason,
        avg_speed = outcome.avg_speed,
        data_rows = outcome.data_rows,
        frames = outcome.frames,
        screenshots = outcome.screenshots,
        "cadence-demo shutdown complete"
    );

    Ok(())
}

/// Load the main configuration from `cadence-config.yaml`.
///
/// Falls back to defaults when the file does not exist.
fn load_config() -> Result<CadenceConfig, DemoError> {
    let config_path = Path::new(CONFIG_PATH);
    if config_path.exists() {
        Ok(CadenceConfig::from_file(config_path)?)
    } else {
        let mut config = CadenceConfig::default();
        config.publish.apply_env_overrides();
        Ok(config)
    }
}

/// Load the scenario configuration from `cadence-config.yaml`.
///
/// Reads the `scenario` section from the YAML config file. If the file
/// does not exist or lacks the `scenario` key, defaults are used.
fn load_scenario_config() -> Result<ScenarioConfig, DemoError> {
    let config_path = Path::new(CONFIG_PATH);
    if !config_path.exists() {
        info!("Config file not found, using default scenario");
        return Ok(ScenarioConfig::default());
    }

    let contents = std::fs::read_to_string(config_path).map_err(|e| DemoError::Scenario {
        message: format!("failed to read config file: {e}"),
    })?;
    let raw: serde_yml::Value = serde_yml::from_str(&contents).map_err(|e| DemoError::Scenario {
        message: format!("failed to parse config YAML: {e}"),
    })?;

    match raw.get("scenario") {
        Some(value) => serde_yml::from_value(value.clone()).map_err(|e| DemoError::Scenario {
            message: format!("failed to parse scenario config: {e}"),
        }),
        None => Ok(ScenarioConfig::default()),
    }
}
