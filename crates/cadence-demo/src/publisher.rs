//! Tick publishing over NATS.
//!
//! A periodic task inside the simulation loop produces an incrementing
//! counter ([`TickMessage`]) at a fixed rate. The loop runs on a blocking
//! thread, so the task only pushes onto an unbounded channel; an async
//! [`TickForwarder`] drains the channel and publishes each message on the
//! configured NATS subject. Without a NATS URL the forwarder just logs.

use cadence_core::config::PublishConfig;
use cadence_types::{RunId, TickMessage};
use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::DemoError;

/// Producer half, owned by the periodic task.
#[derive(Debug)]
pub struct TickPublisher {
    run_id: RunId,
    ticker: u64,
    tx: mpsc::UnboundedSender<TickMessage>,
}

impl TickPublisher {
    /// Create a publisher and the receiver a [`TickForwarder`] drains.
    pub fn channel(run_id: RunId) -> (Self, mpsc::UnboundedReceiver<TickMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                run_id,
                ticker: 0,
                tx,
            },
            rx,
        )
    }

    /// Publish the current counter value and increment it.
    ///
    /// # Errors
    ///
    /// Fails if the forwarder has gone away.
    pub fn tick(&mut self, sim_time: f64) -> anyhow::Result<()> {
        let message = TickMessage {
            run_id: self.run_id,
            ticker: self.ticker,
            sim_time,
            produced_at: Utc::now(),
        };
        debug!(ticker = self.ticker, sim_time, "Publishing tick");
        self.tx
            .send(message)
            .map_err(|e| anyhow::anyhow!("tick forwarder closed: {e}"))?;
        self.ticker = self.ticker.saturating_add(1);
        Ok(())
    }

    /// Next counter value to be published.
    #[cfg(test)]
    pub const fn ticker(&self) -> u64 {
        self.ticker
    }
}

/// Consumer half: forwards ticks to NATS.
#[derive(Debug)]
pub struct TickForwarder {
    client: Option<async_nats::Client>,
    subject: String,
}

impl TickForwarder {
    /// Connect to the configured NATS server, or build a log-only
    /// forwarder when no URL is configured.
    ///
    /// # Errors
    ///
    /// Returns [`DemoError::Nats`] if the connection cannot be established.
    pub async fn connect(config: &PublishConfig) -> Result<Self, DemoError> {
        let Some(url) = config.nats_url.as_deref() else {
            info!("No NATS URL configured, tick publishing is log-only");
            return Ok(Self::log_only(&config.subject));
        };
        info!(url = url, subject = config.subject, "Connecting to NATS");
        let client = async_nats::connect(url)
            .await
            .map_err(|e| DemoError::Nats {
                message: format!("failed to connect to {url}: {e}"),
            })?;
        info!("NATS connection established");
        Ok(Self {
            client: Some(client),
            subject: config.subject.clone(),
        })
    }

    /// A forwarder that only logs.
    pub fn log_only(subject: &str) -> Self {
        Self {
            client: None,
            subject: subject.to_owned(),
        }
    }

    /// Forward until the producer is dropped; returns the number of
    /// messages handled. Publish failures are logged and skipped.
    pub async fn run(self, mut rx: mpsc::UnboundedReceiver<TickMessage>) -> u64 {
        let mut forwarded: u64 = 0;
        while let Some(message) = rx.recv().await {
            match &self.client {
                Some(client) => match serde_json::to_vec(&message) {
                    Ok(payload) => {
                        if let Err(e) = client.publish(self.subject.clone(), payload.into()).await {
                            warn!(subject = self.subject, error = %e, "failed to publish tick");
                        }
                    }
                    Err(e) => warn!(error = %e, "failed to serialize tick"),
                },
                None => {
                    info!(
                        subject = self.subject,
                        ticker = message.ticker,
                        sim_time = message.sim_time,
                        "Tick"
                    );
                }
            }
            forwarded = forwarded.saturating_add(1);
        }

        if let Some(client) = &self.client {
            if let Err(e) = client.flush().await {
                warn!(error = %e, "failed to flush NATS client");
            }
        }
        forwarded
    }
}
