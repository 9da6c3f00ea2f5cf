//! Supervisory sweeper
//!
//! Periodically applies the timeout and retention policy. Runs for the
//! lifetime of the server.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, error, info};

use crate::service::{BuildService, SweepPolicy};

pub struct Sweeper {
    service: Arc<BuildService>,
    policy: SweepPolicy,
    interval: Duration,
}

impl Sweeper {
    pub fn new(service: Arc<BuildService>, policy: SweepPolicy, interval: Duration) -> Self {
        Self {
            service,
            policy,
            interval,
        }
    }

    /// Starts the sweep loop in a background task
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                "Starting sweeper (interval: {:?}, timeout: {:?}, retention: {:?})",
                self.interval, self.policy.job_timeout, self.policy.retention
            );

            let mut ticker = time::interval(self.interval);
            ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                match self.service.sweep(&self.policy, Utc::now()).await {
                    Ok(report) if report.is_empty() => debug!("Sweep found nothing to do"),
                    Ok(report) => info!(
                        "Sweep timed out {} build(s) and purged {} build(s)",
                        report.timed_out.len(),
                        report.purged.len()
                    ),
                    Err(e) => error!("Error during sweep: {}", e),
                }
            }
        })
    }
}
