//! Periodic cleanup.
//!
//! Two fixed-interval tasks run until shutdown:
//!
//! - **Rate limits** (default every 5 minutes): purge limiter keys idle for
//!   longer than [`crate::config::RateLimitConfig::idle_key_ttl`].
//! - **Storage** (default hourly): expired refresh tokens, expired one-time
//!   tokens, inactive devices and login attempts past retention.
//!
//! Sweep failures are logged and the task carries on.

use crate::config::HousekeepingConfig;
use crate::environment::AuthProviders;
use crate::error::Result;
use crate::login::LoginOrchestrator;
use crate::providers::RateLimiter;
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

/// Counts removed by one storage sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Expired refresh token records.
    pub refresh_tokens: u64,
    /// Expired one-time tokens.
    pub one_time_tokens: u64,
    /// Devices past retention.
    pub devices: u64,
    /// Login attempts past retention.
    pub login_attempts: u64,
}

/// Spawns the cleanup tasks.
pub struct Housekeeper;

impl Housekeeper {
    /// Start both tasks on the current runtime.
    #[must_use]
    pub fn spawn<P: AuthProviders>(
        orchestrator: LoginOrchestrator<P>,
        config: &HousekeepingConfig,
    ) -> HousekeepingHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let limiter = orchestrator.clone();
        let rate_limits = spawn_periodic(
            "rate_limit_sweep",
            config.rate_limit_interval,
            shutdown_rx.clone(),
            move || {
                let orchestrator = limiter.clone();
                async move { sweep_rate_limits(&orchestrator).await.map(|_| ()) }
            },
        );

        let storage = spawn_periodic(
            "storage_sweep",
            config.storage_interval,
            shutdown_rx,
            move || {
                let orchestrator = orchestrator.clone();
                async move { sweep_storage(&orchestrator).await.map(|_| ()) }
            },
        );

        info!("Housekeeping started");
        HousekeepingHandle {
            shutdown: shutdown_tx,
            tasks: vec![rate_limits, storage],
        }
    }
}

/// Handle to the running tasks.
#[derive(Debug)]
pub struct HousekeepingHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl HousekeepingHandle {
    /// Signal shutdown and wait for both tasks to finish.
    pub async fn shutdown(self) {
        self.shutdown.send(true).ok();
        for task in self.tasks {
            if let Err(e) = task.await {
                error!(error = %e, "Housekeeping task panicked");
            }
        }
        info!("Housekeeping stopped");
    }
}

fn spawn_periodic<F, Fut>(
    name: &'static str,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut sweep: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !*shutdown.borrow() {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = sweep().await {
                        error!(task = name, error = %e, "Sweep failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        debug!(task = name, "Housekeeping task exiting");
    })
}

/// Purge idle rate-limiter keys once.
///
/// # Errors
///
/// Returns error if the limiter backend fails.
pub async fn sweep_rate_limits<P: AuthProviders>(
    orchestrator: &LoginOrchestrator<P>,
) -> Result<usize> {
    let idle = orchestrator.rate_limits().idle_key_ttl;
    let removed = orchestrator.rate_limiter().sweep(idle).await?;
    if removed > 0 {
        debug!(removed, "Swept idle rate-limit keys");
    }
    Ok(removed)
}

/// Run every storage sweep once.
///
/// Each sweep runs even if an earlier one failed; the first error is
/// returned after all have been attempted.
///
/// # Errors
///
/// Returns the first store error encountered.
pub async fn sweep_storage<P: AuthProviders>(
    orchestrator: &LoginOrchestrator<P>,
) -> Result<SweepReport> {
    let refresh_tokens = orchestrator.refresh_tokens().sweep_expired().await;
    let one_time_tokens = orchestrator.credentials().purge_expired_tokens().await;
    let devices = orchestrator.devices().sweep_inactive().await;
    let login_attempts = orchestrator.devices().sweep_attempts().await;

    Ok(SweepReport {
        refresh_tokens: refresh_tokens?,
        one_time_tokens: one_time_tokens?,
        devices: devices?,
        login_attempts: login_attempts?,
    })
}
