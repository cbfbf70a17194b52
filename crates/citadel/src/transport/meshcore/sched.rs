// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Periodic advert broadcasts and the engine watchdog.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::transport::meshcore::device::RadioDevice;

/// Send an advert now and then every `interval`, until cancelled.
pub fn spawn_advert_scheduler(
    device: Arc<dyn RadioDevice>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let flood = false;
            tracing::info!(flood, "sending advert");
            if let Err(e) = device.send_advert(flood).await {
                tracing::warn!(err = %e, "unable to send advert");
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }
        tracing::info!("advert scheduler shut down");
    })
}

/// Feeds the watchdog. Cheap to clone; hand one to every ingress point.
#[derive(Clone)]
pub struct WatchdogFeeder {
    fed: Arc<Notify>,
}

impl WatchdogFeeder {
    /// A feeder with no watchdog behind it, for runs without supervision.
    pub fn detached() -> Self {
        Self { fed: Arc::new(Notify::new()) }
    }

    pub fn feed(&self) {
        self.fed.notify_one();
        tracing::debug!("watchdog fed");
    }
}

/// Wait for feeds with a timeout; a missed window fires `on_timeout` and
/// the watchdog resumes waiting.
pub fn spawn_watchdog<F, Fut>(
    timeout: Duration,
    cancel: CancellationToken,
    on_timeout: F,
) -> (WatchdogFeeder, JoinHandle<()>)
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    let fed = Arc::new(Notify::new());
    let feeder = WatchdogFeeder { fed: Arc::clone(&fed) };
    tracing::info!(timeout_secs = timeout.as_secs(), "starting watchdog timer");

    let handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = fed.notified() => {
                    tracing::debug!("watchdog reset");
                }
                _ = tokio::time::sleep(timeout) => {
                    tracing::error!("watchdog timed out, invoking restart");
                    on_timeout().await;
                }
            }
        }
        tracing::info!("watchdog shut down");
    });
    (feeder, handle)
}

#[cfg(test)]
#[path = "sched_tests.rs"]
mod tests;
