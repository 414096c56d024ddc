// Periodic tick driver.
//
// The driver owns the poll cadence: the interval is derived from the worst
// live alert level, so a critical condition is re-checked more often than a
// calm one. Ticks run strictly one at a time; a manual tick requested while
// one is in progress is dropped, not queued, so a slow network can never
// build a backlog of pending ticks.

use std::time::Duration;

use log::{debug, info};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::alerts::model::{Alert, AlertLevel};
use crate::telemetry::TelemetryTransport;

use super::{Pipeline, PipelineCommand};

/// Poll intervals by worst live alert level.
const CRITICAL_POLL: Duration = Duration::from_secs(10);
const WARNING_POLL: Duration = Duration::from_secs(20);
const CALM_POLL: Duration = Duration::from_secs(45);

/// Interval until the next tick given the current alert list.
pub fn poll_interval(alerts: &[Alert]) -> Duration {
    match alerts.iter().map(|a| a.level).max() {
        Some(AlertLevel::Critical) => CRITICAL_POLL,
        Some(AlertLevel::Warning) => WARNING_POLL,
        Some(AlertLevel::Info) | None => CALM_POLL,
    }
}

/// Manual tick requests from the UI. Capacity one; a request that arrives
/// while the slot is full is simply dropped.
#[derive(Clone)]
pub struct TickRequester {
    tx: mpsc::Sender<()>,
}

impl TickRequester {
    pub fn request(&self) {
        let _ = self.tx.try_send(());
    }
}

/// Spawn the driver as a background task. The returned requester triggers
/// an immediate tick; dropping every clone of it stops the driver.
pub fn spawn<T: TelemetryTransport + 'static>(pipeline: Pipeline<T>) -> TickRequester {
    let (tick_tx, tick_rx) = mpsc::channel::<()>(1);
    tokio::spawn(run(pipeline, tick_rx));
    TickRequester { tx: tick_tx }
}

/// The driver loop. First tick runs immediately; after that the cadence
/// adapts to the worst live alert level. Queued commands wake the loop as
/// they arrive: a manual refresh ticks immediately, other commands take
/// effect without disturbing the scheduled poll.
async fn run<T: TelemetryTransport>(mut pipeline: Pipeline<T>, mut tick_rx: mpsc::Receiver<()>) {
    info!("alert pipeline driver started");
    let mut deadline = Instant::now();
    let mut commands_open = true;

    loop {
        let tick_now = tokio::select! {
            () = tokio::time::sleep_until(deadline) => true,
            request = tick_rx.recv() => {
                if request.is_none() {
                    info!("all tick requesters dropped, driver stopping");
                    return;
                }
                debug!("manual tick requested");
                true
            }
            command = pipeline.next_command(), if commands_open => {
                match command {
                    Some(command) => {
                        let refresh = matches!(command, PipelineCommand::RefreshNow);
                        pipeline.apply(command).await;
                        refresh
                    }
                    None => {
                        // Every handle is gone; keep polling on the timer.
                        commands_open = false;
                        false
                    }
                }
            }
        };

        if !tick_now {
            continue;
        }

        while let Some(command) = pipeline.try_next_command() {
            pipeline.apply(command).await;
        }

        let alerts = pipeline.tick().await;

        // Requests that arrived while the tick ran are dropped, not queued.
        while tick_rx.try_recv().is_ok() {}

        let interval = poll_interval(&alerts);
        deadline = Instant::now() + interval;
        debug!(
            "tick complete: {} live alerts, next poll in {:?}",
            alerts.len(),
            interval
        );
    }
}
