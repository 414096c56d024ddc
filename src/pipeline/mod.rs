// Pipeline composition root.
//
// One explicitly constructed pipeline instance owns the telemetry client,
// the alert manager, and the dispatcher; the UI talks to it through a
// handle (commands in, alert snapshots out) instead of importing shared
// globals. At most one tick runs at a time because the driver loop is the
// only caller.

pub mod driver;

use std::sync::Arc;

use async_trait::async_trait;
use log::warn;
use tokio::sync::{mpsc, watch};

use crate::alerts::manager::AlertManager;
use crate::alerts::model::Alert;
use crate::config::NotificationConfig;
use crate::error::ZoneStoreError;
use crate::geofence::DangerZone;
use crate::notify::NotificationDispatcher;
use crate::telemetry::{TelemetryClient, TelemetryTransport};

/// Read access to the externally-owned zone store. The core never writes.
#[async_trait]
pub trait ZoneStore: Send + Sync {
    async fn get_zones(&self) -> Result<Vec<DangerZone>, ZoneStoreError>;
}

/// Fixed in-memory zone set; useful for hosts that load zones up front.
pub struct StaticZoneStore {
    zones: Vec<DangerZone>,
}

impl StaticZoneStore {
    pub fn new(zones: Vec<DangerZone>) -> Self {
        Self { zones }
    }
}

#[async_trait]
impl ZoneStore for StaticZoneStore {
    async fn get_zones(&self) -> Result<Vec<DangerZone>, ZoneStoreError> {
        Ok(self.zones.clone())
    }
}

/// Commands the UI can send to the running pipeline.
#[derive(Debug, Clone)]
pub enum PipelineCommand {
    /// Manual pull-to-refresh: drop the cache slot, reset notification
    /// cooldowns, then tick immediately.
    RefreshNow,
    UpdateNotificationConfig(NotificationConfig),
    /// Device-level location to evaluate against when the sample has no fix.
    SetFallbackLocation(Option<(f64, f64)>),
}

/// UI-side handle: send commands, watch the latest alert list.
#[derive(Clone)]
pub struct PipelineHandle {
    commands: mpsc::Sender<PipelineCommand>,
    alerts: watch::Receiver<Vec<Alert>>,
}

impl PipelineHandle {
    pub async fn send(&self, command: PipelineCommand) {
        if self.commands.send(command).await.is_err() {
            warn!("pipeline is no longer running, command dropped");
        }
    }

    /// Latest alert list; the receiver updates after every tick.
    pub fn alerts(&self) -> watch::Receiver<Vec<Alert>> {
        self.alerts.clone()
    }
}

pub struct Pipeline<T> {
    manager: AlertManager<T>,
    zone_store: Arc<dyn ZoneStore>,
    fallback_location: Option<(f64, f64)>,
    commands: mpsc::Receiver<PipelineCommand>,
    alerts_tx: watch::Sender<Vec<Alert>>,
}

impl<T: TelemetryTransport> Pipeline<T> {
    pub fn new(
        transport: T,
        zone_store: Arc<dyn ZoneStore>,
        notification_config: NotificationConfig,
        haptics: Arc<dyn crate::notify::Haptics>,
        audio: Arc<dyn crate::notify::Audio>,
        visual: Arc<dyn crate::notify::Visual>,
    ) -> (Self, PipelineHandle) {
        let client = TelemetryClient::new(transport);
        let dispatcher = NotificationDispatcher::new(haptics, audio, visual, notification_config);
        let manager = AlertManager::new(client, dispatcher);

        let (commands_tx, commands_rx) = mpsc::channel(8);
        let (alerts_tx, alerts_rx) = watch::channel(Vec::new());

        let pipeline = Self {
            manager,
            zone_store,
            fallback_location: None,
            commands: commands_rx,
            alerts_tx,
        };
        let handle = PipelineHandle {
            commands: commands_tx,
            alerts: alerts_rx,
        };
        (pipeline, handle)
    }

    /// Run one poll cycle and publish the resulting alert list.
    pub async fn tick(&mut self) -> Vec<Alert> {
        let zones = match self.zone_store.get_zones().await {
            Ok(zones) => zones,
            Err(e) => {
                // Corrupt or unavailable store degrades to "no zones".
                warn!("zone store unreadable, evaluating with no zones: {e}");
                Vec::new()
            }
        };
        let zones: Vec<DangerZone> = zones
            .into_iter()
            .filter(|zone| {
                if zone.radius > 0.0 {
                    true
                } else {
                    warn!("dropping zone {} with non-positive radius", zone.id);
                    false
                }
            })
            .collect();

        let alerts = self.manager.tick(&zones, self.fallback_location).await;
        let _ = self.alerts_tx.send(alerts.clone());
        alerts
    }

    /// Apply a queued command. Called by the driver between ticks.
    pub async fn apply(&mut self, command: PipelineCommand) {
        match command {
            PipelineCommand::RefreshNow => {
                self.manager.invalidate_cache().await;
                self.manager.clear_cooldowns();
            }
            PipelineCommand::UpdateNotificationConfig(config) => {
                self.manager.update_notification_config(config);
            }
            PipelineCommand::SetFallbackLocation(location) => {
                self.fallback_location = location;
            }
        }
    }

    /// Wait for the next queued command; `None` once every handle is gone.
    /// Cancel-safe, so the driver can select on it against its poll timer.
    async fn next_command(&mut self) -> Option<PipelineCommand> {
        self.commands.recv().await
    }

    fn try_next_command(&mut self) -> Option<PipelineCommand> {
        self.commands.try_recv().ok()
    }
}
