use crate::config::ConfigEntry;
use crate::error::{HtdError, Result};
use crate::gateway::{Connector, Gateway};
use crate::subscription::{StateReceiver, StateUpdate, UPDATE_CHANNEL_CAPACITY};
use crate::types::{ModelInfo, ZoneNumber};
use crate::zone::{ZoneAdapter, ZoneConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// How often zones are re-read when the host does not choose an interval
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(10);

/// One configured HTD controller and its zones
///
/// The controller opens a single gateway and hands it to every zone, so all
/// zones of one amplifier share a connection.
///
/// # Example
///
/// ```no_run
/// use htd_zones::sim::{SimulatedConnector, SimulatedController};
/// use htd_zones::{ConfigEntry, Controller, ModelInfo};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let json = std::fs::read_to_string("htd_entry.json")?;
///     let entry = ConfigEntry::from_json(&json)?;
///
///     let sim = Arc::new(SimulatedController::new(ModelInfo {
///         model_name: "MCA66".into(),
///         friendly_name: "HTD MCA-66".into(),
///     }).with_zones(6));
///     let controller = Controller::setup(&entry, &SimulatedConnector::new(sim)).await?;
///
///     if let Some(zone) = controller.zone(1) {
///         zone.turn_on().await?;
///         zone.set_volume(0.3).await?;
///     }
///     Ok(())
/// }
/// ```
pub struct Controller {
    entry_id: String,
    gateway: Arc<dyn Gateway>,
    zones: Vec<Arc<ZoneAdapter>>,
    updates: broadcast::Sender<StateUpdate>,
    stop_tx: Option<broadcast::Sender<()>>,
    poll_handle: Option<JoinHandle<()>>,
    poll_interval: Option<Duration>,
}

impl Controller {
    /// Connect to the entry's controller and create its active zones
    ///
    /// Every zone is queried once before this returns.
    pub async fn setup(entry: &ConfigEntry, connector: &dyn Connector) -> Result<Self> {
        entry.options.validate()?;

        let settings = entry.gateway_settings();
        tracing::info!(
            "Setting up {} ({}:{}) with {} zones",
            entry.title,
            settings.host,
            settings.port,
            entry.options.active_zones
        );
        let gateway = connector.connect(&settings).await?;

        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        let mut zones = Vec::with_capacity(usize::from(entry.options.active_zones));

        for zone in 1..=entry.options.active_zones {
            let config = ZoneConfig {
                device_unique_id: entry.device_unique_id().to_string(),
                device_name: entry.options.device_name.clone(),
                zone,
                sources: entry.options.source_names().to_vec(),
                update_volume_on_change: entry.options.update_volume_on_change,
            };
            let adapter = ZoneAdapter::with_updates(gateway.clone(), config, updates.clone())?;
            adapter.refresh().await?;
            zones.push(Arc::new(adapter));
        }

        Ok(Self {
            entry_id: entry.entry_id.clone(),
            gateway,
            zones,
            updates,
            stop_tx: None,
            poll_handle: None,
            poll_interval: None,
        })
    }

    pub fn entry_id(&self) -> &str {
        &self.entry_id
    }

    pub fn zones(&self) -> &[Arc<ZoneAdapter>] {
        &self.zones
    }

    /// Get a zone by its 1-based number
    pub fn zone(&self, zone: ZoneNumber) -> Option<Arc<ZoneAdapter>> {
        self.zones.iter().find(|z| z.zone() == zone).cloned()
    }

    /// Read the controller's model and friendly name
    pub async fn model_info(&self) -> Result<ModelInfo> {
        self.gateway.model_info().await
    }

    /// Subscribe to state updates from every zone
    pub fn subscribe_state(&self) -> StateReceiver {
        StateReceiver::new(self.updates.subscribe())
    }

    /// Refresh every zone once
    ///
    /// Stops at the first zone that fails; zones already refreshed keep their
    /// new snapshot.
    pub async fn refresh_all(&self) -> Result<()> {
        for zone in &self.zones {
            zone.refresh().await?;
        }
        Ok(())
    }

    /// Start re-reading all zones every `interval`
    ///
    /// A failed refresh is logged and retried on the next tick. If polling is
    /// already running it is restarted with the new interval.
    pub async fn start_polling(&mut self, interval: Duration) -> Result<()> {
        if interval.is_zero() {
            return Err(HtdError::InvalidConfig("scan interval must be positive".to_string()));
        }

        self.stop_polling().await;

        let (stop_tx, _) = broadcast::channel(1);
        let mut stop_rx = stop_tx.subscribe();
        self.stop_tx = Some(stop_tx);

        let zones = self.zones.clone();
        let updates = self.updates.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately and zones were just read
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = stop_rx.recv() => {
                        tracing::debug!("Polling stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        for zone in &zones {
                            match zone.refresh().await {
                                Ok(()) => {
                                    let _ = updates.send(StateUpdate {
                                        zone: zone.zone(),
                                        snapshot: zone.snapshot(),
                                    });
                                }
                                Err(e) => {
                                    tracing::warn!("Failed to refresh zone {}: {}", zone.zone(), e);
                                }
                            }
                        }
                    }
                }
            }
        });

        self.poll_handle = Some(handle);
        self.poll_interval = Some(interval);
        Ok(())
    }

    /// Stop the poll loop, if running
    pub async fn stop_polling(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }

        if let Some(handle) = self.poll_handle.take() {
            let _ = handle.await;
        }
        self.poll_interval = None;
    }

    pub fn is_polling(&self) -> bool {
        self.poll_handle.is_some()
    }

    /// Tear down the entry's zones
    pub async fn unload(mut self) -> bool {
        self.stop_polling().await;
        tracing::info!("Unloaded entry {} ({} zones)", self.entry_id, self.zones.len());
        true
    }

    /// Apply an updated entry by unloading and setting up again
    pub async fn reload(self, entry: &ConfigEntry, connector: &dyn Connector) -> Result<Self> {
        let interval = self.poll_interval;
        self.unload().await;

        let mut controller = Self::setup(entry, connector).await?;
        if let Some(interval) = interval {
            controller.start_polling(interval).await?;
        }
        Ok(controller)
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
    }
}
