use crate::error::{HtdError, Result};
use crate::gateway::Gateway;
use crate::subscription::{StateReceiver, StateUpdate, UPDATE_CHANNEL_CAPACITY};
use crate::types::{
    fraction_to_volume, PowerState, SourceIndex, SupportedFeatures, VolumeLevel, ZoneNumber,
    ZoneSnapshot, MAX_VOLUME, MAX_ZONES,
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;

/// Prefix of every zone's host entity id
pub const ENTITY_ID_PREFIX: &str = "media_player.htd_";

/// Icon shown for every zone
pub const ZONE_ICON: &str = "mdi:disc-player";

/// Fraction added or removed by `volume_up` / `volume_down`
pub const VOLUME_STEP: f64 = 1.0 / MAX_VOLUME as f64;

/// Static settings of one zone
#[derive(Debug, Clone)]
pub struct ZoneConfig {
    /// Unique id of the controller the zone belongs to
    pub device_unique_id: String,

    /// User-facing controller name
    pub device_name: String,

    pub zone: ZoneNumber,

    /// Source names, in device order
    pub sources: Vec<String>,

    /// Publish every intermediate volume step instead of only the settled value
    pub update_volume_on_change: bool,
}

/// Media-player adapter for one amplifier zone
///
/// Holds the last snapshot read from the gateway and translates host verbs
/// into gateway commands. All zones of a controller share one gateway.
pub struct ZoneAdapter {
    gateway: Arc<dyn Gateway>,
    config: ZoneConfig,
    snapshot: Mutex<Option<ZoneSnapshot>>,
    /// Latest requested volume while a ramp is in flight
    pending_volume: Mutex<Option<VolumeLevel>>,
    updates: broadcast::Sender<StateUpdate>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ZoneAdapter {
    /// Create an adapter without querying the zone
    pub fn new(gateway: Arc<dyn Gateway>, config: ZoneConfig) -> Result<Self> {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self::with_updates(gateway, config, updates)
    }

    /// Create an adapter and populate its snapshot with one query
    pub async fn connect(gateway: Arc<dyn Gateway>, config: ZoneConfig) -> Result<Self> {
        let adapter = Self::new(gateway, config)?;
        adapter.refresh().await?;
        Ok(adapter)
    }

    pub(crate) fn with_updates(
        gateway: Arc<dyn Gateway>,
        config: ZoneConfig,
        updates: broadcast::Sender<StateUpdate>,
    ) -> Result<Self> {
        if config.zone == 0 || config.zone > MAX_ZONES {
            return Err(HtdError::InvalidZone(config.zone));
        }

        Ok(Self {
            gateway,
            config,
            snapshot: Mutex::new(None),
            pending_volume: Mutex::new(None),
            updates,
        })
    }

    /// Subscribe to this zone's state updates
    ///
    /// Zones created by a controller share one channel, so the receiver also
    /// yields updates for sibling zones.
    pub fn subscribe(&self) -> StateReceiver {
        StateReceiver::new(self.updates.subscribe())
    }

    // ========== Identity ==========

    pub fn zone(&self) -> ZoneNumber {
        self.config.zone
    }

    /// Unique id of the host entity
    pub fn unique_id(&self) -> String {
        format!("{}_{}", self.config.device_unique_id, self.config.zone)
    }

    /// Display name of the host entity
    pub fn name(&self) -> String {
        format!("Zone {} ({})", self.config.zone, self.config.device_name)
    }

    /// Entity id the host registers the zone under
    pub fn entity_id(&self) -> String {
        let slug: String = self
            .config
            .device_name
            .to_lowercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        format!("{}{}_zone_{}", ENTITY_ID_PREFIX, slug, self.config.zone)
    }

    pub fn icon(&self) -> &'static str {
        ZONE_ICON
    }

    pub fn supported_features(&self) -> SupportedFeatures {
        SupportedFeatures::HTD
    }

    pub fn source_list(&self) -> &[String] {
        &self.config.sources
    }

    // ========== State ==========

    /// Get a copy of the last snapshot, if any query has succeeded
    pub fn snapshot(&self) -> Option<ZoneSnapshot> {
        lock(&self.snapshot).clone()
    }

    /// Whether the zone has been read at least once
    pub fn enabled(&self) -> bool {
        lock(&self.snapshot).is_some()
    }

    /// Volume a running ramp is currently asked to reach
    pub fn pending_volume(&self) -> Option<VolumeLevel> {
        *lock(&self.pending_volume)
    }

    pub fn state(&self) -> PowerState {
        lock(&self.snapshot)
            .as_ref()
            .map(|s| s.power)
            .unwrap_or_default()
    }

    /// Volume as a 0.0..=1.0 fraction
    pub fn volume_level(&self) -> Option<f64> {
        lock(&self.snapshot).as_ref().map(ZoneSnapshot::volume_fraction)
    }

    pub fn is_volume_muted(&self) -> Option<bool> {
        lock(&self.snapshot).as_ref().map(|s| s.mute)
    }

    /// Name of the selected source
    ///
    /// Fails with `InvalidSourceIndex` when the controller reports an index
    /// the configured source list does not cover.
    pub fn source(&self) -> Result<Option<String>> {
        let index = match lock(&self.snapshot).as_ref() {
            Some(snapshot) => snapshot.source,
            None => return Ok(None),
        };

        let name = usize::from(index)
            .checked_sub(1)
            .and_then(|i| self.config.sources.get(i))
            .ok_or(HtdError::InvalidSourceIndex {
                index,
                available: self.config.sources.len(),
            })?;

        Ok(Some(name.clone()))
    }

    /// Title shown by the host; zones have no metadata besides their source
    pub fn media_title(&self) -> Result<Option<String>> {
        self.source()
    }

    /// Re-read the zone from the gateway
    ///
    /// On failure the previous snapshot is kept.
    pub async fn refresh(&self) -> Result<()> {
        let snapshot = self.gateway.query_zone(self.config.zone).await?;
        tracing::debug!("Got new update for zone {}: {:?}", self.config.zone, snapshot);
        *lock(&self.snapshot) = Some(snapshot);
        Ok(())
    }

    // ========== Power Control ==========

    pub async fn turn_on(&self) -> Result<()> {
        self.gateway.power_on(self.config.zone).await
    }

    pub async fn turn_off(&self) -> Result<()> {
        self.gateway.power_off(self.config.zone).await
    }

    // ========== Volume Control ==========

    /// Move the zone's volume to `fraction` (0.0..=1.0)
    ///
    /// Only one ramp runs per zone. While it runs, further calls just replace
    /// the pending target and return; the running ramp is redirected to the
    /// newest value from its progress callback. Exactly one state update,
    /// carrying the last volume the controller reported, is published once the
    /// ramp settles.
    pub async fn set_volume(&self, fraction: f64) -> Result<()> {
        let mut target = fraction_to_volume(fraction).ok_or(HtdError::InvalidVolume(fraction))?;

        if let Some(previous) = lock(&self.pending_volume).replace(target) {
            tracing::debug!(
                "Changing desired volume for zone {} from {} to {}",
                self.config.zone,
                previous,
                target
            );
            return Ok(());
        }

        let mut settled: Option<ZoneSnapshot> = None;
        let result = loop {
            let mut heading = target;
            let result = self
                .gateway
                .set_volume(self.config.zone, target, &mut |requested, snapshot| {
                    let redirect = self.on_volume_step(requested, snapshot);
                    heading = redirect.unwrap_or(requested);
                    settled = Some(snapshot.clone());
                    redirect
                })
                .await;

            // A target stored after the ramp's last step was never seen by the
            // callback, so start one more ramp for it.
            let mut pending = lock(&self.pending_volume);
            match *pending {
                Some(latest) if result.is_ok() && latest != heading => {
                    tracing::debug!(
                        "Zone {} settled at {}, continuing to {}",
                        self.config.zone,
                        heading,
                        latest
                    );
                    target = latest;
                }
                _ => {
                    *pending = None;
                    break result;
                }
            }
        };

        if let Some(snapshot) = settled {
            *lock(&self.snapshot) = Some(snapshot);
        }
        self.notify();
        result
    }

    fn on_volume_step(&self, requested: VolumeLevel, snapshot: &ZoneSnapshot) -> Option<VolumeLevel> {
        if self.config.update_volume_on_change {
            *lock(&self.snapshot) = Some(snapshot.clone());
            self.notify();
        }

        tracing::debug!(
            "Updated zone {}, desired = {}, current = {}",
            self.config.zone,
            requested,
            snapshot.volume
        );

        match *lock(&self.pending_volume) {
            Some(latest) if latest != requested => {
                tracing::debug!(
                    "A new volume for zone {} has been chosen, value = {}",
                    self.config.zone,
                    latest
                );
                Some(latest)
            }
            _ => None,
        }
    }

    /// Raise the volume by one device step
    pub async fn volume_up(&self) -> Result<()> {
        let current = self.current_volume_target()?;
        self.set_volume(current + VOLUME_STEP).await
    }

    /// Lower the volume by one device step
    pub async fn volume_down(&self) -> Result<()> {
        let current = self.current_volume_target()?;
        self.set_volume(current - VOLUME_STEP).await
    }

    fn current_volume_target(&self) -> Result<f64> {
        if let Some(pending) = self.pending_volume() {
            return Ok(f64::from(pending) / f64::from(MAX_VOLUME));
        }
        self.volume_level()
            .ok_or(HtdError::NoSnapshot(self.config.zone))
    }

    // ========== Mute Control ==========

    /// Flip the zone's mute state
    pub async fn toggle_mute(&self) -> Result<()> {
        self.gateway.toggle_mute(self.config.zone).await
    }

    /// Bring the mute state to `mute`
    ///
    /// The controller only supports toggling, so nothing is sent when the last
    /// snapshot already matches.
    pub async fn mute_volume(&self, mute: bool) -> Result<()> {
        if self.is_volume_muted() == Some(mute) {
            tracing::debug!("Zone {} mute already {}", self.config.zone, mute);
            return Ok(());
        }
        self.toggle_mute().await
    }

    // ========== Source Selection ==========

    /// Select a source by its configured name
    pub async fn select_source(&self, name: &str) -> Result<()> {
        let index = self
            .config
            .sources
            .iter()
            .position(|s| s == name)
            .and_then(|i| SourceIndex::try_from(i + 1).ok())
            .ok_or_else(|| HtdError::UnknownSource(name.to_string()))?;

        self.gateway.set_source(self.config.zone, index).await
    }

    fn notify(&self) {
        let _ = self.updates.send(StateUpdate {
            zone: self.config.zone,
            snapshot: self.snapshot(),
        });
    }
}
