//! In-memory controller for tests and demos.
//!
//! `SimulatedController` implements [`Gateway`] without any I/O. Volume ramps
//! move one device step at a time, the way the real amplifier does, and every
//! command is recorded so callers can assert on what a zone sent.

use crate::error::{HtdError, Result};
use crate::gateway::{Connector, Gateway, GatewaySettings, StepCallback};
use crate::types::{
    ModelInfo, PowerState, SourceIndex, VolumeLevel, ZoneNumber, ZoneSnapshot, MAX_VOLUME,
};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Semaphore;

/// Command received by a simulated controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    QueryZone(ZoneNumber),
    PowerOn(ZoneNumber),
    PowerOff(ZoneNumber),
    /// Top-level volume command
    SetVolume { zone: ZoneNumber, target: VolumeLevel },
    /// Running ramp retargeted from its progress callback
    Redirect { zone: ZoneNumber, target: VolumeLevel },
    ToggleMute(ZoneNumber),
    SetSource { zone: ZoneNumber, source: SourceIndex },
    ModelInfo,
}

/// Simulated HTD controller
pub struct SimulatedController {
    model: ModelInfo,
    zones: Mutex<BTreeMap<ZoneNumber, ZoneSnapshot>>,
    calls: Mutex<Vec<Command>>,
    offline: AtomicBool,
    step_delay: Duration,
    step_gate: Option<Arc<Semaphore>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SimulatedController {
    pub fn new(model: ModelInfo) -> Self {
        Self {
            model,
            zones: Mutex::new(BTreeMap::new()),
            calls: Mutex::new(Vec::new()),
            offline: AtomicBool::new(false),
            step_delay: Duration::ZERO,
            step_gate: None,
        }
    }

    /// Add zones `1..=count`, powered off at volume 0 on source 1
    pub fn with_zones(self, count: ZoneNumber) -> Self {
        {
            let mut zones = lock(&self.zones);
            for zone in 1..=count {
                zones.insert(
                    zone,
                    ZoneSnapshot {
                        zone,
                        power: PowerState::Off,
                        volume: 0,
                        mute: false,
                        source: 1,
                    },
                );
            }
        }
        self
    }

    /// Sleep this long before every volume step
    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }

    /// Take one permit from `gate` before every volume step
    ///
    /// Lets tests hold a ramp in flight and release it step by step.
    pub fn with_step_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.step_gate = Some(gate);
        self
    }

    /// Replace a zone's state
    pub fn set_zone_state(&self, snapshot: ZoneSnapshot) {
        lock(&self.zones).insert(snapshot.zone, snapshot);
    }

    pub fn zone_state(&self, zone: ZoneNumber) -> Option<ZoneSnapshot> {
        lock(&self.zones).get(&zone).cloned()
    }

    /// Make every following command fail with a timeout
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Commands received so far, in order
    pub fn calls(&self) -> Vec<Command> {
        lock(&self.calls).clone()
    }

    pub fn clear_calls(&self) {
        lock(&self.calls).clear();
    }

    fn receive(&self, command: Command) -> Result<()> {
        lock(&self.calls).push(command);
        if self.offline.load(Ordering::SeqCst) {
            return Err(HtdError::Timeout);
        }
        Ok(())
    }

    fn update_zone<F>(&self, zone: ZoneNumber, f: F) -> Result<ZoneSnapshot>
    where
        F: FnOnce(&mut ZoneSnapshot),
    {
        let mut zones = lock(&self.zones);
        let snapshot = zones.get_mut(&zone).ok_or(HtdError::InvalidZone(zone))?;
        f(snapshot);
        Ok(snapshot.clone())
    }

    async fn wait_for_step(&self) {
        if let Some(gate) = &self.step_gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        if self.step_delay.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.step_delay).await;
        }
    }
}

#[async_trait]
impl Gateway for SimulatedController {
    async fn query_zone(&self, zone: ZoneNumber) -> Result<ZoneSnapshot> {
        self.receive(Command::QueryZone(zone))?;
        self.zone_state(zone).ok_or(HtdError::InvalidZone(zone))
    }

    async fn power_on(&self, zone: ZoneNumber) -> Result<()> {
        self.receive(Command::PowerOn(zone))?;
        self.update_zone(zone, |s| s.power = PowerState::On)?;
        Ok(())
    }

    async fn power_off(&self, zone: ZoneNumber) -> Result<()> {
        self.receive(Command::PowerOff(zone))?;
        self.update_zone(zone, |s| s.power = PowerState::Off)?;
        Ok(())
    }

    async fn set_volume(
        &self,
        zone: ZoneNumber,
        target: VolumeLevel,
        on_step: &mut StepCallback<'_>,
    ) -> Result<()> {
        self.receive(Command::SetVolume { zone, target })?;
        let mut target = target.min(MAX_VOLUME);

        loop {
            let current = self.zone_state(zone).ok_or(HtdError::InvalidZone(zone))?.volume;
            if current == target {
                return Ok(());
            }

            self.wait_for_step().await;
            if self.offline.load(Ordering::SeqCst) {
                return Err(HtdError::Timeout);
            }

            let snapshot = self.update_zone(zone, |s| {
                if s.volume < target {
                    s.volume += 1;
                } else {
                    s.volume -= 1;
                }
            })?;

            if let Some(next) = on_step(target, &snapshot) {
                let next = next.min(MAX_VOLUME);
                if next != target {
                    lock(&self.calls).push(Command::Redirect { zone, target: next });
                    target = next;
                }
            }
        }
    }

    async fn toggle_mute(&self, zone: ZoneNumber) -> Result<()> {
        self.receive(Command::ToggleMute(zone))?;
        self.update_zone(zone, |s| s.mute = !s.mute)?;
        Ok(())
    }

    async fn set_source(&self, zone: ZoneNumber, source: SourceIndex) -> Result<()> {
        self.receive(Command::SetSource { zone, source })?;
        self.update_zone(zone, |s| s.source = source)?;
        Ok(())
    }

    async fn model_info(&self) -> Result<ModelInfo> {
        self.receive(Command::ModelInfo)?;
        Ok(self.model.clone())
    }
}

/// Connector handing out one shared simulated controller
pub struct SimulatedConnector {
    controller: Option<Arc<SimulatedController>>,
    connects: Mutex<Vec<GatewaySettings>>,
}

impl SimulatedConnector {
    pub fn new(controller: Arc<SimulatedController>) -> Self {
        Self {
            controller: Some(controller),
            connects: Mutex::new(Vec::new()),
        }
    }

    /// Connector whose every connection attempt is refused
    pub fn unreachable() -> Self {
        Self {
            controller: None,
            connects: Mutex::new(Vec::new()),
        }
    }

    /// Settings of every connection attempt so far
    pub fn connects(&self) -> Vec<GatewaySettings> {
        lock(&self.connects).clone()
    }
}

#[async_trait]
impl Connector for SimulatedConnector {
    async fn connect(&self, settings: &GatewaySettings) -> Result<Arc<dyn Gateway>> {
        lock(&self.connects).push(settings.clone());
        tracing::debug!("Connecting to simulated controller at {}:{}", settings.host, settings.port);

        match &self.controller {
            Some(controller) => Ok(controller.clone()),
            None => Err(HtdError::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("{}:{} refused connection", settings.host, settings.port),
            ))),
        }
    }
}
