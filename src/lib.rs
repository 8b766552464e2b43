//! Rust library exposing Home Theater Direct (HTD) multi-zone amplifiers as
//! media-player entities
//!
//! Each amplifier zone becomes a [`ZoneAdapter`] that caches the zone's last
//! known state and forwards host commands to a shared [`Gateway`], the client
//! that actually talks to the controller. The library provides:
//!
//! - Zone state projection (power, volume, mute, selected source)
//! - Power, mute and source commands
//! - Volume ramps that coalesce rapid slider movement into the latest target
//! - Controller setup/unload from a persisted [`ConfigEntry`], with polling
//! - A setup wizard and options editor ([`ConfigFlow`], [`OptionsFlow`])
//! - Cleanup of host entities for zones that are no longer active
//!
//! # Quick Start
//!
//! ```no_run
//! use htd_zones::sim::{SimulatedConnector, SimulatedController};
//! use htd_zones::{ConfigEntry, Controller, EntryData, EntryOptions, ModelInfo};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let entry = ConfigEntry {
//!         entry_id: "living-room".into(),
//!         title: "Living Room".into(),
//!         data: EntryData {
//!             host: "192.168.1.50".into(),
//!             port: 10006,
//!             unique_id: None,
//!         },
//!         options: EntryOptions::new("Living Room"),
//!     };
//!
//!     let sim = Arc::new(SimulatedController::new(ModelInfo {
//!         model_name: "MCA66".into(),
//!         friendly_name: "HTD MCA-66".into(),
//!     }).with_zones(6));
//!     let controller = Controller::setup(&entry, &SimulatedConnector::new(sim)).await?;
//!
//!     let mut updates = controller.subscribe_state();
//!     if let Some(zone) = controller.zone(1) {
//!         zone.turn_on().await?;
//!         zone.set_volume(0.4).await?;
//!         zone.select_source("Source 2").await?;
//!     }
//!
//!     while let Some(update) = updates.try_recv()? {
//!         println!("Zone {} changed: {:?}", update.zone, update.snapshot);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **Gateway**: trait for the device-control client; owns I/O and retries
//! - **Zone**: per-zone adapter and volume ramp reconciliation
//! - **Controller**: one config entry, its shared gateway and zones
//! - **Flow**: setup wizard and options editor producing entries
//! - **Config**: persisted entry data and options
//! - **Sim**: in-memory controller for tests and demos (`test-support` feature)

mod config;
mod controller;
mod error;
mod flow;
mod gateway;
mod registry;
#[cfg(any(test, feature = "test-support"))]
pub mod sim;
mod subscription;
mod types;
mod zone;

// Public exports
pub use config::{ConfigEntry, EntryData, EntryOptions, SourceNames};
pub use controller::{Controller, DEFAULT_SCAN_INTERVAL};
pub use error::{HtdError, Result};
pub use flow::{
    ConfigFlow, Field, FieldKind, FlowResult, OptionsFlow, Schema, StepId,
    ABORT_ALREADY_CONFIGURED, BASE_ERROR_KEY, ERROR_NO_CONNECTION,
};
pub use gateway::{Connector, Gateway, GatewaySettings, StepCallback};
pub use registry::{EntityRegistry, RegisteredEntity};
pub use subscription::{StateReceiver, StateUpdate};
pub use types::{
    fraction_to_volume, ModelInfo, PowerState, SourceIndex, SupportedFeatures, VolumeLevel,
    ZoneNumber, ZoneSnapshot, DEFAULT_PORT, MAX_SOURCES, MAX_VOLUME, MAX_ZONES,
};
pub use zone::{ZoneAdapter, ZoneConfig, VOLUME_STEP};
