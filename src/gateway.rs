//! Seam between zone adapters and the device-control client.
//!
//! The gateway owns the physical connection to one controller, including
//! command pacing, retries and socket timeouts. Zones only ever talk to it
//! through these traits.

use crate::error::Result;
use crate::types::{ModelInfo, SourceIndex, VolumeLevel, ZoneNumber, ZoneSnapshot};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Progress callback for a volume ramp
///
/// Invoked with the target the ramp is currently heading for and the latest
/// intermediate snapshot. Returning `Some(target)` redirects the running ramp
/// to a new target; `None` lets it finish.
pub type StepCallback<'a> = dyn FnMut(VolumeLevel, &ZoneSnapshot) -> Option<VolumeLevel> + Send + 'a;

/// Client for one HTD controller, shared by all of its zones
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Read the current state of a zone
    async fn query_zone(&self, zone: ZoneNumber) -> Result<ZoneSnapshot>;

    /// Power a zone on
    async fn power_on(&self, zone: ZoneNumber) -> Result<()>;

    /// Power a zone off
    async fn power_off(&self, zone: ZoneNumber) -> Result<()>;

    /// Ramp a zone's volume to `target`, calling `on_step` after every step
    ///
    /// Resolves once the ramp (including any redirects requested by
    /// `on_step`) has settled.
    async fn set_volume(
        &self,
        zone: ZoneNumber,
        target: VolumeLevel,
        on_step: &mut StepCallback<'_>,
    ) -> Result<()>;

    /// Flip a zone's mute state
    async fn toggle_mute(&self, zone: ZoneNumber) -> Result<()>;

    /// Select a zone's input by 1-based index
    async fn set_source(&self, zone: ZoneNumber, source: SourceIndex) -> Result<()>;

    /// Read the controller's model and friendly name
    async fn model_info(&self) -> Result<ModelInfo>;
}

/// Connection parameters handed to a [`Connector`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewaySettings {
    pub host: String,
    pub port: u16,

    /// Pause between consecutive commands
    pub command_delay: Duration,

    /// How many times a failed command is attempted again
    pub retry_attempts: u16,

    pub socket_timeout: Duration,
}

/// Factory for gateway handles
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a gateway for the controller described by `settings`
    async fn connect(&self, settings: &GatewaySettings) -> Result<Arc<dyn Gateway>>;
}
