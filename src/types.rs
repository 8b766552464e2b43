use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::BitOr;

/// Zone number (1-based)
pub type ZoneNumber = u8;

/// Source index (1-based, into the configured source names)
pub type SourceIndex = u8;

/// Device-native volume, 0..=`MAX_VOLUME`
pub type VolumeLevel = u8;

/// Highest zone number an HTD controller exposes
pub const MAX_ZONES: ZoneNumber = 6;

/// Number of source slots an HTD controller exposes
pub const MAX_SOURCES: usize = 6;

/// Top of the device volume scale
pub const MAX_VOLUME: VolumeLevel = 100;

/// Port the HTD gateway listens on
pub const DEFAULT_PORT: u16 = 10006;

/// Power state of a zone
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PowerState {
    #[default]
    Unknown,
    On,
    Off,
}

impl From<Option<bool>> for PowerState {
    fn from(power: Option<bool>) -> Self {
        match power {
            None => PowerState::Unknown,
            Some(true) => PowerState::On,
            Some(false) => PowerState::Off,
        }
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PowerState::Unknown => "unknown",
            PowerState::On => "on",
            PowerState::Off => "off",
        };
        f.write_str(s)
    }
}

/// Last observed state of one zone
///
/// A snapshot is replaced wholesale on every query; it is never patched field
/// by field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ZoneSnapshot {
    pub zone: ZoneNumber,

    #[serde(default)]
    pub power: PowerState,

    /// Device-native volume, 0..=`MAX_VOLUME`
    pub volume: VolumeLevel,

    pub mute: bool,

    /// 1-based source index
    pub source: SourceIndex,
}

impl ZoneSnapshot {
    /// Volume as a fraction of the device scale
    pub fn volume_fraction(&self) -> f64 {
        f64::from(self.volume) / f64::from(MAX_VOLUME)
    }
}

/// Model information reported by the controller
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelInfo {
    pub model_name: String,
    pub friendly_name: String,
}

/// Media-player capabilities advertised to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SupportedFeatures(u32);

impl SupportedFeatures {
    pub const VOLUME_SET: Self = Self(4);
    pub const VOLUME_MUTE: Self = Self(8);
    pub const TURN_ON: Self = Self(128);
    pub const TURN_OFF: Self = Self(256);
    pub const VOLUME_STEP: Self = Self(1024);
    pub const SELECT_SOURCE: Self = Self(2048);

    /// Capabilities every HTD zone supports
    pub const HTD: Self = Self(
        Self::SELECT_SOURCE.0
            | Self::TURN_ON.0
            | Self::TURN_OFF.0
            | Self::VOLUME_MUTE.0
            | Self::VOLUME_SET.0
            | Self::VOLUME_STEP.0,
    );

    /// Raw bit value
    pub fn bits(self) -> u32 {
        self.0
    }

    /// Check whether all flags in `other` are set
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for SupportedFeatures {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Convert a 0.0..=1.0 fraction to the device volume scale
///
/// Values outside the range are clamped. Returns `None` for NaN and infinities.
pub fn fraction_to_volume(fraction: f64) -> Option<VolumeLevel> {
    if !fraction.is_finite() {
        return None;
    }
    let scaled = (fraction.clamp(0.0, 1.0) * f64::from(MAX_VOLUME)).round();
    Some(scaled as VolumeLevel)
}
