//! Persisted configuration of one controller entry.
//!
//! Entries are stored as JSON. Connection data (`host`, `port`, `unique_id`)
//! lives in [`EntryData`]; everything the options flow can edit lives in
//! [`EntryOptions`], with source names flattened to `source_1`, `source_2`, ...

use crate::error::{HtdError, Result};
use crate::gateway::GatewaySettings;
use crate::types::{ZoneNumber, DEFAULT_PORT, MAX_SOURCES, MAX_ZONES};
use serde::de::Deserializer;
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;

pub const CONF_HOST: &str = "host";
pub const CONF_PORT: &str = "port";
pub const CONF_UNIQUE_ID: &str = "unique_id";
pub const CONF_DEVICE_NAME: &str = "device_name";
pub const CONF_ACTIVE_ZONES: &str = "active_zones";
pub const CONF_UPDATE_VOLUME_ON_CHANGE: &str = "update_volume_on_change";
pub const CONF_COMMAND_DELAY: &str = "command_delay";
pub const CONF_RETRY_ATTEMPTS: &str = "retry_attempts";
pub const CONF_SOCKET_TIMEOUT: &str = "socket_timeout";
pub const CONF_SOURCE: &str = "source";

/// Milliseconds between commands sent to the controller
pub const DEFAULT_COMMAND_DELAY: u16 = 100;
pub const DEFAULT_RETRY_ATTEMPTS: u16 = 5;
/// Milliseconds to wait for a controller reply
pub const DEFAULT_SOCKET_TIMEOUT: u16 = 1000;

/// Option key of the source slot `index` (1-based)
pub fn source_key(index: usize) -> String {
    format!("{}_{}", CONF_SOURCE, index)
}

/// Name a source slot gets before the user renames it
pub fn default_source_name(index: usize) -> String {
    format!("Source {}", index)
}

/// Connection data of an entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EntryData {
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_id: Option<String>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

/// Ordered source names, serialized as `source_N` keys
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceNames(Vec<String>);

impl SourceNames {
    /// One name per source slot
    ///
    /// Missing slots get their default name and names past the last slot are
    /// dropped, so the persisted form always has `MAX_SOURCES` keys.
    pub fn new(mut names: Vec<String>) -> Self {
        names.truncate(MAX_SOURCES);
        let first_missing = names.len() + 1;
        names.extend((first_missing..=MAX_SOURCES).map(default_source_name));
        Self(names)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}

impl Default for SourceNames {
    fn default() -> Self {
        Self((1..=MAX_SOURCES).map(default_source_name).collect())
    }
}

impl Serialize for SourceNames {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (i, name) in self.0.iter().enumerate() {
            map.serialize_entry(&source_key(i + 1), name)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for SourceNames {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = BTreeMap::<String, Value>::deserialize(deserializer)?;

        // Missing slots keep their default name
        let names = (1..=MAX_SOURCES)
            .map(|i| {
                raw.get(&source_key(i))
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| default_source_name(i))
            })
            .collect();

        Ok(Self(names))
    }
}

/// User-editable options of an entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EntryOptions {
    pub device_name: String,

    pub active_zones: ZoneNumber,

    #[serde(default)]
    pub update_volume_on_change: bool,

    /// Milliseconds between commands
    #[serde(default = "default_command_delay")]
    pub command_delay: u16,

    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u16,

    /// Milliseconds to wait for a reply
    #[serde(default = "default_socket_timeout")]
    pub socket_timeout: u16,

    #[serde(flatten)]
    pub sources: SourceNames,
}

fn default_command_delay() -> u16 {
    DEFAULT_COMMAND_DELAY
}

fn default_retry_attempts() -> u16 {
    DEFAULT_RETRY_ATTEMPTS
}

fn default_socket_timeout() -> u16 {
    DEFAULT_SOCKET_TIMEOUT
}

impl EntryOptions {
    /// Options for a freshly added controller
    pub fn new(device_name: impl Into<String>) -> Self {
        Self {
            device_name: device_name.into(),
            active_zones: MAX_ZONES,
            update_volume_on_change: false,
            command_delay: DEFAULT_COMMAND_DELAY,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            socket_timeout: DEFAULT_SOCKET_TIMEOUT,
            sources: SourceNames::default(),
        }
    }

    /// Check value ranges the host form cannot enforce by type alone
    pub fn validate(&self) -> Result<()> {
        match self.problems().into_iter().next() {
            Some(problem) => Err(HtdError::InvalidConfig(problem.reason)),
            None => Ok(()),
        }
    }

    /// Error codes keyed by option, the shape a form reports them in
    pub fn field_errors(&self) -> BTreeMap<String, String> {
        self.problems()
            .into_iter()
            .map(|p| (p.key.to_string(), p.code.to_string()))
            .collect()
    }

    fn problems(&self) -> Vec<Problem> {
        let mut problems = Vec::new();

        if self.device_name.trim().is_empty() {
            problems.push(Problem {
                key: CONF_DEVICE_NAME,
                code: "empty_name",
                reason: "device name is empty".to_string(),
            });
        }
        if self.active_zones == 0 || self.active_zones > MAX_ZONES {
            problems.push(Problem {
                key: CONF_ACTIVE_ZONES,
                code: "not_in_list",
                reason: format!(
                    "active zones must be within 1..={}, got {}",
                    MAX_ZONES, self.active_zones
                ),
            });
        }
        for (key, value) in [
            (CONF_COMMAND_DELAY, self.command_delay),
            (CONF_RETRY_ATTEMPTS, self.retry_attempts),
            (CONF_SOCKET_TIMEOUT, self.socket_timeout),
        ] {
            if value == 0 {
                problems.push(Problem {
                    key,
                    code: "not_positive",
                    reason: format!("{} must be positive", key),
                });
            }
        }

        problems
    }

    /// Flat JSON form, the shape the flows exchange with the host
    pub fn to_map(&self) -> Result<Map<String, Value>> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            other => Err(HtdError::InvalidConfig(format!("options serialized to {}", other))),
        }
    }

    /// Overlay `input` on these options without validating the result
    pub fn overlaid(&self, input: &Map<String, Value>) -> Result<Self> {
        let mut map = self.to_map()?;
        map.extend(input.iter().map(|(k, v)| (k.clone(), v.clone())));

        Ok(serde_json::from_value(Value::Object(map))?)
    }

    /// Overlay `input` on these options and validate the result
    pub fn merged(&self, input: &Map<String, Value>) -> Result<Self> {
        let options = self.overlaid(input)?;
        options.validate()?;
        Ok(options)
    }

    pub fn source_names(&self) -> &[String] {
        self.sources.as_slice()
    }
}

struct Problem {
    key: &'static str,
    code: &'static str,
    reason: String,
}

/// One configured controller
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigEntry {
    pub entry_id: String,

    /// Title shown by the host, the device name at creation time
    pub title: String,

    pub data: EntryData,

    pub options: EntryOptions,
}

impl ConfigEntry {
    /// Load an entry from its persisted JSON
    pub fn from_json(json: &str) -> Result<Self> {
        let entry: ConfigEntry = serde_json::from_str(json)?;
        entry.options.validate()?;
        Ok(entry)
    }

    /// Persisted JSON form
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Unique id used to build zone entity ids
    ///
    /// Entries created before ids were assigned fall back to the entry id.
    pub fn device_unique_id(&self) -> &str {
        self.data.unique_id.as_deref().unwrap_or(&self.entry_id)
    }

    /// Settings handed to the gateway connector
    pub fn gateway_settings(&self) -> GatewaySettings {
        GatewaySettings {
            host: self.data.host.clone(),
            port: self.data.port,
            command_delay: Duration::from_millis(u64::from(self.options.command_delay)),
            retry_attempts: self.options.retry_attempts,
            socket_timeout: Duration::from_millis(u64::from(self.options.socket_timeout)),
        }
    }
}

impl GatewaySettings {
    /// Settings for probing a controller before any entry exists
    pub fn with_defaults(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            command_delay: Duration::from_millis(u64::from(DEFAULT_COMMAND_DELAY)),
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            socket_timeout: Duration::from_millis(u64::from(DEFAULT_SOCKET_TIMEOUT)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sources_flatten_into_numbered_keys() {
        let mut options = EntryOptions::new("Living Room");
        options.sources = SourceNames::new(vec!["Cable".into(), "AppleTV".into()]);

        let map = options.to_map().unwrap();
        assert_eq!(map.get("source_1"), Some(&json!("Cable")));
        assert_eq!(map.get("source_2"), Some(&json!("AppleTV")));
        assert_eq!(map.get("source_3"), Some(&json!("Source 3")));
        assert_eq!(map.get("device_name"), Some(&json!("Living Room")));
        assert!(!map.contains_key("sources"));
    }

    #[test]
    fn source_names_always_fill_every_slot() {
        let short = SourceNames::new(vec!["Cable".into()]);
        assert_eq!(short.as_slice().len(), MAX_SOURCES);
        assert_eq!(short.as_slice()[5], "Source 6");

        let long = SourceNames::new((0..9).map(|i| format!("In {}", i)).collect());
        assert_eq!(long.as_slice().len(), MAX_SOURCES);
        assert_eq!(long.as_slice()[5], "In 5");

        let mut options = EntryOptions::new("Den");
        options.sources = short.clone();
        let loaded: EntryOptions =
            serde_json::from_value(Value::Object(options.to_map().unwrap())).unwrap();
        assert_eq!(loaded.sources, short);
    }

    #[test]
    fn field_errors_name_each_bad_option() {
        let mut options = EntryOptions::new("  ");
        options.retry_attempts = 0;

        let errors = options.field_errors();
        assert_eq!(errors.get(CONF_DEVICE_NAME).map(String::as_str), Some("empty_name"));
        assert_eq!(errors.get(CONF_RETRY_ATTEMPTS).map(String::as_str), Some("not_positive"));
        assert_eq!(errors.len(), 2);
        assert!(matches!(options.validate(), Err(HtdError::InvalidConfig(_))));
        assert!(EntryOptions::new("Den").field_errors().is_empty());
    }

    #[test]
    fn missing_fields_take_defaults() {
        let options: EntryOptions = serde_json::from_value(json!({
            "device_name": "Basement",
            "active_zones": 4,
            "source_3": "Aux",
        }))
        .unwrap();

        assert_eq!(options.command_delay, DEFAULT_COMMAND_DELAY);
        assert_eq!(options.retry_attempts, DEFAULT_RETRY_ATTEMPTS);
        assert_eq!(options.socket_timeout, DEFAULT_SOCKET_TIMEOUT);
        assert!(!options.update_volume_on_change);
        assert_eq!(options.source_names().len(), MAX_SOURCES);
        assert_eq!(options.source_names()[0], "Source 1");
        assert_eq!(options.source_names()[2], "Aux");
    }

    #[test]
    fn merge_overlays_input_and_validates() {
        let options = EntryOptions::new("Basement");
        let input = json!({ "active_zones": 3, "source_2": "Radio" });
        let merged = options.merged(input.as_object().unwrap()).unwrap();
        assert_eq!(merged.active_zones, 3);
        assert_eq!(merged.source_names()[1], "Radio");
        assert_eq!(merged.device_name, "Basement");

        let bad = json!({ "active_zones": 9 });
        assert!(matches!(
            options.merged(bad.as_object().unwrap()),
            Err(HtdError::InvalidConfig(_))
        ));
    }

    #[test]
    fn entry_round_trips_through_json() {
        let entry = ConfigEntry {
            entry_id: "01J9".to_string(),
            title: "Basement".to_string(),
            data: EntryData {
                host: "192.168.1.40".to_string(),
                port: DEFAULT_PORT,
                unique_id: Some("htd-aa:bb-MCA66".to_string()),
            },
            options: EntryOptions::new("Basement"),
        };

        let loaded = ConfigEntry::from_json(&entry.to_json().unwrap()).unwrap();
        assert_eq!(loaded, entry);
        assert_eq!(loaded.device_unique_id(), "htd-aa:bb-MCA66");

        let settings = loaded.gateway_settings();
        assert_eq!(settings.socket_timeout, Duration::from_millis(1000));
        assert_eq!(settings.command_delay, Duration::from_millis(100));
    }
}
