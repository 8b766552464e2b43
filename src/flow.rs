//! Setup wizard and options editor for controller entries.
//!
//! Each step returns a [`FlowResult`] telling the host what to show next. Form
//! input arrives as a flat JSON object and is checked against the step's
//! [`Schema`] before it is used.

use crate::config::{
    default_source_name, source_key, ConfigEntry, EntryData, EntryOptions, CONF_ACTIVE_ZONES,
    CONF_COMMAND_DELAY, CONF_DEVICE_NAME, CONF_HOST, CONF_PORT, CONF_RETRY_ATTEMPTS,
    CONF_SOCKET_TIMEOUT, CONF_UNIQUE_ID, CONF_UPDATE_VOLUME_ON_CHANGE,
};
use crate::error::Result;
use crate::gateway::{Connector, GatewaySettings};
use crate::types::{ModelInfo, DEFAULT_PORT, MAX_SOURCES, MAX_ZONES};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Error code shown when the controller cannot be reached
pub const ERROR_NO_CONNECTION: &str = "no_connection";

/// Abort reason for a controller that already has an entry
pub const ABORT_ALREADY_CONFIGURED: &str = "already_configured";

/// Key for errors that are not tied to one field
pub const BASE_ERROR_KEY: &str = "base";

/// Form and menu identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepId {
    User,
    Options,
    Init,
    Sources,
    Advanced,
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StepId::User => "user",
            StepId::Options => "options",
            StepId::Init => "init",
            StepId::Sources => "sources",
            StepId::Advanced => "advanced",
        };
        f.write_str(s)
    }
}

/// Value type of a form field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Text,
    /// Integer in 1..=65535
    Port,
    Boolean,
    /// Integer from a fixed set
    OneOf(Vec<i64>),
}

/// One required form field
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub key: String,
    pub kind: FieldKind,
    pub default: Option<Value>,
}

impl Field {
    fn new(key: impl Into<String>, kind: FieldKind, default: impl Into<Option<Value>>) -> Self {
        Self {
            key: key.into(),
            kind,
            default: default.into(),
        }
    }

    /// Coerce `value` to this field's type, returning an error code on failure
    fn coerce(&self, value: &Value) -> std::result::Result<Value, &'static str> {
        match &self.kind {
            FieldKind::Text => match value {
                Value::String(s) => Ok(Value::String(s.clone())),
                Value::Number(n) => Ok(Value::String(n.to_string())),
                _ => Err("expected_string"),
            },
            FieldKind::Port => {
                let n = as_integer(value).ok_or("expected_int")?;
                if (1..=65535).contains(&n) {
                    Ok(json!(n))
                } else {
                    Err("invalid_port")
                }
            }
            FieldKind::Boolean => match value {
                Value::Bool(b) => Ok(Value::Bool(*b)),
                Value::String(s) => match s.to_ascii_lowercase().as_str() {
                    "1" | "true" | "yes" | "on" | "enable" => Ok(Value::Bool(true)),
                    "0" | "false" | "no" | "off" | "disable" => Ok(Value::Bool(false)),
                    _ => Err("invalid_boolean"),
                },
                Value::Number(n) => Ok(Value::Bool(n.as_i64() != Some(0))),
                _ => Err("invalid_boolean"),
            },
            FieldKind::OneOf(allowed) => {
                let n = as_integer(value).ok_or("expected_int")?;
                if allowed.contains(&n) {
                    Ok(json!(n))
                } else {
                    Err("not_in_list")
                }
            }
        }
    }
}

fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Fields of one form
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Schema {
    pub fields: Vec<Field>,
}

impl Schema {
    fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    pub fn field(&self, key: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.key == key)
    }

    /// Check `input` against the schema
    ///
    /// Missing fields fall back to their default; fields without one are
    /// reported as `required`. Keys the schema does not know are dropped.
    pub fn validate(
        &self,
        input: &Map<String, Value>,
    ) -> std::result::Result<Map<String, Value>, BTreeMap<String, String>> {
        let mut values = Map::new();
        let mut errors = BTreeMap::new();

        for field in &self.fields {
            let value = match input.get(&field.key).or(field.default.as_ref()) {
                Some(value) => value,
                None => {
                    errors.insert(field.key.clone(), "required".to_string());
                    continue;
                }
            };
            match field.coerce(value) {
                Ok(value) => {
                    values.insert(field.key.clone(), value);
                }
                Err(code) => {
                    errors.insert(field.key.clone(), code.to_string());
                }
            }
        }

        if errors.is_empty() {
            Ok(values)
        } else {
            Err(errors)
        }
    }
}

/// What the host should do after a step
#[derive(Debug, Clone, PartialEq)]
pub enum FlowResult {
    ShowForm {
        step_id: StepId,
        schema: Schema,
        errors: BTreeMap<String, String>,
    },
    ShowMenu {
        step_id: StepId,
        options: Vec<StepId>,
    },
    CreateEntry {
        title: String,
        /// Connection data; `None` when only options changed
        data: Option<EntryData>,
        options: EntryOptions,
    },
    Abort {
        reason: String,
    },
}

impl FlowResult {
    fn form(step_id: StepId, schema: Schema) -> Self {
        FlowResult::ShowForm {
            step_id,
            schema,
            errors: BTreeMap::new(),
        }
    }

    fn form_with_errors(step_id: StepId, schema: Schema, errors: BTreeMap<String, String>) -> Self {
        FlowResult::ShowForm {
            step_id,
            schema,
            errors,
        }
    }
}

/// Form for host and port
pub fn connection_schema(entry: Option<&ConfigEntry>) -> Schema {
    let (host, port) = match entry {
        Some(entry) => (Some(json!(entry.data.host)), entry.data.port),
        None => (None, DEFAULT_PORT),
    };

    Schema::new(vec![
        Field::new(CONF_HOST, FieldKind::Text, host),
        Field::new(CONF_PORT, FieldKind::Port, json!(port)),
    ])
}

/// Form for name, zone count and live volume updates
pub fn options_schema(friendly_name: &str, active_zones: u8, update_volume: bool) -> Schema {
    Schema::new(vec![
        Field::new(CONF_DEVICE_NAME, FieldKind::Text, json!(friendly_name)),
        Field::new(
            CONF_ACTIVE_ZONES,
            FieldKind::OneOf((1..=i64::from(MAX_ZONES)).collect()),
            json!(active_zones),
        ),
        Field::new(CONF_UPDATE_VOLUME_ON_CHANGE, FieldKind::Boolean, json!(update_volume)),
    ])
}

/// Form with one text field per source slot
pub fn sources_schema(entry: Option<&ConfigEntry>) -> Schema {
    let fields = (1..=MAX_SOURCES)
        .map(|i| {
            let default = entry
                .and_then(|e| e.options.source_names().get(i - 1).cloned())
                .unwrap_or_else(|| default_source_name(i));
            Field::new(source_key(i), FieldKind::Text, json!(default))
        })
        .collect();

    Schema::new(fields)
}

/// Form for command pacing and socket behaviour
pub fn advanced_schema(entry: Option<&ConfigEntry>) -> Schema {
    let options = entry
        .map(|e| e.options.clone())
        .unwrap_or_else(|| EntryOptions::new(""));

    Schema::new(vec![
        Field::new(CONF_RETRY_ATTEMPTS, FieldKind::Port, json!(options.retry_attempts)),
        Field::new(CONF_SOCKET_TIMEOUT, FieldKind::Port, json!(options.socket_timeout)),
        Field::new(CONF_COMMAND_DELAY, FieldKind::Port, json!(options.command_delay)),
    ])
}

/// Wizard adding a new controller
pub struct ConfigFlow {
    connector: Arc<dyn Connector>,
    host: Option<String>,
    port: u16,
    unique_id: Option<String>,
    title_placeholder: Option<String>,
    /// Name the controller reported when its connection was checked
    friendly_name: Option<String>,
}

impl ConfigFlow {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            host: None,
            port: DEFAULT_PORT,
            unique_id: None,
            title_placeholder: None,
            friendly_name: None,
        }
    }

    /// Title the host shows for a discovered controller
    pub fn title_placeholder(&self) -> Option<&str> {
        self.title_placeholder.as_deref()
    }

    pub fn unique_id(&self) -> Option<&str> {
        self.unique_id.as_deref()
    }

    /// Entry point for a user-started setup
    pub async fn step_user(&mut self, input: Option<Map<String, Value>>) -> Result<FlowResult> {
        self.step_custom_connection(input).await
    }

    /// Entry point for a controller seen by DHCP discovery
    ///
    /// `configured` holds the unique ids of existing entries.
    pub async fn step_dhcp(
        &mut self,
        ip: &str,
        mac_address: &str,
        configured: &[String],
    ) -> Result<FlowResult> {
        let info = match self.probe(ip, DEFAULT_PORT).await {
            Some(info) => info,
            None => {
                return Ok(FlowResult::Abort {
                    reason: ERROR_NO_CONNECTION.to_string(),
                })
            }
        };

        let unique_id = format!("htd-{}-{}", mac_address, info.model_name);
        if configured.contains(&unique_id) {
            tracing::debug!("Controller {} already configured", unique_id);
            return Ok(FlowResult::Abort {
                reason: ABORT_ALREADY_CONFIGURED.to_string(),
            });
        }

        self.title_placeholder = Some(format!("{} ({})", info.friendly_name, ip));

        let mut input = Map::new();
        input.insert(CONF_HOST.to_string(), json!(ip));
        input.insert(CONF_PORT.to_string(), json!(DEFAULT_PORT));
        input.insert(CONF_UNIQUE_ID.to_string(), json!(unique_id));

        self.step_custom_connection(Some(input)).await
    }

    /// Check that a controller answers at the given host and port
    pub async fn step_custom_connection(
        &mut self,
        input: Option<Map<String, Value>>,
    ) -> Result<FlowResult> {
        let schema = connection_schema(None);
        let input = match input {
            Some(input) => input,
            None => return Ok(FlowResult::form(StepId::User, schema)),
        };

        let values = match schema.validate(&input) {
            Ok(values) => values,
            Err(errors) => return Ok(FlowResult::form_with_errors(StepId::User, schema, errors)),
        };

        let host = values
            .get(CONF_HOST)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let port = values
            .get(CONF_PORT)
            .and_then(Value::as_u64)
            .and_then(|p| u16::try_from(p).ok())
            .unwrap_or(DEFAULT_PORT);

        let info = match self.probe(&host, port).await {
            Some(info) => info,
            None => {
                let mut errors = BTreeMap::new();
                errors.insert(BASE_ERROR_KEY.to_string(), ERROR_NO_CONNECTION.to_string());
                return Ok(FlowResult::form_with_errors(StepId::User, schema, errors));
            }
        };

        self.friendly_name = Some(info.friendly_name);
        self.host = Some(host);
        self.port = port;
        if let Some(unique_id) = input.get(CONF_UNIQUE_ID).and_then(Value::as_str) {
            self.unique_id = Some(unique_id.to_string());
        }

        self.step_options(None).await
    }

    /// Name the controller and choose its zones, then create the entry
    pub async fn step_options(&mut self, input: Option<Map<String, Value>>) -> Result<FlowResult> {
        let host = match &self.host {
            Some(host) => host.clone(),
            None => return Ok(FlowResult::form(StepId::User, connection_schema(None))),
        };

        let friendly_name = self.friendly_name.clone().unwrap_or_else(|| host.clone());
        let schema = options_schema(&friendly_name, MAX_ZONES, false);

        let input = match input {
            Some(input) => input,
            None => return Ok(FlowResult::form(StepId::Options, schema)),
        };

        let values = match schema.validate(&input) {
            Ok(values) => values,
            Err(errors) => {
                return Ok(FlowResult::form_with_errors(StepId::Options, schema, errors))
            }
        };

        let options = EntryOptions::new(friendly_name).overlaid(&values)?;
        let errors = options.field_errors();
        if !errors.is_empty() {
            return Ok(FlowResult::form_with_errors(StepId::Options, schema, errors));
        }
        tracing::info!("Creating entry {} for {}:{}", options.device_name, host, self.port);

        Ok(FlowResult::CreateEntry {
            title: options.device_name.clone(),
            data: Some(EntryData {
                host,
                port: self.port,
                unique_id: self.unique_id.clone(),
            }),
            options,
        })
    }

    async fn probe(&self, host: &str, port: u16) -> Option<ModelInfo> {
        let settings = GatewaySettings::with_defaults(host, port);

        let result = match self.connector.connect(&settings).await {
            Ok(gateway) => gateway.model_info().await,
            Err(e) => Err(e),
        };

        match result {
            Ok(info) => Some(info),
            Err(e) => {
                tracing::error!("Failed to connect to HTD gateway at {}:{}: {}", host, port, e);
                None
            }
        }
    }
}

/// Editor for an existing entry's options
pub struct OptionsFlow {
    entry: ConfigEntry,
}

impl OptionsFlow {
    pub fn new(entry: ConfigEntry) -> Self {
        Self { entry }
    }

    pub fn step_init(&self) -> FlowResult {
        FlowResult::ShowMenu {
            step_id: StepId::Init,
            options: vec![StepId::Options, StepId::Sources, StepId::Advanced],
        }
    }

    pub fn step_options(&self, input: Option<Map<String, Value>>) -> Result<FlowResult> {
        let schema = options_schema(
            &self.entry.title,
            self.entry.options.active_zones,
            self.entry.options.update_volume_on_change,
        );
        self.step(StepId::Options, schema, input)
    }

    pub fn step_sources(&self, input: Option<Map<String, Value>>) -> Result<FlowResult> {
        self.step(StepId::Sources, sources_schema(Some(&self.entry)), input)
    }

    pub fn step_advanced(&self, input: Option<Map<String, Value>>) -> Result<FlowResult> {
        self.step(StepId::Advanced, advanced_schema(Some(&self.entry)), input)
    }

    fn step(
        &self,
        step_id: StepId,
        schema: Schema,
        input: Option<Map<String, Value>>,
    ) -> Result<FlowResult> {
        let input = match input {
            Some(input) => input,
            None => return Ok(FlowResult::form(step_id, schema)),
        };

        let values = match schema.validate(&input) {
            Ok(values) => values,
            Err(errors) => return Ok(FlowResult::form_with_errors(step_id, schema, errors)),
        };

        let options = self.entry.options.overlaid(&values)?;
        let errors = options.field_errors();
        if !errors.is_empty() {
            return Ok(FlowResult::form_with_errors(step_id, schema, errors));
        }
        tracing::debug!("Updated {} options of entry {}", step_id, self.entry.entry_id);

        Ok(FlowResult::CreateEntry {
            title: options.device_name.clone(),
            data: None,
            options,
        })
    }
}
