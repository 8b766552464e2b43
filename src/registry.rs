use crate::config::ConfigEntry;
use crate::types::ZoneNumber;
use crate::zone::ENTITY_ID_PREFIX;
use serde::{Deserialize, Serialize};

/// Host entity registered for an entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegisteredEntity {
    pub entity_id: String,
    pub unique_id: String,
    pub config_entry_id: String,
}

impl RegisteredEntity {
    /// Zone number encoded in the unique id (`{device_id}_{zone}`)
    pub fn zone(&self) -> Option<ZoneNumber> {
        self.unique_id
            .rsplit_once('_')
            .and_then(|(_, zone)| zone.parse().ok())
    }
}

/// Entities the host knows about, across all entries
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityRegistry {
    entities: Vec<RegisteredEntity>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, entity: RegisteredEntity) {
        if !self.is_registered(&entity.entity_id) {
            self.entities.push(entity);
        }
    }

    pub fn is_registered(&self, entity_id: &str) -> bool {
        self.entities.iter().any(|e| e.entity_id == entity_id)
    }

    pub fn entries_for_config_entry<'a>(
        &'a self,
        entry_id: &'a str,
    ) -> impl Iterator<Item = &'a RegisteredEntity> + 'a {
        self.entities.iter().filter(move |e| e.config_entry_id == entry_id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Remove zone entities of `entry` that are above its active zone count
    ///
    /// Returns the removed entity ids.
    pub fn cleanup(&mut self, entry: &ConfigEntry) -> Vec<String> {
        let active_zones = entry.options.active_zones;
        let mut removed = Vec::new();

        self.entities.retain(|e| {
            let extra = e.config_entry_id == entry.entry_id
                && e.entity_id.starts_with(ENTITY_ID_PREFIX)
                && e.zone().is_some_and(|zone| zone > active_zones);
            if extra {
                removed.push(e.entity_id.clone());
            }
            !extra
        });

        tracing::info!(
            "Cleaning up HTD entities: removed {} extra entities for config entry {}",
            removed.len(),
            entry.entry_id
        );

        removed
    }
}
