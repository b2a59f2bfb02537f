//! Home Assistant style MQTT discovery messages
//!
//! Discovery configs are published retained to
//! `<prefix>/<component>/<object_id>/config`, once after the first successful
//! connect and before any other event reaches the application.

use crate::transport::{QoS, StoredMessage};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Where discovery messages go; present only when discovery is enabled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoverySettings {
    /// Topic prefix, `homeassistant` by default
    pub prefix: String,
    /// Object id used when an entity does not name its own
    pub object_id: String,
}

/// One discoverable entity supplied by the application
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryEntity {
    /// Home Assistant component, e.g. `sensor` or `binary_sensor`
    pub component: String,
    pub object_id: Option<String>,
    /// Entity config payload; the device block is merged in when absent
    pub config: Value,
}

impl DiscoveryEntity {
    pub fn new(component: impl Into<String>, config: Value) -> Self {
        Self {
            component: component.into(),
            object_id: None,
            config,
        }
    }

    pub fn with_object_id(mut self, object_id: impl Into<String>) -> Self {
        self.object_id = Some(object_id.into());
        self
    }
}

impl DiscoverySettings {
    pub fn new(prefix: impl Into<String>, object_id: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            object_id: object_id.into(),
        }
    }

    /// Build discovery topic: `<prefix>/<component>/<object_id>/config`
    pub fn topic(&self, component: &str, object_id: &str) -> String {
        [self.prefix.as_str(), component, object_id, "config"]
            .iter()
            .map(|segment| segment.trim_matches('/'))
            .filter(|segment| !segment.is_empty())
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Turn application entities into retained QoS 1 messages
    pub fn build_messages(
        &self,
        device: &Value,
        entities: Vec<DiscoveryEntity>,
    ) -> Result<Vec<StoredMessage>, serde_json::Error> {
        entities
            .into_iter()
            .map(|entity| {
                let object_id = entity.object_id.as_deref().unwrap_or(&self.object_id);
                let topic = self.topic(&entity.component, object_id);
                let payload = serde_json::to_vec(&merge_device(entity.config, device))?;
                Ok(StoredMessage {
                    topic,
                    payload,
                    qos: QoS::AtLeastOnce,
                    retain: true,
                })
            })
            .collect()
    }
}

fn merge_device(mut config: Value, device: &Value) -> Value {
    if device.is_null() {
        return config;
    }
    if let Value::Object(map) = &mut config {
        map.entry("device").or_insert_with(|| device.clone());
    }
    config
}
