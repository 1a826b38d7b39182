//! Identifiers that thread a single configuration object through the
//! dependency resolver, state generator, and runner.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The three kinds of addressable object a [`crate::fleet::map::ContainerMap`] can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConfigType {
    /// A container configuration (possibly multi-instance).
    Container,
    /// An attached, data-only volume container.
    Volume,
    /// A user-defined network.
    Network,
}

impl fmt::Display for ConfigType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Container => write!(f, "container"),
            Self::Volume => write!(f, "volume"),
            Self::Network => write!(f, "network"),
        }
    }
}

/// Uniquely keys every addressable object across every map in a pass.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MapConfigId {
    /// Which kind of object this identifies.
    pub config_type: ConfigType,
    /// The map this object belongs to.
    pub map_name: String,
    /// The declared container/volume/network name within the map.
    pub config_name: String,
    /// The instance suffix, present for multi-instance containers and attached volumes.
    pub instance_name: Option<String>,
}

impl MapConfigId {
    /// Build a container identifier.
    pub fn container(
        map_name: impl Into<String>,
        config_name: impl Into<String>,
        instance_name: Option<String>,
    ) -> Self {
        Self {
            config_type: ConfigType::Container,
            map_name: map_name.into(),
            config_name: config_name.into(),
            instance_name,
        }
    }

    /// Build an attached-volume identifier.
    pub fn volume(
        map_name: impl Into<String>,
        config_name: impl Into<String>,
        alias: impl Into<String>,
    ) -> Self {
        Self {
            config_type: ConfigType::Volume,
            map_name: map_name.into(),
            config_name: config_name.into(),
            instance_name: Some(alias.into()),
        }
    }

    /// Build a network identifier.
    pub fn network(map_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            config_type: ConfigType::Network,
            map_name: map_name.into(),
            config_name: name.into(),
            instance_name: None,
        }
    }

    /// True if this id names an instance of a multi-instance container.
    #[must_use]
    pub fn has_instance(&self) -> bool {
        self.instance_name.is_some()
    }

    /// The bare container id, dropping any instance suffix.
    #[must_use]
    pub fn without_instance(&self) -> Self {
        Self {
            instance_name: None,
            ..self.clone()
        }
    }
}

impl fmt::Display for MapConfigId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.instance_name {
            Some(instance) => write!(
                f,
                "{}:{}.{}.{}",
                self.config_type, self.map_name, self.config_name, instance
            ),
            None => write!(f, "{}:{}.{}", self.config_type, self.map_name, self.config_name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_instance() {
        let id = MapConfigId::container("main", "redis", Some("cache".to_string()));
        assert_eq!(id.to_string(), "container:main.redis.cache");
    }

    #[test]
    fn without_instance_strips_suffix() {
        let id = MapConfigId::container("main", "redis", Some("cache".to_string()));
        let bare = id.without_instance();
        assert_eq!(bare.instance_name, None);
        assert_eq!(bare.config_name, "redis");
    }
}
