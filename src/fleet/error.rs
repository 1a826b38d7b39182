//! Error taxonomy for the fleet orchestration pipeline.
//!
//! Mirrors the layering the kept `template` module used over the low-level
//! CLI error: a fallible daemon call wraps [`crate::errors::DockerError`],
//! everything else is a distinct orchestration-level failure carrying the
//! offending [`MapConfigId`].

use crate::errors::DockerError;
use crate::fleet::id::MapConfigId;
use thiserror::Error;

/// Result alias for fleet operations, paralleling [`crate::errors::DockerResult`].
pub type MapResult<T> = Result<T, MapError>;

/// Errors raised by the dependency model, state generator, and runner.
#[derive(Debug, Error)]
pub enum MapError {
    /// The map failed one of the `check_integrity` invariants (§3).
    #[error("integrity check failed: {message}")]
    Integrity {
        /// Human-readable description of the violated invariant.
        message: String,
    },

    /// The resolver found a cycle between distinct containers.
    #[error("circular dependency: {}", format_cycle(.path))]
    CircularDependency {
        /// The cycle, in traversal order, starting and ending at the repeated node.
        path: Vec<String>,
    },

    /// A reference named a container/volume/network that isn't declared in the map.
    #[error("undeclared reference '{reference}' in map '{map_name}'")]
    MapKey {
        /// The map that contained the dangling reference.
        map_name: String,
        /// The reference text that failed to resolve.
        reference: String,
    },

    /// A daemon API call failed.
    #[error("daemon call failed for {config_id}: {source}")]
    Daemon {
        /// The object the failing call was acting on.
        config_id: MapConfigId,
        /// The underlying CLI/process error.
        #[source]
        source: DockerError,
    },

    /// A `stop`/`wait` call exceeded its configured timeout.
    #[error("action timed out for {config_id} after {timeout_secs}s")]
    ActionTimeout {
        /// The object the timed-out action was acting on.
        config_id: MapConfigId,
        /// The timeout that was exceeded, in seconds.
        timeout_secs: u64,
    },

    /// An inspected container name didn't map to any declared object.
    #[error("inspected object '{name}' has no matching declaration")]
    InspectInconsistency {
        /// The unmatched daemon-side name.
        name: String,
    },
}

impl MapError {
    /// Wrap a daemon error with the object it was acting on.
    pub fn daemon(config_id: MapConfigId, source: DockerError) -> Self {
        Self::Daemon { config_id, source }
    }

    /// The [`MapConfigId`] this error pertains to, if any (integrity and
    /// cycle errors are map-wide and carry no single id).
    #[must_use]
    pub fn config_id(&self) -> Option<&MapConfigId> {
        match self {
            Self::Daemon { config_id, .. } | Self::ActionTimeout { config_id, .. } => {
                Some(config_id)
            }
            _ => None,
        }
    }
}

fn format_cycle(path: &[String]) -> String {
    path.join(" -> ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_message_joins_path() {
        let err = MapError::CircularDependency {
            path: vec!["a".to_string(), "b".to_string(), "a".to_string()],
        };
        assert_eq!(err.to_string(), "circular dependency: a -> b -> a");
    }

    #[test]
    fn daemon_error_carries_config_id() {
        let id = MapConfigId::container("main", "redis", None);
        let err = MapError::daemon(id.clone(), DockerError::container_not_found("redis"));
        assert_eq!(err.config_id(), Some(&id));
    }
}
