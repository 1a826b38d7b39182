//! Normalized in-memory assignment types, built from [`crate::fleet::input::RawAssignment`].

use crate::fleet::input::{Bind, ExecCommand, ExposePort, LinkRef, UsesRef};
use std::collections::BTreeMap;

/// The declarative record for one container inside a map.
#[derive(Debug, Clone, Default)]
pub struct ContainerAssignment {
    /// Image reference as declared (before [`crate::fleet::policy::Policy::image_name`] resolution).
    pub image: Option<String>,
    /// Names of instances of a multi-instance container; empty means single-instance.
    pub instances: Vec<String>,
    /// Attached volume aliases this container owns.
    pub attaches: Vec<String>,
    /// Other containers/volumes this container depends on.
    pub uses: Vec<UsesRef>,
    /// Host bind mounts.
    pub binds: Vec<Bind>,
    /// Inter-container links.
    pub links: Vec<LinkRef>,
    /// Ports to publish.
    pub exposes: Vec<ExposePort>,
    /// Networks this container joins.
    pub networks: Vec<String>,
    /// Commands to run inside the container after (re)start.
    pub exec_commands: Vec<ExecCommand>,
    /// Signal used to stop the container; `None` uses the graceful `SIGTERM` path.
    pub stop_signal: Option<String>,
    /// Timeout in seconds for a graceful stop; defaults to 10.
    pub stop_timeout: u64,
    /// Environment variables.
    pub environment: BTreeMap<String, String>,
    /// Explicit command override.
    pub command: Option<Vec<String>>,
    /// Explicit entrypoint override.
    pub entrypoint: Option<Vec<String>>,
    /// Restrict this assignment's actions to the named clients; `None` means `__default__`.
    pub clients: Option<Vec<String>>,
}

/// Default stop timeout, in seconds, matching the daemon's own default.
pub const DEFAULT_STOP_TIMEOUT_SECS: u64 = 10;

impl ContainerAssignment {
    /// True if this assignment declares more than one named instance.
    #[must_use]
    pub fn is_multi_instance(&self) -> bool {
        !self.instances.is_empty()
    }

    /// The list of instance names to emit nodes for: the declared instances,
    /// or a single `None` entry for a non-instanced container.
    #[must_use]
    pub fn instance_slots(&self) -> Vec<Option<String>> {
        if self.instances.is_empty() {
            vec![None]
        } else {
            self.instances.iter().cloned().map(Some).collect()
        }
    }
}

impl From<crate::fleet::input::RawAssignment> for ContainerAssignment {
    fn from(raw: crate::fleet::input::RawAssignment) -> Self {
        Self {
            image: raw.image,
            instances: raw.instances,
            attaches: raw.attaches,
            uses: raw.uses,
            binds: raw.binds,
            links: raw.links,
            exposes: raw.exposes,
            networks: raw.networks,
            exec_commands: raw.exec_commands,
            stop_signal: raw.stop_signal,
            stop_timeout: raw.stop_timeout.unwrap_or(DEFAULT_STOP_TIMEOUT_SECS),
            environment: raw.environment,
            command: raw.command,
            entrypoint: raw.entrypoint,
            clients: raw.clients,
        }
    }
}

/// The declarative record for a user-defined network inside a map.
#[derive(Debug, Clone, Default)]
pub struct NetworkAssignment {
    /// Driver name, e.g. `bridge`, `overlay`; `None` uses the daemon default.
    pub driver: Option<String>,
    /// Subnet CIDR, if statically assigned.
    pub subnet: Option<String>,
}

impl From<crate::fleet::input::RawNetwork> for NetworkAssignment {
    fn from(raw: crate::fleet::input::RawNetwork) -> Self {
        Self {
            driver: raw.driver,
            subnet: raw.subnet,
        }
    }
}
