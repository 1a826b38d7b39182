//! Value types for the declarative map configuration document (§6).
//!
//! These mirror the nested-mapping input format directly as `serde`-derived
//! structs, the same way the kept CLI layer derives `Serialize`/`Deserialize`
//! on its own domain types rather than hand-writing a parser.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// When a container's exec command should run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExecPolicy {
    /// Run once, the first time the container is created.
    Initial,
    /// Run again every time the container is (re)started.
    Restart,
}

/// A command to run inside a container instance after it starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecCommand {
    /// User to run the command as, if not the image default.
    #[serde(default)]
    pub user: Option<String>,
    /// The command line, exactly as declared.
    pub cmd: String,
    /// When this command is due to run.
    #[serde(default = "default_exec_policy")]
    pub policy: ExecPolicy,
}

fn default_exec_policy() -> ExecPolicy {
    ExecPolicy::Initial
}

/// A `uses` reference, optionally marked read-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsesRef {
    /// `config_name` or `config_name.instance_name` of the referenced object.
    pub name: String,
    /// Whether the dependency is mounted read-only (informational for volume matching).
    #[serde(default)]
    pub readonly: bool,
}

/// A host bind mount, either naming a declared volume alias or an ad hoc path pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Bind {
    /// Bind a declared volume alias (resolved via `host`).
    Alias {
        /// The `volumes`/`host` alias.
        alias: String,
        /// Whether the bind is read-only.
        #[serde(default)]
        readonly: bool,
    },
    /// Bind an explicit container path to an explicit host sub-path.
    Explicit {
        /// Path inside the container.
        container_path: String,
        /// Path (or path fragment) on the host.
        host_path: String,
        /// Whether the bind is read-only.
        #[serde(default)]
        readonly: bool,
    },
}

/// An inter-container link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRef {
    /// Name (or `config_name.instance_name`) of the linked container.
    pub target: String,
    /// Alias the target is reachable under; defaults to `target` when absent.
    #[serde(default)]
    pub alias: Option<String>,
}

/// A container port to publish, with optional fixed host port / interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExposePort {
    /// Port inside the container.
    pub container_port: u16,
    /// Fixed host port; `None` picks a dynamic port.
    #[serde(default)]
    pub host_port: Option<u16>,
}

/// Raw deserialized form of one container assignment block, before it is
/// normalized into [`crate::fleet::assignment::ContainerAssignment`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawAssignment {
    /// Image reference, e.g. `redis` or `myregistry.example.com/redis:7`.
    #[serde(default)]
    pub image: Option<String>,
    /// Names of instances of a multi-instance container.
    #[serde(default)]
    pub instances: Vec<String>,
    /// Attached volume aliases this container owns.
    #[serde(default)]
    pub attaches: Vec<String>,
    /// Other containers/volumes this container depends on.
    #[serde(default)]
    pub uses: Vec<UsesRef>,
    /// Host bind mounts.
    #[serde(default)]
    pub binds: Vec<Bind>,
    /// Inter-container links.
    #[serde(default)]
    pub links: Vec<LinkRef>,
    /// Ports to publish.
    #[serde(default)]
    pub exposes: Vec<ExposePort>,
    /// Networks this container joins.
    #[serde(default)]
    pub networks: Vec<String>,
    /// Commands to run inside the container after (re)start.
    #[serde(default)]
    pub exec_commands: Vec<ExecCommand>,
    /// Signal used to stop the container; `None`/`SIGTERM` use the graceful path.
    #[serde(default)]
    pub stop_signal: Option<String>,
    /// Timeout in seconds for a graceful stop.
    #[serde(default)]
    pub stop_timeout: Option<u64>,
    /// Environment variables.
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    /// Explicit command override.
    #[serde(default)]
    pub command: Option<Vec<String>>,
    /// Explicit entrypoint override.
    #[serde(default)]
    pub entrypoint: Option<Vec<String>>,
    /// Restrict this assignment's actions to the named clients.
    #[serde(default)]
    pub clients: Option<Vec<String>>,
}

/// Raw deserialized form of a `networks` block entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawNetwork {
    /// Driver name, e.g. `bridge`, `overlay`.
    #[serde(default)]
    pub driver: Option<String>,
    /// Subnet CIDR, if statically assigned.
    #[serde(default)]
    pub subnet: Option<String>,
}

/// Raw deserialized form of an entire map configuration document, keyed by map name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawDocument {
    /// Each top-level key is a map name.
    #[serde(flatten)]
    pub maps: BTreeMap<String, RawMap>,
}

/// Raw deserialized form of a single `ContainerMap`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawMap {
    /// `host` is reserved: alias → host path template.
    #[serde(default)]
    pub host: BTreeMap<String, String>,
    /// `volumes` is reserved: alias → container path.
    #[serde(default)]
    pub volumes: BTreeMap<String, String>,
    /// `networks` block, if any networks are declared with non-default options.
    #[serde(default)]
    pub networks: BTreeMap<String, RawNetwork>,
    /// Other map-level maps to merge in before containers are read.
    #[serde(default)]
    pub extends: Vec<String>,
    /// Image repository prefix applied by the policy.
    #[serde(default)]
    pub repository: Option<String>,
    /// Whether attached-volume naming includes the parent container's name.
    #[serde(default = "default_true")]
    pub use_attached_parent_name: bool,
    /// Every remaining key is a container assignment.
    #[serde(flatten)]
    pub containers: BTreeMap<String, RawAssignment>,
}

fn default_true() -> bool {
    true
}
