//! The `DaemonClient` surface (§1, §6): everything the rest of this module
//! treats as an opaque collaborator. Two implementations exist —
//! [`crate::fleet::daemon_cli::CliDaemonClient`] (backed by the kept `docker`
//! CLI pipeline) and [`crate::fleet::daemon_fake::FakeDaemonClient`] (an
//! in-memory double for tests).

use crate::errors::DockerResult;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

/// Sentinel timestamp meaning "this container has never been started".
pub const INITIAL_START_TIME: &str = "0001-01-01T00:00:00Z";

/// One entry of `GET /containers/json`.
#[derive(Debug, Clone)]
pub struct ContainerSummary {
    /// Daemon-assigned container id.
    pub id: String,
    /// Names the daemon knows this container by (leading slash stripped).
    pub names: Vec<String>,
}

/// A single observed mount on a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedMount {
    /// Source path or volume name on the host/owning container.
    pub source: String,
    /// Mount point inside the container.
    pub destination: String,
    /// Whether the mount is writable.
    pub read_write: bool,
}

/// A single observed published port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedPort {
    /// Port inside the container.
    pub container_port: u16,
    /// `tcp` or `udp`.
    pub protocol: String,
    /// Host-side interface the port is published on (`0.0.0.0` if unspecified).
    pub host_ip: String,
    /// Host-side port.
    pub host_port: u16,
}

/// The subset of `State` this system reasons about.
#[derive(Debug, Clone)]
pub struct ObservedState {
    /// Whether the container is currently running.
    pub running: bool,
    /// Whether the container is in the restart-backoff loop.
    pub restarting: bool,
    /// Exit code of the last run, if any.
    pub exit_code: i32,
    /// RFC3339 start time, or [`INITIAL_START_TIME`] if never started.
    pub started_at: String,
}

/// One process row from `top`, as `(user, cmd)`. Preserved as plain strings
/// per §9's "preserve string-equality comparison bit-for-bit" note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopEntry {
    /// The user the process runs as.
    pub user: String,
    /// The command line, exactly as reported.
    pub cmd: String,
}

/// A full container inspect payload, trimmed to the fields the state
/// generator needs (§3 "Observed state").
#[derive(Debug, Clone)]
pub struct ContainerInspect {
    /// Daemon-assigned container id.
    pub id: String,
    /// The image id the container was created from.
    pub image_id: String,
    /// Run state.
    pub state: ObservedState,
    /// Observed mounts.
    pub mounts: Vec<ObservedMount>,
    /// `HostConfig.Links`.
    pub links: Vec<String>,
    /// `NetworkSettings.Ports`.
    pub ports: Vec<ObservedPort>,
    /// Networks this container is attached to.
    pub networks: Vec<String>,
    /// `Config.Env`, as raw `KEY=VALUE` strings.
    pub env: Vec<String>,
    /// `Config.Cmd`.
    pub command: Vec<String>,
    /// `Config.Entrypoint`.
    pub entrypoint: Vec<String>,
}

/// Creation arguments assembled by the runner's `get_create_kwargs` hook analog.
#[derive(Debug, Clone, Default)]
pub struct CreateContainerArgs {
    /// Daemon-visible name to assign.
    pub name: String,
    /// Resolved image reference.
    pub image: String,
    /// Environment variables.
    pub env: HashMap<String, String>,
    /// Command override, if any.
    pub command: Option<Vec<String>>,
    /// Entrypoint override, if any.
    pub entrypoint: Option<Vec<String>>,
    /// `(host_path_or_volume, container_path, read_write)` binds.
    pub binds: Vec<(String, String, bool)>,
    /// Container paths declared as anonymous volumes with no host source,
    /// used for attached data-volume containers (§4.1 "attached volume").
    pub declared_volumes: Vec<String>,
    /// `(container_port, host_port)` publications.
    pub ports: Vec<(u16, u16)>,
    /// Link targets, `container_name:alias`.
    pub links: Vec<String>,
    /// Networks to attach at creation.
    pub networks: Vec<String>,
}

/// An image reference as returned from `GET /images/json`.
#[derive(Debug, Clone)]
pub struct ImageSummary {
    /// Image id.
    pub id: String,
    /// Repo:tag strings this image answers to.
    pub repo_tags: Vec<String>,
}

/// Network listing entry.
#[derive(Debug, Clone)]
pub struct NetworkSummary {
    /// Network id.
    pub id: String,
    /// Network name.
    pub name: String,
}

/// The abstract daemon control surface (§6): every call this system issues
/// against a container runtime.
#[async_trait]
pub trait DaemonClient: Send + Sync {
    /// `GET /containers/json` — id/name resolution for every known container.
    async fn list_containers(&self, all: bool) -> DockerResult<Vec<ContainerSummary>>;

    /// `GET /containers/{name}/json`, or `Ok(None)` if no such container exists.
    async fn inspect_container(&self, name: &str) -> DockerResult<Option<ContainerInspect>>;

    /// `GET /containers/{name}/top` — prior exec history for command comparison.
    async fn top(&self, name: &str) -> DockerResult<Vec<TopEntry>>;

    /// `POST /containers/create`.
    async fn create_container(&self, args: &CreateContainerArgs) -> DockerResult<String>;

    /// `POST /containers/{name}/start`.
    async fn start(&self, name: &str) -> DockerResult<()>;

    /// `POST /containers/{name}/stop`.
    async fn stop(&self, name: &str, timeout: Duration) -> DockerResult<()>;

    /// `POST /containers/{name}/kill`.
    async fn kill(&self, name: &str, signal: &str) -> DockerResult<()>;

    /// `POST /containers/{name}/wait`.
    async fn wait(&self, name: &str, timeout: Duration) -> DockerResult<i32>;

    /// `DELETE /containers/{name}`.
    async fn remove(&self, name: &str, force: bool, remove_volumes: bool) -> DockerResult<()>;

    /// `POST /containers/{name}/exec` — returns the exec id, or `None` if the
    /// command auto-started without one (§4.3 "Exec").
    async fn exec_create(
        &self,
        name: &str,
        user: Option<&str>,
        cmd: &str,
    ) -> DockerResult<Option<String>>;

    /// `POST /exec/{id}/start`.
    async fn exec_start(&self, exec_id: &str) -> DockerResult<()>;

    /// `GET /images/json`.
    async fn list_images(&self) -> DockerResult<Vec<ImageSummary>>;

    /// `POST /images/create` — pulls `image` and returns its resolved id.
    async fn pull_image(&self, image: &str) -> DockerResult<String>;

    /// `GET /networks`.
    async fn list_networks(&self) -> DockerResult<Vec<NetworkSummary>>;

    /// `POST /networks/create`.
    async fn create_network(&self, name: &str, driver: Option<&str>) -> DockerResult<String>;

    /// `POST /networks/{id}/connect`.
    async fn connect_container_to_network(
        &self,
        network: &str,
        container: &str,
    ) -> DockerResult<()>;
}
