//! `FakeDaemonClient`: an in-memory [`crate::fleet::daemon::DaemonClient`]
//! double for exercising the resolver/state-generator/runner pipeline without
//! a real daemon, grounded in the pack's trait-plus-fake-double pattern for
//! daemon abstractions.

use crate::errors::{DockerError, DockerResult};
use crate::fleet::daemon::{
    ContainerInspect, ContainerSummary, CreateContainerArgs, DaemonClient, ImageSummary,
    NetworkSummary, ObservedMount, ObservedPort, ObservedState, TopEntry, INITIAL_START_TIME,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Default)]
struct Inner {
    containers: HashMap<String, ContainerInspect>,
    top: HashMap<String, Vec<TopEntry>>,
    images: HashMap<String, String>, // tag -> id
    networks: HashMap<String, String>, // name -> id
    next_id: u64,
}

/// In-memory fake of a container daemon. Seed it with `seed_container`/
/// `seed_image`/`seed_network` before handing it to a `StateGenerator`/`Runner`.
#[derive(Default)]
pub struct FakeDaemonClient {
    inner: Mutex<Inner>,
}

impl FakeDaemonClient {
    /// Construct an empty fake daemon.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an already-inspected container under `name`.
    pub fn seed_container(&self, name: impl Into<String>, inspect: ContainerInspect) {
        self.inner
            .lock()
            .unwrap()
            .containers
            .insert(name.into(), inspect);
    }

    /// Seed the `top` result a subsequent `top(name)` call will return.
    pub fn seed_top(&self, name: impl Into<String>, entries: Vec<TopEntry>) {
        self.inner.lock().unwrap().top.insert(name.into(), entries);
    }

    /// Seed a known image tag → id mapping, as if already pulled.
    pub fn seed_image(&self, tag: impl Into<String>, id: impl Into<String>) {
        self.inner
            .lock()
            .unwrap()
            .images
            .insert(tag.into(), id.into());
    }

    /// Seed a known network name → id mapping.
    pub fn seed_network(&self, name: impl Into<String>, id: impl Into<String>) {
        self.inner
            .lock()
            .unwrap()
            .networks
            .insert(name.into(), id.into());
    }

    fn next_id(&self) -> String {
        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        format!("fake{:016x}", inner.next_id)
    }
}

/// Builder for a seeded [`ContainerInspect`], since every scenario in the
/// fixture this system's tests are grounded on (§8) needs a slightly
/// different running/exited/restarting shape.
pub struct FakeContainerBuilder {
    inspect: ContainerInspect,
}

impl FakeContainerBuilder {
    /// Start building a container inspect record with the given id/image.
    #[must_use]
    pub fn new(id: impl Into<String>, image_id: impl Into<String>) -> Self {
        Self {
            inspect: ContainerInspect {
                id: id.into(),
                image_id: image_id.into(),
                state: ObservedState {
                    running: false,
                    restarting: false,
                    exit_code: 0,
                    started_at: INITIAL_START_TIME.to_string(),
                },
                mounts: Vec::new(),
                links: Vec::new(),
                ports: Vec::new(),
                networks: Vec::new(),
                env: Vec::new(),
                command: Vec::new(),
                entrypoint: Vec::new(),
            },
        }
    }

    /// Mark the container as running, having started at `started_at`.
    #[must_use]
    pub fn running(mut self, started_at: impl Into<String>) -> Self {
        self.inspect.state.running = true;
        self.inspect.state.started_at = started_at.into();
        self
    }

    /// Mark the container as exited with `exit_code`.
    #[must_use]
    pub fn exited(mut self, exit_code: i32, started_at: impl Into<String>) -> Self {
        self.inspect.state.running = false;
        self.inspect.state.exit_code = exit_code;
        self.inspect.state.started_at = started_at.into();
        self
    }

    /// Mark the container as currently restarting.
    #[must_use]
    pub fn restarting(mut self) -> Self {
        self.inspect.state.restarting = true;
        self
    }

    /// Attach an observed mount.
    #[must_use]
    pub fn mount(mut self, source: &str, destination: &str, read_write: bool) -> Self {
        self.inspect.mounts.push(ObservedMount {
            source: source.to_string(),
            destination: destination.to_string(),
            read_write,
        });
        self
    }

    /// Attach an observed published port.
    #[must_use]
    pub fn port(mut self, container_port: u16, host_port: u16) -> Self {
        self.inspect.ports.push(ObservedPort {
            container_port,
            protocol: "tcp".to_string(),
            host_ip: "0.0.0.0".to_string(),
            host_port,
        });
        self
    }

    /// Set observed environment variables.
    #[must_use]
    pub fn env(mut self, entries: &[&str]) -> Self {
        self.inspect.env = entries.iter().map(|s| (*s).to_string()).collect();
        self
    }

    /// Set observed command.
    #[must_use]
    pub fn command(mut self, entries: &[&str]) -> Self {
        self.inspect.command = entries.iter().map(|s| (*s).to_string()).collect();
        self
    }

    /// Set observed network attachments.
    #[must_use]
    pub fn networks(mut self, names: &[&str]) -> Self {
        self.inspect.networks = names.iter().map(|s| (*s).to_string()).collect();
        self
    }

    /// Finish building.
    #[must_use]
    pub fn build(self) -> ContainerInspect {
        self.inspect
    }
}

#[async_trait]
impl DaemonClient for FakeDaemonClient {
    async fn list_containers(&self, _all: bool) -> DockerResult<Vec<ContainerSummary>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .containers
            .iter()
            .map(|(name, inspect)| ContainerSummary {
                id: inspect.id.clone(),
                names: vec![name.clone()],
            })
            .collect())
    }

    async fn inspect_container(&self, name: &str) -> DockerResult<Option<ContainerInspect>> {
        Ok(self.inner.lock().unwrap().containers.get(name).cloned())
    }

    async fn top(&self, name: &str) -> DockerResult<Vec<TopEntry>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .top
            .get(name)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_container(&self, args: &CreateContainerArgs) -> DockerResult<String> {
        let image_id = self.pull_image(&args.image).await?;
        let id = self.next_id();
        let inspect = ContainerInspect {
            id: id.clone(),
            image_id,
            state: ObservedState {
                running: false,
                restarting: false,
                exit_code: 0,
                started_at: INITIAL_START_TIME.to_string(),
            },
            mounts: args
                .binds
                .iter()
                .map(|(source, destination, read_write)| ObservedMount {
                    source: source.clone(),
                    destination: destination.clone(),
                    read_write: *read_write,
                })
                .chain(args.declared_volumes.iter().map(|path| ObservedMount {
                    source: String::new(),
                    destination: path.clone(),
                    read_write: true,
                }))
                .collect(),
            links: args.links.clone(),
            ports: args
                .ports
                .iter()
                .map(|(container_port, host_port)| ObservedPort {
                    container_port: *container_port,
                    protocol: "tcp".to_string(),
                    host_ip: "0.0.0.0".to_string(),
                    host_port: *host_port,
                })
                .collect(),
            networks: args.networks.clone(),
            env: args
                .env
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect(),
            command: args.command.clone().unwrap_or_default(),
            entrypoint: args.entrypoint.clone().unwrap_or_default(),
        };
        self.inner
            .lock()
            .unwrap()
            .containers
            .insert(args.name.clone(), inspect);
        Ok(id)
    }

    async fn start(&self, name: &str) -> DockerResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let container = inner
            .containers
            .get_mut(name)
            .ok_or_else(|| DockerError::container_not_found(name))?;
        container.state.running = true;
        container.state.restarting = false;
        if container.state.started_at == INITIAL_START_TIME {
            container.state.started_at = "2024-01-01T00:00:00Z".to_string();
        }
        Ok(())
    }

    async fn stop(&self, name: &str, _timeout: Duration) -> DockerResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let container = inner
            .containers
            .get_mut(name)
            .ok_or_else(|| DockerError::container_not_found(name))?;
        container.state.running = false;
        container.state.exit_code = 0;
        Ok(())
    }

    async fn kill(&self, name: &str, _signal: &str) -> DockerResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let container = inner
            .containers
            .get_mut(name)
            .ok_or_else(|| DockerError::container_not_found(name))?;
        container.state.running = false;
        container.state.exit_code = 137;
        Ok(())
    }

    async fn wait(&self, name: &str, _timeout: Duration) -> DockerResult<i32> {
        let inner = self.inner.lock().unwrap();
        let container = inner
            .containers
            .get(name)
            .ok_or_else(|| DockerError::container_not_found(name))?;
        Ok(container.state.exit_code)
    }

    async fn remove(&self, name: &str, _force: bool, _remove_volumes: bool) -> DockerResult<()> {
        self.inner.lock().unwrap().containers.remove(name);
        Ok(())
    }

    async fn exec_create(
        &self,
        name: &str,
        _user: Option<&str>,
        cmd: &str,
    ) -> DockerResult<Option<String>> {
        if !self.inner.lock().unwrap().containers.contains_key(name) {
            return Err(DockerError::container_not_found(name));
        }
        let id = self.next_id();
        self.inner
            .lock()
            .unwrap()
            .top
            .entry(name.to_string())
            .or_default()
            .push(TopEntry {
                user: "root".to_string(),
                cmd: cmd.to_string(),
            });
        Ok(Some(id))
    }

    async fn exec_start(&self, _exec_id: &str) -> DockerResult<()> {
        Ok(())
    }

    async fn list_images(&self) -> DockerResult<Vec<ImageSummary>> {
        let inner = self.inner.lock().unwrap();
        let mut by_id: HashMap<String, Vec<String>> = HashMap::new();
        for (tag, id) in &inner.images {
            by_id.entry(id.clone()).or_default().push(tag.clone());
        }
        Ok(by_id
            .into_iter()
            .map(|(id, repo_tags)| ImageSummary { id, repo_tags })
            .collect())
    }

    async fn pull_image(&self, image: &str) -> DockerResult<String> {
        if let Some(id) = self.inner.lock().unwrap().images.get(image) {
            return Ok(id.clone());
        }
        let id = self.next_id();
        self.inner
            .lock()
            .unwrap()
            .images
            .insert(image.to_string(), id.clone());
        Ok(id)
    }

    async fn list_networks(&self) -> DockerResult<Vec<NetworkSummary>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .networks
            .iter()
            .map(|(name, id)| NetworkSummary {
                id: id.clone(),
                name: name.clone(),
            })
            .collect())
    }

    async fn create_network(&self, name: &str, _driver: Option<&str>) -> DockerResult<String> {
        let id = self.next_id();
        self.inner
            .lock()
            .unwrap()
            .networks
            .insert(name.to_string(), id.clone());
        Ok(id)
    }

    async fn connect_container_to_network(
        &self,
        network: &str,
        container: &str,
    ) -> DockerResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let container = inner
            .containers
            .get_mut(container)
            .ok_or_else(|| DockerError::container_not_found(container))?;
        if !container.networks.iter().any(|n| n == network) {
            container.networks.push(network.to_string());
        }
        Ok(())
    }
}
