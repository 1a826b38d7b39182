//! `CliDaemonClient`: a [`crate::fleet::daemon::DaemonClient`] backed by the
//! `docker` CLI, built directly on the kept [`crate::client::DockerClient`]
//! process-execution pipeline rather than a second transport.

use crate::client::DockerClient;
use crate::errors::{DockerError, DockerResult};
use crate::fleet::daemon::{
    ContainerInspect, ContainerSummary, CreateContainerArgs, DaemonClient, ImageSummary,
    NetworkSummary, ObservedMount, ObservedPort, ObservedState, TopEntry, INITIAL_START_TIME,
};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// A `DaemonClient` that shells out to the `docker` binary for every call.
pub struct CliDaemonClient {
    client: DockerClient,
}

impl CliDaemonClient {
    /// Wrap an already-constructed [`DockerClient`].
    #[must_use]
    pub fn new(client: DockerClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DaemonClient for CliDaemonClient {
    async fn list_containers(&self, all: bool) -> DockerResult<Vec<ContainerSummary>> {
        debug!("fleet: listing containers (all={all})");
        let mut args = vec![
            "ps".to_string(),
            "--format".to_string(),
            "{{.ID}}\t{{.Names}}".to_string(),
        ];
        if all {
            args.push("--all".to_string());
        }
        let output = self.client.execute_command_stdout(&args).await?;
        Ok(output
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| {
                let mut parts = line.splitn(2, '\t');
                let id = parts.next()?.to_string();
                let names = parts
                    .next()?
                    .split(',')
                    .map(|n| n.trim_start_matches('/').to_string())
                    .collect();
                Some(ContainerSummary { id, names })
            })
            .collect())
    }

    async fn inspect_container(&self, name: &str) -> DockerResult<Option<ContainerInspect>> {
        debug!("fleet: inspecting container {name}");
        let args = vec![
            "inspect".to_string(),
            "--format".to_string(),
            "{{json .}}".to_string(),
            name.to_string(),
        ];
        let output = match self.client.execute_command_stdout(&args).await {
            Ok(out) => out,
            Err(DockerError::CommandFailed { .. }) => return Ok(None),
            Err(other) => return Err(other),
        };
        let data: serde_json::Value = serde_json::from_str(&output)
            .map_err(|e| DockerError::parsing(format!("failed to parse inspect output: {e}")))?;
        Ok(Some(parse_inspect(&data)?))
    }

    async fn top(&self, name: &str) -> DockerResult<Vec<TopEntry>> {
        debug!("fleet: top {name}");
        let args = vec![
            "top".to_string(),
            name.to_string(),
            "-eo".to_string(),
            "user,args".to_string(),
        ];
        let output = self.client.execute_command_stdout(&args).await?;
        Ok(output
            .lines()
            .skip(1) // header row
            .filter_map(|line| {
                let mut parts = line.trim().splitn(2, char::is_whitespace);
                let user = parts.next()?.to_string();
                let cmd = parts.next().unwrap_or("").trim().to_string();
                Some(TopEntry { user, cmd })
            })
            .collect())
    }

    async fn create_container(&self, args: &CreateContainerArgs) -> DockerResult<String> {
        debug!("fleet: creating container {}", args.name);
        let mut cmd = vec!["create".to_string(), "--name".to_string(), args.name.clone()];
        for (key, value) in &args.env {
            cmd.push("--env".to_string());
            cmd.push(format!("{key}={value}"));
        }
        for (source, destination, read_write) in &args.binds {
            cmd.push("--volume".to_string());
            let mode = if *read_write { "rw" } else { "ro" };
            cmd.push(format!("{source}:{destination}:{mode}"));
        }
        for container_path in &args.declared_volumes {
            cmd.push("--volume".to_string());
            cmd.push(container_path.clone());
        }
        for (container_port, host_port) in &args.ports {
            cmd.push("--publish".to_string());
            cmd.push(format!("{host_port}:{container_port}"));
        }
        for link in &args.links {
            cmd.push("--link".to_string());
            cmd.push(link.clone());
        }
        for network in &args.networks {
            cmd.push("--network".to_string());
            cmd.push(network.clone());
        }
        if let Some(entrypoint) = &args.entrypoint {
            cmd.push("--entrypoint".to_string());
            cmd.push(entrypoint.join(" "));
        }
        cmd.push(args.image.clone());
        if let Some(command) = &args.command {
            cmd.extend(command.clone());
        }
        let output = self.client.execute_command_stdout(&cmd).await?;
        Ok(output.trim().to_string())
    }

    async fn start(&self, name: &str) -> DockerResult<()> {
        debug!("fleet: starting {name}");
        self.client
            .execute_command(&["start".to_string(), name.to_string()], None)
            .await?;
        Ok(())
    }

    async fn stop(&self, name: &str, timeout: Duration) -> DockerResult<()> {
        debug!("fleet: stopping {name} (timeout={}s)", timeout.as_secs());
        let args = vec![
            "stop".to_string(),
            "--time".to_string(),
            timeout.as_secs().to_string(),
            name.to_string(),
        ];
        self.client.execute_command(&args, None).await?;
        Ok(())
    }

    async fn kill(&self, name: &str, signal: &str) -> DockerResult<()> {
        debug!("fleet: killing {name} with {signal}");
        let args = vec![
            "kill".to_string(),
            "--signal".to_string(),
            signal.to_string(),
            name.to_string(),
        ];
        self.client.execute_command(&args, None).await?;
        Ok(())
    }

    async fn wait(&self, name: &str, timeout: Duration) -> DockerResult<i32> {
        debug!("fleet: waiting for {name}");
        let config = crate::executor::ExecutionConfig {
            timeout: Some(timeout),
            ..Default::default()
        };
        let output = self
            .client
            .execute_command(&["wait".to_string(), name.to_string()], Some(config))
            .await?;
        output
            .stdout
            .trim()
            .parse::<i32>()
            .map_err(|e| DockerError::parsing(format!("invalid exit code from wait: {e}")))
    }

    async fn remove(&self, name: &str, force: bool, remove_volumes: bool) -> DockerResult<()> {
        debug!("fleet: removing {name}");
        let mut args = vec!["rm".to_string()];
        if force {
            args.push("--force".to_string());
        }
        if remove_volumes {
            args.push("--volumes".to_string());
        }
        args.push(name.to_string());
        self.client.execute_command(&args, None).await?;
        Ok(())
    }

    async fn exec_create(
        &self,
        name: &str,
        user: Option<&str>,
        cmd: &str,
    ) -> DockerResult<Option<String>> {
        debug!("fleet: exec_create on {name}: {cmd}");
        let mut args = vec!["exec".to_string(), "--detach".to_string()];
        if let Some(user) = user {
            args.push("--user".to_string());
            args.push(user.to_string());
        }
        args.push(name.to_string());
        args.extend(cmd.split_whitespace().map(str::to_string));
        self.client.execute_command(&args, None).await?;
        // The CLI `exec --detach` path never reports an exec id back to the
        // caller; the runner treats a `None` id as "auto-started" (§4.3).
        Ok(None)
    }

    async fn exec_start(&self, _exec_id: &str) -> DockerResult<()> {
        // No-op: the CLI surface only supports `exec_create` returning an id
        // when a daemon-API-backed client is used; the CLI path always
        // auto-starts (see `exec_create` above).
        Ok(())
    }

    async fn list_images(&self) -> DockerResult<Vec<ImageSummary>> {
        debug!("fleet: listing images");
        let args = vec![
            "images".to_string(),
            "--format".to_string(),
            "{{.ID}}\t{{.Repository}}:{{.Tag}}".to_string(),
        ];
        let output = self.client.execute_command_stdout(&args).await?;
        let mut by_id: std::collections::HashMap<String, Vec<String>> =
            std::collections::HashMap::new();
        for line in output.lines().filter(|l| !l.trim().is_empty()) {
            let mut parts = line.splitn(2, '\t');
            if let (Some(id), Some(tag)) = (parts.next(), parts.next()) {
                by_id.entry(id.to_string()).or_default().push(tag.to_string());
            }
        }
        Ok(by_id
            .into_iter()
            .map(|(id, repo_tags)| ImageSummary { id, repo_tags })
            .collect())
    }

    async fn pull_image(&self, image: &str) -> DockerResult<String> {
        debug!("fleet: pulling {image}");
        self.client
            .execute_command(&["pull".to_string(), image.to_string()], None)
            .await?;
        let args = vec![
            "inspect".to_string(),
            "--format".to_string(),
            "{{.Id}}".to_string(),
            image.to_string(),
        ];
        let output = self.client.execute_command_stdout(&args).await?;
        Ok(output.trim().to_string())
    }

    async fn list_networks(&self) -> DockerResult<Vec<NetworkSummary>> {
        debug!("fleet: listing networks");
        let args = vec![
            "network".to_string(),
            "ls".to_string(),
            "--format".to_string(),
            "{{.ID}}\t{{.Name}}".to_string(),
        ];
        let output = self.client.execute_command_stdout(&args).await?;
        Ok(output
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|line| {
                let mut parts = line.splitn(2, '\t');
                Some(NetworkSummary {
                    id: parts.next()?.to_string(),
                    name: parts.next()?.to_string(),
                })
            })
            .collect())
    }

    async fn create_network(&self, name: &str, driver: Option<&str>) -> DockerResult<String> {
        debug!("fleet: creating network {name}");
        let mut args = vec!["network".to_string(), "create".to_string()];
        if let Some(driver) = driver {
            args.push("--driver".to_string());
            args.push(driver.to_string());
        }
        args.push(name.to_string());
        let output = self.client.execute_command_stdout(&args).await?;
        Ok(output.trim().to_string())
    }

    async fn connect_container_to_network(
        &self,
        network: &str,
        container: &str,
    ) -> DockerResult<()> {
        debug!("fleet: connecting {container} to {network}");
        let args = vec![
            "network".to_string(),
            "connect".to_string(),
            network.to_string(),
            container.to_string(),
        ];
        self.client.execute_command(&args, None).await?;
        Ok(())
    }
}

fn parse_inspect(data: &serde_json::Value) -> DockerResult<ContainerInspect> {
    let id = data["Id"]
        .as_str()
        .ok_or_else(|| DockerError::parsing("missing container Id".to_string()))?
        .to_string();
    let image_id = data["Image"].as_str().unwrap_or_default().to_string();

    let state = &data["State"];
    let started_at = state["StartedAt"]
        .as_str()
        .unwrap_or(INITIAL_START_TIME)
        .to_string();
    let observed_state = ObservedState {
        running: state["Running"].as_bool().unwrap_or(false),
        restarting: state["Restarting"].as_bool().unwrap_or(false),
        exit_code: state["ExitCode"].as_i64().unwrap_or(0) as i32,
        started_at,
    };

    let mut mounts = Vec::new();
    if let Some(array) = data["Mounts"].as_array() {
        for mount in array {
            mounts.push(ObservedMount {
                source: mount["Source"].as_str().unwrap_or_default().to_string(),
                destination: mount["Destination"].as_str().unwrap_or_default().to_string(),
                read_write: mount["RW"].as_bool().unwrap_or(true),
            });
        }
    }

    let links = data["HostConfig"]["Links"]
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    let mut ports = Vec::new();
    if let Some(port_map) = data["NetworkSettings"]["Ports"].as_object() {
        for (spec, bindings) in port_map {
            let mut spec_parts = spec.splitn(2, '/');
            let container_port: u16 = spec_parts.next().unwrap_or("0").parse().unwrap_or(0);
            let protocol = spec_parts.next().unwrap_or("tcp").to_string();
            if let Some(bindings) = bindings.as_array() {
                for binding in bindings {
                    let host_ip = binding["HostIp"]
                        .as_str()
                        .filter(|s| !s.is_empty())
                        .unwrap_or("0.0.0.0")
                        .to_string();
                    let host_port: u16 = binding["HostPort"]
                        .as_str()
                        .and_then(|s| s.parse().ok())
                        .unwrap_or(0);
                    ports.push(ObservedPort {
                        container_port,
                        protocol: protocol.clone(),
                        host_ip,
                        host_port,
                    });
                }
            }
        }
    }

    let networks = data["NetworkSettings"]["Networks"]
        .as_object()
        .map(|obj| obj.keys().cloned().collect())
        .unwrap_or_default();

    let env = data["Config"]["Env"]
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();
    let command = data["Config"]["Cmd"]
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();
    let entrypoint = data["Config"]["Entrypoint"]
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    Ok(ContainerInspect {
        id,
        image_id,
        state: observed_state,
        mounts,
        links,
        ports,
        networks,
        env,
        command,
        entrypoint,
    })
}
