//! State generation: diff the declared map against a live daemon (§4.2).
//!
//! A [`StateGenerator`] walks one of four paths through the dependency graph
//! and emits a [`ConfigState`] for every container instance, attached
//! volume, and network along the way, inspecting each daemon-visible name at
//! most once per pass.

use crate::fleet::assignment::ContainerAssignment;
use crate::fleet::daemon::{ContainerInspect, DaemonClient, INITIAL_START_TIME};
use crate::fleet::error::{MapError, MapResult};
use crate::fleet::id::MapConfigId;
use crate::fleet::input::Bind;
use crate::fleet::map::{ContainerMap, DepNode};
use crate::fleet::policy::Policy;
use crate::fleet::resolver::{merge_dependency_paths, ContainerDependencyResolver};
use crate::fleet::state::{BaseState, ConfigState, ExecCommandState, StateFlags};
use std::collections::{HashMap, HashSet};

/// Which subgraph of the map a single [`StateGenerator::generate`] call walks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorKind {
    /// Only the named target.
    Single,
    /// The target plus everything it transitively depends on, dependency-first.
    Dependency,
    /// The target plus everything that transitively depends on it.
    Dependent,
    /// The same path as `Dependency`, but every record also carries a full
    /// config comparison instead of just the base/running checks.
    Update,
}

#[derive(Default)]
struct InspectCache {
    containers: HashMap<String, Option<ContainerInspect>>,
}

impl InspectCache {
    async fn get(
        &mut self,
        daemon: &dyn DaemonClient,
        name: &str,
    ) -> crate::errors::DockerResult<Option<ContainerInspect>> {
        if let Some(cached) = self.containers.get(name) {
            return Ok(cached.clone());
        }
        let inspect = daemon.inspect_container(name).await?;
        self.containers.insert(name.to_string(), inspect.clone());
        Ok(inspect)
    }
}

fn split_instance(qualified_name: &str) -> (&str, Option<String>) {
    match qualified_name.split_once('.') {
        Some((base, instance)) => (base, Some(instance.to_string())),
        None => (qualified_name, None),
    }
}

/// Walks a map's dependency graph against a live daemon and produces one
/// [`ConfigState`] per addressable object (§4.2).
pub struct StateGenerator<'a> {
    map: &'a ContainerMap,
    resolver: ContainerDependencyResolver,
    policy: Policy<'a>,
    kind: GeneratorKind,
}

impl<'a> StateGenerator<'a> {
    /// Build a generator for `map`, resolving its dependency graph once up front.
    pub fn new(map: &'a ContainerMap, kind: GeneratorKind) -> MapResult<Self> {
        let resolver = ContainerDependencyResolver::new(map)?;
        Ok(Self {
            map,
            resolver,
            policy: Policy::new(map),
            kind,
        })
    }

    /// Merge the dependency paths of several simultaneously-requested
    /// targets (§8), for a whole-map apply that shouldn't reconcile an
    /// overlapping subgraph twice.
    pub fn merge_targets(
        &self,
        target_config_names: &[String],
    ) -> MapResult<Vec<(DepNode, Vec<DepNode>)>> {
        let mut paths = Vec::new();
        for name in target_config_names {
            let root = DepNode::Container(name.clone());
            let deps = self.resolver.dependencies_of(&root)?;
            paths.push((root, deps));
        }
        Ok(merge_dependency_paths(paths))
    }

    fn path_nodes(&self, target: &DepNode) -> MapResult<Vec<DepNode>> {
        match self.kind {
            GeneratorKind::Single => Ok(vec![target.clone()]),
            GeneratorKind::Dependency | GeneratorKind::Update => {
                let mut deps = self.resolver.dependencies_of(target)?;
                deps.push(target.clone());
                Ok(deps)
            }
            GeneratorKind::Dependent => {
                let dependents = self.resolver.dependents_of(target)?;
                let mut path = vec![target.clone()];
                path.extend(dependents);
                Ok(path)
            }
        }
    }

    /// Generate the state record sequence for `target_config_name`.
    pub async fn generate(
        &self,
        daemon: &dyn DaemonClient,
        target_config_name: &str,
        force_update: &HashSet<MapConfigId>,
    ) -> MapResult<Vec<ConfigState>> {
        let target = DepNode::Container(target_config_name.to_string());
        let path = self.path_nodes(&target)?;

        let mut owner_attaches: HashMap<&str, Vec<&str>> = HashMap::new();
        for (config_name, assignment) in &self.map.containers {
            if !assignment.attaches.is_empty() {
                owner_attaches.insert(
                    config_name.as_str(),
                    assignment.attaches.iter().map(String::as_str).collect(),
                );
            }
        }

        let mut cache = InspectCache::default();
        let mut states = Vec::new();

        for node in &path {
            let is_target = *node == target;
            match node {
                DepNode::Network(name) => {
                    states.push(self.network_state(daemon, name, is_target).await?);
                }
                DepNode::Container(qualified_name) => {
                    let (config_name, instance) = split_instance(qualified_name);
                    let assignment = self.map.get_existing(config_name).ok_or_else(|| {
                        MapError::InspectInconsistency {
                            name: qualified_name.clone(),
                        }
                    })?;

                    if let Some(aliases) = owner_attaches.remove(config_name) {
                        for alias in aliases {
                            states.push(
                                self.volume_state(daemon, config_name, alias, is_target)
                                    .await?,
                            );
                        }
                    }

                    // The bare aggregate node is the only thing the dependency
                    // graph ever points at for a multi-instance container
                    // (§4.1); nothing names an individual instance node, so
                    // expand it into every declared instance here.
                    let slots = if assignment.is_multi_instance() && instance.is_none() {
                        assignment.instance_slots()
                    } else {
                        vec![instance.map(String::from)]
                    };
                    for slot in slots {
                        states.push(
                            self.container_state(
                                daemon,
                                &mut cache,
                                config_name,
                                slot.as_deref(),
                                assignment,
                                is_target,
                                force_update,
                            )
                            .await?,
                        );
                    }
                }
            }
        }

        Ok(states)
    }

    async fn container_state(
        &self,
        daemon: &dyn DaemonClient,
        cache: &mut InspectCache,
        config_name: &str,
        instance: Option<&str>,
        assignment: &ContainerAssignment,
        is_target: bool,
        force_update: &HashSet<MapConfigId>,
    ) -> MapResult<ConfigState> {
        let config_id =
            MapConfigId::container(&self.map.name, config_name, instance.map(str::to_string));
        let cname = self.policy.cname(config_name, instance);
        let inspect = cache
            .get(daemon, &cname)
            .await
            .map_err(|e| MapError::daemon(config_id.clone(), e))?;

        let mut record = match &inspect {
            None => ConfigState::new(config_id.clone(), BaseState::Absent),
            Some(data) => {
                let base = if data.state.running {
                    BaseState::Running
                } else {
                    BaseState::Present
                };
                let mut record = ConfigState::new(config_id.clone(), base);
                record.daemon_id = Some(data.id.clone());
                if data.state.started_at == INITIAL_START_TIME {
                    record.state_flags |= StateFlags::INITIAL;
                }
                if data.state.restarting {
                    record.state_flags |= StateFlags::RESTARTING;
                }
                if base == BaseState::Present && !data.state.restarting && data.state.exit_code != 0
                {
                    record.state_flags |= StateFlags::NONRECOVERABLE;
                }
                record
            }
        };

        if force_update.contains(&config_id) {
            record.state_flags |= StateFlags::FORCED_RESET;
        }
        if !is_target {
            record = record.as_dependent();
        }

        if self.kind == GeneratorKind::Update {
            if let Some(data) = &inspect {
                self.apply_update_comparison(daemon, &mut record, config_name, instance, assignment, data)
                    .await?;
            }
        }

        Ok(record)
    }

    async fn apply_update_comparison(
        &self,
        daemon: &dyn DaemonClient,
        record: &mut ConfigState,
        config_name: &str,
        instance: Option<&str>,
        assignment: &ContainerAssignment,
        observed: &ContainerInspect,
    ) -> MapResult<()> {
        if let Some(image_ref) = self.policy.image_name(assignment) {
            let resolved = daemon
                .pull_image(&image_ref)
                .await
                .map_err(|e| MapError::daemon(record.config_id.clone(), e))?;
            if resolved != observed.image_id {
                record.state_flags |= StateFlags::IMAGE_MISMATCH;
            }
            record.extra_data.resolved_image_id = Some(resolved);
        }

        if mounts_mismatch(self.map, assignment, observed) {
            record.state_flags |= StateFlags::VOLUME_MISMATCH;
        }
        if misc_mismatch(assignment, observed) {
            record.state_flags |= StateFlags::MISC_MISMATCH;
        }

        if !assignment.exec_commands.is_empty() {
            let cname = self.policy.cname(config_name, instance);
            let top = daemon
                .top(&cname)
                .await
                .map_err(|e| MapError::daemon(record.config_id.clone(), e))?;
            record.extra_data.exec_commands = assignment
                .exec_commands
                .iter()
                .cloned()
                .map(|command| {
                    let already_run = top.iter().any(|entry| entry.cmd == command.cmd);
                    ExecCommandState {
                        command,
                        already_run,
                    }
                })
                .collect();
        }

        Ok(())
    }

    async fn network_state(
        &self,
        daemon: &dyn DaemonClient,
        name: &str,
        is_target: bool,
    ) -> MapResult<ConfigState> {
        let config_id = MapConfigId::network(&self.map.name, name);
        let networks = daemon
            .list_networks()
            .await
            .map_err(|e| MapError::daemon(config_id.clone(), e))?;
        let existing = networks.iter().find(|n| n.name == name);
        let mut record = match existing {
            Some(found) => {
                let mut record = ConfigState::new(config_id, BaseState::Present);
                record.daemon_id = Some(found.id.clone());
                record
            }
            None => ConfigState::new(config_id, BaseState::Absent),
        };
        if !is_target {
            record = record.as_dependent();
        }
        Ok(record)
    }

    async fn volume_state(
        &self,
        daemon: &dyn DaemonClient,
        owner_config_name: &str,
        alias: &str,
        is_target: bool,
    ) -> MapResult<ConfigState> {
        let config_id = MapConfigId::volume(&self.map.name, owner_config_name, alias);
        let cname = self.policy.iname(owner_config_name, alias);
        let inspect = daemon
            .inspect_container(&cname)
            .await
            .map_err(|e| MapError::daemon(config_id.clone(), e))?;
        let mut record = match &inspect {
            None => ConfigState::new(config_id.clone(), BaseState::Absent),
            Some(data) => {
                let base = if data.state.running {
                    BaseState::Running
                } else {
                    BaseState::Present
                };
                let mut record = ConfigState::new(config_id.clone(), base);
                record.daemon_id = Some(data.id.clone());
                record
            }
        };
        if !is_target {
            record = record.as_dependent();
        }
        Ok(record)
    }
}

fn mounts_mismatch(
    map: &ContainerMap,
    assignment: &ContainerAssignment,
    observed: &ContainerInspect,
) -> bool {
    for bind in &assignment.binds {
        let (container_path, readonly) = match bind {
            Bind::Alias { alias, readonly } => match map.volumes.get(alias) {
                Some(path) => (path.clone(), *readonly),
                None => continue,
            },
            Bind::Explicit {
                container_path,
                readonly,
                ..
            } => (container_path.clone(), *readonly),
        };
        let found = observed
            .mounts
            .iter()
            .any(|m| m.destination == container_path && m.read_write == !readonly);
        if !found {
            return true;
        }
    }

    let attached = map.attached_owners();
    for uses in &assignment.uses {
        if !attached.contains_key(&uses.name) {
            continue; // `uses` of a plain container, not an attached volume
        }
        let Some(container_path) = map.volumes.get(&uses.name) else {
            continue;
        };
        let found = observed
            .mounts
            .iter()
            .any(|m| m.destination == *container_path && m.read_write == !uses.readonly);
        if !found {
            return true;
        }
    }
    false
}

fn misc_mismatch(assignment: &ContainerAssignment, observed: &ContainerInspect) -> bool {
    for (key, value) in &assignment.environment {
        let expected = format!("{key}={value}");
        if !observed.env.contains(&expected) {
            return true;
        }
    }
    if let Some(command) = &assignment.command {
        if command != &observed.command {
            return true;
        }
    }
    if let Some(entrypoint) = &assignment.entrypoint {
        if entrypoint != &observed.entrypoint {
            return true;
        }
    }
    for expose in &assignment.exposes {
        let found = observed.ports.iter().any(|p| {
            p.container_port == expose.container_port
                && expose.host_port.is_none_or(|hp| hp == p.host_port)
        });
        if !found {
            return true;
        }
    }
    for network in &assignment.networks {
        if !observed.networks.iter().any(|n| n == network) {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fleet::daemon_fake::{FakeContainerBuilder, FakeDaemonClient};
    use crate::fleet::input::{RawAssignment, RawDocument, RawMap};

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
    async fn absent_container_reports_absent_base_state() {
        let map = single_container_map();
        let generator = StateGenerator::new(&map, GeneratorKind::Single).unwrap();
        let daemon = FakeDaemonClient::new();
        let states = generator
            .generate(&daemon, "redis", &HashSet::new())
            .await
            .unwrap();
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].base_state, BaseState::Absent);
        assert!(!states[0].state_flags.needs_reset());
    }

    #[tokio::test]
    async fn running_container_with_no_mismatch_reports_running() {
        let map = single_container_map();
        let generator = StateGenerator::new(&map, GeneratorKind::Single).unwrap();
        let daemon = FakeDaemonClient::new();
        daemon.seed_container(
            "main.redis",
            FakeContainerBuilder::new("abc123", "img1")
                .running("2024-01-01T00:00:00Z")
                .build(),
        );
        let states = generator
            .generate(&daemon, "redis", &HashSet::new())
            .await
            .unwrap();
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].base_state, BaseState::Running);
        assert!(!states[0].state_flags.needs_reset());
    }

    #[tokio::test]
    async fn forced_reset_is_flagged_when_requested() {
        let map = single_container_map();
        let generator = StateGenerator::new(&map, GeneratorKind::Single).unwrap();
        let daemon = FakeDaemonClient::new();
        daemon.seed_container(
            "main.redis",
            FakeContainerBuilder::new("abc123", "img1")
                .running("2024-01-01T00:00:00Z")
                .build(),
        );
        let mut force_update = HashSet::new();
        force_update.insert(MapConfigId::container("main", "redis", None));
        let states = generator
            .generate(&daemon, "redis", &force_update)
            .await
            .unwrap();
        assert!(states[0].state_flags.contains(StateFlags::FORCED_RESET));
        assert!(states[0].state_flags.needs_reset());
    }

    #[tokio::test]
    async fn update_detects_image_mismatch() {
        let map = single_container_map();
        let generator = StateGenerator::new(&map, GeneratorKind::Update).unwrap();
        let daemon = FakeDaemonClient::new();
        daemon.seed_container(
            "main.redis",
            FakeContainerBuilder::new("abc123", "old-image-id")
                .running("2024-01-01T00:00:00Z")
                .build(),
        );
        daemon.seed_image("redis:latest", "new-image-id");
        let states = generator
            .generate(&daemon, "redis", &HashSet::new())
            .await
            .unwrap();
        assert!(states[0].state_flags.contains(StateFlags::IMAGE_MISMATCH));
        assert!(states[0].state_flags.needs_reset());
    }

    #[tokio::test]
    async fn dependency_path_emits_dependency_before_target() {
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
        let daemon = FakeDaemonClient::new();
        let states = generator
            .generate(&daemon, "server", &HashSet::new())
            .await
            .unwrap();
        assert_eq!(states.len(), 2);
        assert_eq!(states[0].config_id.config_name, "redis");
        assert!(states[0].config_flags.contains(crate::fleet::state::ConfigFlags::DEPENDENT));
        assert_eq!(states[1].config_id.config_name, "server");
        assert!(!states[1].config_flags.contains(crate::fleet::state::ConfigFlags::DEPENDENT));
    }
}
