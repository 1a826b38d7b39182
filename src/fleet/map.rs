//! `ContainerMap`: the in-memory declarative model and its integrity checker.

use crate::fleet::assignment::{ContainerAssignment, NetworkAssignment};
use crate::fleet::error::{MapError, MapResult};
use crate::fleet::input::{Bind, RawDocument, RawMap};
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};

/// A dependency-graph node, tagged by kind so the resolver can operate over
/// containers and networks uniformly without subclassing (§9).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DepNode {
    /// A container, named by its bare `config_name` (never an instance suffix —
    /// the `ContainerDependencyResolver` always resolves at container
    /// granularity; instance expansion happens downstream in the state generator).
    Container(String),
    /// A network, named by its declared name.
    Network(String),
}

impl std::fmt::Display for DepNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Container(name) => write!(f, "{name}"),
            Self::Network(name) => write!(f, "{name}"),
        }
    }
}

/// One logical deployment: containers, their attached volumes, networks, and
/// the host/volume alias tables used to resolve bind mounts.
#[derive(Debug, Clone, Default)]
pub struct ContainerMap {
    /// The map's own name, used as the first component of every daemon name.
    pub name: String,
    /// Alias → host path template (may contain a `{instance}` placeholder).
    pub host: HashMap<String, String>,
    /// Alias → container path, for attached/bound volumes.
    pub volumes: HashMap<String, String>,
    /// Declared containers, in declaration order (order matters for deterministic tie-breaks, §8).
    pub containers: IndexMap<String, ContainerAssignment>,
    /// Declared networks, in declaration order.
    pub networks: IndexMap<String, NetworkAssignment>,
    /// Image repository prefix applied by the policy.
    pub repository: Option<String>,
    /// Whether attached-volume naming includes the parent container's name.
    pub use_attached_parent_name: bool,
}

impl ContainerMap {
    /// Parse a single map (already extends-merged) out of a raw document.
    pub fn from_document(doc: &RawDocument, map_name: &str) -> MapResult<Self> {
        let raw = merge_extends(doc, map_name, &mut HashSet::new())?;
        Ok(Self::from_raw(map_name, raw))
    }

    /// Parse `map_name` out of a YAML document (§10.3), following the
    /// kept layer's convention of deriving `Serialize`/`Deserialize` directly
    /// on domain types rather than hand-writing a parser.
    pub fn from_yaml_str(yaml: &str, map_name: &str) -> MapResult<Self> {
        let doc: RawDocument = serde_yaml::from_str(yaml).map_err(|e| MapError::Integrity {
            message: format!("invalid map document: {e}"),
        })?;
        Self::from_document(&doc, map_name)
    }

    /// Parse `map_name` out of a YAML file on disk.
    pub fn from_yaml_file(path: &std::path::Path, map_name: &str) -> MapResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| MapError::Integrity {
            message: format!("failed to read '{}': {e}", path.display()),
        })?;
        Self::from_yaml_str(&contents, map_name)
    }

    /// Resolve the host-side path for a bound volume alias, substituting the
    /// `{instance}` placeholder when `instance` is present (§3 "host").
    #[must_use]
    pub fn host_path(&self, alias: &str, instance: Option<&str>) -> Option<String> {
        let template = self.host.get(alias)?;
        Some(match instance {
            Some(instance) => template.replace("{instance}", instance),
            None => template.clone(),
        })
    }

    fn from_raw(map_name: &str, raw: RawMap) -> Self {
        let containers = raw
            .containers
            .into_iter()
            .map(|(name, assignment)| (name, ContainerAssignment::from(assignment)))
            .collect();
        let networks = raw
            .networks
            .into_iter()
            .map(|(name, network)| (name, NetworkAssignment::from(network)))
            .collect();
        Self {
            name: map_name.to_string(),
            host: raw.host.into_iter().collect(),
            volumes: raw.volumes.into_iter().collect(),
            containers,
            networks,
            repository: raw.repository,
            use_attached_parent_name: raw.use_attached_parent_name,
        }
    }

    /// Read-only lookup; the state pipeline must use this, never an
    /// auto-creating accessor (§9 "default-on-access containers").
    #[must_use]
    pub fn get_existing(&self, config_name: &str) -> Option<&ContainerAssignment> {
        self.containers.get(config_name)
    }

    /// Map of attached-volume alias → owning container's `config_name`,
    /// precomputed once per pass and reused by `dependency_items` and the
    /// state generator's mount comparison.
    #[must_use]
    pub fn attached_owners(&self) -> HashMap<String, String> {
        let mut owners = HashMap::new();
        for (config_name, assignment) in &self.containers {
            for alias in &assignment.attaches {
                owners.insert(alias.clone(), config_name.clone());
            }
        }
        owners
    }

    /// The daemon-visible name for a container (or one of its instances).
    #[must_use]
    pub fn cname(&self, config_name: &str, instance: Option<&str>) -> String {
        match instance {
            Some(instance) => format!("{}.{}.{}", self.name, config_name, instance),
            None => format!("{}.{}", self.name, config_name),
        }
    }

    /// The daemon-visible name for an attached volume, in one of two forms
    /// selected by `use_attached_parent_name`.
    #[must_use]
    pub fn iname(&self, owner_config_name: &str, alias: &str) -> String {
        if self.use_attached_parent_name {
            format!("{}.{}.{}", self.name, owner_config_name, alias)
        } else {
            format!("{}.{}", self.name, alias)
        }
    }

    /// Resolve a `uses`/`links` reference (`config_name` or
    /// `config_name.instance_name`) to the container `config_name` that owns
    /// it, rewriting attached-volume aliases to their owning container (§4.1).
    fn resolve_container_ref(
        &self,
        reference: &str,
        attached: &HashMap<String, String>,
    ) -> Option<String> {
        if let Some(owner) = attached.get(reference) {
            return Some(owner.clone());
        }
        let bare = reference.split('.').next().unwrap_or(reference);
        if self.containers.contains_key(bare) {
            Some(bare.to_string())
        } else {
            None
        }
    }

    /// Yield `(node, direct_deps)` pairs for every container, every instance
    /// of a multi-instance container, and the bare aggregate node (§4.1).
    pub fn dependency_items(&self) -> MapResult<Vec<(DepNode, Vec<DepNode>)>> {
        let attached = self.attached_owners();
        let mut items = Vec::new();

        for (config_name, assignment) in &self.containers {
            let mut deps: Vec<DepNode> = Vec::new();
            let mut seen = HashSet::new();

            for uses in &assignment.uses {
                let owner = attached
                    .get(&uses.name)
                    .map(String::as_str)
                    .or_else(|| {
                        uses.name
                            .split('.')
                            .next()
                            .filter(|bare| self.containers.contains_key(*bare))
                    })
                    .ok_or_else(|| MapError::MapKey {
                        map_name: self.name.clone(),
                        reference: uses.name.clone(),
                    })?;
                if owner != config_name.as_str() && seen.insert(owner.to_string()) {
                    deps.push(DepNode::Container(owner.to_string()));
                }
            }

            for link in &assignment.links {
                let owner = self
                    .resolve_container_ref(&link.target, &attached)
                    .ok_or_else(|| MapError::MapKey {
                        map_name: self.name.clone(),
                        reference: link.target.clone(),
                    })?;
                if &owner != config_name && seen.insert(owner.clone()) {
                    deps.push(DepNode::Container(owner));
                }
            }

            for network in &assignment.networks {
                deps.push(DepNode::Network(network.clone()));
            }

            if assignment.instances.is_empty() {
                items.push((DepNode::Container(config_name.clone()), deps));
            } else {
                for instance in &assignment.instances {
                    let node = DepNode::Container(format!("{config_name}.{instance}"));
                    items.push((node, deps.clone()));
                }
                items.push((DepNode::Container(config_name.clone()), deps));
            }
        }

        Ok(items)
    }

    /// Validate the five invariants of §3. Returns every violation found,
    /// rather than stopping at the first, so a caller sees the whole picture.
    pub fn check_integrity(&self) -> MapResult<()> {
        let mut problems = Vec::new();
        let attached = self.attached_owners();

        for (config_name, assignment) in &self.containers {
            for instance in assignment.instance_slots() {
                let cname = self.cname(config_name, instance.as_deref());
                if let Err(e) = crate::utils::validate_container_name(&cname) {
                    problems.push(format!("'{config_name}' produces invalid daemon name: {e}"));
                }
            }
            for alias in &assignment.attaches {
                let iname = self.iname(config_name, alias);
                if let Err(e) = crate::utils::validate_container_name(&iname) {
                    problems.push(format!("attached volume '{alias}' produces invalid daemon name: {e}"));
                }
            }
        }

        // 1. Unique shared/attached names.
        let mut name_counts: HashMap<String, u32> = HashMap::new();
        for (config_name, assignment) in &self.containers {
            if assignment.instances.is_empty() {
                *name_counts.entry(config_name.clone()).or_default() += 1;
            } else {
                for instance in &assignment.instances {
                    *name_counts
                        .entry(format!("{config_name}.{instance}"))
                        .or_default() += 1;
                }
            }
            for alias in &assignment.attaches {
                *name_counts.entry(alias.clone()).or_default() += 1;
            }
        }
        for (name, count) in &name_counts {
            if *count > 1 {
                problems.push(format!("duplicate shared/attached name '{name}'"));
            }
        }

        for (config_name, assignment) in &self.containers {
            // 2. `uses` resolves to a shared instance or attached alias.
            for uses in &assignment.uses {
                let resolves = attached.contains_key(&uses.name)
                    || self.reference_resolves(&uses.name);
                if !resolves {
                    problems.push(format!(
                        "container '{config_name}' uses undeclared reference '{}'",
                        uses.name
                    ));
                }
            }

            // 3. `binds` alias appears in `host`.
            for bind in &assignment.binds {
                if let Bind::Alias { alias, .. } = bind {
                    if !self.host.contains_key(alias) {
                        problems.push(format!(
                            "container '{config_name}' binds alias '{alias}' not present in host"
                        ));
                    }
                }
            }

            // 4. `attaches`/`binds` alias appears in `volumes`.
            for alias in &assignment.attaches {
                if !self.volumes.contains_key(alias) {
                    problems.push(format!(
                        "container '{config_name}' attaches alias '{alias}' not present in volumes"
                    ));
                }
            }
            for bind in &assignment.binds {
                if let Bind::Alias { alias, .. } = bind {
                    if !self.volumes.contains_key(alias) {
                        problems.push(format!(
                            "container '{config_name}' binds alias '{alias}' not present in volumes"
                        ));
                    }
                }
            }

            // 5. `links` target resolves to a declared container instance.
            for link in &assignment.links {
                if !self.reference_resolves(&link.target) {
                    problems.push(format!(
                        "container '{config_name}' links to undeclared target '{}'",
                        link.target
                    ));
                }
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(MapError::Integrity {
                message: problems.join("; "),
            })
        }
    }

    /// True if `reference` (`config_name` or `config_name.instance_name`)
    /// names a declared container instance.
    fn reference_resolves(&self, reference: &str) -> bool {
        if let Some((config_name, instance)) = reference.split_once('.') {
            self.containers
                .get(config_name)
                .is_some_and(|a| a.instances.iter().any(|i| i == instance))
        } else {
            self.containers.contains_key(reference)
        }
    }
}

/// Recursively merge a map's `extends` chain: parents are applied first, the
/// named map's own fields win on any key collision.
fn merge_extends(
    doc: &RawDocument,
    map_name: &str,
    visiting: &mut HashSet<String>,
) -> MapResult<RawMap> {
    if !visiting.insert(map_name.to_string()) {
        return Err(MapError::Integrity {
            message: format!("'extends' cycle involving map '{map_name}'"),
        });
    }
    let raw = doc.maps.get(map_name).ok_or_else(|| MapError::MapKey {
        map_name: map_name.to_string(),
        reference: map_name.to_string(),
    })?;

    let mut merged = RawMap::default();
    for parent in &raw.extends {
        let parent_merged = merge_extends(doc, parent, visiting)?;
        merged.host.extend(parent_merged.host);
        merged.volumes.extend(parent_merged.volumes);
        merged.networks.extend(parent_merged.networks);
        merged.containers.extend(parent_merged.containers);
    }

    merged.host.extend(raw.host.clone());
    merged.volumes.extend(raw.volumes.clone());
    merged.networks.extend(raw.networks.clone());
    merged.containers.extend(raw.containers.clone());
    merged.extends = raw.extends.clone();
    merged.repository = raw.repository.clone().or(merged.repository);
    merged.use_attached_parent_name = raw.use_attached_parent_name;

    visiting.remove(map_name);
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fleet::input::{ExposePort, LinkRef, RawAssignment};

    fn sample_document() -> RawDocument {
        let mut maps = std::collections::BTreeMap::new();
        let mut map = RawMap {
            use_attached_parent_name: true,
            ..Default::default()
        };
        map.host.insert("config_vol".to_string(), "/srv/config".to_string());
        map.volumes.insert("redis_socket".to_string(), "/var/run/redis".to_string());
        map.volumes.insert("config_vol".to_string(), "/etc/app".to_string());

        map.containers.insert(
            "redis".to_string(),
            RawAssignment {
                image: Some("redis".to_string()),
                instances: vec!["cache".to_string(), "queue".to_string()],
                attaches: vec!["redis_socket".to_string()],
                ..Default::default()
            },
        );
        map.containers.insert(
            "server".to_string(),
            RawAssignment {
                image: Some("server".to_string()),
                uses: vec![crate::fleet::input::UsesRef {
                    name: "redis.cache".to_string(),
                    readonly: true,
                }],
                links: vec![LinkRef {
                    target: "redis.cache".to_string(),
                    alias: None,
                }],
                exposes: vec![ExposePort {
                    container_port: 8080,
                    host_port: Some(80),
                }],
                ..Default::default()
            },
        );
        maps.insert("main".to_string(), map);
        RawDocument { maps }
    }

    #[test]
    fn integrity_passes_on_well_formed_map() {
        let doc = sample_document();
        let map = ContainerMap::from_document(&doc, "main").unwrap();
        assert!(map.check_integrity().is_ok());
    }

    #[test]
    fn integrity_flags_missing_bind_alias() {
        let mut doc = sample_document();
        doc.maps.get_mut("main").unwrap().containers.get_mut("server").unwrap().binds =
            vec![Bind::Alias {
                alias: "missing_vol".to_string(),
                readonly: true,
            }];
        let map = ContainerMap::from_document(&doc, "main").unwrap();
        let err = map.check_integrity().unwrap_err();
        assert!(err.to_string().contains("missing_vol"));
    }

    #[test]
    fn dependency_items_rewrites_attached_volume_to_owner() {
        let doc = sample_document();
        let map = ContainerMap::from_document(&doc, "main").unwrap();
        let items = map.dependency_items().unwrap();
        let server_deps = items
            .iter()
            .find(|(node, _)| matches!(node, DepNode::Container(n) if n == "server"))
            .map(|(_, deps)| deps.clone())
            .unwrap();
        assert_eq!(server_deps, vec![DepNode::Container("redis".to_string())]);
    }

    #[test]
    fn cname_formats_instance() {
        let doc = sample_document();
        let map = ContainerMap::from_document(&doc, "main").unwrap();
        assert_eq!(map.cname("redis", Some("cache")), "main.redis.cache");
        assert_eq!(map.cname("server", None), "main.server");
    }

    #[test]
    fn from_yaml_file_parses_a_map_from_disk() {
        use std::io::Write;

        let yaml = "main:\n  host:\n    config_vol: /srv/config\n  volumes:\n    config_vol: /etc/app\n  redis:\n    image: redis\n    attaches: []\n";
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();

        let map = ContainerMap::from_yaml_file(file.path(), "main").unwrap();
        assert_eq!(map.name, "main");
        assert_eq!(
            map.get_existing("redis").unwrap().image.as_deref(),
            Some("redis")
        );
        assert_eq!(map.host.get("config_vol").unwrap(), "/srv/config");
    }

    #[test]
    fn invalid_daemon_name_is_flagged() {
        let mut maps = std::collections::BTreeMap::new();
        let mut map = RawMap::default();
        map.containers.insert(
            "@bad".to_string(),
            RawAssignment {
                image: Some("redis".to_string()),
                ..Default::default()
            },
        );
        maps.insert("main".to_string(), map);
        let doc = RawDocument { maps };
        let map = ContainerMap::from_document(&doc, "main").unwrap();
        let err = map.check_integrity().unwrap_err();
        assert!(err.to_string().contains("invalid daemon name"));
    }
}
