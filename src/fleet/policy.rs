//! Name formatting, image resolution, hostname derivation, and per-client
//! routing (§4.3).

use crate::fleet::assignment::ContainerAssignment;
use crate::fleet::map::ContainerMap;

/// The client name used when an assignment doesn't declare `clients`.
pub const DEFAULT_CLIENT: &str = "__default__";

/// Computes names and routing decisions for a single [`ContainerMap`].
pub struct Policy<'a> {
    map: &'a ContainerMap,
}

impl<'a> Policy<'a> {
    /// Wrap a map for policy computations.
    #[must_use]
    pub fn new(map: &'a ContainerMap) -> Self {
        Self { map }
    }

    /// The daemon-visible name for a container (or instance). Delegates to
    /// [`ContainerMap::cname`].
    #[must_use]
    pub fn cname(&self, config_name: &str, instance: Option<&str>) -> String {
        self.map.cname(config_name, instance)
    }

    /// The daemon-visible name for an attached volume. Delegates to
    /// [`ContainerMap::iname`].
    #[must_use]
    pub fn iname(&self, owner_config_name: &str, alias: &str) -> String {
        self.map.iname(owner_config_name, alias)
    }

    /// Resolve an assignment's declared image to the fully-qualified
    /// reference the daemon should pull/run, per §4.3.
    #[must_use]
    pub fn image_name(&self, assignment: &ContainerAssignment) -> Option<String> {
        let declared = assignment.image.as_ref()?;
        let has_registry_or_repo = declared.contains('/')
            || self
                .map
                .repository
                .as_deref()
                .is_some_and(|repo| declared.starts_with(repo));
        let qualified = if has_registry_or_repo {
            declared.clone()
        } else if let Some(repository) = &self.map.repository {
            format!("{repository}/{declared}")
        } else {
            declared.clone()
        };
        let qualified = if qualified.contains(':') {
            qualified
        } else {
            format!("{qualified}:latest")
        };
        Some(qualified)
    }

    /// Derive a stable DNS-safe hostname for a link alias: dots become
    /// dashes, matching the kept CLI layer's naming conventions elsewhere.
    #[must_use]
    pub fn hostname(&self, container_ref: &str) -> String {
        container_ref.replace('.', "-")
    }

    /// The clients an assignment's actions should run against: the named
    /// list, or the single default client.
    #[must_use]
    pub fn clients_for<'b>(&self, assignment: &'b ContainerAssignment) -> Vec<&'b str> {
        match &assignment.clients {
            Some(clients) if !clients.is_empty() => {
                clients.iter().map(String::as_str).collect()
            }
            _ => vec![DEFAULT_CLIENT],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fleet::input::RawAssignment;

    fn map_with_repo(repo: Option<&str>) -> ContainerMap {
        ContainerMap {
            name: "main".to_string(),
            repository: repo.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn image_name_prefixes_bare_reference_with_repository() {
        let map = map_with_repo(Some("myregistry.example.com"));
        let policy = Policy::new(&map);
        let assignment = ContainerAssignment::from(RawAssignment {
            image: Some("redis".to_string()),
            ..Default::default()
        });
        assert_eq!(
            policy.image_name(&assignment),
            Some("myregistry.example.com/redis:latest".to_string())
        );
    }

    #[test]
    fn image_name_leaves_slashed_reference_alone() {
        let map = map_with_repo(Some("myregistry.example.com"));
        let policy = Policy::new(&map);
        let assignment = ContainerAssignment::from(RawAssignment {
            image: Some("library/redis:7".to_string()),
            ..Default::default()
        });
        assert_eq!(
            policy.image_name(&assignment),
            Some("library/redis:7".to_string())
        );
    }

    #[test]
    fn hostname_replaces_dots_with_dashes() {
        let map = map_with_repo(None);
        let policy = Policy::new(&map);
        assert_eq!(policy.hostname("redis.cache"), "redis-cache");
    }

    #[test]
    fn clients_for_defaults_when_unset() {
        let map = map_with_repo(None);
        let policy = Policy::new(&map);
        let assignment = ContainerAssignment::default();
        assert_eq!(policy.clients_for(&assignment), vec![DEFAULT_CLIENT]);
    }
}
