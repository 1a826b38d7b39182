//! Generic transitive-closure dependency resolver (§4.1).
//!
//! Operates on any hashable, cloneable node type plus a direct-edge map;
//! `ContainerDependencyResolver` below specializes it to [`crate::fleet::map::DepNode`].

use crate::fleet::error::MapError;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// Resolves transitive dependency (or dependent) paths over a fixed edge set,
/// memoizing each node's resolved path the first time it is computed.
pub struct DependencyResolver<T: Eq + Hash + Clone> {
    direct: HashMap<T, Vec<T>>,
    memo: RefCell<HashMap<T, Vec<T>>>,
}

impl<T: Eq + Hash + Clone + std::fmt::Debug + std::fmt::Display> DependencyResolver<T> {
    /// Build a resolver from an explicit `(node, direct_deps)` edge list.
    /// `items` order is preserved for deterministic first-seen ordering (§8).
    #[must_use]
    pub fn new(items: Vec<(T, Vec<T>)>) -> Self {
        let mut direct = HashMap::new();
        for (node, deps) in items {
            direct.entry(node).or_insert(deps);
        }
        Self {
            direct,
            memo: RefCell::new(HashMap::new()),
        }
    }

    /// Build the resolver fed the inverse edge set (used-by rather than uses),
    /// for backward/"dependent" traversal.
    #[must_use]
    pub fn inverted(items: &[(T, Vec<T>)]) -> Self {
        let mut inverse: HashMap<T, Vec<T>> = HashMap::new();
        for (node, _) in items {
            inverse.entry(node.clone()).or_default();
        }
        for (node, deps) in items {
            for dep in deps {
                inverse.entry(dep.clone()).or_default().push(node.clone());
            }
        }
        Self {
            direct: inverse,
            memo: RefCell::new(HashMap::new()),
        }
    }

    /// The ordered, duplicate-free list of dependencies transitively
    /// reachable from `node`, parents preceding children, each node appearing
    /// at most once (first-seen order preserved).
    pub fn get_dependencies(&self, node: &T) -> Result<Vec<T>, MapError> {
        if let Some(cached) = self.memo.borrow().get(node) {
            return Ok(cached.clone());
        }
        let mut stack = vec![node.clone()];
        let path = self.resolve(node, &mut stack)?;
        self.memo.borrow_mut().insert(node.clone(), path.clone());
        Ok(path)
    }

    fn resolve(&self, node: &T, stack: &mut Vec<T>) -> Result<Vec<T>, MapError> {
        let mut ordered = Vec::new();
        let mut seen = HashSet::new();
        let direct_deps = self.direct.get(node).cloned().unwrap_or_default();

        for parent in &direct_deps {
            if parent == node {
                continue; // self-reference is ignored, not a cycle (§4.1)
            }
            if stack.contains(parent) {
                let mut cycle_path: Vec<String> =
                    stack.iter().map(std::string::ToString::to_string).collect();
                cycle_path.push(parent.to_string());
                return Err(MapError::CircularDependency { path: cycle_path });
            }
            if seen.insert(parent.clone()) {
                ordered.push(parent.clone());
            }
            stack.push(parent.clone());
            let grandparents = self.resolve(parent, stack)?;
            stack.pop();
            for grandparent in grandparents {
                if seen.insert(grandparent.clone()) {
                    ordered.push(grandparent);
                }
            }
        }
        Ok(ordered)
    }
}

/// `merge_dependency_paths`: collapse a set of per-target dependency paths so
/// that no returned path contains another returned root (§8).
pub fn merge_dependency_paths<T: Eq + Hash + Clone>(
    paths: Vec<(T, Vec<T>)>,
) -> Vec<(T, Vec<T>)> {
    let roots: HashSet<T> = paths.iter().map(|(root, _)| root.clone()).collect();
    let mut covered: HashSet<T> = HashSet::new();
    let mut result = Vec::new();

    for (root, path) in paths {
        let path_set: HashSet<T> = path.iter().cloned().collect();
        // If another requested root is reachable from this one, absorb it:
        // this path already reconciles that root's subgraph too.
        let absorbs_other_root = roots
            .iter()
            .any(|other| other != &root && path_set.contains(other));
        if covered.contains(&root) {
            continue;
        }
        if absorbs_other_root {
            for other in &roots {
                if other != &root && path_set.contains(other) {
                    covered.insert(other.clone());
                }
            }
        }
        result.push((root, path));
    }

    result
        .into_iter()
        .filter(|(root, _)| !covered.contains(root))
        .collect()
}

/// Specializes [`DependencyResolver`] for container/volume/network edges,
/// built directly from a [`crate::fleet::map::ContainerMap`].
pub struct ContainerDependencyResolver {
    forward: DependencyResolver<crate::fleet::map::DepNode>,
    backward: DependencyResolver<crate::fleet::map::DepNode>,
}

impl ContainerDependencyResolver {
    /// Build both the forward (`uses`/`links`/networks) and backward
    /// (used-by) resolvers from a map's dependency items.
    pub fn new(map: &crate::fleet::map::ContainerMap) -> Result<Self, MapError> {
        let items = map.dependency_items()?;
        Ok(Self {
            backward: DependencyResolver::inverted(&items),
            forward: DependencyResolver::new(items),
        })
    }

    /// Forward closure: everything `node` depends on, dependency-first.
    pub fn dependencies_of(
        &self,
        node: &crate::fleet::map::DepNode,
    ) -> Result<Vec<crate::fleet::map::DepNode>, MapError> {
        self.forward.get_dependencies(node)
    }

    /// Backward closure: everything that depends on `node`, dependent-last
    /// (i.e. in the same "parents first" order but over inverted edges, so
    /// iterating in reverse gives a teardown-safe order).
    pub fn dependents_of(
        &self,
        node: &crate::fleet::map::DepNode,
    ) -> Result<Vec<crate::fleet::map::DepNode>, MapError> {
        self.backward.get_dependencies(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fleet::map::DepNode;
    use proptest::prelude::*;

    fn node(name: &str) -> DepNode {
        DepNode::Container(name.to_string())
    }

    #[test]
    fn resolves_parents_before_children_no_duplicates() {
        let items = vec![
            (node("sub_sub_svc"), vec![]),
            (node("sub_svc"), vec![node("sub_sub_svc")]),
            (node("svc"), vec![node("sub_svc")]),
            (node("server"), vec![node("svc"), node("sub_svc")]),
        ];
        let resolver = DependencyResolver::new(items);
        let deps = resolver.get_dependencies(&node("server")).unwrap();
        assert_eq!(
            deps,
            vec![node("svc"), node("sub_svc"), node("sub_sub_svc")]
        );
    }

    #[test]
    fn detects_cycle() {
        let items = vec![(node("a"), vec![node("b")]), (node("b"), vec![node("a")])];
        let resolver = DependencyResolver::new(items);
        let err = resolver.get_dependencies(&node("a")).unwrap_err();
        assert!(matches!(err, MapError::CircularDependency { .. }));
    }

    #[test]
    fn self_reference_is_ignored() {
        let items = vec![(node("a"), vec![node("a")])];
        let resolver = DependencyResolver::new(items);
        let deps = resolver.get_dependencies(&node("a")).unwrap();
        assert!(deps.is_empty());
    }

    #[test]
    fn merge_absorbs_path_contained_roots() {
        let paths = vec![
            (node("redis.cache"), vec![]),
            (
                node("server"),
                vec![node("redis"), node("redis.cache"), node("svc")],
            ),
        ];
        let merged = merge_dependency_paths(paths);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].0, node("server"));
    }

    #[test]
    fn merge_keeps_independent_subgraphs() {
        let paths = vec![
            (node("a"), vec![node("x")]),
            (node("b"), vec![node("y")]),
        ];
        let merged = merge_dependency_paths(paths);
        assert_eq!(merged.len(), 2);
    }

    proptest! {
        // §8: "get_dependency_path(X) is stable under reordering of direct_deps
        // lists that preserves set equality" — shuffling each node's declared
        // dependency order must not change the resolved path for any node.
        #[test]
        fn dependency_path_is_stable_under_direct_deps_reordering(seed in 0u64..10_000) {
            let base_items = vec![
                (node("d"), vec![]),
                (node("c"), vec![node("d")]),
                (node("b"), vec![node("c"), node("d")]),
                (node("a"), vec![node("b"), node("c")]),
            ];
            let baseline = DependencyResolver::new(base_items.clone());
            let expected = baseline.get_dependencies(&node("a")).unwrap();

            let mut shuffled = base_items;
            // deterministic pseudo-shuffle from `seed`, since Math.random-style
            // sources aren't available; reverses each node's own dep list when
            // the corresponding seed bit is set.
            for (index, (_, deps)) in shuffled.iter_mut().enumerate() {
                if (seed >> index) & 1 == 1 {
                    deps.reverse();
                }
            }
            let resolver = DependencyResolver::new(shuffled);
            let actual = resolver.get_dependencies(&node("a")).unwrap();
            prop_assert_eq!(actual, expected);
        }
    }
}
