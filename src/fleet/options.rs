//! Per-pass configuration options (§6).

use crate::fleet::id::MapConfigId;
use std::collections::HashSet;

/// Options controlling a single reconciliation pass. Construct with
/// [`PassOptions::default`] and adjust with the builder methods, or set
/// fields directly — this type is deliberately a plain struct (no hidden
/// state) so a host CLI can hydrate it from flags or a config file.
#[derive(Debug, Clone, Default)]
pub struct PassOptions {
    /// Objects to force-reset this pass regardless of observed state.
    pub force_update: HashSet<MapConfigId>,
    /// Abort the whole pass on the first action failure, rather than
    /// isolating the failure to the failing object's subgraph.
    pub abort_on_error: bool,
    /// Remove attached volumes during a teardown pass.
    pub remove_attached: bool,
    /// Remove user-defined networks during a teardown pass.
    pub remove_networks: bool,
    /// Pull the resolved image before every `create`, even outside Update.
    pub pull_before_create: bool,
    /// Restrict the pass to these client names; `None` runs against every
    /// client an assignment routes to.
    pub clients: Option<Vec<String>>,
}

impl PassOptions {
    /// Start from the defaults (no force-update, isolate failures, no teardown).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Force-reset the given objects this pass.
    #[must_use]
    pub fn with_force_update(mut self, ids: impl IntoIterator<Item = MapConfigId>) -> Self {
        self.force_update = ids.into_iter().collect();
        self
    }

    /// Abort the entire pass on the first failure instead of isolating it.
    #[must_use]
    pub fn with_abort_on_error(mut self, abort: bool) -> Self {
        self.abort_on_error = abort;
        self
    }

    /// Restrict the pass to the named clients.
    #[must_use]
    pub fn with_clients(mut self, clients: impl IntoIterator<Item = String>) -> Self {
        self.clients = Some(clients.into_iter().collect());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_isolate_failures_and_run_everywhere() {
        let options = PassOptions::new();
        assert!(!options.abort_on_error);
        assert!(options.clients.is_none());
        assert!(options.force_update.is_empty());
    }

    #[test]
    fn with_clients_restricts_routing() {
        let options = PassOptions::new().with_clients(["east".to_string(), "west".to_string()]);
        assert_eq!(
            options.clients,
            Some(vec!["east".to_string(), "west".to_string()])
        );
    }
}
