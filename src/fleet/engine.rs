//! Top-level reconciliation pass (§2, §5): given a parsed map, a registry of
//! named clients, and `(target, action)`, resolve the target's state on
//! every client it routes to concurrently and merge the per-client reports.
//!
//! Each client's pass runs as its own `tokio` task; the caller awaits all of
//! them via a `JoinSet` rather than reconciling clients one at a time, so a
//! slow or stuck client never blocks the others (§5 "independent targets,
//! not a scheduler").

use crate::fleet::daemon::DaemonClient;
use crate::fleet::error::{MapError, MapResult};
use crate::fleet::map::ContainerMap;
use crate::fleet::options::PassOptions;
use crate::fleet::policy::{Policy, DEFAULT_CLIENT};
use crate::fleet::runner::{PassReport, Runner};
use crate::fleet::state_gen::{GeneratorKind, StateGenerator};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{info_span, Instrument};

/// Named daemon clients a pass can target; a map's assignments route to a
/// subset of these by name, or to [`DEFAULT_CLIENT`] when unset.
pub type ClientSet = HashMap<String, Arc<dyn DaemonClient>>;

/// Run one reconciliation pass for `target_config_name` against every client
/// its assignment routes to (or the subset named in `options.clients`),
/// merging each client's [`PassReport`] once all finish.
pub async fn run_pass(
    map: Arc<ContainerMap>,
    clients: &ClientSet,
    kind: GeneratorKind,
    target_config_name: &str,
    options: &PassOptions,
) -> MapResult<Vec<PassReport>> {
    let target_clients = resolve_target_clients(&map, target_config_name, clients, options);

    let mut tasks: JoinSet<MapResult<PassReport>> = JoinSet::new();
    for client_name in target_clients {
        let Some(daemon) = clients.get(&client_name).cloned() else {
            continue;
        };
        let map = Arc::clone(&map);
        let target = target_config_name.to_string();
        let options = options.clone();
        let span = info_span!("pass", map = %map.name, client = %client_name, ?kind);

        tasks.spawn(
            async move {
                let generator = StateGenerator::new(&map, kind)?;
                let runner = Runner::new(&map)?;
                let states = generator
                    .generate(daemon.as_ref(), &target, &options.force_update)
                    .await?;
                let mut report = runner.run(daemon.as_ref(), &states, &options).await?;
                report.client = client_name;
                Ok(report)
            }
            .instrument(span),
        );
    }

    let mut reports = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        let report = joined.map_err(|e| MapError::Integrity {
            message: format!("client task panicked: {e}"),
        })??;
        reports.push(report);
    }
    Ok(reports)
}

fn resolve_target_clients(
    map: &ContainerMap,
    target_config_name: &str,
    clients: &ClientSet,
    options: &PassOptions,
) -> Vec<String> {
    let policy = Policy::new(map);
    let mut routed: Vec<String> = map
        .get_existing(target_config_name)
        .map(|assignment| {
            policy
                .clients_for(assignment)
                .into_iter()
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_else(|| vec![DEFAULT_CLIENT.to_string()]);

    if let Some(restrict) = &options.clients {
        routed.retain(|name| restrict.contains(name));
    }
    routed.retain(|name| clients.contains_key(name));
    routed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fleet::daemon_fake::FakeDaemonClient;
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
    async fn default_routing_reconciles_against_the_single_registered_client() {
        let map = Arc::new(single_container_map());
        let mut clients: ClientSet = HashMap::new();
        clients.insert(
            DEFAULT_CLIENT.to_string(),
            Arc::new(FakeDaemonClient::new()) as Arc<dyn DaemonClient>,
        );

        let reports = run_pass(
            map,
            &clients,
            GeneratorKind::Single,
            "redis",
            &PassOptions::new(),
        )
        .await
        .unwrap();

        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].client, DEFAULT_CLIENT);
        assert!(!reports[0].has_failures());
    }

    #[tokio::test]
    async fn restricting_clients_skips_unlisted_ones() {
        let map = Arc::new(single_container_map());
        let mut clients: ClientSet = HashMap::new();
        clients.insert(
            DEFAULT_CLIENT.to_string(),
            Arc::new(FakeDaemonClient::new()) as Arc<dyn DaemonClient>,
        );
        clients.insert(
            "east".to_string(),
            Arc::new(FakeDaemonClient::new()) as Arc<dyn DaemonClient>,
        );

        let options = PassOptions::new().with_clients(["east".to_string()]);
        let reports = run_pass(map, &clients, GeneratorKind::Single, "redis", &options)
            .await
            .unwrap();

        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].client, "east");
    }
}
