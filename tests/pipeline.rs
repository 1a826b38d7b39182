//! End-to-end exercise of the resolver/state-generator/runner/engine
//! pipeline against a [`FakeDaemonClient`], matching the teacher's
//! one-integration-file-per-concern `tests/` convention.

use fleetctl::{
    run_pass, ClientSet, ContainerMap, DaemonClient, FakeDaemonClient, GeneratorKind, PassOptions,
};
use std::collections::HashMap;
use std::sync::{Arc, Once};

static INIT: Once = Once::new();

fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });
}

const MAP_YAML: &str = "\
main:
  host:
    data: /srv/app-data
  volumes:
    data: /var/lib/app
  redis:
    image: redis
    attaches: [data]
  server:
    image: myapp/server
    uses:
      - name: data
    links:
      - target: redis
    exposes:
      - container_port: 8080
        host_port: 8080
";

#[tokio::test]
async fn fresh_map_reconciles_target_and_its_dependency() {
    init_tracing();

    let map = ContainerMap::from_yaml_str(MAP_YAML, "main").unwrap();
    map.check_integrity().unwrap();
    let map = Arc::new(map);

    let mut clients: ClientSet = HashMap::new();
    clients.insert(
        "__default__".to_string(),
        Arc::new(FakeDaemonClient::new()) as Arc<dyn DaemonClient>,
    );

    let reports = run_pass(
        Arc::clone(&map),
        &clients,
        GeneratorKind::Dependency,
        "server",
        &PassOptions::new(),
    )
    .await
    .unwrap();

    assert_eq!(reports.len(), 1);
    let report = &reports[0];
    assert!(!report.has_failures());
    // Both the attached data volume (server's dependency) and server itself
    // must have been created and started; ordering puts the dependency first.
    let names: Vec<&str> = report
        .objects
        .iter()
        .map(|o| o.config_id.config_name.as_str())
        .collect();
    assert!(names.contains(&"redis"));
    assert!(names.contains(&"server"));
    assert!(names.iter().position(|n| *n == "redis") < names.iter().position(|n| *n == "server"));
}

#[tokio::test]
async fn repeated_pass_against_unchanged_state_is_a_no_op() {
    init_tracing();

    let map = ContainerMap::from_yaml_str(MAP_YAML, "main").unwrap();
    let map = Arc::new(map);

    let mut clients: ClientSet = HashMap::new();
    clients.insert(
        "__default__".to_string(),
        Arc::new(FakeDaemonClient::new()) as Arc<dyn DaemonClient>,
    );

    let options = PassOptions::new();
    run_pass(
        Arc::clone(&map),
        &clients,
        GeneratorKind::Update,
        "server",
        &options,
    )
    .await
    .unwrap();

    let second = run_pass(
        Arc::clone(&map),
        &clients,
        GeneratorKind::Update,
        "server",
        &options,
    )
    .await
    .unwrap();

    assert!(second[0]
        .objects
        .iter()
        .all(|o| o.actions_taken.is_empty()));
}
