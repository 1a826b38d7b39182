//! # fleetctl
//!
//! A declarative container-fleet orchestrator: describe the containers,
//! attached volumes, and networks a deployment needs as a map, and drive one
//! or more container daemons toward that map.
//!
//! ## Architecture
//!
//! - [`fleet::map`] — the parsed declarative model (`ContainerMap`) and its
//!   integrity checker
//! - [`fleet::resolver`] — transitive dependency/dependent resolution over
//!   the map's container/network graph
//! - [`fleet::state_gen`] — diffs the declared map against a live daemon,
//!   producing one [`fleet::state::ConfigState`] per object
//! - [`fleet::actions`] — maps a `ConfigState` to the ordered daemon
//!   operations due for it
//! - [`fleet::runner`] — executes those operations, isolating a failed
//!   object's subgraph from the rest of the pass
//! - [`fleet::engine`] — fans a single `(target, action)` pass out across
//!   every named client concurrently and merges the results
//! - [`fleet::daemon`] — the abstract daemon control surface, implemented by
//!   [`fleet::daemon_cli::CliDaemonClient`] (the real `docker` CLI) and
//!   [`fleet::daemon_fake::FakeDaemonClient`] (an in-memory test double)
//!
//! The lower-level [`client`], [`executor`], and [`errors`] modules are the
//! process-execution pipeline the CLI daemon client is built on.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use fleetctl::{CliDaemonClient, ContainerMap, GeneratorKind, PassOptions, Runner, StateGenerator};
//!
//! # async fn run() -> fleetctl::MapResult<()> {
//! let map = ContainerMap::from_yaml_str(
//!     "main:\n  redis:\n    image: redis\n",
//!     "main",
//! )?;
//! map.check_integrity()?;
//!
//! let client = fleetctl::DockerClient::new().await.map_err(|e| {
//!     fleetctl::MapError::daemon(fleetctl::MapConfigId::container("main", "redis", None), e)
//! })?;
//! let daemon = CliDaemonClient::new(client);
//!
//! let generator = StateGenerator::new(&map, GeneratorKind::Update)?;
//! let runner = Runner::new(&map)?;
//! let states = generator
//!     .generate(&daemon, "redis", &Default::default())
//!     .await?;
//! let report = runner.run(&daemon, &states, &PassOptions::new()).await?;
//! assert!(!report.has_failures());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod client;
pub mod errors;
pub mod executor;
pub mod fleet;
mod utils;

pub use client::{DockerClient, DockerInfo, DockerVersion};
pub use errors::{DockerError, DockerResult};
pub use fleet::{
    Action, ActionGenerator, ActionKind, BaseState, CliDaemonClient, ClientSet, ConfigFlags,
    ConfigState, ConfigType, ContainerAssignment, ContainerDependencyResolver, ContainerInspect,
    ContainerMap, ContainerSummary, CreateContainerArgs, DaemonClient, DepNode,
    FakeContainerBuilder, FakeDaemonClient, GeneratorKind, ImageSummary, MapConfigId, MapError,
    MapResult, NetworkAssignment, NetworkSummary, ObjectReport, ObservedMount, ObservedPort,
    ObservedState, PassOptions, PassReport, Policy, Runner, StateFlags, StateGenerator, TopEntry,
    run_pass,
};

/// The version of this crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The minimum supported Docker version.
pub const MIN_DOCKER_VERSION: &str = "20.10.0";

/// Default timeout for daemon operations that don't declare their own.
pub const DEFAULT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_info() {
        assert!(!VERSION.is_empty());
        assert!(!MIN_DOCKER_VERSION.is_empty());
    }

    #[test]
    fn test_timeout_constants() {
        assert!(DEFAULT_TIMEOUT > std::time::Duration::from_secs(0));
    }
}
