//! Declarative container-fleet orchestration: parse a map of containers,
//! volumes, and networks; diff it against one or more live daemons; and
//! drive each object to its declared state.
//!
//! The pipeline is a straight line from a parsed [`map::ContainerMap`]
//! through [`resolver::ContainerDependencyResolver`] and
//! [`state_gen::StateGenerator`] to [`runner::Runner`], with
//! [`engine::run_pass`] fanning the whole thing out across named clients.

pub mod actions;
pub mod assignment;
pub mod daemon;
pub mod daemon_cli;
pub mod daemon_fake;
pub mod engine;
pub mod error;
pub mod id;
pub mod input;
pub mod map;
pub mod options;
pub mod policy;
pub mod resolver;
pub mod runner;
pub mod state;
pub mod state_gen;

pub use actions::{Action, ActionGenerator, ActionKind};
pub use assignment::{ContainerAssignment, NetworkAssignment};
pub use daemon::{
    ContainerInspect, ContainerSummary, CreateContainerArgs, DaemonClient, ImageSummary,
    NetworkSummary, ObservedMount, ObservedPort, ObservedState, TopEntry,
};
pub use daemon_cli::CliDaemonClient;
pub use daemon_fake::{FakeContainerBuilder, FakeDaemonClient};
pub use engine::{run_pass, ClientSet};
pub use error::{MapError, MapResult};
pub use id::{ConfigType, MapConfigId};
pub use map::{ContainerMap, DepNode};
pub use options::PassOptions;
pub use policy::Policy;
pub use resolver::ContainerDependencyResolver;
pub use runner::{ObjectReport, PassReport, Runner};
pub use state::{BaseState, ConfigFlags, ConfigState, StateFlags};
pub use state_gen::{GeneratorKind, StateGenerator};
