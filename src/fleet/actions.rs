//! State → action mapping (§4.3): the strategy table that decides, for a
//! single [`ConfigState`], which daemon operations the runner must issue and
//! in what order.

use crate::fleet::id::ConfigType;
use crate::fleet::state::{BaseState, ConfigState, StateFlags};

/// A single daemon operation the runner can issue against one object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    /// `POST /containers/create` (or an attached-volume equivalent).
    Create,
    /// `POST /containers/{name}/start`.
    Start,
    /// `POST /containers/{name}/stop`.
    Stop,
    /// `POST /containers/{name}/kill`.
    Kill,
    /// `POST /containers/{name}/wait`.
    Wait,
    /// `DELETE /containers/{name}`.
    Remove,
    /// `POST /containers/{name}/exec`.
    ExecCreate,
    /// `POST /exec/{id}/start`.
    ExecStart,
    /// `POST /networks/create`.
    CreateNetwork,
}

/// One queued action. `exec_index` indexes into the state's
/// `extra_data.exec_commands` for the two exec action kinds; it is
/// meaningless for every other kind.
#[derive(Debug, Clone, Copy)]
pub struct Action {
    /// Which operation to perform.
    pub kind: ActionKind,
    /// Index into `extra_data.exec_commands`, for `ExecCreate`/`ExecStart`.
    pub exec_index: Option<usize>,
}

impl Action {
    fn plain(kind: ActionKind) -> Self {
        Self {
            kind,
            exec_index: None,
        }
    }
}

/// Computes the ordered action list for a single [`ConfigState`], per the
/// table in §4.3. Attached volumes use the same container-lifecycle table as
/// regular containers (they only ever reach `ABSENT`/`PRESENT`, never need a
/// reset in the Update sense, and never carry exec commands), except that a
/// volume's `PRESENT` state is its expected steady state and takes no action.
pub struct ActionGenerator;

impl ActionGenerator {
    /// The actions due for `state`, in execution order.
    #[must_use]
    pub fn actions_for(state: &ConfigState) -> Vec<Action> {
        match state.config_id.config_type {
            ConfigType::Network => Self::network_actions(state),
            ConfigType::Container | ConfigType::Volume => Self::container_actions(state),
        }
    }

    fn network_actions(state: &ConfigState) -> Vec<Action> {
        match state.base_state {
            BaseState::Absent => vec![Action::plain(ActionKind::CreateNetwork)],
            BaseState::Present | BaseState::Running => Vec::new(),
        }
    }

    fn container_actions(state: &ConfigState) -> Vec<Action> {
        let mut actions = Vec::new();
        let needs_reset = state.state_flags.needs_reset();

        match state.base_state {
            BaseState::Absent => {
                actions.push(Action::plain(ActionKind::Create));
                actions.push(Action::plain(ActionKind::Start));
            }
            BaseState::Running => {
                if needs_reset {
                    actions.push(Action::plain(ActionKind::Stop));
                    actions.push(Action::plain(ActionKind::Remove));
                    actions.push(Action::plain(ActionKind::Create));
                    actions.push(Action::plain(ActionKind::Start));
                } else if state.state_flags.contains(StateFlags::MISC_MISMATCH) {
                    actions.push(Action::plain(ActionKind::Stop));
                    actions.push(Action::plain(ActionKind::Start));
                }
            }
            BaseState::Present => {
                if needs_reset {
                    actions.push(Action::plain(ActionKind::Remove));
                    actions.push(Action::plain(ActionKind::Create));
                    actions.push(Action::plain(ActionKind::Start));
                } else if state.config_id.config_type != ConfigType::Volume {
                    // An attached volume's PRESENT state (exited cleanly) is
                    // its expected steady state, not a stopped container
                    // waiting to be started (§4.2).
                    actions.push(Action::plain(ActionKind::Start));
                }
            }
        }

        if state.config_id.config_type == ConfigType::Container {
            let ends_up_running =
                matches!(state.base_state, BaseState::Running) || !actions.is_empty();
            if ends_up_running {
                for (index, exec) in state.extra_data.exec_commands.iter().enumerate() {
                    if !exec.already_run {
                        actions.push(Action {
                            kind: ActionKind::ExecCreate,
                            exec_index: Some(index),
                        });
                        actions.push(Action {
                            kind: ActionKind::ExecStart,
                            exec_index: Some(index),
                        });
                    }
                }
            }
        }

        actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fleet::id::MapConfigId;

    fn state(base: BaseState, flags: StateFlags) -> ConfigState {
        let mut s = ConfigState::new(MapConfigId::container("main", "redis", None), base);
        s.state_flags = flags;
        s
    }

    #[test]
    fn absent_creates_then_starts() {
        let actions = ActionGenerator::actions_for(&state(BaseState::Absent, StateFlags::empty()));
        assert_eq!(
            actions.iter().map(|a| a.kind).collect::<Vec<_>>(),
            vec![ActionKind::Create, ActionKind::Start]
        );
    }

    #[test]
    fn running_clean_does_nothing() {
        let actions =
            ActionGenerator::actions_for(&state(BaseState::Running, StateFlags::empty()));
        assert!(actions.is_empty());
    }

    #[test]
    fn running_misc_mismatch_restarts_in_place() {
        let actions = ActionGenerator::actions_for(&state(
            BaseState::Running,
            StateFlags::MISC_MISMATCH,
        ));
        assert_eq!(
            actions.iter().map(|a| a.kind).collect::<Vec<_>>(),
            vec![ActionKind::Stop, ActionKind::Start]
        );
    }

    #[test]
    fn running_needs_reset_tears_down_and_recreates() {
        let actions = ActionGenerator::actions_for(&state(
            BaseState::Running,
            StateFlags::IMAGE_MISMATCH,
        ));
        assert_eq!(
            actions.iter().map(|a| a.kind).collect::<Vec<_>>(),
            vec![
                ActionKind::Stop,
                ActionKind::Remove,
                ActionKind::Create,
                ActionKind::Start
            ]
        );
    }

    #[test]
    fn present_clean_only_starts() {
        let actions =
            ActionGenerator::actions_for(&state(BaseState::Present, StateFlags::empty()));
        assert_eq!(
            actions.iter().map(|a| a.kind).collect::<Vec<_>>(),
            vec![ActionKind::Start]
        );
    }

    #[test]
    fn present_volume_takes_no_action() {
        let mut s = ConfigState::new(
            MapConfigId::volume("main", "redis", "redis_socket"),
            BaseState::Present,
        );
        s.state_flags = StateFlags::empty();
        let actions = ActionGenerator::actions_for(&s);
        assert!(actions.is_empty());
    }

    #[test]
    fn present_needs_reset_recreates() {
        let actions = ActionGenerator::actions_for(&state(
            BaseState::Present,
            StateFlags::FORCED_RESET,
        ));
        assert_eq!(
            actions.iter().map(|a| a.kind).collect::<Vec<_>>(),
            vec![ActionKind::Remove, ActionKind::Create, ActionKind::Start]
        );
    }

    #[test]
    fn pending_exec_commands_run_after_start_actions() {
        use crate::fleet::input::{ExecCommand, ExecPolicy};
        use crate::fleet::state::ExecCommandState;

        let mut s = state(BaseState::Running, StateFlags::empty());
        s.extra_data.exec_commands.push(ExecCommandState {
            command: ExecCommand {
                user: None,
                cmd: "/opt/init".to_string(),
                policy: ExecPolicy::Initial,
            },
            already_run: false,
        });
        let actions = ActionGenerator::actions_for(&s);
        assert_eq!(
            actions.iter().map(|a| a.kind).collect::<Vec<_>>(),
            vec![ActionKind::ExecCreate, ActionKind::ExecStart]
        );
        assert_eq!(actions[0].exec_index, Some(0));
    }
}
