//! The `ConfigState` record and its bitmask flags (§4.2).

use crate::fleet::id::MapConfigId;
use crate::fleet::input::ExecCommand;
use bitflags::bitflags;
use std::collections::HashMap;

/// The coarse lifecycle state of an inspected object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseState {
    /// No container exists under this name.
    Absent,
    /// The container exists but is not running.
    Present,
    /// The container exists and is running.
    Running,
}

bitflags! {
    /// Per-object condition flags, each set independently of the others (§4.2).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StateFlags: u16 {
        /// `StartedAt == INITIAL_START_TIME` — never started.
        const INITIAL = 0b0000_0001;
        /// Currently in the restart-backoff loop.
        const RESTARTING = 0b0000_0010;
        /// Present, not running, not restarting, exited with a nonzero code.
        const NONRECOVERABLE = 0b0000_0100;
        /// Update only: running image id differs from the declared tag's resolved id.
        const IMAGE_MISMATCH = 0b0000_1000;
        /// Update only: an observed mount doesn't match what's declared.
        const VOLUME_MISMATCH = 0b0001_0000;
        /// Update only: env/command/entrypoint/ports/links/networks diverge.
        const MISC_MISMATCH = 0b0010_0000;
        /// The target's id was in the pass's `force_update` set.
        const FORCED_RESET = 0b0100_0000;
    }
}

impl StateFlags {
    /// The bits that together mean "this object must be torn down and
    /// recreated", per §4.2's `NEEDS_RESET` alias.
    #[must_use]
    pub fn needs_reset_mask() -> StateFlags {
        StateFlags::VOLUME_MISMATCH
            | StateFlags::IMAGE_MISMATCH
            | StateFlags::FORCED_RESET
            | StateFlags::NONRECOVERABLE
    }

    /// Whether any of the `needs_reset_mask()` bits are set.
    #[must_use]
    pub fn needs_reset(self) -> bool {
        self.intersects(Self::needs_reset_mask())
    }
}

bitflags! {
    /// Flags describing a state record's role in the current pass, independent
    /// of its lifecycle state.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ConfigFlags: u8 {
        /// This record is a transitive dependency of the requested target,
        /// not the target itself.
        const DEPENDENT = 0b0000_0001;
    }
}

/// One `(user, cmd)` exec command paired with whether an identical entry was
/// already observed via `top` (§4.2 "extra_data").
#[derive(Debug, Clone)]
pub struct ExecCommandState {
    /// The declared command.
    pub command: ExecCommand,
    /// Whether this command already appears in the container's `top` output.
    pub already_run: bool,
}

/// Arbitrary per-state payload the runner needs but the resolver/state
/// generator don't otherwise carry in a strongly typed field.
#[derive(Debug, Clone, Default)]
pub struct ExtraData {
    /// Commands pending execution, paired with whether they already ran.
    pub exec_commands: Vec<ExecCommandState>,
    /// Resolved image id used for `IMAGE_MISMATCH` comparison, when available.
    pub resolved_image_id: Option<String>,
    /// Free-form extension point mirroring the source's open-ended `extra_data` map.
    pub fields: HashMap<String, String>,
}

/// One emission of the state generator for a single [`MapConfigId`] (§4.2).
#[derive(Debug, Clone)]
pub struct ConfigState {
    /// The object this record describes.
    pub config_id: MapConfigId,
    /// Coarse lifecycle state.
    pub base_state: BaseState,
    /// Condition flags.
    pub state_flags: StateFlags,
    /// Role-in-pass flags.
    pub config_flags: ConfigFlags,
    /// Daemon-assigned id, if the object exists.
    pub daemon_id: Option<String>,
    /// Extra per-state payload.
    pub extra_data: ExtraData,
}

impl ConfigState {
    /// Build a bare state record with no flags set.
    #[must_use]
    pub fn new(config_id: MapConfigId, base_state: BaseState) -> Self {
        Self {
            config_id,
            base_state,
            state_flags: StateFlags::empty(),
            config_flags: ConfigFlags::empty(),
            daemon_id: None,
            extra_data: ExtraData::default(),
        }
    }

    /// Mark this record as a dependency of the pass's original target.
    #[must_use]
    pub fn as_dependent(mut self) -> Self {
        self.config_flags |= ConfigFlags::DEPENDENT;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn needs_reset_follows_mask() {
        assert!(StateFlags::IMAGE_MISMATCH.needs_reset());
        assert!(StateFlags::FORCED_RESET.needs_reset());
        assert!(StateFlags::NONRECOVERABLE.needs_reset());
        assert!(StateFlags::VOLUME_MISMATCH.needs_reset());
        assert!(!StateFlags::MISC_MISMATCH.needs_reset());
        assert!(!StateFlags::RESTARTING.needs_reset());
        assert!(!StateFlags::empty().needs_reset());
    }

    #[test]
    fn combined_flags_still_detect_reset() {
        let flags = StateFlags::MISC_MISMATCH | StateFlags::IMAGE_MISMATCH;
        assert!(flags.needs_reset());
    }
}
