//! # Remap State Machine
//!
//! Interactive rebinding of one action to whatever input the operator
//! touches next.
//!
//! ```text
//! Idle --arm--> Armed --(button press | axis movement)--> commit --> Idle
//!                 |--cancel / timeout---------------------------> Idle
//! ```
//!
//! ## Detection
//!
//! - **Buttons**: first index (ascending) whose pressed flag or analog value
//!   exceeds 0.5 and that was not pressed in the previously published
//!   snapshot. The button used to start remapping therefore cannot bind itself.
//! - **Axes**: first index (ascending) that moved more than 0.7 away from its
//!   reading at arm time. Deltas are used because rest positions differ
//!   between devices (triggers rest at -1.0).
//!
//! Buttons are checked before axes when the action accepts both.

use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::actions::{ActionCatalog, ActionKey, ActionKind, InputKind};
use super::device::RawDeviceState;
use super::mapping::{Assignment, Mapping, MappingTable};
use super::snapshot::{InputId, Snapshot, BUTTON_PRESS_THRESHOLD};
use crate::error::{RelayPilotError, Result};

/// Minimum axis travel from the arm-time reading that counts as a selection.
pub const AXIS_DETECT_DELTA: f32 = 0.7;

/// An armed remap request.
#[derive(Debug, Clone, PartialEq)]
pub struct RemapSession {
    pub target: ActionKey,
    /// Input kinds the detectors look for.
    pub filter: ActionKind,
    /// Axis readings when the session was armed.
    pub baseline: Vec<f32>,
    pub armed_at: Instant,
}

/// Current state of the remap workflow.
#[derive(Debug, Clone, PartialEq)]
pub enum RemapState {
    Idle,
    Armed(RemapSession),
}

/// What a remap step did.
#[derive(Debug, Clone, PartialEq)]
pub enum RemapEvent {
    /// Nothing armed.
    Idle,
    /// Armed, no qualifying input yet.
    Waiting,
    /// New mapping committed; the machine is idle again.
    Committed {
        action: ActionKey,
        input: InputId,
        assignment: Assignment,
    },
    /// Session expired without input; the table is unchanged.
    TimedOut { action: ActionKey },
}

/// Drives remap sessions against poll ticks.
#[derive(Debug)]
pub struct RemapStateMachine {
    state: RemapState,
    timeout: Option<Duration>,
}

impl Default for RemapStateMachine {
    fn default() -> Self {
        Self::new(None)
    }
}

impl RemapStateMachine {
    /// Creates an idle machine. `None` keeps sessions armed until cancelled.
    #[must_use]
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            state: RemapState::Idle,
            timeout,
        }
    }

    #[must_use]
    pub fn state(&self) -> &RemapState {
        &self.state
    }

    #[must_use]
    pub fn session(&self) -> Option<&RemapSession> {
        match &self.state {
            RemapState::Armed(session) => Some(session),
            RemapState::Idle => None,
        }
    }

    #[must_use]
    pub fn is_armed(&self) -> bool {
        matches!(self.state, RemapState::Armed(_))
    }

    /// Arms a session for `action`.
    ///
    /// An already armed session is cancelled first and its target returned.
    ///
    /// # Arguments
    ///
    /// * `preferred` - Restrict detection to one input kind; defaults to the action's kind
    /// * `snapshot` - Current snapshot, its axes become the movement baseline
    ///
    /// # Errors
    ///
    /// `UnknownAction` if the catalog has no such action.
    pub fn arm(
        &mut self,
        catalog: &ActionCatalog,
        action: ActionKey,
        preferred: Option<InputKind>,
        snapshot: &Snapshot,
        now: Instant,
    ) -> Result<Option<ActionKey>> {
        let info = catalog
            .get(action)
            .ok_or_else(|| RelayPilotError::UnknownAction(action.to_string()))?;

        let replaced = self.cancel().map(|session| session.target);
        let filter = preferred.map_or(info.kind, ActionKind::from);

        info!("Now listening for {:?} input for action {}", filter, action);
        self.state = RemapState::Armed(RemapSession {
            target: action,
            filter,
            baseline: snapshot.axis_values.clone(),
            armed_at: now,
        });
        Ok(replaced)
    }

    /// Drops the armed session without touching any mapping.
    pub fn cancel(&mut self) -> Option<RemapSession> {
        match std::mem::replace(&mut self.state, RemapState::Idle) {
            RemapState::Armed(session) => {
                info!("Cancelling remap of {}", session.target);
                Some(session)
            }
            RemapState::Idle => None,
        }
    }

    /// Runs detection for one tick and commits a detected input into `table`.
    ///
    /// # Arguments
    ///
    /// * `raw` - This tick's raw readings, `None` while disconnected
    /// * `previous` - Snapshot published before this tick (button debounce)
    pub fn step(
        &mut self,
        catalog: &ActionCatalog,
        table: &mut MappingTable,
        raw: Option<&RawDeviceState>,
        previous: &Snapshot,
        now: Instant,
    ) -> RemapEvent {
        let Some(session) = self.session() else {
            return RemapEvent::Idle;
        };

        if let Some(timeout) = self.timeout {
            if now.saturating_duration_since(session.armed_at) >= timeout {
                let action = session.target;
                self.cancel();
                info!("Remap of {} timed out after {:?}", action, timeout);
                return RemapEvent::TimedOut { action };
            }
        }

        let Some(raw) = raw else {
            return RemapEvent::Waiting;
        };
        let Some(input) = detect(session, raw, previous) else {
            return RemapEvent::Waiting;
        };

        let action = session.target;
        self.state = RemapState::Idle;
        let assignment = commit(catalog, table, action, input);
        info!("Remapping complete: {} -> {}", action, input);

        RemapEvent::Committed {
            action,
            input,
            assignment,
        }
    }
}

/// Finds the input the operator selected this tick, if any.
#[must_use]
pub fn detect(session: &RemapSession, raw: &RawDeviceState, previous: &Snapshot) -> Option<InputId> {
    if session.filter.accepts(InputKind::Button) {
        let pressed = raw.buttons.iter().enumerate().find(|(i, button)| {
            let engaged = button.pressed || button.value > BUTTON_PRESS_THRESHOLD;
            // Debounce: held since the previous snapshot
            engaged && !previous.is_pressed(InputId::button(*i))
        });
        if let Some((index, button)) = pressed {
            debug!(
                "Button {} detected for {} (pressed={}, value={})",
                index, session.target, button.pressed, button.value
            );
            return Some(InputId::button(index));
        }
    }

    if session.filter.accepts(InputKind::Axis) {
        for (index, current) in raw.axes.iter().enumerate() {
            let initial = session.baseline.get(index).copied().unwrap_or(0.0);
            let change = (current - initial).abs();
            if change > AXIS_DETECT_DELTA {
                debug!(
                    "Axis {} moved from {} to {} (change: {}) for {}",
                    index, initial, current, change, session.target
                );
                return Some(InputId::axis(index));
            }
        }
    }

    None
}

/// Binds `action` to `input` with conflict resolution.
///
/// Axis bindings get the action's default axis config.
pub fn commit(catalog: &ActionCatalog, table: &mut MappingTable, action: ActionKey, input: InputId) -> Assignment {
    let index = i32::try_from(input.index).unwrap_or(i32::MAX);
    let mapping = match input.kind {
        InputKind::Button => Mapping::button(index),
        InputKind::Axis => Mapping::axis(
            index,
            catalog
                .get(action)
                .map(|a| a.default_axis_config())
                .unwrap_or_default(),
        ),
    };
    table.assign(catalog, action, mapping)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::calibration::{AxisConfig, NormalizeMode};
    use crate::controller::device::ButtonState;
    use crate::controller::mapping::UNMAPPED;

    fn raw(axes: Vec<f32>, pressed: &[usize]) -> RawDeviceState {
        let mut buttons = vec![ButtonState::default(); 17];
        for &i in pressed {
            buttons[i] = ButtonState::digital(true);
        }
        RawDeviceState { buttons, axes }
    }

    fn snap(state: &RawDeviceState) -> Snapshot {
        Snapshot::from_raw(state, Instant::now())
    }

    struct Fixture {
        catalog: ActionCatalog,
        table: MappingTable,
        machine: RemapStateMachine,
    }

    impl Fixture {
        fn new(timeout: Option<Duration>) -> Self {
            let catalog = ActionCatalog::standard();
            let table = MappingTable::defaults(&catalog);
            Self {
                catalog,
                table,
                machine: RemapStateMachine::new(timeout),
            }
        }

        fn arm(&mut self, action: ActionKey, preferred: Option<InputKind>, at: &RawDeviceState) {
            self.machine
                .arm(&self.catalog, action, preferred, &snap(at), Instant::now())
                .unwrap();
        }

        fn step(&mut self, current: &RawDeviceState, previous: &RawDeviceState) -> RemapEvent {
            self.machine.step(
                &self.catalog,
                &mut self.table,
                Some(current),
                &snap(previous),
                Instant::now(),
            )
        }
    }

    #[test]
    fn test_idle_step_does_nothing() {
        let mut fx = Fixture::new(None);
        let rest = raw(vec![0.0; 4], &[]);
        assert_eq!(fx.step(&rest, &rest), RemapEvent::Idle);
    }

    #[test]
    fn test_turn_defaults_to_axis_and_commits_axis_0() {
        let mut fx = Fixture::new(None);
        let rest = raw(vec![0.0; 4], &[]);
        fx.arm(ActionKey::Turn, None, &rest);
        assert_eq!(fx.machine.session().unwrap().filter, ActionKind::Axis);

        // Buttons are ignored for an axis-only action
        let pressed = raw(vec![0.0; 4], &[0]);
        assert_eq!(fx.step(&pressed, &rest), RemapEvent::Waiting);

        let moved = raw(vec![0.9, 0.0, 0.0, 0.0], &[]);
        match fx.step(&moved, &rest) {
            RemapEvent::Committed { action, input, .. } => {
                assert_eq!(action, ActionKey::Turn);
                assert_eq!(input, InputId::axis(0));
            }
            other => panic!("Expected commit, got: {:?}", other),
        }
        assert!(!fx.machine.is_armed());
        let turn = fx.table.get(ActionKey::Turn).unwrap();
        assert_eq!(turn.index, 0);
        assert_eq!(turn.axis_config, Some(AxisConfig::default()));
    }

    #[test]
    fn test_axis_uses_delta_from_baseline() {
        let mut fx = Fixture::new(None);
        // Trigger resting at -1.0 on axis 4
        let rest = raw(vec![0.0, 0.0, 0.0, 0.0, -1.0], &[]);
        fx.arm(ActionKey::TurnCameraX, None, &rest);

        let small = raw(vec![0.0, 0.0, 0.0, 0.0, -0.4], &[]);
        assert_eq!(fx.step(&small, &rest), RemapEvent::Waiting);

        let pulled = raw(vec![0.0, 0.0, 0.0, 0.0, 0.0], &[]);
        match fx.step(&pulled, &rest) {
            RemapEvent::Committed { input, .. } => assert_eq!(input, InputId::axis(4)),
            other => panic!("Expected commit, got: {:?}", other),
        }
    }

    #[test]
    fn test_lower_axis_wins_on_simultaneous_movement() {
        let mut fx = Fixture::new(None);
        let rest = raw(vec![0.0; 4], &[]);
        fx.arm(ActionKey::TurnCameraY, None, &rest);

        let moved = raw(vec![0.0, 0.0, 0.95, -0.95], &[]);
        match fx.step(&moved, &rest) {
            RemapEvent::Committed { input, .. } => assert_eq!(input, InputId::axis(2)),
            other => panic!("Expected commit, got: {:?}", other),
        }
    }

    #[test]
    fn test_held_button_is_debounced() {
        let mut fx = Fixture::new(None);
        let held = raw(vec![0.0; 4], &[5]);
        fx.arm(ActionKey::Use, None, &held);

        // Still held on the next tick: not a new press
        assert_eq!(fx.step(&held, &held), RemapEvent::Waiting);

        let released = raw(vec![0.0; 4], &[]);
        assert_eq!(fx.step(&released, &held), RemapEvent::Waiting);

        match fx.step(&held, &released) {
            RemapEvent::Committed { input, .. } => assert_eq!(input, InputId::button(5)),
            other => panic!("Expected commit, got: {:?}", other),
        }
        assert_eq!(*fx.table.get(ActionKey::Use).unwrap(), Mapping::button(5));
    }

    #[test]
    fn test_lowest_new_button_wins() {
        let mut fx = Fixture::new(None);
        let rest = raw(vec![0.0; 4], &[1]);
        fx.arm(ActionKey::Use, None, &rest);

        // 1 is still held, 3 and 7 are new
        let pressed = raw(vec![0.0; 4], &[1, 3, 7]);
        match fx.step(&pressed, &rest) {
            RemapEvent::Committed { input, .. } => assert_eq!(input, InputId::button(3)),
            other => panic!("Expected commit, got: {:?}", other),
        }
    }

    #[test]
    fn test_analog_button_value_counts() {
        let mut fx = Fixture::new(None);
        let rest = raw(vec![0.0; 4], &[]);
        fx.arm(ActionKey::Use, None, &rest);

        let mut half = rest.clone();
        half.buttons[7] = ButtonState::new(false, 0.5);
        assert_eq!(fx.step(&half, &rest), RemapEvent::Waiting);

        let mut deep = rest.clone();
        deep.buttons[7] = ButtonState::new(false, 0.8);
        match fx.step(&deep, &rest) {
            RemapEvent::Committed { input, .. } => assert_eq!(input, InputId::button(7)),
            other => panic!("Expected commit, got: {:?}", other),
        }
    }

    #[test]
    fn test_both_prefers_button_over_axis() {
        let mut fx = Fixture::new(None);
        let rest = raw(vec![0.0; 4], &[]);
        fx.arm(ActionKey::Accelerate, None, &rest);
        assert_eq!(fx.machine.session().unwrap().filter, ActionKind::Both);

        let both = raw(vec![0.0, 0.0, 0.0, 0.9], &[6]);
        match fx.step(&both, &rest) {
            RemapEvent::Committed { input, .. } => assert_eq!(input, InputId::button(6)),
            other => panic!("Expected commit, got: {:?}", other),
        }
        assert_eq!(*fx.table.get(ActionKey::Accelerate).unwrap(), Mapping::button(6));
    }

    #[test]
    fn test_preferred_kind_overrides_action_kind() {
        let mut fx = Fixture::new(None);
        let rest = raw(vec![0.0; 4], &[]);
        fx.arm(ActionKey::Accelerate, Some(InputKind::Axis), &rest);

        // Button ignored under an axis preference
        assert_eq!(fx.step(&raw(vec![0.0; 4], &[6]), &rest), RemapEvent::Waiting);

        match fx.step(&raw(vec![0.0, 0.0, 0.0, -0.8], &[]), &rest) {
            RemapEvent::Committed { input, .. } => assert_eq!(input, InputId::axis(3)),
            other => panic!("Expected commit, got: {:?}", other),
        }
        let accelerate = fx.table.get(ActionKey::Accelerate).unwrap();
        assert_eq!(
            accelerate.axis_config,
            Some(AxisConfig::new(-1.0, 0.0, true, NormalizeMode::Positive))
        );
        // turnCameraY held axis 3 and does not share with accelerate
        assert_eq!(fx.table.get(ActionKey::TurnCameraY).unwrap().index, UNMAPPED);
    }

    #[test]
    fn test_commit_clears_conflicting_button() {
        let mut fx = Fixture::new(None);
        let rest = raw(vec![0.0; 4], &[]);
        fx.arm(ActionKey::Brake, Some(InputKind::Button), &rest);

        match fx.step(&raw(vec![0.0; 4], &[2]), &rest) {
            RemapEvent::Committed { assignment, .. } => {
                assert_eq!(assignment.cleared, vec![ActionKey::Use]);
            }
            other => panic!("Expected commit, got: {:?}", other),
        }
        assert_eq!(fx.table.get(ActionKey::Use).unwrap().index, UNMAPPED);
        assert_eq!(fx.table.get(ActionKey::Brake).unwrap().index, 2);
    }

    #[test]
    fn test_cancel_leaves_table_untouched() {
        let mut fx = Fixture::new(None);
        let before = fx.table.clone();
        let rest = raw(vec![0.0; 4], &[]);
        fx.arm(ActionKey::Turn, None, &rest);

        let session = fx.machine.cancel().unwrap();
        assert_eq!(session.target, ActionKey::Turn);
        assert!(fx.machine.cancel().is_none());

        assert_eq!(fx.step(&raw(vec![1.0; 4], &[]), &rest), RemapEvent::Idle);
        assert_eq!(fx.table, before);
    }

    #[test]
    fn test_rearming_cancels_previous_session() {
        let mut fx = Fixture::new(None);
        let rest = raw(vec![0.0; 4], &[]);
        let snapshot = snap(&rest);
        let now = Instant::now();

        let first = fx.machine.arm(&fx.catalog, ActionKey::Turn, None, &snapshot, now).unwrap();
        assert_eq!(first, None);
        let second = fx.machine.arm(&fx.catalog, ActionKey::Use, None, &snapshot, now).unwrap();
        assert_eq!(second, Some(ActionKey::Turn));
        assert_eq!(fx.machine.session().unwrap().target, ActionKey::Use);
    }

    #[test]
    fn test_arm_unknown_action_fails() {
        let catalog = ActionCatalog::new([]);
        let mut machine = RemapStateMachine::default();
        let snapshot = Snapshot::disconnected(Instant::now());
        let result = machine.arm(&catalog, ActionKey::Turn, None, &snapshot, Instant::now());
        assert!(matches!(result, Err(RelayPilotError::UnknownAction(_))));
        assert!(!machine.is_armed());
    }

    #[test]
    fn test_waits_while_disconnected() {
        let mut fx = Fixture::new(None);
        let rest = raw(vec![0.0; 4], &[]);
        fx.arm(ActionKey::Turn, None, &rest);
        let event = fx.machine.step(
            &fx.catalog,
            &mut fx.table,
            None,
            &Snapshot::disconnected(Instant::now()),
            Instant::now(),
        );
        assert_eq!(event, RemapEvent::Waiting);
        assert!(fx.machine.is_armed());
    }

    #[test]
    fn test_timeout_cancels_session() {
        let catalog = ActionCatalog::standard();
        let mut table = MappingTable::defaults(&catalog);
        let before = table.clone();
        let mut machine = RemapStateMachine::new(Some(Duration::from_secs(5)));
        let rest = raw(vec![0.0; 4], &[]);
        let snapshot = snap(&rest);
        let armed_at = Instant::now();

        machine.arm(&catalog, ActionKey::Turn, None, &snapshot, armed_at).unwrap();
        let early = machine.step(&catalog, &mut table, Some(&rest), &snapshot, armed_at + Duration::from_secs(4));
        assert_eq!(early, RemapEvent::Waiting);

        let moved = raw(vec![0.9, 0.0, 0.0, 0.0], &[]);
        let late = machine.step(&catalog, &mut table, Some(&moved), &snapshot, armed_at + Duration::from_secs(5));
        assert_eq!(late, RemapEvent::TimedOut { action: ActionKey::Turn });
        assert!(!machine.is_armed());
        assert_eq!(table, before);
    }

    #[test]
    fn test_baseline_shorter_than_axes() {
        let session = RemapSession {
            target: ActionKey::Turn,
            filter: ActionKind::Axis,
            baseline: vec![0.0; 2],
            armed_at: Instant::now(),
        };
        let previous = Snapshot::disconnected(Instant::now());
        // Missing baseline entries count as 0.0
        let current = raw(vec![0.0, 0.0, 0.0, 0.75], &[]);
        assert_eq!(detect(&session, &current, &previous), Some(InputId::axis(3)));
    }
}
