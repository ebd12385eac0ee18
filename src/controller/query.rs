//! # Action Query Layer
//!
//! Answers "is this action active" and "what is its value" from a mapping
//! table and a snapshot. Pure reads; a disconnected snapshot degrades every
//! answer to inactive / zero.

use super::actions::{ActionKey, InputKind};
use super::mapping::{Mapping, MappingTable};
use super::snapshot::{InputId, Snapshot};

/// Axis magnitude above which an axis-bound action counts as active.
pub const AXIS_ACTIVE_THRESHOLD: f32 = 0.2;

/// Read-only view over one mapping table and one snapshot.
#[derive(Debug, Clone, Copy)]
pub struct ActionQuery<'a> {
    table: &'a MappingTable,
    snapshot: &'a Snapshot,
}

impl<'a> ActionQuery<'a> {
    #[must_use]
    pub fn new(table: &'a MappingTable, snapshot: &'a Snapshot) -> Self {
        Self { table, snapshot }
    }

    /// Mapping of an action if it is bound to an input.
    fn bound(&self, action: ActionKey) -> Option<(&'a Mapping, usize)> {
        let mapping = self.table.get(action)?;
        mapping.input_index().map(|index| (mapping, index))
    }

    /// Whether the action's input is engaged.
    ///
    /// Buttons: pressed. Axes: `|value| > 0.2`.
    #[must_use]
    pub fn is_active(&self, action: ActionKey) -> bool {
        if !self.snapshot.connected {
            return false;
        }
        let Some((mapping, index)) = self.bound(action) else {
            return false;
        };
        match mapping.kind {
            InputKind::Button => self.snapshot.is_pressed(InputId::button(index)),
            InputKind::Axis => self.snapshot.axis(index).abs() > AXIS_ACTIVE_THRESHOLD,
        }
    }

    /// Normalized (or raw, with `apply_config = false`) axis value of an action.
    ///
    /// `None` if the action is not bound to an axis. Disconnected devices
    /// read as 0.0. An axis mapping without a config returns the raw value.
    #[must_use]
    pub fn value_of(&self, action: ActionKey, apply_config: bool) -> Option<f32> {
        let (mapping, index) = self.bound(action)?;
        if mapping.kind != InputKind::Axis {
            return None;
        }
        if !self.snapshot.connected {
            return Some(0.0);
        }

        let raw = self.snapshot.axis(index);
        match (&mapping.axis_config, apply_config) {
            (Some(cfg), true) => Some(cfg.normalize(raw)),
            _ => Some(raw),
        }
    }

    /// Unmodified axis reading of an axis-bound action.
    #[must_use]
    pub fn raw_value_of(&self, action: ActionKey) -> Option<f32> {
        self.value_of(action, false)
    }

    /// Action contribution as a number: 1.0/0.0 for buttons, normalized value for axes.
    ///
    /// Unbound actions contribute 0.0.
    #[must_use]
    pub fn magnitude_of(&self, action: ActionKey) -> f32 {
        match self.bound(action) {
            Some((mapping, _)) if mapping.kind == InputKind::Button => {
                if self.is_active(action) {
                    1.0
                } else {
                    0.0
                }
            }
            Some(_) => self.value_of(action, true).unwrap_or(0.0),
            None => 0.0,
        }
    }

    /// First action bound to a physical input.
    #[must_use]
    pub fn action_for_input(&self, kind: InputKind, index: usize) -> Option<ActionKey> {
        self.table.action_for_input(kind, index)
    }
}
