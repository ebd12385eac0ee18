//! # Action Catalog
//!
//! The fixed set of logical control actions the operator can bind to
//! physical inputs. The catalog is built once at startup and handed to every
//! component by reference; nothing re-derives action metadata from strings.
//!
//! | Action | Kind | Default input | Shares with |
//! |--------|------|---------------|-------------|
//! | accelerate | both | axis 1 (upper half, inverted) | brake |
//! | brake | both | axis 1 (lower half) | accelerate |
//! | turn | axis | axis 0 | - |
//! | turnCameraX | axis | axis 2 | - |
//! | turnCameraY | axis | axis 3 | - |
//! | use | button | button 2 | - |

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::calibration::{AxisConfig, NormalizeMode};
use crate::error::RelayPilotError;

/// Identifier of a logical action.
///
/// Serialized with the camel-case keys used in persisted mapping tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionKey {
    Accelerate,
    Brake,
    Turn,
    TurnCameraX,
    TurnCameraY,
    Use,
}

impl ActionKey {
    /// All action keys in catalog order.
    pub const ALL: [ActionKey; 6] = [
        ActionKey::Accelerate,
        ActionKey::Brake,
        ActionKey::Turn,
        ActionKey::TurnCameraX,
        ActionKey::TurnCameraY,
        ActionKey::Use,
    ];

    /// Returns the persisted/wire name of the action.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKey::Accelerate => "accelerate",
            ActionKey::Brake => "brake",
            ActionKey::Turn => "turn",
            ActionKey::TurnCameraX => "turnCameraX",
            ActionKey::TurnCameraY => "turnCameraY",
            ActionKey::Use => "use",
        }
    }
}

impl fmt::Display for ActionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKey {
    type Err = RelayPilotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionKey::ALL
            .iter()
            .copied()
            .find(|key| key.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| RelayPilotError::UnknownAction(s.to_string()))
    }
}

/// Physical input kind a mapping can point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    Button,
    Axis,
}

impl fmt::Display for InputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputKind::Button => f.write_str("button"),
            InputKind::Axis => f.write_str("axis"),
        }
    }
}

impl FromStr for InputKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "button" => Ok(InputKind::Button),
            "axis" => Ok(InputKind::Axis),
            other => Err(format!("unknown input kind '{}' (expected button or axis)", other)),
        }
    }
}

/// Which physical input kinds an action accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Button,
    Axis,
    /// Either; the current mapping's kind selects the interpretation.
    Both,
}

impl ActionKind {
    /// Whether an input of `kind` satisfies this action kind.
    #[must_use]
    pub fn accepts(&self, kind: InputKind) -> bool {
        match self {
            ActionKind::Both => true,
            ActionKind::Button => kind == InputKind::Button,
            ActionKind::Axis => kind == InputKind::Axis,
        }
    }
}

impl From<InputKind> for ActionKind {
    fn from(kind: InputKind) -> Self {
        match kind {
            InputKind::Button => ActionKind::Button,
            InputKind::Axis => ActionKind::Axis,
        }
    }
}

/// Static description of one logical action.
#[derive(Debug, Clone, PartialEq)]
pub struct LogicalAction {
    pub key: ActionKey,
    pub label: &'static str,
    pub kind: ActionKind,
    /// Factory binding used when a device is seen for the first time.
    pub default_mapping: (InputKind, i32),
    /// Actions allowed to co-occupy this action's physical input.
    pub shared_with: &'static [ActionKey],
    /// Axis transform applied whenever the action gets bound to an axis.
    pub axis_defaults: Option<AxisConfig>,
}

impl LogicalAction {
    /// Whether this action declares `other` as a sharing partner.
    #[must_use]
    pub fn shares_with(&self, other: ActionKey) -> bool {
        self.shared_with.contains(&other)
    }

    /// Axis config for a fresh axis binding of this action.
    #[must_use]
    pub fn default_axis_config(&self) -> AxisConfig {
        self.axis_defaults.unwrap_or_default()
    }
}

/// Read-only catalog of logical actions indexed by key.
#[derive(Debug, Clone)]
pub struct ActionCatalog {
    actions: BTreeMap<ActionKey, LogicalAction>,
}

impl Default for ActionCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

impl ActionCatalog {
    /// Builds a catalog from explicit entries. Later duplicates replace earlier ones.
    #[must_use]
    pub fn new(actions: impl IntoIterator<Item = LogicalAction>) -> Self {
        Self {
            actions: actions.into_iter().map(|a| (a.key, a)).collect(),
        }
    }

    /// The vehicle control catalog.
    #[must_use]
    pub fn standard() -> Self {
        Self::new([
            LogicalAction {
                key: ActionKey::Accelerate,
                label: "Accelerate",
                kind: ActionKind::Both,
                default_mapping: (InputKind::Axis, 1),
                shared_with: &[ActionKey::Brake],
                axis_defaults: Some(AxisConfig::new(-1.0, 0.0, true, NormalizeMode::Positive)),
            },
            LogicalAction {
                key: ActionKey::Brake,
                label: "Brake",
                kind: ActionKind::Both,
                default_mapping: (InputKind::Axis, 1),
                shared_with: &[ActionKey::Accelerate],
                axis_defaults: Some(AxisConfig::new(0.0, 1.0, false, NormalizeMode::Positive)),
            },
            LogicalAction {
                key: ActionKey::Turn,
                label: "Turn",
                kind: ActionKind::Axis,
                default_mapping: (InputKind::Axis, 0),
                shared_with: &[],
                axis_defaults: Some(AxisConfig::new(-1.0, 1.0, false, NormalizeMode::Full)),
            },
            LogicalAction {
                key: ActionKey::TurnCameraX,
                label: "Pan camera horizontally",
                kind: ActionKind::Axis,
                default_mapping: (InputKind::Axis, 2),
                shared_with: &[],
                axis_defaults: Some(AxisConfig::new(-1.0, 1.0, false, NormalizeMode::Full)),
            },
            LogicalAction {
                key: ActionKey::TurnCameraY,
                label: "Pan camera vertically",
                kind: ActionKind::Axis,
                default_mapping: (InputKind::Axis, 3),
                shared_with: &[],
                axis_defaults: Some(AxisConfig::new(-1.0, 1.0, false, NormalizeMode::Full)),
            },
            LogicalAction {
                key: ActionKey::Use,
                label: "Use",
                kind: ActionKind::Button,
                default_mapping: (InputKind::Button, 2),
                shared_with: &[],
                axis_defaults: None,
            },
        ])
    }

    /// Looks up an action; `None` if the catalog has no such entry.
    #[must_use]
    pub fn get(&self, key: ActionKey) -> Option<&LogicalAction> {
        self.actions.get(&key)
    }

    /// Iterates actions in key order.
    pub fn iter(&self) -> impl Iterator<Item = &LogicalAction> {
        self.actions.values()
    }

    /// Whether `a` and `b` both declare each other as sharing partners.
    ///
    /// Missing catalog entries never share.
    #[must_use]
    pub fn mutually_shared(&self, a: ActionKey, b: ActionKey) -> bool {
        match (self.get(a), self.get(b)) {
            (Some(left), Some(right)) => left.shares_with(b) && right.shares_with(a),
            _ => false,
        }
    }
}
