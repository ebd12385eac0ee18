//! # Mapping Table Module
//!
//! Binds every logical action to one physical input of the selected device.
//!
//! One table exists per device identifier. Tables are persisted as a JSON
//! record of action key to `{type, index, axisConfig?}`:
//!
//! ```json
//! {
//!   "turn": { "type": "axis", "index": 0,
//!             "axisConfig": { "min": -1.0, "max": 1.0, "inverted": false, "normalize": "full" } },
//!   "use":  { "type": "button", "index": 2 }
//! }
//! ```
//!
//! Keys that name no known action are kept verbatim and written back on save,
//! but take no part in queries or conflict resolution.
//!
//! ## Conflict Resolution
//!
//! Assigning an input to an action clears every other action holding the same
//! input, unless both actions list each other in `shared_with`.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info};

use super::actions::{ActionCatalog, ActionKey, InputKind};
use super::calibration::AxisConfig;

/// Index value of a mapping that is bound to nothing.
pub const UNMAPPED: i32 = -1;

/// Binding of one action to a physical input.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Mapping {
    #[serde(rename = "type")]
    pub kind: InputKind,
    pub index: i32,
    #[serde(rename = "axisConfig", default, skip_serializing_if = "Option::is_none")]
    pub axis_config: Option<AxisConfig>,
}

impl Mapping {
    /// Button binding.
    #[must_use]
    pub fn button(index: i32) -> Self {
        Self {
            kind: InputKind::Button,
            index,
            axis_config: None,
        }
    }

    /// Axis binding with a transform.
    #[must_use]
    pub fn axis(index: i32, config: AxisConfig) -> Self {
        Self {
            kind: InputKind::Axis,
            index,
            axis_config: Some(config),
        }
    }

    /// Unbound mapping that keeps its kind tag.
    #[must_use]
    pub fn unmapped(kind: InputKind) -> Self {
        Self {
            kind,
            index: UNMAPPED,
            axis_config: None,
        }
    }

    #[must_use]
    pub fn is_mapped(&self) -> bool {
        self.index != UNMAPPED
    }

    /// Physical index, `None` when unmapped.
    #[must_use]
    pub fn input_index(&self) -> Option<usize> {
        usize::try_from(self.index).ok()
    }

    /// Whether this mapping points at `(kind, index)`.
    #[must_use]
    pub fn targets(&self, kind: InputKind, index: usize) -> bool {
        self.kind == kind && self.input_index() == Some(index)
    }
}

/// Outcome of assigning an input to an action.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Assignment {
    /// Actions whose mapping was cleared because they held the input.
    pub cleared: Vec<ActionKey>,
    /// Actions left on the input because sharing is mutual.
    pub shared: Vec<ActionKey>,
}

/// Action to mapping table for one device.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(try_from = "BTreeMap<String, Value>")]
pub struct MappingTable {
    entries: BTreeMap<ActionKey, Mapping>,
    /// Stored entries under keys no known action uses
    unknown: BTreeMap<String, Value>,
}

impl TryFrom<BTreeMap<String, Value>> for MappingTable {
    type Error = String;

    fn try_from(raw: BTreeMap<String, Value>) -> Result<Self, Self::Error> {
        let mut table = MappingTable::default();
        for (key, value) in raw {
            match serde_json::from_value::<ActionKey>(Value::String(key.clone())) {
                Ok(action) => {
                    let mapping = serde_json::from_value::<Mapping>(value)
                        .map_err(|e| format!("entry '{}': {}", key, e))?;
                    table.entries.insert(action, mapping);
                }
                Err(_) => {
                    debug!("Keeping stored entry for unknown action '{}'", key);
                    table.unknown.insert(key, value);
                }
            }
        }
        Ok(table)
    }
}

impl Serialize for MappingTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len() + self.unknown.len()))?;
        for (key, mapping) in &self.entries {
            map.serialize_entry(key.as_str(), mapping)?;
        }
        for (key, value) in &self.unknown {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl MappingTable {
    /// Factory defaults from the catalog's default mappings and axis defaults.
    #[must_use]
    pub fn defaults(catalog: &ActionCatalog) -> Self {
        let entries = catalog
            .iter()
            .map(|action| {
                let (kind, index) = action.default_mapping;
                let mapping = match kind {
                    InputKind::Button => Mapping::button(index),
                    InputKind::Axis => Mapping::axis(index, action.default_axis_config()),
                };
                (action.key, mapping)
            })
            .collect();
        Self {
            entries,
            unknown: BTreeMap::new(),
        }
    }

    /// Adds factory defaults for catalog actions the table does not mention.
    ///
    /// Returns the keys that were filled in.
    pub fn fill_missing(&mut self, catalog: &ActionCatalog) -> Vec<ActionKey> {
        let defaults = Self::defaults(catalog);
        let mut filled = Vec::new();
        for (key, mapping) in defaults.entries {
            if let std::collections::btree_map::Entry::Vacant(slot) = self.entries.entry(key) {
                slot.insert(mapping);
                filled.push(key);
            }
        }
        filled
    }

    #[must_use]
    pub fn get(&self, key: ActionKey) -> Option<&Mapping> {
        self.entries.get(&key)
    }

    /// Replaces one entry verbatim, without conflict resolution.
    pub fn insert(&mut self, key: ActionKey, mapping: Mapping) {
        self.entries.insert(key, mapping);
    }

    pub fn iter(&self) -> impl Iterator<Item = (ActionKey, &Mapping)> {
        self.entries.iter().map(|(k, m)| (*k, m))
    }

    /// Stored keys that name no known action, in key order.
    #[must_use]
    pub fn unknown_actions(&self) -> Vec<&str> {
        self.unknown.keys().map(String::as_str).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All actions currently bound to `(kind, index)`, in key order.
    #[must_use]
    pub fn actions_using(&self, kind: InputKind, index: usize) -> Vec<ActionKey> {
        self.entries
            .iter()
            .filter(|(_, m)| m.targets(kind, index))
            .map(|(k, _)| *k)
            .collect()
    }

    /// First action (key order) bound to `(kind, index)`.
    #[must_use]
    pub fn action_for_input(&self, kind: InputKind, index: usize) -> Option<ActionKey> {
        self.entries
            .iter()
            .find(|(_, m)| m.targets(kind, index))
            .map(|(k, _)| *k)
    }

    /// Binds `action` to `mapping`'s input and resolves conflicts.
    ///
    /// Every other action on the same `(kind, index)` is cleared to
    /// [`UNMAPPED`] (kind tag kept) unless `action` and it share mutually.
    /// Entries the catalog does not know are left alone. Conflicts are
    /// computed against the table as it is now.
    pub fn assign(&mut self, catalog: &ActionCatalog, action: ActionKey, mapping: Mapping) -> Assignment {
        let mut outcome = Assignment::default();

        if let Some(index) = mapping.input_index() {
            for other in self.actions_using(mapping.kind, index) {
                if other == action {
                    continue;
                }
                if catalog.get(other).is_none() {
                    debug!("Ignoring {} on {} {}: not in catalog", other, mapping.kind, index);
                    continue;
                }
                if catalog.mutually_shared(action, other) {
                    info!("Allowing shared {} {} between {} and {}", mapping.kind, index, action, other);
                    outcome.shared.push(other);
                } else {
                    info!("Removing {} {} from {} (conflict resolution)", mapping.kind, index, other);
                    self.entries.insert(other, Mapping::unmapped(mapping.kind));
                    outcome.cleared.push(other);
                }
            }
        }

        debug!("Mapped {} to {} {}", action, mapping.kind, mapping.index);
        self.entries.insert(action, mapping);
        outcome
    }

    /// Replaces the axis config of an axis-bound action.
    ///
    /// Returns `false` (table unchanged) if the action is missing or bound to a button.
    pub fn set_axis_config(&mut self, action: ActionKey, config: AxisConfig) -> bool {
        match self.entries.get_mut(&action) {
            Some(mapping) if mapping.kind == InputKind::Axis => {
                mapping.axis_config = Some(config);
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::actions::{ActionKind, LogicalAction};
    use crate::controller::calibration::NormalizeMode;

    #[test]
    fn test_defaults_follow_catalog() {
        let catalog = ActionCatalog::standard();
        let table = MappingTable::defaults(&catalog);

        assert_eq!(table.len(), ActionKey::ALL.len());

        let accelerate = table.get(ActionKey::Accelerate).unwrap();
        assert_eq!(accelerate.kind, InputKind::Axis);
        assert_eq!(accelerate.index, 1);
        assert_eq!(
            accelerate.axis_config,
            Some(AxisConfig::new(-1.0, 0.0, true, NormalizeMode::Positive))
        );

        let use_mapping = table.get(ActionKey::Use).unwrap();
        assert_eq!(*use_mapping, Mapping::button(2));
    }

    #[test]
    fn test_conflict_clears_non_sharing_action() {
        let catalog = ActionCatalog::standard();
        let mut table = MappingTable::defaults(&catalog);

        // turn holds axis 0; give it to turnCameraX
        let outcome = table.assign(
            &catalog,
            ActionKey::TurnCameraX,
            Mapping::axis(0, AxisConfig::default()),
        );

        assert_eq!(outcome.cleared, vec![ActionKey::Turn]);
        assert!(outcome.shared.is_empty());
        assert_eq!(table.get(ActionKey::TurnCameraX).unwrap().index, 0);
        let turn = table.get(ActionKey::Turn).unwrap();
        assert_eq!(turn.index, UNMAPPED);
        assert_eq!(turn.kind, InputKind::Axis);
        assert!(turn.axis_config.is_none());
    }

    #[test]
    fn test_conflict_on_button() {
        let catalog = ActionCatalog::standard();
        let mut table = MappingTable::defaults(&catalog);

        let outcome = table.assign(&catalog, ActionKey::Accelerate, Mapping::button(2));

        assert_eq!(outcome.cleared, vec![ActionKey::Use]);
        assert_eq!(*table.get(ActionKey::Use).unwrap(), Mapping::unmapped(InputKind::Button));
        assert_eq!(*table.get(ActionKey::Accelerate).unwrap(), Mapping::button(2));
        // Brake keeps its axis
        assert_eq!(table.get(ActionKey::Brake).unwrap().index, 1);
    }

    #[test]
    fn test_mutual_sharing_keeps_both() {
        let catalog = ActionCatalog::standard();
        let mut table = MappingTable::defaults(&catalog);

        let outcome = table.assign(
            &catalog,
            ActionKey::Brake,
            Mapping::axis(1, AxisConfig::new(0.0, 1.0, false, NormalizeMode::Positive)),
        );
        assert_eq!(outcome.shared, vec![ActionKey::Accelerate]);
        assert!(outcome.cleared.is_empty());

        let outcome = table.assign(
            &catalog,
            ActionKey::Accelerate,
            Mapping::axis(1, AxisConfig::new(-1.0, 0.0, true, NormalizeMode::Positive)),
        );
        assert_eq!(outcome.shared, vec![ActionKey::Brake]);
        assert_eq!(table.get(ActionKey::Accelerate).unwrap().index, 1);
        assert_eq!(table.get(ActionKey::Brake).unwrap().index, 1);
    }

    #[test]
    fn test_one_sided_sharing_clears() {
        let catalog = ActionCatalog::new([
            LogicalAction {
                key: ActionKey::Turn,
                label: "Turn",
                kind: ActionKind::Axis,
                default_mapping: (InputKind::Axis, 0),
                shared_with: &[ActionKey::TurnCameraX],
                axis_defaults: None,
            },
            LogicalAction {
                key: ActionKey::TurnCameraX,
                label: "Camera",
                kind: ActionKind::Axis,
                default_mapping: (InputKind::Axis, 2),
                shared_with: &[],
                axis_defaults: None,
            },
        ]);
        let mut table = MappingTable::defaults(&catalog);

        let outcome = table.assign(&catalog, ActionKey::TurnCameraX, Mapping::axis(0, AxisConfig::default()));
        assert_eq!(outcome.cleared, vec![ActionKey::Turn]);
    }

    #[test]
    fn test_conflict_with_action_missing_from_catalog() {
        // Table holds an entry the catalog no longer describes
        let catalog = ActionCatalog::standard();
        let mut table = MappingTable::defaults(&catalog);
        let partial = ActionCatalog::new(catalog.iter().filter(|a| a.key != ActionKey::Use).cloned());

        let outcome = table.assign(&partial, ActionKey::Accelerate, Mapping::button(2));
        assert!(outcome.cleared.is_empty());
        assert_eq!(*table.get(ActionKey::Use).unwrap(), Mapping::button(2));
        assert_eq!(*table.get(ActionKey::Accelerate).unwrap(), Mapping::button(2));
    }

    #[test]
    fn test_reassigning_same_input_is_stable() {
        let catalog = ActionCatalog::standard();
        let mut table = MappingTable::defaults(&catalog);
        let before = table.clone();

        let outcome = table.assign(&catalog, ActionKey::Use, Mapping::button(2));
        assert_eq!(outcome, Assignment::default());
        assert_eq!(table, before);
    }

    #[test]
    fn test_actions_using_and_action_for_input() {
        let catalog = ActionCatalog::standard();
        let table = MappingTable::defaults(&catalog);

        assert_eq!(
            table.actions_using(InputKind::Axis, 1),
            vec![ActionKey::Accelerate, ActionKey::Brake]
        );
        assert_eq!(table.action_for_input(InputKind::Axis, 1), Some(ActionKey::Accelerate));
        assert_eq!(table.action_for_input(InputKind::Button, 2), Some(ActionKey::Use));
        assert_eq!(table.action_for_input(InputKind::Button, 0), None);
    }

    #[test]
    fn test_unmapped_never_targets() {
        let mapping = Mapping::unmapped(InputKind::Axis);
        assert!(!mapping.is_mapped());
        assert_eq!(mapping.input_index(), None);
        assert!(!mapping.targets(InputKind::Axis, 0));
    }

    #[test]
    fn test_set_axis_config() {
        let catalog = ActionCatalog::standard();
        let mut table = MappingTable::defaults(&catalog);
        let cfg = AxisConfig::new(-0.8, 0.8, true, NormalizeMode::Full);

        assert!(table.set_axis_config(ActionKey::Turn, cfg));
        assert_eq!(table.get(ActionKey::Turn).unwrap().axis_config, Some(cfg));
        assert_eq!(table.get(ActionKey::Turn).unwrap().index, 0);

        assert!(!table.set_axis_config(ActionKey::Use, cfg));
        assert!(table.get(ActionKey::Use).unwrap().axis_config.is_none());
    }

    #[test]
    fn test_json_shape() {
        let catalog = ActionCatalog::standard();
        let table = MappingTable::defaults(&catalog);
        let json = serde_json::to_value(&table).unwrap();

        assert_eq!(json["use"], serde_json::json!({"type": "button", "index": 2}));
        assert_eq!(json["turn"]["type"], "axis");
        assert_eq!(json["turn"]["axisConfig"]["normalize"], "full");

        let back: MappingTable = serde_json::from_value(json).unwrap();
        assert_eq!(back, table);
    }

    #[test]
    fn test_rejects_wrong_shape() {
        let bad = serde_json::json!({"use": {"type": "trigger", "index": 2}});
        assert!(serde_json::from_value::<MappingTable>(bad).is_err());

        let bad = serde_json::json!({"use": {"type": "button"}});
        assert!(serde_json::from_value::<MappingTable>(bad).is_err());
    }

    #[test]
    fn test_unknown_action_kept_verbatim() {
        let stored = serde_json::json!({
            "turn": {"type": "axis", "index": 3},
            "horn": {"type": "button", "index": 5, "note": "kept"}
        });
        let table: MappingTable = serde_json::from_value(stored.clone()).unwrap();

        assert_eq!(table.len(), 1);
        assert_eq!(table.get(ActionKey::Turn).unwrap().index, 3);
        assert_eq!(table.unknown_actions(), vec!["horn"]);
        assert_eq!(serde_json::to_value(&table).unwrap(), stored);
    }

    #[test]
    fn test_fill_missing() {
        let catalog = ActionCatalog::standard();
        let mut table: MappingTable =
            serde_json::from_value(serde_json::json!({"use": {"type": "button", "index": 5}})).unwrap();

        let filled = table.fill_missing(&catalog);
        assert_eq!(filled.len(), ActionKey::ALL.len() - 1);
        assert!(!filled.contains(&ActionKey::Use));
        assert_eq!(*table.get(ActionKey::Use).unwrap(), Mapping::button(5));
        assert_eq!(table.get(ActionKey::Turn).unwrap().index, 0);
    }
}
