//! # Relay Messages
//!
//! JSON envelopes exchanged with the relay:
//!
//! ```json
//! { "name": "gamepad_input",
//!   "data": { "speed": 0.5, "turn": -0.2, "turnCameraX": 0.0, "turnCameraY": 0.0, "use": false },
//!   "createdAt": 1718000000000 }
//! ```
//!
//! | Name | Direction | Data |
//! |------|-----------|------|
//! | `client_register` | out | `{type: "controller", id}` |
//! | `gamepad_input` | out | [`GamepadInput`] |
//! | `ping` | out | `{sentAt}` |
//! | `pong` | in | `{sentAt}` echoed from the ping |

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::controller::actions::ActionKey;
use crate::controller::query::ActionQuery;
use crate::error::Result;

pub const GAMEPAD_INPUT: &str = "gamepad_input";
pub const CLIENT_REGISTER: &str = "client_register";
pub const PING: &str = "ping";
pub const PONG: &str = "pong";

/// Role announced in `client_register`.
pub const CONTROLLER_ROLE: &str = "controller";

/// Milliseconds since the Unix epoch.
#[must_use]
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Envelope of every relay message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayMessage {
    pub name: String,
    #[serde(default)]
    pub data: Value,
    #[serde(rename = "createdAt")]
    pub created_at: i64,
}

impl RelayMessage {
    /// Message stamped with the current time.
    ///
    /// # Errors
    ///
    /// `Json` if `data` cannot be represented as JSON.
    pub fn new(name: &str, data: impl Serialize) -> Result<Self> {
        Ok(Self {
            name: name.to_string(),
            data: serde_json::to_value(data)?,
            created_at: now_millis(),
        })
    }

    pub fn gamepad_input(input: &GamepadInput) -> Result<Self> {
        Self::new(GAMEPAD_INPUT, input)
    }

    #[must_use]
    pub fn client_register(id: &str) -> Self {
        Self {
            name: CLIENT_REGISTER.to_string(),
            data: json!({ "type": CONTROLLER_ROLE, "id": id }),
            created_at: now_millis(),
        }
    }

    #[must_use]
    pub fn ping(sent_at: i64) -> Self {
        Self {
            name: PING.to_string(),
            data: json!({ "sentAt": sent_at }),
            created_at: now_millis(),
        }
    }

    /// Parses an incoming text frame.
    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Round trip in milliseconds if this is a `pong` carrying `sentAt`.
    #[must_use]
    pub fn pong_latency(&self, now: i64) -> Option<u64> {
        if self.name != PONG {
            return None;
        }
        let sent_at = self.data.get("sentAt")?.as_i64()?;
        u64::try_from(now.saturating_sub(sent_at)).ok()
    }
}

/// Control state streamed to the vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GamepadInput {
    /// Accelerate minus brake, -1.0 to 1.0
    pub speed: f32,
    pub turn: f32,
    #[serde(rename = "turnCameraX")]
    pub turn_camera_x: f32,
    #[serde(rename = "turnCameraY")]
    pub turn_camera_y: f32,
    #[serde(rename = "use")]
    pub use_pressed: bool,
}

impl GamepadInput {
    /// Resolves every field from the current mapping table and snapshot.
    ///
    /// Button-bound accelerate/brake count as 1.0 while pressed; unbound
    /// actions contribute 0.0.
    #[must_use]
    pub fn from_query(query: &ActionQuery<'_>) -> Self {
        Self {
            speed: query.magnitude_of(ActionKey::Accelerate) - query.magnitude_of(ActionKey::Brake),
            turn: query.value_of(ActionKey::Turn, true).unwrap_or(0.0),
            turn_camera_x: query.value_of(ActionKey::TurnCameraX, true).unwrap_or(0.0),
            turn_camera_y: query.value_of(ActionKey::TurnCameraY, true).unwrap_or(0.0),
            use_pressed: query.is_active(ActionKey::Use),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::actions::{ActionCatalog, InputKind};
    use crate::controller::device::{ButtonState, RawDeviceState};
    use crate::controller::mapping::{Mapping, MappingTable};
    use crate::controller::snapshot::Snapshot;
    use std::time::Instant;

    fn snapshot(axes: Vec<f32>, pressed: &[usize]) -> Snapshot {
        let mut buttons = vec![ButtonState::default(); 17];
        for &i in pressed {
            buttons[i] = ButtonState::digital(true);
        }
        Snapshot::from_raw(&RawDeviceState { buttons, axes }, Instant::now())
    }

    #[test]
    fn test_gamepad_input_from_defaults() {
        let table = MappingTable::defaults(&ActionCatalog::standard());
        // Left stick pushed fully up, right stick half left, X held
        let snapshot = snapshot(vec![0.25, -1.0, -0.5, 0.0], &[2]);
        let input = GamepadInput::from_query(&ActionQuery::new(&table, &snapshot));

        assert_eq!(input.speed, 1.0);
        assert_eq!(input.turn, 0.25);
        assert_eq!(input.turn_camera_x, -0.5);
        assert_eq!(input.turn_camera_y, 0.0);
        assert!(input.use_pressed);
    }

    #[test]
    fn test_speed_with_stick_pulled_back() {
        let table = MappingTable::defaults(&ActionCatalog::standard());
        let snapshot = snapshot(vec![0.0, 0.5, 0.0, 0.0], &[]);
        let input = GamepadInput::from_query(&ActionQuery::new(&table, &snapshot));
        assert_eq!(input.speed, -0.5);
    }

    #[test]
    fn test_speed_with_button_mappings() {
        let mut table = MappingTable::defaults(&ActionCatalog::standard());
        table.insert(ActionKey::Accelerate, Mapping::button(7));
        table.insert(ActionKey::Brake, Mapping::unmapped(InputKind::Axis));

        let held = snapshot(vec![0.0; 4], &[7]);
        assert_eq!(GamepadInput::from_query(&ActionQuery::new(&table, &held)).speed, 1.0);

        let released = snapshot(vec![0.0; 4], &[]);
        assert_eq!(GamepadInput::from_query(&ActionQuery::new(&table, &released)).speed, 0.0);
    }

    #[test]
    fn test_disconnected_input_is_neutral() {
        let table = MappingTable::defaults(&ActionCatalog::standard());
        let snapshot = Snapshot::disconnected(Instant::now());
        let input = GamepadInput::from_query(&ActionQuery::new(&table, &snapshot));
        assert_eq!(input, GamepadInput::default());
    }

    #[test]
    fn test_gamepad_input_wire_shape() {
        let input = GamepadInput {
            speed: 0.5,
            turn: -0.25,
            turn_camera_x: 0.0,
            turn_camera_y: 1.0,
            use_pressed: true,
        };
        let message = RelayMessage::gamepad_input(&input).unwrap();
        let json: Value = serde_json::from_str(&message.to_json().unwrap()).unwrap();

        assert_eq!(json["name"], "gamepad_input");
        assert_eq!(
            json["data"],
            json!({"speed": 0.5, "turn": -0.25, "turnCameraX": 0.0, "turnCameraY": 1.0, "use": true})
        );
        assert!(json["createdAt"].as_i64().unwrap() > 0);
    }

    #[test]
    fn test_client_register_shape() {
        let message = RelayMessage::client_register("controller-abc");
        assert_eq!(message.name, "client_register");
        assert_eq!(message.data, json!({"type": "controller", "id": "controller-abc"}));
    }

    #[test]
    fn test_pong_latency() {
        let pong = RelayMessage::parse(r#"{"name":"pong","data":{"sentAt":1000},"createdAt":1000}"#).unwrap();
        assert_eq!(pong.pong_latency(1042), Some(42));
        // Clock went backwards
        assert_eq!(pong.pong_latency(900), None);

        let ping = RelayMessage::ping(1000);
        assert_eq!(ping.pong_latency(1042), None);

        let bare = RelayMessage::parse(r#"{"name":"pong","createdAt":1}"#).unwrap();
        assert_eq!(bare.pong_latency(5), None);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(RelayMessage::parse("not json").is_err());
        assert!(RelayMessage::parse(r#"{"data":{}}"#).is_err());
    }
}
