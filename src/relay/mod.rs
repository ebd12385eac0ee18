//! # Relay Module
//!
//! Streams control state to the remote vehicle through a WebSocket relay.
//!
//! This module handles:
//! - The `gamepad_input` message and its JSON envelope
//! - Registering with the relay as a controller
//! - Ping/pong latency measurement
//! - Reconnecting after connection loss
//!
//! Delivery is best effort: messages produced while the relay is
//! unreachable are dropped.

pub mod client;
pub mod message;

use async_trait::async_trait;
use tracing::debug;

pub use client::{RelayHandle, RelayOptions};
pub use message::{GamepadInput, RelayMessage};

use crate::error::Result;

/// Outgoing side of the relay.
#[async_trait]
pub trait RelaySink: Send {
    /// Queues a message for the relay.
    async fn send(&mut self, message: RelayMessage) -> Result<()>;
}

/// Sends the current control state, if a device is producing one.
///
/// Returns whether a message was sent.
pub async fn send_gamepad_input<S: RelaySink + ?Sized>(sink: &mut S, input: Option<&GamepadInput>) -> Result<bool> {
    let Some(input) = input else {
        return Ok(false);
    };
    let message = RelayMessage::gamepad_input(input)?;
    sink.send(message).await?;
    debug!("Queued gamepad_input: {:?}", input);
    Ok(true)
}

#[cfg(test)]
pub mod mocks {
    use super::*;
    use crate::error::RelayPilotError;
    use std::sync::{Arc, Mutex};

    /// Mock relay sink for testing
    #[derive(Clone, Default)]
    pub struct MockRelaySink {
        pub sent: Arc<Mutex<Vec<RelayMessage>>>,
        pub send_error: Arc<Mutex<Option<String>>>,
    }

    impl MockRelaySink {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn get_sent(&self) -> Vec<RelayMessage> {
            self.sent.lock().unwrap().clone()
        }

        pub fn set_send_error(&self, error: &str) {
            *self.send_error.lock().unwrap() = Some(error.to_string());
        }
    }

    #[async_trait]
    impl RelaySink for MockRelaySink {
        async fn send(&mut self, message: RelayMessage) -> Result<()> {
            if let Some(error) = self.send_error.lock().unwrap().clone() {
                return Err(RelayPilotError::Relay(error));
            }
            self.sent.lock().unwrap().push(message);
            Ok(())
        }
    }
}
