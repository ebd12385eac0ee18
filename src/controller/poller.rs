//! # Device Snapshot Poller
//!
//! Reads the selected device once per tick and publishes an immutable
//! [`Snapshot`]. A new snapshot replaces the old one by `Arc` swap and only
//! when the readings changed.
//!
//! ## Usage
//!
//! ```no_run
//! use std::time::{Duration, Instant};
//! use relay_pilot::controller::evdev_source::EvdevSource;
//! use relay_pilot::controller::poller::SnapshotPoller;
//!
//! let mut poller = SnapshotPoller::new(EvdevSource::new(), Duration::from_secs(2));
//! let first = poller.refresh_roster(Instant::now()).first().map(|d| d.id.clone());
//! if let Some(id) = first {
//!     poller.select(&id, Instant::now())?;
//! }
//! let outcome = poller.tick(Instant::now());
//! println!("connected: {}", outcome.current.connected);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::device::{DeviceInfo, DeviceSource, RawDeviceState};
use super::snapshot::{DeviceInputs, Snapshot};
use crate::error::{RelayPilotError, Result};

/// The device currently driving the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub info: DeviceInfo,
    pub inputs: DeviceInputs,
}

/// Connection transitions observed by a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionChange {
    Connected,
    Lost,
}

/// Result of one poll tick.
#[derive(Debug, Clone)]
pub struct PollOutcome {
    /// Snapshot published before this tick.
    pub previous: Arc<Snapshot>,
    /// Snapshot after this tick (same `Arc` as `previous` if nothing changed).
    pub current: Arc<Snapshot>,
    /// Raw readings of this tick, `None` when disconnected.
    pub raw: Option<RawDeviceState>,
    pub changed: bool,
    pub connection: Option<ConnectionChange>,
}

/// Polls a [`DeviceSource`] for the selected device.
pub struct SnapshotPoller<S: DeviceSource> {
    source: S,
    roster: Vec<DeviceInfo>,
    roster_interval: Duration,
    last_roster_refresh: Option<Instant>,
    selection: Option<Selection>,
    current: Arc<Snapshot>,
}

impl<S: DeviceSource> SnapshotPoller<S> {
    /// Creates a poller with no device selected.
    ///
    /// # Arguments
    ///
    /// * `source` - Raw device input source
    /// * `roster_interval` - Minimum time between roster refreshes during ticks
    pub fn new(source: S, roster_interval: Duration) -> Self {
        Self {
            source,
            roster: Vec::new(),
            roster_interval,
            last_roster_refresh: None,
            selection: None,
            current: Arc::new(Snapshot::disconnected(Instant::now())),
        }
    }

    /// Re-reads the list of visible devices.
    pub fn refresh_roster(&mut self, now: Instant) -> &[DeviceInfo] {
        self.roster = self.source.devices();
        self.last_roster_refresh = Some(now);
        &self.roster
    }

    /// Devices seen by the last roster refresh.
    #[must_use]
    pub fn roster(&self) -> &[DeviceInfo] {
        &self.roster
    }

    /// Finds a device by exact id, else by case-insensitive substring of id or label.
    ///
    /// An empty pattern matches the first device.
    #[must_use]
    pub fn find_device(&self, pattern: &str) -> Option<&DeviceInfo> {
        if pattern.is_empty() {
            return self.roster.first();
        }
        if let Some(exact) = self.roster.iter().find(|d| d.id == pattern) {
            return Some(exact);
        }
        let needle = pattern.to_lowercase();
        self.roster.iter().find(|d| {
            d.id.to_lowercase().contains(&needle) || d.label.to_lowercase().contains(&needle)
        })
    }

    /// Selects a device and rebuilds its input roster.
    ///
    /// Snapshot state is reset in the same call, so no tick sees a mix of
    /// the old and new device.
    ///
    /// # Errors
    ///
    /// `DeviceNotFound` if no visible device has this id.
    pub fn select(&mut self, id: &str, now: Instant) -> Result<&Selection> {
        self.refresh_roster(now);
        let info = self
            .roster
            .iter()
            .find(|d| d.id == id)
            .cloned()
            .ok_or_else(|| RelayPilotError::DeviceNotFound(id.to_string()))?;

        info!(
            "Selected input device: {} ({} buttons, {} axes)",
            info.id, info.button_count, info.axis_count
        );

        let inputs = DeviceInputs::for_device(&info);
        self.current = Arc::new(Snapshot::disconnected(now));
        Ok(self.selection.insert(Selection { info, inputs }))
    }

    /// Drops the selection; following ticks report disconnected.
    pub fn deselect(&mut self, now: Instant) {
        if let Some(selection) = self.selection.take() {
            info!("Deselected input device: {}", selection.info.id);
        }
        self.current = Arc::new(Snapshot::disconnected(now));
    }

    #[must_use]
    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    /// Latest published snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.current)
    }

    /// Borrowed view of the latest snapshot.
    #[must_use]
    pub fn current(&self) -> &Snapshot {
        &self.current
    }

    /// Reads the selected device and publishes a new snapshot if it changed.
    pub fn tick(&mut self, now: Instant) -> PollOutcome {
        let roster_due = self
            .last_roster_refresh
            .map_or(true, |at| now.saturating_duration_since(at) >= self.roster_interval);
        if roster_due {
            self.refresh_roster(now);
        }

        let raw = match &self.selection {
            Some(selection) => {
                let raw = self.source.read(&selection.info.id);
                if raw.is_none() && self.current.connected {
                    warn!("Selected device {} is no longer present", selection.info.id);
                }
                raw
            }
            None => None,
        };

        let next = match &raw {
            Some(state) => Snapshot::from_raw(state, now),
            None => Snapshot::disconnected(now),
        };

        let previous = Arc::clone(&self.current);
        let changed = !next.same_state(&previous);
        if changed {
            self.current = Arc::new(next);
        }

        let connection = match (previous.connected, self.current.connected) {
            (false, true) => Some(ConnectionChange::Connected),
            (true, false) => Some(ConnectionChange::Lost),
            _ => None,
        };
        if connection == Some(ConnectionChange::Connected) {
            debug!("Selected device is reporting input");
        }

        PollOutcome {
            previous,
            current: Arc::clone(&self.current),
            raw,
            changed,
            connection,
        }
    }
}
