//! # Input Engine
//!
//! Runs one poll tick at a time over the selected device:
//!
//! 1. Poll the device and publish a snapshot
//! 2. Run remap detection against it; commits mutate the mapping table
//! 3. Persist user edits
//!
//! Queries made after a tick see that tick's snapshot and any mapping it
//! committed. The engine is driven from a single task, so no state here is
//! locked.
//!
//! ## Usage
//!
//! ```no_run
//! use std::time::Instant;
//! use relay_pilot::config::Config;
//! use relay_pilot::controller::actions::{ActionCatalog, ActionKey};
//! use relay_pilot::controller::evdev_source::EvdevSource;
//! use relay_pilot::diagnostics::Diagnostics;
//! use relay_pilot::engine::{EngineOptions, InputEngine};
//! use relay_pilot::storage::JsonFileStore;
//!
//! let config = Config::default();
//! let mut engine = InputEngine::new(
//!     EvdevSource::new(),
//!     JsonFileStore::new(&config.storage.path),
//!     ActionCatalog::standard(),
//!     EngineOptions::from(&config),
//!     Diagnostics::default(),
//! );
//! let device = engine.refresh_devices(Instant::now()).first().map(|d| d.id.clone());
//! if let Some(id) = device {
//!     engine.select_device(&id, Instant::now())?;
//!     engine.arm_remap(ActionKey::Turn, None, Instant::now())?;
//!     let report = engine.tick(Instant::now());
//!     println!("{:?}", report.remap);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::config::Config;
use crate::controller::actions::{ActionCatalog, ActionKey, InputKind};
use crate::controller::calibration::AxisConfig;
use crate::controller::device::{DeviceInfo, DeviceSource};
use crate::controller::mapping::MappingTable;
use crate::controller::poller::{ConnectionChange, Selection, SnapshotPoller};
use crate::controller::query::ActionQuery;
use crate::controller::remap::{RemapEvent, RemapState, RemapStateMachine};
use crate::controller::snapshot::Snapshot;
use crate::diagnostics::{Diagnostics, EventKind};
use crate::error::{RelayPilotError, Result};
use crate::relay::GamepadInput;
use crate::storage::{MappingStore, PersistenceBridge};

/// Timing settings of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    /// Minimum time between device roster refreshes
    pub roster_interval: Duration,
    /// Armed remap sessions expire after this long
    pub remap_timeout: Option<Duration>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for EngineOptions {
    fn from(config: &Config) -> Self {
        Self {
            roster_interval: Duration::from_millis(config.device.roster_interval_ms),
            remap_timeout: config.remap.timeout(),
        }
    }
}

/// What one tick did.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    /// A new snapshot was published
    pub changed: bool,
    pub connection: Option<ConnectionChange>,
    pub remap: RemapEvent,
}

/// Input mapping and remapping engine for one selected device.
pub struct InputEngine<S: DeviceSource, M: MappingStore> {
    catalog: ActionCatalog,
    poller: SnapshotPoller<S>,
    remap: RemapStateMachine,
    persistence: PersistenceBridge<M>,
    diagnostics: Diagnostics,
}

impl<S: DeviceSource, M: MappingStore> InputEngine<S, M> {
    pub fn new(source: S, store: M, catalog: ActionCatalog, options: EngineOptions, diagnostics: Diagnostics) -> Self {
        let persistence = PersistenceBridge::new(store, &catalog);
        Self {
            poller: SnapshotPoller::new(source, options.roster_interval),
            remap: RemapStateMachine::new(options.remap_timeout),
            persistence,
            catalog,
            diagnostics,
        }
    }

    #[must_use]
    pub fn catalog(&self) -> &ActionCatalog {
        &self.catalog
    }

    #[must_use]
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Re-reads the visible devices.
    pub fn refresh_devices(&mut self, now: Instant) -> &[DeviceInfo] {
        self.poller.refresh_roster(now)
    }

    #[must_use]
    pub fn devices(&self) -> &[DeviceInfo] {
        self.poller.roster()
    }

    /// Looks a device up by id or name fragment in the current roster.
    #[must_use]
    pub fn find_device(&self, pattern: &str) -> Option<&DeviceInfo> {
        self.poller.find_device(pattern)
    }

    /// Selects a device and loads its mapping table.
    ///
    /// An armed remap session is cancelled. Snapshot, input roster and
    /// mapping table all switch before the next tick.
    ///
    /// # Errors
    ///
    /// `DeviceNotFound` if the device is not visible; the previous
    /// selection is kept in that case.
    pub fn select_device(&mut self, id: &str, now: Instant) -> Result<&Selection> {
        let device_id = self.poller.select(id, now)?.info.id.clone();
        self.remap.cancel();
        self.persistence.select(&device_id, &self.catalog);
        self.poller
            .selection()
            .ok_or_else(|| RelayPilotError::DeviceNotFound(id.to_string()))
    }

    #[must_use]
    pub fn selection(&self) -> Option<&Selection> {
        self.poller.selection()
    }

    /// Latest published snapshot.
    #[must_use]
    pub fn snapshot(&self) -> &Snapshot {
        self.poller.current()
    }

    /// Polls the device, runs remap detection and persists any commit.
    pub fn tick(&mut self, now: Instant) -> TickReport {
        let outcome = self.poller.tick(now);

        if let (Some(change), Some(selection)) = (outcome.connection, self.poller.selection()) {
            let device = selection.info.id.clone();
            match change {
                ConnectionChange::Connected => {
                    info!("Input device connected: {}", device);
                    self.diagnostics.record(EventKind::DeviceConnected { device });
                }
                ConnectionChange::Lost => {
                    warn!("Input device disconnected: {}", device);
                    self.diagnostics.record(EventKind::DeviceDisconnected { device });
                }
            }
        }

        // Only an armed session can touch the table
        let event = if self.remap.is_armed() {
            let catalog = &self.catalog;
            let remap = &mut self.remap;
            self.persistence.update(|table| {
                remap.step(catalog, table, outcome.raw.as_ref(), &outcome.previous, now)
            })
        } else {
            RemapEvent::Idle
        };

        if let RemapEvent::Committed { action, input, .. } = &event {
            self.diagnostics.record(EventKind::RemapCommitted {
                action: action.to_string(),
                input: input.to_string(),
            });
            self.persist();
        }

        TickReport {
            changed: outcome.changed,
            connection: outcome.connection,
            remap: event,
        }
    }

    /// Arms a remap session for `action`.
    ///
    /// Returns the target of a session this call replaced.
    ///
    /// # Errors
    ///
    /// `UnknownAction` if the catalog lacks the action.
    pub fn arm_remap(&mut self, action: ActionKey, preferred: Option<InputKind>, now: Instant) -> Result<Option<ActionKey>> {
        self.remap
            .arm(&self.catalog, action, preferred, self.poller.current(), now)
    }

    /// Cancels the armed session; returns whether one was armed.
    pub fn cancel_remap(&mut self) -> bool {
        self.remap.cancel().is_some()
    }

    #[must_use]
    pub fn remap_state(&self) -> &RemapState {
        self.remap.state()
    }

    /// Replaces the axis config of an axis-bound action and persists it.
    ///
    /// # Errors
    ///
    /// - `InvalidAxisConfig`: non-finite bounds
    /// - `NotAxisMapped`: the action is unbound or bound to a button
    pub fn set_axis_config(&mut self, action: ActionKey, config: AxisConfig) -> Result<()> {
        if !config.min.is_finite() || !config.max.is_finite() {
            return Err(RelayPilotError::InvalidAxisConfig(format!(
                "bounds must be finite (min {}, max {})",
                config.min, config.max
            )));
        }
        match self.persistence.table().get(action) {
            Some(mapping) if mapping.kind == InputKind::Axis && mapping.is_mapped() => {}
            _ => return Err(RelayPilotError::NotAxisMapped(action)),
        }
        if config.is_zero_range() {
            warn!("Axis config of {} has min == max, values will read 0", action);
        }

        self.persistence.update(|table| table.set_axis_config(action, config));
        info!("Updated axis config of {}: {:?}", action, config);
        self.persist();
        Ok(())
    }

    /// Restores an action's catalog axis defaults.
    pub fn reset_axis_config(&mut self, action: ActionKey) -> Result<AxisConfig> {
        let defaults = self
            .catalog
            .get(action)
            .ok_or_else(|| RelayPilotError::UnknownAction(action.to_string()))?
            .default_axis_config();
        self.set_axis_config(action, defaults)?;
        Ok(defaults)
    }

    #[must_use]
    pub fn mappings(&self) -> &MappingTable {
        self.persistence.table()
    }

    /// Query view over the current table and snapshot.
    #[must_use]
    pub fn query(&self) -> ActionQuery<'_> {
        ActionQuery::new(self.persistence.table(), self.poller.current())
    }

    /// Control state for the relay, `None` unless a selected device is connected.
    #[must_use]
    pub fn gamepad_input(&self) -> Option<GamepadInput> {
        if self.poller.selection().is_none() || !self.poller.current().connected {
            return None;
        }
        Some(GamepadInput::from_query(&self.query()))
    }

    /// Label of the input an action is bound to on the selected device.
    #[must_use]
    pub fn input_label_for(&self, action: ActionKey) -> Option<&str> {
        let selection = self.poller.selection()?;
        let mapping = self.persistence.table().get(action)?;
        Some(selection.inputs.label_for(mapping))
    }

    /// Writes pending edits; failures are logged and retried on the next edit.
    fn persist(&mut self) {
        if let Err(e) = self.persistence.flush() {
            warn!("Failed to save mappings: {}", e);
            self.diagnostics.record(EventKind::Error {
                message: format!("failed to save mappings: {}", e),
            });
        }
    }
}
