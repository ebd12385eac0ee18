//! # Storage Module
//!
//! Durable mapping tables, one per device identifier.
//!
//! This module handles:
//! - The [`MappingStore`] seam over the durable key-value store
//! - A JSON file store holding every device's table in one document
//! - The persistence bridge that loads a table on device selection and
//!   writes it back after user edits
//!
//! ## File Format
//!
//! ```json
//! {
//!   "Xbox Wireless Controller (Vendor: 045e Product: 0b13)": {
//!     "use": { "type": "button", "index": 2 }
//!   }
//! }
//! ```

use serde_json::{Map, Value};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::controller::actions::ActionCatalog;
use crate::controller::mapping::MappingTable;
use crate::error::{RelayPilotError, Result};

/// Durable store of mapping tables keyed by device identifier.
#[cfg_attr(test, mockall::automock)]
pub trait MappingStore: Send {
    /// Table stored for `device_id`, `None` if the device was never saved.
    ///
    /// # Errors
    ///
    /// `MalformedMappings` if the stored entry does not have the table shape.
    fn load(&self, device_id: &str) -> Result<Option<MappingTable>>;

    /// Replaces the table stored for `device_id`.
    fn save(&mut self, device_id: &str, table: &MappingTable) -> Result<()>;
}

impl<M: MappingStore + ?Sized> MappingStore for Box<M> {
    fn load(&self, device_id: &str) -> Result<Option<MappingTable>> {
        (**self).load(device_id)
    }

    fn save(&mut self, device_id: &str, table: &MappingTable) -> Result<()> {
        (**self).save(device_id, table)
    }
}

/// All device tables in a single JSON document.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the whole document; a missing file is an empty document.
    fn read_document(&self) -> Result<Map<String, Value>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(e.into()),
        };
        if contents.trim().is_empty() {
            return Ok(Map::new());
        }
        Ok(serde_json::from_str(&contents)?)
    }

    /// Device identifiers with a stored table.
    pub fn device_ids(&self) -> Result<Vec<String>> {
        Ok(self.read_document()?.keys().cloned().collect())
    }
}

impl MappingStore for JsonFileStore {
    fn load(&self, device_id: &str) -> Result<Option<MappingTable>> {
        let mut document = self.read_document()?;
        let Some(entry) = document.remove(device_id) else {
            return Ok(None);
        };
        serde_json::from_value(entry)
            .map(Some)
            .map_err(|e| RelayPilotError::MalformedMappings {
                device: device_id.to_string(),
                reason: e.to_string(),
            })
    }

    fn save(&mut self, device_id: &str, table: &MappingTable) -> Result<()> {
        let mut document = match self.read_document() {
            Ok(document) => document,
            Err(RelayPilotError::Json(e)) => {
                let aside = self.path.with_extension("json.corrupt");
                warn!(
                    "Mappings file {} is not valid JSON ({}), moving it to {} and starting a new one",
                    self.path.display(),
                    e,
                    aside.display()
                );
                fs::rename(&self.path, &aside)?;
                Map::new()
            }
            Err(e) => return Err(e),
        };
        document.insert(device_id.to_string(), serde_json::to_value(table)?);

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        // Write then rename so a crash never leaves a truncated document
        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, serde_json::to_string_pretty(&Value::Object(document))?)?;
        fs::rename(&staging, &self.path)?;

        debug!("Saved mappings for {} to {}", device_id, self.path.display());
        Ok(())
    }
}

/// Whether the in-memory table may differ from the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableState {
    /// Freshly loaded or synthesized; nothing to write.
    Loaded,
    /// Edited since the last load or save.
    Dirty,
}

/// Keeps the active device's table in sync with a [`MappingStore`].
pub struct PersistenceBridge<M: MappingStore> {
    store: M,
    device_id: Option<String>,
    table: MappingTable,
    /// Copy of what the store holds for `device_id`, if anything.
    stored: Option<MappingTable>,
    state: TableState,
}

impl<M: MappingStore> PersistenceBridge<M> {
    /// Bridge with no device; the table holds catalog defaults.
    pub fn new(store: M, catalog: &ActionCatalog) -> Self {
        Self {
            store,
            device_id: None,
            table: MappingTable::defaults(catalog),
            stored: None,
            state: TableState::Loaded,
        }
    }

    /// Loads the table for `device_id`, or synthesizes defaults.
    ///
    /// Malformed or unreadable entries fall back to defaults. Loading never
    /// marks the table dirty.
    pub fn select(&mut self, device_id: &str, catalog: &ActionCatalog) -> &MappingTable {
        let (table, stored) = match self.store.load(device_id) {
            Ok(Some(stored)) => {
                let unknown = stored.unknown_actions();
                if !unknown.is_empty() {
                    warn!("Stored mappings for {} name unknown actions {:?}, keeping them unused", device_id, unknown);
                }
                let mut table = stored.clone();
                let filled = table.fill_missing(catalog);
                if !filled.is_empty() {
                    debug!("Filled defaults for {:?} on {}", filled, device_id);
                }
                info!("Loaded mappings for {}", device_id);
                (table, Some(stored))
            }
            Ok(None) => {
                info!("No stored mappings for {}, using defaults", device_id);
                (MappingTable::defaults(catalog), None)
            }
            Err(e) => {
                warn!("Ignoring stored mappings for {}: {}", device_id, e);
                (MappingTable::defaults(catalog), None)
            }
        };

        for (action, mapping) in table.iter() {
            if mapping.axis_config.is_some_and(|cfg| cfg.is_zero_range()) {
                warn!("Axis config of {} on {} has min == max, values will read 0", action, device_id);
            }
        }

        self.device_id = Some(device_id.to_string());
        self.table = table;
        self.stored = stored;
        self.state = TableState::Loaded;
        &self.table
    }

    #[must_use]
    pub fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }

    #[must_use]
    pub fn table(&self) -> &MappingTable {
        &self.table
    }

    #[must_use]
    pub fn state(&self) -> TableState {
        self.state
    }

    /// Applies a user edit; the table turns dirty if the edit changed it.
    pub fn update<R>(&mut self, edit: impl FnOnce(&mut MappingTable) -> R) -> R {
        let before = self.table.clone();
        let result = edit(&mut self.table);
        if self.table != before {
            self.state = TableState::Dirty;
        }
        result
    }

    /// Whether a flush would write.
    #[must_use]
    pub fn needs_save(&self) -> bool {
        self.device_id.is_some()
            && self.state == TableState::Dirty
            && self.stored.as_ref() != Some(&self.table)
    }

    /// Writes a dirty table back to the store.
    ///
    /// Returns `Ok(true)` if a write happened. Tables equal to the stored copy
    /// are not rewritten.
    ///
    /// # Errors
    ///
    /// Store errors; the table stays dirty so the next flush retries.
    pub fn flush(&mut self) -> Result<bool> {
        let Some(device_id) = self.device_id.as_deref() else {
            return Ok(false);
        };
        if !self.needs_save() {
            self.state = TableState::Loaded;
            return Ok(false);
        }

        self.store.save(device_id, &self.table)?;
        info!("Saved mappings for {}", device_id);
        self.stored = Some(self.table.clone());
        self.state = TableState::Loaded;
        Ok(true)
    }
}
