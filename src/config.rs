//! # Engine Configuration
//!
//! Tunables for snapping, history and locking. Every field has a default, so
//! an empty JSON object (or no file at all) is a valid configuration.
//!
//! ```
//! use easel::config::EngineConfig;
//!
//! let config: EngineConfig = serde_json::from_str(r#"{"gridSize": 8}"#).unwrap();
//! assert_eq!(config.grid_size, 8.0);
//! assert_eq!(config.history_depth, 50);
//! ```

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::EaselError;
use crate::snap::SnapOptions;

pub const DEFAULT_GRID_SIZE: f64 = 10.0;
pub const DEFAULT_HISTORY_DEPTH: usize = 50;
pub const DEFAULT_DEBOUNCE_MS: u64 = 250;
pub const DEFAULT_LOCK_TTL_SECS: u64 = 300;
pub const DEFAULT_LOCK_REFRESH_SECS: u64 = 75;
pub const DEFAULT_GRID_COLUMNS: u32 = 4;
/// One day. Longer leases are cut to this.
pub const MAX_LOCK_TTL_SECS: u64 = 86_400;
pub const MAX_DEBOUNCE_MS: u64 = 60_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Grid pitch in canvas pixels; also the element-snap threshold.
    pub grid_size: f64,
    pub grid_enabled: bool,
    pub element_snap_enabled: bool,
    /// Maximum number of history snapshots kept.
    pub history_depth: usize,
    /// Window within which debounced pushes of the same operation coalesce.
    pub debounce_ms: u64,
    pub lock_ttl_secs: u64,
    /// How often an open session refreshes its lock. Must stay well under the TTL.
    pub lock_refresh_secs: u64,
    /// Columns used by grid-direction series that do not set their own.
    pub grid_columns: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            grid_size: DEFAULT_GRID_SIZE,
            grid_enabled: true,
            element_snap_enabled: true,
            history_depth: DEFAULT_HISTORY_DEPTH,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            lock_ttl_secs: DEFAULT_LOCK_TTL_SECS,
            lock_refresh_secs: DEFAULT_LOCK_REFRESH_SECS,
            grid_columns: DEFAULT_GRID_COLUMNS,
        }
    }
}

impl EngineConfig {
    /// Load from a JSON file, then clamp out-of-range values.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, EaselError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: EngineConfig = serde_json::from_str(&text)
            .map_err(|e| EaselError::Config(format!("{}: {}", path.display(), e)))?;
        Ok(config.validated())
    }

    /// Replace values that would break the engine with their defaults.
    pub fn validated(mut self) -> Self {
        if !self.grid_size.is_finite() || self.grid_size <= 0.0 {
            self.grid_size = DEFAULT_GRID_SIZE;
        }
        if self.history_depth == 0 {
            self.history_depth = DEFAULT_HISTORY_DEPTH;
        }
        if self.lock_ttl_secs == 0 {
            self.lock_ttl_secs = DEFAULT_LOCK_TTL_SECS;
        }
        self.lock_ttl_secs = self.lock_ttl_secs.min(MAX_LOCK_TTL_SECS);
        self.debounce_ms = self.debounce_ms.min(MAX_DEBOUNCE_MS);
        if self.lock_refresh_secs == 0 || self.lock_refresh_secs >= self.lock_ttl_secs {
            self.lock_refresh_secs = (self.lock_ttl_secs / 4).max(1);
        }
        if self.grid_columns == 0 {
            self.grid_columns = DEFAULT_GRID_COLUMNS;
        }
        self
    }

    pub fn snap_options(&self) -> SnapOptions {
        SnapOptions {
            grid_size: self.grid_size,
            grid_enabled: self.grid_enabled,
            element_snap_enabled: self.element_snap_enabled,
        }
    }

    pub fn debounce_window(&self) -> Duration {
        Duration::milliseconds(self.debounce_ms.min(MAX_DEBOUNCE_MS) as i64)
    }

    pub fn lock_ttl(&self) -> Duration {
        Duration::seconds(self.lock_ttl_secs.min(MAX_LOCK_TTL_SECS) as i64)
    }

    pub fn lock_refresh_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.lock_refresh_secs)
    }
}
