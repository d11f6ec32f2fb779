//! # weft-settings
//!
//! Configuration for the orchestration engine, loaded from three layers
//! (in priority order):
//! 1. **Compiled defaults**: [`WeftSettings::default()`]
//! 2. **User file**: `~/.weft/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `WEFT_*` overrides (highest priority)
//!
//! There is no global instance. Callers load settings once and hand the
//! relevant sections to the components that need them.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, home_dir, load_settings, load_settings_from_path, settings_path};
pub use types::*;
