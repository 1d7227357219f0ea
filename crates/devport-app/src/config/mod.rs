//! Configuration file parsing for devport
//!
//! Supports:
//! - `.devport/config.toml` - Project settings
//! - Environment overrides (`EXPO_OFFLINE`, `CI`, `EXPO_NO_REDIRECT_PAGE`, ...)

pub mod settings;
pub mod types;

pub use settings::{
    init_config_dir, is_interstitial_page_enabled, load_settings, resolve_project_root,
};
pub use types::*;
