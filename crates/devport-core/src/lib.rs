//! # devport-core - Core Domain Types
//!
//! Foundation crate for devport. Provides domain types, error handling and
//! logging setup shared by the daemon (tooling) and app (orchestration) crates.
//!
//! This crate has **zero internal dependencies**.
//!
//! ## Public API
//!
//! ### Domain Types (`types`)
//! - [`HostType`] - How clients address the server (LAN, tunnel, localhost)
//! - [`Location`] - Bound address of a running dev server
//! - [`UrlOptions`] - Partial scheme/host overrides for URL construction
//! - [`LaunchTarget`] - Simulator, emulator or desktop browser
//! - [`RuntimePlatform`] - Native platform family (iOS, Android)
//! - [`RuntimeKind`] - Preferred client (Expo Go, development client, web)
//! - [`ManifestType`] - Registered manifest serializers
//!
//! ### Error Handling (`error`)
//! - [`Error`] - Error enum covering lifecycle, addressing and collaborator failures
//! - [`Result`] - Type alias for `std::result::Result<T, Error>`
//! - [`ResultExt`] - Extension trait for adding error context
//!
//! ## Prelude
//!
//! Import commonly used types with:
//! ```rust
//! use devport_core::prelude::*;
//! ```

pub mod error;
pub mod logging;
pub mod types;

/// Prelude for common imports used throughout all devport crates
pub mod prelude {
    pub use super::error::{Error, Result, ResultExt};
    pub use tracing::{debug, error, info, instrument, trace, warn};
}

pub use error::{Error, Result, ResultExt};
pub use types::{
    HostType, LaunchTarget, Location, ManifestType, RuntimeKind, RuntimePlatform,
    UrlOptions,
};
