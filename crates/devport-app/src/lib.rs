//! devport-app - Dev server orchestration for devport
//!
//! This crate owns the [`DevServer`] lifecycle: starting a [`Bundler`]'s
//! server, building URLs for every client, the optional public tunnel, the
//! development session reporter and launching the project on simulators,
//! emulators and the desktop browser. Configuration loading lives here too.

pub mod config;
pub mod dev_server;
pub mod dev_session;
pub mod launcher;
pub mod manifest;
pub mod message_server;
pub mod network;
pub mod server;
pub mod session_urls;
pub mod tunnel;
pub mod url_creator;

// Re-export primary types
pub use config::{load_settings, resolve_project_root, Settings};
pub use dev_server::DevServer;
pub use dev_session::{DevelopmentSession, SessionBackend};
pub use launcher::{
    BrowserOpener, CustomRuntimeProps, LaunchOptions, LaunchResult, LauncherRegistry,
    PlatformLauncher,
};
pub use manifest::{ManifestMiddleware, ManifestRequestOptions};
pub use message_server::MessageServerBundler;
pub use server::{Bundler, LocalBundler, LocationOptions, ServerInstance, StartOptions};
pub use session_urls::SessionUrls;
pub use tunnel::{Tunnel, TunnelFactory};
pub use url_creator::UrlCreator;

// Re-export daemon types for the binary
pub use devport_daemon::ToolAvailability;
