//! Configuration types for devport
//!
//! Defines:
//! - `Settings` - Project settings loaded from `.devport/config.toml`
//! - One sub-struct per TOML section
//! - `EnvOverrides` - Environment switches captured at load time

use devport_core::{HostType, ManifestType};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Project settings (.devport/config.toml)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub tunnel: TunnelSettings,

    #[serde(default)]
    pub session: SessionSettings,

    #[serde(default)]
    pub manifest: ManifestSettings,

    #[serde(default)]
    pub platforms: PlatformSettings,

    /// Not part of the file; filled from the process environment
    #[serde(skip)]
    pub env: EnvOverrides,
}

/// Dev server settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerSettings {
    /// Port used when the caller does not request one
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub https: bool,

    #[serde(default)]
    pub host_type: HostType,

    /// Explicit hostname for constructed URLs
    #[serde(default)]
    pub hostname: Option<String>,

    /// Custom app scheme, used by development clients
    #[serde(default)]
    pub scheme: Option<String>,

    /// Open projects in a development build instead of Expo Go
    #[serde(default)]
    pub dev_client: bool,

    /// Scheme registered by the Expo Go runtime
    #[serde(default = "default_runtime_scheme")]
    pub runtime_scheme: String,

    #[serde(default = "default_close_timeout_ms")]
    pub close_timeout_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: default_port(),
            https: false,
            host_type: HostType::default(),
            hostname: None,
            scheme: None,
            dev_client: false,
            runtime_scheme: default_runtime_scheme(),
            close_timeout_ms: default_close_timeout_ms(),
        }
    }
}

impl ServerSettings {
    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }
}

fn default_port() -> u16 {
    3000
}

fn default_runtime_scheme() -> String {
    "exp".to_string()
}

fn default_close_timeout_ms() -> u64 {
    2000
}

/// Tunnel settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TunnelSettings {
    /// ngrok executable, resolved on PATH
    #[serde(default = "default_tunnel_command")]
    pub command: String,

    #[serde(default = "default_start_timeout_ms")]
    pub start_timeout_ms: u64,

    #[serde(default)]
    pub authtoken: Option<String>,

    #[serde(default)]
    pub region: Option<String>,
}

impl Default for TunnelSettings {
    fn default() -> Self {
        Self {
            command: default_tunnel_command(),
            start_timeout_ms: default_start_timeout_ms(),
            authtoken: None,
            region: None,
        }
    }
}

impl TunnelSettings {
    pub fn start_timeout(&self) -> Duration {
        Duration::from_millis(self.start_timeout_ms)
    }
}

fn default_tunnel_command() -> String {
    "ngrok".to_string()
}

fn default_start_timeout_ms() -> u64 {
    10_000
}

/// Development session reporting
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,

    #[serde(default = "default_start_timeout_ms")]
    pub start_timeout_ms: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            api_url: default_api_url(),
            heartbeat_secs: default_heartbeat_secs(),
            start_timeout_ms: default_start_timeout_ms(),
        }
    }
}

impl SessionSettings {
    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }

    pub fn start_timeout(&self) -> Duration {
        Duration::from_millis(self.start_timeout_ms)
    }
}

fn default_api_url() -> String {
    "https://exp.host/--/api/v2".to_string()
}

fn default_heartbeat_secs() -> u64 {
    20
}

/// Manifest settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ManifestSettings {
    /// Serializer used when a request does not force one
    #[serde(default)]
    pub default_type: ManifestType,

    /// Entry module, without the `.bundle` suffix
    #[serde(default = "default_main_module")]
    pub main_module: String,

    #[serde(default)]
    pub minify: bool,

    #[serde(default = "default_true")]
    pub dev: bool,
}

impl Default for ManifestSettings {
    fn default() -> Self {
        Self {
            default_type: ManifestType::default(),
            main_module: default_main_module(),
            minify: false,
            dev: true,
        }
    }
}

fn default_main_module() -> String {
    "index".to_string()
}

/// App identifiers on each platform
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlatformSettings {
    /// Expo Go bundle identifier on iOS
    #[serde(default = "default_ios_bundle_id")]
    pub ios_bundle_id: String,

    /// Expo Go package on Android
    #[serde(default = "default_android_package")]
    pub android_package: String,

    #[serde(default)]
    pub dev_client_bundle_id: Option<String>,

    #[serde(default)]
    pub dev_client_package: Option<String>,

    /// Component started when a development build is launched directly
    #[serde(default)]
    pub android_launch_activity: Option<String>,
}

impl Default for PlatformSettings {
    fn default() -> Self {
        Self {
            ios_bundle_id: default_ios_bundle_id(),
            android_package: default_android_package(),
            dev_client_bundle_id: None,
            dev_client_package: None,
            android_launch_activity: None,
        }
    }
}

fn default_ios_bundle_id() -> String {
    "host.exp.Exponent".to_string()
}

fn default_android_package() -> String {
    "host.exp.exponent".to_string()
}

fn default_true() -> bool {
    true
}

/// Environment switches that change dev server behavior
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOverrides {
    /// `EXPO_OFFLINE`: no tunnel, no session reporting
    pub offline: bool,
    /// `CI`: no session reporting
    pub ci: bool,
    /// `EXPO_NO_REDIRECT_PAGE`: never use the interstitial page
    pub no_redirect_page: bool,
    /// `EXPO_PACKAGER_PROXY_URL`
    pub proxy_url: Option<String>,
    /// `REACT_NATIVE_PACKAGER_HOSTNAME`
    pub packager_hostname: Option<String>,
}

impl EnvOverrides {
    /// Read the overrides from the current process environment
    pub fn from_env() -> Self {
        Self {
            offline: env_flag("EXPO_OFFLINE"),
            ci: env_flag("CI"),
            no_redirect_page: env_flag("EXPO_NO_REDIRECT_PAGE"),
            proxy_url: env_string("EXPO_PACKAGER_PROXY_URL"),
            packager_hostname: env_string("REACT_NATIVE_PACKAGER_HOSTNAME"),
        }
    }
}

/// Unset, empty, `0` and `false` are off
fn env_flag(name: &str) -> bool {
    match std::env::var(name) {
        Ok(value) => {
            let value = value.trim();
            !(value.is_empty() || value == "0" || value.eq_ignore_ascii_case("false"))
        }
        Err(_) => false,
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
