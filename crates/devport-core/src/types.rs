//! Core domain types for devport

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Addressing
// ─────────────────────────────────────────────────────────────────────────────

/// How the dev server should be addressed by clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HostType {
    /// The machine's LAN-visible address
    #[default]
    Lan,
    /// The public address of an established tunnel
    Tunnel,
    /// Loopback only
    Localhost,
}

impl fmt::Display for HostType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostType::Lan => write!(f, "lan"),
            HostType::Tunnel => write!(f, "tunnel"),
            HostType::Localhost => write!(f, "localhost"),
        }
    }
}

impl FromStr for HostType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "lan" => Ok(HostType::Lan),
            "tunnel" => Ok(HostType::Tunnel),
            "localhost" => Ok(HostType::Localhost),
            other => Err(Error::config(format!("Unknown host type: {other}"))),
        }
    }
}

/// Address information of a bound dev server
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Location {
    /// Fully formed base URL, e.g. `http://localhost:3000`
    pub url: String,
    pub port: u16,
    /// `http` or `https`
    pub protocol: String,
    pub host: String,
}

impl Location {
    pub fn new(protocol: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        let protocol = protocol.into();
        let host = host.into();
        Self {
            url: format!("{protocol}://{host}:{port}"),
            port,
            protocol,
            host,
        }
    }
}

/// Partial addressing options; unset fields fall back to a creator's defaults
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlOptions {
    /// `None` produces a URL without a `scheme://` prefix
    pub scheme: Option<String>,
    pub host_type: Option<HostType>,
    pub hostname: Option<String>,
}

impl UrlOptions {
    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = Some(scheme.into());
        self
    }

    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    pub fn with_host_type(mut self, host_type: HostType) -> Self {
        self.host_type = Some(host_type);
        self
    }

    /// Fields set on `self` win over `defaults`
    pub fn merged_onto(&self, defaults: &UrlOptions) -> UrlOptions {
        UrlOptions {
            scheme: self.scheme.clone().or_else(|| defaults.scheme.clone()),
            host_type: self.host_type.or(defaults.host_type),
            hostname: self.hostname.clone().or_else(|| defaults.hostname.clone()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Launch Targets
// ─────────────────────────────────────────────────────────────────────────────

/// Where a project can be opened from the dev server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LaunchTarget {
    /// iOS simulator
    Simulator,
    /// Android emulator or device
    Emulator,
    /// Desktop web browser
    Desktop,
}

impl LaunchTarget {
    /// Native platform family of this target, `None` for the desktop browser
    pub fn platform(&self) -> Option<RuntimePlatform> {
        match self {
            LaunchTarget::Simulator => Some(RuntimePlatform::Ios),
            LaunchTarget::Emulator => Some(RuntimePlatform::Android),
            LaunchTarget::Desktop => None,
        }
    }
}

impl fmt::Display for LaunchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LaunchTarget::Simulator => write!(f, "simulator"),
            LaunchTarget::Emulator => write!(f, "emulator"),
            LaunchTarget::Desktop => write!(f, "desktop"),
        }
    }
}

impl FromStr for LaunchTarget {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "simulator" | "ios" => Ok(LaunchTarget::Simulator),
            "emulator" | "android" => Ok(LaunchTarget::Emulator),
            "desktop" | "web" => Ok(LaunchTarget::Desktop),
            other => Err(Error::config(format!("Unknown launch target: {other}"))),
        }
    }
}

/// Native platform family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimePlatform {
    Ios,
    Android,
}

impl RuntimePlatform {
    /// Value used in the `platform` query parameter of loading URLs
    pub fn as_query_value(&self) -> &'static str {
        match self {
            RuntimePlatform::Ios => "ios",
            RuntimePlatform::Android => "android",
        }
    }
}

impl fmt::Display for RuntimePlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimePlatform::Ios => write!(f, "iOS"),
            RuntimePlatform::Android => write!(f, "Android"),
        }
    }
}

/// Which client a launcher should prefer when opening a project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeKind {
    /// The generic Expo Go client
    Expo,
    /// A custom development client build
    Custom,
    /// The device's web browser
    Web,
}

impl fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeKind::Expo => write!(f, "expo"),
            RuntimeKind::Custom => write!(f, "custom"),
            RuntimeKind::Web => write!(f, "web"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Manifests
// ─────────────────────────────────────────────────────────────────────────────

/// Registered manifest serializers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
pub enum ManifestType {
    #[default]
    #[serde(rename = "classic")]
    Classic,
    #[serde(rename = "expo-updates")]
    ExpoUpdates,
}

impl ManifestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ManifestType::Classic => "classic",
            ManifestType::ExpoUpdates => "expo-updates",
        }
    }
}

impl fmt::Display for ManifestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ManifestType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "classic" => Ok(ManifestType::Classic),
            "expo-updates" => Ok(ManifestType::ExpoUpdates),
            other => Err(Error::unknown_manifest_type(other)),
        }
    }
}
