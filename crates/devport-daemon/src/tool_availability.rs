//! Tool availability checking for device management
//!
//! This module provides functionality to check for the availability of external tools
//! needed to open projects on devices and to expose the server publicly:
//! `xcrun simctl` (iOS), `adb` (Android SDK) and `ngrok` (tunnel).

use std::path::PathBuf;

/// Cached availability of external tools
#[derive(Debug, Clone, Default)]
pub struct ToolAvailability {
    /// Whether `xcrun simctl` is available (macOS with Xcode)
    pub xcrun_simctl: bool,

    /// Path to `adb` if found (Android SDK platform-tools)
    pub adb_path: Option<PathBuf>,

    /// Path to the tunnel command if found
    pub ngrok_path: Option<PathBuf>,
}

impl ToolAvailability {
    /// Check tool availability (run once at startup)
    pub async fn check(ngrok_command: &str) -> Self {
        let xcrun_simctl = Self::check_xcrun_simctl().await;
        let adb_path = Self::find_adb();
        let ngrok_path = which::which(ngrok_command)
            .inspect_err(|e| tracing::debug!("{} not found in PATH: {}", ngrok_command, e))
            .ok();

        Self {
            xcrun_simctl,
            adb_path,
            ngrok_path,
        }
    }

    /// Check if xcrun simctl is available
    async fn check_xcrun_simctl() -> bool {
        // Only available on macOS
        #[cfg(not(target_os = "macos"))]
        return false;

        #[cfg(target_os = "macos")]
        {
            use std::process::Stdio;
            use tokio::process::Command;

            Command::new("xcrun")
                .args(["simctl", "help"])
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await
                .map(|s| s.success())
                .inspect_err(|e| tracing::debug!("xcrun simctl check failed: {}", e))
                .unwrap_or(false)
        }
    }

    /// Locate `adb`, preferring PATH over the SDK locations
    fn find_adb() -> Option<PathBuf> {
        if let Ok(path) = which::which("adb") {
            return Some(path);
        }

        Self::get_adb_paths().into_iter().find(|p| p.is_file())
    }

    /// Get list of SDK paths to try for the adb command
    fn get_adb_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        // Check ANDROID_HOME/platform-tools/adb
        if let Ok(android_home) = std::env::var("ANDROID_HOME") {
            paths.push(PathBuf::from(android_home).join("platform-tools").join("adb"));
        }

        // Check ANDROID_SDK_ROOT/platform-tools/adb
        if let Ok(sdk_root) = std::env::var("ANDROID_SDK_ROOT") {
            paths.push(PathBuf::from(sdk_root).join("platform-tools").join("adb"));
        }

        paths
    }

    /// Get user-friendly message for unavailable iOS tools
    pub fn ios_unavailable_message(&self) -> Option<&'static str> {
        if self.xcrun_simctl {
            None
        } else {
            #[cfg(target_os = "macos")]
            {
                Some("Xcode not installed. Install Xcode to open projects in iOS simulators.")
            }

            #[cfg(not(target_os = "macos"))]
            {
                Some("iOS simulators are only available on macOS.")
            }
        }
    }

    /// Get user-friendly message for unavailable Android tools
    pub fn android_unavailable_message(&self) -> Option<&'static str> {
        if self.adb_path.is_some() {
            None
        } else {
            Some("adb not found. Set ANDROID_HOME or install the Android SDK platform-tools.")
        }
    }

    /// Get user-friendly message for an unavailable tunnel command
    pub fn tunnel_unavailable_message(&self) -> Option<&'static str> {
        if self.ngrok_path.is_some() {
            None
        } else {
            Some("ngrok not found. Install ngrok to use tunnel connections.")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_tool_availability_default() {
        let availability = ToolAvailability::default();
        assert!(!availability.xcrun_simctl);
        assert!(availability.adb_path.is_none());
        assert!(availability.ngrok_path.is_none());
    }

    #[test]
    fn test_unavailable_messages() {
        let availability = ToolAvailability::default();
        assert!(availability.ios_unavailable_message().is_some());
        assert!(availability.android_unavailable_message().is_some());
        assert!(availability.tunnel_unavailable_message().is_some());
    }

    #[test]
    #[serial]
    fn test_adb_paths_includes_android_home() {
        std::env::set_var("ANDROID_HOME", "/test/android");
        let paths = ToolAvailability::get_adb_paths();
        assert!(paths
            .iter()
            .any(|p| p == &PathBuf::from("/test/android/platform-tools/adb")));
        std::env::remove_var("ANDROID_HOME");
    }

    #[test]
    #[serial]
    fn test_adb_paths_includes_sdk_root() {
        std::env::set_var("ANDROID_SDK_ROOT", "/test/sdk");
        let paths = ToolAvailability::get_adb_paths();
        assert!(paths.iter().any(|p| p.starts_with("/test/sdk")));
        std::env::remove_var("ANDROID_SDK_ROOT");
    }

    #[test]
    fn test_android_available_no_message() {
        let availability = ToolAvailability {
            xcrun_simctl: false,
            adb_path: Some(PathBuf::from("/path/to/adb")),
            ngrok_path: None,
        };
        assert!(availability.android_unavailable_message().is_none());
    }

    #[test]
    fn test_ios_available_no_message() {
        let availability = ToolAvailability {
            xcrun_simctl: true,
            adb_path: None,
            ngrok_path: Some(PathBuf::from("/usr/local/bin/ngrok")),
        };
        assert!(availability.ios_unavailable_message().is_none());
        assert!(availability.tunnel_unavailable_message().is_none());
    }
}
