//! iOS Simulator control via `xcrun simctl`
//!
//! Only the handful of operations the dev server needs: find booted
//! simulators, check for an installed app, open a URL and bring the
//! Simulator window to the front.

use devport_core::prelude::*;
use serde::Deserialize;
use std::collections::HashMap;
use std::process::Stdio;
use tokio::process::Command;

/// Simulator runtime prefix used by `simctl` runtime identifiers
const RUNTIME_PREFIX: &str = "com.apple.CoreSimulator.SimRuntime.";

/// State of an iOS simulator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulatorState {
    Shutdown,
    Booted,
    Booting,
    Unknown,
}

impl SimulatorState {
    fn from_simctl(state: &str) -> Self {
        match state {
            "Shutdown" => SimulatorState::Shutdown,
            "Booted" => SimulatorState::Booted,
            "Booting" => SimulatorState::Booting,
            _ => SimulatorState::Unknown,
        }
    }
}

/// An iOS simulator known to `simctl`
#[derive(Debug, Clone)]
pub struct IosSimulator {
    pub udid: String,
    pub name: String,
    /// Friendly runtime, e.g. "iOS 17.2"
    pub runtime: String,
    pub state: SimulatorState,
}

#[derive(Debug, Deserialize)]
struct SimctlDeviceList {
    devices: HashMap<String, Vec<SimctlDevice>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SimctlDevice {
    udid: String,
    name: String,
    state: String,
    #[serde(default = "default_available")]
    is_available: bool,
}

fn default_available() -> bool {
    true
}

/// List booted simulators
pub async fn list_booted_simulators() -> Result<Vec<IosSimulator>> {
    let output = simctl(&["list", "devices", "booted", "--json"]).await?;
    let mut simulators = parse_simctl_devices(&output)?;
    simulators.retain(|s| s.state == SimulatorState::Booted);
    Ok(simulators)
}

/// Parse the output of `xcrun simctl list devices --json`
fn parse_simctl_devices(json: &str) -> Result<Vec<IosSimulator>> {
    let list: SimctlDeviceList = serde_json::from_str(json)?;

    let mut simulators: Vec<IosSimulator> = list
        .devices
        .into_iter()
        .flat_map(|(runtime, devices)| {
            let runtime = runtime_display_name(&runtime);
            devices
                .into_iter()
                .filter(|d| d.is_available)
                .map(move |d| IosSimulator {
                    udid: d.udid,
                    name: d.name,
                    runtime: runtime.clone(),
                    state: SimulatorState::from_simctl(&d.state),
                })
        })
        .collect();

    // HashMap order is arbitrary; keep results stable for callers picking the first
    simulators.sort_by(|a, b| a.runtime.cmp(&b.runtime).then(a.name.cmp(&b.name)));
    Ok(simulators)
}

/// "com.apple.CoreSimulator.SimRuntime.iOS-17-2" -> "iOS 17.2"
fn runtime_display_name(identifier: &str) -> String {
    let Some(rest) = identifier.strip_prefix(RUNTIME_PREFIX) else {
        return identifier.to_string();
    };

    match rest.split_once('-') {
        Some((os, version)) => format!("{} {}", os, version.replace('-', ".")),
        None => rest.to_string(),
    }
}

/// Check whether an app with `bundle_id` is installed on the simulator
pub async fn is_app_installed(udid: &str, bundle_id: &str) -> Result<bool> {
    let status = Command::new("xcrun")
        .args(["simctl", "get_app_container", udid, bundle_id])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map_err(|e| Error::process(format!("Failed to run xcrun: {}", e)))?;

    Ok(status.success())
}

/// Open a URL on the simulator
pub async fn open_url(udid: &str, url: &str) -> Result<()> {
    simctl(&["openurl", udid, url]).await.map(|_| ())
}

/// Launch an installed app by bundle identifier
pub async fn launch_app(udid: &str, bundle_id: &str) -> Result<()> {
    simctl(&["launch", udid, bundle_id]).await.map(|_| ())
}

/// Bring the Simulator app to the foreground
pub async fn activate_simulator_window() -> Result<()> {
    let status = Command::new("open")
        .args(["-a", "Simulator"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map_err(|e| Error::process(format!("Failed to activate Simulator: {}", e)))?;

    if !status.success() {
        debug!("open -a Simulator exited with {:?}", status.code());
    }
    Ok(())
}

/// Run `xcrun simctl <args>` and return stdout
async fn simctl(args: &[&str]) -> Result<String> {
    let output = Command::new("xcrun")
        .arg("simctl")
        .args(args)
        .output()
        .await
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::tool_not_found("xcrun")
            } else {
                Error::process(format!("Failed to run xcrun simctl: {}", e))
            }
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::process(format!(
            "xcrun simctl {} failed: {}",
            args.first().copied().unwrap_or_default(),
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIMCTL_JSON: &str = r#"{
        "devices": {
            "com.apple.CoreSimulator.SimRuntime.iOS-17-2": [
                {"udid": "AAA", "name": "iPhone 15", "state": "Booted", "isAvailable": true},
                {"udid": "BBB", "name": "iPad Air", "state": "Shutdown", "isAvailable": true}
            ],
            "com.apple.CoreSimulator.SimRuntime.iOS-16-4": [
                {"udid": "CCC", "name": "iPhone 14", "state": "Booted", "isAvailable": false}
            ]
        }
    }"#;

    #[test]
    fn test_parse_simctl_devices() {
        let sims = parse_simctl_devices(SIMCTL_JSON).unwrap();

        // Unavailable devices are dropped
        assert_eq!(sims.len(), 2);
        let booted: Vec<_> = sims
            .iter()
            .filter(|s| s.state == SimulatorState::Booted)
            .collect();
        assert_eq!(booted.len(), 1);
        assert_eq!(booted[0].udid, "AAA");
        assert_eq!(booted[0].runtime, "iOS 17.2");
    }

    #[test]
    fn test_parse_simctl_devices_invalid_json() {
        assert!(matches!(
            parse_simctl_devices("not json"),
            Err(Error::Json(_))
        ));
    }

    #[test]
    fn test_runtime_display_name() {
        assert_eq!(
            runtime_display_name("com.apple.CoreSimulator.SimRuntime.iOS-17-2"),
            "iOS 17.2"
        );
        assert_eq!(
            runtime_display_name("com.apple.CoreSimulator.SimRuntime.watchOS-10-0"),
            "watchOS 10.0"
        );
        assert_eq!(runtime_display_name("custom"), "custom");
    }

    #[test]
    fn test_simulator_state_mapping() {
        assert_eq!(SimulatorState::from_simctl("Booted"), SimulatorState::Booted);
        assert_eq!(
            SimulatorState::from_simctl("Shutdown"),
            SimulatorState::Shutdown
        );
        assert_eq!(
            SimulatorState::from_simctl("Creating"),
            SimulatorState::Unknown
        );
    }
}
