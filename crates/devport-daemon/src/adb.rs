//! Android device control via `adb`
//!
//! Lists attached devices and emulators with `adb devices -l`, checks for
//! installed packages, opens URLs through `am start` and sets up reverse
//! port forwarding so `localhost` URLs resolve on the device.

use devport_core::prelude::*;
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;
use tokio::process::Command;

/// Static regex pattern for extracting the model from `adb devices -l`
static MODEL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bmodel:(\S+)").expect("Invalid model pattern regex"));

/// A device attached to adb
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdbDevice {
    /// Serial used with `adb -s`
    pub serial: String,
    /// adb state: "device", "offline", "unauthorized", ...
    pub state: String,
    /// Model name with underscores replaced, if reported
    pub model: Option<String>,
}

impl AdbDevice {
    /// Whether the device is online and authorized
    pub fn is_ready(&self) -> bool {
        self.state == "device"
    }

    /// Whether this is an emulator rather than a physical device
    pub fn is_emulator(&self) -> bool {
        self.serial.starts_with("emulator-")
    }

    pub fn display_name(&self) -> String {
        self.model.clone().unwrap_or_else(|| self.serial.clone())
    }
}

/// List devices attached to adb
pub async fn list_adb_devices(adb: &Path) -> Result<Vec<AdbDevice>> {
    let stdout = run_adb(adb, &["devices", "-l"]).await?;
    Ok(parse_adb_devices(&stdout))
}

/// Parse the output of `adb devices -l`
///
/// Format:
/// ```text
/// List of devices attached
/// emulator-5554    device product:sdk_gphone64_x86_64 model:sdk_gphone64_x86_64 device:emu64x transport_id:1
/// ```
fn parse_adb_devices(output: &str) -> Vec<AdbDevice> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !line.starts_with("List of devices") && !line.starts_with('*'))
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let serial = parts.next()?.to_string();
            let state = parts.next()?.to_string();
            let model = MODEL_PATTERN
                .captures(line)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().replace('_', " "));

            Some(AdbDevice {
                serial,
                state,
                model,
            })
        })
        .collect()
}

/// Check whether `package` is installed on the device
pub async fn is_package_installed(adb: &Path, serial: &str, package: &str) -> Result<bool> {
    let stdout = run_adb(adb, &["-s", serial, "shell", "pm", "list", "packages", package]).await?;
    Ok(package_listed(&stdout, package))
}

/// `pm list packages <filter>` matches substrings, so look for the exact entry
fn package_listed(output: &str, package: &str) -> bool {
    output
        .lines()
        .filter_map(|line| line.trim().strip_prefix("package:"))
        .any(|name| name == package)
}

/// Open a URL on the device with an implicit VIEW intent
pub async fn open_url(adb: &Path, serial: &str, url: &str) -> Result<()> {
    // The remote shell re-parses the command line, so keep `&` and `?` literal
    let quoted = format!("'{}'", url.replace('\'', "'\\''"));
    let stdout = run_adb(
        adb,
        &[
            "-s",
            serial,
            "shell",
            "am",
            "start",
            "-a",
            "android.intent.action.VIEW",
            "-d",
            &quoted,
        ],
    )
    .await?;
    check_am_output(&stdout)
}

/// Start an activity by component name, e.g. `com.example/.MainActivity`
pub async fn launch_activity(adb: &Path, serial: &str, activity: &str) -> Result<()> {
    let stdout = run_adb(adb, &["-s", serial, "shell", "am", "start", "-n", activity]).await?;
    check_am_output(&stdout)
}

/// Forward `tcp:<port>` on the device back to the host
pub async fn reverse_port(adb: &Path, serial: &str, port: u16) -> Result<()> {
    let endpoint = format!("tcp:{}", port);
    run_adb(adb, &["-s", serial, "reverse", &endpoint, &endpoint])
        .await
        .map(|_| ())
}

/// `am start` reports failures on stdout with a zero exit code
fn check_am_output(stdout: &str) -> Result<()> {
    if let Some(line) = stdout.lines().find(|l| l.trim_start().starts_with("Error")) {
        return Err(Error::process(format!("am start failed: {}", line.trim())));
    }
    Ok(())
}

async fn run_adb(adb: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new(adb)
        .args(args)
        .output()
        .await
        .map_err(|e| Error::process(format!("Failed to run adb: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::process(format!(
            "adb {} failed: {}",
            args.join(" "),
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_adb_devices() {
        let output = "List of devices attached\n\
            emulator-5554          device product:sdk_gphone64_x86_64 model:sdk_gphone64_x86_64 device:emu64x transport_id:1\n\
            R58M123ABC             unauthorized usb:1-1 transport_id:2\n\n";
        let devices = parse_adb_devices(output);

        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].serial, "emulator-5554");
        assert!(devices[0].is_ready());
        assert!(devices[0].is_emulator());
        assert_eq!(
            devices[0].model.as_deref(),
            Some("sdk gphone64 x86 64")
        );
        assert_eq!(devices[1].serial, "R58M123ABC");
        assert!(!devices[1].is_ready());
        assert!(!devices[1].is_emulator());
        assert_eq!(devices[1].display_name(), "R58M123ABC");
    }

    #[test]
    fn test_parse_adb_devices_daemon_banner() {
        let output = "* daemon not running; starting now at tcp:5037\n\
            * daemon started successfully\n\
            List of devices attached\n";
        assert!(parse_adb_devices(output).is_empty());
    }

    #[test]
    fn test_parse_adb_devices_empty() {
        assert!(parse_adb_devices("").is_empty());
    }

    #[test]
    fn test_package_listed_exact_match() {
        let output = "package:host.exp.exponent\npackage:host.exp.exponent.dev\n";
        assert!(package_listed(output, "host.exp.exponent"));
        assert!(!package_listed(output, "host.exp"));
        assert!(!package_listed("", "host.exp.exponent"));
    }

    #[test]
    fn test_check_am_output() {
        assert!(check_am_output("Starting: Intent { act=android.intent.action.VIEW }").is_ok());

        let err = check_am_output(
            "Starting: Intent { cmp=com.example/.Main }\nError type 3\nError: Activity class does not exist.",
        )
        .unwrap_err();
        assert!(err.to_string().contains("Error type 3"));
    }
}
