//! Device controllers for the platforms a project can be opened on
//!
//! A [`DeviceController`] is a resolved, ready-to-use device (a booted iOS
//! simulator or an attached Android device). [`DeviceResolver`] finds one for
//! a platform; [`SystemDeviceResolver`] does so with the host's tooling.

use std::path::PathBuf;

use async_trait::async_trait;
use devport_core::prelude::*;
use devport_core::RuntimePlatform;

use crate::adb::{self, AdbDevice};
use crate::simulators::{self, IosSimulator};
use crate::ToolAvailability;

/// A device that can have apps inspected and URLs opened on it
#[async_trait]
pub trait DeviceController: Send + Sync {
    /// Human-readable device name
    fn name(&self) -> &str;

    fn platform(&self) -> RuntimePlatform;

    /// Whether an app (bundle id / package name) is installed
    async fn is_app_installed(&self, app_id: &str) -> Result<bool>;

    /// Open a URL with whatever app handles it on the device
    async fn open_url(&self, url: &str) -> Result<()>;

    /// Launch an app directly, bypassing URL handling
    async fn launch_app(&self, app_id: &str) -> Result<()>;

    /// Bring the device window to the foreground
    async fn activate_window(&self) -> Result<()> {
        Ok(())
    }

    /// Make `localhost:<port>` on the device reach the host
    async fn forward_port(&self, _port: u16) -> Result<()> {
        Ok(())
    }
}

/// Finds a device for a platform
#[async_trait]
pub trait DeviceResolver: Send + Sync {
    /// `device` narrows the search to a name, UDID or adb serial
    async fn resolve(
        &self,
        platform: RuntimePlatform,
        device: Option<&str>,
    ) -> Result<Box<dyn DeviceController>>;
}

// ─────────────────────────────────────────────────────────────────────────────
// iOS Simulator
// ─────────────────────────────────────────────────────────────────────────────

/// A booted iOS simulator
#[derive(Debug, Clone)]
pub struct SimulatorDevice {
    simulator: IosSimulator,
}

impl SimulatorDevice {
    pub fn new(simulator: IosSimulator) -> Self {
        Self { simulator }
    }
}

#[async_trait]
impl DeviceController for SimulatorDevice {
    fn name(&self) -> &str {
        &self.simulator.name
    }

    fn platform(&self) -> RuntimePlatform {
        RuntimePlatform::Ios
    }

    async fn is_app_installed(&self, app_id: &str) -> Result<bool> {
        simulators::is_app_installed(&self.simulator.udid, app_id).await
    }

    async fn open_url(&self, url: &str) -> Result<()> {
        simulators::open_url(&self.simulator.udid, url).await
    }

    async fn launch_app(&self, app_id: &str) -> Result<()> {
        simulators::launch_app(&self.simulator.udid, app_id).await
    }

    async fn activate_window(&self) -> Result<()> {
        simulators::activate_simulator_window().await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Android
// ─────────────────────────────────────────────────────────────────────────────

/// An Android device or emulator attached to adb
#[derive(Debug, Clone)]
pub struct AndroidDevice {
    device: AdbDevice,
    name: String,
    adb: PathBuf,
}

impl AndroidDevice {
    pub fn new(device: AdbDevice, adb: PathBuf) -> Self {
        let name = device.display_name();
        Self { device, name, adb }
    }
}

#[async_trait]
impl DeviceController for AndroidDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn platform(&self) -> RuntimePlatform {
        RuntimePlatform::Android
    }

    async fn is_app_installed(&self, app_id: &str) -> Result<bool> {
        adb::is_package_installed(&self.adb, &self.device.serial, app_id).await
    }

    async fn open_url(&self, url: &str) -> Result<()> {
        adb::open_url(&self.adb, &self.device.serial, url).await
    }

    /// `app_id` is a component name such as `com.example/.MainActivity`
    async fn launch_app(&self, app_id: &str) -> Result<()> {
        adb::launch_activity(&self.adb, &self.device.serial, app_id).await
    }

    async fn forward_port(&self, port: u16) -> Result<()> {
        adb::reverse_port(&self.adb, &self.device.serial, port).await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Resolution
// ─────────────────────────────────────────────────────────────────────────────

/// Resolves devices using `xcrun simctl` and `adb` on this machine
#[derive(Debug, Clone, Default)]
pub struct SystemDeviceResolver {
    tools: ToolAvailability,
}

impl SystemDeviceResolver {
    pub fn new(tools: ToolAvailability) -> Self {
        Self { tools }
    }
}

#[async_trait]
impl DeviceResolver for SystemDeviceResolver {
    async fn resolve(
        &self,
        platform: RuntimePlatform,
        device: Option<&str>,
    ) -> Result<Box<dyn DeviceController>> {
        match platform {
            RuntimePlatform::Ios => {
                if let Some(message) = self.tools.ios_unavailable_message() {
                    return Err(Error::tool_not_found(message));
                }
                let simulator = simulators::list_booted_simulators()
                    .await?
                    .into_iter()
                    .find(|s| device.map_or(true, |d| s.name == d || s.udid == d))
                    .ok_or_else(|| match device {
                        Some(d) => Error::process(format!("No booted iOS simulator named {d}")),
                        None => Error::process("No booted iOS simulator found"),
                    })?;
                debug!("Using simulator {} ({})", simulator.name, simulator.udid);
                Ok(Box::new(SimulatorDevice::new(simulator)))
            }
            RuntimePlatform::Android => {
                let adb_path = self.tools.adb_path.clone().ok_or_else(|| {
                    Error::tool_not_found(
                        self.tools
                            .android_unavailable_message()
                            .unwrap_or("adb"),
                    )
                })?;
                let mut devices = adb::list_adb_devices(&adb_path).await?;
                if let Some(wanted) = device {
                    devices.retain(|d| d.serial == wanted || d.model.as_deref() == Some(wanted));
                }
                let picked = pick_android_device(devices)?;
                debug!("Using Android device {}", picked.serial);
                Ok(Box::new(AndroidDevice::new(picked, adb_path)))
            }
        }
    }
}

/// Prefer the first ready device; explain when only unusable ones exist
fn pick_android_device(devices: Vec<AdbDevice>) -> Result<AdbDevice> {
    if let Some(unauthorized) = devices.iter().find(|d| d.state == "unauthorized") {
        if !devices.iter().any(AdbDevice::is_ready) {
            return Err(Error::process(format!(
                "Device {} is unauthorized. Accept the USB debugging prompt on the device.",
                unauthorized.serial
            )));
        }
    }

    devices
        .into_iter()
        .find(AdbDevice::is_ready)
        .ok_or_else(|| Error::process("No Android device or emulator is connected"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adb_device(serial: &str, state: &str) -> AdbDevice {
        AdbDevice {
            serial: serial.to_string(),
            state: state.to_string(),
            model: None,
        }
    }

    #[test]
    fn test_pick_android_device_prefers_ready() {
        let picked = pick_android_device(vec![
            adb_device("offline-1", "offline"),
            adb_device("emulator-5554", "device"),
        ])
        .unwrap();
        assert_eq!(picked.serial, "emulator-5554");
    }

    #[test]
    fn test_pick_android_device_unauthorized() {
        let err = pick_android_device(vec![adb_device("R58M", "unauthorized")]).unwrap_err();
        assert!(err.to_string().contains("unauthorized"));
    }

    #[test]
    fn test_pick_android_device_none() {
        let err = pick_android_device(Vec::new()).unwrap_err();
        assert!(err.to_string().contains("No Android device"));
    }

    #[test]
    fn test_android_device_name_uses_model() {
        let device = AdbDevice {
            serial: "emulator-5554".to_string(),
            state: "device".to_string(),
            model: Some("Pixel 6".to_string()),
        };
        let controller = AndroidDevice::new(device, PathBuf::from("adb"));
        assert_eq!(controller.name(), "Pixel 6");
        assert_eq!(controller.platform(), RuntimePlatform::Android);
    }

    #[tokio::test]
    async fn test_resolver_without_adb() {
        let resolver = SystemDeviceResolver::default();
        let result = resolver.resolve(RuntimePlatform::Android, None).await;
        assert!(matches!(result, Err(Error::ToolNotFound { .. })));
    }

    #[tokio::test]
    async fn test_resolver_without_simctl() {
        let resolver = SystemDeviceResolver::default();
        let result = resolver.resolve(RuntimePlatform::Ios, Some("iPhone 15")).await;
        assert!(matches!(result, Err(Error::ToolNotFound { .. })));
    }
}
