//! # devport-daemon - Device, Browser and Tunnel Tooling
//!
//! Thin adapters over the external programs the dev server drives:
//! `xcrun simctl` for iOS simulators, `adb` for Android devices, the
//! desktop browser opener and the `ngrok` tunnel process.
//!
//! Depends on [`devport_core`] for domain types and error handling.
//!
//! ## Public API
//!
//! ### Devices
//! - [`DeviceController`] - A resolved device: inspect apps, open URLs
//! - [`DeviceResolver`] / [`SystemDeviceResolver`] - Find a device for a platform
//!
//! ### Tunnel
//! - [`NgrokProcess`] - Spawn ngrok and wait for the public URL
//!
//! ### Platform Utilities
//! - [`open_browser()`] - Open a URL on the desktop
//! - [`ToolAvailability`] - Check for simctl, adb and ngrok

pub mod adb;
pub mod browser;
pub mod devices;
pub mod ngrok;
pub mod simulators;
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_utils;
pub mod tool_availability;

// Public API re-exports
pub use adb::{list_adb_devices, AdbDevice};
pub use browser::open_browser;
pub use devices::{
    AndroidDevice, DeviceController, DeviceResolver, SimulatorDevice, SystemDeviceResolver,
};
pub use ngrok::{parse_log_line, NgrokLogLine, NgrokOptions, NgrokProcess};
pub use simulators::{list_booted_simulators, IosSimulator, SimulatorState};
pub use tool_availability::ToolAvailability;
