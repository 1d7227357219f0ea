//! Test utilities for device tooling
//!
//! Provides an in-memory [`DeviceController`] that records what was asked of
//! it, and a resolver that hands it out.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use devport_core::prelude::*;
use devport_core::RuntimePlatform;

use crate::devices::{DeviceController, DeviceResolver};

/// Everything a [`RecordingDevice`] was asked to do
#[derive(Debug, Default, Clone)]
pub struct DeviceLog {
    pub opened_urls: Vec<String>,
    pub launched_apps: Vec<String>,
    pub forwarded_ports: Vec<u16>,
    pub activations: usize,
}

/// A device whose installed apps are fixed up front
#[derive(Debug, Clone)]
pub struct RecordingDevice {
    name: String,
    platform: RuntimePlatform,
    installed: Vec<String>,
    log: Arc<Mutex<DeviceLog>>,
}

impl RecordingDevice {
    pub fn new(platform: RuntimePlatform, installed: &[&str]) -> Self {
        Self {
            name: format!("Test {}", platform),
            platform,
            installed: installed.iter().map(|s| s.to_string()).collect(),
            log: Arc::new(Mutex::new(DeviceLog::default())),
        }
    }

    /// Snapshot of the recorded calls
    pub fn log(&self) -> DeviceLog {
        self.log.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl DeviceController for RecordingDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn platform(&self) -> RuntimePlatform {
        self.platform
    }

    async fn is_app_installed(&self, app_id: &str) -> Result<bool> {
        Ok(self.installed.iter().any(|a| a == app_id))
    }

    async fn open_url(&self, url: &str) -> Result<()> {
        self.log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .opened_urls
            .push(url.to_string());
        Ok(())
    }

    async fn launch_app(&self, app_id: &str) -> Result<()> {
        self.log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .launched_apps
            .push(app_id.to_string());
        Ok(())
    }

    async fn activate_window(&self) -> Result<()> {
        self.log.lock().unwrap_or_else(|e| e.into_inner()).activations += 1;
        Ok(())
    }

    async fn forward_port(&self, port: u16) -> Result<()> {
        self.log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .forwarded_ports
            .push(port);
        Ok(())
    }
}

/// Resolves every platform to a clone of the same [`RecordingDevice`]
#[derive(Debug, Clone)]
pub struct StaticResolver {
    device: RecordingDevice,
}

impl StaticResolver {
    pub fn new(device: RecordingDevice) -> Self {
        Self { device }
    }
}

#[async_trait]
impl DeviceResolver for StaticResolver {
    async fn resolve(
        &self,
        _platform: RuntimePlatform,
        _device: Option<&str>,
    ) -> Result<Box<dyn DeviceController>> {
        Ok(Box::new(self.device.clone()))
    }
}
