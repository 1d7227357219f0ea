//! Platform manager: open a project on an iOS simulator or Android device

use std::sync::Arc;

use async_trait::async_trait;
use devport_core::prelude::*;
use devport_core::{RuntimeKind, RuntimePlatform, UrlOptions};
use devport_daemon::{DeviceController, DeviceResolver};

use super::{CustomRuntimeProps, LaunchOptions, LaunchResult, PlatformLauncher, RuntimeDescriptor};
use crate::config::PlatformSettings;
use crate::session_urls::SessionUrls;

/// App identifiers used on one platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformApps {
    /// Expo Go bundle id / package
    pub expo_go: String,
    /// The project's development build, if configured
    pub dev_client: Option<String>,
    /// Android component for direct launches
    pub launch_activity: Option<String>,
}

impl PlatformApps {
    pub fn for_platform(platform: RuntimePlatform, settings: &PlatformSettings) -> Self {
        match platform {
            RuntimePlatform::Ios => Self {
                expo_go: settings.ios_bundle_id.clone(),
                dev_client: settings.dev_client_bundle_id.clone(),
                launch_activity: None,
            },
            RuntimePlatform::Android => Self {
                expo_go: settings.android_package.clone(),
                dev_client: settings.dev_client_package.clone(),
                launch_activity: settings.android_launch_activity.clone(),
            },
        }
    }
}

/// Opens projects on devices of one platform
pub struct PlatformManager {
    platform: RuntimePlatform,
    urls: SessionUrls,
    resolver: Arc<dyn DeviceResolver>,
    apps: PlatformApps,
}

impl PlatformManager {
    pub fn new(
        platform: RuntimePlatform,
        urls: SessionUrls,
        resolver: Arc<dyn DeviceResolver>,
        apps: PlatformApps,
    ) -> Self {
        Self {
            platform,
            urls,
            resolver,
            apps,
        }
    }

    async fn resolve_device(&self, options: &LaunchOptions) -> Result<Box<dyn DeviceController>> {
        let device = self
            .resolver
            .resolve(self.platform, options.device.as_deref())
            .await?;
        if self.platform == RuntimePlatform::Android {
            // Lets `localhost` URLs on the device reach this machine
            if let Err(e) = device.forward_port(self.urls.port()).await {
                warn!("Could not forward port {} to {}: {}", self.urls.port(), device.name(), e);
            }
        }
        Ok(device)
    }

    async fn open_url_on(&self, device: &dyn DeviceController, url: &str) -> Result<()> {
        if let Err(e) = device.activate_window().await {
            debug!("Could not activate {}: {}", device.name(), e);
        }
        info!("Opening {} on {}", url, device.name());
        device.open_url(url).await
    }

    async fn open_in_expo_go(&self, options: &LaunchOptions) -> Result<LaunchResult> {
        let device = self.resolve_device(options).await?;

        let dev_build_installed = match &self.apps.dev_client {
            Some(id) => device.is_app_installed(id).await?,
            None => false,
        };
        let url = self.urls.expo_go_url(Some(self.platform), dev_build_installed)?;

        if !device.is_app_installed(&self.apps.expo_go).await? {
            return Err(Error::process(format!(
                "Expo Go ({}) is not installed on {}",
                self.apps.expo_go,
                device.name()
            )));
        }

        self.open_url_on(device.as_ref(), &url).await?;
        Ok(LaunchResult { url })
    }

    async fn open_in_custom_runtime(
        &self,
        props: &CustomRuntimeProps,
        options: &LaunchOptions,
    ) -> Result<LaunchResult> {
        let url = self.urls.custom_runtime_url(&UrlOptions {
            scheme: props.scheme.clone(),
            ..UrlOptions::default()
        })?;

        let app_id = props
            .application_id
            .clone()
            .or_else(|| self.apps.dev_client.clone())
            .ok_or_else(|| {
                Error::config(format!(
                    "No development build identifier is configured for {}",
                    self.platform
                ))
            })?;

        let device = self.resolve_device(options).await?;
        if !device.is_app_installed(&app_id).await? {
            return Err(Error::process(format!(
                "No development build ({}) for this project is installed. \
                 Please make and install a development build on the device first.",
                app_id
            )));
        }

        match url {
            Some(url) => {
                self.open_url_on(device.as_ref(), &url).await?;
                Ok(LaunchResult { url })
            }
            None => {
                let target = self.direct_launch_target(&app_id, props);
                info!("Launching {} on {}", target, device.name());
                device.launch_app(&target).await?;
                Ok(LaunchResult { url: target })
            }
        }
    }

    /// What to hand the device when launching the app without a URL
    fn direct_launch_target(&self, app_id: &str, props: &CustomRuntimeProps) -> String {
        match self.platform {
            RuntimePlatform::Ios => app_id.to_string(),
            RuntimePlatform::Android => props
                .launch_activity
                .clone()
                .or_else(|| self.apps.launch_activity.clone())
                .unwrap_or_else(|| format!("{}/.MainActivity", app_id)),
        }
    }

    async fn open_in_browser(&self, options: &LaunchOptions) -> Result<LaunchResult> {
        let device = self.resolve_device(options).await?;
        let url = self.urls.dev_server_url(false);
        self.open_url_on(device.as_ref(), &url).await?;
        Ok(LaunchResult { url })
    }
}

#[async_trait]
impl PlatformLauncher for PlatformManager {
    async fn open(
        &self,
        descriptor: RuntimeDescriptor,
        options: LaunchOptions,
    ) -> Result<LaunchResult> {
        debug!(
            "Opening {} runtime on {} (device: {:?})",
            descriptor.runtime, self.platform, options.device
        );
        match descriptor.runtime {
            RuntimeKind::Expo => self.open_in_expo_go(&options).await,
            RuntimeKind::Custom => self.open_in_custom_runtime(&descriptor.props, &options).await,
            RuntimeKind::Web => self.open_in_browser(&options).await,
        }
    }
}
