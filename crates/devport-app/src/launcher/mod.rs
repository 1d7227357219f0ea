//! Opening a project on a launch target
//!
//! Each native [`LaunchTarget`] has a [`PlatformLauncher`] created on demand
//! from a [`LauncherRegistry`]. The desktop target is served by a
//! [`BrowserOpener`] instead.

pub mod manager;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use devport_core::prelude::*;
use devport_core::{LaunchTarget, RuntimeKind, RuntimePlatform};
use devport_daemon::DeviceResolver;

use crate::config::PlatformSettings;
use crate::session_urls::SessionUrls;

pub use manager::{PlatformApps, PlatformManager};

/// Development build details supplied by the caller
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomRuntimeProps {
    /// App scheme to deep link with, overriding the server default
    pub scheme: Option<String>,
    /// Bundle id / package of the development build
    pub application_id: Option<String>,
    /// Android component to start when no deep link can be built
    pub launch_activity: Option<String>,
}

/// Which client to open the project in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeDescriptor {
    pub runtime: RuntimeKind,
    pub props: CustomRuntimeProps,
}

impl RuntimeDescriptor {
    pub fn new(runtime: RuntimeKind) -> Self {
        Self {
            runtime,
            props: CustomRuntimeProps::default(),
        }
    }

    pub fn custom(props: CustomRuntimeProps) -> Self {
        Self {
            runtime: RuntimeKind::Custom,
            props,
        }
    }
}

/// Device selection for a launch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchOptions {
    /// Device name, UDID or serial; the first ready device when unset
    pub device: Option<String>,
}

/// Outcome of a successful launch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchResult {
    /// URL that was opened, or the app id when launched directly
    pub url: String,
}

/// Opens the project on one kind of target
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PlatformLauncher: Send + Sync {
    async fn open(&self, descriptor: RuntimeDescriptor, options: LaunchOptions)
        -> Result<LaunchResult>;
}

/// Builds a launcher bound to a session's URLs
pub type LauncherFactory = Arc<dyn Fn(SessionUrls) -> Arc<dyn PlatformLauncher> + Send + Sync>;

/// Launcher factories by target
#[derive(Clone, Default)]
pub struct LauncherRegistry {
    factories: HashMap<LaunchTarget, LauncherFactory>,
}

impl fmt::Debug for LauncherRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LauncherRegistry")
            .field("targets", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl LauncherRegistry {
    /// Simulator and emulator launchers driving real devices
    pub fn system(platforms: &PlatformSettings, resolver: Arc<dyn DeviceResolver>) -> Self {
        let mut registry = Self::default();
        for (target, platform) in [
            (LaunchTarget::Simulator, RuntimePlatform::Ios),
            (LaunchTarget::Emulator, RuntimePlatform::Android),
        ] {
            let apps = PlatformApps::for_platform(platform, platforms);
            let resolver = Arc::clone(&resolver);
            registry.register(
                target,
                Arc::new(move |urls: SessionUrls| -> Arc<dyn PlatformLauncher> {
                    Arc::new(PlatformManager::new(
                        platform,
                        urls,
                        Arc::clone(&resolver),
                        apps.clone(),
                    ))
                }),
            );
        }
        registry
    }

    pub fn register(&mut self, target: LaunchTarget, factory: LauncherFactory) {
        self.factories.insert(target, factory);
    }

    pub fn create(&self, target: LaunchTarget, urls: SessionUrls) -> Result<Arc<dyn PlatformLauncher>> {
        let factory = self
            .factories
            .get(&target)
            .ok_or_else(|| Error::launch_failed(target, "no launcher is registered for this target"))?;
        Ok(factory(urls))
    }
}

/// Opens URLs on the desktop
#[async_trait]
pub trait BrowserOpener: Send + Sync {
    async fn open(&self, url: &str) -> Result<()>;
}

/// Uses the platform's default browser
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemBrowser;

#[async_trait]
impl BrowserOpener for SystemBrowser {
    async fn open(&self, url: &str) -> Result<()> {
        devport_daemon::open_browser(url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::FixedAddressResolver;
    use crate::url_creator::UrlCreator;
    use devport_core::{Location, UrlOptions};
    use devport_daemon::test_utils::{RecordingDevice, StaticResolver};

    fn session_urls() -> SessionUrls {
        let creator = UrlCreator::new(
            UrlOptions::default().with_scheme("http"),
            3000,
            Arc::new(|| None),
            Arc::new(FixedAddressResolver("100.100.1.100".to_string())),
        );
        SessionUrls::new(
            Arc::new(creator),
            Location::new("http", "localhost", 3000),
            false,
            false,
        )
    }

    #[test]
    fn test_system_registry_covers_native_targets() {
        let resolver = Arc::new(StaticResolver::new(RecordingDevice::new(
            RuntimePlatform::Ios,
            &[],
        )));
        let registry = LauncherRegistry::system(&PlatformSettings::default(), resolver);

        assert!(registry.create(LaunchTarget::Simulator, session_urls()).is_ok());
        assert!(registry.create(LaunchTarget::Emulator, session_urls()).is_ok());

        let err = registry
            .create(LaunchTarget::Desktop, session_urls())
            .err()
            .unwrap();
        assert!(matches!(err, Error::LaunchFailed { ref target, .. } if target == "desktop"));
    }

    #[tokio::test]
    async fn test_registered_factory_is_used() {
        let mut mock = MockPlatformLauncher::new();
        mock.expect_open().times(1).returning(|_, _| {
            Ok(LaunchResult {
                url: "mock-url".to_string(),
            })
        });
        let mock: Arc<dyn PlatformLauncher> = Arc::new(mock);

        let mut registry = LauncherRegistry::default();
        registry.register(LaunchTarget::Simulator, Arc::new(move |_: SessionUrls| Arc::clone(&mock)));

        let launcher = registry.create(LaunchTarget::Simulator, session_urls()).unwrap();
        let result = launcher
            .open(RuntimeDescriptor::new(RuntimeKind::Expo), LaunchOptions::default())
            .await
            .unwrap();
        assert_eq!(result.url, "mock-url");
    }
}
