//! The dev server orchestrator
//!
//! [`DevServer`] owns one bundler session at a time. Starting binds the
//! bundler's server, builds the [`UrlCreator`] for the bound port, then brings
//! up the optional tunnel and the development session reporter. Stopping
//! tears those down in reverse order and clears all per-session state.
//!
//! Lifecycle calls take `&mut self`; share the server behind an async lock
//! when several tasks drive it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use devport_core::prelude::*;
use devport_core::{HostType, LaunchTarget, RuntimeKind, UrlOptions};
use devport_daemon::{SystemDeviceResolver, ToolAvailability};
use tokio::time::timeout;

use crate::config::{is_interstitial_page_enabled, Settings};
use crate::dev_session::{
    DevelopmentSession, HttpSessionBackend, SessionBackend, SessionInfo, SessionProject,
};
use crate::launcher::{
    BrowserOpener, CustomRuntimeProps, LaunchOptions, LaunchResult, LauncherRegistry,
    PlatformLauncher, RuntimeDescriptor, SystemBrowser,
};
use crate::manifest::{
    resolve_manifest_type, ManifestMiddleware, ManifestOptions, ManifestRequestOptions,
};
use crate::network::{AddressResolver, SystemAddressResolver};
use crate::server::{Bundler, LocationOptions, ServerInstance, StartOptions};
use crate::session_urls::SessionUrls;
use crate::tunnel::{NgrokTunnelFactory, Tunnel, TunnelFactory};
use crate::url_creator::{TunnelUrlFn, UrlCreator};


type TunnelSlot = Arc<RwLock<Option<Arc<dyn Tunnel>>>>;

/// Orchestrates a bundler, its tunnel, session reporting and launchers
pub struct DevServer<B: Bundler> {
    project_root: PathBuf,
    bundler: B,
    settings: Settings,
    is_dev_client: bool,

    // Per-session state, present only while running
    instance: Option<ServerInstance>,
    url_creator: Option<Arc<UrlCreator>>,
    tunnel: TunnelSlot,
    dev_session: Option<DevelopmentSession>,
    platform_managers: Mutex<HashMap<LaunchTarget, Arc<dyn PlatformLauncher>>>,

    // Collaborators
    tunnel_factory: Arc<dyn TunnelFactory>,
    session_backend: Arc<dyn SessionBackend>,
    launchers: LauncherRegistry,
    browser: Arc<dyn BrowserOpener>,
    address_resolver: Arc<dyn AddressResolver>,
}

impl<B: Bundler> DevServer<B> {
    /// Create a dev server using the system's tooling for every collaborator
    pub fn new(
        project_root: impl Into<PathBuf>,
        bundler: B,
        settings: Settings,
        tools: &ToolAvailability,
    ) -> Result<Self> {
        let session_backend = Arc::new(HttpSessionBackend::new(
            settings.session.api_url.clone(),
        )?);
        let tunnel_factory = Arc::new(NgrokTunnelFactory::new(
            settings.tunnel.clone(),
            tools.ngrok_path.clone(),
        ));
        let launchers = LauncherRegistry::system(
            &settings.platforms,
            Arc::new(SystemDeviceResolver::new(tools.clone())),
        );

        Ok(Self {
            project_root: project_root.into(),
            bundler,
            is_dev_client: settings.server.dev_client,
            settings,
            instance: None,
            url_creator: None,
            tunnel: Arc::new(RwLock::new(None)),
            dev_session: None,
            platform_managers: Mutex::new(HashMap::new()),
            tunnel_factory,
            session_backend,
            launchers,
            browser: Arc::new(SystemBrowser),
            address_resolver: Arc::new(SystemAddressResolver),
        })
    }

    pub fn with_tunnel_factory(mut self, factory: Arc<dyn TunnelFactory>) -> Self {
        self.tunnel_factory = factory;
        self
    }

    pub fn with_session_backend(mut self, backend: Arc<dyn SessionBackend>) -> Self {
        self.session_backend = backend;
        self
    }

    pub fn with_launchers(mut self, launchers: LauncherRegistry) -> Self {
        self.launchers = launchers;
        self
    }

    pub fn with_browser(mut self, browser: Arc<dyn BrowserOpener>) -> Self {
        self.browser = browser;
        self
    }

    pub fn with_address_resolver(mut self, resolver: Arc<dyn AddressResolver>) -> Self {
        self.address_resolver = resolver;
        self
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn bundler(&self) -> &B {
        &self.bundler
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn is_dev_client(&self) -> bool {
        self.is_dev_client
    }

    /// Switch between Expo Go and a development build for future launches
    pub fn set_dev_client(&mut self, is_dev_client: bool) {
        self.is_dev_client = is_dev_client;
        self.clear_platform_managers();
    }

    /// Start options derived from the `[server]` settings
    pub fn default_start_options(&self) -> StartOptions {
        let server = &self.settings.server;
        StartOptions {
            port: Some(server.port),
            https: server.https,
            location: LocationOptions {
                scheme: server.scheme.clone(),
                host_type: Some(server.host_type),
                hostname: server.hostname.clone(),
            },
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────

    /// Start the bundler and everything that depends on it
    ///
    /// Fails with [`Error::AlreadyRunning`] if a session is active. If the
    /// tunnel or the session reporter cannot start, whatever did start is
    /// torn down again and the original error is returned.
    pub async fn start(&mut self, mut options: StartOptions) -> Result<&ServerInstance> {
        if self.instance.is_some() {
            return Err(Error::AlreadyRunning);
        }

        let port = *options.port.get_or_insert(self.settings.server.port);
        info!("Starting '{}' dev server on port {}", self.bundler.name(), port);

        let instance = self.bundler.start_server(&options).await?;
        info!("Dev server running at {}", instance.location.url);

        let defaults = UrlOptions {
            scheme: Some(options.location.scheme.clone().unwrap_or_else(|| {
                let scheme = if options.https { "https" } else { "http" };
                scheme.to_string()
            })),
            host_type: options.location.host_type,
            hostname: options.location.hostname.clone(),
        };
        let url_creator = UrlCreator::new(
            defaults,
            instance.location.port,
            self.tunnel_url_reader(),
            Arc::clone(&self.address_resolver),
        )
        .with_environment(&self.settings.env)
        .with_https(options.https)
        .with_runtime_scheme(self.settings.server.runtime_scheme.clone());

        self.url_creator = Some(Arc::new(url_creator));
        self.instance = Some(instance);

        if let Err(e) = self.post_start(&options).await {
            error!("Dev server failed to start: {}", e);
            let instance = self.instance.take();
            for failure in self.teardown(instance).await {
                warn!("Cleanup after failed start: {}", failure);
            }
            return Err(e);
        }

        self.instance.as_ref().ok_or(Error::NotRunning)
    }

    async fn post_start(&mut self, options: &StartOptions) -> Result<()> {
        if options.location.host_type == Some(HostType::Tunnel) {
            if self.settings.env.offline {
                warn!("Offline mode: not starting a tunnel");
            } else {
                self.start_tunnel().await?;
            }
        }
        self.start_dev_session().await
    }

    /// Stop the session; a no-op when not running
    ///
    /// The session reporter, tunnel and server are each stopped even if an
    /// earlier step fails; all failures are reported together.
    pub async fn stop(&mut self) -> Result<()> {
        if self.instance.is_none() {
            debug!("Dev server is not running, nothing to stop");
        }
        let instance = self.instance.take();
        let failures = self.teardown(instance).await;
        match Error::from_teardown_failures(failures) {
            Some(err) => Err(err),
            None => {
                info!("Dev server stopped");
                Ok(())
            }
        }
    }

    /// Best-effort teardown in reverse start order
    async fn teardown(&mut self, instance: Option<ServerInstance>) -> Vec<Error> {
        let mut failures = Vec::new();

        if let Some(mut session) = self.dev_session.take() {
            if let Err(e) = session.stop().await {
                warn!("Failed to stop development session: {}", e);
                failures.push(e);
            }
        }

        let tunnel = self.tunnel.write().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(tunnel) = tunnel {
            match timeout(self.settings.tunnel.start_timeout(), tunnel.stop()).await {
                Ok(Ok(())) => debug!("Tunnel stopped"),
                Ok(Err(e)) => {
                    warn!("Failed to stop tunnel: {}", e);
                    failures.push(e);
                }
                Err(_) => failures.push(Error::timeout("tunnel to stop")),
            }
        }

        if let Some(instance) = instance {
            match timeout(self.settings.server.close_timeout(), instance.server.close()).await {
                Ok(Ok(())) => debug!("'{}' dev server closed", self.bundler.name()),
                Ok(Err(e)) => {
                    warn!("Failed to close '{}' dev server: {}", self.bundler.name(), e);
                    failures.push(e);
                }
                Err(_) => failures.push(Error::timeout(format!(
                    "'{}' dev server to close",
                    self.bundler.name()
                ))),
            }
        }

        self.url_creator = None;
        self.clear_platform_managers();
        failures
    }

    /// Open a public tunnel to the bound port
    ///
    /// Called by [`start`](Self::start) for the tunnel host type. Returns
    /// `None` when no server is running.
    pub async fn start_tunnel(&self) -> Result<Option<Arc<dyn Tunnel>>> {
        let Some(port) = self.instance.as_ref().map(|i| i.location.port) else {
            return Ok(None);
        };
        if let Some(existing) = self.tunnel.read().unwrap_or_else(|e| e.into_inner()).clone() {
            return Ok(Some(existing));
        }

        debug!("Connecting tunnel to port {}", port);
        let tunnel = self.tunnel_factory.create(port);
        let started = match timeout(self.settings.tunnel.start_timeout(), tunnel.start()).await {
            Ok(result) => result,
            Err(_) => Err(Error::timeout("tunnel to start")),
        };
        if let Err(e) = started {
            if let Err(stop_err) = tunnel.stop().await {
                debug!("Tunnel cleanup failed: {}", stop_err);
            }
            return Err(e);
        }

        *self.tunnel.write().unwrap_or_else(|e| e.into_inner()) = Some(Arc::clone(&tunnel));
        Ok(Some(tunnel))
    }

    async fn start_dev_session(&mut self) -> Result<()> {
        let env = &self.settings.env;
        if !self.settings.session.enabled || env.offline || env.ci {
            debug!("Development session reporting skipped");
            return Ok(());
        }

        let native = self.bundler.targets_native();
        let urls = self.session_urls()?;
        let url = if native {
            urls.native_runtime_url(&UrlOptions::default())?
        } else {
            urls.dev_server_url(false)
        };

        let info = SessionInfo::new(SessionProject::load(&self.project_root), url, native);
        let mut session = DevelopmentSession::new(
            Arc::clone(&self.session_backend),
            info,
            self.settings.session.heartbeat(),
            self.settings.session.start_timeout(),
        );
        let started = timeout(self.settings.session.start_timeout(), session.start()).await;
        // Keep the session even on failure so teardown reports it closed
        self.dev_session = Some(session);
        match started {
            Ok(result) => result,
            Err(_) => Err(Error::timeout("development session to start")),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────

    pub fn is_running(&self) -> bool {
        self.instance.is_some()
    }

    pub fn get_instance(&self) -> Option<&ServerInstance> {
        self.instance.as_ref()
    }

    /// URL creator of the running session
    pub fn url_creator(&self) -> Result<Arc<UrlCreator>> {
        self.url_creator.clone().ok_or(Error::NotRunning)
    }

    /// Public URL of the active tunnel
    pub fn get_tunnel_url(&self) -> Option<String> {
        (self.tunnel_url_reader())()
    }

    /// The bound URL, or the same server addressed as `localhost`
    pub fn get_dev_server_url(&self, localhost: bool) -> Option<String> {
        self.session_urls()
            .ok()
            .map(|urls| urls.dev_server_url(localhost))
    }

    /// URL to open in Expo Go on `target`; see [`SessionUrls::expo_go_url`]
    pub fn get_expo_go_url(
        &self,
        target: Option<LaunchTarget>,
        dev_build_installed: bool,
    ) -> Result<String> {
        let platform = target.and_then(|t| t.platform());
        self.session_urls()?
            .expo_go_url(platform, dev_build_installed)
    }

    /// URL a native client should open the project with
    pub fn get_native_runtime_url(&self, options: &UrlOptions) -> Result<String> {
        self.session_urls()?.native_runtime_url(options)
    }

    /// Manifest serializer for a request
    pub fn get_manifest_middleware(
        &self,
        request: &ManifestRequestOptions,
    ) -> Result<ManifestMiddleware> {
        let kind = resolve_manifest_type(request, self.settings.manifest.default_type)?;
        let url_creator = self.url_creator()?;
        Ok(ManifestMiddleware::new(
            kind,
            url_creator,
            ManifestOptions::from(&self.settings.manifest),
        ))
    }

    /// Send an event to every client connected to the message socket
    pub fn broadcast_message(&self, method: &str, params: serde_json::Value) -> Result<()> {
        let instance = self.instance.as_ref().ok_or(Error::NotRunning)?;
        debug!("Broadcasting '{}'", method);
        instance.message_socket.broadcast(method, params);
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Launching
    // ─────────────────────────────────────────────────────────────────────

    /// Open the project on `target` with the preferred runtime
    pub async fn open_platform(&self, target: LaunchTarget) -> Result<LaunchResult> {
        self.open_platform_with(target, LaunchOptions::default())
            .await
    }

    pub async fn open_platform_with(
        &self,
        target: LaunchTarget,
        options: LaunchOptions,
    ) -> Result<LaunchResult> {
        let urls = self.session_urls()?;

        if target == LaunchTarget::Desktop {
            let url = urls.dev_server_url(true);
            info!("Opening {} in the browser", url);
            self.browser
                .open(&url)
                .await
                .map_err(|e| into_launch_failed(target, e))?;
            return Ok(LaunchResult { url });
        }

        let runtime = self.runtime_kind();
        let launcher = self.platform_manager(target, urls)?;
        launcher
            .open(RuntimeDescriptor::new(runtime), options)
            .await
            .map_err(|e| into_launch_failed(target, e))
    }

    /// Open a development build on `target` with explicit app details
    pub async fn open_custom_runtime(
        &self,
        target: LaunchTarget,
        props: CustomRuntimeProps,
        options: LaunchOptions,
    ) -> Result<LaunchResult> {
        if self.runtime_kind() != RuntimeKind::Custom {
            return Err(Error::launch_failed(
                target,
                "a custom runtime can only be opened for a development build session",
            ));
        }

        let launcher = self.platform_manager(target, self.session_urls()?)?;
        launcher
            .open(RuntimeDescriptor::custom(props), options)
            .await
            .map_err(|e| into_launch_failed(target, e))
    }

    fn runtime_kind(&self) -> RuntimeKind {
        match (self.bundler.targets_native(), self.is_dev_client) {
            (false, _) => RuntimeKind::Web,
            (true, true) => RuntimeKind::Custom,
            (true, false) => RuntimeKind::Expo,
        }
    }

    /// Cached launcher for `target`, created on first use in a session
    fn platform_manager(
        &self,
        target: LaunchTarget,
        urls: SessionUrls,
    ) -> Result<Arc<dyn PlatformLauncher>> {
        let mut managers = self
            .platform_managers
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = managers.get(&target) {
            return Ok(Arc::clone(existing));
        }
        let created = self.launchers.create(target, urls)?;
        managers.insert(target, Arc::clone(&created));
        Ok(created)
    }

    fn clear_platform_managers(&self) {
        self.platform_managers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    fn session_urls(&self) -> Result<SessionUrls> {
        let instance = self.instance.as_ref().ok_or(Error::NotRunning)?;
        let url_creator = self.url_creator()?;
        Ok(SessionUrls::new(
            url_creator,
            instance.location.clone(),
            self.is_dev_client,
            is_interstitial_page_enabled(&self.project_root, &self.settings.env),
        ))
    }

    fn tunnel_url_reader(&self) -> TunnelUrlFn {
        let slot = Arc::clone(&self.tunnel);
        Arc::new(move || {
            slot.read()
                .unwrap_or_else(|e| e.into_inner())
                .as_ref()
                .and_then(|tunnel| tunnel.public_url())
        })
    }
}

fn into_launch_failed(target: LaunchTarget, err: Error) -> Error {
    match err {
        Error::LaunchFailed { .. } => err,
        other => Error::launch_failed(target, other.to_string()),
    }
}
