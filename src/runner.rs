//! Foreground runner: start the dev server, print its URLs, wait for Ctrl+C

use std::path::PathBuf;

use devport_app::config::init_config_dir;
use devport_app::{load_settings, resolve_project_root, DevServer, MessageServerBundler};
use devport_core::prelude::*;
use devport_core::{HostType, LaunchTarget, UrlOptions};
use devport_daemon::ToolAvailability;

/// Command-line overrides applied on top of `.devport/config.toml`
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub project: PathBuf,
    pub port: Option<u16>,
    pub host_type: Option<HostType>,
    pub https: bool,
    pub dev_client: bool,
    pub scheme: Option<String>,
    pub open: Option<LaunchTarget>,
    pub init: bool,
}

/// Run the dev server until interrupted
pub async fn run(options: RunOptions) -> Result<()> {
    devport_core::logging::init()?;

    let project_root = resolve_project_root(&options.project)?;
    info!("Project: {}", project_root.display());

    if options.init {
        let path = init_config_dir(&project_root)?;
        eprintln!("Config: {}", path.display());
    }

    let mut settings = load_settings(&project_root);
    if let Some(port) = options.port {
        settings.server.port = port;
    }
    if let Some(host_type) = options.host_type {
        settings.server.host_type = host_type;
    }
    if options.scheme.is_some() {
        settings.server.scheme = options.scheme.clone();
    }
    settings.server.https |= options.https;
    settings.server.dev_client |= options.dev_client;

    let tools = ToolAvailability::check(&settings.tunnel.command).await;
    if settings.server.host_type == HostType::Tunnel {
        if let Some(message) = tools.tunnel_unavailable_message() {
            eprintln!("{message}");
        }
    }

    let mut server = DevServer::new(&project_root, MessageServerBundler::new(), settings, &tools)?;
    let start_options = server.default_start_options();
    let location = server.start(start_options).await?.location.clone();
    eprintln!("Dev server running at {}", location.url);

    match server.get_native_runtime_url(&UrlOptions::default()) {
        Ok(url) => println!("{url}"),
        Err(e) => warn!("No native runtime URL: {}", e),
    }
    if let Some(tunnel_url) = server.get_tunnel_url() {
        eprintln!("Tunnel: {tunnel_url}");
    }

    if let Some(target) = options.open {
        match server.open_platform(target).await {
            Ok(result) => eprintln!("Opened {}", result.url),
            Err(e) => eprintln!("{e}"),
        }
    }

    eprintln!("Press Ctrl+C to stop");
    let signal = tokio::signal::ctrl_c().await;
    if let Err(ref e) = signal {
        error!("Failed to listen for Ctrl+C: {}", e);
    }

    let result = server.stop().await;
    if let Err(ref e) = result {
        error!("Shutdown error: {}", e);
    }
    info!("devport exiting");
    signal?;
    result
}
