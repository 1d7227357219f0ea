//! Public tunnels to the dev server
//!
//! A [`Tunnel`] exposes the local server port on a public URL. The dev server
//! creates one per session through a [`TunnelFactory`] when the host type is
//! `tunnel`.

use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use devport_core::prelude::*;
use devport_daemon::{NgrokOptions, NgrokProcess};
use tokio::sync::Mutex;

use crate::config::TunnelSettings;

/// A public tunnel to a local port
#[async_trait]
pub trait Tunnel: Send + Sync {
    /// Establish the tunnel; resolves once the public URL is known
    async fn start(&self) -> Result<()>;

    /// Tear the tunnel down. Safe to call when not started.
    async fn stop(&self) -> Result<()>;

    /// Public URL, `None` until `start` succeeds
    fn public_url(&self) -> Option<String>;
}

/// Creates a tunnel for a bound port
pub trait TunnelFactory: Send + Sync {
    fn create(&self, port: u16) -> Arc<dyn Tunnel>;
}

// ─────────────────────────────────────────────────────────────────────────────
// ngrok
// ─────────────────────────────────────────────────────────────────────────────

/// Tunnel backed by an `ngrok` child process
pub struct NgrokTunnel {
    options: NgrokOptions,
    start_timeout: Duration,
    process: Mutex<Option<NgrokProcess>>,
    url: RwLock<Option<String>>,
}

impl NgrokTunnel {
    pub fn new(options: NgrokOptions, start_timeout: Duration) -> Self {
        Self {
            options,
            start_timeout,
            process: Mutex::new(None),
            url: RwLock::new(None),
        }
    }

    fn set_url(&self, url: Option<String>) {
        *self.url.write().unwrap_or_else(|e| e.into_inner()) = url;
    }
}

#[async_trait]
impl Tunnel for NgrokTunnel {
    async fn start(&self) -> Result<()> {
        let mut process = self.process.lock().await;
        if process.is_some() {
            return Ok(());
        }

        let spawned = NgrokProcess::spawn(&self.options, self.start_timeout).await?;
        info!("Tunnel ready: {}", spawned.public_url());
        self.set_url(Some(spawned.public_url().to_string()));
        *process = Some(spawned);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let Some(mut process) = self.process.lock().await.take() else {
            return Ok(());
        };
        self.set_url(None);
        debug!("Stopping tunnel (pid {:?})", process.id());
        process.shutdown().await
    }

    fn public_url(&self) -> Option<String> {
        self.url.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// Creates [`NgrokTunnel`]s from tunnel settings
#[derive(Debug, Clone)]
pub struct NgrokTunnelFactory {
    command: PathBuf,
    settings: TunnelSettings,
}

impl NgrokTunnelFactory {
    /// `command` is the resolved ngrok binary, if one was found on the system
    pub fn new(settings: TunnelSettings, command: Option<PathBuf>) -> Self {
        let command = command.unwrap_or_else(|| PathBuf::from(&settings.command));
        Self { command, settings }
    }
}

impl TunnelFactory for NgrokTunnelFactory {
    fn create(&self, port: u16) -> Arc<dyn Tunnel> {
        let mut options = NgrokOptions::new(self.command.clone(), port);
        options.authtoken = self.settings.authtoken.clone();
        options.region = self.settings.region.clone();
        Arc::new(NgrokTunnel::new(options, self.settings.start_timeout()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stop_before_start_is_noop() {
        let tunnel = NgrokTunnel::new(NgrokOptions::new("ngrok", 3000), Duration::from_secs(1));
        assert_eq!(tunnel.public_url(), None);
        tunnel.stop().await.unwrap();
        tunnel.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_start_with_missing_binary_fails() {
        let tunnel = NgrokTunnel::new(
            NgrokOptions::new("/nonexistent/devport-ngrok", 3000),
            Duration::from_secs(1),
        );
        assert!(tunnel.start().await.is_err());
        assert_eq!(tunnel.public_url(), None);
    }

    #[test]
    fn test_factory_falls_back_to_configured_command() {
        let settings = TunnelSettings {
            authtoken: Some("secret".to_string()),
            ..TunnelSettings::default()
        };
        let factory = NgrokTunnelFactory::new(settings, None);
        assert_eq!(factory.command, PathBuf::from("ngrok"));

        let resolved = NgrokTunnelFactory::new(
            TunnelSettings::default(),
            Some(PathBuf::from("/opt/bin/ngrok")),
        );
        assert_eq!(resolved.command, PathBuf::from("/opt/bin/ngrok"));
        assert_eq!(resolved.create(3000).public_url(), None);
    }
}
