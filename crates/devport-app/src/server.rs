//! The bundler seam
//!
//! A [`Bundler`] binds the actual HTTP/WebSocket server and hands back a
//! [`ServerInstance`]. The dev server owns the instance for the lifetime of a
//! session and closes it on stop.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use devport_core::prelude::*;
use devport_core::{HostType, Location};

/// Options a bundler starts with
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartOptions {
    /// Requested port; the dev server fills in its default before starting
    pub port: Option<u16>,
    pub https: bool,
    pub location: LocationOptions,
}

/// How clients should address the server
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocationOptions {
    /// App scheme for development client deep links
    pub scheme: Option<String>,
    pub host_type: Option<HostType>,
    pub hostname: Option<String>,
}

/// A bound server that can be shut down
#[async_trait]
pub trait ServerHandle: Send + Sync {
    async fn close(&self) -> Result<()>;
}

/// Broadcasts events to every connected client
pub trait MessageSocket: Send + Sync {
    fn broadcast(&self, method: &str, params: serde_json::Value);
}

/// Routes registered by the bundler, keyed by path
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MiddlewareSet {
    routes: BTreeMap<String, String>,
}

impl MiddlewareSet {
    pub fn register(&mut self, route: impl Into<String>, handler: impl Into<String>) {
        self.routes.insert(route.into(), handler.into());
    }

    pub fn handler(&self, route: &str) -> Option<&str> {
        self.routes.get(route).map(String::as_str)
    }

    pub fn routes(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }
}

/// Everything a started bundler hands back
pub struct ServerInstance {
    pub server: Box<dyn ServerHandle>,
    pub location: Location,
    pub middleware: MiddlewareSet,
    pub message_socket: Arc<dyn MessageSocket>,
}

impl fmt::Debug for ServerInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerInstance")
            .field("location", &self.location)
            .field("middleware", &self.middleware)
            .finish_non_exhaustive()
    }
}

/// Starts the server that serves bundles and the message socket
#[trait_variant::make(Bundler: Send)]
pub trait LocalBundler {
    /// Short name used in log and error messages
    fn name(&self) -> &str;

    /// Whether clients are native apps (otherwise: web only)
    fn targets_native(&self) -> bool {
        true
    }

    async fn start_server(&self, options: &StartOptions) -> Result<ServerInstance>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_middleware_set_routes() {
        let mut middleware = MiddlewareSet::default();
        middleware.register("/message", "message-socket");
        middleware.register("/_expo/loading", "interstitial");

        assert_eq!(middleware.handler("/message"), Some("message-socket"));
        assert_eq!(middleware.handler("/status"), None);
        assert_eq!(
            middleware.routes().collect::<Vec<_>>(),
            vec!["/_expo/loading", "/message"]
        );
    }
}
