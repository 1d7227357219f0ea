//! URL construction for a running dev server
//!
//! [`UrlCreator`] turns partial [`UrlOptions`] into concrete URLs using the
//! server's defaults, the bound port, the active tunnel (if any) and the
//! machine's LAN address. Resolution order for the host part:
//!
//! 1. `EXPO_PACKAGER_PROXY_URL`, when set, replaces host and port entirely
//! 2. `HostType::Tunnel` uses the tunnel's public hostname on port 80
//! 3. `HostType::Localhost` without a hostname means `localhost`
//! 4. `REACT_NATIVE_PACKAGER_HOSTNAME`, then the explicit hostname
//!    (`localhost` becomes `127.0.0.1`), then the LAN address

use std::fmt;
use std::sync::{Arc, LazyLock};

use devport_core::prelude::*;
use devport_core::{HostType, RuntimePlatform, UrlOptions};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use regex::Regex;
use url::Url;

use crate::config::EnvOverrides;
use crate::network::AddressResolver;

/// Reads the public URL of the active tunnel, if one is up
pub type TunnelUrlFn = Arc<dyn Fn() -> Option<String> + Send + Sync>;

/// Characters `encodeURIComponent` leaves alone
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// RFC 3986 scheme syntax
static SCHEME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*$").expect("Invalid scheme regex"));

const DEFAULT_RUNTIME_SCHEME: &str = "exp";
const LOADING_PATH: &str = "_expo/loading";
const DEV_CLIENT_HOST: &str = "expo-development-client";

/// Builds URLs that point clients at one running dev server
pub struct UrlCreator {
    defaults: UrlOptions,
    port: u16,
    tunnel_url: TunnelUrlFn,
    resolver: Arc<dyn AddressResolver>,
    runtime_scheme: String,
    proxy_url: Option<Url>,
    packager_hostname: Option<String>,
    https: bool,
}

impl fmt::Debug for UrlCreator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UrlCreator")
            .field("defaults", &self.defaults)
            .field("port", &self.port)
            .field("runtime_scheme", &self.runtime_scheme)
            .field("proxy_url", &self.proxy_url)
            .finish_non_exhaustive()
    }
}

/// Pieces of a URL before joining
#[derive(Debug, Clone, PartialEq, Eq)]
struct UrlComponents {
    protocol: Option<String>,
    hostname: String,
    port: Option<u16>,
}

impl UrlComponents {
    fn join(&self) -> String {
        let mut url = String::new();
        if let Some(protocol) = &self.protocol {
            url.push_str(protocol);
            url.push_str("://");
        }
        url.push_str(&self.hostname);
        if let Some(port) = self.port {
            url.push(':');
            url.push_str(&port.to_string());
        }
        url
    }
}

impl UrlCreator {
    pub fn new(
        defaults: UrlOptions,
        port: u16,
        tunnel_url: TunnelUrlFn,
        resolver: Arc<dyn AddressResolver>,
    ) -> Self {
        let https = defaults
            .scheme
            .as_deref()
            .is_some_and(|scheme| scheme.eq_ignore_ascii_case("https"));
        Self {
            defaults,
            port,
            tunnel_url,
            resolver,
            runtime_scheme: DEFAULT_RUNTIME_SCHEME.to_string(),
            proxy_url: None,
            packager_hostname: None,
            https,
        }
    }

    /// Apply the proxy and hostname overrides captured from the environment
    pub fn with_environment(mut self, env: &EnvOverrides) -> Self {
        self.proxy_url = env.proxy_url.as_deref().and_then(|raw| match Url::parse(raw) {
            Ok(url) => Some(url),
            Err(e) => {
                warn!("Ignoring invalid EXPO_PACKAGER_PROXY_URL {:?}: {}", raw, e);
                None
            }
        });
        self.packager_hostname = env.packager_hostname.clone();
        self
    }

    pub fn with_runtime_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.runtime_scheme = scheme.into();
        self
    }

    /// Mark the server as serving TLS even when the default scheme is an app scheme
    pub fn with_https(mut self, https: bool) -> Self {
        self.https = https;
        self
    }

    pub fn defaults(&self) -> &UrlOptions {
        &self.defaults
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Build a URL from `options` layered over the defaults
    pub fn construct_url(&self, options: &UrlOptions) -> Result<String> {
        let options = options.merged_onto(&self.defaults);
        let url = self.url_components(&options)?.join();
        trace!("URL: {}", url);
        Ok(url)
    }

    /// Scheme the server itself is fetched over: `https` when serving TLS
    /// or tunnelled, otherwise `http`
    pub fn http_scheme(&self) -> &'static str {
        if self.https || self.defaults.host_type == Some(HostType::Tunnel) {
            "https"
        } else {
            "http"
        }
    }

    /// URL that opens the project in the runtime app, e.g. `exp://192.168.1.5:3000`
    ///
    /// Any scheme in `options` is ignored.
    pub fn construct_deep_link(&self, options: &UrlOptions) -> Result<String> {
        self.construct_url(&UrlOptions {
            scheme: Some(self.runtime_scheme.clone()),
            ..options.clone()
        })
    }

    /// URL of the interstitial loading page
    ///
    /// Served over `http` unless `options` names another scheme; `platform`
    /// is added as a query parameter when given.
    pub fn construct_loading_url(
        &self,
        options: &UrlOptions,
        platform: Option<RuntimePlatform>,
    ) -> Result<String> {
        let base = self.construct_url(&UrlOptions {
            scheme: Some(options.scheme.clone().unwrap_or_else(|| "http".to_string())),
            ..options.clone()
        })?;

        let mut url = Url::parse(&base)?.join(LOADING_PATH)?;
        if let Some(platform) = platform {
            url.query_pairs_mut()
                .append_pair("platform", platform.as_query_value());
        }
        debug!("Loading URL: {}", url);
        Ok(url.to_string())
    }

    /// Deep link into a development build, wrapping the manifest URL
    ///
    /// Returns `None` when the app scheme is missing, is `http(s)` or is not
    /// a valid URI scheme.
    pub fn construct_dev_client_url(&self, options: &UrlOptions) -> Result<Option<String>> {
        let Some(protocol) = options
            .scheme
            .as_deref()
            .or(self.defaults.scheme.as_deref())
        else {
            debug!("No app scheme configured, cannot build a development client URL");
            return Ok(None);
        };

        if let Err(e) = validate_dev_client_scheme(protocol) {
            debug!("{}", e);
            return Ok(None);
        }

        let manifest_url = self.construct_url(&UrlOptions {
            scheme: Some(self.http_scheme().to_string()),
            ..options.clone()
        })?;

        let url = format!(
            "{}://{}/?url={}",
            protocol,
            DEV_CLIENT_HOST,
            utf8_percent_encode(&manifest_url, URI_COMPONENT)
        );
        debug!("Development client URL: {}", url);
        Ok(Some(url))
    }

    fn url_components(&self, options: &UrlOptions) -> Result<UrlComponents> {
        if let Some(proxy) = &self.proxy_url {
            return Ok(components_from_proxy(options, proxy));
        }

        let mut hostname = options.hostname.clone();
        match options.host_type {
            Some(HostType::Tunnel) => {
                let tunnel = (self.tunnel_url)().ok_or(Error::TunnelNotStarted)?;
                return components_from_tunnel(options, &tunnel);
            }
            Some(HostType::Localhost) if hostname.is_none() => {
                hostname = Some("localhost".to_string());
            }
            _ => {}
        }

        Ok(UrlComponents {
            protocol: options.scheme.clone(),
            hostname: self.resolve_hostname(hostname),
            port: Some(self.port),
        })
    }

    fn resolve_hostname(&self, hostname: Option<String>) -> String {
        if let Some(forced) = &self.packager_hostname {
            return forced.clone();
        }
        match hostname {
            Some(h) if h == "localhost" => "127.0.0.1".to_string(),
            Some(h) => h,
            None => self.resolver.lan_address(),
        }
    }
}

fn components_from_proxy(options: &UrlOptions, proxy: &Url) -> UrlComponents {
    let mut protocol = options.scheme.clone().unwrap_or_else(|| "http".to_string());
    let mut port = proxy.port();
    if proxy.scheme() == "https" {
        if protocol == "http" {
            protocol = "https".to_string();
        }
        port = port.or(Some(443));
    }
    UrlComponents {
        protocol: Some(protocol),
        hostname: proxy.host_str().unwrap_or_default().to_string(),
        port,
    }
}

fn components_from_tunnel(options: &UrlOptions, tunnel: &str) -> Result<UrlComponents> {
    let parsed = Url::parse(tunnel)?;
    let hostname = parsed
        .host_str()
        .ok_or_else(|| Error::tunnel(format!("Tunnel URL has no host: {tunnel}")))?;
    Ok(UrlComponents {
        protocol: options.scheme.clone(),
        hostname: hostname.to_string(),
        port: Some(80),
    })
}

/// Schemes a development build can register for itself
fn validate_dev_client_scheme(scheme: &str) -> Result<()> {
    if scheme.eq_ignore_ascii_case("http") || scheme.eq_ignore_ascii_case("https") {
        return Err(Error::invalid_scheme(scheme));
    }
    if !SCHEME_PATTERN.is_match(scheme) {
        return Err(Error::invalid_scheme(scheme));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::FixedAddressResolver;

    fn no_tunnel() -> TunnelUrlFn {
        Arc::new(|| None)
    }

    fn creator(defaults: UrlOptions) -> UrlCreator {
        creator_with_tunnel(defaults, no_tunnel())
    }

    fn creator_with_tunnel(defaults: UrlOptions, tunnel: TunnelUrlFn) -> UrlCreator {
        UrlCreator::new(
            defaults,
            3000,
            tunnel,
            Arc::new(FixedAddressResolver("100.100.1.100".to_string())),
        )
    }

    fn http_defaults() -> UrlOptions {
        UrlOptions::default().with_scheme("http")
    }

    #[test]
    fn test_construct_url_uses_lan_address() {
        let urls = creator(http_defaults());
        assert_eq!(
            urls.construct_url(&UrlOptions::default()).unwrap(),
            "http://100.100.1.100:3000"
        );
    }

    #[test]
    fn test_construct_url_without_scheme() {
        let urls = creator(UrlOptions::default());
        assert_eq!(
            urls.construct_url(&UrlOptions::default()).unwrap(),
            "100.100.1.100:3000"
        );
    }

    #[test]
    fn test_deep_link_ignores_scheme_override() {
        let urls = creator(http_defaults());
        let options = UrlOptions::default().with_scheme("foobar");
        assert_eq!(
            urls.construct_deep_link(&options).unwrap(),
            "exp://100.100.1.100:3000"
        );
    }

    #[test]
    fn test_localhost_maps_to_loopback_ip() {
        let urls = creator(http_defaults());
        let explicit = UrlOptions::default().with_hostname("localhost");
        assert_eq!(
            urls.construct_deep_link(&explicit).unwrap(),
            "exp://127.0.0.1:3000"
        );

        let by_host_type = UrlOptions::default().with_host_type(HostType::Localhost);
        assert_eq!(
            urls.construct_deep_link(&by_host_type).unwrap(),
            "exp://127.0.0.1:3000"
        );
    }

    #[test]
    fn test_explicit_hostname() {
        let urls = creator(http_defaults().with_hostname("dev.example.com"));
        assert_eq!(
            urls.construct_url(&UrlOptions::default()).unwrap(),
            "http://dev.example.com:3000"
        );
    }

    #[test]
    fn test_tunnel_without_url_errors() {
        let urls = creator(http_defaults().with_host_type(HostType::Tunnel));
        let err = urls.construct_url(&UrlOptions::default()).unwrap_err();
        assert!(matches!(err, Error::TunnelNotStarted));
    }

    #[test]
    fn test_tunnel_uses_public_host_on_port_80() {
        let urls = creator_with_tunnel(
            http_defaults().with_host_type(HostType::Tunnel),
            Arc::new(|| Some("https://abc-123.ngrok.io".to_string())),
        );
        assert_eq!(
            urls.construct_deep_link(&UrlOptions::default()).unwrap(),
            "exp://abc-123.ngrok.io:80"
        );
    }

    #[test]
    fn test_packager_hostname_override() {
        let env = EnvOverrides {
            packager_hostname: Some("192.168.1.5".to_string()),
            ..EnvOverrides::default()
        };
        let urls = creator(http_defaults()).with_environment(&env);
        assert_eq!(
            urls.construct_url(&UrlOptions::default().with_hostname("localhost"))
                .unwrap(),
            "http://192.168.1.5:3000"
        );
    }

    #[test]
    fn test_proxy_url_replaces_host_and_port() {
        let env = EnvOverrides {
            proxy_url: Some("https://proxy.example.com".to_string()),
            ..EnvOverrides::default()
        };
        let urls = creator(http_defaults()).with_environment(&env);
        assert_eq!(
            urls.construct_url(&UrlOptions::default()).unwrap(),
            "https://proxy.example.com:443"
        );
        assert_eq!(
            urls.construct_deep_link(&UrlOptions::default()).unwrap(),
            "exp://proxy.example.com:443"
        );
    }

    #[test]
    fn test_invalid_proxy_url_is_ignored() {
        let env = EnvOverrides {
            proxy_url: Some("not a url".to_string()),
            ..EnvOverrides::default()
        };
        let urls = creator(http_defaults()).with_environment(&env);
        assert_eq!(
            urls.construct_url(&UrlOptions::default()).unwrap(),
            "http://100.100.1.100:3000"
        );
    }

    #[test]
    fn test_loading_url() {
        let urls = creator(UrlOptions::default().with_scheme("my-app"));
        assert_eq!(
            urls.construct_loading_url(&UrlOptions::default(), Some(RuntimePlatform::Android))
                .unwrap(),
            "http://100.100.1.100:3000/_expo/loading?platform=android"
        );
        assert_eq!(
            urls.construct_loading_url(&UrlOptions::default(), None)
                .unwrap(),
            "http://100.100.1.100:3000/_expo/loading"
        );
    }

    #[test]
    fn test_dev_client_url() {
        let urls = creator(UrlOptions::default().with_scheme("my-app"));
        assert_eq!(
            urls.construct_dev_client_url(&UrlOptions::default())
                .unwrap()
                .as_deref(),
            Some("my-app://expo-development-client/?url=http%3A%2F%2F100.100.1.100%3A3000")
        );
        assert_eq!(
            urls.construct_dev_client_url(&UrlOptions::default().with_hostname("localhost"))
                .unwrap()
                .as_deref(),
            Some("my-app://expo-development-client/?url=http%3A%2F%2F127.0.0.1%3A3000")
        );
    }

    #[test]
    fn test_dev_client_url_through_tunnel_uses_https() {
        let urls = creator_with_tunnel(
            UrlOptions::default()
                .with_scheme("my-app")
                .with_host_type(HostType::Tunnel),
            Arc::new(|| Some("https://abc.ngrok.io".to_string())),
        );
        assert_eq!(
            urls.construct_dev_client_url(&UrlOptions::default())
                .unwrap()
                .as_deref(),
            Some("my-app://expo-development-client/?url=https%3A%2F%2Fabc.ngrok.io%3A80")
        );
    }

    #[test]
    fn test_dev_client_url_rejects_unusable_schemes() {
        for scheme in ["http", "HTTPS", "my_app", "1app", ""] {
            let urls = creator(UrlOptions::default().with_scheme(scheme));
            assert_eq!(
                urls.construct_dev_client_url(&UrlOptions::default())
                    .unwrap(),
                None,
                "scheme {scheme:?}"
            );
        }

        let no_scheme = creator(UrlOptions::default());
        assert_eq!(
            no_scheme
                .construct_dev_client_url(&UrlOptions::default())
                .unwrap(),
            None
        );
    }

    #[test]
    fn test_dev_client_url_scheme_override() {
        let urls = creator(http_defaults());
        let options = UrlOptions::default().with_scheme("com.example.app");
        let url = urls.construct_dev_client_url(&options).unwrap().unwrap();
        assert!(url.starts_with("com.example.app://expo-development-client/?url=http%3A%2F%2F"));
    }

    #[test]
    fn test_http_scheme() {
        assert_eq!(creator(UrlOptions::default().with_scheme("my-app")).http_scheme(), "http");
        assert_eq!(creator(UrlOptions::default().with_scheme("https")).http_scheme(), "https");
        assert_eq!(
            creator(UrlOptions::default().with_scheme("my-app"))
                .with_https(true)
                .http_scheme(),
            "https"
        );
        assert_eq!(
            creator(UrlOptions::default().with_host_type(HostType::Tunnel)).http_scheme(),
            "https"
        );
    }

    #[test]
    fn test_uri_component_encoding_keeps_unreserved_marks() {
        let encoded = utf8_percent_encode("a-b_c.d!e~f*g'h(i)j k/l", URI_COMPONENT).to_string();
        assert_eq!(encoded, "a-b_c.d!e~f*g'h(i)j%20k%2Fl");
    }
}
