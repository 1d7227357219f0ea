//! Manifest middleware selection
//!
//! The dev server serves one of the registered manifest formats. A
//! [`ManifestMiddleware`] carries everything needed to describe the project
//! to a client: the URL creator, the entry module and the format's response
//! headers.

use std::fmt;
use std::sync::Arc;

use devport_core::prelude::*;
use devport_core::{ManifestType, RuntimePlatform, UrlOptions};
use url::Url;

use crate::config::ManifestSettings;
use crate::url_creator::UrlCreator;

/// Per-request manifest overrides
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestRequestOptions {
    /// Serializer name; must be a registered type
    pub force_manifest_type: Option<String>,
}

/// Bundle options baked into the launch URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestOptions {
    pub main_module: String,
    pub dev: bool,
    pub minify: bool,
}

impl From<&ManifestSettings> for ManifestOptions {
    fn from(settings: &ManifestSettings) -> Self {
        Self {
            main_module: settings.main_module.clone(),
            dev: settings.dev,
            minify: settings.minify,
        }
    }
}

/// A resolved manifest serializer bound to a running server
pub struct ManifestMiddleware {
    kind: ManifestType,
    url_creator: Arc<UrlCreator>,
    options: ManifestOptions,
}

impl fmt::Debug for ManifestMiddleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManifestMiddleware")
            .field("kind", &self.kind)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl ManifestMiddleware {
    pub fn new(kind: ManifestType, url_creator: Arc<UrlCreator>, options: ManifestOptions) -> Self {
        Self {
            kind,
            url_creator,
            options,
        }
    }

    pub fn kind(&self) -> ManifestType {
        self.kind
    }

    pub fn options(&self) -> &ManifestOptions {
        &self.options
    }

    /// `host:port` clients address the server by
    pub fn host_uri(&self, hostname: Option<&str>) -> Result<String> {
        let url = self.url_creator.construct_url(&host_options(hostname))?;
        Ok(match url.split_once("://") {
            Some((_, rest)) => rest.to_string(),
            None => url,
        })
    }

    /// URL of the JavaScript bundle a client should load
    ///
    /// Always `http(s)`, whatever app scheme the session defaults to.
    pub fn bundle_url(&self, platform: RuntimePlatform, hostname: Option<&str>) -> Result<String> {
        let base = self.url_creator.construct_url(&UrlOptions {
            scheme: Some(self.url_creator.http_scheme().to_string()),
            ..host_options(hostname)
        })?;
        let mut url = Url::parse(&base)?.join(&format!("{}.bundle", self.options.main_module))?;
        url.query_pairs_mut()
            .append_pair("platform", platform.as_query_value())
            .append_pair("dev", bool_param(self.options.dev))
            .append_pair("hot", "false")
            .append_pair("minify", bool_param(self.options.minify));
        Ok(url.to_string())
    }

    /// Extra headers the format requires on manifest responses
    pub fn response_headers(&self) -> Vec<(&'static str, &'static str)> {
        match self.kind {
            ManifestType::Classic => Vec::new(),
            ManifestType::ExpoUpdates => vec![
                ("expo-protocol-version", "0"),
                ("expo-sfv-version", "0"),
                ("cache-control", "private, max-age=0"),
            ],
        }
    }
}

fn host_options(hostname: Option<&str>) -> UrlOptions {
    UrlOptions {
        hostname: hostname.map(str::to_string),
        ..UrlOptions::default()
    }
}

fn bool_param(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

/// Pick the serializer for a request
///
/// Fails with [`Error::UnknownManifestType`] for unregistered names.
pub fn resolve_manifest_type(
    request: &ManifestRequestOptions,
    default: ManifestType,
) -> Result<ManifestType> {
    match &request.force_manifest_type {
        Some(kind) => kind.parse(),
        None => Ok(default),
    }
}
