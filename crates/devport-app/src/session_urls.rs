//! Addressing for one running session
//!
//! [`SessionUrls`] is a cheap snapshot of what a launcher needs to compute
//! URLs: the URL creator, the bound location and the client preferences.

use std::sync::Arc;

use devport_core::prelude::*;
use devport_core::{Location, RuntimePlatform, UrlOptions};

use crate::url_creator::UrlCreator;

#[derive(Debug, Clone)]
pub struct SessionUrls {
    url_creator: Arc<UrlCreator>,
    location: Location,
    is_dev_client: bool,
    interstitial_enabled: bool,
}

impl SessionUrls {
    pub fn new(
        url_creator: Arc<UrlCreator>,
        location: Location,
        is_dev_client: bool,
        interstitial_enabled: bool,
    ) -> Self {
        Self {
            url_creator,
            location,
            is_dev_client,
            interstitial_enabled,
        }
    }

    pub fn url_creator(&self) -> &UrlCreator {
        &self.url_creator
    }

    pub fn port(&self) -> u16 {
        self.location.port
    }

    pub fn is_dev_client(&self) -> bool {
        self.is_dev_client
    }

    /// The bound URL, or the same server addressed as `localhost`
    pub fn dev_server_url(&self, localhost: bool) -> String {
        if localhost {
            format!("{}://localhost:{}", self.location.protocol, self.location.port)
        } else {
            self.location.url.clone()
        }
    }

    /// URL to open in Expo Go
    ///
    /// With the interstitial page enabled and a development build installed,
    /// this is the loading page so the user can pick a client. Without a
    /// development build the page is skipped with a warning.
    pub fn expo_go_url(
        &self,
        platform: Option<RuntimePlatform>,
        dev_build_installed: bool,
    ) -> Result<String> {
        if self.interstitial_enabled {
            if dev_build_installed {
                return self
                    .url_creator
                    .construct_loading_url(&UrlOptions::default(), platform);
            }
            match platform {
                Some(platform) => warn!(
                    "No development build is installed on the {} device, opening Expo Go directly",
                    platform
                ),
                None => warn!("No development build is installed, opening Expo Go directly"),
            }
        }
        self.url_creator.construct_deep_link(&UrlOptions::default())
    }

    /// URL a native client opens the project with
    ///
    /// Development clients get the dev-client deep link, falling back to the
    /// bound URL when none can be built. Expo Go gets the runtime deep link.
    pub fn native_runtime_url(&self, options: &UrlOptions) -> Result<String> {
        if self.is_dev_client {
            return Ok(self
                .url_creator
                .construct_dev_client_url(options)?
                .unwrap_or_else(|| self.location.url.clone()));
        }
        self.url_creator.construct_deep_link(options)
    }

    /// Development client deep link, `None` without a usable app scheme
    pub fn custom_runtime_url(&self, options: &UrlOptions) -> Result<Option<String>> {
        self.url_creator.construct_dev_client_url(options)
    }
}
