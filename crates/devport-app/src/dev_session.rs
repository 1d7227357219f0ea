//! Development session reporting
//!
//! While a dev server runs, [`DevelopmentSession`] tells the session API that
//! the project is being served so signed-in clients can list it. It posts
//! `notify-alive` on start and on every heartbeat, and `notify-close` on stop.
//! Reporting failures are logged and never stop the dev server.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use devport_core::prelude::*;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// Request timeout for a single session API call
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Project identity reported to the session API
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionProject {
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Deserialize)]
struct AppJson {
    expo: Option<AppJsonExpo>,
}

#[derive(Debug, Deserialize)]
struct AppJsonExpo {
    name: Option<String>,
    slug: Option<String>,
}

impl SessionProject {
    /// Read name and slug from `app.json`, falling back to the directory name
    pub fn load(project_root: &Path) -> Self {
        let dir_name = project_root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "app".to_string());

        let expo = std::fs::read_to_string(project_root.join("app.json"))
            .ok()
            .and_then(|content| match serde_json::from_str::<AppJson>(&content) {
                Ok(app) => app.expo,
                Err(e) => {
                    debug!("Ignoring unparsable app.json: {}", e);
                    None
                }
            });

        let (name, slug) = match expo {
            Some(expo) => (expo.name, expo.slug),
            None => (None, None),
        };
        let name = name.unwrap_or_else(|| dir_name.clone());
        let slug = slug.unwrap_or_else(|| name.to_lowercase().replace(' ', "-"));
        Self { name, slug }
    }
}

/// Payload sent with `notify-alive`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub description: String,
    pub hostname: String,
    pub config: SessionProject,
    /// URL clients open the project with
    pub url: String,
    /// `native` or `web`
    pub runtime: String,
    pub source: String,
    pub opened_at: DateTime<Utc>,
}

impl SessionInfo {
    pub fn new(project: SessionProject, url: impl Into<String>, native: bool) -> Self {
        let hostname = machine_hostname();
        Self {
            description: format!("{} on {}", project.name, hostname),
            hostname,
            config: project,
            url: url.into(),
            runtime: if native { "native" } else { "web" }.to_string(),
            source: "desktop".to_string(),
            opened_at: Utc::now(),
        }
    }
}

fn machine_hostname() -> String {
    ["HOSTNAME", "COMPUTERNAME"]
        .iter()
        .find_map(|var| std::env::var(var).ok().filter(|v| !v.is_empty()))
        .unwrap_or_else(|| "localhost".to_string())
}

/// Where session notifications go
#[async_trait]
pub trait SessionBackend: Send + Sync {
    async fn notify_alive(&self, session: &SessionInfo) -> Result<()>;

    async fn notify_close(&self, session: &SessionInfo) -> Result<()>;
}

/// Posts session notifications to the HTTP session API
#[derive(Debug, Clone)]
pub struct HttpSessionBackend {
    http: reqwest::Client,
    api_url: String,
}

#[derive(Serialize)]
struct AliveBody<'a> {
    session: &'a SessionInfo,
}

#[derive(Serialize)]
struct CloseBody<'a> {
    session: CloseSession<'a>,
}

#[derive(Serialize)]
struct CloseSession<'a> {
    url: &'a str,
}

impl HttpSessionBackend {
    pub fn new(api_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            api_url: api_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, action: &str) -> String {
        format!("{}/development-sessions/{}", self.api_url, action)
    }

    async fn post<T: Serialize + Sync>(&self, action: &str, body: &T) -> Result<()> {
        let response = self
            .http
            .post(self.endpoint(action))
            .json(body)
            .send()
            .await
            .map_err(|e| Error::http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::http(format!("{} returned {}", action, status)));
        }
        Ok(())
    }
}

#[async_trait]
impl SessionBackend for HttpSessionBackend {
    async fn notify_alive(&self, session: &SessionInfo) -> Result<()> {
        self.post("notify-alive", &AliveBody { session }).await
    }

    async fn notify_close(&self, session: &SessionInfo) -> Result<()> {
        let body = CloseBody {
            session: CloseSession { url: &session.url },
        };
        self.post("notify-close", &body).await
    }
}

/// Heartbeat reporter for one dev server session
pub struct DevelopmentSession {
    backend: Arc<dyn SessionBackend>,
    info: Arc<SessionInfo>,
    heartbeat: Duration,
    request_timeout: Duration,
    heartbeat_task: Option<JoinHandle<()>>,
}

impl DevelopmentSession {
    pub fn new(
        backend: Arc<dyn SessionBackend>,
        info: SessionInfo,
        heartbeat: Duration,
        request_timeout: Duration,
    ) -> Self {
        Self {
            backend,
            info: Arc::new(info),
            heartbeat,
            request_timeout,
            heartbeat_task: None,
        }
    }

    pub fn info(&self) -> &SessionInfo {
        &self.info
    }

    pub fn is_started(&self) -> bool {
        self.heartbeat_task.is_some()
    }

    /// Report the session and start the heartbeat
    ///
    /// Backend failures are logged; starting an already started session does
    /// nothing.
    pub async fn start(&mut self) -> Result<()> {
        if self.is_started() {
            return Ok(());
        }

        match timeout(self.request_timeout, self.backend.notify_alive(&self.info)).await {
            Ok(Ok(())) => debug!("Development session reported: {}", self.info.url),
            Ok(Err(e)) => warn!("Error updating dev session: {}", e),
            Err(_) => warn!("Timed out reporting the development session"),
        }

        let backend = Arc::clone(&self.backend);
        let info = Arc::clone(&self.info);
        let heartbeat = self.heartbeat;
        self.heartbeat_task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(heartbeat);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = backend.notify_alive(&info).await {
                    debug!("Dev session heartbeat failed: {}", e);
                }
            }
        }));
        Ok(())
    }

    /// Stop the heartbeat and report the session closed
    ///
    /// Safe to call when never started.
    pub async fn stop(&mut self) -> Result<()> {
        let Some(task) = self.heartbeat_task.take() else {
            return Ok(());
        };
        task.abort();

        match timeout(self.request_timeout, self.backend.notify_close(&self.info)).await {
            Ok(result) => result,
            Err(_) => Err(Error::timeout("development session to close")),
        }
    }
}

impl Drop for DevelopmentSession {
    fn drop(&mut self) {
        if let Some(task) = self.heartbeat_task.take() {
            task.abort();
        }
    }
}
