//! ngrok tunnel process management
//!
//! Spawns `ngrok http <port> --log stdout --log-format json` and watches its
//! structured log for the public URL of the tunnel.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::{oneshot, Notify};
use tokio::time::timeout;

use devport_core::prelude::*;

/// How long `shutdown` waits for the process to go away after the kill signal
const EXIT_TIMEOUT: Duration = Duration::from_secs(2);

/// Options for an ngrok tunnel
#[derive(Debug, Clone)]
pub struct NgrokOptions {
    /// Path or name of the ngrok binary
    pub command: PathBuf,
    /// Local port to expose
    pub port: u16,
    pub authtoken: Option<String>,
    pub region: Option<String>,
}

impl NgrokOptions {
    pub fn new(command: impl Into<PathBuf>, port: u16) -> Self {
        Self {
            command: command.into(),
            port,
            authtoken: None,
            region: None,
        }
    }

    /// Build the ngrok command line
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "http".to_string(),
            self.port.to_string(),
            "--log".to_string(),
            "stdout".to_string(),
            "--log-format".to_string(),
            "json".to_string(),
        ];
        if let Some(token) = &self.authtoken {
            args.push("--authtoken".to_string());
            args.push(token.clone());
        }
        if let Some(region) = &self.region {
            args.push("--region".to_string());
            args.push(region.clone());
        }
        args
    }
}

/// One interesting line of ngrok's JSON log
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NgrokLogLine {
    /// A tunnel came up at this public URL
    Started(String),
    /// ngrok reported a fatal error
    Failed(String),
    Other,
}

/// Classify a line of `--log-format json` output
pub fn parse_log_line(line: &str) -> NgrokLogLine {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(line) else {
        return NgrokLogLine::Other;
    };

    if let Some(url) = value.get("url").and_then(|u| u.as_str()) {
        if url.starts_with("https://") {
            return NgrokLogLine::Started(url.to_string());
        }
    }

    let level = value.get("lvl").and_then(|l| l.as_str()).unwrap_or_default();
    if matches!(level, "eror" | "crit") {
        let message = value
            .get("err")
            .or_else(|| value.get("msg"))
            .and_then(|m| m.as_str())
            .unwrap_or("unknown ngrok error");
        return NgrokLogLine::Failed(message.to_string());
    }

    NgrokLogLine::Other
}

/// A running ngrok child process with an established tunnel
pub struct NgrokProcess {
    public_url: String,
    pid: Option<u32>,
    /// Consumed on first use (or on drop)
    kill_tx: Option<oneshot::Sender<()>>,
    exited: Arc<AtomicBool>,
    exit_notify: Arc<Notify>,
}

impl NgrokProcess {
    /// Spawn ngrok and wait (up to `start_timeout`) for the public URL
    pub async fn spawn(options: &NgrokOptions, start_timeout: Duration) -> Result<Self> {
        let args = options.to_args();
        info!(
            "Starting tunnel: {} {}",
            options.command.display(),
            redact_args(&args).join(" ")
        );
        Self::spawn_command(&options.command, &args, start_timeout).await
    }

    /// Spawn any command that speaks ngrok's JSON log format.
    async fn spawn_command(
        program: &std::path::Path,
        args: &[String],
        start_timeout: Duration,
    ) -> Result<Self> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::tool_not_found(program.display().to_string())
                } else {
                    Error::ProcessSpawn {
                        reason: e.to_string(),
                    }
                }
            })?;

        let pid = child.id();
        debug!("Tunnel process started with PID: {:?}", pid);

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::process("tunnel stdout was not captured"))?;
        let mut lines = BufReader::new(stdout).lines();

        let public_url = match timeout(start_timeout, Self::wait_for_url(&mut lines)).await {
            Ok(Ok(url)) => url,
            Ok(Err(e)) => {
                let _ = child.kill().await;
                return Err(e);
            }
            Err(_) => {
                let _ = child.kill().await;
                return Err(Error::timeout("tunnel to start"));
            }
        };
        info!("Tunnel ready: {}", public_url);

        tokio::spawn(Self::drain_log(lines));

        let exited = Arc::new(AtomicBool::new(false));
        let exit_notify = Arc::new(Notify::new());
        let (kill_tx, kill_rx) = oneshot::channel::<()>();

        tokio::spawn(Self::wait_for_exit(
            child,
            kill_rx,
            Arc::clone(&exited),
            Arc::clone(&exit_notify),
        ));

        Ok(Self {
            public_url,
            pid,
            kill_tx: Some(kill_tx),
            exited,
            exit_notify,
        })
    }

    async fn wait_for_url(lines: &mut Lines<BufReader<ChildStdout>>) -> Result<String> {
        while let Some(line) = lines.next_line().await? {
            trace!("ngrok: {}", line);
            match parse_log_line(&line) {
                NgrokLogLine::Started(url) => return Ok(url),
                NgrokLogLine::Failed(message) => return Err(Error::tunnel(message)),
                NgrokLogLine::Other => {}
            }
        }
        Err(Error::tunnel("ngrok exited before establishing a tunnel"))
    }

    /// Keep reading the log so ngrok never blocks on a full pipe
    async fn drain_log(mut lines: Lines<BufReader<ChildStdout>>) {
        while let Ok(Some(line)) = lines.next_line().await {
            if let NgrokLogLine::Failed(message) = parse_log_line(&line) {
                warn!("Tunnel error: {}", message);
            } else {
                trace!("ngrok: {}", line);
            }
        }
        debug!("tunnel log reader finished");
    }

    /// Background task: owns `child` until it exits or is killed
    async fn wait_for_exit(
        mut child: Child,
        kill_rx: oneshot::Receiver<()>,
        exited: Arc<AtomicBool>,
        exit_notify: Arc<Notify>,
    ) {
        tokio::select! {
            result = child.wait() => {
                match result {
                    Ok(status) => warn!("Tunnel process exited with status: {:?}", status),
                    Err(e) => error!("Error waiting for tunnel process: {}", e),
                }
            }
            _ = kill_rx => {
                debug!("Kill signal received, stopping tunnel process");
                if let Err(e) = child.kill().await {
                    error!("Failed to kill tunnel process: {}", e);
                }
            }
        }

        exited.store(true, Ordering::Release);
        exit_notify.notify_waiters();
    }

    pub fn public_url(&self) -> &str {
        &self.public_url
    }

    pub fn id(&self) -> Option<u32> {
        self.pid
    }

    /// Check if the process has already exited.
    pub fn has_exited(&self) -> bool {
        self.exited.load(Ordering::Acquire)
    }

    /// Stop the tunnel process. Safe to call more than once.
    pub async fn shutdown(&mut self) -> Result<()> {
        if self.has_exited() {
            return Ok(());
        }

        // Create the `notified()` future before sending the signal so the
        // wake-up cannot be missed.
        let notified = self.exit_notify.notified();
        if let Some(tx) = self.kill_tx.take() {
            let _ = tx.send(());
        }
        if self.has_exited() {
            return Ok(());
        }

        timeout(EXIT_TIMEOUT, notified)
            .await
            .map_err(|_| Error::timeout("tunnel process to exit"))
    }
}

impl Drop for NgrokProcess {
    fn drop(&mut self) {
        if !self.has_exited() {
            if let Some(tx) = self.kill_tx.take() {
                let _ = tx.send(());
            }
        }
    }
}

/// Hide the authtoken when logging the command line
fn redact_args(args: &[String]) -> Vec<String> {
    let mut redacted = args.to_vec();
    if let Some(pos) = redacted.iter().position(|a| a == "--authtoken") {
        if let Some(token) = redacted.get_mut(pos + 1) {
            *token = "***".to_string();
        }
    }
    redacted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_args_minimal() {
        let options = NgrokOptions::new("ngrok", 3000);
        assert_eq!(
            options.to_args(),
            vec!["http", "3000", "--log", "stdout", "--log-format", "json"]
        );
    }

    #[test]
    fn test_to_args_with_token_and_region() {
        let mut options = NgrokOptions::new("ngrok", 8081);
        options.authtoken = Some("secret".to_string());
        options.region = Some("eu".to_string());

        let args = options.to_args();
        assert!(args.windows(2).any(|w| w == ["--authtoken", "secret"]));
        assert!(args.windows(2).any(|w| w == ["--region", "eu"]));

        let redacted = redact_args(&args);
        assert!(!redacted.contains(&"secret".to_string()));
    }

    #[test]
    fn test_parse_log_line_started() {
        let line = r#"{"lvl":"info","msg":"started tunnel","obj":"tunnels","name":"command_line","addr":"http://localhost:3000","url":"https://abcd.ngrok-free.app"}"#;
        assert_eq!(
            parse_log_line(line),
            NgrokLogLine::Started("https://abcd.ngrok-free.app".to_string())
        );
    }

    #[test]
    fn test_parse_log_line_error() {
        let line = r#"{"lvl":"eror","msg":"session closing","err":"authentication failed"}"#;
        assert_eq!(
            parse_log_line(line),
            NgrokLogLine::Failed("authentication failed".to_string())
        );
    }

    #[test]
    fn test_parse_log_line_other() {
        assert_eq!(parse_log_line("plain text"), NgrokLogLine::Other);
        assert_eq!(
            parse_log_line(r#"{"lvl":"info","msg":"client session established"}"#),
            NgrokLogLine::Other
        );
        // Local addresses are not public URLs
        assert_eq!(
            parse_log_line(r#"{"lvl":"info","url":"http://127.0.0.1:4040"}"#),
            NgrokLogLine::Other
        );
    }

    fn sh_args(script: &str) -> Vec<String> {
        vec!["-c".to_string(), script.to_string()]
    }

    #[tokio::test]
    async fn test_spawn_reads_public_url_and_shuts_down() {
        let script = r#"echo '{"lvl":"info","msg":"starting"}'; echo '{"lvl":"info","msg":"started tunnel","url":"https://test.ngrok.app"}'; sleep 30"#;
        let mut process = NgrokProcess::spawn_command(
            std::path::Path::new("sh"),
            &sh_args(script),
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        assert_eq!(process.public_url(), "https://test.ngrok.app");
        assert!(!process.has_exited());

        process.shutdown().await.unwrap();
        assert!(process.has_exited());

        // Second shutdown is a no-op
        process.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_spawn_reports_ngrok_error() {
        let script = r#"echo '{"lvl":"eror","msg":"session closing","err":"bad token"}'; sleep 30"#;
        let result = NgrokProcess::spawn_command(
            std::path::Path::new("sh"),
            &sh_args(script),
            Duration::from_secs(5),
        )
        .await;

        assert!(matches!(result, Err(Error::Tunnel { ref message }) if message == "bad token"));
    }

    #[tokio::test]
    async fn test_spawn_exit_before_url() {
        let result = NgrokProcess::spawn_command(
            std::path::Path::new("sh"),
            &sh_args("exit 0"),
            Duration::from_secs(5),
        )
        .await;

        assert!(matches!(result, Err(Error::Tunnel { .. })));
    }

    #[tokio::test]
    async fn test_spawn_times_out() {
        let result = NgrokProcess::spawn_command(
            std::path::Path::new("sh"),
            &sh_args("sleep 30"),
            Duration::from_millis(100),
        )
        .await;

        assert!(matches!(result, Err(Error::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_spawn_missing_binary() {
        let result = NgrokProcess::spawn_command(
            std::path::Path::new("/nonexistent/ngrok-binary"),
            &[],
            Duration::from_secs(1),
        )
        .await;

        assert!(matches!(result, Err(Error::ToolNotFound { .. })));
    }
}
