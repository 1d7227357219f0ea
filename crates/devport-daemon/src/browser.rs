//! Open URLs in the desktop web browser

use devport_core::prelude::*;
use std::process::Stdio;
use tokio::process::Command;

/// Platform command used to hand a URL to the default browser
fn browser_command(url: &str) -> (&'static str, Vec<String>) {
    if cfg!(target_os = "macos") {
        ("open", vec![url.to_string()])
    } else if cfg!(target_os = "windows") {
        // `start` treats the first quoted argument as a window title
        (
            "cmd",
            vec![
                "/C".to_string(),
                "start".to_string(),
                String::new(),
                url.replace('&', "^&"),
            ],
        )
    } else {
        ("xdg-open", vec![url.to_string()])
    }
}

/// Open `url` in the default desktop browser
pub async fn open_browser(url: &str) -> Result<()> {
    let (program, args) = browser_command(url);
    debug!("Opening browser: {} {}", program, args.join(" "));

    let status = Command::new(program)
        .args(&args)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::tool_not_found(program)
            } else {
                Error::process(format!("Failed to open browser: {}", e))
            }
        })?;

    if !status.success() {
        return Err(Error::process(format!(
            "{} exited with code {:?}",
            program,
            status.code()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_browser_command_passes_url() {
        let (program, args) = browser_command("http://localhost:3000");
        assert!(!program.is_empty());
        assert!(args.iter().any(|a| a.contains("localhost:3000")));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_browser_command_linux() {
        let (program, args) = browser_command("http://localhost:3000/?a=1&b=2");
        assert_eq!(program, "xdg-open");
        assert_eq!(args, vec!["http://localhost:3000/?a=1&b=2".to_string()]);
    }
}
