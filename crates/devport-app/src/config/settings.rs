//! Settings parser for .devport/config.toml

use super::types::{EnvOverrides, Settings};
use devport_core::prelude::*;
use std::path::{Path, PathBuf};

const CONFIG_FILENAME: &str = "config.toml";
const DEVPORT_DIR: &str = ".devport";

/// Presence of this file means the project ships the dev launcher
const DEV_LAUNCHER_MANIFEST: &str = "node_modules/expo-dev-launcher/package.json";

/// Load settings from `.devport/config.toml` and the process environment
///
/// A missing or unreadable file yields defaults.
pub fn load_settings(project_path: &Path) -> Settings {
    let mut settings = load_settings_file(project_path);
    settings.env = EnvOverrides::from_env();
    settings
}

fn load_settings_file(project_path: &Path) -> Settings {
    let config_path = project_path.join(DEVPORT_DIR).join(CONFIG_FILENAME);

    if !config_path.exists() {
        debug!("No config file at {:?}, using defaults", config_path);
        return Settings::default();
    }

    match std::fs::read_to_string(&config_path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(settings) => {
                debug!("Loaded settings from {:?}", config_path);
                settings
            }
            Err(e) => {
                warn!("Failed to parse {:?}: {}", config_path, e);
                Settings::default()
            }
        },
        Err(e) => {
            warn!("Failed to read {:?}: {}", config_path, e);
            Settings::default()
        }
    }
}

/// Create `.devport/config.toml` with commented defaults if it does not exist
pub fn init_config_dir(project_path: &Path) -> Result<PathBuf> {
    let devport_dir = project_path.join(DEVPORT_DIR);

    if !devport_dir.exists() {
        std::fs::create_dir_all(&devport_dir)
            .map_err(|e| Error::config(format!("Failed to create .devport dir: {}", e)))?;
    }

    let config_path = devport_dir.join(CONFIG_FILENAME);
    if !config_path.exists() {
        let default_content = r#"# devport configuration

[server]
port = 3000
https = false
host_type = "lan"        # lan | tunnel | localhost
# scheme = "my-app"      # custom app scheme for development builds
dev_client = false

[tunnel]
command = "ngrok"
start_timeout_ms = 10000

[session]
enabled = true
heartbeat_secs = 20

[manifest]
default_type = "classic" # classic | expo-updates
main_module = "index"

[platforms]
ios_bundle_id = "host.exp.Exponent"
android_package = "host.exp.exponent"
"#;
        std::fs::write(&config_path, default_content)
            .map_err(|e| Error::config(format!("Failed to write config.toml: {}", e)))?;
        info!("Created default config at {:?}", config_path);
    }

    Ok(config_path)
}

/// Canonical project root, without Windows verbatim prefixes
pub fn resolve_project_root(path: &Path) -> Result<PathBuf> {
    dunce::canonicalize(path).map_err(|e| {
        Error::config(format!(
            "Project directory {} is not accessible: {}",
            path.display(),
            e
        ))
    })
}

/// Whether native launches go through the `/_expo/loading` page
pub fn is_interstitial_page_enabled(project_root: &Path, env: &EnvOverrides) -> bool {
    if env.no_redirect_page {
        return false;
    }
    project_root.join(DEV_LAUNCHER_MANIFEST).is_file()
}

#[cfg(test)]
mod tests {
    use super::*;
    use devport_core::{HostType, ManifestType};
    use serial_test::serial;
    use tempfile::tempdir;

    #[test]
    #[serial]
    fn test_load_settings_defaults() {
        let temp = tempdir().unwrap();
        let settings = load_settings(temp.path());

        assert_eq!(settings.server.port, 3000);
        assert_eq!(settings.server.host_type, HostType::Lan);
        assert!(!settings.server.dev_client);
    }

    #[test]
    #[serial]
    fn test_load_settings_custom() {
        let temp = tempdir().unwrap();
        let dir = temp.path().join(".devport");
        std::fs::create_dir_all(&dir).unwrap();

        let config = r#"
[server]
port = 19000
host_type = "tunnel"
scheme = "my-app"
dev_client = true

[manifest]
default_type = "expo-updates"
"#;
        std::fs::write(dir.join("config.toml"), config).unwrap();

        let settings = load_settings(temp.path());

        assert_eq!(settings.server.port, 19000);
        assert_eq!(settings.server.host_type, HostType::Tunnel);
        assert_eq!(settings.server.scheme.as_deref(), Some("my-app"));
        assert!(settings.server.dev_client);
        assert_eq!(settings.manifest.default_type, ManifestType::ExpoUpdates);
    }

    #[test]
    #[serial]
    fn test_load_settings_invalid_toml() {
        let temp = tempdir().unwrap();
        let dir = temp.path().join(".devport");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("config.toml"), "[server\nport = ").unwrap();

        let settings = load_settings(temp.path());
        assert_eq!(settings.server.port, 3000);
    }

    #[test]
    fn test_init_config_dir_writes_parsable_defaults() {
        let temp = tempdir().unwrap();
        let path = init_config_dir(temp.path()).unwrap();
        assert!(path.exists());

        let content = std::fs::read_to_string(&path).unwrap();
        let settings: Settings = toml::from_str(&content).unwrap();
        assert_eq!(settings.server.port, 3000);

        // Existing files are left alone
        std::fs::write(&path, "[server]\nport = 4000\n").unwrap();
        init_config_dir(temp.path()).unwrap();
        assert!(std::fs::read_to_string(&path).unwrap().contains("4000"));
    }

    #[test]
    fn test_resolve_project_root_missing() {
        let temp = tempdir().unwrap();
        let err = resolve_project_root(&temp.path().join("nope")).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_interstitial_requires_dev_launcher() {
        let temp = tempdir().unwrap();
        let env = EnvOverrides::default();
        assert!(!is_interstitial_page_enabled(temp.path(), &env));

        let launcher = temp.path().join("node_modules/expo-dev-launcher");
        std::fs::create_dir_all(&launcher).unwrap();
        std::fs::write(launcher.join("package.json"), "{}").unwrap();
        assert!(is_interstitial_page_enabled(temp.path(), &env));

        let disabled = EnvOverrides {
            no_redirect_page: true,
            ..EnvOverrides::default()
        };
        assert!(!is_interstitial_page_enabled(temp.path(), &disabled));
    }
}
