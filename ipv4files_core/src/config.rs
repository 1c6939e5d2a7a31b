use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::transfer::constants::DEFAULT_PORT;

const APP_QUALIFIER: &str = "com";
const APP_ORGANIZATION: &str = "ipv4files";
const APP_NAME: &str = "ipv4files";
const CONFIG_FILE: &str = "config.json";
const CONFIG_DIR_ENV: &str = "IPV4FILES_CONFIG_DIR";

/// Framing used for control messages; both peers must agree
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireFormat {
    /// Unframed text messages with a sentinel-terminated catalog, for
    /// peers without length prefixes
    Legacy,
    /// Every control message carries a 4-byte big-endian length prefix
    #[default]
    Framed,
}

/// How the listener reacts to faulty sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestartPolicy {
    /// Failed rebinds in a row before the listener gives up
    pub max_consecutive_faults: u32,
    /// Pause before rebinding after a fault or a failed bind
    #[serde(with = "duration_millis")]
    pub backoff: Duration,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            max_consecutive_faults: 5,
            backoff: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub shared_folder: PathBuf,
    pub port: u16,
    /// Where directory archives are written; system temp dir when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staging_dir: Option<PathBuf>,
    #[serde(default)]
    pub wire_format: WireFormat,
    #[serde(default)]
    pub restart: RestartPolicy,
}

impl ServerConfig {
    pub fn new(shared_folder: impl Into<PathBuf>, port: u16) -> Self {
        Self {
            shared_folder: shared_folder.into(),
            port,
            staging_dir: None,
            wire_format: WireFormat::default(),
            restart: RestartPolicy::default(),
        }
    }

    /// Directory that receives temporary archive artifacts
    ///
    /// Defaults to the parent of the shared folder, so `<name>.zip` sits
    /// beside the share and never shows up in its catalog.
    pub fn staging_dir(&self) -> PathBuf {
        if let Some(dir) = &self.staging_dir {
            return dir.clone();
        }
        match self.shared_folder.parent() {
            Some(parent) if parent.as_os_str().is_empty() => PathBuf::from("."),
            Some(parent) => parent.to_path_buf(),
            None => std::env::temp_dir().join(APP_NAME),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Target server as `host:port`
    pub server_addr: String,
    pub download_folder: PathBuf,
    #[serde(default)]
    pub wire_format: WireFormat,
}

impl ClientConfig {
    pub fn new(server_addr: impl Into<String>, download_folder: impl Into<PathBuf>) -> Self {
        Self {
            server_addr: server_addr.into(),
            download_folder: download_folder.into(),
            wire_format: WireFormat::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: Option<ServerConfig>,
    #[serde(default)]
    pub client: Option<ClientConfig>,
}

impl AppConfig {
    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        if let Ok(dir) = std::env::var(CONFIG_DIR_ENV) {
            return Some(PathBuf::from(dir).join(CONFIG_FILE));
        }

        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE))
    }

    /// Load config from disk or return default
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path).unwrap_or_else(|e| {
                tracing::debug!("Using default config: {:#}", e);
                Self::default()
            }),
            None => Self::default(),
        }
    }

    /// Save config to disk
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path().context("No config directory available")?;
        self.save_to(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }
}

/// Default server settings for a first run
pub fn default_server_config() -> ServerConfig {
    let shared = directories::UserDirs::new()
        .map(|dirs| dirs.home_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ipv4files_shared");
    ServerConfig::new(shared, DEFAULT_PORT)
}

/// Default client settings for a first run
pub fn default_client_config() -> ClientConfig {
    let download = directories::UserDirs::new()
        .and_then(|dirs| dirs.download_dir().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ipv4files");
    ClientConfig::new(format!("127.0.0.1:{}", DEFAULT_PORT), download)
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_roundtrip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);

        let mut server = ServerConfig::new("/srv/share", 4000);
        server.wire_format = WireFormat::Framed;
        server.restart.backoff = Duration::from_millis(250);
        let config = AppConfig {
            server: Some(server),
            client: Some(ClientConfig::new("10.0.0.2:4000", "/tmp/downloads")),
        };

        config.save_to(&path).unwrap();
        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_optional_fields_use_defaults() {
        let json = r#"{"server":{"shared_folder":"/data","port":25565}}"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();

        let server = config.server.unwrap();
        assert_eq!(server.wire_format, WireFormat::Framed);
        assert_eq!(server.restart, RestartPolicy::default());
        assert!(server.staging_dir.is_none());
        assert!(config.client.is_none());
    }

    #[test]
    fn test_load_from_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(AppConfig::load_from(&dir.path().join("absent.json")).is_err());
    }

    #[test]
    fn test_staging_dir_sits_beside_share() {
        let server = ServerConfig::new("/srv/share", 1);
        assert_eq!(server.staging_dir(), PathBuf::from("/srv"));

        let relative = ServerConfig::new("share", 1);
        assert_eq!(relative.staging_dir(), PathBuf::from("."));

        let root = ServerConfig::new("/", 1);
        assert!(root.staging_dir().starts_with(std::env::temp_dir()));

        let mut custom = server.clone();
        custom.staging_dir = Some(PathBuf::from("/var/tmp/stage"));
        assert_eq!(custom.staging_dir(), PathBuf::from("/var/tmp/stage"));
    }
}
