//! Bootstrap configuration loading and resolution
//!
//! Settings are resolved with the following priority:
//! 1. Command-line arguments (and the host/port environment variables, which
//!    the binary folds into its CLI overrides)
//! 2. TOML configuration file
//! 3. Compiled defaults
//!
//! A missing TOML file at the default location is not an error: the service
//! starts with defaults. A file that exists but cannot be parsed is rejected.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Component, Path, PathBuf};

/// Environment variable overriding the bind host
pub const HOST_ENV_VAR: &str = "ROCKOLA_HOST";

/// Environment variable overriding the bind port
pub const PORT_ENV_VAR: &str = "ROCKOLA_PORT";

/// Top-level paths already routed by the player
const RESERVED_PATHS: &[&str] = &["api", "health", "static"];

/// Contents of the optional TOML configuration file
///
/// Every key is optional; absent keys fall through to compiled defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    /// Storage root scanned by the library index
    pub songs_folder: Option<PathBuf>,
    /// Subdirectory of the storage root receiving uploads
    pub upload_subfolder: Option<String>,
    /// Obscure path serving the admin page
    pub admin_path: Option<String>,
    /// Playable file extensions (case-insensitive, without the dot)
    pub extensions: Option<Vec<String>>,
    pub max_upload_bytes: Option<usize>,
    /// Directory served under `/static` when present
    pub static_folder: Option<PathBuf>,
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing` filter directive used when `RUST_LOG` is unset
    pub level: Option<String>,
}

/// Values used when neither the command line nor the TOML file sets a key
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub host: String,
    pub port: u16,
    pub songs_folder: PathBuf,
    pub upload_subfolder: String,
    pub admin_path: String,
    pub extensions: Vec<String>,
    pub max_upload_bytes: usize,
    pub log_level: String,
}

impl Default for CompiledDefaults {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            songs_folder: PathBuf::from("songs"),
            upload_subfolder: "uploads".to_string(),
            admin_path: "albertitoeselmejor".to_string(),
            extensions: vec!["mp3".to_string(), "wav".to_string()],
            max_upload_bytes: 64 * 1024 * 1024,
            log_level: "rockola_player=info,tower_http=info".to_string(),
        }
    }
}

/// Overrides collected from the command line
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub songs_folder: Option<PathBuf>,
    pub static_folder: Option<PathBuf>,
    pub log_level: Option<String>,
}

/// Fully resolved service settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub songs_folder: PathBuf,
    pub upload_subfolder: String,
    pub admin_path: String,
    pub extensions: Vec<String>,
    pub max_upload_bytes: usize,
    pub static_folder: Option<PathBuf>,
    pub log_level: String,
}

impl Settings {
    /// Merge CLI overrides, TOML values and compiled defaults, then validate.
    pub fn resolve(cli: CliOverrides, file: TomlConfig) -> Result<Self> {
        let defaults = CompiledDefaults::default();

        let extensions = file
            .extensions
            .unwrap_or(defaults.extensions)
            .into_iter()
            .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
            .collect();

        let settings = Self {
            host: cli.host.or(file.host).unwrap_or(defaults.host),
            port: cli.port.or(file.port).unwrap_or(defaults.port),
            songs_folder: cli
                .songs_folder
                .or(file.songs_folder)
                .unwrap_or(defaults.songs_folder),
            upload_subfolder: file.upload_subfolder.unwrap_or(defaults.upload_subfolder),
            admin_path: file
                .admin_path
                .map(|p| p.trim_matches('/').to_string())
                .unwrap_or(defaults.admin_path),
            extensions,
            max_upload_bytes: file.max_upload_bytes.unwrap_or(defaults.max_upload_bytes),
            static_folder: cli.static_folder.or(file.static_folder),
            log_level: cli
                .log_level
                .or(file.logging.level)
                .unwrap_or(defaults.log_level),
        };

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.admin_path.is_empty() || self.admin_path.contains('/') {
            return Err(Error::Config(format!(
                "admin_path must be a single non-empty path segment, got {:?}",
                self.admin_path
            )));
        }
        if RESERVED_PATHS.contains(&self.admin_path.as_str()) {
            return Err(Error::Config(format!(
                "admin_path {:?} collides with a built-in route",
                self.admin_path
            )));
        }

        let upload = Path::new(&self.upload_subfolder);
        let relative = !self.upload_subfolder.is_empty()
            && upload.components().all(|c| matches!(c, Component::Normal(_)));
        if !relative {
            return Err(Error::Config(format!(
                "upload_subfolder must be a relative path inside the songs folder, got {:?}",
                self.upload_subfolder
            )));
        }

        if self.extensions.is_empty() || self.extensions.iter().any(|e| e.is_empty()) {
            return Err(Error::Config("extensions must list at least one non-empty extension".to_string()));
        }

        if self.max_upload_bytes == 0 {
            return Err(Error::Config("max_upload_bytes must be greater than zero".to_string()));
        }

        Ok(())
    }

    /// Socket address string for the HTTP listener
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Platform configuration file location (`<config_dir>/rockola/config.toml`)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("rockola").join("config.toml"))
}

/// Locate the TOML configuration file.
///
/// An explicit path that does not exist is an error; the platform default
/// location is optional and yields `None` when absent.
pub fn locate_config_file(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
    match explicit {
        Some(path) if path.is_file() => Ok(Some(path.to_path_buf())),
        Some(path) => Err(Error::Config(format!(
            "Config file not found: {}",
            path.display()
        ))),
        None => Ok(default_config_path().filter(|path| path.is_file())),
    }
}

/// Parse a TOML configuration file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)?;
    Ok(toml::from_str::<TomlConfig>(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let settings = Settings::resolve(CliOverrides::default(), TomlConfig::default()).unwrap();

        assert_eq!(settings.host, "0.0.0.0");
        assert_eq!(settings.port, 5000);
        assert_eq!(settings.songs_folder, PathBuf::from("songs"));
        assert_eq!(settings.upload_subfolder, "uploads");
        assert_eq!(settings.extensions, vec!["mp3", "wav"]);
        assert!(settings.static_folder.is_none());
    }

    #[test]
    fn cli_beats_toml() {
        let cli = CliOverrides {
            port: Some(8080),
            ..Default::default()
        };
        let file = TomlConfig {
            port: Some(9000),
            host: Some("127.0.0.1".to_string()),
            ..Default::default()
        };

        let settings = Settings::resolve(cli, file).unwrap();
        assert_eq!(settings.port, 8080);
        assert_eq!(settings.host, "127.0.0.1");
        assert_eq!(settings.bind_addr(), "127.0.0.1:8080");
    }

    #[test]
    fn extensions_are_normalized() {
        let file = TomlConfig {
            extensions: Some(vec![".MP3".to_string(), "Flac".to_string()]),
            ..Default::default()
        };

        let settings = Settings::resolve(CliOverrides::default(), file).unwrap();
        assert_eq!(settings.extensions, vec!["mp3", "flac"]);
    }

    #[test]
    fn escaping_upload_subfolder_is_rejected() {
        let file = TomlConfig {
            upload_subfolder: Some("../outside".to_string()),
            ..Default::default()
        };

        assert!(matches!(
            Settings::resolve(CliOverrides::default(), file),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn admin_path_slashes_are_trimmed() {
        let file = TomlConfig {
            admin_path: Some("/secret-admin/".to_string()),
            ..Default::default()
        };

        let settings = Settings::resolve(CliOverrides::default(), file).unwrap();
        assert_eq!(settings.admin_path, "secret-admin");
    }

    #[test]
    fn admin_path_cannot_shadow_builtin_routes() {
        let file = TomlConfig {
            admin_path: Some("health".to_string()),
            ..Default::default()
        };

        assert!(matches!(
            Settings::resolve(CliOverrides::default(), file),
            Err(Error::Config(_))
        ));
    }
}
