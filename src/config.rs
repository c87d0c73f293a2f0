//! Configuration for autotag.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (USER_PASSWORD, BASEURL, AUTOTAG_*, OPENAI_*)
//! 2. Config file (.autotag/config.yaml)
//! 3. Defaults
//!
//! Config file discovery:
//! - Searches current directory and parents for .autotag/config.yaml
//! - Falls back to ~/.autotag/config.yaml
//! - Paths in config file are relative to the project root (parent of .autotag/)
//!
//! The account credential and the public base URL only come from the
//! environment. Commands that need them fail at startup when they are unset
//! (`serve` needs both, `agent` and `dispatch` need the base URL).

pub mod paths;

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono_tz::Tz;
use serde::Deserialize;
use thiserror::Error;

use crate::core::safety::SafetyLimits;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

pub const ENV_PASSWORD: &str = "USER_PASSWORD";
pub const ENV_BASE_URL: &str = "BASEURL";
pub const ENV_USER: &str = "FTP_USER";
pub const ENV_BIND: &str = "AUTOTAG_BIND";
pub const ENV_GALLERIES: &str = "AUTOTAG_GALLERIES";
pub const ENV_TIMEZONE: &str = "AUTOTAG_TIMEZONE";
pub const ENV_OPENAI_KEY: &str = "OPENAI_API_KEY";
pub const ENV_OPENAI_BASE: &str = "OPENAI_BASE_URL";
pub const ENV_WHISPER: &str = "WHISPER_PATH";

/// Errors that can occur while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Required environment variable {0} is not set")]
    MissingVar(&'static str),

    #[error("Unknown timezone '{name}': {reason}")]
    InvalidTimezone { name: String, reason: String },

    #[error("Invalid passive port range {start}-{end}")]
    InvalidPortRange { start: u16, end: u16 },

    #[error("Invalid address '{value}': {reason}")]
    InvalidAddress { value: String, reason: String },

    #[error("Site command must not be empty")]
    EmptySiteCommand,

    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

// ============================================================================
// Raw config file schema (matches YAML structure)
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub albums: AlbumsConfig,
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub transcription: TranscriptionConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub voice: VoiceConfig,
    #[serde(default)]
    pub safety: Option<SafetyLimits>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerConfig {
    pub bind: Option<String>,
    pub username: Option<String>,
    pub passive_ports: Option<PortRangeConfig>,
    /// Address announced in PASV replies (defaults to the control connection's local address)
    pub passive_address: Option<String>,
    pub cert: Option<String>,
    pub key: Option<String>,
    /// Accept a data connection closed without TLS close_notify as complete
    pub lenient_tls_eof: Option<bool>,
    pub data_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PortRangeConfig {
    pub start: u16,
    pub end: u16,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlbumsConfig {
    pub galleries: Option<String>,
    pub timezone: Option<String>,
    pub categories: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SiteConfig {
    /// Program and arguments, e.g. ["hugo"] or ["sigal", "build", "src", "_build"]
    pub command: Option<Vec<String>>,
    pub working_dir: Option<String>,
    pub manifest: Option<ManifestConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ManifestConfig {
    pub source: String,
    pub output: String,
    #[serde(default)]
    pub patterns: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptionBackendKind {
    Whisper,
    Openai,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TranscriptionConfig {
    pub backend: Option<TranscriptionBackendKind>,
    pub whisper_path: Option<String>,
    pub model: Option<String>,
    pub language: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AgentConfig {
    pub endpoint: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VoiceConfig {
    pub photo_extension: Option<String>,
    pub require_paired_photo: Option<bool>,
}

// ============================================================================
// Resolved configuration
// ============================================================================

/// Resolved configuration with parsed values and absolute-or-relative paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Public base URL of the generated site
    pub base_url: Option<String>,
    pub server: ServerSettings,
    pub albums: AlbumSettings,
    pub site: SiteSettings,
    pub transcription: TranscriptionSettings,
    pub openai: OpenAiSettings,
    pub voice: VoiceSettings,
    pub safety: SafetyLimits,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
}

#[derive(Clone)]
pub struct ServerSettings {
    pub bind: SocketAddr,
    pub username: String,
    pub password: Option<String>,
    pub passive_ports: RangeInclusive<u16>,
    pub passive_address: Option<IpAddr>,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    pub lenient_tls_eof: bool,
    pub data_timeout_seconds: u64,
}

impl fmt::Debug for ServerSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerSettings")
            .field("bind", &self.bind)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("passive_ports", &self.passive_ports)
            .field("passive_address", &self.passive_address)
            .field("cert_path", &self.cert_path)
            .field("key_path", &self.key_path)
            .field("lenient_tls_eof", &self.lenient_tls_eof)
            .field("data_timeout_seconds", &self.data_timeout_seconds)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct AlbumSettings {
    pub galleries_dir: PathBuf,
    pub timezone: Tz,
    pub categories: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SiteSettings {
    pub command: Vec<String>,
    pub working_dir: PathBuf,
    pub manifest: Option<ManifestSettings>,
}

#[derive(Debug, Clone)]
pub struct ManifestSettings {
    pub source: PathBuf,
    pub output: PathBuf,
    pub patterns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptionSettings {
    /// Local whisper binary with JSON output
    Whisper {
        binary_path: String,
        model: String,
        language: String,
    },

    /// OpenAI-compatible /audio/transcriptions endpoint
    OpenAi { model: String },
}

#[derive(Clone)]
pub struct OpenAiSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub chat_model: String,
}

impl fmt::Debug for OpenAiSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiSettings")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("chat_model", &self.chat_model)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceSettings {
    /// Extension of the photo paired with a voice note (replaces `WAV`)
    pub photo_extension: String,
    /// Fail fast when the paired photo is missing
    pub require_paired_photo: bool,
}

impl ResolvedConfig {
    /// Public base URL, required by everything that builds share links
    pub fn require_base_url(&self) -> Result<&str, ConfigError> {
        self.base_url
            .as_deref()
            .ok_or(ConfigError::MissingVar(ENV_BASE_URL))
    }
}

impl ServerSettings {
    /// Account password, required before the server may start
    pub fn require_password(&self) -> Result<&str, ConfigError> {
        self.password
            .as_deref()
            .ok_or(ConfigError::MissingVar(ENV_PASSWORD))
    }
}

pub fn default_categories() -> Vec<String> {
    ["travel", "tech", "foo", "bar", "baz"]
        .iter()
        .map(|c| c.to_string())
        .collect()
}

pub fn default_media_patterns() -> Vec<String> {
    ["*.jpg", "*.jpeg", "*.png", "*.webp"]
        .iter()
        .map(|p| p.to_string())
        .collect()
}

/// Find config file by searching current directory and parents, then ~/.autotag
fn find_config_file() -> Option<PathBuf> {
    if let Ok(mut current) = std::env::current_dir() {
        loop {
            let config_path = paths::project_config(&current);
            if config_path.exists() {
                return Some(config_path);
            }

            if !current.pop() {
                break;
            }
        }
    }

    paths::user_config().filter(|p| p.exists())
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolve a path that may be relative to the project root
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

fn parse_timezone(name: &str) -> Result<Tz, ConfigError> {
    name.parse::<Tz>()
        .map_err(|e| ConfigError::InvalidTimezone {
            name: name.to_string(),
            reason: e.to_string(),
        })
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig, ConfigError> {
    let config_file = find_config_file();

    let (file, base_dir) = match config_file {
        Some(ref config_path) => {
            let file = load_config_file(config_path)?;
            // Base directory is the parent of .autotag/ (i.e., grandparent of config.yaml)
            let base_dir = config_path
                .parent()
                .and_then(|p| p.parent())
                .unwrap_or(Path::new("."))
                .to_path_buf();
            (file, Some(base_dir))
        }
        None => (ConfigFile::default(), None),
    };

    resolve(file, base_dir.as_deref(), config_file, |name| {
        std::env::var(name).ok().filter(|v| !v.is_empty())
    })
}

/// Merge a parsed config file, the environment, and defaults
pub fn resolve(
    file: ConfigFile,
    base_dir: Option<&Path>,
    config_file: Option<PathBuf>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<ResolvedConfig, ConfigError> {
    let path_of = |value: &str| match base_dir {
        Some(base) => resolve_path(base, value),
        None => PathBuf::from(value),
    };

    let password = env(ENV_PASSWORD);
    let base_url = env(ENV_BASE_URL);

    // Server
    let bind_str = env(ENV_BIND)
        .or(file.server.bind.clone())
        .unwrap_or_else(|| "0.0.0.0:2021".to_string());
    let bind = bind_str
        .parse::<SocketAddr>()
        .map_err(|e| ConfigError::InvalidAddress {
            value: bind_str.clone(),
            reason: e.to_string(),
        })?;

    let ports = file.server.passive_ports.unwrap_or(PortRangeConfig {
        start: 21000,
        end: 21010,
    });
    if ports.start == 0 || ports.start > ports.end {
        return Err(ConfigError::InvalidPortRange {
            start: ports.start,
            end: ports.end,
        });
    }

    let passive_address = match file.server.passive_address {
        Some(ref value) => Some(value.parse::<IpAddr>().map_err(|e| {
            ConfigError::InvalidAddress {
                value: value.clone(),
                reason: e.to_string(),
            }
        })?),
        None => None,
    };

    let server = ServerSettings {
        bind,
        username: env(ENV_USER)
            .or(file.server.username)
            .unwrap_or_else(|| "user".to_string()),
        password,
        passive_ports: ports.start..=ports.end,
        passive_address,
        cert_path: path_of(file.server.cert.as_deref().unwrap_or(paths::DEFAULT_CERT)),
        key_path: path_of(file.server.key.as_deref().unwrap_or(paths::DEFAULT_KEY)),
        lenient_tls_eof: file.server.lenient_tls_eof.unwrap_or(false),
        data_timeout_seconds: file.server.data_timeout_seconds.unwrap_or(30),
    };

    // Albums
    let galleries_dir = match env(ENV_GALLERIES) {
        Some(dir) => PathBuf::from(dir),
        None => path_of(
            file.albums
                .galleries
                .as_deref()
                .unwrap_or(paths::DEFAULT_GALLERIES),
        ),
    };
    let tz_name = env(ENV_TIMEZONE)
        .or(file.albums.timezone)
        .unwrap_or_else(|| "UTC".to_string());
    let albums = AlbumSettings {
        galleries_dir,
        timezone: parse_timezone(&tz_name)?,
        categories: file.albums.categories.unwrap_or_else(default_categories),
    };

    // Site generator
    let command = file.site.command.unwrap_or_else(|| vec!["hugo".to_string()]);
    if command.first().map(|p| p.trim().is_empty()).unwrap_or(true) {
        return Err(ConfigError::EmptySiteCommand);
    }
    let site = SiteSettings {
        command,
        working_dir: path_of(
            file.site
                .working_dir
                .as_deref()
                .unwrap_or(paths::DEFAULT_SITE_DIR),
        ),
        manifest: file.site.manifest.map(|m| ManifestSettings {
            source: path_of(&m.source),
            output: path_of(&m.output),
            patterns: m.patterns.unwrap_or_else(default_media_patterns),
        }),
    };

    // Transcription
    let transcription = match file.transcription.backend.unwrap_or(TranscriptionBackendKind::Whisper) {
        TranscriptionBackendKind::Whisper => TranscriptionSettings::Whisper {
            binary_path: env(ENV_WHISPER)
                .or(file.transcription.whisper_path)
                .unwrap_or_else(|| "whisper".to_string()),
            model: file.transcription.model.unwrap_or_else(|| "base".to_string()),
            language: file.transcription.language.unwrap_or_else(|| "en".to_string()),
        },
        TranscriptionBackendKind::Openai => TranscriptionSettings::OpenAi {
            model: file
                .transcription
                .model
                .unwrap_or_else(|| "whisper-1".to_string()),
        },
    };

    let openai = OpenAiSettings {
        base_url: env(ENV_OPENAI_BASE)
            .or(file.agent.endpoint)
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
        api_key: env(ENV_OPENAI_KEY),
        chat_model: file.agent.model.unwrap_or_else(|| "gpt-4o".to_string()),
    };

    let voice = VoiceSettings {
        photo_extension: file
            .voice
            .photo_extension
            .unwrap_or_else(|| "JPG".to_string()),
        require_paired_photo: file.voice.require_paired_photo.unwrap_or(true),
    };

    Ok(ResolvedConfig {
        base_url,
        server,
        albums,
        site,
        transcription,
        openai,
        voice,
        safety: file.safety.unwrap_or_default(),
        config_file,
    })
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> anyhow::Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| e.to_string()));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}
