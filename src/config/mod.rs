//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    net::SocketAddr,
    num::NonZeroU32,
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use chrono_tz::Tz;
use clap::{Args, Parser, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "mindprint";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_PUBLIC_BASE_URL: &str = "http://127.0.0.1:3000";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_IDENTITY_VERIFY_URL: &str = "http://127.0.0.1:4000/identity/verify";
const DEFAULT_NAVIGATION_TIMEOUT_SECS: u64 = 60;
const DEFAULT_TIMEZONE: &str = "Asia/Kolkata";
const DEFAULT_WATERMARK_TEXT: &str = "MindPrint Preview";
pub(crate) const DEFAULT_CHROMIUM_PATH: &str = "chromium";

/// Minimum length of the ticket-signing secret in bytes.
const MIN_SIGNING_SECRET_BYTES: usize = 32;

/// HMAC key for capability tickets. Redacted from `Debug` output so the
/// secret never reaches logs through a dumped settings struct.
#[derive(Clone)]
pub struct SigningSecret(Vec<u8>);

impl SigningSecret {
    pub fn new(value: String) -> Result<Self, LoadError> {
        let trimmed = value.trim();
        if trimmed.len() < MIN_SIGNING_SECRET_BYTES {
            return Err(LoadError::invalid(
                "signing.secret",
                format!("must be at least {MIN_SIGNING_SECRET_BYTES} bytes"),
            ));
        }
        Ok(Self(trimmed.as_bytes().to_vec()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn for_tests(secret: &str) -> Self {
        Self(secret.as_bytes().to_vec())
    }
}

impl std::fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SigningSecret(<redacted>)")
    }
}

/// Command-line arguments for the MindPrint binary.
#[derive(Debug, Parser)]
#[command(name = "mindprint", version, about = "MindPrint document export server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "MINDPRINT_CONFIG_FILE",
        value_name = "PATH"
    )]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base URL the render engine uses to reach this server.
    #[arg(long = "server-public-base-url", value_name = "URL")]
    pub public_base_url: Option<String>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Override the identity provider verification endpoint.
    #[arg(long = "identity-verify-url", value_name = "URL")]
    pub identity_verify_url: Option<String>,

    /// Override the Chromium executable used for PDF rendering.
    #[arg(long = "engine-chromium-path", value_name = "PATH")]
    pub chromium_path: Option<PathBuf>,

    /// Override the navigation timeout for the render engine.
    #[arg(long = "engine-navigation-timeout-seconds", value_name = "SECONDS")]
    pub navigation_timeout_seconds: Option<u64>,

    /// Override the reference timezone for daily quota windows.
    #[arg(long = "export-timezone", value_name = "TZ")]
    pub export_timezone: Option<String>,

    /// Override the watermark overlay text on free-plan exports.
    #[arg(long = "export-watermark-text", value_name = "TEXT")]
    pub watermark_text: Option<String>,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub signing: SigningSettings,
    pub identity: IdentitySettings,
    pub engine: EngineSettings,
    pub export: ExportSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
    /// Base URL the headless engine navigates to for print views. Usually
    /// the loopback address of this same server.
    pub public_base_url: Url,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct SigningSettings {
    pub secret: SigningSecret,
}

#[derive(Debug, Clone)]
pub struct IdentitySettings {
    pub verify_url: Url,
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub chromium_path: PathBuf,
    pub navigation_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ExportSettings {
    pub timezone: Tz,
    pub admin_emails: Vec<String>,
    pub watermark_text: String,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("missing required configuration `{key}`: {reason}")]
    Missing { key: &'static str, reason: String },
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn missing(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Missing {
            key,
            reason: reason.into(),
        }
    }

    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("MINDPRINT").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(&cli.overrides);

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    signing: RawSigningSettings,
    identity: RawIdentitySettings,
    engine: RawEngineSettings,
    export: RawExportSettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(url) = overrides.public_base_url.as_ref() {
            self.server.public_base_url = Some(url.clone());
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(max) = overrides.database_max_connections {
            self.database.max_connections = Some(max);
        }
        if let Some(url) = overrides.identity_verify_url.as_ref() {
            self.identity.verify_url = Some(url.clone());
        }
        if let Some(path) = overrides.chromium_path.as_ref() {
            self.engine.chromium_path = Some(path.clone());
        }
        if let Some(seconds) = overrides.navigation_timeout_seconds {
            self.engine.navigation_timeout_seconds = Some(seconds);
        }
        if let Some(timezone) = overrides.export_timezone.as_ref() {
            self.export.timezone = Some(timezone.clone());
        }
        if let Some(text) = overrides.watermark_text.as_ref() {
            self.export.watermark_text = Some(text.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            database,
            signing,
            identity,
            engine,
            export,
        } = raw;

        let server = build_server_settings(server)?;
        let logging = build_logging_settings(logging)?;
        let database = build_database_settings(database)?;
        let signing = build_signing_settings(signing)?;
        let identity = build_identity_settings(identity)?;
        let engine = build_engine_settings(engine)?;
        let export = build_export_settings(export)?;

        Ok(Self {
            server,
            logging,
            database,
            signing,
            identity,
            engine,
            export,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    let base = server
        .public_base_url
        .unwrap_or_else(|| DEFAULT_PUBLIC_BASE_URL.to_string());
    let public_base_url = Url::parse(base.trim())
        .map_err(|err| LoadError::invalid("server.public_base_url", err.to_string()))?;

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
        public_base_url,
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = database.url.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let max_value = database
        .max_connections
        .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS);
    let max_connections = non_zero_u32(max_value.into(), "database.max_connections")?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_signing_settings(signing: RawSigningSettings) -> Result<SigningSettings, LoadError> {
    let value = signing.secret.ok_or_else(|| {
        LoadError::missing(
            "signing.secret",
            "set MINDPRINT__SIGNING__SECRET or signing.secret in the configuration file",
        )
    })?;
    let secret = SigningSecret::new(value)?;
    Ok(SigningSettings { secret })
}

fn build_identity_settings(identity: RawIdentitySettings) -> Result<IdentitySettings, LoadError> {
    let value = identity
        .verify_url
        .unwrap_or_else(|| DEFAULT_IDENTITY_VERIFY_URL.to_string());
    let verify_url = Url::parse(value.trim())
        .map_err(|err| LoadError::invalid("identity.verify_url", err.to_string()))?;
    Ok(IdentitySettings { verify_url })
}

fn build_engine_settings(engine: RawEngineSettings) -> Result<EngineSettings, LoadError> {
    let chromium_path = engine
        .chromium_path
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CHROMIUM_PATH));
    if chromium_path.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "engine.chromium_path",
            "path must not be empty",
        ));
    }

    let timeout_secs = engine
        .navigation_timeout_seconds
        .unwrap_or(DEFAULT_NAVIGATION_TIMEOUT_SECS);
    if timeout_secs == 0 {
        return Err(LoadError::invalid(
            "engine.navigation_timeout_seconds",
            "must be greater than zero",
        ));
    }

    Ok(EngineSettings {
        chromium_path,
        navigation_timeout: Duration::from_secs(timeout_secs),
    })
}

fn build_export_settings(export: RawExportSettings) -> Result<ExportSettings, LoadError> {
    let timezone_name = export
        .timezone
        .unwrap_or_else(|| DEFAULT_TIMEZONE.to_string());
    let timezone = Tz::from_str(timezone_name.trim())
        .map_err(|err| LoadError::invalid("export.timezone", err.to_string()))?;

    let admin_emails = export
        .admin_emails
        .into_iter()
        .filter_map(|email| {
            let trimmed = email.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        })
        .collect();

    let watermark_text = export
        .watermark_text
        .and_then(|value| {
            let trimmed = value.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        })
        .unwrap_or_else(|| DEFAULT_WATERMARK_TEXT.to_string());

    Ok(ExportSettings {
        timezone,
        admin_emails,
        watermark_text,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
    public_base_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSigningSettings {
    secret: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawIdentitySettings {
    verify_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawEngineSettings {
    chromium_path: Option<PathBuf>,
    navigation_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawExportSettings {
    timezone: Option<String>,
    admin_emails: Vec<String>,
    watermark_text: Option<String>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}
