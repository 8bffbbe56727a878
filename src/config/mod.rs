//! Settings for the purge engine and its trigger surfaces.
//!
//! Sources, lowest precedence first: `config/default.toml`, `edgepurge.toml`,
//! `--config-file`, `EDGEPURGE__*` variables, command-line flags.

use std::{collections::HashMap, net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::purge::config::{
    DEFAULT_AUTHOR_ARCHIVE_TYPES, DEFAULT_CONCURRENCY, DEFAULT_CONNECT_TIMEOUT_MS,
    DEFAULT_INVALID_TYPES, DEFAULT_MAX_URLS_BEFORE_ALL, DEFAULT_NO_ARCHIVE_TYPES,
    DEFAULT_REQUEST_TIMEOUT_MS, DEFAULT_REST_ROUTE, DEFAULT_VALID_STATUSES, split_list,
};
use crate::purge::{ChangeEventKind, EventScope, EventScopeTable, Scheme};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "edgepurge";
const ENV_PREFIX: &str = "EDGEPURGE";
const HOSTNAME_ENV: &str = "HOSTNAME";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3080;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 10;

/// Command-line arguments for the edgepurge binary.
#[derive(Debug, Parser)]
#[command(name = "edgepurge", version, about = "Edge cache purge engine")]
pub struct CliArgs {
    /// Extra TOML file merged above the default files.
    #[arg(long = "config-file", env = "EDGEPURGE_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP trigger service.
    Serve(ServeArgs),
    /// Purge cached URLs once and exit.
    Purge(PurgeArgs),
    /// Flush the CMS object cache.
    #[command(name = "flush-object-cache")]
    FlushObjectCache(FlushObjectCacheArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub purge: PurgeOverrides,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Seconds to wait for in-flight triggers after ctrl-c.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,
}

/// Flags shared by every command that runs purge cycles.
#[derive(Debug, Args, Default, Clone)]
pub struct PurgeOverrides {
    /// Override the comma-separated cache host list.
    #[arg(long = "cache-hosts", value_name = "HOSTS")]
    pub cache_hosts: Option<String>,

    /// Force the purge request scheme (http|https).
    #[arg(long = "schema", value_name = "SCHEME")]
    pub schema: Option<String>,

    /// Override the comma-separated mirror domain list.
    #[arg(long = "mirror-domains", value_name = "DOMAINS")]
    pub mirror_domains: Option<String>,

    /// Override the pending URL count that escalates to a full purge.
    #[arg(long = "max-urls-before-all", value_name = "COUNT")]
    pub max_urls_before_all: Option<usize>,

    /// Override the site home URL.
    #[arg(long = "home-url", value_name = "URL", value_hint = ValueHint::Url)]
    pub home_url: Option<String>,

    /// Override the content snapshot path.
    #[arg(long = "content-snapshot", value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub content_snapshot: Option<PathBuf>,

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
}

#[derive(Debug, Args, Clone)]
pub struct PurgeArgs {
    #[command(subcommand)]
    pub command: PurgeCommand,
}

#[derive(Debug, Subcommand, Clone)]
pub enum PurgeCommand {
    /// Purge everything under the home URL on every cache host.
    All(PurgeAllArgs),
    /// Purge a single URL.
    Url(PurgeUrlArgs),
    /// Record document change events in one cycle and dispatch.
    Documents(PurgeDocumentsArgs),
}

impl PurgeCommand {
    pub fn overrides(&self) -> &PurgeOverrides {
        match self {
            PurgeCommand::All(args) => &args.overrides,
            PurgeCommand::Url(args) => &args.overrides,
            PurgeCommand::Documents(args) => &args.overrides,
        }
    }
}

#[derive(Debug, Args, Clone)]
pub struct PurgeAllArgs {
    #[command(flatten)]
    pub overrides: PurgeOverrides,
}

#[derive(Debug, Args, Clone)]
pub struct PurgeUrlArgs {
    #[command(flatten)]
    pub overrides: PurgeOverrides,

    /// Absolute URL to purge.
    #[arg(value_name = "URL", value_hint = ValueHint::Url)]
    pub url: String,
}

#[derive(Debug, Args, Clone)]
pub struct PurgeDocumentsArgs {
    #[command(flatten)]
    pub overrides: PurgeOverrides,

    /// Change event recorded for every document.
    #[arg(long = "event", value_name = "KIND", default_value = "edited")]
    pub event: ChangeEventKind,

    /// Document identifiers.
    #[arg(value_name = "ID", required = true, num_args = 1..)]
    pub ids: Vec<u64>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct FlushObjectCacheArgs {
    #[command(flatten)]
    pub overrides: PurgeOverrides,
}

/// Validated settings. Recoverable problems are kept in `warnings` so they
/// can be logged once telemetry is up.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub purge: PurgeSettings,
    pub content: ContentSettings,
    /// Recoverable problems found while loading; logged once telemetry is up.
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
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
pub struct PurgeSettings {
    pub cache_hosts: Vec<String>,
    pub schema: Option<Scheme>,
    pub server_hostname: Option<String>,
    pub mirror_domains: Vec<String>,
    pub max_urls_before_all: usize,
    pub home_url: Option<String>,
    pub rest_route: String,
    pub valid_statuses: Vec<String>,
    pub invalid_types: Vec<String>,
    pub no_archive_types: Vec<String>,
    pub author_archive_types: Vec<String>,
    pub request_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    pub concurrency: usize,
    pub events: EventScopeTable,
}

#[derive(Debug, Clone, Default)]
pub struct ContentSettings {
    pub snapshot: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Merges every configuration source for `cli` and validates the result.
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Purge(args)) => raw.apply_purge_overrides(args.command.overrides()),
        Some(Command::FlushObjectCache(args)) => raw.apply_purge_overrides(&args.overrides),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    if raw.purge.server_hostname.is_none() {
        raw.purge.server_hostname = std::env::var(HOSTNAME_ENV).ok();
    }

    Settings::from_raw(raw)
}

/// Parses process arguments and loads settings for them.
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
    purge: RawPurgeSettings,
    content: RawContentSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }

        self.apply_purge_overrides(&overrides.purge);
    }

    fn apply_purge_overrides(&mut self, overrides: &PurgeOverrides) {
        if let Some(hosts) = overrides.cache_hosts.as_ref() {
            self.purge.cache_hosts = Some(StringOrList::One(hosts.clone()));
        }
        if let Some(schema) = overrides.schema.as_ref() {
            self.purge.schema = Some(schema.clone());
        }
        if let Some(domains) = overrides.mirror_domains.as_ref() {
            self.purge.mirror_domains = Some(StringOrList::One(domains.clone()));
        }
        if let Some(max) = overrides.max_urls_before_all {
            self.purge.max_urls_before_all =
                Some(RawThreshold::Number(i64::try_from(max).unwrap_or(i64::MAX)));
        }
        if let Some(home) = overrides.home_url.as_ref() {
            self.purge.home_url = Some(home.clone());
        }
        if let Some(path) = overrides.content_snapshot.as_ref() {
            self.content.snapshot = Some(path.clone());
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            purge,
            content,
        } = raw;

        let mut warnings = Vec::new();
        let server = build_server_settings(server)?;
        let logging = build_logging_settings(logging)?;
        let purge = build_purge_settings(purge, &mut warnings)?;
        let content = build_content_settings(content);

        Ok(Self {
            server,
            logging,
            purge,
            content,
            warnings,
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

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
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

fn build_purge_settings(
    purge: RawPurgeSettings,
    warnings: &mut Vec<String>,
) -> Result<PurgeSettings, LoadError> {
    let schema = match purge.schema.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(value) => Some(
            Scheme::from_str(value).map_err(|reason| LoadError::invalid("purge.schema", reason))?,
        ),
    };

    let max_urls_before_all = match purge.max_urls_before_all {
        None => DEFAULT_MAX_URLS_BEFORE_ALL,
        Some(raw) => raw.resolve().unwrap_or_else(|reason| {
            warnings.push(format!(
                "purge.max_urls_before_all {reason}; using default {DEFAULT_MAX_URLS_BEFORE_ALL}"
            ));
            DEFAULT_MAX_URLS_BEFORE_ALL
        }),
    };

    let rest_route = purge
        .rest_route
        .map(|route| route.trim().trim_matches('/').to_string())
        .filter(|route| !route.is_empty())
        .unwrap_or_else(|| DEFAULT_REST_ROUTE.to_string());

    let request_timeout_ms = purge
        .request_timeout_ms
        .unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS);
    if request_timeout_ms == 0 {
        return Err(LoadError::invalid(
            "purge.request_timeout_ms",
            "must be greater than zero",
        ));
    }
    let connect_timeout_ms = purge
        .connect_timeout_ms
        .unwrap_or(DEFAULT_CONNECT_TIMEOUT_MS);
    if connect_timeout_ms == 0 {
        return Err(LoadError::invalid(
            "purge.connect_timeout_ms",
            "must be greater than zero",
        ));
    }
    let concurrency = purge.concurrency.unwrap_or(DEFAULT_CONCURRENCY);
    if concurrency == 0 {
        return Err(LoadError::invalid(
            "purge.concurrency",
            "must be greater than zero",
        ));
    }

    let home_url = purge.home_url.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });
    let server_hostname = purge.server_hostname.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    Ok(PurgeSettings {
        cache_hosts: list_or_default(purge.cache_hosts, &[]),
        schema,
        server_hostname,
        mirror_domains: list_or_default(purge.mirror_domains, &[]),
        max_urls_before_all,
        home_url,
        rest_route,
        valid_statuses: list_or_default(purge.valid_statuses, &DEFAULT_VALID_STATUSES),
        invalid_types: list_or_default(purge.invalid_types, &DEFAULT_INVALID_TYPES),
        no_archive_types: list_or_default(purge.no_archive_types, &DEFAULT_NO_ARCHIVE_TYPES),
        author_archive_types: list_or_default(
            purge.author_archive_types,
            &DEFAULT_AUTHOR_ARCHIVE_TYPES,
        ),
        request_timeout_ms,
        connect_timeout_ms,
        concurrency,
        events: build_event_scopes(purge.events)?,
    })
}

fn build_event_scopes(raw: HashMap<String, String>) -> Result<EventScopeTable, LoadError> {
    let mut table = EventScopeTable::default();
    for (kind, scope) in raw {
        let kind = ChangeEventKind::from_str(&kind)
            .map_err(|reason| LoadError::invalid("purge.events", reason))?;
        let scope = match scope.trim().to_ascii_lowercase().as_str() {
            "document" => EventScope::Document,
            "full" => EventScope::FullPurge,
            other => {
                return Err(LoadError::invalid(
                    "purge.events",
                    format!("unknown scope `{other}` for `{kind}`; expected document or full"),
                ));
            }
        };
        table = table.with_override(kind, scope);
    }
    Ok(table)
}

fn build_content_settings(content: RawContentSettings) -> ContentSettings {
    ContentSettings {
        snapshot: content
            .snapshot
            .filter(|path| !path.as_os_str().is_empty()),
    }
}

fn list_or_default(value: Option<StringOrList>, default: &[&str]) -> Vec<String> {
    match value {
        Some(list) => list.into_vec(),
        None => default.iter().map(|entry| (*entry).to_string()).collect(),
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawPurgeSettings {
    cache_hosts: Option<StringOrList>,
    schema: Option<String>,
    server_hostname: Option<String>,
    mirror_domains: Option<StringOrList>,
    max_urls_before_all: Option<RawThreshold>,
    home_url: Option<String>,
    rest_route: Option<String>,
    valid_statuses: Option<StringOrList>,
    invalid_types: Option<StringOrList>,
    no_archive_types: Option<StringOrList>,
    author_archive_types: Option<StringOrList>,
    request_timeout_ms: Option<u64>,
    connect_timeout_ms: Option<u64>,
    concurrency: Option<usize>,
    events: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawContentSettings {
    snapshot: Option<PathBuf>,
}

/// Lists may be written as a TOML array or a comma-separated string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum StringOrList {
    One(String),
    Many(Vec<String>),
}

impl StringOrList {
    fn into_vec(self) -> Vec<String> {
        match self {
            StringOrList::One(raw) => split_list(&raw),
            StringOrList::Many(items) => items
                .iter()
                .flat_map(|item| split_list(item))
                .collect(),
        }
    }
}

/// Environment variables always arrive as strings, so the threshold accepts
/// both forms and is validated afterwards.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawThreshold {
    Number(i64),
    Text(String),
}

impl RawThreshold {
    fn resolve(self) -> Result<usize, String> {
        match self {
            RawThreshold::Number(value) => {
                usize::try_from(value).map_err(|_| format!("must not be negative (got {value})"))
            }
            RawThreshold::Text(text) => text
                .trim()
                .parse::<usize>()
                .map_err(|_| format!("is not a non-negative integer (got `{text}`)")),
        }
    }
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}
