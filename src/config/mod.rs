//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

pub use cli::{
    CliArgs, Command, DatabaseOverride, InvalidateArgs, MigrateArgs, ServeArgs, ServeOverrides,
};

use std::{
    collections::BTreeMap,
    net::SocketAddr,
    num::{NonZeroU32, NonZeroU64, NonZeroUsize},
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::cache::CacheConfig;
use crate::domain::types::Resource;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "folio";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_ADMIN_HOST: &str = "127.0.0.1";
const DEFAULT_PUBLIC_PORT: u16 = 8000;
const DEFAULT_ADMIN_PORT: u16 = 8001;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
/// Upper bound for any cache TTL: one year.
const MAX_TTL_SECS: u64 = 365 * 24 * 60 * 60;

/// Response TTLs applied when the configuration names none for a resource.
const DEFAULT_RESOURCE_TTL_SECS: &[(Resource, u64)] = &[
    (Resource::Skills, 1800),
    (Resource::Links, 1800),
    (Resource::Settings, 3600),
];

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub cache: CacheSettings,
    pub site: SiteSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub public_addr: SocketAddr,
    pub admin_addr: SocketAddr,
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
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enabled: bool,
    pub enable_response_cache: bool,
    pub redis_url: Option<String>,
    pub redis_pool_size: NonZeroUsize,
    pub key_prefix: String,
    pub query_ttl: Duration,
    pub response_ttl: Duration,
    pub resource_ttl_secs: BTreeMap<Resource, u64>,
    pub max_page_size: NonZeroU64,
    pub max_unpaginated_rows: NonZeroU64,
    pub memory_capacity: NonZeroUsize,
    pub response_body_limit_bytes: NonZeroUsize,
}

/// Site-wide values served by the all-configs endpoint.
#[derive(Debug, Clone, Default)]
pub struct SiteSettings {
    pub base_links: BTreeMap<String, String>,
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

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("FOLIO").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Migrate(args)) => raw.apply_database_override(&args.database),
        Some(Command::Invalidate(args)) => {
            if let Some(url) = args.redis_url.as_ref() {
                raw.cache.redis_url = Some(url.clone());
            }
        }
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    cache: RawCacheSettings,
    site: RawSiteSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(host) = overrides.server_admin_host.as_ref() {
            self.server.admin_host = Some(host.clone());
        }
        if let Some(port) = overrides.public_port {
            self.server.public_port = Some(port);
        }
        if let Some(port) = overrides.admin_port {
            self.server.admin_port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
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
        if let Some(enabled) = overrides.cache_enabled {
            self.cache.enabled = Some(enabled);
        }
        if let Some(enabled) = overrides.cache_response_enabled {
            self.cache.enable_response_cache = Some(enabled);
        }
        if let Some(url) = overrides.cache_redis_url.as_ref() {
            self.cache.redis_url = Some(url.clone());
        }
        if let Some(ttl) = overrides.cache_query_ttl_seconds {
            self.cache.query_ttl_secs = Some(ttl);
        }
        if let Some(ttl) = overrides.cache_response_ttl_seconds {
            self.cache.response_ttl_secs = Some(ttl);
        }
        if let Some(size) = overrides.cache_max_page_size {
            self.cache.max_page_size = Some(size);
        }
        if let Some(rows) = overrides.cache_max_unpaginated_rows {
            self.cache.max_unpaginated_rows = Some(rows);
        }
    }

    fn apply_database_override(&mut self, overrides: &DatabaseOverride) {
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            database,
            cache,
            site,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            cache: build_cache_settings(cache)?,
            site: SiteSettings {
                base_links: site.base_links,
            },
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let admin_host = server
        .admin_host
        .unwrap_or_else(|| DEFAULT_ADMIN_HOST.to_string());

    let public_port = server.public_port.unwrap_or(DEFAULT_PUBLIC_PORT);
    if public_port == 0 {
        return Err(LoadError::invalid(
            "server.public_port",
            "port must be greater than zero",
        ));
    }

    let admin_port = server.admin_port.unwrap_or(DEFAULT_ADMIN_PORT);
    if admin_port == 0 {
        return Err(LoadError::invalid(
            "server.admin_port",
            "port must be greater than zero",
        ));
    }

    let public_addr = parse_socket_addr(&host, public_port)
        .map_err(|reason| LoadError::invalid("server.public_addr", reason))?;
    let admin_addr = parse_socket_addr(&admin_host, admin_port)
        .map_err(|reason| LoadError::invalid("server.admin_addr", reason))?;
    if public_addr == admin_addr {
        return Err(LoadError::invalid(
            "server.admin_port",
            "admin listener must not share the public address",
        ));
    }

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
        public_addr,
        admin_addr,
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

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let max = database
        .max_connections
        .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS);

    Ok(DatabaseSettings {
        url: non_blank(database.url),
        max_connections: non_zero_u32(max.into(), "database.max_connections")?,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let defaults = CacheConfig::default();

    let key_prefix = cache
        .key_prefix
        .map(|prefix| prefix.trim().to_string())
        .unwrap_or(defaults.key_prefix);
    if key_prefix.is_empty() || key_prefix.contains(char::is_whitespace) {
        return Err(LoadError::invalid(
            "cache.key_prefix",
            "must be non-empty and contain no whitespace",
        ));
    }

    let query_ttl = positive_secs(
        cache.query_ttl_secs.unwrap_or(defaults.query_ttl_secs),
        "cache.query_ttl_secs",
    )?;
    let response_ttl = positive_secs(
        cache.response_ttl_secs.unwrap_or(defaults.response_ttl_secs),
        "cache.response_ttl_secs",
    )?;

    let mut resource_ttl_secs: BTreeMap<Resource, u64> =
        DEFAULT_RESOURCE_TTL_SECS.iter().copied().collect();
    for (name, secs) in cache.resource_ttl_secs {
        let resource = Resource::from_str(&name).map_err(|_| {
            LoadError::invalid(
                "cache.resource_ttl_secs",
                format!("unknown resource `{name}`"),
            )
        })?;
        if secs == 0 || secs > MAX_TTL_SECS {
            return Err(LoadError::invalid(
                "cache.resource_ttl_secs",
                format!("TTL of `{name}` must be between 1 and {MAX_TTL_SECS} seconds"),
            ));
        }
        resource_ttl_secs.insert(resource, secs);
    }

    Ok(CacheSettings {
        enabled: cache.enabled.unwrap_or(defaults.enabled),
        enable_response_cache: cache
            .enable_response_cache
            .unwrap_or(defaults.enable_response_cache),
        redis_url: non_blank(cache.redis_url),
        redis_pool_size: non_zero_usize(
            cache.redis_pool_size.unwrap_or(defaults.redis_pool_size as u64),
            "cache.redis_pool_size",
        )?,
        key_prefix,
        query_ttl,
        response_ttl,
        resource_ttl_secs,
        max_page_size: NonZeroU64::new(cache.max_page_size.unwrap_or(defaults.max_page_size))
            .ok_or_else(|| LoadError::invalid("cache.max_page_size", "must be greater than zero"))?,
        max_unpaginated_rows: NonZeroU64::new(
            cache
                .max_unpaginated_rows
                .unwrap_or(defaults.max_unpaginated_rows),
        )
        .ok_or_else(|| {
            LoadError::invalid("cache.max_unpaginated_rows", "must be greater than zero")
        })?,
        memory_capacity: non_zero_usize(
            cache.memory_capacity.unwrap_or(defaults.memory_capacity as u64),
            "cache.memory_capacity",
        )?,
        response_body_limit_bytes: non_zero_usize(
            cache
                .response_body_limit_bytes
                .unwrap_or(defaults.response_body_limit_bytes as u64),
            "cache.response_body_limit_bytes",
        )?,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    admin_host: Option<String>,
    public_port: Option<u16>,
    admin_port: Option<u16>,
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
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    enabled: Option<bool>,
    enable_response_cache: Option<bool>,
    redis_url: Option<String>,
    redis_pool_size: Option<u64>,
    key_prefix: Option<String>,
    query_ttl_secs: Option<u64>,
    response_ttl_secs: Option<u64>,
    resource_ttl_secs: BTreeMap<String, u64>,
    max_page_size: Option<u64>,
    max_unpaginated_rows: Option<u64>,
    memory_capacity: Option<u64>,
    response_body_limit_bytes: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSiteSettings {
    base_links: BTreeMap<String, String>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn positive_secs(value: u64, key: &'static str) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    if value > MAX_TTL_SECS {
        return Err(LoadError::invalid(
            key,
            format!("must be at most {MAX_TTL_SECS} seconds"),
        ));
    }
    Ok(Duration::from_secs(value))
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

fn non_zero_usize(value: u64, key: &'static str) -> Result<NonZeroUsize, LoadError> {
    let value: usize = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for usize"))?;
    NonZeroUsize::new(value).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[cfg(test)]
mod tests;
