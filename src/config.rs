//! Connection settings read from `REDIS_*_<KEY>` environment variables.
//!
//! A logical key such as `reader` selects one group of variables:
//!
//! ```
//! use std::collections::HashMap;
//! use alauda_redis_client::{RedisConfig, RedisMode};
//!
//! let env = HashMap::from([
//!     ("REDIS_TYPE_READER".to_string(), "cluster".to_string()),
//!     ("REDIS_STARTUP_NODES_READER".to_string(), "10.0.0.1:7000, 10.0.0.2".to_string()),
//!     ("REDIS_READONLY_MODE_READER".to_string(), "true".to_string()),
//! ]);
//!
//! let config = RedisConfig::from_env("reader", &env).unwrap();
//! assert_eq!(config.mode, RedisMode::Cluster);
//! assert_eq!(config.startup_nodes[1].to_string(), "10.0.0.2:6379");
//! assert!(config.readonly);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::{Error, Result};

/// Port used when none is given.
pub const DEFAULT_PORT: u16 = 6379;
/// Host used in normal mode when `REDIS_HOST_<KEY>` is unset.
pub const DEFAULT_HOST: &str = "localhost";

/// Where variables are looked up.
pub trait EnvSource: Send + Sync {
    /// Returns the value of `name`, `None` if unset.
    fn var(&self, name: &str) -> Option<String>;
}

/// The process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

/// Deployment type selected by `REDIS_TYPE_<KEY>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RedisMode {
    /// A single server.
    #[default]
    Normal,
    /// A Redis Cluster.
    Cluster,
}

impl FromStr for RedisMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" => Ok(Self::Normal),
            "cluster" => Ok(Self::Cluster),
            _ => Err("expected \"normal\" or \"cluster\"".to_string()),
        }
    }
}

impl fmt::Display for RedisMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Normal => "normal",
            Self::Cluster => "cluster",
        })
    }
}

/// A `host:port` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeAddr {
    /// Host name or IP address.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl NodeAddr {
    /// Creates an address.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl FromStr for NodeAddr {
    type Err = String;

    /// Parses `host:port`, or a bare `host` with the default port.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        let (host, port) = match s.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .trim()
                    .parse::<u16>()
                    .map_err(|_| format!("invalid port in {s:?}"))?;
                (host.trim(), port)
            }
            None => (s, DEFAULT_PORT),
        };
        if host.is_empty() {
            return Err(format!("missing host in {s:?}"));
        }
        Ok(Self::new(host, port))
    }
}

impl fmt::Display for NodeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Settings for one logical key.
#[derive(Clone, PartialEq)]
pub struct RedisConfig {
    /// Normalized key (trimmed, upper case).
    pub key: String,
    /// Normal or cluster.
    pub mode: RedisMode,
    /// Normal mode host.
    pub host: String,
    /// Normal mode port.
    pub port: u16,
    /// Normal mode database index; ignored by clusters.
    pub db: u8,
    /// Password sent with `AUTH`.
    pub password: Option<String>,
    /// Cluster seed nodes.
    pub startup_nodes: Vec<NodeAddr>,
    /// Serve cluster reads from replicas.
    pub readonly: bool,
    /// Connect and response timeout.
    pub timeout: Option<Duration>,
}

// Keeps the password out of logs.
impl fmt::Debug for RedisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisConfig")
            .field("key", &self.key)
            .field("mode", &self.mode)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("db", &self.db)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("startup_nodes", &self.startup_nodes)
            .field("readonly", &self.readonly)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl RedisConfig {
    /// A normal-mode config for `host:port`, database 0.
    pub fn normal(host: impl Into<String>, port: u16) -> Self {
        Self {
            key: String::new(),
            mode: RedisMode::Normal,
            host: host.into(),
            port,
            db: 0,
            password: None,
            startup_nodes: Vec::new(),
            readonly: false,
            timeout: None,
        }
    }

    /// A cluster-mode config seeded with `startup_nodes`.
    pub fn cluster(startup_nodes: Vec<NodeAddr>) -> Self {
        Self {
            mode: RedisMode::Cluster,
            startup_nodes,
            ..Self::normal(DEFAULT_HOST, DEFAULT_PORT)
        }
    }

    /// Reads the variables for `key` from `env`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if `key` is blank.
    /// - [`Error::InvalidVar`] if a value cannot be parsed.
    /// - [`Error::MissingVar`] if cluster mode has no startup nodes.
    pub fn from_env<E: EnvSource + ?Sized>(key: &str, env: &E) -> Result<Self> {
        let key = normalize_key(key)?;
        let lookup = |prefix: &str| {
            let name = var_name(prefix, &key);
            let value = env.var(&name).filter(|v| !v.trim().is_empty());
            (name, value)
        };

        let mode = parse_var(lookup("REDIS_TYPE"), str::parse::<RedisMode>)?.unwrap_or_default();
        let host = lookup("REDIS_HOST")
            .1
            .map(|h| h.trim().to_string())
            .unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = parse_var(lookup("REDIS_PORT"), |v| {
            v.trim().parse::<u16>().map_err(|e| e.to_string())
        })?
        .unwrap_or(DEFAULT_PORT);
        let db = parse_var(lookup("REDIS_DB_NAME"), |v| {
            v.trim().parse::<u8>().map_err(|e| e.to_string())
        })?
        .unwrap_or(0);
        let password = lookup("REDIS_PASSWORD").1;
        let readonly = parse_var(lookup("REDIS_READONLY_MODE"), parse_bool)?.unwrap_or(false);
        let timeout = parse_var(lookup("REDIS_TIMEOUT"), parse_timeout)?;

        let (nodes_name, nodes_value) = lookup("REDIS_STARTUP_NODES");
        let startup_nodes = match mode {
            RedisMode::Cluster => {
                let value = nodes_value.ok_or_else(|| Error::MissingVar {
                    name: nodes_name.clone(),
                })?;
                let nodes = parse_var((nodes_name.clone(), Some(value)), parse_startup_nodes)?
                    .unwrap_or_default();
                if nodes.is_empty() {
                    return Err(Error::MissingVar { name: nodes_name });
                }
                nodes
            }
            RedisMode::Normal => Vec::new(),
        };

        Ok(Self {
            key,
            mode,
            host,
            port,
            db,
            password,
            startup_nodes,
            readonly,
            timeout,
        })
    }

    /// `redis://host:port/db` for normal mode.
    pub fn address(&self) -> String {
        format!("redis://{}:{}/{}", self.host, self.port, self.db)
    }
}

/// `<prefix>_<KEY>`, e.g. `var_name("REDIS_HOST", "reader")` is
/// `REDIS_HOST_READER`.
pub fn var_name(prefix: &str, key: &str) -> String {
    format!("{}_{}", prefix, key.trim().to_ascii_uppercase())
}

pub(crate) fn normalize_key(key: &str) -> Result<String> {
    let key = key.trim();
    if key.is_empty() {
        return Err(Error::InvalidArgument {
            message: "redis key must not be empty".to_string(),
        });
    }
    Ok(key.to_ascii_uppercase())
}

fn parse_var<T, F>((name, value): (String, Option<String>), parse: F) -> Result<Option<T>>
where
    F: FnOnce(&str) -> std::result::Result<T, String>,
{
    match value {
        None => Ok(None),
        Some(value) => match parse(&value) {
            Ok(parsed) => Ok(Some(parsed)),
            Err(reason) => Err(Error::InvalidVar {
                name,
                value,
                reason,
            }),
        },
    }
}

fn parse_bool(value: &str) -> std::result::Result<bool, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err("expected a boolean".to_string()),
    }
}

fn parse_timeout(value: &str) -> std::result::Result<Duration, String> {
    let secs = value
        .trim()
        .parse::<f64>()
        .map_err(|e| e.to_string())?;
    if !secs.is_finite() || secs <= 0.0 {
        return Err("expected a positive number of seconds".to_string());
    }
    Duration::try_from_secs_f64(secs).map_err(|e| e.to_string())
}

fn parse_startup_nodes(value: &str) -> std::result::Result<Vec<NodeAddr>, String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|node| !node.is_empty())
        .map(str::parse::<NodeAddr>)
        .collect()
}
