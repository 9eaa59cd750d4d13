//! Gateway configuration parsed from the hosting runtime's parameter map.
//!
//! | key | default |
//! |-----|---------|
//! | `context` | mandatory |
//! | `engineID` | generated |
//! | `host` / `port` | `127.0.0.1` / `161` |
//! | `socketTimeout` | `5000` ms |
//! | `restartTimeout` | `10000` ms |
//! | `readCommunity` | `public` (empty disables) |
//! | `writeCommunity` | unset |
//! | `oidPrefix` | `context` |
//! | `maxConcurrentRequests` | `32` |
//! | `maxMessageSize` | `65507` |
//! | `coldStart` | `true` |
//!
//! Security keys (`snmpv3-groups`, `ldap-*`) stay in [`GatewayConfig::params`]
//! and are read by [`SecurityConfiguration`](crate::security::SecurityConfiguration)
//! at start.

use std::collections::HashMap;
use std::fmt::Display;
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};
use std::str::FromStr;
use std::time::Duration;

use bytes::Bytes;

use crate::agent::{AgentConfig, DEFAULT_MAX_MESSAGE_SIZE};
use crate::error::ConfigError;
use crate::oid::Oid;
use crate::v3::generate_engine_id;

pub const CONTEXT: &str = "context";
pub const ENGINE_ID: &str = "engineID";
pub const HOST: &str = "host";
pub const PORT: &str = "port";
pub const SOCKET_TIMEOUT: &str = "socketTimeout";
pub const RESTART_TIMEOUT: &str = "restartTimeout";
pub const READ_COMMUNITY: &str = "readCommunity";
pub const WRITE_COMMUNITY: &str = "writeCommunity";
pub const OID_PREFIX: &str = "oidPrefix";
pub const MAX_CONCURRENT_REQUESTS: &str = "maxConcurrentRequests";
pub const MAX_MESSAGE_SIZE: &str = "maxMessageSize";
pub const COLD_START: &str = "coldStart";

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 161;
pub const DEFAULT_SOCKET_TIMEOUT: Duration = Duration::from_millis(5000);
pub const DEFAULT_RESTART_TIMEOUT: Duration = Duration::from_millis(10_000);
pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 32;

/// Smallest msgMaxSize a v3 engine may advertise (RFC 3412).
const MIN_MESSAGE_SIZE: usize = 484;

/// Everything one gateway instance needs to start.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub context: Oid,
    pub engine_id: Bytes,
    pub bind: SocketAddr,
    pub socket_timeout: Duration,
    /// Debounce window for feature changes.
    pub restart_timeout: Duration,
    pub read_community: Option<Bytes>,
    pub write_community: Option<Bytes>,
    /// Root of auto-generated attribute and notification OIDs.
    pub oid_prefix: Oid,
    pub max_concurrent_requests: usize,
    pub max_message_size: usize,
    pub cold_start: bool,
    /// The raw parameter map, for the security keys.
    pub params: HashMap<String, String>,
}

impl GatewayConfig {
    /// Start a builder with every default in place.
    pub fn builder(context: Oid) -> GatewayConfigBuilder {
        GatewayConfigBuilder::new(context)
    }

    /// Parse the flat parameter map.
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let context = match params.get(CONTEXT) {
            Some(raw) => parse_oid(CONTEXT, raw)?,
            None => return Err(ConfigError::Missing(CONTEXT)),
        };
        let mut builder = Self::builder(context).params(params.clone());

        if let Some(raw) = params.get(ENGINE_ID) {
            builder = builder.engine_id(parse_engine_id(raw)?);
        }
        let host = params.get(HOST).map(String::as_str).unwrap_or(DEFAULT_HOST);
        let port = parse::<u16>(params, PORT)?.unwrap_or(DEFAULT_PORT);
        builder = builder.bind(resolve_bind(host, port)?);

        if let Some(ms) = parse::<u64>(params, SOCKET_TIMEOUT)? {
            builder = builder.socket_timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = parse::<u64>(params, RESTART_TIMEOUT)? {
            builder = builder.restart_timeout(Duration::from_millis(ms));
        }
        if let Some(community) = params.get(READ_COMMUNITY) {
            builder = builder.read_community(community.as_str());
        }
        if let Some(community) = params.get(WRITE_COMMUNITY) {
            builder = builder.write_community(community.as_str());
        }
        if let Some(raw) = params.get(OID_PREFIX) {
            builder = builder.oid_prefix(parse_oid(OID_PREFIX, raw)?);
        }
        if let Some(n) = parse::<usize>(params, MAX_CONCURRENT_REQUESTS)? {
            if n == 0 {
                return Err(ConfigError::invalid(MAX_CONCURRENT_REQUESTS, "0", "must be positive"));
            }
            builder = builder.max_concurrent_requests(n);
        }
        if let Some(size) = parse::<usize>(params, MAX_MESSAGE_SIZE)? {
            if !(MIN_MESSAGE_SIZE..=DEFAULT_MAX_MESSAGE_SIZE).contains(&size) {
                return Err(ConfigError::invalid(
                    MAX_MESSAGE_SIZE,
                    size.to_string(),
                    format!("must be within {}..={}", MIN_MESSAGE_SIZE, DEFAULT_MAX_MESSAGE_SIZE),
                ));
            }
            builder = builder.max_message_size(size);
        }
        if let Some(enabled) = parse::<bool>(params, COLD_START)? {
            builder = builder.cold_start(enabled);
        }
        Ok(builder.build())
    }

    /// Agent settings derived from this configuration.
    pub fn agent_config(&self) -> AgentConfig {
        AgentConfig {
            bind: self.bind,
            context: self.context.clone(),
            engine_id: self.engine_id.clone(),
            socket_timeout: self.socket_timeout,
            max_message_size: self.max_message_size,
            max_concurrent_requests: self.max_concurrent_requests,
            read_community: self.read_community.clone(),
            write_community: self.write_community.clone(),
            cold_start: self.cold_start,
        }
    }
}

/// Fluent construction of a [`GatewayConfig`].
#[derive(Debug, Clone)]
pub struct GatewayConfigBuilder {
    config: GatewayConfig,
}

impl GatewayConfigBuilder {
    fn new(context: Oid) -> Self {
        Self {
            config: GatewayConfig {
                oid_prefix: context.clone(),
                context,
                engine_id: generate_engine_id(),
                bind: SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)),
                socket_timeout: DEFAULT_SOCKET_TIMEOUT,
                restart_timeout: DEFAULT_RESTART_TIMEOUT,
                read_community: Some(Bytes::from_static(b"public")),
                write_community: None,
                max_concurrent_requests: DEFAULT_MAX_CONCURRENT_REQUESTS,
                max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
                cold_start: true,
                params: HashMap::new(),
            },
        }
    }

    pub fn engine_id(mut self, engine_id: impl Into<Bytes>) -> Self {
        self.config.engine_id = engine_id.into();
        self
    }

    pub fn bind(mut self, bind: SocketAddr) -> Self {
        self.config.bind = bind;
        self
    }

    pub fn socket_timeout(mut self, timeout: Duration) -> Self {
        self.config.socket_timeout = timeout;
        self
    }

    pub fn restart_timeout(mut self, timeout: Duration) -> Self {
        self.config.restart_timeout = timeout;
        self
    }

    /// Read community; an empty string disables community reads.
    pub fn read_community(mut self, community: &str) -> Self {
        self.config.read_community = community_bytes(community);
        self
    }

    pub fn write_community(mut self, community: &str) -> Self {
        self.config.write_community = community_bytes(community);
        self
    }

    pub fn oid_prefix(mut self, prefix: Oid) -> Self {
        self.config.oid_prefix = prefix;
        self
    }

    pub fn max_concurrent_requests(mut self, n: usize) -> Self {
        self.config.max_concurrent_requests = n.max(1);
        self
    }

    pub fn max_message_size(mut self, size: usize) -> Self {
        self.config.max_message_size = size;
        self
    }

    pub fn cold_start(mut self, enabled: bool) -> Self {
        self.config.cold_start = enabled;
        self
    }

    /// Raw parameters, including the security keys.
    pub fn params(mut self, params: HashMap<String, String>) -> Self {
        self.config.params = params;
        self
    }

    /// Set one raw parameter.
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.params.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> GatewayConfig {
        self.config
    }
}

/// Parse a properties file into a parameter map.
///
/// One `key=value` (or `key: value`) pair per line; blank lines and lines
/// starting with `#` or `!` are skipped. Later keys override earlier ones.
pub fn parse_properties(text: &str) -> HashMap<String, String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('!'))
        .filter_map(|line| {
            let split = line.find(['=', ':'])?;
            let (key, value) = (&line[..split], &line[split + 1..]);
            Some((key.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

fn community_bytes(community: &str) -> Option<Bytes> {
    (!community.is_empty()).then(|| Bytes::copy_from_slice(community.as_bytes()))
}

fn parse<T>(params: &HashMap<String, String>, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    params
        .get(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|err| ConfigError::invalid(key, raw.as_str(), err))
        })
        .transpose()
}

fn parse_oid(key: &str, raw: &str) -> Result<Oid, ConfigError> {
    Oid::parse(raw.trim()).map_err(|err| ConfigError::invalid(key, raw, err))
}

/// Hex engine id, optionally `0x`-prefixed, 5 to 32 octets.
fn parse_engine_id(raw: &str) -> Result<Bytes, ConfigError> {
    let text = raw.trim();
    let text = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    let bytes = hex::decode(text).map_err(|err| ConfigError::invalid(ENGINE_ID, raw, err))?;
    if !(5..=32).contains(&bytes.len()) {
        return Err(ConfigError::invalid(
            ENGINE_ID,
            raw,
            "engine id must be 5 to 32 octets",
        ));
    }
    Ok(Bytes::from(bytes))
}

fn resolve_bind(host: &str, port: u16) -> Result<SocketAddr, ConfigError> {
    let host = host.trim();
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, port));
    }
    (host, port)
        .to_socket_addrs()
        .map_err(|err| ConfigError::invalid(HOST, host, err))?
        .next()
        .ok_or_else(|| ConfigError::invalid(HOST, host, "no address resolved"))
}
