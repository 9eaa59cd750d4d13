//! Common test fixtures and constants.

use std::sync::Arc;
use std::time::Duration;

use snmp_gateway::attribute::{
    AttributeDescriptor, AttributeType, AttributeValue, ColumnDescriptor, MemoryAttribute,
    OPTION_USE_ROW_STATUS, TableValue,
};
use snmp_gateway::config::GatewayConfigBuilder;
use snmp_gateway::{GatewayConfig, Oid, oid};

// =============================================================================
// Context and attribute OIDs
// =============================================================================

/// Enterprise subtree every test gateway serves.
pub fn context() -> Oid {
    oid!(1, 3, 6, 1, 4, 1, 99)
}

/// `enabled` (Bool), first auto-generated OID.
pub fn enabled_oid() -> Oid {
    oid!(1, 3, 6, 1, 4, 1, 99, 1)
}

/// `name` (String).
pub fn name_oid() -> Oid {
    oid!(1, 3, 6, 1, 4, 1, 99, 2)
}

/// `requests` (Long, served as Counter64).
pub fn requests_oid() -> Oid {
    oid!(1, 3, 6, 1, 4, 1, 99, 3)
}

/// `users` table root.
pub fn users_oid() -> Oid {
    oid!(1, 3, 6, 1, 4, 1, 99, 4)
}

/// Nonexistent OID inside the context.
pub fn nonexistent_oid() -> Oid {
    oid!(1, 3, 6, 1, 4, 1, 99, 42, 0)
}

// =============================================================================
// Credentials
// =============================================================================

pub const COMMUNITY_RO: &str = "public";
pub const COMMUNITY_RW: &str = "private";

pub const OPS_USER: &str = "alice";
pub const AUTH_PASSWORD: &str = "authpass123";
pub const PRIV_PASSWORD: &str = "privpass123";

/// Builder for a loopback gateway with short timers.
pub fn config() -> GatewayConfigBuilder {
    GatewayConfig::builder(context())
        .bind("127.0.0.1:0".parse().unwrap())
        .write_community(COMMUNITY_RW)
        .socket_timeout(Duration::from_millis(200))
        .restart_timeout(Duration::from_millis(50))
        .cold_start(false)
}

/// Security keys for one authPriv group holding read and write rights.
pub fn v3_params(builder: GatewayConfigBuilder) -> GatewayConfigBuilder {
    builder
        .param("snmpv3-groups", "ops")
        .param("ops-security-level", "authPriv")
        .param("ops-access-rights", "read, write")
        .param("ops-users", OPS_USER)
        .param("alice-auth-protocol", "SHA")
        .param("alice-password", AUTH_PASSWORD)
        .param("alice-privacy-protocol", "AES")
        .param("alice-privacy-key", PRIV_PASSWORD)
}

// =============================================================================
// Attributes
// =============================================================================

/// The attributes the fixture gateway serves, in registration order.
pub struct Attributes {
    pub enabled: Arc<MemoryAttribute>,
    pub name: Arc<MemoryAttribute>,
    pub requests: Arc<MemoryAttribute>,
    pub users: Arc<MemoryAttribute>,
}

impl Attributes {
    pub fn new() -> Self {
        Self {
            enabled: MemoryAttribute::new(
                AttributeDescriptor::new("enabled", AttributeType::Bool),
                AttributeValue::Bool(true),
            ),
            name: MemoryAttribute::new(
                AttributeDescriptor::new("name", AttributeType::String),
                AttributeValue::String("gateway".into()),
            ),
            requests: MemoryAttribute::new(
                AttributeDescriptor::new("requests", AttributeType::Long).read_only(),
                AttributeValue::Long(1234),
            ),
            users: MemoryAttribute::new(
                AttributeDescriptor::new(
                    "users",
                    AttributeType::Table(vec![
                        ColumnDescriptor::new("login", AttributeType::String),
                        ColumnDescriptor::new("quota", AttributeType::Int),
                    ]),
                )
                .with_option(OPTION_USE_ROW_STATUS, "true"),
                AttributeValue::Table(
                    TableValue::new(vec!["login".into(), "quota".into()])
                        .with_row(vec![AttributeValue::String("ann".into()), AttributeValue::Int(5)])
                        .with_row(vec![AttributeValue::String("bob".into()), AttributeValue::Int(7)]),
                ),
            ),
        }
    }

    pub fn all(&self) -> [Arc<MemoryAttribute>; 4] {
        [
            self.enabled.clone(),
            self.name.clone(),
            self.requests.clone(),
            self.users.clone(),
        ]
    }
}

/// Install a test subscriber once; honours RUST_LOG.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
