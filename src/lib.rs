//! # snmp-gateway
//!
//! Async SNMP gateway that exposes a host's managed attributes to SNMP
//! managers and forwards its notifications as SNMPv2 traps.
//!
//! The gateway serves GET, GETNEXT, GETBULK and SET over UDP for SNMPv1,
//! SNMPv2c and SNMPv3 (USM with MD5/SHA authentication and DES/AES privacy,
//! VACM views per group). Attributes are typed; each type maps to one SNMP
//! wire category, and table-valued attributes are served as conceptual
//! tables with optional RowStatus row management.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use snmp_gateway::prelude::*;
//! use snmp_gateway::attribute::{AttributeType, AttributeValue, MemoryAttribute};
//! use snmp_gateway::notification::{NotificationDescriptor, NotificationEvent};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = GatewayConfig::builder(oid!(1, 3, 6, 1, 4, 1, 99))
//!         .read_community("public")
//!         .build();
//!     let gateway = SnmpGateway::new(config);
//!
//!     gateway.add_attribute(MemoryAttribute::new(
//!         AttributeDescriptor::new("uptime", AttributeType::Long),
//!         AttributeValue::Long(0),
//!     ))?;
//!     let alarms = gateway.add_notification(
//!         &NotificationDescriptor::new("alarms")
//!             .with_option("receiverAddress", "192.0.2.10/162"),
//!     )?;
//!
//!     gateway.start().await?;
//!     alarms.send(&NotificationEvent::new("alarms", "disk almost full")).await;
//!     gateway.stop().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! [`GatewayConfig::from_params`] reads the same flat `key=value` map the
//! `snmp-gatewayd` daemon loads from its properties file. Security groups
//! and users come from the same map, or from a directory through
//! [`security::DirectoryConnector`].
//!
//! ## Tracing
//!
//! The crate logs through [`tracing`]. Request handling uses the `snmp.*`
//! and `gateway.*` field prefixes:
//!
//! ```bash
//! RUST_LOG=snmp_gateway=debug cargo run --features cli --bin snmp-gatewayd -- gateway.properties
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod agent;
pub mod attribute;
pub mod ber;
pub mod codec;
pub mod config;
pub mod error;
pub mod gateway;
pub mod handler;
pub mod message;
pub mod notification;
pub mod object;
pub mod oid;
pub mod pdu;
pub mod prelude;
pub mod security;
pub mod update;
pub mod v3;
pub mod value;
pub mod varbind;
pub mod version;

pub(crate) mod util;

pub use config::GatewayConfig;
pub use error::{Error, Result};
pub use gateway::SnmpGateway;
pub use oid::Oid;
pub use value::Value;
pub use varbind::VarBind;
pub use version::Version;
