//! Prelude module for convenient imports.
//!
//! ```rust,no_run
//! use snmp_gateway::prelude::*;
//! ```
//!
//! This imports:
//! - The facade: [`SnmpGateway`], [`GatewayConfig`]
//! - Attribute plumbing: [`AttributeAccessor`], [`AttributeDescriptor`]
//! - Core types: [`Oid`], [`Value`], [`VarBind`], [`Version`]
//! - Error handling: [`Error`], [`Result`]
//! - V3 protocols: [`AuthProtocol`], [`PrivProtocol`]
//! - The [`oid!`] macro

pub use crate::attribute::{AttributeAccessor, AttributeDescriptor};
pub use crate::config::GatewayConfig;
pub use crate::error::{Error, Result};
pub use crate::gateway::SnmpGateway;
pub use crate::oid::Oid;
pub use crate::v3::{AuthProtocol, PrivProtocol};
pub use crate::value::Value;
pub use crate::varbind::VarBind;
pub use crate::version::Version;

#[doc(no_inline)]
pub use crate::oid;
