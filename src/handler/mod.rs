//! Handler interface between the agent and managed objects.
//!
//! - [`MibHandler`]: GET, GETNEXT and the four SET phases
//! - [`RequestContext`]: information about the incoming request
//! - [`GetResult`], [`GetNextResult`], [`SetResult`]: operation results
//! - [`OidTable`]: sorted OID storage for GETNEXT traversal
//!
//! The agent dispatches each varbind to the object registered at the
//! containing OID (GET, SET) or to the first object at or after it (GETNEXT).

mod context;
mod oid_table;
mod results;
mod traits;

pub use context::RequestContext;
pub use oid_table::OidTable;
pub use results::{GetNextResult, GetResult, SetResult};
pub use traits::{BoxFuture, MibHandler};

pub use crate::agent::vacm::SecurityModel;
