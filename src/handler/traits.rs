//! MibHandler trait and related types.

use std::future::Future;
use std::pin::Pin;

use crate::oid::Oid;
use crate::value::Value;

use super::{GetNextResult, GetResult, RequestContext, SetResult};

/// Type alias for boxed async return type (dyn-compatible).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Handler for a registered region of the OID tree.
///
/// Both [`ScalarObject`](crate::object::ScalarObject) and
/// [`TableObject`](crate::object::TableObject) implement this trait; the agent
/// only ever talks to managed objects through it.
///
/// # SET phases
///
/// A SET PDU is processed in up to four phases, always for every varbind of
/// one phase before any varbind of the next:
///
/// 1. [`test_set`](Self::test_set) (prepare) for all varbinds.
/// 2. [`commit_set`](Self::commit_set) for all varbinds, when every prepare
///    succeeded.
/// 3. [`undo_set`](Self::undo_set) (rollback) for every prepared varbind, when
///    any prepare failed.
/// 4. [`cleanup_set`](Self::cleanup_set) for every varbind that reached commit
///    or rollback.
///
/// Every handler touched by the PDU then receives exactly one
/// [`complete_set`](Self::complete_set) call carrying the same
/// [`RequestContext::transaction_id`].
///
/// All methods default to a read-only handler.
///
/// # Example
///
/// ```rust
/// use snmp_gateway::handler::{BoxFuture, GetNextResult, GetResult, MibHandler, RequestContext};
/// use snmp_gateway::{Oid, Value, VarBind, oid};
///
/// struct Uptime;
///
/// impl MibHandler for Uptime {
///     fn get<'a>(&'a self, _ctx: &'a RequestContext, oid: &'a Oid) -> BoxFuture<'a, GetResult> {
///         Box::pin(async move {
///             if oid == &oid!(1, 3, 6, 1, 4, 1, 99999, 1) {
///                 return GetResult::Value(Value::TimeTicks(100));
///             }
///             GetResult::NoSuchObject
///         })
///     }
///
///     fn get_next<'a>(&'a self, _ctx: &'a RequestContext, oid: &'a Oid) -> BoxFuture<'a, GetNextResult> {
///         Box::pin(async move {
///             let mine = oid!(1, 3, 6, 1, 4, 1, 99999, 1);
///             if oid < &mine {
///                 return GetNextResult::Value(VarBind::new(mine, Value::TimeTicks(100)));
///             }
///             GetNextResult::EndOfMibView
///         })
///     }
/// }
/// ```
pub trait MibHandler: Send + Sync + 'static {
    /// Exact lookup.
    fn get<'a>(&'a self, ctx: &'a RequestContext, oid: &'a Oid) -> BoxFuture<'a, GetResult>;

    /// First instance strictly after `oid` within this handler's region.
    fn get_next<'a>(
        &'a self,
        ctx: &'a RequestContext,
        oid: &'a Oid,
    ) -> BoxFuture<'a, GetNextResult>;

    /// Prepare phase: validate and stage the value without applying it.
    fn test_set<'a>(
        &'a self,
        _ctx: &'a RequestContext,
        _oid: &'a Oid,
        _value: &'a Value,
    ) -> BoxFuture<'a, SetResult> {
        Box::pin(async { SetResult::NotWritable })
    }

    /// Commit phase.
    fn commit_set<'a>(
        &'a self,
        _ctx: &'a RequestContext,
        _oid: &'a Oid,
        _value: &'a Value,
    ) -> BoxFuture<'a, SetResult> {
        Box::pin(async { SetResult::NotWritable })
    }

    /// Rollback phase, for a varbind whose prepare succeeded but whose PDU
    /// failed elsewhere.
    fn undo_set<'a>(
        &'a self,
        _ctx: &'a RequestContext,
        _oid: &'a Oid,
        _value: &'a Value,
    ) -> BoxFuture<'a, SetResult> {
        Box::pin(async { SetResult::Ok })
    }

    /// Cleanup phase, after commit or rollback.
    fn cleanup_set<'a>(
        &'a self,
        _ctx: &'a RequestContext,
        _oid: &'a Oid,
        _value: &'a Value,
    ) -> BoxFuture<'a, SetResult> {
        Box::pin(async { SetResult::Ok })
    }

    /// Called once per handler after the SET PDU has been answered.
    fn complete_set<'a>(&'a self, _ctx: &'a RequestContext) -> BoxFuture<'a, ()> {
        Box::pin(async {})
    }

    /// Whether this handler should be consulted for `oid`.
    ///
    /// The default covers GET inside the registered subtree and GETNEXT from
    /// any OID that sorts before it.
    fn handles(&self, registered_prefix: &Oid, oid: &Oid) -> bool {
        oid.starts_with(registered_prefix) || oid < registered_prefix
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oid;

    struct ReadOnly;

    impl MibHandler for ReadOnly {
        fn get<'a>(&'a self, _ctx: &'a RequestContext, _oid: &'a Oid) -> BoxFuture<'a, GetResult> {
            Box::pin(async { GetResult::Value(Value::Integer(1)) })
        }

        fn get_next<'a>(
            &'a self,
            _ctx: &'a RequestContext,
            _oid: &'a Oid,
        ) -> BoxFuture<'a, GetNextResult> {
            Box::pin(async { GetNextResult::EndOfMibView })
        }
    }

    #[tokio::test]
    async fn test_defaults_are_read_only() {
        let ctx = RequestContext::test_context();
        let oid = oid!(1, 3, 6, 1);
        let value = Value::Integer(1);
        let handler = ReadOnly;
        assert_eq!(handler.test_set(&ctx, &oid, &value).await, SetResult::NotWritable);
        assert_eq!(handler.commit_set(&ctx, &oid, &value).await, SetResult::NotWritable);
        assert_eq!(handler.undo_set(&ctx, &oid, &value).await, SetResult::Ok);
        assert_eq!(handler.cleanup_set(&ctx, &oid, &value).await, SetResult::Ok);
        handler.complete_set(&ctx).await;
    }

    #[test]
    fn test_default_handles() {
        let prefix = oid!(1, 3, 6, 1, 4, 1, 99, 2);
        let handler = ReadOnly;
        assert!(handler.handles(&prefix, &oid!(1, 3, 6, 1, 4, 1, 99, 2, 1, 1)));
        assert!(handler.handles(&prefix, &oid!(1, 3, 6, 1, 4, 1, 99, 1)));
        assert!(!handler.handles(&prefix, &oid!(1, 3, 6, 1, 4, 1, 99, 3)));
    }
}
