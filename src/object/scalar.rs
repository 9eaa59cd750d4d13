//! Scalar objects: one attribute answering at exactly one OID.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::attribute::{AttributeAccessor, AttributeValue};
use crate::codec::ValueCodec;
use crate::handler::{BoxFuture, GetNextResult, GetResult, MibHandler, RequestContext, SetResult};
use crate::oid::Oid;
use crate::value::Value;
use crate::varbind::VarBind;

/// One attribute bound to one OID.
///
/// Reads never fail the protocol exchange: accessor or conversion errors are
/// logged and the codec's default value is returned instead. Writes are
/// converted during prepare and forwarded to the accessor on commit.
pub struct ScalarObject {
    oid: Oid,
    accessor: Arc<dyn AttributeAccessor>,
    codec: ValueCodec,
    staged: Mutex<HashMap<u64, AttributeValue>>,
}

impl ScalarObject {
    pub fn new(oid: Oid, accessor: Arc<dyn AttributeAccessor>) -> Self {
        let descriptor = accessor.descriptor();
        let codec = ValueCodec::for_type(&descriptor.attr_type, descriptor.display_format());
        Self {
            oid,
            accessor,
            codec,
            staged: Mutex::new(HashMap::new()),
        }
    }

    pub fn oid(&self) -> &Oid {
        &self.oid
    }

    pub fn name(&self) -> &str {
        &self.accessor.descriptor().name
    }

    pub fn codec(&self) -> &ValueCodec {
        &self.codec
    }

    /// Current wire value.
    pub async fn read(&self) -> Value {
        match self.accessor.get_value().await {
            Ok(value) => self.codec.to_wire(&value).unwrap_or_else(|err| {
                tracing::warn!(
                    gateway.oid = %self.oid,
                    error = %err,
                    "cannot convert attribute value"
                );
                self.codec.default_value()
            }),
            Err(err) => {
                tracing::warn!(
                    gateway.oid = %self.oid,
                    attribute = %self.name(),
                    error = %err,
                    "attribute read failed"
                );
                self.codec.default_value()
            }
        }
    }

    /// Convert and write in one step, outside any SET transaction.
    pub async fn write(&self, value: &Value) -> SetResult {
        match self.convert(value) {
            Ok(native) => self.apply(native).await,
            Err(result) => result,
        }
    }

    fn convert(&self, value: &Value) -> Result<AttributeValue, SetResult> {
        if !self.accessor.descriptor().writable || !self.codec.is_writable() {
            return Err(SetResult::NotWritable);
        }
        self.codec.from_wire(value).map_err(|err| {
            tracing::debug!(
                gateway.oid = %self.oid,
                error = %err,
                "rejected write"
            );
            SetResult::from(&err)
        })
    }

    async fn apply(&self, native: AttributeValue) -> SetResult {
        match self.accessor.set_value(native).await {
            Ok(()) => SetResult::Ok,
            Err(err) => {
                tracing::warn!(
                    gateway.oid = %self.oid,
                    attribute = %self.name(),
                    error = %err,
                    "attribute write failed"
                );
                SetResult::ResourceUnavailable
            }
        }
    }

    fn readable(&self) -> bool {
        self.accessor.descriptor().readable
    }
}

impl MibHandler for ScalarObject {
    fn get<'a>(&'a self, _ctx: &'a RequestContext, oid: &'a Oid) -> BoxFuture<'a, GetResult> {
        Box::pin(async move {
            if oid != &self.oid || !self.readable() {
                return GetResult::NoSuchObject;
            }
            GetResult::Value(self.read().await)
        })
    }

    fn get_next<'a>(
        &'a self,
        _ctx: &'a RequestContext,
        oid: &'a Oid,
    ) -> BoxFuture<'a, GetNextResult> {
        Box::pin(async move {
            if oid >= &self.oid || !self.readable() {
                return GetNextResult::EndOfMibView;
            }
            GetNextResult::Value(VarBind::new(self.oid.clone(), self.read().await))
        })
    }

    fn test_set<'a>(
        &'a self,
        ctx: &'a RequestContext,
        oid: &'a Oid,
        value: &'a Value,
    ) -> BoxFuture<'a, SetResult> {
        Box::pin(async move {
            if oid != &self.oid {
                return SetResult::NoCreation;
            }
            match self.convert(value) {
                Ok(native) => {
                    self.staged.lock().insert(ctx.transaction_id, native);
                    SetResult::Ok
                }
                Err(result) => result,
            }
        })
    }

    fn commit_set<'a>(
        &'a self,
        ctx: &'a RequestContext,
        _oid: &'a Oid,
        _value: &'a Value,
    ) -> BoxFuture<'a, SetResult> {
        Box::pin(async move {
            let Some(native) = self.staged.lock().remove(&ctx.transaction_id) else {
                tracing::error!(
                    gateway.oid = %self.oid,
                    txn = ctx.transaction_id,
                    "commit without prepare"
                );
                return SetResult::CommitFailed;
            };
            self.apply(native).await
        })
    }

    fn undo_set<'a>(
        &'a self,
        ctx: &'a RequestContext,
        _oid: &'a Oid,
        _value: &'a Value,
    ) -> BoxFuture<'a, SetResult> {
        Box::pin(async move {
            self.staged.lock().remove(&ctx.transaction_id);
            SetResult::Ok
        })
    }

    fn complete_set<'a>(&'a self, ctx: &'a RequestContext) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            self.staged.lock().remove(&ctx.transaction_id);
        })
    }

    fn handles(&self, registered_prefix: &Oid, oid: &Oid) -> bool {
        oid == registered_prefix || oid < registered_prefix
    }
}
