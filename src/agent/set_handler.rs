//! SET processing: prepare, commit or rollback, cleanup.

use std::sync::Arc;

use crate::error::ErrorStatus;
use crate::handler::{MibHandler, RequestContext, SetResult};
use crate::oid::Oid;
use crate::pdu::Pdu;
use crate::value::Value;
use crate::version::Version;

use super::Session;

struct PendingSet<'a> {
    prefix: Oid,
    handler: Arc<dyn MibHandler>,
    oid: &'a Oid,
    value: &'a Value,
}

impl Session {
    /// Drive one SET PDU through the phase protocol.
    ///
    /// 1. **Prepare** every varbind. The first failure rolls back and cleans
    ///    up the varbinds already prepared, then answers with its status.
    /// 2. **Commit** every varbind. A failure answers `commitFailed` and
    ///    skips cleanup, so nothing is written back.
    /// 3. **Cleanup** every varbind. Tables write their staged rows here.
    ///
    /// Every handler touched receives `complete_set` once at the end.
    pub(super) async fn handle_set(&self, ctx: &RequestContext, pdu: &Pdu) -> Pdu {
        let mut pending: Vec<PendingSet> = Vec::with_capacity(pdu.varbinds.len());
        let response = self.run_set(ctx, pdu, &mut pending).await;

        let mut completed: Vec<&Oid> = Vec::new();
        for p in &pending {
            if completed.contains(&&p.prefix) {
                continue;
            }
            completed.push(&p.prefix);
            p.handler.complete_set(ctx).await;
        }
        response
    }

    async fn run_set<'a>(
        &self,
        ctx: &RequestContext,
        pdu: &'a Pdu,
        pending: &mut Vec<PendingSet<'a>>,
    ) -> Pdu {
        let v1 = ctx.version == Version::V1;

        for (index, vb) in pdu.varbinds.iter().enumerate() {
            let writable = self
                .shared
                .vacm
                .read()
                .check_access(ctx.write_view.as_ref(), &vb.oid);
            if !writable {
                let status = if v1 {
                    ErrorStatus::NoSuchName
                } else {
                    ErrorStatus::NoAccess
                };
                self.abandon(ctx, pending).await;
                return pdu.error_response(status, index as i32 + 1);
            }

            let Some((prefix, handler)) = self.lookup(&vb.oid) else {
                let status = if v1 {
                    ErrorStatus::NoSuchName
                } else {
                    ErrorStatus::NotWritable
                };
                self.abandon(ctx, pending).await;
                return pdu.error_response(status, index as i32 + 1);
            };

            let result = handler.test_set(ctx, &vb.oid, &vb.value).await;
            pending.push(PendingSet {
                prefix,
                handler,
                oid: &vb.oid,
                value: &vb.value,
            });
            if !result.is_ok() {
                tracing::debug!(
                    gateway.oid = %vb.oid,
                    txn = ctx.transaction_id,
                    result = ?result,
                    "prepare failed"
                );
                self.abandon(ctx, pending).await;
                return self.error(ctx, pdu, result.to_error_status(), index + 1);
            }
        }

        for (index, p) in pending.iter().enumerate() {
            let result = p.handler.commit_set(ctx, p.oid, p.value).await;
            if !result.is_ok() {
                tracing::error!(
                    gateway.oid = %p.oid,
                    txn = ctx.transaction_id,
                    result = ?result,
                    "commit failed"
                );
                let status = match result {
                    SetResult::ResourceUnavailable => ErrorStatus::ResourceUnavailable,
                    _ => ErrorStatus::CommitFailed,
                };
                return self.error(ctx, pdu, status, index + 1);
            }
        }

        let mut failed = None;
        for (index, p) in pending.iter().enumerate() {
            let result = p.handler.cleanup_set(ctx, p.oid, p.value).await;
            if !result.is_ok() && failed.is_none() {
                tracing::error!(
                    gateway.oid = %p.oid,
                    txn = ctx.transaction_id,
                    result = ?result,
                    "cleanup failed"
                );
                failed = Some(index + 1);
            }
        }
        match failed {
            Some(index) => self.error(ctx, pdu, ErrorStatus::CommitFailed, index),
            None => pdu.response(pdu.varbinds.clone()),
        }
    }

    /// Roll back and clean up every varbind prepared so far.
    async fn abandon(&self, ctx: &RequestContext, pending: &[PendingSet<'_>]) {
        for p in pending {
            p.handler.undo_set(ctx, p.oid, p.value).await;
        }
        for p in pending {
            p.handler.cleanup_set(ctx, p.oid, p.value).await;
        }
    }
}
