//! GET, GETNEXT and GETBULK processing.

use std::sync::Arc;

use crate::error::ErrorStatus;
use crate::handler::{GetNextResult, GetResult, MibHandler, RequestContext};
use crate::oid::Oid;
use crate::pdu::Pdu;
use crate::value::Value;
use crate::varbind::VarBind;
use crate::version::Version;

use super::Session;

/// Room left in a response for the message wrapper and PDU header.
const RESPONSE_OVERHEAD: usize = 128;

impl Session {
    /// Handler owning `oid`, cloned out of the tree lock.
    pub(super) fn lookup(&self, oid: &Oid) -> Option<(Oid, Arc<dyn MibHandler>)> {
        self.shared
            .tree
            .read()
            .find(oid)
            .map(|object| (object.oid().clone(), object.handler()))
    }

    /// Handlers that may hold a successor of `oid`, in OID order.
    fn successors(&self, oid: &Oid) -> Vec<(Oid, Arc<dyn MibHandler>)> {
        self.shared
            .tree
            .read()
            .candidates(oid)
            .map(|object| (object.oid().clone(), object.handler()))
            .collect()
    }

    fn readable(&self, ctx: &RequestContext, oid: &Oid) -> bool {
        self.shared
            .vacm
            .read()
            .check_access(ctx.read_view.as_ref(), oid)
    }

    pub(super) async fn handle_get(&self, ctx: &RequestContext, pdu: &Pdu) -> Pdu {
        let v1 = ctx.version == Version::V1;
        let mut varbinds = Vec::with_capacity(pdu.varbinds.len());

        for (index, vb) in pdu.varbinds.iter().enumerate() {
            let result = match self.lookup(&vb.oid) {
                Some(_) if !self.readable(ctx, &vb.oid) => GetResult::NoSuchObject,
                Some((_, handler)) => handler.get(ctx, &vb.oid).await,
                None => GetResult::NoSuchObject,
            };
            let value = match result {
                GetResult::Value(Value::Counter64(_)) if v1 => None,
                GetResult::Value(value) => Some(value),
                GetResult::NoSuchObject if !v1 => Some(Value::NoSuchObject),
                GetResult::NoSuchInstance if !v1 => Some(Value::NoSuchInstance),
                _ => None,
            };
            match value {
                Some(value) => varbinds.push(VarBind::new(vb.oid.clone(), value)),
                None => return pdu.error_response(ErrorStatus::NoSuchName, index as i32 + 1),
            }
        }
        pdu.response(varbinds)
    }

    pub(super) async fn handle_get_next(&self, ctx: &RequestContext, pdu: &Pdu) -> Pdu {
        let mut varbinds = Vec::with_capacity(pdu.varbinds.len());
        for (index, vb) in pdu.varbinds.iter().enumerate() {
            match self.next_visible(ctx, &vb.oid).await {
                Some(next) => varbinds.push(next),
                None if ctx.version == Version::V1 => {
                    return pdu.error_response(ErrorStatus::NoSuchName, index as i32 + 1);
                }
                None => varbinds.push(VarBind::new(vb.oid.clone(), Value::EndOfMibView)),
            }
        }
        pdu.response(varbinds)
    }

    /// Non-repeaters once each, then up to max-repetitions rounds over the
    /// repeaters, stopping before the response would exceed `max_size`.
    pub(super) async fn handle_get_bulk(
        &self,
        ctx: &RequestContext,
        pdu: &Pdu,
        max_size: usize,
    ) -> Pdu {
        let budget = max_size.saturating_sub(RESPONSE_OVERHEAD);
        let non_repeaters = pdu.non_repeaters();
        let mut size = 0;
        let mut varbinds = Vec::new();

        for vb in &pdu.varbinds[..non_repeaters] {
            let next = self
                .next_visible(ctx, &vb.oid)
                .await
                .unwrap_or_else(|| VarBind::new(vb.oid.clone(), Value::EndOfMibView));
            size += next.encoded_size();
            if size > budget {
                return too_big_or(pdu, varbinds);
            }
            varbinds.push(next);
        }

        let mut cursors: Vec<Option<Oid>> = pdu.varbinds[non_repeaters..]
            .iter()
            .map(|vb| Some(vb.oid.clone()))
            .collect();
        let mut ended: Vec<Oid> = pdu.varbinds[non_repeaters..]
            .iter()
            .map(|vb| vb.oid.clone())
            .collect();

        for _ in 0..pdu.max_repetitions() {
            if cursors.iter().all(Option::is_none) {
                break;
            }
            for (cursor, last) in cursors.iter_mut().zip(ended.iter_mut()) {
                let next = match cursor.take() {
                    Some(from) => match self.next_visible(ctx, &from).await {
                        Some(next) => {
                            *cursor = Some(next.oid.clone());
                            *last = next.oid.clone();
                            next
                        }
                        None => VarBind::new(from, Value::EndOfMibView),
                    },
                    None => VarBind::new(last.clone(), Value::EndOfMibView),
                };
                size += next.encoded_size();
                if size > budget {
                    return too_big_or(pdu, varbinds);
                }
                varbinds.push(next);
            }
        }
        pdu.response(varbinds)
    }

    /// First readable instance after `oid`, across every handler.
    pub(super) async fn next_visible(&self, ctx: &RequestContext, oid: &Oid) -> Option<VarBind> {
        let v1 = ctx.version == Version::V1;
        for (prefix, handler) in self.successors(oid) {
            if !handler.handles(&prefix, oid) {
                continue;
            }
            let mut from = oid.clone();
            while let GetNextResult::Value(next) = handler.get_next(ctx, &from).await {
                if next.oid <= from {
                    tracing::error!(
                        gateway.oid = %prefix,
                        snmp.oid = %next.oid,
                        "handler returned a non-increasing OID"
                    );
                    break;
                }
                let skip = (v1 && matches!(next.value, Value::Counter64(_)))
                    || !self.readable(ctx, &next.oid);
                if !skip {
                    return Some(next);
                }
                from = next.oid;
            }
        }
        None
    }
}

/// The bindings gathered so far, or tooBig when none fit.
fn too_big_or(pdu: &Pdu, varbinds: Vec<VarBind>) -> Pdu {
    if varbinds.is_empty() {
        let mut response = pdu.error_response(ErrorStatus::TooBig, 0);
        response.varbinds.clear();
        return response;
    }
    pdu.response(varbinds)
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use bytes::Bytes;

    use super::super::{AgentConfig, ProtocolAgent, READ_VIEW, SecurityModel};
    use super::*;
    use crate::attribute::{
        AttributeDescriptor, AttributeType, AttributeValue, ColumnDescriptor, MemoryAttribute,
        TableValue,
    };
    use crate::message::SecurityLevel;
    use crate::object::ManagedObject;
    use crate::oid;
    use crate::pdu::PduType;
    use crate::security::SecurityConfiguration;

    fn agent() -> ProtocolAgent {
        let agent = ProtocolAgent::new(AgentConfig::new(oid!(1, 3, 6, 1, 4, 1, 99)));
        let scalar = MemoryAttribute::new(
            AttributeDescriptor::new("enabled", AttributeType::Bool),
            AttributeValue::Bool(true),
        );
        let counter = MemoryAttribute::new(
            AttributeDescriptor::new("bytes", AttributeType::Long),
            AttributeValue::Long(5),
        );
        let table = MemoryAttribute::new(
            AttributeDescriptor::new(
                "ports",
                AttributeType::Table(vec![
                    ColumnDescriptor::new("name", AttributeType::String),
                    ColumnDescriptor::new("speed", AttributeType::Int),
                ]),
            ),
            AttributeValue::Table(
                TableValue::new(vec!["name".into(), "speed".into()])
                    .with_row(vec![AttributeValue::String("eth0".into()), AttributeValue::Int(100)])
                    .with_row(vec![AttributeValue::String("eth1".into()), AttributeValue::Int(1000)]),
            ),
        );
        agent
            .register(ManagedObject::new(oid!(1, 3, 6, 1, 4, 1, 99, 1), scalar))
            .unwrap();
        agent
            .register(ManagedObject::new(oid!(1, 3, 6, 1, 4, 1, 99, 2), counter))
            .unwrap();
        agent
            .register(ManagedObject::new(oid!(1, 3, 6, 1, 4, 1, 99, 3), table))
            .unwrap();
        agent.install_security(&SecurityConfiguration::default());
        agent
    }

    fn ctx(version: Version) -> RequestContext {
        let source: SocketAddr = "127.0.0.1:40000".parse().unwrap();
        RequestContext {
            source,
            version,
            security_model: SecurityModel::V2c,
            security_name: Bytes::from_static(b"public"),
            security_level: SecurityLevel::NoAuthNoPriv,
            context_name: Bytes::new(),
            request_id: 1,
            pdu_type: PduType::GetRequest,
            group_name: None,
            read_view: Some(Bytes::from_static(READ_VIEW.as_bytes())),
            write_view: None,
            transaction_id: 0,
        }
    }

    fn request(pdu_type: PduType, oids: &[Oid]) -> Pdu {
        Pdu::new(pdu_type, 9, oids.iter().cloned().map(VarBind::null).collect())
    }

    #[tokio::test]
    async fn test_get_scalar_and_missing() {
        let agent = agent();
        let session = Session::for_agent(&agent, 1);
        let pdu = request(
            PduType::GetRequest,
            &[oid!(1, 3, 6, 1, 4, 1, 99, 1), oid!(1, 3, 6, 1, 4, 1, 99, 9)],
        );

        let response = session.handle_get(&ctx(Version::V2c), &pdu).await;
        assert_eq!(response.error_status, 0);
        assert_eq!(response.varbinds[0].value, Value::Integer(1));
        assert_eq!(response.varbinds[1].value, Value::NoSuchObject);

        let response = session.handle_get(&ctx(Version::V1), &pdu).await;
        assert_eq!(response.error_status(), ErrorStatus::NoSuchName);
        assert_eq!(response.error_index, 2);
    }

    #[tokio::test]
    async fn test_get_denied_without_read_view() {
        let agent = agent();
        let session = Session::for_agent(&agent, 1);
        let mut ctx = ctx(Version::V2c);
        ctx.read_view = None;
        let pdu = request(PduType::GetRequest, &[oid!(1, 3, 6, 1, 4, 1, 99, 1)]);
        let response = session.handle_get(&ctx, &pdu).await;
        assert_eq!(response.varbinds[0].value, Value::NoSuchObject);
    }

    #[tokio::test]
    async fn test_walk_crosses_objects_in_order() {
        let agent = agent();
        let session = Session::for_agent(&agent, 1);
        let ctx = ctx(Version::V2c);

        let mut oid = oid!(1, 3, 6, 1, 4, 1, 99);
        let mut walked = Vec::new();
        while let Some(next) = session.next_visible(&ctx, &oid).await {
            walked.push(next.oid.clone());
            oid = next.oid;
        }
        assert_eq!(
            walked,
            vec![
                oid!(1, 3, 6, 1, 4, 1, 99, 1),
                oid!(1, 3, 6, 1, 4, 1, 99, 2),
                oid!(1, 3, 6, 1, 4, 1, 99, 3, 1, 1),
                oid!(1, 3, 6, 1, 4, 1, 99, 3, 1, 2),
                oid!(1, 3, 6, 1, 4, 1, 99, 3, 2, 1),
                oid!(1, 3, 6, 1, 4, 1, 99, 3, 2, 2),
            ]
        );
    }

    #[tokio::test]
    async fn test_v1_skips_counter64() {
        let agent = agent();
        let session = Session::for_agent(&agent, 1);
        let pdu = request(PduType::GetNextRequest, &[oid!(1, 3, 6, 1, 4, 1, 99, 1)]);
        let response = session.handle_get_next(&ctx(Version::V1), &pdu).await;
        assert_eq!(response.varbinds[0].oid, oid!(1, 3, 6, 1, 4, 1, 99, 3, 1, 1));

        let pdu = request(PduType::GetNextRequest, &[oid!(1, 3, 6, 1, 4, 1, 99, 3, 2, 2)]);
        let response = session.handle_get_next(&ctx(Version::V1), &pdu).await;
        assert_eq!(response.error_status(), ErrorStatus::NoSuchName);
        let response = session.handle_get_next(&ctx(Version::V2c), &pdu).await;
        assert_eq!(response.varbinds[0].value, Value::EndOfMibView);
    }

    #[tokio::test]
    async fn test_get_bulk() {
        let agent = agent();
        let session = Session::for_agent(&agent, 1);
        let pdu = Pdu::get_bulk(
            3,
            1,
            10,
            vec![
                VarBind::null(oid!(1, 3, 6, 1, 4, 1, 99)),
                VarBind::null(oid!(1, 3, 6, 1, 4, 1, 99, 3, 2)),
            ],
        );
        let response = session.handle_get_bulk(&ctx(Version::V2c), &pdu, 65507).await;
        let oids: Vec<_> = response.varbinds.iter().map(|vb| vb.oid.clone()).collect();
        assert_eq!(
            oids,
            vec![
                oid!(1, 3, 6, 1, 4, 1, 99, 1),
                oid!(1, 3, 6, 1, 4, 1, 99, 3, 2, 1),
                oid!(1, 3, 6, 1, 4, 1, 99, 3, 2, 2),
                oid!(1, 3, 6, 1, 4, 1, 99, 3, 2, 2),
            ]
        );
        assert_eq!(response.varbinds[3].value, Value::EndOfMibView);
    }

    #[tokio::test]
    async fn test_get_bulk_respects_size() {
        let agent = agent();
        let session = Session::for_agent(&agent, 1);
        let pdu = Pdu::get_bulk(3, 0, 50, vec![VarBind::null(oid!(1, 3, 6, 1, 4, 1, 99))]);
        let response = session.handle_get_bulk(&ctx(Version::V2c), &pdu, 128 + 40).await;
        assert_eq!(response.error_status, 0);
        assert!(!response.varbinds.is_empty());
        assert!(response.varbinds.len() < 6);

        let response = session.handle_get_bulk(&ctx(Version::V2c), &pdu, 100).await;
        assert_eq!(response.error_status(), ErrorStatus::TooBig);
        assert!(response.varbinds.is_empty());
    }
}
