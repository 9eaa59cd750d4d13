//! Outbound SNMPv2-Trap dispatch.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::Duration;

use bytes::Bytes;
use parking_lot::RwLock;
use tokio::net::UdpSocket;

use crate::error::{Error, Result};
use crate::message::{CommunityMessage, HeaderData, MsgFlags, ScopedPdu, ScopedPduData, V3Message};
use crate::oid::Oid;
use crate::pdu::Pdu;
use crate::v3::{LocalEngine, SaltCounter, UsmSecurityParams, UsmUser};
use crate::value::Value;
use crate::varbind::VarBind;
use crate::version::Version;

/// sysUpTime.0
pub fn sys_up_time() -> Oid {
    crate::oid!(1, 3, 6, 1, 2, 1, 1, 3, 0)
}

/// snmpTrapOID.0
pub fn snmp_trap_oid() -> Oid {
    crate::oid!(1, 3, 6, 1, 6, 3, 1, 1, 4, 1, 0)
}

/// The coldStart notification.
pub fn cold_start() -> Oid {
    crate::oid!(1, 3, 6, 1, 6, 3, 1, 1, 5, 1)
}

/// Community of the unauthenticated trap copy when none is configured.
pub const DEFAULT_TRAP_COMMUNITY: &[u8] = b"public";

/// Where one notification is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrapTarget {
    pub name: String,
    pub address: SocketAddr,
    pub timeout: Duration,
    pub retries: u32,
}

/// Sends traps from the agent's socket.
///
/// Every trap goes out once as v2c under the agent's read community, and
/// once as v3 under the first user holding the notify right, when there is
/// one. Each copy is sent regardless of whether the other was delivered.
pub struct TrapSender {
    socket: Arc<UdpSocket>,
    community: Bytes,
    engine: Arc<LocalEngine>,
    notify_user: Option<UsmUser>,
    salt: SaltCounter,
    next_request_id: AtomicI32,
}

impl TrapSender {
    pub fn new(
        socket: Arc<UdpSocket>,
        engine: Arc<LocalEngine>,
        notify_user: Option<UsmUser>,
    ) -> Self {
        Self {
            socket,
            community: Bytes::from_static(DEFAULT_TRAP_COMMUNITY),
            engine,
            notify_user,
            salt: SaltCounter::new(),
            next_request_id: AtomicI32::new(1),
        }
    }

    /// Community for the v2c copy. An empty community keeps the default.
    pub fn with_community(mut self, community: Bytes) -> Self {
        if !community.is_empty() {
            self.community = community;
        }
        self
    }

    /// Prepend sysUpTime.0 and snmpTrapOID.0 to the notification bindings.
    pub fn frame(&self, trap_oid: &Oid, bindings: Vec<VarBind>) -> Vec<VarBind> {
        let mut varbinds = Vec::with_capacity(bindings.len() + 2);
        varbinds.push(VarBind::new(
            sys_up_time(),
            Value::TimeTicks(self.engine.uptime_ticks()),
        ));
        varbinds.push(VarBind::new(
            snmp_trap_oid(),
            Value::ObjectIdentifier(trap_oid.clone()),
        ));
        varbinds.extend(bindings);
        varbinds
    }

    pub async fn send(
        &self,
        target: &TrapTarget,
        trap_oid: &Oid,
        bindings: Vec<VarBind>,
    ) -> Result<()> {
        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed) & i32::MAX;
        let pdu = Pdu::trap_v2(request_id, self.frame(trap_oid, bindings));

        let legacy = CommunityMessage::new(Version::V2c, self.community.clone(), pdu.clone())
            .encode();
        let mut outcome = self.send_datagram(target, &legacy).await;
        if let Err(err) = &outcome {
            tracing::warn!(
                trap.target = %target.address,
                trap.oid = %trap_oid,
                error = %err,
                "v2c trap copy not delivered"
            );
        }

        if let Some(user) = &self.notify_user {
            let sent = match self.encode_v3(user, pdu) {
                Ok(datagram) => self.send_datagram(target, &datagram).await,
                Err(err) => Err(err),
            };
            if let Err(err) = sent {
                tracing::warn!(
                    trap.target = %target.address,
                    trap.oid = %trap_oid,
                    error = %err,
                    "v3 trap copy not delivered"
                );
                outcome = outcome.and(Err(err));
            }
        }
        if outcome.is_ok() {
            tracing::trace!(
                trap.target = %target.address,
                trap.oid = %trap_oid,
                snmp.request_id = request_id,
                "trap sent"
            );
        }
        outcome
    }

    fn encode_v3(&self, user: &UsmUser, pdu: Pdu) -> Result<Bytes> {
        let level = user.max_level();
        let boots = self.engine.boots();
        let time = self.engine.time();
        let scoped = ScopedPdu::new(self.engine.engine_id().clone(), Bytes::new(), pdu);

        let (data, priv_params) = match &user.priv_key {
            Some(key) => {
                let (cipher, salt) = key.encrypt(&scoped.encode(), boots, time, &self.salt)?;
                (ScopedPduData::Encrypted(cipher), salt)
            }
            None => (ScopedPduData::Plaintext(scoped), Bytes::new()),
        };
        let mac_len = user
            .auth_key
            .as_ref()
            .map(|key| key.protocol().mac_len())
            .unwrap_or(0);
        let security = UsmSecurityParams::new(
            self.engine.engine_id().clone(),
            boots,
            time,
            user.name.clone(),
            mac_len,
            priv_params,
        );
        let header = HeaderData::new(
            self.next_request_id.fetch_add(1, Ordering::Relaxed) & i32::MAX,
            crate::agent::DEFAULT_MAX_MESSAGE_SIZE as i32,
            MsgFlags::new(level, false),
        );
        let (mut bytes, offset) = V3Message::encode(&header, &security, &data);
        if let (Some(key), Some(offset)) = (&user.auth_key, offset) {
            key.sign_in_place(&mut bytes, offset);
        }
        Ok(Bytes::from(bytes))
    }

    /// One datagram, each attempt bounded by the target's timeout.
    async fn send_datagram(&self, target: &TrapTarget, datagram: &[u8]) -> Result<()> {
        let started = tokio::time::Instant::now();
        let mut last_error = None;
        for attempt in 0..=target.retries {
            let send = self.socket.send_to(datagram, target.address);
            match tokio::time::timeout(target.timeout, send).await {
                Ok(Ok(_)) => return Ok(()),
                Ok(Err(err)) => {
                    tracing::debug!(
                        trap.target = %target.address,
                        attempt,
                        error = %err,
                        "trap send failed"
                    );
                    last_error = Some(err);
                }
                Err(_) => {
                    tracing::debug!(trap.target = %target.address, attempt, "trap send timed out");
                }
            }
        }
        Err(match last_error {
            Some(err) => Error::io(Some(target.address), err),
            None => Error::Timeout {
                target: target.address,
                elapsed: started.elapsed(),
                retries: target.retries,
            },
        })
    }
}

impl std::fmt::Debug for TrapSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrapSender")
            .field("engine_id", &hex::encode(self.engine.engine_id()))
            .field("v3", &self.notify_user.is_some())
            .finish_non_exhaustive()
    }
}

/// Handle to the running agent's trap sender.
///
/// Filled when the agent starts and emptied when it stops; a notification
/// arriving while empty is dropped.
#[derive(Debug, Clone, Default)]
pub struct TrapSlot(Arc<RwLock<Option<Arc<TrapSender>>>>);

impl TrapSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install(&self, sender: Arc<TrapSender>) {
        *self.0.write() = Some(sender);
    }

    pub fn clear(&self) {
        self.0.write().take();
    }

    pub fn get(&self) -> Option<Arc<TrapSender>> {
        self.0.read().clone()
    }

    pub fn is_active(&self) -> bool {
        self.0.read().is_some()
    }
}
