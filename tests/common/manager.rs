//! Minimal SNMP manager speaking to a gateway over loopback UDP.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::Duration;

use bytes::Bytes;
use snmp_gateway::ber::Decoder;
use snmp_gateway::message::{
    CommunityMessage, HeaderData, Message, MsgFlags, ScopedPdu, ScopedPduData, SecurityLevel,
    V3Message,
};
use snmp_gateway::pdu::{Pdu, PduType};
use snmp_gateway::security::SecurityUser;
use snmp_gateway::v3::{SaltCounter, UsmSecurityParams, UsmUser};
use snmp_gateway::{Oid, Value, VarBind, Version};
use tokio::net::UdpSocket;

const RESPONSE_TIMEOUT: Duration = Duration::from_secs(2);

/// What the agent advertised during discovery.
#[derive(Debug, Clone)]
pub struct Engine {
    pub engine_id: Bytes,
    pub boots: u32,
    pub time: u32,
}

pub struct Manager {
    socket: UdpSocket,
    target: SocketAddr,
    next_id: AtomicI32,
    salt: SaltCounter,
}

impl Manager {
    pub async fn new(target: SocketAddr) -> Self {
        Self {
            socket: UdpSocket::bind("127.0.0.1:0").await.unwrap(),
            target,
            next_id: AtomicI32::new(1),
            salt: SaltCounter::new(),
        }
    }

    pub fn request_id(&self) -> i32 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Send one datagram; `None` when nothing comes back in time.
    pub async fn exchange(&self, datagram: &[u8]) -> Option<Bytes> {
        self.socket.send_to(datagram, self.target).await.unwrap();
        let mut buf = vec![0u8; 65535];
        let received = tokio::time::timeout(RESPONSE_TIMEOUT, self.socket.recv_from(&mut buf)).await;
        match received {
            Ok(Ok((len, _))) => Some(Bytes::copy_from_slice(&buf[..len])),
            Ok(Err(err)) => panic!("receive failed: {}", err),
            Err(_) => None,
        }
    }

    pub async fn community(&self, version: Version, community: &str, pdu: Pdu) -> Option<Pdu> {
        let request = CommunityMessage::new(
            version,
            Bytes::copy_from_slice(community.as_bytes()),
            pdu,
        )
        .encode();
        let response = self.exchange(&request).await?;
        match Message::decode(response).unwrap() {
            Message::Community(msg) => {
                assert_eq!(msg.version, version);
                Some(msg.pdu)
            }
            Message::V3(_) => panic!("expected community response"),
        }
    }

    pub fn get_pdu(&self, oids: &[Oid]) -> Pdu {
        Pdu::new(
            PduType::GetRequest,
            self.request_id(),
            oids.iter().cloned().map(VarBind::null).collect(),
        )
    }

    pub fn get_next_pdu(&self, oid: &Oid) -> Pdu {
        Pdu::new(
            PduType::GetNextRequest,
            self.request_id(),
            vec![VarBind::null(oid.clone())],
        )
    }

    pub fn set_pdu(&self, varbinds: Vec<(Oid, Value)>) -> Pdu {
        Pdu::new(
            PduType::SetRequest,
            self.request_id(),
            varbinds
                .into_iter()
                .map(|(oid, value)| VarBind::new(oid, value))
                .collect(),
        )
    }

    pub async fn get(&self, community: &str, oids: &[Oid]) -> Pdu {
        self.community(Version::V2c, community, self.get_pdu(oids))
            .await
            .expect("GET response")
    }

    /// GETNEXT from `root` until the walk leaves it or ends.
    pub async fn walk(&self, version: Version, community: &str, root: &Oid) -> Vec<VarBind> {
        let mut result = Vec::new();
        let mut cursor = root.clone();
        loop {
            let response = self
                .community(version, community, self.get_next_pdu(&cursor))
                .await
                .expect("GETNEXT response");
            if response.error_status != 0 {
                break;
            }
            let vb = response.varbinds[0].clone();
            if matches!(vb.value, Value::EndOfMibView) || !vb.oid.starts_with(root) {
                break;
            }
            assert!(vb.oid > cursor, "walk must advance");
            cursor = vb.oid.clone();
            result.push(vb);
        }
        result
    }

    /// Learn the agent's engine id, boots and time.
    pub async fn discover(&self) -> Engine {
        let anonymous = UsmUser::new(Bytes::new(), &[], None, None);
        let engine = Engine {
            engine_id: Bytes::new(),
            boots: 0,
            time: 0,
        };
        let msg = self
            .v3_exchange(&anonymous, &engine, SecurityLevel::NoAuthNoPriv, self.get_pdu(&[]))
            .await
            .expect("discovery report");
        Engine {
            engine_id: msg.security.engine_id.clone(),
            boots: msg.security.engine_boots,
            time: msg.security.engine_time,
        }
    }

    /// Discover, then send `pdu` as `user`, returning the decrypted response.
    pub async fn v3(&self, user: &SecurityUser, level: SecurityLevel, pdu: Pdu) -> Option<Pdu> {
        let engine = self.discover().await;
        let localized = user.localize(&engine.engine_id);
        let msg = self.v3_exchange(&localized, &engine, level, pdu).await?;
        Some(open(&localized, &msg))
    }

    pub async fn v3_exchange(
        &self,
        user: &UsmUser,
        engine: &Engine,
        level: SecurityLevel,
        pdu: Pdu,
    ) -> Option<V3Message> {
        let scoped = ScopedPdu::new(engine.engine_id.clone(), Bytes::new(), pdu);
        let (data, priv_params) = if level.requires_priv() {
            let (cipher, salt) = user
                .priv_key
                .as_ref()
                .unwrap()
                .encrypt(&scoped.encode(), engine.boots, engine.time, &self.salt)
                .unwrap();
            (ScopedPduData::Encrypted(cipher), salt)
        } else {
            (ScopedPduData::Plaintext(scoped), Bytes::new())
        };
        let mac_len = match level.requires_auth() {
            true => user.auth_key.as_ref().unwrap().protocol().mac_len(),
            false => 0,
        };
        let security = UsmSecurityParams::new(
            engine.engine_id.clone(),
            engine.boots,
            engine.time,
            user.name.clone(),
            mac_len,
            priv_params,
        );
        let header = HeaderData::new(self.request_id(), 65507, MsgFlags::new(level, true));
        let (mut bytes, offset) = V3Message::encode(&header, &security, &data);
        if let (true, Some(offset)) = (level.requires_auth(), offset) {
            user.auth_key.as_ref().unwrap().sign_in_place(&mut bytes, offset);
        }

        let response = self.exchange(&bytes).await?;
        match Message::decode(response).unwrap() {
            Message::V3(msg) => Some(msg),
            Message::Community(_) => panic!("expected v3 response"),
        }
    }
}

/// The scoped PDU of a response, decrypting it when needed.
pub fn open(user: &UsmUser, msg: &V3Message) -> Pdu {
    match &msg.data {
        ScopedPduData::Plaintext(scoped) => scoped.pdu.clone(),
        ScopedPduData::Encrypted(cipher) => {
            let plain = user
                .priv_key
                .as_ref()
                .unwrap()
                .decrypt(
                    cipher,
                    msg.security.engine_boots,
                    msg.security.engine_time,
                    &msg.security.priv_params,
                )
                .unwrap();
            ScopedPdu::decode(&mut Decoder::new(plain)).unwrap().pdu
        }
    }
}
