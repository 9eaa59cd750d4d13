//! Inbound USM processing (RFC 3414 3.2) and v3 response encoding.

use std::net::SocketAddr;

use bytes::Bytes;

use crate::ber::Decoder;
use crate::error::{ErrorStatus, Result};
use crate::message::{HeaderData, MsgFlags, ScopedPdu, ScopedPduData, SecurityLevel, V3Message};
use crate::pdu::{Pdu, PduType};
use crate::v3::{UsmReport, UsmSecurityParams, UsmUser};

use super::Session;
use super::vacm::SecurityModel;

/// A v3 request that passed every USM check.
pub(super) struct Authenticated {
    pub user: UsmUser,
    pub level: SecurityLevel,
    pub scoped: ScopedPdu,
}

/// Why a v3 request was refused.
pub(super) struct Refusal {
    pub report: UsmReport,
    /// Level the Report is sent at.
    pub level: SecurityLevel,
    pub user: Option<UsmUser>,
    pub request_id: i32,
}

impl Refusal {
    fn plain(report: UsmReport, request_id: i32) -> Self {
        Self {
            report,
            level: SecurityLevel::NoAuthNoPriv,
            user: None,
            request_id,
        }
    }
}

fn plaintext_request_id(msg: &V3Message) -> i32 {
    match &msg.data {
        ScopedPduData::Plaintext(scoped) => scoped.pdu.request_id,
        ScopedPduData::Encrypted(_) => 0,
    }
}

impl Session {
    pub(super) async fn handle_v3(&self, msg: V3Message, source: SocketAddr) -> Option<Bytes> {
        let max_size = (msg.header.max_size.max(0) as usize).min(self.max_message_size());
        match self.authenticate(&msg) {
            Ok(auth) => {
                let access = self
                    .shared
                    .vacm
                    .read()
                    .resolve(
                        SecurityModel::Usm,
                        &auth.user.name,
                        &auth.scoped.context_name,
                        auth.level,
                    )
                    .cloned();
                let Some(access) = access else {
                    tracing::debug!(
                        snmp.source = %source,
                        snmp.user = %String::from_utf8_lossy(&auth.user.name),
                        "no access entry for user"
                    );
                    let response = auth
                        .scoped
                        .pdu
                        .error_response(ErrorStatus::AuthorizationError, 0);
                    return self.encode_v3(&msg.header, &auth, response, max_size).ok();
                };
                let ctx = self.context_v3(source, &auth, &access);
                let response = self.dispatch(&ctx, &auth.scoped.pdu, max_size).await?;
                match self.encode_v3(&msg.header, &auth, response, max_size) {
                    Ok(bytes) => Some(bytes),
                    Err(err) => {
                        tracing::warn!(
                            snmp.source = %source,
                            error = %err,
                            "failed to encode v3 response"
                        );
                        None
                    }
                }
            }
            Err(refusal) => {
                let counter = self.engine.stats().record(refusal.report);
                tracing::debug!(
                    snmp.source = %source,
                    report = ?refusal.report,
                    "USM processing refused request"
                );
                if !msg.header.flags.reportable {
                    return None;
                }
                let report = Pdu::new(PduType::Report, refusal.request_id, vec![counter]);
                match self.encode_report(&msg.header, &refusal, report) {
                    Ok(bytes) => Some(bytes),
                    Err(err) => {
                        tracing::warn!(
                            snmp.source = %source,
                            error = %err,
                            "failed to encode report"
                        );
                        None
                    }
                }
            }
        }
    }

    /// Engine id, user, security level, digest, timeliness, then decryption.
    pub(super) fn authenticate(
        &self,
        msg: &V3Message,
    ) -> std::result::Result<Authenticated, Refusal> {
        let security = &msg.security;
        let level = msg.header.flags.level;
        let request_id = plaintext_request_id(msg);

        if security.engine_id.is_empty() || &security.engine_id != self.engine.engine_id() {
            return Err(Refusal::plain(UsmReport::UnknownEngineId, request_id));
        }

        let user = self
            .shared
            .users
            .read()
            .get(&security.username, &security.engine_id)
            .cloned()
            .ok_or_else(|| Refusal::plain(UsmReport::UnknownUserName, request_id))?;

        if level > user.max_level() {
            return Err(Refusal::plain(UsmReport::UnsupportedSecLevel, request_id));
        }

        if let Some(key) = user.auth_key.as_ref().filter(|_| level.requires_auth()) {
            let verified = security.auth_params.len() == key.protocol().mac_len()
                && security
                    .auth_params_offset
                    .is_some_and(|offset| key.verify_message(&msg.raw, offset));
            if !verified {
                return Err(Refusal::plain(UsmReport::WrongDigest, request_id));
            }
            if !self
                .engine
                .in_time_window(security.engine_boots, security.engine_time)
            {
                return Err(Refusal {
                    report: UsmReport::NotInTimeWindow,
                    level: SecurityLevel::AuthNoPriv,
                    user: Some(user),
                    request_id,
                });
            }
        }

        let scoped = match &msg.data {
            ScopedPduData::Plaintext(scoped) => scoped.clone(),
            ScopedPduData::Encrypted(cipher) => {
                let decrypted = user.priv_key.as_ref().and_then(|key| {
                    let plain = key
                        .decrypt(
                            cipher,
                            security.engine_boots,
                            security.engine_time,
                            &security.priv_params,
                        )
                        .ok()?;
                    ScopedPdu::decode(&mut Decoder::new(plain)).ok()
                });
                decrypted.ok_or_else(|| Refusal::plain(UsmReport::DecryptionError, 0))?
            }
        };

        Ok(Authenticated {
            user,
            level,
            scoped,
        })
    }

    fn encode_v3(
        &self,
        request: &HeaderData,
        auth: &Authenticated,
        response: Pdu,
        max_size: usize,
    ) -> Result<Bytes> {
        let context_name = auth.scoped.context_name.clone();
        let scoped = ScopedPdu::new(
            self.engine.engine_id().clone(),
            context_name.clone(),
            response,
        );
        let bytes = self.seal(request, auth.level, Some(&auth.user), scoped)?;
        if bytes.len() <= max_size {
            return Ok(bytes);
        }
        tracing::debug!(size = bytes.len(), max = max_size, "v3 response too big");
        let mut too_big = auth.scoped.pdu.error_response(ErrorStatus::TooBig, 0);
        too_big.varbinds.clear();
        let scoped = ScopedPdu::new(self.engine.engine_id().clone(), context_name, too_big);
        self.seal(request, auth.level, Some(&auth.user), scoped)
    }

    fn encode_report(
        &self,
        request: &HeaderData,
        refusal: &Refusal,
        report: Pdu,
    ) -> Result<Bytes> {
        let scoped = ScopedPdu::new(self.engine.engine_id().clone(), Bytes::new(), report);
        self.seal(request, refusal.level, refusal.user.as_ref(), scoped)
    }

    /// Encrypt when the level asks for privacy, then sign when it asks for
    /// authentication.
    fn seal(
        &self,
        request: &HeaderData,
        level: SecurityLevel,
        user: Option<&UsmUser>,
        scoped: ScopedPdu,
    ) -> Result<Bytes> {
        let boots = self.engine.boots();
        let time = self.engine.time();
        let auth_key = user
            .and_then(|u| u.auth_key.as_ref())
            .filter(|_| level.requires_auth());
        let priv_key = user
            .and_then(|u| u.priv_key.as_ref())
            .filter(|_| level.requires_priv());

        let (data, priv_params) = match priv_key {
            Some(key) => {
                let (cipher, salt) = key.encrypt(&scoped.encode(), boots, time, &self.salt)?;
                (ScopedPduData::Encrypted(cipher), salt)
            }
            None => (ScopedPduData::Plaintext(scoped), Bytes::new()),
        };
        let security = UsmSecurityParams::new(
            self.engine.engine_id().clone(),
            boots,
            time,
            user.map(|u| u.name.clone()).unwrap_or_default(),
            auth_key.map(|key| key.protocol().mac_len()).unwrap_or(0),
            priv_params,
        );
        let header = HeaderData::new(
            request.msg_id,
            self.max_message_size() as i32,
            MsgFlags::new(level, false),
        );
        let (mut bytes, offset) = V3Message::encode(&header, &security, &data);
        if let (Some(key), Some(offset)) = (auth_key, offset) {
            key.sign_in_place(&mut bytes, offset);
        }
        Ok(Bytes::from(bytes))
    }
}
