//! USM user table keyed by (user name, authoritative engine id).

use std::collections::HashMap;

use bytes::Bytes;

use super::{AuthProtocol, LocalizedKey, PrivKey, PrivProtocol};
use crate::message::SecurityLevel;

/// A user with keys localized to one engine.
#[derive(Debug, Clone)]
pub struct UsmUser {
    pub name: Bytes,
    pub auth_key: Option<LocalizedKey>,
    pub priv_key: Option<PrivKey>,
}

impl UsmUser {
    /// Localize the user's passphrases to `engine_id`.
    ///
    /// Privacy is ignored without authentication (RFC 3414 forbids it).
    pub fn new(
        name: impl Into<Bytes>,
        engine_id: &[u8],
        auth: Option<(AuthProtocol, &[u8])>,
        privacy: Option<(PrivProtocol, &[u8])>,
    ) -> Self {
        let auth_key = auth.map(|(protocol, password)| {
            LocalizedKey::from_password(protocol, password, engine_id)
        });
        let priv_key = match (auth, privacy) {
            (Some((auth_protocol, _)), Some((protocol, password))) => Some(
                PrivKey::from_password(auth_protocol, protocol, password, engine_id),
            ),
            _ => None,
        };
        Self {
            name: name.into(),
            auth_key,
            priv_key,
        }
    }

    /// Highest security level this user can operate at.
    pub fn max_level(&self) -> SecurityLevel {
        match (&self.auth_key, &self.priv_key) {
            (Some(_), Some(_)) => SecurityLevel::AuthPriv,
            (Some(_), None) => SecurityLevel::AuthNoPriv,
            _ => SecurityLevel::NoAuthNoPriv,
        }
    }
}

/// Users registered with the local engine.
#[derive(Debug, Default, Clone)]
pub struct UsmUserTable {
    users: HashMap<(Bytes, Bytes), UsmUser>,
}

impl UsmUserTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user under (name, engine id), replacing any previous entry.
    pub fn add(&mut self, engine_id: Bytes, user: UsmUser) {
        self.users.insert((user.name.clone(), engine_id), user);
    }

    pub fn get(&self, name: &[u8], engine_id: &[u8]) -> Option<&UsmUser> {
        self.users
            .get(&(Bytes::copy_from_slice(name), Bytes::copy_from_slice(engine_id)))
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn users(&self) -> impl Iterator<Item = &UsmUser> {
        self.users.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_levels() {
        let engine = b"engine";
        let none = UsmUser::new("guest", engine, None, Some((PrivProtocol::Des, b"x")));
        assert_eq!(none.max_level(), SecurityLevel::NoAuthNoPriv);
        assert!(none.priv_key.is_none());

        let auth = UsmUser::new("ops", engine, Some((AuthProtocol::Sha1, b"authpass")), None);
        assert_eq!(auth.max_level(), SecurityLevel::AuthNoPriv);

        let full = UsmUser::new(
            "alice",
            engine,
            Some((AuthProtocol::Md5, b"authpass")),
            Some((PrivProtocol::Aes128, b"privpass")),
        );
        assert_eq!(full.max_level(), SecurityLevel::AuthPriv);
    }

    #[test]
    fn test_table_keyed_by_engine() {
        let mut table = UsmUserTable::new();
        let engine = Bytes::from_static(b"engine-a");
        table.add(engine.clone(), UsmUser::new("alice", &engine, None, None));
        assert!(table.get(b"alice", b"engine-a").is_some());
        assert!(table.get(b"alice", b"engine-b").is_none());
        assert_eq!(table.len(), 1);
    }
}
