//! SNMPv3 security configuration: groups, users and access rights.
//!
//! The configuration is sourced either from flat local parameters
//! ([`SecurityConfiguration::from_local`]) or from a directory service
//! ([`SecurityConfiguration::from_directory`]); the two modes are mutually
//! exclusive. Once built it is immutable and installed into the agent in two
//! steps: users into the USM user table, then (user, group) pairs into VACM.

mod directory;
mod local;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;
use bytes::Bytes;

pub use directory::{
    Directory, DirectoryConnector, DirectoryEntry, DirectoryParams, GROUP_NAME_PLACEHOLDER,
    StaticDirectory,
};
pub use local::GROUPS_KEY;

use crate::agent::{
    AccessEntryBuilder, NOTIFY_VIEW, READ_VIEW, SecurityModel, VacmConfig, WRITE_VIEW,
};
use crate::error::ConfigError;
use crate::message::SecurityLevel;
use crate::v3::{AuthProtocol, PrivProtocol, UsmUser, UsmUserTable};

bitflags! {
    /// Rights a group holds over the gateway's objects.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct AccessRights: u8 {
        const READ = 0b001;
        const WRITE = 0b010;
        const NOTIFY = 0b100;
    }
}

impl FromStr for AccessRights {
    type Err = String;

    /// Comma or whitespace separated names: `read`, `write`, `notify`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.split(|c: char| c == ',' || c.is_whitespace())
            .filter(|part| !part.is_empty())
            .try_fold(AccessRights::empty(), |rights, part| {
                let right = match part.to_ascii_lowercase().as_str() {
                    "read" => AccessRights::READ,
                    "write" => AccessRights::WRITE,
                    "notify" => AccessRights::NOTIFY,
                    _ => return Err(format!("unknown access right '{}'", part)),
                };
                Ok(rights | right)
            })
    }
}

impl fmt::Display for AccessRights {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = [
            (AccessRights::READ, "read"),
            (AccessRights::WRITE, "write"),
            (AccessRights::NOTIFY, "notify"),
        ]
        .into_iter()
        .filter(|(right, _)| self.contains(*right))
        .map(|(_, name)| name)
        .collect();
        f.write_str(&names.join(","))
    }
}

/// A USM user and its credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct SecurityUser {
    pub name: String,
    pub auth: Option<(AuthProtocol, String)>,
    pub privacy: Option<(PrivProtocol, String)>,
}

impl SecurityUser {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            auth: None,
            privacy: None,
        }
    }

    pub fn with_auth(mut self, protocol: AuthProtocol, password: impl Into<String>) -> Self {
        self.auth = Some((protocol, password.into()));
        self
    }

    pub fn with_privacy(mut self, protocol: PrivProtocol, key: impl Into<String>) -> Self {
        self.privacy = Some((protocol, key.into()));
        self
    }

    /// Keys localized to `engine_id`.
    pub fn localize(&self, engine_id: &[u8]) -> UsmUser {
        UsmUser::new(
            Bytes::copy_from_slice(self.name.as_bytes()),
            engine_id,
            self.auth.as_ref().map(|(p, pw)| (*p, pw.as_bytes())),
            self.privacy.as_ref().map(|(p, key)| (*p, key.as_bytes())),
        )
    }
}

impl fmt::Debug for SecurityUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityUser")
            .field("name", &self.name)
            .field("auth", &self.auth.as_ref().map(|(p, _)| p))
            .field("privacy", &self.privacy.as_ref().map(|(p, _)| p))
            .finish()
    }
}

/// A named group: minimum security level, rights and member users.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityGroup {
    pub name: String,
    pub level: SecurityLevel,
    pub rights: AccessRights,
    pub users: Vec<SecurityUser>,
}

impl SecurityGroup {
    pub fn new(name: impl Into<String>, level: SecurityLevel, rights: AccessRights) -> Self {
        Self {
            name: name.into(),
            level,
            rights,
            users: Vec::new(),
        }
    }

    pub fn with_user(mut self, user: SecurityUser) -> Self {
        self.users.push(user);
        self
    }
}

/// The complete set of SNMPv3 groups and users.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecurityConfiguration {
    groups: Vec<SecurityGroup>,
}

impl SecurityConfiguration {
    pub fn new(groups: Vec<SecurityGroup>) -> Self {
        Self { groups }
    }

    /// Pick the sourcing mode from the parameters present.
    ///
    /// Local keys and directory keys together are rejected; neither yields
    /// an empty configuration (community access only).
    pub async fn from_params(
        params: &HashMap<String, String>,
        connector: Option<&dyn DirectoryConnector>,
    ) -> Result<Self, ConfigError> {
        let local = params.contains_key(GROUPS_KEY);
        let directory = DirectoryParams::from_params(params)?;
        match (local, directory, connector) {
            (true, Some(_), _) => Err(ConfigError::invalid(
                GROUPS_KEY,
                params.get(GROUPS_KEY).cloned().unwrap_or_default(),
                "local and directory security configuration are mutually exclusive",
            )),
            (true, None, _) => Self::from_local(params),
            (false, Some(directory), Some(connector)) => {
                Self::from_directory(connector, &directory).await
            }
            (false, Some(directory), None) => Err(ConfigError::Directory(format!(
                "no directory connector available for {}",
                directory.uri
            ))),
            (false, None, _) => Ok(Self::default()),
        }
    }

    pub fn groups(&self) -> &[SecurityGroup] {
        &self.groups
    }

    pub fn is_empty(&self) -> bool {
        self.groups.iter().all(|g| g.users.is_empty())
    }

    /// Every (group, user) pair.
    pub fn users(&self) -> impl Iterator<Item = (&SecurityGroup, &SecurityUser)> {
        self.groups
            .iter()
            .flat_map(|group| group.users.iter().map(move |user| (group, user)))
    }

    /// Users whose group holds all of `rights`.
    pub fn users_with(
        &self,
        rights: AccessRights,
    ) -> impl Iterator<Item = (&SecurityGroup, &SecurityUser)> {
        self.users()
            .filter(move |(group, _)| group.rights.contains(rights))
    }

    /// Install into the agent's USM user table and VACM.
    ///
    /// Users are keyed by (name, `engine_id`). Each group gets one USM access
    /// entry at its security level, granting only the views its rights name.
    pub fn install(&self, engine_id: &Bytes, users: &mut UsmUserTable, vacm: &mut VacmConfig) {
        for (_, user) in self.users() {
            users.add(engine_id.clone(), user.localize(engine_id));
        }
        for group in &self.groups {
            for user in &group.users {
                vacm.add_group(
                    Bytes::copy_from_slice(user.name.as_bytes()),
                    SecurityModel::Usm,
                    Bytes::copy_from_slice(group.name.as_bytes()),
                );
            }
            vacm.add_access(access_entry(group));
            tracing::debug!(
                group = %group.name,
                level = %group.level,
                rights = %group.rights,
                users = group.users.len(),
                "installed security group"
            );
        }
    }
}

fn access_entry(group: &SecurityGroup) -> crate::agent::VacmAccessEntry {
    let mut entry = AccessEntryBuilder::new(Bytes::copy_from_slice(group.name.as_bytes()))
        .security_model(SecurityModel::Usm)
        .security_level(group.level);
    if group.rights.contains(AccessRights::READ) {
        entry = entry.read_view(READ_VIEW);
    }
    if group.rights.contains(AccessRights::WRITE) {
        entry = entry.write_view(WRITE_VIEW);
    }
    if group.rights.contains(AccessRights::NOTIFY) {
        entry = entry.notify_view(NOTIFY_VIEW);
    }
    entry.build()
}
