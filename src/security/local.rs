//! Security configuration from flat key/value parameters.
//!
//! ```text
//! snmpv3-groups = ops, traps
//! ops-security-level = authPriv
//! ops-access-rights = read, write, notify
//! ops-users = alice
//! alice-auth-protocol = SHA
//! alice-password = alicepass
//! alice-privacy-protocol = AES
//! alice-privacy-key = alicekey
//! ```
//!
//! A group without `-security-level` or a user without `-auth-protocol` is
//! skipped. Present but unparseable values are configuration errors.

use std::collections::HashMap;

use super::{AccessRights, SecurityConfiguration, SecurityGroup, SecurityUser};
use crate::error::ConfigError;
use crate::message::SecurityLevel;
use crate::v3::{AuthProtocol, PrivProtocol};

/// Comma separated group names; its presence selects local sourcing.
pub const GROUPS_KEY: &str = "snmpv3-groups";

/// Value of `<user>-auth-protocol` for users without authentication.
const NO_AUTH: &str = "none";

fn list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn lookup<'a>(params: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    params.get(key).map(|v| v.trim())
}

fn parse<T>(key: String, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|err: T::Err| ConfigError::invalid(key, value, err))
}

impl SecurityConfiguration {
    /// Build from `snmpv3-groups` and the per-group and per-user keys.
    pub fn from_local(params: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let groups = lookup(params, GROUPS_KEY).ok_or(ConfigError::Missing(GROUPS_KEY))?;
        let mut result = Vec::new();
        for name in list(groups) {
            if let Some(group) = local_group(params, name)? {
                result.push(group);
            }
        }
        Ok(Self::new(result))
    }
}

fn local_group(
    params: &HashMap<String, String>,
    name: &str,
) -> Result<Option<SecurityGroup>, ConfigError> {
    let level_key = format!("{}-security-level", name);
    let Some(level) = lookup(params, &level_key) else {
        tracing::debug!(group = %name, "group has no security level, skipped");
        return Ok(None);
    };
    let level: SecurityLevel = parse(level_key, level)?;

    let rights_key = format!("{}-access-rights", name);
    let rights = match lookup(params, &rights_key) {
        Some(value) => parse(rights_key, value)?,
        None => AccessRights::empty(),
    };

    let mut group = SecurityGroup::new(name, level, rights);
    if let Some(users) = lookup(params, &format!("{}-users", name)) {
        for user in list(users) {
            if let Some(user) = local_user(params, user)? {
                group.users.push(user);
            }
        }
    }
    Ok(Some(group))
}

fn local_user(
    params: &HashMap<String, String>,
    name: &str,
) -> Result<Option<SecurityUser>, ConfigError> {
    let auth_key = format!("{}-auth-protocol", name);
    let Some(auth) = lookup(params, &auth_key) else {
        tracing::debug!(user = %name, "user has no authentication protocol, skipped");
        return Ok(None);
    };

    let mut user = SecurityUser::new(name);
    if !auth.eq_ignore_ascii_case(NO_AUTH) {
        let protocol: AuthProtocol = parse(auth_key, auth)?;
        let password = lookup(params, &format!("{}-password", name)).unwrap_or_default();
        user = user.with_auth(protocol, password);

        if let Some(privacy) = lookup(params, &format!("{}-privacy-protocol", name)) {
            let protocol: PrivProtocol = parse(format!("{}-privacy-protocol", name), privacy)?;
            let key = lookup(params, &format!("{}-privacy-key", name)).unwrap_or(password);
            user = user.with_privacy(protocol, key);
        }
    }
    Ok(Some(user))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_local_groups_and_users() {
        let config = SecurityConfiguration::from_local(&params(&[
            ("snmpv3-groups", "ops, admins"),
            ("ops-security-level", "authNoPriv"),
            ("ops-access-rights", "read,notify"),
            ("ops-users", "alice"),
            ("alice-auth-protocol", "SHA"),
            ("alice-password", "alicepass"),
            ("admins-security-level", "authPriv"),
            ("admins-access-rights", "read,write"),
            ("admins-users", "root"),
            ("root-auth-protocol", "SHA-256"),
            ("root-password", "rootpass"),
            ("root-privacy-protocol", "AES"),
            ("root-privacy-key", "rootkey"),
        ]))
        .unwrap();

        let groups = config.groups();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].name, "ops");
        assert_eq!(groups[0].rights, AccessRights::READ | AccessRights::NOTIFY);
        assert_eq!(
            groups[0].users[0],
            SecurityUser::new("alice").with_auth(AuthProtocol::Sha1, "alicepass")
        );
        assert_eq!(groups[1].level, SecurityLevel::AuthPriv);
        assert_eq!(
            groups[1].users[0].privacy,
            Some((PrivProtocol::Aes128, "rootkey".to_string()))
        );
    }

    #[test]
    fn test_missing_mandatory_attributes_are_skipped() {
        let config = SecurityConfiguration::from_local(&params(&[
            ("snmpv3-groups", "ops,nolevel"),
            ("ops-security-level", "noAuthNoPriv"),
            ("ops-users", "alice,bob"),
            ("alice-auth-protocol", "none"),
        ]))
        .unwrap();

        assert_eq!(config.groups().len(), 1);
        let users = &config.groups()[0].users;
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].name, "alice");
        assert!(users[0].auth.is_none());
    }

    #[test]
    fn test_invalid_values_are_errors() {
        let err = SecurityConfiguration::from_local(&params(&[
            ("snmpv3-groups", "ops"),
            ("ops-security-level", "paranoid"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref key, .. } if key == "ops-security-level"));

        let err = SecurityConfiguration::from_local(&params(&[
            ("snmpv3-groups", "ops"),
            ("ops-security-level", "authNoPriv"),
            ("ops-users", "alice"),
            ("alice-auth-protocol", "CRC32"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }
}
