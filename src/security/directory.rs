//! Security configuration from a directory service.
//!
//! Group entries are found with the configured group filter, where
//! [`GROUP_NAME_PLACEHOLDER`] stands for each configured group name. Their
//! members are found with the user filter, using the same placeholder. The
//! directory client itself is supplied by the embedding application through
//! [`DirectoryConnector`]; [`StaticDirectory`] is an in-memory implementation.

use std::collections::HashMap;

use super::{AccessRights, SecurityConfiguration, SecurityGroup, SecurityUser};
use crate::error::ConfigError;
use crate::handler::BoxFuture;
use crate::message::SecurityLevel;
use crate::v3::{AuthProtocol, PrivProtocol};

/// Replaced by the group name in group and user search filters.
pub const GROUP_NAME_PLACEHOLDER: &str = "$GROUPNAME$";

const URI_KEY: &str = "ldap-uri";
const GROUPS_KEY: &str = "ldap-groups";

const DEFAULT_GROUP_FILTER: &str = "(&(objectClass=snmpGroup)(cn=$GROUPNAME$))";
const DEFAULT_USER_FILTER: &str = "(&(objectClass=snmpUser)(memberOf=$GROUPNAME$))";

/// Connection and search parameters.
#[derive(Clone, PartialEq, Eq)]
pub struct DirectoryParams {
    pub uri: String,
    pub user: Option<String>,
    pub password: Option<String>,
    pub auth_type: String,
    pub base_dn: String,
    pub groups: Vec<String>,
    pub group_filter: String,
    pub user_filter: String,
}

impl DirectoryParams {
    /// `None` when `ldap-uri` is absent.
    pub fn from_params(params: &HashMap<String, String>) -> Result<Option<Self>, ConfigError> {
        let get = |key: &str| params.get(key).map(|v| v.trim().to_string());
        let Some(uri) = get(URI_KEY) else {
            return Ok(None);
        };
        if uri.is_empty() {
            return Err(ConfigError::invalid(URI_KEY, uri, "empty directory URI"));
        }
        let groups: Vec<String> = get(GROUPS_KEY)
            .ok_or(ConfigError::Missing(GROUPS_KEY))?
            .split(',')
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .map(String::from)
            .collect();

        Ok(Some(Self {
            uri,
            user: get("ldap-user"),
            password: get("ldap-password"),
            auth_type: get("ldap-auth-type").unwrap_or_else(|| "simple".to_string()),
            base_dn: get("ldap-base-dn").unwrap_or_default(),
            groups,
            group_filter: get("ldap-group-search-filter")
                .unwrap_or_else(|| DEFAULT_GROUP_FILTER.to_string()),
            user_filter: get("ldap-user-search-filter")
                .unwrap_or_else(|| DEFAULT_USER_FILTER.to_string()),
        }))
    }

    fn group_filter(&self, group: &str) -> String {
        self.group_filter.replace(GROUP_NAME_PLACEHOLDER, group)
    }

    fn user_filter(&self, group: &str) -> String {
        self.user_filter.replace(GROUP_NAME_PLACEHOLDER, group)
    }
}

impl std::fmt::Debug for DirectoryParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryParams")
            .field("uri", &self.uri)
            .field("user", &self.user)
            .field("auth_type", &self.auth_type)
            .field("base_dn", &self.base_dn)
            .field("groups", &self.groups)
            .finish_non_exhaustive()
    }
}

/// One search result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub dn: String,
    pub attributes: HashMap<String, Vec<String>>,
}

impl DirectoryEntry {
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attributes: HashMap::new(),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes
            .entry(name.into())
            .or_default()
            .push(value.into());
        self
    }

    /// First value of an attribute, matched case-insensitively.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .and_then(|(_, values)| values.first())
            .map(String::as_str)
    }

    fn has_value(&self, name: &str, value: &str) -> bool {
        self.attributes
            .iter()
            .filter(|(key, _)| key.eq_ignore_ascii_case(name))
            .flat_map(|(_, values)| values)
            .any(|v| v.eq_ignore_ascii_case(value))
    }
}

/// An open directory session.
pub trait Directory: Send + Sync {
    fn search<'a>(
        &'a self,
        base: &'a str,
        filter: &'a str,
    ) -> BoxFuture<'a, Result<Vec<DirectoryEntry>, ConfigError>>;
}

/// Opens directory sessions.
pub trait DirectoryConnector: Send + Sync {
    fn connect<'a>(
        &'a self,
        params: &'a DirectoryParams,
    ) -> BoxFuture<'a, Result<Box<dyn Directory>, ConfigError>>;
}

/// In-memory directory.
///
/// Understands equality terms `(attr=value)`, presence terms `(attr=*)` and
/// their conjunction `(&...)`. The base DN is matched as a suffix.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    entries: Vec<DirectoryEntry>,
}

impl StaticDirectory {
    pub fn new(entries: Vec<DirectoryEntry>) -> Self {
        Self { entries }
    }
}

impl Directory for StaticDirectory {
    fn search<'a>(
        &'a self,
        base: &'a str,
        filter: &'a str,
    ) -> BoxFuture<'a, Result<Vec<DirectoryEntry>, ConfigError>> {
        Box::pin(async move {
            let terms = parse_filter(filter)?;
            Ok(self
                .entries
                .iter()
                .filter(|e| {
                    base.is_empty()
                        || e.dn
                            .to_ascii_lowercase()
                            .ends_with(&base.to_ascii_lowercase())
                })
                .filter(|e| {
                    terms.iter().all(|(name, value)| match value {
                        None => e.attr(name).is_some(),
                        Some(value) => e.has_value(name, value),
                    })
                })
                .cloned()
                .collect())
        })
    }
}

impl DirectoryConnector for StaticDirectory {
    fn connect<'a>(
        &'a self,
        _params: &'a DirectoryParams,
    ) -> BoxFuture<'a, Result<Box<dyn Directory>, ConfigError>> {
        Box::pin(async move { Ok(Box::new(self.clone()) as Box<dyn Directory>) })
    }
}

/// Flatten a filter into `(attribute, Some(value) | None for presence)` terms.
fn parse_filter(filter: &str) -> Result<Vec<(String, Option<String>)>, ConfigError> {
    let malformed = || ConfigError::Directory(format!("unsupported search filter: {}", filter));
    let mut rest = filter.trim();
    if let Some(inner) = rest.strip_prefix("(&").and_then(|r| r.strip_suffix(')')) {
        rest = inner;
    }

    let mut terms = Vec::new();
    while !rest.is_empty() {
        let body = rest.strip_prefix('(').ok_or_else(malformed)?;
        let end = body.find(')').ok_or_else(malformed)?;
        let (name, value) = body[..end].split_once('=').ok_or_else(malformed)?;
        let name = name.trim();
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(malformed());
        }
        let value = (value != "*").then(|| value.to_string());
        terms.push((name.to_string(), value));
        rest = body[end + 1..].trim_start();
    }
    if terms.is_empty() {
        return Err(malformed());
    }
    Ok(terms)
}

impl SecurityConfiguration {
    /// Query the configured groups and their members.
    pub async fn from_directory(
        connector: &dyn DirectoryConnector,
        params: &DirectoryParams,
    ) -> Result<Self, ConfigError> {
        let directory = connector.connect(params).await?;
        tracing::debug!(
            directory.uri = %params.uri,
            groups = params.groups.len(),
            "querying directory for security configuration"
        );

        let mut groups = Vec::new();
        for name in &params.groups {
            let entries = directory
                .search(&params.base_dn, &params.group_filter(name))
                .await?;
            let Some(entry) = entries.first() else {
                tracing::warn!(group = %name, "group not found in directory");
                continue;
            };
            let Some(mut group) = directory_group(name, entry)? else {
                continue;
            };
            for entry in directory
                .search(&params.base_dn, &params.user_filter(name))
                .await?
            {
                if let Some(user) = directory_user(&entry)? {
                    group.users.push(user);
                }
            }
            groups.push(group);
        }
        Ok(Self::new(groups))
    }
}

fn directory_group(
    name: &str,
    entry: &DirectoryEntry,
) -> Result<Option<SecurityGroup>, ConfigError> {
    let Some(level) = entry.attr("snmpSecurityLevel") else {
        tracing::debug!(group = %name, "directory group has no security level, skipped");
        return Ok(None);
    };
    let level: SecurityLevel = level
        .parse()
        .map_err(|err| ConfigError::invalid("snmpSecurityLevel", level, err))?;
    let rights: AccessRights = match entry.attr("snmpAccessRights") {
        Some(rights) => rights
            .parse()
            .map_err(|err| ConfigError::invalid("snmpAccessRights", rights, err))?,
        None => AccessRights::empty(),
    };
    Ok(Some(SecurityGroup::new(
        entry.attr("cn").unwrap_or(name),
        level,
        rights,
    )))
}

fn directory_user(entry: &DirectoryEntry) -> Result<Option<SecurityUser>, ConfigError> {
    let Some(name) = entry.attr("uid") else {
        tracing::debug!(dn = %entry.dn, "directory user has no uid, skipped");
        return Ok(None);
    };
    let Some(auth) = entry.attr("snmpAuthProtocol") else {
        tracing::debug!(user = %name, "directory user has no authentication protocol, skipped");
        return Ok(None);
    };

    let mut user = SecurityUser::new(name);
    if !auth.eq_ignore_ascii_case("none") {
        let protocol: AuthProtocol = auth
            .parse()
            .map_err(|err| ConfigError::invalid("snmpAuthProtocol", auth, err))?;
        let password = entry.attr("userPassword").unwrap_or_default();
        user = user.with_auth(protocol, password);

        if let Some(privacy) = entry.attr("snmpPrivProtocol") {
            let protocol: PrivProtocol = privacy
                .parse()
                .map_err(|err| ConfigError::invalid("snmpPrivProtocol", privacy, err))?;
            user = user.with_privacy(protocol, entry.attr("snmpPrivKey").unwrap_or(password));
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

    fn directory() -> StaticDirectory {
        StaticDirectory::new(vec![
            DirectoryEntry::new("cn=ops,ou=groups,dc=example")
                .with("objectClass", "snmpGroup")
                .with("cn", "ops")
                .with("snmpSecurityLevel", "authPriv")
                .with("snmpAccessRights", "read,notify"),
            DirectoryEntry::new("cn=nolevel,ou=groups,dc=example")
                .with("objectClass", "snmpGroup")
                .with("cn", "nolevel"),
            DirectoryEntry::new("uid=alice,ou=users,dc=example")
                .with("objectClass", "snmpUser")
                .with("uid", "alice")
                .with("memberOf", "ops")
                .with("snmpAuthProtocol", "SHA")
                .with("userPassword", "alicepass")
                .with("snmpPrivProtocol", "AES")
                .with("snmpPrivKey", "alicekey"),
            DirectoryEntry::new("uid=bob,ou=users,dc=example")
                .with("objectClass", "snmpUser")
                .with("uid", "bob")
                .with("memberOf", "ops"),
        ])
    }

    #[test]
    fn test_params_require_groups() {
        assert_eq!(DirectoryParams::from_params(&HashMap::new()).unwrap(), None);
        let err = DirectoryParams::from_params(&params(&[("ldap-uri", "ldap://dir")])).unwrap_err();
        assert_eq!(err, ConfigError::Missing("ldap-groups"));

        let parsed = DirectoryParams::from_params(&params(&[
            ("ldap-uri", "ldap://dir"),
            ("ldap-groups", "ops, nolevel"),
            ("ldap-password", "secret"),
        ]))
        .unwrap()
        .unwrap();
        assert_eq!(parsed.groups, vec!["ops", "nolevel"]);
        assert_eq!(parsed.auth_type, "simple");
        assert!(!format!("{:?}", parsed).contains("secret"));
    }

    #[test]
    fn test_filter_parsing() {
        assert_eq!(
            parse_filter("(&(objectClass=snmpUser)(uid=*))").unwrap(),
            vec![
                ("objectClass".to_string(), Some("snmpUser".to_string())),
                ("uid".to_string(), None)
            ]
        );
        assert!(parse_filter("(|(a=b)").is_err());
        assert!(parse_filter("").is_err());
    }

    #[tokio::test]
    async fn test_from_directory() {
        let params = DirectoryParams::from_params(&params(&[
            ("ldap-uri", "ldap://dir"),
            ("ldap-base-dn", "dc=example"),
            ("ldap-groups", "ops,nolevel,missing"),
        ]))
        .unwrap()
        .unwrap();

        let config = SecurityConfiguration::from_directory(&directory(), &params)
            .await
            .unwrap();
        let groups = config.groups();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].name, "ops");
        assert_eq!(groups[0].level, SecurityLevel::AuthPriv);
        assert_eq!(groups[0].rights, AccessRights::READ | AccessRights::NOTIFY);
        assert_eq!(groups[0].users.len(), 1);
        assert_eq!(groups[0].users[0].name, "alice");
        assert_eq!(
            groups[0].users[0].privacy,
            Some((PrivProtocol::Aes128, "alicekey".to_string()))
        );
    }

    #[tokio::test]
    async fn test_from_params_selects_mode() {
        let both = params(&[
            ("snmpv3-groups", "ops"),
            ("ldap-uri", "ldap://dir"),
            ("ldap-groups", "ops"),
        ]);
        let dir = directory();
        let connector: &dyn DirectoryConnector = &dir;
        assert!(matches!(
            SecurityConfiguration::from_params(&both, Some(connector)).await,
            Err(ConfigError::Invalid { .. })
        ));

        let remote = params(&[("ldap-uri", "ldap://dir"), ("ldap-groups", "ops")]);
        assert!(matches!(
            SecurityConfiguration::from_params(&remote, None).await,
            Err(ConfigError::Directory(_))
        ));
        let config = SecurityConfiguration::from_params(&remote, Some(connector))
            .await
            .unwrap();
        assert_eq!(config.groups().len(), 1);

        let none = SecurityConfiguration::from_params(&HashMap::new(), None)
            .await
            .unwrap();
        assert!(none.is_empty());
    }
}
