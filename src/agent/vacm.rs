//! View-based Access Control Model (RFC 3415).
//!
//! Three tables decide whether a request may touch an OID:
//!
//! 1. **Security-to-group**: (securityModel, securityName) to group name.
//!    Communities and USM users are both security names.
//! 2. **Access**: (group, context, securityModel, securityLevel) to the
//!    read, write and notify view names.
//! 3. **Views**: named collections of included and excluded subtrees.
//!
//! The gateway keeps one view per right (see [`READ_VIEW`], [`WRITE_VIEW`],
//! [`NOTIFY_VIEW`]). The object tree adds a subtree to all three when the
//! first object under a new parent prefix is registered and removes it when
//! the last one goes, so views grow with prefixes rather than objects.
//!
//! ```rust
//! use snmp_gateway::agent::{AccessEntryBuilder, SecurityModel, VacmConfig, View};
//! use snmp_gateway::oid;
//!
//! let mut vacm = VacmConfig::new();
//! vacm.add_group("public", SecurityModel::V2c, "readers");
//! vacm.add_access(AccessEntryBuilder::new("readers").read_view("all").build());
//! vacm.add_view("all", View::new().include(oid!(1, 3, 6, 1, 4, 1, 99)));
//!
//! let entry = vacm
//!     .resolve(SecurityModel::V2c, b"public", b"", Default::default())
//!     .unwrap();
//! assert!(vacm.check_access(Some(&entry.read_view), &oid!(1, 3, 6, 1, 4, 1, 99, 1)));
//! assert!(!vacm.check_access(Some(&entry.write_view), &oid!(1, 3, 6, 1, 4, 1, 99, 1)));
//! ```

use std::collections::HashMap;

use bytes::Bytes;

use crate::message::SecurityLevel;
use crate::oid::Oid;

/// View holding every registered object family, for read access.
pub const READ_VIEW: &str = "gateway-read";
/// View holding every registered object family, for write access.
pub const WRITE_VIEW: &str = "gateway-write";
/// View holding every registered object family, for notifications.
pub const NOTIFY_VIEW: &str = "gateway-notify";

/// Security model identifiers (RFC 3411).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecurityModel {
    /// Wildcard, matches any model.
    Any = 0,
    V1 = 1,
    V2c = 2,
    /// SNMPv3 User-based Security Model.
    Usm = 3,
}

/// Context matching mode for access entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum ContextMatch {
    #[default]
    Exact,
    Prefix,
}

/// A named set of OID subtrees.
///
/// An OID is in the view when at least one included subtree contains it and
/// no excluded subtree does.
#[derive(Debug, Clone, Default)]
pub struct View {
    subtrees: Vec<ViewSubtree>,
}

impl View {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn include(mut self, oid: Oid) -> Self {
        self.add(oid, true);
        self
    }

    pub fn exclude(mut self, oid: Oid) -> Self {
        self.add(oid, false);
        self
    }

    /// Add a subtree in place; a subtree already present is left alone.
    pub fn add(&mut self, oid: Oid, included: bool) {
        if !self.subtrees.iter().any(|s| s.oid == oid && s.included == included) {
            self.subtrees.push(ViewSubtree { oid, included });
        }
    }

    /// Remove every entry for `oid`. Returns whether anything was removed.
    pub fn remove(&mut self, oid: &Oid) -> bool {
        let before = self.subtrees.len();
        self.subtrees.retain(|s| &s.oid != oid);
        self.subtrees.len() != before
    }

    pub fn contains(&self, oid: &Oid) -> bool {
        let mut included = false;
        for subtree in self.subtrees.iter().filter(|s| oid.starts_with(&s.oid)) {
            if !subtree.included {
                return false;
            }
            included = true;
        }
        included
    }

    pub fn subtrees(&self) -> &[ViewSubtree] {
        &self.subtrees
    }

    pub fn is_empty(&self) -> bool {
        self.subtrees.is_empty()
    }
}

/// One subtree of a [`View`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewSubtree {
    pub oid: Oid,
    /// Include (true) or exclude (false).
    pub included: bool,
}

/// Access table entry.
#[derive(Debug, Clone)]
pub struct VacmAccessEntry {
    pub group_name: Bytes,
    pub context_prefix: Bytes,
    /// Model the entry applies to, or `Any`.
    pub security_model: SecurityModel,
    /// Minimum level required.
    pub security_level: SecurityLevel,
    pub(crate) context_match: ContextMatch,
    /// Empty means no read access.
    pub read_view: Bytes,
    /// Empty means no write access.
    pub write_view: Bytes,
    /// Empty means the group receives no notifications.
    pub notify_view: Bytes,
}

/// Builder for [`VacmAccessEntry`].
pub struct AccessEntryBuilder {
    entry: VacmAccessEntry,
}

impl AccessEntryBuilder {
    pub fn new(group_name: impl Into<Bytes>) -> Self {
        Self {
            entry: VacmAccessEntry {
                group_name: group_name.into(),
                context_prefix: Bytes::new(),
                security_model: SecurityModel::Any,
                security_level: SecurityLevel::NoAuthNoPriv,
                context_match: ContextMatch::Exact,
                read_view: Bytes::new(),
                write_view: Bytes::new(),
                notify_view: Bytes::new(),
            },
        }
    }

    pub fn context_prefix(mut self, prefix: impl Into<Bytes>) -> Self {
        self.entry.context_prefix = prefix.into();
        self
    }

    /// Match the context prefix against the start of the request context.
    pub fn context_match_prefix(mut self) -> Self {
        self.entry.context_match = ContextMatch::Prefix;
        self
    }

    pub fn security_model(mut self, model: SecurityModel) -> Self {
        self.entry.security_model = model;
        self
    }

    pub fn security_level(mut self, level: SecurityLevel) -> Self {
        self.entry.security_level = level;
        self
    }

    pub fn read_view(mut self, view: impl Into<Bytes>) -> Self {
        self.entry.read_view = view.into();
        self
    }

    pub fn write_view(mut self, view: impl Into<Bytes>) -> Self {
        self.entry.write_view = view.into();
        self
    }

    pub fn notify_view(mut self, view: impl Into<Bytes>) -> Self {
        self.entry.notify_view = view.into();
        self
    }

    pub fn build(self) -> VacmAccessEntry {
        self.entry
    }
}

/// The three VACM tables.
#[derive(Debug, Clone, Default)]
pub struct VacmConfig {
    security_to_group: HashMap<(SecurityModel, Bytes), Bytes>,
    access_entries: Vec<VacmAccessEntry>,
    views: HashMap<Bytes, View>,
}

impl VacmConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_group(
        &mut self,
        security_name: impl Into<Bytes>,
        security_model: SecurityModel,
        group_name: impl Into<Bytes>,
    ) {
        self.security_to_group
            .insert((security_model, security_name.into()), group_name.into());
    }

    pub fn add_access(&mut self, entry: VacmAccessEntry) {
        self.access_entries.push(entry);
    }

    pub fn add_view(&mut self, name: impl Into<Bytes>, view: View) {
        self.views.insert(name.into(), view);
    }

    pub fn view(&self, name: &[u8]) -> Option<&View> {
        self.views.get(name)
    }

    /// Include `oid` in the named view, creating the view if needed.
    pub fn include_subtree(&mut self, name: &str, oid: Oid) {
        self.views
            .entry(Bytes::copy_from_slice(name.as_bytes()))
            .or_default()
            .add(oid, true);
    }

    pub fn remove_subtree(&mut self, name: &str, oid: &Oid) -> bool {
        self.views
            .get_mut(name.as_bytes())
            .is_some_and(|view| view.remove(oid))
    }

    /// Group for a security name, falling back to the `Any` model.
    pub fn get_group(&self, model: SecurityModel, name: &[u8]) -> Option<&Bytes> {
        let name = Bytes::copy_from_slice(name);
        self.security_to_group
            .get(&(model, name.clone()))
            .or_else(|| self.security_to_group.get(&(SecurityModel::Any, name)))
    }

    /// Best access entry per the RFC 3415 preference order: specific model
    /// over `Any`, exact context over prefix, longer prefix, higher level.
    pub fn get_access(
        &self,
        group: &[u8],
        context: &[u8],
        model: SecurityModel,
        level: SecurityLevel,
    ) -> Option<&VacmAccessEntry> {
        self.access_entries
            .iter()
            .filter(|e| {
                e.group_name.as_ref() == group
                    && context_matches(&e.context_prefix, context, e.context_match)
                    && (e.security_model == model || e.security_model == SecurityModel::Any)
                    && level >= e.security_level
            })
            .max_by_key(|e| {
                (
                    e.security_model == model,
                    e.context_match == ContextMatch::Exact,
                    e.context_prefix.len(),
                    e.security_level,
                )
            })
    }

    /// Group lookup followed by access lookup.
    pub fn resolve(
        &self,
        model: SecurityModel,
        name: &[u8],
        context: &[u8],
        level: SecurityLevel,
    ) -> Option<&VacmAccessEntry> {
        let group = self.get_group(model, name)?;
        self.get_access(group, context, model, level)
    }

    /// Whether `oid` is in the named view. No view name means no access.
    pub fn check_access(&self, view_name: Option<&Bytes>, oid: &Oid) -> bool {
        view_name
            .filter(|name| !name.is_empty())
            .and_then(|name| self.views.get(name))
            .is_some_and(|view| view.contains(oid))
    }
}

fn context_matches(prefix: &[u8], context: &[u8], mode: ContextMatch) -> bool {
    match mode {
        ContextMatch::Exact => prefix == context,
        ContextMatch::Prefix => context.starts_with(prefix),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oid;

    #[test]
    fn test_view_include_exclude() {
        let view = View::new()
            .include(oid!(1, 3, 6, 1, 4, 1, 99))
            .exclude(oid!(1, 3, 6, 1, 4, 1, 99, 7));

        assert!(view.contains(&oid!(1, 3, 6, 1, 4, 1, 99)));
        assert!(view.contains(&oid!(1, 3, 6, 1, 4, 1, 99, 1, 0)));
        assert!(!view.contains(&oid!(1, 3, 6, 1, 4, 1, 99, 7, 1)));
        assert!(!view.contains(&oid!(1, 3, 6, 1, 4, 1, 98)));
    }

    #[test]
    fn test_runtime_subtrees() {
        let mut config = VacmConfig::new();
        config.include_subtree(READ_VIEW, oid!(1, 3, 6, 1, 4, 1, 99));
        config.include_subtree(READ_VIEW, oid!(1, 3, 6, 1, 4, 1, 99));
        assert_eq!(config.view(READ_VIEW.as_bytes()).unwrap().subtrees().len(), 1);

        let read = Bytes::from_static(READ_VIEW.as_bytes());
        assert!(config.check_access(Some(&read), &oid!(1, 3, 6, 1, 4, 1, 99, 2)));
        assert!(config.remove_subtree(READ_VIEW, &oid!(1, 3, 6, 1, 4, 1, 99)));
        assert!(!config.check_access(Some(&read), &oid!(1, 3, 6, 1, 4, 1, 99, 2)));
        assert!(!config.remove_subtree(WRITE_VIEW, &oid!(1, 3, 6, 1, 4, 1, 99)));
    }

    #[test]
    fn test_group_lookup_falls_back_to_any() {
        let mut config = VacmConfig::new();
        config.add_group("public", SecurityModel::V2c, "readers");
        config.add_group("ops", SecurityModel::Any, "operators");

        assert_eq!(
            config.get_group(SecurityModel::V2c, b"public"),
            Some(&Bytes::from_static(b"readers"))
        );
        assert_eq!(config.get_group(SecurityModel::V1, b"public"), None);
        assert_eq!(
            config.get_group(SecurityModel::Usm, b"ops"),
            Some(&Bytes::from_static(b"operators"))
        );
    }

    #[test]
    fn test_access_requires_level() {
        let mut config = VacmConfig::new();
        config.add_access(
            AccessEntryBuilder::new("admins")
                .security_model(SecurityModel::Usm)
                .security_level(SecurityLevel::AuthPriv)
                .read_view("all")
                .build(),
        );
        assert!(
            config
                .get_access(b"admins", b"", SecurityModel::Usm, SecurityLevel::AuthNoPriv)
                .is_none()
        );
        assert!(
            config
                .get_access(b"admins", b"", SecurityModel::Usm, SecurityLevel::AuthPriv)
                .is_some()
        );
    }

    #[test]
    fn test_access_preference_order() {
        let mut config = VacmConfig::new();
        config.add_access(
            AccessEntryBuilder::new("g")
                .security_level(SecurityLevel::AuthPriv)
                .read_view("any-model")
                .build(),
        );
        config.add_access(
            AccessEntryBuilder::new("g")
                .security_model(SecurityModel::Usm)
                .context_prefix("ctx")
                .context_match_prefix()
                .read_view("prefix")
                .build(),
        );
        config.add_access(
            AccessEntryBuilder::new("g")
                .security_model(SecurityModel::Usm)
                .context_prefix("ctx-a")
                .read_view("exact")
                .build(),
        );

        let pick = |context: &[u8]| {
            config
                .get_access(b"g", context, SecurityModel::Usm, SecurityLevel::AuthPriv)
                .map(|e| e.read_view.clone())
        };
        assert_eq!(pick(b"ctx-a"), Some(Bytes::from_static(b"exact")));
        assert_eq!(pick(b"ctx-b"), Some(Bytes::from_static(b"prefix")));
        assert_eq!(pick(b""), Some(Bytes::from_static(b"any-model")));
    }

    #[test]
    fn test_check_access_without_view() {
        let mut config = VacmConfig::new();
        config.add_view("all", View::new().include(oid!(1, 3, 6, 1)));
        let oid = oid!(1, 3, 6, 1, 2, 1, 1, 0);

        assert!(config.check_access(Some(&Bytes::from_static(b"all")), &oid));
        assert!(!config.check_access(Some(&Bytes::new()), &oid));
        assert!(!config.check_access(None, &oid));
        assert!(!config.check_access(Some(&Bytes::from_static(b"missing")), &oid));
    }
}
