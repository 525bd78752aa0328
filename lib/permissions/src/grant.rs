//! Permission grants and effective-grant resolution.
//!
//! A grant binds a grantee (user or group) to an ordered list of patterns.
//! A principal's effective grant set is the union of its direct grants and
//! the grants of every group it belongs to, direct grants first.

use crate::pattern::Pattern;
use serde::{Deserialize, Serialize};
use tollgate_core::{GroupId, PrincipalId};

/// The identity a grant is issued to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Grantee {
    /// A single user.
    User(PrincipalId),
    /// A group of users.
    Group(GroupId),
}

/// An ordered set of permission patterns granted to one grantee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionGrant {
    /// Who the patterns are granted to.
    pub grantee: Grantee,
    /// The granted patterns, in declaration order.
    pub patterns: Vec<Pattern>,
}

impl PermissionGrant {
    /// Creates a grant for a user.
    #[must_use]
    pub fn for_user(id: PrincipalId, patterns: Vec<Pattern>) -> Self {
        Self {
            grantee: Grantee::User(id),
            patterns,
        }
    }

    /// Creates a grant for a group.
    #[must_use]
    pub fn for_group(id: GroupId, patterns: Vec<Pattern>) -> Self {
        Self {
            grantee: Grantee::Group(id),
            patterns,
        }
    }
}

/// The requesting identity: a user plus its group memberships.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// The user ID.
    pub id: PrincipalId,
    /// Groups this principal belongs to.
    #[serde(default)]
    pub groups: Vec<GroupId>,
}

impl Principal {
    /// Creates a principal with no group memberships.
    #[must_use]
    pub fn user(id: PrincipalId) -> Self {
        Self {
            id,
            groups: Vec::new(),
        }
    }

    /// Adds a group membership.
    #[must_use]
    pub fn in_group(mut self, group: GroupId) -> Self {
        self.groups.push(group);
        self
    }
}

/// A set of grants, typically the grants configured on one connector.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GrantSet {
    grants: Vec<PermissionGrant>,
}

impl GrantSet {
    /// Creates a grant set from a list of grants.
    #[must_use]
    pub fn new(grants: Vec<PermissionGrant>) -> Self {
        Self { grants }
    }

    /// Returns the grants in declaration order.
    #[must_use]
    pub fn grants(&self) -> &[PermissionGrant] {
        &self.grants
    }

    /// Returns whether the set contains no grants.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }

    /// Iterates the patterns effective for a principal: direct grants first,
    /// then group grants, each in declaration order.
    pub fn effective_patterns<'a>(
        &'a self,
        principal: &'a Principal,
    ) -> impl Iterator<Item = &'a Pattern> {
        let direct = self.grants.iter().filter(move |grant| {
            matches!(grant.grantee, Grantee::User(id) if id == principal.id)
        });
        let via_groups = self.grants.iter().filter(move |grant| {
            matches!(grant.grantee, Grantee::Group(id) if principal.groups.contains(&id))
        });
        direct.chain(via_groups).flat_map(|grant| grant.patterns.iter())
    }

    /// Checks whether a candidate `resource:action:scope` string is permitted
    /// for the principal.
    ///
    /// A request is permitted iff at least one effective pattern matches.
    /// There is no deny-by-default override at this layer.
    #[must_use]
    pub fn permits(&self, principal: &Principal, candidate: &str) -> bool {
        self.effective_patterns(principal)
            .any(|pattern| pattern.matches(candidate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns(specs: &[&str]) -> Vec<Pattern> {
        specs
            .iter()
            .map(|s| Pattern::parse(*s).expect("pattern should parse"))
            .collect()
    }

    #[test]
    fn direct_grant_permits() {
        let user = PrincipalId::new();
        let set = GrantSet::new(vec![PermissionGrant::for_user(
            user,
            patterns(&["cache:*"]),
        )]);

        let principal = Principal::user(user);
        assert!(set.permits(&principal, "cache:read:user:1"));
        assert!(!set.permits(&principal, "database:query:orders"));
    }

    #[test]
    fn group_grant_permits_members_only() {
        let group = GroupId::new();
        let set = GrantSet::new(vec![PermissionGrant::for_group(
            group,
            patterns(&["database:query:*"]),
        )]);

        let member = Principal::user(PrincipalId::new()).in_group(group);
        let outsider = Principal::user(PrincipalId::new());

        assert!(set.permits(&member, "database:query:customers"));
        assert!(!set.permits(&outsider, "database:query:customers"));
    }

    #[test]
    fn effective_patterns_order_direct_then_groups() {
        let user = PrincipalId::new();
        let group = GroupId::new();
        let set = GrantSet::new(vec![
            PermissionGrant::for_group(group, patterns(&["group:pattern"])),
            PermissionGrant::for_user(user, patterns(&["direct:pattern"])),
        ]);

        let principal = Principal::user(user).in_group(group);
        let order: Vec<&str> = set
            .effective_patterns(&principal)
            .map(Pattern::as_str)
            .collect();
        assert_eq!(order, vec!["direct:pattern", "group:pattern"]);
    }

    #[test]
    fn any_matching_pattern_suffices() {
        let user = PrincipalId::new();
        let set = GrantSet::new(vec![PermissionGrant::for_user(
            user,
            patterns(&["database:query:orders", "cache:read:user:*"]),
        )]);

        let principal = Principal::user(user);
        assert!(set.permits(&principal, "cache:read:user:42"));
    }

    #[test]
    fn empty_set_permits_nothing() {
        let set = GrantSet::default();
        let principal = Principal::user(PrincipalId::new());
        assert!(set.is_empty());
        assert!(!set.permits(&principal, "cache:read"));
    }

    #[test]
    fn grant_set_serde_roundtrip() {
        let set = GrantSet::new(vec![PermissionGrant::for_user(
            PrincipalId::new(),
            patterns(&["cache:*", "database:query:customers"]),
        )]);

        let json = serde_json::to_string(&set).expect("serialize");
        let parsed: GrantSet = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(set, parsed);
    }
}
