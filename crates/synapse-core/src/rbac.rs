//! Role-based access control.
//!
//! A permission check is a single dictionary lookup from `(resource, action)`
//! to the set of roles allowed to perform it. Admin bypasses the lookup.

use std::collections::{BTreeSet, HashMap};

use crate::entities::PermissionGrant;
use crate::enums::{Action, Resource, Role};

/// `(resource, action)` → allowed roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionMatrix {
    entries: HashMap<(Resource, Action), BTreeSet<Role>>,
}

const EVERYONE: &[Role] = &Role::ALL;
const EXECUTIVES: &[Role] = &[
    Role::TestExecutive,
    Role::ReportOwnerExecutive,
    Role::DataExecutive,
];

/// Built-in matrix. Admin is implicit and never listed.
const DEFAULT_GRANTS: &[(Resource, Action, &[Role])] = &[
    (Resource::Cycle, Action::Create, &[Role::TestExecutive]),
    (Resource::Cycle, Action::Read, EVERYONE),
    (Resource::Cycle, Action::Update, &[Role::TestExecutive]),
    (Resource::Cycle, Action::Complete, &[Role::TestExecutive]),
    (Resource::Cycle, Action::Assign, &[Role::TestExecutive]),
    (Resource::Report, Action::Create, &[Role::TestExecutive, Role::ReportOwner]),
    (Resource::Report, Action::Read, EVERYONE),
    (Resource::Report, Action::Update, &[Role::TestExecutive, Role::ReportOwner]),
    (Resource::Attribute, Action::Create, &[Role::Tester, Role::TestExecutive]),
    (Resource::Attribute, Action::Read, EVERYONE),
    (Resource::Attribute, Action::Update, &[Role::Tester, Role::TestExecutive]),
    (Resource::Workflow, Action::Read, EVERYONE),
    (Resource::Workflow, Action::Start, &[Role::Tester, Role::TestExecutive]),
    (
        Resource::Workflow,
        Action::Complete,
        &[
            Role::Tester,
            Role::TestExecutive,
            Role::ReportOwner,
            Role::ReportOwnerExecutive,
            Role::DataOwner,
            Role::DataExecutive,
        ],
    ),
    (Resource::Workflow, Action::Update, &[Role::Tester, Role::TestExecutive]),
    (Resource::Workflow, Action::Approve, &[Role::TestExecutive]),
    (
        Resource::Assignment,
        Action::Create,
        &[
            Role::TestExecutive,
            Role::Tester,
            Role::ReportOwner,
            Role::ReportOwnerExecutive,
            Role::DataExecutive,
        ],
    ),
    (Resource::Assignment, Action::Read, EVERYONE),
    (Resource::Assignment, Action::Update, EVERYONE),
    (
        Resource::Assignment,
        Action::Assign,
        &[
            Role::TestExecutive,
            Role::Tester,
            Role::ReportOwnerExecutive,
            Role::DataExecutive,
        ],
    ),
    (Resource::Observation, Action::Create, &[Role::Tester, Role::TestExecutive]),
    (Resource::Observation, Action::Read, EVERYONE),
    (Resource::Observation, Action::Update, &[Role::Tester, Role::TestExecutive]),
    (
        Resource::Observation,
        Action::Approve,
        &[Role::ReportOwner, Role::ReportOwnerExecutive],
    ),
    (Resource::Audit, Action::Read, EXECUTIVES),
    (Resource::Sla, Action::Read, EXECUTIVES),
    (Resource::Sla, Action::Update, &[Role::TestExecutive]),
    (Resource::User, Action::Read, EVERYONE),
    (Resource::Permission, Action::Read, &[Role::TestExecutive]),
];

impl Default for PermissionMatrix {
    fn default() -> Self {
        let mut matrix = Self::empty();
        for (resource, action, roles) in DEFAULT_GRANTS {
            for role in *roles {
                matrix.grant(*resource, *action, *role);
            }
        }
        matrix
    }
}

impl PermissionMatrix {
    /// A matrix with no grants. Only admin passes `allows`.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Whether `role` may perform `action` on `resource`.
    #[must_use]
    pub fn allows(&self, role: Role, resource: Resource, action: Action) -> bool {
        role == Role::Admin
            || self
                .entries
                .get(&(resource, action))
                .is_some_and(|roles| roles.contains(&role))
    }

    /// Returns `true` if the grant was newly added.
    pub fn grant(&mut self, resource: Resource, action: Action, role: Role) -> bool {
        self.entries
            .entry((resource, action))
            .or_default()
            .insert(role)
    }

    /// Returns `true` if the grant existed.
    pub fn revoke(&mut self, resource: Resource, action: Action, role: Role) -> bool {
        let Some(roles) = self.entries.get_mut(&(resource, action)) else {
            return false;
        };
        let removed = roles.remove(&role);
        if roles.is_empty() {
            self.entries.remove(&(resource, action));
        }
        removed
    }

    /// Roles allowed for `(resource, action)`, admin excluded.
    #[must_use]
    pub fn roles_for(&self, resource: Resource, action: Action) -> Vec<Role> {
        self.entries
            .get(&(resource, action))
            .map(|roles| roles.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Every grant, sorted by resource, action, then role.
    #[must_use]
    pub fn grants(&self) -> Vec<PermissionGrant> {
        let mut out: Vec<PermissionGrant> = self
            .entries
            .iter()
            .flat_map(|((resource, action), roles)| {
                roles.iter().map(|role| PermissionGrant {
                    resource: *resource,
                    action: *action,
                    role: *role,
                })
            })
            .collect();
        out.sort();
        out
    }
}

impl FromIterator<PermissionGrant> for PermissionMatrix {
    fn from_iter<I: IntoIterator<Item = PermissionGrant>>(iter: I) -> Self {
        let mut matrix = Self::empty();
        for g in iter {
            matrix.grant(g.resource, g.action, g.role);
        }
        matrix
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Role::Tester, Resource::Workflow, Action::Start, true)]
    #[case(Role::TestExecutive, Resource::Workflow, Action::Start, true)]
    #[case(Role::DataOwner, Resource::Workflow, Action::Start, false)]
    #[case(Role::ReportOwner, Resource::Observation, Action::Approve, true)]
    #[case(Role::Tester, Resource::Observation, Action::Approve, false)]
    #[case(Role::TestExecutive, Resource::Permission, Action::Update, false)]
    #[case(Role::Admin, Resource::Permission, Action::Update, true)]
    fn default_matrix(
        #[case] role: Role,
        #[case] resource: Resource,
        #[case] action: Action,
        #[case] expected: bool,
    ) {
        assert_eq!(
            PermissionMatrix::default().allows(role, resource, action),
            expected
        );
    }

    #[test]
    fn admin_is_never_listed() {
        assert!(
            PermissionMatrix::default()
                .grants()
                .iter()
                .all(|g| g.role != Role::Admin)
        );
    }

    #[test]
    fn grant_and_revoke() {
        let mut m = PermissionMatrix::empty();
        assert!(!m.allows(Role::DataOwner, Resource::Sla, Action::Read));
        assert!(m.grant(Resource::Sla, Action::Read, Role::DataOwner));
        assert!(!m.grant(Resource::Sla, Action::Read, Role::DataOwner));
        assert!(m.allows(Role::DataOwner, Resource::Sla, Action::Read));
        assert!(m.revoke(Resource::Sla, Action::Read, Role::DataOwner));
        assert!(!m.revoke(Resource::Sla, Action::Read, Role::DataOwner));
        assert!(m.grants().is_empty());
    }

    #[test]
    fn rebuild_from_grants() {
        let original = PermissionMatrix::default();
        let rebuilt: PermissionMatrix = original.grants().into_iter().collect();
        assert_eq!(rebuilt, original);
    }
}
