use crate::*;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::RwLock;

/// Whoever is calling into the registry: an admin account, a service, an auditor.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct Principal(pub String);

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Principal {
    fn from(s: &str) -> Self {
        Principal(s.to_string())
    }
}

impl From<String> for Principal {
    fn from(s: String) -> Self {
        Principal(s)
    }
}

#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// May pause and resume any election
    Admin,

    /// May create, activate and tally elections
    ElectionManager,

    /// May record audits of tallied elections
    Auditor,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Role::Admin => "admin",
            Role::ElectionManager => "election_manager",
            Role::Auditor => "auditor",
        };
        write!(f, "{}", name)
    }
}

/// Capability check the registry consults before privileged transitions.
pub trait Authorizer: Send + Sync {
    fn has_role(&self, principal: &Principal, role: Role) -> bool;

    fn require(&self, principal: &Principal, role: Role) -> Result<(), Error> {
        if self.has_role(principal, role) {
            Ok(())
        } else {
            Err(Error::UnauthorizedAccess(principal.clone(), role))
        }
    }
}

/// In-memory role assignments.
#[derive(Debug, Default)]
pub struct RoleTable {
    grants: RwLock<HashMap<Principal, BTreeSet<Role>>>,
}

impl RoleTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(&self, principal: impl Into<Principal>, role: Role) {
        let principal = principal.into();
        info!("granting {} to {}", role, principal);
        let mut grants = match self.grants.write() {
            Ok(grants) => grants,
            Err(poisoned) => poisoned.into_inner(),
        };
        grants.entry(principal).or_default().insert(role);
    }

    pub fn revoke(&self, principal: &Principal, role: Role) {
        info!("revoking {} from {}", role, principal);
        let mut grants = match self.grants.write() {
            Ok(grants) => grants,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(roles) = grants.get_mut(principal) {
            roles.remove(&role);
        }
    }

    pub fn roles(&self, principal: &Principal) -> Vec<Role> {
        let grants = match self.grants.read() {
            Ok(grants) => grants,
            Err(poisoned) => poisoned.into_inner(),
        };
        grants
            .get(principal)
            .map(|roles| roles.iter().copied().collect())
            .unwrap_or_default()
    }
}

impl Authorizer for RoleTable {
    fn has_role(&self, principal: &Principal, role: Role) -> bool {
        // Each grant is a single insert, so a poisoned table is still consistent
        let grants = match self.grants.read() {
            Ok(grants) => grants,
            Err(poisoned) => poisoned.into_inner(),
        };
        grants
            .get(principal)
            .map(|roles| roles.contains(&role))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grant_and_revoke() {
        let table = RoleTable::new();
        let alice = Principal::from("alice");
        assert!(!table.has_role(&alice, Role::Admin));

        table.grant("alice", Role::Admin);
        table.grant("alice", Role::Auditor);
        assert!(table.has_role(&alice, Role::Admin));
        assert_eq!(table.roles(&alice), vec![Role::Admin, Role::Auditor]);
        table.require(&alice, Role::Auditor).unwrap();

        table.revoke(&alice, Role::Admin);
        assert!(!table.has_role(&alice, Role::Admin));
        assert!(matches!(
            table.require(&alice, Role::Admin),
            Err(Error::UnauthorizedAccess(p, Role::Admin)) if p == alice
        ));
    }

    #[test]
    fn poisoned_table_keeps_working() {
        use std::sync::Arc;
        use std::thread;

        let table = Arc::new(RoleTable::new());
        table.grant("bob", Role::Auditor);

        let holder = table.clone();
        let outcome = thread::spawn(move || {
            let _grants = holder.grants.write().unwrap();
            panic!("writer died holding the role table");
        })
        .join();
        assert!(outcome.is_err());
        assert!(table.grants.is_poisoned());

        let bob = Principal::from("bob");
        table.grant("bob", Role::Admin);
        assert!(table.has_role(&bob, Role::Admin));
        assert_eq!(table.roles(&bob), vec![Role::Admin, Role::Auditor]);

        table.revoke(&bob, Role::Auditor);
        assert!(!table.has_role(&bob, Role::Auditor));
        assert_eq!(table.roles(&bob), vec![Role::Admin]);
    }
}
