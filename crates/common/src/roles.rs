//! Closed set of user roles and the membership check used for authorization.

use serde::{Deserialize, Serialize};

/// A role a user may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Seller,
    Buyer,
}

impl Role {
    fn bit(self) -> u8 {
        match self {
            Role::Admin => 0b001,
            Role::Seller => 0b010,
            Role::Buyer => 0b100,
        }
    }
}

/// The set of roles held by one user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "Vec<Role>", into = "Vec<Role>")]
pub struct RoleSet(u8);

impl RoleSet {
    pub fn empty() -> Self {
        Self(0)
    }

    pub fn with(mut self, role: Role) -> Self {
        self.0 |= role.bit();
        self
    }

    pub fn contains(&self, role: Role) -> bool {
        self.0 & role.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Returns the roles in a stable order.
    pub fn roles(&self) -> Vec<Role> {
        [Role::Admin, Role::Seller, Role::Buyer]
            .into_iter()
            .filter(|role| self.contains(*role))
            .collect()
    }
}

impl FromIterator<Role> for RoleSet {
    fn from_iter<I: IntoIterator<Item = Role>>(iter: I) -> Self {
        iter.into_iter().fold(RoleSet::empty(), RoleSet::with)
    }
}

impl From<Vec<Role>> for RoleSet {
    fn from(roles: Vec<Role>) -> Self {
        roles.into_iter().collect()
    }
}

impl From<RoleSet> for Vec<Role> {
    fn from(set: RoleSet) -> Self {
        set.roles()
    }
}

/// Returns true if the actor holds at least one of the required roles.
///
/// An empty requirement admits everyone.
pub fn has_any_role(actor: &RoleSet, required: &[Role]) -> bool {
    required.is_empty() || required.iter().any(|role| actor.contains(*role))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_membership() {
        let set = RoleSet::empty().with(Role::Seller);
        assert!(set.contains(Role::Seller));
        assert!(!set.contains(Role::Admin));
        assert!(!set.is_empty());
        assert!(RoleSet::empty().is_empty());
    }

    #[test]
    fn test_has_any_role() {
        let seller: RoleSet = [Role::Seller].into_iter().collect();
        assert!(has_any_role(&seller, &[Role::Admin, Role::Seller]));
        assert!(!has_any_role(&seller, &[Role::Admin]));
        assert!(has_any_role(&RoleSet::empty(), &[]));
        assert!(!has_any_role(&RoleSet::empty(), &[Role::Buyer]));
    }

    #[test]
    fn test_serializes_as_list() {
        let set: RoleSet = [Role::Buyer, Role::Admin].into_iter().collect();
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, r#"["admin","buyer"]"#);

        let parsed: RoleSet = serde_json::from_str(r#"["seller"]"#).unwrap();
        assert!(parsed.contains(Role::Seller));
    }
}
