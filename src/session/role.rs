use serde::{Deserialize, Serialize};

use crate::error::RoleResolutionError;

/// Closed set of roles a club member can hold.
///
/// Every role check in the application goes through exhaustive matching on
/// this enum or through [`RoleSet::contains`]; there is no string-typed role
/// branching anywhere downstream of [`Role::parse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    President,
    Coach,
    Staff,
    Joueur,
    Parent,
}

impl Role {
    /// Parse the role string stored on the remote profile record.
    ///
    /// Matching is case-insensitive and accepts the legacy aliases still
    /// present in older profile records. Anything else is a
    /// [`RoleResolutionError::UnknownRole`], never a silent fallback.
    pub fn parse(raw: &str) -> Result<Self, RoleResolutionError> {
        match raw.trim().to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "president" | "président" => Ok(Role::President),
            "coach" | "entraineur" | "entraîneur" => Ok(Role::Coach),
            "staff" => Ok(Role::Staff),
            "joueur" | "player" => Ok(Role::Joueur),
            "parent" => Ok(Role::Parent),
            _ => Err(RoleResolutionError::UnknownRole(raw.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::President => "president",
            Role::Coach => "coach",
            Role::Staff => "staff",
            Role::Joueur => "joueur",
            Role::Parent => "parent",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static set of roles permitted to view a guarded section.
///
/// Built at composition time; membership testing is a single mask check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RoleSet(u8);

impl RoleSet {
    pub const EMPTY: RoleSet = RoleSet(0);

    /// Allowlist containing every role (section is merely "must be signed in").
    pub const ANY: RoleSet = RoleSet::of(&[
        Role::Admin,
        Role::President,
        Role::Coach,
        Role::Staff,
        Role::Joueur,
        Role::Parent,
    ]);

    pub const fn of(roles: &[Role]) -> Self {
        let mut bits = 0u8;
        let mut i = 0;
        while i < roles.len() {
            bits |= 1 << roles[i] as u8;
            i += 1;
        }
        RoleSet(bits)
    }

    pub const fn contains(&self, role: Role) -> bool {
        self.0 & (1 << role as u8) != 0
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_known_roles() {
        assert_eq!(Role::parse("joueur").unwrap(), Role::Joueur);
        assert_eq!(Role::parse("Président").unwrap(), Role::President);
        assert_eq!(Role::parse("COACH").unwrap(), Role::Coach);
        assert_eq!(Role::parse(" admin ").unwrap(), Role::Admin);
        assert_eq!(Role::parse("player").unwrap(), Role::Joueur);
    }

    #[test]
    fn parse_unknown_role_is_an_error() {
        let err = Role::parse("superuser").unwrap_err();
        assert!(matches!(
            err,
            RoleResolutionError::UnknownRole(ref s) if s == "superuser"
        ));
    }

    #[test]
    fn role_set_membership() {
        let board = RoleSet::of(&[Role::President, Role::Admin]);
        assert!(board.contains(Role::Admin));
        assert!(board.contains(Role::President));
        assert!(!board.contains(Role::Joueur));
        assert!(!board.contains(Role::Parent));

        assert!(RoleSet::EMPTY.is_empty());
        assert!(RoleSet::ANY.contains(Role::Staff));
    }
}
