use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Role of an enrolled identity. Decides geofence authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Hostelite,
    Warden,
    SupportStaff,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Hostelite => "hostelite",
            Role::Warden => "warden",
            Role::SupportStaff => "support_staff",
        }
    }

    /// Wardens and support staff may be inside a restricted zone.
    pub fn zone_authorized(&self) -> bool {
        matches!(self, Role::Warden | Role::SupportStaff)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hostelite" => Ok(Role::Hostelite),
            "warden" => Ok(Role::Warden),
            "support_staff" => Ok(Role::SupportStaff),
            other => anyhow::bail!("unknown role: {}", other),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub role: Role,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trip_and_authorization() {
        for role in [Role::Hostelite, Role::Warden, Role::SupportStaff] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert!("student".parse::<Role>().is_err());
        assert!(!Role::Hostelite.zone_authorized());
        assert!(Role::Warden.zone_authorized());
        assert!(Role::SupportStaff.zone_authorized());
    }
}
