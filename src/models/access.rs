//! Access levels and the request-scoped actor context.

use serde::{Deserialize, Serialize};

/// Pseudo project id meaning "no specific project".
pub const ALL_PROJECTS: i64 = 0;

/// Numeric access level on the tracker's standard scale.
///
/// Thresholds are configured as plain numbers, so this is a newtype rather
/// than a closed enum; the named constants cover the stock levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessLevel(pub i64);

impl AccessLevel {
    pub const ANYBODY: AccessLevel = AccessLevel(0);
    pub const VIEWER: AccessLevel = AccessLevel(10);
    pub const REPORTER: AccessLevel = AccessLevel(25);
    pub const UPDATER: AccessLevel = AccessLevel(40);
    pub const DEVELOPER: AccessLevel = AccessLevel(55);
    pub const MANAGER: AccessLevel = AccessLevel(70);
    pub const ADMINISTRATOR: AccessLevel = AccessLevel(90);
    pub const NOBODY: AccessLevel = AccessLevel(100);

    pub fn is_at_least(&self, threshold: AccessLevel) -> bool {
        *self >= threshold
    }

    /// Parse a level from its name (`developer`) or its number (`55`).
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if let Ok(n) = s.parse::<i64>() {
            return Some(AccessLevel(n));
        }
        match s.to_lowercase().as_str() {
            "anybody" => Some(Self::ANYBODY),
            "viewer" => Some(Self::VIEWER),
            "reporter" => Some(Self::REPORTER),
            "updater" => Some(Self::UPDATER),
            "developer" => Some(Self::DEVELOPER),
            "manager" => Some(Self::MANAGER),
            "administrator" | "admin" => Some(Self::ADMINISTRATOR),
            "nobody" => Some(Self::NOBODY),
            _ => None,
        }
    }
}

impl From<i64> for AccessLevel {
    fn from(value: i64) -> Self {
        AccessLevel(value)
    }
}

/// Who is acting, and in which project, for the duration of one request.
///
/// Built by the auth middleware and passed explicitly into every lifecycle
/// operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub user_id: i64,
    pub project_id: i64,
}

impl RequestContext {
    pub fn new(user_id: i64, project_id: i64) -> Self {
        Self {
            user_id,
            project_id,
        }
    }

    pub fn for_user(user_id: i64) -> Self {
        Self::new(user_id, ALL_PROJECTS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_levels() {
        assert_eq!(AccessLevel::parse("developer"), Some(AccessLevel::DEVELOPER));
        assert_eq!(AccessLevel::parse("Manager"), Some(AccessLevel::MANAGER));
        assert_eq!(AccessLevel::parse("42"), Some(AccessLevel(42)));
        assert_eq!(AccessLevel::parse("wizard"), None);
    }

    #[test]
    fn test_ordering() {
        assert!(AccessLevel::MANAGER.is_at_least(AccessLevel::DEVELOPER));
        assert!(AccessLevel::REPORTER.is_at_least(AccessLevel::REPORTER));
        assert!(!AccessLevel::VIEWER.is_at_least(AccessLevel::REPORTER));
    }
}
