//! Account status and probe outcomes.

use serde::{Deserialize, Serialize};

/// Desired connection status mirrored to the durable store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    /// Actively connected or briefly reconnecting.
    Monitoring,
    /// Should be connected but is currently queued for a slot.
    #[default]
    Waiting,
}

impl AccountStatus {
    /// Convert to database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Monitoring => "monitoring",
            Self::Waiting => "waiting",
        }
    }

    /// Parse from database string representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "monitoring" => Some(Self::Monitoring),
            "waiting" => Some(Self::Waiting),
            _ => None,
        }
    }
}

impl std::fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Tri-state result of a live status probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeOutcome {
    /// The account is broadcasting.
    Live,
    /// The account is not broadcasting.
    Offline,
    /// Neither confirmed nor ruled out.
    Unknown,
}

impl ProbeOutcome {
    /// Resolved live flag, `None` when the probe was inconclusive.
    pub fn as_live(&self) -> Option<bool> {
        match self {
            Self::Live => Some(true),
            Self::Offline => Some(false),
            Self::Unknown => None,
        }
    }

    pub fn is_conclusive(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_status_roundtrip() {
        for status in [AccountStatus::Monitoring, AccountStatus::Waiting] {
            assert_eq!(AccountStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(AccountStatus::parse("MONITORING"), None);
    }

    #[test]
    fn test_probe_outcome_as_live() {
        assert_eq!(ProbeOutcome::Live.as_live(), Some(true));
        assert_eq!(ProbeOutcome::Offline.as_live(), Some(false));
        assert_eq!(ProbeOutcome::Unknown.as_live(), None);
        assert!(!ProbeOutcome::Unknown.is_conclusive());
    }
}
