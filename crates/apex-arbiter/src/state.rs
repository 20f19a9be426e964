// state.rs — SystemState and the DEFEND authorization policy.
//
// The system-wide escalation level:
//   OBSERVE → ALERT → ACT → OBSERVE
//   ALERT → OBSERVE (false positive)
//   OBSERVE | ALERT | ACT → DEFEND (privileged identities only)
//   DEFEND → OBSERVE (de-escalation)

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ArbiterError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum SystemState {
    /// Normal operation; nothing under investigation.
    #[default]
    Observe,
    /// An anomaly has been detected.
    Alert,
    /// A confirmed threat is being acted on.
    Act,
    /// Exceptional defensive posture.
    Defend,
}

impl SystemState {
    pub const ALL: [SystemState; 4] = [
        SystemState::Observe,
        SystemState::Alert,
        SystemState::Act,
        SystemState::Defend,
    ];

    /// Whether `next` is a permitted successor of this state.
    ///
    /// Self-transitions are never permitted.
    pub fn can_transition_to(&self, next: &SystemState) -> bool {
        matches!(
            (self, next),
            (SystemState::Observe, SystemState::Alert)
                | (SystemState::Observe, SystemState::Defend)
                | (SystemState::Alert, SystemState::Act)
                | (SystemState::Alert, SystemState::Observe)
                | (SystemState::Alert, SystemState::Defend)
                | (SystemState::Act, SystemState::Observe)
                | (SystemState::Act, SystemState::Defend)
                | (SystemState::Defend, SystemState::Observe)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SystemState::Observe => "observe",
            SystemState::Alert => "alert",
            SystemState::Act => "act",
            SystemState::Defend => "defend",
        }
    }
}

impl fmt::Display for SystemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SystemState {
    type Err = ArbiterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "observe" => Ok(SystemState::Observe),
            "alert" => Ok(SystemState::Alert),
            "act" => Ok(SystemState::Act),
            "defend" => Ok(SystemState::Defend),
            _ => Err(ArbiterError::UnknownState(s.to_string())),
        }
    }
}

/// Identity prefixes allowed to move the system into DEFEND.
///
/// Identities have the form `<role>:<subject>`; the check is a literal
/// prefix match, so `intent_architect:admin` matches `intent_architect:`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DefendPolicy {
    pub authorities: Vec<String>,
}

impl Default for DefendPolicy {
    fn default() -> Self {
        Self {
            authorities: vec!["intent_architect:".to_string(), "arbiter:".to_string()],
        }
    }
}

impl DefendPolicy {
    /// Empty prefixes are dropped; they would match every identity.
    pub fn new(authorities: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            authorities: authorities
                .into_iter()
                .map(Into::into)
                .filter(|prefix: &String| !prefix.is_empty())
                .collect(),
        }
    }

    /// Whether `authorized_by` may enter DEFEND. An absent or empty identity
    /// is always a denial.
    pub fn authorizes(&self, authorized_by: Option<&str>) -> bool {
        authorized_by.is_some_and(|who| {
            !who.is_empty()
                && self
                    .authorities
                    .iter()
                    .any(|prefix| !prefix.is_empty() && who.starts_with(prefix.as_str()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_prefix_authorizes_nobody() {
        let policy = DefendPolicy::new(["", "arbiter:"]);
        assert_eq!(policy.authorities, vec!["arbiter:".to_string()]);
        assert!(!policy.authorizes(Some("")));
        assert!(!policy.authorizes(Some("operator:root")));
        assert!(policy.authorizes(Some("arbiter:core")));

        let raw = DefendPolicy {
            authorities: vec![String::new()],
        };
        assert!(!raw.authorizes(Some("anyone")));
        assert!(!raw.authorizes(Some("")));
    }

    #[test]
    fn transition_table() {
        use SystemState::*;
        let allowed = [
            (Observe, Alert),
            (Observe, Defend),
            (Alert, Act),
            (Alert, Observe),
            (Alert, Defend),
            (Act, Observe),
            (Act, Defend),
            (Defend, Observe),
        ];
        for from in SystemState::ALL {
            for to in SystemState::ALL {
                assert_eq!(
                    from.can_transition_to(&to),
                    allowed.contains(&(from, to)),
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn parse_and_display_agree() {
        for state in SystemState::ALL {
            assert_eq!(state.to_string().parse::<SystemState>().unwrap(), state);
        }
        assert_eq!("DEFEND".parse::<SystemState>().unwrap(), SystemState::Defend);
        assert!(matches!(
            "panic".parse::<SystemState>(),
            Err(ArbiterError::UnknownState(s)) if s == "panic"
        ));
    }

    #[test]
    fn defend_policy_matches_prefixes_only() {
        let policy = DefendPolicy::default();
        assert!(policy.authorizes(Some("intent_architect:admin")));
        assert!(policy.authorizes(Some("arbiter:core")));
        assert!(!policy.authorizes(Some("operator:bob")));
        assert!(!policy.authorizes(Some("intent_architect")));
        assert!(!policy.authorizes(Some("")));
        assert!(!policy.authorizes(None));
    }

    #[test]
    fn custom_policy_replaces_defaults() {
        let policy = DefendPolicy::new(["security_lead:"]);
        assert!(policy.authorizes(Some("security_lead:eve")));
        assert!(!policy.authorizes(Some("intent_architect:admin")));
    }
}
