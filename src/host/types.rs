use crate::worker::BindingKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The three selectable worker patterns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pattern {
    /// Worker closure captures the host: leaks the host and the thread
    Captured,
    /// Worker holds no host reference but nobody can stop it
    Detached,
    /// Host keeps the handle and stops the worker on teardown
    Cancelable,
}

impl Pattern {
    pub const ALL: [Pattern; 3] = [Pattern::Captured, Pattern::Detached, Pattern::Cancelable];

    pub fn binding_kind(&self) -> BindingKind {
        match self {
            Pattern::Captured => BindingKind::Captured,
            Pattern::Detached => BindingKind::Detached,
            Pattern::Cancelable => BindingKind::DetachedCancelable,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Pattern::Captured => "captured",
            Pattern::Detached => "detached",
            Pattern::Cancelable => "cancelable",
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Pattern {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "captured" | "a" | "1" => Ok(Pattern::Captured),
            "detached" | "b" | "2" => Ok(Pattern::Detached),
            "cancelable" | "cancellable" | "c" | "3" => Ok(Pattern::Cancelable),
            other => Err(format!(
                "unknown pattern '{}' (expected captured, detached or cancelable)",
                other
            )),
        }
    }
}

/// What a host persists across its own recreation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedState {
    pub pattern: Pattern,
}

/// Why a host is being torn down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestroyReason {
    /// Torn down to be rebuilt from saved state
    Recreation,
    /// Gone for good
    Final,
}

impl fmt::Display for DestroyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DestroyReason::Recreation => f.write_str("recreation"),
            DestroyReason::Final => f.write_str("final"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_parsing() {
        assert_eq!("captured".parse::<Pattern>(), Ok(Pattern::Captured));
        assert_eq!("Detached".parse::<Pattern>(), Ok(Pattern::Detached));
        assert_eq!("cancellable".parse::<Pattern>(), Ok(Pattern::Cancelable));
        assert_eq!("3".parse::<Pattern>(), Ok(Pattern::Cancelable));
        assert!("leaky".parse::<Pattern>().is_err());

        for pattern in Pattern::ALL {
            assert_eq!(pattern.to_string().parse::<Pattern>(), Ok(pattern));
        }
    }

    #[test]
    fn test_pattern_binding_kinds() {
        assert_eq!(Pattern::Captured.binding_kind(), BindingKind::Captured);
        assert_eq!(Pattern::Detached.binding_kind(), BindingKind::Detached);
        assert_eq!(
            Pattern::Cancelable.binding_kind(),
            BindingKind::DetachedCancelable
        );
    }

    #[test]
    fn test_saved_state_serialization() {
        let saved = SavedState {
            pattern: Pattern::Detached,
        };
        let json = serde_json::to_string(&saved).unwrap();
        assert_eq!(json, r#"{"pattern":"detached"}"#);
        assert_eq!(serde_json::from_str::<SavedState>(&json).unwrap(), saved);
    }
}
