//! Classification returned by the horizon probe

use std::fmt;

use serde::Serialize;

use crate::cache::{CacheError, CacheKey};
use crate::fingerprint::FingerprintError;
use crate::history::HistoryError;

/// Whether a task's result can be obtained without running it
#[derive(Debug)]
pub enum Outcome {
    /// Current fingerprint matches the last successful execution
    UpToDate,
    /// The derived cache key has an entry in the cache backend
    FromCache {
        /// Key that hit
        key: CacheKey,
    },
    /// The task has to run
    RequiresExecution {
        /// Why the result is not available
        reasons: Vec<String>,
    },
    /// The probe could not decide
    Indeterminate {
        /// The failure that stopped the probe
        cause: ProbeError,
    },
}

/// Discriminant of an [`Outcome`], for comparison and serialization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    UpToDate,
    FromCache,
    RequiresExecution,
    Indeterminate,
}

impl Outcome {
    /// True when the result is already available, which lets the gate disable members
    pub fn is_satisfiable(&self) -> bool {
        matches!(self, Outcome::UpToDate | Outcome::FromCache { .. })
    }

    pub fn kind(&self) -> OutcomeKind {
        match self {
            Outcome::UpToDate => OutcomeKind::UpToDate,
            Outcome::FromCache { .. } => OutcomeKind::FromCache,
            Outcome::RequiresExecution { .. } => OutcomeKind::RequiresExecution,
            Outcome::Indeterminate { .. } => OutcomeKind::Indeterminate,
        }
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OutcomeKind::UpToDate => "up-to-date",
            OutcomeKind::FromCache => "from-cache",
            OutcomeKind::RequiresExecution => "requires-execution",
            OutcomeKind::Indeterminate => "indeterminate",
        };
        f.write_str(s)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::UpToDate | Outcome::FromCache { .. } => write!(f, "{}", self.kind()),
            Outcome::RequiresExecution { reasons } => {
                write!(f, "{} ({})", self.kind(), reasons.join(" "))
            }
            Outcome::Indeterminate { cause } => write!(f, "{} ({})", self.kind(), cause),
        }
    }
}

/// Infrastructure failure during a probe
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    /// Fingerprinting the task's inputs or outputs failed
    #[error("Failed to fingerprint task: {0}")]
    Fingerprint(#[from] FingerprintError),

    /// The execution history could not be read
    #[error("Failed to load execution history: {0}")]
    History(#[from] HistoryError),

    /// The cache backend could not be queried
    #[error("Cache lookup failed: {0}")]
    CacheLookup(#[from] CacheError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_satisfiable_outcomes() {
        assert!(Outcome::UpToDate.is_satisfiable());
        assert!(Outcome::FromCache {
            key: CacheKey("k".to_string())
        }
        .is_satisfiable());
        assert!(!Outcome::RequiresExecution { reasons: vec![] }.is_satisfiable());
        assert!(!Outcome::Indeterminate {
            cause: FingerprintError::MissingInput(PathBuf::from("a")).into()
        }
        .is_satisfiable());
    }

    #[test]
    fn test_outcome_display() {
        let outcome = Outcome::RequiresExecution {
            reasons: vec!["No history is available.".to_string()],
        };
        assert_eq!(
            outcome.to_string(),
            "requires-execution (No history is available.)"
        );
        assert_eq!(Outcome::UpToDate.to_string(), "up-to-date");
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&OutcomeKind::FromCache).unwrap();
        assert_eq!(json, "\"from_cache\"");
    }
}
