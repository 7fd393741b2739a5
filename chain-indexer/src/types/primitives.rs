//! Primitive domain types.

use std::fmt;

use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════════════════════════
// HEIGHT
// ═══════════════════════════════════════════════════════════════════════════════

/// A block height: the pipeline's unit of work.
///
/// Heights are monotonic unsigned integers starting at 1.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Height(u64);

impl Height {
    /// Create a new height.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the raw value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// The next height.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl From<u64> for Height {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for Height {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// FAILURE REASON
// ═══════════════════════════════════════════════════════════════════════════════

/// Why a height could not complete its requested work.
///
/// Stored with every failed-block record so operators can replay the right
/// facet later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureReason {
    /// A transaction in the block could not be parsed.
    UnprocessableTx,
    /// Block lifecycle events could not be parsed or filtered.
    FailedEventHandling,
    /// The remote node did not return the block.
    FetchFailed,
}

impl FailureReason {
    /// Stable string form used in the database.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UnprocessableTx => "UNPROCESSABLE_TX",
            Self::FailedEventHandling => "FAILED_EVENT_HANDLING",
            Self::FetchFailed => "FETCH_FAILED",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FailureReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UNPROCESSABLE_TX" => Ok(Self::UnprocessableTx),
            "FAILED_EVENT_HANDLING" => Ok(Self::FailedEventHandling),
            "FETCH_FAILED" => Ok(Self::FetchFailed),
            other => Err(format!("unknown failure reason: {other}")),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn height_ordering_and_next() {
        let h = Height::new(100);
        assert_eq!(h.next(), Height::new(101));
        assert!(Height::new(1) < Height::new(2));
        assert_eq!(h.to_string(), "100");
    }

    #[test]
    fn failure_reason_round_trip() {
        for reason in [
            FailureReason::UnprocessableTx,
            FailureReason::FailedEventHandling,
            FailureReason::FetchFailed,
        ] {
            let parsed: FailureReason = reason.as_str().parse().expect("round trip");
            assert_eq!(parsed, reason);
        }
    }

    #[test]
    fn failure_reason_rejects_unknown() {
        assert!("SOMETHING_ELSE".parse::<FailureReason>().is_err());
    }
}
