//! The fixed phase sequence (spec.md §4.5).

use serde::{Deserialize, Serialize};
use std::fmt;

/// One stage of the orchestrator's fixed sequence.
///
/// `Planning` and `TestGeneration` are the only two phases that may be
/// skipped (spec.md §4.5); `GlobalScan` always runs, even after an earlier
/// phase failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PhaseName {
    Planning,
    Analysis,
    Developer,
    TestGeneration,
    Merge,
    GlobalScan,
}

impl PhaseName {
    /// Canonical phase order, per spec.md §4.5.
    pub const ORDER: [PhaseName; 6] = [
        PhaseName::Planning,
        PhaseName::Analysis,
        PhaseName::Developer,
        PhaseName::TestGeneration,
        PhaseName::Merge,
        PhaseName::GlobalScan,
    ];

    /// 0-based index within [`PhaseName::ORDER`].
    pub fn index(self) -> usize {
        Self::ORDER.iter().position(|p| *p == self).expect("PhaseName::ORDER is exhaustive")
    }

    /// Whether this phase may be skipped under some configuration
    /// (`Planning` when complexity is "simple", `TestGeneration` by option).
    /// `GlobalScan` is never skippable.
    pub fn is_skippable(self) -> bool {
        matches!(self, PhaseName::Planning | PhaseName::TestGeneration)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PhaseName::Planning => "planning",
            PhaseName::Analysis => "analysis",
            PhaseName::Developer => "developer",
            PhaseName::TestGeneration => "test_generation",
            PhaseName::Merge => "merge",
            PhaseName::GlobalScan => "global_scan",
        }
    }
}

impl fmt::Display for PhaseName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_is_stable_and_indexed_correctly() {
        assert_eq!(PhaseName::Planning.index(), 0);
        assert_eq!(PhaseName::GlobalScan.index(), 5);
        assert_eq!(PhaseName::ORDER.len(), 6);
    }

    #[test]
    fn only_planning_and_testgen_are_skippable() {
        for phase in PhaseName::ORDER {
            let expected = matches!(phase, PhaseName::Planning | PhaseName::TestGeneration);
            assert_eq!(phase.is_skippable(), expected, "{phase}");
        }
    }
}
