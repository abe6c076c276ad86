//! The six phase drivers (spec.md §4.5, §4.6), run in a fixed order by the
//! orchestrator: Planning, Analysis, Developer, TestGeneration, Merge,
//! GlobalScan.

pub mod analysis;
pub mod common;
pub mod developer;
pub mod globalscan;
pub mod merge;
pub mod planning;
pub mod testgen;
