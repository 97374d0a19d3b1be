//! Hotprof Saver
//!
//! Tracks which methods are hot and persists them to profile files.
//! This crate provides the hotness tracker, the profile saver with its
//! background task, and the process-level runtime context.

pub mod background;
pub mod runtime;
pub mod saver;
pub mod tracker;

pub use background::SaverTask;
pub use runtime::ProfileRuntime;
pub use saver::{CycleSummary, ProfileSaver, SaveOutcome, SaveReason, SaverStatsSnapshot};
pub use tracker::MethodHotnessTracker;
