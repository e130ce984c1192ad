//! Persisted document model and record normalizer for Taskboard.

pub mod document;
pub mod normalize;
pub mod task;
