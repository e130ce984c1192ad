//! `Taskboard` — multi-writer task board synchronized through a shared JSON
//! file.

pub mod config;
pub mod storage;
pub mod sync;
pub mod tasks;
