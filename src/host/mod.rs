//! Newline-delimited JSON control bridge for external front-ends and tools.

pub mod contract;
pub mod handler;
pub mod stdio;
