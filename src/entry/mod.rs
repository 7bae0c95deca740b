//! Nav entry module orchestrator.
//!
//! Re-exports the entry model; implementation lives in the private `core`
//! module, with per-scope storage in `scoped`.

mod core;
mod scoped;

pub use core::{InstanceId, NavEntry, SavedLeafState};
pub use scoped::{ScopedError, ScopedStore};
