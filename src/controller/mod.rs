//! Controller module orchestrator.
//!
//! The public controller surface is re-exported here; the state machine
//! lives in the private `core` module, configuration and the root context
//! in `config`, and renderer-facing update descriptors in `update`.

mod config;
mod core;
mod update;

pub use config::{DuplicatePolicy, NavConfig, NavContext, StorageMode};
pub use core::{BackOptions, BackTarget, NavController};
pub use update::{NavUpdate, NavUpdateKind};
