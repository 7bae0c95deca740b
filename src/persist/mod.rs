//! Save/restore for controller trees.
//!
//! A controller serializes to a [`ControllerState`]: destination names,
//! encoded nav args, harvested leaf state, and the states of savable child
//! controllers nested under their owning entry. Restore is lenient about
//! drift; entries whose destination is no longer declared are dropped with
//! a warning rather than failing the whole restore.

mod core;

pub use core::{ControllerState, EntryState};
