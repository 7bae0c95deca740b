//! Back stack module orchestrator.

mod core;

pub use core::BackStack;
