//! Transition module orchestrator.

mod core;

pub use core::{GestureKind, GesturePhase, TransitionCoordinator, TransitionSpec};
