use serde::{Deserialize, Serialize};

/// Opaque description of how a step should animate. The core never renders;
/// it only carries the spec to the renderer, either as a controller default
/// or as a one-shot override attached to a single operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionSpec {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl TransitionSpec {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            duration_ms: None,
        }
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }
}

/// Which pending navigation a gesture is previewing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureKind {
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GesturePhase {
    Active,
    Finished,
    Cancelled,
}

/// Cancellable, resumable progress channel for gesture-driven transitions
/// (predictive back). The renderer feeds fractional progress while the user
/// drags; the back-stack mutation itself happens only when the owning
/// controller settles a *finished* coordinator. Cancelling rolls back to the
/// pre-gesture state without ever having touched the stack.
#[derive(Debug)]
pub struct TransitionCoordinator {
    kind: GestureKind,
    progress: f32,
    phase: GesturePhase,
}

impl TransitionCoordinator {
    pub(crate) fn new(kind: GestureKind) -> Self {
        Self {
            kind,
            progress: 0.0,
            phase: GesturePhase::Active,
        }
    }

    pub fn kind(&self) -> GestureKind {
        self.kind
    }

    pub fn phase(&self) -> GesturePhase {
        self.phase
    }

    pub fn is_active(&self) -> bool {
        self.phase == GesturePhase::Active
    }

    pub fn progress(&self) -> f32 {
        self.progress
    }

    /// Push intermediate progress, clamped to `0.0..=1.0`. Non-finite input
    /// is rejected, and nothing lands once the gesture has been finished or
    /// cancelled; returns whether it landed.
    pub fn update(&mut self, fraction: f32) -> bool {
        if self.phase != GesturePhase::Active || !fraction.is_finite() {
            return false;
        }
        self.progress = fraction.clamp(0.0, 1.0);
        true
    }

    /// Commit the gesture at full progress. The pending navigation applies
    /// when the controller settles this coordinator.
    pub fn finish(&mut self) {
        if self.phase == GesturePhase::Active {
            self.progress = 1.0;
            self.phase = GesturePhase::Finished;
        }
    }

    /// Abandon the gesture. The pending navigation never applies.
    pub fn cancel(&mut self) {
        if self.phase == GesturePhase::Active {
            self.phase = GesturePhase::Cancelled;
        }
    }
}
