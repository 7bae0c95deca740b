use crate::entry::InstanceId;
use crate::transition::TransitionSpec;

/// What kind of mutation produced an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavUpdateKind {
    Navigated,
    Replaced,
    Popped,
    Edited,
    Routed,
    Restored,
}

/// Renderer-facing description of one published navigation step. Controllers
/// queue these on every mutation; the renderer drains them with
/// [`crate::NavController::take_updates`] and reacts.
#[derive(Debug, Clone)]
pub struct NavUpdate {
    /// Slash-joined key path of the controller that mutated.
    pub controller: String,
    pub kind: NavUpdateKind,
    /// Destination now current, `None` when an edit emptied the stack.
    pub destination: Option<String>,
    pub instance_id: Option<InstanceId>,
    /// Direction hint for enter/exit visuals.
    pub forward: bool,
    /// One-shot transition override attached to this step, if any.
    pub transition: Option<TransitionSpec>,
}
