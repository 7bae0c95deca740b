use std::any::Any;
use std::collections::{HashMap, HashSet, VecDeque};

use serde_json::{Value, json};

use crate::destination::{ChildFlowSpec, Destination, DestinationRef, DestinationSet};
use crate::entry::{InstanceId, NavEntry, ScopedStore};
use crate::error::{NavError, Result};
use crate::logging::{LogLevel, event_with_fields, json_kv};
use crate::metrics::NavMetrics;
use crate::stack::BackStack;
use crate::transition::{GestureKind, GesturePhase, TransitionCoordinator, TransitionSpec};

use super::config::{NavContext, StorageMode};
use super::update::{NavUpdate, NavUpdateKind};

const LOG_TARGET: &str = "waymark::controller";

/// Target selector for `back_with`: pop until this entry becomes current.
pub enum BackTarget {
    Name(String),
    Predicate(Box<dyn Fn(&NavEntry) -> bool + Send>),
}

impl BackTarget {
    pub fn name(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }

    pub fn destination(destination: &Destination) -> Self {
        Self::Name(destination.name().to_string())
    }

    pub fn predicate<F>(predicate: F) -> Self
    where
        F: Fn(&NavEntry) -> bool + Send + 'static,
    {
        Self::Predicate(Box::new(predicate))
    }

    fn matches(&self, entry: &NavEntry) -> bool {
        match self {
            Self::Name(name) => entry.destination().name() == name,
            Self::Predicate(predicate) => predicate(entry),
        }
    }
}

/// Options for [`NavController::back_with`]. All fields are optional; the
/// empty default is a plain single pop.
#[derive(Default)]
pub struct BackOptions {
    pub result: Option<Box<dyn Any + Send>>,
    pub to: Option<BackTarget>,
    pub transition: Option<TransitionSpec>,
}

impl BackOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_result(mut self, result: Box<dyn Any + Send>) -> Self {
        self.result = Some(result);
        self
    }

    pub fn to(mut self, target: BackTarget) -> Self {
        self.to = Some(target);
        self
    }

    pub fn with_transition(mut self, transition: TransitionSpec) -> Self {
        self.transition = Some(transition);
        self
    }
}

/// Operation captured while a gesture transition is in flight, applied in
/// order when the gesture settles.
enum DeferredOp {
    Navigate {
        destination: DestinationRef,
        args: Option<Value>,
        free_args: Option<Box<dyn Any + Send>>,
        transition: Option<TransitionSpec>,
    },
    Replace {
        destination: DestinationRef,
        args: Option<Value>,
        free_args: Option<Box<dyn Any + Send>>,
        transition: Option<TransitionSpec>,
    },
}

/// Orchestrates one back stack: applies the high-level navigation
/// operations, enforces destination membership, owns nested child
/// controllers through its entries, and publishes updates for the renderer.
///
/// One logical owner mutates a controller tree at a time; operations are
/// atomic value transforms with no internal locking.
pub struct NavController {
    key: String,
    parent_path: Vec<String>,
    destinations: DestinationSet,
    start: DestinationRef,
    mode: StorageMode,
    stack: BackStack,
    is_forward: bool,
    pending_override: Option<TransitionSpec>,
    updates: Vec<NavUpdate>,
    closed: Vec<NavEntry>,
    gesture: Option<GestureKind>,
    deferred: VecDeque<DeferredOp>,
    scoped: ScopedStore,
    ctx: NavContext,
}

impl NavController {
    pub(crate) fn new(
        key: String,
        parent_path: Vec<String>,
        destinations: DestinationSet,
        start: &str,
        mode: StorageMode,
        ctx: NavContext,
    ) -> Result<Self> {
        let start = destinations
            .get(start)
            .cloned()
            .ok_or_else(|| NavError::UnknownDestination(start.to_string()))?;
        let first = NavEntry::new(
            ctx.next_instance_id(start.name()),
            start.clone(),
            None,
            None,
        );
        Ok(Self {
            key,
            parent_path,
            destinations,
            start,
            mode,
            stack: BackStack::new(first),
            is_forward: true,
            pending_override: None,
            updates: Vec::new(),
            closed: Vec::new(),
            gesture: None,
            deferred: VecDeque::new(),
            scoped: ScopedStore::new(),
            ctx,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Slash-joined key path from the root; the non-owning stand-in for a
    /// parent back-reference.
    pub fn path(&self) -> String {
        let mut segments = self.parent_path.clone();
        segments.push(self.key.clone());
        segments.join("/")
    }

    pub fn mode(&self) -> StorageMode {
        self.mode
    }

    pub fn destinations(&self) -> &DestinationSet {
        &self.destinations
    }

    pub(crate) fn start(&self) -> &DestinationRef {
        &self.start
    }

    pub(crate) fn ctx(&self) -> &NavContext {
        &self.ctx
    }

    /// Values scoped to this controller, shared across its sibling screens
    /// and dropped when the controller closes. Per-entry values live on
    /// [`NavEntry::scoped`] instead.
    pub fn scoped(&self) -> &ScopedStore {
        &self.scoped
    }

    pub(crate) fn child_path(&self) -> Vec<String> {
        let mut path = self.parent_path.clone();
        path.push(self.key.clone());
        path
    }

    // ------------------------------------------------------------------
    // Read accessors
    // ------------------------------------------------------------------

    pub fn current(&self) -> Option<&NavEntry> {
        self.stack.current()
    }

    pub fn current_mut(&mut self) -> Option<&mut NavEntry> {
        self.stack.current_mut()
    }

    /// Entries retained behind the current one, oldest first.
    pub fn back_entries(&self) -> &[NavEntry] {
        self.stack.behind()
    }

    /// The full ordered stack, current last.
    pub fn entries(&self) -> &[NavEntry] {
        self.stack.entries()
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Flattened stack including active child controller paths: this
    /// controller's entries followed by the active child's flattened stack,
    /// recursively.
    pub fn nav_stack(&self) -> Vec<&NavEntry> {
        let mut out: Vec<&NavEntry> = self.stack.entries().iter().collect();
        if let Some(current) = self.stack.current() {
            if let Some(key) = current.active_child_key() {
                if let Some(child) = current.child(key) {
                    out.extend(child.nav_stack());
                }
            }
        }
        out
    }

    /// Direction of the most recent step, for enter/exit visuals.
    pub fn is_forward_transition(&self) -> bool {
        self.is_forward
    }

    /// Consume the one-shot transition override recorded by the last step.
    pub fn take_transition_override(&mut self) -> Option<TransitionSpec> {
        self.pending_override.take()
    }

    /// Drain queued updates from this controller and every descendant,
    /// depth-first.
    pub fn take_updates(&mut self) -> Vec<NavUpdate> {
        let mut out: Vec<NavUpdate> = self.updates.drain(..).collect();
        for entry in self.stack.iter_mut() {
            for child in entry.children_mut().values_mut() {
                out.extend(child.take_updates());
            }
        }
        out
    }

    /// Drain entries scheduled for close so the renderer can harvest their
    /// leaf state before they drop.
    pub fn take_closed(&mut self) -> Vec<NavEntry> {
        std::mem::take(&mut self.closed)
    }

    /// True when this controller, or a child reachable through the current
    /// entry, can consume a back action. Bubbles down before bubbling up.
    pub fn can_go_back(&self) -> bool {
        if let Some(current) = self.stack.current() {
            if let Some(key) = current.active_child_key() {
                if let Some(child) = current.child(key) {
                    if child.can_go_back() {
                        return true;
                    }
                }
            }
        }
        self.stack.len() > 1
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    pub fn navigate(&mut self, destination: &DestinationRef) -> Result<()> {
        self.navigate_with(destination, None, None, None)
    }

    /// Append a new occurrence of `destination` and make it current.
    /// Fails fast when the destination is not declared on this controller.
    /// Deferred (FIFO) while a gesture transition is in flight.
    pub fn navigate_with(
        &mut self,
        destination: &DestinationRef,
        args: Option<Value>,
        free_args: Option<Box<dyn Any + Send>>,
        transition: Option<TransitionSpec>,
    ) -> Result<()> {
        self.require_member(destination)?;
        if self.gesture.is_some() {
            self.log_nav(
                LogLevel::Debug,
                "navigate_deferred",
                [json_kv("destination", json!(destination.name()))],
            );
            self.deferred.push_back(DeferredOp::Navigate {
                destination: destination.clone(),
                args,
                free_args,
                transition,
            });
            return Ok(());
        }
        self.apply_navigate(destination.clone(), args, free_args, transition);
        Ok(())
    }

    pub fn replace(&mut self, destination: &DestinationRef) -> Result<()> {
        self.replace_with(destination, None, None, None)
    }

    /// Like `navigate`, but the current entry is closed rather than retained
    /// for back. Used for redirect-style flows.
    pub fn replace_with(
        &mut self,
        destination: &DestinationRef,
        args: Option<Value>,
        free_args: Option<Box<dyn Any + Send>>,
        transition: Option<TransitionSpec>,
    ) -> Result<()> {
        self.require_member(destination)?;
        if self.gesture.is_some() {
            self.log_nav(
                LogLevel::Debug,
                "replace_deferred",
                [json_kv("destination", json!(destination.name()))],
            );
            self.deferred.push_back(DeferredOp::Replace {
                destination: destination.clone(),
                args,
                free_args,
                transition,
            });
            return Ok(());
        }
        self.apply_replace(destination.clone(), args, free_args, transition);
        Ok(())
    }

    /// Pop the current entry, bubbling down first: the deepest active child
    /// that can go back consumes the action before this stack pops. Returns
    /// `false` when nothing anywhere could pop (already at every root).
    pub fn back(&mut self) -> bool {
        if self.gesture.is_some() {
            return false;
        }
        self.commit_back()
    }

    /// Pop on this controller's own stack with a result, a target, or a
    /// transition override. Targeted pops ("back to X") never delegate to
    /// children. No-op returning `false` when the target is absent or the
    /// stack would empty past the start.
    pub fn back_with(&mut self, options: BackOptions) -> bool {
        if self.gesture.is_some() {
            return false;
        }
        let BackOptions {
            result,
            to,
            transition,
        } = options;
        self.apply_pop(result, to, transition)
    }

    /// Hand the whole entry list to a transform ("reset to X", "clear and
    /// push"). The new tail becomes current. Entries the transform removed
    /// are dropped immediately; fresh entries must come from
    /// [`Self::make_entry`]. Duplicate instance ids or undeclared
    /// destinations after the transform are programmer errors: the edit is
    /// rejected, entries the transform added are dropped, and the surviving
    /// declared entries go back on the stack in their prior order.
    pub fn edit_back_stack<F>(&mut self, transform: F) -> Result<()>
    where
        F: FnOnce(&mut Vec<NavEntry>),
    {
        let original_order: Vec<InstanceId> = self
            .stack
            .entries()
            .iter()
            .map(|e| e.instance_id().clone())
            .collect();
        let before: HashSet<InstanceId> = original_order.iter().cloned().collect();

        // The transform runs on a scratch list; the live stack only sees
        // the result once it has passed validation.
        let mut working = self.stack.drain_all();
        transform(&mut working);

        if let Err(err) = self.check_edited(&working) {
            let mut survivors: HashMap<InstanceId, NavEntry> = working
                .into_iter()
                .filter(|e| before.contains(e.instance_id()))
                .map(|e| (e.instance_id().clone(), e))
                .collect();
            for id in &original_order {
                if let Some(entry) = survivors.remove(id) {
                    self.stack.push(entry);
                }
            }
            return Err(err);
        }

        for entry in working {
            self.stack.push(entry);
        }

        let after = self.stack.instance_ids();
        let removed = before.difference(&after).count();
        if let Some(current) = self.stack.current_mut() {
            current.reactivate();
        }
        self.record_metric(|m| {
            m.record_edit();
            m.record_entries_closed(removed);
        });
        self.push_update(NavUpdateKind::Edited, None);
        self.log_nav(
            LogLevel::Info,
            "back_stack_edited",
            [
                json_kv("removed", json!(removed)),
                json_kv("depth", json!(self.stack.len())),
            ],
        );
        Ok(())
    }

    /// Create an entry for insertion via [`Self::edit_back_stack`].
    /// Membership-checked; entries are never reused across controllers.
    pub fn make_entry(
        &self,
        destination: &DestinationRef,
        args: Option<Value>,
    ) -> Result<NavEntry> {
        self.require_member(destination)?;
        Ok(self.new_entry(destination.clone(), args, None))
    }

    // ------------------------------------------------------------------
    // Nested composition
    // ------------------------------------------------------------------

    /// Get or lazily create the named child controller on the current
    /// entry. The child inherits this controller's storage mode unless the
    /// seed overrides it; its parent reference is fixed at creation.
    pub fn child_controller(
        &mut self,
        key: &str,
        seed: &ChildFlowSpec,
    ) -> Result<&mut NavController> {
        let mode = seed.mode.unwrap_or(self.mode);
        let ctx = self.ctx.clone();
        let path = self.child_path();
        let current = self
            .stack
            .current_mut()
            .ok_or_else(|| NavError::UnknownChildKey(key.to_string()))?;
        if current.child(key).is_none() {
            let child = NavController::new(
                key.to_string(),
                path,
                DestinationSet::new(seed.destinations.iter().cloned()),
                &seed.start,
                mode,
                ctx,
            )?;
            current.insert_child(key.to_string(), child);
        }
        Ok(current.child_mut(key).expect("child just ensured"))
    }

    /// Like [`Self::child_controller`], with the seed taken from the current
    /// destination's `NestedFlows` capability.
    pub fn declared_child(&mut self, key: &str) -> Result<&mut NavController> {
        let exists = self
            .stack
            .current()
            .map(|c| c.child(key).is_some())
            .unwrap_or(false);
        if exists {
            return Ok(self
                .stack
                .current_mut()
                .and_then(|c| c.child_mut(key))
                .expect("checked above"));
        }
        let seed = self
            .stack
            .current()
            .and_then(|c| c.destination().nested_flows())
            .and_then(|flows| flows.child(key))
            .cloned()
            .ok_or_else(|| NavError::UnknownChildKey(key.to_string()))?;
        self.child_controller(key, &seed)
    }

    // ------------------------------------------------------------------
    // Gesture transitions
    // ------------------------------------------------------------------

    /// Start a gesture-driven back transition. The stack is not touched;
    /// the pop applies only when a *finished* coordinator is settled, and
    /// commits through the same child-first path as [`Self::back`]. Returns
    /// `None` when nothing here or in a child could pop, or a gesture is
    /// already in flight.
    pub fn begin_back_gesture(&mut self) -> Option<TransitionCoordinator> {
        if self.gesture.is_some() || !self.can_go_back() {
            return None;
        }
        self.gesture = Some(GestureKind::Back);
        self.log_nav(
            LogLevel::Debug,
            "gesture_started",
            [json_kv("depth", json!(self.stack.len()))],
        );
        Some(TransitionCoordinator::new(GestureKind::Back))
    }

    /// Settle a gesture: commit the pending pop when the coordinator was
    /// finished, roll back (no mutation) otherwise. Operations deferred
    /// while the gesture was in flight are applied afterwards in order.
    /// Returns whether the pending navigation committed.
    pub fn settle_gesture(&mut self, coordinator: TransitionCoordinator) -> bool {
        if self.gesture.take().is_none() {
            return false;
        }
        let committed = match coordinator.phase() {
            GesturePhase::Finished => match coordinator.kind() {
                GestureKind::Back => self.commit_back(),
            },
            GesturePhase::Active | GesturePhase::Cancelled => false,
        };
        self.log_nav(
            LogLevel::Debug,
            "gesture_settled",
            [
                json_kv("committed", json!(committed)),
                json_kv("progress", json!(coordinator.progress())),
            ],
        );
        let deferred: Vec<DeferredOp> = self.deferred.drain(..).collect();
        for op in deferred {
            match op {
                DeferredOp::Navigate {
                    destination,
                    args,
                    free_args,
                    transition,
                } => self.apply_navigate(destination, args, free_args, transition),
                DeferredOp::Replace {
                    destination,
                    args,
                    free_args,
                    transition,
                } => self.apply_replace(destination, args, free_args, transition),
            }
        }
        committed
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn check_edited(&self, entries: &[NavEntry]) -> Result<()> {
        let mut seen: HashSet<&str> = HashSet::new();
        for entry in entries {
            if !seen.insert(entry.instance_id().as_str()) {
                return Err(NavError::DuplicateInstance(entry.instance_id().clone()));
            }
            if !self.destinations.contains(entry.destination()) {
                return Err(NavError::UnknownDestination(
                    entry.destination().name().to_string(),
                ));
            }
        }
        Ok(())
    }

    fn require_member(&self, destination: &Destination) -> Result<()> {
        if self.destinations.contains(destination) {
            Ok(())
        } else {
            Err(NavError::UnknownDestination(
                destination.name().to_string(),
            ))
        }
    }

    pub(crate) fn new_entry(
        &self,
        destination: DestinationRef,
        args: Option<Value>,
        free_args: Option<Box<dyn Any + Send>>,
    ) -> NavEntry {
        let id = self.ctx.next_instance_id(destination.name());
        NavEntry::new(id, destination, args, free_args)
    }

    fn apply_navigate(
        &mut self,
        destination: DestinationRef,
        args: Option<Value>,
        free_args: Option<Box<dyn Any + Send>>,
        transition: Option<TransitionSpec>,
    ) {
        let entry = self.new_entry(destination, args, free_args);
        let name = entry.destination().name().to_string();
        let id = entry.instance_id().clone();
        self.stack.push(entry);
        self.is_forward = true;
        self.pending_override = transition.clone();
        self.record_metric(NavMetrics::record_navigation);
        self.push_update(NavUpdateKind::Navigated, transition);
        self.log_nav(
            LogLevel::Info,
            "navigated",
            [
                json_kv("destination", json!(name)),
                json_kv("instance", json!(id)),
                json_kv("depth", json!(self.stack.len())),
            ],
        );
    }

    fn apply_replace(
        &mut self,
        destination: DestinationRef,
        args: Option<Value>,
        free_args: Option<Box<dyn Any + Send>>,
        transition: Option<TransitionSpec>,
    ) {
        let entry = self.new_entry(destination, args, free_args);
        let name = entry.destination().name().to_string();
        if let Some(old) = self.stack.replace(entry) {
            self.close_entry(old);
        }
        self.is_forward = true;
        self.pending_override = transition.clone();
        self.record_metric(NavMetrics::record_replace);
        self.push_update(NavUpdateKind::Replaced, transition);
        self.log_nav(
            LogLevel::Info,
            "replaced",
            [
                json_kv("destination", json!(name)),
                json_kv("depth", json!(self.stack.len())),
            ],
        );
    }

    /// Shared commit path for button back and a settled back gesture:
    /// bubble down first, pop here otherwise.
    fn commit_back(&mut self) -> bool {
        if self.delegate_back() {
            return true;
        }
        self.apply_pop(None, None, None)
    }

    fn delegate_back(&mut self) -> bool {
        let Some(current) = self.stack.current_mut() else {
            return false;
        };
        let Some(key) = current.active_child_key().map(str::to_string) else {
            return false;
        };
        match current.child_mut(&key) {
            Some(child) => child.back(),
            None => false,
        }
    }

    fn apply_pop(
        &mut self,
        result: Option<Box<dyn Any + Send>>,
        to: Option<BackTarget>,
        transition: Option<TransitionSpec>,
    ) -> bool {
        let popped = match to {
            None => match self.stack.pop() {
                Some(entry) => vec![entry],
                None => return false,
            },
            Some(target) => match self.stack.pop_to(|entry| target.matches(entry)) {
                Some(popped) => popped,
                None => return false,
            },
        };
        let count = popped.len();
        for entry in popped {
            self.close_entry(entry);
        }
        self.is_forward = false;
        self.pending_override = transition.clone();
        if let Some(current) = self.stack.current_mut() {
            current.reactivate();
            if let Some(result) = result {
                current.set_result(result);
            }
        }
        self.record_metric(|m| m.record_pops(count));
        self.push_update(NavUpdateKind::Popped, transition);
        self.log_nav(
            LogLevel::Info,
            "popped",
            [
                json_kv("count", json!(count)),
                json_kv("depth", json!(self.stack.len())),
            ],
        );
        true
    }

    pub(crate) fn close_entry(&mut self, mut entry: NavEntry) {
        entry.close();
        self.record_metric(|m| m.record_entries_closed(1));
        self.closed.push(entry);
    }

    /// Tear down the whole controller: every entry closes, nested
    /// controllers first.
    pub(crate) fn close(&mut self) {
        for mut entry in self.stack.drain_all() {
            entry.close();
        }
        self.closed.clear();
        self.deferred.clear();
        self.updates.clear();
        self.scoped.clear();
        self.gesture = None;
    }

    pub(crate) fn stack_mut(&mut self) -> &mut BackStack {
        &mut self.stack
    }

    pub(crate) fn replace_stack(&mut self, stack: BackStack) -> Vec<NavEntry> {
        std::mem::replace(&mut self.stack, stack).drain_all()
    }

    pub(crate) fn mark_forward(&mut self, forward: bool) {
        self.is_forward = forward;
    }

    pub(crate) fn push_update(&mut self, kind: NavUpdateKind, transition: Option<TransitionSpec>) {
        let (destination, instance_id) = match self.stack.current() {
            Some(current) => (
                Some(current.destination().name().to_string()),
                Some(current.instance_id().clone()),
            ),
            None => (None, None),
        };
        self.updates.push(NavUpdate {
            controller: self.path(),
            kind,
            destination,
            instance_id,
            forward: self.is_forward,
            transition,
        });
    }

    pub(crate) fn record_metric<F>(&self, record: F)
    where
        F: FnOnce(&mut NavMetrics),
    {
        if let Some(metrics) = self.ctx.config().metrics.as_ref() {
            if let Ok(mut guard) = metrics.lock() {
                record(&mut guard);
            }
        }
    }

    pub(crate) fn log_nav<I>(&self, level: LogLevel, message: &str, fields: I)
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        if let Some(logger) = self.ctx.config().logger.as_ref() {
            let mut all = vec![json_kv("controller", json!(self.path()))];
            all.extend(fields);
            let event = event_with_fields(level, LOG_TARGET, message, all);
            let _ = logger.log_event(event);
        }
    }
}

impl std::fmt::Debug for NavController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NavController")
            .field("path", &self.path())
            .field("mode", &self.mode)
            .field("depth", &self.stack.len())
            .field(
                "current",
                &self.stack.current().map(|e| e.destination().name()),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::NavConfig;
    use crate::destination::Destination;

    fn dest(name: &str) -> DestinationRef {
        Destination::build(name).finish()
    }

    fn controller(names: &[&str], start: &str) -> NavController {
        let ctx = NavContext::new(NavConfig::new());
        ctx.controller(
            "root",
            names.iter().map(|n| dest(n)),
            start,
            StorageMode::Savable,
        )
        .expect("controller")
    }

    fn current_name(controller: &NavController) -> String {
        controller
            .current()
            .map(|e| e.destination().name().to_string())
            .unwrap_or_default()
    }

    #[test]
    fn navigate_requires_declared_destination() {
        let mut root = controller(&["Home"], "Home");
        let ghost = dest("Ghost");
        let err = root.navigate(&ghost).unwrap_err();
        assert!(matches!(err, NavError::UnknownDestination(name) if name == "Ghost"));
        assert_eq!(root.len(), 1);
    }

    #[test]
    fn paired_navigate_back_is_identity() {
        let mut root = controller(&["Home", "A", "B"], "Home");
        let before = root.current().unwrap().instance_id().clone();

        let a = root.destinations().get("A").cloned().unwrap();
        let b = root.destinations().get("B").cloned().unwrap();
        root.navigate(&a).unwrap();
        root.navigate(&b).unwrap();
        assert!(root.back());
        assert!(root.back());

        assert_eq!(root.len(), 1);
        assert_eq!(current_name(&root), "Home");
        assert_eq!(root.current().unwrap().instance_id(), &before);
    }

    #[test]
    fn home_a_b_back_to_home_scenario() {
        let mut root = controller(&["Home", "A", "B"], "Home");
        let a = root.destinations().get("A").cloned().unwrap();
        let b = root.destinations().get("B").cloned().unwrap();
        root.navigate(&a).unwrap();
        root.navigate(&b).unwrap();

        assert!(root.back());
        assert_eq!(current_name(&root), "A");
        assert!(!root.is_forward_transition());

        assert!(root.back_with(BackOptions::new().to(BackTarget::name("Home"))));
        assert_eq!(current_name(&root), "Home");
        assert_eq!(root.len(), 1);
    }

    #[test]
    fn back_at_root_is_a_noop() {
        let mut root = controller(&["Home"], "Home");
        assert!(!root.back());
        assert!(!root.back());
        assert_eq!(root.len(), 1);
    }

    #[test]
    fn back_to_missing_target_is_a_noop() {
        let mut root = controller(&["Home", "A"], "Home");
        let a = root.destinations().get("A").cloned().unwrap();
        root.navigate(&a).unwrap();

        assert!(!root.back_with(BackOptions::new().to(BackTarget::name("Ghost"))));
        assert_eq!(root.len(), 2);
        assert_eq!(current_name(&root), "A");
    }

    #[test]
    fn replace_discards_current() {
        let mut root = controller(&["Home", "A", "B"], "Home");
        let a = root.destinations().get("A").cloned().unwrap();
        let b = root.destinations().get("B").cloned().unwrap();
        root.navigate(&a).unwrap();
        root.replace(&b).unwrap();

        assert_eq!(root.len(), 2);
        assert_eq!(current_name(&root), "B");
        assert!(root.back());
        assert_eq!(current_name(&root), "Home");

        let closed = root.take_closed();
        assert_eq!(closed.len(), 2); // A (replaced) and B (popped)
    }

    #[test]
    fn back_result_lands_on_new_current() {
        let mut root = controller(&["Home", "Picker"], "Home");
        let picker = root.destinations().get("Picker").cloned().unwrap();
        root.navigate(&picker).unwrap();

        assert!(root.back_with(BackOptions::new().with_result(Box::new("blue".to_string()))));
        let home = root.current_mut().unwrap();
        assert_eq!(*home.take_result::<String>().unwrap(), "blue");
        assert!(home.take_result::<String>().is_none());
    }

    #[test]
    fn edit_removes_exactly_target_and_keeps_order() {
        let mut root = controller(&["Home", "A", "B", "C"], "Home");
        for name in ["A", "B", "C"] {
            let d = root.destinations().get(name).cloned().unwrap();
            root.navigate(&d).unwrap();
        }
        let target = root.entries()[2].instance_id().clone();
        root.edit_back_stack(|entries| {
            entries.retain(|e| e.instance_id() != &target);
        })
        .unwrap();

        let names: Vec<_> = root
            .entries()
            .iter()
            .map(|e| e.destination().name().to_string())
            .collect();
        assert_eq!(names, ["Home", "A", "C"]);
        assert_eq!(current_name(&root), "C");
    }

    #[test]
    fn edit_clear_and_push_fresh_entries() {
        let mut root = controller(&["Home", "A"], "Home");
        let a = root.destinations().get("A").cloned().unwrap();
        root.navigate(&a).unwrap();

        let fresh = root.make_entry(&a, Some(json!({"reset": true}))).unwrap();
        root.edit_back_stack(|entries| {
            entries.clear();
            entries.push(fresh);
        })
        .unwrap();

        assert_eq!(root.len(), 1);
        assert_eq!(current_name(&root), "A");
        assert_eq!(
            root.current().unwrap().nav_args().unwrap()["reset"],
            json!(true)
        );
    }

    #[test]
    fn edit_rejects_undeclared_destination() {
        let mut root = controller(&["Home"], "Home");
        let foreign = NavEntry::new(
            "Ghost#0".to_string(),
            dest("Ghost"),
            None,
            None,
        );
        let err = root
            .edit_back_stack(|entries| entries.push(foreign))
            .unwrap_err();
        assert!(matches!(err, NavError::UnknownDestination(_)));
    }

    #[test]
    fn rejected_edit_keeps_the_declared_stack() {
        let mut root = controller(&["Home"], "Home");
        let home_id = root.current().unwrap().instance_id().clone();

        // An entry owned by a different controller must never land here.
        let mut other = controller(&["Start", "Alien"], "Start");
        let alien = other.destinations().get("Alien").cloned().unwrap();
        other.navigate(&alien).unwrap();
        other.back();
        let foreign = other.take_closed().pop().unwrap();

        let err = root
            .edit_back_stack(|entries| entries.push(foreign))
            .unwrap_err();
        assert!(matches!(err, NavError::UnknownDestination(name) if name == "Alien"));

        let names: Vec<_> = root
            .entries()
            .iter()
            .map(|e| e.destination().name().to_string())
            .collect();
        assert_eq!(names, ["Home"]);
        assert_eq!(root.current().unwrap().instance_id(), &home_id);
        assert!(root.take_updates().is_empty());
    }

    #[test]
    fn rejected_edit_restores_prior_order() {
        let mut root = controller(&["Home", "A", "B"], "Home");
        for name in ["A", "B"] {
            let d = root.destinations().get(name).cloned().unwrap();
            root.navigate(&d).unwrap();
        }
        let err = root
            .edit_back_stack(|entries| {
                entries.swap(0, 2);
                entries.push(NavEntry::new("Ghost#0".to_string(), dest("Ghost"), None, None));
            })
            .unwrap_err();
        assert!(matches!(err, NavError::UnknownDestination(_)));

        let names: Vec<_> = root
            .entries()
            .iter()
            .map(|e| e.destination().name().to_string())
            .collect();
        assert_eq!(names, ["Home", "A", "B"]);
    }

    #[test]
    fn child_consumes_back_before_parent() {
        let mut root = controller(&["Host"], "Host");
        let step = dest("Step");
        let seed = ChildFlowSpec::new(vec![step.clone()], "Step");
        {
            let child = root.child_controller("flow", &seed).unwrap();
            child.navigate(&step).unwrap();
            assert_eq!(child.len(), 2);
        }

        assert!(root.can_go_back());
        assert!(root.back());
        assert_eq!(root.len(), 1); // parent stack untouched

        let child = root.current().unwrap().child("flow").unwrap();
        assert_eq!(child.len(), 1);
        assert!(!root.can_go_back());
        assert!(!root.back());
    }

    #[test]
    fn declared_child_uses_nested_flows_capability() {
        use crate::destination::NestedFlows;
        use std::sync::Arc;

        let step = dest("Step");
        let host = Destination::build("Host")
            .capability(Arc::new(NestedFlows::new().with_child(
                "flow",
                ChildFlowSpec::new(vec![step.clone()], "Step"),
            )))
            .finish();
        let ctx = NavContext::new(NavConfig::new());
        let mut root = ctx
            .controller("root", [host], "Host", StorageMode::Savable)
            .unwrap();

        let child = root.declared_child("flow").unwrap();
        assert_eq!(child.key(), "flow");
        assert_eq!(child.path(), "root/flow");
        assert!(root.declared_child("missing").is_err());
    }

    #[test]
    fn gesture_cancel_leaves_current_untouched() {
        let mut root = controller(&["Home", "A"], "Home");
        let a = root.destinations().get("A").cloned().unwrap();
        root.navigate(&a).unwrap();
        root.take_updates();

        let mut gesture = root.begin_back_gesture().expect("gesture");
        gesture.update(0.6);
        gesture.cancel();
        assert!(!root.settle_gesture(gesture));

        assert_eq!(current_name(&root), "A");
        assert_eq!(root.len(), 2);
        assert!(root.take_updates().is_empty());
    }

    #[test]
    fn gesture_finish_commits_the_pop() {
        let mut root = controller(&["Home", "A"], "Home");
        let a = root.destinations().get("A").cloned().unwrap();
        root.navigate(&a).unwrap();

        let mut gesture = root.begin_back_gesture().expect("gesture");
        gesture.update(0.9);
        gesture.finish();
        assert!(root.settle_gesture(gesture));
        assert_eq!(current_name(&root), "Home");
        assert_eq!(root.len(), 1);
    }

    #[test]
    fn gesture_back_delegates_to_child_first() {
        let mut root = controller(&["Home", "Host"], "Home");
        let host = root.destinations().get("Host").cloned().unwrap();
        root.navigate(&host).unwrap();
        let step = dest("Step");
        let seed = ChildFlowSpec::new(vec![step.clone()], "Step");
        {
            let child = root.child_controller("flow", &seed).unwrap();
            child.navigate(&step).unwrap();
        }

        let mut gesture = root.begin_back_gesture().expect("gesture");
        gesture.finish();
        assert!(root.settle_gesture(gesture));

        // The child popped; the parent stack is untouched, same as back().
        assert_eq!(root.len(), 2);
        assert_eq!(current_name(&root), "Host");
        let child = root.current().unwrap().child("flow").unwrap();
        assert_eq!(child.len(), 1);
    }

    #[test]
    fn gesture_starts_when_only_a_child_can_pop() {
        let mut root = controller(&["Host"], "Host");
        let step = dest("Step");
        let seed = ChildFlowSpec::new(vec![step.clone()], "Step");
        {
            let child = root.child_controller("flow", &seed).unwrap();
            child.navigate(&step).unwrap();
        }

        let mut gesture = root.begin_back_gesture().expect("child can pop");
        gesture.finish();
        assert!(root.settle_gesture(gesture));
        assert_eq!(root.len(), 1);
        assert_eq!(root.current().unwrap().child("flow").unwrap().len(), 1);

        // Nothing left to pop anywhere.
        assert!(root.begin_back_gesture().is_none());
    }

    #[test]
    fn navigate_during_gesture_is_deferred() {
        let mut root = controller(&["Home", "A", "B"], "Home");
        let a = root.destinations().get("A").cloned().unwrap();
        let b = root.destinations().get("B").cloned().unwrap();
        root.navigate(&a).unwrap();

        let mut gesture = root.begin_back_gesture().expect("gesture");
        root.navigate(&b).unwrap();
        assert_eq!(root.len(), 2); // not applied yet
        assert!(!root.back()); // the gesture owns the back interaction

        gesture.finish();
        assert!(root.settle_gesture(gesture));
        // Pop committed first, then the deferred navigate.
        let names: Vec<_> = root
            .entries()
            .iter()
            .map(|e| e.destination().name().to_string())
            .collect();
        assert_eq!(names, ["Home", "B"]);
    }

    #[test]
    fn second_gesture_cannot_start_while_one_is_active() {
        let mut root = controller(&["Home", "A"], "Home");
        let a = root.destinations().get("A").cloned().unwrap();
        root.navigate(&a).unwrap();

        let gesture = root.begin_back_gesture().expect("gesture");
        assert!(root.begin_back_gesture().is_none());
        root.settle_gesture(gesture);
    }

    #[test]
    fn updates_report_direction_and_one_shot_override() {
        let mut root = controller(&["Home", "A"], "Home");
        let a = root.destinations().get("A").cloned().unwrap();
        root.navigate_with(&a, None, None, Some(TransitionSpec::named("slide")))
            .unwrap();

        let updates = root.take_updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].kind, NavUpdateKind::Navigated);
        assert_eq!(updates[0].destination.as_deref(), Some("A"));
        assert!(updates[0].forward);
        assert_eq!(
            updates[0].transition.as_ref().unwrap().name,
            "slide".to_string()
        );

        // One-shot: consumed by the renderer, gone afterwards.
        assert!(root.take_transition_override().is_some());
        assert!(root.take_transition_override().is_none());

        root.back();
        let updates = root.take_updates();
        assert_eq!(updates[0].kind, NavUpdateKind::Popped);
        assert!(!updates[0].forward);
    }

    #[test]
    fn nav_stack_flattens_through_active_child() {
        let mut root = controller(&["Host", "Other"], "Host");
        let step = dest("Step");
        let seed = ChildFlowSpec::new(vec![step.clone()], "Step");
        {
            let child = root.child_controller("flow", &seed).unwrap();
            child.navigate(&step).unwrap();
        }

        let flattened: Vec<_> = root
            .nav_stack()
            .iter()
            .map(|e| e.destination().name().to_string())
            .collect();
        assert_eq!(flattened, ["Host", "Step", "Step"]);
    }

    #[test]
    fn controller_scoped_values_are_shared_across_screens() {
        use std::sync::Arc;

        let mut root = controller(&["Home", "A"], "Home");
        let shared = root
            .scoped()
            .get_or_insert_with::<String, _>(|| "session".to_string())
            .unwrap();

        // Still the same value after the stack churns.
        let a = root.destinations().get("A").cloned().unwrap();
        root.navigate(&a).unwrap();
        root.back();
        let again = root.scoped().get::<String>().unwrap();
        assert!(Arc::ptr_eq(&shared, &again));
    }

    #[test]
    fn child_inherits_storage_mode_unless_overridden() {
        let mut root = controller(&["Host"], "Host");
        let step = dest("Step");
        let inherit = ChildFlowSpec::new(vec![step.clone()], "Step");
        assert_eq!(
            root.child_controller("a", &inherit).unwrap().mode(),
            StorageMode::Savable
        );
        let overridden =
            ChildFlowSpec::new(vec![step.clone()], "Step").with_mode(StorageMode::Memory);
        assert_eq!(
            root.child_controller("b", &overridden).unwrap().mode(),
            StorageMode::Memory
        );
    }
}
