use std::any::Any;
use std::collections::HashMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::controller::NavController;
use crate::destination::DestinationRef;
use crate::entry::ScopedStore;

/// Unique per creation, not per destination: the same destination may occur
/// several times on one stack, each occurrence with its own id.
pub type InstanceId = String;

/// Opaque leaf state harvested from a screen before its UI is torn down.
pub type SavedLeafState = Map<String, Value>;

/// One instantiated occurrence of a destination on a back stack.
pub struct NavEntry {
    instance_id: InstanceId,
    destination: DestinationRef,
    nav_args: Option<Value>,
    free_args: Option<Box<dyn Any + Send>>,
    nav_result: Option<Box<dyn Any + Send>>,
    saved_state: Option<SavedLeafState>,
    state_sealed: bool,
    children: HashMap<String, NavController>,
    active_child: Option<String>,
    scoped: ScopedStore,
}

impl NavEntry {
    pub(crate) fn new(
        instance_id: InstanceId,
        destination: DestinationRef,
        nav_args: Option<Value>,
        free_args: Option<Box<dyn Any + Send>>,
    ) -> Self {
        Self {
            instance_id,
            destination,
            nav_args,
            free_args,
            nav_result: None,
            saved_state: None,
            state_sealed: false,
            children: HashMap::new(),
            active_child: None,
            scoped: ScopedStore::new(),
        }
    }

    pub fn instance_id(&self) -> &InstanceId {
        &self.instance_id
    }

    pub fn destination(&self) -> &DestinationRef {
        &self.destination
    }

    pub fn nav_args(&self) -> Option<&Value> {
        self.nav_args.as_ref()
    }

    /// Deserialize the nav args into a concrete type. `None` when no args
    /// are present or they do not match `T`.
    pub fn args<T: DeserializeOwned>(&self) -> Option<T> {
        self.nav_args
            .as_ref()
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    pub(crate) fn set_nav_args(&mut self, args: Option<Value>) {
        self.nav_args = args;
    }

    /// Attach a transient payload. Free args never persist and are dropped
    /// when the entry closes.
    pub fn set_free_args(&mut self, free_args: Box<dyn Any + Send>) {
        self.free_args = Some(free_args);
    }

    pub fn clear_free_args(&mut self) {
        self.free_args = None;
    }

    /// Claim the transient payload if it is a `T`. A payload of another type
    /// stays in place.
    pub fn take_free_args<T: Any>(&mut self) -> Option<Box<T>> {
        match self.free_args.take()?.downcast::<T>() {
            Ok(value) => Some(value),
            Err(other) => {
                self.free_args = Some(other);
                None
            }
        }
    }

    pub fn has_free_args(&self) -> bool {
        self.free_args.is_some()
    }

    pub(crate) fn set_result(&mut self, result: Box<dyn Any + Send>) {
        self.nav_result = Some(result);
    }

    /// Consume the result a popped descendant left behind. Reading clears
    /// the slot; a result of another type stays in place.
    pub fn take_result<T: Any>(&mut self) -> Option<Box<T>> {
        match self.nav_result.take()?.downcast::<T>() {
            Ok(value) => Some(value),
            Err(other) => {
                self.nav_result = Some(other);
                None
            }
        }
    }

    pub fn has_result(&self) -> bool {
        self.nav_result.is_some()
    }

    /// Record harvested leaf state. Writable exactly once per disposal
    /// cycle: the first write seals the slot until the entry becomes current
    /// again. Returns whether the write landed.
    pub fn record_saved_state(&mut self, state: SavedLeafState) -> bool {
        if self.state_sealed {
            return false;
        }
        self.saved_state = Some(state);
        self.state_sealed = true;
        true
    }

    /// Claim the saved leaf state, typically in place of fresh scoped-storage
    /// initialization after a restore.
    pub fn take_saved_state(&mut self) -> Option<SavedLeafState> {
        self.saved_state.take()
    }

    pub fn saved_state(&self) -> Option<&SavedLeafState> {
        self.saved_state.as_ref()
    }

    pub(crate) fn attach_restored_state(&mut self, state: SavedLeafState) {
        self.saved_state = Some(state);
        self.state_sealed = false;
    }

    /// Called when the entry becomes current again: the next disposal cycle
    /// gets a fresh write.
    pub(crate) fn reactivate(&mut self) {
        self.state_sealed = false;
    }

    pub fn child(&self, key: &str) -> Option<&NavController> {
        self.children.get(key)
    }

    pub fn child_mut(&mut self, key: &str) -> Option<&mut NavController> {
        self.children.get_mut(key)
    }

    pub(crate) fn insert_child(&mut self, key: String, controller: NavController) {
        self.children.insert(key, controller);
    }

    pub fn child_keys(&self) -> impl Iterator<Item = &str> {
        self.children.keys().map(String::as_str)
    }

    pub(crate) fn children(&self) -> &HashMap<String, NavController> {
        &self.children
    }

    pub(crate) fn children_mut(&mut self) -> &mut HashMap<String, NavController> {
        &mut self.children
    }

    /// The child controller back-delegation descends into: the explicitly
    /// marked one, or the sole child when only one exists.
    pub fn active_child_key(&self) -> Option<&str> {
        if let Some(key) = self.active_child.as_deref() {
            return Some(key);
        }
        if self.children.len() == 1 {
            return self.children.keys().next().map(String::as_str);
        }
        None
    }

    /// Mark which named child owns back delegation (split-pane layouts).
    /// Returns `false` when no child exists under that key.
    pub fn set_active_child(&mut self, key: &str) -> bool {
        if self.children.contains_key(key) {
            self.active_child = Some(key.to_string());
            true
        } else {
            false
        }
    }

    pub fn scoped(&self) -> &ScopedStore {
        &self.scoped
    }

    /// Tear down this entry: nested controllers first, then this entry's
    /// scoped values and transient slots. Saved leaf state survives so the
    /// persistence layer can still read it.
    pub(crate) fn close(&mut self) {
        for controller in self.children.values_mut() {
            controller.close();
        }
        self.children.clear();
        self.active_child = None;
        self.scoped.clear();
        self.free_args = None;
        self.nav_result = None;
    }
}

impl fmt::Debug for NavEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NavEntry")
            .field("instance_id", &self.instance_id)
            .field("destination", &self.destination.name())
            .field("nav_args", &self.nav_args)
            .field("has_free_args", &self.free_args.is_some())
            .field("has_result", &self.nav_result.is_some())
            .field("children", &self.children.keys().collect::<Vec<_>>())
            .finish()
    }
}
