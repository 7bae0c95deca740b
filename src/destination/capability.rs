use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::controller::StorageMode;
use crate::destination::DestinationRef;

/// Stable identifier for a capability extension. Tags replace runtime type
/// introspection: a capability is looked up by its tag and then downcast to
/// its concrete type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CapabilityTag(pub &'static str);

impl fmt::Display for CapabilityTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Contract implemented by destination capability extensions.
pub trait Capability: Send + Sync {
    fn tag(&self) -> CapabilityTag;
    fn as_any(&self) -> &dyn Any;
}

/// Tag-keyed registry of capability extensions attached to one destination.
/// Each tag can appear once.
#[derive(Default, Clone)]
pub struct CapabilitySet {
    entries: HashMap<CapabilityTag, Arc<dyn Capability>>,
}

impl CapabilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a capability, replacing any previous one under the same tag.
    pub fn insert(&mut self, capability: Arc<dyn Capability>) {
        self.entries.insert(capability.tag(), capability);
    }

    pub fn contains(&self, tag: CapabilityTag) -> bool {
        self.entries.contains_key(&tag)
    }

    pub fn get(&self, tag: CapabilityTag) -> Option<&Arc<dyn Capability>> {
        self.entries.get(&tag)
    }

    /// Typed lookup: fetch by tag, then downcast to the concrete capability.
    pub fn get_as<T>(&self, tag: CapabilityTag) -> Option<&T>
    where
        T: Capability + 'static,
    {
        self.entries
            .get(&tag)
            .and_then(|cap| cap.as_any().downcast_ref::<T>())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl fmt::Debug for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set()
            .entries(self.entries.keys().map(|tag| tag.0))
            .finish()
    }
}

pub const ARGS_CODEC: CapabilityTag = CapabilityTag("args-codec");

type EncodeFn = dyn Fn(&Value) -> Option<String> + Send + Sync;
type DecodeFn = dyn Fn(&str) -> Option<Value> + Send + Sync;

/// Argument serialization capability used by name-based route segments and
/// by persistence for human-readable save formats. Both directions return
/// `None` when the payload cannot be represented.
#[derive(Clone)]
pub struct ArgsCodec {
    encode: Arc<EncodeFn>,
    decode: Arc<DecodeFn>,
}

impl ArgsCodec {
    pub fn new<E, D>(encode: E, decode: D) -> Self
    where
        E: Fn(&Value) -> Option<String> + Send + Sync + 'static,
        D: Fn(&str) -> Option<Value> + Send + Sync + 'static,
    {
        Self {
            encode: Arc::new(encode),
            decode: Arc::new(decode),
        }
    }

    /// Codec that round-trips args through compact JSON text.
    pub fn json() -> Self {
        Self::new(
            |value| serde_json::to_string(value).ok(),
            |text| serde_json::from_str(text).ok(),
        )
    }

    pub fn args_to_string(&self, args: &Value) -> Option<String> {
        (self.encode)(args)
    }

    pub fn string_to_args(&self, text: &str) -> Option<Value> {
        (self.decode)(text)
    }
}

impl Capability for ArgsCodec {
    fn tag(&self) -> CapabilityTag {
        ARGS_CODEC
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub const NESTED_FLOWS: CapabilityTag = CapabilityTag("nested-flows");

/// Seed for a lazily-created child controller: the destinations the nested
/// flow declares, where it starts, and an optional storage-mode override
/// (children inherit the parent controller's mode otherwise).
#[derive(Clone)]
pub struct ChildFlowSpec {
    pub destinations: Vec<DestinationRef>,
    pub start: String,
    pub mode: Option<StorageMode>,
}

impl ChildFlowSpec {
    pub fn new(destinations: Vec<DestinationRef>, start: impl Into<String>) -> Self {
        Self {
            destinations,
            start: start.into(),
            mode: None,
        }
    }

    pub fn with_mode(mut self, mode: StorageMode) -> Self {
        self.mode = Some(mode);
        self
    }
}

/// Declares the named nested flows a destination can host. Route descension
/// and restore both consult this when the child controller does not exist
/// yet.
#[derive(Clone, Default)]
pub struct NestedFlows {
    children: HashMap<String, ChildFlowSpec>,
}

impl NestedFlows {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_child(mut self, key: impl Into<String>, spec: ChildFlowSpec) -> Self {
        self.children.insert(key.into(), spec);
        self
    }

    pub fn child(&self, key: &str) -> Option<&ChildFlowSpec> {
        self.children.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.children.keys().map(String::as_str)
    }
}

impl Capability for NestedFlows {
    fn tag(&self) -> CapabilityTag {
        NESTED_FLOWS
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
