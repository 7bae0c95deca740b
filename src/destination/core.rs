use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::destination::capability::{
    ARGS_CODEC, ArgsCodec, Capability, CapabilitySet, CapabilityTag, NESTED_FLOWS, NestedFlows,
};

/// Shared handle to an immutable destination declaration. Created once at
/// startup; many entries may reference the same destination.
pub type DestinationRef = Arc<Destination>;

/// Immutable declaration of a navigable unit: a stable name, an optional
/// argument type tag used to sanity-check payloads at runtime, and zero or
/// more capability extensions.
pub struct Destination {
    name: String,
    args_tag: Option<String>,
    capabilities: CapabilitySet,
}

impl Destination {
    /// Start building a destination. Finish with [`DestinationBuilder::finish`].
    pub fn build(name: impl Into<String>) -> DestinationBuilder {
        DestinationBuilder {
            name: name.into(),
            args_tag: None,
            capabilities: CapabilitySet::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args_tag(&self) -> Option<&str> {
        self.args_tag.as_deref()
    }

    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    pub fn capability<T>(&self, tag: CapabilityTag) -> Option<&T>
    where
        T: Capability + 'static,
    {
        self.capabilities.get_as::<T>(tag)
    }

    pub fn args_codec(&self) -> Option<&ArgsCodec> {
        self.capability::<ArgsCodec>(ARGS_CODEC)
    }

    pub fn nested_flows(&self) -> Option<&NestedFlows> {
        self.capability::<NestedFlows>(NESTED_FLOWS)
    }
}

impl fmt::Debug for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Destination")
            .field("name", &self.name)
            .field("args_tag", &self.args_tag)
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

/// Builder producing an immutable [`DestinationRef`].
pub struct DestinationBuilder {
    name: String,
    args_tag: Option<String>,
    capabilities: CapabilitySet,
}

impl DestinationBuilder {
    pub fn args_tag(mut self, tag: impl Into<String>) -> Self {
        self.args_tag = Some(tag.into());
        self
    }

    pub fn capability(mut self, capability: Arc<dyn Capability>) -> Self {
        self.capabilities.insert(capability);
        self
    }

    pub fn finish(self) -> DestinationRef {
        Arc::new(Destination {
            name: self.name,
            args_tag: self.args_tag,
            capabilities: self.capabilities,
        })
    }
}

/// The set of destinations one controller declares. Names are unique within
/// a set; a later insert under the same name replaces the earlier one.
#[derive(Clone, Default)]
pub struct DestinationSet {
    by_name: HashMap<String, DestinationRef>,
}

impl DestinationSet {
    pub fn new(destinations: impl IntoIterator<Item = DestinationRef>) -> Self {
        let mut set = Self::default();
        for dest in destinations {
            set.insert(dest);
        }
        set
    }

    pub fn insert(&mut self, destination: DestinationRef) {
        self.by_name
            .insert(destination.name().to_string(), destination);
    }

    pub fn get(&self, name: &str) -> Option<&DestinationRef> {
        self.by_name.get(name)
    }

    /// Membership is by declared name, not pointer identity.
    pub fn contains(&self, destination: &Destination) -> bool {
        self.by_name.contains_key(destination.name())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.by_name.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

impl fmt::Debug for DestinationSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.by_name.keys()).finish()
    }
}
