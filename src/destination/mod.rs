//! Destination module orchestrator.
//!
//! Public types are re-exported here; the declaration model lives in the
//! private `core` module and the capability registry in `capability`.

mod capability;
mod core;

pub use capability::{
    ARGS_CODEC, ArgsCodec, Capability, CapabilitySet, CapabilityTag, ChildFlowSpec, NESTED_FLOWS,
    NestedFlows,
};
pub use core::{Destination, DestinationBuilder, DestinationRef, DestinationSet};
