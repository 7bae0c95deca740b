//! Navigation core for tree-structured application UIs.
//!
//! A `NavController` owns one typed back stack of destination instances and
//! may nest child controllers under individual entries, forming a tree.
//! Controllers resolve declarative routes atomically, round-trip through a
//! serializable save format, and coordinate gesture-driven transitions
//! without ever rendering anything themselves.

pub mod controller;
pub mod destination;
pub mod entry;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod persist;
pub mod route;
pub mod stack;
pub mod transition;

pub use controller::{
    BackOptions, BackTarget, DuplicatePolicy, NavConfig, NavContext, NavController, NavUpdate,
    NavUpdateKind, StorageMode,
};
pub use destination::{
    ARGS_CODEC, ArgsCodec, Capability, CapabilitySet, CapabilityTag, ChildFlowSpec, Destination,
    DestinationBuilder, DestinationRef, DestinationSet, NESTED_FLOWS, NestedFlows,
};
pub use entry::{InstanceId, NavEntry, SavedLeafState, ScopedError, ScopedStore};
pub use error::{NavError, Result};
pub use logging::{
    FileSink, LogEvent, LogFields, LogLevel, LogSink, Logger, LoggingError, LoggingResult,
    MemorySink,
};
pub use metrics::{MetricSnapshot, NavMetrics};
pub use persist::{ControllerState, EntryState};
pub use route::{Route, RouteBuilder, RouteSegment};
pub use stack::BackStack;
pub use transition::{GestureKind, GesturePhase, TransitionCoordinator, TransitionSpec};
