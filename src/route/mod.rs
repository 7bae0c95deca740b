//! Declarative multi-segment routing.
//!
//! A [`Route`] describes a whole navigation state in one shot: push these
//! destinations, descend into that nested flow, land here. Resolution is
//! two-phase and atomic. The plan phase walks the segments against the
//! controller tree and fails without touching anything; only a fully valid
//! plan is then applied.

mod core;

pub use core::{Route, RouteBuilder, RouteSegment};
