//! Package sources.
//!
//! The package index mirror and upstream tag discovery.

pub mod registry;
pub mod tags;

pub use registry::{PackageIndex, Registry, UpdateOutcome};
pub use tags::{GitTagLister, TagDiscovery, TagLister};
