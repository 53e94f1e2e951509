//! cforge - a project manager for C and C++
//!
//! This crate provides the core library functionality for cforge:
//! the manifest model, the package index, dependency resolution and the
//! lock file.

pub mod core;
pub mod ops;
pub mod resolver;
pub mod sources;
pub mod util;

pub use crate::core::{dependency::DependencySpec, manifest::Manifest, package::PackageDefinition};

pub use resolver::{Resolution, Resolver};
pub use util::context::GlobalContext;
