//! Builders to construct scheduler components from configuration.

pub mod component_builder;

pub use component_builder::{build_registry, build_scheduler};
