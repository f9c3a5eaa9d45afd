//! Builders that assemble runtime components from configuration.

pub mod pipeline_builder;

pub use pipeline_builder::{build_pipeline, build_pipeline_with, BuildError, Pipeline};
