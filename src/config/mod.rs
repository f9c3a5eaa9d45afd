//! Configuration models for the pipeline, worker pools, and scheduler.

pub mod pipeline;

pub use pipeline::{PipelineConfig, SchedulerConfig, ServiceConfig, WorkerPoolConfig};
