//! Shared utilities: clocks, tracing setup, and bounded thread joins.

pub mod clock;
pub mod telemetry;
pub mod thread;

pub use clock::*;
pub use telemetry::*;
pub use thread::*;
