//! Process-level observability: tracing setup, panic logging and the
//! global metrics registry shared by all long running tasks.

pub mod metrics;
pub mod panic_hook;
pub mod tracing;
