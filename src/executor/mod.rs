//! Bounded worker pool and completion service used for backend fan-out and
//! background warm-up.

pub mod completion;
pub mod pool;

#[cfg(test)]
mod pool_test;

pub use completion::CompletionService;
pub use pool::{BoundedExecutor, Pending};
