//! Per-scope read/write locks.

pub mod tree;

#[cfg(test)]
mod tree_test;

pub use tree::{TreeLockGuard, TreeLockManagement};
