//! Scenario tests for the folder cache.
//!
//! Every case wires the cache over counting in-memory storages through
//! `support::Harness` and checks coherence, invalidation and concurrency
//! behaviour end to end.

mod cases_move_test;

pub mod support;
