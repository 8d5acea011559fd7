//! Lima benchmarking suite
//!
//! This crate contains benchmarks for the graph execution engine covering
//! traversal throughput, fan-out shapes, and cycle-detection overhead.

pub mod common;

pub use common::*;
