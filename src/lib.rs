//! Superword-level parallelism vectorizer over a small scalar IR.
//!
//! Straight-line scalar code with:
//! - Arena-based instruction IR with integer handles
//! - Alias and memory dependence analysis
//! - Exact pack selection by branch-and-bound
//! - Lane-ordering choice by dynamic programming
//! - Structured trace events instead of ambient logging
#![deny(unsafe_op_in_unsafe_fn)]
pub mod analysis;
pub mod ir;
pub mod opt;
pub mod trace;

pub use opt::slp::{SlpConfig, SlpStats, SlpVectorize};
pub use opt::OptimizationPass;
