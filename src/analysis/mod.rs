//! Function analyses consumed by the vectorizer.

pub mod alias;
pub mod memdep;

pub use alias::{AliasOracle, AliasResult};
pub use memdep::MemoryDeps;
