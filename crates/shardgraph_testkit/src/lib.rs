//! # ShardGraph Testkit
//!
//! Test utilities for ShardGraph.
//!
//! This crate provides:
//! - Fixture shards (`PeopleShard`, `LibraryShard`) and domain helpers
//! - Property-based generators for change sequences
//! - Tracing setup for tests
//!
//! ## Usage
//!
//! ```rust,ignore
//! use shardgraph_testkit::prelude::*;
//!
//! #[test]
//! fn adds_a_person() {
//!     let harness = TestDomain::new();
//!     let ada = harness.domain.execute(|s| add_person(s, "Ada", 36)).unwrap();
//!     assert!(people(&harness.domain.model()).persons.contains(ada));
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::init_tracing;
}

pub use fixtures::*;
pub use generators::*;

/// Installs a `tracing` subscriber for tests.
///
/// Honours `RUST_LOG` and defaults to `warn`. Safe to call from every
/// test; only the first call installs anything.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    // A subscriber installed by an earlier test is fine.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
