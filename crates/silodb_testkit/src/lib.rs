//! # SiloDB Testkit
//!
//! Test utilities for SiloDB.
//!
//! This crate provides:
//! - Temporary database fixtures with automatic cleanup
//! - Persistable fixture types exercising every field kind
//! - Property-based generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use silodb_testkit::prelude::*;
//!
//! #[test]
//! fn test_with_database() {
//!     with_temp_db(|db| {
//!         db.save(&mut Person::new("Ada", 36)).unwrap();
//!     });
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
}

pub use fixtures::*;
pub use generators::*;
