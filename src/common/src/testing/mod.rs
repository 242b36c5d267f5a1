//! Test utilities for iSynergies.
//!
//! This module is only available when the `testing` feature is enabled or during tests:
//!
//! ```toml
//! [dev-dependencies]
//! common = { path = "../common", features = ["testing"] }
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use common::testing::{FakeBlobBackend, TestConfigBuilder};
//!
//! let config = TestConfigBuilder::new()
//!     .in_memory()
//!     .with_admin_key("admin-key")
//!     .build();
//! let backend = FakeBlobBackend::new(&config.storage.public_url);
//! ```

mod blob_backend;
mod config_builder;

pub use crate::clock::ManualClock;
pub use blob_backend::{BlobCall, FakeBlobBackend};
pub use config_builder::TestConfigBuilder;
