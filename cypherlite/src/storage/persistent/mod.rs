// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Persistent storage drivers
//!
//! Trait-based abstractions over embedded key-value stores, so the
//! key-value backend can run on sled or on an in-memory map.
//!
//! # Architecture
//!
//! ```text
//! KvBackend (nodes / edges / schema / meta trees)
//!     ↓
//! StorageDriver (key-value abstraction)
//!     ↓
//! Concrete Implementations (Sled, Memory)
//! ```

// Core modules
pub mod factory;
pub mod traits;
pub mod types;

// Driver implementations
pub mod memory;
#[cfg(feature = "sled-backend")]
pub mod sled;

// Public API re-exports
pub use factory::{create_storage_driver, BoxedDriver};
pub use traits::{StorageDriver, StorageTree};
pub use types::{StorageDriverError, StorageResult, StorageType};
