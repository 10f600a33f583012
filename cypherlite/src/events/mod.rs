// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Change events and extension hooks
//!
//! # Features
//! - Bounded, drop-on-full event bus running on its own runtime
//! - Request, pre-commit and post-commit hooks contributed by extensions

pub mod bus;
pub mod extension;

pub use bus::{EventBus, EventError, EventSubscriber, GraphEvent};
pub use extension::{
    ActionInfo, Extension, ExtensionDescriptor, ExtensionError, ExtensionRegistry,
    PostActionHook, PreActionHook, PreRequestHook, RequestInfo, EXTENSION_API_VERSION,
};
