// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Extension capabilities and their registry
//!
//! An extension advertises optional hooks through accessor methods that
//! default to `None`. The registry inspects those accessors once, at
//! registration, and keeps only the capabilities that were offered.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::bus::{EventBus, EventSubscriber};
use crate::storage::{Mutation, Value};
use crate::txn::TransactionId;

/// Version of the hook interface extensions are compiled against
pub const EXTENSION_API_VERSION: u32 = 1;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExtensionError {
    #[error("Extension '{name}' targets API version {found}, expected {expected}")]
    IncompatibleVersion {
        name: String,
        found: u32,
        expected: u32,
    },

    #[error("Extension '{0}' is already registered")]
    Duplicate(String),

    #[error("Extension '{extension}' rejected the request: {reason}")]
    Rejected { extension: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionDescriptor {
    pub name: String,
    pub version: String,
    pub api_version: u32,
}

impl ExtensionDescriptor {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            api_version: EXTENSION_API_VERSION,
        }
    }
}

/// A query about to be parsed
#[derive(Debug)]
pub struct RequestInfo<'a> {
    pub query: &'a str,
    pub session_id: Option<&'a str>,
    pub params: &'a HashMap<String, Value>,
}

/// A transaction about to commit, or one that just did
#[derive(Debug)]
pub struct ActionInfo<'a> {
    pub transaction_id: TransactionId,
    pub session_id: Option<&'a str>,
    pub mutations: &'a [Mutation],
}

/// Runs before a query is parsed; an `Err` rejects it
pub trait PreRequestHook: Send + Sync {
    fn before_request(&self, request: &RequestInfo<'_>) -> Result<(), String>;
}

/// Runs before a transaction commits; an `Err` vetoes the commit
pub trait PreActionHook: Send + Sync {
    fn before_commit(&self, action: &ActionInfo<'_>) -> Result<(), String>;
}

/// Observes a commit after it is durable
pub trait PostActionHook: Send + Sync {
    fn after_commit(&self, action: &ActionInfo<'_>, seq: Option<u64>);
}

pub trait Extension: Send + Sync {
    fn descriptor(&self) -> ExtensionDescriptor;

    fn pre_request(&self) -> Option<Arc<dyn PreRequestHook>> {
        None
    }

    fn pre_action(&self) -> Option<Arc<dyn PreActionHook>> {
        None
    }

    fn post_action(&self) -> Option<Arc<dyn PostActionHook>> {
        None
    }

    fn event_subscriber(&self) -> Option<Arc<dyn EventSubscriber>> {
        None
    }
}

#[derive(Default)]
pub struct ExtensionRegistry {
    descriptors: Vec<ExtensionDescriptor>,
    pre_request: Vec<(String, Arc<dyn PreRequestHook>)>,
    pre_action: Vec<(String, Arc<dyn PreActionHook>)>,
    post_action: Vec<(String, Arc<dyn PostActionHook>)>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check the extension's descriptor and wire up whatever it offers
    pub fn register(
        &mut self,
        extension: &dyn Extension,
        bus: &EventBus,
    ) -> Result<ExtensionDescriptor, ExtensionError> {
        let descriptor = extension.descriptor();
        if descriptor.api_version != EXTENSION_API_VERSION {
            return Err(ExtensionError::IncompatibleVersion {
                name: descriptor.name,
                found: descriptor.api_version,
                expected: EXTENSION_API_VERSION,
            });
        }
        if self.descriptors.iter().any(|d| d.name == descriptor.name) {
            return Err(ExtensionError::Duplicate(descriptor.name));
        }

        let name = descriptor.name.clone();
        let mut capabilities = Vec::new();
        if let Some(hook) = extension.pre_request() {
            self.pre_request.push((name.clone(), hook));
            capabilities.push("pre_request");
        }
        if let Some(hook) = extension.pre_action() {
            self.pre_action.push((name.clone(), hook));
            capabilities.push("pre_action");
        }
        if let Some(hook) = extension.post_action() {
            self.post_action.push((name.clone(), hook));
            capabilities.push("post_action");
        }
        if let Some(subscriber) = extension.event_subscriber() {
            bus.subscribe(subscriber);
            capabilities.push("event_subscriber");
        }
        info!(
            "Registered extension {} {} with capabilities [{}]",
            descriptor.name,
            descriptor.version,
            capabilities.join(", ")
        );
        self.descriptors.push(descriptor.clone());
        Ok(descriptor)
    }

    pub fn descriptors(&self) -> &[ExtensionDescriptor] {
        &self.descriptors
    }

    pub fn check_request(&self, request: &RequestInfo<'_>) -> Result<(), ExtensionError> {
        for (extension, hook) in &self.pre_request {
            hook.before_request(request)
                .map_err(|reason| ExtensionError::Rejected {
                    extension: extension.clone(),
                    reason,
                })?;
        }
        Ok(())
    }

    pub fn check_action(&self, action: &ActionInfo<'_>) -> Result<(), ExtensionError> {
        for (extension, hook) in &self.pre_action {
            hook.before_commit(action).map_err(|reason| ExtensionError::Rejected {
                extension: extension.clone(),
                reason,
            })?;
        }
        Ok(())
    }

    pub fn notify_action(&self, action: &ActionInfo<'_>, seq: Option<u64>) {
        for (extension, hook) in &self.post_action {
            debug!("Post-action hook of {} for {}", extension, action.transaction_id);
            hook.after_commit(action, seq);
        }
    }

    pub fn has_action_hooks(&self) -> bool {
        !self.pre_action.is_empty() || !self.post_action.is_empty()
    }
}

impl std::fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionRegistry")
            .field("extensions", &self.descriptors)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct DenyWrites;

    impl PreActionHook for DenyWrites {
        fn before_commit(&self, action: &ActionInfo<'_>) -> Result<(), String> {
            if action.mutations.is_empty() {
                Ok(())
            } else {
                Err("read-only mode".to_string())
            }
        }
    }

    struct ReadOnly {
        api_version: u32,
    }

    impl Extension for ReadOnly {
        fn descriptor(&self) -> ExtensionDescriptor {
            ExtensionDescriptor {
                name: "read-only".into(),
                version: "0.1.0".into(),
                api_version: self.api_version,
            }
        }

        fn pre_action(&self) -> Option<Arc<dyn PreActionHook>> {
            Some(Arc::new(DenyWrites))
        }
    }

    #[test]
    fn test_registration_checks_version_and_duplicates() {
        let bus = EventBus::new(4).unwrap();
        let mut registry = ExtensionRegistry::new();

        let err = registry
            .register(&ReadOnly { api_version: 99 }, &bus)
            .unwrap_err();
        assert!(matches!(err, ExtensionError::IncompatibleVersion { found: 99, .. }));

        let extension = ReadOnly {
            api_version: EXTENSION_API_VERSION,
        };
        registry.register(&extension, &bus).unwrap();
        assert_eq!(
            registry.register(&extension, &bus).unwrap_err(),
            ExtensionError::Duplicate("read-only".into())
        );
        assert_eq!(registry.descriptors().len(), 1);
        assert!(registry.has_action_hooks());
    }

    #[test]
    fn test_pre_action_veto_names_extension() {
        let bus = EventBus::new(4).unwrap();
        let mut registry = ExtensionRegistry::new();
        registry
            .register(
                &ReadOnly {
                    api_version: EXTENSION_API_VERSION,
                },
                &bus,
            )
            .unwrap();

        let empty = ActionInfo {
            transaction_id: TransactionId::from_u64(1),
            session_id: None,
            mutations: &[],
        };
        assert!(registry.check_action(&empty).is_ok());

        let mutations = vec![Mutation::DeleteNode("n1".into())];
        let write = ActionInfo {
            transaction_id: TransactionId::from_u64(2),
            session_id: Some("s1"),
            mutations: &mutations,
        };
        match registry.check_action(&write) {
            Err(ExtensionError::Rejected { extension, reason }) => {
                assert_eq!(extension, "read-only");
                assert_eq!(reason, "read-only mode");
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
