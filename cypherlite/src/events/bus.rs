// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Bounded publish/subscribe bus for graph change events
//!
//! Publishing never blocks the committing thread: events go through
//! `try_send` on a bounded channel and are counted as dropped when the queue
//! is full. A dispatcher task on the bus's own runtime fans every event out
//! to the subscribers, one spawned task per subscriber.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::runtime::{Builder, Runtime};
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::storage::Mutation;
use crate::txn::TransactionId;

#[derive(Error, Debug)]
pub enum EventError {
    #[error("Event bus runtime could not be started: {0}")]
    Runtime(#[from] std::io::Error),

    #[error("Event queue capacity must be positive")]
    ZeroCapacity,
}

/// A committed change to the graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GraphEvent {
    NodeCreated { id: String, labels: Vec<String> },
    NodeUpdated { id: String },
    NodeDeleted { id: String },
    RelationshipCreated {
        id: String,
        rel_type: String,
        from: String,
        to: String,
    },
    RelationshipUpdated { id: String },
    RelationshipDeleted { id: String },
    /// An index or constraint was created or dropped
    SchemaChanged { name: String },
    TransactionCommitted {
        transaction_id: u64,
        seq: Option<u64>,
        mutations: usize,
    },
}

impl GraphEvent {
    pub fn from_mutation(mutation: &Mutation) -> Self {
        match mutation {
            Mutation::CreateNode(node) => GraphEvent::NodeCreated {
                id: node.id.clone(),
                labels: node.labels.clone(),
            },
            Mutation::UpdateNode(node) => GraphEvent::NodeUpdated { id: node.id.clone() },
            Mutation::DeleteNode(id) => GraphEvent::NodeDeleted { id: id.clone() },
            Mutation::CreateEdge(edge) => GraphEvent::RelationshipCreated {
                id: edge.id.clone(),
                rel_type: edge.rel_type.clone(),
                from: edge.from_node.clone(),
                to: edge.to_node.clone(),
            },
            Mutation::UpdateEdge(edge) => GraphEvent::RelationshipUpdated { id: edge.id.clone() },
            Mutation::DeleteEdge(id) => GraphEvent::RelationshipDeleted { id: id.clone() },
            Mutation::CreateIndex(definition) => GraphEvent::SchemaChanged {
                name: definition.name.clone(),
            },
            Mutation::CreateConstraint(definition) => GraphEvent::SchemaChanged {
                name: definition.name.clone(),
            },
            Mutation::DropIndex(name) | Mutation::DropConstraint(name) => {
                GraphEvent::SchemaChanged { name: name.clone() }
            }
        }
    }

    /// Events describing one commit: each change, then the commit marker
    pub fn for_commit(
        transaction_id: TransactionId,
        seq: Option<u64>,
        mutations: &[Mutation],
    ) -> Vec<GraphEvent> {
        let mut events: Vec<GraphEvent> = mutations.iter().map(GraphEvent::from_mutation).collect();
        events.push(GraphEvent::TransactionCommitted {
            transaction_id: transaction_id.id(),
            seq,
            mutations: mutations.len(),
        });
        events
    }
}

/// Receives events on the bus runtime
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    fn name(&self) -> &str {
        "subscriber"
    }

    async fn on_event(&self, event: Arc<GraphEvent>);
}

type Subscribers = Arc<RwLock<Vec<Arc<dyn EventSubscriber>>>>;

pub struct EventBus {
    sender: Mutex<Option<mpsc::Sender<Arc<GraphEvent>>>>,
    subscribers: Subscribers,
    runtime: Mutex<Option<Runtime>>,
    published: AtomicU64,
    dropped: AtomicU64,
    capacity: usize,
}

impl EventBus {
    /// Start a bus whose queue holds at most `capacity` undelivered events
    pub fn new(capacity: usize) -> Result<Self, EventError> {
        if capacity == 0 {
            return Err(EventError::ZeroCapacity);
        }
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("cypherlite-events")
            .enable_all()
            .build()?;
        let (sender, receiver) = mpsc::channel(capacity);
        let subscribers: Subscribers = Arc::new(RwLock::new(Vec::new()));
        runtime.spawn(Self::dispatch(receiver, subscribers.clone()));
        debug!("Started event bus with capacity {}", capacity);

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            subscribers,
            runtime: Mutex::new(Some(runtime)),
            published: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            capacity,
        })
    }

    async fn dispatch(mut receiver: mpsc::Receiver<Arc<GraphEvent>>, subscribers: Subscribers) {
        while let Some(event) = receiver.recv().await {
            let targets: Vec<Arc<dyn EventSubscriber>> = subscribers.read().clone();
            for subscriber in targets {
                let event = event.clone();
                tokio::spawn(async move {
                    subscriber.on_event(event).await;
                });
            }
        }
        debug!("Event dispatcher stopped");
    }

    pub fn subscribe(&self, subscriber: Arc<dyn EventSubscriber>) {
        info!("Subscribing '{}' to graph events", subscriber.name());
        self.subscribers.write().push(subscriber);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Queue an event without waiting; returns whether it was accepted
    pub fn publish(&self, event: GraphEvent) -> bool {
        let sender = match self.sender.lock().as_ref() {
            Some(sender) => sender.clone(),
            None => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                return false;
            }
        };
        match sender.try_send(Arc::new(event)) {
            Ok(()) => {
                self.published.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(event)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    "Event queue full (capacity {}), dropped {:?}; {} dropped so far",
                    self.capacity, event, dropped
                );
                false
            }
            Err(TrySendError::Closed(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                debug!("Event published after the dispatcher stopped");
                false
            }
        }
    }

    pub fn publish_all(&self, events: Vec<GraphEvent>) {
        for event in events {
            self.publish(event);
        }
    }

    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Stop accepting events and wind down the dispatcher
    pub fn shutdown(&self) {
        self.sender.lock().take();
        if let Some(runtime) = self.runtime.lock().take() {
            // Blocking shutdown is not allowed from inside another runtime
            if tokio::runtime::Handle::try_current().is_ok() {
                runtime.shutdown_background();
            } else {
                runtime.shutdown_timeout(Duration::from_secs(1));
            }
            debug!(
                "Event bus stopped: {} published, {} dropped",
                self.published_count(),
                self.dropped_count()
            );
        }
    }
}

impl Drop for EventBus {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("capacity", &self.capacity)
            .field("subscribers", &self.subscriber_count())
            .field("published", &self.published_count())
            .field("dropped", &self.dropped_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Edge, Node};
    use std::time::Instant;

    struct Recorder {
        events: Mutex<Vec<GraphEvent>>,
    }

    #[async_trait]
    impl EventSubscriber for Recorder {
        async fn on_event(&self, event: Arc<GraphEvent>) {
            self.events.lock().push((*event).clone());
        }
    }

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_events_from_mutations() {
        let mut node = Node::with_labels("n1".into(), vec!["Person".into()]);
        node.set_property("name".into(), crate::storage::Value::String("Ann".into()));
        let edge = Edge::new("e1".into(), "n1".into(), "n2".into(), "KNOWS".into());
        let events = GraphEvent::for_commit(
            TransactionId::from_u64(7),
            Some(3),
            &[Mutation::CreateNode(node), Mutation::CreateEdge(edge)],
        );
        assert_eq!(
            events,
            vec![
                GraphEvent::NodeCreated {
                    id: "n1".into(),
                    labels: vec!["Person".into()]
                },
                GraphEvent::RelationshipCreated {
                    id: "e1".into(),
                    rel_type: "KNOWS".into(),
                    from: "n1".into(),
                    to: "n2".into()
                },
                GraphEvent::TransactionCommitted {
                    transaction_id: 7,
                    seq: Some(3),
                    mutations: 2
                },
            ]
        );
    }

    #[test]
    fn test_subscribers_receive_published_events() {
        let bus = EventBus::new(16).unwrap();
        let recorder = Arc::new(Recorder {
            events: Mutex::new(Vec::new()),
        });
        bus.subscribe(recorder.clone());
        assert!(bus.publish(GraphEvent::NodeDeleted { id: "n1".into() }));
        assert!(wait_for(|| recorder.events.lock().len() == 1));
        assert_eq!(
            recorder.events.lock()[0],
            GraphEvent::NodeDeleted { id: "n1".into() }
        );
        assert_eq!(bus.dropped_count(), 0);
    }

    #[test]
    fn test_full_queue_drops_without_blocking() {
        let bus = EventBus::new(1).unwrap();
        let release = Arc::new(std::sync::Barrier::new(2));
        let (started_tx, started_rx) = std::sync::mpsc::channel();

        // Occupy the single dispatcher worker so nothing drains the queue
        let blocker = release.clone();
        bus.runtime.lock().as_ref().unwrap().spawn(async move {
            let _ = started_tx.send(());
            blocker.wait();
        });
        started_rx.recv().unwrap();

        let started = Instant::now();
        let accepted = (0..50)
            .filter(|i| bus.publish(GraphEvent::NodeDeleted { id: format!("n{}", i) }))
            .count();
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(accepted, 1);
        assert_eq!(bus.dropped_count(), 49);
        assert_eq!(bus.published_count(), 1);
        release.wait();
    }

    #[test]
    fn test_publish_after_shutdown_counts_as_dropped() {
        let bus = EventBus::new(4).unwrap();
        bus.shutdown();
        assert!(!bus.publish(GraphEvent::NodeDeleted { id: "n1".into() }));
        assert_eq!(bus.dropped_count(), 1);
        assert!(matches!(EventBus::new(0), Err(EventError::ZeroCapacity)));
    }
}
