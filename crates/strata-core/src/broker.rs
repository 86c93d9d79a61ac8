//! In-process publish/subscribe.
//!
//! A [`Broker`] connects "event durably appended" to "interested handlers
//! run". Subscriptions live in memory only: they are rebuilt at process start
//! by re-registering handlers, so handlers must tolerate seeing an event more
//! than once.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, Weak};

use async_trait::async_trait;
use futures::future::try_join_all;

use crate::error::EventStoreError;
use crate::repository::StoredEvent;

/// A subscriber invoked for each matching published event.
///
/// The handler receives the same unit of work the event was appended with,
/// so read-model writes join the append's transaction.
#[async_trait]
pub trait EventHandler<Db>: Send + Sync {
    /// Handles one published event.
    async fn handle(&self, db: &Db, event: &StoredEvent) -> Result<(), EventStoreError>;
}

/// Fan-out of published events to registered handlers.
#[async_trait]
pub trait Broker<Db: Send + Sync + 'static>: Send + Sync {
    /// Invokes every matching handler and waits for all of them.
    async fn publish(&self, db: &Db, event: &StoredEvent) -> Result<(), EventStoreError>;

    /// Registers `handler` for the given event types.
    fn subscribe(&self, event_types: &[&str], handler: Arc<dyn EventHandler<Db>>)
    -> Subscription;

    /// Registers `handler` for every event.
    fn subscribe_to_all(&self, handler: Arc<dyn EventHandler<Db>>) -> Subscription;
}

/// A live registration. Dropping it leaves the handler registered; call
/// [`Subscription::unsubscribe`] to remove it.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Wraps the function that removes the registration.
    #[must_use]
    pub fn new(cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Removes the registration.
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

type HandlerList<Db> = Vec<(u64, Arc<dyn EventHandler<Db>>)>;

struct Registry<Db> {
    next_id: u64,
    by_type: HashMap<String, HandlerList<Db>>,
    catch_all: HandlerList<Db>,
}

impl<Db> Registry<Db> {
    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn remove(&mut self, id: u64) {
        for handlers in self.by_type.values_mut() {
            handlers.retain(|(handler_id, _)| *handler_id != id);
        }
        self.by_type.retain(|_, handlers| !handlers.is_empty());
        self.catch_all.retain(|(handler_id, _)| *handler_id != id);
    }
}

/// [`Broker`] that runs handlers in the publishing task.
///
/// `publish` runs all handlers registered for the event's type concurrently,
/// then all catch-all handlers concurrently. It returns once both phases have
/// finished, so every handler for one event completes before the next event is
/// published. The first handler error is returned.
pub struct InMemoryBroker<Db> {
    registry: Arc<RwLock<Registry<Db>>>,
}

impl<Db: Send + Sync + 'static> InMemoryBroker<Db> {
    /// Creates a broker with no subscriptions.
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: Arc::new(RwLock::new(Registry {
                next_id: 0,
                by_type: HashMap::new(),
                catch_all: Vec::new(),
            })),
        }
    }

    /// Number of active registrations (a multi-type registration counts once
    /// per type).
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
        registry.by_type.values().map(Vec::len).sum::<usize>() + registry.catch_all.len()
    }

    fn cancel_handle(&self, id: u64) -> Subscription {
        let registry: Weak<RwLock<Registry<Db>>> = Arc::downgrade(&self.registry);
        Subscription::new(move || {
            if let Some(registry) = registry.upgrade() {
                if let Ok(mut registry) = registry.write() {
                    registry.remove(id);
                }
            }
        })
    }

    fn snapshot(
        &self,
        event_type: &str,
    ) -> Result<(Vec<Arc<dyn EventHandler<Db>>>, Vec<Arc<dyn EventHandler<Db>>>), EventStoreError>
    {
        let registry = self
            .registry
            .read()
            .map_err(|_| EventStoreError::Infrastructure("broker registry lock poisoned".into()))?;
        let typed = registry
            .by_type
            .get(event_type)
            .map(|handlers| handlers.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default();
        let catch_all = registry
            .catch_all
            .iter()
            .map(|(_, h)| Arc::clone(h))
            .collect();
        Ok((typed, catch_all))
    }
}

impl<Db: Send + Sync + 'static> Default for InMemoryBroker<Db> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Db> Clone for InMemoryBroker<Db> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<Db> fmt::Debug for InMemoryBroker<Db> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryBroker").finish_non_exhaustive()
    }
}

#[async_trait]
impl<Db: Send + Sync + 'static> Broker<Db> for InMemoryBroker<Db> {
    async fn publish(&self, db: &Db, event: &StoredEvent) -> Result<(), EventStoreError> {
        let (typed, catch_all) = self.snapshot(&event.event_type)?;
        tracing::trace!(
            event_type = %event.event_type,
            event_id = %event.event_id,
            typed = typed.len(),
            catch_all = catch_all.len(),
            "publishing event"
        );

        try_join_all(typed.iter().map(|handler| handler.handle(db, event))).await?;
        try_join_all(catch_all.iter().map(|handler| handler.handle(db, event))).await?;
        Ok(())
    }

    fn subscribe(
        &self,
        event_types: &[&str],
        handler: Arc<dyn EventHandler<Db>>,
    ) -> Subscription {
        let id = {
            let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
            let id = registry.allocate_id();
            for event_type in event_types {
                registry
                    .by_type
                    .entry((*event_type).to_owned())
                    .or_default()
                    .push((id, Arc::clone(&handler)));
            }
            id
        };
        self.cancel_handle(id)
    }

    fn subscribe_to_all(&self, handler: Arc<dyn EventHandler<Db>>) -> Subscription {
        let id = {
            let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
            let id = registry.allocate_id();
            registry.catch_all.push((id, handler));
            id
        };
        self.cancel_handle(id)
    }
}
