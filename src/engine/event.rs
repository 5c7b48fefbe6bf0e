//! # Event System
//!
//! Typed twin of the message system, keyed by compile-time type identity
//! instead of a hashed request name. Dispatch internals mirror
//! [`message`](crate::engine::message): priority-ordered buckets,
//! snapshot-at-emit iteration, registrations owned by components.
//!
//! The entity system emits the built-in lifecycle events defined at the
//! bottom of this module.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crate::engine::types::{ComponentId, EntityId};

type ErasedCallback = Arc<Mutex<dyn FnMut(&dyn Any) + Send>>;

struct Registration {
    component: ComponentId,
    callback: ErasedCallback,
    priority: i32,
    order: u64,
}

impl Clone for Registration {
    fn clone(&self) -> Self {
        Self {
            component: self.component,
            callback: Arc::clone(&self.callback),
            priority: self.priority,
            order: self.order,
        }
    }
}

/// Registry of typed event callbacks keyed by event type.
///
/// Owned by the entity system; obtained through
/// [`EntitySystem::event_system`](crate::engine::system::EntitySystem::event_system).
#[derive(Default)]
pub struct EventSystem {
    buckets: RwLock<HashMap<TypeId, Vec<Registration>>>,
    next_order: AtomicU64,
}

impl EventSystem {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers `callback` for events of type `E` on behalf of
    /// `component`.
    ///
    /// At most one registration is active per `(E, component)`;
    /// re-registering replaces it. Higher priorities are invoked first;
    /// ties run in registration order.
    pub fn register_event<E: Any>(
        &self,
        component: ComponentId,
        mut callback: impl FnMut(&E) + Send + 'static,
        priority: i32,
    ) {
        let order = self.next_order.fetch_add(1, Ordering::Relaxed);
        let erased = move |any: &dyn Any| {
            if let Some(event) = any.downcast_ref::<E>() {
                callback(event);
            }
        };
        let registration = Registration {
            component,
            callback: Arc::new(Mutex::new(erased)),
            priority,
            order,
        };

        let Ok(mut buckets) = self.buckets.write() else {
            return;
        };
        let bucket = buckets.entry(TypeId::of::<E>()).or_default();
        bucket.retain(|r| r.component != component);
        bucket.push(registration);
        bucket.sort_by(|a, b| {
            b.priority.cmp(&a.priority).then(a.order.cmp(&b.order))
        });
    }

    /// Removes `component`'s registration for events of type `E`.
    pub fn unregister_event<E: Any>(&self, component: ComponentId) {
        let Ok(mut buckets) = self.buckets.write() else {
            return;
        };
        if let Some(bucket) = buckets.get_mut(&TypeId::of::<E>()) {
            bucket.retain(|r| r.component != component);
            if bucket.is_empty() {
                buckets.remove(&TypeId::of::<E>());
            }
        }
    }

    /// Removes every event registration owned by `component`.
    pub fn unregister_all_events(&self, component: ComponentId) {
        let Ok(mut buckets) = self.buckets.write() else {
            return;
        };
        buckets.retain(|_, bucket| {
            bucket.retain(|r| r.component != component);
            !bucket.is_empty()
        });
    }

    /// Number of active registrations for events of type `E`.
    pub fn event_count<E: Any>(&self) -> usize {
        match self.buckets.read() {
            Ok(buckets) => buckets
                .get(&TypeId::of::<E>())
                .map(Vec::len)
                .unwrap_or(0),
            Err(_) => 0,
        }
    }

    /// Materializes `event` and fans it out to every registration for its
    /// type, over a snapshot taken at emit time.
    pub fn emit_event<E: Any>(&self, event: E) {
        let snapshot: Vec<Registration> = match self.buckets.read() {
            Ok(buckets) => buckets
                .get(&TypeId::of::<E>())
                .cloned()
                .unwrap_or_default(),
            Err(_) => return,
        };

        for registration in &snapshot {
            if let Ok(mut callback) = registration.callback.lock() {
                (callback)(&event);
            }
        }
    }
}

/// Emitted after an entity is created.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EntityCreated {
    /// The freshly created entity.
    pub entity: EntityId,
}

/// Emitted after an entity and its components are destroyed.
///
/// The id is the pre-destruction id; it is already stale when the event
/// fires.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EntityDestroyed {
    /// The destroyed entity.
    pub entity: EntityId,
}

/// Emitted after a component is attached to an entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ComponentAttached {
    /// The attached component.
    pub component: ComponentId,
    /// The entity it was attached to.
    pub entity: EntityId,
}

/// Emitted after a component is detached from an entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ComponentDetached {
    /// The detached component.
    pub component: ComponentId,
    /// The entity it was detached from.
    pub entity: EntityId,
}

/// Emitted after a component is destroyed.
///
/// The id is the pre-destruction id; it is already stale when the event
/// fires.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ComponentDestroyed {
    /// The destroyed component.
    pub component: ComponentId,
}
