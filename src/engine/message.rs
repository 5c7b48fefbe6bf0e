//! # Message System
//!
//! Request-id-keyed dispatch of type-erased callbacks registered per
//! component.
//!
//! ## Model
//! A *request* is named by a [`RequestId`]: the FNV-1a hash of a request
//! name, or any integer literal. Components register callbacks against a
//! request; senders fan a [`Message`] envelope out to every registration
//! in the request's bucket, ordered by descending priority and then by
//! registration order.
//!
//! A registration is either **global** (hears every message for its
//! request) or **local** (hears only messages directed at its owning
//! entity). Local sends reach all registrations whose owning component is
//! attached to the target entity, local and global alike.
//!
//! ## Questions
//! A message used as a question carries a `handled` flag: the first
//! callback that answers sets it (typically via [`Message::handle`]) and
//! dispatch stops, returning the mutated envelope to the sender. Absence
//! of a response is modeled by `handled` staying `false`; inspect it
//! before reading the payload.
//!
//! ## Re-entrancy
//! Each dispatch iterates a snapshot of the bucket taken at send time, so
//! callbacks are free to register and unregister during dispatch; new
//! registrations become visible on the next dispatch.

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crate::engine::system::EntitySystem;
use crate::engine::types::{ComponentId, EntityId, RequestId};

/// Type-erased, heap-backed message payload.
///
/// Built from any `Send` value; accessors check the stored type and
/// return `None` on mismatch.
#[derive(Default)]
pub struct Payload {
    data: Option<Box<dyn Any + Send>>,
}

impl Payload {
    /// Wraps `value` in a payload.
    pub fn new<T: Any + Send>(value: T) -> Self {
        Self {
            data: Some(Box::new(value)),
        }
    }

    /// The empty payload.
    pub fn none() -> Self {
        Self { data: None }
    }

    /// Returns `true` if no value is stored.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_none()
    }

    /// Returns `true` if the stored value is a `T`.
    pub fn is<T: Any>(&self) -> bool {
        match &self.data {
            Some(data) => data.is::<T>(),
            None => false,
        }
    }

    /// Borrows the stored value if it is a `T`.
    pub fn get<T: Any>(&self) -> Option<&T> {
        self.data.as_ref()?.downcast_ref::<T>()
    }

    /// Mutably borrows the stored value if it is a `T`.
    pub fn get_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.data.as_mut()?.downcast_mut::<T>()
    }

    /// Moves the stored value out if it is a `T`, emptying the payload.
    pub fn take<T: Any>(&mut self) -> Option<T> {
        match self.data.take() {
            Some(data) => match data.downcast::<T>() {
                Ok(value) => Some(*value),
                Err(data) => {
                    self.data = Some(data);
                    None
                }
            },
            None => None,
        }
    }
}

impl std::fmt::Debug for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.data.is_some() {
            f.write_str("Payload(..)")
        } else {
            f.write_str("Payload(none)")
        }
    }
}

/// Why a message envelope exists.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageKind {
    /// A component was created or attached.
    Create,
    /// A component was destroyed or detached.
    Destroy,
    /// A user message was sent.
    Message,
}

/// The envelope passed to message callbacks.
#[derive(Debug)]
pub struct Message {
    /// Why this envelope exists.
    pub kind: MessageKind,
    /// The component that sent the message, or the invalid sentinel.
    pub sender: ComponentId,
    /// The attached payload, possibly empty.
    pub payload: Payload,
    /// Set by a callback that answers the message.
    pub handled: bool,
}

impl Message {
    /// Creates a user message with the given sender and payload.
    pub fn new(sender: ComponentId, payload: Payload) -> Self {
        Self {
            kind: MessageKind::Message,
            sender,
            payload,
            handled: false,
        }
    }

    /// Answers the message: writes `ret` into the payload and marks the
    /// envelope handled.
    pub fn handle<T: Any + Send>(&mut self, ret: T) {
        self.payload = Payload::new(ret);
        self.handled = true;
    }
}

/// Callback invoked for each dispatched message.
pub type MessageCallback = Arc<Mutex<dyn FnMut(&mut Message) + Send>>;

struct Registration {
    component: ComponentId,
    callback: MessageCallback,
    priority: i32,
    local: bool,
    order: u64,
}

impl Clone for Registration {
    fn clone(&self) -> Self {
        Self {
            component: self.component,
            callback: Arc::clone(&self.callback),
            priority: self.priority,
            local: self.local,
            order: self.order,
        }
    }
}

/// Registry of message callbacks keyed by request id.
///
/// Owned by the entity system; obtained through
/// [`EntitySystem::message_system`]. Sends that resolve component
/// ownership or aliveness take the entity system as a parameter.
#[derive(Default)]
pub struct MessageSystem {
    buckets: RwLock<HashMap<RequestId, Vec<Registration>>>,
    next_order: AtomicU64,
}

impl MessageSystem {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers `callback` for `request` on behalf of `component`.
    ///
    /// At most one registration is active per `(request, component,
    /// local)` triple; re-registering replaces the callback and priority.
    /// Higher priorities are invoked first; ties run in registration
    /// order.
    pub fn register_message(
        &self,
        request: RequestId,
        component: ComponentId,
        callback: impl FnMut(&mut Message) + Send + 'static,
        priority: i32,
        local: bool,
    ) {
        let order = self.next_order.fetch_add(1, Ordering::Relaxed);
        let registration = Registration {
            component,
            callback: Arc::new(Mutex::new(callback)),
            priority,
            local,
            order,
        };

        let Ok(mut buckets) = self.buckets.write() else {
            return;
        };
        let bucket = buckets.entry(request).or_default();
        bucket.retain(|r| !(r.component == component && r.local == local));
        bucket.push(registration);
        bucket.sort_by(|a, b| {
            b.priority.cmp(&a.priority).then(a.order.cmp(&b.order))
        });
    }

    /// Removes `component`'s registration for `request`.
    pub fn unrequest_message(
        &self,
        request: RequestId,
        component: ComponentId,
        local: bool,
    ) {
        let Ok(mut buckets) = self.buckets.write() else {
            return;
        };
        if let Some(bucket) = buckets.get_mut(&request) {
            bucket
                .retain(|r| !(r.component == component && r.local == local));
            if bucket.is_empty() {
                buckets.remove(&request);
            }
        }
    }

    /// Removes every registration owned by `component`.
    pub fn unrequest_all_messages(&self, component: ComponentId) {
        let Ok(mut buckets) = self.buckets.write() else {
            return;
        };
        buckets.retain(|_, bucket| {
            bucket.retain(|r| r.component != component);
            !bucket.is_empty()
        });
    }

    /// Rewrites the priority of `component`'s registrations for `request`
    /// and re-sorts the bucket.
    pub fn change_request_priority(
        &self,
        request: RequestId,
        component: ComponentId,
        priority: i32,
    ) {
        let Ok(mut buckets) = self.buckets.write() else {
            return;
        };
        if let Some(bucket) = buckets.get_mut(&request) {
            for registration in bucket.iter_mut() {
                if registration.component == component {
                    registration.priority = priority;
                }
            }
            bucket.sort_by(|a, b| {
                b.priority.cmp(&a.priority).then(a.order.cmp(&b.order))
            });
        }
    }

    /// Number of active registrations for `request`.
    pub fn request_count(&self, request: RequestId) -> usize {
        match self.buckets.read() {
            Ok(buckets) => {
                buckets.get(&request).map(Vec::len).unwrap_or(0)
            }
            Err(_) => 0,
        }
    }

    fn snapshot(&self, request: RequestId) -> Vec<Registration> {
        match self.buckets.read() {
            Ok(buckets) => {
                buckets.get(&request).cloned().unwrap_or_default()
            }
            Err(_) => Vec::new(),
        }
    }

    #[inline]
    fn invoke(registration: &Registration, message: &mut Message) {
        if let Ok(mut callback) = registration.callback.lock() {
            (callback)(message);
        }
    }

    /// Sends a message to every global registration for `request`.
    pub fn send_global_message(&self, request: RequestId, payload: Payload) {
        let mut message = Message::new(ComponentId::INVALID, payload);
        for registration in &self.snapshot(request) {
            if registration.local {
                continue;
            }
            Self::invoke(registration, &mut message);
        }
    }

    /// Sends a question to global registrations, stopping at the first
    /// callback that marks the envelope handled.
    pub fn send_global_question(
        &self,
        request: RequestId,
        payload: Payload,
    ) -> Message {
        let mut message = Message::new(ComponentId::INVALID, payload);
        for registration in &self.snapshot(request) {
            if registration.local {
                continue;
            }
            Self::invoke(registration, &mut message);
            if message.handled {
                break;
            }
        }
        message
    }

    /// Like [`send_global_message`](Self::send_global_message), but
    /// re-validates each target component's aliveness immediately before
    /// invoking it.
    pub fn send_safe_global_message(
        &self,
        system: &EntitySystem,
        request: RequestId,
        payload: Payload,
    ) {
        let mut message = Message::new(ComponentId::INVALID, payload);
        for registration in &self.snapshot(request) {
            if registration.local {
                continue;
            }
            if !system.is_alive_component(registration.component) {
                continue;
            }
            Self::invoke(registration, &mut message);
        }
    }

    /// Question form of
    /// [`send_safe_global_message`](Self::send_safe_global_message).
    pub fn send_safe_global_question(
        &self,
        system: &EntitySystem,
        request: RequestId,
        payload: Payload,
    ) -> Message {
        let mut message = Message::new(ComponentId::INVALID, payload);
        for registration in &self.snapshot(request) {
            if registration.local {
                continue;
            }
            if !system.is_alive_component(registration.component) {
                continue;
            }
            Self::invoke(registration, &mut message);
            if message.handled {
                break;
            }
        }
        message
    }

    /// Sends a message to the components of one entity: every
    /// registration for `request` whose owning component is attached to
    /// `entity` is invoked, local and global alike.
    pub fn send_local_message(
        &self,
        system: &EntitySystem,
        entity: EntityId,
        request: RequestId,
        payload: Payload,
    ) {
        let mut message = Message::new(ComponentId::INVALID, payload);
        for registration in &self.snapshot(request) {
            if system.get_entity(registration.component) != entity {
                continue;
            }
            Self::invoke(registration, &mut message);
        }
    }

    /// Question form of [`send_local_message`](Self::send_local_message).
    pub fn send_local_question(
        &self,
        system: &EntitySystem,
        entity: EntityId,
        request: RequestId,
        payload: Payload,
    ) -> Message {
        let mut message = Message::new(ComponentId::INVALID, payload);
        for registration in &self.snapshot(request) {
            if system.get_entity(registration.component) != entity {
                continue;
            }
            Self::invoke(registration, &mut message);
            if message.handled {
                break;
            }
        }
        message
    }

    /// Aliveness-checking form of
    /// [`send_local_message`](Self::send_local_message).
    pub fn send_safe_local_message(
        &self,
        system: &EntitySystem,
        entity: EntityId,
        request: RequestId,
        payload: Payload,
    ) {
        let mut message = Message::new(ComponentId::INVALID, payload);
        for registration in &self.snapshot(request) {
            if !system.is_alive_component(registration.component) {
                continue;
            }
            if system.get_entity(registration.component) != entity {
                continue;
            }
            Self::invoke(registration, &mut message);
        }
    }

    /// Question form of
    /// [`send_safe_local_message`](Self::send_safe_local_message).
    pub fn send_safe_local_question(
        &self,
        system: &EntitySystem,
        entity: EntityId,
        request: RequestId,
        payload: Payload,
    ) -> Message {
        let mut message = Message::new(ComponentId::INVALID, payload);
        for registration in &self.snapshot(request) {
            if !system.is_alive_component(registration.component) {
                continue;
            }
            if system.get_entity(registration.component) != entity {
                continue;
            }
            Self::invoke(registration, &mut message);
            if message.handled {
                break;
            }
        }
        message
    }
}
