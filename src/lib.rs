//! # ECS Framework
//!
//! Pooled, message-driven Entity-Component-System runtime.
//!
//! Behavior is expressed as small data records (*components*) grouped
//! under opaque generational identities (*entities*), with machinery for
//! iterating, matching, and messaging across them.
//!
//! ## Design Goals
//! - Chunked per-type component pools with stable slots
//! - Generational ids and ref-counted handles that detect use-after-free
//! - Lazy, filtered views with an opt-in parallel execution mode
//! - Request-id-keyed messaging and typed events with priority ordering
//!
//! ## Quick tour
//! ```
//! use ecs_framework::prelude::*;
//!
//! #[derive(Clone, Copy)]
//! struct Health(u32);
//!
//! let es = EntitySystem::new();
//! let hero = es.create_entity().unwrap();
//! hero.add_component(Health(100)).unwrap();
//!
//! EntityView::new(&es)
//!     .with_components::<MatchAll, (Health,)>()
//!     .for_each(|_entity, (health,)| {
//!         health.0 += 1;
//!     });
//!
//! assert_eq!(hero.get_component::<Health>().get().unwrap().0, 101);
//! ```

#![forbid(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![allow(clippy::module_inception)]

pub mod engine;

// ─────────────────────────────────────────────────────────────────────────────
// Re-exports (Public API)
// ─────────────────────────────────────────────────────────────────────────────

pub use engine::system::EntitySystem;

pub use engine::entity::Entity;

pub use engine::handle::ComponentHandle;

pub use engine::types::{
    ComponentId,
    EntityId,
    FamilyId,
    RequestId,
    hash_request,
    hash_string,
};

pub use engine::family::{family_of, try_family_of, FamilyDesc};

pub use engine::bitfield::Bitfield;

pub use engine::message::{
    Message,
    MessageKind,
    MessageSystem,
    Payload,
};

pub use engine::event::{
    ComponentAttached,
    ComponentDestroyed,
    ComponentDetached,
    EntityCreated,
    EntityDestroyed,
    EventSystem,
};

pub use engine::view::{
    ComponentView,
    EntityView,
    MatchAll,
    MatchAny,
    MatchMode,
    TypedEntityView,
};

pub use engine::jobs::JobQueue;

pub use engine::error::{
    CapacityError,
    ECSError,
    ECSResult,
    FamilyError,
    JobQueueError,
};

// ─────────────────────────────────────────────────────────────────────────────
// Prelude (Optional but recommended)
// ─────────────────────────────────────────────────────────────────────────────

/// Commonly used runtime types.
///
/// Import with:
/// ```rust
/// use ecs_framework::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        ComponentHandle,
        ComponentId,
        ComponentView,
        Entity,
        EntityId,
        EntitySystem,
        EntityView,
        JobQueue,
        MatchAll,
        MatchAny,
        Message,
        Payload,
        TypedEntityView,
        hash_request,
    };
}
