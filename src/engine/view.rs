//! # Views and Iterators
//!
//! Lazy, filtered traversals over the entity system.
//!
//! Three view families exist:
//!
//! - [`ComponentView<T>`] walks the live slots of `T`'s pool in ascending
//!   index order.
//! - [`EntityView`] walks live entities in ascending index order.
//! - [`TypedEntityView`] narrows an entity view to entities matching a
//!   set of component families, and projects the matched components into
//!   the callback: references under [`MatchAll`], options under
//!   [`MatchAny`].
//!
//! ## Combinators
//! Every view supports [`filter`](EntityView::filter) (a user predicate
//! applied after structural matching) and a parallel execution mode fed
//! by a [`JobQueue`]: `parallel_with` borrows a caller-owned queue,
//! `parallel_owned` moves one into the view (released when the view
//! drops). Sequential traversal uses `for_each`; parallel traversal uses
//! `par_for_each`, whose closure bounds are stricter (`Fn + Send +
//! Sync`). A parallel call on a view with no configured queue spins up a
//! default-sized one for that call.
//!
//! ## Mutation during iteration
//! Iteration snapshots the index bound when it starts: slots created
//! during traversal become visible to subsequent iterations only.
//! Destruction of a not-yet-visited slot is filtered by the presence
//! check; destroying the slot currently visited is the caller's
//! responsibility. Mutating the entity system from inside a *parallel*
//! traversal is not allowed.
//!
//! ## Typed projection
//! The typed `for_each` hands out references derived from pool pointers
//! (slots never relocate, so the pointers are stable). The user function
//! must not reach the same slot through a second alias; nested views
//! must skip the outer entity before touching its components.

use std::marker::PhantomData;

use crate::engine::bitfield::Bitfield;
use crate::engine::entity::Entity;
use crate::engine::family::try_family_of;
use crate::engine::handle::ComponentHandle;
use crate::engine::jobs::JobQueue;
use crate::engine::system::EntitySystem;
use crate::engine::types::{EntityId, FamilyId, IndexId};

/// Structural match mode of a [`TypedEntityView`].
pub trait MatchMode: 'static {
    /// `true` when every required family must be present.
    const MATCH_ALL: bool;
}

/// Entity bitfield must contain every required family.
pub struct MatchAll;

/// Entity bitfield must intersect the required families.
pub struct MatchAny;

impl MatchMode for MatchAll {
    const MATCH_ALL: bool = true;
}

impl MatchMode for MatchAny {
    const MATCH_ALL: bool = false;
}

enum QueueChoice<'a> {
    None,
    Shared(&'a JobQueue),
    Owned(JobQueue),
}

fn dispatch_queue(
    queue: &QueueChoice<'_>,
    len: usize,
    visit: impl Fn(usize) + Send + Sync,
) {
    match queue {
        QueueChoice::Shared(q) => q.dispatch(len, visit),
        QueueChoice::Owned(q) => q.dispatch(len, visit),
        QueueChoice::None => match JobQueue::new() {
            Ok(q) => q.dispatch(len, visit),
            // No worker pool could be built; degrade to one thread.
            Err(_) => (0..len).for_each(visit),
        },
    }
}

/// A tuple of component types projected by a [`TypedEntityView`].
///
/// Implemented for tuples of arity 1 through 4.
pub trait ComponentTuple: 'static {
    /// Mutable references to every component ([`MatchAll`] projection).
    type Refs<'w>;
    /// Optional references per component ([`MatchAny`] projection).
    type Opts<'w>;

    /// Union bitfield of the tuple's families, and whether every family
    /// has been assigned. An unassigned family cannot be attached to any
    /// entity, so a `MatchAll` view over it matches nothing.
    fn required_bits() -> (Bitfield, bool);

    /// Resolves every component of `entity`, or `None` if any is absent.
    fn fetch_refs<'w>(
        system: &'w EntitySystem,
        entity: EntityId,
    ) -> Option<Self::Refs<'w>>;

    /// Resolves each component of `entity` independently.
    fn fetch_opts<'w>(
        system: &'w EntitySystem,
        entity: EntityId,
    ) -> Self::Opts<'w>;
}

macro_rules! impl_component_tuple {
    ($($ty:ident),+) => {
        impl<$($ty: Send + Sync + 'static),+> ComponentTuple for ($($ty,)+) {
            type Refs<'w> = ($(&'w mut $ty,)+);
            type Opts<'w> = ($(Option<&'w mut $ty>,)+);

            fn required_bits() -> (Bitfield, bool) {
                let mut bits = Bitfield::new();
                let mut complete = true;
                $(
                    match try_family_of::<$ty>() {
                        Some(family) => bits.set(family as usize),
                        None => complete = false,
                    }
                )+
                (bits, complete)
            }

            fn fetch_refs<'w>(
                system: &'w EntitySystem,
                entity: EntityId,
            ) -> Option<Self::Refs<'w>> {
                Some(($(
                    unsafe {
                        &mut *system
                            .component_ptr_of::<$ty>(entity)?
                            .as_ptr()
                    },
                )+))
            }

            fn fetch_opts<'w>(
                system: &'w EntitySystem,
                entity: EntityId,
            ) -> Self::Opts<'w> {
                ($(
                    system
                        .component_ptr_of::<$ty>(entity)
                        .map(|ptr| unsafe { &mut *ptr.as_ptr() }),
                )+)
            }
        }
    };
}

impl_component_tuple!(A);
impl_component_tuple!(A, B);
impl_component_tuple!(A, B, C);
impl_component_tuple!(A, B, C, D);

// ── Component views ─────────────────────────────────────────────────

/// Lazy traversal over the live slots of one component family.
pub struct ComponentView<'a, T> {
    system: &'a EntitySystem,
    predicate: Option<Box<dyn Fn(&T) -> bool + Send + Sync + 'a>>,
    queue: QueueChoice<'a>,
    _marker: PhantomData<fn() -> T>,
}

impl<'a, T: Send + Sync + 'static> ComponentView<'a, T> {
    /// Creates a view over the components of type `T` in `system`.
    pub fn new(system: &'a EntitySystem) -> Self {
        Self {
            system,
            predicate: None,
            queue: QueueChoice::None,
            _marker: PhantomData,
        }
    }

    /// Limits the view to components matching `predicate`, applied after
    /// the structural (liveness) check.
    pub fn filter(
        mut self,
        predicate: impl Fn(&T) -> bool + Send + Sync + 'a,
    ) -> Self {
        self.predicate = Some(Box::new(predicate));
        self
    }

    /// Uses `queue` for parallel traversal.
    pub fn parallel_with(mut self, queue: &'a JobQueue) -> Self {
        self.queue = QueueChoice::Shared(queue);
        self
    }

    /// Moves `queue` into the view for parallel traversal; it is dropped
    /// with the view.
    pub fn parallel_owned(mut self, queue: JobQueue) -> Self {
        self.queue = QueueChoice::Owned(queue);
        self
    }

    /// Iterates live slots in ascending index order, yielding handles.
    pub fn iter(&self) -> ComponentIter<'_, 'a, T> {
        let (family, len) = match try_family_of::<T>() {
            Some(family) => (Some(family), self.system.pool_size(family)),
            None => (None, 0),
        };
        ComponentIter {
            system: self.system,
            family,
            predicate: self.predicate.as_deref(),
            index: 0,
            len,
        }
    }

    /// Calls `func` with every matching component, on the calling
    /// thread, in ascending index order.
    pub fn for_each(&self, mut func: impl FnMut(&mut T)) {
        let Some(family) = try_family_of::<T>() else {
            return;
        };
        let len = self.system.pool_size(family);
        for index in 0..len {
            let Some(ptr) = self.system.typed_slot_ptr::<T>(family, index)
            else {
                continue;
            };
            let value = unsafe { &mut *ptr.as_ptr() };
            if let Some(predicate) = &self.predicate {
                if !predicate(value) {
                    continue;
                }
            }
            func(value);
        }
    }

    /// Parallel form of [`for_each`](Self::for_each): the index range is
    /// partitioned across the view's job queue. Within a worker, indices
    /// ascend; across workers no order is guaranteed.
    pub fn par_for_each(&self, func: impl Fn(&mut T) + Send + Sync) {
        let Some(family) = try_family_of::<T>() else {
            return;
        };
        let len = self.system.pool_size(family);
        let visit = |index: usize| {
            let Some(ptr) = self.system.typed_slot_ptr::<T>(family, index)
            else {
                return;
            };
            let value = unsafe { &mut *ptr.as_ptr() };
            if let Some(predicate) = &self.predicate {
                if !predicate(value) {
                    return;
                }
            }
            func(value);
        };
        dispatch_queue(&self.queue, len, visit);
    }
}

/// Iterator over the live components of a family.
pub struct ComponentIter<'v, 'a, T> {
    system: &'a EntitySystem,
    family: Option<FamilyId>,
    predicate: Option<&'v (dyn Fn(&T) -> bool + Send + Sync + 'a)>,
    index: usize,
    len: usize,
}

impl<'v, 'a, T: Send + Sync + 'static> Iterator for ComponentIter<'v, 'a, T> {
    type Item = ComponentHandle<T>;

    fn next(&mut self) -> Option<Self::Item> {
        let family = self.family?;
        while self.index < self.len {
            let index = self.index;
            self.index += 1;

            let Some(cid) = self.system.component_live_at(family, index)
            else {
                continue;
            };
            let handle = self.system.get_component::<T>(cid);
            let passes = match (&self.predicate, handle.get()) {
                (Some(predicate), Some(value)) => predicate(value),
                (None, Some(_)) => true,
                (_, None) => false,
            };
            if passes {
                return Some(handle);
            }
        }
        None
    }
}

impl<'v, 'a, T: Send + Sync + 'static> IntoIterator
    for &'v ComponentView<'a, T>
{
    type Item = ComponentHandle<T>;
    type IntoIter = ComponentIter<'v, 'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

// ── Entity views ────────────────────────────────────────────────────

/// Lazy traversal over live entities.
pub struct EntityView<'a> {
    system: &'a EntitySystem,
    predicate: Option<Box<dyn Fn(&Entity<'a>) -> bool + Send + Sync + 'a>>,
    queue: QueueChoice<'a>,
}

impl<'a> EntityView<'a> {
    /// Creates a view over every live entity in `system`.
    pub fn new(system: &'a EntitySystem) -> Self {
        Self {
            system,
            predicate: None,
            queue: QueueChoice::None,
        }
    }

    /// Limits the view to entities matching `predicate`.
    pub fn filter(
        mut self,
        predicate: impl Fn(&Entity<'a>) -> bool + Send + Sync + 'a,
    ) -> Self {
        self.predicate = Some(Box::new(predicate));
        self
    }

    /// Uses `queue` for parallel traversal.
    pub fn parallel_with(mut self, queue: &'a JobQueue) -> Self {
        self.queue = QueueChoice::Shared(queue);
        self
    }

    /// Moves `queue` into the view for parallel traversal.
    pub fn parallel_owned(mut self, queue: JobQueue) -> Self {
        self.queue = QueueChoice::Owned(queue);
        self
    }

    /// Narrows the view to entities matching the component tuple `C`
    /// under match mode `M`, carrying the predicate and queue along.
    pub fn with_components<M: MatchMode, C: ComponentTuple>(
        self,
    ) -> TypedEntityView<'a, M, C> {
        let (required, complete) = C::required_bits();
        TypedEntityView {
            system: self.system,
            satisfiable: complete || !M::MATCH_ALL,
            required,
            predicate: self.predicate,
            queue: self.queue,
            _marker: PhantomData,
        }
    }

    /// Iterates live entities in ascending index order.
    pub fn iter(&self) -> EntityIter<'_, 'a> {
        EntityIter {
            system: self.system,
            predicate: self.predicate.as_deref(),
            required: None,
            match_all: false,
            index: 0,
            len: self.system.entity_list_len(),
        }
    }

    /// Calls `func` with every matching entity, on the calling thread,
    /// in ascending index order.
    pub fn for_each(&self, mut func: impl FnMut(&Entity<'a>)) {
        let len = self.system.entity_list_len();
        for index in 0..len {
            let Some(id) = self.system.entity_id_at(index as IndexId)
            else {
                continue;
            };
            let entity = Entity::new(self.system, id);
            if let Some(predicate) = &self.predicate {
                if !predicate(&entity) {
                    continue;
                }
            }
            func(&entity);
        }
    }

    /// Parallel form of [`for_each`](Self::for_each).
    pub fn par_for_each(&self, func: impl Fn(&Entity<'a>) + Send + Sync) {
        let len = self.system.entity_list_len();
        let visit = |index: usize| {
            let Some(id) = self.system.entity_id_at(index as IndexId)
            else {
                return;
            };
            let entity = Entity::new(self.system, id);
            if let Some(predicate) = &self.predicate {
                if !predicate(&entity) {
                    return;
                }
            }
            func(&entity);
        };
        dispatch_queue(&self.queue, len, visit);
    }
}

/// Iterator over live entities, optionally narrowed by a required
/// bitfield.
pub struct EntityIter<'v, 'a> {
    system: &'a EntitySystem,
    predicate: Option<&'v (dyn Fn(&Entity<'a>) -> bool + Send + Sync + 'a)>,
    required: Option<&'v Bitfield>,
    match_all: bool,
    index: usize,
    len: usize,
}

impl<'v, 'a> Iterator for EntityIter<'v, 'a> {
    type Item = Entity<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.index < self.len {
            let index = self.index as IndexId;
            self.index += 1;

            let id = match self.required {
                Some(required) => self.system.entity_matches(
                    index,
                    required,
                    self.match_all,
                ),
                None => self.system.entity_id_at(index),
            };
            let Some(id) = id else {
                continue;
            };

            let entity = Entity::new(self.system, id);
            if let Some(predicate) = &self.predicate {
                if !predicate(&entity) {
                    continue;
                }
            }
            return Some(entity);
        }
        None
    }
}

impl<'v, 'a> IntoIterator for &'v EntityView<'a> {
    type Item = Entity<'a>;
    type IntoIter = EntityIter<'v, 'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

// ── Typed entity views ──────────────────────────────────────────────

/// Entity view narrowed by a component tuple, projecting the matched
/// components into the traversal callback.
pub struct TypedEntityView<'a, M: MatchMode, C: ComponentTuple> {
    system: &'a EntitySystem,
    required: Bitfield,
    satisfiable: bool,
    predicate: Option<Box<dyn Fn(&Entity<'a>) -> bool + Send + Sync + 'a>>,
    queue: QueueChoice<'a>,
    _marker: PhantomData<fn() -> (M, C)>,
}

impl<'a, M: MatchMode, C: ComponentTuple> TypedEntityView<'a, M, C> {
    /// Creates a typed view directly; equivalent to
    /// [`EntityView::with_components`].
    pub fn new(system: &'a EntitySystem) -> Self {
        EntityView::new(system).with_components::<M, C>()
    }

    /// Limits the view to entities matching `predicate`, applied after
    /// structural matching.
    pub fn filter(
        mut self,
        predicate: impl Fn(&Entity<'a>) -> bool + Send + Sync + 'a,
    ) -> Self {
        self.predicate = Some(Box::new(predicate));
        self
    }

    /// Uses `queue` for parallel traversal.
    pub fn parallel_with(mut self, queue: &'a JobQueue) -> Self {
        self.queue = QueueChoice::Shared(queue);
        self
    }

    /// Moves `queue` into the view for parallel traversal.
    pub fn parallel_owned(mut self, queue: JobQueue) -> Self {
        self.queue = QueueChoice::Owned(queue);
        self
    }

    /// Iterates matching entities in ascending index order.
    pub fn iter(&self) -> EntityIter<'_, 'a> {
        EntityIter {
            system: self.system,
            predicate: self.predicate.as_deref(),
            required: self.satisfiable.then_some(&self.required),
            match_all: M::MATCH_ALL,
            index: 0,
            len: if self.satisfiable {
                self.system.entity_list_len()
            } else {
                0
            },
        }
    }

    fn matched_id(&self, index: usize) -> Option<EntityId> {
        self.system.entity_matches(
            index as IndexId,
            &self.required,
            M::MATCH_ALL,
        )
    }

    fn passes(&self, entity: &Entity<'a>) -> bool {
        match &self.predicate {
            Some(predicate) => predicate(entity),
            None => true,
        }
    }
}

impl<'a, C: ComponentTuple> TypedEntityView<'a, MatchAll, C> {
    /// Calls `func` with every matching entity and mutable references to
    /// all of its required components, sequentially in ascending index
    /// order.
    pub fn for_each(
        &self,
        mut func: impl FnMut(&Entity<'a>, C::Refs<'a>),
    ) {
        if !self.satisfiable {
            return;
        }
        let len = self.system.entity_list_len();
        for index in 0..len {
            let Some(id) = self.matched_id(index) else {
                continue;
            };
            let entity = Entity::new(self.system, id);
            if !self.passes(&entity) {
                continue;
            }
            if let Some(refs) = C::fetch_refs(self.system, id) {
                func(&entity, refs);
            }
        }
    }

    /// Parallel form of [`for_each`](Self::for_each).
    pub fn par_for_each(
        &self,
        func: impl Fn(&Entity<'a>, C::Refs<'a>) + Send + Sync,
    ) {
        if !self.satisfiable {
            return;
        }
        let len = self.system.entity_list_len();
        let visit = |index: usize| {
            let Some(id) = self.matched_id(index) else {
                return;
            };
            let entity = Entity::new(self.system, id);
            if !self.passes(&entity) {
                return;
            }
            if let Some(refs) = C::fetch_refs(self.system, id) {
                func(&entity, refs);
            }
        };
        dispatch_queue(&self.queue, len, visit);
    }
}

impl<'a, C: ComponentTuple> TypedEntityView<'a, MatchAny, C> {
    /// Calls `func` with every matching entity; absent components are
    /// `None`.
    pub fn for_each(
        &self,
        mut func: impl FnMut(&Entity<'a>, C::Opts<'a>),
    ) {
        let len = self.system.entity_list_len();
        for index in 0..len {
            let Some(id) = self.matched_id(index) else {
                continue;
            };
            let entity = Entity::new(self.system, id);
            if !self.passes(&entity) {
                continue;
            }
            func(&entity, C::fetch_opts(self.system, id));
        }
    }

    /// Parallel form of [`for_each`](Self::for_each).
    pub fn par_for_each(
        &self,
        func: impl Fn(&Entity<'a>, C::Opts<'a>) + Send + Sync,
    ) {
        let len = self.system.entity_list_len();
        let visit = |index: usize| {
            let Some(id) = self.matched_id(index) else {
                return;
            };
            let entity = Entity::new(self.system, id);
            if !self.passes(&entity) {
                return;
            }
            func(&entity, C::fetch_opts(self.system, id));
        };
        dispatch_queue(&self.queue, len, visit);
    }
}

impl<'v, 'a, M: MatchMode, C: ComponentTuple> IntoIterator
    for &'v TypedEntityView<'a, M, C>
{
    type Item = Entity<'a>;
    type IntoIter = EntityIter<'v, 'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
