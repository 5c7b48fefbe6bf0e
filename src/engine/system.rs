//! # Entity System
//!
//! The owner of all component pools, entity records, and the message and
//! event registries. Every create/destroy/attach/detach flows through
//! this type, which is what lets the runtime keep its invariants:
//!
//! - For every family bit set on an entity, the family slot holds a live
//!   component id.
//! - A present pool slot carries at least the system's own reference.
//! - Free lists contain only indices whose presence bit is clear.
//!
//! ## Failure semantics
//! Operations on stale or invalid ids (mismatched generation,
//! out-of-range index, unborn family) are **silent no-ops**, for queries
//! and mutations alike. Callers routinely hold ids across frames;
//! converting staleness into a fault would force defensive checks
//! everywhere. Errors surface only from the fallible constructors
//! (`create_entity`, `create_component`), where capacity can genuinely
//! run out.
//!
//! ## Concurrency
//! The default scheduling model is single-threaded cooperative: all
//! mutations are expected on one thread. Internals are nevertheless
//! behind locks so that the system is `Sync` and parallel views can read
//! pools from worker threads; handles use atomic refcounts and may move
//! across threads. Lifecycle events are emitted after internal locks are
//! released, so subscribers may call back into the system.

use std::ptr::NonNull;
use std::sync::{Arc, RwLock};

use crate::engine::bitfield::Bitfield;
use crate::engine::entity::{Entity, EntityTable};
use crate::engine::error::{CapacityError, ECSError, ECSResult};
use crate::engine::event::{
    ComponentAttached, ComponentDestroyed, ComponentDetached,
    EntityCreated, EntityDestroyed, EventSystem,
};
use crate::engine::family::{family_of, try_family_of};
use crate::engine::handle::{ComponentHandle, SlotState};
use crate::engine::message::{Message, MessageSystem, Payload};
use crate::engine::pool::{ComponentPool, TypedPool};
use crate::engine::types::{
    ComponentId, EntityId, FamilyId, IndexId, RequestId,
    COMPONENT_INDEX_MASK,
};

/// Per-slot metadata tracked alongside a family's pool.
struct SlotEntry {
    /// Bookkeeping shared with handles; stable across table growth.
    state: Arc<SlotState>,
    /// Entity the slot's component is attached to, or the sentinel.
    owner: EntityId,
}

/// One component family: its pool, slot metadata, and free indices.
///
/// The pool is allocated lazily on the first component of the family
/// created in this system; families registered by other systems stay
/// empty placeholders here.
#[derive(Default)]
struct FamilyStore {
    pool: Option<Box<dyn ComponentPool>>,
    slots: Vec<SlotEntry>,
    free: Vec<IndexId>,
}

impl Default for SlotEntry {
    fn default() -> Self {
        Self {
            state: Arc::new(SlotState::new()),
            owner: EntityId::INVALID,
        }
    }
}

/// The data-oriented container at the core of the runtime.
///
/// See the module docs for the failure and concurrency contracts.
#[derive(Default)]
pub struct EntitySystem {
    entities: RwLock<EntityTable>,
    families: RwLock<Vec<FamilyStore>>,
    messages: MessageSystem,
    events: EventSystem,
}

impl EntitySystem {
    /// Creates an empty entity system.
    pub fn new() -> Self {
        Self {
            entities: RwLock::new(EntityTable::default()),
            families: RwLock::new(Vec::new()),
            messages: MessageSystem::new(),
            events: EventSystem::new(),
        }
    }

    // ── Entities ────────────────────────────────────────────────────

    /// Creates an entity, reusing the most recently freed index if one
    /// exists.
    ///
    /// Emits [`EntityCreated`].
    ///
    /// ## Errors
    /// `ECSError::Capacity` when the entity index space is exhausted.
    pub fn create_entity(&self) -> ECSResult<Entity<'_>> {
        let id = {
            let mut entities = self
                .entities
                .write()
                .map_err(|_| ECSError::PoisonedLock)?;
            entities.allocate()?
        };

        log::trace!("created entity {:?}", id);
        self.events.emit_event(EntityCreated { entity: id });
        Ok(Entity::new(self, id))
    }

    /// Destroys an entity and every component attached to it, bumping
    /// the record generation and recycling the index.
    ///
    /// Idempotent: destroying a stale id is a no-op. Emits
    /// [`EntityDestroyed`] with the pre-destruction id.
    pub fn destroy_entity(&self, id: EntityId) {
        let attached: Vec<ComponentId> = {
            let Ok(entities) = self.entities.read() else {
                return;
            };
            if !entities.is_alive(id) {
                return;
            }
            match entities.record(id.index()) {
                Some(record) => record
                    .component_bits
                    .iter_bits()
                    .map(|family| record.component(family as FamilyId))
                    .filter(|cid| !cid.is_invalid())
                    .collect(),
                None => return,
            }
        };

        for cid in attached {
            self.destroy_component(cid);
        }

        {
            let Ok(mut entities) = self.entities.write() else {
                return;
            };
            if !entities.is_alive(id) {
                return;
            }
            entities.release(id.index());
        }

        log::trace!("destroyed entity {:?}", id);
        self.events.emit_event(EntityDestroyed { entity: id });
    }

    /// Returns `true` if `id` names a live entity.
    pub fn is_alive_entity(&self, id: EntityId) -> bool {
        match self.entities.read() {
            Ok(entities) => entities.is_alive(id),
            Err(_) => false,
        }
    }

    /// Wraps an id in an [`Entity`] accessor without checking liveness.
    pub fn entity(&self, id: EntityId) -> Entity<'_> {
        Entity::new(self, id)
    }

    /// Total number of entity records, including destroyed records not
    /// yet reclaimed by [`clean_entities`](Self::clean_entities).
    pub fn entity_count(&self) -> usize {
        match self.entities.read() {
            Ok(entities) => entities.len(),
            Err(_) => 0,
        }
    }

    /// Erases trailing entity records whose destroyed flag is set.
    /// Returns the number of records removed.
    pub fn clean_entities(&self) -> usize {
        match self.entities.write() {
            Ok(mut entities) => entities.truncate_destroyed_tail(),
            Err(_) => 0,
        }
    }

    // ── Components ──────────────────────────────────────────────────

    /// Creates a component in the pool of `T`'s family, assigning the
    /// family on first use.
    ///
    /// The slot comes from the family free list (most recently freed
    /// first) or extends the pool by a chunk. The new component is not
    /// attached to any entity.
    ///
    /// ## Errors
    /// `ECSError::Family` when the family cap is exceeded;
    /// `ECSError::Capacity` when the pool index space is exhausted.
    pub fn create_component<T: Send + Sync + 'static>(
        &self,
        value: T,
    ) -> ECSResult<ComponentId> {
        let family = family_of::<T>()?;

        let cid = {
            let mut families = self
                .families
                .write()
                .map_err(|_| ECSError::PoisonedLock)?;
            if families.len() <= family as usize {
                families.resize_with(family as usize + 1, FamilyStore::default);
            }
            let store = &mut families[family as usize];
            let pool = store
                .pool
                .get_or_insert_with(|| Box::new(TypedPool::<T>::new()));
            let typed = pool
                .as_any_mut()
                .downcast_mut::<TypedPool<T>>()
                .expect("family pool type mismatch");

            let index = match store.free.pop() {
                Some(index) => {
                    store.slots[index as usize].state.reset_for_reuse();
                    store.slots[index as usize].owner = EntityId::INVALID;
                    index
                }
                None => {
                    let index = store.slots.len() as u64;
                    if index > COMPONENT_INDEX_MASK {
                        return Err(CapacityError {
                            needed: index + 1,
                            capacity: COMPONENT_INDEX_MASK + 1,
                        }
                        .into());
                    }
                    store.slots.push(SlotEntry::default());
                    index as IndexId
                }
            };

            let slot_index = index as usize;
            if slot_index >= typed.len() {
                typed.resize(slot_index + 1, false);
            }
            unsafe { typed.write(slot_index, value) };
            typed.set_bit(slot_index);

            let generation = store.slots[slot_index].state.generation();
            ComponentId::new(family, index, generation)
        };

        log::trace!("created component {:?}", cid);
        Ok(cid)
    }

    /// Destroys a component: detaches it from its owning entity, drops
    /// its message and event registrations, runs its destructor, clears
    /// the presence bit, bumps the slot generation, and recycles the
    /// index.
    ///
    /// Emits [`ComponentDestroyed`] with the pre-destruction id.
    pub fn destroy_component(&self, cid: ComponentId) {
        if !self.is_alive_component(cid) {
            return;
        }

        let owner = self.get_entity(cid);
        if !owner.is_invalid() {
            self.detach_component(cid, owner);
        }

        self.messages.unrequest_all_messages(cid);
        self.events.unregister_all_events(cid);

        {
            let Ok(mut families) = self.families.write() else {
                return;
            };
            let Some(store) = families.get_mut(cid.family() as usize)
            else {
                return;
            };
            let index = cid.index() as usize;
            let Some(slot) = store.slots.get(index) else {
                return;
            };
            if slot.state.generation() != cid.generation() {
                return;
            }
            let Some(pool) = store.pool.as_mut() else {
                return;
            };
            if !pool.has_bit(index) {
                return;
            }

            pool.destroy(index);
            pool.reset_bit(index);
            slot.state.bump_generation();
            slot.state.release_owned();
            store.free.push(cid.index());
        }

        log::trace!("destroyed component {:?}", cid);
        self.events.emit_event(ComponentDestroyed { component: cid });
    }

    /// Returns `true` if `cid` names a live component: family and index
    /// in bounds, generation current, presence bit set.
    pub fn is_alive_component(&self, cid: ComponentId) -> bool {
        let Ok(families) = self.families.read() else {
            return false;
        };
        let Some(store) = families.get(cid.family() as usize) else {
            return false;
        };
        let index = cid.index() as usize;
        let Some(slot) = store.slots.get(index) else {
            return false;
        };
        if slot.state.generation() != cid.generation() {
            return false;
        }
        match store.pool.as_ref() {
            Some(pool) => pool.has_bit(index),
            None => false,
        }
    }

    /// Number of live components in `family`'s pool.
    pub fn component_count(&self, family: FamilyId) -> usize {
        match self.families.read() {
            Ok(families) => families
                .get(family as usize)
                .and_then(|store| store.pool.as_ref())
                .map(|pool| pool.count_bits())
                .unwrap_or(0),
            Err(_) => 0,
        }
    }

    /// Logical slot count of `family`'s pool, including absent slots.
    pub fn pool_size(&self, family: FamilyId) -> usize {
        match self.families.read() {
            Ok(families) => families
                .get(family as usize)
                .and_then(|store| store.pool.as_ref())
                .map(|pool| pool.len())
                .unwrap_or(0),
            Err(_) => 0,
        }
    }

    /// Compacts the tail of `family`'s pool: trailing slots with a zero
    /// refcount are removed; the scan stops at the first slot that is
    /// present or still referenced by a handle, preserving stable
    /// indices for all survivors. Returns the number of slots removed.
    pub fn clean_components(&self, family: FamilyId) -> usize {
        let Ok(mut families) = self.families.write() else {
            return 0;
        };
        let Some(store) = families.get_mut(family as usize) else {
            return 0;
        };
        let Some(pool) = store.pool.as_mut() else {
            return 0;
        };

        let mut new_len = pool.len();
        while new_len > 0 {
            let index = new_len - 1;
            if pool.has_bit(index) {
                break;
            }
            if store.slots[index].state.ref_count() > 0 {
                break;
            }
            new_len -= 1;
        }

        let removed = pool.len() - new_len;
        if removed > 0 {
            pool.resize(new_len, true);
            store.slots.truncate(new_len);
            store.free.retain(|&index| (index as usize) < new_len);
            log::debug!(
                "cleaned {} trailing slots from family {}",
                removed,
                family
            );
        }
        removed
    }

    /// Runs [`clean_components`](Self::clean_components) over every
    /// family. Returns the total number of slots removed.
    pub fn clean_all_components(&self) -> usize {
        let family_count = match self.families.read() {
            Ok(families) => families.len(),
            Err(_) => 0,
        };
        (0..family_count)
            .map(|family| self.clean_components(family as FamilyId))
            .sum()
    }

    // ── Attachment ──────────────────────────────────────────────────

    /// Attaches a component to an entity, detaching it from any prior
    /// entity and detaching any existing component of the same family
    /// from `eid` first. Attachment is exclusive per family per entity.
    ///
    /// Emits [`ComponentAttached`] (after any implied detachments).
    pub fn attach_component(&self, cid: ComponentId, eid: EntityId) {
        if !self.is_alive_entity(eid) || !self.is_alive_component(cid) {
            return;
        }

        let prior_owner = self.get_entity(cid);
        if prior_owner == eid {
            return;
        }
        if !prior_owner.is_invalid() {
            self.detach_component(cid, prior_owner);
        }

        let prior = self.entity_component_id(cid.family(), eid);
        if !prior.is_invalid() && prior != cid {
            self.detach_component(prior, eid);
        }

        self.attach_component_unchecked(cid, eid);
    }

    /// Attachment without the detach pass: the caller guarantees the
    /// component is unattached and the family slot on `eid` is empty.
    pub fn attach_component_unchecked(
        &self,
        cid: ComponentId,
        eid: EntityId,
    ) {
        if !self.is_alive_entity(eid) || !self.is_alive_component(cid) {
            return;
        }

        {
            let Ok(mut entities) = self.entities.write() else {
                return;
            };
            let Some(record) = entities.record_mut(eid.index()) else {
                return;
            };
            let family = cid.family();
            record.ensure_family(family);
            record.component_bits.set(family as usize);
            record.components[family as usize] = cid;
        }
        {
            let Ok(mut families) = self.families.write() else {
                return;
            };
            if let Some(store) = families.get_mut(cid.family() as usize) {
                if let Some(slot) =
                    store.slots.get_mut(cid.index() as usize)
                {
                    slot.owner = eid;
                }
            }
        }

        log::trace!("attached component {:?} to entity {:?}", cid, eid);
        self.events.emit_event(ComponentAttached {
            component: cid,
            entity: eid,
        });
    }

    /// Detaches a component from an entity. The component stays alive.
    ///
    /// Emits [`ComponentDetached`].
    pub fn detach_component(&self, cid: ComponentId, eid: EntityId) {
        if !self.is_alive_entity(eid) || !self.is_alive_component(cid) {
            return;
        }

        let family = cid.family();
        {
            let Ok(mut entities) = self.entities.write() else {
                return;
            };
            let Some(record) = entities.record_mut(eid.index()) else {
                return;
            };
            if record.component(family) != cid {
                return;
            }
            record.component_bits.clear(family as usize);
            record.components[family as usize] = ComponentId::INVALID;
        }
        {
            let Ok(mut families) = self.families.write() else {
                return;
            };
            if let Some(store) = families.get_mut(family as usize) {
                if let Some(slot) =
                    store.slots.get_mut(cid.index() as usize)
                {
                    slot.owner = EntityId::INVALID;
                }
            }
        }

        log::trace!("detached component {:?} from entity {:?}", cid, eid);
        self.events.emit_event(ComponentDetached {
            component: cid,
            entity: eid,
        });
    }

    // ── Lookup ──────────────────────────────────────────────────────

    /// Handle to the component named by `cid`, or an empty handle when
    /// the id is stale or `T` is not the slot's type.
    pub fn get_component<T: Send + Sync + 'static>(
        &self,
        cid: ComponentId,
    ) -> ComponentHandle<T> {
        let Some(family) = try_family_of::<T>() else {
            return ComponentHandle::empty();
        };
        if family != cid.family() {
            return ComponentHandle::empty();
        }

        let Ok(families) = self.families.read() else {
            return ComponentHandle::empty();
        };
        let Some(store) = families.get(family as usize) else {
            return ComponentHandle::empty();
        };
        let index = cid.index() as usize;
        let Some(slot) = store.slots.get(index) else {
            return ComponentHandle::empty();
        };
        if slot.state.generation() != cid.generation() {
            return ComponentHandle::empty();
        }
        let Some(pool) = store.pool.as_ref() else {
            return ComponentHandle::empty();
        };
        if !pool.has_bit(index) {
            return ComponentHandle::empty();
        }
        let Some(typed) = pool.as_any().downcast_ref::<TypedPool<T>>()
        else {
            return ComponentHandle::empty();
        };
        match NonNull::new(typed.slot_ptr(index)) {
            Some(ptr) => {
                ComponentHandle::acquire(ptr, Arc::clone(&slot.state), cid)
            }
            None => ComponentHandle::empty(),
        }
    }

    /// Handle to `eid`'s component of type `T`, or an empty handle.
    pub fn get_entity_component<T: Send + Sync + 'static>(
        &self,
        eid: EntityId,
    ) -> ComponentHandle<T> {
        let Some(family) = try_family_of::<T>() else {
            return ComponentHandle::empty();
        };
        let cid = self.entity_component_id(family, eid);
        if cid.is_invalid() {
            return ComponentHandle::empty();
        }
        self.get_component(cid)
    }

    /// Id of the component attached to `eid` for `family`, or the
    /// sentinel.
    pub fn entity_component_id(
        &self,
        family: FamilyId,
        eid: EntityId,
    ) -> ComponentId {
        let Ok(entities) = self.entities.read() else {
            return ComponentId::INVALID;
        };
        if !entities.is_alive(eid) {
            return ComponentId::INVALID;
        }
        match entities.record(eid.index()) {
            Some(record) if record.component_bits.has(family as usize) => {
                record.component(family)
            }
            _ => ComponentId::INVALID,
        }
    }

    /// Returns `true` if `eid` has a live component of `family`.
    pub fn has_component(&self, family: FamilyId, eid: EntityId) -> bool {
        let cid = self.entity_component_id(family, eid);
        !cid.is_invalid() && self.is_alive_component(cid)
    }

    /// Entity the component is attached to, or the sentinel.
    pub fn get_entity(&self, cid: ComponentId) -> EntityId {
        let Ok(families) = self.families.read() else {
            return EntityId::INVALID;
        };
        let Some(store) = families.get(cid.family() as usize) else {
            return EntityId::INVALID;
        };
        let index = cid.index() as usize;
        let Some(slot) = store.slots.get(index) else {
            return EntityId::INVALID;
        };
        if slot.state.generation() != cid.generation() {
            return EntityId::INVALID;
        }
        match store.pool.as_ref() {
            Some(pool) if pool.has_bit(index) => slot.owner,
            _ => EntityId::INVALID,
        }
    }

    // ── Messaging and events ────────────────────────────────────────

    /// The message registry owned by this system.
    pub fn message_system(&self) -> &MessageSystem {
        &self.messages
    }

    /// The event registry owned by this system.
    pub fn event_system(&self) -> &EventSystem {
        &self.events
    }

    /// Sends a message to every global registration for `request`.
    pub fn send_global_message(&self, request: RequestId, payload: Payload) {
        self.messages.send_global_message(request, payload);
    }

    /// Sends a question globally; check `handled` on the returned
    /// envelope before reading the payload.
    pub fn send_global_question(
        &self,
        request: RequestId,
        payload: Payload,
    ) -> Message {
        self.messages.send_global_question(request, payload)
    }

    /// Aliveness-checking form of
    /// [`send_global_message`](Self::send_global_message).
    pub fn send_safe_global_message(
        &self,
        request: RequestId,
        payload: Payload,
    ) {
        self.messages.send_safe_global_message(self, request, payload);
    }

    /// Aliveness-checking form of
    /// [`send_global_question`](Self::send_global_question).
    pub fn send_safe_global_question(
        &self,
        request: RequestId,
        payload: Payload,
    ) -> Message {
        self.messages
            .send_safe_global_question(self, request, payload)
    }

    /// Sends a message to the components of one entity.
    pub fn send_local_message(
        &self,
        entity: EntityId,
        request: RequestId,
        payload: Payload,
    ) {
        self.messages
            .send_local_message(self, entity, request, payload);
    }

    /// Question form of [`send_local_message`](Self::send_local_message).
    pub fn send_local_question(
        &self,
        entity: EntityId,
        request: RequestId,
        payload: Payload,
    ) -> Message {
        self.messages
            .send_local_question(self, entity, request, payload)
    }

    /// Aliveness-checking form of
    /// [`send_local_message`](Self::send_local_message).
    pub fn send_safe_local_message(
        &self,
        entity: EntityId,
        request: RequestId,
        payload: Payload,
    ) {
        self.messages
            .send_safe_local_message(self, entity, request, payload);
    }

    /// Aliveness-checking form of
    /// [`send_local_question`](Self::send_local_question).
    pub fn send_safe_local_question(
        &self,
        entity: EntityId,
        request: RequestId,
        payload: Payload,
    ) -> Message {
        self.messages
            .send_safe_local_question(self, entity, request, payload)
    }

    // ── View support ────────────────────────────────────────────────

    pub(crate) fn entity_list_len(&self) -> usize {
        match self.entities.read() {
            Ok(entities) => entities.len(),
            Err(_) => 0,
        }
    }

    pub(crate) fn entity_id_at(&self, index: IndexId) -> Option<EntityId> {
        let entities = self.entities.read().ok()?;
        let record = entities.record(index)?;
        if record.destroyed {
            return None;
        }
        Some(EntityId::new(index, record.generation))
    }

    /// Liveness plus structural match in one record lookup.
    pub(crate) fn entity_matches(
        &self,
        index: IndexId,
        required: &Bitfield,
        match_all: bool,
    ) -> Option<EntityId> {
        let entities = self.entities.read().ok()?;
        let record = entities.record(index)?;
        if record.destroyed {
            return None;
        }
        let matched = if match_all {
            record.component_bits.contains_all(required)
        } else {
            record.component_bits.intersects(required)
        };
        if matched {
            Some(EntityId::new(index, record.generation))
        } else {
            None
        }
    }

    pub(crate) fn component_live_at(
        &self,
        family: FamilyId,
        index: usize,
    ) -> Option<ComponentId> {
        let families = self.families.read().ok()?;
        let store = families.get(family as usize)?;
        let pool = store.pool.as_ref()?;
        if index >= pool.len() || !pool.has_bit(index) {
            return None;
        }
        let slot = store.slots.get(index)?;
        Some(ComponentId::new(
            family,
            index as IndexId,
            slot.state.generation(),
        ))
    }

    pub(crate) fn typed_slot_ptr<T: Send + Sync + 'static>(
        &self,
        family: FamilyId,
        index: usize,
    ) -> Option<NonNull<T>> {
        let families = self.families.read().ok()?;
        let store = families.get(family as usize)?;
        let pool = store.pool.as_ref()?;
        if index >= pool.len() || !pool.has_bit(index) {
            return None;
        }
        let typed = pool.as_any().downcast_ref::<TypedPool<T>>()?;
        NonNull::new(typed.slot_ptr(index))
    }

    pub(crate) fn component_ptr_of<T: Send + Sync + 'static>(
        &self,
        eid: EntityId,
    ) -> Option<NonNull<T>> {
        let family = try_family_of::<T>()?;
        let cid = self.entity_component_id(family, eid);
        if cid.is_invalid() {
            return None;
        }
        self.typed_slot_ptr(family, cid.index() as usize)
    }
}
