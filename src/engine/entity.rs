//! # Entity Records and Accessors
//!
//! This module defines per-entity bookkeeping and the lightweight
//! [`Entity`] accessor handed out by the entity system.
//!
//! ## Entity Model
//! An entity is nothing but a generational id naming a bag of components.
//! Its record tracks:
//!
//! - A **generation** counter, bumped on destruction so stale ids and
//!   handles can be detected after slot reuse.
//! - A **destroyed** flag.
//! - A dense **family slot table** mapping each component family to the
//!   attached component id.
//! - A **bitfield** of attached families, used for fast view matching.
//!
//! ## Invariants
//! - For every family bit set in the bitfield, the slot table holds a
//!   live component id for that family.
//! - Free indices always refer to destroyed records.
//! - Generations of live records are never 0.

use crate::engine::bitfield::Bitfield;
use crate::engine::error::CapacityError;
use crate::engine::handle::ComponentHandle;
use crate::engine::message::{Message, Payload};
use crate::engine::system::EntitySystem;
use crate::engine::types::{
    ComponentId, EntityId, FamilyId, IndexId, RequestId, ENTITY_INDEX_MASK,
};

/// Per-entity bookkeeping.
#[derive(Debug, Default)]
pub(crate) struct EntityRecord {
    pub generation: u32,
    pub destroyed: bool,
    /// Component id per family, indexed by family and grown on demand.
    pub components: Vec<ComponentId>,
    pub component_bits: Bitfield,
}

impl EntityRecord {
    fn fresh() -> Self {
        Self {
            generation: 1,
            destroyed: false,
            components: Vec::new(),
            component_bits: Bitfield::new(),
        }
    }

    /// Id of the component attached for `family`, or the sentinel.
    #[inline]
    pub fn component(&self, family: FamilyId) -> ComponentId {
        self.components
            .get(family as usize)
            .copied()
            .unwrap_or(ComponentId::INVALID)
    }

    /// Grows the slot table so `family` is addressable.
    pub fn ensure_family(&mut self, family: FamilyId) {
        if self.components.len() <= family as usize {
            self.components
                .resize(family as usize + 1, ComponentId::INVALID);
        }
    }
}

/// Dense table of entity records with a LIFO free list.
///
/// Not thread-safe on its own; the entity system wraps it in a lock.
#[derive(Default)]
pub(crate) struct EntityTable {
    records: Vec<EntityRecord>,
    free: Vec<IndexId>,
}

impl EntityTable {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Allocates an entity slot, preferring the most recently freed index.
    pub fn allocate(&mut self) -> Result<EntityId, CapacityError> {
        if let Some(index) = self.free.pop() {
            let record = &mut self.records[index as usize];
            record.destroyed = false;
            return Ok(EntityId::new(index, record.generation));
        }

        let index = self.records.len() as u64;
        if index > ENTITY_INDEX_MASK {
            return Err(CapacityError {
                needed: index + 1,
                capacity: ENTITY_INDEX_MASK + 1,
            });
        }

        self.records.push(EntityRecord::fresh());
        Ok(EntityId::new(index as IndexId, 1))
    }

    /// Marks a record destroyed and recycles its index.
    ///
    /// The caller has already detached and destroyed the attached
    /// components.
    pub fn release(&mut self, index: IndexId) {
        let record = &mut self.records[index as usize];
        record.generation = record.generation.wrapping_add(1);
        if record.generation == 0 {
            record.generation = 1;
        }
        record.destroyed = true;
        record.component_bits.clear_all();
        for slot in &mut record.components {
            *slot = ComponentId::INVALID;
        }
        self.free.push(index);
    }

    pub fn is_alive(&self, id: EntityId) -> bool {
        match self.records.get(id.index() as usize) {
            Some(record) => {
                !record.destroyed && record.generation == id.generation()
            }
            None => false,
        }
    }

    #[inline]
    pub fn record(&self, index: IndexId) -> Option<&EntityRecord> {
        self.records.get(index as usize)
    }

    #[inline]
    pub fn record_mut(&mut self, index: IndexId) -> Option<&mut EntityRecord> {
        self.records.get_mut(index as usize)
    }

    /// Truncates trailing destroyed records, trimming the free list.
    pub fn truncate_destroyed_tail(&mut self) -> usize {
        let mut new_len = self.records.len();
        while new_len > 0 && self.records[new_len - 1].destroyed {
            new_len -= 1;
        }
        let removed = self.records.len() - new_len;
        if removed > 0 {
            self.records.truncate(new_len);
            self.free.retain(|&index| (index as usize) < new_len);
        }
        removed
    }
}

/// Lightweight accessor pairing an entity system with an entity id.
///
/// `Entity` values are cheap to copy; equality compares ids only, so an
/// entity compares equal to itself across separate lookups.
#[derive(Clone, Copy)]
pub struct Entity<'a> {
    system: &'a EntitySystem,
    id: EntityId,
}

impl<'a> Entity<'a> {
    pub(crate) fn new(system: &'a EntitySystem, id: EntityId) -> Self {
        Self { system, id }
    }

    /// The id this accessor refers to.
    #[inline]
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// The entity system this accessor belongs to.
    #[inline]
    pub fn system(&self) -> &'a EntitySystem {
        self.system
    }

    /// Returns `true` if the entity is still alive.
    #[inline]
    pub fn is_alive(&self) -> bool {
        self.system.is_alive_entity(self.id)
    }

    /// Creates a component from `value` and attaches it to this entity.
    ///
    /// An existing component of the same family is detached first
    /// (attachment is exclusive per family).
    pub fn add_component<T: Send + Sync + 'static>(
        &self,
        value: T,
    ) -> crate::engine::error::ECSResult<ComponentHandle<T>> {
        let cid = self.system.create_component(value)?;
        self.system.attach_component(cid, self.id);
        Ok(self.system.get_component(cid))
    }

    /// Handle to this entity's component of type `T`, or an empty handle.
    pub fn get_component<T: Send + Sync + 'static>(
        &self,
    ) -> ComponentHandle<T> {
        self.system.get_entity_component(self.id)
    }

    /// Returns `true` if a live component of type `T` is attached.
    pub fn has_component<T: Send + Sync + 'static>(&self) -> bool {
        match crate::engine::family::try_family_of::<T>() {
            Some(family) => self.system.has_component(family, self.id),
            None => false,
        }
    }

    /// Destroys the entity and every component attached to it.
    pub fn destroy(&self) {
        self.system.destroy_entity(self.id);
    }

    /// Sends a message to the components of this entity.
    pub fn send_message(&self, request: RequestId, payload: Payload) {
        self.system.send_local_message(self.id, request, payload);
    }

    /// Sends a question to the components of this entity and returns the
    /// envelope; check `handled` before reading the payload.
    pub fn send_question(
        &self,
        request: RequestId,
        payload: Payload,
    ) -> Message {
        self.system.send_local_question(self.id, request, payload)
    }
}

impl PartialEq for Entity<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Entity<'_> {}

impl std::fmt::Debug for Entity<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entity").field("id", &self.id).finish()
    }
}
