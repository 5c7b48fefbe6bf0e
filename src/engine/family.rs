//! # Component Family Registry
//!
//! This module provides a global registry that assigns stable [`FamilyId`]
//! values to Rust component types.
//!
//! ## Purpose
//! Families decouple component type information (`TypeId`, name, size)
//! from runtime storage: every entity system indexes its pools and its
//! per-entity slot tables by family, so the numbering must be stable and
//! shared process-wide.
//!
//! ## Design
//! - Families are assigned on **first use**, in program-start order, and
//!   are never renumbered.
//! - Identifiers are compact integers in `[0, FAMILY_CAP)`.
//! - A [`FamilyDesc`] records type metadata for diagnostics.
//!
//! ## Concurrency
//! The registry is protected by an `RwLock` for concurrent reads and
//! serialized writes.

use std::{
    any::{type_name, TypeId},
    collections::HashMap,
    mem::size_of,
    sync::{OnceLock, RwLock},
};

use crate::engine::error::FamilyError;
use crate::engine::types::{FamilyId, FAMILY_CAP};

/// Global mapping between Rust component types and compact family ids.
///
/// ## Invariants
/// - Every entry in `by_type` has a matching `by_id[family]`.
/// - Ids are always in bounds of `FAMILY_CAP`.
struct FamilyRegistry {
    next_id: FamilyId,
    by_type: HashMap<TypeId, FamilyId>,
    by_id: Vec<FamilyDesc>,
}

static REGISTRY: OnceLock<RwLock<FamilyRegistry>> = OnceLock::new();

fn family_registry() -> &'static RwLock<FamilyRegistry> {
    REGISTRY.get_or_init(|| {
        RwLock::new(FamilyRegistry {
            next_id: 0,
            by_type: HashMap::new(),
            by_id: Vec::new(),
        })
    })
}

impl FamilyRegistry {
    fn register<T: 'static>(&mut self) -> Result<FamilyId, FamilyError> {
        let type_id = TypeId::of::<T>();
        if let Some(&existing) = self.by_type.get(&type_id) {
            return Ok(existing);
        }

        let family = self.next_id;
        if (family as usize) >= FAMILY_CAP {
            return Err(FamilyError::CapacityExceeded { cap: FAMILY_CAP });
        }

        self.next_id = family.wrapping_add(1);
        self.by_type.insert(type_id, family);
        self.by_id.push(FamilyDesc {
            family,
            name: type_name::<T>(),
            type_id,
            size: size_of::<T>(),
        });

        log::debug!(
            "assigned component family {} to {}",
            family,
            type_name::<T>()
        );
        Ok(family)
    }
}

/// Returns the family of component type `T`, assigning one on first use.
///
/// ## Errors
/// - `FamilyError::CapacityExceeded` when the family id space is full.
/// - `FamilyError::PoisonedLock` when a registering thread panicked.
pub fn family_of<T: 'static>() -> Result<FamilyId, FamilyError> {
    let registry = family_registry();

    {
        let registry = registry
            .read()
            .map_err(|_| FamilyError::PoisonedLock)?;
        if let Some(&family) = registry.by_type.get(&TypeId::of::<T>()) {
            return Ok(family);
        }
    }

    let mut registry = registry
        .write()
        .map_err(|_| FamilyError::PoisonedLock)?;
    registry.register::<T>()
}

/// Returns the family of `T` if one has already been assigned.
///
/// Unlike [`family_of`], this never allocates a family: views use it so
/// that matching against a never-created component type stays a cheap
/// structural miss instead of registering storage for it.
pub fn try_family_of<T: 'static>() -> Option<FamilyId> {
    let registry = family_registry().read().ok()?;
    registry.by_type.get(&TypeId::of::<T>()).copied()
}

/// Returns a copy of the descriptor for `family`, if assigned.
pub fn family_description(family: FamilyId) -> Option<FamilyDesc> {
    let registry = family_registry().read().ok()?;
    registry.by_id.get(family as usize).copied()
}

/// Describes a registered component family.
///
/// `FamilyDesc` is `Copy` and safe to clone freely for reporting and
/// diagnostics.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct FamilyDesc {
    /// Family identifier assigned to this component type.
    pub family: FamilyId,

    /// Rust type name for diagnostics.
    pub name: &'static str,

    /// Runtime `TypeId` of the component.
    pub type_id: TypeId,

    /// Size of the component type in bytes.
    pub size: usize,
}

impl std::fmt::Display for FamilyDesc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "FamilyDesc {{ family: {}, name: {}, size: {} }}",
            self.family, self.name, self.size
        )
    }
}
