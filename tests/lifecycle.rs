use ecs_framework::engine::family::family_of;
use ecs_framework::prelude::*;
use ecs_framework::Bitfield;

#[derive(Clone, Copy, PartialEq, Debug)]
struct Health(u32);

#[derive(Clone, Copy)]
struct Armor(u32);

#[test]
fn bitfield_round_trip() {
    let mut bits = Bitfield::new();
    assert!(!bits.has(3));

    let before = bits.clone();
    bits.set(3);
    assert!(bits.has(3));
    assert_eq!(bits.count(), 1);
    bits.clear(3);
    assert_eq!(bits, before);

    bits.set(2);
    bits.set(130);
    assert_eq!(bits.count(), 2);
    assert_eq!(bits.iter_bits().collect::<Vec<_>>(), vec![2, 130]);

    let mut other = Bitfield::new();
    other.set(2);
    assert!(bits.contains_all(&other));
    assert!(bits.intersects(&other));
    other.set(7);
    assert!(!bits.contains_all(&other));

    bits.union_with(&other);
    assert!(bits.has(7));
    bits.intersect_with(&other);
    assert_eq!(bits.iter_bits().collect::<Vec<_>>(), vec![2, 7]);
}

#[test]
fn destroy_entity_is_idempotent() {
    let es = EntitySystem::new();
    let ent = es.create_entity().unwrap();
    let id = ent.id();
    ent.add_component(Health(10)).unwrap();

    es.destroy_entity(id);
    assert!(!es.is_alive_entity(id));

    // second destroy of a stale id is a no-op
    es.destroy_entity(id);
    assert_eq!(es.entity_count(), 1);

    let reused = es.create_entity().unwrap();
    assert_eq!(reused.id().index(), id.index());
    assert_eq!(reused.id().generation(), id.generation() + 1);
}

#[test]
fn attach_detach_restores_state() {
    let es = EntitySystem::new();
    let ent = es.create_entity().unwrap();
    let cid = es.create_component(Health(5)).unwrap();
    let family = family_of::<Health>().unwrap();

    es.attach_component(cid, ent.id());
    assert!(es.has_component(family, ent.id()));
    assert_eq!(es.get_entity(cid), ent.id());

    es.detach_component(cid, ent.id());
    assert!(!es.has_component(family, ent.id()));
    assert!(es.is_alive_component(cid));
    assert_eq!(es.get_entity(cid), EntityId::INVALID);
}

#[test]
fn attachment_is_exclusive_per_family() {
    let es = EntitySystem::new();
    let ent = es.create_entity().unwrap();
    let family = family_of::<Health>().unwrap();

    let first = es.create_component(Health(1)).unwrap();
    let second = es.create_component(Health(2)).unwrap();

    es.attach_component(first, ent.id());
    es.attach_component(second, ent.id());

    assert_eq!(es.entity_component_id(family, ent.id()), second);
    assert!(es.is_alive_component(first));
    assert_eq!(es.get_entity(first), EntityId::INVALID);
    assert_eq!(ent.get_component::<Health>().get(), Some(&Health(2)));
}

#[test]
fn attach_steals_from_prior_owner() {
    let es = EntitySystem::new();
    let a = es.create_entity().unwrap();
    let b = es.create_entity().unwrap();
    let family = family_of::<Health>().unwrap();

    let cid = es.create_component(Health(9)).unwrap();
    es.attach_component(cid, a.id());
    es.attach_component(cid, b.id());

    assert!(!es.has_component(family, a.id()));
    assert!(es.has_component(family, b.id()));
    assert_eq!(es.get_entity(cid), b.id());
}

#[test]
fn destroy_component_bumps_generation_once() {
    let es = EntitySystem::new();
    let first = es.create_component(Health(1)).unwrap();
    es.destroy_component(first);
    assert!(!es.is_alive_component(first));

    // stale destroy is a no-op
    es.destroy_component(first);

    // LIFO reuse of the slot, one generation later
    let second = es.create_component(Health(2)).unwrap();
    assert_eq!(second.index(), first.index());
    assert_eq!(second.generation(), first.generation() + 1);
    assert!(es.is_alive_component(second));
}

#[test]
fn stale_operations_are_silent() {
    let es = EntitySystem::new();
    let ent = es.create_entity().unwrap();
    let cid = es.create_component(Health(1)).unwrap();
    es.attach_component(cid, ent.id());
    let id = ent.id();

    es.destroy_entity(id);

    // all of these target stale ids and must not panic or mutate
    es.attach_component(cid, id);
    es.detach_component(cid, id);
    es.destroy_entity(id);
    assert!(!es.has_component(family_of::<Health>().unwrap(), id));
    assert_eq!(es.get_entity(cid), EntityId::INVALID);
    assert!(es.get_component::<Health>(cid).is_empty());
    assert!(es
        .get_component::<Health>(ComponentId::INVALID)
        .is_empty());
}

#[test]
fn destroying_entity_destroys_components() {
    let es = EntitySystem::new();
    let ent = es.create_entity().unwrap();
    let health = ent.add_component(Health(3)).unwrap();
    let armor = ent.add_component(Armor(8)).unwrap();
    let health_id = health.id();
    let armor_id = armor.id();
    drop(health);
    drop(armor);

    es.destroy_entity(ent.id());
    assert!(!es.is_alive_component(health_id));
    assert!(!es.is_alive_component(armor_id));
    assert_eq!(es.component_count(family_of::<Health>().unwrap()), 0);
    assert_eq!(es.component_count(family_of::<Armor>().unwrap()), 0);
}

#[test]
fn handle_refcounts_pin_slots() {
    let es = EntitySystem::new();
    let family = family_of::<Health>().unwrap();

    let c0 = es.create_component(Health(0)).unwrap();
    let c1 = es.create_component(Health(1)).unwrap();
    let c2 = es.create_component(Health(2)).unwrap();
    assert_eq!(es.pool_size(family), 3);

    let pinned = es.get_component::<Health>(c1);
    let copy = pinned.clone();

    es.destroy_component(c2);
    es.destroy_component(c1);

    // the tail scan stops at the slot pinned by outstanding handles
    assert_eq!(es.clean_components(family), 1);
    assert_eq!(es.pool_size(family), 2);

    drop(pinned);
    drop(copy);
    assert_eq!(es.clean_components(family), 1);
    assert_eq!(es.pool_size(family), 1);

    assert!(es.is_alive_component(c0));
}

#[test]
fn unlink_and_release_semantics() {
    let es = EntitySystem::new();
    let family = family_of::<Health>().unwrap();

    let c0 = es.create_component(Health(0)).unwrap();
    let c1 = es.create_component(Health(1)).unwrap();

    let mut handle = es.get_component::<Health>(c1);
    handle.unlink();
    es.destroy_component(c1);

    // unlinked handles no longer pin the slot
    assert_eq!(es.clean_components(family), 1);
    assert_eq!(es.pool_size(family), 1);
    assert!(handle.get().is_none());

    let mut other = es.get_component::<Health>(c0);
    assert_eq!(other.get(), Some(&Health(0)));
    other.release();
    assert!(other.is_empty());
    assert!(es.is_alive_component(c0));
}

#[test]
fn clean_entities_truncates_destroyed_tail() {
    let es = EntitySystem::new();
    let ids: Vec<EntityId> =
        (0..4).map(|_| es.create_entity().unwrap().id()).collect();

    // a destroyed record shielded by a live tail is not reclaimable
    es.destroy_entity(ids[1]);
    assert_eq!(es.clean_entities(), 0);

    // once the live tail is gone, the whole destroyed run goes with it
    es.destroy_entity(ids[3]);
    es.destroy_entity(ids[2]);
    assert_eq!(es.clean_entities(), 3);
    assert_eq!(es.entity_count(), 1);

    assert!(es.is_alive_entity(ids[0]));
    let fresh = es.create_entity().unwrap();
    assert_eq!(fresh.id().index(), 1);
    assert_eq!(fresh.id().generation(), 1);
}

#[test]
fn handle_mutation_via_deref() {
    let es = EntitySystem::new();
    let ent = es.create_entity().unwrap();
    let mut handle = ent.add_component(Health(10)).unwrap();

    handle.get_mut().unwrap().0 += 5;
    assert_eq!(handle.get(), Some(&Health(15)));
    assert_eq!(handle.0, 15);

    let through_system = ent.get_component::<Health>();
    assert_eq!(through_system.get(), Some(&Health(15)));
}

#[test]
fn pool_grows_past_chunk_boundary() {
    let es = EntitySystem::new();
    let family = family_of::<Health>().unwrap();

    let ids: Vec<ComponentId> = (0..600)
        .map(|i| es.create_component(Health(i)).unwrap())
        .collect();
    assert_eq!(es.component_count(family), 600);
    assert_eq!(es.pool_size(family), 600);

    // slot pointers are stable across growth
    let early = es.get_component::<Health>(ids[0]);
    let _more: Vec<ComponentId> = (0..300)
        .map(|i| es.create_component(Health(1000 + i)).unwrap())
        .collect();
    assert_eq!(early.get(), Some(&Health(0)));

    for cid in &ids {
        es.destroy_component(*cid);
    }
    assert_eq!(es.component_count(family), 300);
}
