use std::sync::atomic::{AtomicU32, Ordering};

use ecs_framework::engine::family::family_of;
use ecs_framework::prelude::*;

#[derive(Clone, Copy)]
struct NumberComponent {
    number: i32,
}

struct NameComponent {
    name: String,
}

fn populate_fizzbuzz(es: &EntitySystem) {
    for i in 1..=15 {
        let ent = es.create_entity().unwrap();

        if i % 3 == 0 && i % 5 == 0 {
            ent.add_component(NameComponent {
                name: "fizzbuzz".to_string(),
            })
            .unwrap();
        } else if i % 3 == 0 {
            ent.add_component(NameComponent {
                name: "fizz".to_string(),
            })
            .unwrap();
        } else if i % 5 == 0 {
            ent.add_component(NameComponent {
                name: "buzz".to_string(),
            })
            .unwrap();
        }
        ent.add_component(NumberComponent { number: i }).unwrap();
    }
}

#[test]
fn fizzbuzz_entity_walk() {
    let es = EntitySystem::new();
    populate_fizzbuzz(&es);

    let view = EntityView::new(&es);
    let mut result = String::new();

    for ent in &view {
        if ent.has_component::<NameComponent>() {
            let name = ent.get_component::<NameComponent>();
            result += &name.get().unwrap().name;
            result.push(' ');
        } else if ent.has_component::<NumberComponent>() {
            let number = ent.get_component::<NumberComponent>();
            result += &number.get().unwrap().number.to_string();
            result.push(' ');
        }
    }

    assert_eq!(
        result,
        "1 2 fizz 4 buzz fizz 7 8 fizz buzz 11 fizz 13 14 fizzbuzz "
    );
}

#[test]
fn fizzbuzz_for_each_match_any() {
    let es = EntitySystem::new();
    populate_fizzbuzz(&es);

    let mut result = String::new();
    EntityView::new(&es)
        .with_components::<MatchAny, (NumberComponent, NameComponent)>()
        .for_each(|_, (number, name)| {
            if let Some(name) = name {
                result += &name.name;
                result.push(' ');
            }
            if let Some(number) = number {
                result += &number.number.to_string();
                result.push(' ');
            }
        });

    assert_eq!(
        result,
        "1 2 fizz 3 4 buzz 5 fizz 6 7 8 fizz 9 buzz 10 11 fizz 12 13 14 fizzbuzz 15 "
    );
}

#[test]
fn fizzbuzz_for_each_match_all() {
    let es = EntitySystem::new();
    populate_fizzbuzz(&es);

    let mut result = String::new();
    EntityView::new(&es)
        .with_components::<MatchAll, (NumberComponent, NameComponent)>()
        .for_each(|_, (number, name)| {
            result += &number.number.to_string();
            result += &name.name;
            result.push(' ');
        });

    assert_eq!(result, "3fizz 5buzz 6fizz 9fizz 10buzz 12fizz 15fizzbuzz ");
}

#[test]
fn fizzbuzz_for_each_match_any_predicated() {
    let es = EntitySystem::new();
    populate_fizzbuzz(&es);

    let mut result = String::new();
    EntityView::new(&es)
        .with_components::<MatchAny, (NumberComponent, NameComponent)>()
        .filter(|ent| ent.id().index() % 2 == 0)
        .for_each(|_, (number, name)| {
            if let Some(name) = name {
                result += &name.name;
                result.push(' ');
            }
            if let Some(number) = number {
                result += &number.number.to_string();
                result.push(' ');
            }
        });

    assert_eq!(result, "1 fizz 3 buzz 5 7 fizz 9 11 13 fizzbuzz 15 ");
}

#[derive(Clone, Copy)]
struct Position {
    x: f32,
    y: f32,
}

#[derive(Clone, Copy)]
struct Velocity {
    x: f32,
    y: f32,
}

const PARTICLE_COUNT: usize = 1000;

fn populate_particles(es: &EntitySystem) {
    for i in 0..PARTICLE_COUNT {
        let ent = es.create_entity().unwrap();
        let angle = (i as f32) * 0.006_283;
        let magnitude = (i % 100) as f32;

        ent.add_component(Position {
            x: angle.cos() * magnitude,
            y: angle.sin() * magnitude,
        })
        .unwrap();
        ent.add_component(Velocity {
            x: ((i % 10) as f32 - 5.0) / 5.0,
            y: ((i % 7) as f32 - 3.0) / 5.0,
        })
        .unwrap();
    }
}

#[test]
fn nbody_sequential_visit_counts() {
    let es = EntitySystem::new();
    populate_particles(&es);

    assert_eq!(es.entity_count(), PARTICLE_COUNT);
    assert_eq!(
        es.component_count(family_of::<Position>().unwrap()),
        PARTICLE_COUNT
    );
    assert_eq!(
        es.component_count(family_of::<Velocity>().unwrap()),
        PARTICLE_COUNT
    );

    const STEPS: u32 = 5;
    let gravity_visits = AtomicU32::new(0);
    let velocity_visits = AtomicU32::new(0);

    let outer = EntityView::new(&es)
        .with_components::<MatchAll, (Position, Velocity)>();
    let particles =
        EntityView::new(&es).with_components::<MatchAll, (Position,)>();

    for _ in 0..STEPS {
        outer.for_each(|ent, (pos, vel)| {
            particles.for_each(|ent2, (pos2,)| {
                if ent == ent2 {
                    return;
                }

                let x_delta = pos2.x - pos.x;
                let y_delta = pos2.y - pos.y;
                let delta =
                    (x_delta * x_delta + y_delta * y_delta + 1e-9).sqrt();
                let inv_dist = 1.0 / delta;
                let inv_dist2 = inv_dist * inv_dist;

                vel.x += x_delta * inv_dist2;
                vel.y += y_delta * inv_dist2;

                gravity_visits.fetch_add(1, Ordering::Relaxed);
            });

            pos.x += vel.x;
            pos.y += vel.y;

            velocity_visits.fetch_add(1, Ordering::Relaxed);
        });
    }

    assert_eq!(
        gravity_visits.load(Ordering::Relaxed),
        (PARTICLE_COUNT * (PARTICLE_COUNT - 1)) as u32 * STEPS
    );
    assert_eq!(
        velocity_visits.load(Ordering::Relaxed),
        PARTICLE_COUNT as u32 * STEPS
    );
}

#[test]
fn nbody_parallel_visit_counts() {
    let es = EntitySystem::new();
    populate_particles(&es);

    const STEPS: u32 = 5;
    let gravity_visits = AtomicU32::new(0);
    let velocity_visits = AtomicU32::new(0);

    let queue = JobQueue::new().unwrap();
    let outer = EntityView::new(&es)
        .with_components::<MatchAll, (Position, Velocity)>()
        .parallel_with(&queue);
    let particles =
        EntityView::new(&es).with_components::<MatchAll, (Position,)>();

    for _ in 0..STEPS {
        outer.par_for_each(|ent, (pos, vel)| {
            particles.for_each(|ent2, (pos2,)| {
                if ent == ent2 {
                    return;
                }

                let x_delta = pos2.x - pos.x;
                let y_delta = pos2.y - pos.y;
                let delta =
                    (x_delta * x_delta + y_delta * y_delta + 1e-9).sqrt();
                let inv_dist = 1.0 / delta;
                let inv_dist2 = inv_dist * inv_dist;

                vel.x += x_delta * inv_dist2;
                vel.y += y_delta * inv_dist2;

                gravity_visits.fetch_add(1, Ordering::Relaxed);
            });

            pos.x += vel.x;
            pos.y += vel.y;

            velocity_visits.fetch_add(1, Ordering::Relaxed);
        });
    }

    assert_eq!(
        gravity_visits.load(Ordering::Relaxed),
        (PARTICLE_COUNT * (PARTICLE_COUNT - 1)) as u32 * STEPS
    );
    assert_eq!(
        velocity_visits.load(Ordering::Relaxed),
        PARTICLE_COUNT as u32 * STEPS
    );
}

#[test]
fn parallel_matches_sequential_multiset() {
    let es = EntitySystem::new();
    populate_fizzbuzz(&es);

    let view = EntityView::new(&es)
        .with_components::<MatchAny, (NumberComponent, NameComponent)>();

    let mut sequential: Vec<u64> = Vec::new();
    view.for_each(|ent, _| sequential.push(ent.id().0));

    let parallel = std::sync::Mutex::new(Vec::<u64>::new());
    let queue = JobQueue::with_workers(4).unwrap();
    let view = EntityView::new(&es)
        .with_components::<MatchAny, (NumberComponent, NameComponent)>()
        .parallel_with(&queue);
    view.par_for_each(|ent, _| parallel.lock().unwrap().push(ent.id().0));

    let mut parallel = parallel.into_inner().unwrap();
    sequential.sort_unstable();
    parallel.sort_unstable();
    assert_eq!(sequential, parallel);
}

#[test]
fn generational_safety_across_index_reuse() {
    let es = EntitySystem::new();

    let a = es.create_entity().unwrap();
    let handle = a.add_component(NumberComponent { number: 7 }).unwrap();
    let a_id = a.id();
    let component_id = handle.id();

    assert!(handle.is_alive());
    es.destroy_entity(a_id);

    let b = es.create_entity().unwrap();
    assert_eq!(b.id().index(), a_id.index());
    assert_ne!(b.id(), a_id);

    assert!(!handle.is_alive());
    assert!(handle.get().is_none());
    assert!(!es.is_alive_entity(a_id));
    assert!(!es.is_alive_component(component_id));
    assert!(es.get_component::<NumberComponent>(component_id).is_empty());
}

#[test]
fn component_view_walks_live_slots_in_order() {
    let es = EntitySystem::new();
    populate_fizzbuzz(&es);

    let mut numbers: Vec<i32> = Vec::new();
    let view = ComponentView::<NumberComponent>::new(&es);
    for handle in &view {
        numbers.push(handle.get().unwrap().number);
    }
    assert_eq!(numbers, (1..=15).collect::<Vec<_>>());

    let mut doubled = 0;
    ComponentView::<NumberComponent>::new(&es)
        .filter(|n| n.number % 2 == 0)
        .for_each(|n| {
            n.number *= 2;
            doubled += 1;
        });
    assert_eq!(doubled, 7);

    let entity_three = EntityView::new(&es)
        .iter()
        .nth(2)
        .unwrap();
    assert_eq!(
        entity_three
            .get_component::<NumberComponent>()
            .get()
            .unwrap()
            .number,
        3
    );
}

#[test]
fn destruction_during_iteration_is_filtered() {
    let es = EntitySystem::new();
    let ids: Vec<EntityId> = (0..5)
        .map(|i| {
            let ent = es.create_entity().unwrap();
            ent.add_component(NumberComponent { number: i }).unwrap();
            ent.id()
        })
        .collect();

    es.destroy_entity(ids[2]);

    let mut visited = Vec::new();
    EntityView::new(&es).for_each(|ent| visited.push(ent.id()));
    assert_eq!(visited.len(), 4);
    assert!(!visited.contains(&ids[2]));
}
