#![allow(dead_code)]

use ecs_framework::prelude::*;

pub const PARTICLES_SMALL: usize = 1_000;
pub const PARTICLES_LARGE: usize = 10_000;

#[derive(Clone, Copy)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

#[derive(Clone, Copy)]
pub struct Velocity {
    pub x: f32,
    pub y: f32,
}

pub fn make_world(count: usize) -> EntitySystem {
    let es = EntitySystem::new();
    for i in 0..count {
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
    es
}
