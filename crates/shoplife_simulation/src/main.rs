//! Headless симуляция ShopLife
//!
//! Демо-улица с магазином: observer идёт вдоль улицы, агенты рядом с ним
//! промоутятся в Active tier, остальные живут в Basic tier.

use std::time::Duration;

use bevy::prelude::*;
use bevy::time::TimeUpdateStrategy;
use shoplife_simulation::world::{demo_catalog, demo_population};
use shoplife_simulation::{create_headless_app, log_info, ContinuityConfig, DeterministicRng, NpcWorld, Observer};

fn main() {
    let seed = 42;
    println!("Starting ShopLife headless simulation (seed: {})", seed);

    let catalog = match demo_catalog() {
        Ok(catalog) => catalog,
        Err(error) => {
            eprintln!("demo catalog invalid: {}", error);
            return;
        }
    };
    let config = ContinuityConfig {
        day_length_secs: 120.0,
        promote_radius: 12.0,
        demote_radius: 16.0,
        ..Default::default()
    };

    let mut world = match NpcWorld::with_standard_behaviors(catalog, config) {
        Ok(world) => world,
        Err(error) => {
            eprintln!("world setup failed: {}", error);
            return;
        }
    };

    let mut rng = DeterministicRng::new(seed);
    for record in demo_population(40) {
        if let Err(error) = world.register(record, &mut rng.rng) {
            eprintln!("register failed: {}", error);
        }
    }

    let mut app = create_headless_app(seed);
    // Ровно один FixedUpdate шаг на app.update()
    app.insert_resource(TimeUpdateStrategy::ManualDuration(Duration::from_secs_f64(1.0 / 60.0)))
        .insert_resource(rng)
        .insert_resource(world);
    let observer = app.world_mut().spawn(Observer::default()).id();

    // 3 минуты симуляции
    for tick in 0..10_800u32 {
        // Observer ходит туда-обратно вдоль улицы
        let phase = (tick as f32 / 60.0 * 0.05).sin();
        if let Some(mut entity) = app.world_mut().get_mut::<Observer>(observer) {
            entity.position = Vec3::new(phase * 20.0, 0.0, -4.0);
        }

        app.update();

        if tick % 1_800 == 0 {
            let world = app.world().resource::<NpcWorld>();
            log_info(&format!(
                "Tick {}: day {} {:.1}h, {} active / {} basic, {} errors",
                tick,
                world.clock().day(),
                world.clock().hour(),
                world.active_count(),
                world.inactive_count(),
                world.errors().total()
            ));
        }
    }

    let world = app.world().resource::<NpcWorld>();
    for controller in world.controllers() {
        println!("  {} {} at {:?}", controller.id(), controller.current_state(), controller.position());
    }
    println!("Simulation complete!");
}
