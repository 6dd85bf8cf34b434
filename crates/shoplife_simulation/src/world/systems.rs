//! Bevy интеграция: NpcWorld как Resource, tiering по Observer'ам
//!
//! Порядок в FixedUpdate (chain, детерминизм):
//! 1. advance_world_clock: часы + begin_day на rollover
//! 2. observation_tiering: promote/demote по дистанции до observers
//! 3. tick_npc_tiers: Active pass, затем Basic pass

use bevy::prelude::*;

use crate::world::{CapabilityFactory, KinematicFactory, NpcWorld};
use crate::DeterministicRng;

/// Точка наблюдения (камера/игрок): вокруг неё агенты живут в Active tier
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct Observer {
    pub position: Vec3,
}

/// Factory capabilities для агентов, promoted системой tiering
#[derive(Resource)]
pub struct CapabilitySource(pub Box<dyn CapabilityFactory>);

impl Default for CapabilitySource {
    fn default() -> Self {
        Self(Box::new(KinematicFactory::default()))
    }
}

pub struct NpcWorldPlugin;

impl Plugin for NpcWorldPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<CapabilitySource>().add_systems(
            FixedUpdate,
            (advance_world_clock, observation_tiering, tick_npc_tiers)
                .chain()
                .run_if(resource_exists::<NpcWorld>),
        );
    }
}

/// Система: world clock
pub fn advance_world_clock(time: Res<Time<Fixed>>, mut world: ResMut<NpcWorld>, mut rng: ResMut<DeterministicRng>) {
    let dt = time.delta_secs();
    if world.advance_clock(dt, &mut rng.rng) {
        crate::logger::log(&format!("🕗 day {} at {:.1}h", world.clock().day(), world.clock().hour()));
    }
}

/// Система: promotion/demotion по дистанции до observers
///
/// Без observers все агенты уходят в Basic tier.
pub fn observation_tiering(
    observers: Query<&Observer>,
    source: Res<CapabilitySource>,
    mut world: ResMut<NpcWorld>,
    mut rng: ResMut<DeterministicRng>,
) {
    let positions: Vec<Vec3> = observers.iter().map(|observer| observer.position).collect();
    let report = world.update_observation(&positions, source.0.as_ref(), &mut rng.rng);

    if !report.promoted.is_empty() || !report.demoted.is_empty() {
        crate::logger::log(&format!(
            "👁️ tiering: +{} active, -{} active ({} active / {} basic)",
            report.promoted.len(),
            report.demoted.len(),
            world.active_count(),
            world.inactive_count()
        ));
    }
}

/// Система: Active pass → Basic pass
pub fn tick_npc_tiers(time: Res<Time<Fixed>>, mut world: ResMut<NpcWorld>, mut rng: ResMut<DeterministicRng>) {
    let dt = time.delta_secs();
    world.tick_tiers(dt, &mut rng.rng);
}
