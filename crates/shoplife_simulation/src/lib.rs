//! ShopLife Simulation Core
//!
//! NPC continuity engine на Bevy 0.16: каждый агент живёт в одном из двух tiers.
//!
//! TWO-TIER ARCHITECTURE:
//! - Active tier = full-fidelity, per-frame state machine рядом с observer'ом
//!   (movement/animation capabilities, arrival events)
//! - Basic tier = дешёвая extrapolation всех остальных (round-robin батчи, catch-up)
//!
//! Identity Record переезжает между tiers при promotion/demotion; позиция,
//! состояние и прогресс по path сохраняются без скачков.

use bevy::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

// Публичные модули
pub mod active;
pub mod basic;
pub mod behaviors;
pub mod config;
pub mod decision;
pub mod error;
pub mod logger;
pub mod navigation;
pub mod record;
pub mod state;
pub mod world;

// Re-export базовых типов для удобства
pub use active::{ActiveController, ActiveStateHandler, AgentContext, MovementCapability, AnimationCapability};
pub use basic::{BasicContext, BasicScheduler, BasicStateHandler, BasicTransition};
pub use config::{ContinuityConfig, SchedulingStrategy};
pub use decision::{DecisionOutcome, DecisionResolver};
pub use error::{ContinuityError, ContinuityResult, ErrorKind, ErrorLedger};
pub use record::{IdentityRecord, IdentitySnapshot, NpcId, Schedule};
pub use state::{StateIdentity, StateMappingRegistry};
pub use world::{NpcWorld, NpcWorldPlugin, Observer, WorldCatalog, WorldClock};

// Re-export logger (crate::log и т.п. используются по всему коду и хостами)
pub use logger::{
    init_logger, log, log_error, log_info, log_warning, log_with_level, set_log_level, set_logger,
    set_logger_if_needed, LogLevel, LogPrinter,
};

/// Главный plugin симуляции
///
/// `NpcWorld` хост вставляет сам (каталог и население: данные игры);
/// пока его нет, системы tiers не запускаются.
pub struct SimulationPlugin;

impl Plugin for SimulationPlugin {
    fn build(&self, app: &mut App) {
        app
            // Fixed timestep 60Hz для simulation tick
            .insert_resource(Time::<Fixed>::from_hz(60.0))
            // Детерминистичный RNG (seed по умолчанию)
            .insert_resource(DeterministicRng::new(42))
            .add_plugins(NpcWorldPlugin);
    }
}

/// Детерминистичный RNG resource (seeded)
#[derive(Resource)]
pub struct DeterministicRng {
    pub rng: ChaCha8Rng,
    pub seed: u64,
}

impl DeterministicRng {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            seed,
        }
    }
}

/// Создаёт minimal Bevy App для headless симуляции (NpcWorldPlugin уже подключён)
pub fn create_headless_app(seed: u64) -> App {
    let mut app = App::new();
    init_logger();
    app.add_plugins(MinimalPlugins)
        .add_plugins(NpcWorldPlugin)
        .insert_resource(DeterministicRng::new(seed))
        .insert_resource(Time::<Fixed>::from_hz(60.0)); // 60Hz FixedUpdate

    app
}
