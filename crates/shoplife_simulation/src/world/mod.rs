//! World — всё, что связывает tiers вместе
//!
//! Содержит:
//! - WorldCatalog (waypoints, paths, decision tables, mapping) + RON authoring
//! - TickEnv (RNG + error ledger + time of day для одного step)
//! - WorldClock (time-of-day, day rollover)
//! - NpcWorld (оркестратор Active/Basic, observation tiering, snapshots)
//! - NpcWorldPlugin (bevy systems)

pub mod catalog;
pub mod clock;
pub mod env;
pub mod npc_world;
pub mod systems;

#[cfg(test)]
mod npc_world_tests;

pub use catalog::*;
pub use clock::*;
pub use env::*;
pub use npc_world::*;
pub use systems::*;
