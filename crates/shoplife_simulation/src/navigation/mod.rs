//! Navigation domain — waypoints, path ассеты, path continuity
//!
//! Содержит:
//! - WaypointDirectory (id → позиция)
//! - PathAsset / PathLibrary / PathEndPolicy
//! - PathContinuity + PathCursor (start_fresh / resume / advance)
//! - PathEndResolver → PathTransitionResult
//!
//! Pathfinding/navmesh здесь НЕТ: approach leg и Active движение идут через
//! opaque "navigate to point" capability (см. `active::MovementCapability`).

pub mod continuity;
pub mod path;
pub mod transition;
pub mod waypoint;

#[cfg(test)]
mod continuity_tests;

pub use continuity::*;
pub use path::*;
pub use transition::*;
pub use waypoint::*;
