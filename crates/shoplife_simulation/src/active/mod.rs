//! Active tier — full-fidelity симуляция агентов рядом с observer'ом
//!
//! Содержит:
//! - MovementCapability / AnimationCapability (boundary) + KinematicMovement
//! - ActiveStateHandler contract, AgentContext, ActiveHandlerRegistry
//! - ActiveController (tick / transition_to / promote / demote)

pub mod capability;
pub mod controller;
pub mod handler;


pub use capability::*;
pub use controller::*;
pub use handler::*;
