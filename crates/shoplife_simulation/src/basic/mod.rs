//! Basic tier — дешёвая extrapolation неактивных агентов
//!
//! Содержит:
//! - BasicStateHandler contract, BasicContext, BasicHandlerRegistry
//! - BasicScheduler (All / RoundRobin батчи, catch-up по sim_clock, timeout safeguard)

pub mod handler;
pub mod scheduler;

#[cfg(test)]
mod scheduler_tests;

pub use handler::*;
pub use scheduler::*;
