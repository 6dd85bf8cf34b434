//! State identity model + Active ↔ Basic mapping registry
//!
//! Содержит:
//! - StateIdentity / StateCategory (tagged state key, строковый encoding)
//! - типизированные семейства (GeneralState, PathState, CustomerState, CashierState, BasicState)
//! - StateMappingRegistry (bidirectional lookup, строится при старте)

pub mod identity;
pub mod registry;


pub use identity::*;
pub use registry::*;
