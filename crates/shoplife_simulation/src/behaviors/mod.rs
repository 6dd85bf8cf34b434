//! Встроенные поведения (handlers) для обоих tiers
//!
//! Содержит:
//! - general: Idle, Wander, ReturnHome, Resting
//! - path: FollowPath / Patrol (Active) + Basic.FollowPath
//! - shop: LookingToShop / ShoppingWait, Browsing, Working
//!
//! `standard_*_handlers()` покрывают всю `StateMappingRegistry::standard()` таблицу.

pub mod general;
pub mod path;
pub mod shop;


pub use general::*;
pub use path::*;
pub use shop::*;

use crate::active::ActiveHandlerRegistry;
use crate::basic::BasicHandlerRegistry;
use crate::state::{BasicState, CashierState, CustomerState, GeneralState, PathState};

/// Active handlers для всех встроенных Active состояний
pub fn standard_active_handlers() -> ActiveHandlerRegistry {
    ActiveHandlerRegistry::new()
        .with(GeneralState::Idle, IdleHandler::default)
        .with(GeneralState::Wander, WanderHandler::default)
        .with(GeneralState::ReturnHome, ReturnHomeHandler::default)
        .with(GeneralState::Resting, RestingHandler::default)
        .with(PathState::FollowPath, FollowPathHandler::default)
        .with(PathState::Patrol, FollowPathHandler::default)
        .with(CustomerState::LookingToShop, LookingToShopHandler::default)
        .with(CustomerState::Browsing, BrowsingHandler::default)
        .with(CashierState::Working, WorkingHandler::default)
}

/// Basic handlers для всех членов `BasicState`
pub fn standard_basic_handlers() -> BasicHandlerRegistry {
    BasicHandlerRegistry::new()
        .with(BasicState::Idle, BasicIdle)
        .with(BasicState::Wander, BasicWander)
        .with(BasicState::FollowPath, BasicFollowPath)
        .with(BasicState::ShoppingWait, BasicShoppingWait)
        .with(BasicState::Browsing, BasicBrowsing)
        .with(BasicState::ReturnHome, BasicReturnHome)
        .with(BasicState::Resting, BasicResting)
        .with(BasicState::Working, BasicWorking)
}
