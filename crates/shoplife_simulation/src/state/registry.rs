//! State Mapping Registry — двусторонняя таблица Active ↔ Basic
//!
//! Строится один раз при старте из явного списка пар (никакой reflection/парсинга
//! имён типов). Гарантии после `build()`:
//! - обычные пары биективны → round-trip demote/promote сохраняет identity
//! - любое Active состояние семейства Path маппится в `Basic.FollowPath`;
//!   обратное направление отдаёт primary path state
//! - default Active/Basic пара всегда присутствует (safe fallback)

use std::collections::HashMap;

use crate::error::{ContinuityError, ContinuityResult, Fallback};
use crate::state::{BasicState, CashierState, CustomerState, GeneralState, PathState, StateIdentity};

#[derive(Debug, Clone)]
pub struct StateMappingRegistry {
    active_to_basic: HashMap<StateIdentity, StateIdentity>,
    basic_to_active: HashMap<StateIdentity, StateIdentity>,
    path_basic: StateIdentity,
    primary_path_active: StateIdentity,
    default_active: StateIdentity,
    default_basic: StateIdentity,
}

impl StateMappingRegistry {
    pub fn builder(default_active: StateIdentity, default_basic: StateIdentity) -> StateMappingBuilder {
        StateMappingBuilder {
            pairs: Vec::new(),
            primary_path_active: PathState::FollowPath.into(),
            default_active,
            default_basic,
        }
    }

    /// Стандартная таблица для встроенных семейств
    pub fn standard() -> ContinuityResult<Self> {
        Self::builder(GeneralState::Idle.into(), BasicState::Idle.into())
            .pair(GeneralState::Idle, BasicState::Idle)
            .pair(GeneralState::Wander, BasicState::Wander)
            .pair(GeneralState::ReturnHome, BasicState::ReturnHome)
            .pair(GeneralState::Resting, BasicState::Resting)
            .pair(CustomerState::LookingToShop, BasicState::ShoppingWait)
            .pair(CustomerState::Browsing, BasicState::Browsing)
            .pair(CashierState::Working, BasicState::Working)
            .path_following(PathState::FollowPath)
            .build()
    }

    /// Basic эквивалент Active состояния (используется при demotion)
    pub fn basic_for(&self, active: StateIdentity) -> Option<StateIdentity> {
        if active.is_active_path_following() {
            return Some(self.path_basic);
        }
        self.active_to_basic.get(&active).copied()
    }

    /// Active эквивалент Basic состояния (используется при promotion)
    pub fn active_for(&self, basic: StateIdentity) -> Option<StateIdentity> {
        if basic == self.path_basic {
            return Some(self.primary_path_active);
        }
        self.basic_to_active.get(&basic).copied()
    }

    /// `basic_for` c hard error → default Basic state
    pub fn basic_or_default(&self, active: StateIdentity) -> Result<StateIdentity, Fallback<StateIdentity>> {
        self.basic_for(active)
            .ok_or_else(|| Fallback::new(ContinuityError::MissingMapping(active), self.default_basic))
    }

    /// `active_for` c hard error → default Active state
    pub fn active_or_default(&self, basic: StateIdentity) -> Result<StateIdentity, Fallback<StateIdentity>> {
        self.active_for(basic)
            .ok_or_else(|| Fallback::new(ContinuityError::MissingMapping(basic), self.default_active))
    }

    pub fn default_active(&self) -> StateIdentity {
        self.default_active
    }

    pub fn default_basic(&self) -> StateIdentity {
        self.default_basic
    }

    /// Basic path-following state (`Basic.FollowPath`)
    pub fn path_basic(&self) -> StateIdentity {
        self.path_basic
    }

    pub fn primary_path_active(&self) -> StateIdentity {
        self.primary_path_active
    }

    /// Все явные Active → Basic пары (без universal path mapping)
    pub fn pairs(&self) -> impl Iterator<Item = (StateIdentity, StateIdentity)> + '_ {
        self.active_to_basic.iter().map(|(a, b)| (*a, *b))
    }
}

pub struct StateMappingBuilder {
    pairs: Vec<(StateIdentity, StateIdentity)>,
    primary_path_active: StateIdentity,
    default_active: StateIdentity,
    default_basic: StateIdentity,
}

impl StateMappingBuilder {
    pub fn pair(mut self, active: impl Into<StateIdentity>, basic: impl Into<StateIdentity>) -> Self {
        self.pairs.push((active.into(), basic.into()));
        self
    }

    /// Какой Active path state отдаём при promotion из `Basic.FollowPath`
    pub fn path_following(mut self, primary: impl Into<StateIdentity>) -> Self {
        self.primary_path_active = primary.into();
        self
    }

    pub fn build(self) -> ContinuityResult<StateMappingRegistry> {
        let path_basic: StateIdentity = BasicState::FollowPath.into();
        let mut active_to_basic = HashMap::new();
        let mut basic_to_active = HashMap::new();

        if !self.primary_path_active.is_active_path_following() {
            return Err(ContinuityError::MissingMapping(self.primary_path_active));
        }

        for (active, basic) in self.pairs {
            // Active стороной может быть только не-Basic семейство, и наоборот
            if active.is_basic() || active.is_active_path_following() {
                return Err(ContinuityError::DuplicateMapping { state: active, existing: basic });
            }
            if !basic.is_basic() || basic == path_basic {
                return Err(ContinuityError::DuplicateMapping { state: basic, existing: active });
            }
            if let Some(existing) = active_to_basic.insert(active, basic) {
                return Err(ContinuityError::DuplicateMapping { state: active, existing });
            }
            if let Some(existing) = basic_to_active.insert(basic, active) {
                return Err(ContinuityError::DuplicateMapping { state: basic, existing });
            }
        }

        // Default пара обязана существовать: иначе fallback некуда вести
        match active_to_basic.get(&self.default_active) {
            Some(basic) if *basic == self.default_basic => {}
            _ => return Err(ContinuityError::MissingMapping(self.default_active)),
        }

        Ok(StateMappingRegistry {
            active_to_basic,
            basic_to_active,
            path_basic,
            primary_path_active: self.primary_path_active,
            default_active: self.default_active,
            default_basic: self.default_basic,
        })
    }
}
