//! State Identity — `(category, value)` пара, единый ключ для handlers
//!
//! Поведенческие домены (General, Path, Customer, Cashier, Basic): независимые
//! закрытые enum'ы. Чтобы хранить/сравнивать/персистить их одинаково, каждый
//! член семейства сворачивается в `StateIdentity { category, value }`.
//!
//! Персистентная форма: строка `"Category.Value"` по ИМЕНИ члена, никогда не
//! числовой discriminant (он нестабилен между сборками).

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::ContinuityError;

/// Семейство состояний (закрытый список)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StateCategory {
    /// Общие Active состояния (idle, wander, home)
    General,
    /// Active path-following
    Path,
    /// Покупатель
    Customer,
    /// Кассир
    Cashier,
    /// Basic tier (off-screen extrapolation)
    Basic,
}

impl StateCategory {
    pub const ALL: [StateCategory; 5] = [
        StateCategory::General,
        StateCategory::Path,
        StateCategory::Customer,
        StateCategory::Cashier,
        StateCategory::Basic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StateCategory::General => "General",
            StateCategory::Path => "Path",
            StateCategory::Customer => "Customer",
            StateCategory::Cashier => "Cashier",
            StateCategory::Basic => "Basic",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == name)
    }

    /// Имена членов семейства, индекс = value
    pub fn value_names(&self) -> &'static [&'static str] {
        match self {
            StateCategory::General => GeneralState::NAMES,
            StateCategory::Path => PathState::NAMES,
            StateCategory::Customer => CustomerState::NAMES,
            StateCategory::Cashier => CashierState::NAMES,
            StateCategory::Basic => BasicState::NAMES,
        }
    }

    pub fn is_basic(&self) -> bool {
        matches!(self, StateCategory::Basic)
    }
}

impl fmt::Display for StateCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tagged state key. Equality по `(category, value)`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateIdentity {
    category: StateCategory,
    value: u32,
}

impl StateIdentity {
    /// Создать identity, проверяя что value существует в семействе
    pub fn new(category: StateCategory, value: u32) -> Option<Self> {
        if (value as usize) < category.value_names().len() {
            Some(Self { category, value })
        } else {
            None
        }
    }

    pub fn category(&self) -> StateCategory {
        self.category
    }

    pub fn value(&self) -> u32 {
        self.value
    }

    /// Имя члена семейства (стабильная часть строкового encoding)
    pub fn name(&self) -> &'static str {
        // value провалидирован в конструкторах
        self.category
            .value_names()
            .get(self.value as usize)
            .copied()
            .unwrap_or("?")
    }

    pub fn is_basic(&self) -> bool {
        self.category.is_basic()
    }

    /// Active path-following состояние (любой член семейства Path)
    pub fn is_active_path_following(&self) -> bool {
        matches!(self.category, StateCategory::Path)
    }

    /// Универсальный Basic эквивалент любого Active path-following
    pub fn is_basic_path_following(&self) -> bool {
        *self == StateIdentity::from(BasicState::FollowPath)
    }
}

impl fmt::Display for StateIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.category, self.name())
    }
}

impl fmt::Debug for StateIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StateIdentity({})", self)
    }
}

impl FromStr for StateIdentity {
    type Err = ContinuityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || ContinuityError::UnknownStateIdentity(s.to_string());

        let (category, value) = s.split_once('.').ok_or_else(unknown)?;
        let category = StateCategory::from_name(category.trim()).ok_or_else(unknown)?;
        let value = category
            .value_names()
            .iter()
            .position(|name| *name == value.trim())
            .ok_or_else(unknown)?;

        Ok(Self {
            category,
            value: value as u32,
        })
    }
}

impl Serialize for StateIdentity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for StateIdentity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Общий интерфейс типизированных семейств
pub trait StateFamily: Copy + Into<StateIdentity> {
    const CATEGORY: StateCategory;
    const NAMES: &'static [&'static str];
}

// Discriminant = индекс в NAMES; порядок вариантов и имён должен совпадать.
macro_rules! state_family {
    (
        $(#[$meta:meta])*
        $name:ident => $category:ident { $( $(#[$vmeta:meta])* $variant:ident ),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u32)]
        pub enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[ $( $name::$variant ),+ ];
        }

        impl StateFamily for $name {
            const CATEGORY: StateCategory = StateCategory::$category;
            const NAMES: &'static [&'static str] = &[ $( stringify!($variant) ),+ ];
        }

        impl From<$name> for StateIdentity {
            fn from(state: $name) -> Self {
                StateIdentity {
                    category: StateCategory::$category,
                    value: state as u32,
                }
            }
        }
    };
}

state_family! {
    /// Общие Active состояния
    GeneralState => General {
        /// Стоим на месте (с timeout → Wander)
        Idle,
        /// Случайные точки вокруг home
        Wander,
        /// Конец дня: идём домой
        ReturnHome,
        /// Отдых до начала следующего дня
        Resting,
    }
}

state_family! {
    /// Active path-following (все члены маппятся в `BasicState::FollowPath`)
    PathState => Path {
        FollowPath,
        Patrol,
    }
}

state_family! {
    /// Покупатель
    CustomerState => Customer {
        /// Wait → decide: заходить в магазин или нет
        LookingToShop,
        /// Ходит между полками
        Browsing,
    }
}

state_family! {
    /// Кассир
    CashierState => Cashier {
        /// Стоит за кассой
        Working,
    }
}

state_family! {
    /// Basic tier (coarse extrapolation)
    BasicState => Basic {
        Idle,
        Wander,
        FollowPath,
        ShoppingWait,
        Browsing,
        ReturnHome,
        Resting,
        Working,
    }
}
