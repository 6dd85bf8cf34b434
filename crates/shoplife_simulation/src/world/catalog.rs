//! WorldCatalog — immutable контент мира (waypoints, paths, decision tables, mapping)
//!
//! Authoring через `CatalogDef` (serde/RON), `build()` валидирует связи.
//! Runtime держит `Arc<WorldCatalog>`: controllers и scheduler получают его при конструировании.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::decision::{DecisionOutcome, DecisionPoint, DecisionResolver, WeightedOutcome};
use crate::error::{ContinuityError, ContinuityResult};
use crate::navigation::{
    PathAsset, PathContinuity, PathEndPolicy, PathEndResolver, PathLibrary, PathStart, WaypointDirectory,
    WaypointId,
};
use crate::record::{DayStartBehavior, IdentityRecord, NpcId, Schedule};
use crate::state::{CashierState, CustomerState, GeneralState, PathState, StateIdentity, StateMappingRegistry};

#[derive(Debug, Clone)]
pub struct WorldCatalog {
    pub waypoints: WaypointDirectory,
    pub paths: PathLibrary,
    pub decisions: DecisionResolver,
    pub mapping: StateMappingRegistry,
}

impl WorldCatalog {
    pub fn new(
        waypoints: WaypointDirectory,
        paths: PathLibrary,
        decisions: DecisionResolver,
        mapping: StateMappingRegistry,
    ) -> ContinuityResult<Self> {
        let catalog = Self {
            waypoints,
            paths,
            decisions,
            mapping,
        };
        catalog.validate()?;
        Ok(catalog)
    }

    /// Все ссылки между ассетами резолвятся
    pub fn validate(&self) -> ContinuityResult<()> {
        self.paths.validate(&self.waypoints)?;

        let resolver = self.path_end_resolver();
        for path in self.paths.iter() {
            match path.end_policy() {
                PathEndPolicy::Transition(state) => {
                    resolver.outcome_to_result(&DecisionOutcome::State(*state))?;
                }
                PathEndPolicy::Decision(point) => {
                    if self.decisions.get(point).is_none() {
                        return Err(ContinuityError::MissingDecisionPoint(point.0.clone()));
                    }
                }
                PathEndPolicy::Continue(_) => {} // проверено в PathLibrary::validate
            }
        }

        for point in self.decisions.points() {
            for weighted in point.outcomes() {
                resolver.outcome_to_result(&weighted.outcome)?;
            }
        }
        Ok(())
    }

    pub fn path_end_resolver(&self) -> PathEndResolver<'_> {
        PathEndResolver {
            paths: &self.paths,
            decisions: &self.decisions,
            mapping: &self.mapping,
        }
    }

    pub fn continuity(&self, arrival_threshold: f32) -> PathContinuity<'_> {
        PathContinuity::new(&self.waypoints, arrival_threshold)
    }
}

// ============================================================================
// Authoring (serde)
// ============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PathDef {
    pub id: String,
    pub waypoints: Vec<String>,
    pub end: PathEndPolicy,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DecisionDef {
    pub id: String,
    pub outcomes: Vec<WeightedOutcome>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MappingDef {
    pub default_active: StateIdentity,
    pub default_basic: StateIdentity,
    pub primary_path: StateIdentity,
    /// `(Active, Basic)` пары
    pub pairs: Vec<(StateIdentity, StateIdentity)>,
}

/// Описание контента мира (RON)
///
/// ```ron
/// (
///     waypoints: { "door": (0.0, 0.0, 0.0), "aisle": (4.0, 0.0, 0.0) },
///     paths: [(id: "browse", waypoints: ["door", "aisle"], end: Transition("General.Idle"))],
/// )
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogDef {
    pub waypoints: BTreeMap<String, (f32, f32, f32)>,
    pub paths: Vec<PathDef>,
    pub decisions: Vec<DecisionDef>,
    /// None → `StateMappingRegistry::standard()`
    pub mapping: Option<MappingDef>,
}

impl CatalogDef {
    pub fn from_ron_str(text: &str) -> ContinuityResult<Self> {
        ron::from_str(text).map_err(|e| ContinuityError::ConfigParse(e.to_string()))
    }

    pub fn build(&self) -> ContinuityResult<WorldCatalog> {
        let mut waypoints = WaypointDirectory::new();
        for (id, (x, y, z)) in &self.waypoints {
            waypoints.insert(id.as_str(), Vec3::new(*x, *y, *z));
        }

        let mut paths = PathLibrary::new();
        for def in &self.paths {
            let ids = def.waypoints.iter().map(|w| WaypointId(w.clone())).collect();
            paths.insert(PathAsset::new(def.id.as_str(), ids, def.end.clone())?);
        }

        let mut decisions = DecisionResolver::new();
        for def in &self.decisions {
            decisions.insert(DecisionPoint::new(def.id.as_str(), def.outcomes.clone()));
        }

        let mapping = match &self.mapping {
            Some(def) => {
                let mut builder = StateMappingRegistry::builder(def.default_active, def.default_basic)
                    .path_following(def.primary_path);
                for (active, basic) in &def.pairs {
                    builder = builder.pair(*active, *basic);
                }
                builder.build()?
            }
            None => StateMappingRegistry::standard()?,
        };

        WorldCatalog::new(waypoints, paths, decisions, mapping)
    }
}

/// Decision point, который LookingToShop/ShoppingWait спрашивают после ожидания
pub const SHOP_DECISION: &str = "shop_decision";
/// Decision point в конце патрульного маршрута улицы
pub const STREET_DECISION: &str = "shop_or_continue";

/// Демо-контент: улица с магазином, патрульный маршрут и проход по залу
pub fn demo_catalog() -> ContinuityResult<WorldCatalog> {
    let waypoints = WaypointDirectory::new()
        .with("street_west", Vec3::new(-20.0, 0.0, 0.0))
        .with("street_mid", Vec3::new(0.0, 0.0, 0.0))
        .with("street_east", Vec3::new(20.0, 0.0, 0.0))
        .with("shop_door", Vec3::new(0.0, 0.0, -6.0))
        .with("aisle_front", Vec3::new(-3.0, 0.0, -10.0))
        .with("aisle_back", Vec3::new(3.0, 0.0, -14.0))
        .with("counter", Vec3::new(0.0, 0.0, -16.0));

    let paths = PathLibrary::new()
        .with(PathAsset::new(
            "street",
            vec!["street_west".into(), "street_mid".into(), "street_east".into()],
            PathEndPolicy::Decision(STREET_DECISION.into()),
        )?)
        .with(PathAsset::new(
            "into_shop",
            vec!["street_mid".into(), "shop_door".into(), "aisle_front".into()],
            PathEndPolicy::Transition(CustomerState::Browsing.into()),
        )?)
        .with(PathAsset::new(
            "aisles",
            vec![
                "aisle_front".into(),
                "aisle_back".into(),
                "counter".into(),
                "shop_door".into(),
            ],
            PathEndPolicy::Transition(GeneralState::Wander.into()),
        )?);

    let decisions = DecisionResolver::new()
        .with(DecisionPoint::new(
            STREET_DECISION,
            vec![
                WeightedOutcome::new(DecisionOutcome::State(CustomerState::LookingToShop.into()), 0.2),
                WeightedOutcome::new(DecisionOutcome::Path(PathStart::new("street", 2, true)), 0.8),
            ],
        ))
        .with(DecisionPoint::new(
            SHOP_DECISION,
            vec![
                WeightedOutcome::new(DecisionOutcome::Path(PathStart::new("into_shop", 0, false)), 0.6),
                WeightedOutcome::new(DecisionOutcome::State(GeneralState::Wander.into()), 0.4),
            ],
        ));

    WorldCatalog::new(waypoints, paths, decisions, StateMappingRegistry::standard()?)
}

/// Демо-население: прохожие на улице, покупатели у витрины, кассиры и гуляющие
///
/// Роли чередуются по id; позиции детерминированы (без RNG).
pub fn demo_population(count: u64) -> Vec<IdentityRecord> {
    (0..count)
        .map(|i| {
            let id = NpcId(i + 1);
            let spread = (i / 4) as f32;
            match i % 4 {
                0 => {
                    let home = Vec3::new(-20.0, 0.0, 2.0 + spread * 0.5);
                    IdentityRecord::new(id, home, Quat::IDENTITY, PathState::FollowPath.into())
                        .with_day_start(DayStartBehavior::Path(PathStart::new("street", 0, false)))
                }
                1 => {
                    let home = Vec3::new(-4.0 + spread, 0.0, -4.0);
                    IdentityRecord::new(id, home, Quat::IDENTITY, CustomerState::LookingToShop.into())
                        .with_schedule(Schedule::workday(8.0, 20.0, 1.5))
                }
                2 => {
                    let home = Vec3::new(spread * 1.5, 0.0, -16.5);
                    IdentityRecord::new(id, home, Quat::from_rotation_y(std::f32::consts::PI), CashierState::Working.into())
                        .with_schedule(Schedule::workday(8.0, 21.0, 1.0))
                }
                _ => {
                    let home = Vec3::new(10.0 + spread, 0.0, 6.0);
                    IdentityRecord::new(id, home, Quat::IDENTITY, GeneralState::Wander.into())
                }
            }
        })
        .collect()
}
