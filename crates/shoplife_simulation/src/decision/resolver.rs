use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::error::{ContinuityError, Fallback};
use crate::navigation::PathStart;
use crate::state::StateIdentity;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DecisionPointId(pub String);

impl From<&str> for DecisionPointId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for DecisionPointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Конкретный исход решения
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum DecisionOutcome {
    /// Перейти в Active состояние
    State(StateIdentity),
    /// Следовать по path
    Path(PathStart),
    /// Ничего не выбрано (fallback)
    NoOp,
}

/// Per-agent overrides: decision point → фиксированный исход (ключи уникальны)
pub type DecisionOverrides = BTreeMap<DecisionPointId, DecisionOutcome>;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WeightedOutcome {
    pub outcome: DecisionOutcome,
    pub weight: f32,
}

impl WeightedOutcome {
    pub fn new(outcome: DecisionOutcome, weight: f32) -> Self {
        Self { outcome, weight }
    }

    /// Вес, участвующий в сэмплинге (NaN/inf/отрицательные → 0)
    pub fn effective_weight(&self) -> f64 {
        if self.weight.is_finite() && self.weight > 0.0 {
            self.weight as f64
        } else {
            0.0
        }
    }
}

/// Named weighted-choice table
#[derive(Clone, Debug, PartialEq)]
pub struct DecisionPoint {
    id: DecisionPointId,
    outcomes: Vec<WeightedOutcome>,
}

impl DecisionPoint {
    pub fn new(id: impl Into<DecisionPointId>, outcomes: Vec<WeightedOutcome>) -> Self {
        Self {
            id: id.into(),
            outcomes,
        }
    }

    pub fn id(&self) -> &DecisionPointId {
        &self.id
    }

    pub fn outcomes(&self) -> &[WeightedOutcome] {
        &self.outcomes
    }

    pub fn total_weight(&self) -> f64 {
        self.outcomes.iter().map(WeightedOutcome::effective_weight).sum()
    }

    /// Нормализованные вероятности (сумма = 1 если есть положительные веса)
    pub fn probabilities(&self) -> Vec<(&DecisionOutcome, f64)> {
        let total = self.total_weight();
        self.outcomes
            .iter()
            .map(|o| {
                let p = if total > 0.0 { o.effective_weight() / total } else { 0.0 };
                (&o.outcome, p)
            })
            .collect()
    }

    /// Сэмпл по нормализованным весам (None если таблица пустая/нулевая)
    pub fn sample(&self, rng: &mut dyn RngCore) -> Option<&DecisionOutcome> {
        let total = self.total_weight();
        if total <= 0.0 {
            return None;
        }

        let roll = rng.gen::<f64>() * total;
        let mut cumulative = 0.0;
        let mut last_valid = None;

        for entry in &self.outcomes {
            let weight = entry.effective_weight();
            if weight <= 0.0 {
                continue;
            }
            cumulative += weight;
            last_valid = Some(&entry.outcome);
            if roll < cumulative {
                return Some(&entry.outcome);
            }
        }

        // roll == total из-за округления → последний валидный
        last_valid
    }
}

#[derive(Clone, Debug)]
pub struct DecisionResolver {
    points: HashMap<DecisionPointId, DecisionPoint>,
    fallback: DecisionOutcome,
}

impl Default for DecisionResolver {
    fn default() -> Self {
        Self {
            points: HashMap::new(),
            fallback: DecisionOutcome::NoOp,
        }
    }
}

impl DecisionResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, point: DecisionPoint) {
        self.points.insert(point.id().clone(), point);
    }

    pub fn with(mut self, point: DecisionPoint) -> Self {
        self.insert(point);
        self
    }

    /// Outcome, отдаваемый при ошибке резолва (по умолчанию `NoOp`)
    pub fn with_fallback(mut self, fallback: DecisionOutcome) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn get(&self, id: &DecisionPointId) -> Option<&DecisionPoint> {
        self.points.get(id)
    }

    pub fn points(&self) -> impl Iterator<Item = &DecisionPoint> {
        self.points.values()
    }

    pub fn resolve(
        &self,
        id: &DecisionPointId,
        overrides: &DecisionOverrides,
        rng: &mut dyn RngCore,
    ) -> Result<DecisionOutcome, Fallback<DecisionOutcome>> {
        // Per-agent customization всегда побеждает
        if let Some(outcome) = overrides.get(id) {
            return Ok(outcome.clone());
        }

        let Some(point) = self.points.get(id) else {
            return Err(Fallback::new(
                ContinuityError::MissingDecisionPoint(id.0.clone()),
                self.fallback.clone(),
            ));
        };

        point.sample(rng).cloned().ok_or_else(|| {
            Fallback::new(
                ContinuityError::EmptyDecisionTable(id.0.clone()),
                self.fallback.clone(),
            )
        })
    }
}
