//! End-of-path resolution → `PathTransitionResult`
//!
//! Общая логика для Active и Basic tiers: end policy path'а → (через Decision
//! Resolver) → конкретное Active состояние + опциональное продолжение path.
//! Basic tier потом сам маппит `target_state` через registry.

use rand::RngCore;
use std::sync::Arc;

use crate::decision::{DecisionOutcome, DecisionOverrides, DecisionResolver};
use crate::error::{ContinuityError, ContinuityResult, Fallback};
use crate::navigation::{PathAsset, PathEndPolicy, PathLibrary, PathStart};
use crate::state::{StateIdentity, StateMappingRegistry};

/// Path, на который нужно встать после перехода
#[derive(Debug, Clone, PartialEq)]
pub struct PathContinuation {
    pub path: Arc<PathAsset>,
    pub start_index: usize,
    pub reverse: bool,
}

impl PathContinuation {
    pub fn to_start(&self) -> PathStart {
        PathStart::new(self.path.id().clone(), self.start_index, self.reverse)
    }
}

/// Результат достижения конца path
///
/// `path_continuation == None` ⇔ `target_state` не path-following.
#[derive(Debug, Clone, PartialEq)]
pub struct PathTransitionResult {
    pub target_state: StateIdentity,
    pub path_continuation: Option<PathContinuation>,
}

impl PathTransitionResult {
    pub fn state(target_state: StateIdentity) -> Self {
        Self {
            target_state,
            path_continuation: None,
        }
    }
}

/// Зависимости резолва (injected, без глобальных singleton'ов)
pub struct PathEndResolver<'a> {
    pub paths: &'a PathLibrary,
    pub decisions: &'a DecisionResolver,
    pub mapping: &'a StateMappingRegistry,
}

impl<'a> PathEndResolver<'a> {
    /// Резолв end policy. Ошибка → `Fallback` с default Active state.
    pub fn resolve(
        &self,
        path: &PathAsset,
        overrides: &DecisionOverrides,
        rng: &mut dyn RngCore,
    ) -> Result<PathTransitionResult, Fallback<PathTransitionResult>> {
        let outcome = match path.end_policy() {
            PathEndPolicy::Transition(state) => DecisionOutcome::State(*state),
            PathEndPolicy::Continue(start) => DecisionOutcome::Path(start.clone()),
            PathEndPolicy::Decision(point) => match self.decisions.resolve(point, overrides, rng) {
                Ok(outcome) => outcome,
                Err(failure) => {
                    // Fallback outcome может сам по себе быть валидным (authored fallback)
                    let result = self
                        .outcome_to_result(&failure.fallback)
                        .unwrap_or_else(|_| self.default_result());
                    return Err(Fallback::new(failure.error, result));
                }
            },
        };

        self.outcome_to_result(&outcome)
            .map_err(|error| Fallback::new(error, self.default_result()))
    }

    /// Outcome → result (валидирует path и индекс продолжения)
    pub fn outcome_to_result(&self, outcome: &DecisionOutcome) -> ContinuityResult<PathTransitionResult> {
        match outcome {
            DecisionOutcome::State(state) => {
                if state.is_active_path_following() {
                    return Err(ContinuityError::InvalidPath {
                        path: state.to_string(),
                        reason: "path-following state without a path".into(),
                    });
                }
                if state.is_basic() {
                    // Authoring в Active терминах: Basic state переводим обратно
                    return self
                        .mapping
                        .active_for(*state)
                        .map(PathTransitionResult::state)
                        .ok_or(ContinuityError::MissingMapping(*state));
                }
                Ok(PathTransitionResult::state(*state))
            }
            DecisionOutcome::Path(start) => {
                let path = self.paths.get(&start.path_id)?;
                path.check_index(start.start_index)?;
                Ok(PathTransitionResult {
                    target_state: self.mapping.primary_path_active(),
                    path_continuation: Some(PathContinuation {
                        path: Arc::clone(path),
                        start_index: start.start_index,
                        reverse: start.reverse,
                    }),
                })
            }
            DecisionOutcome::NoOp => Ok(self.default_result()),
        }
    }

    fn default_result(&self) -> PathTransitionResult {
        PathTransitionResult::state(self.mapping.default_active())
    }
}
