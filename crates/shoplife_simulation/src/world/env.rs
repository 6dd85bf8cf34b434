use rand::RngCore;

use crate::error::ErrorLedger;

/// Мутабельное окружение одного world step (общее для обоих tiers)
///
/// RNG и ledger принадлежат хосту (`DeterministicRng`, `NpcWorld`), tiers их только заимствуют.
pub struct TickEnv<'a> {
    pub rng: &'a mut dyn RngCore,
    pub errors: &'a mut ErrorLedger,
    /// Время суток (часы, 0..24)
    pub time_of_day: f32,
}

impl<'a> TickEnv<'a> {
    pub fn new(rng: &'a mut dyn RngCore, errors: &'a mut ErrorLedger, time_of_day: f32) -> Self {
        Self {
            rng,
            errors,
            time_of_day,
        }
    }
}
