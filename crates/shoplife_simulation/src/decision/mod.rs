//! Decision Resolver — weighted choice с per-agent overrides
//!
//! Порядок lookup:
//! 1. override агента для decision point → возвращаем его детерминированно
//! 2. иначе сэмплим weighted outcome table через injected RNG
//!
//! Веса нормализуются явно (не обязаны суммироваться в 1); отрицательные/NaN
//! веса считаются нулевыми. Нет decision point или нет положительных весов →
//! `Fallback` с distinguishable ошибкой и no-op outcome.

pub mod resolver;


pub use resolver::*;
