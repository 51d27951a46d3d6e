//! Per-column parsing strategy and the counters steering template deduction.

use crate::template::TemplateInstance;

/// How a column is currently being parsed. Every column starts on the fast
/// literal path and only escalates when a row forces it to.
#[derive(Debug)]
pub enum Strategy {
    /// Direct literal deserialization, no tokenizing.
    Streaming,
    /// Full parse and evaluation of each cell.
    SingleExpression,
    /// A deduced template accumulating parameter rows for batch replay.
    Templated(TemplateInstance),
}

/// Copyable discriminant used for dispatch while the strategy itself stays
/// borrowed in the session table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    Streaming,
    SingleExpression,
    Templated,
}

impl Strategy {
    pub fn kind(&self) -> StrategyKind {
        match self {
            Strategy::Streaming => StrategyKind::Streaming,
            Strategy::SingleExpression => StrategyKind::SingleExpression,
            Strategy::Templated(_) => StrategyKind::Templated,
        }
    }
}

const ATTEMPT_LIMIT: f64 = 100.0;
const COLD_WEIGHT: f64 = 1.5;
const CACHED_WEIGHT: f64 = 0.5;

/// Per-column deduction accounting. Deduction stays cheap to try while the
/// weighted attempt mass is small; past the limit it continues only when
/// replays outnumber attempts, and then the window restarts.
#[derive(Debug, Default, Clone)]
pub struct DeduceCounters {
    /// Deductions that compiled a fresh template.
    pub cold: u64,
    /// Deductions satisfied from the cache.
    pub cached: u64,
    /// Rows parsed by replaying an active template.
    pub replayed: u64,
}

impl DeduceCounters {
    pub fn should_attempt(&mut self) -> bool {
        let weighted = COLD_WEIGHT * self.cold as f64 + CACHED_WEIGHT * self.cached as f64;
        if weighted < ATTEMPT_LIMIT {
            return true;
        }
        if self.replayed as f64 / weighted > 1.0 {
            // Replays paid for the window; open a fresh one.
            self.cold = 0;
            self.cached = 0;
            self.replayed = 0;
            return true;
        }
        false
    }

    pub fn reset(&mut self) {
        *self = DeduceCounters::default();
    }
}
