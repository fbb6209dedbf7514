//! Retry budgets

use std::fmt;

use serde::Serialize;

use crate::config::RetryConfig;

/// Failure class charged for a non-terminating iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetKind {
    Syntax,
    Compilation,
    Assertion,
}

impl fmt::Display for BudgetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Syntax => "syntax",
            Self::Compilation => "compilation",
            Self::Assertion => "assertion",
        };
        write!(f, "{}", name)
    }
}

/// Three independent counters, each bounded by its own limit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryBudget {
    limits: RetryConfig,
    syntax: u32,
    compilation: u32,
    assertion: u32,
}

impl RetryBudget {
    pub fn new(limits: RetryConfig) -> Self {
        Self {
            limits,
            syntax: 0,
            compilation: 0,
            assertion: 0,
        }
    }

    pub fn used(&self, kind: BudgetKind) -> u32 {
        match kind {
            BudgetKind::Syntax => self.syntax,
            BudgetKind::Compilation => self.compilation,
            BudgetKind::Assertion => self.assertion,
        }
    }

    pub fn limit(&self, kind: BudgetKind) -> u32 {
        match kind {
            BudgetKind::Syntax => self.limits.max_syntax_fixes,
            BudgetKind::Compilation => self.limits.max_compilation_fixes,
            BudgetKind::Assertion => self.limits.max_assertion_fixes,
        }
    }

    /// Charge one retry; returns the new count
    pub fn charge(&mut self, kind: BudgetKind) -> u32 {
        let counter = match kind {
            BudgetKind::Syntax => &mut self.syntax,
            BudgetKind::Compilation => &mut self.compilation,
            BudgetKind::Assertion => &mut self.assertion,
        };
        *counter += 1;
        *counter
    }

    /// The first budget that reached its limit, if any
    pub fn exhausted(&self) -> Option<BudgetKind> {
        [BudgetKind::Syntax, BudgetKind::Compilation, BudgetKind::Assertion]
            .into_iter()
            .find(|&kind| self.used(kind) >= self.limit(kind))
    }
}
