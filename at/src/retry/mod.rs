//! Bounded retry loop around generation and validation
//!
//! Every non-terminating iteration charges exactly one of three budgets
//! (syntax, compilation, assertion); the loop stops when one is spent.

mod budget;
mod orchestrator;

pub use budget::{BudgetKind, RetryBudget};
pub use orchestrator::{LoopOutcome, RetryError, RetryOrchestrator, RunReport};
