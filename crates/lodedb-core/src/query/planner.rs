//! Rule-based stream optimizer.
//!
//! The optimizer rewrites a stream into an equivalent one that is cheaper
//! to run. Rules run in order, and the whole rule list is applied again
//! until a pass changes nothing or the pass budget runs out. A rule may
//! also find that the stream cannot produce anything, in which case there
//! is no plan to execute.

use tracing::{debug, instrument};

use super::rules::{
    PrecalculateExprs, RemoveUnnecessaryFilters, RemoveUnnecessaryProjections,
    SplitAndConditions, UseIndexBasedOnFilter,
};
use super::stream::Stream;
use crate::error::Error;
use crate::storage::Transaction;

/// Default number of passes over the rule list.
pub const DEFAULT_MAX_PASSES: usize = 10;

/// A rewrite of a stream.
///
/// Rules must preserve the rows the stream produces. Returning `Ok(None)`
/// states that the stream produces no rows and performs no writes.
pub trait Rule: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Rewrite the stream.
    fn apply(&self, stream: Stream, tx: &Transaction<'_>) -> Result<Option<Stream>, Error>;
}

/// Runs a list of rules over a stream.
pub struct Optimizer {
    rules: Vec<Box<dyn Rule>>,
    max_passes: usize,
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::new(vec![
            Box::new(SplitAndConditions),
            Box::new(PrecalculateExprs),
            Box::new(RemoveUnnecessaryFilters),
            Box::new(RemoveUnnecessaryProjections),
            Box::new(UseIndexBasedOnFilter),
        ])
    }
}

impl Optimizer {
    /// Create an optimizer running `rules` in order.
    pub fn new(rules: Vec<Box<dyn Rule>>) -> Self {
        Self {
            rules,
            max_passes: DEFAULT_MAX_PASSES,
        }
    }

    /// Set the maximum number of passes over the rule list.
    pub fn with_max_passes(mut self, max_passes: usize) -> Self {
        self.max_passes = max_passes;
        self
    }

    /// Names of the rules, in the order they run.
    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|rule| rule.name()).collect()
    }

    /// Optimize a stream.
    ///
    /// Returns `None` when there is nothing to execute. The first rule error
    /// aborts the optimization.
    #[instrument(skip_all, fields(plan = %stream))]
    pub fn optimize(&self, stream: Stream, tx: &Transaction<'_>) -> Result<Option<Stream>, Error> {
        if stream.is_empty() {
            debug!("Empty stream, nothing to execute");
            return Ok(None);
        }

        let mut current = stream;
        for pass in 0..self.max_passes {
            let mut changed = false;
            for rule in &self.rules {
                let previous = current.clone();
                current = match rule.apply(current, tx)? {
                    Some(stream) => stream,
                    None => {
                        debug!(rule = rule.name(), pass, "Plan has nothing to execute");
                        return Ok(None);
                    }
                };
                if current != previous {
                    changed = true;
                    debug!(rule = rule.name(), pass, plan = %current, "Rule rewrote plan");
                }
            }
            if !changed {
                break;
            }
        }
        Ok(Some(current))
    }
}

/// Optimize a stream with the standard rules.
pub fn optimize(stream: Stream, tx: &Transaction<'_>) -> Result<Option<Stream>, Error> {
    Optimizer::default().optimize(stream, tx)
}
