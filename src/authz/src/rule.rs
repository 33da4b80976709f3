//! Business-rule evaluation capability
//!
//! A business rule is a side-effect free predicate over the call-time
//! parameters and the payload of the item or assignment that carries it.
//! An absent (or blank) rule always passes.

use crate::cel::{EvalContext, Engine as CelEngine};
use crate::error::{AuthzError, Result};
use crate::types::Params;
use serde_json::Value;
use tracing::{debug, warn};

/// Evaluates business-rule expressions
pub trait RuleEvaluator: Send + Sync {
    /// Decide whether `rule` holds for `params` and `data`
    ///
    /// Implementations must return `true` for `None`.
    fn evaluate(&self, rule: Option<&str>, params: &Params, data: Option<&Value>) -> bool;
}

impl<F> RuleEvaluator for F
where
    F: Fn(Option<&str>, &Params, Option<&Value>) -> bool + Send + Sync,
{
    fn evaluate(&self, rule: Option<&str>, params: &Params, data: Option<&Value>) -> bool {
        match rule {
            Some(expr) if !expr.trim().is_empty() => self(Some(expr), params, data),
            _ => true,
        }
    }
}

/// Rule evaluator backed by the CEL engine
///
/// Compile errors, evaluation errors, and non-boolean results are logged and
/// count as a failed rule.
pub struct CelRuleEvaluator {
    engine: CelEngine,
}

impl CelRuleEvaluator {
    pub fn new() -> Self {
        Self {
            engine: CelEngine::new(),
        }
    }

    pub fn engine(&self) -> &CelEngine {
        &self.engine
    }
}

impl Default for CelRuleEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl CelRuleEvaluator {
    /// Evaluate a rule, surfacing compile and evaluation failures
    pub fn try_evaluate(&self, rule: &str, params: &Params, data: Option<&Value>) -> Result<bool> {
        let ctx = EvalContext::new()
            .with_params(params.clone())
            .with_data(data.cloned());

        self.engine
            .evaluate_expression(rule, &ctx)
            .map_err(|e| AuthzError::EvaluationError(format!("'{}': {}", rule, e)))
    }
}

impl RuleEvaluator for CelRuleEvaluator {
    fn evaluate(&self, rule: Option<&str>, params: &Params, data: Option<&Value>) -> bool {
        let Some(expr) = rule.filter(|r| !r.trim().is_empty()) else {
            return true;
        };

        match self.try_evaluate(expr, params, data) {
            Ok(result) => {
                debug!("Business rule '{}' evaluated to {}", expr, result);
                result
            }
            Err(e) => {
                warn!("{}", e);
                false
            }
        }
    }
}
