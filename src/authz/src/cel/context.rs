//! Evaluation context for business-rule expressions

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Variables visible to a business rule
///
/// Rules see two names: `params` (the call-time parameter bag) and `data`
/// (the payload of the item or assignment that owns the rule, `null` if
/// absent).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvalContext {
    /// Call-time parameters
    pub params: HashMap<String, Value>,

    /// Item or assignment payload
    pub data: Value,
}

impl EvalContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_params(mut self, params: HashMap<String, Value>) -> Self {
        self.params = params;
        self
    }

    pub fn with_data(mut self, data: Option<Value>) -> Self {
        self.data = data.unwrap_or(Value::Null);
        self
    }

    /// Get all variables as a flat map for CEL evaluation
    pub fn to_variables(&self) -> HashMap<String, Value> {
        let mut vars = HashMap::new();

        vars.insert(
            "params".to_string(),
            Value::Object(self.params.clone().into_iter().collect()),
        );
        vars.insert("data".to_string(), self.data.clone());

        vars
    }
}
