//! CEL expression engine with compiled program caching

use cel_interpreter::objects::Value as CelValue;
use cel_interpreter::{Context, Program};
use dashmap::DashMap;
use std::sync::Arc;

use crate::cel::{
    context::EvalContext,
    convert::json_to_cel,
    error::{CelError, Result},
};

/// CEL engine for compiling and evaluating expressions
pub struct Engine {
    /// Compiled program cache (thread-safe)
    program_cache: Arc<DashMap<String, Arc<Program>>>,
}

impl Engine {
    /// Create a new CEL engine
    pub fn new() -> Self {
        Self {
            program_cache: Arc::new(DashMap::new()),
        }
    }

    /// Compile a CEL expression and cache the result
    ///
    /// # Errors
    /// Returns error if expression cannot be compiled
    pub fn compile(&self, expr: &str) -> Result<Arc<Program>> {
        if let Some(prog) = self.program_cache.get(expr) {
            return Ok(prog.clone());
        }

        let program = Program::compile(expr)
            .map_err(|e| CelError::CompilationError(format!("{:?}", e)))?;

        let arc_program = Arc::new(program);
        self.program_cache.insert(expr.to_string(), arc_program.clone());

        Ok(arc_program)
    }

    /// Evaluate a compiled program with the given context
    ///
    /// # Errors
    /// Returns error if evaluation fails or result is not boolean
    pub fn evaluate(&self, program: &Program, ctx: &EvalContext) -> Result<bool> {
        let mut cel_context = Context::default();

        for (key, value) in ctx.to_variables() {
            cel_context.add_variable_from_value(key, json_to_cel(&value));
        }

        let result = program
            .execute(&cel_context)
            .map_err(|e| CelError::EvaluationError(format!("{:?}", e)))?;

        Self::to_bool(&result)
    }

    /// Compile and evaluate an expression in one call
    pub fn evaluate_expression(&self, expr: &str, ctx: &EvalContext) -> Result<bool> {
        let program = self.compile(expr)?;
        self.evaluate(&program, ctx)
    }

    /// Clear the compiled program cache
    pub fn clear_cache(&self) {
        self.program_cache.clear();
    }

    /// Number of cached programs
    pub fn cached_programs(&self) -> usize {
        self.program_cache.len()
    }

    fn to_bool(value: &CelValue) -> Result<bool> {
        match value {
            CelValue::Bool(b) => Ok(*b),
            _ => Err(CelError::NonBooleanResult),
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}
