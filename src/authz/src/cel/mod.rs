//! CEL (Common Expression Language) engine for business rules
//!
//! Rules are compiled once and cached; each evaluation binds `params` and
//! `data` as variables.

pub mod context;
pub mod convert;
pub mod engine;
pub mod error;

pub use context::EvalContext;
pub use engine::Engine;
pub use error::{CelError, Result};
