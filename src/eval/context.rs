use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::expression::{EvalResult, ExpressionEvaluator, Value};
use crate::ast::Expression;
use crate::function::FunctionRegistry;

/// Source of "now" for time-dependent functions such as `since`.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Always reports the same instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Request-derived maps read by the lookup functions.
///
/// Keys are stored lower-cased and looked up case-insensitively.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Lookups {
    headers: HashMap<String, String>,
    payload: HashMap<String, String>,
    params: HashMap<String, String>,
}

impl Lookups {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_header(&mut self, key: &str, value: impl Into<String>) {
        self.headers.insert(key.to_lowercase(), value.into());
    }

    pub fn insert_payload(&mut self, key: &str, value: impl Into<String>) {
        self.payload.insert(key.to_lowercase(), value.into());
    }

    pub fn insert_param(&mut self, key: &str, value: impl Into<String>) {
        self.params.insert(key.to_lowercase(), value.into());
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(&key.to_lowercase()).map(String::as_str)
    }

    pub fn payload(&self, key: &str) -> Option<&str> {
        self.payload.get(&key.to_lowercase()).map(String::as_str)
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(&key.to_lowercase()).map(String::as_str)
    }
}

/// Variables, lookups and functions available to expressions of one request.
///
/// A context is created per request and only ever grows: variables are added
/// or replaced between stages, never removed.
#[derive(Debug, Clone)]
pub struct EvaluationContext {
    id: Uuid,
    variables: HashMap<String, Value>,
    lookups: Lookups,
    functions: Arc<FunctionRegistry>,
    clock: Arc<dyn Clock>,
}

impl EvaluationContext {
    pub fn new(functions: Arc<FunctionRegistry>) -> Self {
        Self {
            id: Uuid::new_v4(),
            variables: HashMap::new(),
            lookups: Lookups::default(),
            functions,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_lookups(mut self, lookups: Lookups) -> Self {
        self.lookups = lookups;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn set_variable(&mut self, name: impl Into<String>, value: Value) {
        self.variables.insert(name.into(), value);
    }

    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    pub fn has_variable(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    pub fn lookups(&self) -> &Lookups {
        &self.lookups
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn evaluate(&self, expr: &Expression) -> EvalResult<Value> {
        ExpressionEvaluator::new().eval_expression(expr, self)
    }
}
