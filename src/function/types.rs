use std::fmt;

use thiserror::Error;

use crate::eval::{EvaluationContext, Value, ValueKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ParamType {
    String,
    Number,
    Bool,
    Any,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: &'static str,
    pub ty: ParamType,
    /// Rendered as `<redacted>` in debug traces.
    pub sensitive: bool,
}

impl Param {
    pub fn new(name: &'static str, ty: ParamType) -> Self {
        Self {
            name,
            ty,
            sensitive: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variadic {
    pub param: Param,
    pub min: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReturnType {
    Static(ValueKind),
    /// Decided per call from the pattern argument (see `find`).
    PatternDependent,
}

/// Declared parameters and result of a function.
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    pub name: &'static str,
    pub params: Vec<Param>,
    pub variadic: Option<Variadic>,
    pub returns: ReturnType,
}

impl Signature {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            params: Vec::new(),
            variadic: None,
            returns: ReturnType::Static(ValueKind::String),
        }
    }

    pub fn param(mut self, name: &'static str, ty: ParamType) -> Self {
        self.params.push(Param::new(name, ty));
        self
    }

    pub fn sensitive_param(mut self, name: &'static str, ty: ParamType) -> Self {
        self.params.push(Param {
            sensitive: true,
            ..Param::new(name, ty)
        });
        self
    }

    pub fn variadic(mut self, name: &'static str, ty: ParamType, min: usize) -> Self {
        self.variadic = Some(Variadic {
            param: Param::new(name, ty),
            min,
        });
        self
    }

    pub fn returns(mut self, kind: ValueKind) -> Self {
        self.returns = ReturnType::Static(kind);
        self
    }

    pub fn returns_pattern_dependent(mut self) -> Self {
        self.returns = ReturnType::PatternDependent;
        self
    }

    pub fn min_arity(&self) -> usize {
        self.params.len() + self.variadic.as_ref().map(|v| v.min).unwrap_or(0)
    }

    pub fn check_arity(&self, got: usize) -> Result<(), FunctionError> {
        let min = self.min_arity();
        match &self.variadic {
            None if got != min => Err(FunctionError::Arity {
                expected: min.to_string(),
                got,
            }),
            Some(_) if got < min => Err(FunctionError::Arity {
                expected: format!("at least {}", min),
                got,
            }),
            _ => Ok(()),
        }
    }

    pub fn param_at(&self, index: usize) -> Option<&Param> {
        self.params
            .get(index)
            .or_else(|| self.variadic.as_ref().map(|v| &v.param))
    }

    /// Checks arity and converts each argument to its declared parameter type.
    pub fn convert_args(&self, args: &[Value]) -> Result<Vec<Value>, FunctionError> {
        self.check_arity(args.len())?;
        args.iter()
            .enumerate()
            .map(|(index, arg)| {
                let ty = self.param_at(index).map(|p| p.ty).unwrap_or(ParamType::Any);
                convert(arg, ty).map_err(|reason| FunctionError::Argument { index, reason })
            })
            .collect()
    }
}

fn convert(value: &Value, ty: ParamType) -> Result<Value, String> {
    if value.is_null() && ty != ParamType::Any {
        return Err("argument must not be null".to_string());
    }
    match ty {
        ParamType::String => value.coerce_string().map(Value::String),
        ParamType::Number => value.coerce_number(),
        ParamType::Bool => value.coerce_bool().map(Value::Boolean),
        ParamType::Any => Ok(value.clone()),
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FunctionError {
    #[error("invalid argument {index}: {reason}")]
    Argument { index: usize, reason: String },
    #[error("expected {expected} argument(s), got {got}")]
    Arity { expected: String, got: usize },
    #[error("{0}")]
    Failed(String),
}

impl FunctionError {
    pub fn argument(index: usize, reason: impl Into<String>) -> Self {
        FunctionError::Argument {
            index,
            reason: reason.into(),
        }
    }

    pub fn failed(message: impl fmt::Display) -> Self {
        FunctionError::Failed(message.to_string())
    }
}

pub type FunctionResult = Result<Value, FunctionError>;

/// A function callable from hook expressions.
///
/// Implementations receive arguments already converted to the types in
/// [`Function::signature`].
pub trait Function: Send + Sync {
    fn signature(&self) -> &Signature;

    fn call(&self, args: &[Value], context: &EvaluationContext) -> FunctionResult;
}

pub type FunctionImpl = fn(&[Value], &EvaluationContext) -> FunctionResult;

/// A [`Function`] backed by a plain fn pointer.
pub struct NativeFunction {
    signature: Signature,
    implementation: FunctionImpl,
}

impl NativeFunction {
    pub fn new(signature: Signature, implementation: FunctionImpl) -> Self {
        Self {
            signature,
            implementation,
        }
    }
}

impl Function for NativeFunction {
    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn call(&self, args: &[Value], context: &EvaluationContext) -> FunctionResult {
        (self.implementation)(args, context)
    }
}

// Argument accessors for converted arguments.

pub(crate) fn str_arg(args: &[Value], index: usize) -> Result<&str, FunctionError> {
    args.get(index)
        .and_then(Value::as_str)
        .ok_or_else(|| FunctionError::argument(index, "string required"))
}

pub(crate) fn bool_arg(args: &[Value], index: usize) -> Result<bool, FunctionError> {
    args.get(index)
        .and_then(Value::as_bool)
        .ok_or_else(|| FunctionError::argument(index, "bool required"))
}

pub(crate) fn number_arg(args: &[Value], index: usize) -> Result<&Value, FunctionError> {
    args.get(index)
        .filter(|v| v.as_f64().is_some())
        .ok_or_else(|| FunctionError::argument(index, "number required"))
}
