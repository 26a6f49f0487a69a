use core::fmt;
use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::context::EvaluationContext;
use crate::ast::{Expression, Literal, TemplatePart};
use crate::function::FunctionError;

// Value type system shared by expressions, functions and rendered responses.
#[derive(Clone, Debug, PartialEq, Default, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ValueKind {
    Null,
    Bool,
    Number,
    String,
    List,
    Object,
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Boolean(_) => ValueKind::Bool,
            Value::Integer(_) | Value::Float(_) => ValueKind::Number,
            Value::String(_) => ValueKind::String,
            Value::List(_) => ValueKind::List,
            Value::Map(_) => ValueKind::Object,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Renders a primitive as text. Collections and null have no text form.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Value::String(s) => Some(s.clone()),
            Value::Integer(i) => Some(i.to_string()),
            Value::Float(f) => Some(format_float(*f)),
            Value::Boolean(b) => Some(b.to_string()),
            Value::Null | Value::List(_) | Value::Map(_) => None,
        }
    }

    pub fn coerce_string(&self) -> Result<String, String> {
        self.to_text()
            .ok_or_else(|| format!("string required, got {}", self.kind()))
    }

    pub fn coerce_bool(&self) -> Result<bool, String> {
        match self {
            Value::Boolean(b) => Ok(*b),
            Value::String(s) if s == "true" => Ok(true),
            Value::String(s) if s == "false" => Ok(false),
            other => Err(format!("bool required, got {}", describe(other))),
        }
    }

    /// Returns an `Integer` or `Float`, parsing numeric strings.
    pub fn coerce_number(&self) -> Result<Value, String> {
        match self {
            Value::Integer(_) | Value::Float(_) => Ok(self.clone()),
            Value::String(s) => {
                let trimmed = s.trim();
                if let Ok(i) = trimmed.parse::<i64>() {
                    Ok(Value::Integer(i))
                } else if let Ok(f) = trimmed.parse::<f64>() {
                    Ok(Value::Float(f))
                } else {
                    Err(format!("number required, got string {:?}", s))
                }
            }
            other => Err(format!("number required, got {}", other.kind())),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Numeric ordering; integers compare exactly, mixed operands as floats.
    pub fn compare_numbers(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
            (a, b) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        }
    }

    /// Structural equality where `1` and `1.0` are the same number.
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Integer(_) | Value::Float(_), Value::Integer(_) | Value::Float(_)) => {
                self.compare_numbers(other) == Some(Ordering::Equal)
            }
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.equals(y))
            }
            (Value::Map(a), Value::Map(b)) => {
                a.len() == b.len()
                    && a
                        .iter()
                        .all(|(k, v)| b.get(k).map(|w| v.equals(w)).unwrap_or(false))
            }
            (a, b) => a == b,
        }
    }

    pub fn get_attr(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Map(map) => map.get(name),
            _ => None,
        }
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::String(s) => format!("string {:?}", s),
        other => other.kind().to_string(),
    }
}

fn format_float(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{:.0}", f)
    } else {
        f.to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{}", s),
            Value::Null => write!(f, "null"),
            Value::List(_) | Value::Map(_) => match serde_json::to_string(self) {
                Ok(json) => write!(f, "{}", json),
                Err(_) => write!(f, "{:?}", self),
            },
            other => match other.to_text() {
                Some(text) => write!(f, "{}", text),
                None => write!(f, "{:?}", other),
            },
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Map(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("unknown variable {0:?}")]
    UnknownVariable(String),
    #[error("call to unknown function {0:?}")]
    UnknownFunction(String),
    #[error("{function}(): {source}")]
    Function {
        function: String,
        #[source]
        source: FunctionError,
    },
    #[error("{kind} value has no attribute {name:?}")]
    NoAttribute { name: String, kind: ValueKind },
    #[error("index {index} out of range for list of length {len}")]
    IndexOutOfRange { index: i64, len: usize },
    #[error("cannot index {target} value with {key} key")]
    InvalidIndex { target: ValueKind, key: ValueKind },
    #[error("cannot interpolate {0} value into a template")]
    Template(ValueKind),
}

pub type EvalResult<T> = Result<T, EvalError>;

/// Walks an [`Expression`] against an [`EvaluationContext`].
#[derive(Debug, Default, Clone, Copy)]
pub struct ExpressionEvaluator;

impl ExpressionEvaluator {
    pub fn new() -> Self {
        Self
    }

    pub fn eval_expression(
        &self,
        expr: &Expression,
        context: &EvaluationContext,
    ) -> EvalResult<Value> {
        match expr {
            Expression::Literal(lit) => Ok(Self::eval_literal(lit)),
            Expression::Template(parts) => self.eval_template(parts, context),
            Expression::Variable(name) => context
                .variable(name)
                .cloned()
                .ok_or_else(|| EvalError::UnknownVariable(name.clone())),
            Expression::GetAttr { target, name } => {
                let target = self.eval_expression(target, context)?;
                match target {
                    Value::Map(mut map) => map.remove(name).ok_or(EvalError::NoAttribute {
                        name: name.clone(),
                        kind: ValueKind::Object,
                    }),
                    other => Err(EvalError::NoAttribute {
                        name: name.clone(),
                        kind: other.kind(),
                    }),
                }
            }
            Expression::Index { target, key } => {
                let target = self.eval_expression(target, context)?;
                let key = self.eval_expression(key, context)?;
                Self::eval_index(target, key)
            }
            Expression::FunctionCall {
                function,
                arguments,
            } => {
                let args = arguments
                    .iter()
                    .map(|arg| self.eval_expression(arg, context))
                    .collect::<EvalResult<Vec<_>>>()?;
                context.functions().call(function, &args, context)
            }
            Expression::List(items) => items
                .iter()
                .map(|item| self.eval_expression(item, context))
                .collect::<EvalResult<Vec<_>>>()
                .map(Value::List),
            Expression::Object(items) => {
                let mut map = BTreeMap::new();
                for (key, value) in items {
                    map.insert(key.clone(), self.eval_expression(value, context)?);
                }
                Ok(Value::Map(map))
            }
        }
    }

    fn eval_literal(lit: &Literal) -> Value {
        match lit {
            Literal::Integer(i) => Value::Integer(*i),
            Literal::Float(f) => Value::Float(*f),
            Literal::String(s) => Value::String(s.clone()),
            Literal::Boolean(b) => Value::Boolean(*b),
            Literal::Null => Value::Null,
        }
    }

    // A template made of a single interpolation yields the value unchanged.
    fn eval_template(
        &self,
        parts: &[TemplatePart],
        context: &EvaluationContext,
    ) -> EvalResult<Value> {
        if let [TemplatePart::Interpolation(expr)] = parts {
            return self.eval_expression(expr, context);
        }

        let mut out = String::new();
        for part in parts {
            match part {
                TemplatePart::Text(text) => out.push_str(text),
                TemplatePart::Interpolation(expr) => {
                    let value = self.eval_expression(expr, context)?;
                    let text = value
                        .to_text()
                        .ok_or_else(|| EvalError::Template(value.kind()))?;
                    out.push_str(&text);
                }
            }
        }
        Ok(Value::String(out))
    }

    fn eval_index(target: Value, key: Value) -> EvalResult<Value> {
        match (target, key) {
            (Value::List(mut items), key @ (Value::Integer(_) | Value::String(_))) => {
                let index = match key.coerce_number() {
                    Ok(Value::Integer(i)) => i,
                    _ => {
                        return Err(EvalError::InvalidIndex {
                            target: ValueKind::List,
                            key: key.kind(),
                        })
                    }
                };
                let len = items.len();
                usize::try_from(index)
                    .ok()
                    .filter(|i| *i < len)
                    .map(|i| items.swap_remove(i))
                    .ok_or(EvalError::IndexOutOfRange { index, len })
            }
            (Value::Map(mut map), key) => {
                let name = key.to_text().ok_or(EvalError::InvalidIndex {
                    target: ValueKind::Object,
                    key: key.kind(),
                })?;
                map.remove(&name).ok_or(EvalError::NoAttribute {
                    name,
                    kind: ValueKind::Object,
                })
            }
            (target, key) => Err(EvalError::InvalidIndex {
                target: target.kind(),
                key: key.kind(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::FunctionRegistry;
    use crate::parser::parse_expression_str;
    use pretty_assertions::assert_eq;

    fn eval(source: &str, context: &EvaluationContext) -> EvalResult<Value> {
        let expr = parse_expression_str(source).unwrap();
        ExpressionEvaluator::new().eval_expression(&expr, context)
    }

    fn context() -> EvaluationContext {
        let mut context = EvaluationContext::new(FunctionRegistry::standard(false));
        let mut result = BTreeMap::new();
        result.insert("exit_code".to_string(), Value::Integer(0));
        result.insert("CombinedOutput".to_string(), Value::from("done\n"));
        context.set_variable("result", Value::Map(result));
        context.set_variable(
            "items",
            Value::List(vec![Value::from("a"), Value::from("b")]),
        );
        context
    }

    #[test]
    fn test_traversal() {
        let context = context();
        assert_eq!(
            eval("result.exit_code", &context).unwrap(),
            Value::Integer(0)
        );
        assert_eq!(eval("items[1]", &context).unwrap(), Value::from("b"));
        assert_eq!(eval("items.0", &context).unwrap(), Value::from("a"));
        assert_eq!(
            eval(r#"result["CombinedOutput"]"#, &context).unwrap(),
            Value::from("done\n")
        );
    }

    #[test]
    fn test_traversal_errors() {
        let context = context();
        assert!(matches!(
            eval("result.missing", &context),
            Err(EvalError::NoAttribute { .. })
        ));
        assert!(matches!(
            eval("items[5]", &context),
            Err(EvalError::IndexOutOfRange { index: 5, len: 2 })
        ));
        assert!(matches!(
            eval("nothing", &context),
            Err(EvalError::UnknownVariable(_))
        ));
        assert!(matches!(
            eval("result.exit_code.x", &context),
            Err(EvalError::NoAttribute {
                kind: ValueKind::Number,
                ..
            })
        ));
    }

    #[test]
    fn test_template_rendering() {
        let context = context();
        assert_eq!(
            eval(r#""code=${result.exit_code}""#, &context).unwrap(),
            Value::from("code=0")
        );
        // single interpolation keeps the value's type
        assert_eq!(
            eval(r#""${result.exit_code}""#, &context).unwrap(),
            Value::Integer(0)
        );
        assert_eq!(
            eval(r#""all: ${items}""#, &context),
            Err(EvalError::Template(ValueKind::List))
        );
    }

    #[test]
    fn test_unknown_function() {
        let context = context();
        assert_eq!(
            eval("nope(1)", &context),
            Err(EvalError::UnknownFunction("nope".to_string()))
        );
    }

    #[test]
    fn test_coercions() {
        assert_eq!(Value::from("80").coerce_number(), Ok(Value::Integer(80)));
        assert_eq!(Value::from("1.5").coerce_number(), Ok(Value::Float(1.5)));
        assert!(Value::from("abc").coerce_number().is_err());
        assert_eq!(Value::from("true").coerce_bool(), Ok(true));
        assert!(Value::from("yes").coerce_bool().is_err());
        assert_eq!(Value::Integer(3).coerce_string(), Ok("3".to_string()));
        assert_eq!(Value::Float(2.0).coerce_string(), Ok("2".to_string()));
        assert!(Value::Null.coerce_string().is_err());
    }

    #[test]
    fn test_equals_mixes_number_kinds() {
        assert!(Value::Integer(1).equals(&Value::Float(1.0)));
        assert!(!Value::Integer(1).equals(&Value::from("1")));
        assert!(Value::List(vec![Value::Integer(2)]).equals(&Value::List(vec![Value::Float(2.0)])));
    }

    #[test]
    fn test_json_conversion() {
        let json = serde_json::json!({"a": [1, 2.5, "x", null, true]});
        let value = Value::from(json);
        let list = value.get_attr("a").unwrap();
        assert_eq!(
            list,
            &Value::List(vec![
                Value::Integer(1),
                Value::Float(2.5),
                Value::from("x"),
                Value::Null,
                Value::Boolean(true),
            ])
        );
    }
}
