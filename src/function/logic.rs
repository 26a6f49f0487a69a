use std::cmp::Ordering;

use super::crypto::constant_time_eq;
use super::registry::FunctionRegistryBuilder;
use super::types::{bool_arg, number_arg, FunctionError, FunctionResult, ParamType, Signature};
use crate::eval::{EvaluationContext, Value, ValueKind};

pub(crate) fn register(builder: &mut FunctionRegistryBuilder) {
    let binary = |name, ty| {
        Signature::new(name)
            .param("a", ty)
            .param("b", ty)
            .returns(ValueKind::Bool)
    };
    builder.native(binary("and", ParamType::Bool), and);
    builder.native(binary("or", ParamType::Bool), or);
    builder.native(
        Signature::new("not")
            .param("val", ParamType::Bool)
            .returns(ValueKind::Bool),
        not,
    );
    builder.native(
        Signature::new("all")
            .variadic("conditions", ParamType::Bool, 1)
            .returns(ValueKind::Bool),
        all,
    );
    builder.native(
        Signature::new("any")
            .variadic("conditions", ParamType::Bool, 1)
            .returns(ValueKind::Bool),
        any,
    );

    builder.native(binary("eq", ParamType::Any), eq);
    builder.native(binary("ne", ParamType::Any), ne);
    builder.native(binary("ge", ParamType::Number), ge);
    builder.native(binary("gt", ParamType::Number), gt);
    builder.native(binary("le", ParamType::Number), le);
    builder.native(binary("lt", ParamType::Number), lt);
}

fn and(args: &[Value], _: &EvaluationContext) -> FunctionResult {
    Ok(Value::Boolean(bool_arg(args, 0)? && bool_arg(args, 1)?))
}

fn or(args: &[Value], _: &EvaluationContext) -> FunctionResult {
    Ok(Value::Boolean(bool_arg(args, 0)? || bool_arg(args, 1)?))
}

fn not(args: &[Value], _: &EvaluationContext) -> FunctionResult {
    Ok(Value::Boolean(!bool_arg(args, 0)?))
}

fn all(args: &[Value], _: &EvaluationContext) -> FunctionResult {
    let mut result = true;
    for index in 0..args.len() {
        result &= bool_arg(args, index)?;
    }
    Ok(Value::Boolean(result))
}

fn any(args: &[Value], _: &EvaluationContext) -> FunctionResult {
    let mut result = false;
    for index in 0..args.len() {
        result |= bool_arg(args, index)?;
    }
    Ok(Value::Boolean(result))
}

/// String operands are compared in constant time; anything else structurally.
pub(crate) fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::String(a), Value::String(b)) => constant_time_eq(a.as_bytes(), b.as_bytes()),
        (a, b) => a.equals(b),
    }
}

fn operands(args: &[Value]) -> Result<(&Value, &Value), FunctionError> {
    match args {
        [a, b] => Ok((a, b)),
        _ => Err(FunctionError::Arity {
            expected: "2".to_string(),
            got: args.len(),
        }),
    }
}

fn eq(args: &[Value], _: &EvaluationContext) -> FunctionResult {
    let (a, b) = operands(args)?;
    Ok(Value::Boolean(values_equal(a, b)))
}

fn ne(args: &[Value], _: &EvaluationContext) -> FunctionResult {
    let (a, b) = operands(args)?;
    Ok(Value::Boolean(!values_equal(a, b)))
}

fn compare(args: &[Value], accept: fn(Ordering) -> bool) -> FunctionResult {
    let a = number_arg(args, 0)?;
    let b = number_arg(args, 1)?;
    let ordering = a
        .compare_numbers(b)
        .ok_or_else(|| FunctionError::failed("numbers cannot be compared"))?;
    Ok(Value::Boolean(accept(ordering)))
}

fn ge(args: &[Value], _: &EvaluationContext) -> FunctionResult {
    compare(args, Ordering::is_ge)
}

fn gt(args: &[Value], _: &EvaluationContext) -> FunctionResult {
    compare(args, Ordering::is_gt)
}

fn le(args: &[Value], _: &EvaluationContext) -> FunctionResult {
    compare(args, Ordering::is_le)
}

fn lt(args: &[Value], _: &EvaluationContext) -> FunctionResult {
    compare(args, Ordering::is_lt)
}
