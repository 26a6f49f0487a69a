use super::registry::FunctionRegistryBuilder;
use super::types::{str_arg, FunctionResult, ParamType, Signature};
use crate::eval::{EvaluationContext, Value, ValueKind};

pub(crate) fn register(builder: &mut FunctionRegistryBuilder) {
    let lookup = |name| {
        Signature::new(name)
            .param("key", ParamType::String)
            .returns(ValueKind::String)
    };
    builder.native(lookup("header"), header);
    builder.native(lookup("payload"), payload);
    builder.native(lookup("param"), param);
    builder.native(lookup("url"), param);
}

// Missing keys yield "" so rules never need to null-check.

fn header(args: &[Value], context: &EvaluationContext) -> FunctionResult {
    let key = str_arg(args, 0)?;
    Ok(Value::from(context.lookups().header(key).unwrap_or_default()))
}

fn payload(args: &[Value], context: &EvaluationContext) -> FunctionResult {
    let key = str_arg(args, 0)?;
    Ok(Value::from(context.lookups().payload(key).unwrap_or_default()))
}

fn param(args: &[Value], context: &EvaluationContext) -> FunctionResult {
    let key = str_arg(args, 0)?;
    Ok(Value::from(context.lookups().param(key).unwrap_or_default()))
}
