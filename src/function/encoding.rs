use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::debug;

use super::registry::FunctionRegistryBuilder;
use super::types::{str_arg, FunctionError, FunctionResult, ParamType, Signature};
use crate::eval::{EvaluationContext, Value, ValueKind};

pub(crate) fn register(builder: &mut FunctionRegistryBuilder) {
    builder.native(
        Signature::new("base64encode").param("str", ParamType::String),
        base64encode,
    );
    builder.native(
        Signature::new("base64decode").param("str", ParamType::String),
        base64decode,
    );
    builder.native(
        Signature::new("getenv").param("name", ParamType::String),
        getenv,
    );
    builder.native(
        Signature::new("readfile").param("path", ParamType::String),
        readfile,
    );
    builder.native(
        Signature::new("debug")
            .param("value", ParamType::Any)
            .returns(ValueKind::Bool),
        debug,
    );
}

/// Decodes standard base64 into a UTF-8 string.
pub fn decode_base64_text(encoded: &str) -> Result<String, String> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| format!("failed to decode base64 data: {}", e))?;
    String::from_utf8(bytes).map_err(|_| "decoded base64 data is not valid UTF-8".to_string())
}

fn base64encode(args: &[Value], _: &EvaluationContext) -> FunctionResult {
    Ok(Value::String(STANDARD.encode(str_arg(args, 0)?)))
}

fn base64decode(args: &[Value], _: &EvaluationContext) -> FunctionResult {
    decode_base64_text(str_arg(args, 0)?)
        .map(Value::String)
        .map_err(|reason| FunctionError::argument(0, reason))
}

fn getenv(args: &[Value], _: &EvaluationContext) -> FunctionResult {
    Ok(Value::String(
        std::env::var(str_arg(args, 0)?).unwrap_or_default(),
    ))
}

fn readfile(args: &[Value], _: &EvaluationContext) -> FunctionResult {
    let path = str_arg(args, 0)?;
    std::fs::read_to_string(path)
        .map(Value::String)
        .map_err(|e| FunctionError::argument(0, format!("failed to read {}: {}", path, e)))
}

fn debug(args: &[Value], context: &EvaluationContext) -> FunctionResult {
    if context.functions().debug_enabled() {
        if let Some(value) = args.first() {
            debug!(request_id = %context.id(), value = %value, "debug");
        }
    }
    Ok(Value::Boolean(true))
}
