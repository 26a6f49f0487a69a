use ring::hmac;

use super::registry::FunctionRegistryBuilder;
use super::types::{str_arg, FunctionResult, ParamType, Signature};
use crate::eval::{EvaluationContext, Value, ValueKind};

pub(crate) fn register(builder: &mut FunctionRegistryBuilder) {
    let digest = |name| {
        Signature::new(name)
            .param("data", ParamType::String)
            .sensitive_param("secret", ParamType::String)
            .returns(ValueKind::String)
    };
    builder.native(digest("sha1"), sha1);
    builder.native(digest("sha256"), sha256);
    builder.native(digest("sha512"), sha512);
}

/// Compares two byte strings in time that depends only on their lengths.
#[allow(deprecated)]
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    ring::constant_time::verify_slices_are_equal(a, b).is_ok()
}

fn hmac_hex(algorithm: hmac::Algorithm, args: &[Value]) -> FunctionResult {
    let data = str_arg(args, 0)?;
    let secret = str_arg(args, 1)?;
    let key = hmac::Key::new(algorithm, secret.as_bytes());
    let tag = hmac::sign(&key, data.as_bytes());
    Ok(Value::String(hex::encode(tag.as_ref())))
}

fn sha1(args: &[Value], _: &EvaluationContext) -> FunctionResult {
    hmac_hex(hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY, args)
}

fn sha256(args: &[Value], _: &EvaluationContext) -> FunctionResult {
    hmac_hex(hmac::HMAC_SHA256, args)
}

fn sha512(args: &[Value], _: &EvaluationContext) -> FunctionResult {
    hmac_hex(hmac::HMAC_SHA512, args)
}
