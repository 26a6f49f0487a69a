use chrono::{DateTime, Utc};
use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{char, digit0, one_of},
    combinator::{all_consuming, opt},
    multi::many1,
    sequence::{preceded, tuple},
    IResult,
};

use super::registry::FunctionRegistryBuilder;
use super::types::{str_arg, FunctionError, FunctionResult, ParamType, Signature};
use crate::eval::{EvaluationContext, Value, ValueKind};

pub(crate) fn register(builder: &mut FunctionRegistryBuilder) {
    builder.native(
        Signature::new("duration")
            .param("duration", ParamType::String)
            .returns(ValueKind::Number),
        duration,
    );
    builder.native(
        Signature::new("since")
            .param("timestamp", ParamType::String)
            .returns(ValueKind::Number),
        since,
    );
}

const NANOSECOND: u64 = 1;
const MICROSECOND: u64 = 1_000 * NANOSECOND;
const MILLISECOND: u64 = 1_000 * MICROSECOND;
const SECOND: u64 = 1_000 * MILLISECOND;
const MINUTE: u64 = 60 * SECOND;
const HOUR: u64 = 60 * MINUTE;

fn unit(input: &str) -> IResult<&str, u64> {
    let (rest, name) = alt((
        tag("ns"),
        tag("us"),
        tag("µs"), // U+00B5
        tag("μs"), // U+03BC
        tag("ms"),
        tag("s"),
        tag("m"),
        tag("h"),
    ))(input)?;
    let scale = match name {
        "ns" => NANOSECOND,
        "us" | "µs" | "μs" => MICROSECOND,
        "ms" => MILLISECOND,
        "s" => SECOND,
        "m" => MINUTE,
        _ => HOUR,
    };
    Ok((rest, scale))
}

// `<whole>[.<fraction>]<unit>`
fn component(input: &str) -> IResult<&str, (&str, Option<&str>, u64)> {
    tuple((digit0, opt(preceded(char('.'), digit0)), unit))(input)
}

fn duration_str(input: &str) -> IResult<&str, (Option<char>, Vec<(&str, Option<&str>, u64)>)> {
    all_consuming(tuple((opt(one_of("+-")), many1(component))))(input)
}

/// Parses a Go-style duration such as `1h30m` or `-1.5s` into nanoseconds.
pub fn parse_duration(s: &str) -> Result<i64, String> {
    let invalid = || format!("invalid duration {:?}", s);
    let unsigned = s
        .strip_prefix('+')
        .or_else(|| s.strip_prefix('-'))
        .unwrap_or(s);
    if unsigned == "0" {
        return Ok(0);
    }
    if !unsigned.is_empty() && unsigned.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return Err(format!("missing unit in duration {:?}", s));
    }

    let (_, (sign, components)) = duration_str(s).map_err(|_| invalid())?;
    let mut total: u64 = 0;
    for (whole, fraction, scale) in components {
        let fraction = fraction.unwrap_or_default();
        if whole.is_empty() && fraction.is_empty() {
            return Err(invalid());
        }
        let whole: u64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid())?
        };
        let mut nanos = whole.checked_mul(scale).ok_or_else(invalid)?;
        if !fraction.is_empty() {
            let digits = &fraction[..fraction.len().min(18)];
            let numerator: u64 = digits.parse().map_err(|_| invalid())?;
            let denominator = 10f64.powi(digits.len() as i32);
            nanos = nanos
                .checked_add((numerator as f64 / denominator * scale as f64) as u64)
                .ok_or_else(invalid)?;
        }
        total = total.checked_add(nanos).ok_or_else(invalid)?;
    }

    if sign == Some('-') {
        if total > i64::MAX as u64 + 1 {
            return Err(invalid());
        }
        Ok(-(total as i128) as i64)
    } else {
        i64::try_from(total).map_err(|_| invalid())
    }
}

fn duration(args: &[Value], _: &EvaluationContext) -> FunctionResult {
    parse_duration(str_arg(args, 0)?)
        .map(Value::Integer)
        .map_err(|reason| FunctionError::argument(0, reason))
}

fn since(args: &[Value], context: &EvaluationContext) -> FunctionResult {
    let timestamp = str_arg(args, 0)?;
    // the zero time is so far back that the elapsed duration saturates
    if timestamp.is_empty() {
        return Ok(Value::Integer(i64::MAX));
    }
    let then = DateTime::parse_from_rfc2822(timestamp)
        .map_err(|e| {
            FunctionError::argument(0, format!("invalid timestamp {:?}: {}", timestamp, e))
        })?
        .with_timezone(&Utc);
    Ok(Value::Integer(elapsed_nanos(then, context.now())))
}

fn elapsed_nanos(then: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let elapsed = now.signed_duration_since(then);
    elapsed.num_nanoseconds().unwrap_or(if elapsed < chrono::Duration::zero() {
        i64::MIN
    } else {
        i64::MAX
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::TimeZone;

    use super::super::test_support::call;
    use super::*;
    use crate::eval::FixedClock;
    use crate::function::FunctionRegistry;

    #[test]
    fn test_parse_duration() {
        let cases = [
            ("0", 0),
            ("-0", 0),
            ("300ms", 300 * MILLISECOND as i64),
            ("1h30m", (HOUR + 30 * MINUTE) as i64),
            ("-1.5h", -((HOUR + 30 * MINUTE) as i64)),
            ("+2s", 2 * SECOND as i64),
            ("1.5µs", 1_500),
            ("1.5μs", 1_500),
            ("2us", 2_000),
            ("10ns", 10),
            (".5s", 500 * MILLISECOND as i64),
            (
                "2h45m10.5s",
                (2 * HOUR + 45 * MINUTE + 10 * SECOND + 500 * MILLISECOND) as i64,
            ),
        ];
        for (input, expected) in cases {
            assert_eq!(parse_duration(input), Ok(expected), "{}", input);
        }
    }

    #[test]
    fn test_parse_duration_rejects() {
        for input in ["", "1", "1.5", "h", "1x", "1h 30m", ".s", "-", "1d"] {
            assert!(parse_duration(input).is_err(), "{:?} should fail", input);
        }
        assert!(parse_duration("9999999999h").is_err());
    }

    fn context_at(now: DateTime<Utc>) -> EvaluationContext {
        EvaluationContext::new(FunctionRegistry::standard(false))
            .with_clock(Arc::new(FixedClock(now)))
    }

    #[test]
    fn test_since_uses_context_clock() {
        let now = Utc.with_ymd_and_hms(2019, 9, 20, 14, 10, 11).unwrap();
        let context = context_at(now);
        let result = call(
            &context,
            "since",
            vec![Value::from("Fri, 20 Sep 2019 14:09:11 GMT")],
        );
        assert_eq!(result, Ok(Value::Integer(60 * SECOND as i64)));

        let result = call(
            &context,
            "since",
            vec![Value::from("Fri, 20 Sep 2019 16:09:11 +0200")],
        );
        assert_eq!(result, Ok(Value::Integer(60 * SECOND as i64)));
    }

    #[test]
    fn test_since_empty_saturates() {
        let context = context_at(Utc::now());
        assert_eq!(
            call(&context, "since", vec![Value::from("")]),
            Ok(Value::Integer(i64::MAX))
        );
    }

    #[test]
    fn test_since_rejects_other_formats() {
        let context = context_at(Utc::now());
        assert!(call(&context, "since", vec![Value::from("2019-09-20T14:09:11Z")]).is_err());
    }

    #[test]
    fn test_since_compared_with_duration() {
        let now = Utc.with_ymd_and_hms(2019, 9, 20, 14, 39, 11).unwrap();
        let context = context_at(now);
        let expr = crate::parser::parse_expression_str(
            r#"lt(since("Fri, 20 Sep 2019 14:09:11 GMT"), duration("1h"))"#,
        )
        .unwrap();
        assert_eq!(context.evaluate(&expr), Ok(Value::Boolean(true)));
    }
}
