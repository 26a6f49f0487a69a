use std::collections::BTreeMap;

use regex::Regex;
use unicode_segmentation::UnicodeSegmentation;

use super::registry::FunctionRegistryBuilder;
use super::types::{number_arg, str_arg, FunctionError, FunctionResult, ParamType, Signature};
use crate::eval::{EvaluationContext, Value, ValueKind};

pub(crate) fn register(builder: &mut FunctionRegistryBuilder) {
    builder.native(
        Signature::new("match")
            .param("pattern", ParamType::String)
            .param("string", ParamType::String)
            .returns(ValueKind::Bool),
        is_match,
    );
    builder.native(
        Signature::new("find")
            .param("pattern", ParamType::String)
            .param("string", ParamType::String)
            .returns_pattern_dependent(),
        find,
    );
    builder.native(
        Signature::new("contains")
            .param("string", ParamType::String)
            .param("substr", ParamType::String)
            .returns(ValueKind::Bool),
        contains,
    );
    builder.native(
        Signature::new("upper").param("string", ParamType::String),
        upper,
    );
    builder.native(
        Signature::new("lower").param("string", ParamType::String),
        lower,
    );
    builder.native(
        Signature::new("len")
            .param("string", ParamType::String)
            .returns(ValueKind::Number),
        len,
    );
    builder.native(
        Signature::new("format")
            .param("format", ParamType::String)
            .variadic("args", ParamType::Any, 0),
        format,
    );
    builder.native(
        Signature::new("concat")
            .param("a", ParamType::String)
            .param("b", ParamType::String)
            .variadic("more", ParamType::String, 0),
        concat,
    );
    builder.native(
        Signature::new("join")
            .param("separator", ParamType::String)
            .variadic("lists", ParamType::Any, 1),
        join,
    );
    builder.native(
        Signature::new("float")
            .param("num", ParamType::Number)
            .returns(ValueKind::Number),
        float,
    );
}

/// Result shape of `find`, decided by the capture groups of the pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureShape {
    /// No groups: the whole match as a string.
    Scalar,
    /// Unnamed groups only: one list entry per group.
    List(usize),
    /// Named groups only: an object keyed by group name.
    Keyed(Vec<String>),
}

impl CaptureShape {
    pub fn of(re: &Regex) -> Result<Self, String> {
        let mut named = Vec::new();
        let mut unnamed = 0;
        for name in re.capture_names().skip(1) {
            match name {
                Some(name) => named.push(name.to_string()),
                None => unnamed += 1,
            }
        }
        match (named.is_empty(), unnamed) {
            (true, 0) => Ok(CaptureShape::Scalar),
            (true, n) => Ok(CaptureShape::List(n)),
            (false, 0) => Ok(CaptureShape::Keyed(named)),
            (false, _) => {
                Err("pattern cannot mix named and unnamed capture groups".to_string())
            }
        }
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            CaptureShape::Scalar => ValueKind::String,
            CaptureShape::List(_) => ValueKind::List,
            CaptureShape::Keyed(_) => ValueKind::Object,
        }
    }
}

fn compile(pattern: &str) -> Result<Regex, FunctionError> {
    Regex::new(pattern)
        .map_err(|e| FunctionError::argument(0, format!("error parsing pattern: {}", e)))
}

fn is_match(args: &[Value], _: &EvaluationContext) -> FunctionResult {
    let re = compile(str_arg(args, 0)?)?;
    Ok(Value::Boolean(re.is_match(str_arg(args, 1)?)))
}

fn find(args: &[Value], _: &EvaluationContext) -> FunctionResult {
    let re = compile(str_arg(args, 0)?)?;
    let shape = CaptureShape::of(&re).map_err(|reason| FunctionError::argument(0, reason))?;
    let captures = re.captures(str_arg(args, 1)?).ok_or_else(|| {
        FunctionError::failed("pattern did not match any part of the given string")
    })?;

    let group = |m: Option<regex::Match>| m.map(|m| Value::from(m.as_str())).unwrap_or_default();
    Ok(match shape {
        CaptureShape::Scalar => group(captures.get(0)),
        CaptureShape::List(n) => Value::List((1..=n).map(|i| group(captures.get(i))).collect()),
        CaptureShape::Keyed(names) => Value::Map(
            names
                .into_iter()
                .map(|name| {
                    let value = group(captures.name(&name));
                    (name, value)
                })
                .collect::<BTreeMap<_, _>>(),
        ),
    })
}

fn contains(args: &[Value], _: &EvaluationContext) -> FunctionResult {
    Ok(Value::Boolean(str_arg(args, 0)?.contains(str_arg(args, 1)?)))
}

fn upper(args: &[Value], _: &EvaluationContext) -> FunctionResult {
    Ok(Value::String(str_arg(args, 0)?.to_uppercase()))
}

fn lower(args: &[Value], _: &EvaluationContext) -> FunctionResult {
    Ok(Value::String(str_arg(args, 0)?.to_lowercase()))
}

fn len(args: &[Value], _: &EvaluationContext) -> FunctionResult {
    let count = str_arg(args, 0)?.graphemes(true).count();
    Ok(Value::Integer(count as i64))
}

fn concat(args: &[Value], _: &EvaluationContext) -> FunctionResult {
    let mut out = String::new();
    for index in 0..args.len() {
        out.push_str(str_arg(args, index)?);
    }
    Ok(Value::String(out))
}

fn join(args: &[Value], _: &EvaluationContext) -> FunctionResult {
    let separator = str_arg(args, 0)?;
    let mut items = Vec::new();
    for (index, arg) in args.iter().enumerate().skip(1) {
        let Value::List(list) = arg else {
            return Err(FunctionError::argument(
                index,
                format!("list required, got {}", arg.kind()),
            ));
        };
        for item in list {
            items.push(
                item.coerce_string()
                    .map_err(|reason| FunctionError::argument(index, reason))?,
            );
        }
    }
    Ok(Value::String(items.join(separator)))
}

fn float(args: &[Value], _: &EvaluationContext) -> FunctionResult {
    number_arg(args, 0).cloned()
}

fn format(args: &[Value], _: &EvaluationContext) -> FunctionResult {
    let spec = str_arg(args, 0)?;
    let values = args.get(1..).unwrap_or_default();
    let mut used = 0;
    let mut out = String::with_capacity(spec.len());
    let mut chars = spec.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }

        let mut precision = None;
        if chars.peek() == Some(&'.') {
            chars.next();
            let mut digits = String::new();
            while let Some(d) = chars.peek().filter(|d| d.is_ascii_digit()) {
                digits.push(*d);
                chars.next();
            }
            precision = Some(digits.parse::<usize>().unwrap_or(0));
        }

        let verb = chars
            .next()
            .ok_or_else(|| FunctionError::failed("format string ends with an incomplete verb"))?;
        if verb == '%' {
            out.push('%');
            continue;
        }

        let index = used + 1;
        let value = values.get(used).ok_or_else(|| {
            FunctionError::failed(format!("too few arguments; no value for %{} verb", verb))
        })?;
        used += 1;
        let rendered = format_verb(verb, precision, value)
            .map_err(|reason| FunctionError::argument(index, reason))?;
        out.push_str(&rendered);
    }

    if used < values.len() {
        return Err(FunctionError::failed(format!(
            "too many arguments; only {} used by format string",
            used
        )));
    }
    Ok(Value::String(out))
}

fn format_verb(verb: char, precision: Option<usize>, value: &Value) -> Result<String, String> {
    match verb {
        'v' => Ok(value.to_string()),
        's' => value.coerce_string(),
        'q' => value.coerce_string().map(|s| format!("{:?}", s)),
        't' => value.coerce_bool().map(|b| b.to_string()),
        'd' => match value.coerce_number()? {
            Value::Integer(i) => Ok(i.to_string()),
            Value::Float(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                Ok((f as i64).to_string())
            }
            _ => Err("%d requires a whole number".to_string()),
        },
        'f' => {
            let n = value.coerce_number()?;
            let f = n.as_f64().unwrap_or_default();
            Ok(format!("{:.*}", precision.unwrap_or(6), f))
        }
        other => Err(format!("unsupported format verb %{}", other)),
    }
}
