use std::collections::BTreeMap;
use std::fmt;

use crate::ast::{Attribute, Block, Body, Expression};
use crate::error::{DecodeError, Diagnostics};
use crate::eval::{EvaluationContext, Value};

use super::Stage;

/// Fields a stage understands in one body.
#[derive(Debug)]
pub struct Schema {
    pub attributes: &'static [&'static str],
    pub required: &'static [&'static str],
    pub blocks: &'static [BlockSchema],
}

#[derive(Debug)]
pub struct BlockSchema {
    pub kind: &'static str,
    pub labels: usize,
    pub multiple: bool,
    pub required: bool,
    /// `None` when the block body belongs to a later stage.
    pub body: Option<&'static Schema>,
}

impl BlockSchema {
    pub const fn single(kind: &'static str, body: &'static Schema) -> Self {
        Self {
            kind,
            labels: 0,
            multiple: false,
            required: false,
            body: Some(body),
        }
    }
}

impl Schema {
    fn has_attribute(&self, name: &str) -> bool {
        self.attributes.contains(&name)
    }

    fn block(&self, kind: &str) -> Option<&BlockSchema> {
        self.blocks.iter().find(|b| b.kind == kind)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Anything outside the schema is an error.
    Full,
    /// Anything outside the schema is handed on as the remainder.
    Partial,
}

/// The parts of a body matched by a [`Schema`].
#[derive(Debug, Default)]
pub struct Content<'a> {
    pub attributes: Vec<&'a Attribute>,
    pub blocks: Vec<&'a Block>,
}

impl<'a> Content<'a> {
    pub fn attribute(&self, name: &str) -> Option<&'a Attribute> {
        self.attributes.iter().copied().find(|a| a.name == name)
    }

    pub fn block(&self, kind: &str) -> Option<&'a Block> {
        self.blocks.iter().copied().find(|b| b.kind == kind)
    }

    pub fn blocks_of<'k>(&'k self, kind: &'k str) -> impl Iterator<Item = &'a Block> + 'k {
        self.blocks.iter().copied().filter(move |b| b.kind == kind)
    }
}

pub fn join_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", parent, name)
    }
}

pub fn block_path(parent: &str, block: &Block) -> String {
    let mut path = join_path(parent, &block.kind);
    for label in &block.labels {
        path.push_str(&format!("[{:?}]", label));
    }
    path
}

/// Splits `body` into the fields named by `schema` and a remainder.
///
/// Structural problems (duplicates, wrong label counts, missing required
/// fields, and unknown fields in [`Mode::Full`]) go to `diagnostics`.
pub fn extract<'a>(
    body: &'a Body,
    schema: &Schema,
    path: &str,
    mode: Mode,
    diagnostics: &mut Diagnostics,
) -> (Content<'a>, Body) {
    let mut content = Content::default();
    let mut remainder = Body::default();

    for attribute in &body.attributes {
        let attr_path = join_path(path, &attribute.name);
        if schema.has_attribute(&attribute.name) {
            if content.attribute(&attribute.name).is_some() {
                diagnostics.push(attr_path, "duplicate argument");
            } else {
                content.attributes.push(attribute);
            }
        } else if mode == Mode::Partial {
            remainder.attributes.push(attribute.clone());
        } else {
            diagnostics.push(
                attr_path,
                format!("unsupported argument {:?}", attribute.name),
            );
        }
    }

    for block in &body.blocks {
        let Some(block_schema) = schema.block(&block.kind) else {
            if mode == Mode::Partial {
                remainder.blocks.push(block.clone());
            } else {
                diagnostics.push(
                    block_path(path, block),
                    format!("unsupported block type {:?}", block.kind),
                );
            }
            continue;
        };

        if block.labels.len() != block_schema.labels {
            diagnostics.push(
                block_path(path, block),
                format!(
                    "{} block expects {} label(s), got {}",
                    block.kind,
                    block_schema.labels,
                    block.labels.len()
                ),
            );
        } else if !block_schema.multiple && content.block(&block.kind).is_some() {
            diagnostics.push(
                block_path(path, block),
                format!("duplicate {} block", block.kind),
            );
        } else {
            content.blocks.push(block);
        }
    }

    for name in schema.required {
        if content.attribute(name).is_none() {
            diagnostics.push(join_path(path, name), "missing required argument");
        }
    }
    for block_schema in schema.blocks.iter().filter(|b| b.required) {
        if !body.blocks.iter().any(|b| b.kind == block_schema.kind) {
            diagnostics.push(
                join_path(path, block_schema.kind),
                "missing required block",
            );
        }
    }

    (content, remainder)
}

/// Evaluates attribute expressions and collects every failure of a stage.
pub struct FieldDecoder<'a> {
    context: &'a EvaluationContext,
    diagnostics: Diagnostics,
}

impl<'a> FieldDecoder<'a> {
    pub fn new(context: &'a EvaluationContext) -> Self {
        Self {
            context,
            diagnostics: Diagnostics::new(),
        }
    }

    pub fn context(&self) -> &'a EvaluationContext {
        self.context
    }

    pub fn diagnostics(&mut self) -> &mut Diagnostics {
        &mut self.diagnostics
    }

    pub fn report(&mut self, path: impl Into<String>, message: impl fmt::Display) {
        self.diagnostics.push(path, message);
    }

    pub fn evaluate(&mut self, expr: &Expression, path: &str) -> Option<Value> {
        match self.context.evaluate(expr) {
            Ok(value) => Some(value),
            Err(e) => {
                self.report(path, e);
                None
            }
        }
    }

    /// Evaluates an optional attribute and converts it with `convert`.
    pub fn decode<T>(
        &mut self,
        attribute: Option<&Attribute>,
        parent: &str,
        convert: fn(Value) -> Result<T, String>,
    ) -> Option<T> {
        let attribute = attribute?;
        let path = join_path(parent, &attribute.name);
        let value = self.evaluate(&attribute.expr, &path)?;
        match convert(value) {
            Ok(v) => Some(v),
            Err(reason) => {
                self.report(path, reason);
                None
            }
        }
    }

    pub fn finish<T>(self, stage: Stage, value: T) -> Result<T, DecodeError> {
        self.diagnostics.finish(stage, value)
    }
}

// Conversions from evaluated values to field types.

pub fn to_string(value: Value) -> Result<String, String> {
    value.coerce_string()
}

pub fn to_bool(value: Value) -> Result<bool, String> {
    value.coerce_bool()
}

pub fn to_integer(value: Value) -> Result<i64, String> {
    match value.coerce_number()? {
        Value::Integer(i) => Ok(i),
        Value::Float(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Ok(f as i64),
        other => Err(format!("whole number required, got {}", other)),
    }
}

pub fn to_string_list(value: Value) -> Result<Vec<String>, String> {
    match value {
        Value::List(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| item.coerce_string().map_err(|e| format!("element {}: {}", i, e)))
            .collect(),
        other => Err(format!("list of string required, got {}", other.kind())),
    }
}

pub fn to_string_map(value: Value) -> Result<BTreeMap<String, String>, String> {
    match value {
        Value::Map(map) => map
            .into_iter()
            .map(|(k, v)| {
                v.coerce_string()
                    .map(|v| (k.clone(), v))
                    .map_err(|e| format!("key {:?}: {}", k, e))
            })
            .collect(),
        other => Err(format!("map of string required, got {}", other.kind())),
    }
}
