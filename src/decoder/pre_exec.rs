use std::collections::BTreeMap;
use std::path::{Component, Path};
use std::str::FromStr;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::{debug, instrument};

use super::schema::{
    block_path, extract, join_path, to_bool, to_string, to_string_list, to_string_map,
    BlockSchema, FieldDecoder, Mode, Schema,
};
use super::Stage;
use crate::ast::{Body, Expression};
use crate::error::DecodeError;
use crate::eval::{EvaluationContext, Value};

const PASS_FILE: Schema = Schema {
    attributes: &["source", "name", "filename", "base64decode", "keep", "envname"],
    required: &["source", "filename"],
    blocks: &[],
};

const CREATE_FILE: Schema = Schema {
    attributes: &["content", "filename", "keep", "envname"],
    required: &["content", "filename"],
    blocks: &[],
};

pub(crate) const TASK: Schema = Schema {
    attributes: &["cmd", "workdir", "env_vars"],
    required: &["cmd"],
    blocks: &[
        BlockSchema::single("pass_file", &PASS_FILE),
        BlockSchema::single("create_file", &CREATE_FILE),
    ],
};

pub(crate) const PRE_EXEC: Schema = Schema {
    attributes: &["constraints"],
    required: &[],
    blocks: &[BlockSchema {
        kind: "task",
        labels: 0,
        multiple: false,
        required: true,
        body: Some(&TASK),
    }],
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum PassFileSource {
    Payload,
    Header,
    #[strum(to_string = "param", serialize = "url")]
    Param,
    File,
}

/// Request data (or a local file) copied into a file for the task.
#[derive(Debug, Clone, PartialEq)]
pub struct PassFile {
    pub source: PassFileSource,
    pub name: String,
    pub filename: String,
    pub base64decode: bool,
    pub keep: bool,
    pub envname: Option<String>,
    /// Resolved while decoding, after base64 decoding if requested.
    pub content: Vec<u8>,
}

/// Literal content written to a file for the task.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateFile {
    pub content: Vec<u8>,
    pub filename: String,
    pub keep: bool,
    pub envname: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TaskSpec {
    pub cmd: Vec<String>,
    pub workdir: Option<String>,
    pub env_vars: Option<BTreeMap<String, String>>,
    pub pass_file: Option<PassFile>,
    pub create_file: Option<CreateFile>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PreExecConfig {
    /// `None` when the hook has no `constraints` attribute.
    pub constraints: Option<Vec<bool>>,
    pub task: TaskSpec,
    /// The `response` block, decoded after the gate.
    pub remainder: Body,
}

#[instrument(level = "debug", skip_all, fields(request_id = %context.id()))]
pub fn decode_pre_exec(
    body: &Body,
    path: &str,
    context: &EvaluationContext,
) -> Result<PreExecConfig, DecodeError> {
    let mut decoder = FieldDecoder::new(context);
    let (content, remainder) = extract(body, &PRE_EXEC, path, Mode::Partial, decoder.diagnostics());

    let constraints_path = join_path(path, "constraints");
    let constraints = content
        .attribute("constraints")
        .and_then(|attr| decode_constraints(&mut decoder, &attr.expr, &constraints_path));

    let task = match content.block("task") {
        Some(block) => decode_task(&mut decoder, &block.body, &block_path(path, block)),
        None => TaskSpec::default(),
    };

    debug!(constraints = ?constraints, cmd = ?task.cmd, "decoded pre-exec stage");
    decoder.finish(
        Stage::PreExec,
        PreExecConfig {
            constraints,
            task,
            remainder,
        },
    )
}

// Every element is evaluated so that all failures are reported together.
fn decode_constraints(
    decoder: &mut FieldDecoder,
    expr: &Expression,
    path: &str,
) -> Option<Vec<bool>> {
    let values: Vec<Option<Value>> = match expr {
        Expression::List(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| decoder.evaluate(item, &format!("{}[{}]", path, i)))
            .collect(),
        other => match decoder.evaluate(other, path)? {
            Value::List(items) => items.into_iter().map(Some).collect(),
            value => {
                decoder.report(path, format!("list of bool required, got {}", value.kind()));
                return None;
            }
        },
    };

    let mut constraints = Vec::with_capacity(values.len());
    let mut failed = false;
    for (i, value) in values.into_iter().enumerate() {
        let Some(value) = value else {
            failed = true;
            continue;
        };
        match value.coerce_bool() {
            Ok(b) => constraints.push(b),
            Err(reason) => {
                failed = true;
                decoder.report(format!("{}[{}]", path, i), reason);
            }
        }
    }
    (!failed).then_some(constraints)
}

fn decode_task(decoder: &mut FieldDecoder, body: &Body, path: &str) -> TaskSpec {
    let (content, _) = extract(body, &TASK, path, Mode::Full, decoder.diagnostics());

    let cmd = decoder
        .decode(content.attribute("cmd"), path, to_string_list)
        .unwrap_or_default();
    if content.attribute("cmd").is_some() && cmd.first().map_or(true, |c| c.is_empty()) {
        decoder.report(join_path(path, "cmd"), "command must not be empty");
    }

    let pass_file = content
        .block("pass_file")
        .and_then(|block| decode_pass_file(decoder, &block.body, &block_path(path, block)));
    let create_file = content
        .block("create_file")
        .and_then(|block| decode_create_file(decoder, &block.body, &block_path(path, block)));

    TaskSpec {
        cmd,
        workdir: decoder.decode(content.attribute("workdir"), path, to_string),
        env_vars: decoder.decode(content.attribute("env_vars"), path, to_string_map),
        pass_file,
        create_file,
    }
}

fn decode_pass_file(decoder: &mut FieldDecoder, body: &Body, path: &str) -> Option<PassFile> {
    let (content, _) = extract(body, &PASS_FILE, path, Mode::Full, decoder.diagnostics());

    let source = decoder
        .decode(content.attribute("source"), path, to_string)
        .and_then(|source| match PassFileSource::from_str(&source) {
            Ok(source) => Some(source),
            Err(_) => {
                decoder.report(
                    join_path(path, "source"),
                    format!(
                        "unknown source {:?}; expected payload, header, param, url or file",
                        source
                    ),
                );
                None
            }
        });
    let name = decoder
        .decode(content.attribute("name"), path, to_string)
        .unwrap_or_default();
    let filename = decode_filename(decoder, content.attribute("filename"), path);
    let base64decode = decoder
        .decode(content.attribute("base64decode"), path, to_bool)
        .unwrap_or(false);
    let keep = decoder
        .decode(content.attribute("keep"), path, to_bool)
        .unwrap_or(false);
    let envname = decoder.decode(content.attribute("envname"), path, to_string);

    let source = source?;
    let raw = match resolve_source(decoder.context(), source, &name) {
        Ok(raw) => raw,
        Err(reason) => {
            decoder.report(join_path(path, "name"), reason);
            return None;
        }
    };
    let content = if base64decode {
        let encoded: Vec<u8> = raw.into_iter().filter(|b| !b.is_ascii_whitespace()).collect();
        match STANDARD.decode(encoded) {
            Ok(decoded) => decoded,
            Err(e) => {
                decoder.report(
                    join_path(path, "base64decode"),
                    format!("failed to decode base64 data: {}", e),
                );
                return None;
            }
        }
    } else {
        raw
    };

    Some(PassFile {
        source,
        name,
        filename: filename?,
        base64decode,
        keep,
        envname,
        content,
    })
}

fn resolve_source(
    context: &EvaluationContext,
    source: PassFileSource,
    name: &str,
) -> Result<Vec<u8>, String> {
    let lookups = context.lookups();
    let text = match source {
        PassFileSource::Payload if name.is_empty() => context
            .variable("payload")
            .and_then(Value::as_str)
            .unwrap_or_default(),
        PassFileSource::Payload => lookups.payload(name).unwrap_or_default(),
        PassFileSource::Header => lookups.header(name).unwrap_or_default(),
        PassFileSource::Param => lookups.param(name).unwrap_or_default(),
        PassFileSource::File => {
            return std::fs::read(name).map_err(|e| format!("failed to read {}: {}", name, e))
        }
    };
    Ok(text.as_bytes().to_vec())
}

fn decode_create_file(decoder: &mut FieldDecoder, body: &Body, path: &str) -> Option<CreateFile> {
    let (content, _) = extract(body, &CREATE_FILE, path, Mode::Full, decoder.diagnostics());

    let file_content = decoder.decode(content.attribute("content"), path, to_string);
    let filename = decode_filename(decoder, content.attribute("filename"), path);
    let keep = decoder
        .decode(content.attribute("keep"), path, to_bool)
        .unwrap_or(false);
    let envname = decoder.decode(content.attribute("envname"), path, to_string);

    Some(CreateFile {
        content: file_content?.into_bytes(),
        filename: filename?,
        keep,
        envname,
    })
}

// File names are relative to the task's file directory and may not escape it.
fn decode_filename(
    decoder: &mut FieldDecoder,
    attribute: Option<&crate::ast::Attribute>,
    path: &str,
) -> Option<String> {
    let filename = decoder.decode(attribute, path, to_string)?;
    let relative = Path::new(&filename)
        .components()
        .all(|c| matches!(c, Component::Normal(_)));
    if filename.is_empty() || !relative {
        decoder.report(
            join_path(path, "filename"),
            format!("{:?} is not a relative file name", filename),
        );
        return None;
    }
    Some(filename)
}
