use std::collections::BTreeMap;

use tracing::{debug, instrument};

use super::schema::{
    block_path, extract, to_integer, to_string, to_string_map, BlockSchema, FieldDecoder, Mode,
    Schema,
};
use super::Stage;
use crate::ast::Body;
use crate::error::DecodeError;
use crate::eval::{EvaluationContext, Value};
use crate::response::ResponseKind;

pub(crate) const RESPONSE_FIELDS: Schema = Schema {
    attributes: &["status_code", "content_type", "body", "headers"],
    required: &[],
    blocks: &[],
};

pub(crate) const RESPONSE: Schema = Schema {
    attributes: &[],
    required: &[],
    blocks: &[
        BlockSchema::single("success", &RESPONSE_FIELDS),
        BlockSchema::single("error", &RESPONSE_FIELDS),
        BlockSchema::single("unsatisfied_constraints", &RESPONSE_FIELDS),
    ],
};

pub(crate) const POST_EXEC: Schema = Schema {
    attributes: &[],
    required: &[],
    blocks: &[BlockSchema::single("response", &RESPONSE)],
};

/// One decoded response block. Absent fields take the kind's defaults when
/// rendered.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResponseSpec {
    pub status_code: Option<u16>,
    pub content_type: Option<String>,
    pub body: Option<String>,
    pub headers: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostExecConfig {
    pub kind: ResponseKind,
    /// `None` when the hook has no block for `kind`.
    pub response: Option<ResponseSpec>,
}

/// Decodes the block selected by `kind` and nothing else, so expressions in
/// the other blocks are never evaluated.
#[instrument(level = "debug", skip(body, context), fields(request_id = %context.id()))]
pub fn decode_post_exec(
    body: &Body,
    path: &str,
    kind: ResponseKind,
    context: &EvaluationContext,
) -> Result<PostExecConfig, DecodeError> {
    let mut decoder = FieldDecoder::new(context);
    let (content, _) = extract(body, &POST_EXEC, path, Mode::Full, decoder.diagnostics());

    let selected = content.block("response").and_then(|response| {
        let response_path = block_path(path, response);
        let (blocks, _) = extract(
            &response.body,
            &RESPONSE,
            &response_path,
            Mode::Full,
            decoder.diagnostics(),
        );
        blocks
            .block(kind.block_name())
            .map(|block| (block_path(&response_path, block), block))
    });

    let response = selected.map(|(selected_path, block)| {
        let (fields, _) = extract(
            &block.body,
            &RESPONSE_FIELDS,
            &selected_path,
            Mode::Full,
            decoder.diagnostics(),
        );
        let path = selected_path.as_str();
        ResponseSpec {
            status_code: decoder.decode(fields.attribute("status_code"), path, to_status),
            content_type: decoder.decode(fields.attribute("content_type"), path, to_string),
            body: decoder.decode(fields.attribute("body"), path, to_body),
            headers: decoder.decode(fields.attribute("headers"), path, to_string_map),
        }
    });

    debug!(kind = %kind, present = response.is_some(), "decoded post-exec stage");
    decoder.finish(Stage::PostExec, PostExecConfig { kind, response })
}

fn to_status(value: Value) -> Result<u16, String> {
    let code = to_integer(value)?;
    match u16::try_from(code) {
        Ok(code) if (100..=599).contains(&code) => Ok(code),
        _ => Err(format!("status code {} is outside 100..=599", code)),
    }
}

// Collections render as JSON so a whole capture map or `result` can be
// returned as the body.
fn to_body(value: Value) -> Result<String, String> {
    Ok(match value {
        Value::Null => String::new(),
        Value::List(_) | Value::Map(_) => value.to_string(),
        other => other.coerce_string()?,
    })
}
