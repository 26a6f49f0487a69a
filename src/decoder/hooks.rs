use std::collections::HashSet;

use tracing::{debug, instrument};

use super::schema::{
    block_path, extract, to_string, to_string_list, BlockSchema, FieldDecoder, Mode, Schema,
};
use super::Stage;
use crate::ast::Body;
use crate::error::DecodeError;
use crate::eval::EvaluationContext;
use crate::request::RequestShape;

const REQUEST: Schema = Schema {
    attributes: &["content_type", "json_parameters"],
    required: &[],
    blocks: &[],
};

pub(crate) const HOOKS: Schema = Schema {
    attributes: &[],
    required: &[],
    blocks: &[BlockSchema {
        kind: "hook",
        labels: 1,
        multiple: true,
        required: false,
        body: None,
    }],
};

const HOOK: Schema = Schema {
    attributes: &[],
    required: &[],
    blocks: &[BlockSchema::single("request", &REQUEST)],
};

/// One `hook "id" { ... }` block. Immutable once loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct HookDefinition {
    pub id: String,
    pub request: Option<RequestShape>,
    /// Constraints, task and responses, decoded per request.
    pub remainder: Body,
}

#[instrument(level = "debug", skip_all)]
pub fn decode_hooks(
    body: &Body,
    context: &EvaluationContext,
) -> Result<Vec<HookDefinition>, DecodeError> {
    let mut decoder = FieldDecoder::new(context);
    let (content, _) = extract(body, &HOOKS, "", Mode::Full, decoder.diagnostics());

    let mut seen = HashSet::new();
    let mut hooks = Vec::new();
    for block in content.blocks_of("hook") {
        let path = block_path("", block);
        let id = block.labels.first().cloned().unwrap_or_default();
        if id.is_empty() {
            decoder.report(&path, "hook id must not be empty");
            continue;
        }
        if !seen.insert(id.clone()) {
            decoder.report(&path, format!("duplicate hook id {:?}", id));
            continue;
        }

        let (hook, remainder) = extract(
            &block.body,
            &HOOK,
            &path,
            Mode::Partial,
            decoder.diagnostics(),
        );
        let request = hook.block("request").map(|request| {
            let request_path = block_path(&path, request);
            let (fields, _) = extract(
                &request.body,
                &REQUEST,
                &request_path,
                Mode::Full,
                decoder.diagnostics(),
            );
            RequestShape {
                content_type: decoder.decode(
                    fields.attribute("content_type"),
                    &request_path,
                    to_string,
                ),
                json_parameters: decoder
                    .decode(
                        fields.attribute("json_parameters"),
                        &request_path,
                        to_string_list,
                    )
                    .unwrap_or_default(),
            }
        });

        debug!(hook = %id, "decoded hook");
        hooks.push(HookDefinition {
            id,
            request,
            remainder,
        });
    }

    decoder.finish(Stage::Hooks, hooks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::FunctionRegistry;
    use crate::parser::parse_document;

    fn decode(source: &str) -> Result<Vec<HookDefinition>, DecodeError> {
        let context = EvaluationContext::new(FunctionRegistry::standard(false));
        decode_hooks(&parse_document(source).unwrap(), &context)
    }

    #[test]
    fn test_decode_hooks() {
        let hooks = decode(
            r#"
            hook "deploy" {
              request {
                content_type = "application/json"
                json_parameters = ["meta"]
              }
              constraints = [true]
              task { cmd = ["deploy.sh"] }
            }

            hook "noop" {
              task { cmd = ["true"] }
            }
            "#,
        )
        .unwrap();

        assert_eq!(hooks.len(), 2);
        assert_eq!(hooks[0].id, "deploy");
        assert_eq!(
            hooks[0].request,
            Some(RequestShape {
                content_type: Some("application/json".to_string()),
                json_parameters: vec!["meta".to_string()],
            })
        );
        // request is consumed, everything else is deferred
        assert!(hooks[0].remainder.attribute("constraints").is_some());
        assert_eq!(hooks[0].remainder.blocks.len(), 1);
        assert_eq!(hooks[1].request, None);
    }

    #[test]
    fn test_duplicate_ids_are_rejected() {
        let err = decode(
            r#"
            hook "a" {}
            hook "a" {}
            "#,
        )
        .unwrap_err();
        assert_eq!(err.stage, Stage::Hooks);
        assert!(err.to_string().contains("duplicate hook id"));
    }

    #[test]
    fn test_hook_requires_one_label() {
        assert!(decode("hook {}").is_err());
        assert!(decode(r#"hook "a" "b" {}"#).is_err());
    }

    #[test]
    fn test_unknown_top_level_items_are_rejected() {
        let err = decode(r#"listener "x" {}"#).unwrap_err();
        assert_eq!(err.diagnostics.iter().next().unwrap().path, "listener[\"x\"]");
    }

    #[test]
    fn test_request_fields_are_checked() {
        let err = decode(
            r#"
            hook "a" {
              request { content_types = "application/json" }
            }
            "#,
        )
        .unwrap_err();
        assert_eq!(
            err.diagnostics.iter().next().unwrap().path,
            "hook[\"a\"].request.content_types"
        );
    }
}
