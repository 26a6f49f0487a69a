use std::collections::BTreeMap;

use serde::Serialize;

use crate::decoder::ResponseSpec;
use crate::executor::ExecutionResult;
use crate::gate::Verdict;

pub const DEFAULT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// Which of the three response blocks a request ends in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ResponseKind {
    Success,
    Error,
    #[serde(rename = "unsatisfied_constraints")]
    #[strum(serialize = "unsatisfied_constraints")]
    Unsatisfied,
}

impl ResponseKind {
    pub const ALL: [ResponseKind; 3] = [
        ResponseKind::Success,
        ResponseKind::Error,
        ResponseKind::Unsatisfied,
    ];

    /// A denied gate always ends in `unsatisfied_constraints`, whatever the
    /// task would have done.
    pub fn select(verdict: Verdict, result: Option<&ExecutionResult>) -> Self {
        match (verdict, result) {
            (Verdict::Unsatisfied, _) => ResponseKind::Unsatisfied,
            (Verdict::Satisfied, Some(result)) if result.failed() => ResponseKind::Error,
            (Verdict::Satisfied, _) => ResponseKind::Success,
        }
    }

    /// Name of the block inside `response { ... }`.
    pub fn block_name(self) -> &'static str {
        match self {
            ResponseKind::Success => "success",
            ResponseKind::Error => "error",
            ResponseKind::Unsatisfied => "unsatisfied_constraints",
        }
    }

    /// Whether `result` is in scope when the block is decoded.
    pub fn has_result(self) -> bool {
        self != ResponseKind::Unsatisfied
    }

    fn default_status(self) -> u16 {
        match self {
            ResponseKind::Success | ResponseKind::Unsatisfied => 200,
            ResponseKind::Error => 500,
        }
    }

    fn default_body(self) -> &'static str {
        match self {
            ResponseKind::Success => "",
            ResponseKind::Error => "Error occurred while executing the hook's command.",
            ResponseKind::Unsatisfied => "Hook rules were not satisfied.",
        }
    }
}

/// The final output of a request evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedResponse {
    pub kind: ResponseKind,
    pub status_code: u16,
    pub content_type: String,
    pub body: String,
    pub headers: BTreeMap<String, String>,
}

impl RenderedResponse {
    /// Fills whatever the decoded block left out with the kind's defaults.
    pub fn render(kind: ResponseKind, spec: Option<ResponseSpec>) -> Self {
        let spec = spec.unwrap_or_default();
        Self {
            kind,
            status_code: spec.status_code.unwrap_or_else(|| kind.default_status()),
            content_type: spec
                .content_type
                .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
            body: spec.body.unwrap_or_else(|| kind.default_body().to_string()),
            headers: spec.headers.unwrap_or_default(),
        }
    }
}
