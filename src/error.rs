use std::fmt;

use thiserror::Error;

use crate::decoder::Stage;
use crate::parser::ParseError;
use crate::pipeline::EvaluationFailure;

/// One problem found while decoding a body, located by its field path
/// (e.g. `hook["deploy"].task.cmd`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub path: String,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Every [`Diagnostic`] collected while decoding one stage.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, path: impl Into<String>, message: impl fmt::Display) {
        self.0.push(Diagnostic {
            path: path.into(),
            message: message.to_string(),
        });
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.0.extend(other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter()
    }

    /// `Ok(value)` when nothing was reported.
    pub fn finish<T>(self, stage: Stage, value: T) -> Result<T, DecodeError> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(DecodeError {
                stage,
                diagnostics: self,
            })
        }
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, diagnostic) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}", diagnostic)?;
        }
        Ok(())
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("{stage} stage: {diagnostics}")]
pub struct DecodeError {
    pub stage: Stage,
    pub diagnostics: Diagnostics,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),
    #[error("Evaluation failed: {0}")]
    Evaluation(Box<EvaluationFailure>),
    #[error("Config error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Unknown hook: {0}")]
    UnknownHook(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type InternalResult<T> = Result<T, Error>;

impl Error {
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Error::Internal(message.into())
    }

    pub fn config<S: Into<String>>(message: S) -> Self {
        Error::Config(message.into())
    }
}

impl From<EvaluationFailure> for Error {
    fn from(failure: EvaluationFailure) -> Self {
        Error::Evaluation(Box::new(failure))
    }
}
