//! Reduces evaluated constraints to a single admit/deny decision.

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Verdict {
    Satisfied,
    Unsatisfied,
}

impl Verdict {
    pub fn is_satisfied(self) -> bool {
        self == Verdict::Satisfied
    }
}

/// Absent and empty lists are vacuously satisfied.
pub fn evaluate(constraints: Option<&[bool]>) -> Verdict {
    match constraints {
        Some(values) if values.iter().any(|satisfied| !satisfied) => Verdict::Unsatisfied,
        _ => Verdict::Satisfied,
    }
}
