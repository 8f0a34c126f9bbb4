use thiserror::Error;

/// Rejected value-type input. Every variant is a caller mistake.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DomainError {
    #[error("unsupported {kind} `{value}` (expected {expected})")]
    Unsupported {
        kind: &'static str,
        value: String,
        expected: &'static str,
    },
    #[error("margin `{side}` must be a non-negative number of millimetres, got {value}")]
    InvalidMargin { side: &'static str, value: f64 },
}

impl DomainError {
    pub(crate) fn unsupported(kind: &'static str, value: &str, expected: &'static str) -> Self {
        Self::Unsupported {
            kind,
            value: value.to_string(),
            expected,
        }
    }
}
