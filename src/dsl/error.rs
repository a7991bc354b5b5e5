use thiserror::Error;

/// Failure to compile a filter expression. Offsets are byte positions in
/// the source text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("unrecognized input at offset {offset}")]
    Lex { offset: usize },

    #[error("unexpected {found} at offset {offset} (expected {expected})")]
    Parse {
        offset: usize,
        found: String,
        expected: &'static str,
    },
}

impl FilterError {
    pub fn offset(&self) -> usize {
        match self {
            FilterError::Lex { offset } | FilterError::Parse { offset, .. } => *offset,
        }
    }
}
