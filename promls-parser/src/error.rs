use crate::ast::Span;

#[non_exhaustive]
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("unexpected {found}, expected {expected}")]
    Syntax {
        offset: usize,
        found: String,
        expected: String,
    },

    #[error("{message}")]
    Semantic { span: Span, message: String },

    #[error("invalid duration: {0}")]
    InvalidDuration(String),
}

impl Error {
    pub(crate) fn semantic(span: Span, message: impl Into<String>) -> Self {
        Self::Semantic {
            span,
            message: message.into(),
        }
    }

    /// Byte offset where the error starts, relative to the parsed text.
    #[must_use]
    pub fn offset(&self) -> usize {
        match self {
            Self::Syntax { offset, .. } => *offset,
            Self::Semantic { span, .. } => span.start,
            Self::InvalidDuration(_) => 0,
        }
    }

    /// Full span of the offending input when the error knows it.
    #[must_use]
    pub fn span(&self) -> Option<Span> {
        match self {
            Self::Semantic { span, .. } => Some(*span),
            Self::Syntax { .. } | Self::InvalidDuration(_) => None,
        }
    }

    pub(crate) fn from_peg(input: &str, err: &peg::error::ParseError<peg::str::LineCol>) -> Self {
        let offset = err.location.offset;
        let found = input
            .get(offset..)
            .and_then(|rest| rest.chars().next())
            .map_or_else(|| "end of input".to_string(), |c| format!("{c:?}"));
        Self::Syntax {
            offset,
            found,
            expected: err.expected.to_string(),
        }
    }
}
