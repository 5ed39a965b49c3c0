//! Policy-load errors (spec.md §7: syntax and semantic failures abort the
//! swap and leave the previously-active policy in place).

use std::path::PathBuf;

/// Error produced while parsing or validating a policy file.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    /// The policy or a referenced dictionary file could not be read.
    #[error("cannot read {path}: {source}")]
    Io {
        /// Path that failed to read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// A line did not conform to the rule/dict/result grammar.
    #[error("rule syntax error at line {line}: {message} ({text:?})")]
    Syntax {
        /// 1-based line number within the policy file.
        line: usize,
        /// Human-readable description of the problem.
        message: String,
        /// The offending line text.
        text: String,
    },
    /// A load-time invariant from spec.md §3 was violated.
    #[error("rule semantic error: {0}")]
    Semantic(String),
}

impl PolicyError {
    pub(crate) fn syntax(line: usize, message: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Syntax {
            line,
            message: message.into(),
            text: text.into(),
        }
    }
}
