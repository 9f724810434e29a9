//! Error taxonomy for planning, record handling and agreement.
//!
//! Configuration and data errors abort the current command. Input errors
//! are recoverable and only ever surface as a re-prompt inside a session.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the annotation workflow.
#[derive(Debug, Error)]
pub enum AnnotatorError {
    // === Configuration errors ===
    #[error("document pool too small: {annotators} annotator(s) x {batch_size} documents needs {required}, only {available} available")]
    InsufficientDocuments {
        annotators: usize,
        batch_size: usize,
        required: usize,
        available: usize,
    },

    #[error("at least {required} annotator(s) are required, got {got}")]
    TooFewAnnotators { required: usize, got: usize },

    #[error("invalid annotator name '{0}': use letters, digits, '-' or '_' (and not the '_backup' suffix)")]
    InvalidName(String),

    #[error("annotator name '{name}' is ambiguous: {reason}")]
    AmbiguousName { name: String, reason: String },

    #[error("no {what} found at {}; run `annotator {command}` first", .path.display())]
    MissingManifest {
        what: &'static str,
        command: &'static str,
        path: PathBuf,
    },

    #[error("no phase {phase} assignment for annotator '{annotator}'")]
    NoAssignment { annotator: String, phase: u8 },

    #[error("configuration error: {0}")]
    Configuration(String),

    // === Data errors ===
    #[error("record file missing: {}", .0.display())]
    MissingRecord(PathBuf),

    #[error("malformed file {}: {source}", .path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("label vocabulary mismatch for annotator '{annotator}' on document {document_id}: {details}")]
    VocabularyMismatch {
        annotator: String,
        document_id: u32,
        details: String,
    },

    #[error("insufficient overlap: {0}")]
    InsufficientOverlap(String),

    #[error("corpus error: {0}")]
    Corpus(String),

    // === Input errors ===
    #[error("invalid mode '{0}': enter 1 (initial annotation) or 2 (re-annotation)")]
    InvalidMode(String),

    #[error("invalid choice '{0}': enter 1-20, 's' to skip, 'h' for help or 'q' to quit")]
    InvalidChoice(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl AnnotatorError {
    /// Whether a session should re-prompt instead of aborting.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            AnnotatorError::InvalidName(_)
                | AnnotatorError::InvalidMode(_)
                | AnnotatorError::InvalidChoice(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, AnnotatorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_errors_are_recoverable() {
        assert!(AnnotatorError::InvalidMode("3".to_string()).is_input_error());
        assert!(AnnotatorError::InvalidChoice("x".to_string()).is_input_error());
        assert!(!AnnotatorError::InsufficientOverlap("none".to_string()).is_input_error());
    }

    #[test]
    fn test_insufficient_documents_message() {
        let err = AnnotatorError::InsufficientDocuments {
            annotators: 3,
            batch_size: 100,
            required: 300,
            available: 250,
        };
        let message = err.to_string();
        assert!(message.contains("300"));
        assert!(message.contains("250"));
    }
}
