use std::time::Duration;

/// Error types for the relsync library.
///
/// Classification never produces an error (it returns `Option`); these
/// variants cover the fetch, knowledge-base and configuration paths.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// HTTP request failed at the transport level.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Failed to decode a JSON payload.
    #[error("Failed to parse JSON response: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// IO error while reading config or list files.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or incomplete configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The repository URL could not be turned into an owner/name pair.
    #[error("Invalid repository URL: {0}")]
    InvalidRepoUrl(String),

    /// The upstream answered 404.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Any other non-success status.
    #[error("Unexpected HTTP status {status} for {url}: {body}")]
    UnexpectedStatus {
        status: u16,
        url: String,
        body: String,
    },

    /// The upstream kept rate limiting us past the retry ceiling.
    #[error("Rate limit exceeded, reset in {reset_after:?}")]
    RateLimited { reset_after: Duration },

    /// A tag object carried no tagger/committer date.
    #[error("No date on tag object {0}")]
    MissingDate(String),

    /// A tag ref pointed at an object type we can't date.
    #[error("Unknown type of tag object: {0}")]
    UnknownTagType(String),

    /// The knowledge-base API reported an error.
    #[error("Knowledge base error {code}: {info}")]
    KnowledgeBase {
        code: String,
        info: String,
        /// Message keys attached to the error (e.g. `edit-conflict`).
        messages: Vec<String>,
    },

    /// A value that can't be written to the knowledge base.
    #[error("Cannot write value: {0}")]
    UnsupportedValue(String),

    /// A concurrent external edit collided with ours.
    #[error("Edit conflict on {0}")]
    EditConflict(String),

    /// A project's pass exceeded its time budget.
    #[error("Timed out after {elapsed:?} while syncing {project}")]
    Timeout { project: String, elapsed: Duration },
}

impl SyncError {
    /// True for 404-style responses.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SyncError::NotFound(_))
    }

    /// True when a knowledge-base write lost against a concurrent edit.
    ///
    /// The Wikibase API reports these either with the `editconflict` code or
    /// as a generic save failure whose message list contains `edit-conflict`.
    pub fn is_edit_conflict(&self) -> bool {
        match self {
            SyncError::EditConflict(_) => true,
            SyncError::KnowledgeBase { code, messages, .. } => {
                code == "editconflict" || messages.iter().any(|m| m == "edit-conflict")
            }
            _ => false,
        }
    }
}

/// Convenience Result type for relsync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edit_conflict_from_message_list() {
        let err = SyncError::KnowledgeBase {
            code: "failed-save".to_string(),
            info: "The save has failed.".to_string(),
            messages: vec![
                "wikibase-api-failed-save".to_string(),
                "edit-conflict".to_string(),
            ],
        };
        assert!(err.is_edit_conflict());
    }

    #[test]
    fn test_edit_conflict_from_code() {
        let err = SyncError::KnowledgeBase {
            code: "editconflict".to_string(),
            info: "Edit conflict.".to_string(),
            messages: vec![],
        };
        assert!(err.is_edit_conflict());
        assert!(SyncError::EditConflict("Q1$abc".to_string()).is_edit_conflict());
    }

    #[test]
    fn test_other_errors_are_not_conflicts() {
        let err = SyncError::KnowledgeBase {
            code: "failed-save".to_string(),
            info: "The save has failed.".to_string(),
            messages: vec!["wikibase-api-failed-save".to_string()],
        };
        assert!(!err.is_edit_conflict());
        assert!(!SyncError::NotFound("x".to_string()).is_edit_conflict());
    }

    #[test]
    fn test_is_not_found() {
        assert!(SyncError::NotFound("tags".to_string()).is_not_found());
        assert!(!SyncError::Config("x".to_string()).is_not_found());
    }
}
