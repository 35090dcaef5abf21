use thiserror::Error;

pub type Result<T, E = LopError> = std::result::Result<T, E>;

/// Errors raised while loading or executing lop fragments
#[derive(Debug, Error)]
pub enum LopError {
    /// A path was malformed or could not be used where it was given
    #[error("invalid path `{path}`: {reason}")]
    Path { path: String, reason: String },

    /// A path, label or pattern matched nothing
    #[error("no match for `{0}`")]
    NotFound(String),

    /// A selection pattern or modify expression could not be parsed
    #[error("invalid pattern `{pattern}`: {reason}")]
    Pattern { pattern: String, reason: String },

    #[error("lop `{lop}` has unsupported kind `{compatible}`")]
    UnsupportedOperation { lop: String, compatible: String },

    #[error("no assist registered for `{0}`")]
    UnknownAssist(String),

    #[error("callback `{callback}` failed: {source}")]
    Callback {
        callback: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("assist `{id}` failed on {node}: {source}")]
    Assist {
        id: String,
        node: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("label `{label}` is already attached to {path}")]
    DuplicateLabel { label: String, path: String },

    /// A fragment field was missing or had the wrong shape
    #[error("lop `{lop}` is malformed: {reason}")]
    Malformed { lop: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl LopError {
    pub(crate) fn path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Path {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn pattern(pattern: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Pattern {
            pattern: pattern.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn malformed(lop: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            lop: lop.into(),
            reason: reason.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// An execution failure, carrying how far the fragment got.
///
/// Operations before `index` have already been applied to the tree; there is
/// no rollback.
#[derive(Debug, Error)]
#[error("lop `{lop}` (#{index}) failed after {applied} applied operation(s): {error}")]
pub struct RunError {
    pub lop: String,
    pub index: usize,
    pub applied: usize,
    #[source]
    pub error: LopError,
}
