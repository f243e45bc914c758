use std::fmt::{Display, Formatter};

/// Result type used by the model crate.
pub type Result<T> = std::result::Result<T, ModelError>;

/// Errors produced when constructing validated model values.
///
/// Authority-facing input never surfaces these to callers of the sync
/// protocol; a failed parse degrades to a silently dropped message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    InvalidRational { num: i32, den: i32 },
    InvalidVideoRef { raw: String },
}

impl Display for ModelError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidRational { num, den } => write!(f, "invalid rational {num}/{den}"),
            Self::InvalidVideoRef { raw } => write!(f, "invalid video reference: {raw:?}"),
        }
    }
}

impl std::error::Error for ModelError {}
