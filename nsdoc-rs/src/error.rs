//! Defines the two ways in which resolving the documentation of a namespace can fail.
//!
//! We only distinguish an [Import](DocError::Import) error, which signals that the requested name
//! doesn't resolve to a documentable unit (and is therefore reported as **404 Not Found**), and a
//! [Render](DocError::Render) error for everything which went wrong after the name was resolved
//! (reported as **500 Internal Server Error**).
//!
//! As the outcome of a single render is handed to all requests waiting for the same name, the
//! error has to be cloneable. Therefore the underlying cause is kept in an **Arc**.
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Represents a failure when fetching or rendering the documentation of a namespace.
#[derive(Debug, Clone)]
pub enum DocError {
    /// The given name doesn't resolve to a documentable unit.
    Import {
        /// The name which was requested.
        name: String,
        /// The underlying cause reported by the inspector.
        cause: Arc<anyhow::Error>,
    },
    /// The name was resolved, but producing the output failed.
    Render {
        /// The name which was requested.
        name: String,
        /// The underlying cause reported by the renderer.
        cause: Arc<anyhow::Error>,
    },
}

impl DocError {
    /// Creates an import error for the given name.
    pub fn import(name: impl Into<String>, cause: anyhow::Error) -> Self {
        DocError::Import {
            name: name.into(),
            cause: Arc::new(cause),
        }
    }

    /// Creates a render error for the given name.
    pub fn render(name: impl Into<String>, cause: anyhow::Error) -> Self {
        DocError::Render {
            name: name.into(),
            cause: Arc::new(cause),
        }
    }

    /// Returns the name of the namespace which failed.
    pub fn name(&self) -> &str {
        match self {
            DocError::Import { name, .. } | DocError::Render { name, .. } => name,
        }
    }

    /// Determines if this is an import error.
    pub fn is_import(&self) -> bool {
        matches!(self, DocError::Import { .. })
    }

    /// Returns the underlying cause.
    pub fn cause(&self) -> &anyhow::Error {
        match self {
            DocError::Import { cause, .. } | DocError::Render { cause, .. } => cause,
        }
    }
}

impl Display for DocError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DocError::Import { name, cause } => {
                write!(f, "Cannot import '{}': {}", name, cause)
            }
            DocError::Render { name, cause } => {
                write!(f, "Cannot render '{}': {}", name, cause)
            }
        }
    }
}

impl std::error::Error for DocError {}
