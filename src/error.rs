//! Error taxonomy
//!
//! Every lifecycle operation resolves to one of four failure classes.
//! `NotFound` is the only one callers are expected to recover from locally.

use std::fmt;
use thiserror::Error;

/// A single configuration problem, tied to the attribute that caused it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub attribute: String,
    pub message: String,
}

impl Diagnostic {
    pub fn new(attribute: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.attribute, self.message)
    }
}

fn join_diagnostics(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Failure of a single lifecycle call
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Bad configuration, caught before any request was sent
    #[error("invalid configuration: {}", join_diagnostics(.0))]
    Validation(Vec<Diagnostic>),

    /// The request never produced an HTTP response
    #[error("network error: {message}")]
    Network { message: String },

    /// NSX answered with a non-success status
    #[error("NSX rejected the request (HTTP {status}): {body}")]
    RemoteRejected { status: u16, body: String },

    /// NSX answered 404 for the object
    #[error("object {id} not found")]
    NotFound { id: String },
}

impl ProviderError {
    pub fn validation(attribute: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation(vec![Diagnostic::new(attribute, message)])
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Host-visible lifecycle step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Validate,
    Create,
    Read,
    Update,
    Delete,
    Exists,
    Import,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validate => "validate",
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Exists => "exists",
            Self::Import => "import",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A [`ProviderError`] annotated with where it happened
#[derive(Debug, Error)]
#[error("{address}: {operation} failed: {source}")]
pub struct OperationError {
    pub address: String,
    pub operation: Operation,
    #[source]
    pub source: ProviderError,
}

impl OperationError {
    pub fn new(address: impl Into<String>, operation: Operation, source: ProviderError) -> Self {
        Self {
            address: address.into(),
            operation,
            source,
        }
    }
}
