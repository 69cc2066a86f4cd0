//! Error types for id parsing and validation.

use thiserror::Error;

/// Errors that can occur when parsing or validating ids.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    /// The input string was empty.
    #[error("id cannot be empty")]
    Empty,

    /// A task id was missing the `.` separator between app id and suffix.
    #[error("task id missing '.' separator")]
    MissingSeparator,

    /// An app id contained a character outside `[a-z0-9-]`.
    #[error("invalid app id '{0}': only lowercase letters, digits and '-' are allowed")]
    InvalidAppId(String),

    /// The ULID portion of a task id failed to parse.
    #[error("invalid ulid suffix: {0}")]
    InvalidUlid(String),
}
