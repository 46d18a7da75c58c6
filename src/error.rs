//! Error types for schema compilation and request resolution.
//!
//! Build-time problems surface as [`CompileError`] before any GraphQL type
//! is registered. Request-time problems surface as [`ResolveError`] and are
//! attached to the GraphQL response with a stable `code` extension so
//! clients can branch on the failure kind without parsing messages.

use async_graphql::ErrorExtensions;
use thiserror::Error;

/// Failure while validating descriptors or assembling the GraphQL schema.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("duplicate table `{0}`")]
    DuplicateTable(String),

    #[error("table `{table}` declares column `{column}` more than once")]
    DuplicateColumn { table: String, column: String },

    #[error("table `{table}` declares relation `{relation}` more than once")]
    DuplicateRelation { table: String, relation: String },

    #[error("relation `{relation}` on `{table}` references unknown table `{target}`")]
    UnknownRelationTarget {
        table: String,
        relation: String,
        target: String,
    },

    #[error("relation `{relation}` on `{table}` joins through unknown column `{column}`")]
    UnknownJoinColumn {
        table: String,
        relation: String,
        column: String,
    },

    #[error(
        "relation `{relation}` on `{table}` joins `{owning}` to `{target}` which have incompatible types"
    )]
    IncompatibleJoin {
        table: String,
        relation: String,
        owning: String,
        target: String,
    },

    #[error("relation `{relation}` on `{table}` has no join predicate")]
    EmptyJoin { table: String, relation: String },

    #[error("relation `{relation}` on `{table}` collides with a column of the same name")]
    RelationColumnClash { table: String, relation: String },

    #[error("`{0}` is not a valid GraphQL name")]
    InvalidName(String),

    #[error("enum column `{table}`.`{column}` has no variants")]
    EmptyEnum { table: String, column: String },

    #[error("schema build failed: {0}")]
    Build(String),
}

/// Request-time failure, surfaced as a GraphQL error with a stable `code`.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// Input failed a static shape check (missing required column, unknown
    /// column in `values`/`set`/`orderBy`). Reported before any database
    /// contact.
    #[error("{0}")]
    Validation(String),

    /// Malformed argument tree (unknown operator, bad enum variant, invalid
    /// pagination bound). Reported before any database contact.
    #[error("{0}")]
    Argument(String),

    /// A value could not be marshaled between its GraphQL and database
    /// representations.
    #[error("{0}")]
    Codec(String),

    /// The executor failed; its category is preserved on the wire.
    #[error("{0}")]
    Database(#[from] ExecutorError),
}

impl ResolveError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn argument(message: impl Into<String>) -> Self {
        Self::Argument(message.into())
    }

    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec(message.into())
    }

    /// The stable wire code for this failure kind.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "ValidationError",
            Self::Argument(_) => "ArgumentError",
            Self::Codec(_) => "CodecError",
            Self::Database(_) => "DatabaseError",
        }
    }
}

impl ErrorExtensions for ResolveError {
    fn extend(&self) -> async_graphql::Error {
        async_graphql::Error::new(self.to_string()).extend_with(|_, e| {
            e.set("code", self.code());
            if let Self::Database(err) = self {
                e.set("category", err.category.as_str());
            }
        })
    }
}

/// Error category reported by an [`Executor`](crate::executor::Executor).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Constraint,
    Connection,
    Timeout,
    Other,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Constraint => "constraint",
            Self::Connection => "connection",
            Self::Timeout => "timeout",
            Self::Other => "other",
        }
    }
}

/// Failure reported by the database executor. The message is passed through
/// verbatim; the category survives into the GraphQL error extensions.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ExecutorError {
    pub category: ErrorCategory,
    pub message: String,
}

impl ExecutorError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
        }
    }

    pub fn constraint(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Constraint, message)
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Connection, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Timeout, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Other, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stable_codes() {
        assert_eq!(ResolveError::validation("x").code(), "ValidationError");
        assert_eq!(ResolveError::argument("x").code(), "ArgumentError");
        assert_eq!(ResolveError::codec("x").code(), "CodecError");
        assert_eq!(
            ResolveError::from(ExecutorError::timeout("x")).code(),
            "DatabaseError"
        );
    }

    #[test]
    fn test_database_error_keeps_category() {
        let err = ResolveError::from(ExecutorError::constraint("UNIQUE violated"));
        let gql = err.extend();
        assert_eq!(gql.message, "UNIQUE violated");
    }
}
