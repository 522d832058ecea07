//! Core error types for orm-rs.
//!
//! This module provides the error enum [`OrmError`] shared by every crate in the
//! workspace. Variants are grouped by the kind of mistake they report
//! (configuration, key completeness, references, types) plus the driver and
//! environment errors that are passed through from the outside world.

use thiserror::Error;

/// Coarse classification of an [`OrmError`].
///
/// Every kind is fatal for the operation that raised it; the classification
/// only tells the caller where to look for the cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed relation declarations or unsupported operations.
    Configuration,
    /// A primary or foreign key component is missing.
    KeyCompleteness,
    /// An unregistered class, alias, column or relation was referenced.
    Reference,
    /// A value of the wrong kind was supplied.
    Type,
    /// The connection or driver failed.
    Driver,
    /// Settings files, IO and (de)serialization.
    Environment,
}

/// The primary error type for orm-rs.
///
/// # Examples
///
/// ```
/// use orm_rs_core::error::{ErrorKind, OrmError};
///
/// let err = OrmError::IncompletePrimaryKey("Missing primary key id".into());
/// assert_eq!(err.kind(), ErrorKind::KeyCompleteness);
/// assert_eq!(err.to_string(), "Incomplete primary key: Missing primary key id");
/// ```
#[derive(Error, Debug)]
pub enum OrmError {
    // ── Configuration ────────────────────────────────────────────────

    /// A relation or entity declaration is malformed or ambiguous.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The relation does not support the requested operation.
    #[error("Invalid relation: {0}")]
    InvalidRelation(String),

    /// A class or table name cannot be resolved.
    #[error("Invalid name: {0}")]
    InvalidName(String),

    // ── Key completeness ─────────────────────────────────────────────

    /// A primary key or foreign key component is null or absent.
    #[error("Incomplete primary key: {0}")]
    IncompletePrimaryKey(String),

    // ── References ───────────────────────────────────────────────────

    /// A class was referenced in an expression before it was joined.
    #[error("Not joined: {0}")]
    NotJoined(String),

    /// The entity type declares no relation with this name.
    #[error("Undefined relation: {0}")]
    UndefinedRelation(String),

    /// The column is not known to the entity type.
    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    // ── Types ────────────────────────────────────────────────────────

    /// The value has the wrong type for this attribute or relation.
    #[error("Invalid type: {0}")]
    InvalidType(String),

    /// An argument is outside of what the operation accepts.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A non-scalar value was passed where a scalar literal is required.
    #[error("Not scalar: {0}")]
    NotScalar(String),

    // ── Driver ───────────────────────────────────────────────────────

    /// The entity manager has no usable connection.
    #[error("No connection: {0}")]
    NoConnection(String),

    /// The database rejected a statement.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// An operational database error (connection failure, etc.).
    #[error("Operational error: {0}")]
    OperationalError(String),

    // ── Environment ──────────────────────────────────────────────────

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// An error occurred during serialization or deserialization.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl OrmError {
    /// Returns the kind of this error.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidConfiguration(_) | Self::InvalidRelation(_) | Self::InvalidName(_) => {
                ErrorKind::Configuration
            }
            Self::IncompletePrimaryKey(_) => ErrorKind::KeyCompleteness,
            Self::NotJoined(_) | Self::UndefinedRelation(_) | Self::UnknownColumn(_) => {
                ErrorKind::Reference
            }
            Self::InvalidType(_) | Self::InvalidArgument(_) | Self::NotScalar(_) => ErrorKind::Type,
            Self::NoConnection(_) | Self::DatabaseError(_) | Self::OperationalError(_) => {
                ErrorKind::Driver
            }
            Self::ConfigurationError(_) | Self::SerializationError(_) | Self::IoError(_) => {
                ErrorKind::Environment
            }
        }
    }
}

/// A convenience type alias for `Result<T, OrmError>`.
pub type OrmResult<T> = Result<T, OrmError>;
