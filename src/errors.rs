use thiserror::Error;

/// Enumerates high-level errors returned by this library.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Represents an SQL error.
    #[error("SQLx error")]
    Sqlx { source: sqlx::Error },

    /// Represents a failure to hash or verify a password.
    #[error("Password hashing error")]
    PasswordHashing { source: bcrypt::BcryptError },

    /// Represents a required environment variable that is not set.
    #[error("Must define {0} environment variable")]
    MissingVariable(String),

    /// Represents an environment variable that could not be parsed.
    #[error("Could not parse {name} environment variable: {message}")]
    InvalidVariable { name: String, message: String },

    /// Represents a blood type outside the eight ABO/Rh combinations.
    #[error("Invalid blood type {0:?}")]
    InvalidBloodType(String),

    /// Represents a donation kind other than blood or plasma.
    #[error("Invalid donation kind {0:?}")]
    InvalidKind(String),

    /// Represents a quantity that is neither a number nor “all”.
    #[error("Please enter the number of units you wish to have, or simply type \"All\"")]
    MalformedQuantity(String),

    /// Represents a submitted field that fails validation.
    #[error("Invalid {field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    /// Represents a donor or staff email that is already taken.
    #[error("An account with that email already exists")]
    EmailAlreadyExists,

    /// Represents a bank location that is already taken.
    #[error("A bank already exists at that location")]
    LocationAlreadyExists,

    /// Represents a request for a donor that doesn’t exist.
    #[error("No donor with ID {0}")]
    UnknownDonor(i32),

    /// Represents a request for a staff member that doesn’t exist.
    #[error("No staff member with ID {0}")]
    UnknownStaff(i32),

    /// Represents a reference to a bank that doesn’t exist.
    #[error("No bank called {0:?}")]
    UnknownBank(String),

    /// Represents a donor lookup with no match.
    #[error("No matching donor")]
    NoMatchingDonor,

    /// Represents a failed login.
    #[error("Login unsuccessful, please check email and password")]
    InvalidCredentials,

    /// Represents a missing, malformed, or expired session token.
    #[error("Please log in to access this page")]
    Unauthorized,

    /// Represents a missing, used, or expired password reset token.
    #[error("That is an invalid or expired token")]
    InvalidResetToken,

    /// Represents a failure to build or send an email.
    #[error("Mail error: {0}")]
    Mail(String),

    /// Represents a blocking task that panicked or was cancelled.
    #[error("Background task failed")]
    Task { source: tokio::task::JoinError },
}

impl From<sqlx::Error> for BackendError {
    fn from(source: sqlx::Error) -> Self {
        BackendError::Sqlx { source }
    }
}

impl From<bcrypt::BcryptError> for BackendError {
    fn from(source: bcrypt::BcryptError) -> Self {
        BackendError::PasswordHashing { source }
    }
}

impl From<tokio::task::JoinError> for BackendError {
    fn from(source: tokio::task::JoinError) -> Self {
        BackendError::Task { source }
    }
}

impl BackendError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        BackendError::Validation {
            field,
            message: message.into(),
        }
    }
}

