use thiserror::Error;

/// All errors that can occur in medguard.
#[derive(Debug, Error)]
pub enum MedGuardError {
    // --- Crypto errors ---
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Malformed ciphertext: {0}")]
    MalformedCiphertext(String),

    #[error("HMAC verification failed: ciphertext tampered or wrong MAC key")]
    IntegrityFailure,

    #[error("Decryption failed: invalid padding or wrong cipher key")]
    PaddingOrKeyError,

    // --- Codec errors ---
    #[error("Unsupported value type: {0}")]
    UnsupportedType(String),

    #[error("{count} field(s) could not be decrypted (first: {first})")]
    PartialDecryption { count: usize, first: String },

    // --- Storage errors ---
    #[error("Storage error: {0}")]
    TransientStorageError(String),

    #[error("Medication '{0}' not found")]
    MedicationNotFound(String),

    #[error("User '{0}' not found")]
    UserNotFound(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    // --- Config errors ---
    #[error("Config error: {0}")]
    ConfigError(String),

    // --- IO errors ---
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // --- Serialization errors ---
    #[error("Serialization error: {0}")]
    SerializationError(String),

    // --- Notification log errors ---
    #[error("Audit error: {0}")]
    AuditError(String),

    // --- CLI errors ---
    #[error("Command failed: {0}")]
    CommandFailed(String),
}

/// Coarse classification of an error, for choosing log-only vs alerting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Stored data cannot be decoded at all. Never retried.
    Malformed,
    /// Tag mismatch or bad padding: tampering or a wrong key.
    Tampered,
    /// Caller handed the codec something it cannot represent.
    Unsupported,
    /// Storage hiccup; the next reconciler tick retries.
    Transient,
    /// Missing rows, bad input, bad configuration.
    Invalid,
    /// Anything local to the process (IO, serialization, entropy).
    Internal,
}

impl MedGuardError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MalformedCiphertext(_) => ErrorKind::Malformed,
            Self::IntegrityFailure | Self::PaddingOrKeyError | Self::PartialDecryption { .. } => {
                ErrorKind::Tampered
            }
            Self::UnsupportedType(_) => ErrorKind::Unsupported,
            Self::TransientStorageError(_) => ErrorKind::Transient,
            Self::MedicationNotFound(_)
            | Self::UserNotFound(_)
            | Self::InvalidRecord(_)
            | Self::ConfigError(_)
            | Self::CommandFailed(_) => ErrorKind::Invalid,
            Self::EncryptionFailed(_)
            | Self::Io(_)
            | Self::SerializationError(_)
            | Self::AuditError(_) => ErrorKind::Internal,
        }
    }
}

impl From<rusqlite::Error> for MedGuardError {
    fn from(e: rusqlite::Error) -> Self {
        Self::TransientStorageError(e.to_string())
    }
}

/// Convenience type alias for medguard results.
pub type Result<T> = std::result::Result<T, MedGuardError>;
