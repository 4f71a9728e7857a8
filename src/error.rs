use thiserror::Error;

/// Top-level error for every pipeline stage.
///
/// Parse and validation errors bubble to the caller; nothing is written when
/// any stage before the writer fails.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt xref: {0}")]
    CorruptXref(String),

    #[error("corrupt object {object_number}: {reason}")]
    CorruptObject { object_number: u32, reason: String },

    #[error("dangling reference: {0} {1} R")]
    DanglingReference(u32, u16),

    #[error("schema violation at {path}: {reason}")]
    SchemaViolation { path: String, reason: String },

    #[error("unsupported PDF version: {0}")]
    UnsupportedVersion(String),

    #[error("password authentication failed")]
    EncryptionAuthFailed,

    #[error("unsupported security handler: {0}")]
    UnsupportedSecurityHandler(String),

    #[error("encryption key length must be 40, 128 or 256 bits, got {0}")]
    KeyLengthMismatch(u16),

    #[error("page index {index} out of range, document has {count} pages")]
    PageIndexOutOfRange { index: usize, count: usize },

    #[error("rotation must be a multiple of 90, got {0}")]
    InvalidRotation(i64),

    #[error("page span must be at least 1, got {0}")]
    InvalidSpan(usize),

    #[error("conflicting catalog entry on merge: {0}")]
    DuplicateCatalogSlot(String),

    #[error("document is already encrypted")]
    AlreadyEncrypted,

    #[error("document is not encrypted")]
    NotEncrypted,

    #[error("invalid page selection: {0}")]
    InvalidPageSelection(String),

    #[error("attachment not found: {0}")]
    AttachmentNotFound(String),

    #[error(transparent)]
    Filter(#[from] crate::filters::FilterError),

    #[error(transparent)]
    Crypto(#[from] crate::crypto::CryptoError),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
