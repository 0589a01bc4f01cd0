//! Error types and `Result` alias for the verifier crate.
//!
//! `ErrorCode` mirrors the small set of status codes a host database engine
//! would already have lying around (`Corrupt`, `IoErr`, `Internal`, ...); the
//! verifier maps every structural problem it finds onto `ErrorCode::Corrupt`
//! and carries the specific reason in `VerifyErrorKind` so callers can match
//! on it without parsing the message string.

use std::fmt;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse status code, in the spirit of a host engine's unified result code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Ok,
    Error,
    Internal,
    Perm,
    Abort,
    Busy,
    Locked,
    NoMem,
    ReadOnly,
    Interrupt,
    IoErr,
    Corrupt,
    NotFound,
    Full,
    CantOpen,
    Protocol,
    Empty,
    Schema,
    TooBig,
    Constraint,
    Mismatch,
    Misuse,
    NoLfs,
    Auth,
    Format,
    Range,
    NotADb,
    Notice,
    Warning,
    Row,
    Done,
}

/// Distinguishes the structural problems the verifier can report (see the
/// error handling design section of the spec). All of these carry
/// `ErrorCode::Corrupt` internally -- the kind is what lets a caller match
/// on the specific failure without parsing the message string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyErrorKind {
    FileTooLarge,
    EndOfPage,
    EndOfFile,
    DuplicateCoverage,
    MissingCoverage,
    TypePageMismatch,
    BadLength,
    IllegalType,
    BadHeader,
    DescriptorMismatch,
    BadDeleteFormat,
    BadRccCount,
    MisorderedItems,
    BoundaryViolation,
    LevelMismatch,
    RecordCountMismatch,
    StartRecnoMismatch,
    OverflowSizeMismatch,
    OverflowEmpty,
    OverflowTrailingGarbage,
}

impl VerifyErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            VerifyErrorKind::FileTooLarge => "file-too-large",
            VerifyErrorKind::EndOfPage => "end-of-page",
            VerifyErrorKind::EndOfFile => "end-of-file",
            VerifyErrorKind::DuplicateCoverage => "duplicate-coverage",
            VerifyErrorKind::MissingCoverage => "missing-coverage",
            VerifyErrorKind::TypePageMismatch => "type/page-mismatch",
            VerifyErrorKind::BadLength => "bad-length",
            VerifyErrorKind::IllegalType => "illegal-type",
            VerifyErrorKind::BadHeader => "bad-header",
            VerifyErrorKind::DescriptorMismatch => "descriptor-mismatch",
            VerifyErrorKind::BadDeleteFormat => "bad-delete-format",
            VerifyErrorKind::BadRccCount => "bad-rcc-count",
            VerifyErrorKind::MisorderedItems => "misordered-items",
            VerifyErrorKind::BoundaryViolation => "boundary-violation",
            VerifyErrorKind::LevelMismatch => "level-mismatch",
            VerifyErrorKind::RecordCountMismatch => "record-count-mismatch",
            VerifyErrorKind::StartRecnoMismatch => "start-recno-mismatch",
            VerifyErrorKind::OverflowSizeMismatch => "overflow-size-mismatch",
            VerifyErrorKind::OverflowEmpty => "overflow-empty",
            VerifyErrorKind::OverflowTrailingGarbage => "overflow-trailing-garbage",
        }
    }
}

impl fmt::Display for VerifyErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error value returned by fallible operations in this crate.
#[derive(Debug, Clone)]
pub struct Error {
    pub code: ErrorCode,
    pub kind: Option<VerifyErrorKind>,
    pub message: String,
}

impl Error {
    /// Plain error carrying only a status code, no verifier-specific kind.
    pub fn new(code: ErrorCode) -> Self {
        Self {
            code,
            kind: None,
            message: String::new(),
        }
    }

    /// A structural verification failure. Always maps to `ErrorCode::Corrupt`.
    pub fn verify(kind: VerifyErrorKind, message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::Corrupt,
            kind: Some(kind),
            message: message.into(),
        }
    }

    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            kind: None,
            message: message.into(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            Some(kind) => write!(f, "{}: {}", kind, self.message),
            None => write!(f, "{:?}: {}", self.code, self.message),
        }
    }
}

impl std::error::Error for Error {}
