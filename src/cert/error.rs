// src/cert/error.rs
use openssl::error::ErrorStack;
use std::{io, path::PathBuf};

pub type Result<T> = std::result::Result<T, PkiError>;

/// Coarse classification of a [`PkiError`], used by callers that only need to
/// branch on the kind (e.g. "absent, generate it" vs. "abort the pass").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    KeyGeneration,
    Parse,
    Format,
    Decryption,
    Precondition,
    NotFound,
    Io,
    Crypto,
}

#[derive(Debug)]
pub enum PkiError {
    Validation(String),
    KeyGeneration(String),
    Parse(String),
    Format(String),
    Decryption(String),
    Precondition(String),
    NotFound(PathBuf),
    Io(io::Error),
    Crypto(ErrorStack),
}

impl PkiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::KeyGeneration(_) => ErrorKind::KeyGeneration,
            Self::Parse(_) => ErrorKind::Parse,
            Self::Format(_) => ErrorKind::Format,
            Self::Decryption(_) => ErrorKind::Decryption,
            Self::Precondition(_) => ErrorKind::Precondition,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Io(_) => ErrorKind::Io,
            Self::Crypto(_) => ErrorKind::Crypto,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

impl std::fmt::Display for PkiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(s) => write!(f, "Validation Error: {}", s),
            Self::KeyGeneration(s) => write!(f, "Key Generation Error: {}", s),
            Self::Parse(s) => write!(f, "Parse Error: {}", s),
            Self::Format(s) => write!(f, "Format Error: {}", s),
            Self::Decryption(s) => write!(f, "Decryption Error: {}", s),
            Self::Precondition(s) => write!(f, "Precondition Error: {}", s),
            Self::NotFound(p) => write!(f, "File not found: {}", p.display()),
            Self::Io(e) => write!(f, "IO Error: {}", e),
            Self::Crypto(e) => write!(f, "OpenSSL Error: {}", e),
        }
    }
}

impl std::error::Error for PkiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Crypto(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for PkiError {
    fn from(error: io::Error) -> Self {
        PkiError::Io(error)
    }
}

impl From<ErrorStack> for PkiError {
    fn from(error: ErrorStack) -> Self {
        PkiError::Crypto(error)
    }
}

impl From<PkiError> for io::Error {
    fn from(error: PkiError) -> Self {
        match error {
            PkiError::Io(e) => e,
            PkiError::NotFound(p) => io::Error::new(
                io::ErrorKind::NotFound,
                format!("File not found: {}", p.display()),
            ),
            other => io::Error::new(io::ErrorKind::Other, other.to_string()),
        }
    }
}
