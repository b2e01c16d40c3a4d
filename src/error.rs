//! The error taxonomy of SPEC_FULL.md §7: a single structured error type with a kind
//! and a message, never a silently-truncated partial result.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Parse,
    Validation,
    Runtime,
    Firewall,
    ExternalUnavailable,
    ResourceLimit,
}

#[derive(Debug, Error)]
#[error("{kind:?}: {message}")]
pub struct RouterError {
    pub kind: ErrorKind,
    pub message: String,
}

impl RouterError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Parse, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Runtime, message)
    }

    pub fn firewall(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Firewall, message)
    }

    pub fn external_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ExternalUnavailable, message)
    }

    pub fn resource_limit(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ResourceLimit, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

pub type RouterResult<T> = Result<T, RouterError>;
