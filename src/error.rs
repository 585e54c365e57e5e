use std::sync::Arc;
use thiserror::Error;

use crate::backend::LookupError;

/// Unified error type for the mimir DNS responder
#[derive(Debug, Clone, Error)]
pub enum MimirError {
    // IO errors
    #[error("IO error: {0}")]
    Io(Arc<std::io::Error>),

    // Configuration errors
    #[error("Invalid bind address: {0}")]
    InvalidBindAddress(String),
    #[error("Invalid self IP: {0}")]
    InvalidSelfIp(String),
    #[error("Configuration parse error: {0}")]
    ConfigParse(String),

    // Wire format errors
    #[error("Packet error: {0}")]
    Packet(#[from] crate::dns::ParseError),

    // Key material errors
    #[error("Key file error in {0}: {1}")]
    KeyFile(String, String),
    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    // Signing errors
    #[error("Signing failed: {0}")]
    Signing(String),

    // Backend lookup errors
    #[error(transparent)]
    Lookup(#[from] LookupError),
}

impl From<std::io::Error> for MimirError {
    fn from(err: std::io::Error) -> Self {
        MimirError::Io(Arc::new(err))
    }
}

impl From<openssl::error::ErrorStack> for MimirError {
    fn from(err: openssl::error::ErrorStack) -> Self {
        MimirError::Signing(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MimirError>;
