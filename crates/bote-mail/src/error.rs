//! Mail error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MailError {
    #[error("Invalid fragment size {size} (must be 1..={max})")]
    InvalidFragmentSize { size: usize, max: usize },

    #[error("Email of {size} bytes needs more than {max} fragments")]
    TooManyFragments { size: usize, max: usize },

    #[error("Corrupt message id cache: {0}")]
    CorruptCache(String),

    #[error("Storage error: {0}")]
    Dht(#[from] bote_dht::DhtError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] bote_protocol::ProtocolError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] bote_crypto::CryptoError),
}

pub type Result<T> = std::result::Result<T, MailError>;
