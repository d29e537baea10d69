use thiserror::Error;

use crate::channel::types::{Hash256, PeerId};

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
    /// The remote peer sent something malformed or out of range.
    #[error("invalid message from peer: {0}")]
    Validation(String),
    #[error("invalid commitment signature")]
    Signature,
    #[error("timed out waiting for remote peer's response")]
    Timeout,
    #[error("unable to establish connection to remote peer {0}")]
    UnreachablePeer(PeerId),
    #[error("insufficient funds")]
    InsufficientFunds,
    #[error("channel {0:x} not found")]
    ChannelNotFound(Hash256),
    #[error("channel is not open")]
    ChannelNotOpen,
    /// The remote peer replied with an Error message of its own.
    #[error("remote peer responded with error: {0}")]
    Remote(String),
    #[error("remote peer sent unexpected {0} message")]
    UnexpectedMessage(&'static str),
    #[error("both outputs are below the dust limit")]
    OutputsBelowDust,
    #[error("fee exceeds output value")]
    FeeExceedsBalance,
    #[error("wire codec error: {0}")]
    Codec(#[from] bincode::Error),
    #[error("secp error: {0}")]
    Secp(#[from] secp256k1::Error),
    #[error("store error: {0}")]
    Store(#[from] rocksdb::Error),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
