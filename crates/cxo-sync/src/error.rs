use cxo_crypto::PublicKey;
use cxo_root::RootError;
use cxo_types::Hash;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("remote error: {0}")]
    RemoteError(String),

    #[error("remote has no root for feed {0:?}")]
    NoRoot(PublicKey),

    #[error("remote sent a root for {got:?} when asked for {expected:?}")]
    WrongFeed { expected: PublicKey, got: PublicKey },

    #[error("remote sent unrequested object {0:?}")]
    Unrequested(Hash),

    #[error("request timed out after {0} ms")]
    Timeout(u64),

    #[error("local container rejected data: {0}")]
    Local(#[from] RootError),
}

pub type SyncResult<T> = Result<T, SyncError>;
