use cxo_crypto::PublicKey;
use cxo_types::Hash;
use serde::{Deserialize, Serialize};

/// Limits for one pull.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Upper bound on want/fetch rounds per pull.
    pub max_rounds: usize,
    /// Hashes requested per `fetch_objects` call.
    pub batch_size: usize,
    /// Deadline for a single transport call, in milliseconds.
    pub request_timeout_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_rounds: 64,
            batch_size: 256,
            request_timeout_ms: 30_000,
        }
    }
}

/// Wants and haves for one negotiation round.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Negotiation {
    /// Hashes to request this round.
    pub wants: Vec<Hash>,
    /// Hashes the local side already holds for the feed.
    pub haves: Vec<Hash>,
    /// Hashes still wanted that were requested before and never delivered.
    pub unavailable: Vec<Hash>,
}

#[derive(Clone, Debug)]
pub struct PullResult {
    pub feed: PublicKey,
    /// Whether the remote root became the local head.
    pub root_accepted: bool,
    /// Seq of the remote head.
    pub seq: u64,
    pub rounds: usize,
    pub objects_received: usize,
    pub bytes_transferred: u64,
    /// Whether the local head is now full.
    pub complete: bool,
    /// Hashes the remote could not supply.
    pub unavailable: Vec<Hash>,
}

impl PullResult {
    pub(crate) fn new(feed: PublicKey, seq: u64, root_accepted: bool) -> Self {
        Self {
            feed,
            root_accepted,
            seq,
            rounds: 0,
            objects_received: 0,
            bytes_transferred: 0,
            complete: false,
            unavailable: Vec::new(),
        }
    }
}
