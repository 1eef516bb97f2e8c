use std::collections::HashSet;

use cxo_crypto::PublicKey;
use cxo_root::Exchange;
use cxo_types::Hash;

use crate::error::SyncResult;
use crate::types::Negotiation;

/// Computes what to request from a remote so nothing is fetched twice.
pub struct NegotiationEngine;

impl NegotiationEngine {
    /// Wanted hashes not requested before.
    pub fn compute_wants(wanted: &[Hash], requested: &HashSet<Hash>) -> Vec<Hash> {
        let mut seen = HashSet::new();
        wanted
            .iter()
            .filter(|h| !requested.contains(h) && seen.insert(**h))
            .copied()
            .collect()
    }

    /// Wanted hashes that were requested before and are still missing.
    pub fn compute_unavailable(wanted: &[Hash], requested: &HashSet<Hash>) -> Vec<Hash> {
        wanted
            .iter()
            .filter(|h| requested.contains(h))
            .copied()
            .collect()
    }

    /// One round of negotiation for `feed` against the local container.
    pub fn negotiate(
        local: &dyn Exchange,
        feed: &PublicKey,
        requested: &HashSet<Hash>,
    ) -> SyncResult<Negotiation> {
        let wanted = local.enumerate_wanted(feed)?;
        Ok(Negotiation {
            wants: Self::compute_wants(&wanted, requested),
            haves: local.enumerate_available(feed)?,
            unavailable: Self::compute_unavailable(&wanted, requested),
        })
    }
}
