use cxo_types::Hash;

/// A link in one owner's chain of roots.
pub trait ChainLink {
    /// Position of the link in its chain (0 for the first root).
    fn seq(&self) -> u64;
    /// Hash of the previous link's encoding (`None` for seq 0).
    fn prev_hash(&self) -> Option<Hash>;
    /// Hash of this link's own encoding.
    fn link_hash(&self) -> Hash;
}

/// Verifier for `Seq`/`PrevHash` links between roots.
///
/// A valid chain has strictly consecutive sequence numbers and every link
/// names the hash of the link before it. Only the first root of a chain
/// (seq 0) may have no previous hash. Signatures are checked separately.
pub struct ChainVerifier;

impl ChainVerifier {
    /// Verify that `next` may directly follow `prev`.
    ///
    /// With no `prev` (no local history) only the genesis rule is checked:
    /// seq 0 must not carry a previous hash and later roots must carry one.
    pub fn verify_link<L: ChainLink>(prev: Option<&L>, next: &L) -> Result<(), ChainError> {
        let Some(prev) = prev else {
            return Self::verify_genesis_rule(next);
        };

        let expected = prev.seq() + 1;
        if next.seq() != expected {
            return Err(ChainError::SequenceGap {
                expected,
                got: next.seq(),
            });
        }
        match next.prev_hash() {
            Some(hash) if hash == prev.link_hash() => Ok(()),
            Some(_) => Err(ChainError::BrokenLink { seq: next.seq() }),
            None => Err(ChainError::MissingPrevHash { seq: next.seq() }),
        }
    }

    /// Verify a contiguous run of links, ordered by seq.
    ///
    /// The run may start anywhere in the chain; history before the first
    /// link is not required.
    pub fn verify_chain<L: ChainLink>(links: &[L]) -> Result<(), ChainError> {
        let Some(first) = links.first() else {
            return Ok(());
        };
        Self::verify_genesis_rule(first)?;
        for pair in links.windows(2) {
            Self::verify_link(Some(&pair[0]), &pair[1])?;
        }
        Ok(())
    }

    fn verify_genesis_rule<L: ChainLink>(link: &L) -> Result<(), ChainError> {
        match (link.seq(), link.prev_hash()) {
            (0, Some(_)) => Err(ChainError::GenesisHasPrevHash),
            (0, None) => Ok(()),
            (seq, None) => Err(ChainError::MissingPrevHash { seq }),
            (_, Some(_)) => Ok(()),
        }
    }
}

/// Errors from chain verification.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ChainError {
    #[error("first root has a previous hash (should be None)")]
    GenesisHasPrevHash,

    #[error("broken link at seq {seq}: prev_hash does not match")]
    BrokenLink { seq: u64 },

    #[error("missing prev_hash at seq {seq}")]
    MissingPrevHash { seq: u64 },

    #[error("sequence gap: expected seq {expected}, got {got}")]
    SequenceGap { expected: u64, got: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestLink {
        seq: u64,
        prev: Option<Hash>,
        hash: Hash,
    }

    impl ChainLink for TestLink {
        fn seq(&self) -> u64 {
            self.seq
        }
        fn prev_hash(&self) -> Option<Hash> {
            self.prev
        }
        fn link_hash(&self) -> Hash {
            self.hash
        }
    }

    fn build_chain(count: u64) -> Vec<TestLink> {
        let mut chain = Vec::new();
        let mut prev = None;
        for seq in 0..count {
            let hash = Hash::sum(format!("root-{seq}").as_bytes());
            chain.push(TestLink { seq, prev, hash });
            prev = Some(hash);
        }
        chain
    }

    #[test]
    fn empty_chain_is_valid() {
        let chain: Vec<TestLink> = vec![];
        assert!(ChainVerifier::verify_chain(&chain).is_ok());
    }

    #[test]
    fn multi_link_chain() {
        assert!(ChainVerifier::verify_chain(&build_chain(10)).is_ok());
    }

    #[test]
    fn chain_may_start_mid_history() {
        let chain = build_chain(6);
        assert!(ChainVerifier::verify_chain(&chain[3..]).is_ok());
    }

    #[test]
    fn genesis_with_prev_hash_fails() {
        let mut chain = build_chain(1);
        chain[0].prev = Some(Hash::sum(b"bogus"));
        assert_eq!(
            ChainVerifier::verify_chain(&chain).unwrap_err(),
            ChainError::GenesisHasPrevHash
        );
    }

    #[test]
    fn broken_link_detected() {
        let mut chain = build_chain(3);
        chain[2].prev = Some(Hash::sum(b"wrong"));
        assert_eq!(
            ChainVerifier::verify_chain(&chain).unwrap_err(),
            ChainError::BrokenLink { seq: 2 }
        );
    }

    #[test]
    fn missing_prev_hash_detected() {
        let mut chain = build_chain(3);
        chain[1].prev = None;
        assert_eq!(
            ChainVerifier::verify_chain(&chain).unwrap_err(),
            ChainError::MissingPrevHash { seq: 1 }
        );
    }

    #[test]
    fn sequence_gap_detected() {
        let chain = build_chain(4);
        assert_eq!(
            ChainVerifier::verify_link(Some(&chain[0]), &chain[2]).unwrap_err(),
            ChainError::SequenceGap {
                expected: 1,
                got: 2
            }
        );
    }

    #[test]
    fn link_without_history_checks_genesis_rule_only() {
        let chain = build_chain(5);
        assert!(ChainVerifier::verify_link(None, &chain[0]).is_ok());
        assert!(ChainVerifier::verify_link(None, &chain[4]).is_ok());
        let orphan = TestLink {
            seq: 4,
            prev: None,
            hash: Hash::sum(b"orphan"),
        };
        assert_eq!(
            ChainVerifier::verify_link(None, &orphan).unwrap_err(),
            ChainError::MissingPrevHash { seq: 4 }
        );
    }
}
