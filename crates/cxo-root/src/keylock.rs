use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use cxo_crypto::PublicKey;

use crate::error::{RootError, RootResult};

/// One exclusive token per owner key.
///
/// Finalizing or ingesting a root for a key holds that key's token, so
/// chain updates for one key are serialized while different keys proceed
/// in parallel. Tokens nobody holds are dropped on the next request.
#[derive(Debug, Default)]
pub(crate) struct KeyLocks {
    locks: Mutex<HashMap<PublicKey, Arc<Mutex<()>>>>,
}

impl KeyLocks {
    pub(crate) fn token(&self, key: &PublicKey) -> RootResult<Arc<Mutex<()>>> {
        let mut locks = self.locks.lock().map_err(|_| RootError::LockPoisoned)?;
        locks.retain(|_, token| Arc::strong_count(token) > 1);
        Ok(Arc::clone(locks.entry(*key).or_default()))
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().map(|locks| locks.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cxo_crypto::SecretKey;

    #[test]
    fn same_key_shares_token() {
        let locks = KeyLocks::default();
        let a = SecretKey::generate().public_key();
        let b = SecretKey::generate().public_key();
        assert!(Arc::ptr_eq(&locks.token(&a).unwrap(), &locks.token(&a).unwrap()));
        assert!(!Arc::ptr_eq(&locks.token(&a).unwrap(), &locks.token(&b).unwrap()));
    }

    #[test]
    fn released_tokens_are_dropped() {
        let locks = KeyLocks::default();
        let held = SecretKey::generate().public_key();
        let token = locks.token(&held).unwrap();
        for _ in 0..16 {
            drop(locks.token(&SecretKey::generate().public_key()).unwrap());
        }
        assert_eq!(locks.len(), 2);

        // A held token survives pruning and is still the one handed out.
        assert!(Arc::ptr_eq(&token, &locks.token(&held).unwrap()));
        drop(token);
        drop(locks.token(&SecretKey::generate().public_key()).unwrap());
        assert_eq!(locks.len(), 1);
    }
}
