//! Per-name write claims.
//!
//! The striping engine assumes a single writer per logical name. The store
//! takes a claim here before creating stripes so that a second writer (or a
//! reader racing the first) fails fast instead of interleaving with it.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// Table of names currently being written
#[derive(Debug, Clone, Default)]
pub struct NameLocks {
    claims: Arc<DashMap<String, ()>>,
}

impl NameLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `name`, or `None` if someone already holds it
    pub fn try_claim(&self, name: &str) -> Option<NameClaim> {
        match self.claims.entry(name.to_string()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(());
                Some(NameClaim {
                    claims: Arc::clone(&self.claims),
                    name: name.to_string(),
                })
            }
        }
    }

    /// Whether `name` is currently claimed
    pub fn is_claimed(&self, name: &str) -> bool {
        self.claims.contains_key(name)
    }

    /// Number of outstanding claims
    pub fn len(&self) -> usize {
        self.claims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }
}

/// Held claim; released on drop
#[derive(Debug)]
pub struct NameClaim {
    claims: Arc<DashMap<String, ()>>,
    name: String,
}

impl NameClaim {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for NameClaim {
    fn drop(&mut self) {
        self.claims.remove(&self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::thread;

    #[test]
    fn test_claim_is_exclusive_until_dropped() {
        let locks = NameLocks::new();

        let claim = locks.try_claim("foo").unwrap();
        assert!(locks.is_claimed("foo"));
        assert!(locks.try_claim("foo").is_none());
        assert!(locks.try_claim("bar").is_some());

        drop(claim);
        assert!(!locks.is_claimed("foo"));
        assert!(locks.try_claim("foo").is_some());
    }

    #[test]
    fn test_concurrent_claims_have_one_winner() {
        let locks = NameLocks::new();
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = locks.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    // hold the claim until every thread has tried
                    let claim = locks.try_claim("contended");
                    let won = claim.is_some();
                    barrier.wait();
                    won
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
        assert!(locks.is_empty());
    }
}
