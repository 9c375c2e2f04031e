//! Records revoked tokens until they would have expired on their own.
use super::Time;

use std::collections::HashMap;

use chrono::{Duration, Utc};

/// The overlay consulted before trusting an otherwise valid token.
///
/// A token is revoked iff a mark for its exact signed string exists in the
/// store. The mark carries no payload of its own, and it never outlives the
/// token: it is written with a time-to-live equal to the remaining token
/// lifetime, after which mark and token lapse together.
///
/// Implementations backing several gateway instances must put the mark in a
/// store shared between them, relying on the store's own atomicity for
/// concurrent readers and writers. The in-process [`RevocationMap`] is for
/// tests and single-instance deployments.
///
/// [`RevocationMap`]: struct.RevocationMap.html
pub trait Revocation {
    /// Mark a token as revoked for the given remaining lifetime.
    ///
    /// A non-positive `ttl` means the token has already expired and there is
    /// nothing left to revoke, implementations answer `Expired` without
    /// touching the store.
    fn mark_revoked(&mut self, token: &str, ttl: Duration) -> Result<(), RevocationError>;

    /// Ask whether a mark for this token exists.
    ///
    /// A store failure is an `Err`, never a silent `false`: the caller on
    /// the validation path fails closed and treats the token as invalid.
    fn is_revoked(&self, token: &str) -> Result<bool, RevocationError>;
}

/// Handled failures of a revocation store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RevocationError {
    /// The token has no lifetime left, revoking it would change nothing.
    Expired,

    /// The underlying store could not be reached or answered garbage.
    PrimitiveError,
}

/// Keeps revocation marks in a process-local hash map.
///
/// The key is the signed token string, the value its original expiry
/// instant. Marks whose instant has passed count as absent and are dropped
/// opportunistically on the next write.
#[derive(Default)]
pub struct RevocationMap {
    revoked: HashMap<String, Time>,
}

impl RevocationMap {
    /// Create an empty store without any marks in it.
    pub fn new() -> RevocationMap {
        RevocationMap::default()
    }

    /// Number of marks currently held, including not yet collected ones.
    pub fn len(&self) -> usize {
        self.revoked.len()
    }

    /// Whether no marks are held at all.
    pub fn is_empty(&self) -> bool {
        self.revoked.is_empty()
    }
}

impl Revocation for RevocationMap {
    fn mark_revoked(&mut self, token: &str, ttl: Duration) -> Result<(), RevocationError> {
        if ttl <= Duration::zero() {
            return Err(RevocationError::Expired);
        }

        let now = Utc::now();
        self.revoked.retain(|_, until| *until > now);
        self.revoked.insert(token.to_string(), now + ttl);
        Ok(())
    }

    fn is_revoked(&self, token: &str) -> Result<bool, RevocationError> {
        match self.revoked.get(token) {
            Some(until) => Ok(*until > Utc::now()),
            None => Ok(false),
        }
    }
}

impl<R: Revocation + ?Sized> Revocation for Box<R> {
    fn mark_revoked(&mut self, token: &str, ttl: Duration) -> Result<(), RevocationError> {
        (**self).mark_revoked(token, ttl)
    }

    fn is_revoked(&self, token: &str) -> Result<bool, RevocationError> {
        (**self).is_revoked(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_and_query() {
        let mut store = RevocationMap::new();
        assert_eq!(store.is_revoked("some.token"), Ok(false));

        store.mark_revoked("some.token", Duration::minutes(10)).unwrap();
        assert_eq!(store.is_revoked("some.token"), Ok(true));
        assert_eq!(store.is_revoked("another.token"), Ok(false));
    }

    #[test]
    fn expired_ttl_is_refused() {
        let mut store = RevocationMap::new();
        assert_eq!(
            store.mark_revoked("some.token", Duration::zero()),
            Err(RevocationError::Expired)
        );
        assert_eq!(
            store.mark_revoked("some.token", Duration::seconds(-30)),
            Err(RevocationError::Expired)
        );
        assert!(store.is_empty());
    }

    #[test]
    fn marks_lapse_with_the_token() {
        let mut store = RevocationMap::new();
        store.mark_revoked("stale.token", Duration::milliseconds(1)).unwrap();

        std::thread::sleep(std::time::Duration::from_millis(5));
        assert_eq!(store.is_revoked("stale.token"), Ok(false));

        // The next write collects the stale mark.
        store.mark_revoked("fresh.token", Duration::minutes(1)).unwrap();
        assert_eq!(store.len(), 1);
    }
}
