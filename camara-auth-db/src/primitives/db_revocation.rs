use camara_auth::primitives::revocation::{Revocation, RevocationError};
use crate::db_service::DataSource;
use chrono::Duration;
use log::warn;
use r2d2_redis::redis::RedisError;

/// Revocation marks in a store shared between all gateway instances.
///
/// The mark is a bare key derived from the signed token string, written
/// with `SETEX` so the store itself drops it once the token would have
/// expired anyway. Existence checks and writes are atomic single commands,
/// concurrent validation and revocation across instances need no further
/// coordination.
pub struct DBRevocation {
    /// The datasource marks are written to.
    pub repo: DataSource,
}

impl DBRevocation {
    /// Create a revocation store over a redis connection pool.
    pub fn new(
        url: &str, max_pool_size: u32, client_prefix: &str, revoked_prefix: &str,
    ) -> Result<Self, RedisError> {
        let repo = DataSource::new(url, max_pool_size, client_prefix, revoked_prefix)?;
        Ok(DBRevocation { repo })
    }

    /// Wrap an already opened datasource.
    pub fn with_source(repo: DataSource) -> Self {
        DBRevocation { repo }
    }
}

impl Revocation for DBRevocation {
    fn mark_revoked(&mut self, token: &str, ttl: Duration) -> Result<(), RevocationError> {
        if ttl <= Duration::zero() {
            return Err(RevocationError::Expired);
        }

        self.repo
            .set_revoked(token, ttl.num_seconds() as usize)
            .map_err(|err| {
                warn!("writing a revocation mark failed: {}", err);
                RevocationError::PrimitiveError
            })
    }

    fn is_revoked(&self, token: &str) -> Result<bool, RevocationError> {
        self.repo.is_revoked(token).map_err(|err| {
            warn!("querying a revocation mark failed: {}", err);
            RevocationError::PrimitiveError
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camara_auth::primitives::assertion::Assertion;
    use camara_auth::primitives::issuer::{AuthorizationService, Issuer};
    use camara_auth::primitives::scope::ScopeSet;

    #[test]
    fn shared_revocation_overlay() {
        let url = match crate::redis_url_for_tests() {
            Some(url) => url,
            None => return,
        };

        let source = DataSource::new(&url, 4, "client:", "revoked_token:").unwrap();
        let revocations = DBRevocation::with_source(source);
        let mut service = AuthorizationService::new(Assertion::ephemeral(), revocations);

        let issued = service
            .issue_two_legged("my_application", ScopeSet::new(), None)
            .unwrap();

        assert!(service.validate(&issued.token).is_some());
        assert!(service.revoke(&issued.token));
        assert!(service.validate(&issued.token).is_none());

        // A second revocation still answers true, the mark is just refreshed.
        assert!(service.revoke(&issued.token));
    }

    #[test]
    fn expired_tokens_are_not_marked() {
        let url = match crate::redis_url_for_tests() {
            Some(url) => url,
            None => return,
        };

        let revocations = DBRevocation::new(&url, 4, "client:", "revoked_token:").unwrap();
        let mut service = AuthorizationService::new(Assertion::ephemeral(), revocations);

        let issued = service
            .issue_two_legged("my_application", ScopeSet::new(), Some(chrono::Duration::seconds(-5)))
            .unwrap();
        assert!(!service.revoke(&issued.token));
    }
}
