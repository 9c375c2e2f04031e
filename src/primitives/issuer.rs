//! Issues bearer tokens and decides their continued validity.
//!
//! The issuer is the orchestration point of the crate: it combines the
//! signing codec with the revocation overlay so that a token is usable
//! exactly while its expiry has not passed and no revocation mark exists.
//! Both terminal states look identical from the outside.
use super::assertion::Assertion;
use super::claims::{AccessToken, Claims, TokenType};
use super::device::DeviceSnapshot;
use super::revocation::{Revocation, RevocationError};
use super::scope::ScopeSet;

use chrono::{Duration, Utc};
use log::{debug, warn};

/// Issuers create bearer tokens and decide what presented tokens are worth.
///
/// The issuing methods trust their inputs: client authentication and scope
/// validation have already happened in the request flow by the time a token
/// is minted here. Validation collapses every possible failure (bad
/// signature, expired, revoked, malformed, store unreachable) into a single
/// `None` so that callers can not probe which check failed; the specific
/// cause goes to the operator log only.
pub trait Issuer {
    /// Create a token for a server-to-server grant.
    ///
    /// `ttl` overrides the configured default lifetime for this one token.
    fn issue_two_legged(
        &mut self, client_id: &str, scope: ScopeSet, ttl: Option<Duration>,
    ) -> Result<AccessToken, ()>;

    /// Create a token bound to a consenting user.
    ///
    /// If a device snapshot is given it is embedded verbatim into the token
    /// payload, so later API requests need not resupply the identifiers. A
    /// snapshot without a single identifier is refused.
    fn issue_three_legged(
        &mut self, client_id: &str, scope: ScopeSet, user_id: &str,
        device: Option<DeviceSnapshot>, ttl: Option<Duration>,
    ) -> Result<AccessToken, ()>;

    /// Decide whether the presented token grants anything, and what.
    fn validate(&self, token: &str) -> Option<AccessToken>;

    /// Invalidate a token ahead of its natural expiry.
    ///
    /// Answers false when nothing was revoked, because the token is expired,
    /// unreadable or the store refused the mark. Callers facing clients
    /// should not forward that distinction (the revocation endpoint always
    /// confirms), it exists for operator bookkeeping.
    fn revoke(&mut self, token: &str) -> bool;

    /// Recover the device snapshot embedded in a three-legged token.
    ///
    /// Yields `None` for anything else, including perfectly valid two-legged
    /// tokens.
    fn device_from_token(&self, token: &str) -> Option<DeviceSnapshot> {
        match self.validate(token) {
            Some(ref token) if token.token_type == TokenType::ThreeLegged => token.device.clone(),
            _ => None,
        }
    }
}

/// The service handed to every request handler at startup.
///
/// Constructed once from configuration (signing key, default lifetime,
/// revocation backend) and treated as read-only afterwards apart from the
/// issuing counter; handlers share it by reference. There is deliberately no
/// process-global instance.
pub struct AuthorizationService<R: Revocation> {
    assertion: Assertion,
    revocations: R,
    duration: Duration,
    usage: u64,
}

impl<R: Revocation> AuthorizationService<R> {
    /// Combine a signing codec and a revocation backend.
    ///
    /// Tokens default to a lifetime of 60 minutes, see `valid_for`.
    pub fn new(assertion: Assertion, revocations: R) -> Self {
        AuthorizationService {
            assertion,
            revocations,
            duration: Duration::minutes(60),
            usage: 0,
        }
    }

    /// Set the default validity of all newly issued tokens.
    pub fn valid_for(&mut self, duration: Duration) {
        self.duration = duration;
    }

    fn next_counter(&mut self) -> u64 {
        let next = self.usage.wrapping_add(1);
        self.usage = next;
        next
    }

    fn issue(&mut self, claims: Claims, ttl: Option<Duration>) -> Result<AccessToken, ()> {
        let until = Utc::now() + ttl.unwrap_or(self.duration);
        let counter = self.next_counter();
        let token = self.assertion.sign(counter, &claims, until)?;
        Ok(AccessToken::from_claims(token, claims, until))
    }
}

impl<R: Revocation> Issuer for AuthorizationService<R> {
    fn issue_two_legged(
        &mut self, client_id: &str, scope: ScopeSet, ttl: Option<Duration>,
    ) -> Result<AccessToken, ()> {
        self.issue(Claims::two_legged(client_id, scope), ttl)
    }

    fn issue_three_legged(
        &mut self, client_id: &str, scope: ScopeSet, user_id: &str,
        device: Option<DeviceSnapshot>, ttl: Option<Duration>,
    ) -> Result<AccessToken, ()> {
        if device.as_ref().map_or(false, |device| !device.has_identifier()) {
            return Err(());
        }

        self.issue(Claims::three_legged(client_id, scope, user_id, device), ttl)
    }

    fn validate(&self, token: &str) -> Option<AccessToken> {
        // Revocation is consulted before any signature work, a revoked but
        // well-formed token never reaches the codec.
        match self.revocations.is_revoked(token) {
            Ok(false) => (),
            Ok(true) => {
                debug!("rejected revoked token");
                return None;
            }
            Err(_) => {
                warn!("revocation store unavailable, failing closed");
                return None;
            }
        }

        match self.assertion.extract(token) {
            Ok((claims, until)) => Some(AccessToken::from_claims(token.to_string(), claims, until)),
            Err(cause) => {
                debug!("rejected token: {}", cause);
                None
            }
        }
    }

    fn revoke(&mut self, token: &str) -> bool {
        let until = match self.assertion.extract_expired(token) {
            Ok((_, until)) => until,
            Err(cause) => {
                debug!("revocation of unreadable token ignored: {}", cause);
                return false;
            }
        };

        let remaining = until.signed_duration_since(Utc::now());
        match self.revocations.mark_revoked(token, remaining) {
            Ok(()) => true,
            Err(RevocationError::Expired) => false,
            Err(RevocationError::PrimitiveError) => {
                warn!("revocation store refused a mark");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::revocation::RevocationMap;
    use crate::primitives::scope::Scope;

    fn service() -> AuthorizationService<RevocationMap> {
        AuthorizationService::new(Assertion::ephemeral(), RevocationMap::new())
    }

    fn example_device() -> DeviceSnapshot {
        DeviceSnapshot {
            phone_number: Some("+1234567890".to_string()),
            ..DeviceSnapshot::default()
        }
    }

    #[test]
    fn issue_then_validate_two_legged() {
        let mut service = service();
        let scope: ScopeSet = "device-identifier:retrieve-identifier location-retrieval:read"
            .parse()
            .unwrap();

        let issued = service
            .issue_two_legged("test_client_123", scope.clone(), None)
            .unwrap();
        let validated = service.validate(&issued.token).expect("fresh token invalid");

        assert_eq!(validated.client_id, "test_client_123");
        assert_eq!(validated.scope, scope);
        assert_eq!(validated.token_type, TokenType::TwoLegged);
        assert_eq!(validated.user_id, None);
        assert_eq!(validated.device, None);
    }

    #[test]
    fn issue_then_validate_three_legged() {
        let mut service = service();
        let issued = service
            .issue_three_legged(
                "test_client_456",
                "location-verification:verify".parse().unwrap(),
                "user_789",
                Some(example_device()),
                None,
            )
            .unwrap();

        let validated = service.validate(&issued.token).expect("fresh token invalid");
        assert_eq!(validated.user_id.as_deref(), Some("user_789"));
        assert_eq!(validated.device, Some(example_device()));
    }

    #[test]
    fn device_extraction_respects_token_type() {
        let mut service = service();
        let three = service
            .issue_three_legged(
                "app",
                ScopeSet::new(),
                "user_789",
                Some(example_device()),
                None,
            )
            .unwrap();
        let two = service.issue_two_legged("app", ScopeSet::new(), None).unwrap();

        assert_eq!(service.device_from_token(&three.token), Some(example_device()));
        assert_eq!(service.device_from_token(&two.token), None);
        assert_eq!(service.device_from_token("garbage"), None);
    }

    #[test]
    fn snapshot_without_identifier_is_refused() {
        let mut service = service();
        let empty = DeviceSnapshot::default();
        assert!(service
            .issue_three_legged("app", ScopeSet::new(), "user", Some(empty), None)
            .is_err());

        // No snapshot at all is fine.
        assert!(service
            .issue_three_legged("app", ScopeSet::new(), "user", None, None)
            .is_ok());
    }

    #[test]
    fn expired_token_is_invalid() {
        let mut service = service();
        let issued = service
            .issue_two_legged("app", ScopeSet::new(), Some(Duration::seconds(-5)))
            .unwrap();

        assert!(service.validate(&issued.token).is_none());
        // Indistinguishable from a token that never meant anything.
        assert!(service.validate("no such token").is_none());
    }

    #[test]
    fn revoked_token_is_invalid_before_expiry() {
        let mut service = service();
        let issued = service
            .issue_two_legged("app", "location-retrieval:read".parse().unwrap(), None)
            .unwrap();

        assert!(service.validate(&issued.token).is_some());
        assert!(service.revoke(&issued.token));
        assert!(service.validate(&issued.token).is_none());
        assert!(!issued.is_expired());
    }

    #[test]
    fn revoking_expired_token_is_a_noop() {
        let mut service = service();
        let issued = service
            .issue_two_legged("app", ScopeSet::new(), Some(Duration::minutes(-10)))
            .unwrap();

        assert!(!service.revoke(&issued.token));
        assert!(!service.revoke("not a token at all"));
    }

    #[test]
    fn default_lifetime_is_an_hour() {
        let mut service = service();
        let issued = service.issue_two_legged("app", ScopeSet::new(), None).unwrap();

        let remaining = issued.expires_at.signed_duration_since(Utc::now());
        assert!(remaining > Duration::minutes(59));
        assert!(remaining <= Duration::minutes(60));
    }

    #[test]
    fn lifetime_can_be_reconfigured() {
        let mut service = service();
        service.valid_for(Duration::minutes(5));
        let issued = service.issue_two_legged("app", ScopeSet::new(), None).unwrap();

        let remaining = issued.expires_at.signed_duration_since(Utc::now());
        assert!(remaining <= Duration::minutes(5));

        let explicit = service
            .issue_two_legged("app", ScopeSet::new(), Some(Duration::minutes(30)))
            .unwrap();
        let remaining = explicit.expires_at.signed_duration_since(Utc::now());
        assert!(remaining > Duration::minutes(29));
    }

    #[test]
    fn scope_membership_on_validated_token() {
        let mut service = service();
        let issued = service
            .issue_two_legged(
                "app",
                "location-retrieval:read".parse().unwrap(),
                Some(Duration::minutes(60)),
            )
            .unwrap();

        let validated = service.validate(&issued.token).unwrap();
        assert!(validated.has_scope(Scope::LocationRead));
        assert!(!validated.has_scope(Scope::LocationVerify));
    }

    #[test]
    fn unreachable_store_fails_closed() {
        struct BrokenStore;

        impl Revocation for BrokenStore {
            fn mark_revoked(&mut self, _: &str, _: Duration) -> Result<(), RevocationError> {
                Err(RevocationError::PrimitiveError)
            }

            fn is_revoked(&self, _: &str) -> Result<bool, RevocationError> {
                Err(RevocationError::PrimitiveError)
            }
        }

        let mut service = AuthorizationService::new(Assertion::ephemeral(), BrokenStore);
        let issued = service.issue_two_legged("app", ScopeSet::new(), None).unwrap();

        assert!(service.validate(&issued.token).is_none());
        assert!(!service.revoke(&issued.token));
    }
}
