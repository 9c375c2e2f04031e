//! Encapsulates the claims carried by an access token.
use super::Time;
use super::device::DeviceSnapshot;
use super::scope::{Scope, ScopeSet};

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// The two kinds of access tokens this server issues.
///
/// The wire names are part of the token payload and of the contract with the
/// resource handlers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenType {
    /// Issued directly to a client application, no end-user context.
    ///
    /// The client supplies device identifiers in each API request itself.
    #[serde(rename = "2-legged")]
    TwoLegged,

    /// Issued after end-user consent, carrying the user and device context.
    #[serde(rename = "3-legged")]
    ThreeLegged,
}

/// The claims a token commits to, before stamping and signing.
///
/// This is deliberately a tagged structure instead of a loose field bag: a
/// two-legged grant can not carry user or device data, and a three-legged
/// grant always names its user. The codec in [`assertion`] re-establishes
/// these invariants when reading a token back.
///
/// [`assertion`]: ../assertion/index.html
#[derive(Clone, Debug, PartialEq)]
pub enum Claims {
    /// Claims of a client-credentials (server-to-server) grant.
    TwoLegged {
        /// The client the token was issued to.
        client_id: String,

        /// The scope granted to the client.
        scope: ScopeSet,
    },

    /// Claims of a user-consented grant.
    ThreeLegged {
        /// The client the token was issued to.
        client_id: String,

        /// The scope granted to the client.
        scope: ScopeSet,

        /// The user who consented to the grant.
        user_id: String,

        /// Identifiers of the consenting user's device, captured at issuance.
        device: Option<DeviceSnapshot>,
    },
}

impl Claims {
    /// Claims for a token issued directly to a client.
    pub fn two_legged(client_id: &str, scope: ScopeSet) -> Self {
        Claims::TwoLegged {
            client_id: client_id.to_string(),
            scope,
        }
    }

    /// Claims for a token issued on behalf of a consenting user.
    pub fn three_legged(
        client_id: &str, scope: ScopeSet, user_id: &str, device: Option<DeviceSnapshot>,
    ) -> Self {
        Claims::ThreeLegged {
            client_id: client_id.to_string(),
            scope,
            user_id: user_id.to_string(),
            device,
        }
    }

    /// The subject the token speaks for.
    ///
    /// For two-legged tokens this is the client itself, for three-legged
    /// tokens the consenting user.
    pub fn subject(&self) -> &str {
        match self {
            Claims::TwoLegged { client_id, .. } => client_id,
            Claims::ThreeLegged { user_id, .. } => user_id,
        }
    }

    /// The client the token was issued to.
    pub fn client_id(&self) -> &str {
        match self {
            Claims::TwoLegged { client_id, .. } => client_id,
            Claims::ThreeLegged { client_id, .. } => client_id,
        }
    }

    /// The granted scope.
    pub fn scope(&self) -> &ScopeSet {
        match self {
            Claims::TwoLegged { scope, .. } => scope,
            Claims::ThreeLegged { scope, .. } => scope,
        }
    }

    /// The kind of grant these claims describe.
    pub fn token_type(&self) -> TokenType {
        match self {
            Claims::TwoLegged { .. } => TokenType::TwoLegged,
            Claims::ThreeLegged { .. } => TokenType::ThreeLegged,
        }
    }
}

/// An access token as seen by the resource side of the gateway.
///
/// This is a transient view: it is assembled at issuance and reassembled
/// from the signed encoding on every validation, never stored. Only the
/// signed string itself and, after a revocation, the mark in the revocation
/// store persist anywhere.
#[derive(Clone, Debug, PartialEq)]
pub struct AccessToken {
    /// The opaque signed representation, used as a bearer credential.
    pub token: String,

    /// Which kind of grant produced the token.
    pub token_type: TokenType,

    /// Instant after which the token is no longer valid.
    pub expires_at: Time,

    /// The granted scope, always a subset of the issuing client's allowed set.
    pub scope: ScopeSet,

    /// The client the token was issued to.
    pub client_id: String,

    /// The consenting user, present exactly for three-legged tokens.
    pub user_id: Option<String>,

    /// Device snapshot embedded at issuance, three-legged tokens only.
    pub device: Option<DeviceSnapshot>,
}

impl AccessToken {
    /// Assemble the resource-side view from decoded claims.
    pub fn from_claims(token: String, claims: Claims, expires_at: Time) -> Self {
        let token_type = claims.token_type();
        let (client_id, scope, user_id, device) = match claims {
            Claims::TwoLegged { client_id, scope } => (client_id, scope, None, None),
            Claims::ThreeLegged {
                client_id,
                scope,
                user_id,
                device,
            } => (client_id, scope, Some(user_id), device),
        };

        AccessToken {
            token,
            token_type,
            expires_at,
            scope,
            client_id,
            user_id,
            device,
        }
    }

    /// Whether the expiry instant has passed.
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// Exact membership test of a single required scope.
    pub fn has_scope(&self, scope: Scope) -> bool {
        self.scope.contains(scope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn two_legged_view_has_no_user() {
        let claims = Claims::two_legged("app", "location-retrieval:read".parse().unwrap());
        assert_eq!(claims.subject(), "app");

        let token = AccessToken::from_claims(
            "opaque".to_string(),
            claims,
            Utc::now() + Duration::minutes(60),
        );

        assert_eq!(token.token_type, TokenType::TwoLegged);
        assert_eq!(token.user_id, None);
        assert_eq!(token.device, None);
        assert!(!token.is_expired());
    }

    #[test]
    fn three_legged_view_keeps_user_and_device() {
        let device = DeviceSnapshot {
            phone_number: Some("+1234567890".to_string()),
            ..DeviceSnapshot::default()
        };
        let claims = Claims::three_legged(
            "app",
            "location-verification:verify".parse().unwrap(),
            "user_789",
            Some(device.clone()),
        );
        assert_eq!(claims.subject(), "user_789");
        assert_eq!(claims.client_id(), "app");

        let token = AccessToken::from_claims(
            "opaque".to_string(),
            claims,
            Utc::now() + Duration::minutes(60),
        );

        assert_eq!(token.token_type, TokenType::ThreeLegged);
        assert_eq!(token.user_id.as_deref(), Some("user_789"));
        assert_eq!(token.device, Some(device));
    }

    #[test]
    fn scope_membership_is_exact() {
        let token = AccessToken::from_claims(
            "opaque".to_string(),
            Claims::two_legged("app", "location-retrieval:read".parse().unwrap()),
            Utc::now() + Duration::minutes(60),
        );

        assert!(token.has_scope(Scope::LocationRead));
        assert!(!token.has_scope(Scope::LocationVerify));
        assert!(!token.has_scope(Scope::RetrieveIdentifier));
    }

    #[test]
    fn expiry_is_inclusive() {
        let token = AccessToken::from_claims(
            "opaque".to_string(),
            Claims::two_legged("app", ScopeSet::new()),
            Utc::now() - Duration::seconds(1),
        );
        assert!(token.is_expired());
    }
}
