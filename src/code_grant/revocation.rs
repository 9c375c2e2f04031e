//! Provides the handling for token revocation requests per [RFC 7009].
//!
//! [RFC 7009]: https://tools.ietf.org/html/rfc7009
use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::code_grant::token::Error;
use crate::primitives::issuer::Issuer;
use crate::primitives::registrar::{Registrar, RegistrarError};

/// Required content of a revocation request.
pub trait Request {
    /// Signals a request whose body could not be parsed at all.
    fn valid(&self) -> bool;

    /// The token the client wishes to get rid of.
    fn token(&self) -> Option<Cow<str>>;

    /// The id under which the client authenticates.
    fn client_id(&self) -> Option<Cow<str>>;

    /// The secret accompanying the client id.
    fn client_secret(&self) -> Option<Cow<str>>;
}

/// Required functionality to respond to revocation requests.
pub trait Endpoint {
    /// Get the client corresponding to some id.
    fn registrar(&self) -> &dyn Registrar;

    /// Return the issuer holding the revocation store.
    fn issuer(&mut self) -> &mut dyn Issuer;
}

/// Try to revoke a token on behalf of an authenticated client.
///
/// Once the client credentials check out this always succeeds: whether the
/// token was really marked, already expired, unknown or complete garbage is
/// deliberately not reflected in the outcome, so the endpoint can not be
/// used to probe for live tokens.
pub fn revocation_request(
    handler: &mut dyn Endpoint, request: &dyn Request,
) -> Result<RevocationResponse, Error> {
    if !request.valid() {
        return Err(Error::invalid());
    }

    let (client_id, passphrase) = match (request.client_id(), request.client_secret()) {
        (Some(client_id), Some(secret)) => (client_id.into_owned(), secret.into_owned()),
        _ => return Err(Error::invalid()),
    };

    let token = match request.token() {
        Some(token) => token.into_owned(),
        None => return Err(Error::invalid()),
    };

    handler
        .registrar()
        .check(&client_id, passphrase.as_bytes())
        .map_err(|err| match err {
            RegistrarError::PrimitiveError => Error::Primitive,
            _ => Error::unauthorized(),
        })?;

    // The result is ignored on purpose, see above.
    let _ = handler.issuer().revoke(&token);

    Ok(RevocationResponse::default())
}

/// Confirmation sent to the client after a revocation request.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RevocationResponse {
    /// Fixed confirmation message.
    pub message: String,
}

impl Default for RevocationResponse {
    fn default() -> Self {
        RevocationResponse {
            message: "Token revoked successfully".to_string(),
        }
    }
}

impl RevocationResponse {
    /// Convert the confirmation into a json string, viable for being sent
    /// over a network with `application/json` encoding.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::assertion::Assertion;
    use crate::primitives::issuer::AuthorizationService;
    use crate::primitives::registrar::{Client, ClientMap};
    use crate::primitives::revocation::RevocationMap;
    use crate::primitives::scope::ScopeSet;

    struct CraftedRequest {
        token: Option<String>,
        client_id: Option<&'static str>,
        client_secret: Option<&'static str>,
    }

    impl Request for CraftedRequest {
        fn valid(&self) -> bool {
            true
        }

        fn token(&self) -> Option<Cow<str>> {
            self.token.as_deref().map(Cow::Borrowed)
        }

        fn client_id(&self) -> Option<Cow<str>> {
            self.client_id.map(Cow::Borrowed)
        }

        fn client_secret(&self) -> Option<Cow<str>> {
            self.client_secret.map(Cow::Borrowed)
        }
    }

    struct TestEndpoint {
        registrar: ClientMap,
        issuer: AuthorizationService<RevocationMap>,
    }

    impl Endpoint for TestEndpoint {
        fn registrar(&self) -> &dyn Registrar {
            &self.registrar
        }

        fn issuer(&mut self) -> &mut dyn Issuer {
            &mut self.issuer
        }
    }

    const CLIENT_ID: &str = "my_application";
    const CLIENT_SECRET: &str = "WOJJCcS8WyS2aGmJK6ZADg==";

    fn test_endpoint() -> TestEndpoint {
        let mut registrar = ClientMap::new();
        registrar
            .register_client(Client::confidential(
                CLIENT_ID,
                "My Application",
                ScopeSet::new(),
                CLIENT_SECRET.as_bytes(),
            ))
            .unwrap();

        TestEndpoint {
            registrar,
            issuer: AuthorizationService::new(Assertion::ephemeral(), RevocationMap::new()),
        }
    }

    #[test]
    fn revocation_invalidates_token() {
        let mut endpoint = test_endpoint();
        let issued = endpoint
            .issuer
            .issue_two_legged(CLIENT_ID, ScopeSet::new(), None)
            .unwrap();
        assert!(endpoint.issuer.validate(&issued.token).is_some());

        let request = CraftedRequest {
            token: Some(issued.token.clone()),
            client_id: Some(CLIENT_ID),
            client_secret: Some(CLIENT_SECRET),
        };

        revocation_request(&mut endpoint, &request).expect("revocation refused");
        assert!(endpoint.issuer.validate(&issued.token).is_none());
    }

    #[test]
    fn unknown_token_is_confirmed_anyway() {
        let mut endpoint = test_endpoint();
        let request = CraftedRequest {
            token: Some("never issued".to_string()),
            client_id: Some(CLIENT_ID),
            client_secret: Some(CLIENT_SECRET),
        };

        let response = revocation_request(&mut endpoint, &request).expect("revocation refused");
        assert_eq!(response.message, "Token revoked successfully");
    }

    #[test]
    fn credentials_are_still_required() {
        let mut endpoint = test_endpoint();
        let issued = endpoint
            .issuer
            .issue_two_legged(CLIENT_ID, ScopeSet::new(), None)
            .unwrap();

        let request = CraftedRequest {
            token: Some(issued.token.clone()),
            client_id: Some(CLIENT_ID),
            client_secret: Some("not the secret"),
        };

        match revocation_request(&mut endpoint, &request) {
            Err(Error::Unauthorized(_)) => (),
            _ => panic!("revocation with wrong credentials accepted"),
        }

        // And nothing was revoked on the way.
        assert!(endpoint.issuer.validate(&issued.token).is_some());
    }

    #[test]
    fn confirmation_encoding() {
        let response = RevocationResponse::default();
        let json = response.to_json();
        let parsed = serde_json::from_str::<RevocationResponse>(&json).unwrap();
        assert_eq!(parsed.message, response.message);
    }
}
