//! Provides the handling for access token requests.
use std::borrow::Cow;
use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::code_grant::error::{AccessTokenError, AccessTokenErrorType};
use crate::primitives::claims::AccessToken;
use crate::primitives::issuer::Issuer;
use crate::primitives::registrar::{Registrar, RegistrarError};
use crate::primitives::scope::ScopeSet;

/// Required content of an access token request.
///
/// The token endpoint receives its parameters form encoded in the body. In
/// case the transport layer could not parse that body at all, implementors
/// signal it through `valid` so no other attribute needs special casing for
/// malformed requests.
pub trait Request {
    /// Received request might not be encoded correctly. This method gives
    /// implementors the chance to signal that a request was received but its
    /// encoding was generally malformed. If this is the case, then no other
    /// attribute will be queried.
    fn valid(&self) -> bool;

    /// Valid requests have this set to "client_credentials".
    ///
    /// The value "authorization_code" is recognized but answered with a
    /// dedicated not-implemented signal.
    fn grant_type(&self) -> Option<Cow<str>>;

    /// The id under which the client authenticates.
    fn client_id(&self) -> Option<Cow<str>>;

    /// The secret accompanying the client id.
    fn client_secret(&self) -> Option<Cow<str>>;

    /// Optionally specifies the requested scope, space separated.
    fn scope(&self) -> Option<Cow<str>>;
}

/// Required functionality to respond to access token requests.
///
/// Each method will only be invoked exactly once when processing a correct
/// and authorized request, and potentially less than once when the request
/// is faulty. These methods should be implemented by internally using
/// `primitives`.
pub trait Endpoint {
    /// Get the client corresponding to some id.
    fn registrar(&self) -> &dyn Registrar;

    /// Return the issuer instance to create the access token.
    fn issuer(&mut self) -> &mut dyn Issuer;
}

/// Try to redeem client credentials for an access token.
pub fn token_request(handler: &mut dyn Endpoint, request: &dyn Request) -> Result<BearerToken> {
    if !request.valid() {
        return Err(Error::invalid());
    }

    match request.grant_type() {
        Some(ref cow) if cow == "client_credentials" => (),
        // Recognized, but the user consent flow does not exist yet.
        Some(ref cow) if cow == "authorization_code" => return Err(Error::NotImplemented),
        None => return Err(Error::invalid()),
        Some(_) => return Err(Error::invalid_with(AccessTokenErrorType::UnsupportedGrantType)),
    };

    // The scope vocabulary is closed, unknown strings never reach the
    // registrar. A missing parameter requests the empty grant.
    let scope: ScopeSet = match request.scope() {
        None => ScopeSet::new(),
        Some(scope) => match scope.as_ref().parse() {
            Ok(scope) => scope,
            Err(_) => return Err(Error::invalid_with(AccessTokenErrorType::InvalidScope)),
        },
    };

    let (client_id, passphrase) = match (request.client_id(), request.client_secret()) {
        (Some(client_id), Some(secret)) => (client_id.into_owned(), secret.into_owned()),
        _ => return Err(Error::invalid()),
    };

    handler
        .registrar()
        .check(&client_id, passphrase.as_bytes())
        .map_err(|err| match err {
            RegistrarError::PrimitiveError => Error::Primitive,
            _ => Error::unauthorized(),
        })?;

    let pre_grant = handler
        .registrar()
        .negotiate(&client_id, &scope)
        .map_err(|err| match err {
            RegistrarError::ScopeNotAllowed => {
                Error::invalid_with(AccessTokenErrorType::InvalidScope)
            }
            RegistrarError::PrimitiveError => Error::Primitive,
            _ => Error::unauthorized(),
        })?;

    let token = handler
        .issuer()
        .issue_two_legged(&pre_grant.client_id, pre_grant.scope, None)
        .map_err(|_| Error::Primitive)?;

    Ok(BearerToken(token))
}

/// Defines actions for the response to an access token request.
#[derive(Clone, Debug)]
pub enum Error {
    /// The request did not meet the requirements, answered as a bad request.
    Invalid(ErrorDescription),

    /// The client did not properly authenticate itself.
    ///
    /// Unknown client, deactivated client and wrong secret all end up here,
    /// deliberately indistinguishable.
    Unauthorized(ErrorDescription),

    /// The grant type exists but this server does not implement it yet.
    NotImplemented,

    /// An underlying primitive operation did not complete successfully.
    ///
    /// This is expected to occur with some endpoints. The frontend should
    /// answer with an internal error without detail.
    Primitive,
}

/// Simple wrapper around `AccessTokenError` to imbue the type with
/// additional json functionality.
#[derive(Clone, Debug)]
pub struct ErrorDescription {
    error: AccessTokenError,
}

type Result<T> = std::result::Result<T, Error>;

/// Token response as sent over the wire.
#[derive(Deserialize, Serialize)]
pub(crate) struct TokenResponse {
    /// The access token issued by the authorization server.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    /// The type of the token issued, always "Bearer".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,

    /// The lifetime in seconds of the access token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,

    /// The granted scope, space joined.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// Error code, for error responses.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Represents an access token as granted to a client.
pub struct BearerToken(AccessToken);

impl Error {
    /// Create invalid error type.
    pub fn invalid() -> Self {
        Error::Invalid(ErrorDescription {
            error: AccessTokenError::default(),
        })
    }

    pub(crate) fn invalid_with(with_type: AccessTokenErrorType) -> Self {
        Error::Invalid(ErrorDescription {
            error: {
                let mut error = AccessTokenError::default();
                error.set_type(with_type);
                error
            },
        })
    }

    /// Create unauthorized error type.
    pub fn unauthorized() -> Self {
        Error::Unauthorized(ErrorDescription {
            error: {
                let mut error = AccessTokenError::default();
                error.set_type(AccessTokenErrorType::InvalidClient);
                error
            },
        })
    }

    /// Get a handle to the description the client will receive.
    ///
    /// Some types of this error don't return any description which is
    /// represented by a `None` result.
    pub fn description(&mut self) -> Option<&mut AccessTokenError> {
        match self {
            Error::Invalid(description) => Some(description.description()),
            Error::Unauthorized(description) => Some(description.description()),
            Error::NotImplemented => None,
            Error::Primitive => None,
        }
    }
}

impl ErrorDescription {
    /// Get a handle to the description the client will receive.
    pub fn description(&mut self) -> &mut AccessTokenError {
        &mut self.error
    }

    /// Convert the error into a json string, viable for being sent over a
    /// network with `application/json` encoding.
    pub fn to_json(&self) -> String {
        let asmap = self
            .error
            .iter()
            .map(|(k, v)| (k.to_string(), v.into_owned()))
            .collect::<HashMap<String, String>>();

        serde_json::to_string(&asmap).unwrap()
    }
}

impl BearerToken {
    /// The token and claims this response grants.
    pub fn token(&self) -> &AccessToken {
        &self.0
    }

    /// Convert the token into a json string, viable for being sent over a
    /// network with `application/json` encoding.
    pub fn to_json(&self) -> String {
        let remaining = self.0.expires_at.signed_duration_since(Utc::now());
        let token_response = TokenResponse {
            access_token: Some(self.0.token.clone()),
            token_type: Some("Bearer".to_owned()),
            expires_in: Some(remaining.num_seconds()),
            scope: Some(self.0.scope.to_string()),
            error: None,
        };

        serde_json::to_string(&token_response).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::assertion::Assertion;
    use crate::primitives::claims::TokenType;
    use crate::primitives::issuer::AuthorizationService;
    use crate::primitives::registrar::{Client, ClientMap};
    use crate::primitives::revocation::RevocationMap;

    struct CraftedRequest {
        grant_type: Option<&'static str>,
        client_id: Option<&'static str>,
        client_secret: Option<&'static str>,
        scope: Option<&'static str>,
    }

    impl Request for CraftedRequest {
        fn valid(&self) -> bool {
            true
        }

        fn grant_type(&self) -> Option<Cow<str>> {
            self.grant_type.map(Cow::Borrowed)
        }

        fn client_id(&self) -> Option<Cow<str>> {
            self.client_id.map(Cow::Borrowed)
        }

        fn client_secret(&self) -> Option<Cow<str>> {
            self.client_secret.map(Cow::Borrowed)
        }

        fn scope(&self) -> Option<Cow<str>> {
            self.scope.map(Cow::Borrowed)
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
    const CLIENT_SECRET: &str = "AB3fAj6GJpdxmEVeNCyPoA==";

    fn test_endpoint() -> TestEndpoint {
        let mut registrar = ClientMap::new();
        registrar
            .register_client(Client::confidential(
                CLIENT_ID,
                "My Application",
                "location-retrieval:read".parse().unwrap(),
                CLIENT_SECRET.as_bytes(),
            ))
            .unwrap();

        TestEndpoint {
            registrar,
            issuer: AuthorizationService::new(Assertion::ephemeral(), RevocationMap::new()),
        }
    }

    fn error_kind(mut error: Error) -> Option<AccessTokenErrorType> {
        error.description().map(|description| description.kind())
    }

    #[test]
    fn client_credentials_issues_token() {
        let mut endpoint = test_endpoint();
        let request = CraftedRequest {
            grant_type: Some("client_credentials"),
            client_id: Some(CLIENT_ID),
            client_secret: Some(CLIENT_SECRET),
            scope: Some("location-retrieval:read"),
        };

        let bearer = token_request(&mut endpoint, &request).expect("issuing failed");
        assert_eq!(bearer.token().client_id, CLIENT_ID);
        assert_eq!(bearer.token().token_type, TokenType::TwoLegged);

        // The issued string checks out against the same issuer.
        let validated = endpoint
            .issuer
            .validate(&bearer.token().token)
            .expect("issued token invalid");
        assert_eq!(validated.scope, "location-retrieval:read".parse().unwrap());
    }

    #[test]
    fn empty_scope_is_granted() {
        let mut endpoint = test_endpoint();
        let request = CraftedRequest {
            grant_type: Some("client_credentials"),
            client_id: Some(CLIENT_ID),
            client_secret: Some(CLIENT_SECRET),
            scope: None,
        };

        let bearer = token_request(&mut endpoint, &request).expect("issuing failed");
        assert!(bearer.token().scope.is_empty());
    }

    #[test]
    fn unknown_scope_is_rejected_before_authentication() {
        let mut endpoint = test_endpoint();
        let request = CraftedRequest {
            grant_type: Some("client_credentials"),
            client_id: Some(CLIENT_ID),
            // Wrong on purpose, the scope check must come first.
            client_secret: Some("wrong one"),
            scope: Some("location-retrieval:read no-such:scope"),
        };

        let error = token_request(&mut endpoint, &request).err().unwrap();
        assert_eq!(error_kind(error), Some(AccessTokenErrorType::InvalidScope));
    }

    #[test]
    fn entitlement_is_checked_after_authentication() {
        let mut endpoint = test_endpoint();
        let request = CraftedRequest {
            grant_type: Some("client_credentials"),
            client_id: Some(CLIENT_ID),
            client_secret: Some(CLIENT_SECRET),
            scope: Some("device-identifier:retrieve-identifier"),
        };

        let error = token_request(&mut endpoint, &request).err().unwrap();
        assert_eq!(error_kind(error), Some(AccessTokenErrorType::InvalidScope));
    }

    #[test]
    fn wrong_secret_is_unauthorized() {
        let mut endpoint = test_endpoint();
        let request = CraftedRequest {
            grant_type: Some("client_credentials"),
            client_id: Some(CLIENT_ID),
            client_secret: Some("not the secret"),
            scope: Some("location-retrieval:read"),
        };

        match token_request(&mut endpoint, &request) {
            Err(Error::Unauthorized(_)) => (),
            other => panic!("expected unauthorized, got {:?}", other.err()),
        }
    }

    #[test]
    fn unknown_client_is_indistinguishable_from_wrong_secret() {
        let mut endpoint = test_endpoint();
        let request = CraftedRequest {
            grant_type: Some("client_credentials"),
            client_id: Some("who_is_this"),
            client_secret: Some(CLIENT_SECRET),
            scope: None,
        };

        let error = token_request(&mut endpoint, &request).err().unwrap();
        assert_eq!(error_kind(error), Some(AccessTokenErrorType::InvalidClient));
    }

    #[test]
    fn authorization_code_is_not_implemented() {
        let mut endpoint = test_endpoint();
        let request = CraftedRequest {
            grant_type: Some("authorization_code"),
            client_id: Some(CLIENT_ID),
            client_secret: Some(CLIENT_SECRET),
            scope: None,
        };

        match token_request(&mut endpoint, &request) {
            Err(Error::NotImplemented) => (),
            other => panic!("expected not implemented, got {:?}", other.err()),
        }
    }

    #[test]
    fn exotic_grant_type_is_unsupported() {
        let mut endpoint = test_endpoint();
        let request = CraftedRequest {
            grant_type: Some("password"),
            client_id: Some(CLIENT_ID),
            client_secret: Some(CLIENT_SECRET),
            scope: None,
        };

        let error = token_request(&mut endpoint, &request).err().unwrap();
        assert_eq!(
            error_kind(error),
            Some(AccessTokenErrorType::UnsupportedGrantType)
        );
    }

    #[test]
    fn missing_credentials_are_invalid() {
        let mut endpoint = test_endpoint();
        let request = CraftedRequest {
            grant_type: Some("client_credentials"),
            client_id: Some(CLIENT_ID),
            client_secret: None,
            scope: None,
        };

        let error = token_request(&mut endpoint, &request).err().unwrap();
        assert_eq!(error_kind(error), Some(AccessTokenErrorType::InvalidRequest));
    }

    #[test]
    fn bearer_token_encoding() {
        let mut endpoint = test_endpoint();
        let request = CraftedRequest {
            grant_type: Some("client_credentials"),
            client_id: Some(CLIENT_ID),
            client_secret: Some(CLIENT_SECRET),
            scope: Some("location-retrieval:read"),
        };

        let bearer = token_request(&mut endpoint, &request).unwrap();
        let json = bearer.to_json();
        let response = serde_json::from_str::<TokenResponse>(&json).unwrap();

        assert_eq!(response.access_token, Some(bearer.token().token.clone()));
        assert_eq!(response.token_type, Some("Bearer".to_owned()));
        assert_eq!(response.scope, Some("location-retrieval:read".to_owned()));
        assert!(response.expires_in.unwrap() > 3500);
        assert!(response.expires_in.unwrap() <= 3600);
        assert_eq!(response.error, None);
    }

    #[test]
    fn error_description_encoding() {
        let error = Error::invalid_with(AccessTokenErrorType::UnsupportedGrantType);
        let description = match error {
            Error::Invalid(description) => description,
            _ => unreachable!(),
        };

        let json = description.to_json();
        let asmap: HashMap<String, String> = serde_json::from_str(&json).unwrap();
        assert_eq!(asmap.get("error").map(String::as_str), Some("unsupported_grant_type"));
    }

    #[test]
    fn error_explanation_is_relayed() {
        let mut error = Error::unauthorized();
        error
            .description()
            .unwrap()
            .explain("Invalid client credentials");

        let description = match error {
            Error::Unauthorized(description) => description,
            _ => unreachable!(),
        };

        let asmap: HashMap<String, String> =
            serde_json::from_str(&description.to_json()).unwrap();
        assert_eq!(asmap.get("error").map(String::as_str), Some("invalid_client"));
        assert_eq!(
            asmap.get("error_description").map(String::as_str),
            Some("Invalid client credentials")
        );
    }
}
