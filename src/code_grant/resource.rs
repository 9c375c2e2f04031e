//! Provides the handling for resource requests.
use std::borrow::Cow;
use std::fmt;

use crate::primitives::claims::AccessToken;
use crate::primitives::issuer::Issuer;
use crate::primitives::scope::Scope;

/// Gives additional information about the reason for an access failure.
///
/// According to [rfc6750], this should not be returned if the client has not
/// provided any authentication information.
///
/// [rfc6750]: https://tools.ietf.org/html/rfc6750#section-3.1
#[derive(Clone, Debug)]
pub struct AccessFailure {
    /// The standard error code representation.
    pub code: Option<ErrorCode>,
}

/// Indicates the reason for access failure.
#[derive(Debug, Clone, Copy)]
pub enum ErrorCode {
    /// The request did not have enough authorization data or was otherwise
    /// malformed.
    InvalidRequest,

    /// The provided authorization did not grant sufficient privileges.
    InsufficientScope,

    /// The token is expired, revoked, malformed or otherwise does not meet
    /// expectations. Which of these applies is deliberately not stated.
    InvalidToken,
}

/// Additional information provided for the WWW-Authenticate header.
#[derive(Clone, Debug)]
pub struct Authenticate {
    /// Information about which realm the credentials correspond to.
    pub realm: Option<String>,

    /// A scope the resource requires and the token does not grant.
    pub scope: Option<Scope>,
}

/// An error signalling the resource access was not permitted.
#[derive(Clone, Debug)]
pub enum Error {
    /// The client tried to access a resource but was not able to.
    AccessDenied {
        /// A specific cause for denying access.
        failure: AccessFailure,

        /// Information for the `Authenticate` header in the error response.
        authenticate: Authenticate,
    },

    /// The client did not provide any bearer authentication.
    NoAuthentication {
        /// Information for the `Authenticate` header in the error response.
        authenticate: Authenticate,
    },

    /// The request itself was malformed.
    InvalidRequest {
        /// Information for the `Authenticate` header in the error response.
        authenticate: Authenticate,
    },
}

const BEARER_START: &str = "Bearer ";

type Result<T> = std::result::Result<T, Error>;

/// Required request methods for deciding on the rights to access a protected resource.
pub trait Request {
    /// Received request might not be encoded correctly. This method gives
    /// implementors the chance to signal that a request was received but its
    /// encoding was generally malformed. If this is the case, then no other
    /// attribute will be queried.
    fn valid(&self) -> bool;

    /// The authorization used in the request.
    ///
    /// Expects the complete `Authorization` HTTP-header, including the
    /// qualification as `Bearer`. In case the client included multiple forms
    /// of authorization, this method MUST return None and the request SHOULD
    /// be marked as invalid.
    fn token(&self) -> Option<Cow<str>>;
}

/// Required functionality to respond to resource requests.
pub trait Endpoint {
    /// The scopes required to access this resource.
    ///
    /// Every single one of them must be granted by the presented token,
    /// membership is tested exactly, scope by scope.
    fn scopes(&mut self) -> &[Scope];

    /// Issuer which decides the validity of presented tokens.
    fn issuer(&mut self) -> &dyn Issuer;
}

/// Do needed verification before granting access to the resource.
///
/// Returns the reconstructed access token, so the handler can inspect the
/// embedded claims (client, user, device snapshot) when producing its
/// response.
pub fn protect(handler: &mut dyn Endpoint, req: &dyn Request) -> Result<AccessToken> {
    if !req.valid() {
        return Err(Error::InvalidRequest {
            authenticate: Authenticate::empty(),
        });
    }

    let client_token = match req.token() {
        Some(token) => token,
        None => {
            return Err(Error::NoAuthentication {
                authenticate: Authenticate::empty(),
            })
        }
    };

    if !client_token.starts_with(BEARER_START) {
        return Err(Error::InvalidRequest {
            authenticate: Authenticate::empty(),
        });
    }

    let token = match client_token {
        Cow::Borrowed(token) => token[BEARER_START.len()..].to_string(),
        Cow::Owned(mut token) => token.split_off(BEARER_START.len()),
    };

    let required = handler.scopes().to_vec();

    // The issuer collapses expired, revoked and forged into one answer.
    let grant = match handler.issuer().validate(&token) {
        Some(grant) => grant,
        None => {
            return Err(Error::AccessDenied {
                failure: AccessFailure {
                    code: Some(ErrorCode::InvalidToken),
                },
                authenticate: Authenticate {
                    realm: None,
                    scope: required.first().copied(),
                },
            });
        }
    };

    let missing = required.iter().find(|scope| !grant.has_scope(**scope));
    if let Some(missing) = missing {
        return Err(Error::AccessDenied {
            failure: AccessFailure {
                code: Some(ErrorCode::InsufficientScope),
            },
            authenticate: Authenticate {
                realm: None,
                scope: Some(*missing),
            },
        });
    }

    Ok(grant)
}

impl ErrorCode {
    fn description(self) -> &'static str {
        match self {
            ErrorCode::InvalidRequest => "invalid_request",
            ErrorCode::InsufficientScope => "insufficient_scope",
            ErrorCode::InvalidToken => "invalid_token",
        }
    }
}

struct BearerHeader {
    content: String,
    first_option: bool,
}

impl BearerHeader {
    fn new() -> Self {
        BearerHeader {
            content: "Bearer".to_string(),
            first_option: true,
        }
    }

    fn add_option(&mut self, args: fmt::Arguments) {
        if self.first_option {
            self.content.push(' ');
            self.first_option = false;
        } else {
            self.content.push(',');
        }
        fmt::write(&mut self.content, args).unwrap();
    }

    fn add_kvp(&mut self, key: &'static str, value: Option<impl fmt::Display>) {
        if let Some(value) = value {
            self.add_option(format_args!("{}=\"{}\"", key, value));
        }
    }

    fn finalize(self) -> String {
        self.content
    }
}

impl Authenticate {
    fn empty() -> Self {
        Authenticate {
            realm: None,
            scope: None,
        }
    }

    fn extend_header(self, header: &mut BearerHeader) {
        header.add_kvp("realm", self.realm);
        header.add_kvp("scope", self.scope);
    }
}

impl AccessFailure {
    fn extend_header(self, header: &mut BearerHeader) {
        header.add_kvp("error", self.code.map(ErrorCode::description));
    }
}

impl Error {
    /// Convert the guard error into the content used in an WWW-Authenticate header.
    pub fn www_authenticate(self) -> String {
        let mut header = BearerHeader::new();
        match self {
            Error::AccessDenied {
                failure,
                authenticate,
            } => {
                failure.extend_header(&mut header);
                authenticate.extend_header(&mut header);
            }
            Error::NoAuthentication { authenticate } => {
                authenticate.extend_header(&mut header);
            }
            Error::InvalidRequest { authenticate } => {
                authenticate.extend_header(&mut header);
            }
        }
        header.finalize()
    }
}
