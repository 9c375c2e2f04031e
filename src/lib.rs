//! # camara-auth
//!
//! The authorization core of a CAMARA-style API gateway which exposes device
//! identity and location lookup operations to registered client applications.
//! This crate issues, validates and revokes OAuth2 bearer tokens, and decides
//! scope based access; the HTTP routes, request schemas and the lookup
//! services themselves live in the surrounding server and reach this crate
//! through a narrow interface.
//!
//! ## About
//!
//! The crate is split along the same lines as the server that embeds it. The
//! [`primitives`] module contains the independent policy units: a client
//! registry behind the [`Registrar`] trait, an HMAC based token codec, a
//! revocation overlay behind the [`Revocation`] trait, and the
//! [`AuthorizationService`] tying them together behind the [`Issuer`] trait.
//! The [`code_grant`] module contains the transport independent request
//! flows: the token endpoint (`client_credentials` only, the user consent
//! flow deliberately answers "not implemented"), the revocation endpoint and
//! the protection of resource endpoints.
//!
//! Every primitive comes with an in-process implementation suitable for
//! testing and single-instance deployments. Deployments with several
//! gateway instances should use the shared-store implementations from the
//! `camara-auth-db` crate instead, which keep client records and revocation
//! marks in redis.
//!
//! ## Issuing and validating a token
//!
//! ```
//! use camara_auth::primitives::assertion::Assertion;
//! use camara_auth::primitives::issuer::{AuthorizationService, Issuer};
//! use camara_auth::primitives::revocation::RevocationMap;
//!
//! let mut service = AuthorizationService::new(
//!     Assertion::ephemeral(),
//!     RevocationMap::new());
//!
//! let issued = service
//!     .issue_two_legged("my_application", "location-retrieval:read".parse().unwrap(), None)
//!     .unwrap();
//! let validated = service.validate(&issued.token).unwrap();
//! assert_eq!(validated.client_id, "my_application");
//!
//! assert!(service.revoke(&issued.token));
//! assert!(service.validate(&issued.token).is_none());
//! ```
//!
//! [`primitives`]: primitives/index.html
//! [`code_grant`]: code_grant/index.html
//! [`Registrar`]: primitives/registrar/trait.Registrar.html
//! [`Revocation`]: primitives/revocation/trait.Revocation.html
//! [`Issuer`]: primitives/issuer/trait.Issuer.html
//! [`AuthorizationService`]: primitives/issuer/struct.AuthorizationService.html
#![warn(missing_docs)]

pub mod code_grant;
pub mod primitives;
