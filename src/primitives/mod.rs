//! A collection of primitives useful for more than one request flow.
//!
//! A primitive is the smallest independent unit of policy used in the
//! authorization endpoints. For example, a `registrar` stores and
//! authenticates the registered client applications. Abstracting away the
//! underlying primitives makes it possible to provide –e.g.– an independent
//! database based implementation, as the `camara-auth-db` crate does for
//! redis.
//!
//! These should be used to build the `Endpoint` implementations handed to
//! the flows in [`code_grant`].
//!
//! [`code_grant`]: ../code_grant/index.html

use chrono::DateTime;
use chrono::Utc;

pub mod assertion;
pub mod claims;
pub mod device;
pub mod issuer;
pub mod registrar;
pub mod revocation;
pub mod scope;

type Time = DateTime<Utc>;

/// Commonly used primitives for frontends and backends.
pub mod prelude {
    pub use super::assertion::{Assertion, AssertionKind};
    pub use super::claims::{AccessToken, Claims, TokenType};
    pub use super::device::{DeviceIpv4Addr, DeviceSnapshot};
    pub use super::issuer::{AuthorizationService, Issuer};
    pub use super::registrar::{Client, ClientMap, PreGrant, Registrar};
    pub use super::revocation::{Revocation, RevocationMap};
    pub use super::scope::{Scope, ScopeSet};
}
