//! Available backend algorithms for the gateway endpoints.
//!
//! The backend codifies the requirements from [RFC 6749] and [RFC 7009] into
//! types and functions as safely as possible. The results are abstract
//! actions which should be executed or relayed by the frontend using its
//! available types: abstract in this sense means that the responses are not
//! generic on an input type, the HTTP layer only maps them onto status codes
//! and bodies.
//!
//! ## Limitations
//!
//! The only supported authentication method for clients is secret based, and
//! the only grant producing tokens is `client_credentials`. Requests for the
//! user consent flow (`authorization_code`) are answered with an explicit
//! not-implemented signal rather than an unsupported-grant error, so clients
//! can tell the difference between "never" and "not yet".
//!
//! [RFC 6749]: https://tools.ietf.org/html/rfc6749
//! [RFC 7009]: https://tools.ietf.org/html/rfc7009

pub mod error;
pub mod resource;
pub mod revocation;
pub mod token;
