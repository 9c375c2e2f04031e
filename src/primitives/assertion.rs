//! Signs and verifies the self-contained access token encoding.
use std::fmt;

use base64::{decode, encode};
use chrono::Utc;
use hmac::{digest::CtOutput, Hmac, Mac};
use rand::{thread_rng, RngCore};
use serde::{Deserialize, Serialize};

use super::Time;
use super::claims::{Claims, TokenType};
use super::device::DeviceSnapshot;
use super::scope::ScopeSet;

/// Issuer identifier stamped into tokens unless overridden.
const DEFAULT_ISSUER: &str = "camara-auth";

#[derive(Deserialize, Serialize)]
enum TokenRepr {
    SignedToken(Vec<u8>, Vec<u8>),
    Payload(u64, SerdeClaims),
}

/// Produces and reads tokens by signing their claims with a private key.
///
/// Tokens produced by this codec contain a serialized version of the claims
/// followed by an HMAC signature, the whole transported as base64. All data
/// needed to reconstruct an `AccessToken` round-trips through the encoding,
/// no storage lookup is involved. Note that the payload is signed but not
/// encrypted: anyone holding a token can read the embedded claims, including
/// a three-legged token's device identifiers, without knowing the key.
pub struct Assertion {
    hasher: Hmac<sha2::Sha256>,
    issuer: String,
}

/// The cryptographic suite ensuring integrity of tokens.
#[non_exhaustive]
pub enum AssertionKind {
    /// Uses [HMAC (RFC 2104)][HMAC] with [SHA-256 (FIPS 180-4)][SHA256] hash.
    ///
    /// [HMAC]: https://tools.ietf.org/html/rfc2104
    /// [SHA256]: https://nvlpubs.nist.gov/nistpubs/FIPS/NIST.FIPS.180-4.pdf
    HmacSha256,
}

/// Reason a token string could not be read back.
///
/// Callers on the validation path must not forward the distinction to
/// clients, all three collapse to one "invalid or expired" outward signal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecodeError {
    /// The signature does not verify under the codec's key.
    BadSignature,

    /// Signature and structure are fine but the embedded expiry has passed.
    Expired,

    /// The structure could not be parsed at all.
    Malformed,
}

#[derive(Deserialize, Serialize)]
struct SerdeClaims {
    /// The subject, the client itself or the consenting user.
    sub: String,

    /// Identifies the client to which the token was issued.
    client_id: String,

    /// Discriminates the two grant kinds.
    token_type: TokenType,

    /// The scope granted to the client.
    scope: ScopeSet,

    /// The consenting user, three-legged only.
    user_id: Option<String>,

    /// Device snapshot captured at issuance, three-legged only.
    device: Option<DeviceSnapshot>,

    /// Issuance instant (Utc).
    #[serde(with = "time_serde")]
    iat: Time,

    /// Expiry instant (Utc).
    #[serde(with = "time_serde")]
    exp: Time,

    /// Identifier of the issuing server.
    iss: String,
}

impl Assertion {
    /// Construct an assertion from a custom secret.
    ///
    /// If the key material mismatches the key length required by the selected
    /// hash algorithm then padding or shortening of the supplied key material
    /// may be applied in the form dictated by the signature type. See the
    /// respective standards.
    pub fn new(kind: AssertionKind, key: &[u8]) -> Self {
        match kind {
            AssertionKind::HmacSha256 => Assertion {
                hasher: Hmac::<sha2::Sha256>::new_from_slice(key).unwrap(),
                issuer: DEFAULT_ISSUER.to_string(),
            },
        }
    }

    /// Construct an assertion instance whose tokens are only valid for the program execution.
    pub fn ephemeral() -> Self {
        let mut rand_bytes: [u8; 32] = [0; 32];
        thread_rng().fill_bytes(&mut rand_bytes);
        Assertion {
            hasher: Hmac::<sha2::Sha256>::new_from_slice(&rand_bytes).unwrap(),
            issuer: DEFAULT_ISSUER.to_string(),
        }
    }

    /// Change the issuer identifier stamped into new tokens.
    pub fn issued_by(mut self, issuer: &str) -> Self {
        self.issuer = issuer.to_string();
        self
    }

    /// Sign the claims into a self-contained token valid until `until`.
    ///
    /// `counter` must be unique for each call to this function, similar to an
    /// IV to prevent accidentally producing the same token for the same
    /// claims (a grant may have multiple tokens over its lifetime). The
    /// counter is recovered and discarded while reading the token back.
    pub fn sign(&self, counter: u64, claims: &Claims, until: Time) -> Result<String, ()> {
        let stamped = SerdeClaims::stamp(claims, Utc::now(), until, &self.issuer);

        let tosign = rmp_serde::to_vec(&TokenRepr::Payload(counter, stamped)).map_err(|_| ())?;
        let signature = self.signature(&tosign);
        let assert = TokenRepr::SignedToken(tosign, signature.into_bytes().to_vec());

        Ok(encode(rmp_serde::to_vec(&assert).map_err(|_| ())?))
    }

    /// Inverse operation of `sign`, with full verification.
    ///
    /// Checks the signature and then the embedded expiry, and re-establishes
    /// the claim invariants of the grant kinds. Returns the claims together
    /// with the expiry instant read from the payload.
    pub fn extract(&self, token: &str) -> Result<(Claims, Time), DecodeError> {
        self.unpack(token, true)
    }

    /// Read a token back while ignoring its expiry.
    ///
    /// The signature is still verified. This mode exists solely to recover
    /// the expiry out of an about-to-be-revoked token, it must not be used on
    /// the validation path.
    pub fn extract_expired(&self, token: &str) -> Result<(Claims, Time), DecodeError> {
        self.unpack(token, false)
    }

    fn unpack(&self, token: &str, verify_expiry: bool) -> Result<(Claims, Time), DecodeError> {
        let decoded = decode(token).map_err(|_| DecodeError::Malformed)?;
        let (payload, signature) = match rmp_serde::from_slice(&decoded) {
            Ok(TokenRepr::SignedToken(payload, signature)) => (payload, signature),
            _ => return Err(DecodeError::Malformed),
        };

        let mut hasher = self.hasher.clone();
        hasher.update(&payload);
        hasher
            .verify_slice(signature.as_slice())
            .map_err(|_| DecodeError::BadSignature)?;

        let stamped = match rmp_serde::from_slice(&payload) {
            Ok(TokenRepr::Payload(_, stamped)) => stamped,
            _ => return Err(DecodeError::Malformed),
        };

        if verify_expiry && Utc::now() >= stamped.exp {
            return Err(DecodeError::Expired);
        }

        stamped.into_claims()
    }

    fn signature(&self, data: &[u8]) -> CtOutput<Hmac<sha2::Sha256>> {
        let mut hasher = self.hasher.clone();
        hasher.update(data);
        hasher.finalize()
    }
}

impl SerdeClaims {
    fn stamp(claims: &Claims, iat: Time, exp: Time, iss: &str) -> SerdeClaims {
        let (user_id, device) = match claims {
            Claims::TwoLegged { .. } => (None, None),
            Claims::ThreeLegged { user_id, device, .. } => (Some(user_id.clone()), device.clone()),
        };

        SerdeClaims {
            sub: claims.subject().to_string(),
            client_id: claims.client_id().to_string(),
            token_type: claims.token_type(),
            scope: claims.scope().clone(),
            user_id,
            device,
            iat,
            exp,
            iss: iss.to_string(),
        }
    }

    fn into_claims(self) -> Result<(Claims, Time), DecodeError> {
        let claims = match (self.token_type, self.user_id) {
            (TokenType::TwoLegged, None) => {
                if self.device.is_some() {
                    return Err(DecodeError::Malformed);
                }

                Claims::TwoLegged {
                    client_id: self.client_id,
                    scope: self.scope,
                }
            }
            (TokenType::ThreeLegged, Some(user_id)) => Claims::ThreeLegged {
                client_id: self.client_id,
                scope: self.scope,
                user_id,
                device: self.device,
            },
            // A three-legged payload always names its user.
            _ => return Err(DecodeError::Malformed),
        };

        Ok((claims, self.exp))
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DecodeError::BadSignature => fmt.write_str("signature mismatch"),
            DecodeError::Expired => fmt.write_str("token expired"),
            DecodeError::Malformed => fmt.write_str("malformed token"),
        }
    }
}

mod time_serde {
    use super::Time;
    use chrono::{TimeZone, Utc};

    use serde::ser::Serializer;
    use serde::de::{Deserialize, Deserializer, Error};

    pub fn serialize<S: Serializer>(time: &Time, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(time.timestamp())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Time, D::Error> {
        let as_timestamp: i64 = <i64>::deserialize(deserializer)?;
        Utc.timestamp_opt(as_timestamp, 0)
            .single()
            .ok_or_else(|| Error::custom("timestamp out of range"))
    }
}
