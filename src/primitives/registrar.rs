//! Registrars administer a database of known clients.
//!
//! It governs their allowed scopes and their credentials. When a token
//! request turns up, it is the registrar's duty to authenticate the client
//! and to verify the requested scope for consistency with the permissions
//! registered for that client.
use super::scope::ScopeSet;

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use argon2::{self, Config};
use once_cell::sync::Lazy;
use rand::{thread_rng, RngCore};
use rand::rngs::OsRng;

/// Registrars provide a way to interact with clients.
///
/// Most importantly, they determine the validity of provided credentials and
/// of the scopes a client asks for. In general, implementations of this
/// trait will also offer an interface for registering new clients, but that
/// interface is not part of the request flows and thus not covered by the
/// trait.
pub trait Registrar {
    /// Try to login as client with some authentication.
    ///
    /// The outcome must not reveal whether the client is unknown, inactive
    /// or supplied the wrong secret, all three answer `Unspecified`.
    fn check(&self, client_id: &str, passphrase: &[u8]) -> Result<(), RegistrarError>;

    /// Finish the negotiations with the registrar.
    ///
    /// The registrar verifies that every requested scope was registered for
    /// the client. An empty request is trivially valid and yields an empty
    /// grant; there is no default scope substitution, clients receive
    /// exactly what they asked for.
    fn negotiate(&self, client_id: &str, scope: &ScopeSet) -> Result<PreGrant, RegistrarError>;
}

/// These are the parameters that will form the grant once the token itself
/// is stamped and signed: the authenticated client and the scope admissible
/// for it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreGrant {
    /// The registered client id.
    pub client_id: String,

    /// A scope admissible for the above client.
    pub scope: ScopeSet,
}

/// Handled responses from a registrar.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegistrarError {
    /// One of several different causes that should be indistinguishable.
    ///
    /// * Indicates an entirely unknown client.
    /// * The client has been deactivated.
    /// * The supplied secret does not match the stored one.
    ///
    /// These should be indistinguishable to avoid security problems.
    Unspecified,

    /// The client is fine but not entitled to a requested scope.
    ///
    /// Unlike `Unspecified` this is only ever produced after the client
    /// authenticated, so surfacing it leaks nothing to strangers.
    ScopeNotAllowed,

    /// A client with this id is already registered.
    AlreadyExists,

    /// Something went wrong with this primitive that has no security reason.
    PrimitiveError,
}

/// A registered client application, before its credentials are hashed.
///
/// Every client of this gateway is confidential: it authenticates with a
/// secret whose one-way hash ends up in the registrar, the plaintext is
/// handed out exactly once at registration.
#[derive(Clone)]
pub struct Client {
    client_id: String,
    name: String,
    allowed_scopes: ScopeSet,
    passphrase: Vec<u8>,
}

/// A client whose credentials have been wrapped by a password policy.
///
/// This provides a standard encoding for `Registrars` who wish to store
/// their clients and makes it possible to test password policies.
#[derive(Clone)]
pub struct EncodedClient {
    /// The id of this client. If this was registered at a `Registrar`, this
    /// should be a key to the instance.
    pub client_id: String,

    /// Human readable name for operator tooling.
    pub name: String,

    /// The set of scopes this client may request tokens for.
    pub allowed_scopes: ScopeSet,

    /// Whether the client may still authenticate.
    ///
    /// Deactivation is a soft delete, the record stays around but every
    /// authentication attempt fails.
    pub active: bool,

    /// Byte data encoding the secret authentication under the used policy.
    pub passdata: Vec<u8>,
}

/// Recombines an `EncodedClient` and a `PasswordPolicy` to check authentication.
pub struct RegisteredClient<'a> {
    client: &'a EncodedClient,
    policy: &'a dyn PasswordPolicy,
}

/// A very simple, in-memory hash map of client ids to client entries.
#[derive(Default)]
pub struct ClientMap {
    clients: HashMap<String, EncodedClient>,
    password_policy: Option<Box<dyn PasswordPolicy>>,
}

/// Length of the random part of generated secrets, in bytes before encoding.
const GENERATED_SECRET_LENGTH: usize = 24;

/// Generate a client secret from a cryptographically secure random source.
///
/// The result uses the url-safe base64 alphabet, so it survives form
/// encoding unchanged. `length` is the number of random bytes, the returned
/// string is correspondingly longer.
pub fn generate_secret(length: usize) -> String {
    let mut result = vec![0; length];
    OsRng
        .try_fill_bytes(result.as_mut_slice())
        .expect("Failed to generate client secret");
    base64::encode_config(&result, base64::URL_SAFE_NO_PAD)
}

impl Client {
    /// Create a client with a caller-chosen passphrase.
    pub fn confidential(
        client_id: &str, name: &str, allowed_scopes: ScopeSet, passphrase: &[u8],
    ) -> Client {
        Client {
            client_id: client_id.to_string(),
            name: name.to_string(),
            allowed_scopes,
            passphrase: passphrase.to_owned(),
        }
    }

    /// Create a client with a freshly generated secret.
    ///
    /// Returns the client together with the plaintext secret. This is the
    /// only time the plaintext exists outside the caller, the registrar
    /// stores nothing but the hash.
    pub fn generated(client_id: &str, name: &str, allowed_scopes: ScopeSet) -> (Client, String) {
        let secret = generate_secret(GENERATED_SECRET_LENGTH);
        let client = Client::confidential(client_id, name, allowed_scopes, secret.as_bytes());
        (client, secret)
    }

    /// Obscure the client's authentication data.
    ///
    /// This applies a one-way function to the passphrase using an adequate
    /// password hashing method. The resulting passdata is then used for
    /// validating authentication details provided when later reasserting the
    /// identity of the client.
    pub fn encode(self, policy: &dyn PasswordPolicy) -> EncodedClient {
        let passdata = policy.store(&self.client_id, &self.passphrase);

        EncodedClient {
            client_id: self.client_id,
            name: self.name,
            allowed_scopes: self.allowed_scopes,
            active: true,
            passdata,
        }
    }
}

impl EncodedClient {
    /// True iff every requested scope is registered for this client.
    ///
    /// The empty request is trivially valid.
    pub fn validate_scopes(&self, requested: &ScopeSet) -> bool {
        requested.is_subset(&self.allowed_scopes)
    }
}

impl<'a> RegisteredClient<'a> {
    /// Binds a client and a policy reference together.
    ///
    /// The policy should be the same or equivalent to the policy used to
    /// create the encoded client data, as otherwise authentication will
    /// obviously not work.
    pub fn new(client: &'a EncodedClient, policy: &'a dyn PasswordPolicy) -> Self {
        RegisteredClient { client, policy }
    }

    /// Try to authenticate with the client and passphrase.
    ///
    /// Deactivated clients fail regardless of the passphrase, with the same
    /// uniform error as a mismatch.
    pub fn check_authentication(&self, passphrase: &[u8]) -> Result<(), RegistrarError> {
        if !self.client.active {
            return Err(RegistrarError::Unspecified);
        }

        self.policy
            .check(&self.client.client_id, passphrase, &self.client.passdata)
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        f.debug_struct("Client")
            .field("client_id", &self.client_id)
            .field("name", &self.name)
            .field("allowed_scopes", &self.allowed_scopes)
            .field("passphrase", &"<redacted>")
            .finish()
    }
}

impl fmt::Debug for EncodedClient {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        f.debug_struct("EncodedClient")
            .field("client_id", &self.client_id)
            .field("name", &self.name)
            .field("allowed_scopes", &self.allowed_scopes)
            .field("active", &self.active)
            .field("passdata", &"<confidential>")
            .finish()
    }
}

/// Determines how passphrases are stored and checked.
///
/// The provided library implementation is based on `Argon2`.
pub trait PasswordPolicy: Send + Sync {
    /// Transform the passphrase so it can be stored in the confidential client.
    fn store(&self, client_id: &str, passphrase: &[u8]) -> Vec<u8>;

    /// Check if the stored data corresponds to that of the client id and passphrase.
    fn check(&self, client_id: &str, passphrase: &[u8], stored: &[u8]) -> Result<(), RegistrarError>;
}

/// Store passwords using `Argon2` to derive the stored value.
///
/// A fresh salt is generated for every call and embedded in the encoded
/// output, so verification needs nothing besides the stored data. The
/// client id is mixed in as associated data, binding each hash to its
/// client record.
#[derive(Clone, Debug, Default)]
pub struct Argon2 {}

impl PasswordPolicy for Argon2 {
    fn store(&self, client_id: &str, passphrase: &[u8]) -> Vec<u8> {
        let mut config = Config::default();
        config.ad = client_id.as_bytes();
        config.secret = &[];

        let mut salt = vec![0; 32];
        thread_rng()
            .try_fill_bytes(salt.as_mut_slice())
            .expect("Failed to generate password salt");

        let encoded = argon2::hash_encoded(passphrase, &salt, &config);
        encoded.unwrap().as_bytes().to_vec()
    }

    fn check(&self, client_id: &str, passphrase: &[u8], stored: &[u8]) -> Result<(), RegistrarError> {
        let hash = String::from_utf8(stored.to_vec());
        let valid = match hash {
            Ok(hash) => argon2::verify_encoded_ext(&hash, passphrase, &[], client_id.as_bytes())
                .map_err(|_| RegistrarError::Unspecified),
            _ => Err(RegistrarError::Unspecified),
        };

        match valid {
            Ok(true) => Ok(()),
            _ => Err(RegistrarError::Unspecified),
        }
    }
}

///////////////////////////////////////////////////////////////////////////////////////////////////
//                             Standard Implementations of Registrars                            //
///////////////////////////////////////////////////////////////////////////////////////////////////

static DEFAULT_PASSWORD_POLICY: Lazy<Argon2> = Lazy::new(Argon2::default);

impl ClientMap {
    /// Create an empty map without any clients in it.
    pub fn new() -> ClientMap {
        ClientMap::default()
    }

    /// Insert a new client record.
    ///
    /// Unlike an update this refuses to touch an existing record, the client
    /// id is immutable once taken.
    pub fn register_client(&mut self, client: Client) -> Result<(), RegistrarError> {
        if self.clients.contains_key(&client.client_id) {
            return Err(RegistrarError::AlreadyExists);
        }

        let password_policy = Self::current_policy(&self.password_policy);
        self.clients
            .insert(client.client_id.clone(), client.encode(password_policy));
        Ok(())
    }

    /// Look up a client record by id.
    pub fn find_client(&self, client_id: &str) -> Option<&EncodedClient> {
        self.clients.get(client_id)
    }

    /// Soft-delete a client.
    ///
    /// Returns false if no such client is registered. The record itself is
    /// kept, only authentication is turned off.
    pub fn deactivate(&mut self, client_id: &str) -> bool {
        match self.clients.get_mut(client_id) {
            Some(client) => {
                client.active = false;
                true
            }
            None => false,
        }
    }

    /// Change how passwords are encoded while stored.
    pub fn set_password_policy<P: PasswordPolicy + 'static>(&mut self, new_policy: P) {
        self.password_policy = Some(Box::new(new_policy))
    }

    // This is not an instance method because it needs to borrow the box but register needs &mut
    fn current_policy(policy: &Option<Box<dyn PasswordPolicy>>) -> &dyn PasswordPolicy {
        policy
            .as_ref()
            .map(|boxed| &**boxed)
            .unwrap_or(&*DEFAULT_PASSWORD_POLICY)
    }
}

impl<'s, R: Registrar + ?Sized> Registrar for &'s R {
    fn check(&self, client_id: &str, passphrase: &[u8]) -> Result<(), RegistrarError> {
        (**self).check(client_id, passphrase)
    }

    fn negotiate(&self, client_id: &str, scope: &ScopeSet) -> Result<PreGrant, RegistrarError> {
        (**self).negotiate(client_id, scope)
    }
}

impl<R: Registrar + ?Sized> Registrar for Box<R> {
    fn check(&self, client_id: &str, passphrase: &[u8]) -> Result<(), RegistrarError> {
        (**self).check(client_id, passphrase)
    }

    fn negotiate(&self, client_id: &str, scope: &ScopeSet) -> Result<PreGrant, RegistrarError> {
        (**self).negotiate(client_id, scope)
    }
}

impl<R: Registrar + ?Sized> Registrar for Rc<R> {
    fn check(&self, client_id: &str, passphrase: &[u8]) -> Result<(), RegistrarError> {
        (**self).check(client_id, passphrase)
    }

    fn negotiate(&self, client_id: &str, scope: &ScopeSet) -> Result<PreGrant, RegistrarError> {
        (**self).negotiate(client_id, scope)
    }
}

impl<R: Registrar + ?Sized> Registrar for Arc<R> {
    fn check(&self, client_id: &str, passphrase: &[u8]) -> Result<(), RegistrarError> {
        (**self).check(client_id, passphrase)
    }

    fn negotiate(&self, client_id: &str, scope: &ScopeSet) -> Result<PreGrant, RegistrarError> {
        (**self).negotiate(client_id, scope)
    }
}

impl Registrar for ClientMap {
    fn check(&self, client_id: &str, passphrase: &[u8]) -> Result<(), RegistrarError> {
        let password_policy = Self::current_policy(&self.password_policy);

        self.clients
            .get(client_id)
            .ok_or(RegistrarError::Unspecified)
            .and_then(|client| {
                RegisteredClient::new(client, password_policy).check_authentication(passphrase)
            })?;

        Ok(())
    }

    fn negotiate(&self, client_id: &str, scope: &ScopeSet) -> Result<PreGrant, RegistrarError> {
        let client = match self.clients.get(client_id) {
            Some(client) if client.active => client,
            _ => return Err(RegistrarError::Unspecified),
        };

        if !client.validate_scopes(scope) {
            return Err(RegistrarError::ScopeNotAllowed);
        }

        Ok(PreGrant {
            client_id: client.client_id.clone(),
            scope: scope.clone(),
        })
    }
}
