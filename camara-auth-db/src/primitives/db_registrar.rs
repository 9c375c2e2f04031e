use once_cell::sync::Lazy;
use camara_auth::primitives::registrar::{
    Argon2, Client, EncodedClient, PasswordPolicy, PreGrant, RegisteredClient, Registrar,
    RegistrarError,
};
use camara_auth::primitives::scope::ScopeSet;
use crate::db_service::DataSource;
use r2d2_redis::redis::RedisError;

/// A database client service which implements `Registrar`.
/// repo: repository service to query stored clients or register new clients.
/// password_policy: to encode client secrets.
pub struct DBRegistrar {
    /// The datasource rows are read from and written to.
    pub repo: DataSource,
    password_policy: Option<Box<dyn PasswordPolicy>>,
}

/// Methods to search and manage clients in a datasource, which should be
/// implemented for all datasource types.
pub trait ClientRepository {
    /// Fetch a client record by its id.
    fn find_client_by_id(&self, id: &str) -> anyhow::Result<EncodedClient>;

    /// Store a new client record.
    ///
    /// Answers false, leaving the store untouched, when the id is taken.
    /// Uniqueness is the store's to enforce, concurrent registrations of
    /// the same id must not both succeed.
    fn store_client(&self, client: &EncodedClient) -> anyhow::Result<bool>;

    /// Flip a client record to inactive, false if there is none.
    fn deactivate(&self, id: &str) -> anyhow::Result<bool>;
}

static DEFAULT_PASSWORD_POLICY: Lazy<Argon2> = Lazy::new(Argon2::default);

impl DBRegistrar {
    /// Create a registrar over a redis connection pool.
    pub fn new(
        url: &str, max_pool_size: u32, client_prefix: &str, revoked_prefix: &str,
    ) -> Result<Self, RedisError> {
        let repo = DataSource::new(url, max_pool_size, client_prefix, revoked_prefix)?;
        Ok(DBRegistrar {
            repo,
            password_policy: None,
        })
    }

    /// Wrap an already opened datasource.
    pub fn with_source(repo: DataSource) -> Self {
        DBRegistrar {
            repo,
            password_policy: None,
        }
    }

    /// Insert a new client record.
    ///
    /// The secret is hashed under the current policy before it leaves the
    /// process, the store only ever sees the encoded form.
    pub fn register_client(&mut self, client: Client) -> Result<(), RegistrarError> {
        let password_policy = Self::current_policy(&self.password_policy);
        let encoded_client = client.encode(password_policy);

        match self.repo.store_client(&encoded_client) {
            Ok(true) => Ok(()),
            Ok(false) => Err(RegistrarError::AlreadyExists),
            Err(_e) => Err(RegistrarError::PrimitiveError),
        }
    }

    /// Soft-delete a client, false if it never existed.
    pub fn deactivate(&mut self, client_id: &str) -> Result<bool, RegistrarError> {
        self.repo
            .deactivate(client_id)
            .map_err(|_e| RegistrarError::PrimitiveError)
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

impl Registrar for DBRegistrar {
    fn check(&self, client_id: &str, passphrase: &[u8]) -> Result<(), RegistrarError> {
        let password_policy = Self::current_policy(&self.password_policy);

        let client = ClientRepository::find_client_by_id(&self.repo, client_id)
            .map_err(|_e| RegistrarError::Unspecified);
        client.and_then(|client| {
            RegisteredClient::new(&client, password_policy).check_authentication(passphrase)
        })?;
        Ok(())
    }

    fn negotiate(&self, client_id: &str, scope: &ScopeSet) -> Result<PreGrant, RegistrarError> {
        let client = match ClientRepository::find_client_by_id(&self.repo, client_id) {
            Ok(client) if client.active => client,
            _ => return Err(RegistrarError::Unspecified),
        };

        if !client.validate_scopes(scope) {
            return Err(RegistrarError::ScopeNotAllowed);
        }

        Ok(PreGrant {
            client_id: client.client_id,
            scope: scope.clone(),
        })
    }
}
