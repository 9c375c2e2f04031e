use crate::primitives::db_registrar::ClientRepository;
use camara_auth::primitives::registrar::EncodedClient;
use camara_auth::primitives::scope::ScopeSet;
use anyhow::{anyhow, Context};
use log::debug;
use r2d2::Pool;
use r2d2_redis::redis::{Commands, ErrorKind, RedisError};
use r2d2_redis::RedisConnectionManager;

/// redis datasource to client entries and revocation marks.
#[derive(Debug, Clone)]
pub struct RedisDataSource {
    url: String,
    pool: Pool<RedisConnectionManager>,
    client_prefix: String,
    revoked_prefix: String,
}

/// A client record in its stored form.
///
/// This provides a standard json encoding for repositories that keep their
/// clients in a string keyed store. The secret hash is the policy encoded
/// output and contains no plaintext.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoredClient {
    /// The key of this record, unique among all clients.
    pub client_id: String,

    /// Human readable name for operator tooling.
    pub name: String,

    /// Wire strings of the scopes this client may request.
    pub allowed_scopes: Vec<String>,

    /// Whether the client may still authenticate.
    pub active: bool,

    /// Policy encoded secret data.
    pub secret_hash: String,
}

impl StoredClient {
    /// Parse the stored row back into the registrar's client form.
    pub fn to_encoded_client(&self) -> anyhow::Result<EncodedClient> {
        let mut allowed_scopes = ScopeSet::new();
        for scope in &self.allowed_scopes {
            let parsed = scope
                .parse()
                .map_err(|err| anyhow!("stored client {}: {}", self.client_id, err))?;
            allowed_scopes.insert(parsed);
        }

        Ok(EncodedClient {
            client_id: self.client_id.clone(),
            name: self.name.clone(),
            allowed_scopes,
            active: self.active,
            passdata: self.secret_hash.clone().into_bytes(),
        })
    }

    /// Convert a registrar client into its stored form.
    pub fn from_encoded_client(encoded_client: &EncodedClient) -> anyhow::Result<Self> {
        let secret_hash = String::from_utf8(encoded_client.passdata.clone())
            .context("passdata is not an encoded policy string")?;

        Ok(StoredClient {
            client_id: encoded_client.client_id.clone(),
            name: encoded_client.name.clone(),
            allowed_scopes: encoded_client
                .allowed_scopes
                .iter()
                .map(|scope| scope.as_str().to_string())
                .collect(),
            active: encoded_client.active,
            secret_hash,
        })
    }
}

impl RedisDataSource {
    /// Open a connection pool against the given redis url.
    ///
    /// The prefixes separate client rows and revocation marks from anything
    /// else living in the same database, e.g. `client:` and
    /// `revoked_token:`.
    pub fn new(
        url: &str, max_pool_size: u32, client_prefix: &str, revoked_prefix: &str,
    ) -> Result<Self, RedisError> {
        let manager = RedisConnectionManager::new(url)?;
        let pool = r2d2::Pool::builder().max_size(max_pool_size).build(manager);
        match pool {
            Ok(pool) => Ok(RedisDataSource {
                url: url.to_string(),
                pool,
                client_prefix: client_prefix.to_string(),
                revoked_prefix: revoked_prefix.to_string(),
            }),
            Err(_e) => Err(RedisError::from((ErrorKind::ClientError, "Build pool error."))),
        }
    }

    /// The url the pool was opened against.
    pub fn get_url(&self) -> String {
        self.url.clone()
    }

    /// Handle on the underlying pool, e.g. for health checks.
    pub fn get_pool(&self) -> Pool<RedisConnectionManager> {
        self.pool.clone()
    }

    /// Store a new client row.
    ///
    /// Returns false without touching anything when the client id is
    /// already taken, the underlying `SETNX` decides atomically.
    pub fn insert_client(&self, detail: &StoredClient) -> anyhow::Result<bool> {
        let mut conn = self.pool.get()?;
        let client_str = serde_json::to_string(&detail)?;
        let fresh = conn
            .set_nx::<String, String, bool>(self.client_key(&detail.client_id), client_str)?;
        Ok(fresh)
    }

    /// Fetch a client row by id.
    pub fn find_client_by_id(&self, id: &str) -> anyhow::Result<StoredClient> {
        let mut conn = self.pool.get()?;
        let client_str = conn.get::<String, String>(self.client_key(id))?;
        let stored = serde_json::from_str::<StoredClient>(&client_str)?;
        Ok(stored)
    }

    /// Turn off authentication for a client, keeping the row.
    ///
    /// Returns false if no such client exists.
    pub fn deactivate_client(&self, id: &str) -> anyhow::Result<bool> {
        let mut conn = self.pool.get()?;
        let client_str = match conn.get::<String, Option<String>>(self.client_key(id))? {
            Some(client_str) => client_str,
            None => return Ok(false),
        };

        let mut stored = serde_json::from_str::<StoredClient>(&client_str)?;
        stored.active = false;
        let client_str = serde_json::to_string(&stored)?;
        conn.set::<String, String, ()>(self.client_key(id), client_str)?;
        Ok(true)
    }

    /// Write a revocation mark that redis drops after `ttl_seconds`.
    pub fn set_revoked(&self, token: &str, ttl_seconds: usize) -> anyhow::Result<()> {
        let mut conn = self.pool.get()?;
        conn.set_ex::<String, &str, ()>(self.revoked_key(token), "1", ttl_seconds)?;
        debug!("revocation mark written, lapses in {}s", ttl_seconds);
        Ok(())
    }

    /// Whether a revocation mark for this token still exists.
    pub fn is_revoked(&self, token: &str) -> anyhow::Result<bool> {
        let mut conn = self.pool.get()?;
        let marked = conn.exists::<String, bool>(self.revoked_key(token))?;
        Ok(marked)
    }

    fn client_key(&self, id: &str) -> String {
        self.client_prefix.to_owned() + id
    }

    fn revoked_key(&self, token: &str) -> String {
        self.revoked_prefix.to_owned() + token
    }
}

impl ClientRepository for RedisDataSource {
    fn find_client_by_id(&self, id: &str) -> anyhow::Result<EncodedClient> {
        let stored = RedisDataSource::find_client_by_id(self, id)?;
        stored.to_encoded_client()
    }

    fn store_client(&self, client: &EncodedClient) -> anyhow::Result<bool> {
        let detail = StoredClient::from_encoded_client(client)?;
        self.insert_client(&detail)
    }

    fn deactivate(&self, id: &str) -> anyhow::Result<bool> {
        self.deactivate_client(id)
    }
}
