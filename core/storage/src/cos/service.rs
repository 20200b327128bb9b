use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use polystore_common::{ConfigErrorKind, Error, Op, Result, StorageError};
use polystore_credential::{Protocol, Provider};

use super::client::{Connector, Credentials, ServiceClient};
use super::pairs::{BucketOptions, ServiceListOptions, ServiceNewOptions, StorageNewOptions};
use super::storager::Storage;
use super::TYPE;
use crate::pairs::Pair;
use crate::storager::{Servicer, StorageResult, Storager};

/// Environment variable holding the secret id for `env` credentials.
pub const ENV_SECRET_ID: &str = "COS_SECRETID";
/// Environment variable holding the secret key for `env` credentials.
pub const ENV_SECRET_KEY: &str = "COS_SECRETKEY";

/// Account-level COS operations.
pub struct Service {
    connector: Arc<dyn Connector>,
    credentials: Credentials,
    http: reqwest::Client,
    client: Arc<dyn ServiceClient>,
}

impl Service {
    /// Connect to the service.
    ///
    /// Requires `credential` (hmac or env); accepts `http_client_options`.
    /// Unrelated pairs are ignored.
    pub fn new(connector: Arc<dyn Connector>, pairs: Vec<Pair>) -> Result<Self> {
        Self::from_options(connector, ServiceNewOptions::parse(pairs)?)
    }

    pub(crate) fn from_options(
        connector: Arc<dyn Connector>,
        opt: ServiceNewOptions,
    ) -> Result<Self> {
        let credentials = resolve_credentials(&opt.credential)?;
        let http = opt.http_client_options.build()?;
        let client = connector.service(&credentials, &http)?;

        Ok(Self {
            connector,
            credentials,
            http,
            client,
        })
    }

    /// Storager for bucket `name`.
    ///
    /// Requires `name` and `location`; accepts `work_dir`.
    pub fn storage(&self, pairs: Vec<Pair>) -> Result<Storage> {
        self.new_storage(StorageNewOptions::parse(pairs)?)
    }

    pub(crate) fn new_storage(&self, opt: StorageNewOptions) -> Result<Storage> {
        let bucket = self
            .connector
            .bucket(&self.credentials, &self.http, &opt.name, &opt.location)?;
        Ok(Storage::new(bucket, opt))
    }

    fn bucket_storage(&self, name: &str, location: String) -> Result<Storage> {
        self.new_storage(StorageNewOptions {
            name: name.to_string(),
            location,
            work_dir: None,
        })
    }

    fn format_error(&self, op: Op, err: Error, path: &[&str]) -> StorageError {
        StorageError::new(op, self, path, err)
    }

    async fn create_inner(&self, name: &str, pairs: Vec<Pair>) -> Result<Storage> {
        let opt = BucketOptions::parse(pairs)?;
        let storage = self.bucket_storage(name, opt.location)?;

        opt.context.run(storage.client().put_bucket()).await?;
        debug!(bucket = name, "created bucket");
        Ok(storage)
    }

    async fn delete_inner(&self, name: &str, pairs: Vec<Pair>) -> Result<()> {
        let opt = BucketOptions::parse(pairs)?;
        let storage = self.bucket_storage(name, opt.location)?;

        opt.context.run(storage.client().delete_bucket()).await
    }

    async fn get_inner(&self, name: &str, pairs: Vec<Pair>) -> Result<Storage> {
        let opt = BucketOptions::parse(pairs)?;
        opt.context.check()?;
        self.bucket_storage(name, opt.location)
    }

    async fn list_inner(&self, pairs: Vec<Pair>) -> Result<()> {
        let mut opt = ServiceListOptions::parse(pairs)?;

        let buckets = opt.context.run(self.client.list_buckets()).await?;
        for b in buckets {
            let storage = self.bucket_storage(&b.name, b.location)?;
            (opt.storager_func)(Arc::new(storage));
        }
        Ok(())
    }
}

/// Secret pair for a provider, reading the environment for `env`.
pub(crate) fn resolve_credentials(cred: &Provider) -> Result<Credentials> {
    match cred.protocol() {
        Protocol::Hmac => match cred.hmac_keys() {
            Some((id, key)) => Ok(Credentials::new(id, key)),
            None => Err(Error::config(Protocol::Hmac.as_str(), ConfigErrorKind::InvalidConfig)),
        },
        Protocol::Env => {
            let id = std::env::var(ENV_SECRET_ID);
            let key = std::env::var(ENV_SECRET_KEY);
            match (id, key) {
                (Ok(id), Ok(key)) => Ok(Credentials::new(id, key)),
                _ => Err(Error::config(
                    format!("{} ({}, {})", Protocol::Env, ENV_SECRET_ID, ENV_SECRET_KEY),
                    ConfigErrorKind::InvalidConfig,
                )),
            }
        }
        other => Err(Error::config(
            other.as_str(),
            ConfigErrorKind::UnsupportedProtocol,
        )),
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Servicer {}", TYPE)
    }
}

impl fmt::Debug for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service")
            .field("credentials", &self.credentials)
            .finish()
    }
}

#[async_trait]
impl Servicer for Service {
    async fn create(&self, name: &str, pairs: Vec<Pair>) -> StorageResult<Arc<dyn Storager>> {
        self.create_inner(name, pairs)
            .await
            .map(|s| Arc::new(s) as Arc<dyn Storager>)
            .map_err(|e| self.format_error(Op::ServiceCreate, e, &[name]))
    }

    async fn delete(&self, name: &str, pairs: Vec<Pair>) -> StorageResult<()> {
        self.delete_inner(name, pairs)
            .await
            .map_err(|e| self.format_error(Op::ServiceDelete, e, &[name]))
    }

    async fn get(&self, name: &str, pairs: Vec<Pair>) -> StorageResult<Arc<dyn Storager>> {
        self.get_inner(name, pairs)
            .await
            .map(|s| Arc::new(s) as Arc<dyn Storager>)
            .map_err(|e| self.format_error(Op::ServiceGet, e, &[name]))
    }

    async fn list(&self, pairs: Vec<Pair>) -> StorageResult<()> {
        self.list_inner(pairs)
            .await
            .map_err(|e| self.format_error(Op::ServiceList, e, &[]))
    }
}
