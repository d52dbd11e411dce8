//! User config persistence.
//!
//! A session saves through a [`ConfigStore`] whenever a persisted network
//! field changes. [`FileStore`] keeps the config as JSON on disk,
//! [`ApiStore`] keeps it on the account service.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use crate::api::{UserConfig, ZubrApi};
use crate::error::StoreError;

pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

pub trait ConfigStore: Send + Sync {
    fn load(&self) -> StoreFuture<'_, UserConfig>;
    fn save(&self, config: UserConfig) -> StoreFuture<'_, ()>;
}

/// JSON file store. A missing file loads as an empty config.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<dir>/users/<user>.json`
    pub fn for_user(dir: &Path, user: &str) -> Self {
        Self::new(dir.join("users").join(format!("{user}.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(path: PathBuf) -> Result<UserConfig, StoreError> {
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No user config yet");
                Ok(UserConfig::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn write(path: PathBuf, config: UserConfig) -> Result<(), StoreError> {
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        let json = serde_json::to_vec_pretty(&config)?;
        // Write aside and rename so a crash never leaves a torn file.
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

impl ConfigStore for FileStore {
    fn load(&self) -> StoreFuture<'_, UserConfig> {
        Box::pin(Self::read(self.path.clone()))
    }

    fn save(&self, config: UserConfig) -> StoreFuture<'_, ()> {
        Box::pin(Self::write(self.path.clone(), config))
    }
}

/// Account-service store, authenticated with a bearer token.
pub struct ApiStore {
    api: ZubrApi,
    token: String,
}

impl std::fmt::Debug for ApiStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiStore").field("api", &self.api).finish_non_exhaustive()
    }
}

impl ApiStore {
    pub fn new(api: ZubrApi, token: String) -> Self {
        Self { api, token }
    }
}

impl ConfigStore for ApiStore {
    fn load(&self) -> StoreFuture<'_, UserConfig> {
        Box::pin(async move { Ok(self.api.get_user_config(&self.token).await?) })
    }

    fn save(&self, config: UserConfig) -> StoreFuture<'_, ()> {
        Box::pin(async move { Ok(self.api.save_user_config(&self.token, &config).await?) })
    }
}
