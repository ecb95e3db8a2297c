//! Secret store (spec.md §4.12): opaque named strings kept separate from
//! `Config`'s JSON so they are never accidentally serialized back out over
//! the HTTP API.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tracing::instrument;

use crate::error::NetPulseResult;

/// The only secret name in use today (spec.md §4.12).
pub const REST_API_KEY: &str = "rest_api_key";

pub struct SecretStore {
    path: PathBuf,
    secrets: Mutex<HashMap<String, String>>,
}

impl SecretStore {
    /// Loads `path`, or starts empty if it does not exist.
    #[instrument]
    pub async fn load(path: PathBuf) -> NetPulseResult<Self> {
        let secrets = match tokio::fs::read_to_string(&path).await {
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            secrets: Mutex::new(secrets),
        })
    }

    pub async fn get(&self, name: &str) -> Option<String> {
        self.secrets.lock().await.get(name).cloned()
    }

    /// Sets `name` and persists the store atomically (temp file + rename).
    pub async fn set(&self, name: &str, value: String) -> NetPulseResult<()> {
        {
            let mut secrets = self.secrets.lock().await;
            secrets.insert(name.to_string(), value);
        }
        self.persist().await
    }

    pub async fn remove(&self, name: &str) -> NetPulseResult<()> {
        {
            let mut secrets = self.secrets.lock().await;
            secrets.remove(name);
        }
        self.persist().await
    }

    async fn persist(&self) -> NetPulseResult<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let snapshot = self.secrets.lock().await.clone();
        let json = serde_json::to_string_pretty(&snapshot)?;
        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, json).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }
}
