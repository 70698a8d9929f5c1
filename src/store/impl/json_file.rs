//! JSON file registration store

use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;

use crate::error::{Error, Result};
use crate::store::RegistrationStore;
use crate::types::RegistryDocument;

/// Stores the registry as a single pretty-printed JSON document
///
/// Saves go to `<path>.new` first and are renamed over `<path>`.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(".new");
        PathBuf::from(name)
    }
}

#[async_trait]
impl RegistrationStore for JsonFileStore {
    async fn load(&self) -> Result<Option<RegistryDocument>> {
        let data = match fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if data.iter().all(u8::is_ascii_whitespace) {
            return Ok(Some(RegistryDocument::default()));
        }

        let document = serde_json::from_slice(&data).map_err(|e| {
            Error::Store(format!("cannot parse {}: {}", self.path.display(), e))
        })?;
        Ok(Some(document))
    }

    async fn save(&self, document: &RegistryDocument) -> Result<()> {
        let data = serde_json::to_vec_pretty(document)?;
        let temp_path = self.temp_path();

        let mut file = File::create(&temp_path).await?;
        file.write_all(&data).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, &self.path).await?;
        log::debug!("Wrote registry to {}", self.path.display());
        Ok(())
    }
}
