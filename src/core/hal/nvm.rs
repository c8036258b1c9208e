//! Non-volatile storage for persisted master registers.
//!
//! The store is byte-addressed; each persisted register occupies four
//! consecutive bytes, big-endian, at `base + register * 4`.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use crate::error::{NodeBusError, Result};

#[async_trait]
pub trait NvmStore: Send + Sync {
    async fn read_u32(&self, address: u32) -> Result<u32>;
    async fn write_u32(&self, address: u32, value: u32) -> Result<()>;
}

#[async_trait]
impl<T: NvmStore + ?Sized> NvmStore for &T {
    async fn read_u32(&self, address: u32) -> Result<u32> {
        (**self).read_u32(address).await
    }

    async fn write_u32(&self, address: u32, value: u32) -> Result<()> {
        (**self).write_u32(address, value).await
    }
}

#[async_trait]
impl<T: NvmStore + ?Sized> NvmStore for std::sync::Arc<T> {
    async fn read_u32(&self, address: u32) -> Result<u32> {
        (**self).read_u32(address).await
    }

    async fn write_u32(&self, address: u32, value: u32) -> Result<()> {
        (**self).write_u32(address, value).await
    }
}

/// Persisted store backed by a single JSON file.
///
/// A full map rewrite per store is fine here: persisted registers change a
/// handful of times per deployment, not per tick.
pub struct FileNvmStore {
    path: PathBuf,
    cache: Mutex<Option<HashMap<u32, u32>>>,
}

impl FileNvmStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: Mutex::new(None),
        }
    }

    async fn load(&self) -> Result<HashMap<u32, u32>> {
        if let Some(map) = self.cache.lock().as_ref() {
            return Ok(map.clone());
        }
        let map = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => serde_json::from_str::<HashMap<u32, u32>>(&text)
                .map_err(|e| NodeBusError::Nvm(format!("corrupt store {:?}: {}", self.path, e)))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                return Err(NodeBusError::Nvm(format!(
                    "cannot read store {:?}: {}",
                    self.path, e
                )))
            }
        };
        *self.cache.lock() = Some(map.clone());
        Ok(map)
    }
}

#[async_trait]
impl NvmStore for FileNvmStore {
    async fn read_u32(&self, address: u32) -> Result<u32> {
        let map = self.load().await?;
        Ok(map.get(&address).copied().unwrap_or(0))
    }

    async fn write_u32(&self, address: u32, value: u32) -> Result<()> {
        let mut map = self.load().await?;
        map.insert(address, value);
        let text = serde_json::to_string(&map)?;
        tokio::fs::write(&self.path, text).await.map_err(|e| {
            NodeBusError::Nvm(format!("cannot write store {:?}: {}", self.path, e))
        })?;
        *self.cache.lock() = Some(map);
        debug!("NVM store 0x{:08X} = 0x{:08X}", address, value);
        Ok(())
    }
}

/// In-memory store for tests
#[derive(Default)]
pub struct MemoryNvmStore {
    cells: Mutex<HashMap<u32, u32>>,
    fail_writes: Mutex<bool>,
}

impl MemoryNvmStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_write_failure(&self, fail: bool) {
        *self.fail_writes.lock() = fail;
    }

    pub fn preload(&self, address: u32, value: u32) {
        self.cells.lock().insert(address, value);
    }
}

#[async_trait]
impl NvmStore for MemoryNvmStore {
    async fn read_u32(&self, address: u32) -> Result<u32> {
        Ok(self.cells.lock().get(&address).copied().unwrap_or(0))
    }

    async fn write_u32(&self, address: u32, value: u32) -> Result<()> {
        if *self.fail_writes.lock() {
            return Err(NodeBusError::Nvm("simulated write failure".to_string()));
        }
        self.cells.lock().insert(address, value);
        Ok(())
    }
}
