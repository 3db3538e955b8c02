//! 键值配置存储
//!
//! 只保存少量会话开关，没有事务，后写覆盖先写

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde_json::Value;
use tracing::debug;

use crate::error::{AppResult, StoreError};

/// 读写命名配置值
pub trait ConfigStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;
    fn set(&self, key: &str, value: Value) -> AppResult<()>;
    fn remove(&self, key: &str) -> AppResult<()>;
}

/// 保存在 TOML 文件中的存储
pub struct TomlFileStore {
    path: PathBuf,
    table: Mutex<toml::Table>,
}

impl TomlFileStore {
    /// 打开存储文件，不存在时从空表开始
    pub fn open(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref().to_path_buf();
        let table = if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|source| StoreError::Io {
                path: path.display().to_string(),
                source,
            })?;
            toml::from_str::<toml::Table>(&content).map_err(|e| StoreError::Format {
                path: path.display().to_string(),
                message: e.to_string(),
            })?
        } else {
            toml::Table::new()
        };
        debug!("会话存储已加载: {} ({} 个键)", path.display(), table.len());
        Ok(Self {
            path,
            table: Mutex::new(table),
        })
    }

    fn save(&self, table: &toml::Table) -> AppResult<()> {
        let content = toml::to_string(table).map_err(|e| StoreError::Format {
            path: self.path.display().to_string(),
            message: e.to_string(),
        })?;
        std::fs::write(&self.path, content).map_err(|source| StoreError::Io {
            path: self.path.display().to_string(),
            source,
        })?;
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, toml::Table> {
        self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ConfigStore for TomlFileStore {
    fn get(&self, key: &str) -> Option<Value> {
        let table = self.lock();
        table
            .get(key)
            .and_then(|v| serde_json::to_value(v).ok())
    }

    fn set(&self, key: &str, value: Value) -> AppResult<()> {
        if value.is_null() {
            return self.remove(key);
        }
        let toml_value = toml::Value::try_from(value).map_err(|e| StoreError::Format {
            path: self.path.display().to_string(),
            message: e.to_string(),
        })?;
        let mut table = self.lock();
        table.insert(key.to_string(), toml_value);
        self.save(&table)
    }

    fn remove(&self, key: &str) -> AppResult<()> {
        let mut table = self.lock();
        if table.remove(key).is_some() {
            self.save(&table)?;
        }
        Ok(())
    }
}

/// 内存存储（测试与无文件运行）
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Value>> {
        self.values.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ConfigStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) -> AppResult<()> {
        self.lock().insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> AppResult<()> {
        self.lock().remove(key);
        Ok(())
    }
}
