use crate::error::QuizError;
use dashmap::DashMap;
use futures::future::BoxFuture;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub trait SessionStore: Send + Sync {
    /// `None` if the key was never written or has been cleared.
    fn load(&self, key: &str) -> BoxFuture<'static, Result<Option<String>, QuizError>>;
    fn save(&self, key: &str, raw: String) -> BoxFuture<'static, Result<(), QuizError>>;
    fn clear(&self, key: &str) -> BoxFuture<'static, Result<(), QuizError>>;
}

#[derive(Clone, Default)]
pub struct MemorySessionStore {
    entries: Arc<DashMap<String, String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|v| v.value().clone())
    }

    pub fn put(&self, key: &str, raw: impl Into<String>) {
        self.entries.insert(key.to_string(), raw.into());
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self, key: &str) -> BoxFuture<'static, Result<Option<String>, QuizError>> {
        let value = self.get(key);
        Box::pin(async move { Ok(value) })
    }

    fn save(&self, key: &str, raw: String) -> BoxFuture<'static, Result<(), QuizError>> {
        self.entries.insert(key.to_string(), raw);
        Box::pin(async { Ok(()) })
    }

    fn clear(&self, key: &str) -> BoxFuture<'static, Result<(), QuizError>> {
        self.entries.remove(key);
        Box::pin(async { Ok(()) })
    }
}

/// One JSON file per key under `dir`.
#[derive(Clone)]
pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{name}.json"))
    }
}

fn storage_err(path: &Path, err: std::io::Error) -> QuizError {
    QuizError::Storage(format!("{}: {}", path.display(), err))
}

impl SessionStore for FileSessionStore {
    fn load(&self, key: &str) -> BoxFuture<'static, Result<Option<String>, QuizError>> {
        let path = self.path_for(key);
        Box::pin(async move {
            match tokio::fs::read_to_string(&path).await {
                Ok(raw) => Ok(Some(raw)),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(err) => Err(storage_err(&path, err)),
            }
        })
    }

    fn save(&self, key: &str, raw: String) -> BoxFuture<'static, Result<(), QuizError>> {
        let path = self.path_for(key);
        Box::pin(async move {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| storage_err(parent, e))?;
            }
            tokio::fs::write(&path, raw).await.map_err(|e| storage_err(&path, e))
        })
    }

    fn clear(&self, key: &str) -> BoxFuture<'static, Result<(), QuizError>> {
        let path = self.path_for(key);
        Box::pin(async move {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => Ok(()),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(err) => Err(storage_err(&path, err)),
            }
        })
    }
}
