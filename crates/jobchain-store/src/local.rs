use crate::{ChainRepo, RepoError};
use async_trait::async_trait;
use fs2::FileExt;
use jobchain_core::{Chain, deserialize_chain, serialize_chain};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tokio::task::spawn_blocking;
use uuid::Uuid;

const CHAIN_DIR: &str = "chains";

/// Stores each chain as `<base_dir>/chains/<request_id>.json`.
#[derive(Debug, Clone)]
pub struct LocalFsChainRepo {
    base_dir: PathBuf,
}

impl LocalFsChainRepo {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }
}

#[async_trait]
impl ChainRepo for LocalFsChainRepo {
    async fn get(&self, request_id: &str) -> Result<Chain, RepoError> {
        let base_dir = self.base_dir.clone();
        let request_id = request_id.to_string();
        run_blocking(move || {
            let path = chain_path(&base_dir, &request_id)?;
            if !path.exists() {
                return Err(RepoError::NotFound(request_id));
            }
            let body = fs::read(&path).map_err(io_err)?;
            deserialize_chain(&body).map_err(|e| RepoError::Serde(e.to_string()))
        })
        .await
    }

    async fn add(&self, chain: &Chain) -> Result<(), RepoError> {
        let base_dir = self.base_dir.clone();
        let request_id = chain.request_id().to_string();
        let body = serialize_chain(chain).map_err(|e| RepoError::Serde(e.to_string()))?;
        run_blocking(move || {
            with_chain_lock(&base_dir, &request_id, |path| {
                if path.exists() {
                    return Err(RepoError::AlreadyExists(request_id.clone()));
                }
                atomic_write(&path, &body)
            })
        })
        .await
    }

    async fn set(&self, chain: &Chain) -> Result<(), RepoError> {
        let base_dir = self.base_dir.clone();
        let request_id = chain.request_id().to_string();
        let body = serialize_chain(chain).map_err(|e| RepoError::Serde(e.to_string()))?;
        run_blocking(move || {
            with_chain_lock(&base_dir, &request_id, |path| atomic_write(&path, &body))
        })
        .await
    }

    async fn remove(&self, request_id: &str) -> Result<(), RepoError> {
        let base_dir = self.base_dir.clone();
        let request_id = request_id.to_string();
        run_blocking(move || {
            with_chain_lock(&base_dir, &request_id, |path| {
                if !path.exists() {
                    return Err(RepoError::NotFound(request_id.clone()));
                }
                fs::remove_file(path).map_err(io_err)
            })
        })
        .await
    }

    async fn list(&self) -> Result<Vec<String>, RepoError> {
        let dir = self.base_dir.join(CHAIN_DIR);
        run_blocking(move || {
            if !dir.exists() {
                return Ok(Vec::new());
            }
            let mut ids = Vec::new();
            for entry in fs::read_dir(&dir).map_err(io_err)? {
                let path = entry.map_err(io_err)?.path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(stem.to_string());
                }
            }
            ids.sort();
            Ok(ids)
        })
        .await
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T, RepoError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, RepoError> + Send + 'static,
{
    spawn_blocking(f)
        .await
        .map_err(|e| RepoError::Other(format!("blocking task join error: {e}")))?
}

fn chain_path(base_dir: &Path, request_id: &str) -> Result<PathBuf, RepoError> {
    let valid = !request_id.is_empty()
        && !request_id.starts_with('.')
        && request_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if !valid {
        return Err(RepoError::InvalidKey(request_id.to_string()));
    }
    Ok(base_dir.join(CHAIN_DIR).join(format!("{request_id}.json")))
}

fn with_chain_lock<T, F>(base_dir: &Path, request_id: &str, f: F) -> Result<T, RepoError>
where
    F: FnOnce(PathBuf) -> Result<T, RepoError>,
{
    let path = chain_path(base_dir, request_id)?;
    let lock_path = PathBuf::from(format!("{}.lock", path.to_string_lossy()));
    if let Some(parent) = lock_path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(&lock_path)
        .map_err(io_err)?;
    file.lock_exclusive().map_err(io_err)?;
    let result = f(path);
    unlock(&file)?;
    result
}

fn unlock(file: &File) -> Result<(), RepoError> {
    FileExt::unlock(file).map_err(io_err)
}

fn atomic_write(path: &Path, body: &[u8]) -> Result<(), RepoError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let tmp = PathBuf::from(format!("{}.tmp-{}", path.to_string_lossy(), Uuid::new_v4()));
    fs::write(&tmp, body).map_err(io_err)?;
    fs::rename(&tmp, path).map_err(io_err)?;
    Ok(())
}

fn io_err(error: std::io::Error) -> RepoError {
    RepoError::Io(error.to_string())
}
