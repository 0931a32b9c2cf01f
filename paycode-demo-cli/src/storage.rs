//! File-backed secure store for the demo.
//!
//! One file per entry under the storage directory. File names are the hex
//! SHA-256 of the entry key, so long keys such as vault entries stay within
//! file name limits. Each file holds the entry key on its first line followed
//! by the value. Values are written to a temporary file and renamed into
//! place. Nothing is encrypted: this store is for demonstration only.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use paycode_lib::secure_storage::{
    SecureKeyStorage, SecureStorageError, SecureStorageErrorCode, SecureStorageResult,
    StoreOptions,
};

/// Errors raised while opening the store directory.
#[derive(Debug, thiserror::Error)]
pub enum FileStorageError {
    #[error("cannot create storage directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{0} is not a directory")]
    NotADirectory(PathBuf),
}

pub struct FileKeyStorage {
    dir: PathBuf,
}

impl FileKeyStorage {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, FileStorageError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|source| FileStorageError::CreateDir {
            path: dir.clone(),
            source,
        })?;
        if !dir.is_dir() {
            return Err(FileStorageError::NotADirectory(dir));
        }
        Ok(Self { dir })
    }

    fn entry_path(&self, key_id: &str) -> PathBuf {
        self.dir
            .join(format!("{}.entry", hex::encode(Sha256::digest(key_id))))
    }
}

fn check_key(key_id: &str) -> SecureStorageResult<()> {
    if key_id.is_empty() || key_id.contains('\n') {
        return Err(SecureStorageError::new(
            SecureStorageErrorCode::InvalidKey,
            format!("entry key must be one non-empty line: {:?}", key_id),
        ));
    }
    Ok(())
}

/// Split an entry file into its key line and value.
fn split_entry(path: &Path, contents: &[u8]) -> SecureStorageResult<(String, Vec<u8>)> {
    let unreadable = || {
        SecureStorageError::new(
            SecureStorageErrorCode::Internal,
            format!("unreadable entry file {}", path.display()),
        )
    };
    let newline = contents
        .iter()
        .position(|b| *b == b'\n')
        .ok_or_else(unreadable)?;
    let key = std::str::from_utf8(&contents[..newline]).map_err(|_| unreadable())?;
    Ok((key.to_string(), contents[newline + 1..].to_vec()))
}

fn write_private(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, data)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))?;
    }
    std::fs::rename(&tmp, path)
}

impl SecureKeyStorage for FileKeyStorage {
    async fn store(
        &self,
        key_id: &str,
        data: &[u8],
        options: StoreOptions,
    ) -> SecureStorageResult<()> {
        check_key(key_id)?;
        let path = self.entry_path(key_id);
        if !options.overwrite && path.exists() {
            return Err(SecureStorageError::already_exists(key_id));
        }
        let mut contents = Vec::with_capacity(key_id.len() + 1 + data.len());
        contents.extend_from_slice(key_id.as_bytes());
        contents.push(b'\n');
        contents.extend_from_slice(data);
        write_private(&path, &contents).map_err(SecureStorageError::io)
    }

    async fn retrieve(&self, key_id: &str) -> SecureStorageResult<Option<Vec<u8>>> {
        let path = self.entry_path(key_id);
        let contents = match std::fs::read(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SecureStorageError::io(e)),
        };
        let (stored_key, value) = split_entry(&path, &contents)?;
        if stored_key != key_id {
            return Err(SecureStorageError::new(
                SecureStorageErrorCode::Internal,
                format!("entry file {} holds key {}", path.display(), stored_key),
            ));
        }
        Ok(Some(value))
    }

    async fn delete(&self, key_id: &str) -> SecureStorageResult<()> {
        match std::fs::remove_file(self.entry_path(key_id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(SecureStorageError::not_found(key_id))
            }
            Err(e) => Err(SecureStorageError::io(e)),
        }
    }

    async fn exists(&self, key_id: &str) -> SecureStorageResult<bool> {
        Ok(self.entry_path(key_id).exists())
    }

    async fn list_keys(&self) -> SecureStorageResult<Vec<String>> {
        let mut keys = Vec::new();
        for entry in std::fs::read_dir(&self.dir).map_err(SecureStorageError::io)? {
            let path = entry.map_err(SecureStorageError::io)?.path();
            if path.extension().map(|e| e != "entry").unwrap_or(true) {
                continue;
            }
            let contents = std::fs::read(&path).map_err(SecureStorageError::io)?;
            let (key, _) = split_entry(&path, &contents)?;
            keys.push(key);
        }
        keys.sort();
        Ok(keys)
    }
}
