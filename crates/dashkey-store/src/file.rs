//! File-backed secure storage
//!
//! Each alias maps to one file in a directory that only the owner can
//! read. `store_new` writes the full record to a private temp file and
//! publishes it with a hard link, so the filesystem arbitrates concurrent
//! key generation for the same alias and readers never see a partial record.

use dashkey_core::ports::SecureStorage;
use dashkey_core::{DashkeyError, Result};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use zeroize::Zeroizing;

const KEY_FILE_EXTENSION: &str = "key";
const TEMP_FILE_EXTENSION: &str = "tmp";

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

fn unavailable(context: &str, e: std::io::Error) -> DashkeyError {
    DashkeyError::KeyStoreUnavailable(format!("{}: {}", context, e))
}

pub struct FileSecureStorage {
    dir: PathBuf,
}

impl FileSecureStorage {
    /// Use `dir` as the key directory, creating it if needed
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .map_err(|e| unavailable(&format!("cannot create {}", dir.display()), e))?;

        // Set permissions on Unix (restrict to owner only)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&dir, fs::Permissions::from_mode(0o700))
                .map_err(|e| unavailable("cannot restrict key directory", e))?;
        }

        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, alias: &str) -> Result<PathBuf> {
        let valid = !alias.is_empty()
            && alias
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(DashkeyError::KeyStoreUnavailable(format!(
                "alias {:?} is not a valid file name",
                alias
            )));
        }
        Ok(self.dir.join(format!("{}.{}", alias, KEY_FILE_EXTENSION)))
    }

    /// Unique per process and call; the leading dot keeps it out of alias space
    fn temp_path_for(&self, alias: &str) -> PathBuf {
        let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        self.dir.join(format!(
            ".{}.{}.{}.{}",
            alias,
            std::process::id(),
            n,
            TEMP_FILE_EXTENSION
        ))
    }
}

impl SecureStorage for FileSecureStorage {
    fn load(&self, alias: &str) -> Result<Option<Zeroizing<Vec<u8>>>> {
        let path = self.path_for(alias)?;
        let mut file = match fs::File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(unavailable("cannot open key file", e)),
        };

        let mut contents = Zeroizing::new(Vec::new());
        file.read_to_end(&mut contents)
            .map_err(|e| unavailable("cannot read key file", e))?;
        Ok(Some(contents))
    }

    fn store_new(&self, alias: &str, secret: &[u8]) -> Result<bool> {
        let path = self.path_for(alias)?;
        if path.is_file() {
            return Ok(false);
        }

        let temp = self.temp_path_for(alias);
        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options
            .open(&temp)
            .map_err(|e| unavailable("cannot create temp key file", e))?;
        let written = file.write_all(secret).and_then(|_| file.sync_all());
        drop(file);
        if let Err(e) = written {
            let _ = fs::remove_file(&temp);
            return Err(unavailable("cannot write key file", e));
        }

        // The link either publishes a complete record or fails because one exists
        let linked = fs::hard_link(&temp, &path);
        let _ = fs::remove_file(&temp);
        match linked {
            Ok(()) => {
                tracing::debug!(alias = %alias, "Stored key record");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(unavailable("cannot publish key file", e)),
        }
    }

    fn remove(&self, alias: &str) -> Result<bool> {
        let path = self.path_for(alias)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(unavailable("cannot remove key file", e)),
        }
    }

    fn contains(&self, alias: &str) -> Result<bool> {
        Ok(self.path_for(alias)?.is_file())
    }
}
