//! Scoped temporary files for artifacts moving between the pipeline and the backend

use std::ffi::{OsStr, OsString};
use std::fs::{File, OpenOptions};
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tempfile::{TempDir, TempPath};
use tracing::{debug, warn};

use crate::cleanup::CleanupRegistry;
use crate::error::{Result, SigningError};

const PREFIX: &str = "signbridge";

#[derive(Debug)]
enum Storage {
    File(TempPath),
    Directory(TempDir),
}

/// A temporary file owned by whoever created it.
///
/// The file is removed by [`release`](TemporaryFile::release), on drop, or by
/// the [`CleanupRegistry`] drain at process teardown, whichever comes first.
#[derive(Debug)]
pub struct TemporaryFile {
    path: PathBuf,
    storage: Option<Storage>,
    registry: Arc<CleanupRegistry>,
    ticket: u64,
}

impl TemporaryFile {
    /// Allocate a uniquely named file in the system temp directory
    pub fn new() -> Result<Self> {
        Self::new_in(CleanupRegistry::global())
    }

    /// Allocate a file with exactly `name` as its file name.
    ///
    /// The file lives alone in a fresh temp directory. `name` may contain
    /// directories, but only its final file name is kept, and it must not
    /// resolve outside the directory.
    pub fn named(name: &str) -> Result<Self> {
        Self::named_in(CleanupRegistry::global(), name)
    }

    /// Like [`new`](Self::new), tracked by an explicit registry
    pub fn new_in(registry: Arc<CleanupRegistry>) -> Result<Self> {
        let temp_path = tempfile::Builder::new()
            .prefix(PREFIX)
            .tempfile()?
            .into_temp_path();
        let path = temp_path.to_path_buf();
        let ticket = registry.register(path.clone());

        debug!(path = %path.display(), "created temporary file");
        Ok(Self {
            path,
            storage: Some(Storage::File(temp_path)),
            registry,
            ticket,
        })
    }

    /// Like [`named`](Self::named), tracked by an explicit registry
    pub fn named_in(registry: Arc<CleanupRegistry>, name: &str) -> Result<Self> {
        let file_name = resolve_file_name(name)?;

        let dir = tempfile::Builder::new().prefix(PREFIX).tempdir()?;
        let path = dir.path().join(&file_name);
        OpenOptions::new().write(true).create_new(true).open(&path)?;
        let ticket = registry.register(dir.path().to_path_buf());

        debug!(path = %path.display(), "created named temporary file");
        Ok(Self {
            path,
            storage: Some(Storage::Directory(dir)),
            registry,
            ticket,
        })
    }

    /// Path of the file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name of the file
    pub fn file_name(&self) -> Option<&OsStr> {
        self.path.file_name()
    }

    /// Whether the file has been released
    pub fn is_released(&self) -> bool {
        self.storage.is_none()
    }

    /// Replace the file's contents with everything read from `reader`
    pub fn copy_from<R: Read + ?Sized>(&self, reader: &mut R) -> Result<u64> {
        self.ensure_live()?;
        let mut file = File::create(&self.path)?;
        let copied = std::io::copy(reader, &mut file)?;
        file.sync_all()?;
        debug!(path = %self.path.display(), bytes = copied, "filled temporary file");
        Ok(copied)
    }

    /// Open the file for reading
    pub fn open(&self) -> Result<File> {
        self.ensure_live()?;
        Ok(File::open(&self.path)?)
    }

    /// Copy the file to `destination`, creating parent directories as needed
    pub fn persist_to(&self, destination: &Path) -> Result<u64> {
        self.ensure_live()?;
        if let Some(parent) = destination.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let copied = std::fs::copy(&self.path, destination)?;
        debug!(
            from = %self.path.display(),
            to = %destination.display(),
            bytes = copied,
            "copied temporary file out"
        );
        Ok(copied)
    }

    /// Delete the file (and its directory, for named files).
    ///
    /// Idempotent; failures are logged and otherwise ignored.
    pub fn release(&mut self) {
        let Some(storage) = self.storage.take() else {
            return;
        };

        let result = match storage {
            Storage::File(temp_path) => temp_path.close(),
            Storage::Directory(dir) => dir.close(),
        };
        match result {
            Ok(()) => debug!(path = %self.path.display(), "released temporary file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "temporary file was already removed")
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to release temporary file")
            }
        }
        self.registry.unregister(self.ticket);
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_released() {
            return Err(SigningError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("temporary file {} was released", self.path.display()),
            )));
        }
        Ok(())
    }
}

impl Drop for TemporaryFile {
    fn drop(&mut self) {
        self.release();
    }
}

/// Resolve `name` lexically against an anonymous directory and return the final file name.
///
/// Fails if any component would climb above the directory, if the name is
/// absolute, or if it resolves to the directory itself.
fn resolve_file_name(name: &str) -> Result<OsString> {
    let escape = || SigningError::PathEscape {
        name: name.to_string(),
    };

    let mut parts: Vec<&OsStr> = Vec::new();
    for component in Path::new(name).components() {
        match component {
            Component::Normal(part) => parts.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if parts.pop().is_none() {
                    return Err(escape());
                }
            }
            Component::RootDir | Component::Prefix(_) => return Err(escape()),
        }
    }

    parts.pop().map(OsStr::to_os_string).ok_or_else(escape)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Arc<CleanupRegistry> {
        Arc::new(CleanupRegistry::new())
    }

    #[test]
    fn test_new_creates_file() {
        let registry = registry();
        let file = TemporaryFile::new_in(Arc::clone(&registry)).unwrap();
        assert!(file.path().is_file());
        assert!(file
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with(PREFIX));
        assert_eq!(registry.pending(), 1);
    }

    #[test]
    fn test_named_keeps_exact_file_name() {
        let file = TemporaryFile::named_in(registry(), "MyApp Setup.msi").unwrap();
        assert!(file.path().is_file());
        assert_eq!(file.file_name().unwrap(), "MyApp Setup.msi");
    }

    #[test]
    fn test_named_strips_nested_directories() {
        let file = TemporaryFile::named_in(registry(), "bin/x64/app.exe").unwrap();
        assert_eq!(file.file_name().unwrap(), "app.exe");
        let dir = file.path().parent().unwrap();
        assert!(dir
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with(PREFIX));
    }

    #[test]
    fn test_named_allows_parent_within_directory() {
        let file = TemporaryFile::named_in(registry(), "a/../b.dll").unwrap();
        assert_eq!(file.file_name().unwrap(), "b.dll");
    }

    #[test]
    fn test_named_rejects_traversal() {
        let registry = registry();
        for name in [
            "a/../../etc/passwd",
            "../escape.exe",
            "/etc/passwd",
            "..",
            "a/..",
            ".",
            "",
        ] {
            let result = TemporaryFile::named_in(Arc::clone(&registry), name);
            assert!(
                matches!(result, Err(SigningError::PathEscape { .. })),
                "expected path escape for {:?}",
                name
            );
        }
        assert_eq!(registry.pending(), 0);
    }

    #[test]
    fn test_release_is_idempotent() {
        let registry = registry();
        let mut file = TemporaryFile::new_in(Arc::clone(&registry)).unwrap();
        let path = file.path().to_path_buf();

        file.release();
        file.release();

        assert!(file.is_released());
        assert!(!path.exists());
        assert_eq!(registry.pending(), 0);
    }

    #[test]
    fn test_release_named_removes_directory() {
        let mut file = TemporaryFile::named_in(registry(), "artifact.zip").unwrap();
        let dir = file.path().parent().unwrap().to_path_buf();

        file.release();
        file.release();

        assert!(!file.path().exists());
        assert!(!dir.exists());
    }

    #[test]
    fn test_release_after_external_removal() {
        let mut file = TemporaryFile::named_in(registry(), "gone.bin").unwrap();
        let dir = file.path().parent().unwrap().to_path_buf();
        std::fs::remove_dir_all(&dir).unwrap();

        file.release();
        assert!(file.is_released());
    }

    #[test]
    fn test_drop_releases() {
        let registry = registry();
        let path = {
            let file = TemporaryFile::new_in(Arc::clone(&registry)).unwrap();
            file.path().to_path_buf()
        };
        assert!(!path.exists());
        assert_eq!(registry.pending(), 0);
    }

    #[test]
    fn test_leaked_file_is_drained() {
        let registry = registry();
        let file = TemporaryFile::named_in(Arc::clone(&registry), "leak.exe").unwrap();
        let dir = file.path().parent().unwrap().to_path_buf();
        std::mem::forget(file);

        assert!(dir.exists());
        assert_eq!(registry.drain(), 1);
        assert!(!dir.exists());
    }

    #[test]
    fn test_copy_from_and_persist_to() {
        let file = TemporaryFile::named_in(registry(), "payload.bin").unwrap();
        let copied = file.copy_from(&mut &b"signed bytes"[..]).unwrap();
        assert_eq!(copied, 12);

        let out = tempfile::TempDir::new().unwrap();
        let destination = out.path().join("dist").join("payload.bin");
        file.persist_to(&destination).unwrap();
        assert_eq!(std::fs::read(&destination).unwrap(), b"signed bytes");

        let mut contents = String::new();
        file.open().unwrap().read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "signed bytes");
    }

    #[test]
    fn test_use_after_release_fails() {
        let mut file = TemporaryFile::new_in(registry()).unwrap();
        file.release();
        assert!(file.open().is_err());
        assert!(file.copy_from(&mut &b"x"[..]).is_err());
    }
}
