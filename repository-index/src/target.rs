// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Destination stores for published repositories.

A [Target] is a tree of files addressed by `/` separated relative paths. The
index engine only ever reads whole files, writes whole files and removes
files. Publishing copies a locally staged directory over the target.
*/

use {
    crate::error::{RepositoryError, Result},
    async_trait::async_trait,
    futures::{AsyncRead, AsyncReadExt},
    std::{
        borrow::Cow,
        collections::BTreeMap,
        path::{Path, PathBuf},
        pin::Pin,
        sync::{Arc, Mutex, MutexGuard},
    },
};

/// Describes the result of a write.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TargetWrite<'path> {
    /// The path that was written.
    pub path: Cow<'path, str>,

    /// The number of bytes written.
    pub bytes_written: u64,
}

/// A store holding a published repository.
#[async_trait]
pub trait Target: Send + Sync {
    /// Open a reader over the file at `path`.
    ///
    /// Missing files produce an error for which
    /// [RepositoryError::is_not_found()] is true.
    async fn get_path(&self, path: &str) -> Result<Pin<Box<dyn AsyncRead + Send>>>;

    /// Write a file, replacing any existing content.
    async fn write_path<'path, 'reader>(
        &self,
        path: Cow<'path, str>,
        reader: Pin<Box<dyn AsyncRead + Send + 'reader>>,
    ) -> Result<TargetWrite<'path>>;

    /// Remove a file.
    async fn remove_path(&self, path: &str) -> Result<()>;

    /// A view of this target scoped to a sub-directory.
    fn sub(&self, path: &str) -> Box<dyn Target>;

    /// Read an entire file.
    async fn read_path(&self, path: &str) -> Result<Vec<u8>> {
        let mut reader = self.get_path(path).await?;

        let mut data = vec![];
        reader
            .read_to_end(&mut data)
            .await
            .map_err(|e| RepositoryError::IoPath(path.to_string(), e))?;

        Ok(data)
    }

    /// Copy every file beneath a local directory into this target.
    ///
    /// Files are copied in path order. Existing files not present locally are
    /// left alone. Returns the relative paths written.
    async fn copy_tree(&self, dir: &Path) -> Result<Vec<String>> {
        let mut written = vec![];

        for entry in walkdir::WalkDir::new(dir).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                RepositoryError::IoPath(format!("{}", dir.display()), std::io::Error::from(e))
            })?;

            if !entry.file_type().is_file() {
                continue;
            }

            let rel_path = entry
                .path()
                .strip_prefix(dir)
                .map_err(|_| {
                    RepositoryError::InvalidValue("path", format!("{}", entry.path().display()))
                })?
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");

            let data = std::fs::read(entry.path())
                .map_err(|e| RepositoryError::IoPath(format!("{}", entry.path().display()), e))?;

            log::debug!("publishing {} ({} bytes)", rel_path, data.len());
            self.write_path(
                Cow::Owned(rel_path.clone()),
                Box::pin(futures::io::Cursor::new(data)),
            )
            .await?;

            written.push(rel_path);
        }

        Ok(written)
    }
}

/// A target backed by a local directory.
#[derive(Clone, Debug)]
pub struct FilesystemTarget {
    root_dir: PathBuf,
}

impl FilesystemTarget {
    /// Construct a new instance, bound to the root directory specified.
    ///
    /// No validation of the passed path is performed. The directory does not need to exist.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            root_dir: path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl Target for FilesystemTarget {
    async fn get_path(&self, path: &str) -> Result<Pin<Box<dyn AsyncRead + Send>>> {
        let path = self.root_dir.join(path);

        let f = std::fs::File::open(&path)
            .map_err(|e| RepositoryError::IoPath(format!("{}", path.display()), e))?;

        Ok(Box::pin(futures::io::AllowStdIo::new(f)))
    }

    async fn write_path<'path, 'reader>(
        &self,
        path: Cow<'path, str>,
        reader: Pin<Box<dyn AsyncRead + Send + 'reader>>,
    ) -> Result<TargetWrite<'path>> {
        let dest_path = self.root_dir.join(path.as_ref());

        if let Some(parent) = dest_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| RepositoryError::IoPath(format!("{}", parent.display()), e))?;
        }

        let fh = std::fs::File::create(&dest_path)
            .map_err(|e| RepositoryError::IoPath(format!("{}", dest_path.display()), e))?;

        let mut writer = futures::io::AllowStdIo::new(fh);

        let bytes_written = futures::io::copy(reader, &mut writer)
            .await
            .map_err(|e| RepositoryError::IoPath(format!("{}", dest_path.display()), e))?;

        Ok(TargetWrite {
            path,
            bytes_written,
        })
    }

    async fn remove_path(&self, path: &str) -> Result<()> {
        let path = self.root_dir.join(path);

        std::fs::remove_file(&path)
            .map_err(|e| RepositoryError::IoPath(format!("{}", path.display()), e))
    }

    fn sub(&self, path: &str) -> Box<dyn Target> {
        Box::new(Self::new(self.root_dir.join(path.trim_matches('/'))))
    }
}

/// A target held in memory.
///
/// Clones and sub-directory views share the same files.
#[derive(Clone, Debug, Default)]
pub struct MemoryTarget {
    files: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
    prefix: String,
}

impl MemoryTarget {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
        self.files.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn full_path(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');

        if self.prefix.is_empty() {
            path.to_string()
        } else {
            format!("{}/{}", self.prefix, path)
        }
    }

    /// Store a file directly.
    pub fn insert(&self, path: &str, data: impl Into<Vec<u8>>) {
        let path = self.full_path(path);
        self.lock().insert(path, data.into());
    }

    /// The content of a file, if present.
    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.lock().get(&self.full_path(path)).cloned()
    }

    /// Whether a file exists.
    pub fn contains(&self, path: &str) -> bool {
        self.lock().contains_key(&self.full_path(path))
    }

    /// A snapshot of every file, keyed by path relative to the root store.
    pub fn files(&self) -> BTreeMap<String, Vec<u8>> {
        self.lock().clone()
    }
}

#[async_trait]
impl Target for MemoryTarget {
    async fn get_path(&self, path: &str) -> Result<Pin<Box<dyn AsyncRead + Send>>> {
        match self.get(path) {
            Some(data) => Ok(Box::pin(futures::io::Cursor::new(data))),
            None => Err(RepositoryError::NotFound(self.full_path(path))),
        }
    }

    async fn write_path<'path, 'reader>(
        &self,
        path: Cow<'path, str>,
        mut reader: Pin<Box<dyn AsyncRead + Send + 'reader>>,
    ) -> Result<TargetWrite<'path>> {
        let mut data = vec![];
        reader
            .read_to_end(&mut data)
            .await
            .map_err(|e| RepositoryError::IoPath(path.to_string(), e))?;

        let bytes_written = data.len() as u64;
        self.insert(path.as_ref(), data);

        Ok(TargetWrite {
            path,
            bytes_written,
        })
    }

    async fn remove_path(&self, path: &str) -> Result<()> {
        let full_path = self.full_path(path);

        match self.lock().remove(&full_path) {
            Some(_) => Ok(()),
            None => Err(RepositoryError::NotFound(full_path)),
        }
    }

    fn sub(&self, path: &str) -> Box<dyn Target> {
        let path = path.trim_matches('/');

        Box::new(Self {
            files: self.files.clone(),
            prefix: if path.is_empty() {
                self.prefix.clone()
            } else {
                self.full_path(path)
            },
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    async fn exercise(target: &dyn Target) -> Result<()> {
        let res = target
            .write_path(
                Cow::Borrowed("a/b/c.txt"),
                Box::pin(futures::io::Cursor::new(b"hello".to_vec())),
            )
            .await?;
        assert_eq!(res.bytes_written, 5);

        assert_eq!(target.read_path("a/b/c.txt").await?, b"hello");
        assert_eq!(target.sub("a").read_path("b/c.txt").await?, b"hello");

        let missing = target.read_path("missing").await;
        assert!(missing.unwrap_err().is_not_found());

        target.remove_path("a/b/c.txt").await?;
        assert!(target.read_path("a/b/c.txt").await.unwrap_err().is_not_found());
        assert!(target.remove_path("a/b/c.txt").await.unwrap_err().is_not_found());

        Ok(())
    }

    #[tokio::test]
    async fn memory_target() -> Result<()> {
        exercise(&MemoryTarget::new()).await
    }

    #[tokio::test]
    async fn filesystem_target() -> Result<()> {
        let td = tempfile::tempdir()?;
        exercise(&FilesystemTarget::new(td.path())).await
    }

    #[tokio::test]
    async fn sub_targets_share_storage() -> Result<()> {
        let target = MemoryTarget::new();
        let sub = target.sub("repo/").sub("x86_64");

        sub.write_path(
            Cow::Borrowed("repo.db"),
            Box::pin(futures::io::Cursor::new(vec![1, 2, 3])),
        )
        .await?;

        assert_eq!(target.get("repo/x86_64/repo.db"), Some(vec![1, 2, 3]));

        Ok(())
    }

    #[tokio::test]
    async fn copy_tree_publishes_files() -> Result<()> {
        let td = tempfile::tempdir()?;
        std::fs::create_dir_all(td.path().join("dists/stable"))?;
        std::fs::write(td.path().join("dists/stable/Release"), b"release")?;
        std::fs::write(td.path().join("key.asc"), b"key")?;

        let target = MemoryTarget::new();
        target.insert("unrelated", b"keep".to_vec());

        let written = target.copy_tree(td.path()).await?;
        assert_eq!(written, vec!["dists/stable/Release".to_string(), "key.asc".to_string()]);
        assert_eq!(target.get("dists/stable/Release"), Some(b"release".to_vec()));
        assert_eq!(target.get("unrelated"), Some(b"keep".to_vec()));

        Ok(())
    }
}
