use bytes::Bytes;

use crate::error::FsError;
use crate::mount::path::{components, is_prefix, join};
use crate::mount::{Change, TreeEdit};

use super::Session;

impl Session {
    /// Create a file that does not exist yet. Missing parent
    ///  directories are created.
    pub async fn create_file(&self, path: &str, data: impl Into<Bytes>) -> Result<(), FsError> {
        let data = data.into();
        tracing::debug!("create_file: {} ({} bytes)", path, data.len());
        let located = self.locate(&self.home_relative(path)?, false).await?;
        self.mount()
            .commit(
                &located.scope,
                &Change::Tree(TreeEdit::Create {
                    path: located.rel,
                    data,
                }),
            )
            .await?;
        Ok(())
    }

    pub async fn mkdir(&self, path: &str) -> Result<(), FsError> {
        tracing::debug!("mkdir: {}", path);
        let located = self.locate(&self.home_relative(path)?, false).await?;
        self.mount()
            .commit(
                &located.scope,
                &Change::Tree(TreeEdit::Mkdir { path: located.rel }),
            )
            .await?;
        Ok(())
    }

    /// Create or replace a file's content
    pub async fn upload(&self, path: &str, data: impl Into<Bytes>) -> Result<(), FsError> {
        let data = data.into();
        tracing::debug!("upload: {} ({} bytes)", path, data.len());
        self.write(path, 0, data, true).await
    }

    /// Overwrite part of a file, extending it if the write runs past
    ///  the end. Writing at an offset beyond the end is an error.
    pub async fn write_at(
        &self,
        path: &str,
        offset: u64,
        data: impl Into<Bytes>,
    ) -> Result<(), FsError> {
        self.write(path, offset, data.into(), false).await
    }

    pub async fn append(&self, path: &str, data: impl Into<Bytes>) -> Result<(), FsError> {
        let data = data.into();
        tracing::debug!("append: {} ({} bytes)", path, data.len());
        let located = self.locate(&self.home_relative(path)?, true).await?;
        self.mount()
            .commit(
                &located.scope,
                &Change::Tree(TreeEdit::Append {
                    path: located.rel,
                    data,
                }),
            )
            .await?;
        Ok(())
    }

    async fn write(
        &self,
        path: &str,
        offset: u64,
        data: Bytes,
        truncate: bool,
    ) -> Result<(), FsError> {
        let located = self.locate(&self.home_relative(path)?, true).await?;
        self.mount()
            .commit(
                &located.scope,
                &Change::Tree(TreeEdit::Write {
                    path: located.rel,
                    offset,
                    data,
                    truncate,
                }),
            )
            .await?;
        Ok(())
    }

    /// Move a file or directory. Both paths must be in the same
    ///  published subtree.
    pub async fn rename(&self, from: &str, to: &str) -> Result<(), FsError> {
        tracing::debug!("rename: {} -> {}", from, to);
        if is_prefix(&components(from)?, &components(to)?) {
            return Err(FsError::MoveIntoSelf {
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        let source = self.locate(&self.home_relative(from)?, false).await?;
        let destination = self.locate(&self.home_relative(to)?, false).await?;
        if source.scope.writer_hash() != destination.scope.writer_hash() {
            return Err(FsError::InvalidPath(format!(
                "cannot move {} across a shared subtree boundary to {}",
                from, to
            )));
        }
        self.mount()
            .commit(
                &source.scope,
                &Change::Tree(TreeEdit::Rename {
                    from: source.rel,
                    to: destination.rel,
                }),
            )
            .await?;
        Ok(())
    }

    /// Remove a file or directory
    ///
    /// Removing a shared item only unlinks it from its parent. Its own
    ///  subtree stays published, so recipients keep their access until
    ///  it is unshared.
    pub async fn delete(&self, path: &str) -> Result<(), FsError> {
        tracing::debug!("delete: {}", path);
        let located = self.locate(&self.home_relative(path)?, false).await?;
        if located.leaf.is_none() {
            return Err(FsError::PathNotFound(join(&components(path)?)));
        }
        self.mount()
            .commit(
                &located.scope,
                &Change::Tree(TreeEdit::Unlink { path: located.rel }),
            )
            .await?;
        Ok(())
    }
}
