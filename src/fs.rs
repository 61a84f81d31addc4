//! Path-keyed filesystem abstraction consumed by [`adapter::FilesystemAdapter`].
//!
//! `BackingFs` is the seam between "the semantics of serving NFSv3" and
//! "where the bytes actually live". It is deliberately narrower than
//! [`crate::vfs::NFSFileSystem`] and addressed by path rather than by file
//! id: the adapter is what bridges the two, the same way the teacher's
//! concrete filesystems (not present in this tree) would have implemented
//! `NFSFileSystem` directly over a local directory.

pub mod adapter;

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::protocol::xdr::nfs3;

/// Failure modes a [`BackingFs`] implementation can report.
///
/// Deliberately coarser than `std::io::ErrorKind`: callers map straight to
/// an NFSv3 status with [`to_nfsstat3`], and the spread of io error kinds
/// that matter to an NFS server is itself small.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackingFsError {
    NotFound,
    PermissionDenied,
    AlreadyExists,
    InvalidArgument,
    ReadOnly,
    NotEmpty,
    NotDirectory,
    IsDirectory,
    Stale,
    NotSupported,
    NameTooLong,
    Io,
}

/// Maps a backing-filesystem failure to the NFSv3 status the wire protocol
/// expects, per the error table the adapter's callers are written against.
pub fn to_nfsstat3(err: BackingFsError) -> nfs3::nfsstat3 {
    use nfs3::nfsstat3::*;
    match err {
        BackingFsError::NotFound => NFS3ERR_NOENT,
        BackingFsError::PermissionDenied => NFS3ERR_ACCES,
        BackingFsError::AlreadyExists => NFS3ERR_EXIST,
        BackingFsError::InvalidArgument => NFS3ERR_INVAL,
        BackingFsError::ReadOnly => NFS3ERR_ROFS,
        BackingFsError::NotEmpty => NFS3ERR_NOTEMPTY,
        BackingFsError::NotDirectory => NFS3ERR_NOTDIR,
        BackingFsError::IsDirectory => NFS3ERR_ISDIR,
        BackingFsError::Stale => NFS3ERR_STALE,
        BackingFsError::NotSupported => NFS3ERR_NOTSUPP,
        BackingFsError::NameTooLong => NFS3ERR_NAMETOOLONG,
        BackingFsError::Io => NFS3ERR_IO,
    }
}

impl From<std::io::Error> for BackingFsError {
    fn from(e: std::io::Error) -> Self {
        use std::io::ErrorKind::*;
        match e.kind() {
            NotFound => BackingFsError::NotFound,
            PermissionDenied => BackingFsError::PermissionDenied,
            AlreadyExists => BackingFsError::AlreadyExists,
            InvalidInput | InvalidData => BackingFsError::InvalidArgument,
            DirectoryNotEmpty => BackingFsError::NotEmpty,
            NotADirectory => BackingFsError::NotDirectory,
            IsADirectory => BackingFsError::IsDirectory,
            ReadOnlyFilesystem => BackingFsError::ReadOnly,
            _ => BackingFsError::Io,
        }
    }
}

/// A single entry returned by [`BackingFs::readdir`].
#[derive(Clone, Debug, Default)]
pub struct DirEntry {
    pub name: String,
    pub attrs: nfs3::fattr3,
}

/// The filesystem operations the adapter needs, addressed by canonical,
/// slash-rooted path rather than by file id.
///
/// Implementations do their own path validation for the primitive they are
/// given; name and traversal validation shared across operations lives in
/// [`adapter`] so it is enforced uniformly regardless of backing store.
#[async_trait]
pub trait BackingFs: Send + Sync {
    /// Stats `path`, returning its attributes.
    async fn lookup(&self, path: &Path) -> Result<nfs3::fattr3, BackingFsError>;

    /// Applies a partial attribute update to `path`.
    async fn setattr(
        &self,
        path: &Path,
        attrs: &nfs3::sattr3,
    ) -> Result<nfs3::fattr3, BackingFsError>;

    /// Reads up to `count` bytes from `path` starting at `offset`, along with
    /// whether the read reached end of file.
    async fn read(
        &self,
        path: &Path,
        offset: u64,
        count: u32,
    ) -> Result<(Vec<u8>, bool), BackingFsError>;

    /// Writes `data` to `path` starting at `offset`, returning the new attrs
    /// and number of bytes actually written.
    async fn write(
        &self,
        path: &Path,
        offset: u64,
        data: &[u8],
    ) -> Result<(nfs3::fattr3, u32), BackingFsError>;

    /// Creates a regular file `name` under `parent`.
    async fn create(
        &self,
        parent: &Path,
        name: &str,
        attrs: &nfs3::sattr3,
    ) -> Result<nfs3::fattr3, BackingFsError>;

    /// Removes a file or empty directory `name` under `parent`.
    async fn remove(&self, parent: &Path, name: &str) -> Result<(), BackingFsError>;

    /// Moves `src_name` under `src_dir` to `dst_name` under `dst_dir`.
    async fn rename(
        &self,
        src_dir: &Path,
        src_name: &str,
        dst_dir: &Path,
        dst_name: &str,
    ) -> Result<(), BackingFsError>;

    /// Creates directory `name` under `parent`.
    async fn mkdir(
        &self,
        parent: &Path,
        name: &str,
        attrs: &nfs3::sattr3,
    ) -> Result<nfs3::fattr3, BackingFsError>;

    /// Creates a symlink `name` under `parent` pointing at `target`.
    async fn symlink(
        &self,
        parent: &Path,
        name: &str,
        target: &str,
        attrs: &nfs3::sattr3,
    ) -> Result<nfs3::fattr3, BackingFsError>;

    /// Reads the target of the symlink at `path`.
    async fn readlink(&self, path: &Path) -> Result<String, BackingFsError>;

    /// Lists the contents of directory `path`.
    async fn readdir(&self, path: &Path) -> Result<Vec<DirEntry>, BackingFsError>;
}

/// Shared name validation for `Create`, `Mkdir`, `Symlink`, `Remove`,
/// `Rename`: reject empty, `.`/`..`, any path separator, NUL, or a name
/// longer than 255 bytes.
pub fn validate_name(name: &str) -> Result<(), BackingFsError> {
    if name.is_empty() || name == "." || name == ".." {
        return Err(BackingFsError::InvalidArgument);
    }
    if name.len() > 255 {
        return Err(BackingFsError::NameTooLong);
    }
    if name.contains('/') || name.contains('\\') || name.contains('\0') {
        return Err(BackingFsError::InvalidArgument);
    }
    Ok(())
}

/// Canonicalizes a client-supplied path: rejects empty input and collapses
/// repeated `/` separators. Does not touch the backing store.
pub fn canonicalize(path: &str) -> Result<PathBuf, BackingFsError> {
    if path.is_empty() {
        return Err(BackingFsError::InvalidArgument);
    }
    let mut out = PathBuf::from("/");
    for component in path.split('/') {
        if component.is_empty() || component == "." {
            continue;
        }
        out.push(component);
    }
    Ok(out)
}

/// Joins `base` with `name`, rejecting traversal outside of `base`.
pub fn join_checked(base: &Path, name: &str) -> Result<PathBuf, BackingFsError> {
    validate_name(name)?;
    Ok(base.join(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalize_collapses_slashes() {
        assert_eq!(canonicalize("//a//b/").unwrap(), PathBuf::from("/a/b"));
        assert_eq!(canonicalize("/").unwrap(), PathBuf::from("/"));
        assert!(canonicalize("").is_err());
    }

    #[test]
    fn validate_name_rejects_dotdot_and_separators() {
        assert!(validate_name("..").is_err());
        assert!(validate_name(".").is_err());
        assert!(validate_name("a/b").is_err());
        assert!(validate_name("").is_err());
        assert!(validate_name(&"a".repeat(256)).is_err());
        assert!(validate_name("ok.txt").is_ok());
    }
}
