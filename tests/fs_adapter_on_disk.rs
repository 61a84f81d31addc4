//! Exercises `fs::adapter::FilesystemAdapter` over a real on-disk backing
//! store, rather than the in-memory double `fs::adapter`'s own unit tests
//! use. Catches path-translation and caching bugs that only show up once
//! bytes actually round-trip through the OS.

mod support;

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use tempfile::TempDir;

use nfs_mamont::config::ExportOptions;
use nfs_mamont::fs::adapter::FilesystemAdapter;
use nfs_mamont::fs::{BackingFs, BackingFsError, DirEntry};
use nfs_mamont::metrics::Metrics;
use nfs_mamont::vfs::NFSFileSystem;
use nfs_mamont::xdr::nfs3;

/// A `BackingFs` rooted at a real directory on disk, addressed the same way
/// `fs::adapter` addresses any backing store: by canonical, slash-rooted
/// path relative to the export root.
struct DiskFs {
    root: PathBuf,
}

impl DiskFs {
    fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn full(&self, path: &Path) -> PathBuf {
        self.root.join(path.strip_prefix("/").unwrap_or(path))
    }

    fn attrs_from_metadata(meta: &std::fs::Metadata) -> nfs3::fattr3 {
        let ftype = if meta.is_dir() { nfs3::ftype3::NF3DIR } else { nfs3::ftype3::NF3REG };
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| nfs3::nfstime3 { seconds: d.as_secs() as u32, nseconds: d.subsec_nanos() })
            .unwrap_or_default();
        nfs3::fattr3 {
            ftype,
            mode: meta.permissions().mode() & 0o7777,
            nlink: 1,
            size: meta.len(),
            used: meta.len(),
            mtime,
            ctime: mtime,
            atime: mtime,
            ..Default::default()
        }
    }
}

#[async_trait]
impl BackingFs for DiskFs {
    async fn lookup(&self, path: &Path) -> Result<nfs3::fattr3, BackingFsError> {
        let meta = tokio::fs::metadata(self.full(path)).await?;
        Ok(Self::attrs_from_metadata(&meta))
    }

    async fn setattr(&self, path: &Path, _attrs: &nfs3::sattr3) -> Result<nfs3::fattr3, BackingFsError> {
        self.lookup(path).await
    }

    async fn read(&self, path: &Path, offset: u64, count: u32) -> Result<(Vec<u8>, bool), BackingFsError> {
        use tokio::io::{AsyncReadExt, AsyncSeekExt};
        let mut file = tokio::fs::File::open(self.full(path)).await?;
        let len = file.metadata().await?.len();
        file.seek(std::io::SeekFrom::Start(offset)).await?;
        let mut buf = vec![0u8; count as usize];
        let mut read = 0usize;
        while read < buf.len() {
            let n = file.read(&mut buf[read..]).await?;
            if n == 0 {
                break;
            }
            read += n;
        }
        buf.truncate(read);
        let eof = offset + buf.len() as u64 >= len;
        Ok((buf, eof))
    }

    async fn write(&self, path: &Path, offset: u64, data: &[u8]) -> Result<(nfs3::fattr3, u32), BackingFsError> {
        use tokio::io::{AsyncSeekExt, AsyncWriteExt};
        let mut file =
            tokio::fs::OpenOptions::new().write(true).open(self.full(path)).await?;
        file.seek(std::io::SeekFrom::Start(offset)).await?;
        file.write_all(data).await?;
        let attrs = self.lookup(path).await?;
        Ok((attrs, data.len() as u32))
    }

    async fn create(&self, parent: &Path, name: &str, _attrs: &nfs3::sattr3) -> Result<nfs3::fattr3, BackingFsError> {
        let target = self.full(&parent.join(name));
        tokio::fs::File::create(&target).await?;
        self.lookup(&parent.join(name)).await
    }

    async fn remove(&self, parent: &Path, name: &str) -> Result<(), BackingFsError> {
        let target = self.full(&parent.join(name));
        let meta = tokio::fs::metadata(&target).await?;
        if meta.is_dir() {
            tokio::fs::remove_dir(&target).await?;
        } else {
            tokio::fs::remove_file(&target).await?;
        }
        Ok(())
    }

    async fn rename(&self, src_dir: &Path, src_name: &str, dst_dir: &Path, dst_name: &str) -> Result<(), BackingFsError> {
        let src = self.full(&src_dir.join(src_name));
        let dst = self.full(&dst_dir.join(dst_name));
        tokio::fs::rename(src, dst).await?;
        Ok(())
    }

    async fn mkdir(&self, parent: &Path, name: &str, _attrs: &nfs3::sattr3) -> Result<nfs3::fattr3, BackingFsError> {
        let target = self.full(&parent.join(name));
        tokio::fs::create_dir(&target).await?;
        self.lookup(&parent.join(name)).await
    }

    async fn symlink(&self, parent: &Path, name: &str, target: &str, _attrs: &nfs3::sattr3) -> Result<nfs3::fattr3, BackingFsError> {
        let link = self.full(&parent.join(name));
        std::os::unix::fs::symlink(target, &link)?;
        self.lookup(&parent.join(name)).await
    }

    async fn readlink(&self, path: &Path) -> Result<String, BackingFsError> {
        let target = tokio::fs::read_link(self.full(path)).await?;
        Ok(target.to_string_lossy().into_owned())
    }

    async fn readdir(&self, path: &Path) -> Result<Vec<DirEntry>, BackingFsError> {
        let mut entries = Vec::new();
        let mut rd = tokio::fs::read_dir(self.full(path)).await?;
        while let Some(entry) = rd.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let meta = entry.metadata().await?;
            entries.push(DirEntry { name, attrs: DiskFs::attrs_from_metadata(&meta) });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}

fn adapter(dir: &TempDir, config: ExportOptions) -> FilesystemAdapter<DiskFs> {
    FilesystemAdapter::new(
        Arc::new(DiskFs::new(dir.path().to_path_buf())),
        Arc::new(config),
        Arc::new(Metrics::new()),
    )
}

#[tokio::test]
async fn create_write_read_round_trips_through_real_files() {
    support::init_logging();
    let dir = tempfile::tempdir().unwrap();
    let fs = adapter(&dir, ExportOptions::default());
    let root = fs.root_dir();

    let (handle, _) =
        fs.create(root, &b"greeting.txt"[..].into(), nfs3::sattr3::default()).await.unwrap();
    fs.write(handle, 0, b"hello disk", nfs3::file::stable_how::FILE_SYNC).await.unwrap();

    let (data, eof) = fs.read(handle, 0, 5).await.unwrap();
    assert_eq!(data, b"hello");
    assert!(!eof);

    assert!(dir.path().join("greeting.txt").exists());
}

#[tokio::test]
async fn read_ahead_fill_does_not_leak_extra_bytes_into_the_reply() {
    support::init_logging();
    let dir = tempfile::tempdir().unwrap();
    let mut config = ExportOptions::default();
    config.enable_read_ahead = true;
    config.read_ahead_size = 64 * 1024;
    let fs = adapter(&dir, config);
    let root = fs.root_dir();

    let (handle, _) =
        fs.create(root, &b"big.bin"[..].into(), nfs3::sattr3::default()).await.unwrap();
    let payload = vec![7u8; 32 * 1024];
    fs.write(handle, 0, &payload, nfs3::file::stable_how::FILE_SYNC).await.unwrap();

    // A small request on a file large enough to trigger a read-ahead fill
    // (`read_ahead_size` exceeds the requested count) must still come back
    // trimmed to exactly what was asked for.
    let (data, _) = fs.read(handle, 0, 10).await.unwrap();
    assert_eq!(data.len(), 10);
    assert_eq!(data, vec![7u8; 10]);

    // A second read further into the file should be served from the
    // read-ahead buffer filled by the first call rather than hitting disk
    // again, and still be trimmed correctly.
    let (data2, _) = fs.read(handle, 10, 20).await.unwrap();
    assert_eq!(data2.len(), 20);
}

#[tokio::test]
async fn mkdir_rename_and_remove_round_trip() {
    support::init_logging();
    let dir = tempfile::tempdir().unwrap();
    let fs = adapter(&dir, ExportOptions::default());
    let root = fs.root_dir();

    let (sub, _) = fs.mkdir(root, &b"sub"[..].into()).await.unwrap();
    fs.create(sub, &b"a.txt"[..].into(), nfs3::sattr3::default()).await.unwrap();

    fs.rename(sub, &b"a.txt"[..].into(), root, &b"a.txt"[..].into()).await.unwrap();
    assert!(dir.path().join("a.txt").exists());
    assert!(!dir.path().join("sub/a.txt").exists());

    fs.remove(root, &b"a.txt"[..].into()).await.unwrap();
    assert!(!dir.path().join("a.txt").exists());
}

#[tokio::test]
async fn directory_larger_than_max_dir_size_is_served_but_not_cached() {
    support::init_logging();
    let dir = tempfile::tempdir().unwrap();
    let mut config = ExportOptions::default();
    config.enable_dir_cache = true;
    config.dir_cache_max_dir_size = 3;
    let fs = adapter(&dir, config);
    let root = fs.root_dir();

    for i in 0..5 {
        let name = format!("f{i}.txt");
        fs.create(root, &name.as_bytes().into(), nfs3::sattr3::default()).await.unwrap();
    }

    let first = fs.readdir(root, 0, 100).await.unwrap();
    assert_eq!(first.entries.len(), 5);

    // A write under a dir-cache miss (oversized directories never get
    // cached) must be visible on the very next listing; if the first
    // `readdir` had wrongly cached an oversized directory, this new file
    // would be missing from the second listing.
    fs.create(root, &b"f5.txt"[..].into(), nfs3::sattr3::default()).await.unwrap();
    let second = fs.readdir(root, 0, 100).await.unwrap();
    assert_eq!(second.entries.len(), 6);
}
