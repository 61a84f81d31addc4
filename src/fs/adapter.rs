//! Bridges a path-keyed [`super::BackingFs`] to the file-id-keyed
//! [`crate::vfs::NFSFileSystem`] trait the rest of the RPC stack is written
//! against.
//!
//! Path <-> fileid translation goes through [`crate::handle_table`]; caching
//! and read-ahead are applied here so every handler gets them uniformly
//! regardless of which `BackingFs` is plugged in.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;

use crate::cache::{AttrCache, CacheLookup, DirCache, ReadAheadBuffer};
use crate::config::ExportOptions;
use crate::fs::{self, to_nfsstat3, BackingFs, BackingFsError};
use crate::handle_table::HandleTable;
use crate::metrics::Metrics;
use crate::protocol::xdr::nfs3;
use crate::vfs::{Capabilities, DirEntry as VfsDirEntry, NFSFileSystem, ReadDirResult};

/// The fileid reserved for the export root; matches the handle table's
/// first allocation.
const ROOT_FILEID: nfs3::fileid3 = 1;

/// Implements [`NFSFileSystem`] over any [`BackingFs`], adding file-handle
/// allocation, attribute/directory caching, and read-ahead.
pub struct FilesystemAdapter<B: BackingFs> {
    backing: Arc<B>,
    handles: HandleTable,
    generation: u64,
    config: Arc<ExportOptions>,
    attr_cache: AttrCache,
    dir_cache: DirCache,
    read_ahead: ReadAheadBuffer,
    metrics: Arc<Metrics>,
}

impl<B: BackingFs> FilesystemAdapter<B> {
    pub fn new(backing: Arc<B>, config: Arc<ExportOptions>, metrics: Arc<Metrics>) -> Self {
        let handles = HandleTable::new();
        let root = handles.allocate(Path::new("/"));
        debug_assert_eq!(root, ROOT_FILEID);

        let attr_cache = AttrCache::new(
            config.attr_cache_size,
            config.attr_cache_timeout,
            config.negative_cache_timeout,
            config.cache_negative_lookups,
        );
        let dir_cache =
            DirCache::new(config.dir_cache_max_entries, config.dir_cache_timeout, config.dir_cache_max_dir_size);
        let read_ahead = ReadAheadBuffer::new(
            config.read_ahead_max_files,
            config.read_ahead_max_memory,
            config.read_ahead_size,
        );

        Self {
            backing,
            handles,
            generation: generation_from_boot_time(),
            config,
            attr_cache,
            dir_cache,
            read_ahead,
            metrics,
        }
    }

    fn resolve(&self, id: nfs3::fileid3) -> Result<PathBuf, nfs3::nfsstat3> {
        self.handles.get(id).ok_or(nfs3::nfsstat3::NFS3ERR_STALE)
    }

    /// Fetches attributes for `path`, going through the attribute cache.
    async fn cached_lookup(&self, path: &Path) -> Result<nfs3::fattr3, nfs3::nfsstat3> {
        match self.attr_cache.get(path) {
            CacheLookup::Hit(attrs) => {
                self.metrics.record_attr_cache(true);
                return Ok(attrs);
            }
            CacheLookup::Negative => {
                self.metrics.record_attr_cache(true);
                return Err(nfs3::nfsstat3::NFS3ERR_NOENT);
            }
            CacheLookup::Miss => self.metrics.record_attr_cache(false),
        }
        match self.backing.lookup(path).await {
            Ok(attrs) => {
                self.attr_cache.put(path, attrs);
                Ok(attrs)
            }
            Err(BackingFsError::NotFound) => {
                self.attr_cache.put_negative(path);
                Err(nfs3::nfsstat3::NFS3ERR_NOENT)
            }
            Err(e) => Err(to_nfsstat3(e)),
        }
    }

    fn with_fileid(&self, handle: nfs3::fileid3, mut attrs: nfs3::fattr3) -> nfs3::fattr3 {
        attrs.fileid = handle;
        attrs
    }

    fn check_read_only(&self) -> Result<(), nfs3::nfsstat3> {
        if self.config.read_only {
            Err(nfs3::nfsstat3::NFS3ERR_ROFS)
        } else {
            Ok(())
        }
    }

    fn invalidate_mutated(&self, parent: &Path, path: &Path) {
        self.attr_cache.invalidate(path);
        self.attr_cache.invalidate(parent);
        self.attr_cache.invalidate_negative_in_dir(parent);
        self.dir_cache.invalidate(parent);
        self.read_ahead.clear_path(path);
    }
}

/// Derives a per-process generation number from boot time, the same idea as
/// the default `id_to_fh`/`fh_to_id` the trait already provides, just
/// computed once instead of per-handle.
fn generation_from_boot_time() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_nanos() as u64).unwrap_or(0)
}

#[async_trait]
impl<B: BackingFs + 'static> NFSFileSystem for FilesystemAdapter<B> {
    fn generation(&self) -> u64 {
        self.generation
    }

    fn capabilities(&self) -> Capabilities {
        if self.config.read_only {
            Capabilities::ReadOnly
        } else {
            Capabilities::ReadWrite
        }
    }

    fn root_dir(&self) -> nfs3::fileid3 {
        ROOT_FILEID
    }

    async fn lookup(
        &self,
        dirid: nfs3::fileid3,
        filename: &nfs3::filename3,
    ) -> Result<nfs3::fileid3, nfs3::nfsstat3> {
        let dir_path = self.resolve(dirid)?;
        let name = String::from_utf8_lossy(filename.as_ref()).into_owned();
        let child_path = fs::join_checked(&dir_path, &name).map_err(to_nfsstat3)?;
        self.cached_lookup(&child_path).await?;
        Ok(self.handles.allocate(&child_path))
    }

    async fn getattr(&self, id: nfs3::fileid3) -> Result<nfs3::fattr3, nfs3::nfsstat3> {
        let path = self.resolve(id)?;
        let attrs = self.cached_lookup(&path).await?;
        Ok(self.with_fileid(id, attrs))
    }

    async fn setattr(
        &self,
        id: nfs3::fileid3,
        setattr: nfs3::sattr3,
    ) -> Result<nfs3::fattr3, nfs3::nfsstat3> {
        self.check_read_only()?;
        let path = self.resolve(id)?;
        let attrs = self.backing.setattr(&path, &setattr).await.map_err(to_nfsstat3)?;
        self.attr_cache.invalidate(&path);
        Ok(self.with_fileid(id, attrs))
    }

    async fn read(
        &self,
        id: nfs3::fileid3,
        offset: u64,
        count: u32,
    ) -> Result<(Vec<u8>, bool), nfs3::nfsstat3> {
        let path = self.resolve(id)?;
        if self.config.enable_read_ahead {
            if let Some(data) = self.read_ahead.read(&path, offset, count) {
                let attrs = self.cached_lookup(&path).await.unwrap_or_default();
                let eof = offset + data.len() as u64 >= attrs.size;
                return Ok((data, eof));
            }
        }

        if !self.config.enable_read_ahead {
            return self.backing.read(&path, offset, count).await.map_err(to_nfsstat3);
        }

        // Fetch at least `ReadAheadSize` bytes so the buffer actually holds
        // something beyond what the caller asked for, then trim the reply
        // back down to what was requested.
        let fetch_len = count.max(self.read_ahead.min_fill() as u32);
        let (data, backing_eof) =
            self.backing.read(&path, offset, fetch_len).await.map_err(to_nfsstat3)?;
        self.read_ahead.fill(&path, offset, data.clone());

        if data.len() <= count as usize {
            return Ok((data, backing_eof));
        }
        let mut reply = data;
        reply.truncate(count as usize);
        Ok((reply, false))
    }

    async fn write(
        &self,
        id: nfs3::fileid3,
        offset: u64,
        data: &[u8],
        stable: nfs3::file::stable_how,
    ) -> Result<(nfs3::fattr3, nfs3::file::stable_how, nfs3::count3), nfs3::nfsstat3> {
        self.check_read_only()?;
        let path = self.resolve(id)?;
        let (attrs, written) = self.backing.write(&path, offset, data).await.map_err(to_nfsstat3)?;
        self.attr_cache.invalidate(&path);
        self.read_ahead.clear_path(&path);
        Ok((self.with_fileid(id, attrs), stable, written))
    }

    async fn create(
        &self,
        dirid: nfs3::fileid3,
        filename: &nfs3::filename3,
        attr: nfs3::sattr3,
    ) -> Result<(nfs3::fileid3, nfs3::fattr3), nfs3::nfsstat3> {
        self.check_read_only()?;
        let dir_path = self.resolve(dirid)?;
        let name = String::from_utf8_lossy(filename.as_ref()).into_owned();
        fs::validate_name(&name).map_err(to_nfsstat3)?;
        let attrs = self.backing.create(&dir_path, &name, &attr).await.map_err(to_nfsstat3)?;
        let child_path = dir_path.join(&name);
        let handle = self.handles.allocate(&child_path);
        self.invalidate_mutated(&dir_path, &child_path);
        self.attr_cache.put(&child_path, attrs);
        Ok((handle, self.with_fileid(handle, attrs)))
    }

    async fn create_exclusive(
        &self,
        dirid: nfs3::fileid3,
        filename: &nfs3::filename3,
        _verifier: nfs3::createverf3,
    ) -> Result<nfs3::fileid3, nfs3::nfsstat3> {
        // EXCLUSIVE verifier persistence is not implemented; treated as UNCHECKED.
        let (handle, _) = self.create(dirid, filename, nfs3::sattr3::default()).await?;
        Ok(handle)
    }

    async fn mkdir(
        &self,
        dirid: nfs3::fileid3,
        dirname: &nfs3::filename3,
    ) -> Result<(nfs3::fileid3, nfs3::fattr3), nfs3::nfsstat3> {
        self.check_read_only()?;
        let dir_path = self.resolve(dirid)?;
        let name = String::from_utf8_lossy(dirname.as_ref()).into_owned();
        fs::validate_name(&name).map_err(to_nfsstat3)?;
        let attrs = self
            .backing
            .mkdir(&dir_path, &name, &nfs3::sattr3::default())
            .await
            .map_err(to_nfsstat3)?;
        let child_path = dir_path.join(&name);
        let handle = self.handles.allocate(&child_path);
        self.invalidate_mutated(&dir_path, &child_path);
        self.attr_cache.put(&child_path, attrs);
        Ok((handle, self.with_fileid(handle, attrs)))
    }

    async fn remove(
        &self,
        dirid: nfs3::fileid3,
        filename: &nfs3::filename3,
    ) -> Result<(), nfs3::nfsstat3> {
        self.check_read_only()?;
        let dir_path = self.resolve(dirid)?;
        let name = String::from_utf8_lossy(filename.as_ref()).into_owned();
        self.backing.remove(&dir_path, &name).await.map_err(to_nfsstat3)?;
        let child_path = dir_path.join(&name);
        if let Some(handle) = self.handles.find(&child_path) {
            self.handles.release(handle);
        }
        self.invalidate_mutated(&dir_path, &child_path);
        Ok(())
    }

    async fn rename(
        &self,
        from_dirid: nfs3::fileid3,
        from_filename: &nfs3::filename3,
        to_dirid: nfs3::fileid3,
        to_filename: &nfs3::filename3,
    ) -> Result<(), nfs3::nfsstat3> {
        self.check_read_only()?;
        let from_dir = self.resolve(from_dirid)?;
        let to_dir = self.resolve(to_dirid)?;
        let from_name = String::from_utf8_lossy(from_filename.as_ref()).into_owned();
        let to_name = String::from_utf8_lossy(to_filename.as_ref()).into_owned();
        self.backing
            .rename(&from_dir, &from_name, &to_dir, &to_name)
            .await
            .map_err(to_nfsstat3)?;

        let src_path = from_dir.join(&from_name);
        let dst_path = to_dir.join(&to_name);
        if let Some(handle) = self.handles.find(&src_path) {
            self.handles.rekey(handle, &dst_path);
        }
        self.invalidate_mutated(&from_dir, &src_path);
        self.invalidate_mutated(&to_dir, &dst_path);
        Ok(())
    }

    async fn readdir(
        &self,
        dirid: nfs3::fileid3,
        start_after: nfs3::fileid3,
        max_entries: usize,
    ) -> Result<ReadDirResult, nfs3::nfsstat3> {
        let dir_path = self.resolve(dirid)?;

        let entries = match self.config.enable_dir_cache.then(|| self.dir_cache.get(&dir_path)).flatten()
        {
            Some(cached) => {
                self.metrics.record_dir_cache(true);
                cached
            }
            None => {
                if self.config.enable_dir_cache {
                    self.metrics.record_dir_cache(false);
                }
                let listed = self.backing.readdir(&dir_path).await.map_err(to_nfsstat3)?;
                if self.config.enable_dir_cache {
                    self.dir_cache.put(&dir_path, listed.clone());
                }
                Arc::new(listed)
            }
        };

        let mapped: Vec<(nfs3::fileid3, String, nfs3::fattr3)> = entries
            .iter()
            .map(|e| {
                let path = dir_path.join(&e.name);
                let handle = self.handles.allocate(&path);
                (handle, e.name.clone(), self.with_fileid(handle, e.attrs))
            })
            .collect();

        let start_index = if start_after == 0 {
            0
        } else {
            mapped.iter().position(|(id, _, _)| *id == start_after).map(|i| i + 1).unwrap_or(mapped.len())
        };

        let end_index = (start_index + max_entries).min(mapped.len());
        let page = &mapped[start_index.min(mapped.len())..end_index];

        let result_entries = page
            .iter()
            .map(|(id, name, attr)| VfsDirEntry { fileid: *id, name: name.as_bytes().into(), attr: *attr })
            .collect();

        Ok(ReadDirResult { entries: result_entries, end: end_index >= mapped.len() })
    }

    async fn symlink(
        &self,
        dirid: nfs3::fileid3,
        linkname: &nfs3::filename3,
        symlink: &nfs3::nfspath3,
        attr: &nfs3::sattr3,
    ) -> Result<(nfs3::fileid3, nfs3::fattr3), nfs3::nfsstat3> {
        self.check_read_only()?;
        let dir_path = self.resolve(dirid)?;
        let name = String::from_utf8_lossy(linkname.as_ref()).into_owned();
        fs::validate_name(&name).map_err(to_nfsstat3)?;
        let target = String::from_utf8_lossy(symlink.as_ref()).into_owned();
        let attrs = self.backing.symlink(&dir_path, &name, &target, attr).await.map_err(to_nfsstat3)?;
        let child_path = dir_path.join(&name);
        let handle = self.handles.allocate(&child_path);
        self.invalidate_mutated(&dir_path, &child_path);
        self.attr_cache.put(&child_path, attrs);
        Ok((handle, self.with_fileid(handle, attrs)))
    }

    async fn readlink(&self, id: nfs3::fileid3) -> Result<nfs3::nfspath3, nfs3::nfsstat3> {
        let path = self.resolve(id)?;
        let target = self.backing.readlink(&path).await.map_err(to_nfsstat3)?;
        Ok(target.into_bytes().into())
    }

    async fn link(
        &self,
        _file_id: nfs3::fileid3,
        _link_dir_id: nfs3::fileid3,
        _link_name: &nfs3::filename3,
    ) -> Result<nfs3::fattr3, nfs3::nfsstat3> {
        Err(nfs3::nfsstat3::NFS3ERR_NOTSUPP)
    }

    async fn mknod(
        &self,
        _dir_id: nfs3::fileid3,
        _name: &nfs3::filename3,
        _ftype: nfs3::ftype3,
        _specdata: nfs3::specdata3,
        _attrs: &nfs3::sattr3,
    ) -> Result<(nfs3::fileid3, nfs3::fattr3), nfs3::nfsstat3> {
        Err(nfs3::nfsstat3::NFS3ERR_NOTSUPP)
    }

    async fn commit(
        &self,
        file_id: nfs3::fileid3,
        _offset: u64,
        _count: u32,
    ) -> Result<nfs3::fattr3, nfs3::nfsstat3> {
        // The backing filesystem has no separate "stable storage" concept to
        // flush to; writes are already durable by the time `write` returns.
        self.getattr(file_id).await
    }
}
