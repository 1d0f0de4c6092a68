//! File operations: touch, read, write, mkdir, rm, navigation and volume
//! queries.
//!
//! `write` is truncate-and-rewrite: the existing chain is released, a new
//! chain is allocated cluster by cluster, and the directory entry is patched
//! last. On allocation failure mid-write the partial chain is unwound and a
//! file created by the same call is removed again.

use alloc::string::{String, ToString};
use alloc::vec;
use alloc::vec::Vec;

use log::{error, warn};

use crate::bpb::FatType;
use crate::dir::DirItem;
use crate::entry::{Attributes, DirEntryRaw};
use crate::volume::Volume;
use crate::{is_end_of_chain, is_valid_name, short_name_key, split_path, FsError};

#[derive(Debug, Clone)]
pub struct FileStat {
    pub name: String,
    pub size: u32,
    pub is_dir: bool,
    pub first_cluster: u32,
}

#[derive(Debug, Clone)]
pub struct VolumeInfo {
    pub fat_type: FatType,
    pub label: String,
    pub bytes_per_sector: usize,
    pub sectors_per_cluster: u32,
    pub total_clusters: u32,
    pub total_bytes: u64,
    pub free_clusters: u32,
}

impl Volume {
    /// Change the current directory. The recorded path string mirrors the
    /// input: absolute paths are stored verbatim, `..` strips the last
    /// component, anything else is appended.
    pub fn cd(&mut self, path: &str) -> Result<(), FsError> {
        if path.is_empty() {
            return Ok(());
        }
        if path == "/" {
            self.current_cluster = self.root_lookup_cluster();
            self.current_path = String::from("/");
            return Ok(());
        }

        let resolved = self.resolve(path).map_err(|e| {
            error!("Directory not found");
            e
        })?;
        if let Some(entry) = resolved.entry {
            if !entry.is_dir() {
                error!("Not a directory");
                return Err(FsError::NotADirectory);
            }
        }

        self.current_cluster = resolved.cluster;

        if path.starts_with('/') {
            self.current_path = path.to_string();
        } else if path == ".." {
            match self.current_path.rfind('/') {
                Some(0) | None => self.current_path = String::from("/"),
                Some(pos) => self.current_path.truncate(pos),
            }
        } else if path != "." {
            if self.current_path.len() > 1 {
                self.current_path.push('/');
            }
            self.current_path.push_str(path);
        }
        Ok(())
    }

    pub fn pwd(&self) -> &str {
        &self.current_path
    }

    /// List a directory. Entries come back in on-disk order, dot entries
    /// included; formatting (trailing `/`, size column, dropping `.`/`..`)
    /// is the caller's concern.
    pub fn list_dir(&mut self, path: &str) -> Result<Vec<DirItem>, FsError> {
        let cluster = if path.is_empty() || path == "." {
            self.current_cluster
        } else {
            let resolved = self.resolve(path).map_err(|e| {
                error!("Directory not found");
                e
            })?;
            if let Some(entry) = resolved.entry {
                if !entry.is_dir() {
                    error!("Not a directory");
                    return Err(FsError::NotADirectory);
                }
            }
            resolved.cluster
        };
        self.read_dir(cluster)
    }

    /// Read file contents into `buf`, capped at `min(file_size, buf.len())`.
    /// Returns the number of bytes read.
    pub fn read(&mut self, path: &str, buf: &mut [u8]) -> Result<usize, FsError> {
        let resolved = self.resolve(path)?;
        let entry = resolved.entry.ok_or(FsError::IsADirectory)?;
        if entry.is_dir() {
            return Err(FsError::IsADirectory);
        }

        let to_read = (entry.file_size() as usize).min(buf.len());
        let bps = self.layout.bytes_per_sector;
        let mut cluster = entry.first_cluster(self.layout.fat_type);
        let mut total = 0;

        while cluster >= 2 && !is_end_of_chain(cluster) && total < to_read {
            let first_sector = self.layout.first_sector_of_cluster(cluster);
            for s in 0..self.layout.sectors_per_cluster {
                if total >= to_read {
                    break;
                }
                self.read_sector_buf(first_sector + s)?;
                let chunk = (to_read - total).min(bps);
                buf[total..total + chunk].copy_from_slice(&self.sector_buf[..chunk]);
                total += chunk;
            }
            cluster = self.fat.next_cluster(cluster);
        }
        Ok(total)
    }

    /// Read a whole file.
    pub fn read_file(&mut self, path: &str) -> Result<Vec<u8>, FsError> {
        let stat = self.stat(path)?;
        if stat.is_dir {
            return Err(FsError::IsADirectory);
        }
        let mut buf = vec![0u8; stat.size as usize];
        let n = self.read(path, &mut buf)?;
        buf.truncate(n);
        Ok(buf)
    }

    pub fn stat(&mut self, path: &str) -> Result<FileStat, FsError> {
        let resolved = self.resolve(path)?;
        match resolved.entry {
            Some(entry) => {
                let leaf = split_path(path).1;
                let name = if leaf.is_empty() {
                    entry.short_name()
                } else {
                    leaf.to_string()
                };
                Ok(FileStat {
                    name,
                    size: entry.file_size(),
                    is_dir: entry.is_dir(),
                    first_cluster: entry.first_cluster(self.layout.fat_type),
                })
            }
            None => Ok(FileStat {
                name: String::from("/"),
                size: 0,
                is_dir: true,
                first_cluster: resolved.cluster,
            }),
        }
    }

    pub fn exists(&mut self, path: &str) -> bool {
        self.resolve(path).is_ok()
    }

    pub fn is_dir(&mut self, path: &str) -> bool {
        match self.resolve(path) {
            Ok(resolved) => resolved.entry.map(|e| e.is_dir()).unwrap_or(true),
            Err(_) => false,
        }
    }

    /// Create an empty file. Succeeds silently when the file already
    /// exists; fails when a directory of that name exists.
    pub fn touch(&mut self, path: &str) -> Result<(), FsError> {
        let (parent, leaf) = split_path(path);
        if !is_valid_name(leaf) {
            error!("Invalid filename");
            return Err(FsError::InvalidName);
        }

        let parent_cluster = self.resolve_parent_cluster(parent).map_err(|e| {
            error!("Parent directory not found");
            e
        })?;

        if let Some(existing) = self.find_in_dir(parent_cluster, leaf)? {
            if existing.is_dir() {
                error!("A directory with this name exists");
                return Err(FsError::IsADirectory);
            }
            return Ok(());
        }

        self.create_entry(parent_cluster, leaf, Attributes::ARCHIVE, 0)
            .map_err(|e| {
                error!("{}", e);
                e
            })?;
        Ok(())
    }

    /// Truncate-and-rewrite `path` with `data`, creating the file first
    /// when it does not exist.
    pub fn write(&mut self, path: &str, data: &[u8]) -> Result<(), FsError> {
        let existing = match self.resolve(path) {
            Ok(resolved) => match resolved.entry {
                Some(entry) => Some(entry),
                // Bare root: nothing to write to.
                None => return Err(FsError::IsADirectory),
            },
            Err(FsError::NotFound) => None,
            Err(e) => return Err(e),
        };

        if let Some(entry) = &existing {
            if entry.is_dir() {
                error!("Cannot write to directory");
                return Err(FsError::IsADirectory);
            }
        }

        let created = existing.is_none();
        let entry = match existing {
            Some(entry) => entry,
            None => {
                self.touch(path)?;
                self.resolve(path)?.entry.ok_or(FsError::NotFound)?
            }
        };

        // Release the file's current chain before building the new one.
        let old_first = entry.first_cluster(self.layout.fat_type);
        if old_first >= 2 {
            self.fat.free_chain(old_first)?;
        } else {
            self.fat.flush()?;
        }

        let (parent, leaf) = split_path(path);
        let parent_cluster = self.resolve_parent_cluster(parent)?;
        let key = short_name_key(leaf);

        if data.is_empty() {
            self.patch_entry_by_key(parent_cluster, &key, |e| {
                e.set_first_cluster(0);
                e.set_file_size(0);
            })?;
            return Ok(());
        }

        let bps = self.layout.bytes_per_sector;
        let mut first_cluster = 0u32;
        let mut prev_cluster = 0u32;
        let mut written = 0usize;

        while written < data.len() {
            let cluster = match self.fat.alloc() {
                Some(c) => c,
                None => {
                    // Unwind the chain built so far; drop the entry again
                    // when this call created it.
                    if first_cluster != 0 {
                        self.fat.free_chain(first_cluster)?;
                    }
                    if created {
                        let _ = self.rm(path);
                    }
                    error!("Disk full");
                    return Err(FsError::DiskFull);
                }
            };
            if first_cluster == 0 {
                first_cluster = cluster;
            }
            if prev_cluster != 0 {
                self.fat.set(prev_cluster, cluster)?;
            }
            prev_cluster = cluster;

            let first_sector = self.layout.first_sector_of_cluster(cluster);
            for s in 0..self.layout.sectors_per_cluster {
                if written >= data.len() {
                    break;
                }
                let chunk = (data.len() - written).min(bps);
                self.sector_buf.fill(0);
                self.sector_buf[..chunk].copy_from_slice(&data[written..written + chunk]);
                self.write_sector_buf(first_sector + s)?;
                written += chunk;
            }
        }

        self.fat.flush()?;

        let patched = self.patch_entry_by_key(parent_cluster, &key, |e| {
            e.set_first_cluster(first_cluster);
            e.set_file_size(data.len() as u32);
        })?;
        if !patched {
            warn!("directory entry vanished while writing");
            return Err(FsError::NotFound);
        }
        Ok(())
    }

    /// Create a directory: one zeroed cluster holding `.` and `..`, then a
    /// directory entry in the parent.
    pub fn mkdir(&mut self, path: &str) -> Result<(), FsError> {
        let (parent, leaf) = split_path(path);
        if !is_valid_name(leaf) {
            error!("Invalid directory name");
            return Err(FsError::InvalidName);
        }

        let parent_cluster = self.resolve_parent_cluster(parent).map_err(|e| {
            error!("Parent not found");
            e
        })?;

        if self.find_in_dir(parent_cluster, leaf)?.is_some() {
            error!("Already exists");
            return Err(FsError::AlreadyExists);
        }

        let new_cluster = match self.fat.alloc() {
            Some(c) => c,
            None => {
                error!("Disk full");
                return Err(FsError::DiskFull);
            }
        };

        // `.` points at the directory itself, `..` at the parent.
        self.sector_buf.fill(0);
        let dot = DirEntryRaw::new(b".          ", Attributes::DIRECTORY, new_cluster);
        let dotdot = DirEntryRaw::new(b"..         ", Attributes::DIRECTORY, parent_cluster);
        self.sector_buf[0..32].copy_from_slice(dot.as_bytes());
        self.sector_buf[32..64].copy_from_slice(dotdot.as_bytes());
        let first_sector = self.layout.first_sector_of_cluster(new_cluster);
        self.write_sector_buf(first_sector)?;

        match self.create_entry(parent_cluster, leaf, Attributes::DIRECTORY, new_cluster) {
            Ok(_) => Ok(()),
            Err(e) => {
                // Roll the fresh cluster back so it is not leaked.
                self.fat.set(new_cluster, 0)?;
                self.fat.flush()?;
                error!("{}", e);
                Err(e)
            }
        }
    }

    /// Remove a file or directory: release the cluster chain, flush, then
    /// mark the short entry deleted. LFN slots in front of it stay on disk;
    /// enumeration treats orphaned LFN runs as garbage.
    pub fn rm(&mut self, path: &str) -> Result<(), FsError> {
        let (parent, leaf) = split_path(path);
        let parent_cluster = self.resolve_parent_cluster(parent).map_err(|e| {
            error!("Parent not found");
            e
        })?;

        let entry = self.find_in_dir(parent_cluster, leaf)?.ok_or_else(|| {
            error!("Not found");
            FsError::NotFound
        })?;

        let first = entry.first_cluster(self.layout.fat_type);
        if first >= 2 {
            self.fat.free_chain(first)?;
        } else {
            self.fat.flush()?;
        }

        let key = short_name_key(leaf);
        self.patch_entry_by_key(parent_cluster, &key, |e| e.mark_deleted())?;
        Ok(())
    }

    /// Volume summary, free-cluster count included.
    pub fn info(&mut self) -> VolumeInfo {
        let free = self.fat.count_free();
        VolumeInfo {
            fat_type: self.layout.fat_type,
            label: self.label.clone(),
            bytes_per_sector: self.layout.bytes_per_sector,
            sectors_per_cluster: self.layout.sectors_per_cluster,
            total_clusters: self.layout.total_clusters,
            total_bytes: self.layout.total_clusters as u64 * self.layout.cluster_size() as u64,
            free_clusters: free,
        }
    }
}
