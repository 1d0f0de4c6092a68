//! Path resolution: walk slash-separated components from the root or the
//! current directory down to a cluster and its directory entry.

use crate::entry::DirEntryRaw;
use crate::volume::Volume;
use crate::{FatType, FsError};

/// Result of a path walk: the cluster the path denotes, and the directory
/// entry of the final component. The entry is `None` when the walk ends on
/// the root (or the starting directory) without consuming a component.
pub(crate) struct Resolved {
    pub cluster: u32,
    pub entry: Option<DirEntryRaw>,
}

impl Volume {
    /// Resolve `path` against the current directory (or the root for
    /// absolute paths). `.` is a no-op; `..` follows the stored dot-dot
    /// entry and falls back to the root when the directory has none.
    /// Matching is case-insensitive over short and long names. The resolver
    /// reports plain "not found" without naming the failing component.
    pub(crate) fn resolve(&mut self, path: &str) -> Result<Resolved, FsError> {
        let mut cluster = if path.starts_with('/') {
            self.root_lookup_cluster()
        } else {
            self.current_cluster
        };

        let mut entry: Option<DirEntryRaw> = None;

        for component in path.split('/') {
            if component.is_empty() || component == "." {
                continue;
            }

            if component == ".." {
                match self.find_in_dir(cluster, "..")? {
                    Some(dotdot) => {
                        cluster = dotdot.first_cluster(self.layout.fat_type);
                        if cluster == 0 && self.layout.fat_type == FatType::Fat32 {
                            cluster = self.layout.root_cluster;
                        }
                    }
                    None => cluster = self.root_lookup_cluster(),
                }
                entry = None;
                continue;
            }

            let found = self
                .find_in_dir(cluster, component)?
                .ok_or(FsError::NotFound)?;
            cluster = found.first_cluster(self.layout.fat_type);
            if cluster == 0 && self.layout.fat_type == FatType::Fat32 {
                cluster = self.layout.root_cluster;
            }
            entry = Some(found);
        }

        Ok(Resolved { cluster, entry })
    }

    /// Cluster of the directory a parent-path designates: `"."` is the
    /// current directory, `"/"` the root, anything else is resolved.
    pub(crate) fn resolve_parent_cluster(&mut self, parent: &str) -> Result<u32, FsError> {
        match parent {
            "." => Ok(self.current_cluster),
            "/" => Ok(self.root_lookup_cluster()),
            _ => Ok(self.resolve(parent)?.cluster),
        }
    }
}
