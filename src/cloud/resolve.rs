//! Remote path resolution.

use tracing::{debug, warn};

use super::client::CloudClient;
use super::error::{CloudError, Result};
use super::node::FileHandle;

/// Split an absolute remote path into its segments
///
/// `"/"` yields no segments; a trailing slash is ignored.
pub fn split_path(path: &str) -> Result<Vec<&str>> {
    let invalid = || CloudError::InvalidPath {
        path: path.to_string(),
    };

    let rest = path.strip_prefix('/').ok_or_else(invalid)?;
    let rest = rest.strip_suffix('/').unwrap_or(rest);
    if rest.is_empty() {
        return Ok(Vec::new());
    }

    let segments: Vec<&str> = rest.split('/').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(invalid());
    }
    Ok(segments)
}

/// Join segments back into an absolute path
pub fn join_path(segments: &[&str]) -> String {
    format!("/{}", segments.join("/"))
}

impl CloudClient {
    /// Resolve a remote path to its handle
    ///
    /// Each call walks from the root; nothing is cached between calls. The
    /// first segment may name a well-known folder, which needs no listing.
    pub async fn stat(&self, path: &str) -> Result<FileHandle> {
        let segments = split_path(path)?;
        let Some(last) = segments.last().copied() else {
            return Ok(FileHandle::root());
        };

        let mut current = FileHandle::root();
        for (depth, segment) in segments.iter().enumerate() {
            if depth == 0 {
                if let Some(known) = FileHandle::known_folder(segment) {
                    current = known;
                    continue;
                }
            }

            if !current.is_folder {
                return Err(CloudError::not_found(path));
            }

            let children = self.list(&current.id, 1).await?;
            current = children
                .into_iter()
                .find(|child| child.name == *segment)
                .ok_or_else(|| CloudError::not_found(path))?;
        }

        if current.name != last {
            return Err(CloudError::not_found(path));
        }

        debug!("Resolved {} to {}", path, current.id);
        Ok(current)
    }

    /// Resolve several paths; each result stands on its own
    pub async fn stat_many<'a>(&self, paths: &'a [String]) -> Vec<(&'a str, Result<FileHandle>)> {
        let mut results = Vec::with_capacity(paths.len());
        for path in paths {
            let result = self.stat(path).await;
            if let Err(e) = &result {
                warn!("{} skipped: {}", path, e);
            }
            results.push((path.as_str(), result));
        }
        results
    }
}
