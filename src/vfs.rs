//! Directory view over a flat manifest.
//!
//! Directories are never stored. A path is a directory when it only ever shows
//! up as a prefix of recorded paths, so every query is a scan of the manifest.

use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::manifest::{ArtifactRecord, Manifest};
use crate::uri::normalize;

/// One entry of a listing, `name` is the full path from the artifact root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualNode {
    pub name: String,
    pub is_directory: bool,
    pub size_bytes: Option<u64>,
}

impl VirtualNode {
    fn file(name: String, size_bytes: Option<u64>) -> Self {
        VirtualNode {
            name,
            is_directory: false,
            size_bytes,
        }
    }

    fn directory(name: String) -> Self {
        VirtualNode {
            name,
            is_directory: true,
            size_bytes: None,
        }
    }
}

/// True unless a record sits at exactly `path`.
pub fn is_directory(manifest: &Manifest, path: &str) -> bool {
    let path = path.trim_matches('/');
    !manifest.iter().any(|r| r.relative_path == path)
}

/// One level of the tree below `path`, in manifest order.
pub fn list(manifest: &Manifest, path: Option<&str>) -> Vec<VirtualNode> {
    let base = path.and_then(normalize);
    let mut seen = HashSet::new();
    let mut nodes = Vec::new();

    for record in manifest {
        let rest = match &base {
            None => record.relative_path.as_str(),
            Some(b) => match record
                .relative_path
                .strip_prefix(b.as_str())
                .and_then(|r| r.strip_prefix('/'))
            {
                Some(r) => r,
                None => continue,
            },
        };

        let (step, is_leaf) = match rest.split_once('/') {
            Some((step, _)) => (step, false),
            None => (rest, true),
        };
        if step.is_empty() || !seen.insert(step) {
            continue;
        }

        let name = match &base {
            None => step.to_string(),
            Some(b) => format!("{}/{}", b, step),
        };
        nodes.push(if is_leaf {
            VirtualNode::file(name, record.size_bytes)
        } else {
            VirtualNode::directory(name)
        });
    }

    nodes
}

/// Every record at or below `path`.
pub fn walk<'m>(manifest: &'m Manifest, path: Option<&str>) -> Vec<&'m ArtifactRecord> {
    let base = path.and_then(normalize);
    manifest
        .iter()
        .filter(|r| match &base {
            None => true,
            Some(b) => r
                .relative_path
                .strip_prefix(b.as_str())
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('/')),
        })
        .collect()
}

/// The one record at exactly `path`.
pub fn resolve_one<'m>(manifest: &'m Manifest, path: &str) -> Result<&'m ArtifactRecord> {
    let path = path.trim_matches('/');
    let mut matches = manifest.iter().filter(|r| r.relative_path == path);

    match (matches.next(), matches.count()) {
        (None, _) => Err(Error::ArtifactNotFound(path.to_string())),
        (Some(record), 0) => Ok(record),
        (Some(_), more) => Err(Error::AmbiguousArtifact {
            path: path.to_string(),
            matches: more + 1,
        }),
    }
}
