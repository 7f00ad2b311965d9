use std::path::{Path, PathBuf};

use log::debug;

use remote::{MetadataStore, TransferClient};

use crate::config::WalkConfig;
use crate::error::{Error, Result};
use crate::manifest::Manifest;
use crate::store::ManifestStore;
use crate::transfer;
use crate::uri::{join_path, normalize, ArtifactUri};
use crate::vfs::{self, VirtualNode};

/// Artifact repository of one run, rooted at an `onesait-platform://` uri.
///
/// Paths given to and returned by the repository are relative to the uri.
/// Every call reloads the manifest, nothing is cached between calls.
pub struct ArtifactRepository<M: MetadataStore, T: TransferClient> {
    uri: ArtifactUri,
    metadata: M,
    transfer: T,
    walk: WalkConfig,
}

impl<M: MetadataStore, T: TransferClient> ArtifactRepository<M, T> {
    pub fn new(artifact_uri: &str, metadata: M, transfer: T) -> Result<Self> {
        Ok(ArtifactRepository {
            uri: ArtifactUri::parse(artifact_uri)?,
            metadata,
            transfer,
            walk: WalkConfig::default(),
        })
    }

    pub fn with_walk(mut self, walk: WalkConfig) -> Self {
        self.walk = walk;
        self
    }

    pub fn uri(&self) -> &ArtifactUri {
        &self.uri
    }

    fn store(&self) -> ManifestStore<'_, M> {
        ManifestStore::new(&self.metadata)
    }

    // Manifest path of a repository relative path
    fn full_path(&self, path: Option<&str>) -> Option<String> {
        join_path(self.uri.path.as_deref(), path)
    }

    // Repository relative path of a manifest path
    fn relative<'p>(&self, path: &'p str) -> &'p str {
        match &self.uri.path {
            None => path,
            Some(base) => path
                .strip_prefix(base.as_str())
                .and_then(|rest| rest.strip_prefix('/'))
                .unwrap_or(path),
        }
    }

    pub fn manifest(&self) -> Result<Manifest> {
        self.store().load(&self.uri)
    }

    pub fn log_artifact(&self, local_file: &Path, artifact_path: Option<&str>) -> Result<()> {
        let subpath = self.full_path(artifact_path);
        transfer::upload_file(
            &self.store(),
            &self.transfer,
            &self.uri,
            local_file,
            subpath.as_deref(),
        )?;
        Ok(())
    }

    pub fn log_artifacts(&self, local_dir: &Path, artifact_path: Option<&str>) -> Result<()> {
        let subpath = self.full_path(artifact_path);
        let records = transfer::upload_tree(
            &self.store(),
            &self.transfer,
            &self.uri,
            local_dir,
            subpath.as_deref(),
            self.walk,
        )?;
        debug!("Logged {} artifacts from {}", records.len(), local_dir.display());
        Ok(())
    }

    pub fn list_artifacts(&self, path: Option<&str>) -> Result<Vec<VirtualNode>> {
        let manifest = self.manifest()?;
        let full = self.full_path(path);

        Ok(vfs::list(&manifest, full.as_deref())
            .into_iter()
            .map(|node| VirtualNode {
                name: self.relative(&node.name).to_string(),
                ..node
            })
            .collect())
    }

    pub fn is_directory(&self, path: &str) -> Result<bool> {
        let manifest = self.manifest()?;
        let full = self.full_path(Some(path)).unwrap_or_default();
        Ok(vfs::is_directory(&manifest, &full))
    }

    /// Downloads the file or the whole directory at `remote_path` below
    /// `local_dst`, keeping the artifact layout. Returns the local path that
    /// corresponds to `remote_path`.
    pub fn download_artifacts(&self, remote_path: &str, local_dst: &Path) -> Result<PathBuf> {
        let manifest = self.manifest()?;
        let full = self.full_path(Some(remote_path));

        if let Some(file) = full.as_deref().filter(|p| !vfs::is_directory(&manifest, p)) {
            let record = vfs::resolve_one(&manifest, file)?;
            let target = local_parent(local_dst, self.relative(file));
            return transfer::download_one(&self.transfer, &record.remote_id, &target);
        }

        let records = vfs::walk(&manifest, full.as_deref());
        if records.is_empty() {
            return Err(Error::ArtifactNotFound(remote_path.to_string()));
        }

        for record in records {
            // Duplicated paths are refused here as well
            let record = vfs::resolve_one(&manifest, &record.relative_path)?;
            let target = local_parent(local_dst, self.relative(&record.relative_path));
            transfer::download_one(&self.transfer, &record.remote_id, &target)?;
        }

        Ok(match normalize(remote_path) {
            Some(p) => local_path(local_dst, &p),
            None => local_dst.to_path_buf(),
        })
    }
}

fn local_path(root: &Path, relative: &str) -> PathBuf {
    relative.split('/').fold(root.to_path_buf(), |acc, step| acc.join(step))
}

// Local directory a relative artifact path lands in
fn local_parent(root: &Path, relative: &str) -> PathBuf {
    match relative.rsplit_once('/') {
        Some((dir, _)) => local_path(root, dir),
        None => root.to_path_buf(),
    }
}
