use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use ignore::WalkBuilder;
use log::{debug, info, warn};

use remote::{MetadataStore, TransferClient};

use crate::config::WalkConfig;
use crate::error::{Error, Result};
use crate::manifest::ArtifactRecord;
use crate::store::ManifestStore;
use crate::uri::{join_path, ArtifactUri};

/// Uploads every regular file below `local_root` and indexes it in the run's
/// manifest, prefixed with `artifact_subpath`.
///
/// Links to files are uploaded under the link's own path. Links to
/// directories are only descended with `walk.follow_links`.
///
/// Stops at the first failure. Files uploaded before it stay indexed, nothing
/// after it is attempted.
pub fn upload_tree<M: MetadataStore, T: TransferClient>(
    store: &ManifestStore<M>,
    client: &T,
    uri: &ArtifactUri,
    local_root: &Path,
    artifact_subpath: Option<&str>,
    walk: WalkConfig,
) -> Result<Vec<ArtifactRecord>> {
    let walker = WalkBuilder::new(local_root)
        .follow_links(walk.follow_links)
        .standard_filters(false)
        .same_file_system(walk.same_file_system)
        .sort_by_file_name(|a, b| a.cmp(b))
        .build();

    let mut slots = store.slots(uri)?;
    let mut uploaded = Vec::new();

    for entry in walker {
        let entry = entry?;
        let size = match entry.file_type() {
            Some(ft) if ft.is_file() => entry.metadata()?.len(),
            // Unfollowed links still count when they point at a file
            Some(ft) if ft.is_symlink() => match fs::metadata(entry.path()) {
                Ok(target) if target.is_file() => target.len(),
                Ok(_) => {
                    debug!("SKIP: {}", entry.path().display());
                    continue;
                }
                Err(err) => {
                    warn!("SKIP: dangling link {}: {}", entry.path().display(), err);
                    continue;
                }
            },
            _ => {
                debug!("SKIP: {}", entry.path().display());
                continue;
            }
        };

        let relative = relative_path(local_root, entry.path())?;
        let remote_path = join_path(artifact_subpath, Some(relative.as_str())).unwrap_or(relative);

        let record = upload_one(client, entry.path(), &remote_path, size)?;
        store.append(&uri.run_id, &record, slots.allocate())?;
        uploaded.push(record);
    }

    Ok(uploaded)
}

/// Uploads one file as `artifact_subpath/<file name>`.
pub fn upload_file<M: MetadataStore, T: TransferClient>(
    store: &ManifestStore<M>,
    client: &T,
    uri: &ArtifactUri,
    local_file: &Path,
    artifact_subpath: Option<&str>,
) -> Result<ArtifactRecord> {
    let name = file_name(local_file)?;
    let remote_path = join_path(artifact_subpath, Some(name)).unwrap_or_else(|| name.to_string());
    let size = local_file.metadata()?.len();

    let next_index = store.next_index(uri)?;
    let record = upload_one(client, local_file, &remote_path, size)?;
    store.append(&uri.run_id, &record, next_index)?;
    Ok(record)
}

fn upload_one<T: TransferClient>(
    client: &T,
    local_path: &Path,
    remote_path: &str,
    size: u64,
) -> Result<ArtifactRecord> {
    let info = client
        .upload(file_name(local_path)?, local_path)
        .map_err(|diag| {
            Error::TransferFailed(format!("upload of {}: {}", local_path.display(), diag))
        })?;
    info!("Uploaded artifact {} as {} ({} bytes)", remote_path, info.id, size);

    Ok(ArtifactRecord {
        relative_path: remote_path.to_string(),
        remote_id: info.id,
        size_bytes: Some(size),
    })
}

/// Downloads `remote_id` into `local_dir`, the client picks the file name.
pub fn download_one<T: TransferClient>(
    client: &T,
    remote_id: &str,
    local_dir: &Path,
) -> Result<PathBuf> {
    let info = client
        .download(remote_id, local_dir)
        .map_err(|diag| Error::TransferFailed(format!("download of {}: {}", remote_id, diag)))?;
    info!("Downloaded artifact {} to {}", remote_id, info.path.display());
    Ok(info.path)
}

fn file_name(path: &Path) -> Result<&str> {
    path.file_name()
        .ok_or_else(|| {
            Error::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} has no file name", path.display()),
            ))
        })?
        .to_str()
        .ok_or_else(|| Error::NonUtf8Path(path.to_path_buf()))
}

// Forward slash path of `path` below `root`, whatever the platform separator
fn relative_path(root: &Path, path: &Path) -> Result<String> {
    let relative = path.strip_prefix(root).map_err(|_| {
        Error::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} is not below {}", path.display(), root.display()),
        ))
    })?;

    // Walking a single file yields the root itself
    if relative.as_os_str().is_empty() {
        return file_name(path).map(str::to_string);
    }

    let mut steps = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(step) => steps.push(
                step.to_str()
                    .ok_or_else(|| Error::NonUtf8Path(path.to_path_buf()))?,
            ),
            Component::CurDir => (),
            _ => {
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("unexpected component in {}", path.display()),
                )))
            }
        }
    }
    Ok(steps.join("/"))
}
