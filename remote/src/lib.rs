#[cfg(feature = "sql")]
pub mod sql;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

// One row of a run search, params are keyed by their bare name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRow {
    pub run_id: String,
    pub experiment_id: String,
    pub params: BTreeMap<String, String>,
}

impl RunRow {
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }
}

// What the file repository reports back after an upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadInfo {
    pub id: String,
    pub name: String,
    pub size: u64,
    pub uploaded_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadInfo {
    pub id: String,
    pub path: PathBuf,
}

/// Experiment tracker metadata, only the run search and the param log are needed.
///
/// Errors are the store's own diagnostic.
pub trait MetadataStore {
    fn search_runs(&self, experiment_id: &str) -> Result<Vec<RunRow>, String>;

    // Params are write-once per (run, key)
    fn log_param(&self, run_id: &str, key: &str, value: &str) -> Result<(), String>;
}

/// Flat, id addressed file repository.
///
/// Upload hands back an opaque id, download needs that id and picks the local
/// file name itself.
pub trait TransferClient {
    fn upload(&self, name: &str, local_path: &Path) -> Result<UploadInfo, String>;
    fn download(&self, remote_id: &str, dest_dir: &Path) -> Result<DownloadInfo, String>;
}

impl<M: MetadataStore + ?Sized> MetadataStore for &M {
    fn search_runs(&self, experiment_id: &str) -> Result<Vec<RunRow>, String> {
        (**self).search_runs(experiment_id)
    }

    fn log_param(&self, run_id: &str, key: &str, value: &str) -> Result<(), String> {
        (**self).log_param(run_id, key, value)
    }
}

impl<T: TransferClient + ?Sized> TransferClient for &T {
    fn upload(&self, name: &str, local_path: &Path) -> Result<UploadInfo, String> {
        (**self).upload(name, local_path)
    }

    fn download(&self, remote_id: &str, dest_dir: &Path) -> Result<DownloadInfo, String> {
        (**self).download(remote_id, dest_dir)
    }
}
