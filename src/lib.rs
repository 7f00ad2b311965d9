//! Artifact repository for experiment runs on top of the Onesait Platform
//! file repository.
//!
//! The file repository is flat: an upload returns an opaque id and a download
//! needs it. The path -> id mapping of a run is kept as a manifest in the run's
//! own tracker params, and the directory tree is projected from it on demand.

pub mod config;
pub mod error;
pub mod manifest;
pub mod repo;
pub mod store;
pub mod transfer;
pub mod uri;
pub mod vfs;

pub use crate::config::Config;
pub use crate::error::{Error, Result};
pub use crate::manifest::{ArtifactRecord, Manifest};
pub use crate::repo::ArtifactRepository;
pub use crate::uri::ArtifactUri;
pub use crate::vfs::VirtualNode;

pub use remote::{MetadataStore, TransferClient};
