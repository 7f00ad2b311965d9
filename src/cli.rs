use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "osp-artifacts")]
#[command(about = "Run artifacts stored in the Onesait Platform file repository")]
#[command(author, version, long_about = None)]
pub struct Cli {
    /// Sets a custom config file, otherwise OSP_CONFIG_PATH is used
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Registers a new run and prints its artifact uri
    CreateRun {
        /// Experiment the run belongs to
        #[arg(short, long)]
        experiment: u64,
    },

    /// Uploads a local directory into a run's artifacts
    Log {
        /// Artifact uri of the run
        uri: String,

        /// Local directory to upload
        local_dir: PathBuf,

        /// Artifact path to upload under
        #[arg(short, long)]
        path: Option<String>,
    },

    /// Lists one level of a run's artifacts
    Ls {
        /// Artifact uri of the run
        uri: String,

        /// Artifact path to list, root by default
        path: Option<String>,
    },

    /// Downloads an artifact file or directory
    Get {
        /// Artifact uri of the run
        uri: String,

        /// Artifact path to download
        remote_path: String,

        /// Local destination directory
        dest: PathBuf,
    },
}
