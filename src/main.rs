use std::process::ExitCode;

use clap::Parser;
use log::info;

use osp_artifacts::{ArtifactRepository, ArtifactUri, Config, Error, Result};
use remote::sql::SqlRemote;

mod cli;
use crate::cli::Cli;
use crate::cli::Commands;

fn main() -> ExitCode {
    env_logger::init();

    // Parse the cli
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::from_env()?,
    };
    info!("Platform host {} ({:?} tls)", config.host, config.tls);

    // Sqlite store standing in for both the tracker and the file repository
    let remote = SqlRemote::open(config.database.as_deref()).map_err(Error::Configuration)?;
    let (store, walk) = (&remote, config.walk);
    let repo = move |uri: &str| {
        ArtifactRepository::new(uri, store, store).map(|repo| repo.with_walk(walk))
    };

    match &cli.command {
        Commands::CreateRun { experiment } => {
            let experiment = experiment.to_string();
            let run_id = remote.create_run(&experiment).map_err(Error::Metadata)?;
            println!("{}", ArtifactUri::new(&config.host, &experiment, &run_id));
        }
        Commands::Log {
            uri,
            local_dir,
            path,
        } => {
            let repo = repo(uri.as_str())?;
            repo.log_artifacts(local_dir, path.as_deref())?;
            info!("Logged {} into {}", local_dir.display(), repo.uri());
        }
        Commands::Ls { uri, path } => {
            for node in repo(uri.as_str())?.list_artifacts(path.as_deref())? {
                match node.size_bytes {
                    _ if node.is_directory => println!("{}/", node.name),
                    Some(size) => println!("{}\t{}", node.name, size),
                    None => println!("{}\t-", node.name),
                }
            }
        }
        Commands::Get {
            uri,
            remote_path,
            dest,
        } => {
            let local = repo(uri.as_str())?.download_artifacts(remote_path, dest)?;
            println!("{}", local.display());
        }
    }

    Ok(())
}
