//! opsmith CLI
//!
//! Command-line front end over the host facade and the registry.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use color_eyre::eyre::eyre;
use tracing_subscriber::EnvFilter;

use opsmith_exec::credential::Credential;
use opsmith_exec::sudo::SudoOptions;
use opsmith_host::copy::CopyOptions;
use opsmith_host::host::Host;
use opsmith_registry::Registry;

#[derive(Parser)]
#[command(name = "opsmith")]
#[command(about = "Host automation: detect, exec, verified copy", long_about = None)]
struct Cli {
    /// Registry label of the target host; the local machine when absent
    #[arg(long, global = true)]
    host: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify the target host's OS variant
    Detect,
    /// Run a command on the target host
    Exec {
        /// The command line to run
        command: String,
        /// Run under sudo
        #[arg(long)]
        sudo: bool,
    },
    /// Copy a local file to the target host, verifying integrity
    Copy {
        /// Local source file
        src: PathBuf,
        /// Destination path on the target host
        dest: String,
        /// Hash and promote under sudo
        #[arg(long)]
        elevate: bool,
    },
    /// List registered hosts
    Hosts,
}

fn bind(label: Option<&str>) -> Result<Host> {
    match label {
        None => {
            let user = std::env::var("USER").unwrap_or_else(|_| "root".to_string());
            Ok(Host::local(user, None))
        }
        Some(label) => {
            let path = Registry::default_path()
                .ok_or_else(|| eyre!("cannot locate the registry without $HOME"))?;
            let registry = Registry::open(path);
            let entry = registry
                .get(label)
                .ok_or_else(|| eyre!("no registered host named '{label}'"))?;

            let credential = entry.ssh_key.as_ref().map(Credential::key);
            Ok(Host::remote(&entry.addr, &entry.user, credential))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Detect => {
            let host = bind(cli.host.as_deref())?;
            let classified = host.classify().await?;
            println!("{}", classified.kind());
        }
        Commands::Exec { command, sudo } => {
            let host = bind(cli.host.as_deref())?;
            let result = if sudo {
                host.sudo(&command, &SudoOptions::default()).await?
            } else {
                host.run(&command).await?
            };

            for line in &result.stdout {
                println!("{line}");
            }
            for line in &result.stderr {
                eprintln!("{line}");
            }
            std::process::exit(result.exit_code);
        }
        Commands::Copy { src, dest, elevate } => {
            let host = bind(cli.host.as_deref())?;
            let opts = CopyOptions {
                elevate,
                password: None,
            };
            host.copy(&src, &dest, &opts).await?;
            println!("copied {} -> {dest}", src.display());
        }
        Commands::Hosts => {
            let path = Registry::default_path()
                .ok_or_else(|| eyre!("cannot locate the registry without $HOME"))?;
            let registry = Registry::open(path);
            if registry.is_empty() {
                println!("no hosts registered");
            }
            for (label, entry) in registry.entries() {
                println!("{label}\t{}@{}", entry.user, entry.addr);
            }
        }
    }

    Ok(())
}
