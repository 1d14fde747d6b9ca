//! upfall CLI - upload a file and print a public URL.
//!
//! Providers are tried in preference order until one succeeds.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use upfall_common::UploadOptions;
use upfall_storage::{
    create_default_registry, CachedCredentials, DropboxSettings, DropboxUploader, EnvCredentials,
    MemoryDropboxApi, UploadClient,
};
use upfall_upload::{check, check_all, ProviderSelector, UploadConfig, Uploader};

#[derive(Parser)]
#[command(name = "upfall")]
#[command(about = "upfall - Upload a file to the first storage provider that works")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a file and print its URL.
    Upload {
        /// File to upload.
        file: PathBuf,

        /// Provider to use; repeat to build a fallback chain.
        #[arg(short, long = "provider")]
        providers: Vec<String>,

        /// Add a timestamp to the remote file name.
        #[arg(long)]
        unique: bool,

        /// Overwrite an existing remote file.
        #[arg(long)]
        force: bool,

        /// Remote folder to upload into.
        #[arg(long)]
        upload_path: Option<String>,

        /// Remote file name to use instead of the local one.
        #[arg(long)]
        remote_path: Option<String>,

        /// Run the Dropbox protocol against an in-memory store.
        #[arg(long)]
        dry_run: bool,
    },

    /// Show whether providers are ready to use.
    Setup {
        /// Provider to check (default: all).
        provider: Option<String>,

        /// Print statuses as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    dotenvy::dotenv().ok();

    let credentials = Arc::new(CachedCredentials::new(EnvCredentials));
    let registry =
        create_default_registry(credentials.clone()).context("Failed to register providers")?;
    let uploader = Uploader::new(registry).with_config(UploadConfig::from_source(credentials.as_ref()));

    match cli.command {
        Commands::Upload {
            file,
            providers,
            unique,
            force,
            upload_path,
            remote_path,
            dry_run,
        } => {
            let mut options = UploadOptions::new().with_unique(unique).with_force(force);
            if let Some(path) = upload_path {
                options = options.with_upload_path(path);
            }
            if let Some(name) = remote_path {
                options = options.with_remote_path(name);
            }

            if dry_run {
                cmd_dry_run(&file, &options).await
            } else {
                cmd_upload(&uploader, &file, providers, &options).await
            }
        }

        Commands::Setup { provider, json } => cmd_setup(&uploader, provider.as_deref(), json).await,
    }
}

/// Upload through the selected providers.
async fn cmd_upload(
    uploader: &Uploader,
    file: &Path,
    mut providers: Vec<String>,
    options: &UploadOptions,
) -> Result<()> {
    let selector = match providers.len() {
        0 => ProviderSelector::Default,
        1 => ProviderSelector::from(providers.swap_remove(0)),
        _ => ProviderSelector::from(providers),
    };

    let result = uploader
        .upload(file, selector, options)
        .await
        .with_context(|| format!("Failed to upload {}", file.display()))?;

    info!("Uploaded with {} in {:?}", result.provider, result.elapsed);
    println!("{}", result.url);
    Ok(())
}

/// Walk through a Dropbox upload without touching the network.
async fn cmd_dry_run(file: &Path, options: &UploadOptions) -> Result<()> {
    let api = Arc::new(MemoryDropboxApi::new());
    let client = DropboxUploader::new(api.clone(), DropboxSettings::default());

    let result = client
        .upload(file, options)
        .await
        .with_context(|| format!("Dry run failed for {}", file.display()))?;

    for call in api.calls() {
        println!("  {:?}", call);
    }
    println!("{}", result.url);
    Ok(())
}

/// Print provider readiness.
async fn cmd_setup(uploader: &Uploader, provider: Option<&str>, json: bool) -> Result<()> {
    let statuses = match provider {
        Some(name) => vec![check(uploader.registry(), name).await],
        None => check_all(uploader.registry()).await,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&statuses)?);
        return Ok(());
    }

    for status in statuses {
        let state = if status.usable { "ready" } else { "not ready" };
        println!("{}: {}", status.provider, state);
        for line in status.explanation.lines() {
            println!("  {}", line);
        }
        println!();
    }
    Ok(())
}
