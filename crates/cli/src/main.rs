//! Command line interface for Onekey.

mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use onekey_client::RepositorySet;
use onekey_core::{AppId, ClientConfig, VerificationStatus};
use onekey_pipeline::{CancellationToken, Pipeline};
use onekey_signer::KeyPair;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use time::format_description::well_known::Rfc3339;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser)]
#[command(name = "onekey")]
#[command(about = "Download and verify depot manifests from manifest repositories")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(long, global = true, env = "ONEKEY_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, verify and store manifests for apps or depots
    Fetch {
        /// Identifiers: `<app>` for every depot or `<app>/<depot>`
        identifiers: Vec<String>,
        /// File with one identifier per line
        #[arg(long)]
        batch: Option<PathBuf>,
        /// Output directory (overrides store.path)
        #[arg(long, short)]
        output: Option<PathBuf>,
        /// Number of concurrent workers (overrides workers)
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Show the manifests the selected repository offers for an app
    Index {
        app: AppId,
    },
    /// List stored manifests
    Status {
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Re-verify stored manifests against their records
    Check {
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Show each repository's request quota
    RateLimit,
    /// Configuration file commands
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Manifest signing key commands
    Key {
        #[command(subcommand)]
        command: KeyCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Write a starter configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long, default_value_t = false)]
        force: bool,
    },
}

#[derive(Subcommand)]
enum KeyCommands {
    /// Generate a signing key pair for a repository
    Generate {
        /// Key name, matched against signatures' key names
        #[arg(long)]
        name: String,
        /// Write the secret key to this file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print the public key for a secret key file
    Public {
        #[arg(long)]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let Cli {
        config: config_flag,
        verbose,
        command,
    } = Cli::parse();

    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let config_file = config::config_path(config_flag.as_deref())?;

    match command {
        Commands::Fetch {
            identifiers,
            batch,
            output,
            workers,
        } => handle_fetch(&config_file, identifiers, batch, output, workers).await,
        Commands::Index { app } => handle_index(&config_file, app).await,
        Commands::Status { output } => handle_status(&config_file, output).await,
        Commands::Check { output } => handle_check(&config_file, output).await,
        Commands::RateLimit => handle_rate_limit(&config_file).await,
        Commands::Config { command } => match command {
            ConfigCommands::Init { force } => handle_config_init(&config_file, force).await,
        },
        Commands::Key { command } => handle_key_command(command).await,
    }
}

fn validate(config: &ClientConfig, config_file: &Path) -> Result<()> {
    config.validate().with_context(|| {
        format!(
            "invalid configuration in {} (create one with `onekey config init`)",
            config_file.display()
        )
    })
}

fn load_validated(config_file: &Path) -> Result<ClientConfig> {
    let config = config::load_config(config_file)?;
    validate(&config, config_file)?;
    Ok(config)
}

async fn handle_fetch(
    config_file: &Path,
    identifiers: Vec<String>,
    batch: Option<PathBuf>,
    output: Option<PathBuf>,
    workers: Option<usize>,
) -> Result<ExitCode> {
    let mut config = config::load_config(config_file)?;
    if let Some(output) = output {
        config.store.path = output;
    }
    if let Some(workers) = workers {
        config.workers = workers;
    }
    validate(&config, config_file)?;

    let mut requests = onekey_pipeline::parse_identifiers(&identifiers)?;
    if let Some(path) = &batch {
        requests.extend(onekey_pipeline::read_batch_file(path).await?);
    }
    let requests = onekey_pipeline::dedup(requests);
    if requests.is_empty() {
        anyhow::bail!("no identifiers given; pass <app>[/<depot>] or --batch FILE");
    }

    let pipeline = Pipeline::from_config(&config)
        .await
        .context("failed to set up the fetch pipeline")?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted; finishing in-flight fetches");
            on_interrupt.cancel();
        }
    });

    tracing::info!(
        requests = requests.len(),
        workers = config.workers,
        output = %config.store.path.display(),
        "Starting fetch"
    );
    let report = pipeline.run(requests, cancel).await;
    println!("{report}");

    Ok(ExitCode::from(report.exit_code()))
}

async fn handle_index(config_file: &Path, app: AppId) -> Result<ExitCode> {
    let config = load_validated(config_file)?;
    let repositories = RepositorySet::from_config(&config)?;
    let selected = repositories
        .select_latest(app)
        .await
        .with_context(|| format!("no repository could provide app {app}"))?;

    println!(
        "Repository: {} (updated {})",
        selected.client.name(),
        selected.index.updated_at.format(&Rfc3339)?
    );
    let entries = selected.index.entries_for(None);
    if entries.is_empty() {
        println!("No depots listed.");
    }
    for entry in entries {
        let signed = entry
            .signature
            .as_ref()
            .map(|s| format!("  signed by {}", s.key_name))
            .unwrap_or_default();
        println!(
            "  {}  manifest {}  revision {}  {} bytes  {}{signed}",
            entry.depot_key(),
            entry.manifest_id,
            entry.revision,
            entry.size,
            entry.content_hash.short()
        );
    }
    Ok(ExitCode::SUCCESS)
}

async fn open_store(config_file: &Path, output: Option<PathBuf>) -> Result<onekey_storage::ManifestStore> {
    let mut config = config::load_config(config_file)?;
    if let Some(output) = output {
        config.store.path = output;
    }
    onekey_storage::from_config_read_only(&config.store)
        .await
        .with_context(|| format!("failed to open store at {}", config.store.path.display()))
}

async fn handle_status(config_file: &Path, output: Option<PathBuf>) -> Result<ExitCode> {
    let store = open_store(config_file, output).await?;
    let records = store.records().await?;
    if records.is_empty() {
        println!("No manifests stored.");
        return Ok(ExitCode::SUCCESS);
    }

    for record in records {
        let verification = match &record.verification {
            VerificationStatus::HashVerified => "hash".to_string(),
            VerificationStatus::SignatureVerified { key_name } => format!("signature ({key_name})"),
        };
        println!(
            "{}  manifest {}  revision {}  retrieved {}  verified by {verification}",
            record.entry.depot_key(),
            record.entry.manifest_id,
            record.entry.revision,
            record.retrieved_at.format(&Rfc3339)?
        );
    }
    Ok(ExitCode::SUCCESS)
}

async fn handle_check(config_file: &Path, output: Option<PathBuf>) -> Result<ExitCode> {
    let store = open_store(config_file, output).await?;
    let report = store.audit().await?;

    for issue in &report.issues {
        println!("{}  {}  {}", issue.key, issue.payload_key, issue.problem);
    }
    for orphan in &report.orphaned_payloads {
        println!("{orphan}  no record refers to this payload");
    }
    println!(
        "Checked {} manifests, {} problems",
        report.checked,
        report.problem_count()
    );

    Ok(if report.is_clean() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn handle_rate_limit(config_file: &Path) -> Result<ExitCode> {
    let config = load_validated(config_file)?;
    let repositories = RepositorySet::from_config(&config)?;

    let mut failed = false;
    for (name, result) in repositories.rate_limits().await {
        match result {
            Ok(status) => {
                let reset = status
                    .reset_at()
                    .and_then(|t| t.format(&Rfc3339).ok())
                    .unwrap_or_else(|| status.reset.to_string());
                println!(
                    "{name}: {}/{} remaining, resets at {reset}",
                    status.remaining, status.limit
                );
            }
            Err(e) => {
                failed = true;
                println!("{name}: {e}");
            }
        }
    }
    Ok(if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

async fn handle_config_init(config_file: &Path, force: bool) -> Result<ExitCode> {
    if config_file.exists() && !force {
        anyhow::bail!(
            "{} already exists; pass --force to overwrite",
            config_file.display()
        );
    }
    config::save_config(config_file, &ClientConfig::example()).await?;
    println!("Configuration written to: {}", config_file.display());
    Ok(ExitCode::SUCCESS)
}

async fn handle_key_command(command: KeyCommands) -> Result<ExitCode> {
    match command {
        KeyCommands::Generate { name, output } => {
            let keypair = KeyPair::generate(&name);
            let secret_key = keypair.secret_key_string();
            let public_key = keypair.public_key_string();

            if let Some(path) = output {
                tokio::fs::write(&path, format!("{secret_key}\n"))
                    .await
                    .with_context(|| format!("failed to write key to {}", path.display()))?;
                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
                        .await?;
                }
                println!("Secret key written to: {}", path.display());
            } else {
                println!("Secret key:");
                println!("{secret_key}");
            }

            println!("\nPublic key:");
            println!("{public_key}");
            println!("\nAdd this to the client configuration:");
            println!("  [verify]");
            println!("  trusted_keys = [\"{public_key}\"]");
        }
        KeyCommands::Public { file } => {
            let secret_key = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("failed to read key file: {}", file.display()))?;
            let keypair =
                KeyPair::from_secret_key(secret_key.trim()).context("failed to parse secret key")?;
            println!("{}", keypair.public_key_string());
        }
    }
    Ok(ExitCode::SUCCESS)
}
