use anyhow::{Context, Result};
use blob_bus_storage::{
    app::{AppBuilder, AppConfig, AppServices, StorageBackend},
    ErrorTracker, Metadata, PayloadId, PayloadStore, PayloadStoreOptions, SnapshotArchive,
    SnapshotDocumentRef, TimeRange,
};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use futures::TryStreamExt;
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::{debug, info};
use tracing_subscriber::{filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "blob-bus-admin")]
#[command(about = "Inspect and maintain the blob storage used by the message bus", long_about = None)]
struct Cli {
    /// Storage backend type (memory, object-store-memory, s3, azure)
    #[arg(long, env = "STORAGE_BACKEND", default_value = "memory")]
    storage_backend: String,

    /// S3 endpoint URL (for S3-compatible servers)
    #[arg(long, env = "S3_ENDPOINT")]
    s3_endpoint: Option<String>,

    /// S3 bucket name
    #[arg(long, env = "S3_BUCKET")]
    s3_bucket: Option<String>,

    /// S3 region
    #[arg(long, env = "S3_REGION", default_value = "us-east-1")]
    s3_region: String,

    /// S3 access key
    #[arg(long, env = "S3_ACCESS_KEY")]
    s3_access_key: Option<String>,

    /// S3 secret key
    #[arg(long, env = "S3_SECRET_KEY")]
    s3_secret_key: Option<String>,

    /// Allow plain http S3 endpoints
    #[arg(long, env = "S3_ALLOW_HTTP", default_value = "false")]
    s3_allow_http: bool,

    /// Azure storage account
    #[arg(long, env = "AZURE_STORAGE_ACCOUNT")]
    azure_account: Option<String>,

    /// Azure storage access key
    #[arg(long, env = "AZURE_STORAGE_ACCESS_KEY")]
    azure_access_key: Option<String>,

    /// Azure storage container holding all adapter prefixes
    #[arg(long, env = "AZURE_STORAGE_CONTAINER")]
    azure_container: Option<String>,

    /// Use the local Azurite emulator
    #[arg(long, env = "AZURE_USE_EMULATOR", default_value = "false")]
    azure_use_emulator: bool,

    #[arg(long, env = "PAYLOAD_CONTAINER", default_value = "payloads")]
    payload_container: String,

    #[arg(long, env = "SNAPSHOT_CONTAINER", default_value = "snapshots")]
    snapshot_container: String,

    #[arg(long, env = "ERROR_CONTAINER", default_value = "errors")]
    error_container: String,

    /// Queue whose error logs are inspected
    #[arg(long, env = "DESTINATION_ADDRESS", default_value = "input-queue")]
    destination_address: String,

    #[arg(long, env = "MAX_DELIVERY_ATTEMPTS", default_value = "5")]
    max_delivery_attempts: u32,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Manage stored message payloads
    Payload {
        #[command(subcommand)]
        command: PayloadCommands,
    },

    /// Inspect the saga snapshot archive
    Snapshots {
        #[command(subcommand)]
        command: SnapshotCommands,
    },

    /// Inspect per-message error logs
    Errors {
        #[command(subcommand)]
        command: ErrorCommands,
    },
}

#[derive(Subcommand, Debug)]
enum PayloadCommands {
    /// Upload a file as a payload
    Put {
        id: String,
        /// File path to upload
        file: String,
        /// Extra metadata as KEY=VALUE, may be repeated
        #[arg(short, long = "meta", value_parser = parse_key_value)]
        metadata: Vec<(String, String)>,
    },

    /// Download a payload
    Get {
        id: String,
        /// Output file path, stdout when omitted
        #[arg(short, long)]
        output: Option<String>,
        /// Leave ReadTime untouched
        #[arg(long)]
        no_touch: bool,
    },

    /// Show a payload's metadata
    Meta { id: String },

    /// Delete a payload
    Delete { id: String },

    /// List payload ids, optionally filtered by time ranges
    Query {
        #[arg(long)]
        read_from: Option<DateTime<Utc>>,
        #[arg(long)]
        read_to: Option<DateTime<Utc>>,
        #[arg(long)]
        save_from: Option<DateTime<Utc>>,
        #[arg(long)]
        save_to: Option<DateTime<Utc>>,
    },
}

#[derive(Subcommand, Debug)]
enum SnapshotCommands {
    /// List archived snapshots grouped by saga id and revision
    List {
        /// Print every raw blob instead of grouping
        #[arg(long)]
        raw: bool,
    },

    /// Delete every snapshot and recreate the container
    Reset {
        /// Required confirmation
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand, Debug)]
enum ErrorCommands {
    /// Print the recorded failures of a message
    Show {
        message_id: String,
        /// Print the log lines as stored
        #[arg(long)]
        json: bool,
    },

    /// Print the cached failure count and whether the message is final
    Count { message_id: String },

    /// Recount failures from the log and store the result
    Recount { message_id: String },

    /// Mark a message as final
    Final { message_id: String },

    /// Delete a message's error log
    Clean { message_id: String },
}

fn parse_key_value(value: &str) -> Result<(String, String), String> {
    match value.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", value)),
    }
}

impl Cli {
    fn to_app_config(&self, update_last_read_time: bool) -> Result<AppConfig> {
        let storage_backend = match self.storage_backend.as_str() {
            "memory" => StorageBackend::InMemory,
            "object-store-memory" => StorageBackend::ObjectStoreMemory,
            "s3" => StorageBackend::S3 {
                bucket: self
                    .s3_bucket
                    .clone()
                    .context("S3_BUCKET is required for S3 backend")?,
                region: self.s3_region.clone(),
                access_key: self.s3_access_key.clone(),
                secret_key: self.s3_secret_key.clone(),
                endpoint: self.s3_endpoint.clone(),
                allow_http: self.s3_allow_http,
            },
            "azure" => StorageBackend::Azure {
                account: self
                    .azure_account
                    .clone()
                    .context("AZURE_STORAGE_ACCOUNT is required for Azure backend")?,
                access_key: self.azure_access_key.clone(),
                container: self
                    .azure_container
                    .clone()
                    .context("AZURE_STORAGE_CONTAINER is required for Azure backend")?,
                use_emulator: self.azure_use_emulator,
            },
            _ => anyhow::bail!("Unknown storage backend: {}", self.storage_backend),
        };

        Ok(AppConfig {
            storage_backend,
            payload_container: self.payload_container.clone(),
            snapshot_container: self.snapshot_container.clone(),
            error_container: self.error_container.clone(),
            destination_address: self.destination_address.clone(),
            max_delivery_attempts: self.max_delivery_attempts,
            payload_options: PayloadStoreOptions::builder()
                .update_last_read_time(update_last_read_time)
                .build(),
        })
    }

    fn init_logging(&self) -> Result<()> {
        let level = LevelFilter::from_str(&self.log_level).unwrap_or(LevelFilter::INFO);

        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .with(level)
            .init();

        Ok(())
    }
}

async fn run_payload(app: &AppServices, command: PayloadCommands) -> Result<()> {
    let store = &app.payload_store;

    match command {
        PayloadCommands::Put { id, file, metadata } => {
            let id = PayloadId::new(id)?;
            let mut source = tokio::fs::File::open(&file)
                .await
                .with_context(|| format!("Failed to open {}", file))?;
            let metadata: Metadata = metadata.into_iter().collect();

            store.save(&id, &mut source, Some(metadata)).await?;
            info!("Saved payload {} from {}", id, file);
        }
        PayloadCommands::Get { id, output, .. } => {
            let id = PayloadId::new(id)?;
            let mut reader = store.read(&id).await?;

            match output {
                Some(path) => {
                    let mut file = tokio::fs::File::create(&path)
                        .await
                        .with_context(|| format!("Failed to create {}", path))?;
                    let written = tokio::io::copy(&mut reader, &mut file).await?;
                    info!("Wrote {} bytes to {}", written, path);
                }
                None => {
                    tokio::io::copy(&mut reader, &mut tokio::io::stdout()).await?;
                }
            }
        }
        PayloadCommands::Meta { id } => {
            let id = PayloadId::new(id)?;
            let metadata: BTreeMap<_, _> = store.read_metadata(&id).await?.into_iter().collect();
            for (key, value) in metadata {
                println!("{}: {}", key, value);
            }
        }
        PayloadCommands::Delete { id } => {
            let id = PayloadId::new(id)?;
            store.delete(&id).await?;
            info!("Deleted payload {}", id);
        }
        PayloadCommands::Query {
            read_from,
            read_to,
            save_from,
            save_to,
        } => {
            let read_time = (read_from.is_some() || read_to.is_some())
                .then(|| TimeRange::new(read_from, read_to));
            let save_time = (save_from.is_some() || save_to.is_some())
                .then(|| TimeRange::new(save_from, save_to));

            let mut ids = store.query(read_time, save_time);
            while let Some(id) = ids.try_next().await? {
                println!("{}", id);
            }
        }
    }

    Ok(())
}

async fn run_snapshots(app: &AppServices, command: SnapshotCommands) -> Result<()> {
    let archive = &app.snapshot_archive;

    match command {
        SnapshotCommands::List { raw } => {
            let items: Vec<_> = archive.list_all().try_collect().await?;

            if raw {
                for item in items {
                    println!("{}\t{}\t{}", item.name, item.size, item.last_modified);
                }
                return Ok(());
            }

            let mut snapshots: BTreeMap<(String, u32), usize> = BTreeMap::new();
            for item in &items {
                match SnapshotDocumentRef::parse(&item.name) {
                    Some(doc) => {
                        *snapshots
                            .entry((doc.saga_id.to_string(), doc.revision))
                            .or_default() += 1;
                    }
                    None => debug!("Skipping unrecognized blob {}", item.name),
                }
            }

            for ((saga_id, revision), documents) in &snapshots {
                println!("{}\trevision {}\t{} document(s)", saga_id, revision, documents);
            }
            info!("{} snapshot(s) in {} blob(s)", snapshots.len(), items.len());
        }
        SnapshotCommands::Reset { yes } => {
            if !yes {
                anyhow::bail!("Refusing to drop the snapshot archive without --yes");
            }
            archive.drop_and_recreate().await?;
        }
    }

    Ok(())
}

async fn run_errors(app: &AppServices, command: ErrorCommands) -> Result<()> {
    let tracker = &app.error_tracker;

    match command {
        ErrorCommands::Show { message_id, json } => {
            if json {
                println!("{}", tracker.get_full_description(&message_id).await?);
            } else {
                for record in tracker.get_failure_records(&message_id).await? {
                    println!("{}", record);
                }
            }
        }
        ErrorCommands::Count { message_id } => {
            let count = tracker.error_count(&message_id).await?;
            let exceeded = tracker.has_exceeded_limit(&message_id).await?;
            println!("{}\t{}", count, if exceeded { "final" } else { "retrying" });
        }
        ErrorCommands::Recount { message_id } => {
            println!("{}", tracker.recompute_error_count(&message_id).await?);
        }
        ErrorCommands::Final { message_id } => {
            tracker.mark_as_final(&message_id).await?;
        }
        ErrorCommands::Clean { message_id } => {
            tracker.clean_up(&message_id).await?;
            info!("Cleaned up error log of {}", message_id);
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    cli.init_logging()?;

    let touch = !matches!(
        cli.command,
        Commands::Payload {
            command: PayloadCommands::Get { no_touch: true, .. }
        }
    );
    let config = cli.to_app_config(touch)?;
    debug!("Storage backend: {:?}", config.storage_backend);

    let app = AppBuilder::new()
        .with_config(config)
        .build()
        .await
        .context("Failed to build application")?;

    match cli.command {
        Commands::Payload { command } => run_payload(&app, command).await,
        Commands::Snapshots { command } => run_snapshots(&app, command).await,
        Commands::Errors { command } => run_errors(&app, command).await,
    }
}
