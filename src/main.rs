use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use vmg_thread_viewer::config::AppConfig;
use vmg_thread_viewer::file_writer::{self, ThreadNames};
use vmg_thread_viewer::logging::{init_logging, OperationTimer};
use vmg_thread_viewer::models::{Direction, OutputFormat, Snapshot};
use vmg_thread_viewer::repository::{LocalStoreRepo, MessageRepository, RepoOptions};
use vmg_thread_viewer::service::{self, IngestService};
use vmg_thread_viewer::store::Store;
use vmg_thread_viewer::validation::InputValidator;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Store directory (overrides configuration)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Use a throwaway in-memory store
    #[arg(long, global = true, conflicts_with = "store")]
    memory: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode VMG files or directories and save the messages
    Ingest {
        /// Which side the phone number in these files belongs to
        #[arg(short, long, default_value = "incoming")]
        direction: Direction,

        /// Files or directories of `.vmg` files
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Decode one file and print it without saving
    Parse {
        /// VMG file
        file: PathBuf,

        /// Which side the phone number belongs to
        #[arg(short, long, default_value = "incoming")]
        direction: Direction,
    },
    /// List conversations, most recent first
    Conversations,
    /// Show or export the messages of one conversation
    Thread {
        /// Conversation partner
        phone: String,

        /// Write a file in this format instead of printing
        #[arg(short, long)]
        format: Option<OutputFormat>,

        /// Directory to write the file into
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List contacts
    Contacts,
    /// Rename a contact
    Rename {
        /// Contact phone number
        phone: String,

        /// New display name
        name: String,
    },
    /// Delete one message by id
    DeleteMessage {
        /// Message id
        id: String,
    },
    /// Delete every message with a partner
    DeleteConversation {
        /// Conversation partner
        phone: String,
    },
    /// Recompute conversations from stored messages
    Rebuild,
    /// Write a JSON snapshot of the store
    Export {
        /// Output file
        file: PathBuf,
    },
    /// Replace the store contents from a JSON snapshot
    Import {
        /// Snapshot file
        file: PathBuf,
    },
    /// Show collection sizes
    Stats,
    /// Delete everything in the store
    Clear {
        /// Confirm deletion
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = AppConfig::load()?;
    if let Some(store) = &cli.store {
        config.storage.backend = "sled".to_string();
        config.storage.path = store.display().to_string();
    } else {
        config.storage.path = config.get_store_path();
    }
    if cli.memory {
        config.storage.backend = "memory".to_string();
    }

    // Initialize logging
    let log_level = cli.log_level.clone().unwrap_or_else(|| config.get_log_level());
    let _guard = init_logging(
        Some(&log_level),
        config.logging.file_path.as_deref().map(Path::new),
        &config.logging.format,
    )?;

    debug!(backend = %config.storage.backend, path = %config.storage.path, "Starting vmg-viewer");

    run(cli.command, &config).await
}

fn open_repository(config: &AppConfig) -> Result<LocalStoreRepo> {
    let store = Store::open(&config.storage)
        .with_context(|| format!("Failed to open {} store at {}", config.storage.backend, config.storage.path))?;
    Ok(LocalStoreRepo::with_options(store, RepoOptions::from(&config.import)))
}

async fn run(command: Commands, config: &AppConfig) -> Result<()> {
    match command {
        Commands::Ingest { direction, paths } => ingest(config, direction, &paths).await,
        Commands::Parse { file, direction } => parse_one(&file, direction).await,
        Commands::Conversations => list_conversations(&open_repository(config)?),
        Commands::Thread { phone, format, output } => {
            show_thread(config, &open_repository(config)?, &phone, format, output)
        }
        Commands::Contacts => list_contacts(&open_repository(config)?),
        Commands::Rename { phone, name } => rename(&open_repository(config)?, &phone, &name),
        Commands::DeleteMessage { id } => delete_message(&open_repository(config)?, &id),
        Commands::DeleteConversation { phone } => delete_conversation(&open_repository(config)?, &phone),
        Commands::Rebuild => rebuild(&open_repository(config)?),
        Commands::Export { file } => export_snapshot(&open_repository(config)?, &file).await,
        Commands::Import { file } => import_snapshot(config, &open_repository(config)?, &file).await,
        Commands::Stats => show_stats(&open_repository(config)?),
        Commands::Clear { yes } => clear(&open_repository(config)?, yes),
    }
}

#[allow(clippy::print_stdout)]
async fn ingest(config: &AppConfig, direction: Direction, paths: &[PathBuf]) -> Result<()> {
    for path in paths {
        InputValidator::validate_file_path(path)?;
    }

    let service = IngestService::new(Box::new(open_repository(config)?)).with_progress(Box::new(
        |current: usize, total: usize, name: &str| info!(current, total, file = name, "Processing file"),
    ));
    let report = service.ingest(paths, direction).await?;

    println!("Loaded {} file(s), {} failed", report.loaded, report.failed);
    for (path, reason) in &report.failures {
        println!("  {}: {reason}", path.display());
    }
    Ok(())
}

#[allow(clippy::print_stdout)]
async fn parse_one(file: &Path, direction: Direction) -> Result<()> {
    InputValidator::validate_file_path(file)?;
    let message = service::parse_file(file, direction).await?;
    println!("{message}");
    Ok(())
}

#[allow(clippy::print_stdout)]
fn list_conversations(repo: &dyn MessageRepository) -> Result<()> {
    let summaries = repo.conversation_summaries()?;
    if summaries.is_empty() {
        println!("No conversations");
        return Ok(());
    }
    for summary in summaries {
        println!(
            "{} ({}): {} message(s), last {}",
            summary.display_name,
            summary.phone_number,
            summary.message_count,
            summary.last_message_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}

fn show_thread(
    config: &AppConfig,
    repo: &dyn MessageRepository,
    phone: &str,
    format: Option<OutputFormat>,
    output: Option<PathBuf>,
) -> Result<()> {
    InputValidator::validate_phone_identifier(phone)?;
    let messages = repo.messages_by_conversation(phone)?;
    let display_name = repo
        .contact(phone)?
        .map_or_else(|| phone.to_string(), |contact| contact.name);
    let names = ThreadNames {
        phone_number: phone,
        display_name: &display_name,
    };

    if format.is_none() && output.is_none() {
        let stdout = std::io::stdout();
        let mut handle = stdout.lock();
        file_writer::write_thread(&messages, &names, OutputFormat::Txt, &mut handle)?;
        handle.flush()?;
        return Ok(());
    }

    let format = match format {
        Some(format) => format,
        None => config
            .export
            .default_format
            .parse()
            .map_err(anyhow::Error::msg)?,
    };
    let output_dir = output.unwrap_or_else(|| PathBuf::from(&config.export.output_directory));
    InputValidator::validate_file_path(&output_dir)?;

    let path = file_writer::write_thread_to_dir(&messages, &names, format, &output_dir)?;
    info!(path = %path.display(), messages = messages.len(), "Wrote thread");
    Ok(())
}

#[allow(clippy::print_stdout)]
fn list_contacts(repo: &dyn MessageRepository) -> Result<()> {
    for contact in repo.all_contacts()? {
        println!("{}\t{}", contact.number, contact.name);
    }
    Ok(())
}

#[allow(clippy::print_stdout)]
fn rename(repo: &dyn MessageRepository, phone: &str, name: &str) -> Result<()> {
    InputValidator::validate_phone_identifier(phone)?;
    let name = InputValidator::sanitize_text(name);
    InputValidator::validate_contact_name(&name)?;

    if repo.update_contact_name(phone, &name)? {
        println!("Renamed {phone} to {name}");
    } else {
        println!("No contact with number {phone}");
    }
    Ok(())
}

#[allow(clippy::print_stdout)]
fn delete_message(repo: &dyn MessageRepository, id: &str) -> Result<()> {
    if repo.delete_message(id)? {
        println!("Deleted message {id}");
    } else {
        println!("No message with id {id}");
    }
    Ok(())
}

#[allow(clippy::print_stdout)]
fn delete_conversation(repo: &dyn MessageRepository, phone: &str) -> Result<()> {
    let removed = repo.delete_conversation(phone)?;
    println!("Deleted {removed} message(s) with {phone}");
    Ok(())
}

#[allow(clippy::print_stdout)]
fn rebuild(repo: &dyn MessageRepository) -> Result<()> {
    let conversations = repo.rebuild_conversations()?;
    println!("Rebuilt {} conversation(s)", conversations.len());
    Ok(())
}

async fn export_snapshot(repo: &dyn MessageRepository, file: &Path) -> Result<()> {
    InputValidator::validate_file_path(file)?;
    let timer = OperationTimer::new("export_snapshot");

    let snapshot = repo.export_data()?;
    let json = serde_json::to_vec_pretty(&snapshot)?;
    if let Some(parent) = file.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(file, &json)
        .await
        .with_context(|| format!("Failed to write {}", file.display()))?;

    info!(path = %file.display(), bytes = json.len(), "Wrote snapshot");
    timer.finish();
    Ok(())
}

#[allow(clippy::print_stdout)]
async fn import_snapshot(config: &AppConfig, repo: &dyn MessageRepository, file: &Path) -> Result<()> {
    InputValidator::validate_file_path(file)?;
    let timer = OperationTimer::new("import_snapshot");

    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let document: serde_json::Value = serde_json::from_slice(&bytes)?;
    InputValidator::validate_snapshot(&document)?;

    // A validated snapshot carries all three collections, so nothing stored is retained.
    InputValidator::validate_import_quota(0, bytes.len(), config.import.max_storage_bytes)?;

    let snapshot: Snapshot = serde_json::from_value(document)?;
    repo.import_data(snapshot)?;

    let stats = repo.stats()?;
    println!(
        "Imported {} message(s), {} contact(s), {} conversation(s)",
        stats.total_messages, stats.total_contacts, stats.total_conversations
    );
    timer.finish();
    Ok(())
}

#[allow(clippy::print_stdout)]
fn show_stats(repo: &dyn MessageRepository) -> Result<()> {
    let stats = repo.stats()?;
    println!("Messages:      {}", stats.total_messages);
    println!("Contacts:      {}", stats.total_contacts);
    println!("Conversations: {}", stats.total_conversations);
    println!("Storage size:  {} bytes", stats.storage_size);
    Ok(())
}

#[allow(clippy::print_stdout)]
fn clear(repo: &dyn MessageRepository, yes: bool) -> Result<()> {
    if !yes {
        bail!("Refusing to clear the store without --yes");
    }
    repo.clear_all()?;
    println!("Store cleared");
    Ok(())
}
