//! Operator CLI: runs a job over a local PDF, finalizes batches and
//! maintains the job store and prompt library.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::{info, warn};

use pagewise::config::{load_config, Config};
use pagewise::db::Database;
use pagewise::export::{
    Destination, ExportRouter, LocalStaging, RemoteConnector, RouterSettings, SharePointConnector,
};
use pagewise::inference::AzureOpenAiClient;
use pagewise::processor::{PdfNormalizer, ProcessorSettings};
use pagewise::store::{NewPrompt, PromptFilter};
use pagewise::telemetry::{self, LogFormat};
use pagewise::{Engine, EngineSettings, JobId, JobStatus, JobStore, NewJob, PageSelection, PromptFields, RetryPolicy};

/// Resumable page-by-page document inference with spreadsheet export.
#[derive(Parser, Debug)]
#[command(name = "pagewise", version, about)]
struct Cli {
    /// JSON configuration file. Built-in defaults are used when omitted.
    #[arg(short, long, global = true, env = "PAGEWISE_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    /// Enable debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a job over a local PDF and process every selected page.
    Run(RunArgs),
    /// Combine completed batch jobs into one workbook.
    Finalize(FinalizeArgs),
    /// Remove jobs that have not been touched for a while.
    Sweep {
        /// Age threshold; defaults to the configured value.
        #[arg(long)]
        older_than_hours: Option<u64>,
    },
    /// Manage the saved prompt library.
    #[command(subcommand)]
    Prompts(PromptCommand),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// PDF file to process.
    file: PathBuf,

    /// Page selection: all, odd, even, first-half, second-half, or 1-3,7.
    #[arg(long, default_value = "all")]
    pages: String,

    /// Model deployment; the configured default when omitted.
    #[arg(long, default_value = "")]
    model: String,

    /// Use the sections of a saved prompt.
    #[arg(long, conflicts_with_all = ["role", "task", "context", "format", "constraints"])]
    prompt_id: Option<i64>,

    #[command(flatten)]
    prompt: PromptArgs,

    #[command(flatten)]
    destination: DestinationArgs,

    /// Print each page outcome as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct FinalizeArgs {
    /// Batch job ids, in output order.
    #[arg(required = true)]
    job_ids: Vec<String>,

    #[command(flatten)]
    destination: DestinationArgs,
}

#[derive(Args, Debug)]
struct PromptArgs {
    #[arg(long, default_value = "")]
    role: String,
    #[arg(long, default_value = "")]
    task: String,
    #[arg(long, default_value = "")]
    context: String,
    #[arg(long, default_value = "")]
    format: String,
    #[arg(long, default_value = "")]
    constraints: String,
}

impl From<PromptArgs> for PromptFields {
    fn from(args: PromptArgs) -> Self {
        Self {
            role: args.role,
            task: args.task,
            context: args.context,
            format: args.format,
            constraints: args.constraints,
        }
    }
}

#[derive(Subcommand, Debug)]
enum PromptCommand {
    /// List prompts, optionally filtered.
    List {
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        tag: Option<String>,
        #[arg(long)]
        limit: Option<u64>,
    },
    /// Save a new prompt.
    Save {
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        tags: Option<String>,
        #[command(flatten)]
        fields: PromptArgs,
    },
    /// Delete a prompt by id.
    Delete { id: i64 },
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum DestinationKind {
    Local,
    Batch,
    Explicit,
    Templated,
}

#[derive(Args, Debug)]
struct DestinationArgs {
    /// Where the workbook goes.
    #[arg(long = "to", value_enum, default_value = "local")]
    kind: DestinationKind,
    #[arg(long)]
    site_url: Option<String>,
    /// Explicit remote folder.
    #[arg(long)]
    folder: Option<String>,
    /// Explicit remote file name.
    #[arg(long)]
    filename: Option<String>,
    #[arg(long)]
    base_folder: Option<String>,
    #[arg(long)]
    template_stem: Option<String>,
    #[arg(long)]
    row_identifier: Option<String>,
}

impl From<DestinationArgs> for Destination {
    fn from(args: DestinationArgs) -> Self {
        match args.kind {
            DestinationKind::Local => Destination::LocalDownload,
            DestinationKind::Batch => Destination::Batch,
            DestinationKind::Explicit => Destination::ExplicitRemote {
                site_url: args.site_url.unwrap_or_default(),
                folder: args.folder.unwrap_or_default(),
                filename: args.filename.unwrap_or_default(),
            },
            DestinationKind::Templated => Destination::TemplatedRemote {
                site_url: args.site_url.unwrap_or_default(),
                base_folder: args.base_folder,
                template_stem: args.template_stem,
                row_identifier: args.row_identifier,
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let format = if cli.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    };
    telemetry::init(format, if cli.verbose { "debug" } else { "info" })?;

    let config = match &cli.config {
        Some(path) => load_config(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::default(),
    };

    match cli.command {
        Command::Run(args) => run(&config, args).await,
        Command::Finalize(args) => {
            let engine = build_engine(&config, config.upload_dir())?;
            let ids: Vec<JobId> = args.job_ids.into_iter().map(JobId::from).collect();
            let receipt = engine
                .finalize_batch(&ids, &args.destination.into())
                .await?;
            println!("{}", serde_json::to_string_pretty(&receipt)?);
            Ok(())
        }
        Command::Sweep { older_than_hours } => {
            let engine = build_engine(&config, config.upload_dir())?;
            let hours = older_than_hours.unwrap_or(config.housekeeping.stale_after_hours);
            let removed = engine
                .sweep_stale_jobs(hours_to_duration(hours))
                .await?;
            println!("Removed {} stale job(s)", removed);
            for status in [JobStatus::Running, JobStatus::Completed, JobStatus::Error] {
                let remaining = engine.store().count_by_status(status).await?;
                println!("{:>10}: {}", status.as_str(), remaining);
            }
            Ok(())
        }
        Command::Prompts(command) => {
            let engine = build_engine(&config, config.upload_dir())?;
            prompts(&engine, command).await
        }
    }
}

fn hours_to_duration(hours: u64) -> Duration {
    Duration::from_secs(hours.saturating_mul(3600))
}

async fn run(config: &Config, args: RunArgs) -> Result<()> {
    let file_name = args
        .file
        .file_name()
        .and_then(|n| n.to_str())
        .context("Input path has no usable file name")?
        .to_string();
    let upload_dir = match args.file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let engine = build_engine(config, upload_dir)?;

    let page_count = engine.document_page_count(&file_name).await?;
    let selection = PageSelection::parse(&args.pages, page_count)?;

    let prompt = match args.prompt_id {
        Some(id) => engine.prompt_fields(id).await?,
        None => args.prompt.into(),
    };

    let job_id = engine
        .create_job(NewJob {
            source_ref: file_name.clone(),
            model: args.model,
            prompt,
            pages: selection.as_slice().to_vec(),
            destination: args.destination.into(),
            original_filename: Some(file_name),
        })
        .await?;
    info!(job_id = %job_id, pages = selection.len(), "Processing job");

    for &page in selection.as_slice() {
        let outcome = engine.process_page(&job_id, page).await?;
        if args.json {
            println!("{}", serde_json::to_string(&outcome)?);
        } else if let Some(degradation) = &outcome.degradation {
            eprintln!("page {:>4}: degraded ({:?})", page, degradation);
        } else {
            eprintln!("page {:>4}: {} chars", page, outcome.text.chars().count());
        }

        if let Some(receipt) = &outcome.export {
            if receipt.fallback {
                warn!(
                    reason = receipt.fallback_reason.as_deref().unwrap_or("unknown"),
                    "Remote export fell back to local download"
                );
            }
            println!("{}", serde_json::to_string_pretty(receipt)?);
        }
    }

    if engine.job(&job_id).await.is_ok_and(|job| job.is_batch) {
        println!("{}", job_id);
    }
    Ok(())
}

async fn prompts(engine: &Engine, command: PromptCommand) -> Result<()> {
    match command {
        PromptCommand::List { search, tag, limit } => {
            let filter = PromptFilter {
                text: search,
                tags: tag,
                limit,
                ..Default::default()
            };
            for prompt in engine.search_prompts(&filter).await? {
                println!(
                    "{:>5}  {:<32}  used {:>3}x  {}",
                    prompt.id,
                    prompt.name,
                    prompt.use_count,
                    prompt.tags.as_deref().unwrap_or("")
                );
            }
        }
        PromptCommand::Save {
            name,
            description,
            tags,
            fields,
        } => {
            let fields = PromptFields::from(fields);
            if fields.is_empty() {
                bail!("A prompt needs at least one non-empty section");
            }
            let id = engine
                .save_prompt(&NewPrompt {
                    name,
                    description,
                    fields,
                    created_by: None,
                    tags,
                })
                .await?;
            println!("{}", id);
        }
        PromptCommand::Delete { id } => engine.delete_prompt(id).await?,
    }
    Ok(())
}

fn build_engine(config: &Config, upload_dir: impl AsRef<Path>) -> Result<Engine> {
    let db_path = config
        .database_path()
        .context("Could not determine the database path")?;
    let db = Database::open(&db_path)
        .with_context(|| format!("Failed to open database at {}", db_path.display()))?;
    let store = JobStore::new(db, RetryPolicy::from(&config.store));

    let normalizer = Arc::new(PdfNormalizer::new(
        upload_dir.as_ref(),
        config.processing.pdftoppm.clone(),
    ));
    let inference = Arc::new(AzureOpenAiClient::from_config(&config.inference)?);

    let connector: Option<Arc<dyn RemoteConnector>> = match &config.export.remote {
        Some(remote) => match remote.access_token.resolve_optional()? {
            Some(token) => {
                let connector = SharePointConnector::new(
                    token,
                    Duration::from_secs(remote.request_timeout_secs),
                );
                Some(Arc::new(connector) as Arc<dyn RemoteConnector>)
            }
            None => {
                warn!("Remote store configured without an access token; uploads will fall back to local");
                None
            }
        },
        None => None,
    };
    let router = ExportRouter::new(
        LocalStaging::new(config.export_dir()),
        connector,
        &RouterSettings::from(&config.export),
    );

    Ok(Engine::new(
        store,
        normalizer,
        inference,
        ProcessorSettings::from_config(&config.processing, &config.inference),
        router,
        EngineSettings::from(config),
    ))
}
