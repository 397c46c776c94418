//! # Docflow CLI (`docflow`)
//!
//! Runs the document pipeline in-process: each command opens the
//! database, starts the worker pool, performs one operation and, for
//! operations that dispatch background work, waits until the job is
//! finished before printing the result.
//!
//! ## Usage
//!
//! ```bash
//! docflow --config ./config/docflow.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docflow init` | Create the database and artifact directories |
//! | `docflow models` | Show model capability readiness |
//! | `docflow upload <file>` | Submit a file and wait for extraction |
//! | `docflow list` | List documents |
//! | `docflow show <id>` | Show a document (and its analysis) or a generated document |
//! | `docflow text <id>` | Print extracted text |
//! | `docflow reprocess <id>` | Re-run extraction |
//! | `docflow analyze <id>` | Analyze a document |
//! | `docflow ask "<query>" --doc <id>` | Answer a question from documents |
//! | `docflow intent "<query>"` | Show how a query is read: intent, format, clarifying questions |
//! | `docflow chat "<message>"` | Chat about documents |
//! | `docflow generate --prompt ".."` | Generate a new document |
//! | `docflow regenerate <id>` | Re-run a generation |
//! | `docflow download <id> --out <path>` | Save an uploaded or generated file |
//! | `docflow delete <id>` | Delete a document |
//! | `docflow template add/list` | Manage generation templates |
//!
//! Logs go to stderr; set `RUST_LOG` (e.g. `RUST_LOG=docflow=debug`)
//! to change verbosity.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use docflow::commands;
use docflow::config::{self, Config};
use docflow::core::models::OutputFormat;
use docflow::service::{DocflowService, GenerateRequest};

/// Docflow: extract, analyze, query and generate documents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/docflow.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "docflow",
    about = "Docflow: an asynchronous document extraction, analysis and generation pipeline",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// When the file does not exist, defaults rooted at `./data` are used.
    #[arg(long, global = true, default_value = "./config/docflow.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema and artifact directories. Idempotent.
    Init,

    /// Initialize every model capability and show which are available.
    Models,

    /// Upload a file and wait for text extraction to finish.
    Upload {
        file: PathBuf,
        /// Document title (defaults to the file name).
        #[arg(long)]
        title: Option<String>,
    },

    /// List documents, newest first.
    List,

    /// Show a document or generated document by id.
    Show { id: String },

    /// Print a document's extracted text.
    Text { id: String },

    /// Re-run extraction for a document and wait for it.
    Reprocess { id: String },

    /// Analyze a document (summary, keywords, sentiment, entities, topics).
    Analyze {
        id: String,
        /// Discard the existing analysis and run it again.
        #[arg(long)]
        again: bool,
    },

    /// Answer a question from the given documents.
    Ask {
        query: String,
        /// Document ids to search (repeatable).
        #[arg(long = "doc", required = true)]
        docs: Vec<String>,
    },

    /// Show how a query is read: reply kind, intent, requested format and
    /// clarifying questions.
    Intent { query: String },

    /// Send a chat message. Starts a new conversation unless one is given.
    Chat {
        message: String,
        /// Continue an existing conversation.
        #[arg(long)]
        conversation: Option<String>,
        /// Document to answer from when starting a conversation.
        #[arg(long = "doc")]
        doc: Option<String>,
    },

    /// Generate a new document and wait for it.
    Generate {
        /// Instructions for the generator.
        #[arg(long, default_value = "")]
        prompt: String,
        #[arg(long)]
        title: Option<String>,
        /// docx, pdf, txt, markdown or html.
        #[arg(long, default_value = "docx", value_parser = commands::parse_format)]
        format: OutputFormat,
        /// Template id.
        #[arg(long)]
        template: Option<String>,
        /// Reference document ids (repeatable).
        #[arg(long = "doc")]
        docs: Vec<String>,
    },

    /// Re-run a generation with its stored parameters.
    Regenerate { id: String },

    /// Save an uploaded file, or a generated file with `--generated`.
    Download {
        id: String,
        #[arg(long)]
        out: PathBuf,
        #[arg(long)]
        generated: bool,
    },

    /// Delete a document, its analysis and its uploaded file.
    Delete { id: String },

    /// Manage generation templates.
    Template {
        #[command(subcommand)]
        action: TemplateAction,
    },
}

#[derive(Subcommand)]
enum TemplateAction {
    /// Create a template from a file containing `{{placeholder}}` markers.
    Add {
        name: String,
        file: PathBuf,
        /// Default placeholder values as `key=value` pairs.
        #[arg(long = "var", value_parser = parse_key_val)]
        vars: Vec<(String, String)>,
    },
    /// List templates.
    List,
}

/// Parse a `key=value` pair for `--var` arguments.
fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid KEY=VALUE: no '=' found in '{}'", s))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

fn resolve_config(path: &Path) -> anyhow::Result<Config> {
    if path.exists() {
        config::load_config(path)
    } else {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        Ok(Config::minimal(Path::new("./data")))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("docflow=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = resolve_config(&cli.config)?;

    if let Commands::Init = cli.command {
        return commands::run_init(&cfg).await;
    }

    let svc = DocflowService::open(cfg).await?;
    let result = match cli.command {
        Commands::Init => Ok(()),
        Commands::Models => commands::run_models(&svc).await,
        Commands::Upload { file, title } => {
            commands::run_upload(&svc, &file, title.as_deref()).await
        }
        Commands::List => commands::run_list(&svc).await,
        Commands::Show { id } => commands::run_show(&svc, &id).await,
        Commands::Text { id } => commands::run_text(&svc, &id).await,
        Commands::Reprocess { id } => commands::run_reprocess(&svc, &id).await,
        Commands::Analyze { id, again } => commands::run_analyze(&svc, &id, again).await,
        Commands::Ask { query, docs } => commands::run_ask(&svc, &query, &docs).await,
        Commands::Intent { query } => commands::run_intent(&svc, &query).await,
        Commands::Chat {
            message,
            conversation,
            doc,
        } => {
            commands::run_chat(&svc, &message, conversation.as_deref(), doc.as_deref()).await
        }
        Commands::Generate {
            prompt,
            title,
            format,
            template,
            docs,
        } => {
            let mut request = GenerateRequest::new(&prompt, format);
            request.title = title;
            request.template_id = template;
            request.document_ids = docs;
            commands::run_generate(&svc, request).await
        }
        Commands::Regenerate { id } => commands::run_regenerate(&svc, &id).await,
        Commands::Download { id, out, generated } => {
            commands::run_download(&svc, &id, &out, generated).await
        }
        Commands::Delete { id } => commands::run_delete(&svc, &id).await,
        Commands::Template { action } => match action {
            TemplateAction::Add { name, file, vars } => {
                commands::run_template_add(&svc, &name, &file, vars).await
            }
            TemplateAction::List => commands::run_template_list(&svc).await,
        },
    };
    svc.shutdown().await;
    result
}
