//! CLI command definitions, routing, and tracing setup.

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Report, Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use pactlens_core::{ChatAnswer, Classification, ContractPipeline, PipelineDeps};
use pactlens_inference::{
    HttpSearchClient, InferenceService, OpenRouterClient, ResponseFormat, RetrievalService,
};
use pactlens_shared::{
    AnalysisRecord, AppConfig, CallerId, ChatTurn, Clauses, Document, DocumentId, PactLensError,
    init_config, load_config, validate_api_key,
};
use pactlens_storage::Storage;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// PactLens: understand a contract before you sign it.
#[derive(Parser)]
#[command(
    name = "pactlens",
    version,
    about = "Classify, analyze and ask questions about contracts.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Act as this caller instead of the configured default.
    #[arg(long, env = "PACTLENS_CALLER", global = true)]
    pub caller: Option<String>,

    /// Print results as JSON.
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Store a contract from a plain-text extraction.
    Ingest {
        /// Text file holding the extracted contract text.
        path: PathBuf,

        /// Filename to record (defaults to the file's name).
        #[arg(short, long)]
        name: Option<String>,

        /// Page count of the source document.
        #[arg(short, long, default_value = "1")]
        pages: u32,
    },

    /// List your contracts.
    List,

    /// Show a contract and its latest analysis.
    Show {
        /// Document ID.
        id: DocumentId,
    },

    /// Detect the contract type and parties.
    Classify {
        /// Document ID.
        id: DocumentId,
    },

    /// Run the full analysis (once per contract).
    Analyze {
        /// Document ID.
        id: DocumentId,
    },

    /// Ask questions about a contract. Without a question, starts an
    /// interactive session.
    Chat {
        /// Document ID.
        id: DocumentId,

        /// A single question to answer.
        question: Option<String>,
    },

    /// Choose the party you represent, or show the current choice.
    SelectParty {
        /// Document ID.
        id: DocumentId,

        /// Party name as detected during classification.
        name: Option<String>,
    },

    /// Delete a contract and everything derived from it.
    Delete {
        /// Document ID.
        id: DocumentId,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "pactlens=info",
        1 => "pactlens=debug",
        _ => "pactlens=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let json = cli.json;
    let caller = cli.caller;
    match cli.command {
        Command::Ingest { path, name, pages } => {
            let pipeline = open_pipeline(caller, false).await?;
            cmd_ingest(&pipeline, &path, name.as_deref(), pages, json).await
        }
        Command::List => cmd_list(&open_pipeline(caller, false).await?, json).await,
        Command::Show { id } => cmd_show(&open_pipeline(caller, false).await?, &id, json).await,
        Command::Classify { id } => {
            cmd_classify(&open_pipeline(caller, true).await?, &id, json).await
        }
        Command::Analyze { id } => {
            cmd_analyze(&open_pipeline(caller, true).await?, &id, json).await
        }
        Command::Chat { id, question } => {
            cmd_chat(&open_pipeline(caller, true).await?, &id, question, json).await
        }
        Command::SelectParty { id, name } => {
            cmd_select_party(&open_pipeline(caller, false).await?, &id, name.as_deref()).await
        }
        Command::Delete { id } => cmd_delete(&open_pipeline(caller, false).await?, &id).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(),
        },
    }
}

/// Load config and wire the pipeline for one command.
async fn open_pipeline(caller: Option<String>, needs_inference: bool) -> Result<ContractPipeline> {
    let config = load_config().map_err(user_error)?;
    let caller = caller.unwrap_or_else(|| config.defaults.caller.clone());
    build_pipeline(&config, CallerId::new(caller), needs_inference)
        .await
        .map_err(user_error)
}

/// Wire the pipeline from config. Inference credentials are only required
/// by commands that call the model.
async fn build_pipeline(
    config: &AppConfig,
    caller: CallerId,
    needs_inference: bool,
) -> pactlens_shared::Result<ContractPipeline> {
    let inference: Arc<dyn InferenceService> = if needs_inference {
        validate_api_key(config)?;
        Arc::new(OpenRouterClient::from_config(&config.inference)?)
    } else {
        Arc::new(NoInference)
    };

    let retrieval = HttpSearchClient::from_config(&config.retrieval)?
        .map(|client| Arc::new(client) as Arc<dyn RetrievalService>);
    debug!(retrieval = retrieval.is_some(), "retrieval configured");

    let db_path = config.defaults.resolved_database_path()?;
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| PactLensError::io(parent, e))?;
    }
    let storage = Storage::open(&db_path).await?;

    let deps = PipelineDeps {
        storage,
        inference,
        retrieval,
        limits: config.limits.clone(),
        retrieval_max_results: config.retrieval.max_results,
    };
    Ok(ContractPipeline::new(deps, caller))
}

/// Stand-in for commands that never reach the model.
struct NoInference;

#[async_trait]
impl InferenceService for NoInference {
    async fn generate(&self, _prompt: &str, _format: ResponseFormat) -> pactlens_shared::Result<String> {
        Err(PactLensError::config("inference is not available for this command"))
    }
}

/// Log the diagnostic detail and show the user-safe message.
fn user_error(err: PactLensError) -> Report {
    debug!(kind = %err.kind(), error = %err, "command failed");
    eyre!(err.user_message())
}

fn spinner(message: &'static str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    spinner.set_message(message);
    spinner.enable_steady_tick(std::time::Duration::from_millis(80));
    spinner
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// Document commands
// ---------------------------------------------------------------------------

async fn cmd_ingest(
    pipeline: &ContractPipeline,
    path: &Path,
    name: Option<&str>,
    pages: u32,
    json: bool,
) -> Result<()> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| user_error(PactLensError::io(path, e)))?;
    let filename = match name {
        Some(n) => n.to_string(),
        None => path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| eyre!("cannot derive a filename from '{}'", path.display()))?,
    };

    info!(path = %path.display(), filename = %filename, "ingesting contract");
    let document = pipeline
        .ingest(&filename, &text, pages)
        .await
        .map_err(user_error)?;

    if json {
        return print_json(&document);
    }
    println!();
    println!("  Contract stored.");
    println!("  ID:       {}", document.id);
    println!("  Filename: {}", document.filename);
    println!("  Pages:    {pages}");
    println!();
    Ok(())
}

async fn cmd_list(pipeline: &ContractPipeline, json: bool) -> Result<()> {
    let documents = pipeline.list_documents().await.map_err(user_error)?;
    if json {
        return print_json(&documents);
    }
    if documents.is_empty() {
        println!("No contracts yet. Add one with `pactlens ingest <file>`.");
        return Ok(());
    }
    for doc in &documents {
        println!(
            "{}  {:<24}  {:<20}  {}",
            doc.id,
            doc.detected_type.map(|t| t.as_str()).unwrap_or("-"),
            doc.created_at.format("%Y-%m-%d %H:%M"),
            doc.filename
        );
    }
    Ok(())
}

async fn cmd_show(pipeline: &ContractPipeline, id: &DocumentId, json: bool) -> Result<()> {
    let document = pipeline.document(id).await.map_err(user_error)?;
    let analysis = pipeline.analysis(id).await.map_err(user_error)?;

    if json {
        return print_json(&serde_json::json!({
            "document": document,
            "analysis": analysis,
        }));
    }
    print_document(&document);
    match &analysis {
        Some(record) => print_analysis(record),
        None => println!("\n  Not classified yet. Run `pactlens classify {id}`."),
    }
    println!();
    Ok(())
}

async fn cmd_delete(pipeline: &ContractPipeline, id: &DocumentId) -> Result<()> {
    pipeline.delete_document(id).await.map_err(user_error)?;
    println!("Deleted {id}.");
    Ok(())
}

async fn cmd_select_party(
    pipeline: &ContractPipeline,
    id: &DocumentId,
    name: Option<&str>,
) -> Result<()> {
    match name {
        Some(name) => {
            pipeline.select_party(id, name).await.map_err(user_error)?;
            println!("Analysis will be written from the perspective of \"{}\".", name.trim());
        }
        None => match pipeline.selected_party(id).await.map_err(user_error)? {
            Some(party) => println!("{party}"),
            None => println!("No party selected."),
        },
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Stage commands
// ---------------------------------------------------------------------------

async fn cmd_classify(pipeline: &ContractPipeline, id: &DocumentId, json: bool) -> Result<()> {
    let progress = spinner("Classifying contract");
    let result = pipeline.classify(id).await;
    progress.finish_and_clear();
    let classification = result.map_err(user_error)?;

    if json {
        return print_json(&classification);
    }
    print_classification(&classification);
    Ok(())
}

async fn cmd_analyze(pipeline: &ContractPipeline, id: &DocumentId, json: bool) -> Result<()> {
    let progress = spinner("Analyzing contract");
    let result = pipeline.analyze(id).await;
    progress.finish_and_clear();
    let record = result.map_err(user_error)?;

    if json {
        return print_json(&record);
    }
    print_analysis(&record);
    println!();
    Ok(())
}

async fn cmd_chat(
    pipeline: &ContractPipeline,
    id: &DocumentId,
    question: Option<String>,
    json: bool,
) -> Result<()> {
    if let Some(question) = question {
        let answer = ask(pipeline, id, &question, &[]).await?;
        return if json {
            print_json(&answer)
        } else {
            print_answer(&answer);
            Ok(())
        };
    }

    // Make sure the document is reachable before prompting.
    let document = pipeline.document(id).await.map_err(user_error)?;
    println!("Chatting about {}. Empty line or Ctrl-D to quit.", document.filename);

    let mut history: Vec<ChatTurn> = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let question = line.trim();
        if question.is_empty() {
            break;
        }

        match ask(pipeline, id, question, &history).await {
            Ok(answer) => {
                print_answer(&answer);
                history.push(ChatTurn::user(question));
                history.push(ChatTurn::assistant(answer.answer));
            }
            Err(e) => eprintln!("{e}"),
        }
    }
    Ok(())
}

async fn ask(
    pipeline: &ContractPipeline,
    id: &DocumentId,
    question: &str,
    history: &[ChatTurn],
) -> Result<ChatAnswer> {
    let progress = spinner("Thinking");
    let result = pipeline.converse(id, question, history).await;
    progress.finish_and_clear();
    result.map_err(user_error)
}

// ---------------------------------------------------------------------------
// Config commands
// ---------------------------------------------------------------------------

fn cmd_config_init() -> Result<()> {
    let path = init_config().map_err(user_error)?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config().map_err(user_error)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn print_document(document: &Document) {
    println!();
    println!("  ID:       {}", document.id);
    println!("  Filename: {}", document.filename);
    println!(
        "  Type:     {}",
        document.detected_type.map(|t| t.as_str()).unwrap_or("unknown")
    );
    if let Some(party) = &document.selected_party {
        println!("  You:      {party}");
    }
    println!("  Added:    {}", document.created_at.format("%Y-%m-%d %H:%M"));
}

fn print_classification(classification: &Classification) {
    println!();
    println!("  Type:       {}", classification.detected_type);
    println!("  Confidence: {:.0}%", classification.confidence * 100.0);
    if !classification.reasoning.is_empty() {
        println!("  Reasoning:  {}", classification.reasoning);
    }
    println!("  Parties:");
    if classification.parties.is_empty() {
        println!("    (none detected)");
    }
    for party in &classification.parties {
        println!("    - {} ({})", party.name, party.role);
    }
    println!();
}

fn print_analysis(record: &AnalysisRecord) {
    if !record.parties.is_empty() {
        println!("\n  Parties:");
        for party in &record.parties {
            println!("    - {} ({}): {}", party.name, party.role, party.description);
        }
    }

    let Some(score) = record.score else {
        println!("\n  Classified only. Run `pactlens analyze {}` for the full analysis.", record.document_id);
        return;
    };

    println!(
        "\n  Score: {score}/100 ({})",
        if record.favorable == Some(true) { "favorable" } else { "needs review" }
    );
    if let Some(summary) = &record.summary {
        println!("\n  {summary}");
    }

    println!("\n  Clauses:");
    print_clauses(&record.clauses);

    println!("\n  Risks:");
    for risk in &record.risks {
        println!("    [{}] {}: {}", risk.severity.as_str(), risk.kind, risk.note);
    }
    println!("\n  Opportunities:");
    for opportunity in &record.opportunities {
        println!("    {}: {}", opportunity.kind, opportunity.note);
    }
    if !record.negotiation_points.is_empty() {
        println!("\n  Negotiation points:");
        for point in &record.negotiation_points {
            println!("    - {point}");
        }
    }
    if let Some(recommendations) = &record.recommendations {
        println!("\n  {recommendations}");
    }
}

fn print_clauses(clauses: &Clauses) {
    let u = Clauses::unspecified;
    let rows = [
        ("Payment", u(&clauses.payment.amount), u(&clauses.payment.schedule)),
        ("Liability", u(&clauses.liability.cap), u(&clauses.liability.indemnity)),
        ("Termination", u(&clauses.termination.notice), u(&clauses.termination.for_cause)),
        ("Confidentiality", u(&clauses.confidentiality.scope), u(&clauses.confidentiality.duration)),
        ("IP", u(&clauses.ip.ownership), u(&clauses.ip.license)),
        ("Law", u(&clauses.law.governing_law), u(&clauses.law.dispute_resolution)),
        ("Renewal", u(&clauses.renewal.term_length), u(&clauses.renewal.conditions)),
    ];
    for (group, first, second) in rows {
        println!("    {group:<16} {first}; {second}");
    }
}

fn print_answer(answer: &ChatAnswer) {
    println!("\n{}\n", answer.answer);
    if answer.augmented {
        println!("Sources:");
        for (i, source) in answer.sources.iter().enumerate() {
            println!(
                "  [{}] {} {}",
                i + 1,
                source.title.as_deref().unwrap_or("Untitled"),
                source.url.as_deref().unwrap_or("")
            );
        }
        println!();
    }
}
