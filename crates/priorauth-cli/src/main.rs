mod display;

use std::io::{BufRead, Read, Write};
use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};
use priorauth_ai::{EmbeddingService, Embedder, OllamaClient, OllamaEmbedder};
use priorauth_core::{DecisionRequest, Settings};
use priorauth_pipeline::{
    AutoConfirm, CATALOGUE, Confirm, DecisionSynthesizer, ExtractionPipeline, FixedDelay, Indexer,
    PolicyGenerator, Retriever,
};
use priorauth_store::{CaseStore, PolicyStore, read_raw_records, write_json_atomic};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "priorauth", version)]
#[command(about = "Prior-authorization decisions grounded in precedent cases and policy")]
struct Cli {
    /// Settings file (JSON); unspecified keys use defaults
    #[arg(short, long, env = "PRIORAUTH_CONFIG")]
    config: Option<PathBuf>,

    /// Root of the artifact store (overrides settings)
    #[arg(long, env = "PRIORAUTH_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Completion/embedding service base URL (overrides settings)
    #[arg(long, env = "PRIORAUTH_SERVICE_URL")]
    service_url: Option<String>,

    /// Completion model (overrides settings)
    #[arg(long, env = "PRIORAUTH_MODEL")]
    model: Option<String>,

    /// Embedding backend
    #[arg(long, value_enum, default_value_t = EmbeddingBackend::Onnx, env = "PRIORAUTH_EMBEDDER")]
    embedder: EmbeddingBackend,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum EmbeddingBackend {
    /// Local ONNX Runtime model from `model_dir`
    Onnx,
    /// The service's `/api/embed` endpoint
    Ollama,
}

#[derive(Subcommand)]
enum Command {
    /// Extract structured cases from raw narratives (resumable)
    Extract {
        /// Source CSV (overrides settings)
        #[arg(long)]
        input: Option<PathBuf>,
        /// Stop after this many extraction calls
        #[arg(long)]
        limit: Option<usize>,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Draft coverage policies for the procedure catalogue (resumable)
    Policies {
        #[arg(short, long)]
        yes: bool,
    },
    /// Rebuild and publish the case index
    Index,
    /// Find the precedent cases most similar to a text
    Search {
        text: String,
        #[arg(short, default_value_t = 5)]
        k: usize,
    },
    /// Decide a prior-authorization request
    Decide {
        /// Requested procedure, e.g. "Lumbar Discectomy"
        #[arg(short, long)]
        procedure: String,
        /// Clinical narrative; read from --file or stdin when absent
        narrative: Option<String>,
        #[arg(short, long, conflicts_with = "narrative")]
        file: Option<PathBuf>,
        /// Also write the decision JSON here
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show progress of each pipeline stage
    Status,
}

/// Asks on stdin; only "yes" (or "y") proceeds.
struct StdinConfirm;

impl Confirm for StdinConfirm {
    fn confirm(&self, question: &str) -> bool {
        print!("\n{question} (yes/no): ");
        if std::io::stdout().flush().is_err() {
            return false;
        }
        let mut answer = String::new();
        if std::io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim().to_lowercase().as_str(), "yes" | "y")
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = load_settings(&cli)?;
    info!("priorauth v{}", env!("CARGO_PKG_VERSION"));

    let result = match &cli.command {
        Command::Extract { input, limit, yes } => {
            extract(&settings, input.clone(), *limit, *yes).await
        }
        Command::Policies { yes } => policies(&settings, *yes).await,
        Command::Index => index(&settings, cli.embedder).await,
        Command::Search { text, k } => search(&settings, cli.embedder, text, *k).await,
        Command::Decide {
            procedure,
            narrative,
            file,
            output,
        } => {
            let narrative = read_narrative(narrative.clone(), file.as_deref())?;
            let request = DecisionRequest {
                narrative,
                procedure: procedure.clone(),
            };
            decide(&settings, cli.embedder, &request, output.as_deref()).await
        }
        Command::Status => {
            let report = priorauth_pipeline::status(&settings).context("reading pipeline status")?;
            display::print_status(&report);
            Ok(())
        }
    };
    if let Err(e) = &result {
        error!(error = %format!("{e:#}"), "command failed");
    }
    result
}

fn load_settings(cli: &Cli) -> anyhow::Result<Settings> {
    let mut settings = match &cli.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    if let Some(dir) = &cli.data_dir {
        settings.data_dir = dir.clone();
    }
    if let Some(url) = &cli.service_url {
        settings.service_url = url.clone();
    }
    if let Some(model) = &cli.model {
        settings.completion_model = model.clone();
    }
    Ok(settings)
}

fn confirmer(yes: bool) -> Box<dyn Confirm> {
    if yes {
        Box::new(AutoConfirm)
    } else {
        Box::new(StdinConfirm)
    }
}

fn embedding_service(
    settings: &Settings,
    backend: EmbeddingBackend,
) -> anyhow::Result<Box<dyn EmbeddingService>> {
    Ok(match backend {
        EmbeddingBackend::Onnx => Box::new(
            Embedder::load(&settings.model_dir)
                .with_context(|| format!("loading embedding model from {}", settings.model_dir.display()))?,
        ),
        EmbeddingBackend::Ollama => Box::new(OllamaEmbedder::new(
            &settings.service_url,
            settings.embedding_model.clone(),
            settings.embedding_dim,
            settings.indexing.timeout(),
        )),
    })
}

fn read_narrative(text: Option<String>, file: Option<&std::path::Path>) -> anyhow::Result<String> {
    let narrative = match (text, file) {
        (Some(text), _) => text,
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("reading narrative from {}", path.display()))?,
        (None, None) => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("reading narrative from stdin")?;
            buf
        }
    };
    if narrative.trim().is_empty() {
        bail!("narrative is empty");
    }
    Ok(narrative)
}

async fn extract(
    settings: &Settings,
    input: Option<PathBuf>,
    limit: Option<usize>,
    yes: bool,
) -> anyhow::Result<()> {
    let input = input.unwrap_or_else(|| settings.raw_records.clone());
    let records = read_raw_records(&input).with_context(|| format!("reading {}", input.display()))?;
    let store = CaseStore::open(&settings.cases_dir())?;
    let mut ledger = store.ledger()?;

    let completion = OllamaClient::new(&settings.service_url, settings.completion_model.clone());
    let pacer = FixedDelay(settings.extraction.delay());
    let pipeline = ExtractionPipeline::new(
        &completion,
        &store,
        &pacer,
        settings.extraction.clone(),
        settings.summary_path(),
    )
    .with_limit(limit);

    display::print_extraction_plan(&pipeline.plan(&records, &ledger));
    let confirm = confirmer(yes);
    if let Some(outcome) = pipeline.run(&records, &mut ledger, confirm.as_ref()).await? {
        display::print_extraction_outcome(&outcome);
        println!("\nSummary saved to: {}", settings.summary_path().display());
    }
    Ok(())
}

async fn policies(settings: &Settings, yes: bool) -> anyhow::Result<()> {
    let store = PolicyStore::open(&settings.policies_dir())?;
    let completion = OllamaClient::new(&settings.service_url, settings.completion_model.clone());
    let pacer = FixedDelay(settings.policies.delay());
    let generator = PolicyGenerator::new(&completion, &store, &pacer, settings.policies.clone());

    let pending = generator.pending(CATALOGUE)?;
    println!(
        "{} of {} policies present, {} to generate",
        CATALOGUE.len() - pending.len(),
        CATALOGUE.len(),
        pending.len()
    );
    if pending.is_empty() {
        return Ok(());
    }
    if !confirmer(yes).confirm(&format!("Generate {} policies?", pending.len())) {
        println!("Cancelled");
        return Ok(());
    }

    let outcome = generator.generate(CATALOGUE).await?;
    display::print_generation_outcome(&outcome);
    Ok(())
}

async fn index(settings: &Settings, backend: EmbeddingBackend) -> anyhow::Result<()> {
    let store = CaseStore::open(&settings.cases_dir())?;
    let embedder = embedding_service(settings, backend)?;
    let (published, outcome) = Indexer::new(embedder.as_ref())
        .rebuild(&store, &settings.embeddings_dir())
        .await
        .context("building case index")?;
    display::print_index_outcome(&outcome, &published);
    Ok(())
}

async fn search(
    settings: &Settings,
    backend: EmbeddingBackend,
    text: &str,
    k: usize,
) -> anyhow::Result<()> {
    let embedder = embedding_service(settings, backend)?;
    let retriever = Retriever::open(&settings.embeddings_dir(), embedder.as_ref())
        .context("opening case index")?;
    let results = retriever.search(text, k).await?;
    display::print_similar(&results);
    Ok(())
}

async fn decide(
    settings: &Settings,
    backend: EmbeddingBackend,
    request: &DecisionRequest,
    output: Option<&std::path::Path>,
) -> anyhow::Result<()> {
    let embedder = embedding_service(settings, backend)?;
    let retriever = Retriever::open(&settings.embeddings_dir(), embedder.as_ref())
        .context("opening case index")?;
    let policies = PolicyStore::open(&settings.policies_dir())?;
    let completion = OllamaClient::new(&settings.service_url, settings.completion_model.clone());
    let synthesizer =
        DecisionSynthesizer::new(&retriever, &policies, &completion, settings.decision.clone());

    let outcome = synthesizer
        .decide(request)
        .await
        .context("synthesizing decision")?;
    display::print_decision(&outcome);

    if let Some(path) = output {
        write_json_atomic(path, &outcome.decision)
            .with_context(|| format!("writing decision to {}", path.display()))?;
        println!("Decision saved to: {}", path.display());
    }
    Ok(())
}
