use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use renamer_client::GeminiExtractor;
use renamer_core::export::{ExportConfig, ExportService};
use renamer_core::item::{ItemStatus, NewDocument};
use renamer_core::runner::{BatchConfig, BatchRunner, TracingBatchReporter};
use renamer_core::store::ItemStore;
use renamer_core::traits::Exporter;

#[derive(Parser)]
#[command(name = "renamer", version, about = "Batch PDF renaming via AI identifier extraction")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract identifiers from PDFs and write renamed copies
    Run {
        /// Input PDF files or directories (directories are scanned non-recursively)
        #[arg(short, long, required = true, num_args = 1..)]
        input: Vec<PathBuf>,

        /// Directory the renamed copies are written to
        #[arg(short, long)]
        output: PathBuf,

        /// Gemini model to use
        #[arg(short, long, env = "RENAMER_MODEL", default_value = "gemini-2.5-flash")]
        model: String,

        /// API key (reads from RENAMER_API_KEY env var if not provided)
        #[arg(short, long, env = "RENAMER_API_KEY")]
        api_key: String,

        /// Gemini API base URL
        #[arg(
            short,
            long,
            env = "RENAMER_BASE_URL",
            default_value = "https://generativelanguage.googleapis.com/v1beta"
        )]
        base_url: String,

        /// Maximum concurrent extraction calls
        #[arg(long, default_value_t = 10)]
        batch_size: usize,

        /// Delay between file writes during export, in milliseconds
        #[arg(long, default_value_t = 200)]
        stagger_ms: u64,

        /// Extract and report proposed names without writing any files
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Setup tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("renamer=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            input,
            output,
            model,
            api_key,
            base_url,
            batch_size,
            stagger_ms,
            dry_run,
        } => {
            cmd_run(
                &input, &output, &model, &api_key, &base_url, batch_size, stagger_ms, dry_run,
            )
            .await?;
        }
    }

    Ok(())
}

/// Exporter that writes each delivered document into a target directory.
/// A name collision overwrites the earlier file.
#[derive(Clone)]
struct FileExporter {
    dir: PathBuf,
}

impl Exporter for FileExporter {
    async fn export(&self, name: &str, content: &[u8]) -> Result<(), std::io::Error> {
        tokio::fs::write(self.dir.join(name), content).await
    }
}

#[allow(clippy::too_many_arguments)]
async fn cmd_run(
    input: &[PathBuf],
    output: &Path,
    model: &str,
    api_key: &str,
    base_url: &str,
    batch_size: usize,
    stagger_ms: u64,
    dry_run: bool,
) -> Result<()> {
    let paths = collect_inputs(input)?;
    if paths.is_empty() {
        bail!("no PDF files found under the given inputs");
    }

    // 1. Load documents
    let store = ItemStore::new();
    let mut docs = Vec::with_capacity(paths.len());
    for path in &paths {
        let content = std::fs::read(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("document.pdf")
            .to_string();
        docs.push(NewDocument { name, content });
    }
    store.add_many(docs);

    tracing::info!("Loaded {} documents", paths.len());

    // 2. Run the batch
    let extractor = GeminiExtractor::with_base_url(api_key, model, base_url)
        .map_err(|e| anyhow::anyhow!(e))?;
    let runner = BatchRunner::new(
        store.clone(),
        extractor,
        BatchConfig::default().with_batch_size(batch_size),
    );
    let summary = runner
        .run(&TracingBatchReporter)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;

    // 3. Report per-item outcomes
    for item in store.snapshot() {
        match item.status {
            ItemStatus::Completed => println!(
                "  [ok]     {} -> {} ({})",
                item.original_name,
                item.output_name,
                human_size(item.size_bytes)
            ),
            ItemStatus::Failed => println!(
                "  [failed] {} — {}",
                item.original_name,
                item.failure_message().unwrap_or("failed")
            ),
            // A finished run leaves no item unsettled.
            ItemStatus::Pending | ItemStatus::Processing => println!(
                "  [{}] {}",
                item.status, item.original_name
            ),
        }
    }
    println!(
        "\n{} renamed, {} failed, {} total",
        summary.completed, summary.failed, summary.total
    );

    // 4. Write renamed copies
    if dry_run {
        tracing::info!("Dry run — no files written");
    } else if summary.completed > 0 {
        std::fs::create_dir_all(output)
            .with_context(|| format!("Failed to create {}", output.display()))?;
        let service = ExportService::new(
            store,
            FileExporter {
                dir: output.to_path_buf(),
            },
            ExportConfig::default().with_stagger(Duration::from_millis(stagger_ms)),
        );
        let delivered = service.export_all().await;
        tracing::info!("Wrote {} files to {}", delivered, output.display());
    }

    if summary.failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}

/// Expand the input arguments into a list of PDF paths. Files are taken
/// as-is; directories are scanned one level deep for `.pdf` entries,
/// sorted by name.
fn collect_inputs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let mut entries: Vec<PathBuf> = std::fs::read_dir(input)
                .with_context(|| format!("Failed to read directory {}", input.display()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && is_pdf(p))
                .collect();
            entries.sort();
            paths.extend(entries);
        } else if input.is_file() {
            paths.push(input.clone());
        } else {
            bail!("input not found: {}", input.display());
        }
    }
    Ok(paths)
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
}

fn human_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * 1024;
    if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
