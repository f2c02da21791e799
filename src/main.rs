use std::{
    io::{self, BufRead, Write},
    path::PathBuf,
};

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use prml_qa::{
    config::Config,
    embedding::get_embedding_client,
    export::{self, ExportFormat},
    logging,
    processing::ProcessingService,
    qa::{Answer, QaService},
};

#[derive(Parser)]
#[command(
    name = "prml-qa",
    about = "Ask questions about a textbook PDF using retrieval-augmented generation"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Extract non-empty pages from the PDF.
    Extract,
    /// Split extracted pages into overlapping chunks.
    Chunk,
    /// Remove front-matter chunks.
    Clean,
    /// Embed cleaned chunks and write the vector store.
    BuildIndex,
    /// Run extract, chunk, clean, and build-index in order.
    Ingest,
    /// Answer a single question.
    Ask {
        question: String,
        #[arg(long)]
        top_k: Option<usize>,
        #[arg(long)]
        show_context: bool,
        /// Write the answer to this file (`.docx` or `.pdf`).
        #[arg(long)]
        export: Option<PathBuf>,
    },
    /// Interactive question loop; type `exit` to quit.
    Chat {
        #[arg(long)]
        show_context: bool,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    let config = match Config::from_env().context("failed to load configuration") {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {err:#}");
            std::process::exit(1);
        }
    };
    logging::init_tracing(&config);
    tracing::debug!(
        pdf = %config.pdf_path.display(),
        vector_store = %config.vector_store_dir.display(),
        embedding_provider = ?config.embedding_provider,
        embedding_model = %config.embedding_model,
        generation_model = %config.generation_model,
        "Loaded configuration"
    );

    if let Err(err) = run(cli, &config).await {
        let message = format!("{err:#}");
        tracing::error!(error = %message, "Command failed");
        eprintln!("error: {message}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: &Config) -> Result<()> {
    let pipeline = ProcessingService::new(config);

    match cli.command {
        Command::Extract => {
            let pages = pipeline.extract()?;
            println!("Pages processed: {}", pages.len());
        }
        Command::Chunk => {
            let chunks = pipeline.chunk()?;
            println!("Total chunks: {}", chunks.len());
        }
        Command::Clean => {
            let outcome = pipeline.clean()?;
            println!(
                "Chunks removed: {}\nClean chunks remaining: {}",
                outcome.removed, outcome.kept
            );
        }
        Command::BuildIndex => {
            let client = get_embedding_client(config)?;
            let outcome = pipeline.build_index(client.as_ref()).await?;
            println!(
                "Total vectors: {} (dimension {})\nSaved in: {}",
                outcome.vectors,
                outcome.dimension,
                config.vector_store_dir.display()
            );
        }
        Command::Ingest => {
            let client = get_embedding_client(config)?;
            let outcome = pipeline.ingest(client.as_ref()).await?;
            println!(
                "Pages: {}\nChunks: {} ({} removed as front matter)\nVectors: {}",
                outcome.pages, outcome.chunks, outcome.filter.removed, outcome.index.vectors
            );
        }
        Command::Ask {
            question,
            top_k,
            show_context,
            export,
        } => {
            let service = QaService::new(config).context("failed to start QA service")?;
            let top_k = top_k.unwrap_or_else(|| service.top_k());
            let answer = service.answer_with_top_k(&question, top_k).await?;
            print_answer(&answer, show_context);
            if let Some(path) = export {
                let format = format_from_extension(&path)?;
                export::save(format, &question, &answer.text, &path)?;
                println!("Saved {}: {}", format.mime_type(), path.display());
            }
        }
        Command::Chat { show_context } => {
            let service = QaService::new(config).context("failed to start QA service")?;
            chat(&service, show_context).await?;
            let snapshot = service.metrics_snapshot();
            tracing::info!(
                questions = snapshot.questions_answered,
                chunk_answers = snapshot.chunk_answers,
                chunk_failures = snapshot.chunk_failures,
                "Chat session ended"
            );
        }
    }

    Ok(())
}

async fn chat(service: &QaService, show_context: bool) -> Result<()> {
    println!("PRML QA ready. Type 'exit' to quit.");
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        let Some(question) = prompt_line(&mut lines, "\nEnter your question: ")? else {
            break;
        };
        if question.eq_ignore_ascii_case("exit") {
            break;
        }
        if question.is_empty() {
            continue;
        }

        match service.answer(&question).await {
            Ok(answer) => {
                print_answer(&answer, show_context);
                offer_export(&mut lines, &question, &answer.text)?;
            }
            Err(error) => eprintln!("Query failed: {error:#}"),
        }
    }

    Ok(())
}

fn offer_export<B: BufRead>(lines: &mut io::Lines<B>, question: &str, answer: &str) -> Result<()> {
    let choice = prompt_line(lines, "\nExport this answer? (yes/no): ")?.unwrap_or_default();
    if !choice.eq_ignore_ascii_case("yes") {
        return Ok(());
    }

    let format = prompt_line(lines, "Format (word/pdf): ")?.unwrap_or_default();
    let Ok(format) = format.parse::<ExportFormat>() else {
        println!("Invalid format. Skipping export.");
        return Ok(());
    };
    let Some(filename) = prompt_line(lines, "Filename (with extension): ")? else {
        return Ok(());
    };

    match export::save(format, question, answer, &PathBuf::from(&filename)) {
        Ok(()) => println!("Saved: {filename}"),
        Err(error) => eprintln!("Export failed: {error}"),
    }
    Ok(())
}

fn prompt_line<B: BufRead>(lines: &mut io::Lines<B>, prompt: &str) -> Result<Option<String>> {
    print!("{prompt}");
    io::stdout().flush()?;
    lines
        .next()
        .transpose()
        .map(|line| line.map(|value| value.trim().to_string()))
        .context("failed to read from stdin")
}

fn print_answer(answer: &Answer, show_context: bool) {
    println!("\n{}", "=".repeat(50));
    println!("Answer:\n");
    println!("{}", answer.text);
    println!("{}", "=".repeat(50));

    if show_context {
        for (position, hit) in answer.retrieved.iter().enumerate() {
            println!(
                "\n--- Chunk {} (id {}, pages {}-{}, score {:.3}) ---\n{}",
                position + 1,
                hit.chunk.chunk_id,
                hit.chunk.page_start,
                hit.chunk.page_end,
                hit.score,
                hit.chunk.text
            );
        }
    }
}

fn format_from_extension(path: &std::path::Path) -> Result<ExportFormat> {
    path.extension()
        .and_then(|extension| extension.to_str())
        .and_then(|extension| extension.parse().ok())
        .ok_or_else(|| anyhow!("export path must end in .docx or .pdf: {}", path.display()))
}
