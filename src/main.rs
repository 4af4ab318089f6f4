use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;
use docqa::chat::{Conversation, Sender};
use docqa::config::Config;
use docqa::document;
use docqa::rag::Assistant;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "docqa", about = "Ask questions about your documents")]
struct Cli {
    /// Optional path to a config file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Vector store snapshot path
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Base URL of the Ollama server
    #[arg(long, global = true)]
    ollama_url: Option<String>,

    /// Language model used to compose answers
    #[arg(long, global = true)]
    model: Option<String>,

    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Stage a document and add it to the index
    Ingest { file: PathBuf },
    /// Clear the index and rebuild it from a directory
    Rebuild {
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// Answer a single question
    Ask { question: String },
    /// Interactive question loop
    Chat,
    /// Show what the index holds
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    docqa::logging::init(cli.verbose);

    let config = resolve_config(&cli)?;
    debug!(?config, "resolved configuration");

    match cli.command {
        Commands::Ingest { file } => ingest_cmd(&config, &file).await?,
        Commands::Rebuild { input } => {
            let input = input.unwrap_or_else(|| config.paths.data_dir.clone());
            rebuild_cmd(&config, &input).await?;
        }
        Commands::Ask { question } => {
            let assistant = Assistant::from_config(&config).await?;
            let answer = assistant.answer_question(&question).await?;
            println!("{}", answer.text);
        }
        Commands::Chat => chat_cmd(&config).await?,
        Commands::Stats => stats_cmd(&config).await?,
    }

    Ok(())
}

/// File values, then `DOCQA_*` environment, then flags.
fn resolve_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    config.apply_env();
    if let Some(store) = &cli.store {
        config.paths.store_path = store.clone();
    }
    if let Some(url) = &cli.ollama_url {
        config.llm.base_url = url.clone();
        config.embedding.base_url = url.clone();
    }
    if let Some(model) = &cli.model {
        config.llm.model = model.clone();
    }
    config.validate()?;
    Ok(config)
}

fn embedding_bar() -> ProgressBar {
    let bar = ProgressBar::new(0);
    if let Ok(style) = ProgressStyle::with_template("{spinner} embedding [{bar:30}] {pos}/{len} chunks") {
        bar.set_style(style.progress_chars("=> "));
    }
    bar
}

async fn ingest_cmd(config: &Config, file: &Path) -> anyhow::Result<()> {
    if !document::is_supported(file) {
        anyhow::bail!("Unsupported file type: {} (supported: .txt, .pdf, .md, .doc, .docx)", file.display());
    }
    let staged = document::stage_upload(file, &config.paths.data_dir)?;
    let mut assistant = Assistant::from_config(config).await?.with_progress(embedding_bar());
    let report = assistant.process_and_store(&staged).await?;
    println!(
        "{} {} ({} chunks from {} document(s))",
        "Document uploaded and processed successfully:".green(),
        staged.display(),
        report.chunks,
        report.documents
    );
    Ok(())
}

async fn rebuild_cmd(config: &Config, input: &Path) -> anyhow::Result<()> {
    let mut assistant = Assistant::from_config(config).await?.with_progress(embedding_bar());
    let (report, chunks) = assistant.rebuild(input).await?;
    println!("Split {} documents into {} chunks.", report.documents, report.chunks);
    if let Some(sample) = chunks.get(10) {
        println!("{}", sample.text);
        println!("{} (start index {:?})", sample.source.display(), sample.start_index);
    }
    println!("Saved {} chunks to {}.", report.chunks, config.paths.store_path.display());
    Ok(())
}

async fn chat_cmd(config: &Config) -> anyhow::Result<()> {
    let assistant = Assistant::from_config(config).await?;
    let mut conversation = Conversation::new();

    println!("{}", "Sir Reads-a-Lot".bold());
    println!("{}", "Your intelligent assistant for document-based queries".dimmed());

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("{} ", "How can I assist you today?".cyan());
        io::stdout().flush()?;
        let Some(line) = lines.next() else {
            break;
        };
        let query = line.context("reading stdin")?;
        let query = query.trim();
        if query.is_empty() {
            continue;
        }
        let reply = conversation.ask(&assistant, query).await;
        println!("{}", render(Sender::User, query));
        println!("{}\n", render(Sender::Bot, reply));
    }
    Ok(())
}

fn render(sender: Sender, message: &str) -> String {
    let line = format!("{sender}: {message}");
    match sender {
        Sender::User => line.white().to_string(),
        Sender::Bot => line.bright_black().to_string(),
    }
}

async fn stats_cmd(config: &Config) -> anyhow::Result<()> {
    let assistant = Assistant::from_config(config).await?;
    let store = assistant.store();
    println!("chunks:  {}", store.len().await?);
    let sources = store.sources().await?;
    println!("sources: {}", sources.len());
    for source in sources {
        println!("  {}", source.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_turns_are_labelled() {
        colored::control::set_override(false);
        assert_eq!(render(Sender::User, "What is in chapter 2?"), "user: What is in chapter 2?");
        assert_eq!(render(Sender::Bot, "Rivers."), "bot: Rivers.");
    }
}
