mod agent;
mod auth;
mod config;
mod export;
mod forum;
mod instrumentation;
mod llm;
mod request;
mod thread;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;

use agent::ResearchAgent;
use auth::AccessGate;
use config::Config;
use export::ExportOutcome;
use request::{parse_questions, ResearchRequest, DEFAULT_LIMIT};

#[derive(Parser)]
#[command(
    name = "reddit-research",
    about = "Summarize recent Reddit discussions into a research report"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose per-stage progress output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, summarize and report on a community
    Run {
        /// Domain or genre label, e.g. "klaviyo" or "horror"
        #[arg(long)]
        domain: String,

        /// Subreddit to research; defaults from the domain label when known
        #[arg(long)]
        community: Option<String>,

        /// Number of newest threads to fetch (10-200)
        #[arg(long, default_value_t = DEFAULT_LIMIT)]
        limit: usize,

        /// Research question (repeatable, at most 5 are used)
        #[arg(short = 'q', long = "question")]
        questions: Vec<String>,

        /// File with one research question per line
        #[arg(long)]
        questions_file: Option<PathBuf>,

        /// Directory for the text and PDF reports
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,

        /// Access password (falls back to RESEARCH_PASSWORD)
        #[arg(long)]
        password: Option<String>,

        /// Skip summary batches the model answers with malformed JSON
        #[arg(long)]
        skip_malformed_batches: bool,

        /// Write per-thread gists and insights as JSON to this file
        #[arg(long)]
        gists_out: Option<PathBuf>,
    },
    /// Re-render an existing markdown report as text and PDF
    Export {
        /// Path to the report
        path: PathBuf,

        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    if let Err(e) = execute(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn execute(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Run {
            domain,
            community,
            limit,
            mut questions,
            questions_file,
            out_dir,
            password,
            skip_malformed_batches,
            gists_out,
        } => {
            let mut config = Config::from_env()?;
            if skip_malformed_batches {
                config.skip_malformed_batches = true;
            }

            let password = password.or_else(|| config.password.clone());
            let authorization = AccessGate::new(config.passwords.clone())
                .authorize(password.as_deref())?;

            if let Some(path) = questions_file {
                let text = std::fs::read_to_string(&path).with_context(|| {
                    format!("Failed to read questions file: {}", path.display())
                })?;
                questions.extend(parse_questions(&text));
            }
            let request =
                ResearchRequest::new(&domain, community.as_deref(), limit, &questions)?;
            info!(
                domain = %request.domain,
                community = %request.community,
                limit = request.limit,
                questions = request.questions.len(),
                "starting research run"
            );

            let agent = ResearchAgent::new(&config)?;
            let run = agent.run(&authorization, &request, cli.verbose).await?;

            if let Some(path) = gists_out {
                let json = serde_json::to_string_pretty(&thread::gist_rows(&run.threads))
                    .context("Failed to serialize gists")?;
                std::fs::write(&path, json)
                    .with_context(|| format!("Failed to write gists: {}", path.display()))?;
            }

            for issue in &run.issues {
                eprintln!("  warning: {}", issue);
            }
            println!("\n{}\n", run.report);
            println!("{}", run.run_log.summary());

            report_exports(export::write_artifacts(&run.report, &out_dir)?)
        }
        Commands::Export { path, out_dir } => {
            let report = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read report: {}", path.display()))?;
            report_exports(export::write_artifacts(&report, &out_dir)?)
        }
    }
}

fn report_exports(outcome: ExportOutcome) -> Result<()> {
    print_artifact(&outcome.text.path, outcome.text.media_type);
    let pdf = outcome.pdf.with_context(|| {
        format!(
            "PDF export failed; the text report was saved to {}",
            outcome.text.path.display()
        )
    })?;
    print_artifact(&pdf.path, pdf.media_type);
    Ok(())
}

fn print_artifact(path: &Path, media_type: &str) {
    eprintln!("Saved {} ({})", path.display(), media_type);
}
